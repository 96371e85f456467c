//! Synthetic threat generator
//!
//! Generates realistic attack traffic and submits it to the analysis API.
//! Useful for demos and for exercising the triage pipeline end to end
//! without a live Snort sensor.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use anyhow::Result;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::json;

use crate::client::ApiClient;
use crate::record::ThreatRecord;

const ATTACK_TYPES: &[&str] = &[
    "port_scan",
    "sql_injection",
    "brute_force",
    "malware_communication",
    "ddos_attack",
    "xss_attempt",
    "data_exfiltration",
];

#[derive(Debug, Clone)]
pub struct SimulateOptions {
    pub count: u32,
    pub interval_min: u64,
    pub interval_max: u64,
    pub batch: bool,
    pub batch_size: usize,
}

pub async fn run(options: SimulateOptions, client: ApiClient) -> Result<()> {
    log::info!(
        "Starting simulation: {} threats, batch={}",
        options.count, options.batch
    );

    let mut sent = 0u32;
    let mut failed = 0u32;
    let mut by_type: BTreeMap<String, u32> = BTreeMap::new();

    if options.batch {
        let mut remaining = options.count as usize;
        while remaining > 0 {
            let size = remaining.min(options.batch_size);
            let records: Vec<ThreatRecord> =
                (0..size).map(|_| generate_threat(None)).collect();
            for record in &records {
                *by_type.entry(record.behavior.clone()).or_default() += 1;
            }

            match client.submit_batch(&records).await {
                Ok(response) => {
                    sent += size as u32;
                    log::info!("Sent batch of {} as job {}", size, response.job_id);
                }
                Err(e) => {
                    failed += size as u32;
                    log::warn!("Batch submission failed: {}", e);
                }
            }

            remaining -= size;
            if remaining > 0 {
                sleep_between(&options).await;
            }
        }
    } else {
        for _ in 0..options.count {
            let record = generate_threat(None);
            *by_type.entry(record.behavior.clone()).or_default() += 1;

            match client.submit(&record).await {
                Ok(response) => {
                    sent += 1;
                    log::info!(
                        "Sent {} from {}: severity {}",
                        record.behavior, record.source_ip, response.severity
                    );
                }
                Err(e) => {
                    failed += 1;
                    log::warn!("Submission failed: {}", e);
                }
            }

            if sent + failed < options.count {
                sleep_between(&options).await;
            }
        }
    }

    log::info!("Simulation finished: {} sent, {} failed", sent, failed);
    for (attack_type, count) in &by_type {
        log::info!("  {}: {}", attack_type, count);
    }

    Ok(())
}

async fn sleep_between(options: &SimulateOptions) {
    let secs = if options.interval_max > options.interval_min {
        rand::thread_rng().gen_range(options.interval_min..=options.interval_max)
    } else {
        options.interval_min
    };
    log::debug!("Waiting {}s before next submission", secs);
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

/// Generate one synthetic threat of the given type, or a random one.
pub fn generate_threat(attack_type: Option<&str>) -> ThreatRecord {
    let mut rng = rand::thread_rng();
    let attack_type = match attack_type {
        Some(t) if ATTACK_TYPES.contains(&t) => t,
        _ => ATTACK_TYPES.choose(&mut rng).copied().unwrap_or("port_scan"),
    };

    let (protocol, additional_data) = attack_details(attack_type, &mut rng);

    ThreatRecord {
        id: String::new(),
        source_ip: random_external_ip(&mut rng).to_string(),
        destination_ip: random_internal_ip(&mut rng).to_string(),
        protocol: Some(protocol.to_string()),
        behavior: attack_type.to_string(),
        timestamp: Some(chrono::Utc::now().to_rfc3339()),
        additional_data,
    }
}

fn attack_details(attack_type: &str, rng: &mut impl Rng) -> (&'static str, serde_json::Value) {
    match attack_type {
        "port_scan" => (
            *["TCP", "UDP"].choose(rng).unwrap_or(&"TCP"),
            json!({
                "scan_type": (["SYN", "FIN", "XMAS", "NULL"].choose(rng)),
                "ports": ([21, 22, 23, 25, 80, 443, 445, 3306, 3389, 8080].choose(rng)),
            }),
        ),
        "sql_injection" => (
            "HTTP",
            json!({
                "method": "POST",
                "target_path": (["/login", "/search", "/admin", "/api/data"].choose(rng)),
                "payloads": ([
                    "' OR 1=1 --",
                    "'; DROP TABLE users; --",
                    "1'; SELECT * FROM users; --",
                ].choose(rng)),
            }),
        ),
        "brute_force" => (
            *["HTTP", "SSH", "FTP", "SMTP"].choose(rng).unwrap_or(&"SSH"),
            json!({
                "target_service": (["ssh", "ftp", "smtp", "web_login"].choose(rng)),
                "username": (["admin", "root", "user", "administrator"].choose(rng)),
                "attempts": rng.gen_range(10..=100),
            }),
        ),
        "malware_communication" => (
            *["HTTP", "HTTPS", "DNS"].choose(rng).unwrap_or(&"HTTPS"),
            json!({
                "domains": ([
                    "malicious-domain.com",
                    "evil-server.net",
                    "data-exfil.xyz",
                ].choose(rng)),
                "data_size": rng.gen_range(1024..=10240),
            }),
        ),
        "ddos_attack" => (
            *["TCP", "UDP", "ICMP"].choose(rng).unwrap_or(&"UDP"),
            json!({
                "packets_per_second": rng.gen_range(10_000..=1_000_000),
                "attack_type": ([
                    "SYN flood", "UDP flood", "HTTP flood", "ICMP flood",
                ].choose(rng)),
            }),
        ),
        "xss_attempt" => (
            "HTTP",
            json!({
                "method": "GET",
                "target_path": (["/comment", "/profile", "/message"].choose(rng)),
                "payloads": ([
                    "<script>alert(1)</script>",
                    "<img src=x onerror=alert(1)>",
                ].choose(rng)),
            }),
        ),
        _ => (
            *["HTTP", "HTTPS", "DNS", "FTP"].choose(rng).unwrap_or(&"HTTPS"),
            json!({
                "data_type": ([
                    "database", "documents", "source_code", "credentials",
                ].choose(rng)),
                "data_size_mb": (rng.gen_range(0.5f64..=50.0) * 100.0).round() / 100.0,
            }),
        ),
    }
}

fn random_internal_ip(rng: &mut impl Rng) -> Ipv4Addr {
    match rng.gen_range(0..3) {
        0 => Ipv4Addr::new(10, rng.gen(), rng.gen(), rng.gen_range(1..=254)),
        1 => Ipv4Addr::new(192, 168, rng.gen(), rng.gen_range(1..=254)),
        _ => Ipv4Addr::new(172, rng.gen_range(16..=31), rng.gen(), rng.gen_range(1..=254)),
    }
}

fn random_external_ip(rng: &mut impl Rng) -> Ipv4Addr {
    loop {
        let ip = Ipv4Addr::new(rng.gen(), rng.gen(), rng.gen(), rng.gen_range(1..=254));
        if !ip.is_private() && !ip.is_loopback() && !ip.is_broadcast()
            && !ip.is_multicast() && !ip.is_link_local() && !ip.is_unspecified()
            && ip.octets()[0] != 0 && ip.octets()[0] < 224
        {
            return ip;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_threat_shape() {
        let record = generate_threat(Some("sql_injection"));
        assert_eq!(record.behavior, "sql_injection");
        assert_eq!(record.protocol.as_deref(), Some("HTTP"));
        assert!(!record.source_ip.is_empty());
        assert!(record.additional_data["payloads"].is_string());
    }

    #[test]
    fn test_all_attack_types_have_details() {
        for attack_type in ATTACK_TYPES {
            let record = generate_threat(Some(attack_type));
            assert_eq!(record.behavior, *attack_type);
            assert!(record.protocol.is_some());
            assert!(record.additional_data.is_object());
            assert!(!record.additional_data.as_object().unwrap().is_empty());
        }
    }

    #[test]
    fn test_unknown_type_falls_back_to_random() {
        let record = generate_threat(Some("no_such_attack"));
        assert!(ATTACK_TYPES.contains(&record.behavior.as_str()));
    }

    #[test]
    fn test_source_ip_is_external() {
        for _ in 0..50 {
            let record = generate_threat(None);
            let ip: Ipv4Addr = record.source_ip.parse().unwrap();
            assert!(!ip.is_private());
            assert!(!ip.is_loopback());
        }
    }

    #[test]
    fn test_destination_ip_is_internal() {
        for _ in 0..50 {
            let record = generate_threat(None);
            let ip: Ipv4Addr = record.destination_ip.parse().unwrap();
            assert!(ip.is_private());
        }
    }
}
