//! Threat detection service
//!
//! Deterministic, explainable heuristics over submitted threat data.
//! Input: ThreatData fields (payload, behavior, protocol)
//! Output: Verdict (severity, confidence, MITRE techniques, recommendation)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Threat severity levels, ordered by urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Normal,
    Low,
    Medium,
    High,
    Unknown,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "NORMAL" => Self::Normal,
            "LOW" => Self::Low,
            "MEDIUM" => Self::Medium,
            "HIGH" => Self::High,
            _ => Self::Unknown,
        })
    }
}

/// Outcome of analyzing one threat submission.
#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub severity: Severity,
    pub confidence: f32,
    pub techniques: Vec<String>,
    pub recommendation: &'static str,
}

/// Fields the heuristics look at. Missing fields are treated as empty.
#[derive(Debug, Default)]
pub struct Observation<'a> {
    pub payload: Option<&'a str>,
    pub behavior: Option<&'a str>,
    pub protocol: Option<&'a str>,
}

/// Confidence assigned to heuristic verdicts.
const HEURISTIC_CONFIDENCE: f32 = 0.5;

const HIGH_INDICATORS: &[&str] = &["malware", "ransomware", "exploit", "attack", "vulnerability"];
const MEDIUM_INDICATORS: &[&str] = &["scan", "probe", "suspicious", "unusual", "admin"];
const LOW_INDICATORS: &[&str] = &["warning", "notice", "attempt", "failed"];

/// Analyze a threat observation.
pub fn analyze(obs: &Observation) -> Verdict {
    let severity = classify_severity(obs);
    let techniques = identify_techniques(obs);

    Verdict {
        severity,
        confidence: HEURISTIC_CONFIDENCE,
        techniques,
        recommendation: recommendation_for(severity),
    }
}

/// Severity from keyword indicators over payload + behavior.
///
/// Tiers are checked highest first; the first match wins.
fn classify_severity(obs: &Observation) -> Severity {
    let payload = obs.payload.unwrap_or("").to_lowercase();
    let behavior = obs.behavior.unwrap_or("").to_lowercase();

    let hit = |indicators: &[&str]| {
        indicators.iter().any(|i| payload.contains(i) || behavior.contains(i))
    };

    if hit(HIGH_INDICATORS) {
        Severity::High
    } else if hit(MEDIUM_INDICATORS) {
        Severity::Medium
    } else if hit(LOW_INDICATORS) {
        Severity::Low
    } else {
        Severity::Normal
    }
}

/// Identify potential MITRE ATT&CK techniques from the observation.
fn identify_techniques(obs: &Observation) -> Vec<String> {
    let payload = obs.payload.unwrap_or("").to_lowercase();
    let behavior = obs.behavior.unwrap_or("").to_lowercase();
    let protocol = obs.protocol.unwrap_or("").to_lowercase();

    let mut techniques = Vec::new();
    let mut push = |t: &str| {
        if !techniques.iter().any(|x| x == t) {
            techniques.push(t.to_string());
        }
    };

    // Exploit Public-Facing Application
    if protocol == "http" && payload.contains("admin") {
        push("T1190");
    }

    // Network Service Scanning
    if behavior.contains("scan") || behavior.contains("scanning") {
        push("T1046");
    }

    // SQL Injection (classified under T1190)
    if payload.contains("select") && payload.contains("from") {
        push("T1190");
    }

    // Brute Force
    if behavior.contains("brute") || payload.contains("password") {
        push("T1110");
    }

    // Command and Scripting Interpreter
    if payload.contains("execute") || payload.contains("cmd") || payload.contains("command") {
        push("T1059");
    }

    techniques
}

/// Recommended action per severity level.
pub fn recommendation_for(severity: Severity) -> &'static str {
    match severity {
        Severity::High => "Immediate action required. Isolate affected systems and investigate.",
        Severity::Medium => "Investigate promptly. Implement additional monitoring and controls.",
        Severity::Low => "Monitor the situation. No immediate action required.",
        Severity::Normal => "No action required. Part of normal operations.",
        Severity::Unknown => "Unable to assess severity. Manual investigation recommended.",
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_severity_indicators() {
        let obs = Observation {
            behavior: Some("malware_communication"),
            ..Default::default()
        };
        let verdict = analyze(&obs);
        assert_eq!(verdict.severity, Severity::High);
        assert_eq!(verdict.confidence, HEURISTIC_CONFIDENCE);
    }

    #[test]
    fn test_medium_severity_from_payload() {
        let obs = Observation {
            payload: Some("GET /admin HTTP/1.1"),
            ..Default::default()
        };
        assert_eq!(analyze(&obs).severity, Severity::Medium);
    }

    #[test]
    fn test_low_severity_indicators() {
        let obs = Observation {
            behavior: Some("failed login notice"),
            ..Default::default()
        };
        assert_eq!(analyze(&obs).severity, Severity::Low);
    }

    #[test]
    fn test_normal_when_nothing_matches() {
        let obs = Observation {
            payload: Some("regular traffic"),
            behavior: Some("heartbeat"),
            protocol: Some("TCP"),
        };
        let verdict = analyze(&obs);
        assert_eq!(verdict.severity, Severity::Normal);
        assert!(verdict.techniques.is_empty());
    }

    #[test]
    fn test_high_beats_medium() {
        // "exploit" (high) and "scan" (medium) both present
        let obs = Observation {
            behavior: Some("exploit scan"),
            ..Default::default()
        };
        assert_eq!(analyze(&obs).severity, Severity::High);
    }

    #[test]
    fn test_sql_injection_techniques() {
        let obs = Observation {
            payload: Some("'; SELECT * FROM users; --"),
            ..Default::default()
        };
        let verdict = analyze(&obs);
        assert!(verdict.techniques.contains(&"T1190".to_string()));
    }

    #[test]
    fn test_scan_technique() {
        let obs = Observation {
            behavior: Some("port_scanning"),
            ..Default::default()
        };
        assert!(analyze(&obs).techniques.contains(&"T1046".to_string()));
    }

    #[test]
    fn test_brute_force_technique() {
        let obs = Observation {
            behavior: Some("brute_force"),
            payload: Some("password spray"),
            ..Default::default()
        };
        let verdict = analyze(&obs);
        assert_eq!(verdict.techniques, vec!["T1110".to_string()]);
    }

    #[test]
    fn test_http_admin_and_command_techniques() {
        let obs = Observation {
            protocol: Some("HTTP"),
            payload: Some("admin cmd execution"),
            ..Default::default()
        };
        let verdict = analyze(&obs);
        assert!(verdict.techniques.contains(&"T1190".to_string()));
        assert!(verdict.techniques.contains(&"T1059".to_string()));
    }

    #[test]
    fn test_techniques_deduped() {
        // http+admin and select-from both map to T1190
        let obs = Observation {
            protocol: Some("HTTP"),
            payload: Some("admin' select x from y"),
            ..Default::default()
        };
        let verdict = analyze(&obs);
        let t1190 = verdict.techniques.iter().filter(|t| *t == "T1190").count();
        assert_eq!(t1190, 1);
    }

    #[test]
    fn test_severity_round_trip() {
        for s in ["NORMAL", "LOW", "MEDIUM", "HIGH", "UNKNOWN"] {
            let parsed: Severity = s.parse().unwrap();
            assert_eq!(parsed.as_str(), s);
        }
        // Unknown input maps to Unknown, never errors
        let odd: Severity = "CRITICAL".parse().unwrap();
        assert_eq!(odd, Severity::Unknown);
    }

    #[test]
    fn test_recommendations_cover_all_levels() {
        assert!(recommendation_for(Severity::High).contains("Immediate action"));
        assert!(recommendation_for(Severity::Medium).contains("Investigate promptly"));
        assert!(recommendation_for(Severity::Low).contains("Monitor"));
        assert!(recommendation_for(Severity::Normal).contains("No action"));
        assert!(recommendation_for(Severity::Unknown).contains("Manual investigation"));
    }
}
