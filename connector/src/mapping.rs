//! Snort classification to CyberCare behavior mapping

use once_cell::sync::Lazy;
use regex::Regex;

/// Exact classification text to behavior.
const CLASSIFICATION_MAP: &[(&str, &str)] = &[
    ("Attempted Information Leak", "data_exfiltration"),
    ("Attempted User Privilege Gain", "privilege_escalation"),
    ("Web Application Attack", "web_attack"),
    ("Potential Corporate Privacy Violation", "data_exfiltration"),
    ("Executable Code was Detected", "malware"),
    ("A Network Trojan was Detected", "malware"),
    ("Attempted Denial of Service", "dos"),
    ("Attempted Administrator Privilege Gain", "privilege_escalation"),
    ("Successful Administrator Privilege Gain", "privilege_escalation"),
    ("Successful User Privilege Gain", "privilege_escalation"),
    ("Potentially Bad Traffic", "malware_c2"),
    ("Information Leak", "data_exfiltration"),
    ("Network Scan", "port_scan"),
    ("Suspicious Login", "brute_force"),
    ("Unknown Traffic", "suspicious_traffic"),
    ("Access to a Potentially Vulnerable Web Application", "web_attack"),
    ("Generic Protocol Command Decode", "protocol_violation"),
];

/// Fallback patterns matched case-insensitively against the signature name.
static SIGNATURE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"SQL[_ ]Injection", "sql_injection"),
        (r"XSS|Cross[- ]Site", "xss"),
        (r"Directory[_ ]Traversal", "path_traversal"),
        (r"Port[_ ]Scan", "port_scan"),
        (r"Brute[_ ]Force", "brute_force"),
        (r"DoS|Denial[_ ]of[_ ]Service", "dos"),
        (r"DNS[_ ]Tunnel", "dns_tunneling"),
        (r"Command[_ ]Injection", "command_injection"),
        (r"Data[_ ]Exfiltration", "data_exfiltration"),
        (r"Malware", "malware"),
        (r"C2|Command[_ ]and[_ ]Control", "malware_c2"),
    ]
    .iter()
    .map(|(pat, behavior)| {
        let re = Regex::new(&format!("(?i){}", pat)).unwrap();
        (re, *behavior)
    })
    .collect()
});

/// Map a Snort classification and signature name to a behavior label.
///
/// Classification wins over signature patterns; unmatched alerts are
/// "unknown".
pub fn behavior_for(classification: Option<&str>, signature: Option<&str>) -> &'static str {
    if let Some(class) = classification {
        if let Some((_, behavior)) = CLASSIFICATION_MAP.iter().find(|(c, _)| *c == class) {
            return behavior;
        }
    }

    if let Some(sig) = signature {
        for (re, behavior) in SIGNATURE_PATTERNS.iter() {
            if re.is_match(sig) {
                return behavior;
            }
        }
    }

    "unknown"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_classification() {
        assert_eq!(behavior_for(Some("Web Application Attack"), None), "web_attack");
        assert_eq!(behavior_for(Some("A Network Trojan was Detected"), None), "malware");
        assert_eq!(behavior_for(Some("Attempted Denial of Service"), None), "dos");
        assert_eq!(behavior_for(Some("Generic Protocol Command Decode"), None), "protocol_violation");
    }

    #[test]
    fn test_classification_wins_over_signature() {
        // Classification maps directly, signature pattern would say sql_injection
        assert_eq!(
            behavior_for(Some("Network Scan"), Some("SQL Injection Attempt")),
            "port_scan"
        );
    }

    #[test]
    fn test_signature_pattern_fallback() {
        assert_eq!(behavior_for(None, Some("ET WEB SQL_Injection probe")), "sql_injection");
        assert_eq!(behavior_for(None, Some("cross-site scripting payload")), "xss");
        assert_eq!(behavior_for(None, Some("outbound c2 beacon")), "malware_c2");
        assert_eq!(
            behavior_for(Some("Not A Known Classification"), Some("Brute Force login")),
            "brute_force"
        );
    }

    #[test]
    fn test_pattern_is_case_insensitive() {
        assert_eq!(behavior_for(None, Some("PORT SCAN detected")), "port_scan");
        assert_eq!(behavior_for(None, Some("port_scan detected")), "port_scan");
    }

    #[test]
    fn test_unknown_fallback() {
        assert_eq!(behavior_for(None, None), "unknown");
        assert_eq!(behavior_for(Some("Nonsense"), Some("benign chatter")), "unknown");
    }
}
