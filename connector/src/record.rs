//! Normalized threat records
//!
//! The wire format submitted to the CyberCare API, plus the content-derived
//! id that makes spool writes idempotent across log re-reads.

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::alert::SnortAlert;
use crate::mapping;

/// One normalized threat, as stored in the spool and posted to the API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThreatRecord {
    #[serde(skip_serializing, default)]
    pub id: String,
    pub source_ip: String,
    pub destination_ip: String,
    pub protocol: Option<String>,
    pub behavior: String,
    pub timestamp: Option<String>,
    pub additional_data: serde_json::Value,
}

impl ThreatRecord {
    /// Build a record from a parsed alert. Returns `None` when either
    /// endpoint is missing; such alerts are skipped at ingestion.
    pub fn from_alert(alert: &SnortAlert) -> Option<Self> {
        if !alert.has_endpoints() {
            return None;
        }

        let source_ip = alert.source_ip.clone()?;
        let destination_ip = alert.dest_ip.clone()?;

        let behavior = mapping::behavior_for(
            alert.classification.as_deref(),
            alert.signature.as_deref(),
        ).to_string();

        let additional_data = json!({
            "snort_signature_id": alert.signature_id,
            "snort_signature_name": alert.signature,
            "snort_classification": alert.classification,
            "snort_priority": alert.priority,
            "source_port": alert.source_port,
            "destination_port": alert.dest_port,
        });

        let mut record = ThreatRecord {
            id: String::new(),
            source_ip,
            destination_ip,
            protocol: alert.protocol.clone(),
            behavior,
            timestamp: alert.timestamp.clone(),
            additional_data,
        };
        record.id = record.derive_id();

        Some(record)
    }

    /// Content-derived id: the same alert text always yields the same id,
    /// so INSERT OR REPLACE in the spool dedupes replays.
    fn derive_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source_ip.as_bytes());
        hasher.update(self.destination_ip.as_bytes());
        hasher.update(self.behavior.as_bytes());
        if let Some(ts) = &self.timestamp {
            hasher.update(ts.as_bytes());
        }
        hasher.update(self.additional_data.to_string().as_bytes());
        format!("threat_{}", &hex::encode(hasher.finalize())[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::SnortAlert;

    const BLOCK: &str = "\
[**] [1:1000001:2] SQL Injection Attempt [**]
[Classification: Web Application Attack] [Priority: 1]
04/15-22:31:07.142857 203.0.113.9:51812 -> 10.0.0.5:80";

    #[test]
    fn test_from_alert() {
        let alert = SnortAlert::parse(BLOCK);
        let record = ThreatRecord::from_alert(&alert).unwrap();
        assert_eq!(record.source_ip, "203.0.113.9");
        assert_eq!(record.destination_ip, "10.0.0.5");
        assert_eq!(record.behavior, "web_attack");
        assert_eq!(record.protocol.as_deref(), Some("HTTP"));
        assert_eq!(record.additional_data["snort_priority"], 1);
        assert_eq!(record.additional_data["destination_port"], 80);
        assert!(record.id.starts_with("threat_"));
    }

    #[test]
    fn test_missing_endpoints_skipped() {
        let alert = SnortAlert::parse("[**] [1:1:1] No Addresses [**]");
        assert!(ThreatRecord::from_alert(&alert).is_none());
    }

    #[test]
    fn test_id_is_stable() {
        let a = ThreatRecord::from_alert(&SnortAlert::parse(BLOCK)).unwrap();
        let b = ThreatRecord::from_alert(&SnortAlert::parse(BLOCK)).unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_id_differs_for_different_alerts() {
        let other = BLOCK.replace("203.0.113.9", "198.51.100.1");
        let a = ThreatRecord::from_alert(&SnortAlert::parse(BLOCK)).unwrap();
        let b = ThreatRecord::from_alert(&SnortAlert::parse(&other)).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_id_not_serialized_to_wire() {
        let record = ThreatRecord::from_alert(&SnortAlert::parse(BLOCK)).unwrap();
        let wire = serde_json::to_value(&record).unwrap();
        assert!(wire.get("id").is_none());
        assert_eq!(wire["source_ip"], "203.0.113.9");
    }
}
