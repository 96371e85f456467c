//! Durable alert spool (SQLite)
//!
//! Every parsed alert is written here before any submission attempt, and a
//! record is only marked submitted after the API confirms it. A crash
//! anywhere between store and submit therefore loses nothing: pending rows
//! are drained on the next startup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};

use crate::record::ThreatRecord;

#[derive(Debug, thiserror::Error)]
pub enum SpoolError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type SpoolResult<T> = Result<T, SpoolError>;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS threats (
    id TEXT PRIMARY KEY,
    source_ip TEXT NOT NULL,
    destination_ip TEXT,
    protocol TEXT,
    behavior TEXT,
    event_time TEXT,
    created_at TEXT NOT NULL,
    submitted INTEGER DEFAULT 0,
    submitted_at TEXT,
    api_response TEXT,
    additional_data TEXT
);

CREATE TABLE IF NOT EXISTS submission_attempts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    threat_id TEXT NOT NULL,
    attempt_time TEXT NOT NULL,
    success INTEGER NOT NULL,
    error_message TEXT,
    FOREIGN KEY (threat_id) REFERENCES threats (id)
);

CREATE INDEX IF NOT EXISTS idx_source_ip ON threats (source_ip);
CREATE INDEX IF NOT EXISTS idx_behavior ON threats (behavior);
CREATE INDEX IF NOT EXISTS idx_submitted ON threats (submitted);
";

/// Spool statistics as reported by the `stats` command.
#[derive(Debug)]
pub struct SpoolStats {
    pub total_threats: i64,
    pub submitted_threats: i64,
    pub pending_threats: i64,
    pub behavior_counts: BTreeMap<String, i64>,
    pub attempts_24h_success: i64,
    pub attempts_24h_failure: i64,
    pub db_path: PathBuf,
}

pub struct Spool {
    conn: Connection,
    path: PathBuf,
}

impl Spool {
    /// Open (or create) the spool database and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> SpoolResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).ok();
            }
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch(SCHEMA_SQL)?;

        log::info!("Spool initialized at {:?}", path);
        Ok(Self { conn, path })
    }

    /// Store one threat. Duplicate ids are ignored, so re-processing the
    /// same log region is idempotent and never disturbs submission state.
    pub fn store(&self, record: &ThreatRecord) -> SpoolResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO threats
             (id, source_ip, destination_ip, protocol, behavior, event_time,
              created_at, additional_data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.id,
                record.source_ip,
                record.destination_ip,
                record.protocol,
                record.behavior,
                record.timestamp,
                chrono::Utc::now().to_rfc3339(),
                record.additional_data.to_string(),
            ],
        )?;
        log::debug!("Stored threat {} from {} in spool", record.id, record.source_ip);
        Ok(())
    }

    /// Store a batch of threats in a single transaction.
    pub fn store_batch(&mut self, records: &[ThreatRecord]) -> SpoolResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO threats
                 (id, source_ip, destination_ip, protocol, behavior, event_time,
                  created_at, additional_data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            let now = chrono::Utc::now().to_rfc3339();
            for record in records {
                stmt.execute(params![
                    record.id,
                    record.source_ip,
                    record.destination_ip,
                    record.protocol,
                    record.behavior,
                    record.timestamp,
                    now,
                    record.additional_data.to_string(),
                ])?;
            }
        }
        tx.commit()?;

        log::info!("Stored batch of {} threats in spool", records.len());
        Ok(())
    }

    /// Record a submission outcome. Success flips the submitted flag and
    /// keeps the API response; every outcome appends an attempt row.
    pub fn mark_submitted(
        &self,
        threat_id: &str,
        success: bool,
        api_response: Option<&serde_json::Value>,
        error_message: Option<&str>,
    ) -> SpoolResult<()> {
        let now = chrono::Utc::now().to_rfc3339();

        if success {
            self.conn.execute(
                "UPDATE threats
                 SET submitted = 1, submitted_at = ?1, api_response = ?2
                 WHERE id = ?3",
                params![now, api_response.map(|v| v.to_string()), threat_id],
            )?;
        }

        self.conn.execute(
            "INSERT INTO submission_attempts (threat_id, attempt_time, success, error_message)
             VALUES (?1, ?2, ?3, ?4)",
            params![threat_id, now, success as i64, error_message],
        )?;

        Ok(())
    }

    /// Pending threats, oldest first.
    pub fn unsent(&self, limit: i64) -> SpoolResult<Vec<ThreatRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source_ip, destination_ip, protocol, behavior, event_time, additional_data
             FROM threats
             WHERE submitted = 0
             ORDER BY created_at ASC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], row_to_record)?;
        collect_records(rows)
    }

    /// Pending threats still under the retry budget, oldest first.
    pub fn retryable(&self, limit: i64, retry_limit: u32) -> SpoolResult<Vec<ThreatRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.id, t.source_ip, t.destination_ip, t.protocol, t.behavior,
                    t.event_time, t.additional_data
             FROM threats t
             WHERE t.submitted = 0
               AND (SELECT COUNT(*) FROM submission_attempts a
                    WHERE a.threat_id = t.id AND a.success = 0) < ?2
             ORDER BY t.created_at ASC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit, retry_limit], row_to_record)?;
        collect_records(rows)
    }

    /// Recently stored threats, newest first.
    pub fn recent(&self, limit: i64) -> SpoolResult<Vec<ThreatRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source_ip, destination_ip, protocol, behavior, event_time, additional_data
             FROM threats
             ORDER BY created_at DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit], row_to_record)?;
        collect_records(rows)
    }

    /// Whether a given threat has been submitted.
    #[cfg(test)]
    pub fn is_submitted(&self, threat_id: &str) -> SpoolResult<bool> {
        use rusqlite::OptionalExtension;

        let submitted: Option<i64> = self.conn
            .query_row(
                "SELECT submitted FROM threats WHERE id = ?1",
                params![threat_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(submitted == Some(1))
    }

    /// Spool statistics.
    pub fn stats(&self) -> SpoolResult<SpoolStats> {
        let total_threats: i64 =
            self.conn.query_row("SELECT COUNT(*) FROM threats", [], |r| r.get(0))?;
        let submitted_threats: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM threats WHERE submitted = 1",
            [],
            |r| r.get(0),
        )?;

        let mut behavior_counts = BTreeMap::new();
        let mut stmt = self.conn.prepare(
            "SELECT COALESCE(behavior, 'unknown'), COUNT(*)
             FROM threats GROUP BY behavior ORDER BY COUNT(*) DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (behavior, count) = row?;
            behavior_counts.insert(behavior, count);
        }

        let mut attempts_24h_success = 0i64;
        let mut attempts_24h_failure = 0i64;
        let mut stmt = self.conn.prepare(
            "SELECT success, COUNT(*) FROM submission_attempts
             WHERE attempt_time > datetime('now', '-24 hours')
             GROUP BY success",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (success, count) = row?;
            if success != 0 {
                attempts_24h_success = count;
            } else {
                attempts_24h_failure = count;
            }
        }

        Ok(SpoolStats {
            total_threats,
            submitted_threats,
            pending_threats: total_threats - submitted_threats,
            behavior_counts,
            attempts_24h_success,
            attempts_24h_failure,
            db_path: self.path.clone(),
        })
    }

    /// Remove threats older than `days` and their orphaned attempts.
    pub fn cleanup_older_than(&self, days: u32) -> SpoolResult<usize> {
        let cutoff = format!("-{} days", days);
        let removed = self.conn.execute(
            "DELETE FROM threats WHERE created_at < datetime('now', ?1)",
            params![cutoff],
        )?;
        self.conn.execute(
            "DELETE FROM submission_attempts
             WHERE threat_id NOT IN (SELECT id FROM threats)",
            [],
        )?;

        log::info!("Cleaned up {} threats older than {} days", removed, days);
        Ok(removed)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<(ThreatRecord, String)> {
    let additional_raw: Option<String> = row.get(6)?;
    Ok((
        ThreatRecord {
            id: row.get(0)?,
            source_ip: row.get(1)?,
            destination_ip: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            protocol: row.get(3)?,
            behavior: row.get::<_, Option<String>>(4)?.unwrap_or_else(|| "unknown".to_string()),
            timestamp: row.get(5)?,
            additional_data: serde_json::Value::Null,
        },
        additional_raw.unwrap_or_else(|| "{}".to_string()),
    ))
}

fn collect_records(
    rows: impl Iterator<Item = rusqlite::Result<(ThreatRecord, String)>>,
) -> SpoolResult<Vec<ThreatRecord>> {
    let mut records = Vec::new();
    for row in rows {
        let (mut record, additional_raw) = row?;
        record.additional_data =
            serde_json::from_str(&additional_raw).unwrap_or(serde_json::Value::Null);
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::SnortAlert;

    fn sample_record(source_ip: &str) -> ThreatRecord {
        let block = format!(
            "[**] [1:1000001:2] SQL Injection Attempt [**]\n\
             [Classification: Web Application Attack] [Priority: 1]\n\
             04/15-22:31:07.142857 {}:51812 -> 10.0.0.5:80",
            source_ip
        );
        ThreatRecord::from_alert(&SnortAlert::parse(&block)).unwrap()
    }

    fn temp_spool() -> (tempfile::TempDir, Spool) {
        let dir = tempfile::tempdir().unwrap();
        let spool = Spool::open(dir.path().join("threats.db")).unwrap();
        (dir, spool)
    }

    #[test]
    fn test_store_and_unsent() {
        let (_dir, spool) = temp_spool();
        let record = sample_record("203.0.113.9");
        spool.store(&record).unwrap();

        let unsent = spool.unsent(50).unwrap();
        assert_eq!(unsent.len(), 1);
        assert_eq!(unsent[0].id, record.id);
        assert_eq!(unsent[0].behavior, "web_attack");
        assert_eq!(unsent[0].additional_data["snort_priority"], 1);
    }

    #[test]
    fn test_store_dedupes_on_id() {
        let (_dir, spool) = temp_spool();
        let record = sample_record("203.0.113.9");
        spool.store(&record).unwrap();
        spool.store(&record).unwrap();

        assert_eq!(spool.stats().unwrap().total_threats, 1);
    }

    #[test]
    fn test_replayed_store_keeps_submitted_state() {
        // After a log truncation the tail re-reads the whole file and the
        // same alert text derives the same id; re-storing it must not flip
        // an already-submitted record back to pending.
        let (_dir, spool) = temp_spool();
        let record = sample_record("203.0.113.9");
        spool.store(&record).unwrap();
        spool.mark_submitted(&record.id, true, None, None).unwrap();

        spool.store(&record).unwrap();

        assert!(spool.is_submitted(&record.id).unwrap());
        assert!(spool.unsent(50).unwrap().is_empty());
        assert_eq!(spool.stats().unwrap().total_threats, 1);
    }

    #[test]
    fn test_replayed_batch_keeps_submitted_state() {
        let (_dir, mut spool) = temp_spool();
        let records: Vec<_> = ["203.0.113.1", "203.0.113.2"]
            .iter()
            .map(|ip| sample_record(ip))
            .collect();
        spool.store_batch(&records).unwrap();
        spool.mark_submitted(&records[0].id, true, None, None).unwrap();

        spool.store_batch(&records).unwrap();

        assert!(spool.is_submitted(&records[0].id).unwrap());
        assert_eq!(spool.unsent(50).unwrap().len(), 1);
        assert_eq!(spool.stats().unwrap().total_threats, 2);
    }

    #[test]
    fn test_store_batch_transaction() {
        let (_dir, mut spool) = temp_spool();
        let records: Vec<_> = ["203.0.113.1", "203.0.113.2", "203.0.113.3"]
            .iter()
            .map(|ip| sample_record(ip))
            .collect();
        spool.store_batch(&records).unwrap();

        assert_eq!(spool.stats().unwrap().total_threats, 3);
        assert_eq!(spool.unsent(50).unwrap().len(), 3);
    }

    #[test]
    fn test_mark_submitted_success() {
        let (_dir, spool) = temp_spool();
        let record = sample_record("203.0.113.9");
        spool.store(&record).unwrap();

        let response = serde_json::json!({ "severity": "HIGH" });
        spool.mark_submitted(&record.id, true, Some(&response), None).unwrap();

        assert!(spool.is_submitted(&record.id).unwrap());
        assert!(spool.unsent(50).unwrap().is_empty());

        let stats = spool.stats().unwrap();
        assert_eq!(stats.submitted_threats, 1);
        assert_eq!(stats.pending_threats, 0);
        assert_eq!(stats.attempts_24h_success, 1);
    }

    #[test]
    fn test_mark_submitted_failure_keeps_pending() {
        let (_dir, spool) = temp_spool();
        let record = sample_record("203.0.113.9");
        spool.store(&record).unwrap();

        spool.mark_submitted(&record.id, false, None, Some("HTTP 503")).unwrap();

        assert!(!spool.is_submitted(&record.id).unwrap());
        assert_eq!(spool.unsent(50).unwrap().len(), 1);
        assert_eq!(spool.stats().unwrap().attempts_24h_failure, 1);
    }

    #[test]
    fn test_retryable_respects_retry_limit() {
        let (_dir, spool) = temp_spool();
        let record = sample_record("203.0.113.9");
        spool.store(&record).unwrap();

        for _ in 0..3 {
            spool.mark_submitted(&record.id, false, None, Some("connection refused")).unwrap();
        }

        // Exhausted for retry purposes, but never deleted
        assert!(spool.retryable(50, 3).unwrap().is_empty());
        assert_eq!(spool.unsent(50).unwrap().len(), 1);
        assert!(!spool.retryable(50, 4).unwrap().is_empty());
    }

    #[test]
    fn test_behavior_counts() {
        let (_dir, spool) = temp_spool();
        spool.store(&sample_record("203.0.113.1")).unwrap();
        spool.store(&sample_record("203.0.113.2")).unwrap();

        let stats = spool.stats().unwrap();
        assert_eq!(stats.behavior_counts.get("web_attack"), Some(&2));
    }

    #[test]
    fn test_recent_newest_first() {
        let (_dir, spool) = temp_spool();
        spool.store(&sample_record("203.0.113.1")).unwrap();
        spool.store(&sample_record("203.0.113.2")).unwrap();

        let recent = spool.recent(1).unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[test]
    fn test_cleanup_removes_nothing_fresh() {
        let (_dir, spool) = temp_spool();
        spool.store(&sample_record("203.0.113.9")).unwrap();
        assert_eq!(spool.cleanup_older_than(30).unwrap(), 0);
        assert_eq!(spool.stats().unwrap().total_threats, 1);
    }
}
