//! Connector run loop
//!
//! Drives the log tail from two directions: filesystem notifications on the
//! log's parent directory and a fixed poll interval. Notifications give low
//! latency when the platform delivers them; the poll sweep guarantees
//! progress when it does not (network mounts, editors that rewrite files).
//!
//! Alerts are always spooled before submission, and a separate retry sweep
//! re-submits pending records until the retry budget is exhausted.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::alert::SnortAlert;
use crate::client::{ApiClient, ApiError};
use crate::record::ThreatRecord;
use crate::spool::Spool;
use crate::tail::LogTail;

/// Maximum records pulled per retry sweep.
const RETRY_SWEEP_LIMIT: i64 = 100;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub log_path: PathBuf,
    pub poll_interval: u64,
    pub batch: bool,
    pub batch_size: usize,
    pub retry_interval: u64,
    pub retry_limit: u32,
    pub once: bool,
}

pub struct Runner {
    options: RunOptions,
    tail: LogTail,
    spool: Spool,
    client: ApiClient,
}

impl Runner {
    pub fn new(options: RunOptions, spool: Spool, client: ApiClient) -> Self {
        let tail = LogTail::new(options.log_path.clone());
        Self { options, tail, spool, client }
    }

    pub async fn run(mut self) -> Result<()> {
        log::info!(
            "Monitoring {:?} (poll every {}s, batch={}, retry every {}s up to {} attempts)",
            self.options.log_path,
            self.options.poll_interval,
            self.options.batch,
            self.options.retry_interval,
            self.options.retry_limit,
        );

        // Anything left over from a previous run goes out first.
        self.drain_pending().await;
        self.process_new_alerts().await?;

        if self.options.once {
            log::info!("Single pass complete, exiting");
            return Ok(());
        }

        let (tx, mut rx) = mpsc::channel::<()>(16);
        let _watcher = self.try_spawn_watcher(tx);

        let mut poll = tokio::time::interval(Duration::from_secs(self.options.poll_interval));
        let mut retry = tokio::time::interval(Duration::from_secs(self.options.retry_interval));
        // First ticks fire immediately; skip them, startup already drained.
        poll.tick().await;
        retry.tick().await;

        loop {
            tokio::select! {
                Some(_) = rx.recv() => {
                    // Coalesce bursts of change events into one read.
                    while rx.try_recv().is_ok() {}
                    if let Err(e) = self.process_new_alerts().await {
                        log::error!("Failed to process log changes: {:#}", e);
                    }
                }
                _ = poll.tick() => {
                    if let Err(e) = self.process_new_alerts().await {
                        log::error!("Failed to process log changes: {:#}", e);
                    }
                }
                _ = retry.tick() => {
                    self.retry_pending().await;
                }
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Best effort file watching. When the watch cannot be established
    /// (missing log directory, unsupported filesystem) the poll sweeps
    /// carry the load alone.
    fn try_spawn_watcher(&self, tx: mpsc::Sender<()>) -> Option<RecommendedWatcher> {
        match self.spawn_watcher(tx) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                log::warn!("File watching unavailable, relying on poll sweeps: {:#}", e);
                None
            }
        }
    }

    /// Watch the log's parent directory. Watching the file itself breaks
    /// when log rotation replaces the inode.
    fn spawn_watcher(&self, tx: mpsc::Sender<()>) -> Result<RecommendedWatcher> {
        let log_name = self.options.log_path.file_name().map(|n| n.to_os_string());
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
            if let Ok(event) = result {
                let relevant = match &log_name {
                    Some(name) => event.paths.iter().any(|p| p.file_name() == Some(name.as_os_str())),
                    None => true,
                };
                if relevant {
                    let _ = tx.try_send(());
                }
            }
        })?;

        let watch_dir = self.options.log_path.parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        watcher.watch(watch_dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {:?}", watch_dir))?;

        Ok(watcher)
    }

    async fn process_new_alerts(&mut self) -> Result<()> {
        let blocks = self.tail.read_new_blocks()
            .with_context(|| format!("failed to read {:?}", self.options.log_path))?;
        if blocks.is_empty() {
            return Ok(());
        }

        let mut records: Vec<ThreatRecord> = Vec::with_capacity(blocks.len());
        for block in &blocks {
            let alert = SnortAlert::parse(block);
            match ThreatRecord::from_alert(&alert) {
                Some(record) => records.push(record),
                None => log::debug!("Skipping alert without endpoints: {:?}", alert.raw),
            }
        }
        if records.is_empty() {
            return Ok(());
        }

        log::info!("Parsed {} new alerts from log", records.len());

        // The tail offset has already advanced, so a spool failure on one
        // record must not abort the rest of the sweep.
        if self.options.batch {
            for chunk in records.chunks(self.options.batch_size) {
                if let Err(e) = self.spool.store_batch(chunk) {
                    log::error!("Failed to spool batch of {} alerts: {}", chunk.len(), e);
                    continue;
                }
                self.submit_batch(chunk).await;
            }
        } else {
            for record in &records {
                if let Err(e) = self.spool.store(record) {
                    log::error!("Failed to spool alert {}: {}", record.id, e);
                    continue;
                }
                self.submit_one(record).await;
            }
        }

        Ok(())
    }

    async fn submit_one(&self, record: &ThreatRecord) -> bool {
        match self.client.submit(record).await {
            Ok(response) => {
                let body = serde_json::json!({
                    "id": response.id,
                    "severity": response.severity,
                    "confidence": response.confidence,
                    "techniques": response.techniques,
                    "recommendation": response.recommendation,
                });
                if let Err(e) = self.spool.mark_submitted(&record.id, true, Some(&body), None) {
                    log::error!("Failed to record submission for {}: {}", record.id, e);
                }
                log::info!(
                    "Submitted {} ({} from {}): severity {}",
                    record.id, record.behavior, record.source_ip, response.severity
                );
                true
            }
            Err(e) => {
                self.record_failure(&record.id, &e);
                false
            }
        }
    }

    async fn submit_batch(&self, records: &[ThreatRecord]) -> bool {
        match self.client.submit_batch(records).await {
            Ok(response) => {
                let body = serde_json::json!({
                    "job_id": response.job_id,
                    "status_endpoint": response.status_endpoint,
                });
                for record in records {
                    if let Err(e) = self.spool.mark_submitted(&record.id, true, Some(&body), None) {
                        log::error!("Failed to record submission for {}: {}", record.id, e);
                    }
                }
                log::info!(
                    "Submitted batch of {} as job {}: {}",
                    records.len(), response.job_id, response.message
                );
                true
            }
            Err(e) => {
                log::warn!("Batch submission of {} alerts failed: {}", records.len(), e);
                for record in records {
                    self.record_failure(&record.id, &e);
                }
                false
            }
        }
    }

    fn record_failure(&self, threat_id: &str, error: &ApiError) {
        log::warn!("Submission of {} failed: {}", threat_id, error);
        if let Err(e) = self.spool.mark_submitted(threat_id, false, None, Some(&error.to_string())) {
            log::error!("Failed to record attempt for {}: {}", threat_id, e);
        }
    }

    /// Submit everything still pending, ignoring the retry budget. Used at
    /// startup so records stranded by a crash go out immediately.
    async fn drain_pending(&mut self) {
        let pending = match self.spool.unsent(RETRY_SWEEP_LIMIT) {
            Ok(pending) => pending,
            Err(e) => {
                log::error!("Failed to read pending threats: {}", e);
                return;
            }
        };
        if pending.is_empty() {
            return;
        }

        log::info!("Draining {} pending threats from spool", pending.len());
        self.submit_records(&pending).await;
    }

    /// Periodic sweep over pending records still under the retry budget.
    async fn retry_pending(&mut self) {
        let pending = match self.spool.retryable(RETRY_SWEEP_LIMIT, self.options.retry_limit) {
            Ok(pending) => pending,
            Err(e) => {
                log::error!("Failed to read retryable threats: {}", e);
                return;
            }
        };
        if pending.is_empty() {
            return;
        }

        log::info!("Retrying {} pending threats", pending.len());

        // Consecutive failures inside a sweep back off exponentially so a
        // down server is not hammered once per record.
        let mut backoff = Duration::from_secs(1);
        let max_backoff = Duration::from_secs(30);

        if self.options.batch {
            for chunk in pending.chunks(self.options.batch_size) {
                if !self.submit_batch(chunk).await {
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(max_backoff);
                } else {
                    backoff = Duration::from_secs(1);
                }
            }
        } else {
            for record in &pending {
                if !self.submit_one(record).await {
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(max_backoff);
                } else {
                    backoff = Duration::from_secs(1);
                }
            }
        }
    }

    async fn submit_records(&self, records: &[ThreatRecord]) {
        if self.options.batch {
            for chunk in records.chunks(self.options.batch_size) {
                self.submit_batch(chunk).await;
            }
        } else {
            for record in records {
                self.submit_one(record).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiConfig;
    use std::io::Write;

    const ALERT_BLOCK: &str = "\
[**] [1:1000001:2] SQL Injection Attempt [**]
[Classification: Web Application Attack] [Priority: 1]
04/15-22:31:07.142857 203.0.113.9:51812 -> 10.0.0.5:80
";

    fn test_runner(log_path: PathBuf, db_path: PathBuf) -> Runner {
        let options = RunOptions {
            log_path,
            poll_interval: 10,
            batch: false,
            batch_size: 10,
            retry_interval: 60,
            retry_limit: 3,
            once: true,
        };
        let spool = Spool::open(db_path).unwrap();
        // Nothing listens on this port; submissions fail fast.
        let client = ApiClient::new(ApiConfig::new("http://127.0.0.1:9/api/v1/threats/analyze"))
            .unwrap();
        Runner::new(options, spool, client)
    }

    #[tokio::test]
    async fn test_spool_failure_does_not_abort_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("alert");
        let db_path = dir.path().join("threats.db");

        let mut f = std::fs::File::create(&log_path).unwrap();
        f.write_all(ALERT_BLOCK.as_bytes()).unwrap();

        let mut runner = test_runner(log_path.clone(), db_path.clone());

        // Break the spool underneath the runner; stores now fail, but the
        // sweep must still complete without an error.
        let conn = rusqlite::Connection::open(&db_path).unwrap();
        conn.execute("DROP TABLE threats", []).unwrap();

        assert!(runner.process_new_alerts().await.is_ok());

        // The cursor advanced past the broken sweep, so later appends are
        // still picked up.
        let mut f = std::fs::OpenOptions::new().append(true).open(&log_path).unwrap();
        f.write_all(b"\n").unwrap();
        f.write_all(ALERT_BLOCK.as_bytes()).unwrap();
        assert!(runner.process_new_alerts().await.is_ok());
    }

    #[tokio::test]
    async fn test_watcher_falls_back_when_directory_missing() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("threats.db");
        let log_path = dir.path().join("no-such-dir").join("alert");

        let runner = test_runner(log_path, db_path);
        let (tx, _rx) = mpsc::channel::<()>(16);
        assert!(runner.try_spawn_watcher(tx).is_none());
    }

    #[tokio::test]
    async fn test_watcher_attaches_to_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("threats.db");
        let log_path = dir.path().join("alert");

        let runner = test_runner(log_path, db_path);
        let (tx, _rx) = mpsc::channel::<()>(16);
        assert!(runner.try_spawn_watcher(tx).is_some());
    }
}
