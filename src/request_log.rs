//! C10: best-effort per-request audit log.
//!
//! One JSON file per request under `log_dir`, appended to as the request passes
//! through named phases. Write failures are logged at `warn` and otherwise ignored:
//! the audit trail must never be a reason a client-visible call fails.

use std::path::{Path, PathBuf};

use rand::Rng;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PhaseEntry {
    pub phase: &'static str,
    pub time_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Accumulates phase entries for a single request; write it out with [`Self::flush`]
/// once the request completes (successfully or not).
#[derive(Debug, Clone, Serialize)]
pub struct RequestAuditRecord {
    #[serde(rename = "requestId")]
    pub request_id: String,
    /// RFC 3339, e.g. `2026-08-01T12:00:00Z`. `timestamp_ms` below carries the same
    /// instant as milliseconds for the log filename, which stays millisecond-based
    /// for sortability without needing a colon-free timestamp scheme of its own.
    pub timestamp: String,
    #[serde(skip)]
    timestamp_ms: i64,
    pub phases: Vec<PhaseEntry>,
}

impl RequestAuditRecord {
    pub fn new(request_id: String, timestamp_ms: i64) -> Self {
        Self {
            request_id,
            timestamp: format_rfc3339(timestamp_ms),
            timestamp_ms,
            phases: Vec::new(),
        }
    }

    pub fn record(&mut self, phase: &'static str, time_ms: i64, content: Option<String>) {
        self.phases.push(PhaseEntry { phase, time_ms, content });
    }

    /// Serialize this record to `<log_dir>/req_<ms>_<rand>.json`. Errors are the
    /// caller's to log at `warn`; this never panics on a write failure.
    pub async fn flush(&self, log_dir: &Path) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(log_dir).await?;

        let suffix: u32 = rand::rng().random();
        let path: PathBuf = log_dir.join(format!("req_{}_{:08x}.json", self.timestamp_ms, suffix));

        let body = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(&path, body).await?;

        Ok(())
    }
}

fn format_rfc3339(timestamp_ms: i64) -> String {
    jiff::Timestamp::from_millisecond(timestamp_ms)
        .map(|ts| ts.to_string())
        .unwrap_or_else(|_| jiff::Timestamp::UNIX_EPOCH.to_string())
}
