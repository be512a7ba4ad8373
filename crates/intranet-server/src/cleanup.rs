use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use intranet_db::Database;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub otps: usize,
    pub rate_windows: usize,
    pub sessions: usize,
}

impl SweepReport {
    fn total(&self) -> usize {
        self.otps + self.rate_windows + self.sessions
    }
}

/// Background task that prunes dead rows.
///
/// Expired codes and sessions are already refused by the read paths; this
/// only keeps the tables small.
pub async fn run_cleanup_loop(db: Arc<Database>, rate_window_secs: i64, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let db = db.clone();
        let result = tokio::task::spawn_blocking(move || sweep(&db, Utc::now(), rate_window_secs)).await;

        match result {
            Ok(Ok(report)) if report.total() > 0 => info!(
                otps = report.otps,
                rate_windows = report.rate_windows,
                sessions = report.sessions,
                "Cleanup: pruned expired rows"
            ),
            Ok(Ok(_)) => debug!("Cleanup: nothing to prune"),
            Ok(Err(e)) => warn!("Cleanup error: {:#}", e),
            Err(e) => warn!("Cleanup task failed: {}", e),
        }
    }
}

/// Delete OTP rows past expiry, rate-limit windows older than the current
/// one and sessions past expiry.
pub fn sweep(db: &Database, now: DateTime<Utc>, rate_window_secs: i64) -> anyhow::Result<SweepReport> {
    let secs = now.timestamp();
    let current_window = secs - secs.rem_euclid(rate_window_secs.max(1));

    Ok(SweepReport {
        otps: db.delete_expired_otps(secs)?,
        rate_windows: db.delete_stale_rate_windows(current_window)?,
        sessions: db.delete_expired_sessions(secs)?,
    })
}
