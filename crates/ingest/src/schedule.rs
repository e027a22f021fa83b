//! Periodic update scheduling.

use std::future::Future;
use std::str::FromStr;
use std::time::SystemTime;

use chrono::Utc;
use cron::Schedule;

use crate::error::IngestError;

/// An hourly schedule on a process-specific minute, spreading replica
/// update checks so they do not all hit the data host at once.
pub fn random_minute_hourly() -> String {
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!("{} * * * *", nanos % 60)
}

/// Parse a crontab expression, accepting the classic five-field form.
pub fn parse_crontab(crontab: &str) -> Result<Schedule, IngestError> {
    let fields = crontab.split_whitespace().count();
    let normalized = if fields == 5 {
        format!("0 {crontab}")
    } else {
        crontab.to_string()
    };
    Schedule::from_str(&normalized)
        .map_err(|err| IngestError::Manifest(format!("invalid crontab {crontab:?}: {err}")))
}

/// Run `task` on every tick of the crontab until the returned handle is
/// aborted.
pub fn spawn_cron<T, F>(crontab: &str, task: T) -> Result<tokio::task::JoinHandle<()>, IngestError>
where
    T: Fn() -> F + Send + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    let schedule = parse_crontab(crontab)?;
    let crontab = crontab.to_string();
    Ok(tokio::spawn(async move {
        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                tracing::warn!(crontab = crontab.as_str(), "schedule has no upcoming runs");
                return;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;
            tracing::info!(crontab = crontab.as_str(), "scheduled update run");
            task().await;
        }
    }))
}
