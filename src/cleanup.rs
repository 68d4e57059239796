use crate::config::Config;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{error, info, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: usize,
    pub bytes_freed: u64,
}

/// Remove staged files older than `max_age` from the assets root.
///
/// Requests remove their own staged file; this only catches files left
/// behind by a crash or a killed task.
pub async fn sweep_staged_files(root: &Path, max_age: Duration) -> anyhow::Result<SweepReport> {
    let now = SystemTime::now();
    let mut report = SweepReport::default();

    if !fs::try_exists(root).await.unwrap_or(false) {
        return Ok(report);
    }

    let mut entries = fs::read_dir(root).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();

        let metadata = match entry.metadata().await {
            Ok(m) => m,
            Err(e) => {
                warn!("[cleanup] Failed to get metadata for {:?}: {}", path, e);
                continue;
            }
        };

        if !metadata.is_file() {
            continue;
        }

        let modified = match metadata.modified() {
            Ok(m) => m,
            Err(e) => {
                warn!("[cleanup] Failed to get modification time for {:?}: {}", path, e);
                continue;
            }
        };

        // Files from the future are left alone.
        let Ok(age) = now.duration_since(modified) else {
            continue;
        };

        if age <= max_age {
            continue;
        }

        match fs::remove_file(&path).await {
            Ok(()) => {
                report.deleted += 1;
                report.bytes_freed += metadata.len();
                info!(
                    "[cleanup] Deleted orphaned staged file: {:?} (age: {:.1} min, size: {:.2} MB)",
                    path,
                    age.as_secs_f64() / 60.0,
                    metadata.len() as f64 / 1024.0 / 1024.0
                );
            }
            Err(e) => {
                error!("[cleanup] Failed to delete file {:?}: {}", path, e);
            }
        }
    }

    Ok(report)
}

/// Start a background task that periodically sweeps the assets root.
pub fn start_cleanup_task(config: Arc<Config>) -> tokio::task::JoinHandle<()> {
    let max_age = Duration::from_secs(config.limits.staged_max_age_seconds);
    let cleanup_interval = Duration::from_secs(config.limits.cleanup_interval_seconds.max(1));

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            "[cleanup] Starting periodic sweep (interval: {:.1} min, max age: {:.1} min)",
            cleanup_interval.as_secs_f64() / 60.0,
            max_age.as_secs_f64() / 60.0
        );

        loop {
            interval.tick().await;

            match sweep_staged_files(&config.assets_root, max_age).await {
                Ok(report) if report.deleted > 0 => info!(
                    "[cleanup] Sweep complete: {} files deleted, {:.2} MB freed",
                    report.deleted,
                    report.bytes_freed as f64 / 1024.0 / 1024.0
                ),
                Ok(_) => {}
                Err(e) => error!("[cleanup] Periodic sweep error: {}", e),
            }
        }
    })
}
