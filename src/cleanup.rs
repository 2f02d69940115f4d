use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Duration, Local, NaiveDate};
use tracing::{info, warn};

use crate::errors::Result;

/// Periodically deletes day directories older than the retention horizon.
/// The first sweep runs immediately at startup.
pub fn spawn_retention_task(
    root: PathBuf,
    retention: Duration,
    interval_hours: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let period = std::time::Duration::from_secs(interval_hours.max(1) * 3600);
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            match sweep_expired_days(&root, Local::now().date_naive(), retention) {
                Ok(0) => {}
                Ok(removed) => info!("Retention sweep removed {} day directories", removed),
                Err(e) => warn!("Retention sweep failed: {}", e),
            }
        }
    })
}

/// Removes every `<root>/<Mon-DD-YYYY>` directory dated before
/// `today - retention`. Entries that do not parse as a day are left alone.
pub fn sweep_expired_days(root: &Path, today: NaiveDate, retention: Duration) -> Result<usize> {
    if !root.exists() {
        return Ok(0);
    }
    let horizon = today - retention;
    let mut removed = 0;

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Ok(day) = NaiveDate::parse_from_str(name, "%b-%d-%Y") else {
            continue;
        };
        if day < horizon {
            match fs::remove_dir_all(entry.path()) {
                Ok(()) => {
                    removed += 1;
                    info!("Removed expired recordings for {}", name);
                }
                Err(e) => warn!("Failed to remove {}: {}", entry.path().display(), e),
            }
        }
    }
    Ok(removed)
}
