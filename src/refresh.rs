//! Periodic background rebuild of role aggregates.

use crate::error::SalaryStatsError;
use crate::reports;
use crate::store::SalaryStore;

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{event, Level};

/// Rebuild every aggregate in the database at `database_path`.
///
/// Returns the number of roles rebuilt.
pub fn rebuild_database(database_path: &Path) -> Result<usize, SalaryStatsError> {
    let store = SalaryStore::open(database_path)?;
    reports::rebuild_all(&store)
}

/// Spawn a task that rebuilds every aggregate once per `period`.
///
/// The first rebuild happens one period after the task starts. Failures are logged and the next
/// rebuild is attempted on schedule. The task runs until aborted.
///
/// # Arguments
///
/// * `database_path`: Path to the SQLite database
/// * `period`: Time between rebuilds
pub fn spawn_refresher(database_path: PathBuf, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        event!(
            Level::INFO,
            "refreshing aggregates every {} seconds",
            period.as_secs()
        );
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let path = database_path.clone();
            match tokio::task::spawn_blocking(move || rebuild_database(&path)).await {
                Ok(Ok(count)) => event!(Level::DEBUG, "refreshed {} aggregates", count),
                Ok(Err(err)) => event!(Level::WARN, "aggregate refresh failed: {}", err),
                Err(err) => event!(Level::WARN, "aggregate refresh task failed: {}", err),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils;

    #[test]
    fn rebuild_database_counts_roles() {
        let (dir, _store) = test_utils::seeded_store();
        let path = dir.path().join("salaries.sqlite3");
        assert_eq!(2, rebuild_database(&path).unwrap());
    }

    #[test]
    fn rebuild_database_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = rebuild_database(&dir.path().join("missing.sqlite3")).unwrap_err();
        assert!(matches!(err, SalaryStatsError::DataUnavailable(_)));
    }

    #[tokio::test]
    async fn refresher_rebuilds_periodically() {
        let (dir, store) = test_utils::seeded_store();
        let path = dir.path().join("salaries.sqlite3");
        let handle = spawn_refresher(path, Duration::from_millis(10));
        let mut rebuilt = false;
        for _ in 0..200 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if store.aggregate_roles().unwrap().len() == 2 {
                rebuilt = true;
                break;
            }
        }
        handle.abort();
        assert!(rebuilt);
    }
}
