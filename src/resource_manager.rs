//! Resource management

use crate::error::SalaryStatsError;

use tokio::sync::{Semaphore, SemaphorePermit};

/// [crate::resource_manager::ResourceManager] provides a simple way to allocate various resources
/// to tasks. Resource management is performed using a Tokio Semaphore for each type of resource.
#[derive(Debug)]
pub struct ResourceManager {
    /// Optional semaphore for database connections.
    db_connections: Option<Semaphore>,

    /// Optional semaphore for report tasks.
    tasks: Option<Semaphore>,
}

impl ResourceManager {
    /// Returns a new ResourceManager object.
    pub fn new(connection_limit: Option<usize>, task_limit: Option<usize>) -> Self {
        Self {
            db_connections: connection_limit.map(Semaphore::new),
            tasks: task_limit.map(Semaphore::new),
        }
    }

    /// Acquire a database connection resource.
    pub async fn db_connection(&self) -> Result<Option<SemaphorePermit>, SalaryStatsError> {
        optional_acquire(&self.db_connections, 1).await
    }

    /// Acquire a task resource.
    pub async fn task(&self) -> Result<Option<SemaphorePermit>, SalaryStatsError> {
        optional_acquire(&self.tasks, 1).await
    }
}

/// Acquire permits on an optional Semaphore, if present.
async fn optional_acquire(
    sem: &Option<Semaphore>,
    n: usize,
) -> Result<Option<SemaphorePermit>, SalaryStatsError> {
    let n = n.try_into()?;
    if let Some(sem) = sem {
        sem.acquire_many(n)
            .await
            .map(Some)
            .map_err(|err| err.into())
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::sync::TryAcquireError;

    #[tokio::test]
    async fn no_resource_management() {
        let rm = ResourceManager::new(None, None);
        assert!(rm.db_connections.is_none());
        assert!(rm.tasks.is_none());
        let _c = rm.db_connection().await.unwrap();
        let _t = rm.task().await.unwrap();
        assert!(_c.is_none());
        assert!(_t.is_none());
    }

    #[tokio::test]
    async fn full_resource_management() {
        let rm = ResourceManager::new(Some(1), Some(1));
        assert!(rm.db_connections.is_some());
        assert!(rm.tasks.is_some());
        let _c = rm.db_connection().await.unwrap();
        let _t = rm.task().await.unwrap();
        assert!(_c.is_some());
        assert!(_t.is_some());
        // Check that there are no more resources (without blocking).
        assert_eq!(
            rm.db_connections.as_ref().unwrap().try_acquire().err(),
            Some(TryAcquireError::NoPermits)
        );
        assert_eq!(
            rm.tasks.as_ref().unwrap().try_acquire().err(),
            Some(TryAcquireError::NoPermits)
        );
    }

    #[tokio::test]
    async fn permits_released_on_drop() {
        let rm = ResourceManager::new(Some(1), None);
        {
            let _c = rm.db_connection().await.unwrap();
        }
        assert!(rm.db_connections.as_ref().unwrap().try_acquire().is_ok());
    }
}
