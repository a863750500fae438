//! Process-wide limit on concurrent browser renders

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::FetchError;

/// Bounds how many browser renders run at once across all jobs
///
/// Acquiring waits while every slot is taken, which pushes back on callers
/// instead of failing them.
#[derive(Debug, Clone)]
pub struct BrowserPool {
    semaphore: Arc<Semaphore>,
    size: usize,
}

/// A held render slot, released on drop
#[derive(Debug)]
pub struct BrowserLease {
    _permit: OwnedSemaphorePermit,
}

impl BrowserPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Waits for a free render slot
    ///
    /// Fails only once the pool has been closed.
    pub async fn acquire(&self, url: &str) -> Result<BrowserLease, FetchError> {
        if self.semaphore.available_permits() == 0 {
            debug!("Browser pool exhausted, waiting for a slot: {}", url);
        }

        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| FetchError::Browser {
                url: url.to_string(),
                message: "browser pool is closed".to_string(),
            })?;

        Ok(BrowserLease { _permit: permit })
    }

    /// Rejects all current and future waiters
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}
