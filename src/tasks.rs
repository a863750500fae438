//! Task lifetime helpers shared by the job runners and the crawl loop

use std::time::Duration;
use tokio::task::{AbortHandle, JoinSet};
use tracing::warn;

/// Aborts the wrapped task when dropped
pub(crate) struct AbortOnDrop(pub AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Waits up to `grace` for in-flight tasks, then aborts the stragglers
///
/// Returns the outputs of the tasks that finished in time, in completion
/// order. Tasks that panicked are logged and skipped.
pub(crate) async fn drain_within<T: Send + 'static>(tasks: &mut JoinSet<T>, grace: Duration) -> Vec<T> {
    let mut finished = Vec::new();
    if tasks.is_empty() {
        return finished;
    }

    let deadline = tokio::time::sleep(grace);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            joined = tasks.join_next() => match joined {
                None => break,
                Some(Ok(output)) => finished.push(output),
                Some(Err(e)) => warn!("Task failed while draining: {}", e),
            },
        }
    }

    tasks.abort_all();
    while tasks.join_next().await.is_some() {}
    finished
}
