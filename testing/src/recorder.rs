//! Recording snapshot streams for order-sensitive assertions.

use feedback_loop_runtime::StateStream;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Collects every snapshot a [`StateStream`] yields, in order.
///
/// The recorder drains its stream on a background task, so slow test
/// bodies never back up the loop under test. Use
/// [`snapshots`](Self::snapshots) for mid-flight peeks and
/// [`into_snapshots`](Self::into_snapshots) for the complete history once
/// the loop has stopped.
pub struct StateRecorder<S> {
    snapshots: Arc<Mutex<Vec<S>>>,
    collector: JoinHandle<()>,
}

impl<S> StateRecorder<S>
where
    S: Clone + Send + 'static,
{
    /// Start recording `stream` on a background task.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    #[must_use]
    pub fn attach(mut stream: StateStream<S>) -> Self {
        let snapshots = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&snapshots);
        let collector = tokio::spawn(async move {
            while let Some(state) = stream.recv().await {
                sink.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(state);
            }
        });
        Self {
            snapshots,
            collector,
        }
    }

    /// Everything recorded so far.
    #[must_use]
    pub fn snapshots(&self) -> Vec<S> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Poll until at least `count` snapshots arrived or `timeout` elapsed.
    /// Returns whether the count was reached.
    pub async fn wait_for_count(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.snapshots().len() >= count {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Await the end of the stream and return the complete history.
    ///
    /// The stream ends when its loop stops, so call this after `stop()`.
    pub async fn into_snapshots(self) -> Vec<S> {
        self.collector.await.ok();
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
