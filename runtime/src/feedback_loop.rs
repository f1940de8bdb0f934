//! Loop assembly and lifecycle: gate, feedbacks, external sends.
//!
//! A [`FeedbackLoop`] owns one [`Floodgate`] and the listener tasks of the
//! feedbacks wired to it. Lifecycle is Created, then Bootstrapped, then
//! Stopped, and Stopped is terminal. Feedback subscriptions are minted at
//! construction, before the initial snapshot exists, so no feedback can
//! miss it.

use crate::error::LoopError;
use crate::feedback::{Feedback, SharedConsumer, StateSource};
use crate::floodgate::{Floodgate, StateStream};
use feedback_loop_core::{Reducer, Token};
use futures::StreamExt;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Construction-time knobs for a feedback loop.
#[derive(Debug, Clone, Copy)]
pub struct LoopConfig {
    /// Bootstrap the gate inside the constructor. Defaults to true; turn
    /// it off to stage subscribers or pre-send events before the initial
    /// snapshot is published.
    pub start_immediately: bool,
}

impl LoopConfig {
    /// The default configuration: start as soon as the loop is wired.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            start_immediately: true,
        }
    }

    /// Set whether the constructor bootstraps the loop.
    #[must_use]
    pub const fn with_start_immediately(mut self, start_immediately: bool) -> Self {
        self.start_immediately = start_immediately;
        self
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// A running unidirectional loop: state, reducer, feedbacks, lifecycle.
///
/// Direct [`send`](Self::send) calls and feedback-produced events flow
/// through the same gate under the same serialization discipline; a send
/// is indistinguishable from an external feedback's output.
pub struct FeedbackLoop<S, E, R>
where
    S: Clone + Send + 'static,
    E: Send + 'static,
    R: Reducer<State = S, Event = E> + Send + 'static,
{
    gate: Arc<Floodgate<S, E, R>>,
    listeners: Mutex<SmallVec<[JoinHandle<()>; 2]>>,
    external: Token,
    stopped: AtomicBool,
}

impl<S, E, R> FeedbackLoop<S, E, R>
where
    S: Clone + Send + 'static,
    E: Send + 'static,
    R: Reducer<State = S, Event = E> + Send + 'static,
{
    /// Wire `feedback` to a fresh gate over `initial` and `reducer`, then
    /// start the loop.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime; wiring spawns the
    /// feedback listener tasks.
    #[must_use]
    pub fn new(initial: S, reducer: R, feedback: Feedback<S, E>) -> Self {
        Self::with_config(initial, reducer, feedback, LoopConfig::default())
    }

    /// Like [`new`](Self::new), with explicit configuration.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime; wiring spawns the
    /// feedback listener tasks.
    #[must_use]
    pub fn with_config(
        initial: S,
        reducer: R,
        feedback: Feedback<S, E>,
        config: LoopConfig,
    ) -> Self {
        let gate = Arc::new(Floodgate::new(initial, reducer));

        // Each feedback mints its subscriptions here, against a gate that
        // has not started, so the initial snapshot reaches all of them.
        let subscription_gate = Arc::clone(&gate);
        let source: StateSource<S> = Arc::new(move || subscription_gate.subscribe().boxed());
        let consumer: SharedConsumer<E> = Arc::clone(&gate) as SharedConsumer<E>;
        let listeners = (feedback.wire)(&source, &consumer);
        tracing::debug!(listeners = listeners.len(), "feedbacks wired");
        metrics::gauge!("loop.live").increment(1.0);

        let feedback_loop = Self {
            gate,
            listeners: Mutex::new(listeners),
            external: Token::fresh(),
            stopped: AtomicBool::new(false),
        };
        if config.start_immediately {
            feedback_loop.start();
        }
        feedback_loop
    }

    /// Bootstrap the loop: publish the initial snapshot and begin draining.
    ///
    /// Idempotent; a no-op on a loop that already started or stopped.
    pub fn start(&self) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        if self.gate.bootstrap() {
            metrics::counter!("loop.started").increment(1);
            tracing::info!("feedback loop started");
        }
    }

    /// Feed an event into the loop from outside any feedback.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::Stopped`] once [`stop`](Self::stop) has run.
    pub fn send(&self, event: E) -> Result<(), LoopError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(LoopError::Stopped);
        }
        metrics::counter!("loop.events.sent").increment(1);
        self.gate.process(event, self.external);
        Ok(())
    }

    /// Open a snapshot stream over this loop's state.
    ///
    /// Started loop: yields the current snapshot immediately, then every
    /// subsequent one in order. The stream ends when the loop stops.
    #[must_use]
    pub fn state_stream(&self) -> StateStream<S> {
        self.gate.subscribe()
    }

    /// Synchronous read access to the current state and the started flag.
    pub fn with_state<T>(&self, f: impl FnOnce(&S, bool) -> T) -> T {
        self.gate.with_state(f)
    }

    /// Await the first snapshot satisfying `predicate`.
    ///
    /// Observes the current snapshot first, so a predicate that already
    /// holds resolves immediately.
    ///
    /// # Errors
    ///
    /// [`LoopError::Timeout`] if no matching snapshot arrives within
    /// `timeout`; [`LoopError::Stopped`] if the loop stops first.
    pub async fn wait_for<P>(&self, mut predicate: P, timeout: Duration) -> Result<S, LoopError>
    where
        P: FnMut(&S) -> bool,
    {
        let mut snapshots = self.state_stream();
        tokio::time::timeout(timeout, async {
            while let Some(state) = snapshots.recv().await {
                if predicate(&state) {
                    return Ok(state);
                }
            }
            Err(LoopError::Stopped)
        })
        .await
        .map_err(|_| LoopError::Timeout { duration: timeout })?
    }

    /// Stop the loop: tear down feedback listeners (and through them any
    /// in-flight effect tasks), dispose the gate, complete all snapshot
    /// streams. Terminal and idempotent.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.gate.dispose();
        let listeners = {
            let mut guard = self
                .listeners
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *guard)
        };
        for listener in &listeners {
            listener.abort();
        }
        metrics::gauge!("loop.live").decrement(1.0);
        tracing::info!("feedback loop stopped");
    }
}

impl<S, E, R> Drop for FeedbackLoop<S, E, R>
where
    S: Clone + Send + 'static,
    E: Send + 'static,
    R: Reducer<State = S, Event = E> + Send + 'static,
{
    fn drop(&mut self) {
        self.stop();
    }
}
