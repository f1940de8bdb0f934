//! Application-facing surface over a feedback loop.
//!
//! A [`Store`] is a cheaply cloneable handle to one loop. UI layers
//! usually consume it through [`contexts`](Store::contexts): a stream of
//! [`Context`] values, each an immutable snapshot paired with a send
//! handle, which scope down to sub-system contexts through explicit
//! accessor pairs rather than any reflection mechanism.

use crate::error::LoopError;
use crate::feedback::Feedback;
use crate::feedback_loop::{FeedbackLoop, LoopConfig};
use crate::floodgate::StateStream;
use feedback_loop_core::Reducer;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Fire-and-forget event entry point handed out to contexts.
///
/// Holds the loop weakly: a context outliving its store sends into the
/// void instead of keeping the loop alive.
type SendHandle<E> = Arc<dyn Fn(E) + Send + Sync>;

/// Shared handle to a running feedback loop.
pub struct Store<S, E, R>
where
    S: Clone + Send + 'static,
    E: Send + 'static,
    R: Reducer<State = S, Event = E> + Send + 'static,
{
    feedback_loop: Arc<FeedbackLoop<S, E, R>>,
}

impl<S, E, R> Clone for Store<S, E, R>
where
    S: Clone + Send + 'static,
    E: Send + 'static,
    R: Reducer<State = S, Event = E> + Send + 'static,
{
    fn clone(&self) -> Self {
        Self {
            feedback_loop: Arc::clone(&self.feedback_loop),
        }
    }
}

impl<S, E, R> Store<S, E, R>
where
    S: Clone + Send + 'static,
    E: Send + 'static,
    R: Reducer<State = S, Event = E> + Send + 'static,
{
    /// Build a store over a fresh loop and start it.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime; wiring spawns the
    /// feedback listener tasks.
    #[must_use]
    pub fn new(initial: S, reducer: R, feedback: Feedback<S, E>) -> Self {
        Self::with_config(initial, reducer, feedback, LoopConfig::default())
    }

    /// Like [`new`](Self::new), with explicit loop configuration.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime; wiring spawns the
    /// feedback listener tasks.
    #[must_use]
    pub fn with_config(initial: S, reducer: R, feedback: Feedback<S, E>, config: LoopConfig) -> Self {
        Self {
            feedback_loop: Arc::new(FeedbackLoop::with_config(initial, reducer, feedback, config)),
        }
    }

    /// Bootstrap a loop built with `start_immediately` off.
    pub fn start(&self) {
        self.feedback_loop.start();
    }

    /// Feed an event into the loop.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::Stopped`] once the loop has stopped.
    pub fn send(&self, event: E) -> Result<(), LoopError> {
        self.feedback_loop.send(event)
    }

    /// Read the current state through a closure.
    pub fn state<T>(&self, f: impl FnOnce(&S) -> T) -> T {
        self.feedback_loop.with_state(|state, _| f(state))
    }

    /// Open a snapshot stream over the loop's state.
    #[must_use]
    pub fn state_stream(&self) -> StateStream<S> {
        self.feedback_loop.state_stream()
    }

    /// Open a stream of contexts: one per snapshot, each carrying a send
    /// handle back into this loop.
    #[must_use]
    pub fn contexts(&self) -> BoxStream<'static, Context<S, E>> {
        let send = self.send_handle();
        self.feedback_loop
            .state_stream()
            .map(move |state| Context::new(state, Arc::clone(&send)))
            .boxed()
    }

    /// Await the first snapshot satisfying `predicate`.
    ///
    /// # Errors
    ///
    /// [`LoopError::Timeout`] if no matching snapshot arrives within
    /// `timeout`; [`LoopError::Stopped`] if the loop stops first.
    pub async fn wait_for<P>(&self, predicate: P, timeout: Duration) -> Result<S, LoopError>
    where
        P: FnMut(&S) -> bool,
    {
        self.feedback_loop.wait_for(predicate, timeout).await
    }

    /// Stop the loop. Terminal; every clone of this store observes it.
    pub fn stop(&self) {
        self.feedback_loop.stop();
    }

    fn send_handle(&self) -> SendHandle<E> {
        let weak: Weak<FeedbackLoop<S, E, R>> = Arc::downgrade(&self.feedback_loop);
        Arc::new(move |event| {
            if let Some(feedback_loop) = weak.upgrade() {
                // A stopped loop rejects the send; contexts are
                // fire-and-forget, so that is not an error here.
                let _ = feedback_loop.send(event);
            }
        })
    }
}

/// An immutable state snapshot paired with a send handle.
///
/// Contexts are the scoped-store mechanism for view layers: a parent
/// context over the whole application state narrows to a child context
/// over one sub-system with [`view`](Self::view), and events the child
/// sends are embedded back into the parent event type before they reach
/// the loop.
pub struct Context<S, E> {
    state: S,
    send: SendHandle<E>,
}

impl<S, E> Context<S, E>
where
    S: 'static,
    E: 'static,
{
    pub(crate) fn new(state: S, send: SendHandle<E>) -> Self {
        Self { state, send }
    }

    /// The snapshot this context was built from.
    pub const fn state(&self) -> &S {
        &self.state
    }

    /// Send an event back into the loop. Fire-and-forget; a no-op once
    /// the loop is gone.
    pub fn send(&self, event: E) {
        (self.send)(event);
    }

    /// Narrow to a sub-system context through an explicit accessor pair:
    /// `get` projects the child state out of this snapshot, `embed` maps
    /// child events into the parent event type.
    #[must_use]
    pub fn view<LocalState, LocalEvent>(
        &self,
        get: fn(&S) -> LocalState,
        embed: fn(LocalEvent) -> E,
    ) -> Context<LocalState, LocalEvent>
    where
        LocalState: 'static,
        LocalEvent: 'static,
    {
        let parent = Arc::clone(&self.send);
        Context {
            state: get(&self.state),
            send: Arc::new(move |event| parent(embed(event))),
        }
    }
}
