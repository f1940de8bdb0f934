//! Declarative effect scheduling keyed off the state stream.
//!
//! A [`Feedback`] describes how (a projection of) the state stream drives an
//! asynchronous effect whose output events are fed back into the gate. All
//! constructors share one engine with "flatten-latest" semantics: each
//! control value derived from the state starts a fresh effect run under a
//! fresh [`Token`], and starting a run supersedes the previous one: its
//! task is aborted and its still-pending events are purged. An effect that
//! completes on its own is never purged; its events drain normally.
//!
//! Construction is cheap and synchronous. Nothing subscribes or spawns
//! until the feedback is wired into a loop.

use feedback_loop_core::{EventConsumer, PullbackConsumer, Token};
use futures::future::ready;
use futures::stream::{BoxStream, StreamExt};
use smallvec::{SmallVec, smallvec};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A factory of independent state-snapshot subscriptions.
///
/// Every call opens a fresh stream over the same gate, so combined
/// feedbacks each observe the full snapshot sequence.
pub(crate) type StateSource<S> = Arc<dyn Fn() -> BoxStream<'static, S> + Send + Sync>;

/// Shared handle to the event sink feedbacks produce into.
pub type SharedConsumer<E> = Arc<dyn EventConsumer<Event = E>>;

type WireFn<S, E> =
    Box<dyn FnOnce(&StateSource<S>, &SharedConsumer<E>) -> SmallVec<[JoinHandle<()>; 2]> + Send>;

/// What the projection layer tells the effect engine to do next.
enum EffectSignal<C> {
    Start(C),
    Cancel,
}

/// A declarative rule mapping observed state to an event-producing effect.
///
/// `S` is the state the feedback observes, `E` the event type it produces.
/// Feedbacks hold no state of their own besides effect lifetime; they are
/// consumed when wired into a loop.
pub struct Feedback<S, E> {
    pub(crate) wire: WireFn<S, E>,
}

impl<S, E> Feedback<S, E>
where
    S: Send + 'static,
    E: Send + 'static,
{
    /// Full-control projection: transform the raw snapshot stream into an
    /// arbitrary stream of control values, then run one effect per control
    /// value with flatten-latest semantics.
    ///
    /// Every other projection-based constructor is sugar over this one.
    #[must_use]
    pub fn compacting<C, T, F>(transform: T, effect: F) -> Self
    where
        C: Send + 'static,
        T: FnOnce(BoxStream<'static, S>) -> BoxStream<'static, C> + Send + 'static,
        F: FnMut(C) -> BoxStream<'static, E> + Send + 'static,
    {
        Self::from_signals(
            move |states| transform(states).map(EffectSignal::Start).boxed(),
            effect,
        )
    }

    /// Run the effect on every state change, with the whole snapshot as
    /// the control value.
    #[must_use]
    pub fn whenever<F>(effect: F) -> Self
    where
        F: FnMut(S) -> BoxStream<'static, E> + Send + 'static,
    {
        Self::compacting(|states| states, effect)
    }

    /// Dedupe by a derived key: the effect restarts only when the
    /// projection yields a value different from the previous one.
    ///
    /// `None` cancels the running effect and starts nothing, and is itself
    /// subject to deduplication (repeated `None`s cancel once). This is the
    /// combinator for "fetch whenever the page number actually changes".
    #[must_use]
    pub fn skipping_repeated<C, P, F>(projection: P, effect: F) -> Self
    where
        C: Clone + PartialEq + Send + 'static,
        P: Fn(&S) -> Option<C> + Send + 'static,
        F: FnMut(C) -> BoxStream<'static, E> + Send + 'static,
    {
        Self::from_signals(
            move |states| {
                let mut previous: Option<Option<C>> = None;
                states
                    .filter_map(move |state| {
                        let control = projection(&state);
                        let repeated = previous.as_ref() == Some(&control);
                        previous = Some(control.clone());
                        ready(match (repeated, control) {
                            (true, _) => None,
                            (false, Some(value)) => Some(EffectSignal::Start(value)),
                            (false, None) => Some(EffectSignal::Cancel),
                        })
                    })
                    .boxed()
            },
            effect,
        )
    }

    /// Project an optional control value out of every snapshot: `Some`
    /// starts the effect (every occurrence, no dedupe), `None` cancels it
    /// and runs nothing.
    #[must_use]
    pub fn lensing<C, P, F>(projection: P, effect: F) -> Self
    where
        C: Send + 'static,
        P: Fn(&S) -> Option<C> + Send + 'static,
        F: FnMut(C) -> BoxStream<'static, E> + Send + 'static,
    {
        Self::from_signals(
            move |states| {
                states
                    .map(move |state| match projection(&state) {
                        Some(value) => EffectSignal::Start(value),
                        None => EffectSignal::Cancel,
                    })
                    .boxed()
            },
            effect,
        )
    }

    /// Run the effect on every state change for which `predicate` holds;
    /// a failing predicate cancels the running effect.
    ///
    /// Note that a qualifying state tick restarts the effect even if the
    /// previous tick also qualified. For a long-lived effect that should
    /// survive qualifying ticks, use
    /// [`when_becomes_true`](Self::when_becomes_true).
    #[must_use]
    pub fn predicate<P, F>(predicate: P, effect: F) -> Self
    where
        P: Fn(&S) -> bool + Send + 'static,
        F: FnMut(S) -> BoxStream<'static, E> + Send + 'static,
    {
        Self::from_signals(
            move |states| {
                states
                    .map(move |state| {
                        if predicate(&state) {
                            EffectSignal::Start(state)
                        } else {
                            EffectSignal::Cancel
                        }
                    })
                    .boxed()
            },
            effect,
        )
    }

    /// Edge-triggered: start the effect only on the predicate's
    /// false-to-true transition.
    ///
    /// Repeated true observations do not restart the effect; a false
    /// observation cancels it and re-arms the trigger. The effect receives
    /// the snapshot that crossed the edge.
    #[must_use]
    pub fn when_becomes_true<P, F>(predicate: P, effect: F) -> Self
    where
        P: Fn(&S) -> bool + Send + 'static,
        F: FnMut(S) -> BoxStream<'static, E> + Send + 'static,
    {
        Self::from_signals(
            move |states| {
                let mut was_true = false;
                states
                    .filter_map(move |state| {
                        let is_true = predicate(&state);
                        let signal = match (was_true, is_true) {
                            (false, true) => Some(EffectSignal::Start(state)),
                            (true, false) => Some(EffectSignal::Cancel),
                            _ => None,
                        };
                        was_true = is_true;
                        ready(signal)
                    })
                    .boxed()
            },
            effect,
        )
    }

    /// Escape hatch: full control of the snapshot-stream to event-consumer
    /// wiring.
    ///
    /// `wire` is handed a fresh snapshot stream and the loop's consumer at
    /// wiring time and must return the task driving the feedback, so the
    /// loop can tear it down. Every event the feedback produces must go
    /// through the consumer; there is no other way to reach the state.
    #[must_use]
    pub fn custom<W>(wire: W) -> Self
    where
        W: FnOnce(BoxStream<'static, S>, SharedConsumer<E>) -> JoinHandle<()> + Send + 'static,
    {
        Self {
            wire: Box::new(move |source, consumer| {
                smallvec![wire(source(), Arc::clone(consumer))]
            }),
        }
    }

    /// Embed a feedback over `(S, E)` into a parent loop over `(GS, GE)`.
    ///
    /// `state` projects the observed slice out of each parent snapshot;
    /// `event` embeds each produced local event into the parent event
    /// type. Cancellation tokens pass through untouched, so superseding a
    /// local effect purges exactly its own events from the parent queue.
    #[must_use]
    pub fn pullback<GlobalState, GlobalEvent>(
        self,
        state: fn(&GlobalState) -> S,
        event: fn(E) -> GlobalEvent,
    ) -> Feedback<GlobalState, GlobalEvent>
    where
        GlobalState: Send + 'static,
        GlobalEvent: Send + 'static,
    {
        Feedback {
            wire: Box::new(move |source, consumer| {
                let parent = Arc::clone(source);
                let local_source: StateSource<S> =
                    Arc::new(move || parent().map(move |global| state(&global)).boxed());
                let local_consumer: SharedConsumer<E> =
                    Arc::new(PullbackConsumer::new(Arc::clone(consumer), event));
                (self.wire)(&local_source, &local_consumer)
            }),
        }
    }

    /// Merge several feedbacks into one, all observing the same loop.
    ///
    /// Each feedback gets its own snapshot subscription and its own effect
    /// lifecycle; they share nothing but the consumer.
    #[must_use]
    pub fn combine(feedbacks: Vec<Self>) -> Self {
        Self {
            wire: Box::new(move |source, consumer| {
                feedbacks
                    .into_iter()
                    .flat_map(|feedback| (feedback.wire)(source, consumer))
                    .collect()
            }),
        }
    }

    /// Wrap a control-signal transform and an effect builder into the
    /// shared flatten-latest engine.
    fn from_signals<C, T, F>(transform: T, effect: F) -> Self
    where
        C: Send + 'static,
        T: FnOnce(BoxStream<'static, S>) -> BoxStream<'static, EffectSignal<C>> + Send + 'static,
        F: FnMut(C) -> BoxStream<'static, E> + Send + 'static,
    {
        Self {
            wire: Box::new(move |source, consumer| {
                // Subscribe now, while the caller still holds the loop
                // unbootstrapped, so the initial snapshot cannot be missed.
                let control = transform(source());
                let consumer = Arc::clone(consumer);
                smallvec![tokio::spawn(run_effect_engine(control, consumer, effect))]
            }),
        }
    }
}

/// One live effect run: the task producing events and the token tagging
/// them.
struct EffectRun {
    task: AbortOnDrop,
    token: Token,
}

/// Aborts the wrapped task when dropped, so a listener that is itself torn
/// down can never leak a running effect.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Drive one feedback: consume control signals, maintain at most one live
/// effect run, route its events into the consumer.
async fn run_effect_engine<C, E, F>(
    mut control: BoxStream<'static, EffectSignal<C>>,
    consumer: SharedConsumer<E>,
    mut effect: F,
) where
    C: Send + 'static,
    E: Send + 'static,
    F: FnMut(C) -> BoxStream<'static, E> + Send + 'static,
{
    let mut current: Option<EffectRun> = None;
    while let Some(signal) = control.next().await {
        match signal {
            EffectSignal::Start(value) => {
                supersede(&mut current, &consumer);
                let token = Token::fresh();
                let mut events = effect(value);
                let sink = Arc::clone(&consumer);
                let task = tokio::spawn(async move {
                    while let Some(event) = events.next().await {
                        sink.process(event, token);
                    }
                });
                metrics::counter!("feedback.effects.started").increment(1);
                tracing::debug!(%token, "effect started");
                current = Some(EffectRun {
                    task: AbortOnDrop(task),
                    token,
                });
            },
            EffectSignal::Cancel => supersede(&mut current, &consumer),
        }
    }
    // Control stream ended: the loop stopped or the gate is gone.
    supersede(&mut current, &consumer);
}

/// Retire the current effect run, if any: abort its task and purge its
/// pending events.
fn supersede<E>(current: &mut Option<EffectRun>, consumer: &SharedConsumer<E>) {
    if let Some(EffectRun { task, token }) = current.take() {
        drop(task);
        consumer.cancel_pending(token);
        metrics::counter!("feedback.effects.cancelled").increment(1);
        tracing::debug!(%token, "effect cancelled");
    }
}
