//! Event consumption contract
//!
//! Every event that flows through a loop is handed to an [`EventConsumer`]
//! together with the [`Token`] of the effect run that produced it. The token
//! is what makes targeted cancellation possible: when an effect run becomes
//! obsolete, its not-yet-applied events can be purged from the pending queue
//! without touching events from other runs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(0);

/// Identity of a single effect run.
///
/// Tokens are process-unique and cheap to copy. A feedback mints a fresh
/// token every time it starts an effect, tags every event the effect emits
/// with it, and uses it to purge the run's pending events when the run is
/// superseded.
///
/// # Examples
///
/// ```
/// use feedback_loop_core::Token;
///
/// let first = Token::fresh();
/// let second = Token::fresh();
/// assert_ne!(first, second);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token(u64);

impl Token {
    /// Mint a token no other call has returned before.
    #[must_use]
    pub fn fresh() -> Self {
        Self(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw token value, for logging and diagnostics.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "token-{}", self.0)
    }
}

/// A sink for `(event, token)` pairs.
///
/// Implementors must accept events from arbitrary threads and must support
/// dropping every pending event tagged with a given token. The gate that
/// owns the state implements this trait; adapters such as
/// [`PullbackConsumer`] wrap another consumer and translate events on the
/// way through.
pub trait EventConsumer: Send + Sync {
    /// The event type this consumer accepts.
    type Event;

    /// Hand an event to the consumer.
    ///
    /// The call may apply the event immediately or queue it for a concurrent
    /// drainer; either way the event is applied at most once, and only if
    /// `token` is not cancelled before it is dequeued.
    fn process(&self, event: Self::Event, token: Token);

    /// Drop every queued-but-not-yet-applied event tagged with `token`.
    ///
    /// Events already being applied are unaffected.
    fn cancel_pending(&self, token: Token);
}

/// Wraps a consumer of global events so it can accept local events.
///
/// Each local event is embedded into the global event type through an
/// explicit constructor function before being forwarded. Cancellation passes
/// straight through, so a token minted against the local consumer purges the
/// corresponding global events.
pub struct PullbackConsumer<LocalEvent, GlobalEvent> {
    inner: Arc<dyn EventConsumer<Event = GlobalEvent>>,
    embed: fn(LocalEvent) -> GlobalEvent,
}

impl<LocalEvent, GlobalEvent> PullbackConsumer<LocalEvent, GlobalEvent> {
    /// Adapt `inner` so it accepts local events via `embed`.
    #[must_use]
    pub fn new(
        inner: Arc<dyn EventConsumer<Event = GlobalEvent>>,
        embed: fn(LocalEvent) -> GlobalEvent,
    ) -> Self {
        Self { inner, embed }
    }
}

impl<LocalEvent, GlobalEvent> EventConsumer for PullbackConsumer<LocalEvent, GlobalEvent> {
    type Event = LocalEvent;

    fn process(&self, event: Self::Event, token: Token) {
        self.inner.process((self.embed)(event), token);
    }

    fn cancel_pending(&self, token: Token) {
        self.inner.cancel_pending(token);
    }
}
