//! Ready-made effect streams.
//!
//! A feedback's effect is any `BoxStream<'static, Event>`. These
//! constructors cover the common shapes so application code only reaches
//! for raw stream combinators when an effect is genuinely bespoke.

use futures::FutureExt;
use futures::future::Future;
use futures::stream::{self, BoxStream, StreamExt};
use std::time::Duration;

/// An effect that produces nothing.
///
/// Useful as the "else" arm of a conditional effect.
#[must_use]
pub fn none<E>() -> BoxStream<'static, E>
where
    E: Send + 'static,
{
    stream::empty().boxed()
}

/// An effect that emits `event` immediately and completes.
#[must_use]
pub fn once<E>(event: E) -> BoxStream<'static, E>
where
    E: Send + 'static,
{
    stream::once(std::future::ready(event)).boxed()
}

/// An effect that emits each event in order, immediately.
#[must_use]
pub fn from_iter<E, I>(events: I) -> BoxStream<'static, E>
where
    E: Send + 'static,
    I: IntoIterator<Item = E>,
    I::IntoIter: Send + 'static,
{
    stream::iter(events).boxed()
}

/// An effect that runs a future and emits its event, if any.
///
/// `None` means the work finished without anything to report; the effect
/// simply completes.
#[must_use]
pub fn from_future<E, Fut>(future: Fut) -> BoxStream<'static, E>
where
    E: Send + 'static,
    Fut: Future<Output = Option<E>> + Send + 'static,
{
    future.into_stream().filter_map(std::future::ready).boxed()
}

/// An effect that emits `event` after `delay`.
///
/// Cancelling the effect run during the delay means the event is never
/// produced.
#[must_use]
pub fn after<E>(delay: Duration, event: E) -> BoxStream<'static, E>
where
    E: Send + 'static,
{
    stream::once(async move {
        tokio::time::sleep(delay).await;
        event
    })
    .boxed()
}
