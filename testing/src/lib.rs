//! # Feedback Loop Testing
//!
//! Testing utilities and helpers for feedback loops.
//!
//! This crate provides:
//! - A Given-When-Then harness for reducers
//! - A snapshot recorder for asserting on full state histories
//! - Deterministic effect fixtures for feedback tests
//!
//! ## Example
//!
//! ```ignore
//! use feedback_loop_testing::StateRecorder;
//!
//! #[tokio::test]
//! async fn test_pager_flow() {
//!     let store = pager_store();
//!     let recorder = StateRecorder::attach(store.state_stream());
//!
//!     store.send(PagerEvent::NextPage)?;
//!     store.stop();
//!
//!     let snapshots = recorder.into_snapshots().await;
//!     assert_eq!(snapshots.last().map(|s| s.page), Some(2));
//! }
//! ```

/// Given-When-Then harness for reducers
pub mod reducer_test;

/// Snapshot stream recorder
pub mod recorder;

/// Deterministic effect builders for feedback tests.
///
/// Feedbacks take an effect closure `FnMut(Control) -> BoxStream<Event>`;
/// these fixtures build such closures with fully scripted output, so tests
/// never depend on real I/O.
pub mod fixtures {
    use futures::stream::{self, BoxStream, StreamExt};
    use std::time::Duration;

    /// An effect that ignores its control value and emits a fixed script
    /// of events on every run.
    pub fn effect_of<C, E>(events: Vec<E>) -> impl FnMut(C) -> BoxStream<'static, E>
    where
        E: Clone + Send + 'static,
    {
        move |_control| stream::iter(events.clone()).boxed()
    }

    /// Like [`effect_of`], but the whole script is held back by `delay`.
    ///
    /// Useful for cancellation tests: supersede the run inside the delay
    /// and none of the events should come out.
    pub fn slow_effect_of<C, E>(
        delay: Duration,
        events: Vec<E>,
    ) -> impl FnMut(C) -> BoxStream<'static, E>
    where
        E: Clone + Send + 'static,
    {
        move |_control| {
            let events = events.clone();
            Box::pin(async_stream::stream! {
                tokio::time::sleep(delay).await;
                for event in events {
                    yield event;
                }
            })
        }
    }
}

/// Install a tracing subscriber suitable for test output.
///
/// Respects `RUST_LOG`, defaults to `info`, and writes through the test
/// capture writer. Safe to call from every test; only the first call in a
/// process installs anything.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use fixtures::{effect_of, slow_effect_of};
pub use recorder::StateRecorder;
pub use reducer_test::ReducerTest;
