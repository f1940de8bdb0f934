//! # Feedback Loop Core
//!
//! Core traits and types for the feedback-loop architecture.
//!
//! This crate provides the fundamental abstractions of a unidirectional
//! state-management loop: a single state value evolved exclusively through a
//! pure reducer, with asynchronous feedbacks observing state changes and
//! enqueuing new events.
//!
//! ## Core Concepts
//!
//! - **State**: application-defined value owned by the gate, snapshotted
//!   after every reduction
//! - **Event**: application-defined state-transition request
//! - **Reducer**: pure function `(&mut State, Event)`, no side effects
//! - **Token**: identity of one effect run, for targeted cancellation
//! - **`EventConsumer`**: sink for `(event, token)` pairs with
//!   purge-by-token support
//!
//! ## Architecture Principles
//!
//! - Unidirectional Data Flow
//! - One reducer invocation at a time, strict FIFO of arrival
//! - Effects at the boundary (feedbacks), never inside the reducer
//! - Composition by `combine` and `pullback`, not inheritance
//!
//! The runtime crate builds the concurrency engine (the floodgate), the
//! feedback combinators, and the loop lifecycle on top of these types.

pub mod composition;
pub mod consumer;
pub mod reducer;

pub use composition::{BoxReducer, CombinedReducer, PulledBackReducer, combine, pullback};
pub use consumer::{EventConsumer, PullbackConsumer, Token};
pub use reducer::{FnReducer, Reducer};
