//! The pure state-transition contract
//!
//! A [`Reducer`] is the only thing allowed to mutate loop state. It must be
//! synchronous, total over its event type, and free of side effects: anything
//! asynchronous (network, timers, disk) belongs in a feedback, which turns
//! its results back into ordinary events.

use std::marker::PhantomData;

/// A pure, synchronous state transition.
///
/// Reducers are invoked strictly sequentially by the gate that owns the
/// state, so implementations never need their own locking. They must not
/// block, suspend, or fail; effect errors are expected to arrive as ordinary
/// events (for example a `Failed(reason)` variant) produced at the effect
/// boundary.
///
/// # Examples
///
/// ```
/// use feedback_loop_core::Reducer;
///
/// struct CounterReducer;
///
/// enum CounterEvent {
///     Increment,
///     Decrement,
/// }
///
/// impl Reducer for CounterReducer {
///     type State = i64;
///     type Event = CounterEvent;
///
///     fn reduce(&self, state: &mut Self::State, event: Self::Event) {
///         match event {
///             CounterEvent::Increment => *state += 1,
///             CounterEvent::Decrement => *state -= 1,
///         }
///     }
/// }
///
/// let reducer = CounterReducer;
/// let mut state = 0;
/// reducer.reduce(&mut state, CounterEvent::Increment);
/// assert_eq!(state, 1);
/// ```
pub trait Reducer {
    /// The state type this reducer evolves.
    type State;

    /// The event type this reducer consumes.
    type Event;

    /// Apply `event` to `state` in place.
    fn reduce(&self, state: &mut Self::State, event: Self::Event);
}

/// Adapts a plain closure to the [`Reducer`] trait.
///
/// Useful when a full named reducer type would be ceremony, such as in tests
/// or small sub-systems:
///
/// ```
/// use feedback_loop_core::{FnReducer, Reducer};
///
/// let reducer = FnReducer::new(|state: &mut String, event: &str| {
///     state.push_str(event);
/// });
///
/// let mut state = String::from("initial");
/// reducer.reduce(&mut state, "_a");
/// assert_eq!(state, "initial_a");
/// ```
pub struct FnReducer<S, E, F>
where
    F: Fn(&mut S, E),
{
    f: F,
    _marker: PhantomData<fn(&mut S, E)>,
}

impl<S, E, F> FnReducer<S, E, F>
where
    F: Fn(&mut S, E),
{
    /// Wrap `f` as a reducer.
    pub const fn new(f: F) -> Self {
        Self {
            f,
            _marker: PhantomData,
        }
    }
}

impl<S, E, F> Reducer for FnReducer<S, E, F>
where
    F: Fn(&mut S, E),
{
    type State = S;
    type Event = E;

    fn reduce(&self, state: &mut Self::State, event: Self::Event) {
        (self.f)(state, event);
    }
}
