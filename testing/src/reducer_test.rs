//! Ergonomic testing utilities for reducers
//!
//! This module provides a fluent API for testing reducers with readable Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // ReducerTest is the natural name

use feedback_loop_core::Reducer;

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Fluent API for testing reducers with Given-When-Then syntax
///
/// Reducers are pure state mutations here, so the harness applies a
/// scripted event sequence and asserts on the state that falls out.
///
/// # Example
///
/// ```ignore
/// use feedback_loop_testing::ReducerTest;
///
/// ReducerTest::new(PagerReducer)
///     .given_state(PagerState { page: 1, items: vec![] })
///     .when_event(PagerEvent::NextPage)
///     .when_event(PagerEvent::Loaded(items))
///     .then_state(|state| {
///         assert_eq!(state.page, 2);
///     })
///     .run();
/// ```
pub struct ReducerTest<R, S, E>
where
    R: Reducer<State = S, Event = E>,
{
    reducer: R,
    initial_state: Option<S>,
    events: Vec<E>,
    state_assertions: Vec<StateAssertion<S>>,
}

impl<R, S, E> ReducerTest<R, S, E>
where
    R: Reducer<State = S, Event = E>,
{
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            initial_state: None,
            events: Vec::new(),
            state_assertions: Vec::new(),
        }
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: S) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Append an event to apply (When); events apply in call order
    #[must_use]
    pub fn when_event(mut self, event: E) -> Self {
        self.events.push(event);
        self
    }

    /// Append a sequence of events to apply (When)
    #[must_use]
    pub fn when_events(mut self, events: impl IntoIterator<Item = E>) -> Self {
        self.events.extend(events);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&S) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if the initial state is not set, or if any assertion fails.
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        for event in self.events {
            self.reducer.reduce(&mut state, event);
        }

        for assertion in self.state_assertions {
            assertion(&state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug)]
    struct TestState {
        count: i32,
    }

    #[derive(Clone, Debug)]
    enum TestEvent {
        Increment,
        Decrement,
    }

    struct TestReducer;

    impl Reducer for TestReducer {
        type State = TestState;
        type Event = TestEvent;

        fn reduce(&self, state: &mut Self::State, event: Self::Event) {
            match event {
                TestEvent::Increment => state.count += 1,
                TestEvent::Decrement => state.count -= 1,
            }
        }
    }

    #[test]
    fn test_single_event() {
        ReducerTest::new(TestReducer)
            .given_state(TestState { count: 0 })
            .when_event(TestEvent::Increment)
            .then_state(|state| {
                assert_eq!(state.count, 1);
            })
            .run();
    }

    #[test]
    fn test_event_sequence_applies_in_order() {
        ReducerTest::new(TestReducer)
            .given_state(TestState { count: 5 })
            .when_events([
                TestEvent::Increment,
                TestEvent::Increment,
                TestEvent::Decrement,
            ])
            .then_state(|state| {
                assert_eq!(state.count, 6);
            })
            .run();
    }

    #[test]
    fn test_no_events_leaves_state_untouched() {
        ReducerTest::new(TestReducer)
            .given_state(TestState { count: 3 })
            .then_state(|state| {
                assert_eq!(state.count, 3);
            })
            .run();
    }
}
