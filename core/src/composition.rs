//! Reducer composition algebra
//!
//! Two operations turn small reducers into an application-wide one:
//! - **[`combine`]**: run several reducers over the same state and event,
//!   in sequence.
//! - **[`pullback`]**: lift a reducer written against a sub-state and
//!   sub-event into the parent's coordinate system via explicit accessors.
//!
//! # Examples
//!
//! ```
//! use feedback_loop_core::{Reducer, composition::{combine, pullback}};
//!
//! #[derive(Clone, Default)]
//! struct AppState {
//!     counter: i64,
//!     log: Vec<String>,
//! }
//!
//! #[derive(Clone)]
//! enum AppEvent {
//!     Counter(CounterEvent),
//!     Note(String),
//! }
//!
//! #[derive(Clone)]
//! enum CounterEvent {
//!     Increment,
//! }
//!
//! struct CounterReducer;
//!
//! impl Reducer for CounterReducer {
//!     type State = i64;
//!     type Event = CounterEvent;
//!
//!     fn reduce(&self, state: &mut Self::State, event: Self::Event) {
//!         match event {
//!             CounterEvent::Increment => *state += 1,
//!         }
//!     }
//! }
//!
//! struct NoteReducer;
//!
//! impl Reducer for NoteReducer {
//!     type State = AppState;
//!     type Event = AppEvent;
//!
//!     fn reduce(&self, state: &mut Self::State, event: Self::Event) {
//!         if let AppEvent::Note(text) = event {
//!             state.log.push(text);
//!         }
//!     }
//! }
//!
//! let lifted = pullback(
//!     CounterReducer,
//!     |app: &mut AppState| &mut app.counter,
//!     |event| match event {
//!         AppEvent::Counter(e) => Some(e),
//!         _ => None,
//!     },
//! );
//!
//! let app = combine(vec![Box::new(lifted), Box::new(NoteReducer)]);
//!
//! let mut state = AppState::default();
//! app.reduce(&mut state, AppEvent::Counter(CounterEvent::Increment));
//! assert_eq!(state.counter, 1);
//! assert!(state.log.is_empty());
//! ```

use crate::reducer::Reducer;
use smallvec::SmallVec;

/// A reducer boxed for composition, shareable across threads.
pub type BoxReducer<S, E> = Box<dyn Reducer<State = S, Event = E> + Send + Sync>;

/// Combines multiple reducers that operate on the same state and event types.
///
/// Each reducer runs in sequence against the same evolving state, so later
/// reducers observe the mutations of earlier ones. The event is cloned for
/// every reducer but the last cannot be known here, so `Event: Clone` is
/// required.
#[must_use]
pub fn combine<S, E>(reducers: Vec<BoxReducer<S, E>>) -> CombinedReducer<S, E>
where
    E: Clone,
{
    CombinedReducer {
        reducers: reducers.into(),
    }
}

/// A combined reducer that runs its components in sequence.
///
/// Created by [`combine`].
pub struct CombinedReducer<S, E>
where
    E: Clone,
{
    reducers: SmallVec<[BoxReducer<S, E>; 4]>,
}

impl<S, E> Reducer for CombinedReducer<S, E>
where
    E: Clone,
{
    type State = S;
    type Event = E;

    fn reduce(&self, state: &mut Self::State, event: Self::Event) {
        for reducer in &self.reducers {
            reducer.reduce(state, event.clone());
        }
    }
}

/// Lifts a reducer over `(LocalState, LocalEvent)` into one over
/// `(GlobalState, GlobalEvent)`.
///
/// `state` projects the local slice out of the global state by mutable
/// reference; `event` tests whether a global event belongs to the local
/// sub-system and extracts it. A global event with no local counterpart is a
/// no-op, leaving the whole state untouched.
///
/// Both accessors are plain function pointers: for struct fields the state
/// accessor is a one-line closure, and for enum variants the event accessor
/// is an exhaustive match returning `Option`.
pub const fn pullback<GlobalState, GlobalEvent, R>(
    reducer: R,
    state: fn(&mut GlobalState) -> &mut R::State,
    event: fn(GlobalEvent) -> Option<R::Event>,
) -> PulledBackReducer<GlobalState, GlobalEvent, R>
where
    R: Reducer,
{
    PulledBackReducer {
        reducer,
        state,
        event,
    }
}

/// A local reducer lifted into a parent coordinate system.
///
/// Created by [`pullback`].
pub struct PulledBackReducer<GlobalState, GlobalEvent, R>
where
    R: Reducer,
{
    reducer: R,
    state: fn(&mut GlobalState) -> &mut R::State,
    event: fn(GlobalEvent) -> Option<R::Event>,
}

impl<GlobalState, GlobalEvent, R> Reducer for PulledBackReducer<GlobalState, GlobalEvent, R>
where
    R: Reducer,
{
    type State = GlobalState;
    type Event = GlobalEvent;

    fn reduce(&self, state: &mut Self::State, event: Self::Event) {
        if let Some(local) = (self.event)(event) {
            self.reducer.reduce((self.state)(state), local);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, Default, PartialEq)]
    struct PagerState {
        page: u32,
        loading: bool,
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    struct AppState {
        counter: i64,
        pager: PagerState,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum CounterEvent {
        Increment,
        Decrement,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum PagerEvent {
        LoadNext,
        Loaded,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum AppEvent {
        Counter(CounterEvent),
        Pager(PagerEvent),
    }

    struct CounterReducer;

    impl Reducer for CounterReducer {
        type State = i64;
        type Event = CounterEvent;

        fn reduce(&self, state: &mut Self::State, event: Self::Event) {
            match event {
                CounterEvent::Increment => *state += 1,
                CounterEvent::Decrement => *state -= 1,
            }
        }
    }

    struct PagerReducer;

    impl Reducer for PagerReducer {
        type State = PagerState;
        type Event = PagerEvent;

        fn reduce(&self, state: &mut Self::State, event: Self::Event) {
            match event {
                PagerEvent::LoadNext => {
                    state.page += 1;
                    state.loading = true;
                },
                PagerEvent::Loaded => state.loading = false,
            }
        }
    }

    fn counter_event(event: AppEvent) -> Option<CounterEvent> {
        match event {
            AppEvent::Counter(e) => Some(e),
            AppEvent::Pager(_) => None,
        }
    }

    fn pager_event(event: AppEvent) -> Option<PagerEvent> {
        match event {
            AppEvent::Pager(e) => Some(e),
            AppEvent::Counter(_) => None,
        }
    }

    fn app_reducer() -> CombinedReducer<AppState, AppEvent> {
        combine(vec![
            Box::new(pullback(
                CounterReducer,
                |app: &mut AppState| &mut app.counter,
                counter_event,
            )),
            Box::new(pullback(
                PagerReducer,
                |app: &mut AppState| &mut app.pager,
                pager_event,
            )),
        ])
    }

    #[test]
    fn test_pullback_routes_matching_events() {
        let app = app_reducer();
        let mut state = AppState::default();

        app.reduce(&mut state, AppEvent::Counter(CounterEvent::Increment));
        assert_eq!(state.counter, 1);
        assert_eq!(state.pager, PagerState::default());
    }

    #[test]
    fn test_pullback_ignores_foreign_events() {
        let app = app_reducer();
        let mut state = AppState::default();

        app.reduce(&mut state, AppEvent::Pager(PagerEvent::LoadNext));
        assert_eq!(state.counter, 0);
        assert_eq!(state.pager.page, 1);
        assert!(state.pager.loading);
    }

    #[test]
    fn test_combine_applies_in_sequence() {
        struct AuditReducer;

        impl Reducer for AuditReducer {
            type State = (i64, u32);
            type Event = i64;

            fn reduce(&self, state: &mut Self::State, _event: Self::Event) {
                state.1 += 1;
            }
        }

        struct SumReducer;

        impl Reducer for SumReducer {
            type State = (i64, u32);
            type Event = i64;

            fn reduce(&self, state: &mut Self::State, event: Self::Event) {
                state.0 += event;
            }
        }

        let combined = combine::<(i64, u32), i64>(vec![
            Box::new(SumReducer),
            Box::new(AuditReducer),
        ]);

        let mut state = (0, 0);
        combined.reduce(&mut state, 5);
        combined.reduce(&mut state, -2);

        assert_eq!(state.0, 3);
        assert_eq!(state.1, 2);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn app_events() -> impl Strategy<Value = Vec<AppEvent>> {
            prop::collection::vec(
                prop_oneof![
                    Just(AppEvent::Counter(CounterEvent::Increment)),
                    Just(AppEvent::Counter(CounterEvent::Decrement)),
                    Just(AppEvent::Pager(PagerEvent::LoadNext)),
                    Just(AppEvent::Pager(PagerEvent::Loaded)),
                ],
                0..64,
            )
        }

        proptest! {
            /// Driving the composed reducer is indistinguishable from
            /// driving each sub-reducer with its own slice of the events.
            #[test]
            fn composed_equals_slicewise(events in app_events()) {
                let app = app_reducer();
                let mut composed = AppState::default();
                for event in events.clone() {
                    app.reduce(&mut composed, event);
                }

                let mut counter = 0_i64;
                let mut pager = PagerState::default();
                for event in events {
                    match event {
                        AppEvent::Counter(e) => CounterReducer.reduce(&mut counter, e),
                        AppEvent::Pager(e) => PagerReducer.reduce(&mut pager, e),
                    }
                }

                prop_assert_eq!(composed.counter, counter);
                prop_assert_eq!(composed.pager, pager);
            }

            /// Foreign events never disturb a pulled-back slice.
            #[test]
            fn foreign_events_are_noops(count in 0_u32..32) {
                let lifted = pullback(
                    CounterReducer,
                    |app: &mut AppState| &mut app.counter,
                    counter_event,
                );

                let mut state = AppState::default();
                for _ in 0..count {
                    lifted.reduce(&mut state, AppEvent::Pager(PagerEvent::LoadNext));
                }

                prop_assert_eq!(state.counter, 0);
            }
        }
    }
}
