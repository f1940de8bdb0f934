//! # Pagination Demo
//!
//! Two sub-systems composed into one feedback loop.
//!
//! This demo showcases:
//! - A pure counter sub-system (no effects)
//! - A pager sub-system whose page fetches run as a feedback
//! - `skipping_repeated` keyed on `(page, attempt)`, so retrying is just
//!   state: a failed fetch bumps `attempt`, which changes the key, which
//!   restarts the fetch until the budget runs out
//! - Sub-system embedding with `pullback` on both the reducer and the
//!   feedback side
//! - A simulated flaky API driven by injected [`FetchConfig`], no globals
//!
//! ## Example
//!
//! ```no_run
//! use pagination::{AppEvent, FetchConfig, PagerEvent, app_store};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = app_store(FetchConfig::default());
//!
//! store.send(AppEvent::Pager(PagerEvent::NextPage))?;
//! let page = store.state(|s| s.pager.page);
//! assert_eq!(page, 2);
//! # Ok(())
//! # }
//! ```

use feedback_loop_core::{BoxReducer, CombinedReducer, Reducer, combine, pullback};
use feedback_loop_runtime::{Feedback, Store};
use futures::stream::BoxStream;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning knobs for the simulated page API.
///
/// Injected into the reducer and the fetch feedback; nothing in the demo
/// reads process-wide configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Fetch tries per page before giving up (including the first).
    pub max_attempts: u8,
    /// Probability in `[0, 1]` that a single fetch fails.
    pub failure_rate: f64,
    /// Simulated network latency per fetch.
    pub latency: Duration,
    /// Items per fetched page.
    pub page_size: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            failure_rate: 0.3,
            latency: Duration::from_millis(40),
            page_size: 5,
        }
    }
}

// ============================================================================
// Counter sub-system
// ============================================================================

/// Counter state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterState {
    /// Current count value
    pub count: i64,
}

/// Counter events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CounterEvent {
    /// Increment the counter by 1
    Increment,
    /// Decrement the counter by 1
    Decrement,
    /// Reset the counter to 0
    Reset,
}

/// Pure counter logic; the counter has no feedbacks.
#[derive(Debug, Clone, Copy, Default)]
pub struct CounterReducer;

impl Reducer for CounterReducer {
    type State = CounterState;
    type Event = CounterEvent;

    fn reduce(&self, state: &mut Self::State, event: Self::Event) {
        match event {
            CounterEvent::Increment => state.count += 1,
            CounterEvent::Decrement => state.count -= 1,
            CounterEvent::Reset => state.count = 0,
        }
    }
}

// ============================================================================
// Pager sub-system
// ============================================================================

/// One fetched page payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// Which page these items belong to.
    pub number: u32,
    /// The page contents.
    pub items: Vec<String>,
}

/// Pager state
///
/// `attempt` is the retry mechanism: the fetch feedback keys on
/// `(page, attempt)`, so bumping `attempt` after a failure forces a
/// refetch of the same page, and leaving it alone stops the retrying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagerState {
    /// Page the user is on.
    pub page: u32,
    /// Zero-based fetch try for the current page.
    pub attempt: u8,
    /// Last successfully fetched page, if it matches `page`.
    pub loaded: Option<Page>,
    /// Terminal failure message once the retry budget is spent.
    pub failed: Option<String>,
}

impl Default for PagerState {
    fn default() -> Self {
        Self {
            page: 1,
            attempt: 0,
            loaded: None,
            failed: None,
        }
    }
}

/// Pager events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagerEvent {
    /// Move to the next page and start fetching it.
    NextPage,
    /// Move to the previous page (floor of 1) and start fetching it.
    PrevPage,
    /// A fetch delivered a page.
    Loaded(Page),
    /// A fetch for `page` failed.
    FetchFailed {
        /// Page the failed fetch was for.
        page: u32,
        /// Human-readable cause.
        message: String,
    },
}

/// Pager logic: navigation resets the retry state, failures consume the
/// retry budget.
#[derive(Debug, Clone)]
pub struct PagerReducer {
    config: FetchConfig,
}

impl PagerReducer {
    /// Create a pager reducer with the given fetch budget.
    #[must_use]
    pub const fn new(config: FetchConfig) -> Self {
        Self { config }
    }
}

impl Reducer for PagerReducer {
    type State = PagerState;
    type Event = PagerEvent;

    fn reduce(&self, state: &mut Self::State, event: Self::Event) {
        match event {
            PagerEvent::NextPage => {
                state.page += 1;
                state.attempt = 0;
                state.loaded = None;
                state.failed = None;
            },
            PagerEvent::PrevPage => {
                state.page = state.page.saturating_sub(1).max(1);
                state.attempt = 0;
                state.loaded = None;
                state.failed = None;
            },
            PagerEvent::Loaded(page) => {
                // A page for anything but the current position is stale.
                if page.number == state.page {
                    state.loaded = Some(page);
                    state.failed = None;
                }
            },
            PagerEvent::FetchFailed { page, message } => {
                if page != state.page {
                    return;
                }
                // attempt never exceeds max_attempts - 1, so this cannot wrap.
                if state.attempt + 1 < self.config.max_attempts {
                    state.attempt += 1;
                } else {
                    state.failed = Some(message);
                }
            },
        }
    }
}

/// The fetch feedback: one in-flight fetch per `(page, attempt)` key.
///
/// Navigating supersedes the previous fetch (its task is aborted and its
/// queued events purged); a failure bumps `attempt` through the reducer,
/// which re-triggers this feedback with a new key.
#[must_use]
pub fn fetch_feedback(config: FetchConfig) -> Feedback<PagerState, PagerEvent> {
    Feedback::skipping_repeated(
        |state: &PagerState| Some((state.page, state.attempt)),
        move |(page, attempt)| fetch_page(&config, page, attempt),
    )
}

/// Simulated flaky page API.
fn fetch_page(config: &FetchConfig, page: u32, attempt: u8) -> BoxStream<'static, PagerEvent> {
    let failure_rate = config.failure_rate;
    let latency = config.latency;
    let page_size = config.page_size;
    Box::pin(async_stream::stream! {
        tokio::time::sleep(latency).await;
        let failed = rand::thread_rng().gen_range(0.0..1.0) < failure_rate;
        if failed {
            tracing::warn!(page, attempt, "fetch failed");
            yield PagerEvent::FetchFailed {
                page,
                message: format!("page {page} unavailable"),
            };
        } else {
            tracing::info!(page, attempt, "fetch succeeded");
            let items = (1..=page_size)
                .map(|item| format!("item {page}.{item}"))
                .collect();
            yield PagerEvent::Loaded(Page {
                number: page,
                items,
            });
        }
    })
}

// ============================================================================
// Application composition
// ============================================================================

/// Whole-application state: one slice per sub-system.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppState {
    /// Counter slice.
    pub counter: CounterState,
    /// Pager slice.
    pub pager: PagerState,
}

/// Whole-application events: one case per sub-system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// Counter sub-system events.
    Counter(CounterEvent),
    /// Pager sub-system events.
    Pager(PagerEvent),
}

fn counter_state(state: &mut AppState) -> &mut CounterState {
    &mut state.counter
}

fn pager_state(state: &mut AppState) -> &mut PagerState {
    &mut state.pager
}

fn counter_event(event: AppEvent) -> Option<CounterEvent> {
    match event {
        AppEvent::Counter(event) => Some(event),
        AppEvent::Pager(_) => None,
    }
}

fn pager_event(event: AppEvent) -> Option<PagerEvent> {
    match event {
        AppEvent::Pager(event) => Some(event),
        AppEvent::Counter(_) => None,
    }
}

/// Both sub-system reducers, each pulled back onto its slice.
#[must_use]
pub fn app_reducer(config: FetchConfig) -> CombinedReducer<AppState, AppEvent> {
    combine(vec![
        Box::new(pullback(CounterReducer, counter_state, counter_event)) as BoxReducer<_, _>,
        Box::new(pullback(PagerReducer::new(config), pager_state, pager_event)),
    ])
}

/// The pager fetch feedback, embedded into the application loop.
#[must_use]
pub fn app_feedback(config: FetchConfig) -> Feedback<AppState, AppEvent> {
    fetch_feedback(config).pullback(|app: &AppState| app.pager.clone(), AppEvent::Pager)
}

/// Build the full application store.
///
/// # Panics
///
/// Panics when called outside a Tokio runtime; wiring spawns the
/// feedback listener tasks.
#[must_use]
pub fn app_store(config: FetchConfig) -> Store<AppState, AppEvent, CombinedReducer<AppState, AppEvent>> {
    Store::new(
        AppState::default(),
        app_reducer(config.clone()),
        app_feedback(config),
    )
}
