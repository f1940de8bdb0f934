//! Pagination demo binary.
//!
//! Drives the composed counter + pager application end to end: pages
//! through a flaky simulated API, letting the retry feedback recover or
//! give up, then pokes the counter sub-system through a narrowed
//! context, and dumps the runtime metrics at exit.
//!
//! Run with `cargo run -p pagination`; set `RUST_LOG` to adjust
//! verbosity.

use anyhow::Result;
use feedback_loop_runtime::metrics::MetricsExporter;
use futures::StreamExt;
use pagination::{AppEvent, AppState, CounterEvent, FetchConfig, PagerEvent, PagerState, app_store};
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pagination=debug,feedback_loop_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let exporter = MetricsExporter::install()?;

    println!("=== Pagination Demo ===\n");

    let config = FetchConfig {
        max_attempts: 3,
        failure_rate: 0.4,
        latency: Duration::from_millis(120),
        page_size: 3,
    };
    println!("Simulated API: {config:?}\n");

    let store = app_store(config);

    // Page 1 starts fetching the moment the loop bootstraps.
    println!(">>> Waiting for page 1");
    let state = store.wait_for(page_settled, Duration::from_secs(5)).await?;
    report(&state.pager);

    for _ in 0..2 {
        println!(">>> Sending: NextPage");
        store.send(AppEvent::Pager(PagerEvent::NextPage))?;
        let state = store.wait_for(page_settled, Duration::from_secs(5)).await?;
        report(&state.pager);
    }

    println!(">>> Sending: PrevPage");
    store.send(AppEvent::Pager(PagerEvent::PrevPage))?;
    let state = store.wait_for(page_settled, Duration::from_secs(5)).await?;
    report(&state.pager);

    // A context narrowed onto the counter slice: reads see only
    // CounterState, sends are embedded back into AppEvent.
    println!(">>> Driving the counter through a narrowed context");
    let mut contexts = store.contexts();
    if let Some(root) = contexts.next().await {
        let counter = root.view(|state: &AppState| state.counter.clone(), AppEvent::Counter);
        println!("    counter before: {}", counter.state().count);
        counter.send(CounterEvent::Increment);
        counter.send(CounterEvent::Increment);
    }
    drop(contexts);

    let state = store
        .wait_for(|state| state.counter.count == 2, Duration::from_secs(1))
        .await?;
    println!("    counter after:  {}\n", state.counter.count);

    store.stop();
    println!(">>> Store stopped\n");

    if let Some(snapshot) = exporter.render() {
        println!("=== Metrics ===\n{snapshot}");
    }

    Ok(())
}

/// The current page either loaded or exhausted its retry budget.
fn page_settled(state: &AppState) -> bool {
    state.pager.loaded.is_some() || state.pager.failed.is_some()
}

fn report(pager: &PagerState) {
    if let Some(page) = &pager.loaded {
        println!(
            "    page {} loaded on attempt {}: {:?}\n",
            page.number, pager.attempt, page.items
        );
    } else if let Some(message) = &pager.failed {
        println!("    page {} gave up: {message}\n", pager.page);
    }
}
