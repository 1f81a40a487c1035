use tracing::Span;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Installs the global subscriber. `RUST_LOG` selects what is shown; the
/// default is `info`.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Span wrapping one job invocation. Every line logged inside it carries the
/// job name and a fresh `run_id`, so output from overlapping scheduled runs
/// can be separated.
pub fn run_span(job: &'static str) -> Span {
    tracing::info_span!("run", job, run_id = %Uuid::new_v4())
}
