use once_cell::sync::OnceCell;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;

static LOGGER_INIT: OnceCell<()> = OnceCell::new();

/// Install the global tracing subscriber.
///
/// `json` switches the fmt layer to machine-readable output; the filter
/// comes from `RUST_LOG`, falling back to `info`. Safe to call more than
/// once (tests share one process).
pub fn init_tracing(service_name: &'static str, json: bool) {
    LOGGER_INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let base = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_line_number(true)
            .with_span_events(fmt::format::FmtSpan::CLOSE);

        if json {
            tracing_subscriber::registry()
                .with(filter)
                .with(base.json())
                .init();
        } else {
            tracing_subscriber::registry().with(filter).with(base).init();
        }

        tracing::info!(service = service_name, "logger initialized");
    });
}

/// Correlation id for one controller run. Recorded on the root span so
/// every reconciliation and watcher line can be tied to the invocation
/// that produced it.
#[derive(Clone, Debug)]
pub struct RunId(Uuid);

impl RunId {
    pub fn to_field(&self) -> String {
        self.0.as_hyphenated().to_string()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Root span for a single controller invocation.
pub fn run_span(run_id: &RunId) -> tracing::Span {
    tracing::info_span!("run", run_id = %run_id.to_field())
}
