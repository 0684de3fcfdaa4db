use anyhow::{anyhow, Result};
use futures::{Future, FutureExt};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Crates whose debug chatter drowns out the service logs.
const SILENCED_TARGETS: [&str; 5] = [
    "hyper_util=off",
    "reqwest=off",
    "sqlx=warn",
    "sea_orm=warn",
    "h2=off",
];

pub fn setup_tracing() {
    let env_filter = SILENCED_TARGETS.iter().fold(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        |filter, directive| match directive.parse() {
            Ok(directive) => filter.add_directive(directive),
            Err(_) => filter,
        },
    );

    let fmt_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_writer(std::io::stdout);

    // try_init so tests and embedders that already installed a subscriber keep theirs
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}

/// Runs the service future with tracing installed, turning a panic into a
/// logged error with a backtrace instead of an unstructured abort message.
pub async fn run_with_tracing<F, Fut>(future: F) -> Result<()>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    setup_tracing();

    match std::panic::AssertUnwindSafe(future()).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!(error = %e, error_chain = ?e, "Service exited with error");
            Err(e)
        }
        Err(panic) => {
            capture_panic_details(panic);
            Err(anyhow!("Service panicked"))
        }
    }
}

fn capture_panic_details(e: Box<dyn std::any::Any + Send>) {
    let backtrace = backtrace::Backtrace::new();
    if let Some(s) = e.downcast_ref::<&str>() {
        error!(panic_message = *s, backtrace = ?backtrace, "Panic occurred with message");
    } else if let Some(s) = e.downcast_ref::<String>() {
        error!(panic_message = s, backtrace = ?backtrace, "Panic occurred with message");
    } else {
        error!(backtrace = ?backtrace, "Panic occurred but the payload is not a string");
    }
}
