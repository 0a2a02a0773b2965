//! Telemetry initialization (tracing/tracing-subscriber).
//!
//! LOG_LEVEL takes a filter string (plain "debug", or full directives such
//! as "info,quiz=debug,payments=debug"). LOG_FORMAT picks the output shape:
//! "json" for structured logs, "compact" for one-liners, anything else for
//! the default pretty format. Targets, files and line numbers are included
//! so quiz, payments and HTTP-layer events stay distinguishable.

use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str =
    "info,quiz=debug,payments=debug,quizpass_backend=debug,tower_http=info,axum=info";

pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    // The builder types diverge per format, so each branch finishes on its own.
    match std::env::var("LOG_FORMAT").as_deref() {
        Ok("json") => builder.json().init(),
        Ok("compact") => builder.compact().init(),
        _ => builder.init(),
    }
}
