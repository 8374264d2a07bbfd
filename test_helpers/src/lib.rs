//! Shared helpers for unit and integration tests across the workspace.
#![warn(missing_docs)]

use std::sync::Once;

use observability_deps::tracing::info;
use tracing_subscriber::EnvFilter;

pub mod prometheus;
pub mod tracing;

static LOG_SETUP: Once = Once::new();

/// Enables debug logging regardless of the value of `RUST_LOG`
/// environment variable. If `RUST_LOG` isn't specified, defaults to
/// "debug"
///
/// Hint: Try running your test with `--nocapture` if you don't see any logs.
pub fn start_logging() {
    // ensure the global has been initialized
    LOG_SETUP.call_once(|| {
        // honor any existing RUST_LOG level
        if std::env::var("RUST_LOG").is_err() {
            std::env::set_var("RUST_LOG", "debug")
        }

        // Configure the logger to write to stderr and install it
        let output_stream = std::io::stderr;

        // route `log` macros from dependencies through tracing
        tracing_log::LogTracer::init().expect("log tracer can be installed");

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(output_stream)
            .finish();

        observability_deps::tracing::subscriber::set_global_default(subscriber)
            .expect("global subscriber can be installed");

        info!("test logging enabled");
    })
}

/// Enables debug logging if the `RUST_LOG` environment variable is
/// set. Does nothing if `RUST_LOG` is not set. If enable_logging has
/// been set previously, does nothing
pub fn maybe_start_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        start_logging()
    }
}
