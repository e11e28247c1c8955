//! Logging setup shared by both binaries. Verbosity is gathered via `-v`
//! repeated (`ArgAction::Count`) and mapped onto a `tracing` level filter.

use tracing_subscriber::EnvFilter;

/// `-v` → INFO, `-vv` → DEBUG, `-vvv` and beyond → TRACE. No flags at all
/// stays at WARN so a quiet server only prints genuine problems.
fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Installs a `tracing-subscriber` formatter, honoring `RUST_LOG` if set
/// and otherwise falling back to the verbosity derived from CLI flags.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_for(verbosity)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
