//! Logging setup for the `sig-sniffer` binary.
//!
//! Logs go to stderr so stdout stays free for JSON reports. The level is
//! taken from `--verbose` / `--quiet`, then `RUST_LOG`, then defaults to
//! info for this crate.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "sig_sniffer=info";

pub fn init_logger(verbose: bool, quiet: bool) {
    init_logger_with_filter(filter_for(verbose, quiet));
}

pub fn init_logger_with_filter(filter: EnvFilter) {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .compact();

    // A second initialisation (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn filter_for(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("sig_sniffer=debug")
    } else if quiet {
        EnvFilter::new("sig_sniffer=error")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}
