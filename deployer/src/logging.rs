//! Tracing setup for the `flow-deployer` binary.
//!
//! - **Tracing (this module)**: diagnostics on stderr, filtered by `RUST_LOG`.
//!   Not persisted.
//! - **Audit logging (`io/audit_log`)**: the per-flow `<flow>.log` and document
//!   snapshots under the configured log directory. Always written, unaffected
//!   by `RUST_LOG`.
//!
//! Every audit entry is also emitted as an `info` event, so `--verbose` shows
//! a run's progress live without tailing the log file.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose { "flow_deployer=info,warn" } else { "warn" }
}

/// Install the stderr subscriber. `RUST_LOG` wins over `verbose`.
///
/// ```bash
/// RUST_LOG=flow_deployer=debug flow-deployer deploy My_Flow.flow-meta.xml
/// ```
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}
