//! Stable exit codes for deployer CLI commands.

/// Command succeeded (document valid, deployment or check-only validation succeeded).
pub const OK: i32 = 0;
/// Command could not run: bad arguments, config, credentials, or I/O.
pub const ERROR: i32 = 1;
/// The document is invalid or the run ended in a terminal failure.
pub const FAILED: i32 = 2;
/// Deployment status polling ran out of cycles before the server finished.
pub const TIMED_OUT: i32 = 3;
