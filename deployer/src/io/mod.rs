//! I/O boundaries for deployer commands.

pub mod archive;
pub mod audit_log;
pub mod auth;
pub mod config;
pub mod flow_file;
pub mod metadata;
pub mod model;
pub mod prompt;
pub mod retrieval;
pub mod transport;
