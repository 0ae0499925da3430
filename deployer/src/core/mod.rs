//! Deterministic, pure logic shared by the deployer.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! strings and return deterministic outputs suitable for tests.

pub mod budget;
pub mod classifier;
pub mod flow_name;
pub mod manifest;
pub mod response;
pub mod soap;
pub mod types;
pub mod validator;
