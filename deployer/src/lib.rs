//! Automated repair and deployment of Salesforce Flow metadata.
//!
//! A run takes one Flow XML document, repairs local structure problems with a
//! language model until the document is well-formed, then deploys it through
//! the Metadata API and feeds server-reported errors back into the repair
//! model until the deploy succeeds or an attempt budget runs out.
//!
//! - **[`core`]**: Pure, deterministic logic (validation, classification, SOAP
//!   envelopes and response parsing, budgets). No I/O.
//! - **[`io`]**: Side-effecting boundaries (config, audit log, HTTP transport,
//!   authentication, model client, archive packaging, prompts, retrieval).
//!
//! Orchestration modules ([`autodeploy`], [`repair`], [`generate`]) combine the
//! two to implement CLI commands.

pub mod autodeploy;
pub mod core;
pub mod exit_codes;
pub mod generate;
pub mod io;
pub mod logging;
pub mod repair;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
