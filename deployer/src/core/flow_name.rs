//! Validation of Flow API names.
//!
//! Flow names end up in archive paths, the package manifest and log file
//! names, so they must be valid Salesforce API names.

use std::sync::LazyLock;

use anyhow::{Result, anyhow};
use regex::Regex;

static API_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("api name regex"));

/// Maximum length Salesforce accepts for a Flow API name.
pub const MAX_FLOW_NAME_LEN: usize = 80;

/// Validate a Flow API name: letter first, then letters, digits and single
/// underscores, no trailing underscore.
pub fn validate_flow_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(anyhow!("flow name must not be empty"));
    }
    if name.len() > MAX_FLOW_NAME_LEN {
        return Err(anyhow!(
            "flow name '{name}' exceeds {MAX_FLOW_NAME_LEN} characters"
        ));
    }
    if !API_NAME_RE.is_match(name) {
        return Err(anyhow!(
            "flow name '{name}' must start with a letter and contain only letters, digits and underscores"
        ));
    }
    if name.contains("__") {
        return Err(anyhow!(
            "flow name '{name}' must not contain consecutive underscores"
        ));
    }
    if name.ends_with('_') {
        return Err(anyhow!("flow name '{name}' must not end with an underscore"));
    }
    Ok(())
}

/// Derive a flow name from a file name such as `My_Flow.flow-meta.xml`.
pub fn flow_name_from_file_name(file_name: &str) -> &str {
    file_name
        .strip_suffix(".flow-meta.xml")
        .or_else(|| file_name.strip_suffix(".xml"))
        .unwrap_or(file_name)
}
