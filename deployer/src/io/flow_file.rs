//! Reading Flow documents from disk.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

/// Read a Flow document with surrounding whitespace removed.
///
/// An XML declaration must be the first thing in the document, so a stray
/// leading newline in the file would otherwise fail local validation.
pub fn read_flow_file(path: &Path) -> Result<String> {
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::validator::validate;
    use crate::test_support::screen_flow;

    #[test]
    fn surrounding_blank_lines_do_not_break_validation() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("My_Flow.flow-meta.xml");
        fs::write(&path, format!("\n\n{}\n  \n", screen_flow("x"))).expect("write");

        let document = read_flow_file(&path).expect("read");
        assert_eq!(document, screen_flow("x").trim());
        assert!(validate(&document).is_ok());
    }

    #[test]
    fn missing_file_names_the_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = read_flow_file(&temp.path().join("nope.xml")).expect_err("missing");
        assert!(format!("{err:#}").contains("nope.xml"));
    }
}
