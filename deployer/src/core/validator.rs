//! Shallow local validation of Flow documents.
//!
//! Only the XML declaration and well-formedness are checked. Schema problems
//! surface later, from the Metadata API.

use crate::core::types::ValidationReport;

/// Error reported when the document does not open with an XML declaration.
pub const MISSING_DECLARATION: &str = "Missing XML declaration (<?xml version=\"1.0\"?>)";

const DECLARATION_TOKEN: &str = "<?xml";

/// Validate `doc`: declaration first, then well-formedness.
///
/// Both problems are reported when both apply, declaration error first.
pub fn validate(doc: &str) -> ValidationReport {
    let mut errors = Vec::new();
    if !doc.trim().starts_with(DECLARATION_TOKEN) {
        errors.push(MISSING_DECLARATION.to_string());
    }
    if let Err(err) = roxmltree::Document::parse(doc) {
        errors.push(format!("XML Parse Error: {err}"));
    }
    ValidationReport { errors }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLOW_NS: &str = "http://soap.sforce.com/2006/04/metadata";

    #[test]
    fn empty_document_reports_missing_declaration() {
        let report = validate("");
        assert!(!report.is_ok());
        assert!(report.errors[0].starts_with("Missing XML declaration"));
    }

    #[test]
    fn well_formed_document_without_declaration_is_rejected() {
        let doc = format!("<Flow xmlns=\"{FLOW_NS}\"><label>x</label></Flow>");
        let report = validate(&doc);
        assert_eq!(report.errors, vec![MISSING_DECLARATION.to_string()]);
    }

    #[test]
    fn declared_well_formed_document_is_ok() {
        let doc = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Flow xmlns=\"{FLOW_NS}\">\n    <label>x</label>\n</Flow>\n"
        );
        let report = validate(&doc);
        assert!(report.is_ok(), "unexpected errors: {:?}", report.errors);
    }

    #[test]
    fn unclosed_tag_reports_parse_error_with_position() {
        let doc = "<?xml version=\"1.0\"?>\n<Flow><label>x</Flow>";
        let report = validate(doc);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("XML Parse Error:"));
        assert!(report.errors[0].contains("2:"));
    }

    #[test]
    fn missing_declaration_and_parse_error_are_both_reported() {
        let report = validate("<Flow><screens></Flow>");
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0], MISSING_DECLARATION);
        assert!(report.errors[1].starts_with("XML Parse Error:"));
    }
}
