//! Cleanup of raw language-model output into a Flow document.

/// Declaration prepended when the model omits one.
pub const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>";

/// Extract an XML document from model output.
///
/// Strips a ```` ```xml ```` (or bare ```` ``` ````) fence when present and
/// prepends [`XML_DECLARATION`] if the body does not start with one. Returns
/// `None` when nothing usable remains.
pub fn clean_model_output(raw: &str) -> Option<String> {
    let text = raw.trim();
    let body = if let Some((_, rest)) = text.split_once("```xml") {
        fenced_body(rest)
    } else if let Some((_, rest)) = text.split_once("```") {
        fenced_body(rest)
    } else {
        text
    };
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    if body.starts_with("<?xml") {
        Some(body.to_string())
    } else {
        Some(format!("{XML_DECLARATION}\n{body}"))
    }
}

fn fenced_body(after_open: &str) -> &str {
    after_open
        .split_once("```")
        .map_or(after_open, |(body, _)| body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_xml_fence_and_keeps_declaration() {
        let raw = "Here you go:\n```xml\n<?xml version=\"1.0\"?>\n<Flow/>\n```\nDone.";
        assert_eq!(
            clean_model_output(raw).as_deref(),
            Some("<?xml version=\"1.0\"?>\n<Flow/>")
        );
    }

    #[test]
    fn strips_bare_fence() {
        let raw = "```\n<?xml version=\"1.0\"?><Flow/>\n```";
        assert_eq!(
            clean_model_output(raw).as_deref(),
            Some("<?xml version=\"1.0\"?><Flow/>")
        );
    }

    #[test]
    fn prepends_declaration_when_missing() {
        let cleaned = clean_model_output("<Flow/>").expect("usable");
        assert_eq!(cleaned, format!("{XML_DECLARATION}\n<Flow/>"));
    }

    #[test]
    fn unterminated_fence_keeps_remaining_text() {
        let cleaned = clean_model_output("```xml\n<Flow/>").expect("usable");
        assert!(cleaned.ends_with("<Flow/>"));
    }

    #[test]
    fn blank_output_is_unusable() {
        assert_eq!(clean_model_output("   \n"), None);
        assert_eq!(clean_model_output("```xml\n```"), None);
    }
}
