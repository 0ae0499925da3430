//! Deterministic flow-type classification.
//!
//! A flow's type is rarely declared reliably by a single field, and documents
//! reach this code precisely when they are broken. Classification therefore
//! walks an ordered list of structural rules and falls back to
//! [`FlowType::Generic`]. Elements are matched by local name so documents with
//! a missing or wrong namespace still classify.

use roxmltree::{Document, Node};
use tracing::debug;

use crate::core::types::FlowType;

/// One entry of the priority list: a named predicate and the type it yields.
#[derive(Clone, Copy)]
pub struct ClassifierRule {
    pub name: &'static str,
    pub matches: fn(&Document<'_>) -> bool,
    pub flow_type: FlowType,
}

/// Rules in priority order. First match wins.
pub const RULES: &[ClassifierRule] = &[
    ClassifierRule {
        name: "process_type_autolaunched",
        matches: process_type_is_autolaunched,
        flow_type: FlowType::Autolaunched,
    },
    ClassifierRule {
        name: "process_type_workflow",
        matches: process_type_is_workflow,
        flow_type: FlowType::Autolaunched,
    },
    ClassifierRule {
        name: "has_screens",
        matches: has_screens,
        flow_type: FlowType::Screen,
    },
    ClassifierRule {
        name: "start_record_save_trigger",
        matches: start_has_record_save_trigger,
        flow_type: FlowType::RecordTriggered,
    },
    ClassifierRule {
        name: "start_scheduled_trigger",
        matches: start_has_scheduled_trigger,
        flow_type: FlowType::Scheduled,
    },
    ClassifierRule {
        name: "start_record_trigger_type",
        matches: start_has_record_trigger_type,
        flow_type: FlowType::RecordTriggered,
    },
    ClassifierRule {
        name: "record_operations",
        matches: has_record_operations,
        flow_type: FlowType::Autolaunched,
    },
    ClassifierRule {
        name: "interview_label_mentions_user",
        matches: interview_label_mentions_user,
        flow_type: FlowType::Screen,
    },
];

/// Name reported when no rule matched or the document did not parse.
pub const FALLBACK_RULE: &str = "fallback";

/// Classify `doc`. Never fails: unparseable input yields `Generic`.
pub fn classify(doc: &str) -> FlowType {
    explain(doc).0
}

/// Classify `doc` and return the name of the deciding rule.
pub fn explain(doc: &str) -> (FlowType, &'static str) {
    let parsed = match Document::parse(doc) {
        Ok(parsed) => parsed,
        Err(err) => {
            debug!(err = %err, "flow type detection fell back on unparseable document");
            return (FlowType::Generic, FALLBACK_RULE);
        }
    };
    RULES
        .iter()
        .find(|rule| (rule.matches)(&parsed))
        .map(|rule| (rule.flow_type, rule.name))
        .unwrap_or((FlowType::Generic, FALLBACK_RULE))
}

fn find_first<'a, 'input>(root: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    root.descendants()
        .find(|node| node.is_element() && node.tag_name().name() == name)
}

fn has_element(doc: &Document<'_>, name: &str) -> bool {
    find_first(doc.root(), name).is_some()
}

/// Lowercased text of the first element named `name`, if it has any.
fn first_text_lower(root: Node<'_, '_>, name: &str) -> Option<String> {
    find_first(root, name)
        .and_then(|node| node.text())
        .map(|text| text.trim().to_lowercase())
        .filter(|text| !text.is_empty())
}

fn process_type_is_autolaunched(doc: &Document<'_>) -> bool {
    first_text_lower(doc.root(), "processType").is_some_and(|value| value.contains("autolaunched"))
}

fn process_type_is_workflow(doc: &Document<'_>) -> bool {
    first_text_lower(doc.root(), "processType").is_some_and(|value| value.contains("workflow"))
}

fn has_screens(doc: &Document<'_>) -> bool {
    has_element(doc, "screens")
}

fn start_trigger_type(doc: &Document<'_>) -> Option<String> {
    find_first(doc.root(), "start").and_then(|start| first_text_lower(start, "triggerType"))
}

fn start_has_record_save_trigger(doc: &Document<'_>) -> bool {
    start_trigger_type(doc)
        .is_some_and(|value| value.contains("recordafter") || value.contains("recordbefore"))
}

fn start_has_scheduled_trigger(doc: &Document<'_>) -> bool {
    start_trigger_type(doc).is_some_and(|value| value.contains("scheduled"))
}

fn start_has_record_trigger_type(doc: &Document<'_>) -> bool {
    find_first(doc.root(), "start")
        .is_some_and(|start| find_first(start, "recordTriggerType").is_some())
}

fn has_record_operations(doc: &Document<'_>) -> bool {
    ["recordLookups", "recordUpdates", "recordCreates", "recordDeletes"]
        .iter()
        .any(|name| has_element(doc, name))
}

fn interview_label_mentions_user(doc: &Document<'_>) -> bool {
    first_text_lower(doc.root(), "interviewLabel")
        .is_some_and(|label| label.contains("screen") || label.contains("user"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flow(body: &str) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Flow xmlns=\"http://soap.sforce.com/2006/04/metadata\">\n{body}\n</Flow>\n"
        )
    }

    fn rule(name: &str) -> &'static ClassifierRule {
        RULES
            .iter()
            .find(|rule| rule.name == name)
            .expect("rule exists")
    }

    #[test]
    fn screens_element_classifies_as_screen() {
        let doc = flow("<screens><name>Welcome</name></screens>");
        assert_eq!(classify(&doc), FlowType::Screen);
    }

    #[test]
    fn autolaunched_process_type_with_lookups_is_autolaunched() {
        let doc = flow(
            "<processType>AutoLaunchedFlow</processType>\n<recordLookups><name>Get</name></recordLookups>",
        );
        assert_eq!(classify(&doc), FlowType::Autolaunched);
    }

    #[test]
    fn process_type_takes_precedence_over_screens() {
        let doc = flow("<processType>autolaunchedflow</processType>\n<screens/>");
        assert_eq!(explain(&doc), (FlowType::Autolaunched, "process_type_autolaunched"));
    }

    #[test]
    fn workflow_process_type_is_autolaunched() {
        let doc = flow("<processType>Workflow</processType>");
        assert_eq!(explain(&doc), (FlowType::Autolaunched, "process_type_workflow"));
    }

    #[test]
    fn start_trigger_types_select_record_triggered_or_scheduled() {
        let after = flow("<start><triggerType>RecordAfterSave</triggerType></start>");
        let before = flow("<start><triggerType>RecordBeforeSave</triggerType></start>");
        let scheduled = flow("<start><triggerType>Scheduled</triggerType></start>");
        assert_eq!(classify(&after), FlowType::RecordTriggered);
        assert_eq!(classify(&before), FlowType::RecordTriggered);
        assert_eq!(classify(&scheduled), FlowType::Scheduled);
    }

    #[test]
    fn record_trigger_type_without_known_trigger_is_record_triggered() {
        let doc = flow(
            "<start><triggerType>PlatformEvent</triggerType><recordTriggerType>Create</recordTriggerType></start>",
        );
        assert_eq!(explain(&doc), (FlowType::RecordTriggered, "start_record_trigger_type"));
    }

    #[test]
    fn record_trigger_type_outside_start_is_ignored() {
        let doc = flow("<start/>\n<recordTriggerType>Create</recordTriggerType>");
        assert_eq!(classify(&doc), FlowType::Generic);
    }

    #[test]
    fn record_operations_without_process_type_are_autolaunched() {
        for element in ["recordLookups", "recordUpdates", "recordCreates", "recordDeletes"] {
            let doc = flow(&format!("<{element}><name>Op</name></{element}>"));
            assert_eq!(classify(&doc), FlowType::Autolaunched, "{element}");
        }
    }

    #[test]
    fn interview_label_mentioning_user_is_screen() {
        let doc = flow("<interviewLabel>Collect User Input {!$Flow.CurrentDateTime}</interviewLabel>");
        assert_eq!(explain(&doc), (FlowType::Screen, "interview_label_mentions_user"));
    }

    #[test]
    fn documents_without_signals_fall_back_to_generic() {
        let doc = flow("<label>Plain</label>");
        assert_eq!(explain(&doc), (FlowType::Generic, FALLBACK_RULE));
    }

    #[test]
    fn malformed_documents_fall_back_to_generic() {
        assert_eq!(classify(""), FlowType::Generic);
        assert_eq!(classify("<Flow><screens></Flow>"), FlowType::Generic);
    }

    #[test]
    fn classification_ignores_namespace() {
        let doc = "<?xml version=\"1.0\"?><Flow><screens/></Flow>";
        assert_eq!(classify(doc), FlowType::Screen);
    }

    #[test]
    fn classification_is_deterministic() {
        let doc = flow("<start><triggerType>Scheduled</triggerType></start>");
        let first = classify(&doc);
        for _ in 0..5 {
            assert_eq!(classify(&doc), first);
        }
    }

    #[test]
    fn rules_can_be_targeted_individually() {
        let parsed_source = flow("<screens/>");
        let parsed = Document::parse(&parsed_source).expect("parse");
        assert!((rule("has_screens").matches)(&parsed));
        assert!(!(rule("record_operations").matches)(&parsed));
        assert!(!(rule("process_type_autolaunched").matches)(&parsed));
    }
}
