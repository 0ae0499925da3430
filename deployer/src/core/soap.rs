//! SOAP envelopes and response parsing for the Metadata API.
//!
//! Only the two calls the deploy loop needs are covered: `deploy` and
//! `checkDeployStatus`. Responses are matched on the metadata namespace so
//! unrelated envelope elements never leak into results.

use anyhow::{Context, Result};
use roxmltree::{Document, Node};

use crate::core::types::{DeployOptions, DeployStatus};

pub const METADATA_NS: &str = "http://soap.sforce.com/2006/04/metadata";

/// `SOAPAction` header value for a deployment request.
pub const DEPLOY_ACTION: &str = "deploy";
/// `SOAPAction` header value for a status request.
pub const CHECK_STATUS_ACTION: &str = "checkDeployStatus";

/// Build the `deploy` envelope carrying a base64-encoded zip archive.
pub fn deploy_envelope(session_id: &str, zip_base64: &str, options: &DeployOptions) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8" ?>
<env:Envelope xmlns:xsd="http://www.w3.org/2001/XMLSchema"
              xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"
              xmlns:env="http://schemas.xmlsoap.org/soap/envelope/">
  <env:Header>
    <SessionHeader xmlns="{METADATA_NS}">
      <sessionId>{session}</sessionId>
    </SessionHeader>
  </env:Header>
  <env:Body>
    <deploy xmlns="{METADATA_NS}">
      <ZipFile>{zip_base64}</ZipFile>
      <DeployOptions>
        <allowMissingFiles>{allow_missing}</allowMissingFiles>
        <autoUpdatePackage>{auto_update}</autoUpdatePackage>
        <checkOnly>{check_only}</checkOnly>
        <rollbackOnError>{rollback}</rollbackOnError>
        <singlePackage>{single}</singlePackage>
      </DeployOptions>
    </deploy>
  </env:Body>
</env:Envelope>"#,
        session = escape_text(session_id),
        allow_missing = options.allow_missing_files,
        auto_update = options.auto_update_package,
        check_only = options.check_only,
        rollback = options.rollback_on_error,
        single = options.single_package,
    )
}

/// Build the `checkDeployStatus` envelope (details included).
pub fn check_status_envelope(session_id: &str, deploy_id: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/"
                  xmlns="{METADATA_NS}">
  <soapenv:Header>
    <SessionHeader>
      <sessionId>{session}</sessionId>
    </SessionHeader>
  </soapenv:Header>
  <soapenv:Body>
    <checkDeployStatus>
      <asyncProcessId>{deploy_id}</asyncProcessId>
      <includeDetails>true</includeDetails>
    </checkDeployStatus>
  </soapenv:Body>
</soapenv:Envelope>"#,
        session = escape_text(session_id),
        deploy_id = escape_text(deploy_id),
    )
}

/// Extract the async process id from a `deploy` response.
///
/// `Ok(None)` means the response parsed but carried no id.
pub fn parse_deploy_id(response: &str) -> Result<Option<String>> {
    let doc = Document::parse(response).context("parse deploy response")?;
    let scope = result_element(&doc).unwrap_or_else(|| doc.root());
    Ok(child_text(scope, "id")
        .or_else(|| metadata_descendant(doc.root(), "id").and_then(node_text))
        .filter(|id| !id.is_empty()))
}

/// Parse a `checkDeployStatus` response into a [`DeployStatus`].
///
/// `done`, `success` and `state` are read from the result element itself so
/// per-component `success` flags inside `details` are never mistaken for the
/// overall outcome. Errors prefer component failures over generic messages and
/// never mix the two; the result-level `errorMessage` is the last resort.
pub fn parse_deploy_status(response: &str) -> Result<DeployStatus> {
    let doc = Document::parse(response).context("parse deploy status response")?;
    let scope = result_element(&doc).unwrap_or_else(|| doc.root());

    let flag = |name: &str| child_text(scope, name).is_some_and(|value| value == "true");
    let done = flag("done");
    let success = flag("success");
    let state = child_text(scope, "state");

    let mut errors = component_failures(scope);
    if errors.is_empty() {
        errors = generic_messages(scope);
    }
    if errors.is_empty() {
        errors.extend(child_text(scope, "errorMessage"));
    }

    Ok(DeployStatus {
        done,
        success,
        state,
        errors,
    })
}

/// Extract the fault string from a SOAP fault body, if the text is one.
pub fn parse_fault(response: &str) -> Option<String> {
    let doc = Document::parse(response).ok()?;
    let fault = doc
        .descendants()
        .find(|node| node.is_element() && node.tag_name().name() == "Fault")?;
    let text = fault
        .children()
        .find(|node| node.is_element() && node.tag_name().name() == "faultstring")
        .and_then(node_text)?;
    let code = fault
        .children()
        .find(|node| node.is_element() && node.tag_name().name() == "faultcode")
        .and_then(node_text);
    Some(match code {
        Some(code) => format!("{code}: {text}"),
        None => text,
    })
}

fn component_failures(scope: Node<'_, '_>) -> Vec<String> {
    scope
        .descendants()
        .filter(|node| is_metadata(node, "componentFailures"))
        .filter_map(|failure| {
            let problem = child_text(failure, "problem")?;
            let file_name = child_text(failure, "fileName").unwrap_or_else(|| "Unknown".to_string());
            let location = match child_text(failure, "lineNumber") {
                Some(line) => {
                    let column = child_text(failure, "columnNumber").unwrap_or_default();
                    format!(" (Line {line}, Col {column})")
                }
                None => String::new(),
            };
            Some(format!("{file_name}{location}: {problem}"))
        })
        .collect()
}

fn generic_messages(scope: Node<'_, '_>) -> Vec<String> {
    scope
        .descendants()
        .filter(|node| is_metadata(node, "messages"))
        .filter_map(|message| child_text(message, "problem"))
        .collect()
}

fn result_element<'a, 'input>(doc: &'a Document<'input>) -> Option<Node<'a, 'input>> {
    metadata_descendant(doc.root(), "result")
}

fn metadata_descendant<'a, 'input>(root: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    root.descendants().find(|node| is_metadata(node, name))
}

fn is_metadata(node: &Node<'_, '_>, name: &str) -> bool {
    node.is_element()
        && node.tag_name().name() == name
        && node.tag_name().namespace() == Some(METADATA_NS)
}

fn child_text(parent: Node<'_, '_>, name: &str) -> Option<String> {
    parent
        .children()
        .find(|node| is_metadata(node, name))
        .and_then(node_text)
}

fn node_text(node: Node<'_, '_>) -> Option<String> {
    node.text()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn escape_text(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns="{METADATA_NS}">
  <soapenv:Body>{body}</soapenv:Body>
</soapenv:Envelope>"#
        )
    }

    #[test]
    fn deploy_envelope_embeds_archive_and_flags() {
        let body = deploy_envelope("00D!token&x", "UEsDBA==", &DeployOptions::new(true));
        assert!(body.contains("<ZipFile>UEsDBA==</ZipFile>"));
        assert!(body.contains("<checkOnly>true</checkOnly>"));
        assert!(body.contains("<rollbackOnError>true</rollbackOnError>"));
        assert!(body.contains("<allowMissingFiles>false</allowMissingFiles>"));
        assert!(body.contains("<sessionId>00D!token&amp;x</sessionId>"));
        roxmltree::Document::parse(&body).expect("envelope is well-formed");
    }

    #[test]
    fn full_deploy_sets_check_only_false() {
        let body = deploy_envelope("t", "", &DeployOptions::new(false));
        assert!(body.contains("<checkOnly>false</checkOnly>"));
    }

    #[test]
    fn status_envelope_requests_details() {
        let body = check_status_envelope("t", "0Af000000000001");
        assert!(body.contains("<asyncProcessId>0Af000000000001</asyncProcessId>"));
        assert!(body.contains("<includeDetails>true</includeDetails>"));
        roxmltree::Document::parse(&body).expect("envelope is well-formed");
    }

    #[test]
    fn parses_deploy_id() {
        let response = envelope(
            "<deployResponse><result><done>false</done><id>0Af5g00000ABCDE</id><state>Queued</state></result></deployResponse>",
        );
        assert_eq!(
            parse_deploy_id(&response).expect("parse").as_deref(),
            Some("0Af5g00000ABCDE")
        );
    }

    #[test]
    fn deploy_response_without_id_is_none() {
        let response = envelope("<deployResponse><result><done>false</done></result></deployResponse>");
        assert_eq!(parse_deploy_id(&response).expect("parse"), None);
    }

    #[test]
    fn malformed_response_is_an_error() {
        assert!(parse_deploy_id("<html>").is_err());
        assert!(parse_deploy_status("not xml").is_err());
    }

    #[test]
    fn status_in_progress_has_no_errors() {
        let response = envelope(
            "<checkDeployStatusResponse><result><done>false</done><state>InProgress</state><success>false</success></result></checkDeployStatusResponse>",
        );
        let status = parse_deploy_status(&response).expect("parse");
        assert!(!status.done);
        assert!(!status.success);
        assert_eq!(status.state.as_deref(), Some("InProgress"));
        assert!(status.errors.is_empty());
    }

    #[test]
    fn component_failures_take_precedence_over_messages() {
        let response = envelope(
            r#"<checkDeployStatusResponse><result>
                <details>
                  <componentFailures>
                    <columnNumber>12</columnNumber>
                    <fileName>flows/My_Flow.flow-meta.xml</fileName>
                    <lineNumber>40</lineNumber>
                    <problem>Element {http://soap.sforce.com/2006/04/metadata}screens is duplicated at this location in type Flow</problem>
                    <success>false</success>
                  </componentFailures>
                  <componentFailures>
                    <fileName>flows/My_Flow.flow-meta.xml</fileName>
                    <problem>The flow can't be saved</problem>
                    <success>false</success>
                  </componentFailures>
                  <componentSuccesses><success>true</success></componentSuccesses>
                </details>
                <done>true</done>
                <messages><problem>generic problem</problem></messages>
                <state>Failed</state>
                <success>false</success>
              </result></checkDeployStatusResponse>"#,
        );
        let status = parse_deploy_status(&response).expect("parse");
        assert!(status.done);
        assert!(!status.success);
        assert_eq!(status.state.as_deref(), Some("Failed"));
        assert_eq!(
            status.errors,
            vec![
                "flows/My_Flow.flow-meta.xml (Line 40, Col 12): Element {http://soap.sforce.com/2006/04/metadata}screens is duplicated at this location in type Flow".to_string(),
                "flows/My_Flow.flow-meta.xml: The flow can't be saved".to_string(),
            ]
        );
    }

    #[test]
    fn generic_messages_used_without_component_failures() {
        let response = envelope(
            "<checkDeployStatusResponse><result><done>true</done><messages><problem>first</problem></messages><messages><problem>second</problem></messages><success>false</success></result></checkDeployStatusResponse>",
        );
        let status = parse_deploy_status(&response).expect("parse");
        assert_eq!(status.errors, vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn component_failure_without_file_name_is_unknown() {
        let response = envelope(
            "<checkDeployStatusResponse><result><details><componentFailures><problem>bad</problem></componentFailures></details><done>true</done></result></checkDeployStatusResponse>",
        );
        let status = parse_deploy_status(&response).expect("parse");
        assert_eq!(status.errors, vec!["Unknown: bad".to_string()]);
    }

    #[test]
    fn error_message_is_last_resort() {
        let response = envelope(
            "<checkDeployStatusResponse><result><done>true</done><errorMessage>No package.xml found</errorMessage><state>Failed</state><success>false</success></result></checkDeployStatusResponse>",
        );
        let status = parse_deploy_status(&response).expect("parse");
        assert_eq!(status.errors, vec!["No package.xml found".to_string()]);
    }

    #[test]
    fn nested_component_success_does_not_mark_overall_success() {
        let response = envelope(
            "<checkDeployStatusResponse><result><details><componentSuccesses><success>true</success></componentSuccesses></details><done>true</done><success>false</success></result></checkDeployStatusResponse>",
        );
        let status = parse_deploy_status(&response).expect("parse");
        assert!(status.done);
        assert!(!status.success);
    }

    #[test]
    fn parses_fault_string() {
        let response = r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/">
  <soapenv:Body><soapenv:Fault><faultcode>sf:INVALID_SESSION_ID</faultcode><faultstring>Invalid Session ID found in SessionHeader</faultstring></soapenv:Fault></soapenv:Body>
</soapenv:Envelope>"#;
        assert_eq!(
            parse_fault(response).as_deref(),
            Some("sf:INVALID_SESSION_ID: Invalid Session ID found in SessionHeader")
        );
        assert_eq!(parse_fault("<ok/>"), None);
    }
}
