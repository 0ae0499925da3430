//! Test-only doubles and fixtures: scripted model, scripted SOAP transport,
//! recording repairer, sample Flow documents and Metadata API responses.

use std::cell::RefCell;
use std::collections::VecDeque;

use anyhow::{Result, anyhow};

use crate::core::soap::METADATA_NS;
use crate::core::types::{FlowType, RepairPhase};
use crate::io::audit_log::AuditLog;
use crate::io::auth::Session;
use crate::io::model::Model;
use crate::io::transport::{SoapRequest, SoapTransport};
use crate::repair::{RepairRequest, Repairer};

/// A small screen flow that validates and classifies as [`FlowType::Screen`].
pub fn screen_flow(label: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Flow xmlns="{METADATA_NS}">
    <apiVersion>65.0</apiVersion>
    <label>{label}</label>
    <processType>Flow</processType>
    <screens>
        <name>Welcome</name>
        <label>Welcome</label>
        <locationX>0</locationX>
        <locationY>0</locationY>
        <allowBack>true</allowBack>
        <allowFinish>true</allowFinish>
        <allowPause>false</allowPause>
    </screens>
    <status>Active</status>
</Flow>"#
    )
}

/// An auto-launched flow with a record lookup.
pub fn autolaunched_flow() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Flow xmlns="{METADATA_NS}">
    <apiVersion>65.0</apiVersion>
    <label>Lookup</label>
    <processType>AutoLaunchedFlow</processType>
    <recordLookups>
        <name>GetAccount</name>
        <object>Account</object>
    </recordLookups>
</Flow>"#
    )
}

/// A document with an unclosed element. Classifies as generic.
pub fn malformed_flow() -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Flow xmlns="{METADATA_NS}">
    <screens>
        <name>Broken</name>
</Flow>"#
    )
}

pub fn test_session() -> Session {
    Session {
        access_token: "00Dxx0000000001!token".to_string(),
        instance_url: "https://example.my.salesforce.com".to_string(),
    }
}

/// Audit log rooted in a fresh temp dir. Keep the dir alive for the test.
pub fn temp_audit_log(flow_name: &str) -> Result<(tempfile::TempDir, AuditLog)> {
    let temp = tempfile::tempdir()?;
    let log = AuditLog::open(&temp.path().join("deploy_logs"), flow_name)?;
    Ok((temp, log))
}

fn soap_envelope(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/" xmlns="{METADATA_NS}">
  <soapenv:Body>{body}</soapenv:Body>
</soapenv:Envelope>"#
    )
}

/// `deploy` response carrying `id` (omitted when empty).
pub fn deploy_response(id: &str) -> String {
    let id = if id.is_empty() {
        String::new()
    } else {
        format!("<id>{id}</id>")
    };
    soap_envelope(&format!(
        "<deployResponse><result><done>false</done>{id}<state>Queued</state></result></deployResponse>"
    ))
}

pub fn status_in_progress() -> String {
    soap_envelope(
        "<checkDeployStatusResponse><result><done>false</done><state>InProgress</state><success>false</success></result></checkDeployStatusResponse>",
    )
}

pub fn status_succeeded() -> String {
    soap_envelope(
        "<checkDeployStatusResponse><result><details><componentSuccesses><success>true</success></componentSuccesses></details><done>true</done><state>Succeeded</state><success>true</success></result></checkDeployStatusResponse>",
    )
}

/// Completed, failed status with generic `messages` problems.
pub fn status_failed(problems: &[&str]) -> String {
    let messages: String = problems
        .iter()
        .map(|problem| format!("<messages><problem>{problem}</problem></messages>"))
        .collect();
    soap_envelope(&format!(
        "<checkDeployStatusResponse><result><done>true</done>{messages}<state>Failed</state><success>false</success></result></checkDeployStatusResponse>"
    ))
}

/// Completed, failed status with component failures `(file, line, problem)`.
pub fn status_component_failures(failures: &[(&str, u32, &str)]) -> String {
    let components: String = failures
        .iter()
        .map(|(file, line, problem)| {
            format!(
                "<componentFailures><columnNumber>1</columnNumber><fileName>{file}</fileName><lineNumber>{line}</lineNumber><problem>{problem}</problem><success>false</success></componentFailures>"
            )
        })
        .collect();
    soap_envelope(&format!(
        "<checkDeployStatusResponse><result><details>{components}</details><done>true</done><state>Failed</state><success>false</success></result></checkDeployStatusResponse>"
    ))
}

/// Model that replays scripted completions (`Err` strings become errors) and
/// records every prompt.
pub struct ScriptedModel {
    responses: RefCell<VecDeque<std::result::Result<String, String>>>,
    prompts: RefCell<Vec<String>>,
    available: bool,
}

impl ScriptedModel {
    pub fn new(responses: Vec<std::result::Result<String, String>>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            prompts: RefCell::new(Vec::new()),
            available: true,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(Vec::new())
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl Model for ScriptedModel {
    fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        match self.responses.borrow_mut().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted model exhausted")),
        }
    }

    fn is_available(&self) -> bool {
        self.available
    }
}

/// Transport that replays scripted response bodies and records requests.
pub struct ScriptedTransport {
    responses: RefCell<VecDeque<std::result::Result<String, String>>>,
    requests: RefCell<Vec<SoapRequest>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<std::result::Result<String, String>>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<SoapRequest> {
        self.requests.borrow().clone()
    }

    /// Number of `deploy` calls made.
    pub fn submissions(&self) -> usize {
        self.requests
            .borrow()
            .iter()
            .filter(|request| request.action == crate::core::soap::DEPLOY_ACTION)
            .count()
    }
}

impl SoapTransport for ScriptedTransport {
    fn send(&self, request: &SoapRequest) -> Result<String> {
        self.requests.borrow_mut().push(request.clone());
        match self.responses.borrow_mut().pop_front() {
            Some(Ok(body)) => Ok(body),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted transport exhausted")),
        }
    }
}

/// One repair call as seen by [`RecordingRepairer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRepair {
    pub flow_type: FlowType,
    pub document: String,
    pub errors: Vec<String>,
    pub phase: RepairPhase,
    pub attempt: u32,
}

/// Repairer that returns scripted documents in order (`None` once exhausted).
pub struct RecordingRepairer {
    fixes: RefCell<VecDeque<Option<String>>>,
    calls: RefCell<Vec<RecordedRepair>>,
}

impl RecordingRepairer {
    pub fn new(fixes: Vec<Option<String>>) -> Self {
        Self {
            fixes: RefCell::new(fixes.into()),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Repairer that returns `fix` for every call.
    pub fn always(fix: &str, times: usize) -> Self {
        Self::new(vec![Some(fix.to_string()); times])
    }

    pub fn calls(&self) -> Vec<RecordedRepair> {
        self.calls.borrow().clone()
    }
}

impl Repairer for RecordingRepairer {
    fn repair(&self, request: &RepairRequest<'_>) -> Option<String> {
        self.calls.borrow_mut().push(RecordedRepair {
            flow_type: request.flow_type,
            document: request.document.to_string(),
            errors: request.errors.to_vec(),
            phase: request.phase,
            attempt: request.attempt,
        });
        self.fixes.borrow_mut().pop_front().flatten()
    }
}
