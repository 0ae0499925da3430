//! Metadata API client: submit a deployment and poll its status.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::core::soap;
use crate::core::types::{DeployOptions, DeployStatus};
use crate::io::auth::Session;
use crate::io::transport::{SoapRequest, SoapTransport};

pub const SUBMIT_TIMEOUT: Duration = Duration::from_secs(180);
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(120);

/// Failure at the submit/poll boundary. Each variant ends the current phase.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeployError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed response: {0}")]
    MalformedResponse(String),
    #[error("deploy response carried no deployment id")]
    MissingDeployId,
}

/// Client bound to one session and API version.
pub struct MetadataClient<'a, T: SoapTransport> {
    transport: &'a T,
    session: Session,
    api_version: String,
}

impl<'a, T: SoapTransport> MetadataClient<'a, T> {
    pub fn new(transport: &'a T, session: Session, api_version: &str) -> Self {
        Self {
            transport,
            session,
            api_version: api_version.to_string(),
        }
    }

    /// `<instance>/services/Soap/m/<api>`
    pub fn endpoint(&self) -> String {
        format!(
            "{}/services/Soap/m/{}",
            self.session.instance_url.trim_end_matches('/'),
            self.api_version
        )
    }

    /// Submit a zip archive; returns the async deployment id.
    #[instrument(skip_all, fields(check_only = check_only, bytes = archive.len()))]
    pub fn submit(&self, archive: &[u8], check_only: bool) -> Result<String, DeployError> {
        let body = soap::deploy_envelope(
            &self.session.access_token,
            &STANDARD.encode(archive),
            &DeployOptions::new(check_only),
        );
        let response = self.call(soap::DEPLOY_ACTION, body, SUBMIT_TIMEOUT)?;
        let id = soap::parse_deploy_id(&response)
            .map_err(|err| DeployError::MalformedResponse(format!("{err:#}")))?
            .ok_or(DeployError::MissingDeployId)?;
        debug!(deploy_id = %id, "deployment submitted");
        Ok(id)
    }

    /// One `checkDeployStatus` call.
    #[instrument(skip(self))]
    pub fn poll_once(&self, deploy_id: &str) -> Result<DeployStatus, DeployError> {
        let body = soap::check_status_envelope(&self.session.access_token, deploy_id);
        let response = self.call(soap::CHECK_STATUS_ACTION, body, STATUS_TIMEOUT)?;
        soap::parse_deploy_status(&response)
            .map_err(|err| DeployError::MalformedResponse(format!("{err:#}")))
    }

    fn call(&self, action: &'static str, body: String, timeout: Duration) -> Result<String, DeployError> {
        let request = SoapRequest {
            url: self.endpoint(),
            action,
            body,
            timeout,
        };
        self.transport
            .send(&request)
            .map_err(|err| DeployError::Transport(format!("{err:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedTransport, deploy_response, status_failed, status_in_progress};

    fn session() -> Session {
        Session {
            access_token: "00D!token".to_string(),
            instance_url: "https://example.my.salesforce.com/".to_string(),
        }
    }

    #[test]
    fn endpoint_joins_instance_and_version() {
        let transport = ScriptedTransport::new(vec![]);
        let client = MetadataClient::new(&transport, session(), "65.0");
        assert_eq!(
            client.endpoint(),
            "https://example.my.salesforce.com/services/Soap/m/65.0"
        );
    }

    #[test]
    fn submit_sends_deploy_action_and_returns_id() {
        let transport = ScriptedTransport::new(vec![Ok(deploy_response("0Af000000000001"))]);
        let client = MetadataClient::new(&transport, session(), "65.0");
        let id = client.submit(b"zip-bytes", true).expect("submit");
        assert_eq!(id, "0Af000000000001");

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].action, "deploy");
        assert_eq!(requests[0].timeout, SUBMIT_TIMEOUT);
        assert!(requests[0].body.contains(&STANDARD.encode(b"zip-bytes")));
        assert!(requests[0].body.contains("<checkOnly>true</checkOnly>"));
    }

    #[test]
    fn submit_without_id_is_missing_deploy_id() {
        let transport = ScriptedTransport::new(vec![Ok(deploy_response(""))]);
        let client = MetadataClient::new(&transport, session(), "65.0");
        assert_eq!(client.submit(b"z", false), Err(DeployError::MissingDeployId));
    }

    #[test]
    fn submit_with_garbage_is_malformed() {
        let transport = ScriptedTransport::new(vec![Ok("<<<".to_string())]);
        let client = MetadataClient::new(&transport, session(), "65.0");
        assert!(matches!(
            client.submit(b"z", false),
            Err(DeployError::MalformedResponse(_))
        ));
    }

    #[test]
    fn transport_failure_is_reported() {
        let transport = ScriptedTransport::new(vec![Err("HTTP 500: sf:INVALID_SESSION_ID".to_string())]);
        let client = MetadataClient::new(&transport, session(), "65.0");
        match client.submit(b"z", false) {
            Err(DeployError::Transport(message)) => assert!(message.contains("INVALID_SESSION_ID")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn poll_once_parses_status() {
        let transport = ScriptedTransport::new(vec![
            Ok(status_in_progress()),
            Ok(status_failed(&["flows/F.flow-meta.xml: bad"])),
        ]);
        let client = MetadataClient::new(&transport, session(), "65.0");

        let first = client.poll_once("0Af1").expect("poll");
        assert!(!first.done);

        let second = client.poll_once("0Af1").expect("poll");
        assert!(second.done);
        assert!(!second.success);
        assert_eq!(second.errors.len(), 1);

        let requests = transport.requests();
        assert_eq!(requests[1].action, "checkDeployStatus");
        assert!(requests[1].body.contains("<asyncProcessId>0Af1</asyncProcessId>"));
    }
}
