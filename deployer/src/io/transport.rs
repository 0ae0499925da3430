//! Blocking SOAP-over-HTTP transport.
//!
//! [`SoapTransport`] is the seam between the metadata client and the network.
//! Tests substitute a scripted transport that records requests and replays
//! canned responses.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use tracing::{debug, instrument};

use crate::core::soap;

/// One SOAP call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapRequest {
    pub url: String,
    /// `SOAPAction` header value.
    pub action: &'static str,
    pub body: String,
    pub timeout: Duration,
}

pub trait SoapTransport {
    /// Send the envelope and return the response body of a 2xx reply.
    ///
    /// Non-2xx replies are errors carrying the SOAP fault string when present.
    fn send(&self, request: &SoapRequest) -> Result<String>;
}

/// Transport backed by `reqwest`'s blocking client.
pub struct HttpSoapTransport {
    client: Client,
}

impl HttpSoapTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder().build().context("build HTTP client")?;
        Ok(Self { client })
    }
}

impl SoapTransport for HttpSoapTransport {
    #[instrument(skip_all, fields(action = request.action, url = %request.url))]
    fn send(&self, request: &SoapRequest) -> Result<String> {
        let response = self
            .client
            .post(&request.url)
            .header("Content-Type", "text/xml; charset=UTF-8")
            .header("SOAPAction", request.action)
            .timeout(request.timeout)
            .body(request.body.clone())
            .send()
            .with_context(|| format!("send {} request", request.action))?;
        let status = response.status();
        let body = response
            .text()
            .with_context(|| format!("read {} response body", request.action))?;
        debug!(status = status.as_u16(), bytes = body.len(), "soap response");
        if !status.is_success() {
            let detail = soap::parse_fault(&body).unwrap_or_else(|| truncate(&body, 500));
            return Err(anyhow!("HTTP {}: {detail}", status.as_u16()));
        }
        Ok(body)
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
