//! The transport seam: executes one `HttpRequest` and returns its response.
//!
//! # Design
//! A transport reports HTTP error statuses as ordinary responses. Only a
//! missing response (connect failure, DNS, timeout, broken body) is an
//! error. Status interpretation belongs to the gateway so every call shape
//! normalizes failures the same way.

use std::time::Duration;

use crate::http::{HttpRequest, HttpResponse};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The request could not be turned into a wire request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No response was received.
    #[error("no response received: {0}")]
    Io(String),
}

pub trait Transport: Send + Sync + 'static {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Blocking transport backed by a shared `ureq` agent.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    /// `timeout` bounds the whole exchange; `None` keeps ureq's defaults.
    pub fn new(timeout: Option<Duration>) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(timeout)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = ureq::http::Request::builder()
            .method(request.method.as_str())
            .uri(request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let result = match &request.body {
            Some(body) => {
                let wire = builder
                    .body(body.as_slice())
                    .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
                self.agent.run(wire)
            }
            None => {
                let wire = builder
                    .body(())
                    .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
                self.agent.run(wire)
            }
        };
        let mut response = result.map_err(|e| TransportError::Io(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .body_mut()
            .read_to_vec()
            .map_err(|e| TransportError::Io(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
