//! Outbound call to a resolved service address.

use std::time::Duration;

use bytes::Bytes;
use reqwest::{redirect, Client};
use tracing::debug;

#[derive(Debug)]
pub enum ForwardError {
    Timeout,
    Status(u16),
    Transport(String),
}

impl std::fmt::Display for ForwardError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForwardError::Timeout => write!(f, "request timed out"),
            ForwardError::Status(status) => write!(f, "target returned HTTP {}", status),
            ForwardError::Transport(msg) => write!(f, "network error: {}", msg),
        }
    }
}

impl std::error::Error for ForwardError {}

/// Response from a successfully invoked service.
#[derive(Debug, Clone)]
pub struct Forwarded {
    pub status: u16,
    pub body: Bytes,
}

/// Invokes a resolved service. One attempt, no retries.
#[async_trait::async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, address: &str) -> Result<Forwarded, ForwardError>;
}

pub struct HttpForwarder {
    client: Client,
}

impl HttpForwarder {
    /// `timeout` of `None` leaves the client without a request deadline.
    pub fn new(timeout: Option<Duration>) -> Result<Self, String> {
        let mut builder = Client::builder().redirect(redirect::Policy::none());
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| format!("failed to build HTTP client: {}", e))?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, address: &str) -> Result<Forwarded, ForwardError> {
        debug!(address, "forwarding request");
        let response = self.client.get(address).send().await.map_err(|e| {
            if e.is_timeout() {
                ForwardError::Timeout
            } else {
                ForwardError::Transport(error_chain(&e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ForwardError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ForwardError::Transport(error_chain(&e)))?;

        Ok(Forwarded {
            status: status.as_u16(),
            body,
        })
    }
}

/// `e` followed by each of its sources, joined with ": ".
pub(crate) fn error_chain(e: &dyn std::error::Error) -> String {
    let mut msg = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}
