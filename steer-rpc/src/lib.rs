#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Client side of the enrichment proxy controller RPC.
//!
//! The controller that owns the flow rules talks to the proxy through the [`EnrichmentService`]
//! trait. [`EnrichmentClient`] is the network implementation: every call resolves the service
//! through a [`ServiceRegistry`], opens a connection and waits for the answer for at most
//! [`ClientOptions::timeout`].

use std::{net::IpAddr, time::Duration};

use thiserror::Error;

use steer_wire::enrichment;

mod client;
mod registry;

pub use client::EnrichmentClient;
pub use registry::ServiceRegistry;

/// Name under which the enrichment proxy controller is registered.
pub const SERVICE_NAME: &str = "envoy_controller";

/// Upper bound for a single call, connection setup included.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Service not registered: {0}")]
    UnknownService(String),
    #[error("Failed to open channel: {0:?}")]
    Channel(#[source] std::io::Error),
    #[error("Wire protocol error: {0:?}")]
    Wire(#[from] enrichment::Error),
    #[error("Request timed out")]
    Timeout,
    #[error("Connection closed before a response arrived")]
    Closed,
    #[error("Unexpected response (kind {kind:?}, id {id})")]
    UnexpectedResponse { kind: enrichment::Kind, id: u32 },
    #[error("Remote error[{code}] {message}")]
    Remote { code: u32, message: String },
}

impl RpcError {
    /// Returns `true` if no channel to the service could be acquired.
    pub fn is_channel_error(&self) -> bool {
        matches!(self, Self::UnknownService(_) | Self::Channel(_))
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Service name resolved through the registry on every call.
    pub service: String,
    /// Deadline of a single call. There are no retries.
    pub timeout: Duration,
}

impl ClientOptions {
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self { service: SERVICE_NAME.to_string(), timeout: DEFAULT_TIMEOUT }
    }
}

/// Activation and deactivation of header enrichment for a subscriber.
///
/// Neither call raises: activation reports plain success or failure and deactivation is best
/// effort. Failures are logged by the implementation.
#[async_trait::async_trait]
pub trait EnrichmentService: Send + Sync {
    /// Starts enriching HTTP requests from `ue` towards `urls` with the subscriber's identity
    /// headers. Returns `true` only if the proxy confirmed.
    async fn activate(&self, ue: IpAddr, urls: &[String], imsi: &str, msisdn: Option<&str>)
        -> bool;

    /// Stops enriching requests from `ue`. `urls` is informational; the proxy drops every
    /// target of the subscriber.
    async fn deactivate(&self, ue: IpAddr, urls: &[String]);
}

#[async_trait::async_trait]
impl<S: EnrichmentService + ?Sized> EnrichmentService for std::sync::Arc<S> {
    async fn activate(
        &self,
        ue: IpAddr,
        urls: &[String],
        imsi: &str,
        msisdn: Option<&str>,
    ) -> bool {
        (**self).activate(ue, urls, imsi, msisdn).await
    }

    async fn deactivate(&self, ue: IpAddr, urls: &[String]) {
        (**self).deactivate(ue, urls).await
    }
}

/// Builds the identity headers of an activation request. The MSISDN header is only added when
/// present and non-empty.
pub fn identity_headers(imsi: &str, msisdn: Option<&str>) -> Vec<enrichment::HeaderField> {
    let mut headers = vec![enrichment::HeaderField::new(enrichment::IMSI_HEADER, imsi)];
    if let Some(msisdn) = msisdn.filter(|m| !m.is_empty()) {
        headers.push(enrichment::HeaderField::new(enrichment::MSISDN_HEADER, msisdn));
    }
    headers
}
