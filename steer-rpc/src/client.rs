use std::{
    net::IpAddr,
    sync::atomic::{AtomicU32, Ordering},
};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use steer_wire::enrichment::{
    AddUeHeaderEnrichment, Codec, DeactivateUeHeaderEnrichment, Kind, Message, Response,
};

use crate::{identity_headers, ClientOptions, EnrichmentService, RpcError, ServiceRegistry};

/// Network client of the enrichment proxy controller.
///
/// Every call opens a fresh connection to the address the registry holds for
/// [`ClientOptions::service`], sends one request and waits for the matching response. The whole
/// exchange, connection setup included, is bounded by [`ClientOptions::timeout`].
#[derive(Debug)]
pub struct EnrichmentClient {
    registry: ServiceRegistry,
    options: ClientOptions,
    next_id: AtomicU32,
}

impl EnrichmentClient {
    pub fn new(registry: ServiceRegistry) -> Self {
        Self::with_options(registry, ClientOptions::default())
    }

    pub fn with_options(registry: ServiceRegistry, options: ClientOptions) -> Self {
        Self { registry, options, next_id: AtomicU32::new(1) }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Sends an activation request and returns the proxy's answer.
    pub async fn add_ue_header_enrichment(
        &self,
        request: &AddUeHeaderEnrichment,
    ) -> Result<Response, RpcError> {
        let payload = request.encode()?;
        self.call(Kind::AddUeHeaderEnrichment, payload).await
    }

    /// Sends a deactivation request and returns the proxy's answer.
    pub async fn deactivate_ue_header_enrichment(
        &self,
        request: &DeactivateUeHeaderEnrichment,
    ) -> Result<Response, RpcError> {
        self.call(Kind::DeactivateUeHeaderEnrichment, request.encode()).await
    }

    async fn call(&self, kind: Kind, payload: bytes::Bytes) -> Result<Response, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let msg = Message::new(kind, id, payload);

        tokio::time::timeout(self.options.timeout, self.exchange(msg))
            .await
            .map_err(|_| RpcError::Timeout)?
    }

    async fn exchange(&self, msg: Message) -> Result<Response, RpcError> {
        let id = msg.id();
        let mut conn = self.connect().await?;

        conn.send(msg).await?;
        tracing::debug!(id, "sent request, waiting for response");

        let Some(res) = conn.next().await else {
            return Err(RpcError::Closed);
        };

        let reply = res?;
        if reply.kind() != Kind::Response || reply.id() != id {
            return Err(RpcError::UnexpectedResponse { kind: reply.kind(), id: reply.id() });
        }

        let response = Response::decode(reply.into_payload())?;
        if !response.is_ok() {
            return Err(RpcError::Remote { code: response.code, message: response.message });
        }

        Ok(response)
    }

    async fn connect(&self) -> Result<Framed<TcpStream, Codec>, RpcError> {
        let service = &self.options.service;
        let addr = self
            .registry
            .resolve(service)
            .ok_or_else(|| RpcError::UnknownService(service.clone()))?;

        let stream = TcpStream::connect(addr).await.map_err(RpcError::Channel)?;
        stream.set_nodelay(true).map_err(RpcError::Channel)?;

        tracing::trace!(%service, %addr, "connected");
        Ok(Framed::new(stream, Codec::new()))
    }
}

#[async_trait::async_trait]
impl EnrichmentService for EnrichmentClient {
    async fn activate(
        &self,
        ue: IpAddr,
        urls: &[String],
        imsi: &str,
        msisdn: Option<&str>,
    ) -> bool {
        let request = AddUeHeaderEnrichment {
            ue_ip: ue,
            websites: urls.to_vec(),
            headers: identity_headers(imsi, msisdn),
        };

        match self.add_ue_header_enrichment(&request).await {
            Ok(_) => {
                tracing::debug!(%ue, urls = urls.len(), "activated header enrichment");
                true
            }
            Err(RpcError::Remote { code, message }) => {
                tracing::error!(%ue, code, %message, "header enrichment activation rejected");
                false
            }
            Err(e) if e.is_channel_error() => {
                tracing::error!(%ue, ?e, "could not reach enrichment proxy controller");
                false
            }
            Err(e) => {
                tracing::error!(%ue, ?e, "header enrichment activation failed");
                false
            }
        }
    }

    async fn deactivate(&self, ue: IpAddr, urls: &[String]) {
        let request = DeactivateUeHeaderEnrichment { ue_ip: ue };

        match self.deactivate_ue_header_enrichment(&request).await {
            Ok(_) => tracing::debug!(%ue, ?urls, "deactivated header enrichment"),
            Err(RpcError::Remote { code, message }) => {
                tracing::error!(%ue, code, %message, "header enrichment deactivation rejected");
            }
            Err(e) => tracing::error!(%ue, ?e, "header enrichment deactivation failed"),
        }
    }
}
