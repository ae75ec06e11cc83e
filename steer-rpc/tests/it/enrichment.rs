use std::{net::SocketAddr, time::Duration};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::codec::Framed;

use steer_rpc::{ClientOptions, EnrichmentClient, EnrichmentService, ServiceRegistry, SERVICE_NAME};
use steer_wire::enrichment::{
    AddUeHeaderEnrichment, Codec, DeactivateUeHeaderEnrichment, HeaderField, Kind, Message,
    Response,
};

/// A proxy controller stand-in. Answers every request with `response` and forwards the
/// received frames to the returned channel.
async fn spawn_proxy(response: Response) -> (SocketAddr, mpsc::UnboundedReceiver<Message>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((io, _)) = listener.accept().await {
            let mut conn = Framed::new(io, Codec::new());
            let Some(Ok(request)) = conn.next().await else { continue };

            let reply = Message::new(Kind::Response, request.id(), response.encode().unwrap());
            let _ = tx.send(request);
            conn.send(reply).await.unwrap();
        }
    });

    (addr, rx)
}

fn client_for(addr: SocketAddr) -> EnrichmentClient {
    let registry = ServiceRegistry::new();
    registry.register(SERVICE_NAME, addr);
    EnrichmentClient::new(registry)
}

fn urls() -> Vec<String> {
    vec!["abc.com".to_string(), "xyz.com".to_string()]
}

#[tokio::test]
async fn activate_sends_identity_headers() {
    let _ = tracing_subscriber::fmt::try_init();

    let (addr, mut requests) = spawn_proxy(Response::ok()).await;
    let client = client_for(addr);

    let ue = "1.1.1.1".parse().unwrap();
    assert!(client.activate(ue, &urls(), "IMSI01", Some("5551234")).await);

    let request = requests.recv().await.unwrap();
    assert_eq!(request.kind(), Kind::AddUeHeaderEnrichment);

    let request = AddUeHeaderEnrichment::decode(request.into_payload()).unwrap();
    assert_eq!(request.ue_ip, ue);
    assert_eq!(request.websites, urls());
    assert_eq!(
        request.headers,
        vec![HeaderField::new("imsi", "IMSI01"), HeaderField::new("msisdn", "5551234")]
    );
}

#[tokio::test]
async fn activate_reports_remote_errors() {
    let _ = tracing_subscriber::fmt::try_init();

    let (addr, _requests) = spawn_proxy(Response::error(13, "internal")).await;
    let client = client_for(addr);

    assert!(!client.activate("1.1.1.1".parse().unwrap(), &urls(), "IMSI01", None).await);
}

#[tokio::test]
async fn activate_without_registered_service_fails() {
    let _ = tracing_subscriber::fmt::try_init();

    let client = EnrichmentClient::new(ServiceRegistry::new());
    assert!(!client.activate("1.1.1.1".parse().unwrap(), &urls(), "IMSI01", None).await);
}

#[tokio::test]
async fn activate_times_out_on_silent_proxy() {
    let _ = tracing_subscriber::fmt::try_init();

    // Accepts connections but never answers.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((io, _)) = listener.accept().await {
            held.push(io);
        }
    });

    let registry = ServiceRegistry::new();
    registry.register(SERVICE_NAME, addr);
    let client = EnrichmentClient::with_options(
        registry,
        ClientOptions::default().with_timeout(Duration::from_millis(100)),
    );

    let ue = "1.1.1.1".parse().unwrap();
    let res = tokio::time::timeout(
        Duration::from_secs(5),
        client.activate(ue, &urls(), "IMSI01", None),
    )
    .await
    .unwrap();
    assert!(!res);
}

#[tokio::test]
async fn deactivate_carries_only_the_address() {
    let _ = tracing_subscriber::fmt::try_init();

    let (addr, mut requests) = spawn_proxy(Response::ok()).await;
    let client = client_for(addr);

    let ue = "2001:db8::1".parse().unwrap();
    client.deactivate(ue, &urls()).await;

    let request = requests.recv().await.unwrap();
    assert_eq!(request.kind(), Kind::DeactivateUeHeaderEnrichment);
    assert_eq!(
        DeactivateUeHeaderEnrichment::decode(request.into_payload()).unwrap(),
        DeactivateUeHeaderEnrichment { ue_ip: ue }
    );
}

#[tokio::test]
async fn deactivate_survives_unreachable_proxy() {
    let _ = tracing_subscriber::fmt::try_init();

    // Bind and drop to get a port nobody listens on.
    let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
    let client = client_for(addr);

    client.deactivate("1.1.1.1".parse().unwrap(), &[]).await;
}
