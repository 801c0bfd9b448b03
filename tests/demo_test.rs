//! The demo shop end to end: server app, wire format and client session in
//! one process.

#![allow(clippy::unwrap_used, clippy::panic, clippy::indexing_slicing, clippy::arithmetic_side_effects)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use arbor::demo::{Demo, demo};
use arbor_client::{
    CacheLookup, ClientSession, Result, Submission, TowerTransport, Transport, TransportRequest, TransportResponse,
};
use arbor_core::RouteId;
use arbor_server::ServerConfig;
use arbor_wire::{CONTENT_TYPE, Element, Node, RedactErrors, ServerPayload};
use async_trait::async_trait;
use bytes::Bytes;
use http::{Request, header};

struct Counting {
    inner: TowerTransport<axum::Router>,
    sent: AtomicUsize,
}

#[async_trait]
impl Transport for Counting {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        self.inner.send(request).await
    }
}

impl Counting {
    fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

fn shop() -> (Demo, Arc<Counting>) {
    let demo = demo(ServerConfig::default()).unwrap();
    let transport = Arc::new(Counting {
        inner: TowerTransport::new(demo.app.router()),
        sent: AtomicUsize::new(0),
    });
    (demo, transport)
}

async fn visit(transport: &Arc<Counting>, href: &str) -> ClientSession {
    let transport: Arc<dyn Transport> = transport.clone();
    ClientSession::builder(transport)
        .modules(arbor::demo::client_modules())
        .load(href)
        .await
        .unwrap()
}

fn id(id: &str) -> RouteId {
    RouteId::from(id)
}

#[tokio::test]
async fn test_hydrate_from_document_response() {
    let (demo, transport) = shop();
    let request = Request::get("/products/2")
        .header(header::ACCEPT, "text/html")
        .body(Bytes::new())
        .unwrap();
    let response = demo.app.handle(request).await;
    // Without a document shell the payload itself is the document.
    assert_eq!(response.headers()[header::CONTENT_TYPE], CONTENT_TYPE);
    let payload = ServerPayload::decode(response.into_body().into_data_stream()).await.unwrap();

    let transport: Arc<dyn Transport> = transport;
    let session = ClientSession::builder(transport)
        .modules(arbor::demo::client_modules())
        .hydrate(payload)
        .unwrap();
    let state = session.state();
    assert_eq!(state.location.pathname, "/products/2");
    assert_eq!(
        state.loader_data[&id("product")].get("name"),
        Some(&Node::from("Birch chair"))
    );
    let expected: Node = Element::new("body").child(Element::new("h1").child("Birch chair")).into();
    assert_eq!(session.route_view(), expected);
}

#[tokio::test]
async fn test_browse_catalog_and_unknown_product() {
    let (_demo, transport) = shop();
    let session = visit(&transport, "/").await;
    assert_eq!(session.state().loader_data[&id("root")], Node::from("Arbor Shop"));

    let state = session.navigate("/products/3").await.unwrap();
    assert_eq!(state.loader_data[&id("product")].get("name"), Some(&Node::from("Maple shelf")));

    let state = session.navigate("/products/9").await.unwrap();
    assert_eq!(state.status, 404);
    assert_eq!(state.errors[&id("root")].message, "no product 9");
    let view = session.route_view();
    let expected: Node = Element::new("body")
        .child(Element::new("main").prop("status", 404_i64).child("no product 9"))
        .into();
    assert_eq!(view, expected);
}

#[tokio::test]
async fn test_cart_mutation_and_revalidation_hook() {
    let (demo, transport) = shop();
    let session = visit(&transport, "/cart").await;
    assert_eq!(session.state().loader_data[&id("cart")], Node::from(0_i64));

    let sent = transport.sent();
    let state = session.submit("/cart", Submission::form([("qty", "3")])).await.unwrap();
    assert_eq!(transport.sent(), sent + 1);
    assert_eq!(state.action_data.unwrap()[&id("cart")], Node::from(3_i64));
    assert_eq!(state.loader_data[&id("cart")], Node::from(3_i64));
    assert_eq!(demo.shop.cart_items(), 3);

    // Its hook makes the cart refetch even though its entry is fresh.
    session.navigate("/").await.unwrap();
    let sent = transport.sent();
    session.back().await.unwrap().unwrap();
    assert_eq!(transport.sent(), sent + 1);
}

#[tokio::test]
async fn test_bad_submission_lands_on_root_boundary() {
    let (_demo, transport) = shop();
    let session = visit(&transport, "/cart").await;

    let state = session
        .submit("/cart", Submission::form([("qty", "many")]))
        .await
        .unwrap();
    assert_eq!(state.status, 400);
    assert_eq!(state.errors[&id("root")].message, "qty must be a number");
}

#[tokio::test]
async fn test_account_redirects_to_login() {
    let (_demo, transport) = shop();
    let session = visit(&transport, "/").await;

    let state = session.navigate("/account").await.unwrap();
    assert_eq!(state.location.pathname, "/login");
    assert!(matches!(session.cache().lookup(&id("login"), "/login"), CacheLookup::Fresh(_)));

    // Loading a redirecting page directly lands on the target too.
    let direct = visit(&transport, "/account").await;
    assert_eq!(direct.state().location.pathname, "/login");
}

#[tokio::test]
async fn test_clear_cart_server_function() {
    let (demo, transport) = shop();
    let session = visit(&transport, "/cart").await;
    session.submit("/cart", Submission::form([("qty", "2")])).await.unwrap();

    let result = session.call_server(&demo.clear_cart, Vec::new()).await.unwrap();
    assert_eq!(result.unwrap(), Node::from(2_i64));
    assert_eq!(demo.shop.cart_items(), 0);
    assert_eq!(session.state().loader_data[&id("cart")], Node::from(0_i64));
}

#[tokio::test]
async fn test_recent_uses_client_loader() {
    let (_demo, transport) = shop();
    let session = visit(&transport, "/").await;

    let state = session.navigate("/recent").await.unwrap();
    let recent = &state.loader_data[&id("recent")];
    assert_eq!(recent.get("source"), Some(&Node::from("client")));
    assert_eq!(
        recent.get("viewed"),
        Some(&Node::Array(vec![Node::from("Oak table")]))
    );
}

#[tokio::test]
async fn test_redaction_keeps_explicit_responses() {
    let demo = demo(ServerConfig {
        redact_errors: RedactErrors::Message("Something went wrong".into()),
        ..ServerConfig::default()
    })
    .unwrap();
    let transport: Arc<dyn Transport> = Arc::new(TowerTransport::new(demo.app.router()));
    let session = ClientSession::builder(transport).load("/cart").await.unwrap();

    // Explicit responses keep their message under redaction.
    let state = session
        .submit("/cart", Submission::form([("qty", "x")]))
        .await
        .unwrap();
    let error = &state.errors[&id("root")];
    assert_eq!(error.message, "qty must be a number");
    assert!(error.is_response);
}
