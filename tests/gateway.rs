//! End-to-end gateway tests: discovery → selection → forwarding.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::Query;
use axum::routing::get;
use axum::Json;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use service_gateway::discovery::{GossipMembership, Member, MembershipEvent};
use service_gateway::HttpServer;

mod common;

fn orders_member(name: &str, addr: SocketAddr) -> MembershipEvent {
    MembershipEvent::Join(
        Member::new(name, addr.ip().to_string())
            .with_tag("service", "orders")
            .with_tag("port", addr.port().to_string()),
    )
}

/// Naming server answering instance-list queries for `orders` only.
async fn start_naming_server(instance: SocketAddr) -> SocketAddr {
    let app = axum::Router::new().route(
        "/nacos/v1/ns/instance/list",
        get(move |Query(query): Query<HashMap<String, String>>| async move {
            let hosts: Vec<Value> = if query.get("serviceName").map(String::as_str) == Some("orders") {
                assert_eq!(query.get("healthyOnly").map(String::as_str), Some("true"));
                vec![json!({
                    "ip": instance.ip().to_string(),
                    "port": instance.port(),
                    "weight": 1.0,
                    "healthy": true,
                    "enabled": true,
                    "metadata": {}
                })]
            } else {
                Vec::new()
            };
            Json(json!({ "hosts": hosts }))
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

#[tokio::test]
async fn test_gossip_service_is_proxied() {
    let backend = common::start_echo_backend().await;
    let membership = GossipMembership::new("service");
    membership.apply(orders_member("n1", backend));

    let builder = HttpServer::builder(common::gateway_config("gossip")).gossip(Arc::clone(&membership));
    let (addr, _shutdown) = common::spawn_server(builder).await;

    let response = reqwest::get(format!("http://{addr}/orders/users/1?page=2")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.text().await.unwrap();
    let mut lines = body.lines();
    assert_eq!(lines.next(), Some("GET /users/1?page=2"));
    assert_eq!(lines.next(), Some(format!("host={backend}").as_str()));
    assert_eq!(lines.next(), Some("user-agent=-"));
}

#[tokio::test]
async fn test_bare_service_path_forwards_root() {
    let backend = common::start_echo_backend().await;
    let membership = GossipMembership::new("service");
    membership.apply(orders_member("n1", backend));

    let builder = HttpServer::builder(common::gateway_config("gossip")).gossip(membership);
    let (addr, _shutdown) = common::spawn_server(builder).await;

    let body = reqwest::get(format!("http://{addr}/orders")).await.unwrap().text().await.unwrap();
    assert!(body.starts_with("GET /\n"), "unexpected body: {body}");
}

#[tokio::test]
async fn test_unknown_service_is_bad_gateway() {
    let membership = GossipMembership::new("service");
    let builder = HttpServer::builder(common::gateway_config("gossip")).gossip(membership);
    let (addr, _shutdown) = common::spawn_server(builder).await;

    let response = reqwest::get(format!("http://{addr}/billing/invoices")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(response.text().await.unwrap(), "service billing not found");
}

#[tokio::test]
async fn test_unreachable_instance_is_bad_gateway() {
    let dead = common::closed_port().await;
    let membership = GossipMembership::new("service");
    membership.apply(orders_member("n1", dead));

    let builder = HttpServer::builder(common::gateway_config("gossip")).gossip(membership);
    let (addr, _shutdown) = common::spawn_server(builder).await;

    let response = reqwest::get(format!("http://{addr}/orders/list")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = response.text().await.unwrap();
    assert!(body.starts_with(&format!("proxy error: http://{dead}: ")), "unexpected body: {body}");
}

#[tokio::test]
async fn test_websocket_and_sse_are_rejected() {
    let backend = common::start_echo_backend().await;
    let membership = GossipMembership::new("service");
    membership.apply(orders_member("n1", backend));

    let builder = HttpServer::builder(common::gateway_config("gossip")).gossip(membership);
    let (addr, _shutdown) = common::spawn_server(builder).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("http://{addr}/orders/socket"))
        .header("upgrade", "websocket")
        .header("connection", "Upgrade")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(response.text().await.unwrap(), "websocket is not supported");

    let response = client
        .get(format!("http://{addr}/orders/events"))
        .header("accept", "text/event-stream")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(response.text().await.unwrap(), "server-sent events are not supported");
}

#[tokio::test]
async fn test_naming_backend_resolves_service() {
    let backend = common::start_echo_backend().await;
    let naming = start_naming_server(backend).await;

    let mut config = common::gateway_config("naming");
    config.discovery.naming.server_addr = format!("http://{naming}");
    let (addr, _shutdown) = common::spawn_server(HttpServer::builder(config)).await;

    let body = reqwest::get(format!("http://{addr}/orders/ping")).await.unwrap().text().await.unwrap();
    assert!(body.starts_with("GET /ping\n"), "unexpected body: {body}");

    let response = reqwest::get(format!("http://{addr}/billing/ping")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_falls_through_to_second_backend() {
    let backend = common::start_echo_backend().await;
    let membership = GossipMembership::new("service");
    membership.apply(orders_member("n1", backend));

    // Naming server unreachable: lookup errors are skipped.
    let mut config = common::gateway_config("naming,gossip");
    config.discovery.naming.server_addr = format!("http://{}", common::closed_port().await);
    let (addr, _shutdown) = common::spawn_server(HttpServer::builder(config).gossip(membership)).await;

    let response = reqwest::get(format!("http://{addr}/orders/a")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_gateway_root_prefix() {
    let backend = common::start_echo_backend().await;
    let membership = GossipMembership::new("service");
    membership.apply(orders_member("n1", backend));

    let mut config = common::gateway_config("gossip");
    config.gateway.root = "/api".to_string();
    let (addr, _shutdown) = common::spawn_server(HttpServer::builder(config).gossip(membership)).await;

    let body = reqwest::get(format!("http://{addr}/api/orders/items?x=1"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.starts_with("GET /items?x=1\n"), "unexpected body: {body}");

    let response = reqwest::get(format!("http://{addr}/orders/items")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_weighted_instances_share_traffic() {
    let first = common::start_mock_backend("first").await;
    let second = common::start_mock_backend("second").await;
    let membership = GossipMembership::new("service");
    membership.apply(MembershipEvent::Join(
        Member::new("n1", first.ip().to_string())
            .with_tag("service", "orders")
            .with_tag("port", first.port().to_string())
            .with_tag("weight", "2"),
    ));
    membership.apply(orders_member("n2", second));

    let (addr, _shutdown) =
        common::spawn_server(HttpServer::builder(common::gateway_config("gossip")).gossip(membership)).await;

    let mut bodies = Vec::new();
    for _ in 0..3 {
        bodies.push(reqwest::get(format!("http://{addr}/orders/x")).await.unwrap().text().await.unwrap());
    }
    // Smooth WRR over [first(2), second(1)]
    assert_eq!(bodies, vec!["first", "second", "first"]);
}
