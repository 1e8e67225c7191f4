//! NMOS control surface over real HTTP connections

use std::net::{SocketAddr, UdpSocket};

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use aes67::receiver::{Aes67Receiver, ReceiverConfig, ReceiverState};
use aes67::sender::{Aes67Sender, SenderConfig};
use aes67::types::{NetworkConfig, NodeConfig};
use aes67::NmosNode;

fn free_udp_port() -> u16 {
    let probe = UdpSocket::bind("127.0.0.1:0").unwrap();
    probe.local_addr().unwrap().port()
}

async fn start_node() -> (NmosNode, SocketAddr) {
    let node = NmosNode::new(
        NodeConfig::with_label("Test Node"),
        NetworkConfig {
            node_port: 0,
            ..Default::default()
        },
    );
    let addr = node.start().await.unwrap();
    (node, addr)
}

/// One-shot HTTP exchange, returning (status, body)
async fn request(addr: SocketAddr, method: &str, path: &str, body: Option<&str>) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let body = body.unwrap_or_default();
    let request = format!(
        "{method} {path} HTTP/1.1\r\n\
         Host: localhost\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8(response).unwrap();

    let status: u16 = response
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .expect("malformed status line");
    let body = response
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_default();

    (status, body)
}

async fn get_json(addr: SocketAddr, path: &str) -> (u16, Value) {
    let (status, body) = request(addr, "GET", path, None).await;
    let value = serde_json::from_str(&body).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_node_api_index_and_self() {
    let (node, addr) = start_node().await;

    let (status, index) = get_json(addr, "/x-nmos/node/v1.3/").await;
    assert_eq!(status, 200);
    let names: Vec<&str> = index
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert!(names.contains(&"self/"));
    assert!(names.contains(&"senders/"));
    assert!(names.contains(&"receivers/"));

    let (status, this) = get_json(addr, "/x-nmos/node/v1.3/self").await;
    assert_eq!(status, 200);
    assert_eq!(this["id"].as_str().unwrap(), node.node_id());
    assert_eq!(this["label"], "Test Node");
    assert_eq!(this["clocks"][0]["ref_type"], "ptp");
    assert!(this["api"]["versions"]
        .as_array()
        .unwrap()
        .contains(&Value::from("v1.3")));

    node.stop().await;
}

#[tokio::test]
async fn test_resource_listings() {
    let (node, addr) = start_node().await;

    let sender = Aes67Sender::new(SenderConfig {
        label: "Main Out".to_string(),
        ..Default::default()
    })
    .unwrap();
    let receiver = Aes67Receiver::new(ReceiverConfig {
        label: "Main In".to_string(),
        ..Default::default()
    });
    let sender_id = node.register_sender(&sender).await;
    let receiver_id = node.register_receiver(&receiver).await;

    let (status, senders) = get_json(addr, "/x-nmos/node/v1.3/senders").await;
    assert_eq!(status, 200);
    let senders = senders.as_array().unwrap();
    assert_eq!(senders.len(), 1);
    assert_eq!(senders[0]["id"], Value::from(sender_id.as_str()));
    assert_eq!(senders[0]["label"], "Main Out");
    assert_eq!(senders[0]["device_id"], Value::from(node.device_id()));
    assert_eq!(senders[0]["transport"], "urn:x-nmos:transport:rtp.mcast");

    let (status, receivers) = get_json(addr, "/x-nmos/node/v1.3/receivers").await;
    assert_eq!(status, 200);
    assert_eq!(receivers.as_array().unwrap().len(), 1);
    assert_eq!(receivers[0]["id"], Value::from(receiver_id.as_str()));

    node.stop().await;
}

#[tokio::test]
async fn test_unknown_paths_are_404() {
    let (node, addr) = start_node().await;

    let (status, _) = request(addr, "GET", "/x-nmos/node/v1.3/nonsense", None).await;
    assert_eq!(status, 404);

    let (status, body) = request(addr, "GET", "/definitely/not/nmos", None).await;
    assert_eq!(status, 404);
    let error: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(error["code"], 404);

    let (status, _) = request(
        addr,
        "GET",
        "/x-nmos/connection/v1.1/single/receivers/unknown-id/active",
        None,
    )
    .await;
    assert_eq!(status, 404);

    node.stop().await;
}

#[tokio::test]
async fn test_staged_active_cycle_over_http() {
    let (node, addr) = start_node().await;

    let receiver = Aes67Receiver::new(ReceiverConfig::default());
    let id = node.register_receiver(&receiver).await;
    let port = free_udp_port();

    // Default active state: empty addresses, port 0, disabled.
    let (status, active) =
        get_json(addr, &format!("/x-nmos/connection/v1.1/single/receivers/{id}/active")).await;
    assert_eq!(status, 200);
    assert_eq!(active["master_enable"], false);
    assert_eq!(active["transport_params"][0]["multicast_ip"], "");
    assert_eq!(active["transport_params"][0]["destination_port"], 0);

    // PATCH staged with an immediate activation.
    let patch = format!(
        r#"{{
            "master_enable": true,
            "activation": {{"mode": "activate_immediate"}},
            "transport_params": [{{"multicast_ip": "127.0.0.1", "destination_port": {port}}}]
        }}"#
    );
    let (status, body) = request(
        addr,
        "PATCH",
        &format!("/x-nmos/connection/v1.1/single/receivers/{id}/staged"),
        Some(&patch),
    )
    .await;
    assert_eq!(status, 200, "patch failed: {body}");
    let applied: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(applied["master_enable"], true);
    assert!(applied["activation"]["activation_time"].is_string());

    // Active now reflects the new parameters and the engine is running.
    let (status, active) =
        get_json(addr, &format!("/x-nmos/connection/v1.1/single/receivers/{id}/active")).await;
    assert_eq!(status, 200);
    assert_eq!(active["master_enable"], true);
    assert_eq!(active["transport_params"][0]["multicast_ip"], "127.0.0.1");
    assert_eq!(
        active["transport_params"][0]["destination_port"],
        Value::from(port)
    );
    assert_eq!(receiver.state(), ReceiverState::Receiving);

    // master_enable false tears the connection down.
    let (status, _) = request(
        addr,
        "PATCH",
        &format!("/x-nmos/connection/v1.1/single/receivers/{id}/staged"),
        Some(r#"{"master_enable": false, "activation": {"mode": "activate_immediate"}}"#),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(receiver.state(), ReceiverState::Stopped);

    node.stop().await;
}

#[tokio::test]
async fn test_malformed_patch_is_400() {
    let (node, addr) = start_node().await;
    let receiver = Aes67Receiver::new(ReceiverConfig::default());
    let id = node.register_receiver(&receiver).await;

    let (status, body) = request(
        addr,
        "PATCH",
        &format!("/x-nmos/connection/v1.1/single/receivers/{id}/staged"),
        Some("{not json"),
    )
    .await;
    assert_eq!(status, 400);
    let error: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(error["code"], 400);

    node.stop().await;
}

#[tokio::test]
async fn test_node_api_rejects_writes() {
    let (node, addr) = start_node().await;

    let (status, _) = request(addr, "PATCH", "/x-nmos/node/v1.3/self", Some("{}")).await;
    assert_eq!(status, 405);

    node.stop().await;
}
