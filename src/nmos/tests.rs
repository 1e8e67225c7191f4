use std::net::Ipv4Addr;
use std::net::UdpSocket;
use std::time::Duration;

use super::*;
use crate::error::Aes67Error;
use crate::receiver::{Aes67Receiver, ReceiverConfig, ReceiverState};
use crate::sender::{Aes67Sender, SenderConfig};
use crate::types::{NetworkConfig, NodeConfig};

fn test_node() -> NmosNode {
    NmosNode::new(
        NodeConfig::default(),
        NetworkConfig {
            node_port: 0, // ephemeral for tests
            ..Default::default()
        },
    )
}

fn free_port() -> u16 {
    let probe = UdpSocket::bind("127.0.0.1:0").unwrap();
    probe.local_addr().unwrap().port()
}

#[test]
fn test_node_mints_ids() {
    let node = test_node();
    assert!(is_valid_uuid(node.node_id()));
    assert!(is_valid_uuid(node.device_id()));
    assert_ne!(node.node_id(), node.device_id());
}

#[tokio::test]
async fn test_register_and_list_resources() {
    let node = test_node();

    let sender = Aes67Sender::new(SenderConfig::default()).unwrap();
    let receiver = Aes67Receiver::new(ReceiverConfig::default());

    let sender_id = node.register_sender(&sender).await;
    let receiver_id = node.register_receiver(&receiver).await;
    assert!(is_valid_uuid(&sender_id));
    assert!(is_valid_uuid(&receiver_id));

    let senders = node.senders().await;
    assert_eq!(senders.len(), 1);
    assert_eq!(senders[0].id, sender_id);
    assert_eq!(senders[0].transport, TRANSPORT_RTP_MCAST);
    assert_eq!(senders[0].device_id, node.device_id());

    let receivers = node.receivers().await;
    assert_eq!(receivers.len(), 1);

    node.unregister_sender(&sender_id).await;
    node.unregister_receiver(&receiver_id).await;
    assert!(node.senders().await.is_empty());
    assert!(node.receivers().await.is_empty());
}

#[tokio::test]
async fn test_registration_keeps_configured_uuid() {
    let node = test_node();
    let receiver = Aes67Receiver::new(ReceiverConfig {
        id: "d1b2d3e4-0000-4000-8000-00000000aaaa".to_string(),
        ..Default::default()
    });

    let id = node.register_receiver(&receiver).await;
    assert_eq!(id, "d1b2d3e4-0000-4000-8000-00000000aaaa");
}

#[tokio::test]
async fn test_default_connection_state() {
    let node = test_node();
    let receiver = Aes67Receiver::new(ReceiverConfig::default());
    let id = node.register_receiver(&receiver).await;

    let active = node.active(&id).await.unwrap();
    assert!(!active.master_enable);
    assert_eq!(active.transport_params.len(), 1);
    assert!(active.transport_params[0].multicast_ip.is_empty());
    assert_eq!(active.transport_params[0].destination_port, 0);

    let staged = node.staged(&id).await.unwrap();
    assert!(!staged.master_enable);
}

#[tokio::test]
async fn test_unknown_receiver_is_404() {
    let node = test_node();
    assert!(matches!(
        node.staged("no-such-id").await,
        Err(Aes67Error::UnknownResource(_))
    ));
    assert!(matches!(
        node.active("no-such-id").await,
        Err(Aes67Error::UnknownResource(_))
    ));
    assert!(matches!(
        node.patch_staged("no-such-id", StagedPatch::default()).await,
        Err(Aes67Error::UnknownResource(_))
    ));
}

#[tokio::test]
async fn test_immediate_activation_promotes_and_starts() {
    let node = test_node();
    let receiver = Aes67Receiver::new(ReceiverConfig::default());
    let id = node.register_receiver(&receiver).await;
    let port = free_port();

    let patch = StagedPatch {
        master_enable: Some(true),
        transport_params: Some(vec![TransportParams {
            multicast_ip: "127.0.0.1".to_string(),
            destination_port: port,
            ..Default::default()
        }]),
        activation: Some(Activation {
            mode: Some(ActivationMode::ActivateImmediate),
            ..Default::default()
        }),
        ..Default::default()
    };

    let (status, state) = node.patch_staged(&id, patch).await.unwrap();
    assert_eq!(status, 200);
    assert!(state.master_enable);
    assert!(state.activation.activation_time.is_some());

    // Active reflects the promoted parameters and the engine is live.
    let active = node.active(&id).await.unwrap();
    assert_eq!(active.transport_params[0].destination_port, port);
    assert_eq!(receiver.state(), ReceiverState::Receiving);

    receiver.disconnect().await;
}

#[tokio::test]
async fn test_failed_activation_preserves_active() {
    let node = test_node();
    let receiver = Aes67Receiver::new(ReceiverConfig::default());
    let id = node.register_receiver(&receiver).await;

    let patch = StagedPatch {
        master_enable: Some(true),
        transport_params: Some(vec![TransportParams {
            multicast_ip: "not-an-address".to_string(),
            destination_port: 5004,
            ..Default::default()
        }]),
        activation: Some(Activation {
            mode: Some(ActivationMode::ActivateImmediate),
            ..Default::default()
        }),
        ..Default::default()
    };

    assert!(matches!(
        node.patch_staged(&id, patch).await,
        Err(Aes67Error::ActivationFailed(_))
    ));

    // Active untouched, staged preserved for retry.
    let active = node.active(&id).await.unwrap();
    assert!(!active.master_enable);
    let staged = node.staged(&id).await.unwrap();
    assert_eq!(staged.transport_params[0].multicast_ip, "not-an-address");
}

#[tokio::test]
async fn test_deactivation_disconnects() {
    let node = test_node();
    let receiver = Aes67Receiver::new(ReceiverConfig::default());
    let id = node.register_receiver(&receiver).await;
    let port = free_port();

    let connect = StagedPatch {
        master_enable: Some(true),
        transport_params: Some(vec![TransportParams {
            multicast_ip: "127.0.0.1".to_string(),
            destination_port: port,
            ..Default::default()
        }]),
        activation: Some(Activation {
            mode: Some(ActivationMode::ActivateImmediate),
            ..Default::default()
        }),
        ..Default::default()
    };
    node.patch_staged(&id, connect).await.unwrap();
    assert_eq!(receiver.state(), ReceiverState::Receiving);

    let disconnect = StagedPatch {
        master_enable: Some(false),
        activation: Some(Activation {
            mode: Some(ActivationMode::ActivateImmediate),
            ..Default::default()
        }),
        ..Default::default()
    };
    node.patch_staged(&id, disconnect).await.unwrap();
    assert_eq!(receiver.state(), ReceiverState::Stopped);
}

#[tokio::test]
async fn test_scheduled_relative_activation() {
    let node = test_node();
    let receiver = Aes67Receiver::new(ReceiverConfig::default());
    let id = node.register_receiver(&receiver).await;
    let port = free_port();

    let patch = StagedPatch {
        master_enable: Some(true),
        transport_params: Some(vec![TransportParams {
            multicast_ip: "127.0.0.1".to_string(),
            destination_port: port,
            ..Default::default()
        }]),
        activation: Some(Activation {
            mode: Some(ActivationMode::ActivateScheduledRelative),
            requested_time: Some("0:100000000".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };

    let (status, _) = node.patch_staged(&id, patch).await.unwrap();
    assert_eq!(status, 202);

    // Not yet promoted.
    assert!(!node.active(&id).await.unwrap().master_enable);

    // Wait out the 100 ms schedule and let the spawned task run.
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(node.active(&id).await.unwrap().master_enable);
    assert_eq!(receiver.state(), ReceiverState::Receiving);

    receiver.disconnect().await;
}

#[tokio::test]
async fn test_schedule_beyond_horizon_rejected() {
    let node = test_node();
    let receiver = Aes67Receiver::new(ReceiverConfig::default());
    let id = node.register_receiver(&receiver).await;

    let patch = StagedPatch {
        activation: Some(Activation {
            mode: Some(ActivationMode::ActivateScheduledRelative),
            requested_time: Some("7200:0".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    };

    assert!(matches!(
        node.patch_staged(&id, patch).await,
        Err(Aes67Error::InvalidConfig {
            parameter: "activation",
            ..
        })
    ));
}

#[tokio::test]
async fn test_transport_file_fills_staged_params() {
    let node = test_node();
    let receiver = Aes67Receiver::new(ReceiverConfig::default());
    let id = node.register_receiver(&receiver).await;

    let sdp = "v=0\r\no=- 1 1 IN IP4 10.0.0.1\r\ns=Feed\r\nc=IN IP4 239.69.5.5\r\nt=0 0\r\n\
               m=audio 5004 RTP/AVP 97\r\na=rtpmap:97 L24/48000/2\r\na=ptime:1\r\n";

    let patch = StagedPatch {
        transport_file: Some(TransportFile {
            data: Some(sdp.to_string()),
            media_type: Some("application/sdp".to_string()),
        }),
        ..Default::default()
    };

    let (status, state) = node.patch_staged(&id, patch).await.unwrap();
    assert_eq!(status, 200);
    assert_eq!(state.transport_params[0].multicast_ip, "239.69.5.5");
    assert_eq!(state.transport_params[0].destination_port, 5004);
}

#[tokio::test]
async fn test_dropped_engine_fails_activation() {
    let node = test_node();
    let receiver = Aes67Receiver::new(ReceiverConfig::default());
    let id = node.register_receiver(&receiver).await;
    drop(receiver);

    // The weak handle no longer upgrades; the resource reads as gone.
    assert!(matches!(
        node.activate_receiver(&id).await,
        Err(Aes67Error::UnknownResource(_))
    ));
}
