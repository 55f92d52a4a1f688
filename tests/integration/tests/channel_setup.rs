//! Integration tests: handshake, channel bootstrap and connector info.

use lnsettle_core::PeerState;
use lnsettle_integration_tests::{config, ready_pair, ready_pair_with, WALLET};
use lnsettle_settlement::adapters::{LoopbackPair, MemoryLightningNetwork};
use lnsettle_settlement::{ILightningNode, SettlementError};

#[tokio::test]
async fn test_both_peers_open_channels() {
    let pair = ready_pair().await;
    assert_eq!(pair.alice.state(), PeerState::Ready);
    assert_eq!(pair.bob.state(), PeerState::Ready);

    let alice_channel = pair.alice.channel().unwrap();
    let bob_channel = pair.bob.channel().unwrap();
    assert_ne!(alice_channel.channel_id, bob_channel.channel_id);
    assert_eq!(alice_channel.peer_pubkey, pair.bob_node.pubkey());
    assert_eq!(alice_channel.local_funding, 100_000);

    assert_eq!(pair.alice.peer_address().unwrap().pubkey, pair.bob_node.pubkey());
    assert_eq!(pair.bob.peer_address().unwrap().pubkey, pair.alice_node.pubkey());
    assert_eq!(
        pair.alice_node.wallet_balance().await.unwrap().confirmed,
        WALLET - 100_000
    );
}

#[tokio::test]
async fn test_receiver_without_channel_setup() {
    let mut bob_config = config("127.0.0.1:9736");
    bob_config.setup_channel = false;
    let (_network, pair) = ready_pair_with(config("127.0.0.1:9735"), bob_config).await;

    assert_eq!(pair.bob.state(), PeerState::Ready);
    assert!(pair.bob.channel().is_none());
    assert_eq!(pair.bob_node.wallet_balance().await.unwrap().confirmed, WALLET);
    assert_eq!(pair.bob_node.list_channels().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unfunded_wallet_stays_pending() {
    let network = MemoryLightningNetwork::new();
    let pair = LoopbackPair::new(
        config("127.0.0.1:9735"),
        network.add_node("alice", 10),
        config("127.0.0.1:9736"),
        network.add_node("bob", WALLET),
    )
    .unwrap();
    pair.connect().await.unwrap();

    assert_eq!(pair.alice.state(), PeerState::ChannelPending);
    assert_eq!(pair.bob.state(), PeerState::Ready);
    assert!(pair.alice.channel().is_none());

    let err = pair.alice.send_money(5).await.unwrap_err();
    assert!(matches!(
        err,
        SettlementError::NotReady(PeerState::ChannelPending)
    ));
    // Bob's requests are refused until alice is ready as well.
    let err = pair.bob.send_money(5).await.unwrap_err();
    assert!(matches!(err, SettlementError::Transport(_)));
}

#[tokio::test]
async fn test_existing_lightning_channel_reused() {
    let network = MemoryLightningNetwork::new();
    let alice_node = network.add_node("alice", WALLET);
    let bob_node = network.add_node("bob", WALLET);

    let first = LoopbackPair::new(
        config("127.0.0.1:9735"),
        alice_node.clone(),
        config("127.0.0.1:9736"),
        bob_node.clone(),
    )
    .unwrap();
    first.connect().await.unwrap();
    let channel_id = first.alice.channel().unwrap().channel_id;
    first.alice.send_money(1_000).await.unwrap();
    drop(first);

    // New coordinators over the same nodes find the channels already open.
    let second = LoopbackPair::new(
        config("127.0.0.1:9735"),
        alice_node.clone(),
        config("127.0.0.1:9736"),
        bob_node.clone(),
    )
    .unwrap();
    second.connect().await.unwrap();

    let channel = second.alice.channel().unwrap();
    assert_eq!(channel.channel_id, channel_id);
    assert_eq!(channel.local_funding, 99_000);
    assert_eq!(second.alice.channel_credit(), 99_000);
    assert_eq!(alice_node.list_channels().await.unwrap().len(), 2);
    assert_eq!(
        alice_node.wallet_balance().await.unwrap().confirmed,
        WALLET - 100_000
    );
}

#[tokio::test]
async fn test_reconnect_after_disconnect() {
    let pair = ready_pair().await;
    pair.alice.disconnect().unwrap();
    assert_eq!(pair.alice.state(), PeerState::Disconnected);

    pair.alice.connect().await.unwrap();
    assert_eq!(pair.alice.state(), PeerState::Ready);
    assert_eq!(pair.alice_node.list_channels().await.unwrap().len(), 2);
    pair.alice.send_money(10).await.unwrap();
}

#[tokio::test]
async fn test_handshake_fails_when_peer_offline() {
    let network = MemoryLightningNetwork::new();
    let pair = LoopbackPair::new(
        config("127.0.0.1:9735"),
        network.add_node("alice", WALLET),
        config("127.0.0.1:9736"),
        network.add_node("bob", WALLET),
    )
    .unwrap();
    pair.alice_transport.set_offline(true);

    let err = pair.alice.connect().await.unwrap_err();
    assert!(matches!(err, SettlementError::Transport(_)));
    assert_eq!(pair.alice.state(), PeerState::Disconnected);

    pair.alice_transport.set_offline(false);
    pair.connect().await.unwrap();
    assert_eq!(pair.alice.state(), PeerState::Ready);
}

#[tokio::test]
async fn test_connector_info_for_testnet_chain() {
    let network = MemoryLightningNetwork::with_chain("litecoin", true);
    let pair = LoopbackPair::new(
        config("127.0.0.1:9735"),
        network.add_node("alice", WALLET),
        config("127.0.0.1:9736"),
        network.add_node("bob", WALLET),
    )
    .unwrap();
    pair.connect().await.unwrap();

    let info = pair.alice.get_info().unwrap();
    assert_eq!(info.prefix, "test.litecoin.lightning.");
    assert_eq!(info.currency_code, "LTC");
    assert_eq!(info.currency_scale, 8);
    assert_eq!(
        info.connectors,
        vec![format!("test.litecoin.lightning.{}", pair.bob_node.pubkey())]
    );
    assert_eq!(
        pair.bob.account().unwrap(),
        format!("test.litecoin.lightning.{}", pair.bob_node.pubkey())
    );
}

#[tokio::test]
async fn test_network_override() {
    let network = MemoryLightningNetwork::with_chain("litecoin", false);
    let mut alice_config = config("127.0.0.1:9735");
    alice_config.network = Some("bitcoin".into());
    let pair = LoopbackPair::new(
        alice_config,
        network.add_node("alice", WALLET),
        config("127.0.0.1:9736"),
        network.add_node("bob", WALLET),
    )
    .unwrap();
    pair.connect().await.unwrap();

    let info = pair.alice.get_info().unwrap();
    assert_eq!(info.prefix, "g.bitcoin.lightning.");
    assert_eq!(info.currency_code, "BTC");
    assert_eq!(pair.bob.get_info().unwrap().prefix, "g.litecoin.lightning.");
}

#[tokio::test]
async fn test_info_unavailable_before_handshake() {
    let network = MemoryLightningNetwork::new();
    let pair = LoopbackPair::new(
        config("127.0.0.1:9735"),
        network.add_node("alice", WALLET),
        config("127.0.0.1:9736"),
        network.add_node("bob", WALLET),
    )
    .unwrap();
    assert!(matches!(
        pair.alice.get_info(),
        Err(SettlementError::NotReady(PeerState::Disconnected))
    ));
    assert!(pair.alice.account().is_err());
}
