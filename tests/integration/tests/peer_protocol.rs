//! Integration tests: raw frames between peers.

use bytes::Bytes;
use std::sync::Arc;

use lnsettle_integration_tests::ready_pair;
use lnsettle_settlement::{PeerResponse, SettlementError};

async fn reply(pair: &lnsettle_settlement::adapters::LoopbackPair, frame: &str) -> PeerResponse {
    let raw = pair.bob.handle_frame(frame.as_bytes()).await;
    PeerResponse::from_bytes(&raw).unwrap()
}

#[tokio::test]
async fn test_unknown_message_type_answered_with_error() {
    let pair = ready_pair().await;
    match reply(&pair, r#"{"type":"open_sesame","amount":1}"#).await {
        PeerResponse::Error { message } => assert!(message.contains("open_sesame")),
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_garbage_frame_answered_with_error() {
    let pair = ready_pair().await;
    assert!(matches!(
        reply(&pair, "not json at all").await,
        PeerResponse::Error { .. }
    ));
    assert!(matches!(
        reply(&pair, r#"{"amount":5}"#).await,
        PeerResponse::Error { .. }
    ));
    // Known type with a malformed body.
    assert!(matches!(
        reply(&pair, r#"{"type":"get_invoice","amount":"lots"}"#).await,
        PeerResponse::Error { .. }
    ));
}

#[tokio::test]
async fn test_invoice_request_frame() {
    let pair = ready_pair().await;
    match reply(&pair, r#"{"type":"get_invoice","amount":1234}"#).await {
        PeerResponse::Invoice { payment_request } => {
            let request = lnsettle_crypto::PaymentRequest::decode(&payment_request).unwrap();
            assert_eq!(request.amount, 1234);
            assert_eq!(request.destination, pair.bob_node.pubkey());
            assert!(pair.bob.invoices().get(&request.payment_hash).is_some());
        }
        other => panic!("expected invoice, got {other:?}"),
    }
}

#[tokio::test]
async fn test_data_round_trip() {
    let pair = ready_pair().await;
    pair.bob.set_data_handler(Arc::new(|packet: Bytes| -> Result<Bytes, SettlementError> {
        let mut echoed = packet.to_vec();
        echoed.reverse();
        Ok(Bytes::from(echoed))
    }));

    let answer = pair
        .alice
        .send_data(Bytes::from_static(b"\x0c\x01\x02"))
        .await
        .unwrap();
    assert_eq!(answer, Bytes::from_static(b"\x02\x01\x0c"));
}

#[tokio::test]
async fn test_data_without_handler_refused() {
    let pair = ready_pair().await;
    pair.bob.clear_data_handler();
    let err = pair
        .alice
        .send_data(Bytes::from_static(b"\x0c"))
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::Transport(_)));
}

#[tokio::test]
async fn test_handler_error_reaches_sender() {
    let pair = ready_pair().await;
    pair.bob.set_data_handler(Arc::new(|_packet: Bytes| -> Result<Bytes, SettlementError> {
        Err(SettlementError::Handler("no route to destination".into()))
    }));
    let err = pair
        .alice
        .send_data(Bytes::from_static(b"\x0c"))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("no route to destination"));
}
