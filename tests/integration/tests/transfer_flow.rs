//! Integration tests: conditional transfers between two peers.

use chrono::Duration;
use std::time::Duration as StdDuration;

use lnsettle_core::{Direction, TransferState};
use lnsettle_crypto::random_fulfillment;
use lnsettle_integration_tests::{config, prepare, ready_pair, ready_pair_with};
use lnsettle_settlement::{LedgerEvent, PeerMessage, PeerResponse, SettlementError, TransportError};

#[tokio::test]
async fn test_transfer_fulfilled_and_paid() {
    let pair = ready_pair().await;
    let fulfillment = random_fulfillment();
    let transfer = prepare(2_500, &fulfillment, Duration::seconds(30));
    let id = transfer.id;

    pair.alice.send_transfer(transfer).await.unwrap();
    assert_eq!(pair.alice.ledger().balance().outgoing, 2_500);
    assert_eq!(pair.bob.ledger().balance().incoming, 2_500);

    let fulfilled = pair.bob.fulfill_condition(id, fulfillment).await.unwrap();
    assert_eq!(fulfilled.state, TransferState::Fulfilled);
    assert_eq!(
        pair.alice.ledger().get(&id).unwrap().state,
        TransferState::Fulfilled
    );
    assert_eq!(pair.alice.ledger().balance().outgoing, 0);
    assert_eq!(pair.bob.ledger().balance().incoming, 0);

    // Paid exactly once over Lightning.
    assert_eq!(pair.alice_node.payment_attempts(), 1);
    assert_eq!(pair.alice.channel_credit(), 97_500);
    assert_eq!(pair.bob.channel_credit(), 102_500);
    assert!(pair.bob.invoices().is_empty());

    // A repeated fulfill is a no-op.
    let again = pair.bob.fulfill_condition(id, fulfillment).await.unwrap();
    assert_eq!(again.state, TransferState::Fulfilled);
    assert_eq!(pair.alice_node.payment_attempts(), 1);
}

#[tokio::test]
async fn test_fulfill_retry_after_lost_reply() {
    let pair = ready_pair().await;
    let fulfillment = random_fulfillment();
    let transfer = prepare(3_000, &fulfillment, Duration::seconds(30));
    let id = transfer.id;
    pair.alice.send_transfer(transfer).await.unwrap();

    // Alice pays bob's invoice but the reply never makes it back.
    let invoice = pair
        .bob
        .invoices()
        .issue(pair.bob_node.as_ref(), 3_000, Some(id))
        .await
        .unwrap();
    let lost = pair
        .alice
        .handle_message(PeerMessage::Fulfill {
            transfer_id: id,
            fulfillment,
            payment_request: invoice.payment_request.clone(),
        })
        .await
        .unwrap();
    assert!(matches!(lost, PeerResponse::Preimage { .. }));
    assert_eq!(pair.alice_node.payment_attempts(), 1);
    assert_eq!(
        pair.bob.ledger().get(&id).unwrap().state,
        TransferState::Prepared
    );

    // The retry offers the same invoice and gets the cached preimage.
    let fulfilled = pair.bob.fulfill_condition(id, fulfillment).await.unwrap();
    assert_eq!(fulfilled.state, TransferState::Fulfilled);
    assert!(pair.bob.invoices().is_empty());
    assert_eq!(pair.alice_node.payment_attempts(), 1);
    assert_eq!(pair.alice.channel_credit(), 97_000);
    assert_eq!(pair.bob.channel_credit(), 103_000);
    assert_eq!(pair.bob.ledger().balance().incoming, 0);
}

#[tokio::test]
async fn test_settlement_limited_by_prepared_transfers() {
    let mut bob_config = config("127.0.0.1:9736");
    bob_config.max_in_flight = 500_000;
    let (_network, pair) = ready_pair_with(config("127.0.0.1:9735"), bob_config).await;

    let fulfillment = random_fulfillment();
    let transfer = prepare(90_000, &fulfillment, Duration::seconds(30));
    let id = transfer.id;
    pair.alice.send_transfer(transfer).await.unwrap();

    // 90_000 of the 100_000 credit is promised to the prepared transfer.
    let err = pair.alice.send_money(50_000).await.unwrap_err();
    assert!(matches!(
        err,
        SettlementError::InsufficientCapacity {
            available: 10_000,
            required: 50_000
        }
    ));
    assert_eq!(pair.alice_node.payment_attempts(), 0);
    assert_eq!(pair.alice.ledger().balance().reserved, 0);

    // The transfer can still be paid for in full.
    pair.bob.fulfill_condition(id, fulfillment).await.unwrap();
    assert_eq!(
        pair.alice.ledger().get(&id).unwrap().state,
        TransferState::Fulfilled
    );
    assert_eq!(pair.alice.channel_credit(), 10_000);
    assert_eq!(pair.alice.ledger().balance().committed_outgoing(), 0);

    pair.alice.send_money(10_000).await.unwrap();
    assert_eq!(pair.alice.channel_credit(), 0);
    assert!(pair.alice.send_money(1).await.is_err());
}

#[tokio::test]
async fn test_receiver_exposure_limit() {
    let mut bob_config = config("127.0.0.1:9736");
    bob_config.max_in_flight = 1_000;
    let (_network, pair) = ready_pair_with(config("127.0.0.1:9735"), bob_config).await;

    let first = prepare(600, &random_fulfillment(), Duration::seconds(30));
    pair.alice.send_transfer(first).await.unwrap();

    let second = prepare(500, &random_fulfillment(), Duration::seconds(30));
    let second_id = second.id;
    let err = pair.alice.send_transfer(second).await.unwrap_err();
    assert!(matches!(
        err,
        SettlementError::Transport(TransportError::Rejected(_))
    ));

    // The refused transfer is cancelled on our side and never reached bob.
    assert_eq!(
        pair.alice.ledger().get(&second_id).unwrap().state,
        TransferState::Cancelled
    );
    assert_eq!(pair.alice.ledger().balance().outgoing, 600);
    assert!(pair.bob.ledger().get(&second_id).is_none());
    assert_eq!(pair.bob.ledger().balance().incoming, 600);

    // Settling extends the receiver's credit.
    pair.alice.send_money(200).await.unwrap();
    let third = prepare(500, &random_fulfillment(), Duration::seconds(30));
    pair.alice.send_transfer(third).await.unwrap();
    assert_eq!(pair.bob.ledger().balance().incoming, 1_100);
}

#[tokio::test]
async fn test_transfer_expires_on_both_sides() {
    let pair = ready_pair().await;
    let fulfillment = random_fulfillment();
    let transfer = prepare(300, &fulfillment, Duration::milliseconds(200));
    let id = transfer.id;

    pair.alice.send_transfer(transfer).await.unwrap();
    tokio::time::sleep(StdDuration::from_millis(600)).await;

    assert_eq!(
        pair.alice.ledger().get(&id).unwrap().state,
        TransferState::Cancelled
    );
    assert_eq!(
        pair.bob.ledger().get(&id).unwrap().state,
        TransferState::Cancelled
    );
    assert_eq!(pair.alice.ledger().balance().outgoing, 0);
    assert_eq!(pair.bob.ledger().balance().incoming, 0);

    let err = pair.bob.fulfill_condition(id, fulfillment).await.unwrap_err();
    assert!(matches!(err, SettlementError::InvalidState { .. }));
    assert_eq!(pair.alice_node.payment_attempts(), 0);
}

#[tokio::test]
async fn test_expired_prepare_refused() {
    let pair = ready_pair().await;
    let transfer = prepare(300, &random_fulfillment(), Duration::seconds(-1));
    let err = pair.alice.send_transfer(transfer).await.unwrap_err();
    assert!(matches!(err, SettlementError::Expired(_)));
    assert!(pair.bob.ledger().is_empty());
}

#[tokio::test]
async fn test_rejected_transfer_released() {
    let pair = ready_pair().await;
    let transfer = prepare(800, &random_fulfillment(), Duration::seconds(30));
    let id = transfer.id;
    pair.alice.send_transfer(transfer).await.unwrap();

    pair.bob
        .reject_incoming_transfer(id, "no route")
        .await
        .unwrap();
    assert_eq!(
        pair.alice.ledger().get(&id).unwrap().state,
        TransferState::Cancelled
    );
    assert_eq!(pair.alice.ledger().balance().outgoing, 0);
    assert_eq!(pair.bob.ledger().balance().incoming, 0);

    // Rejecting twice just tells the peer again.
    pair.bob
        .reject_incoming_transfer(id, "no route")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_wrong_fulfillment_rejected_locally() {
    let pair = ready_pair().await;
    let transfer = prepare(400, &random_fulfillment(), Duration::seconds(30));
    let id = transfer.id;
    pair.alice.send_transfer(transfer).await.unwrap();

    let err = pair
        .bob
        .fulfill_condition(id, random_fulfillment())
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::FulfillmentMismatch(t) if t == id));
    assert!(pair.bob.invoices().is_empty());
    assert_eq!(pair.alice_node.payment_attempts(), 0);
    assert_eq!(
        pair.bob.ledger().get(&id).unwrap().state,
        TransferState::Prepared
    );
}

#[tokio::test]
async fn test_unpaid_fulfillment_keeps_transfer_in_flight() {
    let pair = ready_pair().await;
    let fulfillment = random_fulfillment();
    let transfer = prepare(900, &fulfillment, Duration::seconds(30));
    let id = transfer.id;
    pair.alice.send_transfer(transfer).await.unwrap();

    pair.alice_node.set_fail_payments(true);
    let err = pair.bob.fulfill_condition(id, fulfillment).await.unwrap_err();
    assert!(matches!(
        err,
        SettlementError::Transport(TransportError::Rejected(_))
    ));

    let held = pair.bob.ledger().get(&id).unwrap();
    assert_eq!(held.state, TransferState::Prepared);
    assert_eq!(pair.bob.ledger().balance().incoming, 900);
    assert_eq!(pair.bob.channel_credit(), 100_000);
    // The invoice stays outstanding for a later payment.
    assert_eq!(pair.bob.invoices().len(), 1);
}

#[tokio::test]
async fn test_fulfilling_own_transfer_refused() {
    let pair = ready_pair().await;
    let fulfillment = random_fulfillment();
    let transfer = prepare(100, &fulfillment, Duration::seconds(30));
    let id = transfer.id;
    pair.alice.send_transfer(transfer).await.unwrap();

    let err = pair
        .alice
        .fulfill_condition(id, fulfillment)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SettlementError::WrongDirection {
            expected: Direction::Incoming,
            actual: Direction::Outgoing,
            ..
        }
    ));
}

#[tokio::test]
async fn test_duplicate_transfer_ids() {
    let pair = ready_pair().await;
    let transfer = prepare(100, &random_fulfillment(), Duration::seconds(30));
    pair.alice.send_transfer(transfer.clone()).await.unwrap();

    // Same terms: accepted again without effect.
    pair.alice.send_transfer(transfer.clone()).await.unwrap();
    assert_eq!(pair.alice.ledger().balance().outgoing, 100);

    let mut changed = transfer;
    changed.amount = 150;
    let err = pair.alice.send_transfer(changed.clone()).await.unwrap_err();
    assert!(matches!(err, SettlementError::DuplicateTransfer(id) if id == changed.id));
    assert_eq!(pair.bob.ledger().balance().incoming, 100);
}

#[tokio::test]
async fn test_ledger_events_published() {
    let pair = ready_pair().await;
    let mut events = pair.bob.subscribe();
    let fulfillment = random_fulfillment();
    let mut transfer = prepare(250, &fulfillment, Duration::seconds(30));
    transfer.data = vec![0x0c, 0x05, 0x01];
    let id = transfer.id;

    pair.alice.send_transfer(transfer).await.unwrap();
    match events.recv().await.unwrap() {
        LedgerEvent::Prepared(t) => {
            assert_eq!(t.id, id);
            assert_eq!(t.direction, Direction::Incoming);
            assert_eq!(t.data, vec![0x0c, 0x05, 0x01]);
        }
        other => panic!("expected prepared event, got {other:?}"),
    }

    pair.bob.fulfill_condition(id, fulfillment).await.unwrap();
    match events.recv().await.unwrap() {
        LedgerEvent::Fulfilled(t) => assert_eq!(t.id, id),
        other => panic!("expected fulfilled event, got {other:?}"),
    }
}

#[tokio::test]
async fn test_transfers_require_ready_session() {
    let pair = ready_pair().await;
    pair.alice.disconnect().unwrap();

    let transfer = prepare(100, &random_fulfillment(), Duration::seconds(30));
    let err = pair.alice.send_transfer(transfer.clone()).await.unwrap_err();
    assert!(matches!(err, SettlementError::NotReady(_)));

    // The peer refuses prepares arriving while it is disconnected too.
    pair.bob.disconnect().unwrap();
    let err = pair
        .bob
        .handle_message(lnsettle_settlement::PeerMessage::Prepare { transfer })
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::NotReady(_)));
}

#[tokio::test]
async fn test_purge_forgets_resolved_transfers() {
    let mut alice_config = config("127.0.0.1:9735");
    alice_config.transfer_retention_secs = 0;
    let (_network, pair) = ready_pair_with(alice_config, config("127.0.0.1:9736")).await;

    let fulfillment = random_fulfillment();
    let done = prepare(100, &fulfillment, Duration::seconds(30));
    let done_id = done.id;
    pair.alice.send_transfer(done).await.unwrap();
    pair.bob.fulfill_condition(done_id, fulfillment).await.unwrap();

    let pending = prepare(100, &random_fulfillment(), Duration::seconds(30));
    let pending_id = pending.id;
    pair.alice.send_transfer(pending).await.unwrap();

    assert_eq!(pair.alice.purge(), (1, 0));
    assert!(pair.alice.ledger().get(&done_id).is_none());
    assert!(pair.alice.ledger().get(&pending_id).is_some());

    // Bob keeps resolved transfers for the default retention.
    assert_eq!(pair.bob.purge(), (0, 0));
    assert!(pair.bob.ledger().get(&done_id).is_some());
}
