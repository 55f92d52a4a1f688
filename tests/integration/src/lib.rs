//! Helpers shared by the integration tests.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Mutex};

use lnsettle_core::{
    Fulfillment, LightningAddress, SettlementConfig, TransferId, TransferPrepare,
};
use lnsettle_crypto::condition_of;
use lnsettle_settlement::adapters::{LoopbackPair, MemoryLightningNetwork};
use lnsettle_settlement::{IPeerTransport, PeerMessage, PeerResponse, TransportError};

pub const WALLET: u64 = 1_000_000;

pub fn config(host: &str) -> SettlementConfig {
    SettlementConfig::with_host(host)
}

/// A connected pair with default configuration.
pub async fn ready_pair() -> LoopbackPair {
    ready_pair_with(config("127.0.0.1:9735"), config("127.0.0.1:9736"))
        .await
        .1
}

/// A connected pair with the given configurations.
pub async fn ready_pair_with(
    alice: SettlementConfig,
    bob: SettlementConfig,
) -> (Arc<MemoryLightningNetwork>, LoopbackPair) {
    let network = MemoryLightningNetwork::new();
    let pair = LoopbackPair::new(
        alice,
        network.add_node("alice", WALLET),
        bob,
        network.add_node("bob", WALLET),
    )
    .expect("valid configs");
    pair.connect().await.expect("connect");
    (network, pair)
}

/// A transfer prepare locked to `fulfillment`.
pub fn prepare(amount: u64, fulfillment: &Fulfillment, ttl: chrono::Duration) -> TransferPrepare {
    TransferPrepare {
        id: TransferId::new(),
        amount,
        execution_condition: condition_of(fulfillment),
        expires_at: Utc::now() + ttl,
        data: Vec::new(),
    }
}

/// A fake peer that answers from a script.
///
/// Announces `address` during the handshake, hands out whatever invoice was
/// queued with [`queue_invoice`](Self::queue_invoice) and acknowledges
/// everything else.
pub struct ScriptedPeer {
    address: LightningAddress,
    invoices: Mutex<Vec<String>>,
    sent: Mutex<Vec<PeerMessage>>,
}

impl ScriptedPeer {
    pub fn new(address: LightningAddress) -> Arc<Self> {
        Arc::new(Self {
            address,
            invoices: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn queue_invoice(&self, payment_request: impl Into<String>) {
        self.invoices.lock().unwrap().push(payment_request.into());
    }

    /// Kinds of the messages received so far.
    pub fn received_kinds(&self) -> Vec<&'static str> {
        self.sent.lock().unwrap().iter().map(PeerMessage::kind).collect()
    }
}

#[async_trait]
impl IPeerTransport for ScriptedPeer {
    async fn request(&self, message: PeerMessage) -> Result<PeerResponse, TransportError> {
        self.sent.lock().unwrap().push(message.clone());
        let response = match message {
            PeerMessage::LightningInfo { .. } => PeerResponse::LightningInfo {
                address: Some(self.address.clone()),
            },
            PeerMessage::GetInvoice { .. } => match self.invoices.lock().unwrap().pop() {
                Some(payment_request) => PeerResponse::Invoice { payment_request },
                None => PeerResponse::Error {
                    message: "no invoice queued".into(),
                },
            },
            _ => PeerResponse::Ack,
        };
        Ok(response)
    }
}
