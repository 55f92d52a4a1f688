use chrono::{DateTime, Utc};
use lnsettle_core::{NodePubKey, PaymentHash, Preimage};
use serde::{Deserialize, Serialize};

/// Identity of a Lightning node as reported by `getinfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub identity_pubkey: NodePubKey,
    pub alias: String,
    /// Chains the node operates on, e.g. `bitcoin`.
    pub chains: Vec<String>,
    pub testnet: bool,
}

/// Result of asking a node for a new invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddedInvoice {
    pub payment_request: String,
    pub payment_hash: PaymentHash,
}

/// A channel as seen from the local node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub channel_id: String,
    pub remote_pubkey: NodePubKey,
    pub capacity: u64,
    pub local_balance: u64,
    pub remote_balance: u64,
    pub active: bool,
}

/// A Lightning peer connected to the local node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSummary {
    pub pubkey: NodePubKey,
    pub address: String,
}

/// Progress update of a channel open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelOpenStatus {
    /// Funding transaction broadcast, waiting for confirmations.
    Pending { funding_txid: String },
    /// The channel is usable.
    Open { channel_id: String },
}

/// On-chain wallet balance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletBalance {
    pub confirmed: u64,
    pub unconfirmed: u64,
}

/// Proof that a payment to the peer completed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReceipt {
    /// Amount the peer was asked to invoice.
    pub amount: u64,
    /// Amount the invoice actually carried.
    pub invoiced_amount: u64,
    pub payment_hash: PaymentHash,
    pub preimage: Preimage,
    pub settled_at: DateTime<Utc>,
}
