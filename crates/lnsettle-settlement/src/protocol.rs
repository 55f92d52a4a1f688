//! Messages exchanged with the bilateral peer.
//!
//! Each message is a JSON object whose `type` field names its kind. The
//! kind is checked before the body is parsed so an unknown kind surfaces as
//! [`SettlementError::UnsupportedProtocol`] instead of a parse failure.

use bytes::Bytes;
use lnsettle_core::{Fulfillment, LightningAddress, Preimage, TransferId, TransferPrepare};
use serde::{Deserialize, Serialize};

use crate::error::{SettlementError, TransportError};

/// A request sent to the peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PeerMessage {
    /// Announces our Lightning address.
    LightningInfo { address: LightningAddress },
    /// Announces the channel we opened to the peer.
    ChannelInfo { channel_id: String, balance: u64 },
    /// Asks the peer for an invoice of `amount`.
    GetInvoice { amount: u64 },
    /// Tells the peer we paid one of its invoices.
    Settlement {
        amount: u64,
        payment_preimage: Preimage,
    },
    Prepare { transfer: TransferPrepare },
    /// Fulfills a transfer the peer prepared to us and asks it to pay.
    Fulfill {
        transfer_id: TransferId,
        fulfillment: Fulfillment,
        payment_request: String,
    },
    Reject {
        transfer_id: TransferId,
        reason: String,
    },
    /// An ILP packet for the peer's data handler.
    Data { ilp: Bytes },
}

impl PeerMessage {
    /// Every kind this engine understands.
    pub const KINDS: &'static [&'static str] = &[
        "lightning_info",
        "channel_info",
        "get_invoice",
        "settlement",
        "prepare",
        "fulfill",
        "reject",
        "data",
    ];

    pub fn kind(&self) -> &'static str {
        match self {
            Self::LightningInfo { .. } => "lightning_info",
            Self::ChannelInfo { .. } => "channel_info",
            Self::GetInvoice { .. } => "get_invoice",
            Self::Settlement { .. } => "settlement",
            Self::Prepare { .. } => "prepare",
            Self::Fulfill { .. } => "fulfill",
            Self::Reject { .. } => "reject",
            Self::Data { .. } => "data",
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, TransportError> {
        serde_json::to_vec(self).map_err(|e| TransportError::Codec(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SettlementError> {
        let value: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| TransportError::Codec(e.to_string()))?;

        match value.get("type").and_then(serde_json::Value::as_str) {
            Some(kind) if Self::KINDS.contains(&kind) => {}
            Some(kind) => return Err(SettlementError::UnsupportedProtocol(kind.to_string())),
            None => {
                return Err(SettlementError::UnsupportedProtocol(
                    "message without type".into(),
                ))
            }
        }

        serde_json::from_value(value)
            .map_err(|e| SettlementError::Transport(TransportError::Codec(e.to_string())))
    }
}

/// The peer's answer to a [`PeerMessage`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PeerResponse {
    Ack,
    /// The responder's address, once it knows it.
    LightningInfo { address: Option<LightningAddress> },
    Invoice { payment_request: String },
    Preimage { payment_preimage: Preimage },
    Data { ilp: Bytes },
    /// The request failed on the peer.
    Error { message: String },
}

impl PeerResponse {
    pub fn to_bytes(&self) -> Result<Vec<u8>, TransportError> {
        serde_json::to_vec(self).map_err(|e| TransportError::Codec(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TransportError> {
        serde_json::from_slice(bytes).map_err(|e| TransportError::Codec(e.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ack => "ack",
            Self::LightningInfo { .. } => "lightning_info",
            Self::Invoice { .. } => "invoice",
            Self::Preimage { .. } => "preimage",
            Self::Data { .. } => "data",
            Self::Error { .. } => "error",
        }
    }

    /// Turn an error response into a transport rejection.
    pub fn into_result(self) -> Result<Self, TransportError> {
        match self {
            Self::Error { message } => Err(TransportError::Rejected(message)),
            other => Ok(other),
        }
    }
}
