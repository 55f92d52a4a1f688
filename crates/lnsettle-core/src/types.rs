use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CoreError;
use crate::state_machine::TransferState;

/// Unique, peer-agreed identifier of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferId(pub Uuid);

impl TransferId {
    /// Create a new time-ordered transfer ID (UUID v7).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Declares a fixed-size byte newtype that travels as lower-case hex.
macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Length in bytes.
            pub const LEN: usize = $len;

            /// Build from a byte slice of exactly `LEN` bytes.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
                let array: [u8; $len] =
                    bytes.try_into().map_err(|_| CoreError::InvalidLength {
                        kind: stringify!($name),
                        expected: $len,
                        actual: bytes.len(),
                    })?;
                Ok(Self(array))
            }

            /// Parse from a hex string.
            pub fn from_hex(s: &str) -> Result<Self, CoreError> {
                let bytes = hex::decode(s).map_err(|e| CoreError::InvalidHex(e.to_string()))?;
                Self::from_slice(&bytes)
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = CoreError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::from_hex(&value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.to_hex()
            }
        }
    };
}

fixed_bytes!(
    /// SHA-256 hash of a Lightning payment preimage; the invoice join key.
    PaymentHash,
    32
);

fixed_bytes!(
    /// Secret revealed by a Lightning payment; hashes to a [`PaymentHash`].
    Preimage,
    32
);

fixed_bytes!(
    /// SHA-256 commitment a transfer is locked to.
    ExecutionCondition,
    32
);

fixed_bytes!(
    /// Secret that unlocks a transfer; hashes to its [`ExecutionCondition`].
    Fulfillment,
    32
);

fixed_bytes!(
    /// Compressed secp256k1 public key of a Lightning node.
    NodePubKey,
    33
);

/// Which side of the bilateral relationship a transfer flows towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// The peer prepared the transfer to us.
    Incoming,
    /// We prepared the transfer to the peer.
    Outgoing,
}

impl Direction {
    /// The same transfer as seen from the peer's ledger.
    pub fn mirror(&self) -> Self {
        match self {
            Self::Incoming => Self::Outgoing,
            Self::Outgoing => Self::Incoming,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incoming => write!(f, "incoming"),
            Self::Outgoing => write!(f, "outgoing"),
        }
    }
}

/// The prepare fields of a transfer as they travel between peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferPrepare {
    pub id: TransferId,
    pub amount: u64,
    pub execution_condition: ExecutionCondition,
    pub expires_at: DateTime<Utc>,
    /// Opaque ILP packet travelling with the prepare.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<u8>,
}

impl TransferPrepare {
    /// Validate the wire fields before a transfer is built from them.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.amount == 0 {
            return Err(CoreError::InvalidAmount(format!(
                "transfer {} has zero amount",
                self.id
            )));
        }
        Ok(())
    }

    /// Materialize a prepared transfer travelling in `direction`.
    pub fn into_transfer(self, direction: Direction) -> Transfer {
        Transfer {
            id: self.id,
            amount: self.amount,
            direction,
            execution_condition: self.execution_condition,
            expires_at: self.expires_at,
            data: self.data,
            state: TransferState::Prepared,
            resolved_at: None,
        }
    }
}

/// A unit of owed value between the two peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    /// Amount in the smallest currency unit.
    pub amount: u64,
    pub direction: Direction,
    pub execution_condition: ExecutionCondition,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub data: Vec<u8>,
    pub state: TransferState,
    /// When the transfer reached a terminal state.
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Transfer {
    /// Whether `other` describes the same immutable terms as `self`.
    pub fn same_terms(&self, other: &Transfer) -> bool {
        self.id == other.id
            && self.amount == other.amount
            && self.direction == other.direction
            && self.execution_condition == other.execution_condition
            && self.expires_at == other.expires_at
            && self.data == other.data
    }

    /// The wire representation of this transfer's prepare.
    pub fn to_prepare(&self) -> TransferPrepare {
        TransferPrepare {
            id: self.id,
            amount: self.amount,
            execution_condition: self.execution_condition,
            expires_at: self.expires_at,
            data: self.data.clone(),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Network address of a Lightning node: `<pubkey>@<host>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LightningAddress {
    pub pubkey: NodePubKey,
    pub host: String,
}

impl LightningAddress {
    pub fn new(pubkey: NodePubKey, host: impl Into<String>) -> Self {
        Self {
            pubkey,
            host: host.into(),
        }
    }
}

impl fmt::Display for LightningAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.pubkey, self.host)
    }
}

impl FromStr for LightningAddress {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (pubkey, host) = s
            .split_once('@')
            .ok_or_else(|| CoreError::InvalidAddress(format!("missing '@' in {s}")))?;
        if host.is_empty() {
            return Err(CoreError::InvalidAddress(format!("missing host in {s}")));
        }
        let pubkey = NodePubKey::from_hex(pubkey)
            .map_err(|e| CoreError::InvalidAddress(format!("{s}: {e}")))?;
        Ok(Self::new(pubkey, host))
    }
}

impl TryFrom<String> for LightningAddress {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LightningAddress> for String {
    fn from(value: LightningAddress) -> Self {
        value.to_string()
    }
}

/// Local cache of the payment channel used for settlement with the peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelHandle {
    pub peer_pubkey: NodePubKey,
    pub channel_id: String,
    /// Amount this side committed to the channel.
    pub local_funding: u64,
}

/// Connector-facing description of this settlement link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorInfo {
    /// ILP address prefix, e.g. `g.bitcoin.lightning.`.
    pub prefix: String,
    pub currency_code: String,
    pub currency_scale: u32,
    pub connectors: Vec<String>,
}

impl ConnectorInfo {
    /// Currency code for a Lightning chain name.
    pub fn currency_code_for(network: &str) -> &'static str {
        match network {
            "bitcoin" => "BTC",
            "litecoin" => "LTC",
            _ => "???",
        }
    }
}
