use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use lnsettle_core::{LightningAddress, NodePubKey, Preimage};

use crate::error::{LightningError, SettlementError, TransportError};
use crate::protocol::{PeerMessage, PeerResponse};
use crate::types::{
    AddedInvoice, ChannelOpenStatus, ChannelSummary, NodeInfo, PeerSummary, WalletBalance,
};

/// Stream of channel-open progress updates.
pub type ChannelOpenStream = BoxStream<'static, Result<ChannelOpenStatus, LightningError>>;

/// The Lightning node RPC surface the settlement engine relies on.
///
/// Implementations bridge to a concrete node (lnd gRPC, an in-memory
/// network for tests, ...). Amounts are in satoshis.
#[async_trait]
pub trait ILightningNode: Send + Sync {
    /// Identity and chain information of the node.
    async fn get_info(&self) -> Result<NodeInfo, LightningError>;

    /// Create an invoice for `amount` valid for `expiry_secs`.
    async fn add_invoice(&self, amount: u64, expiry_secs: u64)
        -> Result<AddedInvoice, LightningError>;

    /// Pay an encoded payment request and return the revealed preimage.
    async fn send_payment(&self, payment_request: &str) -> Result<Preimage, LightningError>;

    async fn list_channels(&self) -> Result<Vec<ChannelSummary>, LightningError>;

    async fn list_peers(&self) -> Result<Vec<PeerSummary>, LightningError>;

    async fn connect_peer(&self, address: &LightningAddress) -> Result<(), LightningError>;

    /// Open a channel to `peer`, committing `local_funding`.
    async fn open_channel(
        &self,
        peer: &NodePubKey,
        local_funding: u64,
    ) -> Result<ChannelOpenStream, LightningError>;

    /// Total local balance across open channels.
    async fn channel_balance(&self) -> Result<u64, LightningError>;

    async fn wallet_balance(&self) -> Result<WalletBalance, LightningError>;
}

/// Request/response messaging with the bilateral peer.
#[async_trait]
pub trait IPeerTransport: Send + Sync {
    async fn request(&self, message: PeerMessage) -> Result<PeerResponse, TransportError>;
}

/// Receives ILP packets from the peer and returns the reply packet.
#[async_trait]
pub trait DataHandler: Send + Sync {
    async fn handle_data(&self, packet: Bytes) -> Result<Bytes, SettlementError>;
}

/// Notified when the peer settles money with us.
#[async_trait]
pub trait MoneyHandler: Send + Sync {
    async fn handle_money(&self, amount: u64) -> Result<(), SettlementError>;
}

#[async_trait]
impl<F> DataHandler for F
where
    F: Fn(Bytes) -> Result<Bytes, SettlementError> + Send + Sync,
{
    async fn handle_data(&self, packet: Bytes) -> Result<Bytes, SettlementError> {
        self(packet)
    }
}

#[async_trait]
impl<F> MoneyHandler for F
where
    F: Fn(u64) -> Result<(), SettlementError> + Send + Sync,
{
    async fn handle_money(&self, amount: u64) -> Result<(), SettlementError> {
        self(amount)
    }
}
