//! lnsettle core
//!
//! Domain types shared by every layer of the settlement engine: transfer
//! identifiers and fixed-size hash/key newtypes, the transfer and peer
//! session state machines, and the per-peer settlement configuration.

pub mod error;
pub mod types;
pub mod state_machine;
pub mod config;

pub use error::CoreError;
pub use state_machine::{
    ChangeCheck, PeerEvent, PeerState, SessionStateMachine, TransferEvent, TransferState,
    TransferStateMachine,
};
pub use types::{
    ChannelHandle, ConnectorInfo, Direction, ExecutionCondition, Fulfillment, LightningAddress,
    NodePubKey, PaymentHash, Preimage, Transfer, TransferId, TransferPrepare,
};
pub use config::SettlementConfig;
