use crate::state_machine::{PeerEvent, PeerState, TransferState};

/// Core domain errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid transfer state transition from {from} to {to}")]
    InvalidTransferTransition {
        from: TransferState,
        to: TransferState,
    },

    #[error("invalid session transition from {from} on {event:?}")]
    InvalidSessionTransition { from: PeerState, event: PeerEvent },

    #[error("invalid {kind} length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid hex encoding: {0}")]
    InvalidHex(String),

    #[error("invalid lightning address: {0}")]
    InvalidAddress(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("missing required field: {0}")]
    MissingField(String),
}
