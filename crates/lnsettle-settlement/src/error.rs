use lnsettle_core::{CoreError, Direction, NodePubKey, PaymentHash, PeerState, TransferId, TransferState};
use lnsettle_crypto::CodecError;

/// Failures reported by a Lightning node.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LightningError {
    #[error("lightning rpc failed: {0}")]
    Rpc(String),

    #[error("payment failed: {0}")]
    PaymentFailed(String),

    #[error("no invoice for payment hash {0}")]
    InvoiceNotFound(PaymentHash),

    #[error("channel open failed: {0}")]
    ChannelOpen(String),

    #[error("peer connection failed: {0}")]
    PeerConnection(String),
}

/// Failures of the bilateral message transport.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("peer unreachable: {0}")]
    Unreachable(String),

    #[error("peer rejected request: {0}")]
    Rejected(String),

    #[error("message codec error: {0}")]
    Codec(String),
}

/// Settlement-layer errors.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("invalid payment request: {0}")]
    InvalidPaymentRequest(#[from] CodecError),

    #[error("transfer {0} already exists with different terms or state")]
    DuplicateTransfer(TransferId),

    #[error("transfer not found: {0}")]
    UnknownTransfer(TransferId),

    #[error("transfer {0} has already expired")]
    Expired(TransferId),

    #[error("transfer {id} is {state} and cannot become {target}")]
    InvalidState {
        id: TransferId,
        state: TransferState,
        target: TransferState,
    },

    #[error("transfer {id} is {actual}, expected {expected}")]
    WrongDirection {
        id: TransferId,
        expected: Direction,
        actual: Direction,
    },

    #[error("fulfillment does not match the condition of transfer {0}")]
    FulfillmentMismatch(TransferId),

    #[error("{direction} exposure exceeded: {in_flight} in flight + {amount} > maximum {maximum}")]
    ExposureExceeded {
        direction: Direction,
        in_flight: u64,
        amount: u64,
        maximum: u64,
    },

    #[error("no invoice found for payment hash {0}")]
    UnknownInvoice(PaymentHash),

    #[error("invoice {payment_hash} was issued for transfer {expected:?}, not {actual:?}")]
    InvoiceBinding {
        payment_hash: PaymentHash,
        expected: Option<TransferId>,
        actual: Option<TransferId>,
    },

    #[error("amount mismatch: expected {expected}, got {actual}")]
    AmountMismatch { expected: u64, actual: u64 },

    #[error("invoice pays {actual}, expected peer node {expected}")]
    DestinationMismatch {
        expected: NodePubKey,
        actual: NodePubKey,
    },

    #[error("preimage does not hash to {0}")]
    PreimageMismatch(PaymentHash),

    #[error("insufficient wallet funds: available {available}, required {required}")]
    InsufficientFunds { available: u64, required: u64 },

    #[error("insufficient channel capacity: available {available}, required {required}")]
    InsufficientCapacity { available: u64, required: u64 },

    #[error("channel bootstrap already in progress")]
    BootstrapInProgress,

    #[error("peer session is {0}")]
    NotReady(PeerState),

    #[error("peer lightning address not known yet")]
    PeerUnknown,

    #[error("unsupported protocol message: {0}")]
    UnsupportedProtocol(String),

    #[error("unexpected peer response: {0}")]
    UnexpectedResponse(String),

    #[error("no {0} handler registered")]
    NoHandler(&'static str),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("handler error: {0}")]
    Handler(String),

    #[error(transparent)]
    Lightning(#[from] LightningError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl SettlementError {
    /// Map a rejected transfer transition onto the transfer it concerns.
    pub(crate) fn from_transition(id: TransferId, err: CoreError) -> Self {
        match err {
            CoreError::InvalidTransferTransition { from, to } => Self::InvalidState {
                id,
                state: from,
                target: to,
            },
            other => Self::Core(other),
        }
    }
}
