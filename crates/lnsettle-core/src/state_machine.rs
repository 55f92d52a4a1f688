use std::fmt;

use crate::error::CoreError;

/// Lifecycle states of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    /// Funds are on hold pending fulfillment or cancellation.
    Prepared,
    /// The condition was fulfilled. Final state.
    Fulfilled,
    /// The transfer was rejected or expired. Final state.
    Cancelled,
}

impl TransferState {
    /// Whether this is a final (terminal) state.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Fulfilled | Self::Cancelled)
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prepared => write!(f, "prepared"),
            Self::Fulfilled => write!(f, "fulfilled"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Events that move a prepared transfer to a final state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEvent {
    Fulfill,
    Cancel,
}

impl TransferEvent {
    /// The state this event leads to.
    pub fn target(&self) -> TransferState {
        match self {
            Self::Fulfill => TransferState::Fulfilled,
            Self::Cancel => TransferState::Cancelled,
        }
    }
}

/// Outcome of checking a state change without performing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeCheck {
    /// The transfer is prepared; the change may be applied.
    Allowed,
    /// The transfer is already in the target state. The operation may have
    /// happened already; callers must not blindly retry its side effects.
    Repeat,
}

/// Transfer transitions.
///
/// Valid transitions:
/// - Prepared → Fulfilled (Fulfill)
/// - Prepared → Cancelled (Cancel)
///
/// A final state receiving the event that leads to itself is a repeat, not
/// an error.
pub struct TransferStateMachine;

impl TransferStateMachine {
    /// Check whether `event` may be applied to `current`.
    pub fn check(current: TransferState, event: TransferEvent) -> Result<ChangeCheck, CoreError> {
        let target = event.target();
        match current {
            TransferState::Prepared => Ok(ChangeCheck::Allowed),
            state if state == target => Ok(ChangeCheck::Repeat),
            state => Err(CoreError::InvalidTransferTransition {
                from: state,
                to: target,
            }),
        }
    }

    /// Apply `event` to a prepared transfer, returning the new state.
    pub fn transition(
        current: TransferState,
        event: TransferEvent,
    ) -> Result<TransferState, CoreError> {
        let target = event.target();
        if current != TransferState::Prepared {
            return Err(CoreError::InvalidTransferTransition {
                from: current,
                to: target,
            });
        }

        tracing::debug!(from = %current, to = %target, event = ?event, "transfer state transition");
        Ok(target)
    }
}

/// Per-peer session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerState {
    /// No Lightning handshake has happened.
    Disconnected,
    /// Fetching node identity and exchanging it with the peer.
    Handshaking,
    /// Handshake done; waiting for a funded channel with the peer.
    ChannelPending,
    /// Transfers and settlement are accepted.
    Ready,
}

impl PeerState {
    /// Whether the Lightning handshake has completed.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::ChannelPending | Self::Ready)
    }
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Handshaking => write!(f, "handshaking"),
            Self::ChannelPending => write!(f, "channel-pending"),
            Self::Ready => write!(f, "ready"),
        }
    }
}

/// Events driving the peer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerEvent {
    Connect,
    HandshakeComplete,
    HandshakeFailed,
    ChannelReady,
    Disconnect,
}

/// Session transitions.
///
/// Valid transitions:
/// - Disconnected → Handshaking (Connect)
/// - Handshaking → ChannelPending (HandshakeComplete)
/// - Handshaking → Disconnected (HandshakeFailed)
/// - ChannelPending → Ready (ChannelReady)
/// - Ready → Ready (ChannelReady)
/// - any → Disconnected (Disconnect)
pub struct SessionStateMachine;

impl SessionStateMachine {
    pub fn transition(current: PeerState, event: PeerEvent) -> Result<PeerState, CoreError> {
        let new_state = match (current, event) {
            (PeerState::Disconnected, PeerEvent::Connect) => PeerState::Handshaking,
            (PeerState::Handshaking, PeerEvent::HandshakeComplete) => PeerState::ChannelPending,
            (PeerState::Handshaking, PeerEvent::HandshakeFailed) => PeerState::Disconnected,
            (PeerState::ChannelPending, PeerEvent::ChannelReady) => PeerState::Ready,
            (PeerState::Ready, PeerEvent::ChannelReady) => PeerState::Ready,
            (_, PeerEvent::Disconnect) => PeerState::Disconnected,
            _ => {
                return Err(CoreError::InvalidSessionTransition {
                    from: current,
                    event,
                })
            }
        };

        tracing::debug!(from = %current, to = %new_state, event = ?event, "session state transition");
        Ok(new_state)
    }

    /// Check if a transition is valid without performing it.
    pub fn can_transition(current: PeerState, event: PeerEvent) -> bool {
        Self::transition(current, event).is_ok()
    }
}
