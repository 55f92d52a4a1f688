use chrono::Utc;
use lnsettle_core::{
    ChangeCheck, Direction, Fulfillment, Transfer, TransferEvent, TransferId, TransferState,
    TransferStateMachine,
};
use lnsettle_crypto::fulfillment_matches;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;

use crate::error::SettlementError;

const EVENT_CAPACITY: usize = 256;

/// Amounts currently committed to prepared transfers, per direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InFlightBalance {
    /// Sum of prepared incoming transfers.
    pub incoming: u64,
    /// Sum of prepared outgoing transfers.
    pub outgoing: u64,
    /// Lightning payments received from the peer and not yet consumed by a
    /// fulfilled incoming transfer.
    pub settled: u64,
    /// Outgoing capacity held by Lightning payments in progress.
    pub reserved: u64,
}

impl InFlightBalance {
    /// Incoming value not yet covered by settlement.
    pub fn unsecured_incoming(&self) -> u64 {
        self.incoming.saturating_sub(self.settled)
    }

    /// Outgoing capacity committed to transfers and payments in progress.
    pub fn committed_outgoing(&self) -> u64 {
        self.outgoing.saturating_add(self.reserved)
    }
}

/// Outgoing capacity held for one Lightning payment.
///
/// Released on drop. Lower the outgoing limit by the paid amount before
/// dropping it, so the capacity is never free in between.
#[must_use = "the reservation is released when dropped"]
pub struct OutgoingReservation {
    ledger: TransferLedger,
    amount: u64,
}

impl OutgoingReservation {
    pub fn amount(&self) -> u64 {
        self.amount
    }

    /// Hold `extra` more capacity for the same payment.
    pub fn grow(&mut self, extra: u64) -> Result<(), SettlementError> {
        self.ledger.reserve(extra)?;
        self.amount += extra;
        Ok(())
    }
}

impl Drop for OutgoingReservation {
    fn drop(&mut self) {
        let mut state = self.ledger.state();
        state.balance.reserved = state.balance.reserved.saturating_sub(self.amount);
    }
}

/// Why a prepared transfer was cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelReason {
    Rejected(String),
    Expired,
}

/// Terminal and non-terminal transitions, published to subscribers.
#[derive(Debug, Clone)]
pub enum LedgerEvent {
    Prepared(Transfer),
    Fulfilled(Transfer),
    Cancelled {
        transfer: Transfer,
        reason: CancelReason,
    },
}

struct Entry {
    transfer: Transfer,
    fulfillment: Option<Fulfillment>,
    expiry: Option<AbortHandle>,
}

struct LedgerState {
    transfers: HashMap<TransferId, Entry>,
    balance: InFlightBalance,
    max_incoming: u64,
    max_outgoing: u64,
}

struct LedgerInner {
    state: Mutex<LedgerState>,
    events: broadcast::Sender<LedgerEvent>,
}

/// Tracks every transfer with the peer and the exposure it creates.
///
/// All reads and updates of the transfer map and the in-flight balance go
/// through one lock, so exposure checks and state changes are atomic with
/// respect to each other. Prepared transfers expire on their own when a
/// Tokio runtime is available.
#[derive(Clone)]
pub struct TransferLedger {
    inner: Arc<LedgerInner>,
}

impl TransferLedger {
    /// Ledger with an incoming ceiling and no outgoing capacity yet.
    pub fn new(max_incoming: u64) -> Self {
        Self::with_limits(max_incoming, 0)
    }

    pub fn with_limits(max_incoming: u64, max_outgoing: u64) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(LedgerInner {
                state: Mutex::new(LedgerState {
                    transfers: HashMap::new(),
                    balance: InFlightBalance::default(),
                    max_incoming,
                    max_outgoing,
                }),
                events,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: LedgerEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.inner.events.subscribe()
    }

    /// Set the outgoing ceiling, normally the local channel balance.
    pub fn set_outgoing_limit(&self, max_outgoing: u64) {
        self.state().max_outgoing = max_outgoing;
        tracing::debug!(max_outgoing, "outgoing limit updated");
    }

    pub fn balance(&self) -> InFlightBalance {
        self.state().balance
    }

    pub fn get(&self, id: &TransferId) -> Option<Transfer> {
        self.state().transfers.get(id).map(|e| e.transfer.clone())
    }

    pub fn len(&self) -> usize {
        self.state().transfers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record a new prepared transfer.
    ///
    /// Returns [`ChangeCheck::Repeat`] when an identical transfer is already
    /// pending. Any other entry under the same id is a duplicate.
    pub fn prepare(&self, transfer: Transfer) -> Result<ChangeCheck, SettlementError> {
        let id = transfer.id;
        let mut transfer = transfer;
        transfer.state = TransferState::Prepared;
        transfer.resolved_at = None;

        {
            let mut state = self.state();

            if let Some(existing) = state.transfers.get(&id) {
                if existing.transfer.state == TransferState::Prepared
                    && existing.transfer.same_terms(&transfer)
                {
                    tracing::debug!(transfer_id = %id, "repeated prepare ignored");
                    return Ok(ChangeCheck::Repeat);
                }
                tracing::warn!(transfer_id = %id, "duplicate transfer rejected");
                return Err(SettlementError::DuplicateTransfer(id));
            }

            if transfer.is_expired_at(Utc::now()) {
                return Err(SettlementError::Expired(id));
            }

            let amount = transfer.amount;
            match transfer.direction {
                Direction::Incoming => {
                    let in_flight = state.balance.unsecured_incoming();
                    let exposure = state
                        .balance
                        .incoming
                        .checked_add(amount)
                        .map(|total| total.saturating_sub(state.balance.settled));
                    if exposure.map_or(true, |e| e > state.max_incoming) {
                        tracing::warn!(
                            transfer_id = %id,
                            amount,
                            in_flight,
                            maximum = state.max_incoming,
                            "incoming transfer exceeds unsecured credit"
                        );
                        return Err(SettlementError::ExposureExceeded {
                            direction: Direction::Incoming,
                            in_flight,
                            amount,
                            maximum: state.max_incoming,
                        });
                    }
                    state.balance.incoming += amount;
                }
                Direction::Outgoing => {
                    let in_flight = state.balance.committed_outgoing();
                    let fits = in_flight
                        .checked_add(amount)
                        .is_some_and(|total| total <= state.max_outgoing);
                    if !fits {
                        tracing::warn!(
                            transfer_id = %id,
                            amount,
                            in_flight,
                            maximum = state.max_outgoing,
                            "outgoing transfer exceeds channel capacity"
                        );
                        return Err(SettlementError::ExposureExceeded {
                            direction: Direction::Outgoing,
                            in_flight,
                            amount,
                            maximum: state.max_outgoing,
                        });
                    }
                    state.balance.outgoing += amount;
                }
            }

            let expiry = self.schedule_expiry(&transfer);
            state.transfers.insert(
                id,
                Entry {
                    transfer: transfer.clone(),
                    fulfillment: None,
                    expiry,
                },
            );
        }

        tracing::info!(
            transfer_id = %id,
            amount = transfer.amount,
            direction = %transfer.direction,
            "transfer prepared"
        );
        self.emit(LedgerEvent::Prepared(transfer));
        Ok(ChangeCheck::Allowed)
    }

    /// Check whether `event` may be applied to a transfer without applying it.
    pub fn assert_allowed_change(
        &self,
        id: &TransferId,
        event: TransferEvent,
    ) -> Result<ChangeCheck, SettlementError> {
        let state = self.state();
        let entry = state
            .transfers
            .get(id)
            .ok_or(SettlementError::UnknownTransfer(*id))?;
        TransferStateMachine::check(entry.transfer.state, event)
            .map_err(|e| SettlementError::from_transition(*id, e))
    }

    /// Fulfill a prepared transfer.
    ///
    /// Fulfilling again with the same fulfillment returns the transfer
    /// unchanged.
    pub fn fulfill(
        &self,
        id: &TransferId,
        fulfillment: Fulfillment,
    ) -> Result<Transfer, SettlementError> {
        self.fulfill_checked(id, fulfillment).map(|(transfer, _)| transfer)
    }

    /// Like [`fulfill`](Self::fulfill), also reporting whether this call
    /// performed the transition or found it already done.
    pub fn fulfill_checked(
        &self,
        id: &TransferId,
        fulfillment: Fulfillment,
    ) -> Result<(Transfer, ChangeCheck), SettlementError> {
        self.fulfill_holding(id, fulfillment, None)
    }

    /// Fulfill an outgoing transfer that is about to be paid over Lightning.
    ///
    /// The capacity the transfer held moves into `reservation` under the same
    /// lock, so it stays committed until the payment debits the channel.
    pub fn fulfill_paying(
        &self,
        id: &TransferId,
        fulfillment: Fulfillment,
        reservation: &mut OutgoingReservation,
    ) -> Result<(Transfer, ChangeCheck), SettlementError> {
        self.fulfill_holding(id, fulfillment, Some(reservation))
    }

    fn fulfill_holding(
        &self,
        id: &TransferId,
        fulfillment: Fulfillment,
        hold: Option<&mut OutgoingReservation>,
    ) -> Result<(Transfer, ChangeCheck), SettlementError> {
        let transfer = {
            let mut state = self.state();
            let entry = state
                .transfers
                .get_mut(id)
                .ok_or(SettlementError::UnknownTransfer(*id))?;

            let check = TransferStateMachine::check(entry.transfer.state, TransferEvent::Fulfill)
                .map_err(|e| SettlementError::from_transition(*id, e))?;
            if check == ChangeCheck::Repeat {
                return match entry.fulfillment {
                    Some(previous) if previous == fulfillment => {
                        Ok((entry.transfer.clone(), ChangeCheck::Repeat))
                    }
                    _ => Err(SettlementError::FulfillmentMismatch(*id)),
                };
            }

            if !fulfillment_matches(&fulfillment, &entry.transfer.execution_condition) {
                tracing::warn!(transfer_id = %id, "fulfillment does not match condition");
                return Err(SettlementError::FulfillmentMismatch(*id));
            }

            entry.transfer.state =
                TransferStateMachine::transition(entry.transfer.state, TransferEvent::Fulfill)
                    .map_err(|e| SettlementError::from_transition(*id, e))?;
            entry.transfer.resolved_at = Some(Utc::now());
            entry.fulfillment = Some(fulfillment);
            if let Some(expiry) = entry.expiry.take() {
                expiry.abort();
            }
            let transfer = entry.transfer.clone();

            match transfer.direction {
                Direction::Incoming => {
                    state.balance.incoming = state.balance.incoming.saturating_sub(transfer.amount);
                    state.balance.settled = state.balance.settled.saturating_sub(transfer.amount);
                }
                Direction::Outgoing => {
                    state.balance.outgoing = state.balance.outgoing.saturating_sub(transfer.amount);
                    if let Some(reservation) = hold {
                        state.balance.reserved += transfer.amount;
                        reservation.amount += transfer.amount;
                    }
                }
            }
            transfer
        };

        tracing::info!(transfer_id = %id, amount = transfer.amount, "transfer fulfilled");
        self.emit(LedgerEvent::Fulfilled(transfer.clone()));
        Ok((transfer, ChangeCheck::Allowed))
    }

    /// Cancel a prepared transfer. Cancelling a cancelled transfer is a no-op.
    pub fn cancel(
        &self,
        id: &TransferId,
        reason: CancelReason,
    ) -> Result<Transfer, SettlementError> {
        let transfer = {
            let mut state = self.state();
            let entry = state
                .transfers
                .get_mut(id)
                .ok_or(SettlementError::UnknownTransfer(*id))?;

            let check = TransferStateMachine::check(entry.transfer.state, TransferEvent::Cancel)
                .map_err(|e| SettlementError::from_transition(*id, e))?;
            if check == ChangeCheck::Repeat {
                return Ok(entry.transfer.clone());
            }
            Self::cancel_entry(&mut state, id)
        };

        if let Some(transfer) = &transfer {
            tracing::info!(transfer_id = %id, ?reason, "transfer cancelled");
            self.emit(LedgerEvent::Cancelled {
                transfer: transfer.clone(),
                reason,
            });
        }
        transfer.ok_or(SettlementError::UnknownTransfer(*id))
    }

    /// Cancel a transfer whose expiry passed.
    ///
    /// Does nothing unless the transfer is still prepared; a transfer that was
    /// fulfilled or rejected first keeps its state.
    pub fn expire(&self, id: &TransferId) -> Option<Transfer> {
        let transfer = {
            let mut state = self.state();
            match state.transfers.get(id) {
                Some(entry) if entry.transfer.state == TransferState::Prepared => {}
                _ => return None,
            }
            Self::cancel_entry(&mut state, id)?
        };

        tracing::info!(transfer_id = %id, amount = transfer.amount, "transfer expired");
        self.emit(LedgerEvent::Cancelled {
            transfer: transfer.clone(),
            reason: CancelReason::Expired,
        });
        Some(transfer)
    }

    fn cancel_entry(state: &mut LedgerState, id: &TransferId) -> Option<Transfer> {
        let entry = state.transfers.get_mut(id)?;
        entry.transfer.state =
            TransferStateMachine::transition(entry.transfer.state, TransferEvent::Cancel).ok()?;
        entry.transfer.resolved_at = Some(Utc::now());
        if let Some(expiry) = entry.expiry.take() {
            expiry.abort();
        }
        let transfer = entry.transfer.clone();

        match transfer.direction {
            Direction::Incoming => {
                state.balance.incoming = state.balance.incoming.saturating_sub(transfer.amount)
            }
            Direction::Outgoing => {
                state.balance.outgoing = state.balance.outgoing.saturating_sub(transfer.amount)
            }
        }
        Some(transfer)
    }

    /// Hold `amount` of outgoing capacity for a Lightning payment.
    ///
    /// Fails with [`SettlementError::InsufficientCapacity`] when prepared
    /// transfers and other payments leave less than `amount` free.
    pub fn reserve_outgoing(&self, amount: u64) -> Result<OutgoingReservation, SettlementError> {
        self.reserve(amount)?;
        Ok(OutgoingReservation {
            ledger: self.clone(),
            amount,
        })
    }

    fn reserve(&self, amount: u64) -> Result<(), SettlementError> {
        let mut state = self.state();
        let available = state
            .max_outgoing
            .saturating_sub(state.balance.committed_outgoing());
        if amount > available {
            tracing::warn!(
                amount,
                available,
                outgoing = state.balance.outgoing,
                reserved = state.balance.reserved,
                "not enough free outgoing capacity"
            );
            return Err(SettlementError::InsufficientCapacity {
                available,
                required: amount,
            });
        }
        state.balance.reserved += amount;
        Ok(())
    }

    /// Record a Lightning payment received from the peer.
    pub fn credit_settlement(&self, amount: u64) {
        let mut state = self.state();
        state.balance.settled = state.balance.settled.saturating_add(amount);
        tracing::debug!(amount, settled = state.balance.settled, "settlement credited");
    }

    /// Drop terminal transfers resolved longer than `retention` ago.
    pub fn purge_resolved(&self, retention: Duration) -> usize {
        let cutoff = chrono::Duration::from_std(retention)
            .ok()
            .and_then(|retention| Utc::now().checked_sub_signed(retention));
        let mut state = self.state();
        let before = state.transfers.len();
        state.transfers.retain(|_, entry| match (entry.transfer.resolved_at, cutoff) {
            (Some(resolved_at), Some(cutoff)) => resolved_at > cutoff,
            _ => true,
        });
        let purged = before - state.transfers.len();
        if purged > 0 {
            tracing::debug!(purged, "resolved transfers purged");
        }
        purged
    }

    fn schedule_expiry(&self, transfer: &Transfer) -> Option<AbortHandle> {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let delay = (transfer.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let ledger: Weak<LedgerInner> = Arc::downgrade(&self.inner);
        let id = transfer.id;

        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = ledger.upgrade() {
                TransferLedger { inner }.expire(&id);
            }
        });
        Some(task.abort_handle())
    }
}
