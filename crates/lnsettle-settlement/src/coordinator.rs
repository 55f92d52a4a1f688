use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use lnsettle_core::{
    ChangeCheck, ChannelHandle, ConnectorInfo, CoreError, Direction, Fulfillment,
    LightningAddress, PeerEvent, PeerState, Preimage, SessionStateMachine, SettlementConfig,
    Transfer, TransferEvent, TransferId, TransferPrepare,
};
use lnsettle_crypto::{fulfillment_matches, payment_hash_of, PaymentRequest};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::bootstrap::ChannelBootstrap;
use crate::error::SettlementError;
use crate::invoice::InvoiceRegistry;
use crate::ledger::{CancelReason, LedgerEvent, TransferLedger};
use crate::protocol::{PeerMessage, PeerResponse};
use crate::traits::{DataHandler, ILightningNode, IPeerTransport, MoneyHandler};
use crate::types::SettlementReceipt;

#[derive(Debug, Clone)]
struct LocalIdentity {
    address: LightningAddress,
    /// ILP address prefix, e.g. `g.bitcoin.lightning.`.
    prefix: String,
    network: String,
}

#[derive(Debug)]
struct PeerSession {
    state: PeerState,
    local: Option<LocalIdentity>,
    peer: Option<LightningAddress>,
    channel: Option<ChannelHandle>,
    /// Local funds we may still pay the peer with.
    channel_credit: u64,
}

/// Drives the settlement relationship with one peer.
///
/// Owns the transfer ledger and the invoice registry, runs the Lightning
/// handshake and channel setup, and answers the peer's protocol messages.
/// Inbound messages arrive through [`handle_frame`](Self::handle_frame) or
/// [`handle_message`](Self::handle_message); outbound ones leave through the
/// [`IPeerTransport`].
pub struct SettlementCoordinator {
    config: SettlementConfig,
    lightning: Arc<dyn ILightningNode>,
    transport: Arc<dyn IPeerTransport>,
    ledger: TransferLedger,
    invoices: InvoiceRegistry,
    bootstrap: ChannelBootstrap,
    session: Mutex<PeerSession>,
    /// Preimages of outgoing transfers we already paid for.
    paid_transfers: DashMap<TransferId, Preimage>,
    data_handler: RwLock<Option<Arc<dyn DataHandler>>>,
    money_handler: RwLock<Option<Arc<dyn MoneyHandler>>>,
}

impl SettlementCoordinator {
    pub fn new(
        config: SettlementConfig,
        lightning: Arc<dyn ILightningNode>,
        transport: Arc<dyn IPeerTransport>,
    ) -> Result<Self, SettlementError> {
        config.validate()?;
        Ok(Self {
            ledger: TransferLedger::new(config.max_in_flight),
            invoices: InvoiceRegistry::new(config.invoice_ttl()),
            bootstrap: ChannelBootstrap::new(),
            session: Mutex::new(PeerSession {
                state: PeerState::Disconnected,
                local: None,
                peer: None,
                channel: None,
                channel_credit: 0,
            }),
            paid_transfers: DashMap::new(),
            data_handler: RwLock::new(None),
            money_handler: RwLock::new(None),
            config,
            lightning,
            transport,
        })
    }

    fn session(&self) -> MutexGuard<'_, PeerSession> {
        self.session
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    pub fn state(&self) -> PeerState {
        self.session().state
    }

    pub fn ledger(&self) -> &TransferLedger {
        &self.ledger
    }

    pub fn invoices(&self) -> &InvoiceRegistry {
        &self.invoices
    }

    pub fn channel(&self) -> Option<ChannelHandle> {
        self.session().channel.clone()
    }

    pub fn peer_address(&self) -> Option<LightningAddress> {
        self.session().peer.clone()
    }

    pub fn local_address(&self) -> Option<LightningAddress> {
        self.session().local.as_ref().map(|l| l.address.clone())
    }

    pub fn channel_credit(&self) -> u64 {
        self.session().channel_credit
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.ledger.subscribe()
    }

    pub fn set_data_handler(&self, handler: Arc<dyn DataHandler>) {
        *self
            .data_handler
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handler);
    }

    pub fn clear_data_handler(&self) {
        *self
            .data_handler
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }

    pub fn set_money_handler(&self, handler: Arc<dyn MoneyHandler>) {
        *self
            .money_handler
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handler);
    }

    pub fn clear_money_handler(&self) {
        *self
            .money_handler
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }

    fn data_handler(&self) -> Option<Arc<dyn DataHandler>> {
        self.data_handler
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn money_handler(&self) -> Option<Arc<dyn MoneyHandler>> {
        self.money_handler
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn apply(&self, event: PeerEvent) -> Result<PeerState, SettlementError> {
        let mut session = self.session();
        let from = session.state;
        let to = SessionStateMachine::transition(from, event)?;
        session.state = to;
        if from != to {
            tracing::info!(%from, %to, "peer session state changed");
        }
        Ok(to)
    }

    fn require_ready(&self) -> Result<(), SettlementError> {
        match self.state() {
            PeerState::Ready => Ok(()),
            state => Err(SettlementError::NotReady(state)),
        }
    }

    /// Run the Lightning handshake with the peer and set up the channel.
    ///
    /// Handshake failures are returned and leave the session disconnected.
    /// Channel setup failures are logged and retried on the next peer
    /// contact; the session then stays in `ChannelPending`.
    pub async fn connect(&self) -> Result<(), SettlementError> {
        if self.state() != PeerState::Disconnected {
            tracing::debug!(state = %self.state(), "connect ignored");
            return Ok(());
        }
        self.apply(PeerEvent::Connect)?;

        if let Err(e) = self.handshake().await {
            tracing::error!(error = %e, "lightning handshake failed");
            if let Err(transition) = self.apply(PeerEvent::HandshakeFailed) {
                tracing::debug!(error = %transition, "session changed during handshake");
            }
            return Err(e);
        }

        self.apply(PeerEvent::HandshakeComplete)?;
        self.ensure_channel().await;
        Ok(())
    }

    pub fn disconnect(&self) -> Result<(), SettlementError> {
        self.apply(PeerEvent::Disconnect)?;
        Ok(())
    }

    async fn handshake(&self) -> Result<(), SettlementError> {
        let info = self.lightning.get_info().await?;
        let network = match &self.config.network {
            Some(network) => network.clone(),
            None => info
                .chains
                .first()
                .cloned()
                .ok_or_else(|| CoreError::MissingField("chains".into()))?,
        };
        let prefix = format!(
            "{}{}.lightning.",
            if info.testnet { "test." } else { "g." },
            network
        );
        let address = LightningAddress::new(info.identity_pubkey, self.config.external_host.clone());
        tracing::info!(%address, %prefix, "lightning node identified");

        self.session().local = Some(LocalIdentity {
            address: address.clone(),
            prefix,
            network,
        });

        match self.ask(PeerMessage::LightningInfo { address }).await? {
            PeerResponse::LightningInfo {
                address: Some(peer),
            } => {
                self.session().peer = Some(peer);
            }
            PeerResponse::LightningInfo { address: None } | PeerResponse::Ack => {
                tracing::debug!("peer has not announced its lightning address yet");
            }
            other => return Err(SettlementError::UnexpectedResponse(other.kind().into())),
        }

        if let Some(peer) = self.peer_address() {
            self.connect_lightning_peer(&peer).await?;
        }
        Ok(())
    }

    async fn connect_lightning_peer(&self, peer: &LightningAddress) -> Result<(), SettlementError> {
        let peers = self.lightning.list_peers().await?;
        if peers.iter().any(|p| p.pubkey == peer.pubkey) {
            return Ok(());
        }
        self.lightning.connect_peer(peer).await?;
        tracing::info!(%peer, "connected to peer lightning node");
        Ok(())
    }

    /// Move the session towards `Ready`, opening a channel when configured.
    async fn ensure_channel(&self) {
        let (state, peer, has_channel) = {
            let session = self.session();
            (
                session.state,
                session.peer.as_ref().map(|p| p.pubkey),
                session.channel.is_some(),
            )
        };
        if !state.is_connected() {
            return;
        }
        let Some(peer) = peer else {
            tracing::debug!("waiting for the peer address before channel setup");
            return;
        };
        if has_channel || !self.config.setup_channel {
            self.mark_ready();
            return;
        }

        match self
            .bootstrap
            .ensure_channel(self.lightning.as_ref(), &peer, self.config.channel_local_funding)
            .await
        {
            Ok(handle) => {
                self.install_channel(handle.clone());
                self.mark_ready();
                self.announce_channel(handle).await;
            }
            Err(SettlementError::BootstrapInProgress) => {}
            Err(e) => {
                tracing::warn!(error = %e, "channel setup failed, retrying on next peer contact");
            }
        }
    }

    fn install_channel(&self, handle: ChannelHandle) {
        let credit = {
            let mut session = self.session();
            session.channel_credit = handle.local_funding;
            session.channel = Some(handle.clone());
            session.channel_credit
        };
        self.ledger.set_outgoing_limit(credit);
        tracing::info!(
            channel_id = %handle.channel_id,
            local_funding = handle.local_funding,
            "settlement channel installed"
        );
    }

    fn mark_ready(&self) {
        if let Err(e) = self.apply(PeerEvent::ChannelReady) {
            tracing::debug!(error = %e, "session not marked ready");
        }
    }

    async fn announce_channel(&self, handle: ChannelHandle) {
        let message = PeerMessage::ChannelInfo {
            channel_id: handle.channel_id,
            balance: handle.local_funding,
        };
        if let Err(e) = self.ask(message).await {
            tracing::warn!(error = %e, "failed to announce channel to peer");
        }
    }

    fn credit_channel(&self, amount: u64) {
        let credit = {
            let mut session = self.session();
            session.channel_credit = session.channel_credit.saturating_add(amount);
            session.channel_credit
        };
        self.ledger.set_outgoing_limit(credit);
    }

    fn debit_channel(&self, amount: u64) {
        let credit = {
            let mut session = self.session();
            session.channel_credit = session.channel_credit.saturating_sub(amount);
            session.channel_credit
        };
        self.ledger.set_outgoing_limit(credit);
    }

    /// Decode a wire frame from the peer, handle it and encode the reply.
    pub async fn handle_frame(&self, frame: &[u8]) -> Vec<u8> {
        let response = match PeerMessage::from_bytes(frame) {
            Ok(message) => {
                let kind = message.kind();
                self.handle_message(message).await.unwrap_or_else(|e| {
                    tracing::warn!(kind, error = %e, "peer request failed");
                    PeerResponse::Error {
                        message: e.to_string(),
                    }
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, "undecodable peer message");
                PeerResponse::Error {
                    message: e.to_string(),
                }
            }
        };

        response.to_bytes().unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to encode response");
            Vec::new()
        })
    }

    /// Handle one message from the peer.
    ///
    /// Address and channel announcements are accepted in any state; all
    /// other messages require a ready session.
    pub async fn handle_message(&self, message: PeerMessage) -> Result<PeerResponse, SettlementError> {
        tracing::debug!(kind = message.kind(), "peer message received");
        match message {
            PeerMessage::LightningInfo { address } => self.on_lightning_info(address).await,
            PeerMessage::ChannelInfo {
                channel_id,
                balance,
            } => {
                tracing::info!(%channel_id, balance, "peer announced channel");
                self.ensure_channel().await;
                Ok(PeerResponse::Ack)
            }
            PeerMessage::GetInvoice { amount } => {
                self.require_ready()?;
                let invoice = self
                    .invoices
                    .issue(self.lightning.as_ref(), amount, None)
                    .await?;
                Ok(PeerResponse::Invoice {
                    payment_request: invoice.payment_request,
                })
            }
            PeerMessage::Settlement {
                amount,
                payment_preimage,
            } => {
                self.require_ready()?;
                self.on_settlement(amount, payment_preimage).await
            }
            PeerMessage::Prepare { transfer } => {
                self.require_ready()?;
                transfer.validate()?;
                self.ledger.prepare(transfer.into_transfer(Direction::Incoming))?;
                Ok(PeerResponse::Ack)
            }
            PeerMessage::Fulfill {
                transfer_id,
                fulfillment,
                payment_request,
            } => {
                self.require_ready()?;
                self.on_fulfill(transfer_id, fulfillment, &payment_request)
                    .await
            }
            PeerMessage::Reject {
                transfer_id,
                reason,
            } => {
                self.require_ready()?;
                self.on_reject(transfer_id, reason)
            }
            PeerMessage::Data { ilp } => {
                self.require_ready()?;
                let handler = self.data_handler().ok_or(SettlementError::NoHandler("data"))?;
                let reply = handler.handle_data(ilp).await?;
                Ok(PeerResponse::Data { ilp: reply })
            }
        }
    }

    async fn on_lightning_info(
        &self,
        address: LightningAddress,
    ) -> Result<PeerResponse, SettlementError> {
        tracing::info!(peer = %address, "peer announced lightning address");
        let connected = {
            let mut session = self.session();
            session.peer = Some(address.clone());
            session.state.is_connected()
        };
        if connected {
            self.connect_lightning_peer(&address).await?;
            self.ensure_channel().await;
        }
        Ok(PeerResponse::LightningInfo {
            address: self.local_address(),
        })
    }

    async fn on_settlement(
        &self,
        amount: u64,
        preimage: Preimage,
    ) -> Result<PeerResponse, SettlementError> {
        let invoice = self.invoices.settle(&preimage, amount, None)?;
        self.credit_channel(amount);
        self.ledger.credit_settlement(amount);
        tracing::info!(
            amount,
            payment_hash = %invoice.payment_hash,
            "settlement received from peer"
        );

        if let Some(handler) = self.money_handler() {
            if let Err(e) = handler.handle_money(amount).await {
                tracing::error!(amount, error = %e, "money handler failed");
            }
        }
        Ok(PeerResponse::Ack)
    }

    /// The peer fulfilled a transfer we prepared and asks to be paid.
    async fn on_fulfill(
        &self,
        id: TransferId,
        fulfillment: Fulfillment,
        payment_request: &str,
    ) -> Result<PeerResponse, SettlementError> {
        if let Some(preimage) = self.paid_transfers.get(&id).map(|p| *p) {
            tracing::debug!(transfer_id = %id, "transfer already paid, repeating preimage");
            return Ok(PeerResponse::Preimage {
                payment_preimage: preimage,
            });
        }

        let transfer = self
            .ledger
            .get(&id)
            .ok_or(SettlementError::UnknownTransfer(id))?;
        if transfer.direction != Direction::Outgoing {
            return Err(SettlementError::WrongDirection {
                id,
                expected: Direction::Outgoing,
                actual: transfer.direction,
            });
        }
        if self.ledger.assert_allowed_change(&id, TransferEvent::Fulfill)? == ChangeCheck::Repeat {
            return Err(SettlementError::InvalidState {
                id,
                state: transfer.state,
                target: TransferEvent::Fulfill.target(),
            });
        }

        let request = self.check_invoice(payment_request, transfer.amount)?;
        let mut reservation = self
            .ledger
            .reserve_outgoing(request.amount.saturating_sub(transfer.amount))?;
        let (_, check) = self
            .ledger
            .fulfill_paying(&id, fulfillment, &mut reservation)?;
        if check == ChangeCheck::Repeat {
            return Err(SettlementError::InvalidState {
                id,
                state: TransferEvent::Fulfill.target(),
                target: TransferEvent::Fulfill.target(),
            });
        }

        let preimage = self.pay(payment_request, &request).await?;
        self.paid_transfers.insert(id, preimage);
        self.debit_channel(request.amount);
        drop(reservation);
        tracing::info!(
            transfer_id = %id,
            amount = request.amount,
            "paid peer for fulfilled transfer"
        );
        Ok(PeerResponse::Preimage {
            payment_preimage: preimage,
        })
    }

    /// The peer rejected a transfer we prepared.
    fn on_reject(&self, id: TransferId, reason: String) -> Result<PeerResponse, SettlementError> {
        if self.ledger.assert_allowed_change(&id, TransferEvent::Cancel)? == ChangeCheck::Repeat {
            return Ok(PeerResponse::Ack);
        }
        let transfer = self
            .ledger
            .get(&id)
            .ok_or(SettlementError::UnknownTransfer(id))?;
        if transfer.direction != Direction::Outgoing {
            return Err(SettlementError::WrongDirection {
                id,
                expected: Direction::Outgoing,
                actual: transfer.direction,
            });
        }
        self.ledger.cancel(&id, CancelReason::Rejected(reason))?;
        Ok(PeerResponse::Ack)
    }

    async fn ask(&self, message: PeerMessage) -> Result<PeerResponse, SettlementError> {
        Ok(self.transport.request(message).await?.into_result()?)
    }

    /// Decode a payment request from the peer and check it before paying.
    fn check_invoice(
        &self,
        payment_request: &str,
        expected: u64,
    ) -> Result<PaymentRequest, SettlementError> {
        let request = PaymentRequest::decode(payment_request)?;

        let deviation = request.amount.abs_diff(expected) as f64;
        if deviation > expected as f64 * self.config.invoice_tolerance {
            tracing::warn!(
                expected,
                invoiced = request.amount,
                tolerance = self.config.invoice_tolerance,
                "invoice amount outside tolerance"
            );
            return Err(SettlementError::AmountMismatch {
                expected,
                actual: request.amount,
            });
        }

        let peer = self.peer_address().ok_or(SettlementError::PeerUnknown)?;
        if request.destination != peer.pubkey {
            tracing::warn!(
                destination = %request.destination,
                peer = %peer.pubkey,
                "invoice does not pay the peer"
            );
            return Err(SettlementError::DestinationMismatch {
                expected: peer.pubkey,
                actual: request.destination,
            });
        }
        Ok(request)
    }

    async fn pay(
        &self,
        payment_request: &str,
        request: &PaymentRequest,
    ) -> Result<Preimage, SettlementError> {
        tracing::debug!(
            payment_hash = %request.payment_hash,
            amount = request.amount,
            "paying invoice"
        );
        let preimage = self.lightning.send_payment(payment_request).await?;
        if payment_hash_of(&preimage) != request.payment_hash {
            tracing::error!(payment_hash = %request.payment_hash, "node returned wrong preimage");
            return Err(SettlementError::PreimageMismatch(request.payment_hash));
        }
        Ok(preimage)
    }

    /// Pay the peer `amount` over Lightning and tell it about the payment.
    pub async fn send_money(&self, amount: u64) -> Result<SettlementReceipt, SettlementError> {
        self.require_ready()?;
        if amount == 0 {
            return Err(SettlementError::InvalidAmount("cannot send zero".into()));
        }

        // Credit not held by prepared transfers or other payments.
        let mut reservation = self.ledger.reserve_outgoing(amount)?;

        let payment_request = match self.ask(PeerMessage::GetInvoice { amount }).await? {
            PeerResponse::Invoice { payment_request } => payment_request,
            other => return Err(SettlementError::UnexpectedResponse(other.kind().into())),
        };
        let request = self.check_invoice(&payment_request, amount)?;
        if request.amount > reservation.amount() {
            reservation.grow(request.amount - reservation.amount())?;
        }
        let preimage = self.pay(&payment_request, &request).await?;
        self.debit_channel(request.amount);
        drop(reservation);

        let notice = PeerMessage::Settlement {
            amount,
            payment_preimage: preimage,
        };
        if let Err(e) = self.ask(notice).await {
            tracing::error!(
                payment_hash = %request.payment_hash,
                error = %e,
                "payment sent but the peer did not acknowledge it"
            );
            return Err(e);
        }

        tracing::info!(amount, invoiced = request.amount, "settled with peer");
        Ok(SettlementReceipt {
            amount,
            invoiced_amount: request.amount,
            payment_hash: request.payment_hash,
            preimage,
            settled_at: Utc::now(),
        })
    }

    /// Prepare a transfer to the peer.
    pub async fn send_transfer(&self, prepare: TransferPrepare) -> Result<(), SettlementError> {
        self.require_ready()?;
        prepare.validate()?;
        let id = prepare.id;

        let transfer = prepare.clone().into_transfer(Direction::Outgoing);
        if self.ledger.prepare(transfer)? == ChangeCheck::Repeat {
            return Ok(());
        }

        if let Err(e) = self.ask(PeerMessage::Prepare { transfer: prepare }).await {
            tracing::warn!(transfer_id = %id, error = %e, "peer refused transfer");
            self.ledger
                .cancel(&id, CancelReason::Rejected(e.to_string()))?;
            return Err(e);
        }
        Ok(())
    }

    /// Fulfill a transfer the peer prepared to us, getting paid for it first.
    ///
    /// An invoice for the transfer amount goes to the peer with the
    /// fulfillment. The transfer is fulfilled locally only once the peer
    /// returns the preimage of that invoice. If the peer does not pay, the
    /// transfer stays prepared and keeps counting against the in-flight
    /// balance.
    pub async fn fulfill_condition(
        &self,
        id: TransferId,
        fulfillment: Fulfillment,
    ) -> Result<Transfer, SettlementError> {
        self.require_ready()?;
        let transfer = self
            .ledger
            .get(&id)
            .ok_or(SettlementError::UnknownTransfer(id))?;
        if self.ledger.assert_allowed_change(&id, TransferEvent::Fulfill)? == ChangeCheck::Repeat {
            return Ok(transfer);
        }
        if transfer.direction != Direction::Incoming {
            return Err(SettlementError::WrongDirection {
                id,
                expected: Direction::Incoming,
                actual: transfer.direction,
            });
        }
        if !fulfillment_matches(&fulfillment, &transfer.execution_condition) {
            return Err(SettlementError::FulfillmentMismatch(id));
        }

        // A retry reuses the invoice the peer may already have paid.
        let invoice = match self.invoices.outstanding_for(&id) {
            Some(invoice) => invoice,
            None => {
                self.invoices
                    .issue(self.lightning.as_ref(), transfer.amount, Some(id))
                    .await?
            }
        };
        let message = PeerMessage::Fulfill {
            transfer_id: id,
            fulfillment,
            payment_request: invoice.payment_request.clone(),
        };
        let preimage = match self.ask(message).await {
            Ok(PeerResponse::Preimage { payment_preimage }) => payment_preimage,
            Ok(other) => return Err(SettlementError::UnexpectedResponse(other.kind().into())),
            Err(e) => {
                tracing::warn!(
                    transfer_id = %id,
                    error = %e,
                    "peer did not pay for fulfillment, keeping transfer in flight"
                );
                return Err(e);
            }
        };

        if payment_hash_of(&preimage) != invoice.payment_hash {
            return Err(SettlementError::PreimageMismatch(invoice.payment_hash));
        }
        let settled = self.invoices.settle(&preimage, transfer.amount, Some(id))?;
        self.credit_channel(settled.amount);
        self.ledger.credit_settlement(settled.amount);
        let transfer = self.ledger.fulfill(&id, fulfillment)?;
        tracing::info!(transfer_id = %id, amount = transfer.amount, "incoming transfer paid");
        Ok(transfer)
    }

    /// Reject a transfer the peer prepared to us.
    ///
    /// Rejecting an already rejected transfer tells the peer again.
    pub async fn reject_incoming_transfer(
        &self,
        id: TransferId,
        reason: &str,
    ) -> Result<(), SettlementError> {
        if self.ledger.assert_allowed_change(&id, TransferEvent::Cancel)? == ChangeCheck::Allowed {
            let transfer = self
                .ledger
                .get(&id)
                .ok_or(SettlementError::UnknownTransfer(id))?;
            if transfer.direction != Direction::Incoming {
                return Err(SettlementError::WrongDirection {
                    id,
                    expected: Direction::Incoming,
                    actual: transfer.direction,
                });
            }
            self.ledger
                .cancel(&id, CancelReason::Rejected(reason.to_string()))?;
        }

        self.ask(PeerMessage::Reject {
            transfer_id: id,
            reason: reason.to_string(),
        })
        .await?;
        Ok(())
    }

    /// Send an ILP packet to the peer and return its reply packet.
    pub async fn send_data(&self, packet: Bytes) -> Result<Bytes, SettlementError> {
        self.require_ready()?;
        match self.ask(PeerMessage::Data { ilp: packet }).await? {
            PeerResponse::Data { ilp } => Ok(ilp),
            other => Err(SettlementError::UnexpectedResponse(other.kind().into())),
        }
    }

    /// Connector-facing description of this link. Available after the
    /// handshake identified the local node.
    pub fn get_info(&self) -> Result<ConnectorInfo, SettlementError> {
        let session = self.session();
        let local = session
            .local
            .as_ref()
            .ok_or(SettlementError::NotReady(session.state))?;
        Ok(ConnectorInfo {
            prefix: local.prefix.clone(),
            currency_code: ConnectorInfo::currency_code_for(&local.network).to_string(),
            currency_scale: self.config.currency_scale,
            connectors: session
                .peer
                .iter()
                .map(|peer| format!("{}{}", local.prefix, peer.pubkey))
                .collect(),
        })
    }

    /// Our ILP account: the prefix followed by our node pubkey.
    pub fn account(&self) -> Result<String, SettlementError> {
        let session = self.session();
        let local = session
            .local
            .as_ref()
            .ok_or(SettlementError::NotReady(session.state))?;
        Ok(format!("{}{}", local.prefix, local.address.pubkey))
    }

    /// Local balance across the node's channels.
    pub async fn get_balance(&self) -> Result<u64, SettlementError> {
        Ok(self.lightning.channel_balance().await?)
    }

    /// Drop resolved transfers past retention and expired invoices.
    pub fn purge(&self) -> (usize, usize) {
        let transfers = self.ledger.purge_resolved(self.config.transfer_retention());
        self.paid_transfers
            .retain(|id, _| self.ledger.get(id).is_some());
        let invoices = self.invoices.purge_expired();
        (transfers, invoices)
    }

    /// Run [`purge`](Self::purge) every `every` until the coordinator is
    /// dropped.
    pub fn spawn_housekeeping(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let coordinator: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(coordinator) = coordinator.upgrade() else {
                    break;
                };
                let (transfers, invoices) = coordinator.purge();
                if transfers + invoices > 0 {
                    tracing::debug!(transfers, invoices, "housekeeping purged records");
                }
            }
        })
    }
}
