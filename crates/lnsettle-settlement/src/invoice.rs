use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use lnsettle_core::{NodePubKey, PaymentHash, Preimage, TransferId};
use lnsettle_crypto::{payment_hash_of, PaymentRequest};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{LightningError, SettlementError};
use crate::traits::ILightningNode;

/// An invoice this side issued and has not yet seen settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    pub payment_hash: PaymentHash,
    pub payment_request: String,
    pub amount: u64,
    /// Our node, as encoded in the payment request.
    pub destination: NodePubKey,
    /// The transfer this invoice pays for, if any.
    pub transfer_id: Option<TransferId>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Outstanding invoices keyed by payment hash.
///
/// Each invoice can be settled once. Thread-safe: uses `DashMap` for
/// concurrent access.
pub struct InvoiceRegistry {
    invoices: DashMap<PaymentHash, Invoice>,
    ttl: Duration,
}

impl InvoiceRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            invoices: DashMap::new(),
            ttl,
        }
    }

    /// Ask the node for a new invoice of `amount` and record it.
    pub async fn issue(
        &self,
        lightning: &dyn ILightningNode,
        amount: u64,
        transfer_id: Option<TransferId>,
    ) -> Result<Invoice, SettlementError> {
        if amount == 0 {
            return Err(SettlementError::InvalidAmount(
                "cannot invoice a zero amount".into(),
            ));
        }
        self.purge_expired();

        let added = lightning.add_invoice(amount, self.ttl.as_secs()).await?;
        let decoded = PaymentRequest::decode(&added.payment_request)?;
        if decoded.payment_hash != added.payment_hash || decoded.amount != amount {
            return Err(SettlementError::Lightning(LightningError::Rpc(format!(
                "node returned inconsistent invoice {}",
                added.payment_hash
            ))));
        }

        let created_at = Utc::now();
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::days(1));
        let invoice = Invoice {
            payment_hash: added.payment_hash,
            payment_request: added.payment_request,
            amount,
            destination: decoded.destination,
            transfer_id,
            created_at,
            expires_at: created_at + ttl,
        };
        self.invoices.insert(invoice.payment_hash, invoice.clone());

        tracing::info!(
            payment_hash = %invoice.payment_hash,
            amount,
            transfer_id = ?transfer_id,
            "invoice issued"
        );
        Ok(invoice)
    }

    /// An unexpired invoice already issued for `transfer_id`.
    pub fn outstanding_for(&self, transfer_id: &TransferId) -> Option<Invoice> {
        let now = Utc::now();
        self.invoices
            .iter()
            .find(|e| e.transfer_id.as_ref() == Some(transfer_id) && e.expires_at > now)
            .map(|e| e.value().clone())
    }

    /// Consume the invoice that `preimage` pays.
    ///
    /// `bound` is the transfer the payment is for, `None` for plain
    /// settlements. The invoice must have been issued for the same one. On a
    /// binding or amount mismatch the invoice stays outstanding.
    pub fn settle(
        &self,
        preimage: &Preimage,
        claimed: u64,
        bound: Option<TransferId>,
    ) -> Result<Invoice, SettlementError> {
        let payment_hash = payment_hash_of(preimage);

        match self.invoices.entry(payment_hash) {
            Entry::Vacant(_) => {
                tracing::warn!(%payment_hash, "settlement for unknown invoice");
                Err(SettlementError::UnknownInvoice(payment_hash))
            }
            Entry::Occupied(entry) => {
                let issued_for = entry.get().transfer_id;
                if issued_for != bound {
                    tracing::warn!(
                        %payment_hash,
                        issued_for = ?issued_for,
                        claimed_for = ?bound,
                        "settlement does not match invoice binding"
                    );
                    return Err(SettlementError::InvoiceBinding {
                        payment_hash,
                        expected: issued_for,
                        actual: bound,
                    });
                }
                let expected = entry.get().amount;
                if expected != claimed {
                    tracing::warn!(
                        %payment_hash,
                        expected,
                        claimed,
                        "settlement amount does not match invoice"
                    );
                    return Err(SettlementError::AmountMismatch {
                        expected,
                        actual: claimed,
                    });
                }
                let invoice = entry.remove();
                tracing::info!(%payment_hash, amount = expected, "invoice settled");
                Ok(invoice)
            }
        }
    }

    pub fn get(&self, payment_hash: &PaymentHash) -> Option<Invoice> {
        self.invoices.get(payment_hash).map(|e| e.value().clone())
    }

    /// Drop invoices past their expiry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.invoices.len();
        self.invoices.retain(|_, invoice| invoice.expires_at > now);
        let purged = before.saturating_sub(self.invoices.len());
        if purged > 0 {
            tracing::debug!(purged, "expired invoices purged");
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.invoices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invoices.is_empty()
    }
}
