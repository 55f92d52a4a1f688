use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use lnsettle_core::{LightningAddress, NodePubKey, PaymentHash, Preimage};
use lnsettle_crypto::{payment_hash_of, random_preimage, PaymentRequest};
use rand::RngCore;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::error::LightningError;
use crate::traits::{ChannelOpenStream, ILightningNode};
use crate::types::{
    AddedInvoice, ChannelOpenStatus, ChannelSummary, NodeInfo, PeerSummary, WalletBalance,
};

#[derive(Debug, Clone)]
struct MemoryInvoice {
    preimage: Preimage,
    amount: u64,
    destination: NodePubKey,
    paid: bool,
}

#[derive(Debug, Clone)]
struct MemoryChannel {
    opener: NodePubKey,
    acceptor: NodePubKey,
    opener_balance: u64,
    acceptor_balance: u64,
}

impl MemoryChannel {
    fn connects(&self, a: &NodePubKey, b: &NodePubKey) -> bool {
        (self.opener == *a && self.acceptor == *b) || (self.opener == *b && self.acceptor == *a)
    }

    fn involves(&self, node: &NodePubKey) -> bool {
        self.opener == *node || self.acceptor == *node
    }

    fn balance_of(&self, node: &NodePubKey) -> u64 {
        if self.opener == *node {
            self.opener_balance
        } else if self.acceptor == *node {
            self.acceptor_balance
        } else {
            0
        }
    }

    fn shift(&mut self, from: &NodePubKey, amount: u64) {
        if self.opener == *from {
            self.opener_balance -= amount;
            self.acceptor_balance += amount;
        } else {
            self.acceptor_balance -= amount;
            self.opener_balance += amount;
        }
    }

    fn summary_for(&self, channel_id: &str, node: &NodePubKey) -> ChannelSummary {
        let remote = if self.opener == *node {
            self.acceptor
        } else {
            self.opener
        };
        ChannelSummary {
            channel_id: channel_id.to_string(),
            remote_pubkey: remote,
            capacity: self.opener_balance + self.acceptor_balance,
            local_balance: self.balance_of(node),
            remote_balance: self.balance_of(&remote),
            active: true,
        }
    }
}

/// An in-process Lightning network.
///
/// Holds every invoice and channel shared by the [`MemoryLightningNode`]s
/// created from it. Payments route only over a direct channel. Useful for
/// tests and for local simulations that need no external daemon.
pub struct MemoryLightningNetwork {
    chain: String,
    testnet: bool,
    nodes: DashMap<NodePubKey, String>,
    invoices: DashMap<PaymentHash, MemoryInvoice>,
    channels: DashMap<String, MemoryChannel>,
    next_channel: AtomicU64,
}

impl MemoryLightningNetwork {
    /// A bitcoin mainnet network.
    pub fn new() -> Arc<Self> {
        Self::with_chain("bitcoin", false)
    }

    pub fn with_chain(chain: impl Into<String>, testnet: bool) -> Arc<Self> {
        Arc::new(Self {
            chain: chain.into(),
            testnet,
            nodes: DashMap::new(),
            invoices: DashMap::new(),
            channels: DashMap::new(),
            next_channel: AtomicU64::new(1),
        })
    }

    /// Add a node with `wallet` confirmed on-chain funds.
    pub fn add_node(self: &Arc<Self>, alias: &str, wallet: u64) -> Arc<MemoryLightningNode> {
        let mut key = [0u8; 33];
        rand::thread_rng().fill_bytes(&mut key[1..]);
        key[0] = 0x02;
        let pubkey = NodePubKey(key);

        self.nodes.insert(pubkey, alias.to_string());
        tracing::debug!(alias, %pubkey, "memory lightning node added");
        Arc::new(MemoryLightningNode {
            network: Arc::clone(self),
            pubkey,
            alias: alias.to_string(),
            wallet: AtomicU64::new(wallet),
            peers: DashMap::new(),
            payment_attempts: AtomicUsize::new(0),
            fail_payments: AtomicBool::new(false),
        })
    }

    /// The preimage behind an invoice, as only its issuer would know it.
    pub fn preimage_for(&self, payment_hash: &PaymentHash) -> Option<Preimage> {
        self.invoices.get(payment_hash).map(|i| i.preimage)
    }

    pub fn is_paid(&self, payment_hash: &PaymentHash) -> bool {
        self.invoices.get(payment_hash).is_some_and(|i| i.paid)
    }

    /// Move `amount` over a direct channel from `from` to `to`.
    fn route(&self, from: &NodePubKey, to: &NodePubKey, amount: u64) -> Result<(), LightningError> {
        let channel_id = self
            .channels
            .iter()
            .find(|c| c.connects(from, to) && c.balance_of(from) >= amount)
            .map(|c| c.key().clone())
            .ok_or_else(|| {
                LightningError::PaymentFailed(format!("no route to {to} with {amount} capacity"))
            })?;

        let mut channel = self
            .channels
            .get_mut(&channel_id)
            .ok_or_else(|| LightningError::PaymentFailed(format!("channel {channel_id} closed")))?;
        if channel.balance_of(from) < amount {
            return Err(LightningError::PaymentFailed(format!(
                "channel {channel_id} lacks capacity"
            )));
        }
        channel.shift(from, amount);
        Ok(())
    }
}

/// A node on a [`MemoryLightningNetwork`].
pub struct MemoryLightningNode {
    network: Arc<MemoryLightningNetwork>,
    pubkey: NodePubKey,
    alias: String,
    wallet: AtomicU64,
    peers: DashMap<NodePubKey, String>,
    payment_attempts: AtomicUsize,
    fail_payments: AtomicBool,
}

impl MemoryLightningNode {
    pub fn pubkey(&self) -> NodePubKey {
        self.pubkey
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// How many times `send_payment` was called.
    pub fn payment_attempts(&self) -> usize {
        self.payment_attempts.load(Ordering::SeqCst)
    }

    /// Make every subsequent payment fail.
    pub fn set_fail_payments(&self, fail: bool) {
        self.fail_payments.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ILightningNode for MemoryLightningNode {
    async fn get_info(&self) -> Result<NodeInfo, LightningError> {
        Ok(NodeInfo {
            identity_pubkey: self.pubkey,
            alias: self.alias.clone(),
            chains: vec![self.network.chain.clone()],
            testnet: self.network.testnet,
        })
    }

    async fn add_invoice(
        &self,
        amount: u64,
        _expiry_secs: u64,
    ) -> Result<AddedInvoice, LightningError> {
        let preimage = random_preimage();
        let payment_hash = payment_hash_of(&preimage);
        let payment_request = PaymentRequest {
            destination: self.pubkey,
            payment_hash,
            amount,
        }
        .encode();

        self.network.invoices.insert(
            payment_hash,
            MemoryInvoice {
                preimage,
                amount,
                destination: self.pubkey,
                paid: false,
            },
        );
        Ok(AddedInvoice {
            payment_request,
            payment_hash,
        })
    }

    async fn send_payment(&self, payment_request: &str) -> Result<Preimage, LightningError> {
        self.payment_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_payments.load(Ordering::SeqCst) {
            return Err(LightningError::PaymentFailed("payment failure injected".into()));
        }

        let request = PaymentRequest::decode(payment_request)
            .map_err(|e| LightningError::PaymentFailed(e.to_string()))?;
        let mut invoice = self
            .network
            .invoices
            .get_mut(&request.payment_hash)
            .ok_or(LightningError::InvoiceNotFound(request.payment_hash))?;
        if invoice.paid {
            return Err(LightningError::PaymentFailed("invoice already paid".into()));
        }
        if invoice.destination == self.pubkey {
            return Err(LightningError::PaymentFailed("cannot pay own invoice".into()));
        }

        self.network
            .route(&self.pubkey, &invoice.destination, invoice.amount)?;
        invoice.paid = true;
        tracing::debug!(
            payment_hash = %request.payment_hash,
            amount = invoice.amount,
            "memory payment settled"
        );
        Ok(invoice.preimage)
    }

    async fn list_channels(&self) -> Result<Vec<ChannelSummary>, LightningError> {
        Ok(self
            .network
            .channels
            .iter()
            .filter(|c| c.involves(&self.pubkey))
            .map(|c| c.summary_for(c.key(), &self.pubkey))
            .collect())
    }

    async fn list_peers(&self) -> Result<Vec<PeerSummary>, LightningError> {
        Ok(self
            .peers
            .iter()
            .map(|p| PeerSummary {
                pubkey: *p.key(),
                address: p.value().clone(),
            })
            .collect())
    }

    async fn connect_peer(&self, address: &LightningAddress) -> Result<(), LightningError> {
        if address.pubkey == self.pubkey {
            return Err(LightningError::PeerConnection("cannot connect to self".into()));
        }
        if !self.network.nodes.contains_key(&address.pubkey) {
            return Err(LightningError::PeerConnection(format!(
                "unknown node {}",
                address.pubkey
            )));
        }
        self.peers.insert(address.pubkey, address.host.clone());
        Ok(())
    }

    async fn open_channel(
        &self,
        peer: &NodePubKey,
        local_funding: u64,
    ) -> Result<ChannelOpenStream, LightningError> {
        if !self.network.nodes.contains_key(peer) {
            return Err(LightningError::ChannelOpen(format!("unknown node {peer}")));
        }
        self.wallet
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |w| {
                w.checked_sub(local_funding)
            })
            .map_err(|available| {
                LightningError::ChannelOpen(format!(
                    "wallet holds {available}, channel needs {local_funding}"
                ))
            })?;

        let number = self.network.next_channel.fetch_add(1, Ordering::SeqCst);
        let channel_id = format!("{number}x1x0");
        self.network.channels.insert(
            channel_id.clone(),
            MemoryChannel {
                opener: self.pubkey,
                acceptor: *peer,
                opener_balance: local_funding,
                acceptor_balance: 0,
            },
        );

        let mut txid = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut txid);
        let updates = vec![
            Ok(ChannelOpenStatus::Pending {
                funding_txid: hex::encode(txid),
            }),
            Ok(ChannelOpenStatus::Open { channel_id }),
        ];
        Ok(futures::stream::iter(updates).boxed())
    }

    async fn channel_balance(&self) -> Result<u64, LightningError> {
        Ok(self
            .network
            .channels
            .iter()
            .map(|c| c.balance_of(&self.pubkey))
            .sum())
    }

    async fn wallet_balance(&self) -> Result<WalletBalance, LightningError> {
        Ok(WalletBalance {
            confirmed: self.wallet.load(Ordering::SeqCst),
            unconfirmed: 0,
        })
    }
}
