use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};

use lnsettle_core::SettlementConfig;

use crate::adapters::memory::MemoryLightningNode;
use crate::coordinator::SettlementCoordinator;
use crate::error::{SettlementError, TransportError};
use crate::protocol::{PeerMessage, PeerResponse};
use crate::traits::IPeerTransport;

/// In-process transport delivering requests straight to the peer's
/// coordinator.
///
/// Messages still go through their JSON wire form. The peer is attached
/// after both coordinators exist and is held weakly.
#[derive(Default)]
pub struct LoopbackTransport {
    peer: RwLock<Option<Weak<SettlementCoordinator>>>,
    offline: AtomicBool,
}

impl LoopbackTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Route requests to `peer`.
    pub fn attach(&self, peer: &Arc<SettlementCoordinator>) {
        *self
            .peer
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::downgrade(peer));
    }

    /// Simulate the peer being unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn peer(&self) -> Option<Arc<SettlementCoordinator>> {
        self.peer
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .and_then(Weak::upgrade)
    }
}

#[async_trait]
impl IPeerTransport for LoopbackTransport {
    async fn request(&self, message: PeerMessage) -> Result<PeerResponse, TransportError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Unreachable("peer is offline".into()));
        }
        let peer = self
            .peer()
            .ok_or_else(|| TransportError::Unreachable("no peer attached".into()))?;

        let frame = message.to_bytes()?;
        let reply = peer.handle_frame(&frame).await;
        PeerResponse::from_bytes(&reply)
    }
}

/// Two coordinators wired to each other over loopback transports, each
/// backed by a node on a shared memory network.
pub struct LoopbackPair {
    pub alice: Arc<SettlementCoordinator>,
    pub bob: Arc<SettlementCoordinator>,
    pub alice_node: Arc<MemoryLightningNode>,
    pub bob_node: Arc<MemoryLightningNode>,
    /// Carries alice's requests to bob.
    pub alice_transport: Arc<LoopbackTransport>,
    /// Carries bob's requests to alice.
    pub bob_transport: Arc<LoopbackTransport>,
}

impl LoopbackPair {
    pub fn new(
        alice_config: SettlementConfig,
        alice_node: Arc<MemoryLightningNode>,
        bob_config: SettlementConfig,
        bob_node: Arc<MemoryLightningNode>,
    ) -> Result<Self, SettlementError> {
        let alice_transport = LoopbackTransport::new();
        let bob_transport = LoopbackTransport::new();

        let alice = Arc::new(SettlementCoordinator::new(
            alice_config,
            alice_node.clone(),
            alice_transport.clone(),
        )?);
        let bob = Arc::new(SettlementCoordinator::new(
            bob_config,
            bob_node.clone(),
            bob_transport.clone(),
        )?);
        alice_transport.attach(&bob);
        bob_transport.attach(&alice);

        Ok(Self {
            alice,
            bob,
            alice_node,
            bob_node,
            alice_transport,
            bob_transport,
        })
    }

    /// Connect alice, then bob.
    pub async fn connect(&self) -> Result<(), SettlementError> {
        self.alice.connect().await?;
        self.bob.connect().await
    }
}
