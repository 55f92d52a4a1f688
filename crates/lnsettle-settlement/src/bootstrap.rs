use futures::StreamExt;
use lnsettle_core::{ChannelHandle, NodePubKey};
use std::sync::{Mutex, MutexGuard};

use crate::error::{LightningError, SettlementError};
use crate::traits::ILightningNode;
use crate::types::{ChannelOpenStatus, ChannelSummary};

/// Whether a bootstrap attempt is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    Idle,
    InProgress,
}

/// Makes sure a funded channel to the peer exists, opening one if needed.
///
/// At most one attempt runs at a time; a concurrent call fails fast with
/// [`SettlementError::BootstrapInProgress`].
pub struct ChannelBootstrap {
    state: Mutex<BootstrapState>,
}

/// Resets the bootstrap to idle when the attempt ends, however it ends.
struct AttemptGuard<'a> {
    state: &'a Mutex<BootstrapState>,
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        *lock(self.state) = BootstrapState::Idle;
    }
}

fn lock(state: &Mutex<BootstrapState>) -> MutexGuard<'_, BootstrapState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ChannelBootstrap {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BootstrapState::Idle),
        }
    }

    pub fn state(&self) -> BootstrapState {
        *lock(&self.state)
    }

    fn begin(&self) -> Result<AttemptGuard<'_>, SettlementError> {
        let mut state = lock(&self.state);
        if *state == BootstrapState::InProgress {
            tracing::debug!("channel bootstrap already running");
            return Err(SettlementError::BootstrapInProgress);
        }
        *state = BootstrapState::InProgress;
        Ok(AttemptGuard { state: &self.state })
    }

    /// Return a channel to `peer` with local funds, opening one of
    /// `local_funding` if none exists.
    pub async fn ensure_channel(
        &self,
        lightning: &dyn ILightningNode,
        peer: &NodePubKey,
        local_funding: u64,
    ) -> Result<ChannelHandle, SettlementError> {
        let _attempt = self.begin()?;

        if let Some(existing) = Self::find_existing(lightning, peer).await? {
            tracing::info!(
                channel_id = %existing.channel_id,
                local_balance = existing.local_balance,
                "reusing existing channel"
            );
            return Ok(ChannelHandle {
                peer_pubkey: *peer,
                channel_id: existing.channel_id,
                local_funding: existing.local_balance,
            });
        }

        let wallet = lightning.wallet_balance().await?;
        if wallet.confirmed < local_funding {
            tracing::warn!(
                confirmed = wallet.confirmed,
                required = local_funding,
                "wallet cannot fund channel"
            );
            return Err(SettlementError::InsufficientFunds {
                available: wallet.confirmed,
                required: local_funding,
            });
        }

        tracing::info!(peer = %peer, local_funding, "opening channel");
        let mut updates = lightning.open_channel(peer, local_funding).await?;
        while let Some(update) = updates.next().await {
            match update? {
                ChannelOpenStatus::Pending { funding_txid } => {
                    tracing::debug!(%funding_txid, "channel funding pending");
                }
                ChannelOpenStatus::Open { channel_id } => {
                    tracing::info!(%channel_id, "channel open");
                    return Ok(ChannelHandle {
                        peer_pubkey: *peer,
                        channel_id,
                        local_funding,
                    });
                }
            }
        }

        Err(LightningError::ChannelOpen("status stream ended before the channel opened".into()).into())
    }

    /// An active channel to `peer` holding local funds, if any.
    pub async fn find_existing(
        lightning: &dyn ILightningNode,
        peer: &NodePubKey,
    ) -> Result<Option<ChannelSummary>, SettlementError> {
        let channels = lightning.list_channels().await?;
        Ok(channels
            .into_iter()
            .find(|c| c.remote_pubkey == *peer && c.active && c.local_balance > 0))
    }
}

impl Default for ChannelBootstrap {
    fn default() -> Self {
        Self::new()
    }
}
