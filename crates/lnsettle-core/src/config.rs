use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::CoreError;

/// Settlement parameters for one peer relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Host (and optional port) under which the local Lightning node is
    /// reachable by the peer. Combined with the node pubkey into the
    /// `<pubkey>@<host>` address announced during the handshake.
    #[serde(default)]
    pub external_host: String,
    /// Unsecured credit ceiling for incoming in-flight transfers.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: u64,
    /// Amount committed when opening a channel to the peer.
    #[serde(default = "default_channel_local_funding")]
    pub channel_local_funding: u64,
    /// Whether to open a channel to the peer when none exists.
    #[serde(default = "default_true")]
    pub setup_channel: bool,
    /// Accepted relative deviation between requested and invoiced amounts.
    #[serde(default = "default_invoice_tolerance")]
    pub invoice_tolerance: f64,
    /// Lifetime of issued invoices (seconds).
    #[serde(default = "default_invoice_ttl_secs")]
    pub invoice_ttl_secs: u64,
    /// How long terminal transfers are kept for replay protection (seconds).
    #[serde(default = "default_transfer_retention_secs")]
    pub transfer_retention_secs: u64,
    /// Chain name override; the node's first chain is used otherwise.
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default = "default_currency_scale")]
    pub currency_scale: u32,
}

fn default_max_in_flight() -> u64 {
    10_000
}
fn default_channel_local_funding() -> u64 {
    100_000
}
fn default_true() -> bool {
    true
}
fn default_invoice_tolerance() -> f64 {
    0.05
}
fn default_invoice_ttl_secs() -> u64 {
    3600
}
fn default_transfer_retention_secs() -> u64 {
    600
}
fn default_currency_scale() -> u32 {
    8
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            external_host: String::new(),
            max_in_flight: default_max_in_flight(),
            channel_local_funding: default_channel_local_funding(),
            setup_channel: default_true(),
            invoice_tolerance: default_invoice_tolerance(),
            invoice_ttl_secs: default_invoice_ttl_secs(),
            transfer_retention_secs: default_transfer_retention_secs(),
            network: None,
            currency_scale: default_currency_scale(),
        }
    }
}

impl SettlementConfig {
    /// Defaults with the given external host.
    pub fn with_host(external_host: impl Into<String>) -> Self {
        Self {
            external_host: external_host.into(),
            ..Self::default()
        }
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.external_host.trim().is_empty() {
            return Err(CoreError::MissingField("external_host".into()));
        }
        if self.max_in_flight == 0 {
            return Err(CoreError::InvalidConfig("max_in_flight must be positive".into()));
        }
        if self.setup_channel && self.channel_local_funding == 0 {
            return Err(CoreError::InvalidConfig(
                "channel_local_funding must be positive when setup_channel is set".into(),
            ));
        }
        if !(0.0..1.0).contains(&self.invoice_tolerance) {
            return Err(CoreError::InvalidConfig(format!(
                "invoice_tolerance must be in [0, 1), got {}",
                self.invoice_tolerance
            )));
        }
        if self.invoice_ttl_secs == 0 {
            return Err(CoreError::InvalidConfig("invoice_ttl_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn invoice_ttl(&self) -> Duration {
        Duration::from_secs(self.invoice_ttl_secs)
    }

    pub fn transfer_retention(&self) -> Duration {
        Duration::from_secs(self.transfer_retention_secs)
    }
}
