//! Node configuration loading and management.

use lnsettle_core::SettlementConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Full configuration for the settlement node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// The peer that opens the relationship and pays.
    #[serde(default = "default_alice")]
    pub alice: PeerConfig,

    /// The peer that receives.
    #[serde(default = "default_bob")]
    pub bob: PeerConfig,

    #[serde(default)]
    pub simulation: SimulationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    pub alias: String,
    /// Confirmed on-chain funds of the peer's Lightning node.
    #[serde(default = "default_wallet_balance")]
    pub wallet_balance: u64,
    pub settlement: SettlementConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Chain the in-process Lightning network runs on.
    #[serde(default = "default_chain")]
    pub chain: String,
    #[serde(default)]
    pub testnet: bool,
    /// Number of rounds to run; 0 runs until interrupted.
    #[serde(default = "default_rounds")]
    pub rounds: u32,
    /// Pause between rounds (milliseconds).
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Amount alice settles with bob each round.
    #[serde(default = "default_settle_amount")]
    pub settle_amount: u64,
    /// Amount of the transfer alice prepares to bob each round.
    #[serde(default = "default_transfer_amount")]
    pub transfer_amount: u64,
    /// Lifetime of simulated transfers (seconds).
    #[serde(default = "default_transfer_timeout_secs")]
    pub transfer_timeout_secs: u64,
    /// Interval of the purge task (seconds).
    #[serde(default = "default_housekeeping_secs")]
    pub housekeeping_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_alice() -> PeerConfig {
    PeerConfig {
        alias: "alice".into(),
        wallet_balance: default_wallet_balance(),
        settlement: SettlementConfig::with_host("127.0.0.1:9735"),
    }
}
fn default_bob() -> PeerConfig {
    PeerConfig {
        alias: "bob".into(),
        wallet_balance: default_wallet_balance(),
        settlement: SettlementConfig::with_host("127.0.0.1:9736"),
    }
}
fn default_wallet_balance() -> u64 {
    1_000_000
}
fn default_chain() -> String {
    "bitcoin".into()
}
fn default_rounds() -> u32 {
    5
}
fn default_interval_ms() -> u64 {
    500
}
fn default_settle_amount() -> u64 {
    1_000
}
fn default_transfer_amount() -> u64 {
    250
}
fn default_transfer_timeout_secs() -> u64 {
    30
}
fn default_housekeeping_secs() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            alice: default_alice(),
            bob: default_bob(),
            simulation: SimulationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            chain: default_chain(),
            testnet: false,
            rounds: default_rounds(),
            interval_ms: default_interval_ms(),
            settle_amount: default_settle_amount(),
            transfer_amount: default_transfer_amount(),
            transfer_timeout_secs: default_transfer_timeout_secs(),
            housekeeping_secs: default_housekeeping_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl NodeConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: NodeConfig = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save the current config to a TOML file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.alice.settlement.validate()?;
        self.bob.settlement.validate()?;
        if self.simulation.settle_amount == 0 || self.simulation.transfer_amount == 0 {
            anyhow::bail!("simulation amounts must be positive");
        }
        match self.logging.format.as_str() {
            "text" | "json" => Ok(()),
            other => anyhow::bail!("unknown log format {other:?}, expected text or json"),
        }
    }
}
