//! The simulation node.
//!
//! Runs two settlement peers over an in-process Lightning network and drives
//! settlement and transfer rounds between them.

use anyhow::Result;
use chrono::Utc;
use std::time::Duration;
use tokio::task::JoinHandle;

use lnsettle_core::{TransferId, TransferPrepare};
use lnsettle_crypto::{condition_of, random_fulfillment};
use lnsettle_settlement::adapters::{LoopbackPair, MemoryLightningNetwork};
use lnsettle_settlement::{LedgerEvent, SettlementCoordinator};

use crate::config::NodeConfig;

pub struct SimulationNode {
    config: NodeConfig,
    pair: LoopbackPair,
    tasks: Vec<JoinHandle<()>>,
}

impl SimulationNode {
    pub fn new(config: NodeConfig) -> Result<Self> {
        config.validate()?;
        let sim = &config.simulation;
        let network = MemoryLightningNetwork::with_chain(sim.chain.clone(), sim.testnet);
        let alice_node = network.add_node(&config.alice.alias, config.alice.wallet_balance);
        let bob_node = network.add_node(&config.bob.alias, config.bob.wallet_balance);

        let pair = LoopbackPair::new(
            config.alice.settlement.clone(),
            alice_node,
            config.bob.settlement.clone(),
            bob_node,
        )?;
        Ok(Self {
            config,
            pair,
            tasks: Vec::new(),
        })
    }

    /// Connect both peers and start background tasks.
    pub async fn start(&mut self) -> Result<()> {
        self.pair.connect().await?;

        let every = Duration::from_secs(self.config.simulation.housekeeping_secs.max(1));
        self.tasks.push(self.pair.alice.spawn_housekeeping(every));
        self.tasks.push(self.pair.bob.spawn_housekeeping(every));
        self.tasks
            .push(log_ledger_events(&self.config.alice.alias, &self.pair.alice));
        self.tasks
            .push(log_ledger_events(&self.config.bob.alias, &self.pair.bob));

        let info = self.pair.alice.get_info()?;
        tracing::info!(
            prefix = %info.prefix,
            currency = %info.currency_code,
            alice = %self.pair.alice.account()?,
            bob = %self.pair.bob.account()?,
            "peers ready"
        );
        Ok(())
    }

    /// Run the configured number of rounds.
    pub async fn run(&self) -> Result<()> {
        let sim = &self.config.simulation;
        let mut interval = tokio::time::interval(Duration::from_millis(sim.interval_ms.max(1)));
        let mut round = 0u32;

        while sim.rounds == 0 || round < sim.rounds {
            interval.tick().await;
            round += 1;
            if let Err(e) = self.run_round(round).await {
                tracing::warn!(round, error = %e, "round failed");
            }
        }
        Ok(())
    }

    async fn run_round(&self, round: u32) -> Result<()> {
        let sim = &self.config.simulation;
        let alice = &self.pair.alice;
        let bob = &self.pair.bob;

        let receipt = alice.send_money(sim.settle_amount).await?;
        tracing::info!(
            round,
            amount = receipt.amount,
            payment_hash = %receipt.payment_hash,
            "alice settled with bob"
        );

        let fulfillment = random_fulfillment();
        let prepare = TransferPrepare {
            id: TransferId::new(),
            amount: sim.transfer_amount,
            execution_condition: condition_of(&fulfillment),
            expires_at: Utc::now() + chrono::Duration::seconds(sim.transfer_timeout_secs as i64),
            data: Vec::new(),
        };
        let id = prepare.id;
        alice.send_transfer(prepare).await?;

        // Every third transfer is refused by the receiver.
        if round % 3 == 0 {
            bob.reject_incoming_transfer(id, "simulated rejection").await?;
        } else {
            bob.fulfill_condition(id, fulfillment).await?;
        }

        tracing::info!(
            round,
            alice_balance = alice.get_balance().await?,
            bob_balance = bob.get_balance().await?,
            alice_credit = alice.channel_credit(),
            bob_credit = bob.channel_credit(),
            "round complete"
        );
        Ok(())
    }

    /// Disconnect both peers and stop background tasks.
    pub async fn shutdown(&mut self) -> Result<()> {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.pair.alice.disconnect()?;
        self.pair.bob.disconnect()?;
        tracing::info!(
            alice_in_flight = ?self.pair.alice.ledger().balance(),
            bob_in_flight = ?self.pair.bob.ledger().balance(),
            "peers disconnected"
        );
        Ok(())
    }
}

fn log_ledger_events(alias: &str, coordinator: &SettlementCoordinator) -> JoinHandle<()> {
    let alias = alias.to_string();
    let mut events = coordinator.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(LedgerEvent::Prepared(t)) => {
                    tracing::debug!(peer = %alias, transfer_id = %t.id, direction = %t.direction, "ledger: prepared");
                }
                Ok(LedgerEvent::Fulfilled(t)) => {
                    tracing::debug!(peer = %alias, transfer_id = %t.id, "ledger: fulfilled");
                }
                Ok(LedgerEvent::Cancelled { transfer, reason }) => {
                    tracing::debug!(peer = %alias, transfer_id = %transfer.id, ?reason, "ledger: cancelled");
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(peer = %alias, skipped, "ledger event log lagging");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
