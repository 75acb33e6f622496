//! Background sync: follow the node tip, apply blocks, submit payments.

use crate::engine::EngineCore;
use crate::events::WalletEvent;
use crate::node_client::{BlockUpdate, ChainSource, NodeConnector, OutgoingTx};
use crate::rpc::ConnectionConfig;
use crate::types::{unix_now, Height};
use crate::WalletError;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::sleep;

/// Control side of a spawned sync task.
pub(crate) struct SyncTask {
    stop: broadcast::Sender<()>,
    /// Disconnects when the task future is dropped.
    done: Receiver<()>,
}

impl SyncTask {
    pub(crate) fn new(stop: broadcast::Sender<()>, done: Receiver<()>) -> Self {
        Self { stop, done }
    }

    pub(crate) fn is_running(&self) -> bool {
        matches!(self.done.try_recv(), Err(TryRecvError::Empty))
    }

    pub(crate) fn stop_and_wait(self) {
        let _ = self.stop.send(());
        let _ = self.done.recv();
    }
}

pub(crate) async fn sync_loop(
    core: Arc<EngineCore>,
    connector: Arc<dyn NodeConnector>,
    connection: ConnectionConfig,
    mut stop: broadcast::Receiver<()>,
) {
    tracing::info!(node = %connection.address, "sync started");
    let mut source: Option<Box<dyn ChainSource>> = None;
    let mut announce = true;

    loop {
        if source.is_none() {
            let connected = tokio::select! {
                _ = stop.recv() => break,
                connected = connect_with_retry(connector.as_ref(), &connection) => connected,
            };
            match connected {
                Ok(chain) => {
                    tracing::debug!(node = %connection.address, "connected to node");
                    source = Some(chain);
                }
                Err(e) => {
                    tracing::error!(node = %connection.address, error = %e, "giving up on node");
                    break;
                }
            }
        }

        if let Some(chain) = source.as_mut() {
            let outcome = tokio::select! {
                _ = stop.recv() => break,
                outcome = sync_round(&core, chain.as_mut(), &mut announce) => outcome,
            };
            if let Err(e) = outcome {
                tracing::warn!(error = %e, "sync round failed, reconnecting");
                source = None;
            }
        }

        tokio::select! {
            _ = stop.recv() => break,
            _ = sleep(connection.poll_interval) => {}
        }
    }

    tracing::info!(node = %connection.address, "sync stopped");
}

async fn connect_with_retry(
    connector: &dyn NodeConnector,
    config: &ConnectionConfig,
) -> Result<Box<dyn ChainSource>, WalletError> {
    let policy = &config.reconnection_policy;
    let mut attempt = 0;
    loop {
        match connector.connect(config).await {
            Ok(chain) => return Ok(chain),
            Err(e) if attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(attempt, ?delay, error = %e, "node connection failed");
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Submits pending payments, then applies every block up to the node tip.
async fn sync_round(
    core: &EngineCore,
    chain: &mut dyn ChainSource,
    announce: &mut bool,
) -> Result<(), WalletError> {
    let (pending, claim) = core.claim_submissions();
    for tx in &pending {
        let accepted = chain.submit(tx).await?;
        record_submission(core, tx, accepted)?;
    }
    drop(claim);

    let tip = chain.tip().await?;
    let start = core.read().system_state.height;
    if tip.height < start {
        tracing::warn!(node_height = tip.height, local_height = start, "node is behind the wallet");
        return Ok(());
    }

    let total = tip.height - start;
    if total == 0 {
        if *announce {
            core.events.emit(WalletEvent::SyncProgress { done: 0, total: 0 });
            *announce = false;
        }
        return Ok(());
    }
    *announce = false;

    tracing::debug!(from = start, to = tip.height, "syncing blocks");
    for height in start + 1..=tip.height {
        let block = chain.block(height).await?;
        apply_block(core, &block, height - start, total)?;
    }
    tracing::info!(height = tip.height, "wallet caught up");
    Ok(())
}

fn record_submission(core: &EngineCore, tx: &OutgoingTx, accepted: bool) -> Result<(), WalletError> {
    let mut state = core.write();
    let mut updated = state.clone();
    let now = unix_now();
    let changed = if accepted {
        updated.mark_registered(&tx.tx_id, now)
    } else {
        updated.fail_payment(&tx.tx_id, now)
    };
    if !changed {
        return Ok(());
    }

    core.persist(&updated)?;
    *state = updated;
    core.events.emit(WalletEvent::TransactionChanged);
    if accepted {
        tracing::info!(tx_id = %hex::encode(tx.tx_id), "payment registered");
    } else {
        tracing::warn!(tx_id = %hex::encode(tx.tx_id), "node rejected payment");
        core.emit_utxo_events(&state);
    }
    Ok(())
}

fn apply_block(
    core: &EngineCore,
    block: &BlockUpdate,
    done: Height,
    total: Height,
) -> Result<(), WalletError> {
    let mut state = core.write();
    if block.height != state.system_state.height + 1 {
        return Err(WalletError::EngineFault(format!(
            "block {} does not follow local height {}",
            block.height, state.system_state.height
        )));
    }

    let mut updated = state.clone();
    let effects = updated.apply_block(block, unix_now());
    core.persist(&updated)?;
    *state = updated;

    core.events.emit(WalletEvent::SyncProgress { done, total });
    core.events.emit(WalletEvent::SystemStateChanged);
    if effects.utxos_changed {
        core.emit_utxo_events(&state);
    }
    if effects.transactions_changed {
        core.events.emit(WalletEvent::TransactionChanged);
    }
    Ok(())
}
