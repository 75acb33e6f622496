//! Scripted in-memory node for deterministic testing.
//!
//! A [`MockChain`] is shared between the test and the sync task: the test
//! appends blocks while the wallet is running and inspects what the wallet
//! submitted.

use crate::node_client::{BlockUpdate, ChainSource, IncomingOutput, NodeConnector, OutgoingTx};
use crate::rpc::ConnectionConfig;
use crate::types::{Height, SystemState, TxId};
use crate::WalletError;
use async_trait::async_trait;
use sha3::{Digest, Keccak256};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct ChainData {
    blocks: Vec<BlockUpdate>,
    submitted: Vec<OutgoingTx>,
    reject_submissions: bool,
    hold_submissions: bool,
    /// Submissions parked while `hold_submissions` is set.
    held: Vec<TxId>,
}

#[derive(Debug, Clone, Default)]
pub struct MockChain {
    data: Arc<Mutex<ChainData>>,
}

/// Deterministic block hash for mock heights.
pub fn mock_hash(height: Height) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(b"mock-block");
    hasher.update(height.to_le_bytes());
    hasher.finalize().into()
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// A chain with `count` empty blocks at heights `1..=count`.
    pub fn with_empty_blocks(count: u64) -> Self {
        let chain = Self::new();
        chain.push_empty_blocks(count);
        chain
    }

    fn data(&self) -> MutexGuard<'_, ChainData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn height(&self) -> Height {
        self.data().blocks.last().map(|b| b.height).unwrap_or(0)
    }

    fn next_block(&self, data: &ChainData) -> BlockUpdate {
        let height = data.blocks.last().map(|b| b.height).unwrap_or(0) + 1;
        BlockUpdate {
            height,
            hash: mock_hash(height),
            outputs: Vec::new(),
            confirmed_txs: Vec::new(),
        }
    }

    pub fn push_empty_blocks(&self, count: u64) {
        let mut data = self.data();
        for _ in 0..count {
            let block = self.next_block(&data);
            data.blocks.push(block);
        }
    }

    /// Appends a block paying `outputs` to the wallet. Returns its height.
    pub fn push_block_with_outputs(&self, outputs: Vec<IncomingOutput>) -> Height {
        let mut data = self.data();
        let mut block = self.next_block(&data);
        block.outputs = outputs;
        let height = block.height;
        data.blocks.push(block);
        height
    }

    /// Appends a block that includes the given wallet transactions.
    pub fn push_block_confirming(&self, tx_ids: Vec<TxId>) -> Height {
        let mut data = self.data();
        let mut block = self.next_block(&data);
        block.confirmed_txs = tx_ids;
        let height = block.height;
        data.blocks.push(block);
        height
    }

    pub fn submitted(&self) -> Vec<OutgoingTx> {
        self.data().submitted.clone()
    }

    pub fn set_reject_submissions(&self, reject: bool) {
        self.data().reject_submissions = reject;
    }

    /// While set, `submit` waits before answering.
    pub fn hold_submissions(&self, hold: bool) {
        self.data().hold_submissions = hold;
    }

    /// Transactions whose submission is currently waiting on the hold.
    pub fn held_submissions(&self) -> Vec<TxId> {
        self.data().held.clone()
    }
}

#[async_trait]
impl ChainSource for MockChain {
    async fn tip(&mut self) -> Result<SystemState, WalletError> {
        let data = self.data();
        Ok(data
            .blocks
            .last()
            .map(BlockUpdate::state)
            .unwrap_or_else(SystemState::genesis))
    }

    async fn block(&mut self, height: Height) -> Result<BlockUpdate, WalletError> {
        let data = self.data();
        data.blocks
            .iter()
            .find(|b| b.height == height)
            .cloned()
            .ok_or_else(|| WalletError::EngineFault(format!("no block at height {}", height)))
    }

    async fn submit(&mut self, tx: &OutgoingTx) -> Result<bool, WalletError> {
        let mut parked = false;
        loop {
            {
                let mut data = self.data();
                if !data.hold_submissions {
                    data.held.retain(|id| *id != tx.tx_id);
                    if data.reject_submissions {
                        return Ok(false);
                    }
                    data.submitted.push(tx.clone());
                    return Ok(true);
                }
                if !parked {
                    data.held.push(tx.tx_id);
                    parked = true;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

/// Connector handing out clones of one [`MockChain`] for every address.
#[derive(Debug, Clone)]
pub struct MockConnector {
    chain: MockChain,
    connections: Arc<Mutex<Vec<String>>>,
}

impl MockConnector {
    pub fn new(chain: MockChain) -> Self {
        Self {
            chain,
            connections: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Addresses the sync task connected to, in order.
    pub fn connections(&self) -> Vec<String> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl NodeConnector for MockConnector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn ChainSource>, WalletError> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(config.address.to_string());
        Ok(Box::new(self.chain.clone()))
    }
}
