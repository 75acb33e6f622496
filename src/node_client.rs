//! Chain source seam used by the sync task, plus a TCP client speaking
//! newline-delimited JSON.

use crate::rpc::ConnectionConfig;
use crate::types::{hex32, hex32_vec, Amount, Height, KeyType, SystemState, TxId, WalletId};
use crate::WalletError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// An output the node reports as belonging to this wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingOutput {
    pub amount: Amount,
    pub key_type: KeyType,
    /// Absolute height at which the output may be spent.
    pub maturity: Height,
    #[serde(default, with = "crate::types::hex32_option")]
    pub tx_id: Option<TxId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockUpdate {
    pub height: Height,
    #[serde(with = "hex32")]
    pub hash: [u8; 32],
    #[serde(default)]
    pub outputs: Vec<IncomingOutput>,
    /// Outgoing transactions of this wallet included in the block.
    #[serde(default, with = "hex32_vec")]
    pub confirmed_txs: Vec<TxId>,
}

impl BlockUpdate {
    pub fn state(&self) -> SystemState {
        SystemState {
            height: self.height,
            hash: self.hash,
        }
    }
}

/// A pending transaction handed to the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingTx {
    #[serde(with = "hex32")]
    pub tx_id: TxId,
    #[serde(with = "hex32")]
    pub receiver: WalletId,
    pub amount: Amount,
    pub fee: Amount,
    pub inputs: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum NodeRequest {
    GetTip,
    GetBlock { height: Height },
    Submit { tx: OutgoingTx },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeResponse {
    Tip(SystemState),
    Block(BlockUpdate),
    Submitted(bool),
    Error(String),
}

/// Where the sync task reads the chain from.
#[async_trait]
pub trait ChainSource: Send {
    async fn tip(&mut self) -> Result<SystemState, WalletError>;

    async fn block(&mut self, height: Height) -> Result<BlockUpdate, WalletError>;

    /// Returns whether the node accepted the transaction.
    async fn submit(&mut self, tx: &OutgoingTx) -> Result<bool, WalletError>;
}

/// Opens a [`ChainSource`] for a node address.
#[async_trait]
pub trait NodeConnector: Send + Sync {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn ChainSource>, WalletError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

#[async_trait]
impl NodeConnector for TcpConnector {
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn ChainSource>, WalletError> {
        let client = TcpNodeClient::connect(config).await?;
        Ok(Box::new(client))
    }
}

pub struct TcpNodeClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    timeout: Duration,
}

impl TcpNodeClient {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, WalletError> {
        let target = config.address.to_string();
        let stream = timeout(config.timeout, TcpStream::connect(&target))
            .await
            .map_err(|_| WalletError::EngineFault(format!("timed out connecting to {}", target)))?
            .map_err(|e| WalletError::EngineFault(format!("cannot connect to {}: {}", target, e)))?;
        let _ = stream.set_nodelay(true);

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            timeout: config.timeout,
        })
    }

    async fn call(&mut self, request: &NodeRequest) -> Result<NodeResponse, WalletError> {
        let mut line = serde_json::to_string(request)
            .map_err(|e| WalletError::EngineFault(format!("cannot encode request: {}", e)))?;
        line.push('\n');

        timeout(self.timeout, self.writer.write_all(line.as_bytes()))
            .await
            .map_err(|_| WalletError::EngineFault("node write timed out".to_string()))?
            .map_err(|e| WalletError::EngineFault(format!("node write failed: {}", e)))?;

        let mut reply = String::new();
        let read = timeout(self.timeout, self.reader.read_line(&mut reply))
            .await
            .map_err(|_| WalletError::EngineFault("node read timed out".to_string()))?
            .map_err(|e| WalletError::EngineFault(format!("node read failed: {}", e)))?;
        if read == 0 {
            return Err(WalletError::EngineFault("node closed the connection".to_string()));
        }

        match serde_json::from_str(reply.trim_end()) {
            Ok(NodeResponse::Error(message)) => Err(WalletError::EngineFault(format!(
                "node error: {}",
                message
            ))),
            Ok(response) => Ok(response),
            Err(e) => Err(WalletError::EngineFault(format!("bad node response: {}", e))),
        }
    }
}

fn unexpected(response: NodeResponse) -> WalletError {
    WalletError::EngineFault(format!("unexpected node response: {:?}", response))
}

#[async_trait]
impl ChainSource for TcpNodeClient {
    async fn tip(&mut self) -> Result<SystemState, WalletError> {
        match self.call(&NodeRequest::GetTip).await? {
            NodeResponse::Tip(state) => Ok(state),
            other => Err(unexpected(other)),
        }
    }

    async fn block(&mut self, height: Height) -> Result<BlockUpdate, WalletError> {
        match self.call(&NodeRequest::GetBlock { height }).await? {
            NodeResponse::Block(block) if block.height == height => Ok(block),
            other => Err(unexpected(other)),
        }
    }

    async fn submit(&mut self, tx: &OutgoingTx) -> Result<bool, WalletError> {
        match self.call(&NodeRequest::Submit { tx: tx.clone() }).await? {
            NodeResponse::Submitted(accepted) => Ok(accepted),
            other => Err(unexpected(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let json = serde_json::to_string(&NodeRequest::GetBlock { height: 7 }).unwrap();
        assert_eq!(json, r#"{"method":"get_block","height":7}"#);
        assert_eq!(
            serde_json::to_string(&NodeRequest::GetTip).unwrap(),
            r#"{"method":"get_tip"}"#
        );
    }

    #[test]
    fn test_response_wire_shape() {
        let hash = hex::encode([7u8; 32]);
        let text = format!(r#"{{"block":{{"height":3,"hash":"{}"}}}}"#, hash);
        match serde_json::from_str::<NodeResponse>(&text).unwrap() {
            NodeResponse::Block(block) => {
                assert_eq!(block.height, 3);
                assert_eq!(block.hash, [7u8; 32]);
                assert!(block.outputs.is_empty());
                assert!(block.confirmed_txs.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
