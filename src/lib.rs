//! Session bridge between a wallet engine and a managed host runtime.
//!
//! Hosts never see engine memory. Every session is an opaque [`WalletHandle`]
//! resolved through the [`registry::HandleRegistry`]; queries return owned
//! snapshots and engine notifications reach the host through a
//! [`WalletListener`] driven by a per-session delivery thread.
//!
//! ```no_run
//! use wallet_bridge::{Api, BridgeConfig};
//!
//! let api = Api::new(BridgeConfig::default()).unwrap();
//! let handle = if api.is_initialized("/tmp/walletA") {
//!     api.open("/tmp/walletA", "pw1").unwrap()
//! } else {
//!     api.create("/tmp/walletA", "pw1", "seed words").unwrap()
//! };
//! let state = api.get_system_state(handle).unwrap();
//! println!("height {}", state.height);
//! api.close(handle).unwrap();
//! ```

pub mod api;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod events;
pub mod ffi;
pub mod input_selection;
pub mod logging;
pub mod mock_node;
pub mod node_client;
pub mod registry;
pub mod rpc;
pub mod runtime;
pub mod session;
pub mod sync;
pub mod types;
pub mod wallet_state;

pub use api::Api;
pub use config::{BridgeConfig, KdfParams, LogConfig, StoreConfig, SyncConfig};
pub use engine::{EngineProvider, FileEngineProvider, LocalWallet, WalletEngine};
pub use events::{EventDispatcher, WalletEvent, WalletListener};
pub use registry::{HandleRegistry, WalletHandle};
pub use session::WalletSession;
pub use types::{
    Amount, KeyType, SystemState, TxDescription, TxId, TxStatus, Utxo, UtxoStatus,
    WalletAddress, WalletId, WalletStatus,
};
pub use wallet_state::WalletState;

use thiserror::Error;

/// Every failure the bridge can report. Each engine failure maps to exactly
/// one variant and is returned to the immediate caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("invalid or closed wallet handle")]
    InvalidHandle,

    #[error("a wallet store already exists at this location")]
    AlreadyInitialized,

    #[error("no wallet store exists at this location")]
    NotInitialized,

    #[error("passphrase rejected")]
    AuthenticationFailed,

    #[error("malformed seed phrase")]
    InvalidSeed,

    #[error("storage write failed: {0}")]
    StorageWriteError(String),

    #[error("wallet store is corrupt: {0}")]
    StorageCorrupt(String),

    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Amount, available: Amount },

    #[error("invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("engine fault: {0}")]
    EngineFault(String),
}
