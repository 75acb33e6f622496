//! Session factory and the handle-keyed bridge surface.

use crate::config::{BridgeConfig, SyncConfig};
use crate::engine::{EngineProvider, FileEngineProvider, WalletEngine};
use crate::events::{EventDispatcher, WalletListener};
use crate::registry::{HandleRegistry, WalletHandle};
use crate::rpc::{ConnectionConfig, NodeAddress};
use crate::runtime;
use crate::session::WalletSession;
use crate::types::{
    parse_id, Amount, SystemState, TxDescription, TxId, Utxo, WalletAddress, WalletId,
    WalletStatus,
};
use crate::WalletError;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything a live handle owns.
struct SessionEntry {
    storage: PathBuf,
    engine: Box<dyn WalletEngine>,
    dispatcher: EventDispatcher,
}

impl SessionEntry {
    /// Stops sync, then delivery. The engine itself goes with the last `Arc`.
    fn shutdown(&self) {
        self.engine.stop();
        self.dispatcher.shutdown();
    }
}

pub struct Api {
    provider: Box<dyn EngineProvider>,
    sessions: HandleRegistry<SessionEntry>,
    sync: SyncConfig,
}

impl Api {
    /// Bridge over file-backed wallets. Starts the process runtime if needed.
    pub fn new(config: BridgeConfig) -> Result<Self, WalletError> {
        let provider = FileEngineProvider::new(config.store);
        Ok(Self::with_provider(Box::new(provider))?.with_sync_config(config.sync))
    }

    pub fn with_provider(provider: Box<dyn EngineProvider>) -> Result<Self, WalletError> {
        runtime::initialize()?;
        Ok(Self {
            provider,
            sessions: HandleRegistry::new(),
            sync: SyncConfig::default(),
        })
    }

    pub fn with_sync_config(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    /// Number of open sessions.
    pub fn open_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_initialized(&self, storage: impl AsRef<Path>) -> bool {
        self.provider.is_initialized(storage.as_ref())
    }

    pub fn create(
        &self,
        storage: impl AsRef<Path>,
        passphrase: &str,
        seed_phrase: &str,
    ) -> Result<WalletHandle, WalletError> {
        let storage = storage.as_ref();
        let dispatcher = start_dispatcher(storage)?;
        let engine = self
            .provider
            .create(storage, passphrase, seed_phrase, dispatcher.sink())
            .map_err(|e| {
                tracing::error!(storage = %storage.display(), error = %e, "wallet create failed");
                e
            })?;

        let handle = self.register(storage, engine, dispatcher);
        tracing::info!(%handle, storage = %storage.display(), "wallet created");
        Ok(handle)
    }

    pub fn open(&self, storage: impl AsRef<Path>, passphrase: &str) -> Result<WalletHandle, WalletError> {
        let storage = storage.as_ref();
        let dispatcher = start_dispatcher(storage)?;
        let engine = self
            .provider
            .open(storage, passphrase, dispatcher.sink())
            .map_err(|e| {
                tracing::error!(storage = %storage.display(), error = %e, "wallet open failed");
                e
            })?;

        let handle = self.register(storage, engine, dispatcher);
        tracing::info!(%handle, storage = %storage.display(), "wallet opened");
        Ok(handle)
    }

    fn register(
        &self,
        storage: &Path,
        engine: Box<dyn WalletEngine>,
        dispatcher: EventDispatcher,
    ) -> WalletHandle {
        self.sessions.register(SessionEntry {
            storage: storage.to_path_buf(),
            engine,
            dispatcher,
        })
    }

    /// Ends the session. The handle is invalid from the moment this starts.
    pub fn close(&self, handle: WalletHandle) -> Result<(), WalletError> {
        let entry = self.sessions.release(handle)?;
        entry.shutdown();
        tracing::info!(%handle, storage = %entry.storage.display(), "wallet closed");
        Ok(())
    }

    pub fn session(&self, handle: WalletHandle) -> Result<WalletSession<'_>, WalletError> {
        self.sessions.resolve(handle)?;
        Ok(WalletSession::new(self, handle))
    }

    fn entry(&self, handle: WalletHandle) -> Result<Arc<SessionEntry>, WalletError> {
        self.sessions.resolve(handle)
    }

    pub fn get_system_state(&self, handle: WalletHandle) -> Result<SystemState, WalletError> {
        let state = self.entry(handle)?.engine.system_state()?;
        tracing::debug!(%handle, height = state.height, "system state");
        Ok(state)
    }

    pub fn get_utxos(&self, handle: WalletHandle) -> Result<Vec<Utxo>, WalletError> {
        let utxos = self.entry(handle)?.engine.utxos()?;
        tracing::debug!(%handle, count = utxos.len(), "utxos");
        Ok(utxos)
    }

    pub fn get_tx_history(&self, handle: WalletHandle) -> Result<Vec<TxDescription>, WalletError> {
        let history = self.entry(handle)?.engine.tx_history()?;
        tracing::debug!(%handle, count = history.len(), "tx history");
        Ok(history)
    }

    pub fn get_available_balance(&self, handle: WalletHandle) -> Result<Amount, WalletError> {
        self.entry(handle)?.engine.available_balance()
    }

    pub fn get_wallet_status(&self, handle: WalletHandle) -> Result<WalletStatus, WalletError> {
        self.entry(handle)?.engine.wallet_status()
    }

    pub fn get_wallet_id(&self, handle: WalletHandle) -> Result<WalletId, WalletError> {
        self.entry(handle)?.engine.wallet_id()
    }

    pub fn get_addresses(&self, handle: WalletHandle) -> Result<Vec<WalletAddress>, WalletError> {
        self.entry(handle)?.engine.addresses()
    }

    pub fn change_passphrase(&self, handle: WalletHandle, new_passphrase: &str) -> Result<(), WalletError> {
        self.entry(handle)?
            .engine
            .change_passphrase(new_passphrase)
            .map_err(|e| {
                tracing::error!(%handle, error = %e, "passphrase change failed");
                e
            })?;
        tracing::info!(%handle, "passphrase changed");
        Ok(())
    }

    pub fn verify_passphrase(&self, handle: WalletHandle, candidate: &str) -> Result<(), WalletError> {
        self.entry(handle)?.engine.verify_passphrase(candidate)
    }

    /// Attaches `listener` and starts background sync against `node_address`
    /// (`"<host>:<port>"`). Returns without waiting for any network activity.
    /// While a sync is already running only the listener is replaced.
    pub fn run(
        &self,
        handle: WalletHandle,
        node_address: &str,
        listener: Option<Arc<dyn WalletListener>>,
    ) -> Result<(), WalletError> {
        let entry = self.entry(handle)?;
        let address = NodeAddress::parse(node_address)?;

        entry.dispatcher.set_listener(listener);
        let connection = ConnectionConfig::from_sync_config(address, &self.sync);
        if entry.engine.start_sync(connection)? {
            tracing::info!(%handle, node = node_address, "sync requested");
        } else {
            tracing::debug!(%handle, "sync already running, listener replaced");
        }
        Ok(())
    }

    /// Attaches or detaches the listener without touching sync.
    pub fn set_listener(
        &self,
        handle: WalletHandle,
        listener: Option<Arc<dyn WalletListener>>,
    ) -> Result<(), WalletError> {
        self.entry(handle)?.dispatcher.set_listener(listener);
        Ok(())
    }

    pub fn is_syncing(&self, handle: WalletHandle) -> Result<bool, WalletError> {
        Ok(self.entry(handle)?.engine.is_syncing())
    }

    /// Records a payment of `amount` plus `fee` to the hex-encoded
    /// `receiver`. The node sees it on the next sync round.
    pub fn send_payment(
        &self,
        handle: WalletHandle,
        receiver: &str,
        amount: Amount,
        fee: Amount,
    ) -> Result<TxId, WalletError> {
        let entry = self.entry(handle)?;
        let receiver = parse_id(receiver).map_err(WalletError::InvalidRecipient)?;
        entry.engine.send_payment(receiver, amount, fee).map_err(|e| {
            tracing::error!(%handle, amount, fee, error = %e, "payment failed");
            e
        })
    }

    pub fn cancel_tx(&self, handle: WalletHandle, tx_id: &TxId) -> Result<(), WalletError> {
        self.entry(handle)?.engine.cancel_tx(tx_id)
    }

    pub fn generate_wallet_id(&self, handle: WalletHandle) -> Result<WalletId, WalletError> {
        let id = self.entry(handle)?.engine.generate_wallet_id()?;
        tracing::info!(%handle, wallet_id = %hex::encode(id), "address generated");
        Ok(id)
    }
}

impl Drop for Api {
    fn drop(&mut self) {
        for (handle, entry) in self.sessions.drain() {
            entry.shutdown();
            tracing::debug!(%handle, "session closed with bridge");
        }
    }
}

fn start_dispatcher(storage: &Path) -> Result<EventDispatcher, WalletError> {
    let label = storage
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "wallet".to_string());
    EventDispatcher::start(&label)
        .map_err(|e| WalletError::EngineFault(format!("cannot start event delivery: {}", e)))
}
