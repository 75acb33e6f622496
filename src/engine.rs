//! The engine seam and the file-backed reference engine.
//!
//! The bridge only talks to [`WalletEngine`] and [`EngineProvider`]. The
//! reference [`LocalWallet`] keeps its whole state in memory behind an
//! `RwLock`, persists every mutation to the encrypted store before it
//! becomes visible, and enqueues events while the state lock is still held.

use crate::config::{KdfParams, StoreConfig};
use crate::crypto::{master_key_from_seed, random_id};
use crate::events::{EventSink, WalletEvent};
use crate::input_selection::{select_inputs, InputSelectionError};
use crate::node_client::{NodeConnector, OutgoingTx, TcpConnector};
use crate::rpc::ConnectionConfig;
use crate::runtime;
use crate::sync::{sync_loop, SyncTask};
use crate::types::{
    unix_now, Amount, SystemState, TxDescription, TxId, Utxo, WalletAddress, WalletId,
    WalletStatus,
};
use crate::wallet_state::{
    create_store, load_from_file, save_to_file, store_exists, StoreKey, WalletState,
};
use crate::WalletError;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

/// One open wallet. Queries return owned snapshots.
pub trait WalletEngine: Send + Sync {
    fn system_state(&self) -> Result<SystemState, WalletError>;

    fn utxos(&self) -> Result<Vec<Utxo>, WalletError>;

    /// Newest first by creation time, ties newest-inserted first.
    fn tx_history(&self) -> Result<Vec<TxDescription>, WalletError>;

    fn available_balance(&self) -> Result<Amount, WalletError>;

    fn wallet_status(&self) -> Result<WalletStatus, WalletError>;

    fn wallet_id(&self) -> Result<WalletId, WalletError>;

    fn addresses(&self) -> Result<Vec<WalletAddress>, WalletError>;

    fn change_passphrase(&self, new_passphrase: &str) -> Result<(), WalletError>;

    fn verify_passphrase(&self, candidate: &str) -> Result<(), WalletError>;

    /// Starts background sync. Returns `false` if a sync is already running.
    fn start_sync(&self, connection: ConnectionConfig) -> Result<bool, WalletError>;

    fn is_syncing(&self) -> bool;

    /// Signals background sync to stop and waits until it has.
    fn stop(&self);

    fn send_payment(&self, receiver: WalletId, amount: Amount, fee: Amount)
        -> Result<TxId, WalletError>;

    fn cancel_tx(&self, tx_id: &TxId) -> Result<(), WalletError>;

    fn generate_wallet_id(&self) -> Result<WalletId, WalletError>;
}

/// Opens and creates engines for storage locations.
pub trait EngineProvider: Send + Sync {
    fn is_initialized(&self, storage: &Path) -> bool;

    fn create(
        &self,
        storage: &Path,
        passphrase: &str,
        seed_phrase: &str,
        events: EventSink,
    ) -> Result<Box<dyn WalletEngine>, WalletError>;

    fn open(
        &self,
        storage: &Path,
        passphrase: &str,
        events: EventSink,
    ) -> Result<Box<dyn WalletEngine>, WalletError>;
}

/// State shared between a [`LocalWallet`] and its sync task.
pub(crate) struct EngineCore {
    path: PathBuf,
    kdf: KdfParams,
    state: RwLock<WalletState>,
    key: Mutex<StoreKey>,
    /// Payments currently being handed to the node.
    submitting: Mutex<HashSet<TxId>>,
    pub(crate) events: EventSink,
}

/// Releases claimed submissions when a sync round ends or is dropped.
pub(crate) struct SubmissionClaim<'a> {
    core: &'a EngineCore,
    tx_ids: Vec<TxId>,
}

impl Drop for SubmissionClaim<'_> {
    fn drop(&mut self) {
        let mut submitting = self.core.submitting();
        for tx_id in &self.tx_ids {
            submitting.remove(tx_id);
        }
    }
}

impl EngineCore {
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, WalletState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, WalletState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn key(&self) -> MutexGuard<'_, StoreKey> {
        self.key.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn submitting(&self) -> MutexGuard<'_, HashSet<TxId>> {
        self.submitting.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pending payments not yet claimed by a submitter. They stay claimed,
    /// and cannot be cancelled, until the returned guard drops.
    pub(crate) fn claim_submissions(&self) -> (Vec<OutgoingTx>, SubmissionClaim<'_>) {
        let state = self.read();
        let mut submitting = self.submitting();
        let claimed: Vec<OutgoingTx> = state
            .pending_submissions()
            .into_iter()
            .filter(|tx| submitting.insert(tx.tx_id))
            .collect();
        let tx_ids = claimed.iter().map(|tx| tx.tx_id).collect();
        (claimed, SubmissionClaim { core: self, tx_ids })
    }

    fn is_submitting(&self, tx_id: &TxId) -> bool {
        self.submitting().contains(tx_id)
    }

    /// Writes `state` to disk. Callers hold the state write lock.
    pub(crate) fn persist(&self, state: &WalletState) -> Result<(), WalletError> {
        save_to_file(&self.path, state, &self.key())
    }

    /// Balance events after a utxo change. Callers hold the state lock.
    pub(crate) fn emit_utxo_events(&self, state: &WalletState) {
        self.events.emit(WalletEvent::AllUtxoChanged(state.utxos.clone()));
        self.events.emit(WalletEvent::Status(state.status()));
    }
}

pub struct LocalWallet {
    core: Arc<EngineCore>,
    connector: Arc<dyn NodeConnector>,
    sync: Mutex<Option<SyncTask>>,
}

impl LocalWallet {
    fn new(
        path: PathBuf,
        kdf: KdfParams,
        state: WalletState,
        key: StoreKey,
        events: EventSink,
        connector: Arc<dyn NodeConnector>,
    ) -> Self {
        Self {
            core: Arc::new(EngineCore {
                path,
                kdf,
                state: RwLock::new(state),
                key: Mutex::new(key),
                submitting: Mutex::new(HashSet::new()),
                events,
            }),
            connector,
            sync: Mutex::new(None),
        }
    }

    fn sync_slot(&self) -> MutexGuard<'_, Option<SyncTask>> {
        self.sync.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `change` to a copy of the state and publishes it once stored.
    fn commit<T>(
        &self,
        change: impl FnOnce(&mut WalletState) -> Result<T, WalletError>,
        notify: impl FnOnce(&EngineCore, &WalletState, &T),
    ) -> Result<T, WalletError> {
        let mut state = self.core.write();
        let mut updated = state.clone();
        let result = change(&mut updated)?;
        self.core.persist(&updated)?;
        *state = updated;
        notify(self.core.as_ref(), &*state, &result);
        Ok(result)
    }
}

impl WalletEngine for LocalWallet {
    fn system_state(&self) -> Result<SystemState, WalletError> {
        Ok(self.core.read().system_state)
    }

    fn utxos(&self) -> Result<Vec<Utxo>, WalletError> {
        Ok(self.core.read().utxos.clone())
    }

    fn tx_history(&self) -> Result<Vec<TxDescription>, WalletError> {
        Ok(self.core.read().tx_history())
    }

    fn available_balance(&self) -> Result<Amount, WalletError> {
        Ok(self.core.read().available())
    }

    fn wallet_status(&self) -> Result<WalletStatus, WalletError> {
        Ok(self.core.read().status())
    }

    fn wallet_id(&self) -> Result<WalletId, WalletError> {
        Ok(self.core.read().wallet_id())
    }

    fn addresses(&self) -> Result<Vec<WalletAddress>, WalletError> {
        Ok(self
            .core
            .read()
            .addresses
            .iter()
            .filter(|a| a.own)
            .cloned()
            .collect())
    }

    fn change_passphrase(&self, new_passphrase: &str) -> Result<(), WalletError> {
        let new_key = StoreKey::derive(new_passphrase, self.core.kdf)?;

        let state = self.core.write();
        let mut key = self.core.key();
        save_to_file(&self.core.path, &state, &new_key)?;
        *key = new_key;
        self.core.events.emit(WalletEvent::KeychainChanged);
        Ok(())
    }

    fn verify_passphrase(&self, candidate: &str) -> Result<(), WalletError> {
        if self.core.key().matches(candidate)? {
            Ok(())
        } else {
            Err(WalletError::AuthenticationFailed)
        }
    }

    fn start_sync(&self, connection: ConnectionConfig) -> Result<bool, WalletError> {
        let mut slot = self.sync_slot();
        if slot.as_ref().map_or(false, SyncTask::is_running) {
            return Ok(false);
        }

        let handle = runtime::handle()?;
        let (stop_tx, stop_rx) = broadcast::channel(1);
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();
        let core = Arc::clone(&self.core);
        let connector = Arc::clone(&self.connector);

        handle.spawn(async move {
            let _done = done_tx;
            sync_loop(core, connector, connection, stop_rx).await;
        });

        *slot = Some(SyncTask::new(stop_tx, done_rx));
        Ok(true)
    }

    fn is_syncing(&self) -> bool {
        self.sync_slot().as_ref().map_or(false, SyncTask::is_running)
    }

    fn stop(&self) {
        let task = self.sync_slot().take();
        if let Some(task) = task {
            task.stop_and_wait();
        }
    }

    fn send_payment(
        &self,
        receiver: WalletId,
        amount: Amount,
        fee: Amount,
    ) -> Result<TxId, WalletError> {
        if amount == 0 {
            return Err(WalletError::InvalidArgument("amount must be positive".to_string()));
        }
        let target = amount
            .checked_add(fee)
            .ok_or_else(|| WalletError::InvalidArgument("amount plus fee overflows".to_string()))?;

        let (tx, new_peer) = self.commit(
            |state| {
                if state.is_own(&receiver) {
                    return Err(WalletError::InvalidRecipient(
                        "cannot pay an own address".to_string(),
                    ));
                }

                let selected = select_inputs(&state.utxos, target).map_err(|e| match e {
                    InputSelectionError::NoOutputsAvailable => WalletError::InsufficientFunds {
                        needed: target,
                        available: 0,
                    },
                    other => other.into(),
                })?;

                let now = unix_now();
                let tx = state.record_payment(
                    random_id(),
                    receiver,
                    amount,
                    fee,
                    &selected.ids(),
                    selected.change(target),
                    now,
                );
                let new_peer = state.add_peer(receiver, now);
                Ok((tx, new_peer))
            },
            |core, state, (_, new_peer)| {
                core.events.emit(WalletEvent::TransactionChanged);
                core.emit_utxo_events(state);
                if *new_peer {
                    core.events.emit(WalletEvent::TxPeerChanged);
                }
            },
        )?;

        tracing::info!(
            tx_id = %hex::encode(tx.tx_id),
            amount,
            fee,
            change = tx.change,
            new_peer,
            "payment recorded"
        );
        Ok(tx.tx_id)
    }

    fn cancel_tx(&self, tx_id: &TxId) -> Result<(), WalletError> {
        self.commit(
            |state| {
                if self.core.is_submitting(tx_id) {
                    return Err(WalletError::InvalidArgument(format!(
                        "transaction {} is being submitted to the node",
                        hex::encode(tx_id)
                    )));
                }
                if state.cancel_payment(tx_id, unix_now()) {
                    Ok(())
                } else {
                    Err(WalletError::InvalidArgument(format!(
                        "transaction {} is not pending",
                        hex::encode(tx_id)
                    )))
                }
            },
            |core, state, _| {
                core.events.emit(WalletEvent::TransactionChanged);
                core.emit_utxo_events(state);
            },
        )?;
        tracing::info!(tx_id = %hex::encode(tx_id), "payment cancelled");
        Ok(())
    }

    fn generate_wallet_id(&self) -> Result<WalletId, WalletError> {
        self.commit(
            |state| Ok(state.add_own_address("", unix_now())),
            |core, _, _| core.events.emit(WalletEvent::AddressChanged),
        )
    }
}

impl Drop for LocalWallet {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Provider for wallets stored as one encrypted file per directory.
pub struct FileEngineProvider {
    config: StoreConfig,
    connector: Arc<dyn NodeConnector>,
}

impl FileEngineProvider {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            connector: Arc::new(TcpConnector),
        }
    }

    /// Replaces the node connector, e.g. with a scripted chain in tests.
    pub fn with_connector(mut self, connector: Arc<dyn NodeConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn store_path(&self, storage: &Path) -> PathBuf {
        storage.join(&self.config.file_name)
    }
}

impl EngineProvider for FileEngineProvider {
    fn is_initialized(&self, storage: &Path) -> bool {
        store_exists(&self.store_path(storage))
    }

    fn create(
        &self,
        storage: &Path,
        passphrase: &str,
        seed_phrase: &str,
        events: EventSink,
    ) -> Result<Box<dyn WalletEngine>, WalletError> {
        let path = self.store_path(storage);
        if store_exists(&path) {
            return Err(WalletError::AlreadyInitialized);
        }

        let master_key = master_key_from_seed(seed_phrase)?;
        let state = WalletState::new(master_key, unix_now());
        let key = StoreKey::derive(passphrase, self.config.kdf)?;
        create_store(&path, &state, &key)?;

        Ok(Box::new(LocalWallet::new(
            path,
            self.config.kdf,
            state,
            key,
            events,
            Arc::clone(&self.connector),
        )))
    }

    fn open(
        &self,
        storage: &Path,
        passphrase: &str,
        events: EventSink,
    ) -> Result<Box<dyn WalletEngine>, WalletError> {
        let path = self.store_path(storage);
        let (state, key) = load_from_file(&path, passphrase)?;

        Ok(Box::new(LocalWallet::new(
            path,
            self.config.kdf,
            state,
            key,
            events,
            Arc::clone(&self.connector),
        )))
    }
}
