//! Wallet state with encryption support.
//!
//! The whole state lives in one encrypted file. Every write goes to a
//! temporary file that is synced and renamed over the store, so a crash
//! leaves either the previous or the new version on disk.

use crate::config::KdfParams;
use crate::crypto::{
    decrypt_wallet_data, derive_encryption_key, derive_wallet_id, encrypt_wallet_data,
    generate_nonce, generate_salt, passphrase_verifier, random_id, verify_key, KEY_SIZE,
    NONCE_SIZE, SALT_SIZE,
};
use crate::node_client::{BlockUpdate, OutgoingTx};
use crate::types::{
    Amount, Height, KeyType, SystemState, TxDescription, TxId, TxStatus, Utxo, UtxoStatus,
    WalletAddress, WalletId, WalletStatus,
};
use crate::WalletError;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

const STORE_VERSION: u32 = 1;

/// Upper bound accepted for a stored Argon2 memory cost (4 GiB).
const MAX_STORED_M_COST: u32 = 1 << 22;

#[derive(Serialize, Deserialize, Clone)]
pub struct WalletState {
    pub version: u32,

    #[serde(serialize_with = "serialize_key", deserialize_with = "deserialize_key")]
    master_key: Zeroizing<[u8; 32]>,

    /// Own addresses first, then known peers.
    pub addresses: Vec<WalletAddress>,
    pub next_address_index: u64,

    pub system_state: SystemState,

    /// Insertion order is the order `utxos()` reports.
    pub utxos: Vec<Utxo>,
    pub next_utxo_id: u64,

    /// Insertion order; history queries sort on read.
    pub transactions: Vec<TxDescription>,
}

fn serialize_key<S>(key: &Zeroizing<[u8; 32]>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_bytes(&**key)
}

fn deserialize_key<'de, D>(deserializer: D) -> Result<Zeroizing<[u8; 32]>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let bytes = Zeroizing::new(<Vec<u8>>::deserialize(deserializer)?);
    if bytes.len() != 32 {
        return Err(serde::de::Error::custom(format!(
            "Invalid key length: expected 32, got {}",
            bytes.len()
        )));
    }
    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&bytes);
    Ok(key)
}

/// Outcome of applying one block.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockEffects {
    pub utxos_changed: bool,
    pub transactions_changed: bool,
}

impl WalletState {
    pub fn new(master_key: Zeroizing<[u8; 32]>, created_at: u64) -> Self {
        let mut state = Self {
            version: STORE_VERSION,
            master_key,
            addresses: Vec::new(),
            next_address_index: 0,
            system_state: SystemState::genesis(),
            utxos: Vec::new(),
            next_utxo_id: 0,
            transactions: Vec::new(),
        };
        state.add_own_address("default", created_at);
        state
    }

    /// The default own address.
    pub fn wallet_id(&self) -> WalletId {
        self.addresses
            .iter()
            .find(|a| a.own)
            .map(|a| a.wallet_id)
            .unwrap_or_else(|| derive_wallet_id(&self.master_key, 0))
    }

    pub fn is_own(&self, id: &WalletId) -> bool {
        self.addresses.iter().any(|a| a.own && a.wallet_id == *id)
    }

    pub fn add_own_address(&mut self, label: &str, now: u64) -> WalletId {
        let wallet_id = derive_wallet_id(&self.master_key, self.next_address_index);
        self.next_address_index += 1;
        self.addresses.push(WalletAddress {
            wallet_id,
            label: label.to_string(),
            create_time: now,
            own: true,
        });
        wallet_id
    }

    /// Records a counterparty. Returns false if it was already known.
    pub fn add_peer(&mut self, peer: WalletId, now: u64) -> bool {
        if self.addresses.iter().any(|a| a.wallet_id == peer) {
            return false;
        }
        self.addresses.push(WalletAddress {
            wallet_id: peer,
            label: String::new(),
            create_time: now,
            own: false,
        });
        true
    }

    pub fn available(&self) -> Amount {
        self.utxos
            .iter()
            .filter(|u| u.is_spendable())
            .map(|u| u.amount)
            .sum()
    }

    pub fn status(&self) -> WalletStatus {
        let unconfirmed = self
            .utxos
            .iter()
            .filter(|u| matches!(u.status, UtxoStatus::Unconfirmed | UtxoStatus::Maturing))
            .map(|u| u.amount)
            .sum();
        WalletStatus {
            available: self.available(),
            unconfirmed,
        }
    }

    /// Newest first by creation time; equal times keep newest-inserted first.
    pub fn tx_history(&self) -> Vec<TxDescription> {
        let mut history: Vec<TxDescription> = self.transactions.iter().rev().cloned().collect();
        history.sort_by(|a, b| b.create_time.cmp(&a.create_time));
        history
    }

    pub fn transaction(&self, tx_id: &TxId) -> Option<&TxDescription> {
        self.transactions.iter().find(|t| t.tx_id == *tx_id)
    }

    fn transaction_mut(&mut self, tx_id: &TxId) -> Option<&mut TxDescription> {
        self.transactions.iter_mut().find(|t| t.tx_id == *tx_id)
    }

    fn confirmed_status(maturity: Height, height: Height) -> UtxoStatus {
        if height >= maturity {
            UtxoStatus::Unspent
        } else {
            UtxoStatus::Maturing
        }
    }

    /// Moves maturing outputs to unspent once the tip reaches their maturity.
    fn refresh_maturity(&mut self) -> bool {
        let height = self.system_state.height;
        let mut changed = false;
        for utxo in self.utxos.iter_mut() {
            if utxo.status == UtxoStatus::Maturing && height >= utxo.maturity {
                utxo.status = UtxoStatus::Unspent;
                changed = true;
            }
        }
        changed
    }

    pub fn apply_block(&mut self, block: &BlockUpdate, now: u64) -> BlockEffects {
        let mut effects = BlockEffects::default();
        self.system_state = block.state();
        let my_id = self.wallet_id();

        for output in &block.outputs {
            self.utxos.push(Utxo {
                id: self.next_utxo_id,
                amount: output.amount,
                status: Self::confirmed_status(output.maturity, block.height),
                create_height: block.height,
                maturity: output.maturity,
                key_type: output.key_type,
                confirm_height: block.height,
                confirm_hash: block.hash,
                lock_height: 0,
                create_tx_id: output.tx_id,
                spend_tx_id: None,
            });
            self.next_utxo_id += 1;
            effects.utxos_changed = true;

            if let Some(tx_id) = output.tx_id {
                if self.transaction(&tx_id).is_none() {
                    self.transactions.push(TxDescription {
                        tx_id,
                        create_time: now,
                        modify_time: now,
                        amount: output.amount,
                        fee: 0,
                        change: 0,
                        min_height: block.height,
                        peer_id: [0u8; 32],
                        my_id,
                        sender: false,
                        status: TxStatus::Completed,
                        message: String::new(),
                    });
                    effects.transactions_changed = true;
                }
            }
        }

        for tx_id in &block.confirmed_txs {
            let completed = match self.transaction_mut(tx_id) {
                Some(tx) if tx.sender && !tx.status.is_final() => {
                    tx.status = TxStatus::Completed;
                    tx.modify_time = now;
                    true
                }
                _ => false,
            };
            if !completed {
                continue;
            }
            effects.transactions_changed = true;

            for utxo in self.utxos.iter_mut() {
                if utxo.spend_tx_id.as_ref() == Some(tx_id) && utxo.status == UtxoStatus::Locked {
                    utxo.status = UtxoStatus::Spent;
                    effects.utxos_changed = true;
                } else if utxo.create_tx_id.as_ref() == Some(tx_id)
                    && utxo.status == UtxoStatus::Unconfirmed
                {
                    utxo.create_height = block.height;
                    utxo.confirm_height = block.height;
                    utxo.confirm_hash = block.hash;
                    utxo.maturity = utxo.maturity.max(block.height);
                    utxo.status = Self::confirmed_status(utxo.maturity, block.height);
                    effects.utxos_changed = true;
                }
            }
        }

        if self.refresh_maturity() {
            effects.utxos_changed = true;
        }
        effects
    }

    /// Reserves `inputs` for a payment and records it as pending.
    #[allow(clippy::too_many_arguments)]
    pub fn record_payment(
        &mut self,
        tx_id: TxId,
        receiver: WalletId,
        amount: Amount,
        fee: Amount,
        inputs: &[u64],
        change: Amount,
        now: u64,
    ) -> TxDescription {
        let height = self.system_state.height;
        for utxo in self.utxos.iter_mut() {
            if inputs.contains(&utxo.id) {
                utxo.status = UtxoStatus::Locked;
                utxo.lock_height = height;
                utxo.spend_tx_id = Some(tx_id);
            }
        }

        if change > 0 {
            self.utxos.push(Utxo {
                id: self.next_utxo_id,
                amount: change,
                status: UtxoStatus::Unconfirmed,
                create_height: height,
                maturity: height,
                key_type: KeyType::Change,
                confirm_height: 0,
                confirm_hash: [0u8; 32],
                lock_height: 0,
                create_tx_id: Some(tx_id),
                spend_tx_id: None,
            });
            self.next_utxo_id += 1;
        }

        let tx = TxDescription {
            tx_id,
            create_time: now,
            modify_time: now,
            amount,
            fee,
            change,
            min_height: height,
            peer_id: receiver,
            my_id: self.wallet_id(),
            sender: true,
            status: TxStatus::Pending,
            message: String::new(),
        };
        self.transactions.push(tx.clone());
        tx
    }

    /// Rolls back a pending payment. Returns false if `tx_id` is not pending.
    pub fn cancel_payment(&mut self, tx_id: &TxId, now: u64) -> bool {
        match self.transaction_mut(tx_id) {
            Some(tx) if tx.sender && tx.status == TxStatus::Pending => {
                tx.status = TxStatus::Cancelled;
                tx.modify_time = now;
            }
            _ => return false,
        }
        self.release_inputs(tx_id);
        true
    }

    /// Marks a submitted payment as failed and frees its inputs.
    pub fn fail_payment(&mut self, tx_id: &TxId, now: u64) -> bool {
        match self.transaction_mut(tx_id) {
            Some(tx) if tx.sender && !tx.status.is_final() => {
                tx.status = TxStatus::Failed;
                tx.modify_time = now;
            }
            _ => return false,
        }
        self.release_inputs(tx_id);
        true
    }

    fn release_inputs(&mut self, tx_id: &TxId) {
        self.utxos.retain(|u| {
            !(u.create_tx_id.as_ref() == Some(tx_id) && u.status == UtxoStatus::Unconfirmed)
        });
        let height = self.system_state.height;
        for utxo in self.utxos.iter_mut() {
            if utxo.spend_tx_id.as_ref() == Some(tx_id) && utxo.status == UtxoStatus::Locked {
                utxo.spend_tx_id = None;
                utxo.lock_height = 0;
                utxo.status = Self::confirmed_status(utxo.maturity, height);
            }
        }
    }

    pub fn mark_registered(&mut self, tx_id: &TxId, now: u64) -> bool {
        match self.transaction_mut(tx_id) {
            Some(tx) if tx.status == TxStatus::Pending => {
                tx.status = TxStatus::Registered;
                tx.modify_time = now;
                true
            }
            _ => false,
        }
    }

    /// Payments waiting to be handed to a node.
    pub fn pending_submissions(&self) -> Vec<OutgoingTx> {
        self.transactions
            .iter()
            .filter(|t| t.sender && t.status == TxStatus::Pending)
            .map(|t| OutgoingTx {
                tx_id: t.tx_id,
                receiver: t.peer_id,
                amount: t.amount,
                fee: t.fee,
                inputs: self
                    .utxos
                    .iter()
                    .filter(|u| u.spend_tx_id == Some(t.tx_id))
                    .map(|u| u.id)
                    .collect(),
            })
            .collect()
    }
}

/// Key material of an open store. Kept in memory so state can be rewritten
/// without asking for the passphrase again.
pub struct StoreKey {
    key: Zeroizing<[u8; KEY_SIZE]>,
    salt: [u8; SALT_SIZE],
    kdf: KdfParams,
}

impl StoreKey {
    pub fn derive(passphrase: &str, kdf: KdfParams) -> Result<Self, WalletError> {
        let salt = generate_salt();
        let key = derive_encryption_key(passphrase, &salt, &kdf)?;
        Ok(Self { key, salt, kdf })
    }

    pub fn matches(&self, passphrase: &str) -> Result<bool, WalletError> {
        let candidate = derive_encryption_key(passphrase, &self.salt, &self.kdf)?;
        Ok(verify_key(&candidate, &passphrase_verifier(&self.key)))
    }
}

const MAGIC_BYTES: &[u8; 4] = b"WBS1";

/// magic + version + kdf (3 x u32) + salt + nonce + verifier
const HEADER_SIZE: usize = 4 + 4 + 12 + SALT_SIZE + NONCE_SIZE + 32; // 96 bytes

pub fn store_exists(path: &Path) -> bool {
    path.is_file()
}

fn write_err(e: std::io::Error) -> WalletError {
    WalletError::StorageWriteError(e.to_string())
}

/// A fresh sibling of `path`, so concurrent writers never share a temp file.
fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "wallet".to_string());
    path.with_file_name(format!("{}.{}.tmp", name, hex::encode(&random_id()[..8])))
}

/// The outermost ancestor of `dir` that does not exist yet.
fn topmost_missing(dir: &Path) -> Option<PathBuf> {
    let mut missing = None;
    for ancestor in dir.ancestors() {
        if ancestor.as_os_str().is_empty() || ancestor.exists() {
            break;
        }
        missing = Some(ancestor.to_path_buf());
    }
    missing
}

/// Encrypts `state` under `key` and atomically replaces the file at `path`.
pub fn save_to_file(path: &Path, state: &WalletState, key: &StoreKey) -> Result<(), WalletError> {
    let serialized = Zeroizing::new(bincode::serialize(state).map_err(|e| {
        WalletError::EngineFault(format!("Failed to serialize wallet: {}", e))
    })?);

    let nonce = generate_nonce();
    let encrypted = encrypt_wallet_data(&serialized, &key.key, &nonce)?;

    let mut contents = Vec::with_capacity(HEADER_SIZE + encrypted.len());
    contents.extend_from_slice(MAGIC_BYTES);
    contents.extend_from_slice(&STORE_VERSION.to_le_bytes());
    contents.extend_from_slice(&key.kdf.m_cost.to_le_bytes());
    contents.extend_from_slice(&key.kdf.t_cost.to_le_bytes());
    contents.extend_from_slice(&key.kdf.p_cost.to_le_bytes());
    contents.extend_from_slice(&key.salt);
    contents.extend_from_slice(&nonce);
    contents.extend_from_slice(&passphrase_verifier(&key.key));
    contents.extend_from_slice(&encrypted);

    let temp_path = temp_path_for(path);

    #[cfg(unix)]
    let mut temp_file = {
        use std::os::unix::fs::OpenOptionsExt;
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&temp_path)
            .map_err(write_err)?
    };

    #[cfg(not(unix))]
    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(write_err)?;

    let written = temp_file
        .write_all(&contents)
        .and_then(|_| temp_file.sync_all());
    drop(temp_file);
    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(write_err(e));
    }

    if let Err(e) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(write_err(e));
    }

    #[cfg(unix)]
    if let Some(dir) = path.parent() {
        if let Ok(dir) = fs::File::open(dir) {
            let _ = dir.sync_all();
        }
    }

    Ok(())
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[offset..offset + 4]);
    u32::from_le_bytes(buf)
}

/// Opens the store at `path` with `passphrase`.
pub fn load_from_file(path: &Path, passphrase: &str) -> Result<(WalletState, StoreKey), WalletError> {
    let mut file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(WalletError::NotInitialized),
        Err(e) => return Err(WalletError::StorageCorrupt(format!("cannot read store: {}", e))),
    };
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)
        .map_err(|e| WalletError::StorageCorrupt(format!("cannot read store: {}", e)))?;

    if contents.len() < HEADER_SIZE {
        return Err(WalletError::StorageCorrupt(format!(
            "File too small: expected at least {} bytes, got {}",
            HEADER_SIZE,
            contents.len()
        )));
    }

    if &contents[0..4] != MAGIC_BYTES {
        return Err(WalletError::StorageCorrupt("Invalid magic bytes".to_string()));
    }

    let version = read_u32(&contents, 4);
    if version == 0 || version > STORE_VERSION {
        return Err(WalletError::StorageCorrupt(format!(
            "unsupported store version {}",
            version
        )));
    }

    let kdf = KdfParams {
        m_cost: read_u32(&contents, 8),
        t_cost: read_u32(&contents, 12),
        p_cost: read_u32(&contents, 16),
    };
    if kdf.m_cost > MAX_STORED_M_COST {
        return Err(WalletError::StorageCorrupt(format!(
            "implausible KDF memory cost {}",
            kdf.m_cost
        )));
    }

    let mut salt = [0u8; SALT_SIZE];
    salt.copy_from_slice(&contents[20..52]);
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&contents[52..64]);
    let mut verifier = [0u8; 32];
    verifier.copy_from_slice(&contents[64..96]);

    let key = derive_encryption_key(passphrase, &salt, &kdf).map_err(|e| match e {
        WalletError::EngineFault(msg) => WalletError::StorageCorrupt(msg),
        other => other,
    })?;
    if !verify_key(&key, &verifier) {
        return Err(WalletError::AuthenticationFailed);
    }

    let decrypted = decrypt_wallet_data(&contents[HEADER_SIZE..], &key, &nonce)?;
    let state: WalletState = bincode::deserialize(&decrypted)
        .map_err(|e| WalletError::StorageCorrupt(format!("Failed to deserialize wallet: {}", e)))?;

    Ok((state, StoreKey { key, salt, kdf }))
}

/// Creates a new store at `path`. Fails without touching anything if a store
/// already exists; on any other failure nothing is left behind.
pub fn create_store(path: &Path, state: &WalletState, key: &StoreKey) -> Result<(), WalletError> {
    if store_exists(path) {
        return Err(WalletError::AlreadyInitialized);
    }

    let mut created_dir = None;
    if let Some(dir) = path.parent() {
        if let Some(top) = topmost_missing(dir) {
            if let Err(e) = fs::create_dir_all(dir) {
                let _ = fs::remove_dir_all(&top);
                return Err(write_err(e));
            }
            created_dir = Some(top);
        }
    }

    let result = save_to_file(path, state, key);
    if result.is_err() {
        let _ = fs::remove_file(path);
        if let Some(dir) = created_dir {
            let _ = fs::remove_dir_all(dir);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::master_key_from_seed;
    use crate::node_client::IncomingOutput;

    fn block(height: Height, outputs: Vec<IncomingOutput>, confirmed: Vec<TxId>) -> BlockUpdate {
        BlockUpdate {
            height,
            hash: [height as u8; 32],
            outputs,
            confirmed_txs: confirmed,
        }
    }

    fn output(amount: Amount, maturity: Height) -> IncomingOutput {
        IncomingOutput {
            amount,
            key_type: KeyType::Regular,
            maturity,
            tx_id: None,
        }
    }

    fn state() -> WalletState {
        WalletState::new(master_key_from_seed("seedXYZ").unwrap(), 1_000)
    }

    #[test]
    fn test_fresh_state() {
        let state = state();
        assert_eq!(state.system_state, SystemState::genesis());
        assert!(state.utxos.is_empty());
        assert_eq!(state.addresses.len(), 1);
        assert!(state.is_own(&state.wallet_id()));
    }

    #[test]
    fn test_maturity_progression() {
        let mut state = state();
        let effects = state.apply_block(&block(1, vec![output(100, 3)], vec![]), 0);
        assert!(effects.utxos_changed);
        assert_eq!(state.utxos[0].status, UtxoStatus::Maturing);
        assert_eq!(state.status(), WalletStatus { available: 0, unconfirmed: 100 });

        let effects = state.apply_block(&block(2, vec![], vec![]), 0);
        assert!(!effects.utxos_changed);

        let effects = state.apply_block(&block(3, vec![], vec![]), 0);
        assert!(effects.utxos_changed);
        assert_eq!(state.utxos[0].status, UtxoStatus::Unspent);
        assert_eq!(state.available(), 100);
    }

    #[test]
    fn test_payment_lifecycle() {
        let mut state = state();
        state.apply_block(&block(1, vec![output(100, 1)], vec![]), 0);

        let tx_id = [9u8; 32];
        let tx = state.record_payment(tx_id, [5u8; 32], 60, 5, &[0], 35, 10);
        assert_eq!(tx.status, TxStatus::Pending);
        assert_eq!(tx.min_height, 1);
        assert_eq!(state.utxos[0].status, UtxoStatus::Locked);
        assert_eq!(state.utxos[1].status, UtxoStatus::Unconfirmed);
        assert_eq!(state.pending_submissions()[0].inputs, vec![0]);

        assert!(state.mark_registered(&tx_id, 11));
        assert!(state.pending_submissions().is_empty());

        let effects = state.apply_block(&block(2, vec![], vec![tx_id]), 12);
        assert!(effects.transactions_changed);
        assert_eq!(state.transaction(&tx_id).unwrap().status, TxStatus::Completed);
        assert_eq!(state.utxos[0].status, UtxoStatus::Spent);
        assert_eq!(state.utxos[1].status, UtxoStatus::Unspent);
        assert_eq!(state.available(), 35);
    }

    #[test]
    fn test_cancel_restores_inputs() {
        let mut state = state();
        state.apply_block(&block(1, vec![output(100, 1)], vec![]), 0);
        let tx_id = [9u8; 32];
        state.record_payment(tx_id, [5u8; 32], 60, 5, &[0], 35, 10);

        assert!(state.cancel_payment(&tx_id, 11));
        assert_eq!(state.utxos.len(), 1);
        assert_eq!(state.utxos[0].status, UtxoStatus::Unspent);
        assert_eq!(state.utxos[0].spend_tx_id, None);
        assert!(!state.cancel_payment(&tx_id, 12));
    }

    #[test]
    fn test_topmost_missing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let base = temp_dir.path();
        assert_eq!(topmost_missing(base), None);
        assert_eq!(topmost_missing(&base.join("a").join("b")), Some(base.join("a")));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_create_removes_every_new_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let outer = temp_dir.path().join("outer");
        // too long once the temp suffix is added, so the first write fails
        let path = outer.join("inner").join("w".repeat(250));
        let key = StoreKey::derive("pw", KdfParams::insecure_for_tests()).unwrap();

        assert!(matches!(
            create_store(&path, &state(), &key),
            Err(WalletError::StorageWriteError(_))
        ));
        assert!(!outer.exists());
        assert!(temp_dir.path().exists());
    }

    #[test]
    fn test_temp_paths_are_unique() {
        let path = Path::new("/data/wallet.db");
        let first = temp_path_for(path);
        assert_ne!(first, temp_path_for(path));
        assert_eq!(first.parent(), path.parent());
        assert!(first.to_string_lossy().ends_with(".tmp"));
    }

    #[test]
    fn test_history_newest_first() {
        let mut state = state();
        state.apply_block(&block(1, vec![output(500, 1)], vec![]), 0);
        state.record_payment([1u8; 32], [5u8; 32], 1, 0, &[0], 499, 100);
        state.cancel_payment(&[1u8; 32], 100);
        state.record_payment([2u8; 32], [5u8; 32], 1, 0, &[0], 499, 300);
        state.cancel_payment(&[2u8; 32], 300);
        state.record_payment([3u8; 32], [5u8; 32], 1, 0, &[0], 499, 300);

        let ids: Vec<TxId> = state.tx_history().iter().map(|t| t.tx_id).collect();
        assert_eq!(ids, vec![[3u8; 32], [2u8; 32], [1u8; 32]]);
    }
}
