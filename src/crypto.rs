//! Store encryption and key derivation.

use crate::config::KdfParams;
use crate::types::WalletId;
use crate::WalletError;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{Algorithm, Argon2, Params, Version};
use rand_core::{OsRng, RngCore};
use sha3::{Digest, Keccak256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 12;
pub const SALT_SIZE: usize = 32;

const VERIFIER_TAG: &[u8] = b"wallet-bridge/verifier";
const WALLET_ID_TAG: &[u8] = b"wallet-bridge/wallet-id";

/// Derives the store key from a passphrase using Argon2id.
pub fn derive_encryption_key(
    passphrase: &str,
    salt: &[u8; SALT_SIZE],
    kdf: &KdfParams,
) -> Result<Zeroizing<[u8; KEY_SIZE]>, WalletError> {
    let params = Params::new(kdf.m_cost, kdf.t_cost, kdf.p_cost, Some(KEY_SIZE))
        .map_err(|e| WalletError::EngineFault(format!("invalid Argon2 parameters: {}", e)))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut *key)
        .map_err(|e| WalletError::EngineFault(format!("key derivation failed: {}", e)))?;

    Ok(key)
}

/// Value stored next to the ciphertext so a wrong passphrase can be told
/// apart from a damaged payload.
pub fn passphrase_verifier(key: &[u8; KEY_SIZE]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(VERIFIER_TAG);
    hasher.update(key);
    hasher.finalize().into()
}

pub fn verify_key(key: &[u8; KEY_SIZE], expected: &[u8; 32]) -> bool {
    passphrase_verifier(key).ct_eq(expected).into()
}

pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Generates a random nonce for AES-GCM.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

pub fn random_id() -> [u8; 32] {
    let mut id = [0u8; 32];
    OsRng.fill_bytes(&mut id);
    id
}

/// Encrypts data with AES-256-GCM under an already derived key.
pub fn encrypt_wallet_data(
    data: &[u8],
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
) -> Result<Vec<u8>, WalletError> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| WalletError::EngineFault(format!("failed to create cipher: {}", e)))?;
    cipher
        .encrypt(Nonce::from_slice(nonce), data)
        .map_err(|e| WalletError::EngineFault(format!("encryption failed: {}", e)))
}

pub fn decrypt_wallet_data(
    ciphertext: &[u8],
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
) -> Result<Zeroizing<Vec<u8>>, WalletError> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| WalletError::EngineFault(format!("failed to create cipher: {}", e)))?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| WalletError::StorageCorrupt("payload failed authentication".to_string()))
}

/// Hashes a seed phrase into the wallet master key. Word separators are
/// normalized, so extra whitespace does not change the key.
pub fn master_key_from_seed(seed_phrase: &str) -> Result<Zeroizing<[u8; 32]>, WalletError> {
    let words: Vec<&str> = seed_phrase.split_whitespace().collect();
    if words.is_empty() {
        return Err(WalletError::InvalidSeed);
    }
    if words.iter().any(|w| w.chars().any(char::is_control)) {
        return Err(WalletError::InvalidSeed);
    }

    let normalized = Zeroizing::new(words.join(" "));
    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&Keccak256::digest(normalized.as_bytes()));
    Ok(key)
}

/// Own address number `index` for the wallet with this master key.
pub fn derive_wallet_id(master_key: &[u8; 32], index: u64) -> WalletId {
    let mut hasher = Keccak256::new();
    hasher.update(WALLET_ID_TAG);
    hasher.update(master_key);
    hasher.update(index.to_le_bytes());
    hasher.finalize().into()
}
