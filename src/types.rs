//! Snapshot types handed across the bridge.
//!
//! Every value here is an owned copy of engine state taken at the moment of
//! a query or event. Nothing aliases engine memory.

use serde::{Deserialize, Serialize};

/// Amount in the smallest indivisible unit.
pub type Amount = u64;
pub type Height = u64;
pub type TxId = [u8; 32];
pub type WalletId = [u8; 32];

/// Locally known chain tip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemState {
    pub height: Height,
    #[serde(with = "hex32")]
    pub hash: [u8; 32],
}

impl SystemState {
    /// State of a store that has never synced.
    pub const fn genesis() -> Self {
        Self { height: 0, hash: [0u8; 32] }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UtxoStatus {
    /// Produced by a transaction the chain has not confirmed yet.
    Unconfirmed,
    /// Confirmed but below its maturity height.
    Maturing,
    Unspent,
    /// Reserved as an input of an outgoing transaction.
    Locked,
    Spent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    Regular,
    Coinbase,
    Commission,
    Change,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub id: u64,
    pub amount: Amount,
    pub status: UtxoStatus,
    pub create_height: Height,
    /// Height at which the output becomes spendable.
    pub maturity: Height,
    pub key_type: KeyType,
    pub confirm_height: Height,
    #[serde(with = "hex32")]
    pub confirm_hash: [u8; 32],
    pub lock_height: Height,
    #[serde(with = "hex32_option")]
    pub create_tx_id: Option<TxId>,
    #[serde(with = "hex32_option")]
    pub spend_tx_id: Option<TxId>,
}

impl Utxo {
    pub fn is_spendable(&self) -> bool {
        self.status == UtxoStatus::Unspent
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxStatus {
    Pending,
    /// Accepted by the node, waiting for a block.
    Registered,
    Completed,
    Cancelled,
    Failed,
}

impl TxStatus {
    pub fn is_final(self) -> bool {
        matches!(self, TxStatus::Completed | TxStatus::Cancelled | TxStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxDescription {
    #[serde(with = "hex32")]
    pub tx_id: TxId,
    /// Seconds since the unix epoch.
    pub create_time: u64,
    pub modify_time: u64,
    pub amount: Amount,
    pub fee: Amount,
    pub change: Amount,
    /// Chain height the transaction was created at.
    #[serde(default)]
    pub min_height: Height,
    #[serde(with = "hex32")]
    pub peer_id: WalletId,
    #[serde(with = "hex32")]
    pub my_id: WalletId,
    pub sender: bool,
    pub status: TxStatus,
    #[serde(default)]
    pub message: String,
}

/// Aggregate balance view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletStatus {
    pub available: Amount,
    pub unconfirmed: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAddress {
    #[serde(with = "hex32")]
    pub wallet_id: WalletId,
    pub label: String,
    pub create_time: u64,
    pub own: bool,
}

/// Parses a 32-byte identifier from hex.
pub fn parse_id(text: &str) -> Result<[u8; 32], String> {
    let bytes = hex::decode(text.trim()).map_err(|e| format!("not hex: {}", e))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| format!("expected 32 bytes, got {}", bytes.len()))
}

/// Splits an amount into whole units and remainder for display.
pub fn split_amount(amount: Amount, unit: Amount) -> (Amount, Amount) {
    if unit == 0 {
        return (amount, 0);
    }
    (amount / unit, amount % unit)
}

pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub(crate) mod hex32 {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_id(&text).map_err(serde::de::Error::custom)
    }
}

pub(crate) mod hex32_option {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        bytes: &Option<[u8; 32]>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => serializer.serialize_some(&hex::encode(b)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<[u8; 32]>, D::Error> {
        let text: Option<String> = Option::deserialize(deserializer)?;
        text.map(|t| super::parse_id(&t).map_err(serde::de::Error::custom))
            .transpose()
    }
}

pub(crate) mod hex32_vec {
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S: Serializer>(ids: &Vec<[u8; 32]>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(ids.iter().map(hex::encode))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<[u8; 32]>, D::Error> {
        let texts: Vec<String> = Vec::deserialize(deserializer)?;
        texts
            .iter()
            .map(|t| super::parse_id(t).map_err(serde::de::Error::custom))
            .collect()
    }
}
