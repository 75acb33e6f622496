use crate::api::Api;
use crate::events::WalletListener;
use crate::registry::WalletHandle;
use crate::types::{
    Amount, SystemState, TxDescription, TxId, Utxo, WalletAddress, WalletId, WalletStatus,
};
use crate::WalletError;
use std::sync::Arc;

/// Borrowed view of one open wallet. Every call still goes through the
/// handle, so a session whose handle was closed elsewhere fails with
/// [`WalletError::InvalidHandle`].
#[derive(Clone, Copy)]
pub struct WalletSession<'a> {
    api: &'a Api,
    handle: WalletHandle,
}

impl<'a> WalletSession<'a> {
    pub(crate) fn new(api: &'a Api, handle: WalletHandle) -> Self {
        Self { api, handle }
    }

    pub fn handle(&self) -> WalletHandle {
        self.handle
    }

    pub fn get_system_state(&self) -> Result<SystemState, WalletError> {
        self.api.get_system_state(self.handle)
    }

    pub fn get_utxos(&self) -> Result<Vec<Utxo>, WalletError> {
        self.api.get_utxos(self.handle)
    }

    pub fn get_tx_history(&self) -> Result<Vec<TxDescription>, WalletError> {
        self.api.get_tx_history(self.handle)
    }

    pub fn get_available_balance(&self) -> Result<Amount, WalletError> {
        self.api.get_available_balance(self.handle)
    }

    pub fn get_wallet_status(&self) -> Result<WalletStatus, WalletError> {
        self.api.get_wallet_status(self.handle)
    }

    pub fn get_wallet_id(&self) -> Result<WalletId, WalletError> {
        self.api.get_wallet_id(self.handle)
    }

    pub fn get_addresses(&self) -> Result<Vec<WalletAddress>, WalletError> {
        self.api.get_addresses(self.handle)
    }

    pub fn change_passphrase(&self, new_passphrase: &str) -> Result<(), WalletError> {
        self.api.change_passphrase(self.handle, new_passphrase)
    }

    pub fn verify_passphrase(&self, candidate: &str) -> Result<(), WalletError> {
        self.api.verify_passphrase(self.handle, candidate)
    }

    pub fn run(
        &self,
        node_address: &str,
        listener: Option<Arc<dyn WalletListener>>,
    ) -> Result<(), WalletError> {
        self.api.run(self.handle, node_address, listener)
    }

    pub fn set_listener(&self, listener: Option<Arc<dyn WalletListener>>) -> Result<(), WalletError> {
        self.api.set_listener(self.handle, listener)
    }

    pub fn send_payment(&self, receiver: &str, amount: Amount, fee: Amount) -> Result<TxId, WalletError> {
        self.api.send_payment(self.handle, receiver, amount, fee)
    }

    pub fn cancel_tx(&self, tx_id: &TxId) -> Result<(), WalletError> {
        self.api.cancel_tx(self.handle, tx_id)
    }

    pub fn generate_wallet_id(&self) -> Result<WalletId, WalletError> {
        self.api.generate_wallet_id(self.handle)
    }

    /// Closes the underlying handle.
    pub fn close(self) -> Result<(), WalletError> {
        self.api.close(self.handle)
    }
}
