//! C ABI over a process-wide [`Api`].
//!
//! Every function returns `0` on success or an [`FfiErrorCode`]. On failure
//! out-parameters are left untouched and the message is kept for
//! [`wallet_last_error`] on the calling thread. Strings handed out by this
//! module are released with [`free_string`].

use crate::api::Api;
use crate::config::BridgeConfig;
use crate::events::WalletListener;
use crate::logging::init_logging;
use crate::registry::WalletHandle;
use crate::runtime;
use crate::types::{Utxo, WalletStatus};
use crate::WalletError;
use once_cell::sync::Lazy;
use std::cell::RefCell;
use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

static API: Lazy<Mutex<Option<Arc<Api>>>> = Lazy::new(|| Mutex::new(None));

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = RefCell::new(None);
}

fn api_slot() -> MutexGuard<'static, Option<Arc<Api>>> {
    API.lock().unwrap_or_else(PoisonError::into_inner)
}

fn api() -> Result<Arc<Api>, WalletError> {
    api_slot()
        .clone()
        .ok_or_else(|| WalletError::EngineFault("wallet_bridge_initialize has not been called".to_string()))
}

fn set_last_error(msg: String) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = Some(msg);
    });
}

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorCode {
    Ok = 0,
    InvalidHandle = 1,
    AlreadyInitialized = 2,
    NotInitialized = 3,
    AuthenticationFailed = 4,
    InvalidSeed = 5,
    StorageWriteError = 6,
    StorageCorrupt = 7,
    InsufficientFunds = 8,
    InvalidRecipient = 9,
    InvalidArgument = 10,
    EngineFault = 11,
}

impl From<&WalletError> for FfiErrorCode {
    fn from(err: &WalletError) -> Self {
        match err {
            WalletError::InvalidHandle => FfiErrorCode::InvalidHandle,
            WalletError::AlreadyInitialized => FfiErrorCode::AlreadyInitialized,
            WalletError::NotInitialized => FfiErrorCode::NotInitialized,
            WalletError::AuthenticationFailed => FfiErrorCode::AuthenticationFailed,
            WalletError::InvalidSeed => FfiErrorCode::InvalidSeed,
            WalletError::StorageWriteError(_) => FfiErrorCode::StorageWriteError,
            WalletError::StorageCorrupt(_) => FfiErrorCode::StorageCorrupt,
            WalletError::InsufficientFunds { .. } => FfiErrorCode::InsufficientFunds,
            WalletError::InvalidRecipient(_) => FfiErrorCode::InvalidRecipient,
            WalletError::InvalidArgument(_) => FfiErrorCode::InvalidArgument,
            WalletError::EngineFault(_) => FfiErrorCode::EngineFault,
        }
    }
}

/// Runs `f`, turning errors and panics into a status code.
fn ffi_call(name: &str, f: impl FnOnce() -> Result<(), WalletError>) -> i32 {
    let result = catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|_| {
        Err(WalletError::EngineFault(format!("{} panicked", name)))
    });
    match result {
        Ok(()) => FfiErrorCode::Ok as i32,
        Err(e) => {
            tracing::debug!(call = name, error = %e, "ffi call failed");
            let code = FfiErrorCode::from(&e);
            set_last_error(format!("{}: {}", name, e));
            code as i32
        }
    }
}

unsafe fn c_str<'a>(ptr: *const c_char, what: &str) -> Result<&'a str, WalletError> {
    if ptr.is_null() {
        return Err(WalletError::InvalidArgument(format!("{} is null", what)));
    }
    CStr::from_ptr(ptr)
        .to_str()
        .map_err(|_| WalletError::InvalidArgument(format!("{} is not valid UTF-8", what)))
}

fn out_ptr<T>(ptr: *mut T, what: &str) -> Result<(), WalletError> {
    if ptr.is_null() {
        Err(WalletError::InvalidArgument(format!("{} is null", what)))
    } else {
        Ok(())
    }
}

fn to_c_string(text: String) -> Result<*mut c_char, WalletError> {
    CString::new(text)
        .map(CString::into_raw)
        .map_err(|e| WalletError::EngineFault(format!("string contains NUL: {}", e)))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, WalletError> {
    serde_json::to_string(value).map_err(|e| WalletError::EngineFault(format!("cannot encode json: {}", e)))
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FfiSystemState {
    pub height: u64,
    pub hash: [u8; 32],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FfiWalletStatus {
    pub available: u64,
    pub unconfirmed: u64,
}

impl From<WalletStatus> for FfiWalletStatus {
    fn from(status: WalletStatus) -> Self {
        Self {
            available: status.available,
            unconfirmed: status.unconfirmed,
        }
    }
}

/// Callback table. Every entry may be null. Callbacks run on the session's
/// delivery thread and receive `user_data` as their first argument.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FfiListener {
    pub user_data: *mut c_void,
    pub on_sync_progress: Option<extern "C" fn(user_data: *mut c_void, done: u64, total: u64)>,
    pub on_system_state_changed: Option<extern "C" fn(user_data: *mut c_void)>,
    pub on_keychain_changed: Option<extern "C" fn(user_data: *mut c_void)>,
    pub on_transaction_changed: Option<extern "C" fn(user_data: *mut c_void)>,
    pub on_tx_peer_changed: Option<extern "C" fn(user_data: *mut c_void)>,
    pub on_address_changed: Option<extern "C" fn(user_data: *mut c_void)>,
    /// `utxos_json` is only valid for the duration of the call.
    pub on_all_utxo_changed: Option<extern "C" fn(user_data: *mut c_void, utxos_json: *const c_char)>,
    pub on_status: Option<extern "C" fn(user_data: *mut c_void, status: FfiWalletStatus)>,
}

struct CListener(FfiListener);

// SAFETY: the host promises that `user_data` may be used from the delivery
// thread for as long as the listener stays attached.
unsafe impl Send for CListener {}
unsafe impl Sync for CListener {}

impl WalletListener for CListener {
    fn on_sync_progress(&self, done: u64, total: u64) {
        if let Some(cb) = self.0.on_sync_progress {
            cb(self.0.user_data, done, total);
        }
    }

    fn on_system_state_changed(&self) {
        if let Some(cb) = self.0.on_system_state_changed {
            cb(self.0.user_data);
        }
    }

    fn on_keychain_changed(&self) {
        if let Some(cb) = self.0.on_keychain_changed {
            cb(self.0.user_data);
        }
    }

    fn on_transaction_changed(&self) {
        if let Some(cb) = self.0.on_transaction_changed {
            cb(self.0.user_data);
        }
    }

    fn on_tx_peer_changed(&self) {
        if let Some(cb) = self.0.on_tx_peer_changed {
            cb(self.0.user_data);
        }
    }

    fn on_address_changed(&self) {
        if let Some(cb) = self.0.on_address_changed {
            cb(self.0.user_data);
        }
    }

    fn on_all_utxo_changed(&self, utxos: &[Utxo]) {
        let Some(cb) = self.0.on_all_utxo_changed else {
            return;
        };
        match to_json(&utxos).and_then(|json| {
            CString::new(json).map_err(|e| WalletError::EngineFault(e.to_string()))
        }) {
            Ok(json) => cb(self.0.user_data, json.as_ptr()),
            Err(e) => tracing::error!(error = %e, "cannot marshal utxo event"),
        }
    }

    fn on_status(&self, status: &WalletStatus) {
        if let Some(cb) = self.0.on_status {
            cb(self.0.user_data, (*status).into());
        }
    }
}

/// Starts the bridge. `config_toml` may be null for defaults. Calling it
/// again while the bridge is up keeps the first configuration.
///
/// # Safety
/// `config_toml` must be null or a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn wallet_bridge_initialize(config_toml: *const c_char) -> i32 {
    ffi_call("wallet_bridge_initialize", || {
        let config = if config_toml.is_null() {
            BridgeConfig::default()
        } else {
            BridgeConfig::from_toml_str(c_str(config_toml, "config_toml")?)?
        };

        let mut slot = api_slot();
        if slot.is_some() {
            return Ok(());
        }
        init_logging(&config.logging);
        *slot = Some(Arc::new(Api::new(config)?));
        tracing::info!("wallet bridge initialized");
        Ok(())
    })
}

/// Closes every open session and stops the runtime.
#[no_mangle]
pub extern "C" fn wallet_bridge_shutdown() {
    let api = api_slot().take();
    drop(api);
    runtime::shutdown();
}

/// Returns 1 if a store exists at `storage`, 0 if not, -1 on bad input.
///
/// # Safety
/// `storage` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn wallet_is_initialized(storage: *const c_char) -> i32 {
    let mut initialized = false;
    let status = ffi_call("wallet_is_initialized", || {
        let storage = c_str(storage, "storage")?;
        initialized = api()?.is_initialized(storage);
        Ok(())
    });
    match (status, initialized) {
        (0, true) => 1,
        (0, false) => 0,
        _ => -1,
    }
}

/// # Safety
/// String arguments must be valid NUL-terminated strings and `out_handle`
/// must point to writable memory.
#[no_mangle]
pub unsafe extern "C" fn wallet_create(
    storage: *const c_char,
    passphrase: *const c_char,
    seed_phrase: *const c_char,
    out_handle: *mut u64,
) -> i32 {
    ffi_call("wallet_create", || {
        out_ptr(out_handle, "out_handle")?;
        let storage = c_str(storage, "storage")?;
        let passphrase = c_str(passphrase, "passphrase")?;
        let seed_phrase = c_str(seed_phrase, "seed_phrase")?;
        let handle = api()?.create(storage, passphrase, seed_phrase)?;
        *out_handle = handle.as_raw();
        Ok(())
    })
}

/// # Safety
/// String arguments must be valid NUL-terminated strings and `out_handle`
/// must point to writable memory.
#[no_mangle]
pub unsafe extern "C" fn wallet_open(
    storage: *const c_char,
    passphrase: *const c_char,
    out_handle: *mut u64,
) -> i32 {
    ffi_call("wallet_open", || {
        out_ptr(out_handle, "out_handle")?;
        let storage = c_str(storage, "storage")?;
        let passphrase = c_str(passphrase, "passphrase")?;
        let handle = api()?.open(storage, passphrase)?;
        *out_handle = handle.as_raw();
        Ok(())
    })
}

#[no_mangle]
pub extern "C" fn wallet_close(handle: u64) -> i32 {
    ffi_call("wallet_close", || api()?.close(WalletHandle::from_raw(handle)))
}

/// # Safety
/// `passphrase` must be a valid NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn wallet_change_passphrase(handle: u64, passphrase: *const c_char) -> i32 {
    ffi_call("wallet_change_passphrase", || {
        let passphrase = c_str(passphrase, "passphrase")?;
        api()?.change_passphrase(WalletHandle::from_raw(handle), passphrase)
    })
}

/// # Safety
/// `out` must point to writable memory.
#[no_mangle]
pub unsafe extern "C" fn wallet_get_system_state(handle: u64, out: *mut FfiSystemState) -> i32 {
    ffi_call("wallet_get_system_state", || {
        out_ptr(out, "out")?;
        let state = api()?.get_system_state(WalletHandle::from_raw(handle))?;
        *out = FfiSystemState {
            height: state.height,
            hash: state.hash,
        };
        Ok(())
    })
}

/// Writes a JSON array of utxos. Free the string with [`free_string`].
///
/// # Safety
/// `out_json` must point to writable memory.
#[no_mangle]
pub unsafe extern "C" fn wallet_get_utxos_json(handle: u64, out_json: *mut *mut c_char) -> i32 {
    ffi_call("wallet_get_utxos_json", || {
        out_ptr(out_json, "out_json")?;
        let utxos = api()?.get_utxos(WalletHandle::from_raw(handle))?;
        *out_json = to_c_string(to_json(&utxos)?)?;
        Ok(())
    })
}

/// Writes a JSON array of transactions, newest first.
///
/// # Safety
/// `out_json` must point to writable memory.
#[no_mangle]
pub unsafe extern "C" fn wallet_get_tx_history_json(handle: u64, out_json: *mut *mut c_char) -> i32 {
    ffi_call("wallet_get_tx_history_json", || {
        out_ptr(out_json, "out_json")?;
        let history = api()?.get_tx_history(WalletHandle::from_raw(handle))?;
        *out_json = to_c_string(to_json(&history)?)?;
        Ok(())
    })
}

/// # Safety
/// `out` must point to writable memory.
#[no_mangle]
pub unsafe extern "C" fn wallet_get_available_balance(handle: u64, out: *mut u64) -> i32 {
    ffi_call("wallet_get_available_balance", || {
        out_ptr(out, "out")?;
        *out = api()?.get_available_balance(WalletHandle::from_raw(handle))?;
        Ok(())
    })
}

/// # Safety
/// `out` must point to writable memory.
#[no_mangle]
pub unsafe extern "C" fn wallet_get_status(handle: u64, out: *mut FfiWalletStatus) -> i32 {
    ffi_call("wallet_get_status", || {
        out_ptr(out, "out")?;
        *out = api()?.get_wallet_status(WalletHandle::from_raw(handle))?.into();
        Ok(())
    })
}

/// Starts sync against `node_addr`. The listener table is copied; a null
/// `listener` detaches any previous one.
///
/// # Safety
/// `node_addr` must be a valid NUL-terminated string. `listener` must be
/// null or point to a valid [`FfiListener`] whose callbacks and `user_data`
/// stay usable until the session is closed or the listener replaced.
#[no_mangle]
pub unsafe extern "C" fn wallet_run(
    handle: u64,
    node_addr: *const c_char,
    listener: *const FfiListener,
) -> i32 {
    ffi_call("wallet_run", || {
        let node_addr = c_str(node_addr, "node_addr")?;
        let listener: Option<Arc<dyn WalletListener>> = if listener.is_null() {
            None
        } else {
            Some(Arc::new(CListener(*listener)))
        };
        api()?.run(WalletHandle::from_raw(handle), node_addr, listener)
    })
}

/// Records a payment and writes its hex transaction id to `out_tx_id`.
///
/// # Safety
/// `receiver_hex` must be a valid NUL-terminated string and `out_tx_id`
/// must point to writable memory.
#[no_mangle]
pub unsafe extern "C" fn wallet_send_payment(
    handle: u64,
    receiver_hex: *const c_char,
    amount: u64,
    fee: u64,
    out_tx_id: *mut *mut c_char,
) -> i32 {
    ffi_call("wallet_send_payment", || {
        out_ptr(out_tx_id, "out_tx_id")?;
        let receiver = c_str(receiver_hex, "receiver_hex")?;
        let tx_id = api()?.send_payment(WalletHandle::from_raw(handle), receiver, amount, fee)?;
        *out_tx_id = to_c_string(hex::encode(tx_id))?;
        Ok(())
    })
}

/// Message of the last failed call on this thread, or null. Free the
/// result with [`free_string`].
#[no_mangle]
pub extern "C" fn wallet_last_error() -> *mut c_char {
    LAST_ERROR.with(|e| match e.borrow().as_ref() {
        Some(msg) => CString::new(msg.replace('\0', " "))
            .map(CString::into_raw)
            .unwrap_or(std::ptr::null_mut()),
        None => std::ptr::null_mut(),
    })
}

/// # Safety
/// `ptr` must be null or a string returned by this library, freed once.
#[no_mangle]
pub unsafe extern "C" fn free_string(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }
    drop(CString::from_raw(ptr));
}
