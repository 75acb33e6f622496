//! Process-wide async runtime that drives background sync.

use crate::WalletError;
use once_cell::sync::Lazy;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::runtime::{Builder, Handle, Runtime};

static RUNTIME: Lazy<Mutex<Option<Runtime>>> = Lazy::new(|| Mutex::new(None));

fn slot() -> MutexGuard<'static, Option<Runtime>> {
    RUNTIME.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Builds the runtime if it is not running. Calling it again is a no-op.
pub fn initialize() -> Result<(), WalletError> {
    let mut slot = slot();
    if slot.is_some() {
        return Ok(());
    }

    let runtime = Builder::new_multi_thread()
        .enable_all()
        .thread_name("wallet-bridge-worker")
        .build()
        .map_err(|e| WalletError::EngineFault(format!("cannot start runtime: {}", e)))?;
    *slot = Some(runtime);
    tracing::info!("bridge runtime started");
    Ok(())
}

/// Stops the runtime. Background sync of sessions still open ends here.
pub fn shutdown() {
    if let Some(runtime) = slot().take() {
        runtime.shutdown_background();
        tracing::info!("bridge runtime stopped");
    }
}

pub fn handle() -> Result<Handle, WalletError> {
    slot()
        .as_ref()
        .map(|rt| rt.handle().clone())
        .ok_or_else(|| WalletError::EngineFault("bridge runtime is not initialized".to_string()))
}
