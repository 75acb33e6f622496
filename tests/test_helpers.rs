//! Test helpers for deterministic testing with a scripted node.
#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use wallet_bridge::mock_node::{mock_hash, MockChain, MockConnector};
use wallet_bridge::node_client::IncomingOutput;
use wallet_bridge::{
    Api, FileEngineProvider, KdfParams, KeyType, StoreConfig, SyncConfig, Utxo, WalletEvent,
    WalletHandle, WalletListener, WalletStatus,
};

pub const TEST_SEED: &str = "seedXYZ alpha bravo charlie";
pub const TEST_PASSPHRASE: &str = "pw1";
/// Any well-formed address works with the scripted connector.
pub const MOCK_NODE: &str = "127.0.0.1:10000";

pub fn fast_store_config() -> StoreConfig {
    StoreConfig {
        kdf: KdfParams::insecure_for_tests(),
        ..StoreConfig::default()
    }
}

pub fn fast_sync_config() -> SyncConfig {
    SyncConfig {
        poll_interval_ms: 20,
        connect_timeout_ms: 2_000,
        reconnect_attempts: 3,
        reconnect_initial_delay_ms: 10,
        reconnect_max_delay_ms: 50,
    }
}

/// An [`Api`] over temp-dir stores and a shared [`MockChain`].
pub struct BridgeHarness {
    pub api: Api,
    pub chain: MockChain,
    pub connector: MockConnector,
    pub temp_dir: TempDir,
}

impl BridgeHarness {
    pub fn new() -> Self {
        let chain = MockChain::new();
        let connector = MockConnector::new(chain.clone());
        let api = build_api(connector.clone());
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        Self {
            api,
            chain,
            connector,
            temp_dir,
        }
    }

    pub fn storage(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    pub fn store_file(&self, name: &str) -> PathBuf {
        self.storage(name).join("wallet.db")
    }

    pub fn create_wallet(&self, name: &str) -> WalletHandle {
        self.api
            .create(self.storage(name), TEST_PASSPHRASE, TEST_SEED)
            .expect("wallet creation failed")
    }

    /// Appends a block paying `amount` to the wallet, spendable at once.
    pub fn fund(&self, amount: u64) -> u64 {
        self.chain.push_block_with_outputs(vec![IncomingOutput {
            amount,
            key_type: KeyType::Regular,
            maturity: 0,
            tx_id: None,
        }])
    }

    /// Runs sync with `listener` and waits until the wallet reaches the tip.
    pub fn sync_to_tip(&self, handle: WalletHandle, listener: Option<Arc<dyn WalletListener>>) {
        self.api.run(handle, MOCK_NODE, listener).expect("run failed");
        let tip = self.chain.height();
        assert!(
            wait_until(|| self.api.get_system_state(handle).unwrap().height == tip),
            "wallet did not reach height {}",
            tip
        );
    }
}

pub fn build_api(connector: MockConnector) -> Api {
    let provider = FileEngineProvider::new(fast_store_config()).with_connector(Arc::new(connector));
    Api::with_provider(Box::new(provider))
        .expect("bridge startup failed")
        .with_sync_config(fast_sync_config())
}

/// Polls `condition` for up to five seconds.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// Listener that keeps every event it sees.
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<WalletEvent>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, event: WalletEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<WalletEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn progress(&self) -> Vec<(u64, u64)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                WalletEvent::SyncProgress { done, total } => Some((done, total)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, event: &WalletEvent) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    pub fn last_status(&self) -> Option<WalletStatus> {
        self.events().into_iter().rev().find_map(|e| match e {
            WalletEvent::Status(status) => Some(status),
            _ => None,
        })
    }
}

impl WalletListener for RecordingListener {
    fn on_sync_progress(&self, done: u64, total: u64) {
        self.push(WalletEvent::SyncProgress { done, total });
    }

    fn on_system_state_changed(&self) {
        self.push(WalletEvent::SystemStateChanged);
    }

    fn on_keychain_changed(&self) {
        self.push(WalletEvent::KeychainChanged);
    }

    fn on_transaction_changed(&self) {
        self.push(WalletEvent::TransactionChanged);
    }

    fn on_tx_peer_changed(&self) {
        self.push(WalletEvent::TxPeerChanged);
    }

    fn on_address_changed(&self) {
        self.push(WalletEvent::AddressChanged);
    }

    fn on_all_utxo_changed(&self, utxos: &[Utxo]) {
        self.push(WalletEvent::AllUtxoChanged(utxos.to_vec()));
    }

    fn on_status(&self, status: &WalletStatus) {
        self.push(WalletEvent::Status(*status));
    }
}

/// Serves the newline-delimited JSON node protocol for a chain of `height`
/// empty blocks. Every accepted connection gets its own thread.
pub fn spawn_line_node(height: u64) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind failed");
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else { break };
            thread::spawn(move || {
                let mut writer = stream.try_clone().unwrap();
                let reader = BufReader::new(stream);
                for line in reader.lines() {
                    let Ok(line) = line else { break };
                    let request: Value = serde_json::from_str(&line).unwrap();
                    let reply = match request["method"].as_str() {
                        Some("get_tip") => json!({
                            "tip": { "height": height, "hash": hex::encode(mock_hash(height)) }
                        }),
                        Some("get_block") => {
                            let h = request["height"].as_u64().unwrap();
                            if h >= 1 && h <= height {
                                json!({ "block": { "height": h, "hash": hex::encode(mock_hash(h)) } })
                            } else {
                                json!({ "error": format!("no block {}", h) })
                            }
                        }
                        Some("submit") => json!({ "submitted": true }),
                        _ => json!({ "error": "unknown method" }),
                    };
                    if writeln!(writer, "{}", reply).is_err() {
                        break;
                    }
                }
            });
        }
    });

    addr
}
