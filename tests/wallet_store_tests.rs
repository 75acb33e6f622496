mod test_helpers;

use std::fs;
use test_helpers::*;
use wallet_bridge::{WalletError, WalletEvent};

#[test]
fn test_change_passphrase() {
    let harness = BridgeHarness::new();
    let storage = harness.storage("rekey");
    let handle = harness.create_wallet("rekey");
    let listener = RecordingListener::new();
    harness.api.set_listener(handle, Some(listener.clone())).unwrap();

    harness.api.change_passphrase(handle, "pw2").unwrap();
    assert!(wait_until(|| listener.count(&WalletEvent::KeychainChanged) == 1));
    assert!(harness.api.verify_passphrase(handle, "pw2").is_ok());
    harness.api.close(handle).unwrap();

    assert_eq!(
        harness.api.open(&storage, TEST_PASSPHRASE).unwrap_err(),
        WalletError::AuthenticationFailed
    );
    assert!(harness.api.open(&storage, "pw2").is_ok());
}

#[test]
fn test_state_survives_reopen() {
    let harness = BridgeHarness::new();
    let storage = harness.storage("persist");
    let handle = harness.create_wallet("persist");
    harness.fund(700);
    harness.sync_to_tip(handle, None);
    let utxos = harness.api.get_utxos(handle).unwrap();
    let state = harness.api.get_system_state(handle).unwrap();
    harness.api.close(handle).unwrap();

    let reopened = harness.api.open(&storage, TEST_PASSPHRASE).unwrap();
    assert_eq!(harness.api.get_utxos(reopened).unwrap(), utxos);
    assert_eq!(harness.api.get_system_state(reopened).unwrap(), state);
    assert_eq!(harness.api.get_available_balance(reopened).unwrap(), 700);
}

#[test]
fn test_no_temp_file_left() {
    let harness = BridgeHarness::new();
    let handle = harness.create_wallet("tmp");
    harness.api.change_passphrase(handle, "pw2").unwrap();
    harness.api.generate_wallet_id(handle).unwrap();

    let names: Vec<String> = fs::read_dir(harness.storage("tmp"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["wallet.db".to_string()]);
}

#[test]
fn test_stale_temp_file_does_not_block_writes() {
    let harness = BridgeHarness::new();
    let handle = harness.create_wallet("stale");
    fs::write(harness.storage("stale").join("wallet.tmp"), b"leftover").unwrap();

    harness.api.change_passphrase(handle, "pw2").unwrap();
    harness.api.close(handle).unwrap();
    assert!(harness.api.open(harness.storage("stale"), "pw2").is_ok());
}

fn create_and_close(harness: &BridgeHarness, name: &str) -> Vec<u8> {
    let handle = harness.create_wallet(name);
    harness.api.close(handle).unwrap();
    fs::read(harness.store_file(name)).unwrap()
}

fn assert_corrupt(harness: &BridgeHarness, name: &str) {
    match harness.api.open(harness.storage(name), TEST_PASSPHRASE) {
        Err(WalletError::StorageCorrupt(_)) => {}
        other => panic!("expected StorageCorrupt, got {:?}", other.map(|_| ())),
    }
    assert!(harness.api.is_initialized(harness.storage(name)));
}

#[test]
fn test_truncated_store() {
    let harness = BridgeHarness::new();
    let bytes = create_and_close(&harness, "truncated");
    fs::write(harness.store_file("truncated"), &bytes[..40]).unwrap();
    assert_corrupt(&harness, "truncated");
}

#[test]
fn test_bad_magic() {
    let harness = BridgeHarness::new();
    let mut bytes = create_and_close(&harness, "magic");
    bytes[0] = b'X';
    fs::write(harness.store_file("magic"), &bytes).unwrap();
    assert_corrupt(&harness, "magic");
}

#[test]
fn test_unsupported_version() {
    let harness = BridgeHarness::new();
    let mut bytes = create_and_close(&harness, "version");
    bytes[4..8].copy_from_slice(&99u32.to_le_bytes());
    fs::write(harness.store_file("version"), &bytes).unwrap();
    assert_corrupt(&harness, "version");
}

#[test]
fn test_tampered_payload() {
    let harness = BridgeHarness::new();
    let mut bytes = create_and_close(&harness, "tampered");
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    fs::write(harness.store_file("tampered"), &bytes).unwrap();
    assert_corrupt(&harness, "tampered");
}

#[test]
fn test_tampered_payload_with_wrong_passphrase() {
    let harness = BridgeHarness::new();
    let mut bytes = create_and_close(&harness, "both");
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    fs::write(harness.store_file("both"), &bytes).unwrap();
    assert_eq!(
        harness.api.open(harness.storage("both"), "wrong").unwrap_err(),
        WalletError::AuthenticationFailed
    );
}

#[test]
fn test_two_sessions_on_one_store_write_safely() {
    let harness = BridgeHarness::new();
    let first = harness.create_wallet("shared");
    let second = harness.api.open(harness.storage("shared"), TEST_PASSPHRASE).unwrap();

    std::thread::scope(|scope| {
        for handle in [first, second] {
            let api = &harness.api;
            scope.spawn(move || {
                for _ in 0..20 {
                    api.generate_wallet_id(handle).unwrap();
                }
            });
        }
    });

    let names: Vec<String> = fs::read_dir(harness.storage("shared"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["wallet.db".to_string()]);
    harness.api.close(first).unwrap();
    harness.api.close(second).unwrap();
    assert!(harness.api.open(harness.storage("shared"), TEST_PASSPHRASE).is_ok());
}
