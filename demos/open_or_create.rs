//! Opens the wallet in a directory (creating it first if needed), prints its
//! state, and optionally follows a node for a few seconds.
//!
//! cargo run --example open_or_create -- <dir> <passphrase> [host:port]

use std::sync::Arc;
use std::thread;
use std::time::Duration;
use wallet_bridge::logging::init_logging;
use wallet_bridge::types::split_amount;
use wallet_bridge::{Api, BridgeConfig, Utxo, WalletListener, WalletStatus};

const DEMO_SEED: &str = "hemlock jubilee eden hacksaw boil superior inroads epoxy exhale orders";
const UNIT: u64 = 100_000_000;

struct PrintListener;

impl WalletListener for PrintListener {
    fn on_sync_progress(&self, done: u64, total: u64) {
        println!("sync {}/{}", done, total);
    }

    fn on_all_utxo_changed(&self, utxos: &[Utxo]) {
        println!("utxo set changed ({} outputs)", utxos.len());
    }

    fn on_status(&self, status: &WalletStatus) {
        println!("available {} unconfirmed {}", status.available, status.unconfirmed);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let dir = args.next().unwrap_or_else(|| "walletA".to_string());
    let passphrase = args.next().unwrap_or_else(|| "pw1".to_string());
    let node = args.next();

    let config = BridgeConfig::default();
    init_logging(&config.logging);
    let api = Api::new(config)?;

    let handle = if api.is_initialized(&dir) {
        println!("opening wallet in {}", dir);
        api.open(&dir, &passphrase)?
    } else {
        println!("creating wallet in {}", dir);
        api.create(&dir, &passphrase, DEMO_SEED)?
    };
    let session = api.session(handle)?;

    let state = session.get_system_state()?;
    println!("wallet id: {}", hex::encode(session.get_wallet_id()?));
    println!("height {} hash {}", state.height, hex::encode(state.hash));

    let utxos = session.get_utxos()?;
    println!("\n{:>6} {:>18} {:>12} {:>10}", "id", "amount", "status", "maturity");
    for utxo in &utxos {
        let (whole, frac) = split_amount(utxo.amount, UNIT);
        println!(
            "{:>6} {:>9}.{:08} {:>12} {:>10}",
            utxo.id,
            whole,
            frac,
            format!("{:?}", utxo.status),
            utxo.maturity
        );
    }
    let (whole, frac) = split_amount(session.get_available_balance()?, UNIT);
    println!("available: {}.{:08}", whole, frac);

    if let Some(node) = node {
        println!("\nsyncing against {} for 10 seconds", node);
        session.run(&node, Some(Arc::new(PrintListener)))?;
        thread::sleep(Duration::from_secs(10));
        println!("height now {}", session.get_system_state()?.height);
    }

    session.close()?;
    Ok(())
}
