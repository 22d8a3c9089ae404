//! Integration tests: requires a running Speculos instance with an EVM app:
//!
//! ```sh
//! speculos --model nanosp /path/to/app-ethereum.elf
//! ```
//!
//! Then: `cargo test --features tcp -- --ignored`

#![cfg(feature = "tcp")]

use ledger_evm::{LedgerEvm, TransportType};

fn connect() -> LedgerEvm {
    let host = std::env::var("LEDGER_TCP_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let transport = TransportType::TCP(host, 9999);
    LedgerEvm::new(&transport).expect("failed to connect to Speculos, is it running?")
}

#[test]
#[ignore = "requires Speculos"]
fn get_version() {
    let ledger = connect();
    let version = ledger.get_version().unwrap();
    assert!(version.major >= 1);
}

#[test]
#[ignore = "requires Speculos"]
fn is_app_open() {
    let ledger = connect();
    assert!(ledger.is_app_open());
}

#[test]
#[ignore = "requires Speculos"]
fn different_indices_differ() {
    let ledger = connect();
    let a = ledger.get_address(0, 0).unwrap();
    let b = ledger.get_address(0, 1).unwrap();
    assert_ne!(a, b);
}

#[test]
#[ignore = "requires Speculos"]
fn address_is_deterministic() {
    let ledger = connect();
    assert_eq!(
        ledger.get_address(0, 0).unwrap(),
        ledger.get_address(0, 0).unwrap()
    );
}

#[test]
#[ignore = "requires Speculos"]
fn list_matches_single_calls() {
    let ledger = connect();
    let listed = ledger.list_addresses(0, 0, 3).unwrap();
    for (i, addr) in listed.iter().enumerate() {
        assert_eq!(addr, &ledger.get_address(0, i as u32).unwrap());
    }
}

#[test]
#[ignore = "requires Speculos"]
fn public_key_is_uncompressed() {
    let ledger = connect();
    let xpub = ledger.get_public_key(0, 0).unwrap();
    assert_eq!(xpub.public_key.len(), 65);
    assert_eq!(xpub.public_key[0], 0x04);
    // all zeros means derivation failed
    assert!(xpub.chain_code.iter().any(|&b| b != 0));
}
