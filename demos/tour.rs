//! Walks through every bridge operation against a connected device.
//!
//! Pick the transport with `LEDGER_TRANSPORT` (`hid` or `tcp:HOST:PORT`).

use ledger_evm::{LedgerEvm, TransactionRequest, TransportType, U256};

fn main() {
    let transport = TransportType::from_env().unwrap_or_else(|e| {
        eprintln!("{e}");
        std::process::exit(1);
    });
    let ledger = LedgerEvm::new(&transport).unwrap_or_else(|e| {
        eprintln!("failed to connect: {e}");
        std::process::exit(1);
    });

    match ledger.get_version() {
        Ok(v) => println!("app version: {v}"),
        Err(e) => eprintln!("version failed: {e}"),
    }

    match ledger.get_address(0, 0) {
        Ok(addr) => println!("address m/44'/60'/0'/0/0: {addr}"),
        Err(e) => eprintln!("address failed: {e}"),
    }

    match ledger.list_addresses(0, 0, 5) {
        Ok(addrs) => {
            for (i, addr) in addrs.iter().enumerate() {
                println!("  [{i}] {addr}");
            }
        }
        Err(e) => eprintln!("listing failed: {e}"),
    }

    match ledger.get_public_key(0, 0) {
        Ok(xpub) => println!("public key: {xpub}"),
        Err(e) => eprintln!("public key failed: {e}"),
    }

    let tx = TransactionRequest {
        nonce: 0,
        gas_price: 20_000_000_000,
        gas_limit: 21_000,
        recipient: vec![0x35; 20],
        value: U256::exp10(16),
        payload: Vec::new(),
        chain_id: Some(1),
    };
    println!("confirm the transaction on the device...");
    match ledger.sign_transaction(0, 0, &tx) {
        Ok(signed) => {
            println!("raw tx: 0x{}", hex::encode(signed.raw()));
            println!("tx hash: 0x{}", hex::encode(signed.hash()));
        }
        Err(e) if e.is_user_rejected() => eprintln!("rejected on device"),
        Err(e) => eprintln!("signing failed: {e}"),
    }

    if let Err(e) = ledger.close() {
        eprintln!("close failed: {e}");
    }
}
