//! Rust client for EVM (account-model) apps on Ledger hardware wallets.
//!
//! Talks to the device over USB HID or TCP (Speculos simulator).
//!
//! # Quick start
//!
//! ```no_run
//! use ledger_evm::{LedgerEvm, TransactionRequest, TransportType, U256};
//!
//! let ledger = LedgerEvm::new(&TransportType::from_env()?)?;
//!
//! let version = ledger.get_version()?;
//! println!("{version}");
//!
//! let address = ledger.get_address(0, 0)?;
//! println!("address: {address}");
//!
//! let tx = TransactionRequest {
//!     nonce: 0,
//!     gas_price: 20_000_000_000,
//!     gas_limit: 21_000,
//!     recipient: vec![0x35; 20],
//!     value: U256::exp10(18),
//!     payload: Vec::new(),
//!     chain_id: Some(1),
//! };
//! let signed = ledger.sign_transaction(0, 0, &tx)?;
//! println!("raw: 0x{}", hex::encode(signed.raw()));
//! # Ok::<(), ledger_evm::LedgerError>(())
//! ```
//!
//! # Modules
//!
//! - [`api`] -- high-level [`LedgerEvm`] facade
//! - [`apdu`] -- command/response frames and payload chunking
//! - [`transport`] -- device communication (USB HID, TCP)
//! - [`tx`] -- transaction encoding ([`TransactionRequest`], [`SignedTransaction`])
//! - [`types`] -- [`Bip32Path`], [`DeviceVersion`], [`Address`], [`ExtendedPublicKey`],
//!   [`Signature`]
//!
//! # Feature flags
//!
//! - `hid` (default) -- USB HID transport for real Ledger devices
//! - `tcp` -- TCP transport for the Speculos simulator

pub mod apdu;
pub mod api;
pub(crate) mod commands;
pub mod error;
pub mod transport;
pub mod tx;
pub mod types;

pub use api::LedgerEvm;
pub use error::{LedgerError, StatusWord, TransportError};
pub use ethereum_types::U256;
pub use transport::{Transport, TransportType};
pub use tx::{SignState, SignedTransaction, TransactionRequest};
pub use types::{
    Address, AppFlags, AppInfo, Bip32Path, DerivationScheme, DeviceVersion, ExtendedPublicKey,
    Signature,
};
