//! High-level API - [`LedgerEvm`] owns a transport session and exposes
//! all supported operations.

use std::ops::ControlFlow;
use std::sync::{Mutex, MutexGuard};

use crate::commands;
use crate::error::{LedgerError, TransportError};
use crate::transport::{self, Transport, TransportType};
use crate::tx::{SignState, SignedTransaction, TransactionRequest};
use crate::types::{
    Address, AppInfo, Bip32Path, DerivationScheme, DeviceVersion, ExtendedPublicKey,
};

const MIN_VERSION: (u8, u8, u8) = (1, 0, 0);

/// High-level interface to an EVM app on a Ledger device.
///
/// Owns exactly one transport session. Calls are serialized: each
/// operation holds the session for its whole duration, so a second
/// caller waits instead of interleaving frames.
pub struct LedgerEvm {
    transport: Mutex<Box<dyn Transport>>,
    scheme: DerivationScheme,
}

impl LedgerEvm {
    /// Connect to a device and check the app is recent enough.
    pub fn new(transport_type: &TransportType) -> Result<Self, LedgerError> {
        let transport = transport::open(transport_type)?;
        let ledger = Self::with_transport(transport);

        let version = ledger.get_version()?;
        if !version_ok(&version) {
            return Err(LedgerError::MalformedResponse(format!(
                "app {version} is too old - update to at least {}.{}.{}",
                MIN_VERSION.0, MIN_VERSION.1, MIN_VERSION.2,
            )));
        }
        log::info!("EVM app {version} ready");

        Ok(ledger)
    }

    /// Useful for testing or injecting a custom transport.
    pub fn with_transport(transport: Box<dyn Transport>) -> Self {
        Self {
            transport: Mutex::new(transport),
            scheme: DerivationScheme::default(),
        }
    }

    /// Coin type used for every derivation path built by this instance.
    #[must_use]
    pub fn with_scheme(mut self, scheme: DerivationScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn scheme(&self) -> DerivationScheme {
        self.scheme
    }

    /// `m/44'/coin'/account'/0/index` for this instance's scheme.
    pub fn path(&self, account: u32, index: u32) -> Result<Bip32Path, LedgerError> {
        Bip32Path::evm(self.scheme, account, index)
    }

    /// Query the app version and flags.
    pub fn get_version(&self) -> Result<DeviceVersion, LedgerError> {
        commands::get_version::exec(self.session()?.as_mut())
    }

    /// Name and version of whichever app is open.
    pub fn app_info(&self) -> Result<AppInfo, LedgerError> {
        commands::app_info::exec(self.session()?.as_mut())
    }

    /// Check whether the device answers the app's version query.
    pub fn is_app_open(&self) -> bool {
        self.get_version().is_ok()
    }

    /// Derive the address for `(account, index)` without showing it.
    pub fn get_address(&self, account: u32, index: u32) -> Result<Address, LedgerError> {
        let path = self.path(account, index)?;
        commands::get_address::exec(self.session()?.as_mut(), &path, false)
    }

    /// Shows the address on device and waits for user confirmation.
    pub fn verify_address(&self, account: u32, index: u32) -> Result<Address, LedgerError> {
        let path = self.path(account, index)?;
        commands::get_address::exec(self.session()?.as_mut(), &path, true)
    }

    /// Addresses `start..start + count` of `account`, in order.
    ///
    /// All or nothing: the first failure aborts the listing and no partial
    /// result is returned.
    pub fn list_addresses(
        &self,
        account: u32,
        start: u32,
        count: u32,
    ) -> Result<Vec<Address>, LedgerError> {
        let Some(last) = count.checked_sub(1) else {
            return Ok(Vec::new());
        };
        let end = start.checked_add(last).ok_or_else(|| {
            LedgerError::InvalidPath(format!("address index {start} + {last} overflows"))
        })?;
        // a valid last index implies every earlier one is valid
        self.path(account, end)?;

        let mut session = self.session()?;
        (start..=end)
            .map(|index| {
                let path = self.path(account, index)?;
                commands::get_address::exec(session.as_mut(), &path, false)
            })
            .collect()
    }

    /// Public key and chain code for `(account, index)`.
    pub fn get_public_key(
        &self,
        account: u32,
        index: u32,
    ) -> Result<ExtendedPublicKey, LedgerError> {
        let path = self.path(account, index)?;
        commands::get_pubkey::exec(self.session()?.as_mut(), &path)
    }

    /// Sign `tx` with the key at `(account, index)`. Blocks until the user
    /// approves or rejects on the device.
    pub fn sign_transaction(
        &self,
        account: u32,
        index: u32,
        tx: &TransactionRequest,
    ) -> Result<SignedTransaction, LedgerError> {
        self.sign_transaction_with(account, index, tx, |_| ControlFlow::Continue(()))
    }

    /// Like [`sign_transaction`](Self::sign_transaction), reporting each
    /// [`SignState`] to `observer`. Returning `Break` stops before the next
    /// frame goes out and yields [`LedgerError::Cancelled`].
    pub fn sign_transaction_with<F>(
        &self,
        account: u32,
        index: u32,
        tx: &TransactionRequest,
        mut observer: F,
    ) -> Result<SignedTransaction, LedgerError>
    where
        F: FnMut(SignState) -> ControlFlow<()>,
    {
        let path = self.path(account, index)?;
        commands::sign_tx::exec(self.session()?.as_mut(), &path, tx, &mut observer)
    }

    /// End the session.
    pub fn close(self) -> Result<(), LedgerError> {
        let mut transport = self
            .transport
            .into_inner()
            .map_err(|e| TransportError::Comm(format!("mutex poisoned: {e}")))?;
        transport.close()?;
        Ok(())
    }

    fn session(&self) -> Result<MutexGuard<'_, Box<dyn Transport>>, LedgerError> {
        self.transport
            .lock()
            .map_err(|e| {
                LedgerError::Transport(TransportError::Comm(format!("mutex poisoned: {e}")))
            })
    }
}

fn version_ok(v: &DeviceVersion) -> bool {
    (v.major, v.minor, v.patch) >= MIN_VERSION
}
