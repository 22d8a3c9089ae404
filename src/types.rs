//! Core types: BIP32 derivation paths, app version, address, public key, signature.

use crate::error::LedgerError;
use byteorder::{BigEndian, WriteBytesExt};
use sha3::{Digest, Keccak256};

const HARDENED: u32 = 0x8000_0000;
const PURPOSE: u32 = 44;

/// Coin type used to build `m/44'/coin'/account'/0/index` paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivationScheme {
    pub coin_type: u32,
}

impl DerivationScheme {
    pub const ETHEREUM: Self = Self { coin_type: 60 };
    pub const TESTNET: Self = Self { coin_type: 1 };
}

impl Default for DerivationScheme {
    fn default() -> Self {
        Self::ETHEREUM
    }
}

/// BIP32 derivation path.
///
/// Purpose, coin type and account are hardened; change and address
/// index are not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bip32Path(Vec<u32>);

impl Bip32Path {
    /// Components are taken as-is (hardened bit included).
    pub fn new(components: Vec<u32>) -> Result<Self, LedgerError> {
        let path = Self(components);
        path.validate()?;
        Ok(path)
    }

    /// `m/44'/coin'/account'/0/index`
    pub fn evm(scheme: DerivationScheme, account: u32, index: u32) -> Result<Self, LedgerError> {
        if scheme.coin_type >= HARDENED {
            return Err(LedgerError::InvalidPath(format!(
                "coin type {} out of range",
                scheme.coin_type
            )));
        }
        if account >= HARDENED {
            return Err(LedgerError::InvalidPath(format!(
                "account {account} out of range (max {})",
                HARDENED - 1
            )));
        }
        if index >= HARDENED {
            return Err(LedgerError::InvalidPath(format!(
                "address index {index} out of range (max {})",
                HARDENED - 1
            )));
        }
        Ok(Self(vec![
            PURPOSE | HARDENED,
            scheme.coin_type | HARDENED,
            account | HARDENED,
            0,
            index,
        ]))
    }

    /// Wire format: `[n: u8][path[0]: u32 BE]...[path[n-1]: u32 BE]`
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + self.0.len() * 4);
        buf.push(self.0.len() as u8);
        for &component in &self.0 {
            // writes into a Vec can't fail
            let _ = buf.write_u32::<BigEndian>(component);
        }
        buf
    }

    fn validate(&self) -> Result<(), LedgerError> {
        if self.0.len() < 2 || self.0.len() > 10 {
            return Err(LedgerError::InvalidPath(
                "path must have between 2 and 10 components".into(),
            ));
        }
        if self.0[0] != (PURPOSE | HARDENED) {
            return Err(LedgerError::InvalidPath(
                "first component must be 44'".into(),
            ));
        }
        if self.0[1] & HARDENED == 0 {
            return Err(LedgerError::InvalidPath(
                "coin type must be hardened".into(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Display for Bip32Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "m")?;
        for &c in &self.0 {
            let val = c & !HARDENED;
            let h = if c & HARDENED != 0 { "'" } else { "" };
            write!(f, "/{val}{h}")?;
        }
        Ok(())
    }
}

/// Flags byte reported alongside the app version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AppFlags(u8);

impl AppFlags {
    const ARBITRARY_DATA: u8 = 0x01;
    const EXTERNAL_TOKEN_INFO: u8 = 0x02;
    const DEVELOPMENT: u8 = 0x80;

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    /// Contract data (blind signing) is allowed in the app settings.
    pub fn arbitrary_data_enabled(self) -> bool {
        self.0 & Self::ARBITRARY_DATA != 0
    }

    pub fn external_token_info(self) -> bool {
        self.0 & Self::EXTERNAL_TOKEN_INFO != 0
    }

    /// Development build of the app (not installed from the Ledger store).
    pub fn is_development(self) -> bool {
        self.0 & Self::DEVELOPMENT != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
    pub flags: AppFlags,
}

impl std::fmt::Display for DeviceVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.flags.is_development() {
            write!(f, " (dev)")?;
        }
        Ok(())
    }
}

/// Name and version of the app currently open, as the dashboard reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInfo {
    pub name: String,
    pub version: String,
    pub flags: Vec<u8>,
}

impl std::fmt::Display for AppInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

pub const ADDRESS_LEN: usize = 20;

/// 20-byte account address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    /// EIP-55 mixed-case checksum encoding, `0x`-prefixed.
    pub fn to_checksum(&self) -> String {
        let lower = hex::encode(self.0);
        let hash = Keccak256::digest(lower.as_bytes());
        let mut out = String::with_capacity(2 + lower.len());
        out.push_str("0x");
        for (i, ch) in lower.chars().enumerate() {
            let nibble = (hash[i / 2] >> (4 * (1 - i % 2))) & 0x0F;
            if ch.is_ascii_alphabetic() && nibble >= 8 {
                out.push(ch.to_ascii_uppercase());
            } else {
                out.push(ch);
            }
        }
        out
    }
}

impl TryFrom<&[u8]> for Address {
    type Error = LedgerError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let arr: [u8; ADDRESS_LEN] = bytes.try_into().map_err(|_| {
            LedgerError::InvalidTransactionField(format!(
                "address must be {ADDRESS_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

/// Public key plus BIP32 chain code for a derivation path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedPublicKey {
    /// Uncompressed SEC1 point (`0x04 || X || Y`).
    pub public_key: Vec<u8>,
    pub chain_code: [u8; 32],
}

impl std::fmt::Display for ExtendedPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(&self.public_key))
    }
}

/// Recoverable ECDSA signature with the on-chain `v`.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature {
    pub v: u64,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

impl Signature {
    /// Recovery id (`0` or `1`) folded into `v`.
    pub fn parity(&self, chain_id: Option<u64>) -> Option<u8> {
        let base = match chain_id {
            Some(id) => id.checked_mul(2)?.checked_add(35)?,
            None => 27,
        };
        match self.v.checked_sub(base)? {
            p @ (0 | 1) => Some(p as u8),
            _ => None,
        }
    }
}

// r and s stay out of debug output
impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signature")
            .field("v", &self.v)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ethereum_path() {
        let path = Bip32Path::evm(DerivationScheme::ETHEREUM, 0, 0).unwrap();
        let bytes = path.serialize();
        assert_eq!(bytes[0], 5);
        assert_eq!(&bytes[1..5], &[0x80, 0x00, 0x00, 0x2C]);
        assert_eq!(&bytes[5..9], &[0x80, 0x00, 0x00, 0x3C]);
        assert_eq!(&bytes[9..13], &[0x80, 0x00, 0x00, 0x00]);
        assert_eq!(&bytes[13..17], &[0x00, 0x00, 0x00, 0x00]);
        assert_eq!(&bytes[17..21], &[0x00, 0x00, 0x00, 0x00]);
        assert_eq!(path.to_string(), "m/44'/60'/0'/0/0");
    }

    #[test]
    fn testnet_path() {
        let path = Bip32Path::evm(DerivationScheme::TESTNET, 2, 7).unwrap();
        let bytes = path.serialize();
        assert_eq!(&bytes[5..9], &[0x80, 0x00, 0x00, 0x01]);
        assert_eq!(&bytes[17..21], &[0x00, 0x00, 0x00, 0x07]);
        assert_eq!(path.to_string(), "m/44'/1'/2'/0/7");
    }

    #[test]
    fn encoding_is_deterministic() {
        let a = Bip32Path::evm(DerivationScheme::ETHEREUM, 3, 99).unwrap();
        let b = Bip32Path::evm(DerivationScheme::ETHEREUM, 3, 99).unwrap();
        assert_eq!(a.serialize(), b.serialize());
    }

    #[test]
    fn serialization_length() {
        let path = Bip32Path::evm(DerivationScheme::ETHEREUM, 0, 0).unwrap();
        assert_eq!(path.serialize().len(), 1 + 5 * 4);
    }

    #[test]
    fn indices_with_hardened_bit_rejected() {
        let scheme = DerivationScheme::ETHEREUM;
        assert!(Bip32Path::evm(scheme, HARDENED, 0).is_err());
        assert!(Bip32Path::evm(scheme, 0, HARDENED).is_err());
        assert!(Bip32Path::evm(scheme, HARDENED - 1, HARDENED - 1).is_ok());
    }

    #[test]
    fn explicit_path_validation() {
        assert!(Bip32Path::new(vec![44 | HARDENED, 60 | HARDENED, HARDENED]).is_ok());
        assert!(Bip32Path::new(vec![44 | HARDENED]).is_err());
        assert!(Bip32Path::new(vec![49 | HARDENED, 60 | HARDENED]).is_err());
        assert!(Bip32Path::new(vec![44 | HARDENED, 60]).is_err());
    }

    #[test]
    fn app_flags() {
        let flags = AppFlags::from_bits(0x81);
        assert!(flags.is_development());
        assert!(flags.arbitrary_data_enabled());
        assert!(!flags.external_token_info());
        assert!(!AppFlags::default().is_development());
    }

    #[test]
    fn eip55_checksum() {
        let bytes = hex::decode("5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap();
        let addr = Address::try_from(bytes.as_slice()).unwrap();
        assert_eq!(
            addr.to_string(),
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
    }

    #[test]
    fn address_length_checked() {
        assert!(Address::try_from(&[0u8; 19][..]).is_err());
        assert!(Address::try_from(&[0u8; 21][..]).is_err());
    }

    #[test]
    fn signature_parity() {
        let sig = Signature {
            v: 28,
            r: [0; 32],
            s: [0; 32],
        };
        assert_eq!(sig.parity(None), Some(1));

        let sig = Signature {
            v: 2 * 137 + 36,
            r: [0; 32],
            s: [0; 32],
        };
        assert_eq!(sig.parity(Some(137)), Some(1));
        assert_eq!(sig.parity(Some(1)), None);
    }

    #[test]
    fn signature_debug_hides_components() {
        let sig = Signature {
            v: 27,
            r: [0xAB; 32],
            s: [0xCD; 32],
        };
        let dbg = format!("{sig:?}");
        assert!(!dbg.contains("171"));
        assert!(dbg.contains("27"));
    }
}
