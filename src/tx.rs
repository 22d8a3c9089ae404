//! Transaction encoding for signing.
//!
//! Requests are RLP-encoded in the legacy layout, with EIP-155 replay
//! protection when a chain id is set. The device signs the Keccak-256 of
//! that encoding and returns `[v][r][s]`, which [`TransactionRequest::attach_signature`]
//! folds back into a broadcastable transaction.

use ethereum_types::{H160, U256};
use rlp::{DecoderError, Rlp, RlpStream};
use sha3::{Digest, Keccak256};

use crate::error::LedgerError;
use crate::types::{Signature, ADDRESS_LEN};

/// Device signature layout: `[v: u8][r: 32][s: 32]`
pub const DEVICE_SIGNATURE_LEN: usize = 65;

const LEGACY_V: u64 = 27;
const EIP155_V_OFFSET: u64 = 35;
const SIGNED_FIELDS: usize = 9;

/// A fully specified transfer or contract call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionRequest {
    pub nonce: u64,
    pub gas_price: u64,
    pub gas_limit: u64,
    /// Must be exactly 20 bytes.
    pub recipient: Vec<u8>,
    pub value: U256,
    pub payload: Vec<u8>,
    /// `Some` for EIP-155 signing, `None` for the legacy form.
    pub chain_id: Option<u64>,
}

/// Where a signing call currently is. Reported to the observer passed to
/// [`LedgerEvm::sign_transaction_with`](crate::LedgerEvm::sign_transaction_with).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignState {
    Validating,
    Encoding,
    /// About to send frame `chunk` of `total` (1-based).
    Transmitting { chunk: usize, total: usize },
    /// Last frame sent; the device is waiting on the user.
    AwaitingUserConfirmation,
    Completed,
    Rejected,
    Failed,
}

impl TransactionRequest {
    /// Local checks, run before anything reaches the device.
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.recipient.len() != ADDRESS_LEN {
            return Err(LedgerError::InvalidTransactionField(format!(
                "recipient must be {ADDRESS_LEN} bytes, got {}",
                self.recipient.len()
            )));
        }
        if let Some(id) = self.chain_id {
            if eip155_base(id).is_none() {
                return Err(LedgerError::InvalidTransactionField(format!(
                    "chain id {id} too large"
                )));
            }
        }
        Ok(())
    }

    /// RLP of the unsigned transaction, i.e. the bytes the device hashes.
    pub fn serialize(&self) -> Result<Vec<u8>, LedgerError> {
        self.validate()?;
        let extra = if self.chain_id.is_some() { 3 } else { 0 };
        let mut s = RlpStream::new_list(6 + extra);
        self.append_fields(&mut s);
        if let Some(id) = self.chain_id {
            s.append(&id);
            s.append(&0u64);
            s.append(&0u64);
        }
        Ok(s.out().to_vec())
    }

    /// Keccak-256 of [`serialize`](Self::serialize).
    pub fn signing_hash(&self) -> Result<[u8; 32], LedgerError> {
        Ok(keccak256(&self.serialize()?))
    }

    /// Merge a device signature (`[v][r][s]`) into the signed encoding.
    /// Same inputs always give the same `raw` bytes.
    pub fn attach_signature(&self, signature: &[u8]) -> Result<SignedTransaction, LedgerError> {
        self.validate()?;
        let signature = parse_device_signature(signature, self.chain_id)?;

        let mut s = RlpStream::new_list(SIGNED_FIELDS);
        self.append_fields(&mut s);
        s.append(&signature.v);
        s.append(&U256::from_big_endian(&signature.r));
        s.append(&U256::from_big_endian(&signature.s));

        Ok(SignedTransaction {
            raw: s.out().to_vec(),
            signature,
        })
    }

    fn append_fields(&self, s: &mut RlpStream) {
        s.append(&self.nonce);
        s.append(&self.gas_price);
        s.append(&self.gas_limit);
        s.append(&H160::from_slice(&self.recipient));
        s.append(&self.value);
        s.append(&self.payload);
    }
}

/// A signed transaction ready for broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    raw: Vec<u8>,
    signature: Signature,
}

impl SignedTransaction {
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Transaction hash as it appears on chain.
    pub fn hash(&self) -> [u8; 32] {
        keccak256(&self.raw)
    }

    /// Split a signed encoding back into the request and its signature.
    pub fn decode(raw: &[u8]) -> Result<(TransactionRequest, Signature), LedgerError> {
        let rlp = Rlp::new(raw);
        if !rlp.is_list() {
            return Err(LedgerError::MalformedResponse(
                "signed transaction is not an RLP list".into(),
            ));
        }
        let count = rlp.item_count().map_err(malformed)?;
        if count != SIGNED_FIELDS {
            return Err(LedgerError::MalformedResponse(format!(
                "signed transaction has {count} fields, expected {SIGNED_FIELDS}"
            )));
        }

        let recipient: H160 = rlp.val_at(3).map_err(malformed)?;
        let v: u64 = rlp.val_at(6).map_err(malformed)?;
        let r: U256 = rlp.val_at(7).map_err(malformed)?;
        let s: U256 = rlp.val_at(8).map_err(malformed)?;

        let chain_id = match v {
            27 | 28 => None,
            v if v >= EIP155_V_OFFSET => Some((v - EIP155_V_OFFSET) / 2),
            v => {
                return Err(LedgerError::MalformedResponse(format!(
                    "invalid signature v: {v}"
                )))
            }
        };

        let tx = TransactionRequest {
            nonce: rlp.val_at(0).map_err(malformed)?,
            gas_price: rlp.val_at(1).map_err(malformed)?,
            gas_limit: rlp.val_at(2).map_err(malformed)?,
            recipient: recipient.as_bytes().to_vec(),
            value: rlp.val_at(4).map_err(malformed)?,
            payload: rlp.val_at(5).map_err(malformed)?,
            chain_id,
        };

        let mut sig = Signature {
            v,
            r: [0u8; 32],
            s: [0u8; 32],
        };
        r.to_big_endian(&mut sig.r);
        s.to_big_endian(&mut sig.s);
        Ok((tx, sig))
    }
}

/// The device only has room for one byte of `v`, so for EIP-155 the
/// parity is recovered from the low byte of `chain_id * 2 + 35`.
pub(crate) fn parse_device_signature(
    data: &[u8],
    chain_id: Option<u64>,
) -> Result<Signature, LedgerError> {
    if data.len() != DEVICE_SIGNATURE_LEN {
        return Err(LedgerError::MalformedResponse(format!(
            "expected {DEVICE_SIGNATURE_LEN}-byte signature, got {} bytes",
            data.len()
        )));
    }

    let v_byte = data[0];
    let v = match chain_id {
        None => match v_byte {
            0 | 1 => LEGACY_V + u64::from(v_byte),
            27 | 28 => u64::from(v_byte),
            other => {
                return Err(LedgerError::MalformedResponse(format!(
                    "invalid legacy signature v: {other}"
                )))
            }
        },
        Some(id) => {
            let base = eip155_base(id).ok_or_else(|| {
                LedgerError::InvalidTransactionField(format!("chain id {id} too large"))
            })?;
            let parity = v_byte.wrapping_sub((base & 0xFF) as u8);
            if parity > 1 {
                return Err(LedgerError::MalformedResponse(format!(
                    "signature v byte {v_byte} does not match chain id {id}"
                )));
            }
            base + u64::from(parity)
        }
    };

    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&data[1..33]);
    s.copy_from_slice(&data[33..65]);
    Ok(Signature { v, r, s })
}

/// `chain_id * 2 + 35`, leaving room for the parity bit.
fn eip155_base(chain_id: u64) -> Option<u64> {
    chain_id
        .checked_mul(2)?
        .checked_add(EIP155_V_OFFSET + 1)
        .map(|v| v - 1)
}

fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

fn malformed(e: DecoderError) -> LedgerError {
    LedgerError::MalformedResponse(format!("signed transaction: {e}"))
}
