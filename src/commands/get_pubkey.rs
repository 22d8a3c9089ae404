use crate::apdu::{ApduCommand, Instruction};
use crate::error::LedgerError;
use crate::transport::Transport;
use crate::types::{Bip32Path, ExtendedPublicKey};

const UNCOMPRESSED_KEY_LEN: usize = 65;
const CHAIN_CODE_LEN: usize = 32;

/// Response: `[pubkey_len][pubkey (65)][chain_code (32)]`
pub fn exec(
    transport: &mut dyn Transport,
    path: &Bip32Path,
) -> Result<ExtendedPublicKey, LedgerError> {
    let cmd = ApduCommand::with_data(Instruction::GetPublicKey, path.serialize())?;
    let result = super::exchange(transport, &cmd)?;
    parse_pubkey_response(&result)
}

pub(crate) fn parse_pubkey_response(data: &[u8]) -> Result<ExtendedPublicKey, LedgerError> {
    let (pubkey, next) = super::read_length_prefixed(data, 0, "public key")?;
    if pubkey.len() != UNCOMPRESSED_KEY_LEN || pubkey[0] != 0x04 {
        return Err(LedgerError::MalformedResponse(format!(
            "expected {UNCOMPRESSED_KEY_LEN}-byte uncompressed key, got {} bytes",
            pubkey.len()
        )));
    }

    let chain_code: [u8; CHAIN_CODE_LEN] = data
        .get(next..next + CHAIN_CODE_LEN)
        .and_then(|c| c.try_into().ok())
        .ok_or_else(|| {
            LedgerError::MalformedResponse(format!(
                "chain code truncated: have {} bytes",
                data.len().saturating_sub(next)
            ))
        })?;

    Ok(ExtendedPublicKey {
        public_key: pubkey.to_vec(),
        chain_code,
    })
}
