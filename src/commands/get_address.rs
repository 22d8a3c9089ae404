use crate::apdu::{ApduCommand, Instruction};
use crate::error::LedgerError;
use crate::transport::Transport;
use crate::types::{Address, Bip32Path, ADDRESS_LEN};

const P1_SILENT: u8 = 0x00;
const P1_CONFIRM: u8 = 0x01;

/// Response: `[pubkey_len][pubkey][address_len][address as ASCII hex]`
///
/// With `confirm` the device shows the address and blocks until the user
/// approves or rejects it.
pub fn exec(
    transport: &mut dyn Transport,
    path: &Bip32Path,
    confirm: bool,
) -> Result<Address, LedgerError> {
    let p1 = if confirm { P1_CONFIRM } else { P1_SILENT };
    let cmd = ApduCommand::with_data(Instruction::GetAddress, path.serialize())?.with_p1(p1);
    let result = super::exchange(transport, &cmd)?;
    parse_address_response(&result)
}

pub(crate) fn parse_address_response(data: &[u8]) -> Result<Address, LedgerError> {
    let (_pubkey, next) = super::read_length_prefixed(data, 0, "public key")?;
    let (addr, _) = super::read_length_prefixed(data, next, "address")?;

    match addr.len() {
        // 40 hex chars, optionally with an 0x prefix
        40 | 42 => {
            let text = std::str::from_utf8(addr)
                .map_err(|_| LedgerError::MalformedResponse("address is not ASCII".into()))?;
            let text = text.strip_prefix("0x").unwrap_or(text);
            let bytes = hex::decode(text)
                .map_err(|e| LedgerError::MalformedResponse(format!("address is not hex: {e}")))?;
            address_from_bytes(&bytes)
        }
        ADDRESS_LEN => address_from_bytes(addr),
        other => Err(LedgerError::MalformedResponse(format!(
            "unexpected address length: {other}"
        ))),
    }
}

fn address_from_bytes(bytes: &[u8]) -> Result<Address, LedgerError> {
    let arr: [u8; ADDRESS_LEN] = bytes.try_into().map_err(|_| {
        LedgerError::MalformedResponse(format!("address decodes to {} bytes", bytes.len()))
    })?;
    Ok(Address(arr))
}
