//! Individual command implementations.
//!
//! You probably want [`LedgerEvm`](crate::api::LedgerEvm) instead.

pub mod app_info;
pub mod get_address;
pub mod get_pubkey;
pub mod get_version;
pub mod sign_tx;

use crate::apdu::{ApduAnswer, ApduCommand};
use crate::error::LedgerError;
use crate::transport::Transport;

/// One request/response round trip. Returns the payload on `0x9000`,
/// [`LedgerError::Device`] otherwise. Never retries.
///
/// Only lengths and status words are logged, never payload bytes.
pub(crate) fn exchange(
    transport: &mut dyn Transport,
    cmd: &ApduCommand,
) -> Result<Vec<u8>, LedgerError> {
    log::debug!(
        "-> cla=0x{:02X} ins=0x{:02X} p1=0x{:02X} p2=0x{:02X} lc={}",
        cmd.cla,
        cmd.ins,
        cmd.p1,
        cmd.p2,
        cmd.data().len()
    );
    let raw = transport.exchange(&cmd.serialize())?;
    let answer = ApduAnswer::from_raw(raw)?;
    let status = answer.status();
    log::debug!("<- sw={status} len={}", answer.data().len());
    if !status.is_success() {
        log::warn!("device rejected ins=0x{:02X}: {status}", cmd.ins);
    }
    answer.into_payload()
}

/// Reads a `[len][bytes]` field at `offset`, returning it and the next offset.
pub(crate) fn read_length_prefixed<'a>(
    data: &'a [u8],
    offset: usize,
    what: &str,
) -> Result<(&'a [u8], usize), LedgerError> {
    let len = *data
        .get(offset)
        .ok_or_else(|| LedgerError::MalformedResponse(format!("missing {what} length")))?
        as usize;
    let start = offset + 1;
    let field = data.get(start..start + len).ok_or_else(|| {
        LedgerError::MalformedResponse(format!(
            "{what} truncated: need {len} bytes, have {}",
            data.len().saturating_sub(start)
        ))
    })?;
    Ok((field, start + len))
}
