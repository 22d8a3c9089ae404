use crate::apdu::{ApduCommand, Instruction};
use crate::error::LedgerError;
use crate::transport::Transport;
use crate::types::{AppFlags, DeviceVersion};

/// Response: `[flags][major][minor][patch]`
pub fn exec(transport: &mut dyn Transport) -> Result<DeviceVersion, LedgerError> {
    let cmd = ApduCommand::new(Instruction::GetVersion);
    let result = super::exchange(transport, &cmd)?;
    parse_version_response(&result)
}

pub(crate) fn parse_version_response(data: &[u8]) -> Result<DeviceVersion, LedgerError> {
    if data.len() < 4 {
        return Err(LedgerError::MalformedResponse(format!(
            "version response too short ({} bytes) - is the app running?",
            data.len()
        )));
    }

    Ok(DeviceVersion {
        flags: AppFlags::from_bits(data[0]),
        major: data[1],
        minor: data[2],
        patch: data[3],
    })
}
