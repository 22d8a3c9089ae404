use crate::apdu::{ApduCommand, DASHBOARD_CLA};
use crate::error::LedgerError;
use crate::transport::Transport;
use crate::types::AppInfo;

const INS_GET_APP_AND_VERSION: u8 = 0x01;

/// Handled by the OS, so it works whichever app is open.
///
/// Response: `[format][name_len][name][version_len][version][flags_len][flags]`
pub fn exec(transport: &mut dyn Transport) -> Result<AppInfo, LedgerError> {
    let cmd = ApduCommand::raw(DASHBOARD_CLA, INS_GET_APP_AND_VERSION);
    let result = super::exchange(transport, &cmd)?;
    parse_app_info(&result)
}

pub(crate) fn parse_app_info(data: &[u8]) -> Result<AppInfo, LedgerError> {
    match data.first() {
        Some(0x01) => {}
        Some(other) => {
            return Err(LedgerError::MalformedResponse(format!(
                "unknown app info format 0x{other:02X}"
            )))
        }
        None => return Err(LedgerError::MalformedResponse("empty app info".into())),
    }

    let (name, next) = super::read_length_prefixed(data, 1, "app name")?;
    let (version, next) = super::read_length_prefixed(data, next, "app version")?;
    // older firmware omits the flags field
    let flags = if next < data.len() {
        super::read_length_prefixed(data, next, "app flags")?.0.to_vec()
    } else {
        Vec::new()
    };

    Ok(AppInfo {
        name: String::from_utf8_lossy(name).to_string(),
        version: String::from_utf8_lossy(version).to_string(),
        flags,
    })
}
