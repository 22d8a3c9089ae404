//! Error types and Ledger status word mapping.

use thiserror::Error;

/// Status words returned by the device in the last two bytes of every
/// response. Codes outside the known set are kept verbatim in
/// [`StatusWord::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusWord {
    Ok,
    DeviceLocked,
    WrongLength,
    SecurityStatus,
    UserRejected,
    WrongParameters,
    WrongP1P2,
    InsNotSupported,
    ClaNotSupported,
    AppNotOpen,
    Unknown(u16),
}

impl StatusWord {
    pub fn from_code(code: u16) -> Self {
        match code {
            0x9000 => Self::Ok,
            0x5515 => Self::DeviceLocked,
            0x6700 => Self::WrongLength,
            0x6982 => Self::SecurityStatus,
            0x6985 => Self::UserRejected,
            0x6A80 => Self::WrongParameters,
            0x6B00 => Self::WrongP1P2,
            0x6D00 => Self::InsNotSupported,
            0x6E00 => Self::ClaNotSupported,
            0x6E01 => Self::AppNotOpen,
            other => Self::Unknown(other),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            Self::Ok => 0x9000,
            Self::DeviceLocked => 0x5515,
            Self::WrongLength => 0x6700,
            Self::SecurityStatus => 0x6982,
            Self::UserRejected => 0x6985,
            Self::WrongParameters => 0x6A80,
            Self::WrongP1P2 => 0x6B00,
            Self::InsNotSupported => 0x6D00,
            Self::ClaNotSupported => 0x6E00,
            Self::AppNotOpen => 0x6E01,
            Self::Unknown(code) => code,
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Ok
    }

    fn describe(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::DeviceLocked => "device is locked or asleep - unlock it and open the app",
            Self::WrongLength => "wrong data length",
            Self::SecurityStatus => "security status not satisfied",
            Self::UserRejected => "user rejected the request on device",
            Self::WrongParameters => "wrong parameters",
            Self::WrongP1P2 => "wrong P1/P2",
            Self::InsNotSupported => "instruction not supported - is the right app open?",
            Self::ClaNotSupported => "wrong app open on device",
            Self::AppNotOpen => "app is not open - open it and try again",
            Self::Unknown(_) => "unknown",
        }
    }
}

impl std::fmt::Display for StatusWord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:04X} ({})", self.code(), self.describe())
    }
}

/// Errors returned by the library.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("device returned status {0}")]
    Device(StatusWord),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("invalid transaction field: {0}")]
    InvalidTransactionField(String),

    #[error("invalid BIP32 path: {0}")]
    InvalidPath(String),

    #[error("APDU data too long: {0} bytes (max 255)")]
    FrameTooLarge(usize),

    #[error("signing cancelled before the next frame was sent")]
    Cancelled,
}

impl LedgerError {
    /// Raw status code when the device rejected the request.
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Device(sw) => Some(sw.code()),
            _ => None,
        }
    }

    pub fn is_user_rejected(&self) -> bool {
        matches!(self, Self::Device(StatusWord::UserRejected))
    }
}

/// Transport-level errors (USB, TCP, IO).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no Ledger device found - is it plugged in?")]
    DeviceNotFound,

    #[error("communication error: {0}")]
    Comm(String),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("device timed out after {0}ms")]
    Timeout(u32),

    #[error("transport session is closed")]
    Closed,

    #[error("invalid transport configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
