//! Transport backends for talking to Ledger devices.
//!
//! - [`hid::HidTransport`] -- USB HID for real hardware (feature `hid`, default)
//! - [`tcp::TcpTransport`] -- TCP for the Speculos simulator (feature `tcp`)
//!
//! A transport moves whole APDUs. It knows nothing about instructions or
//! status words; those are decoded by the caller.

#[cfg(feature = "hid")]
pub mod hid;
#[cfg(feature = "tcp")]
pub mod tcp;

use std::str::FromStr;

use crate::error::TransportError;

/// Environment variable read by [`TransportType::from_env`].
pub const TRANSPORT_ENV: &str = "LEDGER_TRANSPORT";

/// One exclusively owned device session.
pub trait Transport: Send {
    /// Send one serialized APDU and return the raw response, status word
    /// included. Blocks for as long as the device takes, including while
    /// it waits on the user. A failed exchange, timeouts included, ends the
    /// session so a late reply cannot answer a later request.
    fn exchange(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError>;

    /// End the session. Exchanges after this fail with [`TransportError::Closed`].
    fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportType {
    #[cfg(feature = "hid")]
    NativeHID,
    /// `(host, port)` for the Speculos simulator.
    #[cfg(feature = "tcp")]
    TCP(String, u16),
}

impl TransportType {
    /// Reads [`TRANSPORT_ENV`] (`hid` or `tcp:HOST:PORT`). Falls back to
    /// HID, or to Speculos on `127.0.0.1:9999` when only `tcp` is enabled.
    pub fn from_env() -> Result<Self, TransportError> {
        match std::env::var(TRANSPORT_ENV) {
            Ok(value) => value.parse(),
            Err(std::env::VarError::NotPresent) => Self::fallback(),
            Err(e) => Err(TransportError::Config(format!("{TRANSPORT_ENV}: {e}"))),
        }
    }

    #[allow(unreachable_code)]
    fn fallback() -> Result<Self, TransportError> {
        #[cfg(feature = "hid")]
        return Ok(Self::NativeHID);
        #[cfg(feature = "tcp")]
        return Ok(Self::TCP("127.0.0.1".into(), 9999));
        Err(no_transport_enabled())
    }
}

impl FromStr for TransportType {
    type Err = TransportError;

    #[allow(unreachable_code)]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("hid") {
            #[cfg(feature = "hid")]
            return Ok(Self::NativeHID);
            return Err(TransportError::Config(
                "HID transport needs the 'hid' feature".into(),
            ));
        }

        if let Some(rest) = s.strip_prefix("tcp:") {
            let (host, port) = rest.rsplit_once(':').ok_or_else(|| {
                TransportError::Config(format!("'{s}' is missing a port (tcp:HOST:PORT)"))
            })?;
            if host.is_empty() {
                return Err(TransportError::Config(format!("'{s}' is missing a host")));
            }
            let port: u16 = port
                .parse()
                .map_err(|_| TransportError::Config(format!("invalid port '{port}'")))?;
            #[cfg(feature = "tcp")]
            return Ok(Self::TCP(host.to_string(), port));
            let _ = port;
            return Err(TransportError::Config(
                "TCP transport needs the 'tcp' feature".into(),
            ));
        }

        Err(TransportError::Config(format!(
            "unknown transport '{s}' (expected 'hid' or 'tcp:HOST:PORT')"
        )))
    }
}

pub fn open(transport_type: &TransportType) -> Result<Box<dyn Transport>, TransportError> {
    match transport_type {
        #[cfg(feature = "hid")]
        TransportType::NativeHID => {
            let t = hid::HidTransport::new()?;
            Ok(Box::new(t))
        }
        #[cfg(feature = "tcp")]
        TransportType::TCP(host, port) => {
            let t = tcp::TcpTransport::new(host, *port)?;
            Ok(Box::new(t))
        }
        #[allow(unreachable_patterns)]
        _ => Err(no_transport_enabled()),
    }
}

fn no_transport_enabled() -> TransportError {
    TransportError::Config("no transport enabled - enable the 'hid' or 'tcp' feature".into())
}
