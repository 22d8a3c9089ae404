use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use crate::error::TransportError;
use crate::transport::Transport;

const READ_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RESPONSE_LEN: usize = 65536;

/// TCP transport for the Speculos simulator (default `127.0.0.1:9999`).
///
/// Wire: `[u32 BE length][APDU]` send, `[u32 BE length][response]` recv.
///
/// Speculos sends the status word (`SW1 SW2`) as a bare 2-byte suffix
/// outside the length-prefixed frame; both parts are read and joined into
/// a standard APDU response.
///
/// Any failed exchange drops the connection: the stream may hold the rest
/// of a late reply, so later exchanges fail with [`TransportError::Closed`].
pub struct TcpTransport {
    stream: Option<TcpStream>,
    addr: String,
    read_timeout: Duration,
}

impl TcpTransport {
    pub fn new(host: &str, port: u16) -> Result<Self, TransportError> {
        let addr = format!("{host}:{port}");
        let stream = TcpStream::connect(&addr)
            .map_err(|e| TransportError::ConnectionFailed(format!("{addr}: {e}")))?;
        stream.set_read_timeout(Some(READ_TIMEOUT))?;
        log::info!("connected to Speculos at {addr}");
        Ok(Self {
            stream: Some(stream),
            addr,
            read_timeout: READ_TIMEOUT,
        })
    }

    /// How long to wait for the device's reply (default 30 s).
    pub fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        if let Some(stream) = &self.stream {
            stream.set_read_timeout(Some(timeout))?;
        }
        self.read_timeout = timeout;
        Ok(())
    }
}

fn round_trip(stream: &mut TcpStream, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
    let len = apdu.len() as u32;
    stream.write_all(&len.to_be_bytes())?;
    stream.write_all(apdu)?;
    stream.flush()?;

    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf)?;
    let resp_len = u32::from_be_bytes(len_buf) as usize;
    if resp_len > MAX_RESPONSE_LEN {
        return Err(TransportError::Comm(format!(
            "response too large: {resp_len} bytes (max {MAX_RESPONSE_LEN})"
        )));
    }

    let mut resp = vec![0u8; resp_len + 2];
    stream.read_exact(&mut resp[..resp_len])?;
    stream.read_exact(&mut resp[resp_len..])?;
    Ok(resp)
}

impl Transport for TcpTransport {
    fn exchange(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;

        let result = match round_trip(stream, apdu) {
            Err(TransportError::Io(e))
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
            {
                Err(TransportError::Timeout(self.read_timeout.as_millis() as u32))
            }
            result => result,
        };
        if let Err(e) = &result {
            log::warn!("dropping Speculos session at {}: {e}", self.addr);
            if let Some(stream) = self.stream.take() {
                let _ = stream.shutdown(Shutdown::Both);
            }
        }
        result
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if let Some(stream) = self.stream.take() {
            // peer may already be gone
            let _ = stream.shutdown(Shutdown::Both);
            log::info!("closed Speculos session at {}", self.addr);
        }
        Ok(())
    }
}
