//! APDU command and response frames.
//!
//! EVM app commands use CLA `0xE0`. The dashboard-level app query uses
//! CLA `0xB0`.

use crate::error::{LedgerError, StatusWord};

pub const CLA: u8 = 0xE0;
pub const DASHBOARD_CLA: u8 = 0xB0;

/// Short APDU LC limit.
pub const MAX_APDU_DATA: usize = 255;

/// `[SW1][SW2]`
const STATUS_WORD_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Instruction {
    GetAddress = 0x02,
    SignTransaction = 0x04,
    GetPublicKey = 0x05,
    GetVersion = 0x06,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduCommand {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    data: Vec<u8>,
}

impl ApduCommand {
    pub fn new(ins: Instruction) -> Self {
        Self {
            cla: CLA,
            ins: ins as u8,
            p1: 0x00,
            p2: 0x00,
            data: Vec::new(),
        }
    }

    /// Fails with [`LedgerError::FrameTooLarge`] when `data` doesn't fit a
    /// single frame; split it with [`chunk_payload`] first.
    pub fn with_data(ins: Instruction, data: Vec<u8>) -> Result<Self, LedgerError> {
        let mut cmd = Self::new(ins);
        cmd.set_data(data)?;
        Ok(cmd)
    }

    /// Raw constructor for commands outside the app's instruction set.
    pub fn raw(cla: u8, ins: u8) -> Self {
        Self {
            cla,
            ins,
            p1: 0x00,
            p2: 0x00,
            data: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_p1(mut self, p1: u8) -> Self {
        self.p1 = p1;
        self
    }

    #[must_use]
    pub fn with_p2(mut self, p2: u8) -> Self {
        self.p2 = p2;
        self
    }

    fn set_data(&mut self, data: Vec<u8>) -> Result<(), LedgerError> {
        if data.len() > MAX_APDU_DATA {
            return Err(LedgerError::FrameTooLarge(data.len()));
        }
        self.data = data;
        Ok(())
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Wire format: `[CLA][INS][P1][P2][LC][DATA]`
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(5 + self.data.len());
        buf.push(self.cla);
        buf.push(self.ins);
        buf.push(self.p1);
        buf.push(self.p2);
        // set_data keeps this within u8
        buf.push(self.data.len() as u8);
        buf.extend_from_slice(&self.data);
        buf
    }
}

/// APDU response: payload followed by a 2-byte status word.
#[derive(Debug, Clone)]
pub struct ApduAnswer {
    raw: Vec<u8>,
}

impl ApduAnswer {
    pub fn from_raw(raw: Vec<u8>) -> Result<Self, LedgerError> {
        if raw.len() < STATUS_WORD_LEN {
            return Err(LedgerError::MalformedResponse(format!(
                "response of {} bytes has no status word",
                raw.len()
            )));
        }
        Ok(Self { raw })
    }

    pub fn retcode(&self) -> u16 {
        let len = self.raw.len();
        u16::from_be_bytes([self.raw[len - 2], self.raw[len - 1]])
    }

    pub fn status(&self) -> StatusWord {
        StatusWord::from_code(self.retcode())
    }

    /// Payload only - strips the trailing status word.
    pub fn data(&self) -> &[u8] {
        &self.raw[..self.raw.len() - STATUS_WORD_LEN]
    }

    /// Payload on `0x9000`, [`LedgerError::Device`] on anything else.
    pub fn into_payload(mut self) -> Result<Vec<u8>, LedgerError> {
        let status = self.status();
        if !status.is_success() {
            return Err(LedgerError::Device(status));
        }
        self.raw.truncate(self.raw.len() - STATUS_WORD_LEN);
        Ok(self.raw)
    }
}

/// Split a payload into frame-sized pieces. Always yields at least one
/// chunk so an empty payload still produces one frame.
pub fn chunk_payload(payload: &[u8]) -> Vec<&[u8]> {
    if payload.is_empty() {
        return vec![payload];
    }
    payload.chunks(MAX_APDU_DATA).collect()
}
