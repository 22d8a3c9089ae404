//! In-memory transport that replays canned device replies and records
//! every frame it is handed.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use ledger_evm::{Transport, TransportError};

pub enum Reply {
    Frame(Vec<u8>),
    Disconnect,
}

/// `payload ++ 0x9000`
pub fn ok(payload: &[u8]) -> Reply {
    let mut frame = payload.to_vec();
    frame.extend_from_slice(&[0x90, 0x00]);
    Reply::Frame(frame)
}

pub fn status(code: u16) -> Reply {
    Reply::Frame(code.to_be_bytes().to_vec())
}

/// Shared view of what the transport saw, readable after the transport
/// has been boxed and handed to the bridge.
#[derive(Clone, Default)]
pub struct Recorder {
    frames: Arc<Mutex<Vec<Vec<u8>>>>,
    closed: Arc<Mutex<bool>>,
}

impl Recorder {
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.frames.lock().unwrap().len()
    }

    pub fn closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }
}

pub struct ScriptedTransport {
    replies: VecDeque<Reply>,
    fallback: Option<Vec<u8>>,
    delay: Option<std::time::Duration>,
    recorder: Recorder,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<Reply>) -> (Self, Recorder) {
        let recorder = Recorder::default();
        let transport = Self {
            replies: replies.into(),
            fallback: None,
            delay: None,
            recorder: recorder.clone(),
        };
        (transport, recorder)
    }

    /// Answers every frame with the same successful payload, after `delay`.
    pub fn repeating(payload: &[u8], delay: std::time::Duration) -> (Self, Recorder) {
        let (mut transport, recorder) = Self::new(Vec::new());
        let mut frame = payload.to_vec();
        frame.extend_from_slice(&[0x90, 0x00]);
        transport.fallback = Some(frame);
        transport.delay = Some(delay);
        (transport, recorder)
    }
}

impl Transport for ScriptedTransport {
    fn exchange(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        if *self.recorder.closed.lock().unwrap() {
            return Err(TransportError::Closed);
        }
        self.recorder.frames.lock().unwrap().push(apdu.to_vec());
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        match self.replies.pop_front() {
            Some(Reply::Frame(frame)) => Ok(frame),
            Some(Reply::Disconnect) => Err(TransportError::Comm("device disconnected".into())),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| TransportError::Comm("no scripted reply left".into())),
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        *self.recorder.closed.lock().unwrap() = true;
        Ok(())
    }
}

/// GetAddress reply: 65-byte key, then the address as ASCII hex.
pub fn address_reply(addr: [u8; 20]) -> Vec<u8> {
    let mut data = vec![65, 0x04];
    data.extend_from_slice(&[0x11; 64]);
    data.push(40);
    data.extend_from_slice(hex::encode(addr).as_bytes());
    data
}

/// `[CLA][INS][P1][P2][LC]`
pub fn header(frame: &[u8]) -> [u8; 5] {
    [frame[0], frame[1], frame[2], frame[3], frame[4]]
}

/// Address index: last path component in a GetAddress frame.
pub fn address_index(frame: &[u8]) -> u32 {
    let n = frame.len();
    u32::from_be_bytes([frame[n - 4], frame[n - 3], frame[n - 2], frame[n - 1]])
}

/// Account: third path component (hardened bit stripped).
pub fn account(frame: &[u8]) -> u32 {
    // header (5) + count (1) + purpose (4) + coin (4)
    let at = 5 + 1 + 8;
    u32::from_be_bytes([frame[at], frame[at + 1], frame[at + 2], frame[at + 3]]) & 0x7FFF_FFFF
}
