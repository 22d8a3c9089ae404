//! USB HID transport.
//!
//! Each APDU is prefixed with its 2-byte length and spread over 64-byte
//! reports: `[channel: u16][tag][seq: u16][data...]`. Responses come back
//! the same way.

use crate::error::TransportError;
use crate::transport::Transport;

const LEDGER_VID: u16 = 0x2c97;
const LEDGER_USAGE_PAGE: u16 = 0xFFA0;
const LEDGER_CHANNEL: u16 = 0x0101;
const LEDGER_TAG: u8 = 0x05;
const PACKET_SIZE: usize = 64;
const READ_TIMEOUT_MS: i32 = 30_000;
/// channel + tag + sequence index
const HEADER_LEN: usize = 5;

/// Device family, from the upper byte of the USB product id.
pub fn model_name(product_id: u16) -> &'static str {
    match product_id >> 8 {
        0x10 => "Nano S",
        0x40 => "Nano X",
        0x50 => "Nano S+",
        0x60 => "Stax",
        0x70 => "Flex",
        _ => "unknown model",
    }
}

pub struct HidTransport {
    device: Option<hidapi::HidDevice>,
    product_id: u16,
}

impl HidTransport {
    /// Open the first Ledger found on the bus.
    pub fn new() -> Result<Self, TransportError> {
        let api = hidapi::HidApi::new().map_err(|e| TransportError::Comm(e.to_string()))?;

        let info = api
            .device_list()
            .find(|info| info.vendor_id() == LEDGER_VID && info.usage_page() == LEDGER_USAGE_PAGE)
            .ok_or(TransportError::DeviceNotFound)?;

        let product_id = info.product_id();
        let device = info
            .open_device(&api)
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        log::info!("connected to Ledger {}", model_name(product_id));

        Ok(Self {
            device: Some(device),
            product_id,
        })
    }

    pub fn model(&self) -> &'static str {
        model_name(self.product_id)
    }
}

impl Transport for HidTransport {
    fn exchange(&mut self, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
        let device = self.device.as_ref().ok_or(TransportError::Closed)?;

        let result = round_trip(device, apdu);
        if let Err(e) = &result {
            // a late reply would stay queued and answer the next request
            log::warn!("dropping Ledger {} session: {e}", self.model());
            self.device = None;
        }
        result
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.device.take().is_some() {
            log::info!("closed Ledger {}", self.model());
        }
        Ok(())
    }
}

fn round_trip(device: &hidapi::HidDevice, apdu: &[u8]) -> Result<Vec<u8>, TransportError> {
    for packet in frame_packets(apdu)? {
        // hidapi wants a leading report id
        let mut report = Vec::with_capacity(1 + PACKET_SIZE);
        report.push(0x00);
        report.extend_from_slice(&packet);
        device
            .write(&report)
            .map_err(|e| TransportError::Comm(e.to_string()))?;
    }

    let mut reassembler = Reassembler::default();
    let mut buffer = [0u8; PACKET_SIZE];
    loop {
        let n = device
            .read_timeout(&mut buffer, READ_TIMEOUT_MS)
            .map_err(|e| TransportError::Comm(e.to_string()))?;
        if n == 0 {
            return Err(TransportError::Timeout(READ_TIMEOUT_MS as u32));
        }
        if let Some(response) = reassembler.push(&buffer[..n])? {
            return Ok(response);
        }
    }
}

/// Split an APDU into HID reports. The first report carries the 2-byte
/// big-endian APDU length ahead of the data.
pub(crate) fn frame_packets(apdu: &[u8]) -> Result<Vec<[u8; PACKET_SIZE]>, TransportError> {
    let len = u16::try_from(apdu.len())
        .map_err(|_| TransportError::Comm(format!("APDU too long: {} bytes", apdu.len())))?;

    let mut payload = Vec::with_capacity(2 + apdu.len());
    payload.extend_from_slice(&len.to_be_bytes());
    payload.extend_from_slice(apdu);

    let packets = payload
        .chunks(PACKET_SIZE - HEADER_LEN)
        .enumerate()
        .map(|(seq, chunk)| {
            let mut packet = [0u8; PACKET_SIZE];
            packet[..2].copy_from_slice(&LEDGER_CHANNEL.to_be_bytes());
            packet[2] = LEDGER_TAG;
            packet[3..5].copy_from_slice(&(seq as u16).to_be_bytes());
            packet[HEADER_LEN..HEADER_LEN + chunk.len()].copy_from_slice(chunk);
            packet
        })
        .collect();
    Ok(packets)
}

/// Rebuilds a response from incoming reports, checking channel, tag and
/// sequence order.
#[derive(Debug, Default)]
pub(crate) struct Reassembler {
    expected_len: Option<usize>,
    next_seq: u16,
    data: Vec<u8>,
}

impl Reassembler {
    /// Returns the full response once the last report is in.
    pub(crate) fn push(&mut self, packet: &[u8]) -> Result<Option<Vec<u8>>, TransportError> {
        if packet.len() < HEADER_LEN {
            return Err(TransportError::Comm(format!(
                "HID short read: {} bytes",
                packet.len()
            )));
        }
        if u16::from_be_bytes([packet[0], packet[1]]) != LEDGER_CHANNEL {
            return Err(TransportError::Comm("HID channel mismatch".into()));
        }
        if packet[2] != LEDGER_TAG {
            return Err(TransportError::Comm("HID tag mismatch".into()));
        }
        let seq = u16::from_be_bytes([packet[3], packet[4]]);
        if seq != self.next_seq {
            return Err(TransportError::Comm(format!(
                "sequence mismatch: expected {}, got {seq}",
                self.next_seq
            )));
        }

        let mut body = &packet[HEADER_LEN..];
        let expected = match self.expected_len {
            Some(len) => len,
            None => {
                if body.len() < 2 {
                    return Err(TransportError::Comm("HID first packet lacks length".into()));
                }
                let len = u16::from_be_bytes([body[0], body[1]]) as usize;
                body = &body[2..];
                self.expected_len = Some(len);
                len
            }
        };

        let take = (expected - self.data.len()).min(body.len());
        self.data.extend_from_slice(&body[..take]);
        self.next_seq = self.next_seq.wrapping_add(1);

        if self.data.len() >= expected {
            return Ok(Some(std::mem::take(&mut self.data)));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_apdu_fits_one_packet() {
        let packets = frame_packets(&[0xE0, 0x06, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(
            &packets[0][..12],
            &[0x01, 0x01, 0x05, 0x00, 0x00, 0x00, 0x05, 0xE0, 0x06, 0x00, 0x00, 0x00]
        );
        assert!(packets[0][12..].iter().all(|&b| b == 0));
    }

    #[test]
    fn long_apdu_spans_packets() {
        let apdu = vec![0xAB; 260];
        let packets = frame_packets(&apdu).unwrap();
        // 262 bytes over 59-byte bodies
        assert_eq!(packets.len(), 5);
        for (i, p) in packets.iter().enumerate() {
            assert_eq!(u16::from_be_bytes([p[3], p[4]]), i as u16);
        }
    }

    #[test]
    fn framing_round_trips_through_reassembler() {
        let apdu: Vec<u8> = (0..300u32).map(|i| i as u8).collect();
        let mut r = Reassembler::default();
        let mut out = None;
        for p in frame_packets(&apdu).unwrap() {
            out = r.push(&p).unwrap();
        }
        assert_eq!(out.unwrap(), apdu);
    }

    #[test]
    fn single_packet_response() {
        let mut packet = vec![0x01, 0x01, 0x05, 0x00, 0x00, 0x00, 0x02, 0x90, 0x00];
        packet.resize(PACKET_SIZE, 0);
        let mut r = Reassembler::default();
        assert_eq!(r.push(&packet).unwrap(), Some(vec![0x90, 0x00]));
    }

    #[test]
    fn out_of_order_sequence_rejected() {
        let mut packet = vec![0x01, 0x01, 0x05, 0x00, 0x01, 0x00, 0x02];
        packet.resize(PACKET_SIZE, 0);
        let err = Reassembler::default().push(&packet).unwrap_err();
        assert!(matches!(err, TransportError::Comm(_)));
    }

    #[test]
    fn wrong_channel_and_tag_rejected() {
        let mut r = Reassembler::default();
        assert!(r.push(&[0x02, 0x02, 0x05, 0x00, 0x00, 0x00, 0x02]).is_err());
        let mut r = Reassembler::default();
        assert!(r.push(&[0x01, 0x01, 0x06, 0x00, 0x00, 0x00, 0x02]).is_err());
    }

    #[test]
    fn model_names() {
        assert_eq!(model_name(0x4011), "Nano X");
        assert_eq!(model_name(0x5011), "Nano S+");
        assert_eq!(model_name(0x0001), "unknown model");
    }
}
