use std::ops::ControlFlow;

use crate::apdu::{chunk_payload, ApduCommand, Instruction};
use crate::error::LedgerError;
use crate::transport::Transport;
use crate::tx::{SignState, SignedTransaction, TransactionRequest};
use crate::types::Bip32Path;

const P1_FIRST: u8 = 0x00;
const P1_MORE: u8 = 0x80;

/// Payload: `[path][unsigned RLP]`, split across as many frames as needed.
/// The first frame carries `P1 = 0x00`, the rest `P1 = 0x80`. Intermediate
/// frames are acknowledged with an empty `0x9000`; the last one returns
/// `[v][r][s]` once the user approves.
///
/// The observer sees every state transition and can stop the flow
/// between frames. An APDU already sent is never interrupted.
pub fn exec(
    transport: &mut dyn Transport,
    path: &Bip32Path,
    tx: &TransactionRequest,
    observer: &mut dyn FnMut(SignState) -> ControlFlow<()>,
) -> Result<SignedTransaction, LedgerError> {
    let result = run(transport, path, tx, observer);
    let terminal = match &result {
        Ok(_) => SignState::Completed,
        Err(e) if e.is_user_rejected() => SignState::Rejected,
        Err(_) => SignState::Failed,
    };
    // too late to cancel anything
    let _ = observer(terminal);
    result
}

fn run(
    transport: &mut dyn Transport,
    path: &Bip32Path,
    tx: &TransactionRequest,
    observer: &mut dyn FnMut(SignState) -> ControlFlow<()>,
) -> Result<SignedTransaction, LedgerError> {
    notify(observer, SignState::Validating)?;
    tx.validate()?;

    notify(observer, SignState::Encoding)?;
    let unsigned = tx.serialize()?;
    let frames = build_frames(path, &unsigned)?;
    let total = frames.len();
    log::debug!("signing with {path}: {} byte tx in {total} frame(s)", unsigned.len());

    let mut response = Vec::new();
    for (i, frame) in frames.iter().enumerate() {
        let chunk = i + 1;
        notify(observer, SignState::Transmitting { chunk, total })?;
        if chunk == total {
            notify(observer, SignState::AwaitingUserConfirmation)?;
        }
        response = super::exchange(transport, frame)?;
        if chunk < total && !response.is_empty() {
            return Err(LedgerError::MalformedResponse(format!(
                "unexpected {} byte reply to frame {chunk} of {total}",
                response.len()
            )));
        }
    }

    tx.attach_signature(&response)
}

pub(crate) fn build_frames(
    path: &Bip32Path,
    unsigned: &[u8],
) -> Result<Vec<ApduCommand>, LedgerError> {
    let mut payload = path.serialize();
    payload.extend_from_slice(unsigned);

    chunk_payload(&payload)
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let p1 = if i == 0 { P1_FIRST } else { P1_MORE };
            Ok(ApduCommand::with_data(Instruction::SignTransaction, chunk.to_vec())?.with_p1(p1))
        })
        .collect()
}

fn notify(
    observer: &mut dyn FnMut(SignState) -> ControlFlow<()>,
    state: SignState,
) -> Result<(), LedgerError> {
    match observer(state) {
        ControlFlow::Continue(()) => Ok(()),
        ControlFlow::Break(()) => Err(LedgerError::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apdu::MAX_APDU_DATA;
    use crate::types::DerivationScheme;

    fn path() -> Bip32Path {
        Bip32Path::evm(DerivationScheme::ETHEREUM, 0, 0).unwrap()
    }

    #[test]
    fn small_tx_fits_one_frame() {
        let frames = build_frames(&path(), &[0xC0; 40]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].p1, P1_FIRST);
        assert_eq!(frames[0].ins, Instruction::SignTransaction as u8);
        assert_eq!(&frames[0].data()[..21], path().serialize().as_slice());
    }

    #[test]
    fn large_tx_is_chunked() {
        let unsigned: Vec<u8> = (0..1000u32).map(|i| i as u8).collect();
        let frames = build_frames(&path(), &unsigned).unwrap();

        let total = 21 + unsigned.len();
        assert_eq!(frames.len(), (total + MAX_APDU_DATA - 1) / MAX_APDU_DATA);
        assert_eq!(frames[0].p1, P1_FIRST);
        assert!(frames[1..].iter().all(|f| f.p1 == P1_MORE));

        let joined: Vec<u8> = frames.iter().flat_map(|f| f.data().to_vec()).collect();
        assert_eq!(&joined[..21], path().serialize().as_slice());
        assert_eq!(&joined[21..], unsigned.as_slice());
    }

    #[test]
    fn exact_boundary_has_no_empty_tail() {
        let unsigned = vec![0x01; MAX_APDU_DATA * 2 - 21];
        let frames = build_frames(&path(), &unsigned).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].data().len(), MAX_APDU_DATA);
    }
}
