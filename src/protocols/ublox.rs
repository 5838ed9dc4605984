//! u-blox UBX frames: `B5 62 CLASS ID LEN_L LEN_H payload[LEN] CK_A CK_B`,
//! an 8-bit Fletcher checksum over everything from `CLASS` through the end
//! of the payload.
use crate::crc_engines::fletcher8_step;
use crate::state::{ParserDescription, ProtocolState, StepContext, StepOutcome};

/// 16-bit length field, plus 6 header bytes (class/id/len) and 2 checksum
/// bytes (sync bytes are not part of the parse area accounting here since
/// `try_accept` consumes the first).
pub const MINIMUM_PARSE_AREA_BYTES: usize = 2 + 6 + u16::MAX as usize + 2;

pub struct UbloxDescription;

impl ParserDescription for UbloxDescription {
    fn name(&self) -> &'static str {
        "UBLOX"
    }

    fn minimum_parse_area_bytes(&self) -> usize {
        MINIMUM_PARSE_AREA_BYTES
    }

    fn payload_offset(&self) -> usize {
        6
    }

    fn try_accept(&self, _ctx: &mut StepContext<'_>, byte: u8) -> Option<Box<dyn ProtocolState>> {
        (byte == 0xB5).then(|| {
            Box::new(UbloxState {
                phase: Phase::Sync2,
                ck_a: 0,
                ck_b: 0,
            }) as Box<dyn ProtocolState>
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Sync2,
    Class,
    Id,
    Length1,
    Length2 { len_lo: u8 },
    Payload { remaining: usize },
    CkA,
    CkB { received_ck_a: u8 },
}

struct UbloxState {
    phase: Phase,
    ck_a: u8,
    ck_b: u8,
}

impl UbloxState {
    fn fold(&mut self, byte: u8) {
        let (a, b) = fletcher8_step(self.ck_a, self.ck_b, byte);
        self.ck_a = a;
        self.ck_b = b;
    }
}

impl ProtocolState for UbloxState {
    fn step(&mut self, ctx: &mut StepContext<'_>, byte: u8) -> StepOutcome {
        match self.phase {
            Phase::Sync2 => {
                if byte != 0x62 {
                    ctx.report_error("invalid u-blox sync2 byte");
                    return StepOutcome::Reject;
                }
                self.phase = Phase::Class;
                StepOutcome::Continue
            }
            Phase::Class => {
                self.fold(byte);
                self.phase = Phase::Id;
                StepOutcome::Continue
            }
            Phase::Id => {
                self.fold(byte);
                self.phase = Phase::Length1;
                StepOutcome::Continue
            }
            Phase::Length1 => {
                self.fold(byte);
                self.phase = Phase::Length2 { len_lo: byte };
                StepOutcome::Continue
            }
            Phase::Length2 { len_lo } => {
                self.fold(byte);
                let length = u16::from(len_lo) | (u16::from(byte) << 8);
                self.phase = if length == 0 {
                    Phase::CkA
                } else {
                    Phase::Payload { remaining: length as usize }
                };
                StepOutcome::Continue
            }
            Phase::Payload { remaining } => {
                self.fold(byte);
                let remaining = remaining - 1;
                self.phase = if remaining == 0 {
                    Phase::CkA
                } else {
                    Phase::Payload { remaining }
                };
                StepOutcome::Continue
            }
            Phase::CkA => {
                self.phase = Phase::CkB { received_ck_a: byte };
                StepOutcome::Continue
            }
            Phase::CkB { received_ck_a } => {
                let matched = received_ck_a == self.ck_a && byte == self.ck_b;
                if !matched {
                    let expected = (u32::from(self.ck_a) << 8) | u32::from(self.ck_b);
                    let received = (u32::from(received_ck_a) << 8) | u32::from(byte);
                    ctx.report_checksum_mismatch(expected, received, 4);
                }
                StepOutcome::ChecksumResult {
                    matched,
                    then_drain: false,
                }
            }
        }
    }

    fn state_name(&self) -> &'static str {
        match self.phase {
            Phase::Sync2 => "sync2",
            Phase::Class => "class",
            Phase::Id => "id",
            Phase::Length1 => "length1",
            Phase::Length2 { .. } => "length2",
            Phase::Payload { .. } => "payload",
            Phase::CkA => "ck_a",
            Phase::CkB { .. } => "ck_b",
        }
    }
}

#[cfg(test)]
mod test {
    use crate::crc_engines::fletcher8;
    use crate::state::{Frame, ParseState, ParserTable};
    use rstest::rstest;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    fn table() -> ParserTable {
        vec![Arc::new(super::UbloxDescription) as Arc<dyn crate::state::ParserDescription>]
    }

    fn collector() -> (Rc<RefCell<Vec<Vec<u8>>>>, Box<dyn FnMut(&Frame<'_>)>) {
        let frames = Rc::new(RefCell::new(Vec::new()));
        let sink = frames.clone();
        (frames, Box::new(move |frame| sink.borrow_mut().push(frame.raw().to_vec())))
    }

    fn build_frame(class: u8, id: u8, payload: &[u8]) -> Vec<u8> {
        let mut body = vec![class, id, payload.len() as u8, (payload.len() >> 8) as u8];
        body.extend_from_slice(payload);
        let (ck_a, ck_b) = fletcher8(&body);
        let mut frame = vec![0xB5, 0x62];
        frame.extend_from_slice(&body);
        frame.push(ck_a);
        frame.push(ck_b);
        frame
    }

    #[rstest]
    fn accepts_well_formed_frame() {
        let (frames, cb) = collector();
        let mut state = ParseState::begin_parser("ublox", table(), 4096, cb, None, None, None).unwrap();
        let frame = build_frame(0x01, 0x02, &[0xDE, 0xAD, 0xBE, 0xEF]);
        state.parse_next_bytes(&frame);

        assert_eq!(frames.borrow().as_slice(), &[frame]);
    }

    #[rstest]
    fn zero_length_payload_short_circuits_to_checksum() {
        let (frames, cb) = collector();
        let mut state = ParseState::begin_parser("ublox", table(), 4096, cb, None, None, None).unwrap();
        let frame = build_frame(0x0A, 0x04, &[]);
        state.parse_next_bytes(&frame);

        assert_eq!(frames.borrow().len(), 1);
    }

    #[rstest]
    fn checksum_failure_in_the_middle_does_not_break_neighbors() {
        let (frames, cb) = collector();
        let mut state = ParseState::begin_parser("ublox", table(), 4096, cb, None, None, None).unwrap();

        let first = build_frame(0x01, 0x02, &[1, 2, 3]);
        let mut middle = build_frame(0x01, 0x02, &[4, 5, 6]);
        *middle.last_mut().unwrap() ^= 0xFF;
        let third = build_frame(0x01, 0x02, &[7, 8, 9]);

        let mut input = first.clone();
        input.extend_from_slice(&middle);
        input.extend_from_slice(&third);
        state.parse_next_bytes(&input);

        let got = frames.borrow();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0], first);
        assert_eq!(got[1], third);
        assert_eq!(state.stats().frames_rejected, 1);
    }
}
