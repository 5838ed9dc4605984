//! NMEA 0183 sentences: `$NAME,field,field,...*HH\r\n` with an 8-bit XOR
//! checksum over every byte strictly between `$` and `*`.
use super::{hex_nibble, Trailer};
use crate::state::{ParserDescription, ProtocolState, StepContext, StepOutcome};

/// `$NAME,...*HH<CR><LF>`. Max known sentence plus trailer and NUL.
pub const MINIMUM_PARSE_AREA_BYTES: usize = 82;

pub struct NmeaDescription;

impl ParserDescription for NmeaDescription {
    fn name(&self) -> &'static str {
        "NMEA"
    }

    fn minimum_parse_area_bytes(&self) -> usize {
        MINIMUM_PARSE_AREA_BYTES
    }

    fn payload_offset(&self) -> usize {
        1
    }

    fn try_accept(&self, _ctx: &mut StepContext<'_>, byte: u8) -> Option<Box<dyn ProtocolState>> {
        (byte == b'$').then(|| Box::new(NmeaState { phase: Phase::Name { len: 0 } }) as Box<dyn ProtocolState>)
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    /// Accumulating the sentence name, up to the first comma.
    Name { len: u8 },
    /// Past the first comma, scanning the body for `*`.
    Body,
    ChecksumHi,
    ChecksumLo { hi: u8 },
    Trailing(Trailer),
}

struct NmeaState {
    phase: Phase,
}

const MAX_NAME_LEN: u8 = 15;

impl ProtocolState for NmeaState {
    fn step(&mut self, ctx: &mut StepContext<'_>, byte: u8) -> StepOutcome {
        match self.phase {
            Phase::Name { len } => {
                if byte == b',' {
                    if len == 0 {
                        return StepOutcome::Reject;
                    }
                    ctx.set_crc(ctx.crc() ^ u32::from(byte));
                    self.phase = Phase::Body;
                    StepOutcome::Continue
                } else if byte.is_ascii_alphanumeric() {
                    if len >= MAX_NAME_LEN {
                        ctx.report_error("NMEA sentence name too long");
                        return StepOutcome::Reject;
                    }
                    ctx.set_crc(ctx.crc() ^ u32::from(byte));
                    self.phase = Phase::Name { len: len + 1 };
                    StepOutcome::Continue
                } else {
                    ctx.report_error("invalid character in NMEA sentence name");
                    StepOutcome::Reject
                }
            }
            Phase::Body => {
                if byte == b'*' {
                    self.phase = Phase::ChecksumHi;
                    return StepOutcome::Continue;
                }
                if ctx.nmea_abort_on_nonprintable() && !(0x20..=0x7E).contains(&byte) {
                    ctx.report_error("non-printable byte in NMEA sentence body");
                    return StepOutcome::Reject;
                }
                ctx.set_crc(ctx.crc() ^ u32::from(byte));
                StepOutcome::Continue
            }
            Phase::ChecksumHi => match hex_nibble(byte) {
                Some(hi) => {
                    self.phase = Phase::ChecksumLo { hi };
                    StepOutcome::Continue
                }
                None => {
                    ctx.report_error("invalid hex digit in NMEA checksum");
                    StepOutcome::Reject
                }
            },
            Phase::ChecksumLo { hi } => match hex_nibble(byte) {
                Some(lo) => {
                    let received = (hi << 4) | lo;
                    let expected = ctx.crc() & 0xFF;
                    let matched = u32::from(received) == expected;
                    if !matched {
                        ctx.report_checksum_mismatch(expected, u32::from(received), 2);
                    }
                    self.phase = Phase::Trailing(Trailer::AwaitingFirst);
                    StepOutcome::ChecksumResult {
                        matched,
                        then_drain: true,
                    }
                }
                None => {
                    ctx.report_error("invalid hex digit in NMEA checksum");
                    StepOutcome::Reject
                }
            },
            Phase::Trailing(trailer) => {
                let (next, done, rescan) = trailer.step(byte);
                if done {
                    StepOutcome::DrainDone {
                        rescan_current_byte: rescan,
                    }
                } else {
                    self.phase = Phase::Trailing(next.expect("not done implies next state"));
                    StepOutcome::Continue
                }
            }
        }
    }

    fn state_name(&self) -> &'static str {
        match self.phase {
            Phase::Name { .. } => "name",
            Phase::Body => "body",
            Phase::ChecksumHi => "checksum_hi",
            Phase::ChecksumLo { .. } => "checksum_lo",
            Phase::Trailing(_) => "trailing",
        }
    }
}

#[cfg(test)]
mod test {
    use crate::state::{Frame, ParseState, ParserTable};
    use rstest::rstest;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    fn table() -> ParserTable {
        vec![Arc::new(super::NmeaDescription) as Arc<dyn crate::state::ParserDescription>]
    }

    fn collector() -> (Rc<RefCell<Vec<Vec<u8>>>>, Box<dyn FnMut(&Frame<'_>)>) {
        let frames = Rc::new(RefCell::new(Vec::new()));
        let sink = frames.clone();
        (frames, Box::new(move |frame| sink.borrow_mut().push(frame.raw().to_vec())))
    }

    #[rstest]
    fn happy_path_scenario() {
        let (frames, cb) = collector();
        let mut state = ParseState::begin_parser("nmea", table(), 128, cb, None, None, None).unwrap();
        let sentence = b"$GPRMC,210230,A,3855.4487,N,09446.0071,W,0.0,076.2,130495,003.8,E*69\r\n";
        state.parse_next_bytes(sentence);

        let got = frames.borrow();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].len(), 70);
        assert_eq!(&got[0][1..6], b"GPRMC");
    }

    #[rstest]
    #[case(b"\r\n".as_slice())]
    #[case(b"\n\r".as_slice())]
    #[case(b"\r".as_slice())]
    #[case(b"\n".as_slice())]
    fn terminator_variants_deliver_once(#[case] terminator: &[u8]) {
        let (frames, cb) = collector();
        let mut state = ParseState::begin_parser("nmea", table(), 128, cb, None, None, None).unwrap();
        let mut sentence = b"$GPRMC,210230,A,3855.4487,N,09446.0071,W,0.0,076.2,130495,003.8,E*69".to_vec();
        sentence.extend_from_slice(terminator);
        state.parse_next_bytes(&sentence);

        let got = frames.borrow();
        assert_eq!(got.len(), 1);
        // The delivered frame always ends in a normalized `\r\n`, regardless
        // of which terminator variant was actually on the wire.
        assert_eq!(got[0].len(), 70);
        assert_eq!(&got[0][68..70], b"\r\n");
    }

    #[rstest]
    fn omitted_terminator_followed_by_next_sentence() {
        let (frames, cb) = collector();
        let mut state = ParseState::begin_parser("nmea", table(), 128, cb, None, None, None).unwrap();
        let first = b"$GPRMC,210230,A,3855.4487,N,09446.0071,W,0.0,076.2,130495,003.8,E*69";
        let second = b"$GPRMC,210230,A,3855.4487,N,09446.0071,W,0.0,076.2,130495,003.8,E*69\r\n";
        let mut input = first.to_vec();
        input.extend_from_slice(second);
        state.parse_next_bytes(&input);

        assert_eq!(frames.borrow().len(), 2);
    }

    #[rstest]
    fn bad_checksum_rejected_without_override() {
        let (frames, cb) = collector();
        let mut state = ParseState::begin_parser("nmea", table(), 128, cb, None, None, None).unwrap();
        state.parse_next_bytes(b"$GPRMC,210230,A*00\r\n");

        assert!(frames.borrow().is_empty());
        assert_eq!(state.stats().frames_rejected, 1);
    }

    #[rstest]
    fn bad_checksum_diagnostic_reports_expected_and_received() {
        let (_frames, cb) = collector();
        let mut state = ParseState::begin_parser("nmea", table(), 128, cb, None, None, None).unwrap();
        let messages = Rc::new(RefCell::new(Vec::new()));
        let sink = messages.clone();
        let mut buf = Vec::new();
        state.set_print_error(Some(Box::new(move |byte| {
            if byte == b'\n' {
                sink.borrow_mut().push(String::from_utf8(std::mem::take(&mut buf)).unwrap());
            } else {
                buf.push(byte);
            }
        })));
        state.parse_next_bytes(b"$GPRMC,210230,A*00\r\n");

        let lines = messages.borrow();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("checksum/CRC mismatch"));
        assert!(lines[0].contains("expected"));
        assert!(lines[0].contains("received"));
    }

    #[rstest]
    fn bad_checksum_accepted_with_override_returning_false() {
        let (frames, cb) = collector();
        let mut state = ParseState::begin_parser("nmea", table(), 128, cb, None, None, Some(Box::new(|_frame| false)))
            .unwrap();
        state.parse_next_bytes(b"$GPRMC,210230,A*00\r\n");

        assert_eq!(frames.borrow().len(), 1);
    }

    #[rstest]
    fn name_overflow_is_rejected_and_resumes_scanning() {
        let (frames, cb) = collector();
        let mut state = ParseState::begin_parser("nmea", table(), 128, cb, None, None, None).unwrap();
        let mut input = b"$".to_vec();
        input.extend(std::iter::repeat(b'A').take(20));
        input.extend_from_slice(b",*69\r\n");
        input.extend_from_slice(b"$GPRMC,210230,A,3855.4487,N,09446.0071,W,0.0,076.2,130495,003.8,E*69\r\n");
        state.parse_next_bytes(&input);

        assert_eq!(frames.borrow().len(), 1);
        assert!(state.stats().frames_rejected >= 1);
    }
}
