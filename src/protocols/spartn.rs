//! SPARTN frames: `73` preamble, a bit-packed 3-byte header (messageType,
//! payloadLength, EAF, crcType, and a 4-bit header CRC), a variable
//! mid-header, an optional embedded-application segment, the payload, and a
//! trailing CRC-8/16/24/32 selected by `crcType`.
use crate::crc_engines::{spartn_crc4, spartn_crc_bytes, spartn_trailing_crc};
use crate::state::{ParserDescription, ProtocolState, StepContext, StepOutcome};

/// Largest possible frame: header (3) + mid-header (6) + embedded-app
/// extension (2) + embedded-app segment (64) + 10-bit payload (1023) +
/// trailing CRC (4), plus the preamble byte itself.
pub const MINIMUM_PARSE_AREA_BYTES: usize = 1 + 3 + 6 + 2 + 64 + 1023 + 4;

pub struct SpartnDescription;

impl ParserDescription for SpartnDescription {
    fn name(&self) -> &'static str {
        "SPARTN"
    }

    fn minimum_parse_area_bytes(&self) -> usize {
        MINIMUM_PARSE_AREA_BYTES
    }

    fn payload_offset(&self) -> usize {
        0
    }

    fn try_accept(&self, _ctx: &mut StepContext<'_>, byte: u8) -> Option<Box<dyn ProtocolState>> {
        (byte == 0x73).then(|| {
            Box::new(SpartnState {
                phase: Phase::Header1,
                payload_length: 0,
                eaf: false,
                crc_type: 0,
                embed_len: 0,
            }) as Box<dyn ProtocolState>
        })
    }
}

/// Maps SPARTN's 3-bit embedded-application length selector to a byte
/// count; `None` for the two values the format reserves.
fn embedded_app_len(selector: u8) -> Option<usize> {
    match selector {
        0 => Some(0),
        1 => Some(8),
        2 => Some(12),
        3 => Some(16),
        4 => Some(32),
        5 => Some(64),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Header1,
    Header2 { byte0: u8 },
    Header3 { byte0: u8, byte1: u8 },
    Tf007,
    MidHeader { remaining: usize },
    ExtensionByte1,
    ExtensionByte2,
    EmbeddedApp { remaining: usize },
    Payload { remaining: usize },
    TrailingCrc { remaining: usize, accum: u32, shift: u32 },
}

struct SpartnState {
    phase: Phase,
    payload_length: u16,
    eaf: bool,
    crc_type: u8,
    embed_len: usize,
}

impl SpartnState {
    /// Moves to the payload countdown, or straight to the trailing CRC when
    /// `payloadLength == 0`, handled the same way as u-blox's and RTCM's
    /// zero-length short-circuits.
    fn start_payload_or_crc(&mut self) -> StepOutcome {
        self.phase = if self.payload_length == 0 {
            Phase::TrailingCrc {
                remaining: spartn_crc_bytes(self.crc_type),
                accum: 0,
                shift: 0,
            }
        } else {
            Phase::Payload {
                remaining: self.payload_length as usize,
            }
        };
        StepOutcome::Continue
    }
}

impl ProtocolState for SpartnState {
    fn step(&mut self, ctx: &mut StepContext<'_>, byte: u8) -> StepOutcome {
        match self.phase {
            Phase::Header1 => {
                self.phase = Phase::Header2 { byte0: byte };
                StepOutcome::Continue
            }
            Phase::Header2 { byte0 } => {
                self.phase = Phase::Header3 { byte0, byte1: byte };
                StepOutcome::Continue
            }
            Phase::Header3 { byte0, byte1 } => {
                let byte2 = byte;
                let header_crc = byte2 & 0x0F;
                let computed = spartn_crc4(&[byte0, byte1, byte2 & 0xF0]);
                if computed != header_crc {
                    ctx.report_checksum_mismatch(u32::from(computed), u32::from(header_crc), 1);
                    return StepOutcome::Reject;
                }
                self.payload_length =
                    (u16::from(byte0 & 0x01) << 9) | (u16::from(byte1) << 1) | u16::from((byte2 >> 7) & 0x01);
                self.eaf = (byte2 >> 6) & 0x01 != 0;
                self.crc_type = (byte2 >> 4) & 0x03;
                self.phase = Phase::Tf007;
                StepOutcome::Continue
            }
            Phase::Tf007 => {
                let time_tag_type = (byte >> 3) & 0x01;
                let base_len = if time_tag_type == 0 { 4 } else { 6 };
                let remaining = base_len - 1;
                self.phase = Phase::MidHeader { remaining };
                StepOutcome::Continue
            }
            Phase::MidHeader { remaining } => {
                let remaining = remaining - 1;
                if remaining > 0 {
                    self.phase = Phase::MidHeader { remaining };
                    return StepOutcome::Continue;
                }
                if self.eaf {
                    self.phase = Phase::ExtensionByte1;
                    StepOutcome::Continue
                } else {
                    self.start_payload_or_crc()
                }
            }
            Phase::ExtensionByte1 => {
                let selector = byte & 0x07;
                let embed_len = match embedded_app_len(selector) {
                    Some(len) => len,
                    None => {
                        ctx.report_error("invalid SPARTN embedded-application length selector");
                        return StepOutcome::Reject;
                    }
                };
                self.embed_len = embed_len;
                self.phase = Phase::ExtensionByte2;
                StepOutcome::Continue
            }
            Phase::ExtensionByte2 => {
                self.phase = if self.embed_len > 0 {
                    Phase::EmbeddedApp { remaining: self.embed_len }
                } else {
                    return self.start_payload_or_crc();
                };
                StepOutcome::Continue
            }
            Phase::EmbeddedApp { remaining } => {
                let remaining = remaining - 1;
                if remaining == 0 {
                    self.start_payload_or_crc()
                } else {
                    self.phase = Phase::EmbeddedApp { remaining };
                    StepOutcome::Continue
                }
            }
            Phase::Payload { remaining } => {
                let remaining = remaining - 1;
                if remaining == 0 {
                    self.phase = Phase::TrailingCrc {
                        remaining: spartn_crc_bytes(self.crc_type),
                        accum: 0,
                        shift: 0,
                    };
                } else {
                    self.phase = Phase::Payload { remaining };
                }
                StepOutcome::Continue
            }
            Phase::TrailingCrc { remaining, accum, shift } => {
                let accum = accum | (u32::from(byte) << shift);
                let remaining = remaining - 1;
                if remaining == 0 {
                    let crc_bytes = spartn_crc_bytes(self.crc_type);
                    let payload_end = ctx.buffer().len() - crc_bytes;
                    let computed = spartn_trailing_crc(self.crc_type, &ctx.buffer()[1..payload_end]);
                    let matched = computed == accum;
                    if !matched {
                        ctx.report_checksum_mismatch(computed, accum, crc_bytes * 2);
                    }
                    StepOutcome::ChecksumResult {
                        matched,
                        then_drain: false,
                    }
                } else {
                    self.phase = Phase::TrailingCrc { remaining, accum, shift: shift + 8 };
                    StepOutcome::Continue
                }
            }
        }
    }

    fn state_name(&self) -> &'static str {
        match self.phase {
            Phase::Header1 => "header1",
            Phase::Header2 { .. } => "header2",
            Phase::Header3 { .. } => "header3",
            Phase::Tf007 => "tf007",
            Phase::MidHeader { .. } => "mid_header",
            Phase::ExtensionByte1 => "extension1",
            Phase::ExtensionByte2 => "extension2",
            Phase::EmbeddedApp { .. } => "embedded_app",
            Phase::Payload { .. } => "payload",
            Phase::TrailingCrc { .. } => "trailing_crc",
        }
    }
}

#[cfg(test)]
mod test {
    use crate::crc_engines::{spartn_crc4, spartn_crc_bytes, spartn_trailing_crc};
    use crate::state::{Frame, ParseState, ParserTable};
    use rstest::rstest;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    fn table() -> ParserTable {
        vec![Arc::new(super::SpartnDescription) as Arc<dyn crate::state::ParserDescription>]
    }

    fn collector() -> (Rc<RefCell<Vec<Vec<u8>>>>, Box<dyn FnMut(&Frame<'_>)>) {
        let frames = Rc::new(RefCell::new(Vec::new()));
        let sink = frames.clone();
        (frames, Box::new(move |frame| sink.borrow_mut().push(frame.raw().to_vec())))
    }

    /// Builds a frame with no EAF segment and a 16-bit time tag (the
    /// smallest legal mid-header), `crc_type` selecting the trailing CRC.
    fn build_frame(message_type: u8, payload: &[u8], crc_type: u8) -> Vec<u8> {
        let payload_length = payload.len() as u16;
        let byte0 = (message_type << 1) | ((payload_length >> 9) as u8 & 0x01);
        let byte1 = (payload_length >> 1) as u8;
        let byte2_top = (((payload_length & 0x01) as u8) << 7) | (0 << 6) | ((crc_type & 0x03) << 4);
        let header_crc = spartn_crc4(&[byte0, byte1, byte2_top]);
        let byte2 = byte2_top | header_crc;

        let tf007 = 0u8; // subtype 0, timeTagType 0 -> 16-bit time tag, 4-byte mid-header
        let mut body = vec![byte0, byte1, byte2, tf007, 0x00, 0x00, 0x00];
        body.extend_from_slice(payload);

        let crc_bytes = spartn_crc_bytes(crc_type);
        let crc = spartn_trailing_crc(crc_type, &body);
        let mut frame = vec![0x73];
        frame.extend_from_slice(&body);
        for i in 0..crc_bytes {
            frame.push((crc >> (8 * i)) as u8);
        }
        frame
    }

    #[rstest]
    #[case::crc8(0)]
    #[case::crc16(1)]
    #[case::crc24(2)]
    #[case::crc32(3)]
    fn accepts_well_formed_frame_for_every_crc_type(#[case] crc_type: u8) {
        let (frames, cb) = collector();
        let mut state = ParseState::begin_parser("spartn", table(), 4096, cb, None, None, None).unwrap();
        let frame = build_frame(1, &[0xDE, 0xAD, 0xBE, 0xEF], crc_type);
        state.parse_next_bytes(&frame);

        assert_eq!(frames.borrow().as_slice(), &[frame]);
    }

    /// As [`build_frame`], but with EAF set and a 2-byte extension (an
    /// auth-indicator/embedded-length-selector byte plus one reserved byte)
    /// ahead of the payload.
    fn build_frame_with_eaf(payload: &[u8], embed_selector: u8) -> Vec<u8> {
        let crc_type = 1;
        let payload_length = payload.len() as u16;
        let message_type = 1u8;
        let byte0 = (message_type << 1) | ((payload_length >> 9) as u8 & 0x01);
        let byte1 = (payload_length >> 1) as u8;
        let byte2_top = (((payload_length & 0x01) as u8) << 7) | (1 << 6) | ((crc_type & 0x03) << 4);
        let header_crc = spartn_crc4(&[byte0, byte1, byte2_top]);
        let byte2 = byte2_top | header_crc;

        let tf007 = 0u8;
        let extension1 = embed_selector & 0x07;
        let mut body = vec![byte0, byte1, byte2, tf007, 0x00, 0x00, 0x00, extension1, 0x00];
        body.extend_from_slice(payload);

        let crc_bytes = spartn_crc_bytes(crc_type);
        let crc = spartn_trailing_crc(crc_type, &body);
        let mut frame = vec![0x73];
        frame.extend_from_slice(&body);
        for i in 0..crc_bytes {
            frame.push((crc >> (8 * i)) as u8);
        }
        frame
    }

    #[rstest]
    fn eaf_frame_with_zero_length_embedded_segment() {
        let (frames, cb) = collector();
        let mut state = ParseState::begin_parser("spartn", table(), 4096, cb, None, None, None).unwrap();
        let frame = build_frame_with_eaf(&[1, 2, 3], 0);
        state.parse_next_bytes(&frame);

        assert_eq!(frames.borrow().as_slice(), &[frame]);
    }

    #[rstest]
    fn zero_length_payload_short_circuits_to_trailing_crc() {
        let (frames, cb) = collector();
        let mut state = ParseState::begin_parser("spartn", table(), 4096, cb, None, None, None).unwrap();
        let frame = build_frame(1, &[], 1);
        state.parse_next_bytes(&frame);

        assert_eq!(frames.borrow().len(), 1);
    }

    #[rstest]
    fn corrupted_header_crc_aborts_immediately() {
        let (frames, cb) = collector();
        let mut state = ParseState::begin_parser("spartn", table(), 4096, cb, None, None, None).unwrap();
        let mut frame = build_frame(1, &[1, 2, 3], 0);
        frame[3] ^= 0xFF; // flips byte2, desyncing its header-CRC nibble from byte0/byte1
        state.parse_next_bytes(&frame);

        assert!(frames.borrow().is_empty());
        assert_eq!(state.stats().frames_rejected, 1);
    }

    #[rstest]
    fn corrupted_trailing_crc_is_rejected() {
        let (frames, cb) = collector();
        let mut state = ParseState::begin_parser("spartn", table(), 4096, cb, None, None, None).unwrap();
        let mut frame = build_frame(1, &[1, 2, 3, 4], 2);
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        state.parse_next_bytes(&frame);

        assert!(frames.borrow().is_empty());
        assert_eq!(state.stats().frames_rejected, 1);
    }
}
