//! RTCM3 frames: `D3` preamble, a 10-bit big-endian length field, payload
//! (whose first 12 MSB-first bits are the message number), and a trailing
//! 3-byte big-endian CRC-24Q.
use crate::crc_engines::crc24q_step;
use crate::state::{ParserDescription, ProtocolState, StepContext, StepOutcome};

const CRC_LEN: u8 = 3;

/// 10-bit length field tops out at 1023; plus 3-byte preamble+length header
/// and 3-byte trailing CRC.
pub const MINIMUM_PARSE_AREA_BYTES: usize = 3 + 1023 + 3;

pub struct RtcmDescription;

impl ParserDescription for RtcmDescription {
    fn name(&self) -> &'static str {
        "RTCM"
    }

    fn minimum_parse_area_bytes(&self) -> usize {
        MINIMUM_PARSE_AREA_BYTES
    }

    fn payload_offset(&self) -> usize {
        3
    }

    fn try_accept(&self, ctx: &mut StepContext<'_>, byte: u8) -> Option<Box<dyn ProtocolState>> {
        if byte != 0xD3 {
            return None;
        }
        ctx.set_crc(crc24q_step(0, byte));
        ctx.set_crc_hook(Some(crc24q_step));
        Some(Box::new(RtcmState { phase: Phase::Length1 }))
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Length1,
    Length2 { len_hi: u16 },
    Message1 { length: usize },
    Message2 { length: usize },
    Data { remaining: usize },
    Crc { remaining: u8 },
}

struct RtcmState {
    phase: Phase,
}

impl ProtocolState for RtcmState {
    fn step(&mut self, ctx: &mut StepContext<'_>, byte: u8) -> StepOutcome {
        match self.phase {
            Phase::Length1 => {
                if byte & 0xFC != 0 {
                    ctx.report_error("RTCM length field exceeds 10 bits");
                    return StepOutcome::Reject;
                }
                self.phase = Phase::Length2 {
                    len_hi: u16::from(byte) << 8,
                };
                StepOutcome::Continue
            }
            Phase::Length2 { len_hi } => {
                let length = (len_hi | u16::from(byte)) as usize;
                self.phase = if length == 0 {
                    Phase::Crc { remaining: CRC_LEN }
                } else {
                    Phase::Message1 { length }
                };
                StepOutcome::Continue
            }
            Phase::Message1 { length } => {
                self.phase = Phase::Message2 { length };
                StepOutcome::Continue
            }
            Phase::Message2 { length } => {
                let remaining = length.saturating_sub(2);
                self.phase = if remaining == 0 {
                    Phase::Crc { remaining: CRC_LEN }
                } else {
                    Phase::Data { remaining }
                };
                StepOutcome::Continue
            }
            Phase::Data { remaining } => {
                let remaining = remaining - 1;
                self.phase = if remaining == 0 {
                    Phase::Crc { remaining: CRC_LEN }
                } else {
                    Phase::Data { remaining }
                };
                StepOutcome::Continue
            }
            Phase::Crc { remaining } => {
                let remaining = remaining - 1;
                if remaining == 0 {
                    // CRC-24Q is self-checking here: folding the received
                    // trailer bytes back through the same running CRC leaves
                    // a zero residual on a valid frame.
                    let residual = ctx.crc() & 0x00FF_FFFF;
                    let matched = residual == 0;
                    if !matched {
                        ctx.report_checksum_mismatch(0, residual, 6);
                    }
                    StepOutcome::ChecksumResult {
                        matched,
                        then_drain: false,
                    }
                } else {
                    self.phase = Phase::Crc { remaining };
                    StepOutcome::Continue
                }
            }
        }
    }

    fn state_name(&self) -> &'static str {
        match self.phase {
            Phase::Length1 => "length1",
            Phase::Length2 { .. } => "length2",
            Phase::Message1 { .. } => "message1",
            Phase::Message2 { .. } => "message2",
            Phase::Data { .. } => "data",
            Phase::Crc { .. } => "crc",
        }
    }
}
