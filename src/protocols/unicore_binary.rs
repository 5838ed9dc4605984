//! Unicore binary messages: `AA 44 B5` preamble, 24-byte little-endian
//! header, `messageLength`-byte payload, trailing 4-byte reflected CRC-32
//! over everything from the preamble through the payload.
use crate::crc_engines::crc32_reflected_step;
use crate::state::{ParserDescription, ProtocolState, StepContext, StepOutcome};

const HEADER_LEN: usize = 24;
const PREAMBLE_LEN: usize = 3;
const CRC_LEN: usize = 4;
const MESSAGE_LENGTH_OFFSET: usize = 6;

/// `messageLength` is a 16-bit field; this is the largest frame the wire
/// format can ever produce.
pub const MINIMUM_PARSE_AREA_BYTES: usize = PREAMBLE_LEN + HEADER_LEN + u16::MAX as usize + CRC_LEN;

pub struct UnicoreBinaryDescription;

impl ParserDescription for UnicoreBinaryDescription {
    fn name(&self) -> &'static str {
        "UNICORE_BINARY"
    }

    fn minimum_parse_area_bytes(&self) -> usize {
        MINIMUM_PARSE_AREA_BYTES
    }

    fn payload_offset(&self) -> usize {
        PREAMBLE_LEN + HEADER_LEN
    }

    fn try_accept(&self, ctx: &mut StepContext<'_>, byte: u8) -> Option<Box<dyn ProtocolState>> {
        if byte != 0xAA {
            return None;
        }
        ctx.set_crc(crc32_reflected_step(0, byte));
        ctx.set_crc_hook(Some(crc32_reflected_step));
        Some(Box::new(UnicoreBinaryState { phase: Phase::Sync2 }))
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Sync2,
    Sync3,
    Header,
    Payload { remaining: usize },
    Crc { remaining: u8 },
}

struct UnicoreBinaryState {
    phase: Phase,
}

impl ProtocolState for UnicoreBinaryState {
    fn step(&mut self, ctx: &mut StepContext<'_>, byte: u8) -> StepOutcome {
        match self.phase {
            Phase::Sync2 => {
                if byte != 0x44 {
                    ctx.report_error("invalid Unicore binary sync2 byte");
                    return StepOutcome::Reject;
                }
                self.phase = Phase::Sync3;
                StepOutcome::Continue
            }
            Phase::Sync3 => {
                if byte != 0xB5 {
                    ctx.report_error("invalid Unicore binary sync3 byte");
                    return StepOutcome::Reject;
                }
                self.phase = Phase::Header;
                StepOutcome::Continue
            }
            Phase::Header => {
                if ctx.buffer().len() < PREAMBLE_LEN + HEADER_LEN {
                    return StepOutcome::Continue;
                }
                let header = &ctx.buffer()[PREAMBLE_LEN..];
                let message_length =
                    u16::from_le_bytes([header[MESSAGE_LENGTH_OFFSET], header[MESSAGE_LENGTH_OFFSET + 1]])
                        as usize;
                self.phase = if message_length == 0 {
                    Phase::Crc { remaining: CRC_LEN as u8 }
                } else {
                    Phase::Payload { remaining: message_length }
                };
                StepOutcome::Continue
            }
            Phase::Payload { remaining } => {
                let remaining = remaining - 1;
                self.phase = if remaining == 0 {
                    Phase::Crc { remaining: CRC_LEN as u8 }
                } else {
                    Phase::Payload { remaining }
                };
                StepOutcome::Continue
            }
            Phase::Crc { remaining } => {
                let remaining = remaining - 1;
                if remaining == 0 {
                    let residual = ctx.crc();
                    let matched = residual == 0;
                    if !matched {
                        ctx.report_checksum_mismatch(0, residual, 8);
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
            Phase::Sync2 => "sync2",
            Phase::Sync3 => "sync3",
            Phase::Header => "header",
            Phase::Payload { .. } => "payload",
            Phase::Crc { .. } => "crc",
        }
    }
}
