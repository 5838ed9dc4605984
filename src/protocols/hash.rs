//! The "hash" sentence family: `#NAME,...*HH<CR><LF>` (2-nibble XOR) or, for
//! a sentence named exactly `VERSION` (case-insensitive), `#NAME,...
//! *HHHHHHHH<CR><LF>` (8-nibble reflected CRC-32).
use super::{hex_nibble, Trailer};
use crate::crc_engines::{crc32_reflected, crc32_reflected_step, xor_checksum};
use crate::state::{ParserDescription, ProtocolState, StepContext, StepOutcome};

/// Longest known `#VERSION` sentence plus terminators.
pub const MINIMUM_PARSE_AREA_BYTES: usize = 145;

pub struct HashDescription;

impl ParserDescription for HashDescription {
    fn name(&self) -> &'static str {
        "HASH"
    }

    fn minimum_parse_area_bytes(&self) -> usize {
        MINIMUM_PARSE_AREA_BYTES
    }

    fn payload_offset(&self) -> usize {
        1
    }

    fn try_accept(&self, _ctx: &mut StepContext<'_>, byte: u8) -> Option<Box<dyn ProtocolState>> {
        (byte == b'#').then(|| {
            Box::new(HashState {
                phase: Phase::Name { len: 0 },
                mode: Mode::Xor,
            }) as Box<dyn ProtocolState>
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// 2 hex nibbles, low 8 bits of an XOR fold.
    Xor,
    /// 8 hex nibbles, a reflected CRC-32.
    Crc32,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Name { len: u8 },
    Body,
    ChecksumDigits { collected: u8, value: u64 },
    Trailing(Trailer),
}

struct HashState {
    phase: Phase,
    mode: Mode,
}

const MAX_NAME_LEN: u8 = 15;

impl ProtocolState for HashState {
    fn step(&mut self, ctx: &mut StepContext<'_>, byte: u8) -> StepOutcome {
        match self.phase {
            Phase::Name { len } => {
                if byte == b',' {
                    if len == 0 {
                        return StepOutcome::Reject;
                    }
                    let buffered = ctx.buffer();
                    let name_plus_comma = &buffered[1..];
                    let name_only = &name_plus_comma[..name_plus_comma.len() - 1];
                    self.mode = if name_only.eq_ignore_ascii_case(b"VERSION") {
                        Mode::Crc32
                    } else {
                        Mode::Xor
                    };
                    let seed = match self.mode {
                        Mode::Xor => u32::from(xor_checksum(name_plus_comma)),
                        Mode::Crc32 => crc32_reflected(name_plus_comma),
                    };
                    ctx.set_crc(seed);
                    self.phase = Phase::Body;
                    StepOutcome::Continue
                } else if byte.is_ascii_alphanumeric() {
                    if len >= MAX_NAME_LEN {
                        ctx.report_error("hash-sentence name too long");
                        return StepOutcome::Reject;
                    }
                    self.phase = Phase::Name { len: len + 1 };
                    StepOutcome::Continue
                } else {
                    ctx.report_error("invalid character in hash-sentence name");
                    StepOutcome::Reject
                }
            }
            Phase::Body => {
                if byte == b'*' {
                    self.phase = Phase::ChecksumDigits { collected: 0, value: 0 };
                    return StepOutcome::Continue;
                }
                if ctx.hash_abort_on_nonprintable() && !(0x20..=0x7E).contains(&byte) {
                    ctx.report_error("non-printable byte in hash-sentence body");
                    return StepOutcome::Reject;
                }
                match self.mode {
                    Mode::Xor => ctx.set_crc(ctx.crc() ^ u32::from(byte)),
                    Mode::Crc32 => ctx.set_crc(crc32_reflected_step(ctx.crc(), byte)),
                }
                StepOutcome::Continue
            }
            Phase::ChecksumDigits { collected, value } => {
                let nibble = match hex_nibble(byte) {
                    Some(n) => n,
                    None => {
                        ctx.report_error("invalid hex digit in hash-sentence checksum");
                        return StepOutcome::Reject;
                    }
                };
                let value = (value << 4) | u64::from(nibble);
                let collected = collected + 1;
                let needed = match self.mode {
                    Mode::Xor => 2,
                    Mode::Crc32 => 8,
                };
                if collected < needed {
                    self.phase = Phase::ChecksumDigits { collected, value };
                    StepOutcome::Continue
                } else {
                    let (expected, hex_digits) = match self.mode {
                        Mode::Xor => (ctx.crc() & 0xFF, 2),
                        Mode::Crc32 => (ctx.crc(), 8),
                    };
                    let matched = value as u32 == expected;
                    if !matched {
                        ctx.report_checksum_mismatch(expected, value as u32, hex_digits);
                    }
                    self.phase = Phase::Trailing(Trailer::AwaitingFirst);
                    StepOutcome::ChecksumResult {
                        matched,
                        then_drain: true,
                    }
                }
            }
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
            Phase::ChecksumDigits { .. } => "checksum_digits",
            Phase::Trailing(_) => "trailing",
        }
    }
}
