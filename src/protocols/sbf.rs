//! Septentrio Binary Format (SBF) blocks: `$@` preamble, a 2-byte
//! little-endian expected CRC, a 2-byte little-endian ID/revision field (13
//! bits of block ID, 3 bits of revision), a 2-byte little-endian length that
//! must be a multiple of four, and a payload. The CRC is
//! CRC-CCITT (Kermit) over everything from the ID/revision field through the
//! end of the payload — the preamble and the expected-CRC field itself are
//! excluded from the running accumulator, which is why it is seeded fresh
//! right after the expected-CRC field is consumed rather than from the first
//! preamble byte.
use crate::crc_engines::crc_ccitt_kermit_step_u32;
use crate::state::{ParserDescription, ProtocolState, StepContext, StepOutcome};
use std::cell::RefCell;
use std::rc::Rc;

/// `length` is a 16-bit field and must be a multiple of 4; the 8-byte header
/// (preamble, expected CRC, ID/revision, length) is not itself part of the
/// counted payload.
pub const MINIMUM_PARSE_AREA_BYTES: usize = 8 + u16::MAX as usize;

type InvalidDataSink = Rc<RefCell<Option<Box<dyn FnMut(&[u8])>>>>;

/// An SBF parser table entry with its own invalid-data override: blocks
/// discarded for a bad length or a failed CRC go to this sink instead of
/// the core-level `invalid_data` callback, when one is set.
pub struct SbfDescription {
    invalid_data: InvalidDataSink,
}

impl SbfDescription {
    pub fn new() -> Self {
        Self {
            invalid_data: Rc::new(RefCell::new(None)),
        }
    }

    /// Installs (or clears) the SBF-specific invalid-data sink.
    pub fn set_invalid_data(&self, sink: Option<Box<dyn FnMut(&[u8])>>) {
        *self.invalid_data.borrow_mut() = sink;
    }
}

impl Default for SbfDescription {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserDescription for SbfDescription {
    fn name(&self) -> &'static str {
        "SBF"
    }

    fn minimum_parse_area_bytes(&self) -> usize {
        MINIMUM_PARSE_AREA_BYTES
    }

    fn payload_offset(&self) -> usize {
        8
    }

    fn try_accept(&self, _ctx: &mut StepContext<'_>, byte: u8) -> Option<Box<dyn ProtocolState>> {
        (byte == 0x24).then(|| {
            Box::new(SbfState {
                phase: Phase::Preamble2,
                expected_crc: 0,
            }) as Box<dyn ProtocolState>
        })
    }

    fn handle_invalid_data(&self, bytes: &[u8]) -> bool {
        match self.invalid_data.borrow_mut().as_mut() {
            Some(sink) => {
                sink(bytes);
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Preamble2,
    Crc1,
    Crc2 { crc_lo: u8 },
    Id1,
    Id2 { id_lo: u8 },
    LengthLsb,
    LengthMsb { len_lo: u8 },
    Payload { remaining: usize },
}

struct SbfState {
    phase: Phase,
    expected_crc: u16,
}

fn checksum_result(ctx: &mut StepContext<'_>, expected_crc: u16) -> StepOutcome {
    let received = ctx.crc() as u16;
    let matched = received == expected_crc;
    if !matched {
        ctx.report_checksum_mismatch(u32::from(expected_crc), u32::from(received), 4);
    }
    StepOutcome::ChecksumResult {
        matched,
        then_drain: false,
    }
}

impl ProtocolState for SbfState {
    fn step(&mut self, ctx: &mut StepContext<'_>, byte: u8) -> StepOutcome {
        match self.phase {
            Phase::Preamble2 => {
                if byte != 0x40 {
                    ctx.report_error("invalid SBF preamble second byte");
                    return StepOutcome::Reject;
                }
                self.phase = Phase::Crc1;
                StepOutcome::Continue
            }
            Phase::Crc1 => {
                self.phase = Phase::Crc2 { crc_lo: byte };
                StepOutcome::Continue
            }
            Phase::Crc2 { crc_lo } => {
                self.expected_crc = u16::from(crc_lo) | (u16::from(byte) << 8);
                // The running CRC covers everything from here on: the
                // ID/revision field through the end of the payload.
                ctx.set_crc(0);
                ctx.set_crc_hook(Some(crc_ccitt_kermit_step_u32));
                self.phase = Phase::Id1;
                StepOutcome::Continue
            }
            Phase::Id1 => {
                self.phase = Phase::Id2 { id_lo: byte };
                StepOutcome::Continue
            }
            Phase::Id2 { .. } => {
                self.phase = Phase::LengthLsb;
                StepOutcome::Continue
            }
            Phase::LengthLsb => {
                self.phase = Phase::LengthMsb { len_lo: byte };
                StepOutcome::Continue
            }
            Phase::LengthMsb { len_lo } => {
                let length = u16::from(len_lo) | (u16::from(byte) << 8);
                if length % 4 != 0 {
                    ctx.report_error("SBF block length is not a multiple of 4");
                    return StepOutcome::Reject;
                }
                let remaining = (length as usize).saturating_sub(8);
                self.phase = if remaining == 0 {
                    return checksum_result(ctx, self.expected_crc);
                } else {
                    Phase::Payload { remaining }
                };
                StepOutcome::Continue
            }
            Phase::Payload { remaining } => {
                let remaining = remaining - 1;
                if remaining == 0 {
                    checksum_result(ctx, self.expected_crc)
                } else {
                    self.phase = Phase::Payload { remaining };
                    StepOutcome::Continue
                }
            }
        }
    }

    fn state_name(&self) -> &'static str {
        match self.phase {
            Phase::Preamble2 => "preamble2",
            Phase::Crc1 => "crc1",
            Phase::Crc2 { .. } => "crc2",
            Phase::Id1 => "id1",
            Phase::Id2 { .. } => "id2",
            Phase::LengthLsb => "length_lsb",
            Phase::LengthMsb { .. } => "length_msb",
            Phase::Payload { .. } => "payload",
        }
    }
}
