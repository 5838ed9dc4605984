//! The dispatch core: preamble search, per-byte buffering and CRC
//! accumulation, end-of-message delivery, and local error recovery.
//!
//! A caller-owned buffer could be carved into a state struct, a scratch
//! pad, and a parse area, but Rust's ownership model makes that split
//! unnecessary: `ParseState` owns its working buffer directly as a `Vec<u8>`
//! sized once at construction, and each protocol's cross-state bookkeeping
//! lives as fields on its own `ProtocolState` implementor rather than in a
//! shared scratch pad. `compute_buffer_overhead`/`get_buffer_length` are
//! kept as sizing helpers for buffer-capacity math, with `overhead` fixed
//! at zero under this ownership model.
use crate::error::{ParserError, Result};
use crate::state::{Frame, ParseState, ParseStats, ParserTable, StepOutcome};

/// Sizing hints derived from a parser table. `overhead` is always `0` here:
/// nothing is carved from the parse area for state structs or scratch pads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferOverhead {
    pub overhead: usize,
    pub parse_area_min: usize,
    pub payload_offset_max: usize,
}

/// Computes the sizing hints a parser table implies.
///
/// # Panics
/// Panics if `parsers` is empty; callers that need a fallible variant
/// should check `parsers.is_empty()` themselves (as [`ParseState::begin_parser`]
/// does) before calling this.
pub fn compute_buffer_overhead(parsers: &ParserTable) -> BufferOverhead {
    assert!(!parsers.is_empty(), "parser table must not be empty");
    let parse_area_min = parsers
        .iter()
        .map(|p| p.minimum_parse_area_bytes())
        .max()
        .unwrap_or(0);
    let payload_offset_max = parsers.iter().map(|p| p.payload_offset()).max().unwrap_or(0);
    BufferOverhead {
        overhead: 0,
        parse_area_min,
        payload_offset_max,
    }
}

/// The smallest buffer capacity that can hold every frame this table can
/// produce, or `desired_parse_area` if that happens to be larger.
pub fn get_buffer_length(parsers: &ParserTable, desired_parse_area: usize) -> usize {
    let overhead = compute_buffer_overhead(parsers);
    overhead.overhead
        + desired_parse_area
            .max(overhead.parse_area_min)
            .max(overhead.payload_offset_max)
            .max(1)
}

impl ParseState {
    /// Constructs a new `ParseState` over `parsers`, with a working buffer
    /// sized to `buffer_capacity` bytes.
    ///
    /// Validates a non-empty `name`, a non-empty `parsers` table, and a
    /// `buffer_capacity` large enough to hold the table's largest frame plus
    /// its largest payload offset.
    #[allow(clippy::too_many_arguments)]
    pub fn begin_parser(
        name: impl Into<String>,
        parsers: ParserTable,
        buffer_capacity: usize,
        eom_callback: Box<dyn FnMut(&Frame<'_>)>,
        print_error: Option<Box<dyn FnMut(u8)>>,
        debug_output: Option<Box<dyn FnMut(u8)>>,
        bad_crc: Option<Box<dyn FnMut(&Frame<'_>) -> bool>>,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ParserError::EmptyName);
        }
        if parsers.is_empty() {
            return Err(ParserError::EmptyParserTable);
        }
        let required = get_buffer_length(&parsers, 0);
        if buffer_capacity < required {
            return Err(ParserError::BufferTooSmall {
                required,
                supplied: buffer_capacity,
            });
        }

        let type_index = parsers.len();
        Ok(ParseState {
            parser_name: name,
            parsers,
            active: None,
            type_index,
            buffer: Vec::with_capacity(buffer_capacity),
            buffer_capacity,
            crc: 0,
            compute_crc: None,
            eom_callback,
            bad_crc,
            invalid_data: None,
            debug_output,
            print_error,
            nmea_abort_on_nonprintable: false,
            hash_abort_on_nonprintable: false,
            verbose_debug: false,
            stats: ParseStats::default(),
        })
    }

    /// Feeds one byte through the dispatch core.
    pub fn parse_next_byte(&mut self, byte: u8) {
        if self.buffer.len() == self.buffer_capacity {
            self.handle_overflow(byte);
            return;
        }

        if self.active.is_none() {
            debug_assert!(self.buffer.is_empty());
            self.crc = 0;
            self.compute_crc = None;
            self.begin_preamble(byte);
            return;
        }

        self.buffer.push(byte);
        if let Some(hook) = self.compute_crc {
            self.crc = hook(self.crc, byte);
        }

        let mut active = self.active.take().expect("active checked above");
        let outcome = {
            let mut ctx = self.context();
            active.step(&mut ctx, byte)
        };
        self.active = Some(active);

        match outcome {
            StepOutcome::Continue => {}
            StepOutcome::ChecksumResult { matched, then_drain } => {
                self.handle_checksum_result(matched, then_drain);
            }
            StepOutcome::DrainDone { rescan_current_byte } => {
                self.handle_drain_done(rescan_current_byte, byte);
            }
            StepOutcome::Reject => {
                self.handle_reject(byte);
            }
        }
    }

    /// Feeds a whole slice through [`Self::parse_next_byte`] in order.
    pub fn parse_next_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.parse_next_byte(byte);
        }
    }

    /// Detaches this parser. There is no caller-owned buffer to release
    /// separately: consuming `self` drops the owned working buffer along
    /// with it.
    pub fn stop(self) {}

    fn context(&mut self) -> crate::state::StepContext<'_> {
        crate::state::StepContext {
            buffer: &self.buffer,
            crc: &mut self.crc,
            compute_crc: &mut self.compute_crc,
            nmea_abort_on_nonprintable: self.nmea_abort_on_nonprintable,
            hash_abort_on_nonprintable: self.hash_abort_on_nonprintable,
            verbose_debug: self.verbose_debug,
            invalid_data: &mut self.invalid_data,
            debug_output: &mut self.debug_output,
            print_error: &mut self.print_error,
            parser_name: &self.parser_name,
        }
    }

    fn reset_to_search(&mut self) {
        self.buffer.clear();
        self.crc = 0;
        self.compute_crc = None;
        self.active = None;
        self.type_index = self.parsers.len();
    }

    /// Tries every parser in table order against `byte` as the sole buffered
    /// byte, indexed by the loop counter itself: there is no second index
    /// variable to drift out of sync.
    fn begin_preamble(&mut self, byte: u8) {
        self.buffer.push(byte);
        let parsers = self.parsers.clone();
        for (index, parser) in parsers.iter().enumerate() {
            self.type_index = index;
            let accepted = {
                let mut ctx = self.context();
                parser.try_accept(&mut ctx, byte)
            };
            if let Some(active) = accepted {
                self.active = Some(active);
                return;
            }
        }
        self.type_index = self.parsers.len();
        if !self.buffer.is_empty() {
            self.stats.bytes_discarded += self.buffer.len() as u64;
            let discarded: Vec<u8> = self.buffer.drain(..).collect();
            self.flush_invalid(&discarded);
        }
    }

    fn report_error(&mut self, message: &str) {
        crate::print::diagnostic(&mut self.print_error, &self.parser_name, message);
    }

    /// Offers `bytes` to the active parser's own override first (SBF's
    /// dedicated invalid-data sink), falling back to the core-level
    /// `invalid_data` callback when there is no active parser or it
    /// declines.
    fn flush_invalid(&mut self, bytes: &[u8]) {
        let handled = self
            .parsers
            .get(self.type_index)
            .is_some_and(|parser| parser.handle_invalid_data(bytes));
        if !handled {
            if let Some(sink) = self.invalid_data.as_mut() {
                sink(bytes);
            }
        }
    }

    fn deliver_frame(&mut self) {
        let type_index = self.type_index;
        let name = self.parsers[type_index].name();
        let payload_offset = self.parsers[type_index].payload_offset();
        let frame = Frame {
            type_index,
            name,
            buffer: &self.buffer,
            payload_offset,
        };
        (self.eom_callback)(&frame);
        self.stats.frames_accepted += 1;
    }

    /// `true` if the frame should be treated as valid: either the checksum
    /// matched outright, or a `bad_crc` override was installed and returned
    /// `false`.
    fn checksum_accept(&mut self, matched: bool) -> bool {
        if matched {
            return true;
        }
        match self.bad_crc.as_mut() {
            Some(cb) => {
                let type_index = self.type_index;
                let name = self.parsers[type_index].name();
                let payload_offset = self.parsers[type_index].payload_offset();
                let frame = Frame {
                    type_index,
                    name,
                    buffer: &self.buffer,
                    payload_offset,
                };
                !cb(&frame)
            }
            None => false,
        }
    }

    fn handle_overflow(&mut self, byte: u8) {
        self.report_error("message too long, discarding buffered frame");
        if !self.buffer.is_empty() {
            self.stats.bytes_discarded += self.buffer.len() as u64;
            let discarded: Vec<u8> = self.buffer.drain(..).collect();
            self.flush_invalid(&discarded);
        }
        self.reset_to_search();
        self.begin_preamble(byte);
    }

    /// Delivers or discards the buffered frame per `accept`. Does not touch
    /// `active`/`type_index`/`buffer` bookkeeping — callers reset those
    /// themselves once they know whether a trailer still needs absorbing.
    fn finish_frame(&mut self, accept: bool) {
        if accept {
            self.deliver_frame();
        } else {
            self.stats.frames_rejected += 1;
            if !self.buffer.is_empty() {
                self.stats.bytes_discarded += self.buffer.len() as u64;
                let discarded: Vec<u8> = self.buffer.drain(..).collect();
                self.flush_invalid(&discarded);
            }
        }
    }

    fn handle_checksum_result(&mut self, matched: bool, then_drain: bool) {
        // The protocol state machine already reported the mismatch, with the
        // expected/received values, before returning this outcome.
        let accept = self.checksum_accept(matched);
        if then_drain && accept {
            // NMEA/hash sentences deliver on a normalized `\r\n` trailer
            // rather than whatever CR/LF bytes actually follow on the wire
            // (which can be `\r\n`, `\n\r`, just one, or none at all): the
            // real bytes are absorbed separately, below, purely to resync
            // scanning, and never appended to the delivered frame.
            self.buffer.extend_from_slice(b"\r\n");
        }
        self.finish_frame(accept);
        if !then_drain {
            self.reset_to_search();
        }
    }

    fn handle_drain_done(&mut self, rescan_current_byte: bool, byte: u8) {
        if rescan_current_byte {
            let popped = self.buffer.pop();
            debug_assert_eq!(popped, Some(byte));
        }
        self.reset_to_search();
        if rescan_current_byte {
            self.begin_preamble(byte);
        }
    }

    fn handle_reject(&mut self, byte: u8) {
        self.stats.frames_rejected += 1;
        let popped = self.buffer.pop();
        debug_assert_eq!(popped, Some(byte));
        if !self.buffer.is_empty() {
            self.stats.bytes_discarded += self.buffer.len() as u64;
            let discarded: Vec<u8> = self.buffer.drain(..).collect();
            self.flush_invalid(&discarded);
        }
        self.reset_to_search();
        self.begin_preamble(byte);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::state::{ParserDescription, ProtocolState, StepContext};
    use rstest::rstest;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    /// A minimal 3-byte fixed-length protocol (`0x7E LEN DATA`, single data
    /// byte, XOR "checksum" against the data byte itself) used to exercise
    /// overflow recovery and basic accept/reject plumbing without pulling in
    /// a full protocol module.
    struct ToyDescription;

    impl ParserDescription for ToyDescription {
        fn name(&self) -> &'static str {
            "TOY"
        }
        fn minimum_parse_area_bytes(&self) -> usize {
            3
        }
        fn payload_offset(&self) -> usize {
            2
        }
        fn try_accept(&self, _ctx: &mut StepContext<'_>, byte: u8) -> Option<Box<dyn ProtocolState>> {
            if byte == 0x7E {
                Some(Box::new(ToyState { seen_len: false }))
            } else {
                None
            }
        }
    }

    struct ToyState {
        seen_len: bool,
    }

    impl ProtocolState for ToyState {
        fn step(&mut self, _ctx: &mut StepContext<'_>, byte: u8) -> StepOutcome {
            if !self.seen_len {
                self.seen_len = true;
                if byte != 0x01 {
                    return StepOutcome::Reject;
                }
                StepOutcome::Continue
            } else {
                StepOutcome::ChecksumResult {
                    matched: true,
                    then_drain: false,
                }
            }
        }
        fn state_name(&self) -> &'static str {
            "data"
        }
    }

    fn toy_table() -> ParserTable {
        vec![Arc::new(ToyDescription) as Arc<dyn ParserDescription>]
    }

    #[rstest]
    fn accepts_one_frame() {
        let delivered = Rc::new(RefCell::new(Vec::new()));
        let delivered_cb = delivered.clone();
        let mut state = ParseState::begin_parser(
            "toy",
            toy_table(),
            16,
            Box::new(move |frame| delivered_cb.borrow_mut().push(frame.raw().to_vec())),
            None,
            None,
            None,
        )
        .unwrap();

        state.parse_next_bytes(&[0x7E, 0x01, 0xAA]);

        assert_eq!(delivered.borrow().as_slice(), &[vec![0x7E, 0x01, 0xAA]]);
        assert_eq!(state.stats().frames_accepted, 1);
        assert!(state.is_searching());
    }

    #[rstest]
    fn rejects_and_resumes_on_current_byte() {
        let delivered = Rc::new(RefCell::new(Vec::new()));
        let delivered_cb = delivered.clone();
        let mut state = ParseState::begin_parser(
            "toy",
            toy_table(),
            16,
            Box::new(move |frame| delivered_cb.borrow_mut().push(frame.raw().to_vec())),
            None,
            None,
            None,
        )
        .unwrap();

        // 0x7E 0x02 is rejected (bad length byte); 0x7E immediately after is
        // re-offered to preamble search and starts a fresh, valid frame.
        state.parse_next_bytes(&[0x7E, 0x02, 0x7E, 0x01, 0x55]);

        assert_eq!(delivered.borrow().as_slice(), &[vec![0x7E, 0x01, 0x55]]);
        assert_eq!(state.stats().frames_rejected, 1);
        assert_eq!(state.stats().frames_accepted, 1);
    }

    #[rstest]
    fn buffer_overflow_recovers_on_next_valid_frame() {
        // buffer_length == 3, feed 4 bytes of a would-be frame, then a
        // valid 3-byte frame.
        let delivered = Rc::new(RefCell::new(Vec::new()));
        let delivered_cb = delivered.clone();
        let discarded = Rc::new(RefCell::new(Vec::new()));
        let discarded_cb = discarded.clone();
        let mut state = ParseState::begin_parser(
            "toy",
            toy_table(),
            3,
            Box::new(move |frame| delivered_cb.borrow_mut().push(frame.raw().to_vec())),
            None,
            None,
            None,
        )
        .unwrap();
        state.set_invalid_data(Some(Box::new(move |bytes| {
            discarded_cb.borrow_mut().push(bytes.to_vec())
        })));

        state.parse_next_bytes(&[0x7E, 0x01, 0xAA, 0xBB]);
        state.parse_next_bytes(&[0x7E, 0x01, 0x55]);

        assert_eq!(delivered.borrow().as_slice(), &[vec![0x7E, 0x01, 0x55]]);
        assert!(!discarded.borrow().is_empty());
    }

    #[rstest]
    fn compute_buffer_overhead_reports_table_maxima() {
        let overhead = compute_buffer_overhead(&toy_table());
        assert_eq!(overhead.overhead, 0);
        assert_eq!(overhead.parse_area_min, 3);
        assert_eq!(overhead.payload_offset_max, 2);
    }

    #[rstest]
    fn begin_parser_rejects_undersized_buffer() {
        let err = ParseState::begin_parser("toy", toy_table(), 1, Box::new(|_| {}), None, None, None)
            .unwrap_err();
        assert!(matches!(err, ParserError::BufferTooSmall { .. }));
    }

    #[rstest]
    fn begin_parser_rejects_empty_name() {
        let err = ParseState::begin_parser("", toy_table(), 16, Box::new(|_| {}), None, None, None)
            .unwrap_err();
        assert!(matches!(err, ParserError::EmptyName));
    }
}
