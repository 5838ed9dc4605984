//! The parser's sole mutable aggregate, the protocol extension points, and
//! the read-only view handed to callbacks.
use std::sync::Arc;

/// An immutable, per-protocol description: name, sizing hints, and the entry
/// point for recognizing this protocol's preamble.
///
/// A small, `Copy`-free description record owned by the table the caller
/// hands to [`crate::dispatch::begin_parser`], kept alive behind an `Arc` so
/// the dispatch core can clone its parser table cheaply on every preamble
/// search without borrowing `self`.
pub trait ParserDescription {
    /// Human-readable protocol name (e.g. `"NMEA"`, `"RTCM"`).
    fn name(&self) -> &'static str;

    /// Largest valid frame size this protocol can produce, in bytes.
    fn minimum_parse_area_bytes(&self) -> usize;

    /// Byte distance from the start of the buffered frame to the first
    /// payload byte.
    fn payload_offset(&self) -> usize;

    /// Attempts to begin a frame given `byte` as the sole buffered byte so
    /// far. On acceptance, returns the freshly constructed initial protocol
    /// state, having used `ctx` to seed any running CRC the protocol needs
    /// accumulated from this very first byte onward.
    fn try_accept(&self, ctx: &mut StepContext<'_>, byte: u8) -> Option<Box<dyn ProtocolState>>;

    /// Gives this protocol first refusal on a stretch of bytes the
    /// dispatch core is about to discard (SBF carries its own invalid-data
    /// override alongside the core-level one). Returning `true` means this
    /// protocol has handled `bytes` itself and the core should not also
    /// hand them to its own `invalid_data` sink. The default declines,
    /// falling back to the core-level sink.
    fn handle_invalid_data(&self, _bytes: &[u8]) -> bool {
        false
    }
}

/// The live, per-frame state machine for one protocol.
///
/// Cross-state bookkeeping (sentence-name buffers, byte counters, saved CRC
/// snapshots) lives as fields on the concrete type implementing this trait,
/// not in a shared scratch pad: each protocol module owns its own internal
/// phase enum plus whatever counters that phase needs.
pub trait ProtocolState {
    /// Advances the state machine by one byte, already appended to the
    /// working buffer the dispatch core maintains.
    fn step(&mut self, ctx: &mut StepContext<'_>, byte: u8) -> StepOutcome;

    /// Name of the current internal state, for diagnostics only.
    fn state_name(&self) -> &'static str;
}

/// What the dispatch core should do after a [`ProtocolState::step`] call.
pub enum StepOutcome {
    /// Byte consumed; keep driving this same protocol state.
    Continue,
    /// The frame's checksum/CRC has just been checked. The dispatch core
    /// consults `bad_crc` (if `matched` is `false`) to decide acceptance,
    /// delivers or discards the frame accordingly, then either fully resets
    /// to preamble scanning (`then_drain == false`) or keeps driving this
    /// same protocol state to silently absorb trailing bytes before a final
    /// [`StepOutcome::DrainDone`] (`then_drain == true`, used by NMEA and
    /// hash-sentence optional CR/LF trailers).
    ChecksumResult { matched: bool, then_drain: bool },
    /// Ends a `then_drain` sequence. `rescan_current_byte` is `true` when
    /// the current byte was not part of the trailer being absorbed and must
    /// be re-offered to preamble search.
    DrainDone { rescan_current_byte: bool },
    /// Pure framing failure with no checksum to consult (bad header field,
    /// name overflow, non-printable abort, invalid length): the buffered
    /// frame minus the current byte is discarded (via `invalid_data` if
    /// set), and the current byte is re-offered to preamble search.
    Reject,
}

/// The mutable pieces of [`crate::state::ParseState`] a protocol state
/// machine is allowed to touch while stepping: the buffered bytes so far,
/// the running CRC register and its optional per-byte update hook, the two
/// ASCII "abort on nonprintable" flags, and the diagnostic sinks.
pub struct StepContext<'a> {
    pub(crate) buffer: &'a [u8],
    pub(crate) crc: &'a mut u32,
    pub(crate) compute_crc: &'a mut Option<fn(u32, u8) -> u32>,
    pub(crate) nmea_abort_on_nonprintable: bool,
    pub(crate) hash_abort_on_nonprintable: bool,
    pub(crate) verbose_debug: bool,
    pub(crate) invalid_data: &'a mut Option<Box<dyn FnMut(&[u8])>>,
    pub(crate) debug_output: &'a mut Option<Box<dyn FnMut(u8)>>,
    pub(crate) print_error: &'a mut Option<Box<dyn FnMut(u8)>>,
    pub(crate) parser_name: &'a str,
}

impl<'a> StepContext<'a> {
    /// The frame buffered so far, including the byte that triggered this
    /// `step` call.
    pub fn buffer(&self) -> &[u8] {
        self.buffer
    }

    /// The current running CRC register.
    pub fn crc(&self) -> u32 {
        *self.crc
    }

    /// Overwrites the running CRC register, e.g. to seed it at the start of
    /// a frame.
    pub fn set_crc(&mut self, value: u32) {
        *self.crc = value;
    }

    /// Installs (or clears, with `None`) the per-byte CRC update hook the
    /// dispatch core invokes on every subsequent buffered byte.
    pub fn set_crc_hook(&mut self, hook: Option<fn(u32, u8) -> u32>) {
        *self.compute_crc = hook;
    }

    pub fn nmea_abort_on_nonprintable(&self) -> bool {
        self.nmea_abort_on_nonprintable
    }

    pub fn hash_abort_on_nonprintable(&self) -> bool {
        self.hash_abort_on_nonprintable
    }

    /// Reports a protocol-specific framing/integrity failure to
    /// `print_error`, if set.
    pub fn report_error(&mut self, message: &str) {
        crate::print::diagnostic(self.print_error, self.parser_name, message);
    }

    /// Reports a checksum/CRC mismatch to `print_error`, if set, including
    /// the expected and received values rendered as `hex_digits`-wide
    /// uppercase hex (e.g. 2 for an 8-bit XOR fold, 6 for CRC-24Q).
    pub fn report_checksum_mismatch(&mut self, expected: u32, received: u32, hex_digits: usize) {
        crate::print::diagnostic_with_values(
            self.print_error,
            self.parser_name,
            "checksum/CRC mismatch",
            expected,
            received,
            hex_digits,
        );
    }

    /// Reports a verbose per-frame trace to `debug_output`, a no-op unless
    /// `verbose_debug` is enabled.
    pub fn trace(&mut self, message: &str) {
        if self.verbose_debug {
            crate::print::diagnostic(self.debug_output, self.parser_name, message);
        }
    }

    /// Hands discarded bytes to `invalid_data`, if set. Protocols only need
    /// this for sub-frame discards (e.g. SBF's dedicated invalid-data
    /// override); the dispatch core handles whole-frame discards itself.
    pub fn flush_invalid(&mut self, bytes: &[u8]) {
        if let Some(sink) = self.invalid_data.as_mut() {
            sink(bytes);
        }
    }
}

/// A read-only view of one fully buffered frame, handed to the
/// end-of-message and bad-CRC callbacks. Carries no mutable access to the
/// parser: all accessor methods (see `accessors.rs`) are side-effect-free.
#[derive(Clone, Copy)]
pub struct Frame<'a> {
    pub(crate) type_index: usize,
    pub(crate) name: &'static str,
    pub(crate) buffer: &'a [u8],
    pub(crate) payload_offset: usize,
}

impl<'a> Frame<'a> {
    /// Index of the protocol that produced this frame within the table
    /// passed to `begin_parser`.
    pub fn type_index(&self) -> usize {
        self.type_index
    }

    /// Name of the protocol that produced this frame.
    pub fn protocol_name(&self) -> &'static str {
        self.name
    }

    /// The entire buffered frame, header through trailing checksum/CRC
    /// (NMEA and hash sentences are normalized to end in `\r\n`, regardless
    /// of which CR/LF variant, if any, was actually present on the wire).
    pub fn raw(&self) -> &'a [u8] {
        self.buffer
    }

    /// The payload region: `raw()[payload_offset..]`.
    pub fn payload(&self) -> &'a [u8] {
        &self.buffer[self.payload_offset.min(self.buffer.len())..]
    }

    /// Distance from the start of `raw()` to the first payload byte.
    pub fn payload_offset(&self) -> usize {
        self.payload_offset
    }
}

/// A table of protocol descriptions, shared cheaply (via `Arc`) between the
/// per-byte preamble search and the rest of the dispatch core.
pub type ParserTable = Vec<Arc<dyn ParserDescription>>;

/// Running counters a caller can inspect for coarse health monitoring;
/// derived entirely from bookkeeping the dispatch core already keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub frames_accepted: u64,
    pub frames_rejected: u64,
    pub bytes_discarded: u64,
}

/// The sole mutable aggregate owned by the parser.
///
/// Callbacks and diagnostic sinks are required to be `'static`: like most
/// Rust APIs that stash a closure for later, indefinitely-delayed
/// invocation (cf. `std::thread::spawn`), a `ParseState` has no way to
/// express "this closure's borrow must outlive this specific instance"
/// without the registration site and every call site agreeing on a shared
/// lifetime, which the byte-at-a-time driving model makes impractical.
/// Callers needing to share state with a callback should capture an `Rc`/
/// `Arc` (or a channel sender) by value instead of borrowing.
pub struct ParseState {
    pub(crate) parser_name: String,
    pub(crate) parsers: ParserTable,
    pub(crate) active: Option<Box<dyn ProtocolState>>,
    pub(crate) type_index: usize,
    pub(crate) buffer: Vec<u8>,
    pub(crate) buffer_capacity: usize,
    pub(crate) crc: u32,
    pub(crate) compute_crc: Option<fn(u32, u8) -> u32>,
    pub(crate) eom_callback: Box<dyn FnMut(&Frame<'_>)>,
    pub(crate) bad_crc: Option<Box<dyn FnMut(&Frame<'_>) -> bool>>,
    pub(crate) invalid_data: Option<Box<dyn FnMut(&[u8])>>,
    pub(crate) debug_output: Option<Box<dyn FnMut(u8)>>,
    pub(crate) print_error: Option<Box<dyn FnMut(u8)>>,
    pub(crate) nmea_abort_on_nonprintable: bool,
    pub(crate) hash_abort_on_nonprintable: bool,
    pub(crate) verbose_debug: bool,
    pub(crate) stats: ParseStats,
}

impl ParseState {
    /// Index of the protocol currently driving the state machine, or
    /// `parsers.len()` while searching for a preamble.
    pub fn type_index(&self) -> usize {
        self.type_index
    }

    /// `true` exactly when no protocol is currently mid-frame.
    pub fn is_searching(&self) -> bool {
        self.active.is_none()
    }

    /// Name of the protocol currently driving the state machine, if any.
    pub fn active_protocol_name(&self) -> Option<&'static str> {
        self.parsers.get(self.type_index).map(|p| p.name())
    }

    /// Name of the current internal state of the active protocol, if any.
    pub fn active_state_name(&self) -> Option<&'static str> {
        self.active.as_ref().map(|s| s.state_name())
    }

    /// Bytes buffered for the frame currently under construction.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Name this `ParseState` was constructed with (diagnostics only).
    pub fn parser_name(&self) -> &str {
        &self.parser_name
    }

    /// Enables or disables NMEA non-printable aborting (default: disabled).
    pub fn set_nmea_abort_on_nonprintable(&mut self, enabled: bool) {
        self.nmea_abort_on_nonprintable = enabled;
    }

    /// Enables or disables hash-sentence non-printable aborting (default:
    /// disabled).
    pub fn set_hash_abort_on_nonprintable(&mut self, enabled: bool) {
        self.hash_abort_on_nonprintable = enabled;
    }

    /// Enables or disables verbose per-frame debug tracing (default:
    /// disabled).
    pub fn set_verbose_debug(&mut self, enabled: bool) {
        self.verbose_debug = enabled;
    }

    /// Installs (or clears) the debug-trace character sink.
    pub fn set_debug_output(&mut self, sink: Option<Box<dyn FnMut(u8)>>) {
        self.debug_output = sink;
    }

    /// Installs (or clears) the error-diagnostic character sink.
    pub fn set_print_error(&mut self, sink: Option<Box<dyn FnMut(u8)>>) {
        self.print_error = sink;
    }

    /// Installs (or clears) the bad-CRC override.
    pub fn set_bad_crc(&mut self, cb: Option<Box<dyn FnMut(&Frame<'_>) -> bool>>) {
        self.bad_crc = cb;
    }

    /// Installs (or clears) the invalid-data sink.
    pub fn set_invalid_data(&mut self, cb: Option<Box<dyn FnMut(&[u8])>>) {
        self.invalid_data = cb;
    }

    /// Frames accepted / rejected and bytes discarded since construction.
    pub fn stats(&self) -> ParseStats {
        self.stats
    }
}
