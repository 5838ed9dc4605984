//! Formatting helpers over a caller-supplied single-character output sink.
//!
//! These exist purely for diagnostics (the `debug_output` and `print_error`
//! sinks); nothing here is on the hot path of framing or CRC validation.
//! Formatting work is skipped entirely when no sink is present.

/// Writes `s` one byte at a time through `sink`.
pub fn write_str(sink: &mut dyn FnMut(u8), s: &str) {
    for b in s.bytes() {
        sink(b);
    }
}

/// Writes `value` as uppercase hexadecimal, zero-padded to `digits` nibbles.
pub fn write_hex(sink: &mut dyn FnMut(u8), value: u32, digits: usize) {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    for shift in (0..digits).rev() {
        let nibble = ((value >> (shift * 4)) & 0xF) as usize;
        sink(HEX[nibble]);
    }
}

/// Writes `value` as decimal with no leading zeros (`0` prints as `"0"`).
pub fn write_dec(sink: &mut dyn FnMut(u8), mut value: u64) {
    if value == 0 {
        sink(b'0');
        return;
    }
    let mut digits = [0u8; 20];
    let mut n = 0;
    while value > 0 {
        digits[n] = b'0' + (value % 10) as u8;
        value /= 10;
        n += 1;
    }
    for &d in digits[..n].iter().rev() {
        sink(d);
    }
}

/// Writes `value` right-justified in a field of `width` spaces.
pub fn write_justified(sink: &mut dyn FnMut(u8), value: u64, width: usize) {
    let mut rendered = Vec::with_capacity(20);
    write_dec(&mut |b| rendered.push(b), value);
    for _ in rendered.len()..width {
        sink(b' ');
    }
    for b in rendered {
        sink(b);
    }
}

/// Emits a one-line diagnostic of the form `<parser_name>: <message>\n`
/// through `sink`, if present.
pub fn diagnostic(sink: &mut Option<Box<dyn FnMut(u8)>>, parser_name: &str, message: &str) {
    if let Some(sink) = sink.as_mut() {
        write_str(sink.as_mut(), parser_name);
        write_str(sink.as_mut(), ": ");
        write_str(sink.as_mut(), message);
        sink(b'\n');
    }
}

/// Emits a one-line diagnostic of the form
/// `<parser_name>: <message> (expected <hex>, received <hex>)\n` through
/// `sink`, if present. Used where the caller already has both the expected
/// and received checksum/CRC values in hand and wants them in the
/// diagnostic rather than just the fact of a mismatch.
pub fn diagnostic_with_values(
    sink: &mut Option<Box<dyn FnMut(u8)>>,
    parser_name: &str,
    message: &str,
    expected: u32,
    received: u32,
    hex_digits: usize,
) {
    if let Some(sink) = sink.as_mut() {
        write_str(sink.as_mut(), parser_name);
        write_str(sink.as_mut(), ": ");
        write_str(sink.as_mut(), message);
        write_str(sink.as_mut(), " (expected ");
        write_hex(sink.as_mut(), expected, hex_digits);
        write_str(sink.as_mut(), ", received ");
        write_hex(sink.as_mut(), received, hex_digits);
        write_str(sink.as_mut(), ")");
        sink(b'\n');
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    fn collect(f: impl FnOnce(&mut dyn FnMut(u8))) -> String {
        let mut out = Vec::new();
        f(&mut |b| out.push(b));
        String::from_utf8(out).unwrap()
    }

    #[rstest]
    #[case(0x0, 2, "00")]
    #[case(0xFF, 2, "FF")]
    #[case(0x3E, 4, "003E")]
    fn hex_formatting(#[case] value: u32, #[case] digits: usize, #[case] expected: &str) {
        assert_eq!(collect(|s| write_hex(s, value, digits)), expected);
    }

    #[rstest]
    #[case(0, "0")]
    #[case(1005, "1005")]
    fn dec_formatting(#[case] value: u64, #[case] expected: &str) {
        assert_eq!(collect(|s| write_dec(s, value)), expected);
    }

    #[rstest]
    fn justified_pads_with_spaces() {
        assert_eq!(collect(|s| write_justified(s, 7, 4)), "   7");
    }

    #[rstest]
    fn diagnostic_with_values_formats_expected_and_received() {
        let mut out = Vec::new();
        let mut sink: Option<Box<dyn FnMut(u8)>> = Some(Box::new(|b| out.push(b)));
        diagnostic_with_values(&mut sink, "NMEA", "checksum/CRC mismatch", 0x69, 0x42, 2);
        drop(sink);
        assert_eq!(String::from_utf8(out).unwrap(), "NMEA: checksum/CRC mismatch (expected 69, received 42)\n");
    }

    #[rstest]
    fn diagnostic_with_values_is_a_no_op_with_no_sink() {
        let mut sink: Option<Box<dyn FnMut(u8)>> = None;
        diagnostic_with_values(&mut sink, "NMEA", "checksum/CRC mismatch", 0x69, 0x42, 2);
    }
}
