//! CRC and checksum engines shared by the protocol state machines.
//!
//! Every table-driven algorithm is built once, behind a [`lazy_static`], on
//! top of the `crc` crate's generic `Algorithm`/`Crc` machinery. The two
//! hand-rolled checksums (NMEA/hash-sentence XOR and u-blox Fletcher-8) are
//! plain functions since they need no precomputed table.
use crc::{Algorithm, Crc};
use lazy_static::lazy_static;

/// CRC-24Q, a.k.a. "CRC-24/OPENPGP": used by RTCM3 frames and by the SPARTN
/// trailing CRC when `crcType == 2`.
const CRC24Q_ALGO: Algorithm<u32> = Algorithm {
    width: 24,
    poly: 0x0086_4cfb,
    init: 0x00b7_04ce,
    refin: false,
    refout: false,
    xorout: 0x0000_0000,
    check: 0x0021_cf02,
    residue: 0x0000_0000,
};

/// CRC-4/ITU: covers the first three bytes of a SPARTN header (with the
/// bottom nibble of byte 3 zeroed before the check).
const SPARTN_CRC4_ALGO: Algorithm<u8> = Algorithm {
    width: 4,
    poly: 0x03,
    init: 0x00,
    refin: true,
    refout: true,
    xorout: 0x00,
    check: 0x07,
    residue: 0x00,
};

lazy_static! {
    /// CRC-24Q over RTCM frames (preamble-exclusive) and SPARTN's 3-byte
    /// trailing CRC option.
    static ref CRC24Q: Crc<u32> = Crc::<u32>::new(&CRC24Q_ALGO);

    /// Reflected CRC-32 (the common "CRC-32/ISO-HDLC" zlib/PKZIP variant)
    /// used by Unicore binary frames and the `#VERSION` hash-sentence
    /// 8-nibble checksum, and by SPARTN's 4-byte trailing CRC option.
    static ref CRC32_REFLECTED: Crc<u32> = Crc::<u32>::new(&crc::CRC_32_ISO_HDLC);

    /// CRC-CCITT, Kermit variant, used by SBF block headers.
    static ref CRC_CCITT_KERMIT: Crc<u16> = Crc::<u16>::new(&crc::CRC_16_KERMIT);

    /// SPARTN header CRC-4.
    static ref SPARTN_CRC4: Crc<u8> = Crc::<u8>::new(&SPARTN_CRC4_ALGO);

    /// SPARTN trailing CRC-8 option (`crcType == 0`).
    static ref SPARTN_CRC8: Crc<u8> = Crc::<u8>::new(&crc::CRC_8_SMBUS);

    /// SPARTN trailing CRC-16 option (`crcType == 1`).
    static ref SPARTN_CRC16: Crc<u16> = Crc::<u16>::new(&crc::CRC_16_XMODEM);
}

/// Computes CRC-24Q over `bytes`, returning the 24-bit result in the low
/// bits of a `u32`.
pub fn crc24q(bytes: &[u8]) -> u32 {
    CRC24Q.checksum(bytes)
}

/// A single-byte update step for CRC-24Q, matching the dispatch core's
/// per-byte `compute_crc` hook.
///
/// `crc` carries the running register in its low 24 bits.
pub fn crc24q_step(crc: u32, byte: u8) -> u32 {
    let mut digest = CRC24Q.digest_with_initial(crc);
    digest.update(&[byte]);
    digest.finalize()
}

/// Computes the reflected CRC-32 over `bytes`.
pub fn crc32_reflected(bytes: &[u8]) -> u32 {
    CRC32_REFLECTED.checksum(bytes)
}

/// A single-byte update step for the reflected CRC-32, used by the dispatch
/// core's running accumulator for Unicore binary frames.
pub fn crc32_reflected_step(crc: u32, byte: u8) -> u32 {
    let mut digest = CRC32_REFLECTED.digest_with_initial(crc);
    digest.update(&[byte]);
    digest.finalize()
}

/// Computes CRC-CCITT (Kermit) over `bytes`, as used by SBF block headers.
pub fn crc_ccitt_kermit(bytes: &[u8]) -> u16 {
    CRC_CCITT_KERMIT.checksum(bytes)
}

/// A single-byte update step for CRC-CCITT (Kermit), used by the dispatch
/// core's running accumulator once an SBF header's expected-CRC field has
/// been consumed.
pub fn crc_ccitt_kermit_step(crc: u16, byte: u8) -> u16 {
    let mut digest = CRC_CCITT_KERMIT.digest_with_initial(crc);
    digest.update(&[byte]);
    digest.finalize()
}

/// As [`crc_ccitt_kermit_step`], but carrying the 16-bit register in a `u32`
/// so it fits the dispatch core's `compute_crc` hook signature.
pub fn crc_ccitt_kermit_step_u32(crc: u32, byte: u8) -> u32 {
    u32::from(crc_ccitt_kermit_step(crc as u16, byte))
}

/// Computes SPARTN's header CRC-4 over the first three header bytes, with
/// the bottom nibble of the third byte zeroed by the caller beforehand.
pub fn spartn_crc4(bytes: &[u8]) -> u8 {
    SPARTN_CRC4.checksum(bytes)
}

/// The four trailing-CRC algorithms SPARTN's `crcType` field selects
/// between, each returning the result left-aligned in the low
/// `crc_bytes * 8` bits of a `u32`.
pub fn spartn_trailing_crc(crc_type: u8, bytes: &[u8]) -> u32 {
    match crc_type {
        0 => u32::from(SPARTN_CRC8.checksum(bytes)),
        1 => u32::from(SPARTN_CRC16.checksum(bytes)),
        2 => crc24q(bytes),
        3 => crc32_reflected(bytes),
        other => panic!("invalid SPARTN crcType {other}, must be 0..=3"),
    }
}

/// Number of trailing CRC bytes for a given SPARTN `crcType` (0..=3).
pub fn spartn_crc_bytes(crc_type: u8) -> usize {
    match crc_type {
        0 => 1,
        1 => 2,
        2 => 3,
        3 => 4,
        other => panic!("invalid SPARTN crcType {other}, must be 0..=3"),
    }
}

/// 8-bit Fletcher checksum update used by u-blox UBX frames: `ck_a` is a
/// running sum of bytes, `ck_b` a running sum of `ck_a`.
pub fn fletcher8_step(ck_a: u8, ck_b: u8, byte: u8) -> (u8, u8) {
    let ck_a = ck_a.wrapping_add(byte);
    let ck_b = ck_b.wrapping_add(ck_a);
    (ck_a, ck_b)
}

/// Folds [`fletcher8_step`] over a whole slice, starting from `(0, 0)`.
pub fn fletcher8(bytes: &[u8]) -> (u8, u8) {
    bytes
        .iter()
        .fold((0u8, 0u8), |(ck_a, ck_b), &byte| fletcher8_step(ck_a, ck_b, byte))
}

/// XOR checksum used by NMEA and the 2-nibble hash-sentence variant, folded
/// over every byte strictly between the leading `$`/`#` and the trailing
/// `*`.
pub fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc ^ b)
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn crc24q_check_value() {
        // the `crc` crate's built-in self-check uses the ASCII string
        // "123456789" as the canonical CRC-CHECK vector.
        assert_eq!(CRC24Q.checksum(b"123456789"), 0x0021_cf02);
    }

    #[rstest]
    fn crc32_reflected_check_value() {
        assert_eq!(CRC32_REFLECTED.checksum(b"123456789"), 0xcbf4_3926);
    }

    #[rstest]
    fn crc_ccitt_kermit_check_value() {
        assert_eq!(CRC_CCITT_KERMIT.checksum(b"123456789"), 0x2189);
    }

    #[rstest]
    fn spartn_crc4_check_value() {
        assert_eq!(SPARTN_CRC4.checksum(b"123456789"), 0x07);
    }

    #[rstest]
    fn fletcher8_matches_manual_fold() {
        let bytes = [0x01, 0x02, 0x03, 0x04];
        let (ck_a, ck_b) = fletcher8(&bytes);

        let mut expect_a = 0u8;
        let mut expect_b = 0u8;
        for b in bytes {
            expect_a = expect_a.wrapping_add(b);
            expect_b = expect_b.wrapping_add(expect_a);
        }
        assert_eq!((expect_a, expect_b), (ck_a, ck_b));
    }

    #[rstest]
    fn xor_checksum_is_commutative_fold() {
        assert_eq!(xor_checksum(b"GPRMC"), b'G' ^ b'P' ^ b'R' ^ b'M' ^ b'C');
    }

    #[rstest]
    fn crc24q_step_matches_bulk() {
        let bytes = [0xD3, 0x00, 0x13, 0x3E, 0xD0];
        let bulk = crc24q(&bytes);
        let stepped = bytes.iter().fold(0u32, |crc, &b| crc24q_step(crc, b));
        assert_eq!(bulk, stepped & 0x00ff_ffff);
    }
}
