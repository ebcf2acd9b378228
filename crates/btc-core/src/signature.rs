//! ECDSA signatures: strict DER streaming codec and the fixed compact form.
//!
//! DER layout: `0x30 LEN 0x02 RLEN R 0x02 SLEN S`, where `R` and `S` are
//! minimal big-endian encodings of positive integers (a single `0x00` pad
//! byte only when the next byte has its top bit set).

use crate::error::BtcError;
use crate::stream::{ParseStream, SerializeStream};
use crate::streamable::{write_from_offset, ParseState, ParseStatus, Resume, Streamable};

/// Largest DER signature: two 33-byte integers plus 6 framing bytes.
pub const MAX_DER_LEN: usize = 72;

/// `r || s || index`.
pub const COMPACT_LEN: usize = 65;

const SEQUENCE_TAG: u8 = 0x30;
const INTEGER_TAG: u8 = 0x02;
const MAX_TOTAL_LEN: u8 = 70;
const MAX_INT_LEN: u8 = 33;

/// Minimal DER length of a right-aligned 32-byte integer.
///
/// 33 when the leading significant byte has its top bit set (a pad byte is
/// needed), otherwise the number of significant bytes. Zero encodes as a
/// single `0x00`, so its length is 1.
pub fn der_int_len(value: &[u8; 32]) -> usize {
    match value.iter().position(|&b| b != 0) {
        None => 1,
        Some(i) if value[i] >= 0x80 => 33 - i,
        Some(i) => 32 - i,
    }
}

/// Appends the DER integer body (without tag and length) of `value`.
fn write_der_int(value: &[u8; 32], len: usize, out: &mut Vec<u8>) {
    if len == 33 {
        out.push(0x00);
        out.extend_from_slice(value);
    } else {
        out.extend_from_slice(&value[32 - len..]);
    }
}

#[derive(Debug, Clone, Default)]
pub struct Signature {
    r: [u8; 32],
    s: [u8; 32],
    index: u8,
    /// Length bytes seen while parsing: total, RLEN, SLEN.
    lens: [u8; 3],
    state: ParseState,
}

impl Signature {
    pub fn new(r: [u8; 32], s: [u8; 32]) -> Self {
        Self {
            r,
            s,
            ..Self::default()
        }
    }

    pub fn with_index(r: [u8; 32], s: [u8; 32], index: u8) -> Self {
        Self {
            index,
            ..Self::new(r, s)
        }
    }

    /// Decodes a complete DER signature. Trailing bytes are rejected.
    pub fn from_der(der: &[u8]) -> Result<Self, BtcError> {
        let mut sig = Self::default();
        let consumed = sig.parse_chunk(der);
        match sig.status() {
            ParseStatus::Done if consumed == der.len() => Ok(sig),
            ParseStatus::Done => Err(BtcError::ParseFailed(format!(
                "{} trailing bytes after DER signature",
                der.len() - consumed
            ))),
            ParseStatus::Incomplete => Err(BtcError::ParseFailed("truncated DER signature".into())),
            ParseStatus::Failed => Err(BtcError::ParseFailed(format!(
                "malformed DER signature at byte {}",
                sig.bytes_parsed().saturating_sub(1)
            ))),
        }
    }

    pub fn r(&self) -> &[u8; 32] {
        &self.r
    }

    pub fn s(&self) -> &[u8; 32] {
        &self.s
    }

    /// Raw recovery byte as stored (may carry a 27 or 31 offset).
    pub fn index(&self) -> u8 {
        self.index
    }

    pub fn set_index(&mut self, index: u8) {
        self.index = index;
    }

    /// Recovery id with the legacy 27 (uncompressed) / 31 (compressed)
    /// offsets removed.
    pub fn recovery_id(&self) -> u8 {
        match self.index {
            31.. => self.index - 31,
            27.. => self.index - 27,
            _ => self.index,
        }
    }

    pub fn rlen(&self) -> usize {
        der_int_len(&self.r)
    }

    pub fn slen(&self) -> usize {
        der_int_len(&self.s)
    }

    /// Canonical DER encoding.
    pub fn der(&self) -> Vec<u8> {
        let rlen = self.rlen();
        let slen = self.slen();
        let mut out = Vec::with_capacity(MAX_DER_LEN);
        out.push(SEQUENCE_TAG);
        out.push((rlen + slen + 4) as u8);
        out.push(INTEGER_TAG);
        out.push(rlen as u8);
        write_der_int(&self.r, rlen, &mut out);
        out.push(INTEGER_TAG);
        out.push(slen as u8);
        write_der_int(&self.s, slen, &mut out);
        out
    }

    /// Writes `r || s || index` into `out`, truncating to whatever fits.
    pub fn write_compact(&self, out: &mut [u8]) {
        let n = out.len().min(32);
        out[..n].copy_from_slice(&self.r[..n]);
        if out.len() > 32 {
            let n = (out.len() - 32).min(32);
            out[32..32 + n].copy_from_slice(&self.s[..n]);
        }
        if out.len() > 64 {
            out[64] = self.index;
        }
    }

    /// Reads `r || s || index` from `data`, taking only what is present.
    pub fn read_compact(&mut self, data: &[u8]) {
        let n = data.len().min(32);
        self.r[..n].copy_from_slice(&data[..n]);
        if data.len() > 32 {
            let n = (data.len() - 32).min(32);
            self.s[..n].copy_from_slice(&data[32..32 + n]);
        }
        if data.len() > 64 {
            self.index = data[64];
        }
    }

    pub fn compact(&self) -> [u8; COMPACT_LEN] {
        let mut out = [0u8; COMPACT_LEN];
        self.write_compact(&mut out);
        out
    }

    pub fn from_compact(data: &[u8]) -> Self {
        let mut sig = Self::default();
        sig.read_compact(data);
        sig
    }

    /// Consumes the byte at encoding position `pos`.
    fn accept(&mut self, pos: usize, byte: u8) -> ParseStatus {
        let rl = usize::from(self.lens[1]);
        let sl = usize::from(self.lens[2]);
        let s_start = 4 + rl;

        if pos == 0 {
            return expect(byte == SEQUENCE_TAG);
        }
        if pos == 1 {
            self.lens[0] = byte;
            return expect(byte <= MAX_TOTAL_LEN);
        }
        if pos == 2 {
            return expect(byte == INTEGER_TAG);
        }
        if pos == 3 {
            self.lens[1] = byte;
            if byte > MAX_INT_LEN {
                return ParseStatus::Failed;
            }
            if byte == 0 {
                return self.check_r();
            }
            return ParseStatus::Incomplete;
        }
        if pos < s_start {
            if let Err(status) = store_int_byte(&mut self.r, rl, pos - 4, byte) {
                return status;
            }
            if pos + 1 == s_start {
                return self.check_r();
            }
            return ParseStatus::Incomplete;
        }
        if pos == s_start {
            return expect(byte == INTEGER_TAG);
        }
        if pos == s_start + 1 {
            self.lens[2] = byte;
            if byte > MAX_INT_LEN {
                return ParseStatus::Failed;
            }
            if byte == 0 {
                return self.check_s();
            }
            return ParseStatus::Incomplete;
        }
        if let Err(status) = store_int_byte(&mut self.s, sl, pos - s_start - 2, byte) {
            return status;
        }
        if pos + 1 == s_start + 2 + sl {
            return self.check_s();
        }
        ParseStatus::Incomplete
    }

    fn check_r(&self) -> ParseStatus {
        expect(self.rlen() == usize::from(self.lens[1]))
    }

    fn check_s(&self) -> ParseStatus {
        let rl = usize::from(self.lens[1]);
        let sl = usize::from(self.lens[2]);
        if self.slen() != sl || usize::from(self.lens[0]) != rl + sl + 4 {
            return ParseStatus::Failed;
        }
        ParseStatus::Done
    }
}

fn expect(ok: bool) -> ParseStatus {
    if ok {
        ParseStatus::Incomplete
    } else {
        ParseStatus::Failed
    }
}

/// Places byte `i` of a `len`-byte DER integer into its right-aligned slot.
/// For a 33-byte integer, byte 0 is the pad and must be zero.
fn store_int_byte(buf: &mut [u8; 32], len: usize, i: usize, byte: u8) -> Result<(), ParseStatus> {
    match (32 + i).checked_sub(len) {
        Some(slot) => {
            buf[slot] = byte;
            Ok(())
        }
        None if byte == 0x00 => Ok(()),
        None => Err(ParseStatus::Failed),
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.r == other.r && self.s == other.s
    }
}

impl Eq for Signature {}

impl Streamable for Signature {
    fn from_stream(&mut self, stream: &mut dyn ParseStream) -> usize {
        match self.state.begin() {
            Resume::Failed => return 0,
            Resume::Fresh => {
                self.r = [0u8; 32];
                self.s = [0u8; 32];
                self.lens = [0u8; 3];
                self.index = 0;
            }
            Resume::Continue => {}
        }
        let mut read = 0;
        while self.state.is_incomplete() {
            let Some(byte) = stream.read() else {
                break;
            };
            let pos = self.state.bytes_parsed();
            self.state.advance(1);
            read += 1;
            match self.accept(pos, byte) {
                ParseStatus::Incomplete => {}
                ParseStatus::Done => self.state.finish(),
                ParseStatus::Failed => self.state.fail(),
            }
        }
        read
    }

    fn to_stream(&self, stream: &mut dyn SerializeStream, offset: usize) -> usize {
        write_from_offset(&self.der(), stream, offset)
    }

    fn length(&self) -> usize {
        self.rlen() + self.slen() + 6
    }

    fn status(&self) -> ParseStatus {
        self.state.status()
    }

    fn bytes_parsed(&self) -> usize {
        self.state.bytes_parsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn der_70() -> Vec<u8> {
        let mut der = vec![0x30, 0x44, 0x02, 0x20];
        der.extend_from_slice(&[0x11; 32]);
        der.extend_from_slice(&[0x02, 0x20]);
        der.extend_from_slice(&[0x22; 32]);
        der
    }

    fn high_r() -> [u8; 32] {
        let mut r = [0x33; 32];
        r[0] = 0x9f;
        r
    }

    #[test]
    fn decodes_70_byte_vector() {
        let der = der_70();
        let mut sig = Signature::default();
        assert_eq!(sig.parse_chunk(&der), 70);
        assert_eq!(sig.status(), ParseStatus::Done);
        assert_eq!(sig.length(), 70);
        assert_eq!(sig.r(), &[0x11; 32]);
        assert_eq!(sig.s(), &[0x22; 32]);
    }

    #[test]
    fn total_length_71_fails_at_that_byte() {
        let mut der = der_70();
        der[1] = 71;
        let mut sig = Signature::default();
        assert_eq!(sig.parse_chunk(&der), 2);
        assert_eq!(sig.status(), ParseStatus::Failed);
    }

    #[test]
    fn failure_is_sticky() {
        let mut sig = Signature::default();
        sig.parse_chunk(&[0x31]);
        assert_eq!(sig.status(), ParseStatus::Failed);
        assert_eq!(sig.parse_chunk(&der_70()), 0);
        assert_eq!(sig.status(), ParseStatus::Failed);
    }

    #[test]
    fn wrong_integer_tag_fails() {
        let mut der = der_70();
        der[2] = 0x03;
        assert!(Signature::from_der(&der).is_err());

        let mut der = der_70();
        der[36] = 0x04;
        assert!(Signature::from_der(&der).is_err());
    }

    #[test]
    fn der_roundtrip_with_padding() {
        let sig = Signature::new(high_r(), [0x01; 32]);
        assert_eq!(sig.rlen(), 33);
        assert_eq!(sig.slen(), 32);
        let der = sig.der();
        assert_eq!(der.len(), sig.length());
        assert_eq!(&der[..5], &[0x30, 0x45, 0x02, 0x21, 0x00]);
        assert_eq!(der[5], 0x9f);

        let decoded = Signature::from_der(&der).unwrap();
        assert_eq!(decoded, sig);
    }

    #[test]
    fn der_roundtrip_short_values() {
        let mut r = [0u8; 32];
        r[31] = 0x05;
        let mut s = [0u8; 32];
        s[30] = 0x80;
        s[31] = 0x01;
        let sig = Signature::new(r, s);
        assert_eq!(sig.rlen(), 1);
        assert_eq!(sig.slen(), 3);
        let der = sig.der();
        assert_eq!(der, vec![0x30, 0x08, 0x02, 0x01, 0x05, 0x02, 0x03, 0x00, 0x80, 0x01]);
        assert_eq!(Signature::from_der(&der).unwrap(), sig);
    }

    #[test]
    fn zero_integer_encodes_as_single_byte() {
        let sig = Signature::new([0u8; 32], [0x7f; 32]);
        let der = sig.der();
        assert_eq!(&der[2..5], &[0x02, 0x01, 0x00]);
        assert_eq!(Signature::from_der(&der).unwrap(), sig);
    }

    #[test]
    fn encoding_is_minimal() {
        for first in [0x00u8, 0x01, 0x7f, 0x80, 0xff] {
            let mut r = [0x44; 32];
            r[0] = first;
            let der = Signature::new(r, [0x55; 32]).der();
            let rlen = usize::from(der[3]);
            let body = &der[4..4 + rlen];
            if body[0] == 0x00 && body.len() > 1 {
                assert!(body[1] >= 0x80, "needless pad for first byte {first:#x}");
            }
        }
    }

    #[test]
    fn rejects_needless_padding() {
        // 0x21 length with a pad byte in front of a value below 0x80.
        let mut der = vec![0x30, 0x45, 0x02, 0x21, 0x00];
        der.extend_from_slice(&[0x11; 32]);
        der.extend_from_slice(&[0x02, 0x20]);
        der.extend_from_slice(&[0x22; 32]);
        let mut sig = Signature::default();
        sig.parse_chunk(&der);
        assert_eq!(sig.status(), ParseStatus::Failed);
    }

    #[test]
    fn rejects_nonzero_pad_byte() {
        let mut der = vec![0x30, 0x45, 0x02, 0x21, 0x01];
        der.extend_from_slice(&high_r());
        der.extend_from_slice(&[0x02, 0x20]);
        der.extend_from_slice(&[0x22; 32]);
        let mut sig = Signature::default();
        assert_eq!(sig.parse_chunk(&der), 5);
        assert_eq!(sig.status(), ParseStatus::Failed);
    }

    #[test]
    fn rejects_missing_padding() {
        let mut der = vec![0x30, 0x44, 0x02, 0x20];
        der.extend_from_slice(&high_r());
        der.extend_from_slice(&[0x02, 0x20]);
        der.extend_from_slice(&[0x22; 32]);
        assert!(Signature::from_der(&der).is_err());
    }

    #[test]
    fn rejects_leading_zero_bytes() {
        let der = [0x30, 0x08, 0x02, 0x03, 0x00, 0x00, 0x05, 0x02, 0x01, 0x01];
        assert!(Signature::from_der(&der).is_err());
    }

    #[test]
    fn rejects_inconsistent_total_length() {
        let mut der = der_70();
        der[1] = 0x43;
        let mut sig = Signature::default();
        assert_eq!(sig.parse_chunk(&der), 70);
        assert_eq!(sig.status(), ParseStatus::Failed);
    }

    #[test]
    fn rejects_oversized_integer_length() {
        let der = [0x30, 0x44, 0x02, 0x22];
        let mut sig = Signature::default();
        assert_eq!(sig.parse_chunk(&der), 4);
        assert_eq!(sig.status(), ParseStatus::Failed);
    }

    #[test]
    fn byte_at_a_time_matches_single_call() {
        let der = Signature::new(high_r(), [0x01; 32]).der();
        let whole = Signature::from_der(&der).unwrap();

        let mut sig = Signature::default();
        for (i, byte) in der.iter().enumerate() {
            assert_eq!(sig.parse_chunk(std::slice::from_ref(byte)), 1);
            let expected = if i + 1 == der.len() {
                ParseStatus::Done
            } else {
                ParseStatus::Incomplete
            };
            assert_eq!(sig.status(), expected, "after byte {i}");
        }
        assert_eq!(sig, whole);
        assert_eq!(sig.bytes_parsed(), der.len());
    }

    #[test]
    fn arbitrary_chunking_matches_single_call() {
        let mut r = [0u8; 32];
        r[3..].copy_from_slice(&[0xa1; 29]);
        let der = Signature::new(r, high_r()).der();
        let whole = Signature::from_der(&der).unwrap();

        for pattern in [[2usize, 5, 1, 9], [3, 3, 3, 3], [7, 1, 1, 30], [4, 40, 2, 1]] {
            let mut sig = Signature::default();
            let mut rest = &der[..];
            let mut step = 0;
            while !rest.is_empty() {
                let n = pattern[step % pattern.len()].min(rest.len());
                assert_eq!(sig.parse_chunk(&rest[..n]), n);
                rest = &rest[n..];
                step += 1;
            }
            assert_eq!(sig.status(), ParseStatus::Done);
            assert_eq!(sig, whole);
        }
    }

    #[test]
    fn stops_after_one_signature_and_restarts() {
        let first = der_70();
        let second = Signature::new(high_r(), [0x01; 32]).der();
        let mut both = first.clone();
        both.extend_from_slice(&second);

        let mut stream = crate::stream::ByteParser::new(&both);
        let mut sig = Signature::default();
        assert_eq!(sig.from_stream(&mut stream), first.len());
        assert_eq!(sig.r(), &[0x11; 32]);
        assert_eq!(sig.from_stream(&mut stream), second.len());
        assert_eq!(sig.status(), ParseStatus::Done);
        assert_eq!(sig.r(), &high_r());
    }

    #[test]
    fn to_stream_resumes_at_offset() {
        let sig = Signature::new(high_r(), [0x01; 32]);
        let der = sig.der();
        let mut head = [0u8; 10];
        let mut sink = crate::stream::SliceSerializer::new(&mut head);
        assert_eq!(sig.to_stream(&mut sink, 0), 10);

        let mut tail = Vec::new();
        assert_eq!(sig.to_stream(&mut tail, 10), der.len() - 10);
        assert_eq!(&head[..], &der[..10]);
        assert_eq!(&tail[..], &der[10..]);
    }

    #[test]
    fn from_der_rejects_trailing_bytes() {
        let mut der = der_70();
        der.push(0x01);
        assert!(matches!(Signature::from_der(&der), Err(BtcError::ParseFailed(_))));
    }

    #[test]
    fn from_der_rejects_truncation() {
        let der = der_70();
        let err = Signature::from_der(&der[..40]).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn compact_roundtrip_with_index() {
        let sig = Signature::with_index([0xaa; 32], [0xbb; 32], 1);
        let compact = sig.compact();
        let decoded = Signature::from_compact(&compact);
        assert_eq!(decoded, sig);
        assert_eq!(decoded.index(), 1);

        let mut short = [0u8; 64];
        sig.write_compact(&mut short);
        let decoded = Signature::from_compact(&short);
        assert_eq!(decoded, sig);
        assert_eq!(decoded.index(), 0);
    }

    #[test]
    fn compact_truncation_is_graceful() {
        let sig = Signature::new([0xaa; 32], [0xbb; 32]);
        let mut out = [0u8; 40];
        sig.write_compact(&mut out);
        assert_eq!(&out[..32], &[0xaa; 32]);
        assert_eq!(&out[32..], &[0xbb; 8]);

        let partial = Signature::from_compact(&[0xcc; 10]);
        assert_eq!(&partial.r()[..10], &[0xcc; 10]);
        assert_eq!(&partial.r()[10..], &[0u8; 22]);
        assert_eq!(partial.s(), &[0u8; 32]);
    }

    #[test]
    fn recovery_id_strips_legacy_offsets() {
        let mut sig = Signature::default();
        for (raw, expected) in [(0u8, 0u8), (1, 1), (27, 0), (28, 1), (31, 0), (32, 1)] {
            sig.set_index(raw);
            assert_eq!(sig.recovery_id(), expected);
        }
    }

    #[test]
    fn der_parse_clears_previous_recovery_index() {
        let der = Signature::new([0x11; 32], [0x22; 32]).to_bytes();
        let mut sig = Signature::with_index([0xaa; 32], [0xbb; 32], 1);
        assert_eq!(sig.parse_chunk(&der), der.len());
        assert_eq!(sig.status(), ParseStatus::Done);
        assert_eq!(sig.r(), &[0x11; 32]);
        assert_eq!(sig.index(), 0);
    }
}
