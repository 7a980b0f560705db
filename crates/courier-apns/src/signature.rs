//! DER → raw ECDSA signature transcoding.
//!
//! ECDSA signers emit `SEQUENCE { INTEGER r, INTEGER s }` in DER, where each
//! integer is minimal-length and gains a leading `0x00` when its top bit is
//! set. JWS ES256 wants the fixed 64-byte `r || s` form instead, each half a
//! 32-byte big-endian number.

use thiserror::Error;

/// Width of one P-256 scalar.
pub const SCALAR_LEN: usize = 32;

/// Width of a raw ES256 signature.
pub const RAW_SIGNATURE_LEN: usize = 2 * SCALAR_LEN;

const TAG_SEQUENCE: u8 = 0x30;
const TAG_INTEGER: u8 = 0x02;

/// Structural problems found while reading a DER signature.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// The buffer ended before a declared element did.
    #[error("DER signature truncated")]
    Truncated,
    /// An element carried the wrong tag.
    #[error("unexpected DER tag {found:#04x} (expected {expected:#04x})")]
    UnexpectedTag {
        /// Tag required at this position.
        expected: u8,
        /// Tag actually present.
        found: u8,
    },
    /// A length field was indefinite, oversized, zero for an integer, or
    /// disagreed with the surrounding sequence.
    #[error("invalid DER length")]
    InvalidLength,
    /// An integer does not fit in 32 bytes once sign padding is removed.
    #[error("DER integer exceeds {SCALAR_LEN} bytes")]
    IntegerTooLong,
    /// Bytes remained after the signature sequence.
    #[error("trailing bytes after DER signature")]
    TrailingBytes,
}

/// Convert a DER-encoded ECDSA P-256 signature into raw `r || s`.
pub fn der_to_raw(der: &[u8]) -> Result<[u8; RAW_SIGNATURE_LEN], SignatureError> {
    let mut reader = DerReader::new(der);

    reader.expect_tag(TAG_SEQUENCE)?;
    let seq_len = reader.read_length()?;
    if seq_len != reader.remaining() {
        return Err(if seq_len > reader.remaining() {
            SignatureError::Truncated
        } else {
            SignatureError::TrailingBytes
        });
    }

    let r = reader.read_integer()?;
    let s = reader.read_integer()?;
    if reader.remaining() != 0 {
        return Err(SignatureError::InvalidLength);
    }

    let mut raw = [0u8; RAW_SIGNATURE_LEN];
    write_scalar(&mut raw[..SCALAR_LEN], r)?;
    write_scalar(&mut raw[SCALAR_LEN..], s)?;
    Ok(raw)
}

/// Strip sign padding and right-align `int` inside `slot`.
fn write_scalar(slot: &mut [u8], int: &[u8]) -> Result<(), SignatureError> {
    let first_nonzero = int.iter().position(|b| *b != 0).unwrap_or(int.len());
    let magnitude = &int[first_nonzero..];
    if magnitude.len() > slot.len() {
        return Err(SignatureError::IntegerTooLong);
    }
    let offset = slot.len() - magnitude.len();
    slot[offset..].copy_from_slice(magnitude);
    Ok(())
}

struct DerReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn read_byte(&mut self) -> Result<u8, SignatureError> {
        let byte = *self.bytes.get(self.pos).ok_or(SignatureError::Truncated)?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], SignatureError> {
        if len > self.remaining() {
            return Err(SignatureError::Truncated);
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn expect_tag(&mut self, expected: u8) -> Result<(), SignatureError> {
        let found = self.read_byte()?;
        if found == expected {
            Ok(())
        } else {
            Err(SignatureError::UnexpectedTag { expected, found })
        }
    }

    /// Short form (`0..=0x7f`) or long form with one or two length octets.
    fn read_length(&mut self) -> Result<usize, SignatureError> {
        let first = self.read_byte()?;
        if first & 0x80 == 0 {
            return Ok(usize::from(first));
        }
        let octets = usize::from(first & 0x7f);
        if octets == 0 || octets > 2 {
            return Err(SignatureError::InvalidLength);
        }
        let mut len = 0usize;
        for _ in 0..octets {
            len = (len << 8) | usize::from(self.read_byte()?);
        }
        Ok(len)
    }

    fn read_integer(&mut self) -> Result<&'a [u8], SignatureError> {
        self.expect_tag(TAG_INTEGER)?;
        let len = self.read_length()?;
        if len == 0 {
            return Err(SignatureError::InvalidLength);
        }
        self.read_slice(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use p256::ecdsa::signature::Signer;
    use p256::ecdsa::{Signature, SigningKey};

    fn der(r: &[u8], s: &[u8]) -> Vec<u8> {
        let mut body = vec![TAG_INTEGER, r.len() as u8];
        body.extend_from_slice(r);
        body.push(TAG_INTEGER);
        body.push(s.len() as u8);
        body.extend_from_slice(s);
        let mut out = vec![TAG_SEQUENCE, body.len() as u8];
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn strips_sign_padding_from_both_halves() {
        let mut r = vec![0x00];
        r.extend_from_slice(&[0x80; 32]);
        let mut s = vec![0x00];
        s.extend_from_slice(&[0xff; 32]);

        let raw = der_to_raw(&der(&r, &s)).unwrap();

        assert_eq!(raw.len(), RAW_SIGNATURE_LEN);
        assert_eq!(&raw[..32], &[0x80; 32]);
        assert_eq!(&raw[32..], &[0xff; 32]);
    }

    #[test]
    fn left_pads_short_integers() {
        let r = [0x01, 0x02, 0x03];
        let s = [0x7f; 31];

        let raw = der_to_raw(&der(&r, &s)).unwrap();

        assert_eq!(&raw[..29], &[0u8; 29]);
        assert_eq!(&raw[29..32], &[0x01, 0x02, 0x03]);
        assert_eq!(raw[32], 0x00);
        assert_eq!(&raw[33..], &[0x7f; 31]);
    }

    #[test]
    fn accepts_long_form_sequence_length() {
        let body = &der(&[0x11; 32], &[0x22; 32])[2..];
        let mut long = vec![TAG_SEQUENCE, 0x81, body.len() as u8];
        long.extend_from_slice(body);

        let raw = der_to_raw(&long).unwrap();
        assert_eq!(&raw[..32], &[0x11; 32]);
        assert_eq!(&raw[32..], &[0x22; 32]);
    }

    #[test]
    fn matches_p256_fixed_encoding() {
        let key = SigningKey::from_slice(&[0x42; 32]).unwrap();
        for msg in [&b"a"[..], &b"provider token"[..], &[0u8; 300][..]] {
            let sig: Signature = key.sign(msg);
            let raw = der_to_raw(sig.to_der().as_bytes()).unwrap();
            assert_eq!(raw.as_slice(), sig.to_bytes().as_slice());
        }
    }

    #[test]
    fn rejects_wrong_outer_tag() {
        let mut bytes = der(&[1], &[2]);
        bytes[0] = 0x31;
        assert_matches!(
            der_to_raw(&bytes),
            Err(SignatureError::UnexpectedTag { expected: 0x30, found: 0x31 })
        );
    }

    #[test]
    fn rejects_wrong_integer_tag() {
        let mut bytes = der(&[1], &[2]);
        // second INTEGER tag sits after 0x30 len 0x02 0x01 0x01
        bytes[5] = 0x04;
        assert_matches!(
            der_to_raw(&bytes),
            Err(SignatureError::UnexpectedTag { expected: 0x02, found: 0x04 })
        );
    }

    #[test]
    fn rejects_truncated_input() {
        let bytes = der(&[0x11; 32], &[0x22; 32]);
        for cut in [0, 1, 2, 10, bytes.len() - 1] {
            assert!(der_to_raw(&bytes[..cut]).is_err(), "cut at {cut}");
        }
        assert_matches!(der_to_raw(&bytes[..bytes.len() - 1]), Err(SignatureError::Truncated));
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = der(&[1], &[2]);
        bytes.push(0x00);
        assert_matches!(der_to_raw(&bytes), Err(SignatureError::TrailingBytes));
    }

    #[test]
    fn rejects_inner_lengths_that_disagree_with_sequence() {
        // sequence claims 7 bytes of content but the integers only use 6
        let mut bytes = der(&[1], &[2]);
        bytes[1] += 1;
        bytes.push(0x00);
        assert_matches!(der_to_raw(&bytes), Err(SignatureError::InvalidLength));
    }

    #[test]
    fn rejects_integer_overrunning_sequence() {
        let mut bytes = der(&[1], &[2]);
        // r claims 2 bytes
        bytes[3] = 0x05;
        assert!(der_to_raw(&bytes).is_err());
    }

    #[test]
    fn rejects_oversized_integer() {
        let r = [0x01; 33];
        assert_matches!(der_to_raw(&der(&r, &[1])), Err(SignatureError::IntegerTooLong));
    }

    #[test]
    fn rejects_zero_length_integer() {
        assert_matches!(der_to_raw(&der(&[], &[1])), Err(SignatureError::InvalidLength));
    }

    #[test]
    fn rejects_indefinite_length() {
        let bytes = [TAG_SEQUENCE, 0x80, TAG_INTEGER, 0x01, 0x01, TAG_INTEGER, 0x01, 0x01, 0x00, 0x00];
        assert_matches!(der_to_raw(&bytes), Err(SignatureError::InvalidLength));
    }

    #[test]
    fn rejects_empty_input() {
        assert_matches!(der_to_raw(&[]), Err(SignatureError::Truncated));
    }
}
