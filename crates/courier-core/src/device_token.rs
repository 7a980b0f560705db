//! APNs device token codec.
//!
//! Apple hands out device tokens as 32 opaque bytes. Clients report them as
//! 64 hex characters in whatever case their platform produced; storage keeps
//! the raw bytes and the wire form is always uppercase hex.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Length of the hex representation.
pub const DEVICE_TOKEN_HEX_LEN: usize = 64;

/// Length of the binary representation.
pub const DEVICE_TOKEN_LEN: usize = 32;

static HEX_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-Fa-f]{64}$").expect("device token pattern compiles"));

/// Device token codec errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceTokenError {
    /// The string is not exactly 64 hex characters.
    #[error("invalid token format")]
    InvalidFormat {
        /// Length of the rejected string in bytes.
        len: usize,
    },
    /// The stored value is not 32 bytes long.
    #[error("invalid token length: expected {DEVICE_TOKEN_LEN} bytes, got {len}")]
    InvalidLength {
        /// Length of the rejected value in bytes.
        len: usize,
    },
}

/// Check that `token` is exactly 64 hex characters (any case).
pub fn validate(token: &str) -> Result<(), DeviceTokenError> {
    if HEX_TOKEN.is_match(token) {
        Ok(())
    } else {
        Err(DeviceTokenError::InvalidFormat { len: token.len() })
    }
}

/// Convert the hex form into the 32-byte storage form.
pub fn encode(token: &str) -> Result<[u8; DEVICE_TOKEN_LEN], DeviceTokenError> {
    validate(token)?;
    let mut out = [0u8; DEVICE_TOKEN_LEN];
    hex::decode_to_slice(token, &mut out)
        .map_err(|_| DeviceTokenError::InvalidFormat { len: token.len() })?;
    Ok(out)
}

/// Convert the storage form into the uppercase hex wire form.
pub fn decode(bytes: &[u8]) -> Result<String, DeviceTokenError> {
    if bytes.len() != DEVICE_TOKEN_LEN {
        return Err(DeviceTokenError::InvalidLength { len: bytes.len() });
    }
    Ok(hex::encode_upper(bytes))
}

/// Short, log-safe form of a token: the first eight characters and the length.
pub fn redact(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("{prefix}...({})", token.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const LOWER: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    // ── validate ────────────────────────────────────────────────────

    #[test]
    fn validate_accepts_lower_upper_and_mixed() {
        assert!(validate(LOWER).is_ok());
        assert!(validate(&LOWER.to_uppercase()).is_ok());
        assert!(validate("0123456789AbCdEf0123456789aBcDeF0123456789abcdef0123456789ABCDEF").is_ok());
    }

    #[test]
    fn validate_rejects_wrong_length() {
        assert_matches!(validate(&LOWER[..63]), Err(DeviceTokenError::InvalidFormat { len: 63 }));
        let long = format!("{LOWER}0");
        assert_matches!(validate(&long), Err(DeviceTokenError::InvalidFormat { len: 65 }));
        assert_matches!(validate(""), Err(DeviceTokenError::InvalidFormat { len: 0 }));
    }

    #[test]
    fn validate_rejects_non_hex() {
        let bad = LOWER.replacen('a', "g", 1);
        assert!(validate(&bad).is_err());
        let spaced = format!(" {}", &LOWER[1..]);
        assert!(validate(&spaced).is_err());
    }

    #[test]
    fn validate_rejects_trailing_newline() {
        let with_newline = format!("{}\n", &LOWER[..63]);
        assert!(validate(&with_newline).is_err());
    }

    #[test]
    fn invalid_format_message() {
        let err = validate("nope").unwrap_err();
        assert_eq!(err.to_string(), "invalid token format");
    }

    // ── encode / decode ─────────────────────────────────────────────

    #[test]
    fn encode_produces_32_bytes() {
        let bytes = encode(LOWER).unwrap();
        assert_eq!(bytes.len(), DEVICE_TOKEN_LEN);
        assert_eq!(bytes[0], 0x01);
        assert_eq!(bytes[7], 0xef);
    }

    #[test]
    fn encode_rejects_invalid() {
        assert!(encode("abc").is_err());
    }

    #[test]
    fn decode_uppercases() {
        let bytes = encode(LOWER).unwrap();
        assert_eq!(decode(&bytes).unwrap(), LOWER.to_uppercase());
    }

    #[test]
    fn decode_rejects_wrong_length() {
        assert_matches!(decode(&[0u8; 31]), Err(DeviceTokenError::InvalidLength { len: 31 }));
        assert_matches!(decode(&[]), Err(DeviceTokenError::InvalidLength { len: 0 }));
    }

    // ── redact ──────────────────────────────────────────────────────

    #[test]
    fn redact_keeps_prefix_and_length() {
        assert_eq!(redact(LOWER), "01234567...(64)");
        assert_eq!(redact("abc"), "abc...(3)");
    }

    #[test]
    fn redact_handles_multibyte() {
        assert_eq!(redact("ééééééééé"), "éééééééé...(18)");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn roundtrip_normalizes_to_uppercase(token in "[0-9a-fA-F]{64}") {
                let bytes = encode(&token).unwrap();
                prop_assert_eq!(decode(&bytes).unwrap(), token.to_uppercase());
            }

            #[test]
            fn short_strings_are_rejected(token in "[0-9a-fA-F]{0,63}") {
                prop_assert!(validate(&token).is_err());
            }

            #[test]
            fn long_strings_are_rejected(token in "[0-9a-fA-F]{65,80}") {
                prop_assert!(validate(&token).is_err());
            }

            #[test]
            fn non_hex_char_is_rejected(
                prefix in "[0-9a-f]{10}",
                bad in "[g-zG-Z_ -]",
                suffix in "[0-9a-f]{53}",
            ) {
                let token = format!("{prefix}{bad}{suffix}");
                prop_assert_eq!(token.len(), DEVICE_TOKEN_HEX_LEN);
                prop_assert!(validate(&token).is_err());
            }

            #[test]
            fn any_32_bytes_decode_to_valid_token(bytes in proptest::collection::vec(any::<u8>(), 32)) {
                let token = decode(&bytes).unwrap();
                prop_assert!(validate(&token).is_ok());
                prop_assert_eq!(encode(&token).unwrap().to_vec(), bytes);
            }
        }
    }
}
