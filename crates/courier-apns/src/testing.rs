//! Fixtures shared by unit tests.

use p256::ecdsa::SigningKey;
use p256::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};

use crate::credentials::Credentials;

pub(crate) const TEST_TEAM_ID: &str = "TEAM123456";
pub(crate) const TEST_KEY_ID: &str = "KEY1234567";
pub(crate) const TEST_BUNDLE_ID: &str = "com.example.courier";

pub(crate) fn test_signing_key() -> SigningKey {
    SigningKey::from_slice(&[0x42; 32]).expect("fixed scalar is a valid P-256 key")
}

pub(crate) fn test_private_key_pem() -> String {
    test_signing_key()
        .to_pkcs8_pem(LineEnding::LF)
        .expect("encode PKCS#8 PEM")
        .to_string()
}

pub(crate) fn test_public_key_pem() -> String {
    test_signing_key()
        .verifying_key()
        .to_public_key_pem(LineEnding::LF)
        .expect("encode SPKI PEM")
}

pub(crate) fn test_credentials() -> Credentials {
    Credentials {
        team_id: TEST_TEAM_ID.to_string(),
        key_id: TEST_KEY_ID.to_string(),
        private_key: test_private_key_pem(),
        bundle_id: TEST_BUNDLE_ID.to_string(),
        sandbox: false,
    }
}

/// A syntactically valid device token distinct per `n`.
pub(crate) fn device_token(n: u8) -> String {
    format!("{n:02X}").repeat(32)
}
