//! Provider credentials.

use std::fmt;

/// Production APNs host.
pub const PRODUCTION_ENDPOINT: &str = "https://api.push.apple.com";

/// Sandbox APNs host, for development builds of the app.
pub const SANDBOX_ENDPOINT: &str = "https://api.sandbox.push.apple.com";

/// Everything needed to authenticate against APNs for one app.
#[derive(Clone, Default)]
pub struct Credentials {
    /// Apple Developer Team ID (the `iss` claim).
    pub team_id: String,
    /// Auth key ID (the `kid` header).
    pub key_id: String,
    /// PEM-encoded P-256 private key (contents of the `.p8` file).
    pub private_key: String,
    /// App bundle identifier, sent as `apns-topic`.
    pub bundle_id: String,
    /// Target the sandbox host instead of production.
    pub sandbox: bool,
}

impl Credentials {
    /// Name of the first required field that is empty, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        [
            ("team_id", &self.team_id),
            ("key_id", &self.key_id),
            ("private_key", &self.private_key),
            ("bundle_id", &self.bundle_id),
        ]
        .into_iter()
        .find(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
    }

    /// APNs base URL for the selected environment.
    pub fn endpoint(&self) -> &'static str {
        if self.sandbox {
            SANDBOX_ENDPOINT
        } else {
            PRODUCTION_ENDPOINT
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("team_id", &self.team_id)
            .field("key_id", &self.key_id)
            .field("bundle_id", &self.bundle_id)
            .field("sandbox", &self.sandbox)
            .finish_non_exhaustive()
    }
}
