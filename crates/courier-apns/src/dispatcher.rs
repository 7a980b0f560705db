//! Per-device APNs dispatch and response classification.
//!
//! One call to [`Dispatcher::send`] pushes the same notification to a batch
//! of device tokens and sorts every token into exactly one bucket:
//!
//! - **delivered**: APNs answered `200`
//! - **invalid**: APNs answered `410`, or a reason saying the token will never
//!   work for this app (`BadDeviceToken`, `Unregistered`, `DeviceTokenNotForTopic`).
//!   Token strings that are not 64 hex characters land here without a request.
//! - **unresolved**: anything else (transport failures, throttling, server
//!   errors). Callers may retry these later; they must not be treated as invalid.
//!
//! Batch-level problems (incomplete credentials, nothing to send, failed token
//! mint) skip the batch before any request is made.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use courier_core::device_token::{self, redact};
use courier_core::{Clock, SystemClock};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::credentials::Credentials;
use crate::payload::{ApnsPayload, Notification};
use crate::token::{DEFAULT_TOKEN_TTL, MintError, ProviderTokenCache, TokenMinter};
use crate::transport::{PushRequest, PushTransport, TransportError, TransportResponse};

/// Reasons meaning the token is permanently unusable for this topic.
pub const PERMANENT_FAILURE_REASONS: [&str; 3] =
    ["BadDeviceToken", "Unregistered", "DeviceTokenNotForTopic"];

/// Reasons meaning our provider token was rejected.
const PROVIDER_TOKEN_REASONS: [&str; 2] = ["ExpiredProviderToken", "InvalidProviderToken"];

/// Default number of in-flight requests per batch.
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Why a batch was dropped without contacting APNs.
#[derive(Debug, Error)]
pub enum SkipReason {
    /// A required credential field is empty.
    #[error("missing credential field `{0}`")]
    MissingCredential(&'static str),
    /// The token list was empty.
    #[error("no device tokens to send to")]
    NoTokens,
    /// The provider token could not be minted.
    #[error("provider token mint failed: {0}")]
    MintFailed(#[from] MintError),
    /// The notification could not be serialized.
    #[error("failed to encode payload: {0}")]
    PayloadEncoding(#[from] serde_json::Error),
}

/// Why a token ended up neither delivered nor invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvedCause {
    /// No HTTP response arrived.
    Transport(TransportError),
    /// APNs answered with a status/reason that says nothing about the token's validity.
    Rejected {
        /// HTTP status code.
        status: u16,
        /// `reason` from the JSON error body, if one was present.
        reason: Option<String>,
    },
}

/// A token that was attempted but not resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedToken {
    /// The token as supplied by the caller.
    pub token: String,
    /// What happened.
    pub cause: UnresolvedCause,
}

/// Per-token results of a dispatched batch, each list in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Tokens APNs accepted.
    pub delivered: Vec<String>,
    /// Tokens APNs says are permanently invalid.
    pub invalid: Vec<String>,
    /// Tokens with no definitive answer.
    pub unresolved: Vec<UnresolvedToken>,
}

/// Result of [`Dispatcher::send`].
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The batch was dropped before any request.
    Skipped(SkipReason),
    /// Requests were made.
    Dispatched(DispatchReport),
}

impl DispatchOutcome {
    /// Collapse to `(delivered, invalid)`. Skipped batches give two empty lists.
    pub fn into_pair(self) -> (Vec<String>, Vec<String>) {
        match self {
            Self::Skipped(_) => (Vec::new(), Vec::new()),
            Self::Dispatched(report) => (report.delivered, report.invalid),
        }
    }

    /// The per-token report, if the batch was dispatched.
    pub fn report(&self) -> Option<&DispatchReport> {
        match self {
            Self::Skipped(_) => None,
            Self::Dispatched(report) => Some(report),
        }
    }

    /// The skip reason, if the batch was dropped.
    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match self {
            Self::Skipped(reason) => Some(reason),
            Self::Dispatched(_) => None,
        }
    }
}

/// How a single APNs response sorts a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Accepted.
    Delivered,
    /// Permanently invalid.
    Invalid,
    /// Neither.
    Unresolved(UnresolvedCause),
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    reason: String,
}

/// Extract `reason` from an APNs error body. Missing or malformed JSON yields `None`.
pub fn parse_reason(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .map(|b| b.reason)
        .filter(|r| !r.is_empty())
}

/// Sort a response into delivered / invalid / unresolved.
pub fn classify(response: &TransportResponse) -> Classification {
    if response.status == 200 {
        return Classification::Delivered;
    }
    let reason = parse_reason(&response.body);
    let permanent = reason
        .as_deref()
        .is_some_and(|r| PERMANENT_FAILURE_REASONS.contains(&r));
    if response.status == 410 || permanent {
        Classification::Invalid
    } else {
        Classification::Unresolved(UnresolvedCause::Rejected {
            status: response.status,
            reason,
        })
    }
}

/// Tuning knobs for a [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct DispatcherOptions {
    /// Base URL override. `None` picks production or sandbox from the credentials.
    pub endpoint: Option<String>,
    /// Maximum requests in flight per batch (at least 1).
    pub max_concurrency: usize,
    /// How long a minted provider token is reused. Zero mints per batch.
    pub token_ttl: Duration,
    /// Time source for `iat` and token expiry.
    pub clock: Arc<dyn Clock>,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            endpoint: None,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            token_ttl: DEFAULT_TOKEN_TTL,
            clock: Arc::new(SystemClock),
        }
    }
}

/// Pushes notifications to device tokens for one app.
pub struct Dispatcher {
    credentials: Credentials,
    endpoint: String,
    tokens: ProviderTokenCache,
    transport: Arc<dyn PushTransport>,
    max_concurrency: usize,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("credentials", &self.credentials)
            .field("endpoint", &self.endpoint)
            .field("max_concurrency", &self.max_concurrency)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Create a dispatcher with default options.
    pub fn new(credentials: Credentials, transport: Arc<dyn PushTransport>) -> Self {
        Self::with_options(credentials, transport, DispatcherOptions::default())
    }

    /// Create a dispatcher with explicit options.
    pub fn with_options(
        credentials: Credentials,
        transport: Arc<dyn PushTransport>,
        options: DispatcherOptions,
    ) -> Self {
        let endpoint = options
            .endpoint
            .unwrap_or_else(|| credentials.endpoint().to_string())
            .trim_end_matches('/')
            .to_string();
        let minter = TokenMinter::new(
            credentials.team_id.clone(),
            credentials.key_id.clone(),
            credentials.private_key.clone(),
            options.clock,
        );
        Self {
            endpoint,
            tokens: ProviderTokenCache::new(minter, options.token_ttl),
            transport,
            max_concurrency: options.max_concurrency.max(1),
            credentials,
        }
    }

    /// Base URL requests go to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send `notification` to every token in `tokens`.
    pub async fn send(&self, tokens: &[String], notification: &Notification) -> DispatchOutcome {
        if let Some(field) = self.credentials.missing_field() {
            warn!(field, "APNs credentials incomplete, skipping batch");
            return DispatchOutcome::Skipped(SkipReason::MissingCredential(field));
        }
        if tokens.is_empty() {
            debug!("no device tokens, skipping batch");
            return DispatchOutcome::Skipped(SkipReason::NoTokens);
        }

        let provider_token = match self.tokens.current() {
            Ok(token) => token,
            Err(e) => {
                error!(error = %e, key_id = %self.credentials.key_id, "APNs provider token mint failed, dropping batch");
                return DispatchOutcome::Skipped(SkipReason::MintFailed(e));
            }
        };

        let body = match ApnsPayload::from_notification(notification).to_json() {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                error!(error = %e, "failed to encode APNs payload, dropping batch");
                return DispatchOutcome::Skipped(SkipReason::PayloadEncoding(e));
            }
        };

        info!(
            device_count = tokens.len(),
            endpoint = %self.endpoint,
            topic = %self.credentials.bundle_id,
            "dispatching APNs batch"
        );

        let authorization = provider_token.as_str();
        let body = &body;
        let results: Vec<(String, Classification)> = stream::iter(tokens.iter().cloned())
            .map(|token| async move {
                let classification = self.deliver(&token, authorization, body).await;
                (token, classification)
            })
            .buffered(self.max_concurrency)
            .collect()
            .await;

        let mut report = DispatchReport::default();
        for (token, classification) in results {
            match classification {
                Classification::Delivered => report.delivered.push(token),
                Classification::Invalid => report.invalid.push(token),
                Classification::Unresolved(cause) => report.unresolved.push(UnresolvedToken { token, cause }),
            }
        }

        info!(
            delivered = report.delivered.len(),
            invalid = report.invalid.len(),
            unresolved = report.unresolved.len(),
            "APNs batch complete"
        );

        DispatchOutcome::Dispatched(report)
    }

    async fn deliver(&self, token: &str, authorization: &str, body: &Bytes) -> Classification {
        if let Err(e) = device_token::validate(token) {
            warn!(token = %redact(token), error = %e, "malformed device token, reporting invalid without sending");
            return Classification::Invalid;
        }

        let request = PushRequest {
            url: format!("{}/3/device/{token}", self.endpoint),
            authorization: authorization.to_string(),
            topic: self.credentials.bundle_id.clone(),
            body: body.clone(),
        };

        let response = match self.transport.post(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(token = %redact(token), error = %e, "APNs transport error, skipping token");
                return Classification::Unresolved(UnresolvedCause::Transport(e));
            }
        };

        let classification = classify(&response);
        match &classification {
            Classification::Delivered => {
                debug!(token = %redact(token), apns_id = ?response.apns_id, "APNs accepted notification");
            }
            Classification::Invalid => {
                info!(token = %redact(token), status = response.status, body = %response.body, "APNs reports token invalid");
            }
            Classification::Unresolved(UnresolvedCause::Rejected { status, reason }) => {
                debug!(token = %redact(token), status, reason = ?reason, "APNs rejected notification");
                if *status == 403
                    && reason
                        .as_deref()
                        .is_some_and(|r| PROVIDER_TOKEN_REASONS.contains(&r))
                {
                    warn!(reason = ?reason, "APNs rejected provider token, invalidating cache");
                    self.tokens.invalidate();
                }
            }
            Classification::Unresolved(_) => {}
        }
        classification
    }
}

/// Anything that can push a notification to a batch of device tokens.
#[async_trait]
pub trait PushSender: Send + Sync {
    /// Send `notification` to every token in `tokens`.
    async fn send(&self, tokens: &[String], notification: &Notification) -> DispatchOutcome;
}

#[async_trait]
impl PushSender for Dispatcher {
    async fn send(&self, tokens: &[String], notification: &Notification) -> DispatchOutcome {
        Dispatcher::send(self, tokens, notification).await
    }
}
