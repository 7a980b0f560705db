//! Scheduled-event push adapter.
//!
//! Subscriber records carry the raw 32-byte device token as stored. The
//! adapter drops records that fail the permission check, hex-encodes the rest,
//! sends one batch and translates the delivered and invalid tokens back into
//! subscriber ids.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use courier_apns::{Notification, PushSender};
use courier_core::device_token::{self, redact};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::permission::ViewPermission;

/// Badge count set on every event notification.
pub const NOTIFICATION_BADGE: u32 = 1;

/// A subscriber's registered device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberToken {
    /// Subscriber the device belongs to.
    pub subscriber_id: u64,
    /// Binary device token as stored.
    pub device_token: Vec<u8>,
}

/// Content of an event notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Alert title.
    pub title: String,
    /// Alert body.
    pub message: String,
    /// Alert subtitle.
    #[serde(default)]
    pub subtitle: Option<String>,
    /// Image supplied by the content source.
    #[serde(default)]
    pub image_url: Option<String>,
    /// Deep link.
    #[serde(default)]
    pub url: Option<String>,
}

impl Envelope {
    /// The notification sent for this envelope.
    pub fn to_notification(&self) -> Notification {
        Notification {
            title: self.title.clone(),
            body: self.message.clone(),
            subtitle: self.subtitle.clone(),
            image_url: self.image_url.clone(),
            url: self.url.clone(),
            badge: Some(NOTIFICATION_BADGE),
        }
    }
}

/// Subscriber ids grouped by delivery result.
///
/// Both lists are free of duplicates, ordered by first occurrence, and
/// disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandleResult {
    /// Subscribers reached on at least one device.
    pub success_ids: Vec<u64>,
    /// Subscribers whose devices were rejected as invalid.
    pub invalid_ids: Vec<u64>,
}

/// Sends event notifications to permitted subscribers.
pub struct ScheduledEventAdapter {
    sender: Arc<dyn PushSender>,
    permissions: Arc<dyn ViewPermission>,
}

impl fmt::Debug for ScheduledEventAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledEventAdapter").finish_non_exhaustive()
    }
}

impl ScheduledEventAdapter {
    /// Create an adapter.
    pub fn new(sender: Arc<dyn PushSender>, permissions: Arc<dyn ViewPermission>) -> Self {
        Self { sender, permissions }
    }

    /// Notify every permitted subscriber in `records` about the content.
    pub async fn handle(
        &self,
        records: &[SubscriberToken],
        envelope: &Envelope,
        content_type: &str,
        content_id: &str,
    ) -> HandleResult {
        // Hex tokens in first-seen order, and every subscriber owning each.
        let mut tokens: Vec<String> = Vec::new();
        let mut owners: HashMap<String, Vec<u64>> = HashMap::new();

        for record in records {
            if !self.permissions.can_view(record, content_type, content_id).await {
                debug!(
                    subscriber_id = record.subscriber_id,
                    content_type, content_id, "subscriber cannot view content, skipping"
                );
                continue;
            }

            let hex = match device_token::decode(&record.device_token) {
                Ok(hex) => hex,
                Err(e) => {
                    warn!(subscriber_id = record.subscriber_id, error = %e, "skipping unusable device token");
                    continue;
                }
            };

            let ids = owners.entry(hex.clone()).or_default();
            if ids.is_empty() {
                tokens.push(hex);
            } else {
                debug!(token = %redact(&hex), subscriber_id = record.subscriber_id, "device token shared by several records");
            }
            ids.push(record.subscriber_id);
        }

        if tokens.is_empty() {
            debug!(content_type, content_id, "no permitted devices for event");
            return HandleResult::default();
        }

        let outcome = self.sender.send(&tokens, &envelope.to_notification()).await;
        if let Some(reason) = outcome.skip_reason() {
            warn!(error = %reason, content_type, content_id, "event push skipped");
        }

        let (delivered, invalid) = outcome.into_pair();
        let success_ids = subscriber_ids(&delivered, &owners);
        let invalid_ids: Vec<u64> = subscriber_ids(&invalid, &owners)
            .into_iter()
            .filter(|id| !success_ids.contains(id))
            .collect();

        info!(
            content_type,
            content_id,
            devices = tokens.len(),
            succeeded = success_ids.len(),
            invalid = invalid_ids.len(),
            "event push handled"
        );

        HandleResult {
            success_ids,
            invalid_ids,
        }
    }
}

fn subscriber_ids(tokens: &[String], owners: &HashMap<String, Vec<u64>>) -> Vec<u64> {
    let mut seen = HashSet::new();
    tokens
        .iter()
        .filter_map(|token| owners.get(token))
        .flatten()
        .copied()
        .filter(|id| seen.insert(*id))
        .collect()
}
