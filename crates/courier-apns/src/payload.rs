//! Notification content and its APNs JSON form.

use serde::{Deserialize, Serialize};

/// Sound played for every alert.
pub const DEFAULT_SOUND: &str = "default";

/// What the caller wants shown on the device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Alert title.
    pub title: String,
    /// Alert body.
    pub body: String,
    /// Alert subtitle.
    #[serde(default)]
    pub subtitle: Option<String>,
    /// Image supplied by the content source. Alert payloads have no image
    /// field, so this is never serialized to APNs.
    #[serde(default)]
    pub image_url: Option<String>,
    /// Deep link opened when the notification is tapped.
    #[serde(default)]
    pub url: Option<String>,
    /// App icon badge count.
    #[serde(default)]
    pub badge: Option<u32>,
}

/// Body of an APNs alert push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApnsPayload<'a> {
    aps: Aps<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct Aps<'a> {
    alert: Alert<'a>,
    sound: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    badge: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct Alert<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subtitle: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
}

fn non_empty(value: &str) -> Option<&str> {
    (!value.is_empty()).then_some(value)
}

impl<'a> ApnsPayload<'a> {
    /// Build the payload, leaving out every empty or absent field.
    pub fn from_notification(notification: &'a Notification) -> Self {
        Self {
            aps: Aps {
                alert: Alert {
                    title: non_empty(&notification.title),
                    subtitle: notification.subtitle.as_deref().and_then(non_empty),
                    body: non_empty(&notification.body),
                },
                sound: DEFAULT_SOUND,
                badge: notification.badge,
            },
            url: notification.url.as_deref().and_then(non_empty),
        }
    }

    /// Serialize to the JSON request body.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
