//! Content visibility checks.

use async_trait::async_trait;

use crate::adapter::SubscriberToken;

/// Decides whether a subscriber may be told about a piece of content.
#[async_trait]
pub trait ViewPermission: Send + Sync {
    /// `true` if the record's subscriber may view `content_type`/`content_id`.
    async fn can_view(&self, record: &SubscriberToken, content_type: &str, content_id: &str) -> bool;
}

/// Grants every subscriber access.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl ViewPermission for AllowAll {
    async fn can_view(&self, _record: &SubscriberToken, _content_type: &str, _content_id: &str) -> bool {
        true
    }
}
