use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// RabbitMQ event envelope wrapping all domain events.
///
/// Routing key format: `connect.{domain}.{entity}.{action}`
/// Example: `connect.messaging.message.sent`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T: Serialize> {
    pub id: Uuid,
    pub source: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub data: T,
}

impl<T: Serialize> Event<T> {
    pub fn new(source: impl Into<String>, event_type: impl Into<String>, data: T) -> Self {
        Self {
            id: Uuid::now_v7(),
            source: source.into(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            correlation_id: None,
            user_id: None,
            data,
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// RabbitMQ routing keys
pub mod routing_keys {
    // Messaging events
    pub const MESSAGING_MESSAGE_SENT: &str = "connect.messaging.message.sent";

    // Community events
    pub const COMMUNITY_COMMENT_CREATED: &str = "connect.community.comment.created";
    pub const COMMUNITY_POST_LIKED: &str = "connect.community.post.liked";

    // Resource events
    pub const RESOURCES_RESOURCE_SHARED: &str = "connect.resources.resource.shared";
}

/// Common event data payloads
pub mod payloads {
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MessageSent {
        pub message_id: Uuid,
        pub conversation_id: Uuid,
        pub sender_id: Uuid,
        pub sender_name: String,
        /// Conversation participants other than the sender.
        pub recipient_ids: Vec<Uuid>,
        pub content_preview: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct CommentCreated {
        pub post_id: Uuid,
        pub post_title: String,
        pub post_author_id: Uuid,
        pub commenter_id: Uuid,
        pub commenter_name: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct PostLiked {
        pub post_id: Uuid,
        pub post_title: String,
        pub post_author_id: Uuid,
        pub liker_id: Uuid,
        pub liker_name: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ResourceShared {
        pub resource_id: Uuid,
        pub resource_title: String,
        pub recipient_id: Uuid,
        pub sharer_id: Uuid,
        pub sharer_name: String,
    }
}
