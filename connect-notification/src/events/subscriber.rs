use std::sync::Arc;

use futures_lite::StreamExt;
use lapin::options::BasicAckOptions;

use connect_shared::types::event::{payloads, routing_keys, Event};

use crate::services::notification_service;
use crate::AppState;

// Notification copy, kept close to the feed the users actually see.

fn message_copy(data: &payloads::MessageSent) -> (String, String) {
    (
        "Nouveau message".to_string(),
        format!("{}: {}", data.sender_name, data.content_preview),
    )
}

fn comment_copy(data: &payloads::CommentCreated) -> (String, String) {
    (
        "Nouveau commentaire".to_string(),
        format!(
            "{} a commenté votre post \"{}\"",
            data.commenter_name, data.post_title
        ),
    )
}

fn like_copy(data: &payloads::PostLiked) -> (String, String) {
    (
        "Nouveau j'aime".to_string(),
        format!("{} a aimé votre post \"{}\"", data.liker_name, data.post_title),
    )
}

fn resource_copy(data: &payloads::ResourceShared) -> (String, String) {
    (
        "Ressource partagée".to_string(),
        format!(
            "{} a partagé la ressource \"{}\" avec vous",
            data.sharer_name, data.resource_title
        ),
    )
}

/// Listen for message events (message.sent). One notification per recipient;
/// the sender never notifies themselves.
pub async fn listen_message_events(state: Arc<AppState>) -> anyhow::Result<()> {
    let mut consumer = state.rabbitmq.subscribe(
        "connect-notification.message.sent",
        &[routing_keys::MESSAGING_MESSAGE_SENT],
    ).await?;

    tracing::info!("listening for message events");

    while let Some(delivery) = consumer.next().await {
        match delivery {
            Ok(delivery) => {
                match serde_json::from_slice::<Event<payloads::MessageSent>>(&delivery.data) {
                    Ok(event) => {
                        let data = &event.data;
                        tracing::info!(
                            sender_id = %data.sender_id,
                            conversation_id = %data.conversation_id,
                            recipients = data.recipient_ids.len(),
                            "received message.sent event"
                        );

                        let (title, message) = message_copy(data);
                        for recipient_id in &data.recipient_ids {
                            if *recipient_id == data.sender_id {
                                continue;
                            }
                            notification_service::notify(
                                &state.db,
                                *recipient_id,
                                "message",
                                &title,
                                &message,
                            );
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to deserialize message.sent event");
                    }
                }

                let _ = delivery.ack(BasicAckOptions::default()).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "message consumer error");
            }
        }
    }

    Ok(())
}

/// Listen for community events (comment.created, post.liked). Self-actions
/// (commenting or liking your own post) create nothing.
pub async fn listen_community_events(state: Arc<AppState>) -> anyhow::Result<()> {
    let mut consumer = state.rabbitmq.subscribe(
        "connect-notification.community",
        &[
            routing_keys::COMMUNITY_COMMENT_CREATED,
            routing_keys::COMMUNITY_POST_LIKED,
        ],
    ).await?;

    tracing::info!("listening for community events");

    while let Some(delivery) = consumer.next().await {
        match delivery {
            Ok(delivery) => {
                let routing_key = delivery.routing_key.to_string();

                if routing_key == routing_keys::COMMUNITY_COMMENT_CREATED {
                    match serde_json::from_slice::<Event<payloads::CommentCreated>>(&delivery.data) {
                        Ok(event) => {
                            let data = &event.data;
                            tracing::info!(
                                post_id = %data.post_id,
                                commenter_id = %data.commenter_id,
                                "received comment.created event"
                            );

                            if data.commenter_id != data.post_author_id {
                                let (title, message) = comment_copy(data);
                                notification_service::notify(
                                    &state.db,
                                    data.post_author_id,
                                    "comment",
                                    &title,
                                    &message,
                                );
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "failed to deserialize comment.created event");
                        }
                    }
                } else if routing_key == routing_keys::COMMUNITY_POST_LIKED {
                    match serde_json::from_slice::<Event<payloads::PostLiked>>(&delivery.data) {
                        Ok(event) => {
                            let data = &event.data;
                            tracing::info!(
                                post_id = %data.post_id,
                                liker_id = %data.liker_id,
                                "received post.liked event"
                            );

                            if data.liker_id != data.post_author_id {
                                let (title, message) = like_copy(data);
                                notification_service::notify(
                                    &state.db,
                                    data.post_author_id,
                                    "like",
                                    &title,
                                    &message,
                                );
                            }
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "failed to deserialize post.liked event");
                        }
                    }
                }

                let _ = delivery.ack(BasicAckOptions::default()).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "community consumer error");
            }
        }
    }

    Ok(())
}

/// Listen for resource events (resource.shared).
pub async fn listen_resource_events(state: Arc<AppState>) -> anyhow::Result<()> {
    let mut consumer = state.rabbitmq.subscribe(
        "connect-notification.resource.shared",
        &[routing_keys::RESOURCES_RESOURCE_SHARED],
    ).await?;

    tracing::info!("listening for resource events");

    while let Some(delivery) = consumer.next().await {
        match delivery {
            Ok(delivery) => {
                match serde_json::from_slice::<Event<payloads::ResourceShared>>(&delivery.data) {
                    Ok(event) => {
                        let data = &event.data;
                        tracing::info!(
                            resource_id = %data.resource_id,
                            recipient_id = %data.recipient_id,
                            "received resource.shared event"
                        );

                        let (title, message) = resource_copy(data);
                        notification_service::notify(
                            &state.db,
                            data.recipient_id,
                            "resource",
                            &title,
                            &message,
                        );
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to deserialize resource.shared event");
                    }
                }

                let _ = delivery.ack(BasicAckOptions::default()).await;
            }
            Err(e) => {
                tracing::error!(error = %e, "resource consumer error");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn comment_copy_names_commenter_and_post() {
        let data = payloads::CommentCreated {
            post_id: Uuid::new_v4(),
            post_title: "Mon portfolio".into(),
            post_author_id: Uuid::new_v4(),
            commenter_id: Uuid::new_v4(),
            commenter_name: "Alice".into(),
        };
        let (title, message) = comment_copy(&data);
        assert_eq!(title, "Nouveau commentaire");
        assert_eq!(message, "Alice a commenté votre post \"Mon portfolio\"");
    }

    #[test]
    fn message_copy_uses_preview() {
        let data = payloads::MessageSent {
            message_id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            sender_name: "Bob".into(),
            recipient_ids: vec![Uuid::new_v4()],
            content_preview: "salut".into(),
        };
        let (title, message) = message_copy(&data);
        assert_eq!(title, "Nouveau message");
        assert_eq!(message, "Bob: salut");
    }

    #[test]
    fn resource_copy_names_sharer_and_resource() {
        let data = payloads::ResourceShared {
            resource_id: Uuid::new_v4(),
            resource_title: "Kit UI".into(),
            recipient_id: Uuid::new_v4(),
            sharer_id: Uuid::new_v4(),
            sharer_name: "Chloé".into(),
        };
        let (_, message) = resource_copy(&data);
        assert_eq!(message, "Chloé a partagé la ressource \"Kit UI\" avec vous");
    }
}
