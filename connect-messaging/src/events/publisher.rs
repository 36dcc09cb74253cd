use uuid::Uuid;

use connect_shared::clients::rabbitmq::RabbitMQClient;
use connect_shared::types::event::{payloads, routing_keys, Event};

/// Best-effort publish: a failed publish is logged and never surfaces to the
/// request that triggered it.
pub async fn publish_message_sent(
    rabbitmq: &RabbitMQClient,
    message_id: Uuid,
    conversation_id: Uuid,
    sender_id: Uuid,
    sender_name: &str,
    recipient_ids: &[Uuid],
    content_preview: &str,
) {
    let event = Event::new(
        "connect-messaging",
        routing_keys::MESSAGING_MESSAGE_SENT,
        payloads::MessageSent {
            message_id,
            conversation_id,
            sender_id,
            sender_name: sender_name.to_string(),
            recipient_ids: recipient_ids.to_vec(),
            content_preview: content_preview.to_string(),
        },
    )
    .with_user(sender_id);

    if let Err(e) = rabbitmq.publish(routing_keys::MESSAGING_MESSAGE_SENT, &event).await {
        tracing::error!(error = %e, "failed to publish message.sent event");
    }
}
