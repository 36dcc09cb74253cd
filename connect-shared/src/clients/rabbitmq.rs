use anyhow::Context;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind,
};
use serde::Serialize;

use crate::types::Event;

/// Every service publishes and consumes through one durable topic exchange;
/// routing keys (`connect.{domain}.{entity}.{action}`) do the fan-out.
pub const EXCHANGE_NAME: &str = "connect.events";

#[derive(Clone)]
pub struct RabbitMQClient {
    channel: Channel,
}

impl RabbitMQClient {
    /// Open a connection, create a channel and declare the topic exchange.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .context("RabbitMQ connection failed")?;
        let channel = connection.create_channel().await?;

        channel
            .exchange_declare(
                EXCHANGE_NAME,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        tracing::info!(exchange = EXCHANGE_NAME, "RabbitMQ channel ready");
        Ok(Self { channel })
    }

    /// Publish an event as persistent JSON under the given routing key;
    /// resolves once the broker has taken the message.
    pub async fn publish<T: Serialize>(
        &self,
        routing_key: &str,
        event: &Event<T>,
    ) -> anyhow::Result<()> {
        let body = serde_json::to_vec(event).context("event serialization failed")?;

        self.channel
            .basic_publish(
                EXCHANGE_NAME,
                routing_key,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(2),
            )
            .await?
            .await?;

        tracing::debug!(routing_key, event_id = %event.id, "event published");
        Ok(())
    }

    /// Declare a durable queue, bind it to the given routing keys and start
    /// consuming. Queue names carry the consuming service as a prefix so
    /// each service keeps its own delivery cursor.
    pub async fn subscribe(
        &self,
        queue: &str,
        routing_keys: &[&str],
    ) -> anyhow::Result<Consumer> {
        self.channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        for key in routing_keys {
            self.channel
                .queue_bind(
                    queue,
                    EXCHANGE_NAME,
                    key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
        }

        let consumer = self
            .channel
            .basic_consume(
                queue,
                &format!("{queue}-consumer"),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        tracing::info!(queue, bindings = ?routing_keys, "queue bound and consuming");
        Ok(consumer)
    }
}
