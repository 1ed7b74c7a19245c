//! AMQP implementations of the queue seams.
//!
//! [`connect`] opens one broker connection and declares the topology the
//! bridge relies on:
//!
//! - the track exchange (topic, durable) and a durable queue bound to it
//!   with the configured binding key, consumed with manual acks
//! - the preview exchange (direct, durable) for [`AmqpPreview`]
//!
//! Startup retries with exponential backoff; once running, a broker failure
//! ends the consumer stream and the binary exits with an error.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind};
use rdslink_encoder::Backoff;
use tracing::{debug, info, warn};

use crate::config::{PreviewConfig, QueueConfig};
use crate::error::Result;
use crate::queue::{Delivery, Preview, PreviewFormat, PreviewSink, TrackSource};

/// Consumer tag announced to the broker.
const CONSUMER_TAG: &str = "rdslink";

/// Persistent delivery mode for published messages.
const PERSISTENT: u8 = 2;

/// Open the broker connection and declare the topology.
///
/// Tries up to `queue.connect_retries` times before returning the last
/// error.
pub async fn connect(queue: &QueueConfig, preview: &PreviewConfig) -> Result<(AmqpSource, AmqpPreview)> {
    let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));
    let url = queue.amqp_url();
    let mut attempt = 1;

    let connection = loop {
        match Connection::connect(&url, ConnectionProperties::default()).await {
            Ok(connection) => break connection,
            Err(e) if attempt < queue.connect_retries => {
                let delay = backoff.next_delay();
                warn!(
                    url = %queue.redacted_url(),
                    error = %e,
                    attempt,
                    ?delay,
                    "Broker connection failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    };
    info!(url = %queue.redacted_url(), "Connected to broker");

    let channel = connection.create_channel().await?;
    declare_exchange(&channel, &queue.exchange, ExchangeKind::Topic).await?;
    declare_exchange(&channel, &preview.exchange, ExchangeKind::Direct).await?;

    channel
        .queue_declare(
            &queue.queue,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await?;
    channel
        .queue_bind(
            &queue.queue,
            &queue.exchange,
            &queue.binding_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    // One unacked track at a time keeps processing in delivery order.
    channel.basic_qos(1, BasicQosOptions::default()).await?;

    let consumer = channel
        .basic_consume(
            &queue.queue,
            CONSUMER_TAG,
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;
    info!(
        queue = %queue.queue,
        exchange = %queue.exchange,
        binding_key = %queue.binding_key,
        "Waiting for tracks"
    );

    let source = AmqpSource {
        consumer,
        _connection: connection,
    };
    let sink = AmqpPreview {
        channel,
        exchange: preview.exchange.clone(),
        routing_key: preview.routing_key.clone(),
        format: preview.format,
    };
    Ok((source, sink))
}

async fn declare_exchange(channel: &Channel, name: &str, kind: ExchangeKind) -> Result<()> {
    channel
        .exchange_declare(
            name,
            kind,
            ExchangeDeclareOptions {
                durable: true,
                ..ExchangeDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await?;
    debug!(exchange = %name, "Declared exchange");
    Ok(())
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Track deliveries from the broker queue.
pub struct AmqpSource {
    consumer: Consumer,
    _connection: Connection,
}

/// One broker delivery.
pub struct AmqpDelivery {
    inner: lapin::message::Delivery,
}

#[async_trait]
impl Delivery for AmqpDelivery {
    fn body(&self) -> &[u8] {
        &self.inner.data
    }

    async fn ack(&self) -> Result<()> {
        self.inner.ack(BasicAckOptions::default()).await?;
        Ok(())
    }
}

#[async_trait]
impl TrackSource for AmqpSource {
    type Delivery = AmqpDelivery;

    async fn next_delivery(&mut self) -> Option<Result<AmqpDelivery>> {
        let next = self.consumer.next().await?;
        Some(
            next.map(|inner| AmqpDelivery { inner })
                .map_err(Into::into),
        )
    }
}

// ---------------------------------------------------------------------------
// Preview
// ---------------------------------------------------------------------------

/// Publishes previews to the preview exchange.
pub struct AmqpPreview {
    channel: Channel,
    exchange: String,
    routing_key: String,
    format: PreviewFormat,
}

#[async_trait]
impl PreviewSink for AmqpPreview {
    async fn publish(&self, preview: &Preview) -> Result<()> {
        let body = preview.body(self.format)?;
        let properties = BasicProperties::default()
            .with_content_type(self.format.content_type().into())
            .with_delivery_mode(PERSISTENT);
        self.channel
            .basic_publish(
                &self.exchange,
                &self.routing_key,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await?
            .await?;
        debug!(exchange = %self.exchange, routing_key = %self.routing_key, "Published preview");
        Ok(())
    }
}
