//! Queue-facing seams of the pipeline.
//!
//! The pipeline reads track deliveries from a [`TrackSource`] and publishes
//! what it sent to a [`PreviewSink`]. The AMQP implementations live in
//! [`amqp`](crate::amqp); the in-memory ones here back tests and dry runs.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// One message taken from the track queue.
#[async_trait]
pub trait Delivery: Send + Sync {
    /// The raw message body.
    fn body(&self) -> &[u8];

    /// Acknowledge the message so the broker forgets it.
    async fn ack(&self) -> Result<()>;
}

/// A stream of track deliveries.
#[async_trait]
pub trait TrackSource: Send {
    /// The delivery type handed out.
    type Delivery: Delivery;

    /// Wait for the next delivery. `None` means the source is closed.
    async fn next_delivery(&mut self) -> Option<Result<Self::Delivery>>;
}

/// Where successfully transmitted text is announced.
#[async_trait]
pub trait PreviewSink: Send + Sync {
    /// Publish one preview.
    async fn publish(&self, preview: &Preview) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Preview
// ---------------------------------------------------------------------------

/// Body format for preview messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewFormat {
    /// `{"text", "artist", "title", "truncated"}`.
    #[default]
    Json,
    /// The RadioText line as a plain body.
    Text,
}

impl PreviewFormat {
    /// MIME type for message properties.
    pub fn content_type(&self) -> &'static str {
        match self {
            PreviewFormat::Json => "application/json",
            PreviewFormat::Text => "text/plain",
        }
    }
}

/// What the encoder is now showing.
///
/// `artist` and `title` are recovered from the RT+ tags that were sent, so
/// they show exactly what an RT+ receiver would display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preview {
    /// The RadioText line.
    pub text: String,
    /// The tagged artist, if any.
    pub artist: Option<String>,
    /// The tagged title, if any.
    pub title: Option<String>,
    /// Whether the line was cut to 64 characters.
    pub truncated: bool,
}

impl Preview {
    /// Render the message body.
    ///
    /// ```
    /// use rdslink::queue::{Preview, PreviewFormat};
    ///
    /// let p = Preview {
    ///     text: "Owl City - Fireflies".into(),
    ///     artist: Some("Owl City".into()),
    ///     title: Some("Fireflies".into()),
    ///     truncated: false,
    /// };
    /// assert_eq!(p.body(PreviewFormat::Text).unwrap(), b"Owl City - Fireflies");
    /// ```
    pub fn body(&self, format: PreviewFormat) -> Result<Vec<u8>> {
        match format {
            PreviewFormat::Json => Ok(serde_json::to_vec(self)?),
            PreviewFormat::Text => Ok(self.text.as_bytes().to_vec()),
        }
    }
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

/// Shared record of which deliveries were acknowledged, by sequence number.
#[derive(Debug, Clone, Default)]
pub struct AckLog(Arc<Mutex<Vec<u64>>>);

impl AckLog {
    /// Sequence numbers acknowledged so far, in order.
    pub fn acked(&self) -> Vec<u64> {
        self.0.lock().map(|log| log.clone()).unwrap_or_default()
    }

    fn record(&self, seq: u64) {
        if let Ok(mut log) = self.0.lock() {
            log.push(seq);
        }
    }
}

/// A delivery from a [`MemorySource`].
#[derive(Debug)]
pub struct MemoryDelivery {
    seq: u64,
    body: Vec<u8>,
    acks: AckLog,
}

impl MemoryDelivery {
    /// Sequence number, starting at 0 for the first message sent.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

#[async_trait]
impl Delivery for MemoryDelivery {
    fn body(&self) -> &[u8] {
        &self.body
    }

    async fn ack(&self) -> Result<()> {
        self.acks.record(self.seq);
        Ok(())
    }
}

/// A track source fed through a channel.
///
/// ```
/// use rdslink::queue::MemorySource;
///
/// let (source, feed) = MemorySource::new(8);
/// feed.try_send(br#"{"artist":"A","song":"B"}"#.to_vec()).unwrap();
/// drop(feed);
/// # let _ = source;
/// ```
#[derive(Debug)]
pub struct MemorySource {
    rx: mpsc::Receiver<Vec<u8>>,
    next_seq: u64,
    acks: AckLog,
}

impl MemorySource {
    /// Create a source and the sender that feeds it. The source closes once
    /// every sender is dropped and the backlog is drained.
    pub fn new(capacity: usize) -> (Self, mpsc::Sender<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let source = MemorySource {
            rx,
            next_seq: 0,
            acks: AckLog::default(),
        };
        (source, tx)
    }

    /// A handle to the acknowledgement record.
    pub fn ack_log(&self) -> AckLog {
        self.acks.clone()
    }
}

#[async_trait]
impl TrackSource for MemorySource {
    type Delivery = MemoryDelivery;

    async fn next_delivery(&mut self) -> Option<Result<MemoryDelivery>> {
        let body = self.rx.recv().await?;
        let seq = self.next_seq;
        self.next_seq += 1;
        Some(Ok(MemoryDelivery {
            seq,
            body,
            acks: self.acks.clone(),
        }))
    }
}

/// A preview sink that keeps everything it is given.
#[derive(Debug, Clone, Default)]
pub struct MemoryPreview {
    published: Arc<Mutex<VecDeque<Preview>>>,
}

impl MemoryPreview {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, oldest first.
    pub fn published(&self) -> Vec<Preview> {
        self.published
            .lock()
            .map(|p| p.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PreviewSink for MemoryPreview {
    async fn publish(&self, preview: &Preview) -> Result<()> {
        if let Ok(mut published) = self.published.lock() {
            published.push_back(preview.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preview() -> Preview {
        Preview {
            text: "Owl City - Fireflies".into(),
            artist: Some("Owl City".into()),
            title: Some("Fireflies".into()),
            truncated: false,
        }
    }

    #[test]
    fn json_body_has_all_fields() {
        let body = preview().body(PreviewFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["text"], "Owl City - Fireflies");
        assert_eq!(value["artist"], "Owl City");
        assert_eq!(value["title"], "Fireflies");
        assert_eq!(value["truncated"], false);
    }

    #[test]
    fn missing_tags_serialize_as_null() {
        let p = Preview {
            artist: None,
            ..preview()
        };
        let value: serde_json::Value =
            serde_json::from_slice(&p.body(PreviewFormat::Json).unwrap()).unwrap();
        assert!(value["artist"].is_null());
    }

    #[test]
    fn preview_format_parses_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            format: PreviewFormat,
        }
        let w: Wrapper = toml::from_str("format = \"text\"").unwrap();
        assert_eq!(w.format, PreviewFormat::Text);
        assert_eq!(PreviewFormat::default().content_type(), "application/json");
    }

    #[tokio::test]
    async fn memory_source_numbers_and_acks() {
        let (mut source, feed) = MemorySource::new(4);
        let acks = source.ack_log();
        feed.send(b"one".to_vec()).await.unwrap();
        feed.send(b"two".to_vec()).await.unwrap();
        drop(feed);

        let first = source.next_delivery().await.unwrap().unwrap();
        let second = source.next_delivery().await.unwrap().unwrap();
        assert_eq!(first.body(), b"one");
        assert_eq!(second.seq(), 1);

        second.ack().await.unwrap();
        assert_eq!(acks.acked(), vec![1]);
        assert!(source.next_delivery().await.is_none());
    }

    #[tokio::test]
    async fn memory_preview_records() {
        let sink = MemoryPreview::new();
        sink.publish(&preview()).await.unwrap();
        assert_eq!(sink.published(), vec![preview()]);
    }
}
