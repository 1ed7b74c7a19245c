//! Side-channel notifications about altered or degraded tracks.
//!
//! The pipeline hands a [`Notification`] to the [`Notifier`], which queues
//! it on a bounded channel and returns at once. A background task delivers
//! each notification to every configured [`NotificationSink`]. A full queue
//! drops the notification with a warning; sink failures are logged and
//! otherwise ignored. Nothing here can stall the track path.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rdslink_core::{Degradation, Reason};
use rdslink_text::ComposedMessage;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

/// Attempts per webhook message, including the first.
pub const DEFAULT_WEBHOOK_ATTEMPTS: u32 = 4;

/// Upper bound on a single rate-limit wait.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// Why a track was reported, with the before and after text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// The raw `"{artist} - {title}"`.
    pub original: String,
    /// What was sent to the encoder.
    pub transformed: String,
    /// Why the text changed, if it did.
    pub reason: Option<Reason>,
    /// Words the profanity filter masked.
    pub censored: Vec<String>,
    /// Truncation, dropped tags, clamped lengths.
    pub degradations: Vec<Degradation>,
}

impl Notification {
    /// Build a notification for `msg` plus any encoder-side degradations.
    ///
    /// Returns `None` when there is nothing to report.
    pub fn for_message(msg: &ComposedMessage, extra: &[Degradation]) -> Option<Self> {
        let mut degradations = msg.degradations.clone();
        degradations.extend_from_slice(extra);
        if msg.reason.is_none() && degradations.is_empty() {
            return None;
        }
        Some(Notification {
            original: msg.original.clone(),
            transformed: msg.text.clone(),
            reason: msg.reason,
            censored: msg.censored.clone(),
            degradations,
        })
    }

    /// One-line summary.
    pub fn summary(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if let Some(reason) = self.reason {
            parts.push(reason.to_string());
        }
        parts.extend(self.degradations.iter().map(ToString::to_string));
        parts.join(", ")
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// A destination for notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Short name for log lines.
    fn name(&self) -> &'static str;

    /// Deliver one notification.
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to the log at `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, n: &Notification) -> Result<()> {
        tracing::warn!(
            original = %n.original,
            transformed = %n.transformed,
            reason = %n.summary(),
            "Track text altered"
        );
        Ok(())
    }
}

/// Keeps notifications in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    received: Arc<Mutex<Vec<Notification>>>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications received so far.
    pub fn received(&self) -> Vec<Notification> {
        self.received
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl NotificationSink for MemorySink {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn send(&self, n: &Notification) -> Result<()> {
        if let Ok(mut received) = self.received.lock() {
            received.push(n.clone());
        }
        Ok(())
    }
}

/// Posts notifications as embeds to a Discord webhook.
///
/// Rate-limited requests (HTTP 429) are retried after the `retry_after`
/// the server asks for; network errors are retried with a doubling delay.
/// Other error statuses are not retried.
#[derive(Debug, Clone)]
pub struct DiscordWebhookSink {
    client: reqwest::Client,
    url: String,
    attempts: u32,
    base_delay: Duration,
}

impl DiscordWebhookSink {
    /// Create a sink posting to `url`.
    pub fn new(url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("rdslink/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(DiscordWebhookSink {
            client,
            url: url.to_string(),
            attempts: DEFAULT_WEBHOOK_ATTEMPTS,
            base_delay: Duration::from_secs(1),
        })
    }

    /// Set how many times a message is tried (at least once).
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Set the first delay after a network error or an unparseable 429.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    fn payload(n: &Notification) -> serde_json::Value {
        let (title, color) = match n.reason {
            Some(Reason::Censored) | Some(Reason::Both) => ("Profanity Filtered", 16_776_960),
            Some(Reason::Normalized) => ("Unidecoded to ASCII", 242_424),
            None => ("Track Degraded", 15_158_332),
        };
        let mut fields = vec![
            json!({ "name": "Original", "value": n.original }),
            json!({ "name": "Sent", "value": n.transformed }),
        ];
        if !n.censored.is_empty() {
            fields.push(json!({ "name": "Masked", "value": n.censored.join(", ") }));
        }
        if !n.degradations.is_empty() {
            let list: Vec<String> = n.degradations.iter().map(ToString::to_string).collect();
            fields.push(json!({ "name": "Degradations", "value": list.join("\n") }));
        }
        json!({
            "embeds": [{
                "title": title,
                "color": color,
                "fields": fields,
                "footer": { "text": "rdslink" },
            }]
        })
    }

    /// The wait requested by a 429 body, `{"retry_after": seconds}`.
    fn retry_after(body: &str) -> Option<Duration> {
        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        let secs = value.get("retry_after")?.as_f64()?;
        if !secs.is_finite() || secs < 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(secs).min(MAX_RETRY_AFTER))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay
            .checked_mul(1 << attempt.min(8))
            .unwrap_or(MAX_RETRY_AFTER)
            .min(MAX_RETRY_AFTER)
    }
}

#[async_trait]
impl NotificationSink for DiscordWebhookSink {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn send(&self, n: &Notification) -> Result<()> {
        let payload = Self::payload(n);

        for attempt in 0..self.attempts {
            let last = attempt + 1 == self.attempts;
            let response = match self.client.post(&self.url).json(&payload).send().await {
                Ok(response) => response,
                Err(e) if !last => {
                    let delay = self.backoff(attempt);
                    tracing::warn!(error = %e, ?delay, attempt = attempt + 1, "Discord webhook request failed, retrying");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();
            if status.is_success() {
                tracing::debug!(status = status.as_u16(), "Discord notification delivered");
                return Ok(());
            }
            if status != reqwest::StatusCode::TOO_MANY_REQUESTS || last {
                return Err(Error::SinkStatus {
                    sink: "discord",
                    status: status.as_u16(),
                });
            }

            let body = response.text().await.unwrap_or_default();
            let delay = Self::retry_after(&body).unwrap_or_else(|| self.backoff(attempt));
            tracing::warn!(?delay, attempt = attempt + 1, "Discord rate limited, retrying");
            tokio::time::sleep(delay).await;
        }

        Err(Error::SinkStatus {
            sink: "discord",
            status: reqwest::StatusCode::TOO_MANY_REQUESTS.as_u16(),
        })
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Non-blocking front end for the notification task.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: Option<mpsc::Sender<Notification>>,
}

impl Notifier {
    /// Start the delivery task with the given sinks and queue capacity.
    ///
    /// The task ends once every `Notifier` clone is dropped and the queue is
    /// drained, so awaiting the handle flushes pending notifications.
    pub fn spawn(
        sinks: Vec<Arc<dyn NotificationSink>>,
        capacity: usize,
    ) -> (Notifier, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Notification>(capacity.max(1));
        let task = tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                for sink in &sinks {
                    if let Err(e) = sink.send(&notification).await {
                        tracing::error!(sink = sink.name(), error = %e, "Notification delivery failed");
                    }
                }
            }
            tracing::debug!("Notification task exiting");
        });
        (Notifier { tx: Some(tx) }, task)
    }

    /// A notifier that discards everything.
    pub fn disabled() -> Self {
        Notifier { tx: None }
    }

    /// Queue `notification` without waiting. Returns whether it was queued.
    pub fn notify(&self, notification: Notification) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        match tx.try_send(notification) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(n)) => {
                tracing::warn!(original = %n.original, "Notification queue full, dropping");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("Notification task has stopped");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdslink_core::Field;
    use rdslink_text::{Composer, ComposerConfig, ProfanityFilter};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn censored_notification() -> Notification {
        Notification {
            original: "Artist - What The Heck".into(),
            transformed: "Artist - What The ****".into(),
            reason: Some(Reason::Censored),
            censored: vec!["Heck".into()],
            degradations: vec![],
        }
    }

    #[test]
    fn unchanged_message_has_nothing_to_report() {
        let msg = Composer::default().compose("Owl City", "Fireflies");
        assert_eq!(Notification::for_message(&msg, &[]), None);
    }

    #[test]
    fn encoder_degradations_are_reported() {
        let msg = Composer::default().compose("Owl City", "Fireflies");
        let clamp = Degradation::Clamped {
            field: Field::Title,
            requested: 40,
            sent: 31,
        };
        let n = Notification::for_message(&msg, std::slice::from_ref(&clamp)).unwrap();
        assert_eq!(n.reason, None);
        assert_eq!(n.degradations, vec![clamp]);
    }

    #[test]
    fn censored_message_carries_both_texts() {
        let composer =
            Composer::new(ComposerConfig::default(), ProfanityFilter::new(["heck"])).unwrap();
        let msg = composer.compose("Artist", "What The Heck");
        let n = Notification::for_message(&msg, &[]).unwrap();
        assert_eq!(n, censored_notification());
        assert_eq!(n.summary(), "censored");
    }

    #[test]
    fn discord_payload_shape() {
        let payload = DiscordWebhookSink::payload(&censored_notification());
        let embed = &payload["embeds"][0];
        assert_eq!(embed["title"], "Profanity Filtered");
        assert_eq!(embed["fields"][0]["value"], "Artist - What The Heck");
        assert_eq!(embed["fields"][1]["value"], "Artist - What The ****");
        assert_eq!(embed["fields"][2]["value"], "Heck");
    }

    #[test]
    fn retry_after_parsing() {
        assert_eq!(
            DiscordWebhookSink::retry_after(r#"{"retry_after": 0.25, "global": false}"#),
            Some(Duration::from_millis(250))
        );
        assert_eq!(
            DiscordWebhookSink::retry_after(r#"{"retry_after": 9999}"#),
            Some(MAX_RETRY_AFTER)
        );
        assert_eq!(DiscordWebhookSink::retry_after("not json"), None);
        assert_eq!(DiscordWebhookSink::retry_after(r#"{"retry_after": -1}"#), None);
    }

    /// Serve one canned HTTP response per connection, in order.
    async fn http_server(responses: Vec<&'static str>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/webhook", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            for response in responses {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = vec![0u8; 8192];
                let mut seen = Vec::new();
                loop {
                    let n = stream.read(&mut buf).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    seen.extend_from_slice(&buf[..n]);
                    if request_complete(&seen) {
                        break;
                    }
                }
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        (url, hits)
    }

    fn request_complete(data: &[u8]) -> bool {
        let text = String::from_utf8_lossy(data);
        let Some(head_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let length = text[..head_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        data.len() >= head_end + 4 + length
    }

    const RATE_LIMITED: &str = "HTTP/1.1 429 Too Many Requests\r\nContent-Type: application/json\r\nContent-Length: 38\r\nConnection: close\r\n\r\n{\"retry_after\": 0.01, \"global\": false}";
    const NO_CONTENT: &str = "HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n";
    const SERVER_ERROR: &str =
        "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

    #[tokio::test]
    async fn discord_retries_after_rate_limit() {
        let (url, hits) = http_server(vec![RATE_LIMITED, NO_CONTENT]).await;
        let sink = DiscordWebhookSink::new(&url)
            .unwrap()
            .with_base_delay(Duration::from_millis(10));
        sink.send(&censored_notification()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn discord_gives_up_on_server_error() {
        let (url, hits) = http_server(vec![SERVER_ERROR, NO_CONTENT]).await;
        let sink = DiscordWebhookSink::new(&url).unwrap();
        let err = sink.send(&censored_notification()).await.unwrap_err();
        assert!(matches!(err, Error::SinkStatus { status: 500, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn discord_stops_after_attempt_limit() {
        let (url, hits) = http_server(vec![RATE_LIMITED, RATE_LIMITED, RATE_LIMITED]).await;
        let sink = DiscordWebhookSink::new(&url)
            .unwrap()
            .with_attempts(2)
            .with_base_delay(Duration::from_millis(10));
        let err = sink.send(&censored_notification()).await.unwrap_err();
        assert!(matches!(err, Error::SinkStatus { status: 429, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn notifier_delivers_to_every_sink() {
        let a = MemorySink::new();
        let b = MemorySink::new();
        let (notifier, task) = Notifier::spawn(vec![Arc::new(a.clone()), Arc::new(b.clone())], 4);
        assert!(notifier.notify(censored_notification()));
        drop(notifier);
        task.await.unwrap();
        assert_eq!(a.received(), vec![censored_notification()]);
        assert_eq!(b.received().len(), 1);
    }

    struct StuckSink;

    #[async_trait]
    impl NotificationSink for StuckSink {
        fn name(&self) -> &'static str {
            "stuck"
        }

        async fn send(&self, _n: &Notification) -> Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let (notifier, task) = Notifier::spawn(vec![Arc::new(StuckSink)], 1);
        let mut queued = 0;
        for _ in 0..5 {
            if notifier.notify(censored_notification()) {
                queued += 1;
            }
        }
        // One may be in the stuck sink and one in the channel.
        assert!(queued <= 2, "queued {queued}");
        assert!(queued >= 1);
        task.abort();
    }

    #[test]
    fn disabled_notifier_discards() {
        assert!(!Notifier::disabled().notify(censored_notification()));
    }
}
