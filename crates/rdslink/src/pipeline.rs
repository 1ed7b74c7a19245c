//! The track ingestion pipeline.
//!
//! For every delivery, in order and one at a time:
//!
//! 1. parse the JSON body into a [`TrackEvent`] (malformed bodies are
//!    logged, acknowledged and dropped)
//! 2. compose the RadioText line and compute its RT+ tags
//! 3. report any alteration or degradation to the [`Notifier`]
//! 4. submit `TEXT=` then `RT+TAG=` to the encoder and wait for the outcome
//! 5. publish a preview if both commands were accepted
//! 6. acknowledge the delivery
//!
//! A delivery is acknowledged only after its outcome is known, whether the
//! encoder accepted it, rejected it, or the connection failed underneath
//! it. Tracks are never retried: by the time a retry could happen the next
//! track is usually already playing.

use std::sync::Arc;

use rdslink_core::Error as LinkError;
use rdslink_encoder::{EncoderCommand, EncoderHandle};
use rdslink_text::{
    ComposedMessage, Composer, ContentTypes, RtPlusEncoder, decode, timeout_for_duration,
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::notify::{Notification, Notifier};
use crate::queue::{Delivery, Preview, PreviewSink, TrackSource};

// ---------------------------------------------------------------------------
// TrackEvent
// ---------------------------------------------------------------------------

/// One "now playing" message from the queue.
///
/// ```
/// use rdslink::pipeline::TrackEvent;
///
/// let event = TrackEvent::parse(br#"{"artist":"Owl City","song":"Fireflies","duration":228}"#).unwrap();
/// assert_eq!(event.title, "Fireflies");
/// assert_eq!(event.duration_secs(), Some(228));
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrackEvent {
    /// The performing artist.
    pub artist: String,
    /// The track title, sent as `song`.
    #[serde(rename = "song", alias = "title")]
    pub title: String,
    /// Track length in seconds, if known.
    #[serde(default)]
    pub duration: Option<f64>,
}

impl TrackEvent {
    /// Parse a queue message body.
    pub fn parse(body: &[u8]) -> Result<TrackEvent> {
        Ok(serde_json::from_slice(body)?)
    }

    /// The duration in whole seconds, ignoring nonsense values.
    pub fn duration_secs(&self) -> Option<u64> {
        self.duration
            .filter(|d| d.is_finite() && *d >= 0.0)
            .map(|d| d as u64)
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// What happened to one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Both commands were accepted.
    Sent {
        /// The RadioText line now on air.
        text: String,
    },
    /// The encoder refused a command; later commands were not sent.
    Rejected {
        /// The refused command line.
        command: String,
        /// The encoder's reply.
        response: String,
    },
    /// The connection failed mid-track, or the commands could not be built.
    Abandoned {
        /// What went wrong.
        error: String,
    },
    /// The body was not a valid track message.
    Malformed {
        /// The parse error.
        error: String,
    },
    /// The pipeline was cancelled, or the encoder link shut down, before
    /// the track's commands went out. The delivery is left unacknowledged
    /// so the broker redelivers it.
    Interrupted,
}

impl Outcome {
    /// Whether the delivery should be acknowledged.
    pub fn should_ack(&self) -> bool {
        !matches!(self, Outcome::Interrupted)
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Turns track deliveries into encoder commands.
pub struct Pipeline {
    composer: Composer,
    encoder: RtPlusEncoder,
    timeout_from_duration: bool,
    link: EncoderHandle,
    preview: Arc<dyn PreviewSink>,
    notifier: Notifier,
}

impl Pipeline {
    /// Assemble a pipeline from its parts.
    pub fn new(
        composer: Composer,
        encoder: RtPlusEncoder,
        link: EncoderHandle,
        preview: Arc<dyn PreviewSink>,
        notifier: Notifier,
    ) -> Self {
        Pipeline {
            composer,
            encoder,
            timeout_from_duration: false,
            link,
            preview,
            notifier,
        }
    }

    /// Assemble a pipeline using the text and RT+ settings in `config`.
    pub fn from_config(
        config: &Config,
        link: EncoderHandle,
        preview: Arc<dyn PreviewSink>,
        notifier: Notifier,
    ) -> Result<Self> {
        let pipeline = Pipeline::new(
            config.composer()?,
            config.rt_plus_encoder()?,
            link,
            preview,
            notifier,
        )
        .timeout_from_duration(config.rt_plus.timeout_from_duration);
        Ok(pipeline)
    }

    /// Send `duration / 60` as the RT+ timeout when the track has a duration.
    pub fn timeout_from_duration(mut self, enabled: bool) -> Self {
        self.timeout_from_duration = enabled;
        self
    }

    /// The encoder link.
    pub fn link(&self) -> &EncoderHandle {
        &self.link
    }

    /// Swap in a new composer, e.g. after reloading the denylist.
    pub fn set_composer(&mut self, composer: Composer) {
        self.composer = composer;
    }

    /// Consume `source` until it closes or `cancel` fires.
    ///
    /// Cancellation is honored between deliveries and while a track waits
    /// for the encoder link to come up. Once the link has taken a track's
    /// commands, the track runs to its outcome and is acknowledged. Returns
    /// an error only when the source itself fails or an acknowledgement
    /// cannot be sent.
    pub async fn run<S: TrackSource>(&self, source: &mut S, cancel: CancellationToken) -> Result<()> {
        info!("Pipeline started");
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Pipeline stopping");
                    return Ok(());
                }
                next = source.next_delivery() => next,
            };

            let Some(delivery) = next else {
                info!("Track source closed");
                return Ok(());
            };
            let delivery = delivery?;

            let outcome = self.handle(delivery.body(), &cancel).await;
            if !outcome.should_ack() {
                warn!("Track not sent before shutdown; leaving delivery unacknowledged");
                return Ok(());
            }
            delivery.ack().await?;
        }
    }

    /// Handle one message body and report the outcome. Does not ack.
    pub async fn process(&self, body: &[u8]) -> Outcome {
        self.handle(body, &CancellationToken::new()).await
    }

    async fn handle(&self, body: &[u8], cancel: &CancellationToken) -> Outcome {
        let event = match TrackEvent::parse(body) {
            Ok(event) => event,
            Err(e) => {
                error!(
                    error = %e,
                    payload = %String::from_utf8_lossy(body),
                    "Malformed track payload, dropping"
                );
                return Outcome::Malformed {
                    error: e.to_string(),
                };
            }
        };
        debug!(artist = %event.artist, title = %event.title, "Received track");

        let msg = self.composer.compose(&event.artist, &event.title);
        let timeout = match (self.timeout_from_duration, event.duration_secs()) {
            (true, Some(secs)) => timeout_for_duration(secs),
            _ => 0,
        };
        let encoded = self.encoder.encode_with_timeout(&msg, timeout);

        for degradation in &msg.degradations {
            warn!(text = %msg.text, %degradation, "Track degraded");
        }
        if let Some(notification) = Notification::for_message(&msg, &encoded.degradations) {
            self.notifier.notify(notification);
        }

        let payload = encoded.tags.payload();
        let commands = match (
            EncoderCommand::text(&msg.text),
            EncoderCommand::rt_plus_tag(&payload),
        ) {
            (Ok(text), Ok(tags)) => vec![text, tags],
            (Err(e), _) | (_, Err(e)) => {
                error!(error = %e, text = %msg.text, "Cannot build encoder commands");
                return Outcome::Abandoned {
                    error: e.to_string(),
                };
            }
        };

        let (artist, title) = tagged_fields(&payload, &msg, self.encoder.types());

        match self.link.submit_until(commands, cancel).await {
            Ok(()) => {
                info!(text = %msg.text, "Track sent to encoder");
                let preview = Preview {
                    text: msg.text.clone(),
                    artist,
                    title,
                    truncated: msg.truncated(),
                };
                if let Err(e) = self.preview.publish(&preview).await {
                    error!(error = %e, "Preview publish failed");
                }
                Outcome::Sent { text: msg.text }
            }
            Err(LinkError::Rejected { command, response }) => {
                warn!(%command, %response, "Encoder rejected track");
                Outcome::Rejected { command, response }
            }
            Err(LinkError::Shutdown) => Outcome::Interrupted,
            Err(e) => {
                warn!(error = %e, text = %msg.text, "Track abandoned");
                Outcome::Abandoned {
                    error: e.to_string(),
                }
            }
        }
    }

    /// Stop the encoder link.
    pub async fn shutdown(self) {
        self.link.shutdown().await;
    }
}

/// Artist and title as a receiver would read them from `payload`.
///
/// Falls back to the composed spans if the payload does not decode, which
/// means the encoder and decoder disagree.
fn tagged_fields(
    payload: &str,
    msg: &ComposedMessage,
    types: ContentTypes,
) -> (Option<String>, Option<String>) {
    match decode(payload, &msg.text, types) {
        Ok(decoded) => {
            debug!(%payload, artist = ?decoded.artist, title = ?decoded.title, "RT+ tags");
            (decoded.artist, decoded.title)
        }
        Err(e) => {
            error!(error = %e, %payload, text = %msg.text, "Cannot decode own RT+ payload");
            let field = |text: &str| (!text.is_empty()).then(|| text.to_string());
            (field(msg.artist_text()), field(msg.title_text()))
        }
    }
}
