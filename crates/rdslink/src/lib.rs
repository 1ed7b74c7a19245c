//! # rdslink -- Now-Playing to RDS Encoder Bridge
//!
//! `rdslink` takes "now playing" track messages from a message queue and
//! puts them on air through a hardware RDS encoder: the artist and title
//! become a 64-character RadioText line (`TEXT=`) plus RT+ tags
//! (`RT+TAG=`) that let receivers show each field separately.
//!
//! ## Architecture
//!
//! | Crate                  | Purpose                                        |
//! |------------------------|------------------------------------------------|
//! | `rdslink-core`         | Transport traits, link events, shared types, errors |
//! | `rdslink-text`         | Normalization, profanity masking, composition, RT+ |
//! | `rdslink-transport`    | TCP transport to the encoder                   |
//! | `rdslink-encoder`      | Connection state machine and IO task           |
//! | **`rdslink`**          | This crate -- config, pipeline, AMQP, notifications |
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use rdslink::config::Config;
//! use rdslink::notify::{LogSink, Notifier};
//! use rdslink::pipeline::Pipeline;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     let link = config.encoder.builder().build()?;
//!     let (mut source, preview) = rdslink::amqp::connect(&config.queue, &config.preview).await?;
//!     let (notifier, _task) = Notifier::spawn(vec![Arc::new(LogSink)], config.notify.queue_capacity);
//!
//!     let pipeline = Pipeline::from_config(&config, link, Arc::new(preview), notifier)?;
//!     pipeline.run(&mut source, CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Failure Handling
//!
//! Every track gets exactly one attempt. A `NO` from the encoder, or a
//! connection that drops while a command is outstanding, abandons that
//! track; the delivery is still acknowledged and the next track proceeds
//! once the link is back. The encoder connection reconnects on its own with
//! exponential backoff. Text alterations (transliteration, masking,
//! truncation) are reported through [`notify`] and never block the track
//! path.

pub mod amqp;
pub mod config;
pub mod error;
pub mod notify;
pub mod pipeline;
pub mod queue;

pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{Outcome, Pipeline, TrackEvent};

pub use rdslink_core::{
    Degradation, EncoderEvent, Field, MAX_TEXT_LEN, Reason, SEPARATOR, Span,
};

/// The encoder link: protocol, state machine, IO task, builder.
pub mod encoder {
    pub use rdslink_encoder::*;
}

/// Text processing: normalization, profanity masking, composition, RT+.
pub mod text {
    pub use rdslink_text::*;
}
