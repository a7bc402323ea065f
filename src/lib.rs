//! Real-time voice conferencing bridge: jitter-buffered ingress, RTP
//! timestamp-aligned timeline reconstruction, multi-stream mixing,
//! silence-debounced utterance segmentation against a speech-to-speech
//! model, and drift-corrected paced playback.
//!
//! # Crate structure
//!
//! - [`types`] - Shared frame/identifier types
//! - [`error`] - Typed error kinds
//! - [`config`] - Enumerated core configuration
//! - [`codec`] - Opus encode/decode and sample-rate resampling
//! - [`jitter`] - Per-stream reorder buffer
//! - [`timeline`] - RTP timestamp → mixer-sample-offset alignment
//! - [`mixer`] - Multi-stream PCM accumulation
//! - [`energy`] - RMS energy and adaptive silence threshold
//! - [`segmenter`] - Debounce-driven commit loop against a model client
//! - [`pacer`] - Paced, drift-corrected playback
//! - [`model`] - Speech-to-speech model client trait
//! - [`transport`] - Ingress/egress transport traits
//! - [`debug_audio`] - Optional debug WAV capture
//! - [`facade`] - [`facade::VoiceCore`], the crate's single public entry point

pub mod codec;
pub mod config;
pub mod debug_audio;
pub mod energy;
pub mod error;
pub mod facade;
pub mod jitter;
pub mod mixer;
pub mod model;
pub mod pacer;
pub mod segmenter;
pub mod timeline;
pub mod transport;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod testutil;

pub use config::{AudioQuality, CoreConfig, VadMode};
pub use error::{CoreError, CoreResult};
pub use facade::{SessionHandle, SessionStatus, VoiceCore};
pub use model::{ModelClient, ModelEvent, SessionConfig};
pub use transport::{EgressSink, IngressPacket, IngressSource};
