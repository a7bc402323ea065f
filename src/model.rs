//! Model client boundary: a trait only, no network code, per spec.md §1's
//! scoping of the speech-to-speech model client as an external collaborator.
//!
//! Grounded in the teacher's trait-based capability-polymorphism idiom
//! (`pipeline::traits::Node`: production wires concrete implementations,
//! tests wire fakes) and in the base64 PCM16 audio-delta shape of
//! `other_examples/…openai-codex…realtime_audio.rs`, the closest real-world
//! analogue in the retrieval pack of "speak to a realtime speech model over
//! base64 PCM frames." Methods are `async fn` in trait (stable since
//! edition 2024) rather than boxed trait objects — the facade is generic
//! over `M: ModelClient`, matching the teacher's static-dispatch pipeline
//! composition rather than `dyn` dispatch.

use base64::Engine;

use crate::config::VadMode;
use crate::error::CoreResult;

/// Modalities the model session should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    Text,
    Audio,
}

/// Session configuration passed to [`ModelClient::configure`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub modalities: Vec<Modality>,
    pub voice: String,
    pub output_sample_rate_hz: u32,
    pub vad_mode: VadMode,
}

impl SessionConfig {
    pub fn new(voice: impl Into<String>, vad_mode: VadMode) -> Self {
        Self {
            modalities: vec![Modality::Text, Modality::Audio],
            voice: voice.into(),
            output_sample_rate_hz: 24_000,
            vad_mode,
        }
    }
}

/// Token/time usage reported when a response completes.
#[derive(Debug, Clone, Default)]
pub struct UsageReport {
    pub input_audio_seconds: f32,
    pub output_audio_seconds: f32,
}

/// Events the model client delivers back to the core.
#[derive(Debug, Clone)]
pub enum ModelEvent {
    AudioDelta(Vec<u8>),
    UserTranscript(String),
    AssistantTranscript(String),
    ResponseDone(UsageReport),
    Error(String),
}

/// A bidirectional session with an external speech-to-speech model.
///
/// Implementations own the transport (websocket, gRPC, whatever); this crate
/// only ever calls through this trait, and only the facade/segmenter ever
/// hold one.
pub trait ModelClient: Send + Sync {
    /// Establishes a session against the named model.
    async fn connect(&mut self, model_id: &str) -> CoreResult<()>;

    /// Sets modalities, voice, output format, and turn-detection mode.
    async fn configure(&mut self, cfg: SessionConfig) -> CoreResult<()>;

    /// Appends base64-encoded 24 kHz mono PCM16 input audio.
    async fn send_audio(&mut self, base64_pcm16_24k: &str) -> CoreResult<()>;

    /// Closes the current input segment.
    async fn commit_audio(&mut self) -> CoreResult<()>;

    /// Requests a response for the committed input.
    async fn request_response(&mut self) -> CoreResult<()>;

    /// Polls for the next event, or `None` once the session has ended.
    async fn next_event(&mut self) -> Option<ModelEvent>;
}

/// Encodes raw 24 kHz mono PCM16 samples as the base64 string `send_audio`
/// expects.
pub fn encode_pcm16_base64(samples: &[i16]) -> String {
    let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decodes a base64 PCM16 payload (as delivered in [`ModelEvent::AudioDelta`]
/// after the transport-level base64 decode, or directly from a raw string)
/// back into samples.
pub fn decode_pcm16_base64(encoded: &str) -> CoreResult<Vec<i16>> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| crate::error::CoreError::ModelProtocol(format!("bad base64 audio: {e}")))?;
    if bytes.len() % 2 != 0 {
        return Err(crate::error::CoreError::MalformedInput(
            "pcm16 byte length must be even".into(),
        ));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect())
}

/// Converts a raw little-endian PCM16 byte buffer (as delivered inside
/// [`ModelEvent::AudioDelta`]) into samples.
pub fn pcm16_bytes_to_samples(bytes: &[u8]) -> CoreResult<Vec<i16>> {
    if bytes.len() % 2 != 0 {
        return Err(crate::error::CoreError::MalformedInput(
            "pcm16 byte length must be even".into(),
        ));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_round_trip_preserves_samples() {
        let samples: Vec<i16> = (0..960).map(|i| (i * 17) as i16).collect();
        let encoded = encode_pcm16_base64(&samples);
        let decoded = decode_pcm16_base64(&encoded).unwrap();
        assert_eq!(decoded, samples);
    }

    #[test]
    fn decode_rejects_odd_byte_length() {
        // Three raw bytes -> base64 of odd-length payload.
        let encoded = base64::engine::general_purpose::STANDARD.encode([1u8, 2, 3]);
        assert!(decode_pcm16_base64(&encoded).is_err());
    }

    #[test]
    fn decode_rejects_invalid_base64() {
        assert!(decode_pcm16_base64("not valid base64!!").is_err());
    }

    #[test]
    fn pcm16_bytes_round_trip_via_le_bytes() {
        let samples: Vec<i16> = vec![1, -2, 3, -4];
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        assert_eq!(pcm16_bytes_to_samples(&bytes).unwrap(), samples);
    }

    #[test]
    fn pcm16_bytes_rejects_odd_length() {
        assert!(pcm16_bytes_to_samples(&[1, 2, 3]).is_err());
    }

    #[test]
    fn session_config_defaults_to_text_and_audio() {
        let cfg = SessionConfig::new("alloy", VadMode::Server);
        assert!(cfg.modalities.contains(&Modality::Audio));
        assert!(cfg.modalities.contains(&Modality::Text));
        assert_eq!(cfg.output_sample_rate_hz, 24_000);
    }
}
