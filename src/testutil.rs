//! Fakes for unit and integration tests: an identity codec that avoids
//! linking libopus for math-only tests, and scripted/failing model clients.
//!
//! Grounded in the teacher's capability-polymorphism testing idiom
//! (`pipeline::traits::Node` — production wires concrete nodes, tests wire
//! fakes) applied to this crate's `CodecUnit`/`ModelClient`/`EgressSink`
//! traits.

use std::sync::Mutex;
use std::time::Instant;

use tokio::sync::Mutex as AsyncMutex;

use crate::codec::STEREO_48K_FRAME_SAMPLES;
use crate::config::VadMode;
use crate::error::{CoreError, CoreResult};
use crate::model::{ModelClient, ModelEvent, SessionConfig, UsageReport};
use crate::transport::EgressSink;

/// Treats "compressed" bytes as raw little-endian i16 PCM, so mixer/timeline
/// math can be tested without a real Opus round trip.
pub struct IdentityCodec;

impl crate::codec::CodecUnit for IdentityCodec {
    fn decode(&self, compressed: &[u8]) -> CoreResult<Vec<i16>> {
        if compressed.is_empty() {
            return Err(CoreError::MalformedInput("empty compressed frame".into()));
        }
        let mut samples: Vec<i16> = compressed
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        samples.resize(STEREO_48K_FRAME_SAMPLES, 0);
        Ok(samples)
    }

    fn encode(&self, stereo_48k_20ms: &[i16]) -> CoreResult<Vec<u8>> {
        let mut padded = vec![0i16; STEREO_48K_FRAME_SAMPLES];
        let n = stereo_48k_20ms.len().min(STEREO_48K_FRAME_SAMPLES);
        padded[..n].copy_from_slice(&stereo_48k_20ms[..n]);
        Ok(padded.iter().flat_map(|s| s.to_le_bytes()).collect())
    }
}

/// Records every egress call with a monotonic arrival instant, for cadence
/// assertions (spec.md §8 scenario 7). Clones share the same log, so a test
/// can keep one clone to inspect after moving the other into a playback
/// task.
#[derive(Default, Clone)]
pub struct RecordingEgress {
    pub frames: std::sync::Arc<Mutex<Vec<(Instant, Vec<u8>)>>>,
}

impl EgressSink for RecordingEgress {
    async fn send_frame(&mut self, compressed: &[u8]) -> CoreResult<()> {
        self.frames
            .lock()
            .unwrap()
            .push((Instant::now(), compressed.to_vec()));
        Ok(())
    }
}

/// Always fails the first call the segmenter makes, to exercise
/// `ModelProtocol`/`Fatal` handling without a real session.
#[derive(Default)]
pub struct FailingModelClient;

impl ModelClient for FailingModelClient {
    async fn connect(&mut self, _model_id: &str) -> CoreResult<()> {
        Err(CoreError::Fatal("fake connect failure".into()))
    }

    async fn configure(&mut self, _cfg: SessionConfig) -> CoreResult<()> {
        Ok(())
    }

    async fn send_audio(&mut self, _base64_pcm16_24k: &str) -> CoreResult<()> {
        Err(CoreError::ModelProtocol("fake send_audio failure".into()))
    }

    async fn commit_audio(&mut self) -> CoreResult<()> {
        Ok(())
    }

    async fn request_response(&mut self) -> CoreResult<()> {
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ModelEvent> {
        None
    }
}

/// A scripted model client that, after one commit cycle, replays a fixed
/// sequence of events: one `AudioDelta` (if non-empty) followed by
/// `ResponseDone`.
pub struct ScriptedModelClient {
    audio_reply: Vec<u8>,
    pending: AsyncMutex<Vec<ModelEvent>>,
    pub vad_mode_seen: Mutex<Option<VadMode>>,
}

impl ScriptedModelClient {
    pub fn with_audio_reply(audio_reply: Vec<u8>) -> Self {
        Self {
            audio_reply,
            pending: AsyncMutex::new(Vec::new()),
            vad_mode_seen: Mutex::new(None),
        }
    }
}

impl ModelClient for ScriptedModelClient {
    async fn connect(&mut self, _model_id: &str) -> CoreResult<()> {
        Ok(())
    }

    async fn configure(&mut self, cfg: SessionConfig) -> CoreResult<()> {
        *self.vad_mode_seen.lock().unwrap() = Some(cfg.vad_mode);
        Ok(())
    }

    async fn send_audio(&mut self, _base64_pcm16_24k: &str) -> CoreResult<()> {
        Ok(())
    }

    async fn commit_audio(&mut self) -> CoreResult<()> {
        Ok(())
    }

    async fn request_response(&mut self) -> CoreResult<()> {
        let mut pending = self.pending.lock().await;
        if !self.audio_reply.is_empty() {
            pending.push(ModelEvent::AudioDelta(self.audio_reply.clone()));
        }
        pending.push(ModelEvent::ResponseDone(UsageReport::default()));
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ModelEvent> {
        let mut pending = self.pending.lock().await;
        if pending.is_empty() {
            None
        } else {
            Some(pending.remove(0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecUnit;

    #[test]
    fn identity_codec_round_trips_sample_count() {
        let codec = IdentityCodec;
        let samples: Vec<i16> = (0..STEREO_48K_FRAME_SAMPLES as i16).collect();
        let encoded = codec.encode(&samples).unwrap();
        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!(decoded.len(), samples.len());
    }

    #[test]
    fn identity_codec_rejects_empty_input() {
        let codec = IdentityCodec;
        assert!(codec.decode(&[]).is_err());
    }
}
