//! Thin demo binary: wires a synthetic ingress, a scripted model client, and
//! a logging egress sink through [`voicecore::VoiceCore`] to exercise one
//! session end to end without a real transport or model connection.
//!
//! Grounded in the teacher's `main.rs` tracing-subscriber bootstrap, swapped
//! from `dioxus::logger` (a GUI-framework concern this crate drops) to plain
//! `tracing_subscriber::fmt`.

use std::sync::Mutex;
use std::time::Duration;

use tracing::{info, Level};

use voicecore::{CoreConfig, CoreResult, EgressSink, IngressPacket, IngressSource, ModelClient, ModelEvent, SessionConfig};

struct SilentIngress {
    remaining: Mutex<u32>,
}

impl IngressSource for SilentIngress {
    async fn try_recv(&mut self) -> Option<IngressPacket> {
        let mut remaining = self.remaining.lock().unwrap();
        if *remaining == 0 {
            return None;
        }
        *remaining -= 1;
        tokio::time::sleep(Duration::from_millis(20)).await;
        Some(IngressPacket {
            stream_id: 1,
            sequence: (100 - *remaining) as u16,
            rtp_timestamp: (100 - *remaining) * 960,
            payload: vec![0u8; 1920 * 2],
        })
    }
}

struct LoggingEgress;

impl EgressSink for LoggingEgress {
    async fn send_frame(&mut self, compressed: &[u8]) -> CoreResult<()> {
        info!(bytes = compressed.len(), "emitting playback frame");
        Ok(())
    }
}

/// Echoes silence back as one `AudioDelta` per commit, so the demo has
/// something to push through the playback pacer without a real model
/// connection.
#[derive(Default)]
struct LoopbackModelClient {
    pending: Vec<ModelEvent>,
}

impl ModelClient for LoopbackModelClient {
    async fn connect(&mut self, model_id: &str) -> CoreResult<()> {
        info!(model_id, "connected to demo model");
        Ok(())
    }

    async fn configure(&mut self, _cfg: SessionConfig) -> CoreResult<()> {
        Ok(())
    }

    async fn send_audio(&mut self, _base64_pcm16_24k: &str) -> CoreResult<()> {
        Ok(())
    }

    async fn commit_audio(&mut self) -> CoreResult<()> {
        Ok(())
    }

    async fn request_response(&mut self) -> CoreResult<()> {
        let silence = vec![0u8; 480 * 2];
        self.pending.push(ModelEvent::AudioDelta(silence));
        self.pending.push(ModelEvent::ResponseDone(Default::default()));
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ModelEvent> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.pending.remove(0))
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let ingress = SilentIngress {
        remaining: Mutex::new(50),
    };
    let egress = LoggingEgress;
    let model = LoopbackModelClient::default();

    let handle = voicecore::VoiceCore::start("demo-session", CoreConfig::default(), ingress, egress, model)
        .await
        .expect("failed to start demo session");

    tokio::time::sleep(Duration::from_secs(3)).await;
    handle.stop().await;
}
