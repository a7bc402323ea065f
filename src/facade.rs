//! `VoiceCore` facade: the one public entry point per spec.md §4.8.
//!
//! Grounded in `state::AppState::new`'s "construct shared state, hand off to
//! an orchestrator, store a handle" wiring style and `party::party.rs`'s
//! per-session task spawning, adapted to spec.md §9's cyclic-reference
//! resolution described in `pacer.rs`: the facade keeps the pacer's enqueue
//! handle and hands the consumer into the playback task with no
//! back-reference.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::codec::{CodecUnit, OpusCodec};
use crate::config::CoreConfig;
use crate::energy::EnergyDetector;
use crate::error::{CoreError, CoreResult};
use crate::mixer::Mixer;
use crate::model::{ModelClient, SessionConfig};
use crate::pacer::{run_playback_task, PlaybackPacer};
use crate::segmenter::Segmenter;
use crate::transport::{EgressSink, IngressSource};
use crate::types::RtpFrame;

/// A running session. Holds only what's needed to cancel and join it; every
/// interior component (jitter buffers, mixer, pacer) is private to the
/// spawned tasks.
pub struct SessionHandle {
    session_id: String,
    cancel: CancellationToken,
    segmenter_task: JoinHandle<()>,
    playback_task: JoinHandle<()>,
    bridge_task: JoinHandle<()>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current lifecycle status, derived from whether the spawned tasks have
    /// finished.
    pub fn status(&self) -> SessionStatus {
        if self.cancel.is_cancelled() {
            SessionStatus::Stopping
        } else if self.segmenter_task.is_finished()
            && self.playback_task.is_finished()
            && self.bridge_task.is_finished()
        {
            SessionStatus::Ended
        } else {
            SessionStatus::Running
        }
    }

    /// Signals cancellation and waits for all three tasks to finish, per
    /// spec.md §5's "each cleans up within one frame time plus any in-flight
    /// commit."
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = tokio::join!(self.segmenter_task, self.playback_task, self.bridge_task);
        info!(session_id = %self.session_id, "session stopped");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    Stopping,
    Ended,
}

/// The crate's single public entry point. Constructs the codec, mixer,
/// energy detector, and playback pacer from `config`, wires ingress through
/// the segmenter and the model client's replies through the pacer to
/// `egress`, and spawns the three session tasks described in spec.md §5.
pub struct VoiceCore;

impl VoiceCore {
    /// Starts a new session. Establishes and configures the model session
    /// first (per spec.md §6), so a `connect` failure surfaces as
    /// [`CoreError::Fatal`] before any task is spawned. `ingress` is then
    /// polled by a small bridging task into the segmenter's internal
    /// channel; `egress` is driven exclusively by the playback task.
    pub async fn start<I, E, M>(
        session_id: impl Into<String>,
        config: CoreConfig,
        mut ingress: I,
        egress: E,
        mut model: M,
    ) -> CoreResult<SessionHandle>
    where
        I: IngressSource + 'static,
        E: EgressSink + 'static,
        M: ModelClient + 'static,
    {
        let session_id = session_id.into();

        model
            .connect(&config.model_id)
            .await
            .map_err(|e| CoreError::Fatal(format!("model connect failed: {e}")))?;
        model
            .configure(SessionConfig::new(config.voice.clone(), config.vad_mode))
            .await
            .map_err(|e| CoreError::Fatal(format!("model configure failed: {e}")))?;

        let codec: Arc<dyn CodecUnit> = Arc::new(OpusCodec::new(config.audio_quality)?);
        let mixer = Arc::new(Mixer::new());
        let energy = Arc::new(EnergyDetector::new(
            config.silence_threshold,
            config.adaptive_threshold,
        ));
        let (pacer, consumer) = PlaybackPacer::new();
        let debounce = std::time::Duration::from_millis(config.silence_duration_ms);

        let cancel = CancellationToken::new();

        let (ingress_tx, ingress_rx) = tokio::sync::mpsc::channel::<RtpFrame>(256);

        let bridge_cancel = cancel.clone();
        let bridge_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = bridge_cancel.cancelled() => break,
                    maybe = ingress.try_recv() => match maybe {
                        None => break,
                        Some(packet) => {
                            if ingress_tx.send(packet.into_rtp_frame()).await.is_err() {
                                break;
                            }
                        }
                    },
                }
            }
        });

        let segmenter = Segmenter::new(mixer, codec.clone(), energy, debounce, model, pacer.clone());
        let segmenter_session_id = session_id.clone();
        let segmenter_cancel = cancel.clone();
        let segmenter_task = tokio::spawn(async move {
            segmenter.run(ingress_rx, segmenter_cancel, &segmenter_session_id).await;
        });

        pacer.claim_start();
        let playback_cancel = cancel.clone();
        let playback_task = tokio::spawn(run_playback_task(pacer, consumer, codec, egress, playback_cancel));

        Ok(SessionHandle {
            session_id,
            cancel,
            segmenter_task,
            playback_task,
            bridge_task,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FailingModelClient, RecordingEgress, ScriptedModelClient};
    use crate::transport::IngressPacket;
    use std::sync::Mutex;

    struct VecIngress {
        packets: Mutex<Vec<IngressPacket>>,
    }

    impl IngressSource for VecIngress {
        async fn try_recv(&mut self) -> Option<IngressPacket> {
            self.packets.lock().unwrap().pop()
        }
    }

    #[tokio::test]
    async fn start_and_stop_cleans_up_promptly() {
        let config = CoreConfig {
            audio_quality: crate::config::AudioQuality::Low,
            silence_duration_ms: 20,
            ..CoreConfig::default()
        };
        let ingress = VecIngress {
            packets: Mutex::new(Vec::new()),
        };
        let egress = RecordingEgress::default();
        let model = ScriptedModelClient::with_audio_reply(vec![]);

        let handle = VoiceCore::start("sess-1", config, ingress, egress, model)
            .await
            .expect("start should succeed");
        assert_eq!(handle.session_id(), "sess-1");

        tokio::time::timeout(std::time::Duration::from_secs(2), handle.stop())
            .await
            .expect("stop should complete promptly");
    }

    #[tokio::test]
    async fn model_connect_failure_surfaces_as_fatal_before_any_task_spawns() {
        let ingress = VecIngress {
            packets: Mutex::new(Vec::new()),
        };
        let egress = RecordingEgress::default();
        let model = FailingModelClient;

        let err = VoiceCore::start("sess-2", CoreConfig::default(), ingress, egress, model)
            .await
            .expect_err("connect failure should surface to the caller");
        assert!(matches!(err, crate::error::CoreError::Fatal(_)));
    }
}
