//! Segmenter loop: the single cooperative task that owns ingress, decides
//! when a mixed segment is done, and drives the model client through one
//! commit cycle.
//!
//! Grounded in the teacher's `party::packet_dispatcher::PacketDispatcher`
//! (`tokio::spawn`'d loop, `tracing` instrumentation around receive/dispatch)
//! but the UDP socket receive is replaced with `tokio::select!` over an
//! ingress `mpsc::Receiver<RtpFrame>`, a `tokio::time::sleep`-based debounce
//! deadline, and a `tokio-util` `CancellationToken`, per spec.md §5's
//! "select over (ingress_recv, debounce_tick, cancel)" and §9's coroutine
//! control-flow guidance.
//!
//! Judgment call (see DESIGN.md): spec.md §5 lists the model-event
//! dispatcher as a separate task from the segmenter. `ModelClient`'s
//! `&mut self` methods don't split cleanly into independent send/receive
//! halves without inventing an API the spec doesn't otherwise need, so the
//! event-drain for one commit's response runs as a second `select!` branch
//! inside the same task as the commit, not as a third spawned task. This
//! still satisfies §4.5's "Committing accepts new packets" requirement,
//! since ingress and model events are polled concurrently within that
//! inner loop.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info_span, warn, Instrument};

use crate::codec::{decimate_48k_mono_to_24k_mono, downmix_48k_stereo_to_48k_mono, CodecUnit};
use crate::energy::EnergyDetector;
use crate::jitter::JitterBuffer;
use crate::mixer::Mixer;
use crate::model::{encode_pcm16_base64, pcm16_bytes_to_samples, ModelClient, ModelEvent};
use crate::pacer::PlaybackPacer;
use crate::types::{PcmFrame, PlaybackChunk, RtpFrame, StreamId};

/// Segmenter states per spec.md §4.5. `Committing` is folded into the
/// commit-handling function rather than tracked as data the outer loop
/// branches on, since the inner select! loop already encodes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    Idle,
    Accumulating,
}

/// Owns per-stream jitter buffers, the shared mixer, and the model session
/// for one voice conferencing session.
pub struct Segmenter<M: ModelClient> {
    jitter: DashMap<StreamId, JitterBuffer>,
    mixer: Arc<Mixer>,
    codec: Arc<dyn CodecUnit>,
    energy: Arc<EnergyDetector>,
    debounce: Duration,
    model: M,
    pacer: Arc<PlaybackPacer>,
}

impl<M: ModelClient> Segmenter<M> {
    pub fn new(
        mixer: Arc<Mixer>,
        codec: Arc<dyn CodecUnit>,
        energy: Arc<EnergyDetector>,
        debounce: Duration,
        model: M,
        pacer: Arc<PlaybackPacer>,
    ) -> Self {
        Self {
            jitter: DashMap::new(),
            mixer,
            codec,
            energy,
            debounce,
            model,
            pacer,
        }
    }

    /// Runs until the ingress channel closes or `cancel` fires.
    pub async fn run(mut self, mut ingress: mpsc::Receiver<RtpFrame>, cancel: CancellationToken, session_id: &str) {
        let span = info_span!("segmenter", session_id = %session_id);
        async {
            loop {
                let mut state = SegmenterState::Idle;

                tokio::select! {
                    _ = cancel.cancelled() => return,
                    maybe = ingress.recv() => match maybe {
                        None => return,
                        Some(frame) => {
                            self.ingest(frame);
                            state = SegmenterState::Accumulating;
                        }
                    },
                }
                debug_assert_eq!(state, SegmenterState::Accumulating);

                let mut ingress_closed = false;
                'accumulating: loop {
                    let sleep = tokio::time::sleep(self.debounce);
                    tokio::pin!(sleep);
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = &mut sleep => break 'accumulating,
                        maybe = ingress.recv() => match maybe {
                            None => { ingress_closed = true; break 'accumulating; }
                            Some(frame) => self.ingest(frame),
                        },
                    }
                }

                self.commit(&mut ingress, &cancel).await;

                if ingress_closed {
                    return;
                }
            }
        }
        .instrument(span)
        .await;
    }

    fn ingest(&self, frame: RtpFrame) {
        self.jitter
            .entry(frame.stream)
            .or_insert_with(JitterBuffer::new)
            .insert(frame);
    }

    /// Drains every stream's jitter buffer (each already RTP-timestamp
    /// sorted via `drain_sorted`), then feeds the mixer in a k-way merge
    /// ordered by each frame's real arrival time (`wall_ts`) across streams.
    ///
    /// Per spec.md §4.5, `mixer.add_frame` runs per packet as frames arrive;
    /// draining one stream's whole segment before the next would anchor a
    /// truly concurrent second stream's first packet against however far the
    /// first stream had already grown the accumulator, turning simultaneous
    /// speech into concatenation instead of a sum. Merging by `wall_ts`
    /// keeps genuinely-concurrent streams' first packets anchoring near the
    /// same global frame while a genuinely later-arriving stream still
    /// anchors later, per §4.3.
    async fn commit(&mut self, ingress: &mut mpsc::Receiver<RtpFrame>, cancel: &CancellationToken) {
        let mut queues: Vec<VecDeque<RtpFrame>> = self
            .jitter
            .iter()
            .map(|entry| entry.value().drain_sorted().into())
            .collect();

        loop {
            let next = queues
                .iter()
                .enumerate()
                .filter_map(|(i, q)| q.front().map(|f| (i, f.wall_ts)))
                .min_by_key(|&(_, wall_ts)| wall_ts);
            let Some((idx, _)) = next else { break };
            let frame = queues[idx].pop_front().expect("idx came from a non-empty queue");
            let stream = frame.stream;

            match self.codec.decode(&frame.payload) {
                Ok(stereo) => {
                    let mono = downmix_48k_stereo_to_48k_mono(&stereo);
                    let Some(pcm) = PcmFrame::from_exact(&mono) else {
                        warn!("decoded frame had unexpected length, skipping");
                        continue;
                    };
                    let (_, energy) = self.energy.detect(pcm.as_slice());
                    self.mixer.record_energy(stream, energy);
                    self.mixer.add_frame(stream, frame.rtp_ts, &pcm);
                }
                Err(e) => {
                    warn!("decode failed for {stream} seq {}: {e}", frame.seq);
                }
            }
        }

        let drained = self.mixer.drain();
        if drained.is_empty() {
            debug!("segment drain was empty, no commit");
            return;
        }

        let mono_24k = decimate_48k_mono_to_24k_mono(&drained);
        let base64_audio = encode_pcm16_base64(&mono_24k);

        if let Err(e) = self.model.send_audio(&base64_audio).await {
            error!("model send_audio failed: {e}");
            return;
        }
        if let Err(e) = self.model.commit_audio().await {
            error!("model commit_audio failed: {e}");
            return;
        }
        if let Err(e) = self.model.request_response().await {
            error!("model request_response failed: {e}");
            return;
        }

        self.drain_response(ingress, cancel).await;
    }

    /// Polls model events and the ingress channel concurrently until the
    /// response completes, forwarding audio deltas to the playback pacer
    /// and new packets into the next segment's jitter buffers.
    async fn drain_response(&mut self, ingress: &mut mpsc::Receiver<RtpFrame>, cancel: &CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                maybe_frame = ingress.recv() => match maybe_frame {
                    None => return,
                    Some(frame) => self.ingest(frame),
                },
                event = self.model.next_event() => match event {
                    None => return,
                    Some(ModelEvent::AudioDelta(bytes)) => {
                        match pcm16_bytes_to_samples(&bytes) {
                            Ok(samples) => {
                                self.pacer.enqueue(PlaybackChunk { pcm_24k_mono: samples });
                            }
                            Err(e) => warn!("malformed audio_delta: {e}"),
                        }
                    }
                    Some(ModelEvent::UserTranscript(text)) => {
                        debug!("user transcript: {text}");
                    }
                    Some(ModelEvent::AssistantTranscript(text)) => {
                        debug!("assistant transcript: {text}");
                    }
                    Some(ModelEvent::ResponseDone(usage)) => {
                        debug!("response done: {usage:?}");
                        return;
                    }
                    Some(ModelEvent::Error(message)) => {
                        warn!("model error, aborting commit: {message}");
                        return;
                    }
                },
            }
        }
    }
}
