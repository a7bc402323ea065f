//! Playback pacer: splits model response PCM into fixed-cadence 20 ms
//! frames and emits them on a precise monotonic schedule, correcting drift.
//!
//! Grounded in the teacher's `audio::mixer::AudioMixer`'s `rtrb::Producer`
//! bounded-queue-with-drop-on-full pattern (the teacher drops a mixed frame
//! with `warn!` when its playback ring is full — the same policy spec.md
//! §4.7 calls for) and `party::packet_dispatcher`'s dedicated cooperative
//! task shape. The per-frame drift correction loop (resync `t0` once drift
//! exceeds 5 ms) has no teacher analogue and is new, built against
//! `tokio::time::Instant`/`sleep_until` per spec.md §4.7's six-step
//! algorithm.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rtrb::{Consumer, Producer, RingBuffer};
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::codec::{resample_24k_mono_to_48k_stereo, CodecUnit};
use crate::transport::EgressSink;
use crate::types::PlaybackChunk;

/// Bounded queue capacity, per spec.md §4.7.
pub const QUEUE_CAPACITY: usize = 100;

/// 20 ms of 24 kHz mono PCM16 is 480 samples (960 *bytes*, per spec.md's
/// `frame_bytes = 960` — a byte count, not a sample count).
const PACER_FRAME_SAMPLES: usize = 480;
const FRAME_DURATION: Duration = Duration::from_millis(20);
const DRIFT_LOG_THRESHOLD: Duration = Duration::from_millis(5);

/// The enqueue-side handle. Cheaply cloned/shared via `Arc`; `enqueue` never
/// blocks the caller.
pub struct PlaybackPacer {
    producer: Mutex<Producer<PlaybackChunk>>,
    notify: Arc<Notify>,
    started: AtomicBool,
}

impl PlaybackPacer {
    /// Builds the pacer's enqueue handle and the consumer side the playback
    /// task will own. Kept as two values (rather than one struct) so the
    /// facade can store the handle in the session while handing the
    /// consumer into a spawned task with no back-reference to the session,
    /// per spec.md §9's cyclic-reference resolution.
    pub fn new() -> (Arc<Self>, Consumer<PlaybackChunk>) {
        let (producer, consumer) = RingBuffer::new(QUEUE_CAPACITY);
        let pacer = Self {
            producer: Mutex::new(producer),
            notify: Arc::new(Notify::new()),
            started: AtomicBool::new(false),
        };
        (Arc::new(pacer), consumer)
    }

    /// Non-blocking enqueue. Drops the chunk with a warning if the queue is
    /// at capacity.
    pub fn enqueue(&self, chunk: PlaybackChunk) {
        let pushed = {
            let mut producer = self.producer.lock().unwrap();
            producer.push(chunk).is_ok()
        };
        if pushed {
            self.notify.notify_one();
        } else {
            warn!("playback queue full (capacity {QUEUE_CAPACITY}), dropping chunk");
        }
    }

    /// Returns `true` the first time it's called (claiming the right to
    /// spawn the playback task); `false` on every subsequent call. Guards
    /// against double-starting the pacer for one session.
    pub fn claim_start(&self) -> bool {
        !self.started.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn notify_handle(&self) -> Arc<Notify> {
        self.notify.clone()
    }
}

/// The dedicated cooperative task body: consumes chunks sequentially, paces
/// each to 20 ms frames, and hands compressed frames to the egress sink.
/// Runs until the queue is dropped or `cancel` fires.
pub async fn run_playback_task<E: EgressSink>(
    pacer: Arc<PlaybackPacer>,
    mut consumer: Consumer<PlaybackChunk>,
    codec: Arc<dyn CodecUnit>,
    mut egress: E,
    cancel: CancellationToken,
) {
    let notify = pacer.notify_handle();
    loop {
        let chunk = match consumer.pop() {
            Ok(chunk) => chunk,
            Err(_) => {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = notify.notified() => continue,
                }
            }
        };
        if pace_and_emit(&chunk.pcm_24k_mono, &codec, &mut egress, &cancel)
            .await
            .is_break()
        {
            return;
        }
    }
}

enum ControlFlow {
    Continue,
    Break,
}

impl ControlFlow {
    fn is_break(&self) -> bool {
        matches!(self, ControlFlow::Break)
    }
}

async fn pace_and_emit<E: EgressSink>(
    pcm_24k_mono: &[i16],
    codec: &Arc<dyn CodecUnit>,
    egress: &mut E,
    cancel: &CancellationToken,
) -> ControlFlow {
    let frame_count = pcm_24k_mono.len().div_ceil(PACER_FRAME_SAMPLES).max(1);
    let mut t0 = Instant::now();

    for i in 0..frame_count {
        let expected = t0 + FRAME_DURATION * i as u32;
        let now = Instant::now();

        if now < expected {
            tokio::select! {
                _ = cancel.cancelled() => return ControlFlow::Break,
                _ = sleep_until(expected) => {}
            }
        } else {
            let drift = now - expected;
            if drift > DRIFT_LOG_THRESHOLD {
                warn!("playback drift {drift:?} at frame {i}, resynchronizing");
                t0 += drift;
            }
        }

        let start = i * PACER_FRAME_SAMPLES;
        let end = (start + PACER_FRAME_SAMPLES).min(pcm_24k_mono.len());
        let mut frame = vec![0i16; PACER_FRAME_SAMPLES];
        if start < pcm_24k_mono.len() {
            frame[..end - start].copy_from_slice(&pcm_24k_mono[start..end]);
        }

        let stereo_48k = resample_24k_mono_to_48k_stereo(&frame);
        let compressed = match codec.encode(&stereo_48k) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("pacer encode failed at frame {i}: {e}");
                continue;
            }
        };

        if let Err(e) = egress.send_frame(&compressed).await {
            warn!("egress send failed at frame {i}, aborting chunk: {e}");
            return ControlFlow::Continue;
        }
        debug!("pacer emitted frame {i}/{frame_count}");
    }
    ControlFlow::Continue
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{IdentityCodec, RecordingEgress};
    use std::sync::Arc as StdArc;

    #[tokio::test]
    async fn enqueue_then_drain_delivers_ten_frames_at_20ms_cadence() {
        let (pacer, consumer) = PlaybackPacer::new();
        let codec: Arc<dyn CodecUnit> = StdArc::new(IdentityCodec);
        let egress = RecordingEgress::default();
        let observed = egress.clone();
        let cancel = CancellationToken::new();

        let pcm: Vec<i16> = vec![100i16; PACER_FRAME_SAMPLES * 10];
        pacer.enqueue(PlaybackChunk { pcm_24k_mono: pcm });

        let cancel2 = cancel.clone();
        let task = tokio::spawn(run_playback_task(pacer.clone(), consumer, codec, egress, cancel2));
        tokio::time::sleep(Duration::from_millis(250)).await;
        cancel.cancel();
        let _ = task.await;

        let frames = observed.frames.lock().unwrap();
        assert_eq!(frames.len(), 10);
        for window in frames.windows(2) {
            let gap = window[1].0.duration_since(window[0].0);
            assert!(
                gap.as_millis() as i64 - 20 < 2 && gap.as_millis() as i64 - 20 > -2,
                "gap was {gap:?}"
            );
        }
    }

    #[test]
    fn second_claim_start_returns_false() {
        let (pacer, _consumer) = PlaybackPacer::new();
        assert!(pacer.claim_start());
        assert!(!pacer.claim_start());
    }

    #[test]
    fn enqueue_past_capacity_drops_without_blocking() {
        let (pacer, _consumer) = PlaybackPacer::new();
        for _ in 0..(QUEUE_CAPACITY + 10) {
            pacer.enqueue(PlaybackChunk { pcm_24k_mono: vec![0i16; 10] });
        }
        // No panic/deadlock: enqueue always returns immediately.
    }
}
