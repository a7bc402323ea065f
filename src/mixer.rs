//! Multi-stream timeline-aligned mixer: RTP-clock aligned PCM summing with
//! saturation deferred to drain.
//!
//! Grounded in the teacher's `audio::mixer::AudioMixer` (`i32` accumulator,
//! growth to fit incoming frames) and `pipeline::node::mixer::MixerNode`'s
//! per-host volume lookup, but saturation happens only at `drain()`/`peek()`
//! (a hard `i16` saturating cast) rather than the teacher's per-sample
//! `tanh`-based soft clip — spec.md §4.4 calls for summing in `i32` and
//! saturating once at the boundary so the mix stays associative/commutative
//! regardless of packet arrival order.

use std::sync::Mutex;

use tracing::trace;

use crate::timeline::Timeline;
use crate::types::{PcmFrame, StreamId, FRAME_SAMPLES};

struct Accumulator {
    samples: Vec<i32>,
}

impl Accumulator {
    fn new() -> Self {
        Self { samples: Vec::new() }
    }

    fn grow_to(&mut self, frames: i64) {
        let needed = (frames.max(0) as usize) * FRAME_SAMPLES;
        if needed > self.samples.len() {
            self.samples.resize(needed, 0);
        }
    }
}

/// Accumulates 20 ms PCM frames from every active stream into a shared
/// timeline, draining to saturated i16 PCM.
///
/// After `drain`, `len() == 0` and no per-stream timeline state remains.
/// Between drains, the accumulator length is always a multiple of
/// [`FRAME_SAMPLES`].
pub struct Mixer {
    accumulator: Mutex<Accumulator>,
    timeline: Timeline,
}

impl Default for Mixer {
    fn default() -> Self {
        Self::new()
    }
}

impl Mixer {
    pub fn new() -> Self {
        Self {
            accumulator: Mutex::new(Accumulator::new()),
            timeline: Timeline::new(),
        }
    }

    /// Current accumulator length in samples.
    pub fn len(&self) -> usize {
        self.accumulator.lock().unwrap().samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Adds one stream's 20 ms frame to the shared timeline. `pcm`'s length
    /// is guaranteed exactly [`FRAME_SAMPLES`] by [`PcmFrame`]'s type, so
    /// this resolves the frame's global position via the timeline, grows the
    /// accumulator to fit, and sums as `i32` — late packets are silently
    /// dropped by the timeline, the only other outcome.
    pub fn add_frame(&self, stream: StreamId, rtp_ts: u32, pcm: &PcmFrame) {
        let mut acc = self.accumulator.lock().unwrap();
        let current_frames = (acc.samples.len() / FRAME_SAMPLES) as i64;

        let Some(global_frame) = self.timeline.resolve(stream, rtp_ts, current_frames) else {
            return; // late packet, dropped
        };

        acc.grow_to(global_frame + 1);

        let offset = (global_frame as usize) * FRAME_SAMPLES;
        for (i, &s) in pcm.as_slice().iter().enumerate() {
            acc.samples[offset + i] += s as i32;
        }

        debug_assert_eq!(acc.samples.len() % FRAME_SAMPLES, 0);
        trace!(
            "Mixer: added frame for {:?} at global_frame={}",
            stream, global_frame
        );
    }

    /// Records energy for a stream (advisory; consumed by the silence
    /// detector's adaptive threshold, never drives a commit itself).
    pub fn record_energy(&self, stream: StreamId, energy: f32) {
        self.timeline.record_energy(stream, energy);
    }

    /// Converts the accumulator to saturated i16 PCM without mutating state.
    pub fn peek(&self) -> Vec<i16> {
        let acc = self.accumulator.lock().unwrap();
        acc.samples.iter().map(|&s| saturate(s)).collect()
    }

    /// Atomically: saturates the accumulator to i16, resets it to empty, and
    /// resets all per-stream timing so subsequent frames anchor to a fresh
    /// timeline.
    pub fn drain(&self) -> Vec<i16> {
        let mut acc = self.accumulator.lock().unwrap();
        let out: Vec<i16> = acc.samples.iter().map(|&s| saturate(s)).collect();
        acc.samples.clear();
        self.timeline.reset_all();
        out
    }
}

fn saturate(sample: i32) -> i16 {
    sample.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_of(value: i16) -> PcmFrame {
        PcmFrame::from_exact(&[value; FRAME_SAMPLES]).unwrap()
    }

    #[test]
    fn zero_duration_mix_returns_empty() {
        let mixer = Mixer::new();
        assert!(mixer.drain().is_empty());
    }

    #[test]
    fn single_stream_produces_its_own_frame_back() {
        let mixer = Mixer::new();
        mixer.add_frame(StreamId(1), 0, &frame_of(1000));
        let out = mixer.drain();
        assert_eq!(out.len(), FRAME_SAMPLES);
        assert!(out.iter().all(|&s| s == 1000));
    }

    #[test]
    fn two_overlapping_streams_sum_and_saturate() {
        let mixer = Mixer::new();
        mixer.add_frame(StreamId(1), 0, &frame_of(20000));
        mixer.add_frame(StreamId(2), 0, &frame_of(20000));
        let out = mixer.drain();
        assert!(out.iter().all(|&s| s == i16::MAX));
    }

    #[test]
    fn clipping_guard_never_exceeds_i16_range() {
        let mixer = Mixer::new();
        mixer.add_frame(StreamId(1), 0, &frame_of(i16::MAX));
        mixer.add_frame(StreamId(2), 0, &frame_of(i16::MAX));
        let out = mixer.drain();
        assert!(out.iter().all(|&s| s <= i16::MAX && s >= i16::MIN));
    }

    #[test]
    fn drain_resets_len_and_stream_state() {
        let mixer = Mixer::new();
        mixer.add_frame(StreamId(1), 0, &frame_of(500));
        assert!(mixer.len() > 0);
        mixer.drain();
        assert_eq!(mixer.len(), 0);
        assert_eq!(mixer.timeline.stream_count(), 0);
    }

    #[test]
    fn peek_is_idempotent() {
        let mixer = Mixer::new();
        mixer.add_frame(StreamId(1), 0, &frame_of(777));
        assert_eq!(mixer.peek(), mixer.peek());
    }

    #[test]
    fn add_after_drain_then_add_same_matches_single_cycle() {
        let mixer_a = Mixer::new();
        mixer_a.add_frame(StreamId(1), 0, &frame_of(42));
        let first = mixer_a.drain();
        mixer_a.add_frame(StreamId(1), 0, &frame_of(42));
        let second = mixer_a.drain();
        assert_eq!(first, second);
    }

    #[test]
    fn packet_loss_fills_silence_at_missing_frame_positions() {
        let mixer = Mixer::new();
        // seq 0,2,3 present; seq 1 missing entirely (mixer never sees it).
        mixer.add_frame(StreamId(1), 0, &frame_of(100));
        mixer.add_frame(StreamId(1), 1920, &frame_of(100));
        mixer.add_frame(StreamId(1), 2880, &frame_of(100));
        let out = mixer.drain();
        assert_eq!(out.len(), FRAME_SAMPLES * 4);
        let gap = &out[FRAME_SAMPLES..FRAME_SAMPLES * 2];
        assert!(gap.iter().all(|&s| s == 0));
    }

    #[test]
    fn late_joiner_tail_aligns_to_arrival() {
        let mixer = Mixer::new();
        mixer.add_frame(StreamId(1), 0, &frame_of(10));
        mixer.add_frame(StreamId(1), 960, &frame_of(10));
        // B joins when the mix has already grown to 2 frames; B's first
        // frame anchors at the current end, not at frame 0.
        mixer.add_frame(StreamId(2), 0, &frame_of(20));
        let out = mixer.drain();
        assert_eq!(out.len(), FRAME_SAMPLES * 3);
        let b_tail = &out[FRAME_SAMPLES * 2..];
        assert!(b_tail.iter().all(|&s| s == 20));
    }

    #[test]
    fn accumulator_length_always_multiple_of_frame_samples() {
        let mixer = Mixer::new();
        mixer.add_frame(StreamId(1), 0, &frame_of(1));
        mixer.add_frame(StreamId(1), 4800, &frame_of(1));
        assert_eq!(mixer.len() % FRAME_SAMPLES, 0);
    }
}
