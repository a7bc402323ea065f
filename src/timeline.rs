//! Timeline reconstructor: maps each stream's wrap-aware RTP timestamp onto
//! the shared global frame index the mixer sums on.
//!
//! New relative to the teacher, which has no single shared mix timeline —
//! each host plays out independently. Grounded in the teacher's per-host
//! `HashMap<HostId, _>` bookkeeping pattern (`audio::mixer::AudioMixer::mix_frames`,
//! `party::host`), generalized from "one slot per host" to "one
//! [`StreamState`] per host with wrap-aware RTP arithmetic," and in the
//! per-stream-mutex-guarded concurrent map the teacher builds with `dashmap`
//! elsewhere (`pipeline::graph_node`, `party::stream`).

use std::sync::Mutex;
use std::time::Instant;

use dashmap::DashMap;
use tracing::debug;

use crate::types::{StreamId, FRAME_TICKS};

/// Per-stream anchoring and bookkeeping state.
///
/// `base_rtp` is the RTP timestamp of the first packet ever seen for this
/// stream; `start_frame` is the global mix frame index that `base_rtp` maps
/// to, fixed at stream creation. This anchors late-joining speakers to the
/// present, not to the session start.
#[derive(Debug, Clone)]
pub struct StreamState {
    pub base_rtp: u32,
    pub start_frame: i64,
    pub last_emitted_frame: i64,
    pub last_seq: u16,
    pub last_energy: f32,
    pub last_update: Instant,
}

/// Per-stream timeline state, keyed by [`StreamId`], each entry independently
/// mutex-guarded so concurrent streams don't contend on a single lock (the
/// same shape as the teacher's `dashmap`-based per-host maps).
#[derive(Default)]
pub struct Timeline {
    streams: DashMap<StreamId, Mutex<StreamState>>,
}

impl Timeline {
    pub fn new() -> Self {
        Self {
            streams: DashMap::new(),
        }
    }

    /// Resolves `(stream, rtp_ts)` to a global frame index given the mixer's
    /// current frame-length anchor point. Returns `None` if the packet is
    /// late (its global frame would not advance past the last one emitted
    /// for this stream) and should be dropped.
    ///
    /// On acceptance, advances this stream's `last_emitted_frame`.
    pub fn resolve(&self, stream: StreamId, rtp_ts: u32, current_mix_frames: i64) -> Option<i64> {
        let entry = self.streams.entry(stream).or_insert_with(|| {
            Mutex::new(StreamState {
                base_rtp: rtp_ts,
                start_frame: current_mix_frames,
                last_emitted_frame: current_mix_frames - 1,
                last_seq: 0,
                last_energy: 0.0,
                last_update: Instant::now(),
            })
        });
        let mut state = entry.lock().unwrap();

        // Unsigned wrap subtraction yields the correct frame delta across
        // the 2^32 boundary provided the true gap is < 2^31 ticks (~12h).
        let delta = rtp_ts.wrapping_sub(state.base_rtp);
        let frame_in_stream = (delta / FRAME_TICKS) as i64;
        let global_frame = state.start_frame + frame_in_stream;

        if global_frame <= state.last_emitted_frame {
            debug!(
                "Timeline: dropping late packet for {:?}, global_frame={} <= last_emitted={}",
                stream, global_frame, state.last_emitted_frame
            );
            return None;
        }

        state.last_emitted_frame = global_frame;
        state.last_update = Instant::now();
        Some(global_frame)
    }

    /// Records energy for the stream's most recently accepted frame
    /// (consumed by the silence/energy detector's caller).
    pub fn record_energy(&self, stream: StreamId, energy: f32) {
        if let Some(entry) = self.streams.get(&stream) {
            entry.lock().unwrap().last_energy = energy;
        }
    }

    /// Clears all per-stream state, anchoring the next accepted frame for
    /// any stream to a fresh timeline. Called by the mixer on drain.
    pub fn reset_all(&self) {
        self.streams.clear();
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_packet_anchors_to_current_mix_frames() {
        let tl = Timeline::new();
        let gf = tl.resolve(StreamId(1), 0, 5).unwrap();
        assert_eq!(gf, 5);
    }

    #[test]
    fn subsequent_packets_advance_monotonically() {
        let tl = Timeline::new();
        let s = StreamId(1);
        assert_eq!(tl.resolve(s, 0, 0).unwrap(), 0);
        assert_eq!(tl.resolve(s, 960, 0).unwrap(), 1);
        assert_eq!(tl.resolve(s, 1920, 0).unwrap(), 2);
    }

    #[test]
    fn late_packet_relative_to_last_emitted_is_dropped() {
        let tl = Timeline::new();
        let s = StreamId(1);
        assert_eq!(tl.resolve(s, 1920, 0).unwrap(), 2);
        assert!(tl.resolve(s, 960, 0).is_none());
    }

    #[test]
    fn rtp_timestamp_wrap_lands_in_consecutive_global_frame() {
        let tl = Timeline::new();
        let s = StreamId(1);
        let near_wrap = u32::MAX - 959; // one frame before wrap
        let gf0 = tl.resolve(s, near_wrap, 0).unwrap();
        let gf_wrapped = tl.resolve(s, 0, 0).unwrap();
        assert_eq!(gf_wrapped, gf0 + 1);
    }

    #[test]
    fn late_joiner_anchors_to_present_not_session_start() {
        let tl = Timeline::new();
        // Stream A has been running and the mix has grown to frame 50.
        let a = StreamId(1);
        assert_eq!(tl.resolve(a, 0, 0).unwrap(), 0);

        // Stream B joins late; the mixer reports current_mix_frames=50.
        let b = StreamId(2);
        assert_eq!(tl.resolve(b, 0, 50).unwrap(), 50);
    }

    #[test]
    fn reset_all_clears_state_for_fresh_timeline() {
        let tl = Timeline::new();
        let s = StreamId(1);
        tl.resolve(s, 1920, 0).unwrap();
        assert_eq!(tl.stream_count(), 1);
        tl.reset_all();
        assert_eq!(tl.stream_count(), 0);
        // A fresh accept should anchor from scratch again.
        assert_eq!(tl.resolve(s, 0, 0).unwrap(), 0);
    }
}
