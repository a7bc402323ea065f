//! Per-stream jitter buffer: a bounded, seq-keyed reorder buffer.
//!
//! Grounded in the general shape of the teacher's
//! `audio::buffers::jitter_buffer` (per-stream bounded buffer, `tracing`
//! instrumentation, idempotent-by-key writes) but reworked to the simpler
//! "collect then drain sorted" model spec.md §4.2 calls for, rather than the
//! teacher's adaptive-target-latency ring-slot design, which solves a
//! different problem (continuous low-latency playout) than this spec's
//! "reorder then mix as one atomic drain."

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::types::RtpFrame;

/// Hard cap on buffered entries (~10s at 20ms/frame).
pub const MAX_ENTRIES: usize = 500;

/// No entry may outlive this wall-clock age.
pub const MAX_AGE: Duration = Duration::from_secs(10);

struct Inner {
    map: HashMap<u16, RtpFrame>,
    /// Insertion order, used for amortized age/count eviction. Approximates
    /// wall-clock order since `wall_ts` is stamped at arrival time.
    order: VecDeque<u16>,
}

/// Bounded reorder buffer keyed by RTP sequence number for one stream.
///
/// - At most [`MAX_ENTRIES`] entries.
/// - No entry older than [`MAX_AGE`] wall-clock.
/// - Insertion is idempotent by `seq` (duplicates overwrite).
/// - Does not interpolate missing sequences; gaps are left for the mixer to
///   fill with silence.
pub struct JitterBuffer {
    inner: Mutex<Inner>,
}

impl Default for JitterBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl JitterBuffer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    /// Inserts a frame. O(1) amortized; runs age eviction on every call.
    pub fn insert(&self, frame: RtpFrame) {
        let mut inner = self.inner.lock().unwrap();
        let seq = frame.seq;

        if !inner.map.contains_key(&seq) {
            inner.order.push_back(seq);
        }
        inner.map.insert(seq, frame);

        Self::evict_by_age(&mut inner);
        Self::evict_by_count(&mut inner);
    }

    fn evict_by_age(inner: &mut Inner) {
        let now = Instant::now();
        while let Some(&front_seq) = inner.order.front() {
            let Some(f) = inner.map.get(&front_seq) else {
                // Already removed by count eviction or a later duplicate.
                inner.order.pop_front();
                continue;
            };
            if now.duration_since(f.wall_ts) > MAX_AGE {
                inner.order.pop_front();
                inner.map.remove(&front_seq);
                debug!("JitterBuffer: evicted seq {} by age", front_seq);
            } else {
                break;
            }
        }
    }

    fn evict_by_count(inner: &mut Inner) {
        while inner.map.len() > MAX_ENTRIES {
            if let Some(front_seq) = inner.order.pop_front() {
                inner.map.remove(&front_seq);
                debug!("JitterBuffer: evicted seq {} by count", front_seq);
            } else {
                break;
            }
        }
    }

    /// Returns all currently buffered frames sorted by RTP timestamp and
    /// empties the buffer. The caller is responsible for any downstream
    /// stream-state cleanup.
    pub fn drain_sorted(&self) -> Vec<RtpFrame> {
        let mut inner = self.inner.lock().unwrap();
        let mut frames: Vec<RtpFrame> = inner.map.drain().map(|(_, f)| f).collect();
        inner.order.clear();
        frames.sort_by_key(|f| f.rtp_ts);
        frames
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StreamId;

    fn frame(seq: u16, rtp_ts: u32) -> RtpFrame {
        RtpFrame::new(StreamId(1), seq, rtp_ts, vec![0u8; 4])
    }

    #[test]
    fn insert_then_drain_round_trips() {
        let jb = JitterBuffer::new();
        jb.insert(frame(0, 0));
        jb.insert(frame(1, 960));
        let drained = jb.drain_sorted();
        assert_eq!(drained.len(), 2);
        assert!(jb.is_empty());
    }

    #[test]
    fn drain_sorted_orders_by_rtp_timestamp() {
        let jb = JitterBuffer::new();
        jb.insert(frame(2, 1920));
        jb.insert(frame(0, 0));
        jb.insert(frame(4, 3840));
        jb.insert(frame(1, 960));
        jb.insert(frame(3, 2880));

        let drained = jb.drain_sorted();
        let seqs: Vec<u16> = drained.iter().map(|f| f.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn duplicate_seq_overwrites_idempotently() {
        let jb = JitterBuffer::new();
        jb.insert(frame(0, 0));
        jb.insert(frame(0, 0));
        assert_eq!(jb.len(), 1);
    }

    #[test]
    fn rapid_insertion_stabilizes_under_cap() {
        let jb = JitterBuffer::new();
        for seq in 0..1000u32 {
            jb.insert(frame(seq as u16, seq * 960));
        }
        assert!(jb.len() <= MAX_ENTRIES);
    }

    #[test]
    fn sequence_wrap_does_not_trigger_eviction_of_new_frame() {
        let jb = JitterBuffer::new();
        jb.insert(frame(65535, 1_000_000));
        jb.insert(frame(0, 1_000_960));
        assert_eq!(jb.len(), 2);
    }

    #[test]
    fn stale_entries_are_evicted_by_age() {
        let jb = JitterBuffer::new();
        let mut old = frame(0, 0);
        old.wall_ts = Instant::now() - Duration::from_secs(20);
        jb.insert(old);
        // Trigger the age sweep via a fresh insert.
        jb.insert(frame(1, 960));
        assert_eq!(jb.len(), 1);
        let remaining = jb.drain_sorted();
        assert_eq!(remaining[0].seq, 1);
    }
}
