//! RMS-based silence/energy detector with an optional adaptive noise floor.
//!
//! Grounded in the teacher's `audio::effects::level_meter::calculate_rms_level`
//! (sum-of-squares RMS) and `audio::effects::noise_gate::NoiseGate` (a
//! `Mutex`-guarded sliding-window gate) — generalized here from a per-sample
//! streaming window to a per-frame `detect()` call, and extended with the
//! adaptive-threshold ring spec.md §4.6 describes, which has no teacher
//! analogue and is new.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const ADAPTIVE_RING_CAPACITY: usize = 1000;
const ADAPTIVE_UPDATE_INTERVAL: Duration = Duration::from_secs(5);
const NOISE_FLOOR_MARGIN: f32 = 2.0;
const MIN_THRESHOLD: f32 = 0.005;
const MAX_THRESHOLD: f32 = 0.1;
const LOW_PASS_ALPHA: f32 = 0.05;

/// Computes RMS energy of a PCM frame, normalized to `[0, 1]`.
pub fn rms_energy(pcm: &[i16]) -> f32 {
    if pcm.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = pcm
        .iter()
        .map(|&s| {
            let v = s as f64 / i16::MAX as f64;
            v * v
        })
        .sum();
    ((sum_sq / pcm.len() as f64).sqrt() as f32).min(1.0)
}

struct AdaptiveState {
    ring: VecDeque<f32>,
    last_speech: Instant,
    last_update: Instant,
}

/// RMS energy gate with an optional adaptive noise floor (spec.md §4.6).
///
/// `detect()` never blocks the caller's control flow — it is advisory: the
/// segmenter's debounce timer is the sole commit trigger (see
/// `segmenter.rs`); this detector only informs it and, when adaptive mode is
/// on, gradually retunes its own threshold.
pub struct EnergyDetector {
    threshold: Mutex<f32>,
    adaptive: bool,
    state: Mutex<AdaptiveState>,
}

impl EnergyDetector {
    pub fn new(threshold: f32, adaptive: bool) -> Self {
        let now = Instant::now();
        Self {
            threshold: Mutex::new(threshold),
            adaptive,
            state: Mutex::new(AdaptiveState {
                ring: VecDeque::with_capacity(ADAPTIVE_RING_CAPACITY),
                last_speech: now,
                last_update: now,
            }),
        }
    }

    pub fn current_threshold(&self) -> f32 {
        *self.threshold.lock().unwrap()
    }

    /// Computes RMS energy and silence verdict for one frame. Feeds the
    /// adaptive-threshold ring and updates the threshold when due.
    pub fn detect(&self, pcm: &[i16]) -> (bool, f32) {
        let energy = rms_energy(pcm);
        let threshold = self.current_threshold();
        let is_silent = energy < threshold;

        if self.adaptive {
            self.record_and_maybe_adapt(energy, is_silent);
        }

        (is_silent, energy)
    }

    fn record_and_maybe_adapt(&self, energy: f32, is_silent: bool) {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();

        if state.ring.len() == ADAPTIVE_RING_CAPACITY {
            state.ring.pop_front();
        }
        state.ring.push_back(energy);

        if !is_silent {
            state.last_speech = now;
        }

        if now.duration_since(state.last_speech) < ADAPTIVE_UPDATE_INTERVAL {
            return;
        }
        if now.duration_since(state.last_update) < ADAPTIVE_UPDATE_INTERVAL {
            return;
        }
        state.last_update = now;

        let mut sorted: Vec<f32> = state.ring.iter().copied().collect();
        if sorted.is_empty() {
            return;
        }
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let bottom_n = (sorted.len() / 10).max(1);
        let noise_floor: f32 = sorted[..bottom_n].iter().sum::<f32>() / bottom_n as f32;

        let new_threshold = (noise_floor * NOISE_FLOOR_MARGIN).clamp(MIN_THRESHOLD, MAX_THRESHOLD);

        let mut threshold = self.threshold.lock().unwrap();
        *threshold = LOW_PASS_ALPHA * new_threshold + (1.0 - LOW_PASS_ALPHA) * *threshold;
    }
}
