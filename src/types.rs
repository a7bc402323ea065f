//! Core data types shared by every component.
//!
//! Mirrors the generic `AudioBuffer<Sample, CHANNELS, SAMPLE_RATE>` shape from
//! the teacher repo's `audio::frame` module, but fixed at the one rate/channel
//! combination every internal component in this crate actually works at:
//! 960 mono i16 samples (20 ms @ 48 kHz).

use std::time::Instant;

use bytes::Bytes;

/// Number of samples in one 20 ms frame at 48 kHz mono.
pub const FRAME_SAMPLES: usize = 960;

/// RTP timestamp ticks per 20 ms frame at 48 kHz.
pub const FRAME_TICKS: u32 = 960;

/// Opaque identifier of an audio source, derived from the transport's
/// synchronization source (SSRC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u32);

impl From<u32> for StreamId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stream:{:08x}", self.0)
    }
}

/// One packet as it arrives from the transport, after the core has stamped
/// it with a monotonic arrival instant.
///
/// Invariant: `rtp_ts` advances by [`FRAME_TICKS`] per 20 ms at 48 kHz;
/// `seq` advances by 1 per packet and wraps mod 2^16.
#[derive(Debug, Clone)]
pub struct RtpFrame {
    pub stream: StreamId,
    pub seq: u16,
    pub rtp_ts: u32,
    pub wall_ts: Instant,
    pub payload: Bytes,
}

impl RtpFrame {
    pub fn new(stream: StreamId, seq: u16, rtp_ts: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            stream,
            seq,
            rtp_ts,
            wall_ts: Instant::now(),
            payload: payload.into(),
        }
    }
}

/// Exactly 960 mono i16 samples at 48 kHz (20 ms). All internal timing is in
/// multiples of this frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmFrame {
    samples: [i16; FRAME_SAMPLES],
}

impl PcmFrame {
    pub fn silence() -> Self {
        Self {
            samples: [0; FRAME_SAMPLES],
        }
    }

    /// Builds a frame from a slice, padding with silence or truncating if the
    /// input isn't exactly [`FRAME_SAMPLES`] long.
    pub fn from_slice_padded(data: &[i16]) -> Self {
        let mut samples = [0i16; FRAME_SAMPLES];
        let n = data.len().min(FRAME_SAMPLES);
        samples[..n].copy_from_slice(&data[..n]);
        Self { samples }
    }

    /// Builds a frame from a slice, returning `None` if the length doesn't
    /// match exactly.
    pub fn from_exact(data: &[i16]) -> Option<Self> {
        if data.len() != FRAME_SAMPLES {
            return None;
        }
        let mut samples = [0i16; FRAME_SAMPLES];
        samples.copy_from_slice(data);
        Some(Self { samples })
    }

    pub fn as_slice(&self) -> &[i16] {
        &self.samples
    }
}

/// An utterance drained atomically from the mixer once silence has persisted
/// for the configured debounce window.
#[derive(Debug, Clone)]
pub struct UtteranceBoundary {
    pub pcm: Vec<i16>,
    pub duration: std::time::Duration,
}

impl UtteranceBoundary {
    pub fn from_samples(pcm: Vec<i16>, sample_rate: u32) -> Self {
        let duration =
            std::time::Duration::from_secs_f64(pcm.len() as f64 / sample_rate as f64);
        Self { pcm, duration }
    }
}

/// Opaque model-produced 24 kHz mono 16-bit PCM chunk of arbitrary length,
/// placed on the playback pacer's bounded queue.
#[derive(Debug, Clone)]
pub struct PlaybackChunk {
    pub pcm_24k_mono: Vec<i16>,
}
