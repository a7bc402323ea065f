//! Codec unit: decode/encode compressed transport frames, resample between
//! the 48 kHz stereo wire format and the 24 kHz mono model-boundary format.
//!
//! Grounded in the teacher's `audio::opus` module (`Encoder`/`Decoder` behind
//! a `Mutex`, `Application::LowDelay`, inband FEC, configurable bitrate) and
//! `audio::file`'s resampling role — but resampling here is hand-rolled per
//! spec (two-tap box-filter decimation / linear interpolation) rather than
//! reaching for `rubato`'s FFT resampler, which the teacher uses only for
//! offline file playback, a feature this crate drops.

use std::sync::Mutex;

use opus::{Application, Bitrate, Channels, Decoder, Encoder};
use tracing::warn;

use crate::config::AudioQuality;
use crate::error::{CoreError, CoreResult};

/// One 20 ms frame of 48 kHz stereo PCM: 1920 interleaved i16 samples.
pub const STEREO_48K_FRAME_SAMPLES: usize = 1920;

const OPUS_EXPECTED_PACKET_LOSS: i32 = 20;
const MAX_OPUS_PACKET_SIZE: usize = 4000;

/// Decodes compressed transport frames to PCM and encodes PCM back to
/// compressed frames, with resampling at the 24 kHz model boundary.
///
/// A trait so tests can swap in an identity codec (see `testutil`) without
/// linking libopus, the same capability-polymorphism idiom the teacher uses
/// for `pipeline::Node` implementations (production wires concrete codecs,
/// tests wire fakes).
pub trait CodecUnit: Send + Sync {
    /// Decodes one compressed frame into 48 kHz stereo PCM (1920 samples).
    /// Fails on empty/malformed input.
    fn decode(&self, compressed: &[u8]) -> CoreResult<Vec<i16>>;

    /// Encodes one 20 ms frame of 48 kHz stereo PCM into a compressed frame.
    /// Input is padded with silence or truncated to exactly 1920 samples.
    fn encode(&self, stereo_48k_20ms: &[i16]) -> CoreResult<Vec<u8>>;
}

pub struct OpusCodec {
    encoder: Mutex<Encoder>,
    decoder: Mutex<Decoder>,
}

impl OpusCodec {
    pub fn new(quality: AudioQuality) -> CoreResult<Self> {
        let mut encoder = Encoder::new(48_000, Channels::Stereo, Application::LowDelay)
            .map_err(|e| CoreError::Fatal(format!("failed to create Opus encoder: {e}")))?;
        encoder
            .set_bitrate(Bitrate::Bits(quality.bitrate_bps()))
            .map_err(|e| CoreError::Fatal(format!("failed to set Opus bitrate: {e}")))?;
        encoder
            .set_inband_fec(true)
            .map_err(|e| CoreError::Fatal(format!("failed to enable Opus FEC: {e}")))?;
        encoder
            .set_packet_loss_perc(OPUS_EXPECTED_PACKET_LOSS)
            .map_err(|e| CoreError::Fatal(format!("failed to set Opus loss percent: {e}")))?;

        let decoder = Decoder::new(48_000, Channels::Stereo)
            .map_err(|e| CoreError::Fatal(format!("failed to create Opus decoder: {e}")))?;

        Ok(Self {
            encoder: Mutex::new(encoder),
            decoder: Mutex::new(decoder),
        })
    }
}

impl CodecUnit for OpusCodec {
    fn decode(&self, compressed: &[u8]) -> CoreResult<Vec<i16>> {
        if compressed.is_empty() {
            return Err(CoreError::MalformedInput("empty compressed frame".into()));
        }
        let mut decoder = self.decoder.lock().unwrap();
        let mut out = vec![0i16; STEREO_48K_FRAME_SAMPLES];
        let samples_per_channel = decoder.decode(compressed, &mut out, false).map_err(|e| {
            warn!("opus decode failed: {e}");
            CoreError::TransientDecode(e.to_string())
        })?;
        let total = samples_per_channel * 2;
        if total != STEREO_48K_FRAME_SAMPLES {
            return Err(CoreError::TransientDecode(format!(
                "decoded {total} samples, expected {STEREO_48K_FRAME_SAMPLES}"
            )));
        }
        Ok(out)
    }

    fn encode(&self, stereo_48k_20ms: &[i16]) -> CoreResult<Vec<u8>> {
        let mut padded;
        let input: &[i16] = if stereo_48k_20ms.len() == STEREO_48K_FRAME_SAMPLES {
            stereo_48k_20ms
        } else {
            padded = vec![0i16; STEREO_48K_FRAME_SAMPLES];
            let n = stereo_48k_20ms.len().min(STEREO_48K_FRAME_SAMPLES);
            padded[..n].copy_from_slice(&stereo_48k_20ms[..n]);
            &padded
        };

        let mut encoder = self.encoder.lock().unwrap();
        let mut out = vec![0u8; MAX_OPUS_PACKET_SIZE];
        let len = encoder
            .encode(input, &mut out)
            .map_err(|e| CoreError::Fatal(format!("opus encode failed: {e}")))?;
        out.truncate(len);
        Ok(out)
    }
}

/// Averages L/R channels to mono at the same sample rate (no decimation).
/// The step between codec-decoded 48 kHz stereo and the mixer's 48 kHz mono
/// timeline.
pub fn downmix_48k_stereo_to_48k_mono(stereo: &[i16]) -> Vec<i16> {
    stereo
        .chunks_exact(2)
        .map(|ch| (((ch[0] as i32) + (ch[1] as i32)) / 2) as i16)
        .collect()
}

/// 2:1 decimation with a two-tap box filter as anti-alias (adequate for
/// speech, not music). The step between the mixer's 48 kHz mono output and
/// the model boundary's 24 kHz mono input.
pub fn decimate_48k_mono_to_24k_mono(mono: &[i16]) -> Vec<i16> {
    let out_len = mono.len() / 2;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let a = mono[2 * i] as f32;
        let b = mono[2 * i + 1] as f32;
        let avg = (a + b) / 2.0;
        out.push(avg.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16);
    }
    out
}

/// Averages L/R channels to mono, then 2:1 decimates with a two-tap box
/// filter as anti-alias (adequate for speech, not music).
pub fn resample_48k_stereo_to_24k_mono(stereo: &[i16]) -> Vec<i16> {
    decimate_48k_mono_to_24k_mono(&downmix_48k_stereo_to_48k_mono(stereo))
}

/// 1:2 linear interpolation and channel duplication.
pub fn resample_24k_mono_to_48k_stereo(mono: &[i16]) -> Vec<i16> {
    if mono.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(mono.len() * 4);
    for i in 0..mono.len() {
        let a = mono[i] as f32;
        let b = *mono.get(i + 1).unwrap_or(&mono[i]) as f32;
        let mid = ((a + b) / 2.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        let a16 = a as i16;
        out.push(a16);
        out.push(a16);
        out.push(mid);
        out.push(mid);
    }
    out
}
