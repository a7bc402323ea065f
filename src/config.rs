//! Core configuration, per the enumerated config table.
//!
//! Config *loading* (files, env, CLI) is out of scope here — the same way
//! `party::config::PartyConfig` in the teacher repo is a plain struct that
//! something else populates. `serde` is carried (as it is in the teacher's
//! `Cargo.toml`) so the embedding application can deserialize this from
//! whatever source it loads from.

use serde::{Deserialize, Serialize};

fn default_silence_threshold() -> f32 {
    0.01
}

fn default_silence_duration_ms() -> u64 {
    1500
}

fn default_inactivity_timeout_s() -> u64 {
    300
}

fn default_max_session_length_min() -> u64 {
    120
}

fn default_adaptive_threshold() -> bool {
    false
}

fn default_model_id() -> String {
    "default".to_string()
}

fn default_voice() -> String {
    "alloy".to_string()
}

/// Selects Opus bitrate/complexity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioQuality {
    Low,
    Medium,
    High,
}

impl Default for AudioQuality {
    fn default() -> Self {
        AudioQuality::Medium
    }
}

impl AudioQuality {
    /// Opus bitrate in bits/second for this quality tier.
    pub fn bitrate_bps(self) -> i32 {
        match self {
            AudioQuality::Low => 16_000,
            AudioQuality::Medium => 32_000,
            AudioQuality::High => 64_000,
        }
    }
}

/// Selects server- vs client-side voice activity detection, passed through
/// to the model client's `configure` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VadMode {
    Server,
    Client,
}

impl Default for VadMode {
    fn default() -> Self {
        VadMode::Server
    }
}

/// Core configuration. Mirrors spec.md §6's enumerated table.
///
/// `inactivity_timeout_s` and `max_session_length_min` are external-only
/// concerns (session lifecycle, out of scope here) but are kept on this
/// struct so it round-trips whatever full config the embedding application
/// loads; no core component reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default = "default_silence_threshold")]
    pub silence_threshold: f32,

    #[serde(default = "default_silence_duration_ms")]
    pub silence_duration_ms: u64,

    #[serde(default = "default_inactivity_timeout_s")]
    pub inactivity_timeout_s: u64,

    #[serde(default = "default_max_session_length_min")]
    pub max_session_length_min: u64,

    #[serde(default)]
    pub audio_quality: AudioQuality,

    #[serde(default = "default_adaptive_threshold")]
    pub adaptive_threshold: bool,

    #[serde(default)]
    pub vad_mode: VadMode,

    /// Passed to `ModelClient::connect` at session startup.
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Passed to `ModelClient::configure` at session startup.
    #[serde(default = "default_voice")]
    pub voice: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            silence_threshold: default_silence_threshold(),
            silence_duration_ms: default_silence_duration_ms(),
            inactivity_timeout_s: default_inactivity_timeout_s(),
            max_session_length_min: default_max_session_length_min(),
            audio_quality: AudioQuality::default(),
            adaptive_threshold: default_adaptive_threshold(),
            vad_mode: VadMode::default(),
            model_id: default_model_id(),
            voice: default_voice(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.silence_threshold, 0.01);
        assert_eq!(cfg.silence_duration_ms, 1500);
        assert!(!cfg.adaptive_threshold);
    }

    #[test]
    fn deserializes_partial_json_with_defaults() {
        let cfg: CoreConfig = serde_json::from_str(r#"{"silence_threshold": 0.02}"#).unwrap();
        assert_eq!(cfg.silence_threshold, 0.02);
        assert_eq!(cfg.silence_duration_ms, 1500);
    }

    #[test]
    fn quality_bitrates_increase_with_tier() {
        assert!(AudioQuality::Low.bitrate_bps() < AudioQuality::Medium.bitrate_bps());
        assert!(AudioQuality::Medium.bitrate_bps() < AudioQuality::High.bitrate_bps());
    }
}
