//! Optional debug WAV writing: a pure side-effect, never required for
//! correctness (spec.md §6, "Persistent state").
//!
//! New relative to the teacher's shipped `src` (which keeps `hound` only as
//! a dev-dependency), promoted here to a normal dependency since spec.md
//! requires this as a shipped, optionally-enabled feature rather than a
//! test-only helper. Filename sanitization (basename-only, defeating path
//! injection) uses `regex`, already in the teacher's dependency table; the
//! `Path`/`fs`-based style mirrors `audio::file`'s handling of on-disk audio.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::error::{CoreError, CoreResult};

const DEBUG_AUDIO_DIR: &str = "debug_audio";

fn unsafe_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_.-]").unwrap())
}

/// Strips any path separators and restricts a filename component to
/// `[A-Za-z0-9_.-]`, taking only the final path segment first so embedded
/// `../` can't escape `debug_audio/`.
fn sanitize_component(raw: &str) -> String {
    let basename = Path::new(raw)
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    unsafe_chars().replace_all(&basename, "_").into_owned()
}

/// Writes `pcm` as a mono 16-bit little-endian RIFF/WAVE file under
/// `debug_audio/`, created with `0750` permissions if missing.
///
/// Filename: `{prefix}_{session_id}_{YYYYmmdd_HHMMSS}.wav`. Both `prefix`
/// and `session_id` are sanitized to a safe basename before use.
pub fn write_debug_wav(
    base_dir: &Path,
    prefix: &str,
    session_id: &str,
    sample_rate: u32,
    pcm: &[i16],
) -> CoreResult<PathBuf> {
    let dir = base_dir.join(DEBUG_AUDIO_DIR);
    ensure_dir(&dir)?;

    let safe_prefix = sanitize_component(prefix);
    let safe_session = sanitize_component(session_id);
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let filename = format!("{safe_prefix}_{safe_session}_{timestamp}.wav");
    let path = dir.join(filename);

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec)
        .map_err(|e| CoreError::Fatal(format!("failed to create debug WAV {path:?}: {e}")))?;
    for &sample in pcm {
        writer
            .write_sample(sample)
            .map_err(|e| CoreError::Fatal(format!("failed to write debug WAV sample: {e}")))?;
    }
    writer
        .finalize()
        .map_err(|e| CoreError::Fatal(format!("failed to finalize debug WAV {path:?}: {e}")))?;

    info!("wrote debug audio to {path:?}");
    Ok(path)
}

#[cfg(unix)]
fn ensure_dir(dir: &Path) -> CoreResult<()> {
    use std::os::unix::fs::PermissionsExt;

    if !dir.exists() {
        fs::create_dir_all(dir)
            .map_err(|e| CoreError::Fatal(format!("failed to create {dir:?}: {e}")))?;
        if let Err(e) = fs::set_permissions(dir, fs::Permissions::from_mode(0o750)) {
            warn!("failed to set 0750 on {dir:?}: {e}");
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn ensure_dir(dir: &Path) -> CoreResult<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .map_err(|e| CoreError::Fatal(format!("failed to create {dir:?}: {e}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_path_traversal() {
        assert_eq!(sanitize_component("../../etc/passwd"), "passwd");
    }

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize_component("sess/ion id!"), "ion_id_");
    }

    #[test]
    fn write_debug_wav_creates_file_under_debug_audio_dir() {
        let tmp = std::env::temp_dir().join(format!("voicecore_test_{}", std::process::id()));
        let pcm = vec![0i16; 480];
        let path = write_debug_wav(&tmp, "utterance", "sess-1", 24_000, &pcm).unwrap();
        assert!(path.exists());
        assert!(path.starts_with(tmp.join(DEBUG_AUDIO_DIR)));
        let _ = fs::remove_dir_all(&tmp);
    }

    #[test]
    fn write_debug_wav_rejects_traversal_in_session_id() {
        let tmp = std::env::temp_dir().join(format!("voicecore_test2_{}", std::process::id()));
        let pcm = vec![0i16; 10];
        let path = write_debug_wav(&tmp, "utt", "../../evil", 24_000, &pcm).unwrap();
        assert!(path.starts_with(tmp.join(DEBUG_AUDIO_DIR)));
        let _ = fs::remove_dir_all(&tmp);
    }
}
