//! Typed error kinds for the core, per the error-handling design.
//!
//! The teacher repo leans on `anyhow` everywhere because nothing in it needs
//! to branch on error kind. Here callers and internal control flow both need
//! to distinguish "log and continue" from "this segment failed" from "tear
//! the session down", so the domain errors are a `thiserror` enum (same
//! pattern as `examples/denizetkar-walkie-talkie-app`'s `thiserror::Error`
//! derives); setup/wiring glue still returns `anyhow::Result` like the
//! teacher's `state::AppState::new` and `party::config`.

use thiserror::Error;

/// Error kinds a running session can produce.
///
/// Only [`CoreError::Fatal`] ever reaches `VoiceCore::start`'s caller; every
/// other kind is logged and absorbed at the boundary it occurred in.
#[derive(Debug, Error)]
pub enum CoreError {
    /// One compressed frame failed to decode. The caller should skip it and
    /// continue; a single bad frame must not tear down a multi-party call.
    #[error("transient decode failure: {0}")]
    TransientDecode(String),

    /// PCM of the wrong length, or a silent audio chunk longer than 5s was
    /// about to be committed.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The playback queue was full; the chunk was dropped.
    #[error("playback buffer saturated, dropping chunk")]
    BufferSaturation,

    /// The egress sink failed; the current playback chunk is aborted but the
    /// session continues.
    #[error("egress failed: {0}")]
    TransportEgress(String),

    /// The model client returned an error or disconnected mid-commit; the
    /// current commit is aborted and the segmenter waits for the next packet.
    #[error("model protocol error: {0}")]
    ModelProtocol(String),

    /// Session-level unrecoverable error (model connect failure,
    /// cancellation propagation failure). Surfaces to the caller, who tears
    /// the session down.
    #[error("fatal session error: {0}")]
    Fatal(String),
}

impl CoreError {
    /// Whether this error kind is recoverable (logged and absorbed) as
    /// opposed to [`CoreError::Fatal`], which must propagate.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CoreError::Fatal(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_fatal_is_unrecoverable() {
        assert!(CoreError::TransientDecode("x".into()).is_recoverable());
        assert!(CoreError::MalformedInput("x".into()).is_recoverable());
        assert!(CoreError::BufferSaturation.is_recoverable());
        assert!(CoreError::TransportEgress("x".into()).is_recoverable());
        assert!(CoreError::ModelProtocol("x".into()).is_recoverable());
        assert!(!CoreError::Fatal("x".into()).is_recoverable());
    }
}
