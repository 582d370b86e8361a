//! Application-wide error types.
//!
//! Library modules use specific error types via `thiserror`. The CLI adds
//! context through [`ResultExt`] and hands the result to `anyhow`.
//!
//! # Design
//!
//! - [`Error`]: Top-level application error enum
//! - Module-specific errors (e.g., [`EngineError`], [`ServerError`]) for
//!   detailed handling
//! - All errors implement `std::error::Error` for compatibility
//!
//! # Example
//!
//! ```ignore
//! use sonic_engine::error::{Error, ResultExt};
//!
//! fn resume(engine: &mut PlaybackEngine, path: &Path) -> sonic_engine::error::Result<()> {
//!     let saved = SavedPlayQueue::load(path)?;   // Saved queue errors auto-convert
//!     engine.play_track_at(0).with_context("resuming saved queue")?;
//!     Ok(())
//! }
//! ```

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::player::PlayerError;
use crate::player::engine::EngineError;
use crate::saved_queue::SavedQueueError;
use crate::server::ServerError;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
///
/// Aggregates errors from all subsystems for unified handling.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Playback engine rejected an operation
    #[error("Playback error: {0}")]
    Engine(#[from] EngineError),

    /// Audio backend failure
    #[error("Player error: {0}")]
    Player(#[from] PlayerError),

    /// Media server request failed
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    /// Audio cache failure
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Saved play queue could not be read or written
    #[error("Saved queue error: {0}")]
    SavedQueue(#[from] SavedQueueError),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Add context to an error.
    pub fn context(self, ctx: impl Into<String>) -> Self {
        Self::WithContext {
            context: ctx.into(),
            source: Box::new(self),
        }
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn with_context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn with_context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().context(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_display() {
        let err: Error = EngineError::IndexOutOfRange { index: 5, len: 3 }.into();
        assert_eq!(
            err.to_string(),
            "Playback error: track index (5) out of range (0-3)"
        );
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::from(PlayerError::Backend("device lost".into())).context("while starting track");
        let msg = err.to_string();
        assert!(msg.contains("while starting track"));
        assert!(msg.contains("device lost"));
    }

    #[test]
    fn test_server_error_converts() {
        let err: Error = ServerError::Network("connection refused".into()).into();
        assert!(matches!(err, Error::Server(_)));
    }

    #[test]
    fn test_result_ext() {
        let result: std::result::Result<(), PlayerError> = Err(PlayerError::ChannelClosed);
        let with_ctx = result.with_context("additional context");
        let msg = with_ctx.unwrap_err().to_string();
        assert!(msg.starts_with("additional context: "));
    }

    #[test]
    fn test_result_ext_nests() {
        let result: Result<()> = Err(PlayerError::ChannelClosed.into());
        let err = result
            .with_context("middle")
            .with_context("outer")
            .unwrap_err();
        assert!(err.to_string().starts_with("outer: middle: "));
    }
}
