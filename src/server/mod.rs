//! Streaming server contract used by the playback engine.
//!
//! The engine needs exactly two things from the server: a stream URL for a
//! track, and somewhere to report playback for scrobbling. Everything else
//! the server can do is outside this crate.
//!
//! # Example
//!
//! ```ignore
//! use sonic_engine::server::{MediaServer, subsonic::SubsonicClient};
//!
//! let server: Arc<dyn MediaServer> = Arc::new(SubsonicClient::new(url, user, pass)?);
//! let url = server.stream_url("track-id", None, false)?;
//! ```

pub mod subsonic;

use async_trait::async_trait;

/// Transcoding request attached to a stream URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeSettings {
    /// Target codec, e.g. "opus" or "mp3"
    pub codec: String,
    /// Upper bound in kbps (0 = server default)
    pub max_bit_rate_kbps: u32,
}

/// Server errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServerError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server returned error {code}: {message}")]
    Api { code: i32, message: String },

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),
}

/// Server capabilities the engine consumes.
///
/// Implement this trait to create mock implementations for testing.
#[async_trait]
pub trait MediaServer: Send + Sync {
    /// Resolve the URL the backend should stream from.
    fn stream_url(
        &self,
        track_id: &str,
        transcode: Option<&TranscodeSettings>,
        force_raw: bool,
    ) -> Result<String, ServerError>;

    /// Whether the client decides when a play counts (vs. the server
    /// counting as soon as playback starts).
    fn client_decides_scrobble(&self) -> bool;

    /// Playback of a track started ("now playing").
    async fn track_began_playback(&self, track_id: &str) -> Result<(), ServerError>;

    /// Playback of a track ended. `submission` is true when the client
    /// counted it as a play.
    async fn track_ended_playback(
        &self,
        track_id: &str,
        position_secs: u32,
        submission: bool,
    ) -> Result<(), ServerError>;
}
