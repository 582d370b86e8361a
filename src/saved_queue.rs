//! Saved play queue.
//!
//! The queue is stored as track IDs plus the playing position so it can be
//! restored against the same server on the next start. Radio stations are
//! not saved.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::MediaItem;
use crate::player::engine::PlaybackEngine;

/// On-disk form of the play queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedPlayQueue {
    #[serde(rename = "serverID")]
    pub server_id: String,
    #[serde(rename = "trackIDs")]
    pub track_ids: Vec<String>,
    /// Index into `track_ids`, or -1 when nothing was playing
    #[serde(rename = "trackIndex")]
    pub track_index: i64,
    #[serde(rename = "timePos")]
    pub time_pos: f64,
}

impl SavedPlayQueue {
    /// Snapshot the engine's queue in play order.
    pub fn capture(server_id: impl Into<String>, engine: &PlaybackEngine) -> Self {
        let playing = engine.now_playing_index();
        let mut track_ids = Vec::with_capacity(engine.play_queue_len());
        let mut track_index = -1;

        for (i, item) in engine.play_queue().iter().enumerate() {
            match item {
                MediaItem::Track(track) => {
                    if playing == Some(i) {
                        track_index = track_ids.len() as i64;
                    }
                    track_ids.push(track.id.clone());
                }
                MediaItem::Radio(_) => {}
            }
        }

        let time_pos = if track_index >= 0 {
            engine.playback_status().time_pos
        } else {
            0.0
        };

        Self {
            server_id: server_id.into(),
            track_ids,
            track_index,
            time_pos,
        }
    }

    /// The playing position, if any.
    pub fn playing_index(&self) -> Option<usize> {
        usize::try_from(self.track_index).ok()
    }

    pub fn is_empty(&self) -> bool {
        self.track_ids.is_empty()
    }

    /// Write to `path`, replacing any previous file.
    pub fn save(&self, path: &Path) -> Result<(), SavedQueueError> {
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir).map_err(|e| SavedQueueError::Io(dir.to_path_buf(), e))?;
        }

        let contents = serde_json::to_vec(self).map_err(SavedQueueError::Serialize)?;
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, contents).map_err(|e| SavedQueueError::Io(temp_path.clone(), e))?;
        std::fs::rename(&temp_path, path).map_err(|e| SavedQueueError::Io(path.to_path_buf(), e))?;

        tracing::debug!(path = %path.display(), tracks = self.track_ids.len(), "Saved play queue");
        Ok(())
    }

    /// Read and validate a saved queue.
    pub fn load(path: &Path) -> Result<Self, SavedQueueError> {
        let contents =
            std::fs::read(path).map_err(|e| SavedQueueError::Io(path.to_path_buf(), e))?;
        let saved: Self = serde_json::from_slice(&contents)
            .map_err(|e| SavedQueueError::Parse(path.to_path_buf(), e))?;
        saved.validate()?;
        Ok(saved)
    }

    /// Load a queue only if it was saved against `server_id`.
    pub fn load_for_server(path: &Path, server_id: &str) -> Result<Self, SavedQueueError> {
        let saved = Self::load(path)?;
        if saved.server_id != server_id {
            return Err(SavedQueueError::DifferentServer {
                saved: saved.server_id,
                current: server_id.to_string(),
            });
        }
        Ok(saved)
    }

    fn validate(&self) -> Result<(), SavedQueueError> {
        let len = self.track_ids.len() as i64;
        if self.track_index < -1 || self.track_index >= len {
            return Err(SavedQueueError::IndexOutOfRange {
                index: self.track_index,
                len: self.track_ids.len(),
            });
        }
        if !self.time_pos.is_finite() || self.time_pos < 0.0 {
            return Err(SavedQueueError::InvalidTimePos(self.time_pos));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SavedQueueError {
    #[error("I/O error on {0}: {1}")]
    Io(PathBuf, std::io::Error),

    #[error("Failed to serialize play queue: {0}")]
    Serialize(serde_json::Error),

    #[error("Failed to parse saved play queue {0}: {1}")]
    Parse(PathBuf, serde_json::Error),

    #[error("saved track index {index} out of range for {len} tracks")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("invalid saved time position {0}")]
    InvalidTimePos(f64),

    #[error("saved play queue was from a different server ({saved}, current {current})")]
    DifferentServer { saved: String, current: String },
}
