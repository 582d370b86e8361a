//! Transport controls: play, pause, stop, seek, volume and loop mode.

use super::{EngineError, PlaybackEngine};
use crate::player::backend::PlayerState;
use crate::player::events::EngineEvent;
use crate::player::queue::LoopMode;

/// Seeking back further than this into a track restarts it instead of
/// going to the previous one.
const RESTART_THRESHOLD_SECS: f64 = 3.0;

impl PlaybackEngine {
    /// Play the item at `idx` from the start.
    pub fn play_track_at(&mut self, idx: usize) -> Result<(), EngineError> {
        self.play_track_from(idx, 0.0)
    }

    pub(super) fn play_track_from(&mut self, idx: usize, start_secs: f64) -> Result<(), EngineError> {
        let len = self.queue.len();
        if idx >= len {
            return Err(EngineError::IndexOutOfRange {
                index: idx as i64,
                len,
            });
        }
        self.check_scrobble();
        self.already_scrobbled = true;
        tracing::debug!(target: "engine", index = idx, start_secs, "Play track");
        self.request_track(idx, start_secs)
    }

    /// The item relative skips count from: the one last requested if the
    /// backend hasn't reported it yet, else the playing one.
    pub(super) fn skip_origin(&self) -> Option<usize> {
        self.pending_track_change.or(self.now_playing)
    }

    /// Skip to the next item. No-op while stopped.
    pub fn seek_next(&mut self) -> Result<(), EngineError> {
        if self.playback_status().state == PlayerState::Stopped {
            return Ok(());
        }
        self.play_track_at(self.skip_origin().map_or(0, |i| i + 1))
    }

    /// Restart the current item, or go to the previous one when near its
    /// start.
    pub fn seek_back_or_previous(&mut self) -> Result<(), EngineError> {
        let time_pos = self.playback_status().time_pos;
        match self.skip_origin() {
            Some(idx) if idx > 0 && time_pos <= RESTART_THRESHOLD_SECS => {
                self.play_track_at(idx - 1)
            }
            _ => Ok(self.player.seek_seconds(0.0)?),
        }
    }

    /// Move `n` items forward (or back when negative).
    ///
    /// The first step back restarts the current item if it's past the
    /// first few seconds. Going forward from the last item wraps to the
    /// first.
    pub fn seek_fwd_back_n(&mut self, n: i64) -> Result<(), EngineError> {
        let mut n = n;
        if n < 0 && self.playback_status().time_pos > RESTART_THRESHOLD_SECS {
            n += 1;
        }
        let idx = self.skip_origin().map_or(-1, |i| i as i64);
        if n == 0 || (idx == 0 && n < 0) {
            return Ok(self.player.seek_seconds(0.0)?);
        }

        let len = self.queue.len();
        let last = len as i64 - 1;
        let mut new_idx = idx.saturating_add(n).max(0).min(last);
        if idx == last && n > 0 {
            new_idx = 0;
        }
        if new_idx < 0 {
            return Err(EngineError::IndexOutOfRange {
                index: new_idx,
                len,
            });
        }
        self.play_track_at(new_idx as usize)
    }

    /// Seek to an absolute position. Radio streams can't seek.
    pub fn seek_seconds(&mut self, secs: f64) -> Result<(), EngineError> {
        if self.is_radio {
            return Ok(());
        }
        Ok(self.player.seek_seconds(secs)?)
    }

    pub fn stop(&mut self) -> Result<(), EngineError> {
        Ok(self.stop_player()?)
    }

    pub fn pause(&mut self) -> Result<(), EngineError> {
        Ok(self.player.pause()?)
    }

    /// Resume playback.
    ///
    /// After a player switch this replays the current item where the old
    /// player left off. When stopped it starts the queue from the top.
    pub fn continue_playback(&mut self) -> Result<(), EngineError> {
        if let Some(pending) = self.pending_player_change.take() {
            let idx = self.now_playing.unwrap_or(0);
            return self.play_track_from(idx, pending.time_pos);
        }
        if self.playback_status().state == PlayerState::Stopped {
            return self.play_track_at(0);
        }
        Ok(self.player.continue_playback()?)
    }

    pub fn set_pause_after_current(&mut self, pause_after_current: bool) {
        self.pause_after_current = pause_after_current;
    }

    /// Set the volume, clamped to 0 - 100.
    pub fn set_volume(&mut self, volume: i32) -> Result<(), EngineError> {
        let volume = volume.clamp(0, 100) as u8;
        self.player.set_volume(volume)?;
        self.events.emit(EngineEvent::VolumeChanged(volume));
        Ok(())
    }

    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
        if self.now_playing.is_some() {
            self.on_next_track_updated();
        }
        self.events.emit(EngineEvent::LoopModeChanged(mode));
    }
}
