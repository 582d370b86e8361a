//! Play counting and scrobble submission.
//!
//! Server calls are spawned on the engine's runtime and never awaited;
//! failures are only logged.

use std::sync::Arc;

use super::PlaybackEngine;
use crate::config::ScrobbleConfig;
use crate::model::MediaItem;

/// Below this much listening (or track length) nothing is reported.
const MIN_SCROBBLE_SECS: f64 = 0.1;

/// Whether `elapsed` seconds of listening count as a play.
pub(crate) fn scrobble_threshold_met(elapsed: f64, duration: f64, cfg: &ScrobbleConfig) -> bool {
    let time_met =
        cfg.threshold_time_seconds >= 0 && elapsed >= f64::from(cfg.threshold_time_seconds);
    let percent = elapsed / duration * 100.0;
    time_met || percent >= f64::from(cfg.threshold_percent)
}

impl PlaybackEngine {
    /// Report the end of the now-playing track. Call before the cursor
    /// moves away from it.
    pub(super) fn check_scrobble(&mut self) {
        if !self.scrobble_cfg.enabled || self.queue.is_empty() {
            return;
        }
        let Some(idx) = self.now_playing else {
            return;
        };

        let elapsed = self.play_time.elapsed().as_secs_f64();
        let duration = self.cur_track_duration;
        let position = self.latest_track_position as u32;
        // The next item starts counting from zero even if this one isn't reported
        self.play_time.reset();
        self.latest_track_position = 0.0;

        let client_decides = self.server.client_decides_scrobble();
        // Radio stations are not scrobbled
        let Some(MediaItem::Track(track)) = self.queue.get_mut(idx) else {
            return;
        };
        if elapsed < MIN_SCROBBLE_SECS || duration < MIN_SCROBBLE_SECS {
            return;
        }

        let mut submission = false;
        if client_decides && scrobble_threshold_met(elapsed, duration, &self.scrobble_cfg) {
            track.play_count += 1;
            self.last_scrobbled = Some(track.clone());
            submission = true;
        }
        let id = track.id.clone();

        tracing::debug!(target: "engine::scrobble", id = %id, elapsed, submission, "Track ended");
        self.spawn_track_ended(id, position, submission);
    }

    /// Report the start of the now-playing track.
    pub(super) fn send_now_playing_scrobble(&mut self) {
        if !self.scrobble_cfg.enabled || self.queue.is_empty() {
            return;
        }
        let Some(idx) = self.now_playing else {
            return;
        };
        let client_decides = self.server.client_decides_scrobble();

        let Some(MediaItem::Track(track)) = self.queue.get_mut(idx) else {
            return;
        };
        if !client_decides {
            // The server counts the play as soon as it starts
            track.play_count += 1;
            self.last_scrobbled = Some(track.clone());
        }
        let id = track.id.clone();

        tracing::debug!(target: "engine::scrobble", id = %id, "Now playing");
        let server = Arc::clone(&self.server);
        self.runtime.spawn(async move {
            if let Err(e) = server.track_began_playback(&id).await {
                tracing::warn!(target: "engine::scrobble", id = %id, error = %e, "Now-playing report failed");
            }
        });
    }

    fn spawn_track_ended(&self, id: String, position: u32, submission: bool) {
        let server = Arc::clone(&self.server);
        self.runtime.spawn(async move {
            if let Err(e) = server.track_ended_playback(&id, position, submission).await {
                tracing::warn!(target: "engine::scrobble", id = %id, error = %e, "Scrobble failed");
            }
        });
    }
}
