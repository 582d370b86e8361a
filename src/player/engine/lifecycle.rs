//! Reacting to the backend: track changes, stops, pauses, seeks and
//! position ticks. Also switching backends mid-session.

use super::{EngineError, PlaybackEngine, replay_gain_options};
use crate::config::ReplayGainConfig;
use crate::player::backend::{
    BasePlayer, PlayerEvent, PlayerEventSink, PlayerState, ReplayGainMode, ReplayGainOptions,
    has_playback_capability,
};
use crate::player::events::EngineEvent;
use crate::player::queue::LoopMode;

/// Seconds before the end of a track at which the gapless slot is primed.
const NEAR_END_SECS: f64 = 10.0;

impl PlaybackEngine {
    pub(super) fn handle_player_event(&mut self, event: PlayerEvent) {
        tracing::trace!(target: "engine", ?event, "Player event");
        match event {
            PlayerEvent::TrackChanged => self.on_track_changed(),
            PlayerEvent::Stopped => self.on_stopped(),
            PlayerEvent::Paused => {
                self.play_time.stop();
                self.stop_poll();
                self.events.emit(EngineEvent::Paused);
            }
            PlayerEvent::Playing => {
                self.play_time.start();
                self.start_poll();
                self.events.emit(EngineEvent::Playing);
            }
            PlayerEvent::Seeked => {
                self.handle_time_pos_update(true);
                self.events.emit(EngineEvent::Seeked);
            }
        }
    }

    fn on_track_changed(&mut self) {
        if self.cancelled_change_events > 0 {
            self.cancelled_change_events -= 1;
            tracing::debug!(target: "engine", "Ignoring track change for a cancelled request");
            return;
        }

        // Count the outgoing track before the cursor moves
        if !self.already_scrobbled {
            self.check_scrobble();
        }

        if self.playback_status().state == PlayerState::Playing {
            self.play_time.start();
        }

        if self.pending_change_events > 0 {
            self.pending_change_events -= 1;
            self.now_playing = if self.pending_change_events == 0 {
                self.pending_track_change.take()
            } else {
                self.pending_track_change
            };
        } else if self.was_stopped || self.loop_mode != LoopMode::One || self.now_playing.is_none() {
            let next = self.now_playing.map_or(0, |i| i + 1);
            let wrapped = self.loop_mode == LoopMode::All && next >= self.queue.len();
            self.now_playing = Some(if wrapped { 0 } else { next });
        }

        let Some((is_radio, duration)) = self
            .now_playing
            .and_then(|i| self.queue.get(i))
            .map(|item| (item.is_radio(), item.duration_secs()))
        else {
            tracing::warn!(
                target: "engine",
                index = ?self.now_playing,
                len = self.queue.len(),
                "Backend changed track past the end of the queue, treating as stop"
            );
            self.on_stopped();
            return;
        };

        self.is_radio = is_radio;
        self.was_stopped = false;
        self.already_scrobbled = false;
        self.cur_track_duration = duration;

        // A server that counts on start must see the play before observers
        // are told about the change
        self.send_now_playing_scrobble();
        self.emit_song_changed();

        self.handle_time_pos_update(false);
        self.on_next_track_updated();

        if self.pause_after_current {
            if let Err(e) = self.player.pause() {
                tracing::warn!(target: "engine", error = %e, "Failed to pause after current track");
            }
            self.pause_after_current = false;
        }
    }

    fn on_stopped(&mut self) {
        self.cancelled_change_events = 0;
        // A backend that is still idle will never confirm what was asked of
        // it. One that already started something again is reporting a stop
        // older than the request.
        if self.player.status().state == PlayerState::Stopped {
            self.pending_track_change = None;
            self.pending_change_events = 0;
        }
        self.play_time.stop();
        if !self.already_scrobbled {
            self.check_scrobble();
        }
        self.stop_poll();
        self.handle_time_pos_update(false);

        if !self.events.is_suppressed() {
            let last_scrobbled = self.last_scrobbled.take();
            self.events.emit(EngineEvent::SongChanged {
                now_playing: None,
                last_scrobbled,
            });
        }
        self.events.emit(EngineEvent::Stopped);

        self.already_scrobbled = false;
        self.was_stopped = true;
        self.now_playing = None;
        self.pause_after_current = false;
    }

    fn emit_song_changed(&mut self) {
        if self.events.is_suppressed() {
            return;
        }
        let now_playing = self.now_playing().cloned();
        let last_scrobbled = self.last_scrobbled.take();
        self.events.emit(EngineEvent::SongChanged {
            now_playing,
            last_scrobbled,
        });
    }

    /// Position tick: prime the gapless slot near the end of the track and
    /// report the play position.
    pub(super) fn handle_time_pos_update(&mut self, seeked: bool) {
        let status = self.playback_status();
        let near_end = self.now_playing().is_some_and(|item| {
            !item.is_radio() && status.time_pos > item.duration_secs() - NEAR_END_SECS
        });

        if self.need_to_set_next_track && near_end {
            self.need_to_set_next_track = false;
            let next = self.next_playing_index();
            if let Err(e) = self.set_next_track(next) {
                tracing::warn!(target: "engine", error = %e, "Failed to set next track");
            }
        }

        if self.events.is_suppressed() {
            return;
        }
        if status.time_pos > self.latest_track_position {
            self.latest_track_position = status.time_pos;
        }
        // Streams report their buffered length, which means nothing for radio
        let duration = if self.is_radio { 0.0 } else { status.duration };
        self.events.emit(EngineEvent::PlayTimeUpdate {
            pos: status.time_pos,
            duration,
            seeked,
        });
    }

    /// Switch to a different backend, carrying playback over.
    ///
    /// The new backend is checked first; on error the current one is kept.
    pub fn set_player(&mut self, player: Box<dyn BasePlayer>) -> Result<(), EngineError> {
        let mut player = player;
        if !has_playback_capability(player.as_mut()) {
            return Err(EngineError::UnsupportedPlayer);
        }

        let mut status = match self.pending_player_change {
            Some(mut pending) => {
                pending.state = PlayerState::Paused;
                pending
            }
            None => self.player.status(),
        };
        let need_to_unpause = status.state == PlayerState::Playing;
        if need_to_unpause {
            self.stop_poll();
            status.state = PlayerState::Paused;
        }
        if status.state != PlayerState::Stopped {
            self.pending_player_change = Some(status);
        }

        self.player.set_event_sink(None);
        if let Err(e) = self.player.stop() {
            tracing::warn!(target: "engine", error = %e, "Failed to stop previous player");
        }
        let old_volume = self.player.volume();

        // The old backend owes nothing anymore
        self.pending_track_change = None;
        self.pending_change_events = 0;
        self.cancelled_change_events = 0;

        self.player = player;
        self.player
            .set_event_sink(Some(PlayerEventSink::new(self.input_tx.clone())));
        tracing::info!(target: "engine", resume = need_to_unpause, "Switched player");

        if need_to_unpause && let Some(idx) = self.now_playing {
            self.pending_player_change = None;
            self.play_track_from(idx, status.time_pos)?;
        }

        let volume = self.player.volume();
        if volume != old_volume {
            self.events.emit(EngineEvent::VolumeChanged(volume));
        }
        Ok(())
    }

    /// Apply ReplayGain settings. Logged and ignored when the backend
    /// doesn't support ReplayGain.
    pub fn set_replay_gain_options(&mut self, config: ReplayGainConfig) {
        let options = replay_gain_options(&config);
        let Some(rg) = self.player.as_replay_gain() else {
            tracing::warn!(target: "engine", "Player doesn't support ReplayGain");
            return;
        };
        if let Err(e) = rg.set_replay_gain_options(options) {
            tracing::warn!(target: "engine", error = %e, "Failed to set ReplayGain options");
        }
        self.replay_gain_cfg = config;
    }

    /// Change only the ReplayGain mode, keeping preamp and clipping.
    pub fn set_replay_gain_mode(&mut self, mode: ReplayGainMode) {
        let options = ReplayGainOptions {
            mode,
            preamp_gain_db: self.replay_gain_cfg.preamp_gain_db,
            prevent_clipping: self.replay_gain_cfg.prevent_clipping,
        };
        let Some(rg) = self.player.as_replay_gain() else {
            tracing::warn!(target: "engine", "Player doesn't support ReplayGain");
            return;
        };
        if let Err(e) = rg.set_replay_gain_options(options) {
            tracing::warn!(target: "engine", error = %e, "Failed to set ReplayGain mode");
        }
    }
}
