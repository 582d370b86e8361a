//! Thread-safe front end for the playback engine.
//!
//! [`PlaybackManager`] owns the engine and one driver thread. Callers on any
//! thread queue commands; the driver applies them together with backend
//! events and poll ticks, one at a time, in the order they arrived.
//!
//! # Example
//!
//! ```ignore
//! let engine = PlaybackEngine::builder(player, server).config(&config).build()?;
//! let manager = PlaybackManager::start(engine)?;
//! let songs = manager.subscribe(EventMask::SONG_CHANGED);
//!
//! manager.load_tracks(tracks, InsertMode::Replace, false);
//! manager.play_from_beginning();
//! ```

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, MutexGuard};

use super::backend::{PlayerState, ReplayGainMode};
use super::commands::{CommandQueue, PlaybackCommand};
use super::engine::{EngineError, EngineInput, PlaybackEngine, PlaybackStatus};
use super::events::{EngineEvent, EventMask};
use super::queue::{InsertMode, LoopMode};
use crate::config::{ReplayGainConfig, ReplayGainSetting};
use crate::model::{MediaItem, RadioStation, Track};
use crate::saved_queue::SavedPlayQueue;

/// Owns a [`PlaybackEngine`] and the thread that drives it.
pub struct PlaybackManager {
    engine: Arc<Mutex<PlaybackEngine>>,
    commands: Arc<CommandQueue>,
    input_tx: Sender<EngineInput>,
    driver: Option<JoinHandle<()>>,
}

impl PlaybackManager {
    /// Take ownership of the engine and start the driver thread.
    pub fn start(engine: PlaybackEngine) -> std::io::Result<Self> {
        let input_tx = engine.input_sender();
        let input_rx = engine.input_receiver();
        let engine = Arc::new(Mutex::new(engine));
        let commands = Arc::new(CommandQueue::new(input_tx.clone()));

        let driver = {
            let engine = Arc::clone(&engine);
            let commands = Arc::clone(&commands);
            thread::Builder::new()
                .name("playback-driver".to_string())
                .spawn(move || drive(&engine, &commands, &input_rx))?
        };
        tracing::info!(target: "manager", "Playback driver started");

        Ok(Self {
            engine,
            commands,
            input_tx,
            driver: Some(driver),
        })
    }

    /// Lock the engine for direct queries. Don't hold the guard across
    /// anything slow; the driver waits on it.
    pub fn engine(&self) -> MutexGuard<'_, PlaybackEngine> {
        self.engine.lock()
    }

    /// Commands not yet applied.
    pub fn pending_commands(&self) -> usize {
        self.commands.len()
    }

    /// Receive the events selected by `mask`.
    pub fn subscribe(&self, mask: EventMask) -> Receiver<EngineEvent> {
        self.engine.lock().subscribe(mask)
    }

    // ========================================================================
    // Queue
    // ========================================================================

    pub fn load_items(&self, items: Vec<MediaItem>, mode: InsertMode, shuffle: bool) {
        self.commands.load_items(items, mode, shuffle);
    }

    pub fn load_tracks(&self, tracks: Vec<Track>, mode: InsertMode, shuffle: bool) {
        let items = tracks.into_iter().map(MediaItem::from).collect();
        self.commands.load_items(items, mode, shuffle);
    }

    pub fn load_radio_station(&self, station: RadioStation, mode: InsertMode) {
        self.commands.load_radio_station(station, mode);
    }

    /// Replace the queue with an album and play from `first_track`.
    ///
    /// With ReplayGain on `Auto` this switches the backend to album gain.
    pub fn play_album(&self, tracks: Vec<Track>, first_track: usize, shuffle: bool) {
        self.play_tracks_with_gain(tracks, first_track, shuffle, ReplayGainMode::Album);
    }

    /// Replace the queue with loose tracks (a playlist, a search result)
    /// and play from `first_track`.
    pub fn play_tracks(&self, tracks: Vec<Track>, first_track: usize, shuffle: bool) {
        self.play_tracks_with_gain(tracks, first_track, shuffle, ReplayGainMode::Track);
    }

    fn play_tracks_with_gain(
        &self,
        tracks: Vec<Track>,
        first_track: usize,
        shuffle: bool,
        auto_mode: ReplayGainMode,
    ) {
        self.load_tracks(tracks, InsertMode::Replace, shuffle);
        {
            let mut engine = self.engine.lock();
            if engine.replay_gain_config().mode == ReplayGainSetting::Auto {
                engine.set_replay_gain_mode(auto_mode);
            }
        }
        // A shuffled album starts from the top of the new order
        self.play_track_at(if shuffle { 0 } else { first_track });
    }

    pub fn play_radio_station(&self, station: RadioStation) {
        self.load_radio_station(station, InsertMode::Replace);
        self.play_from_beginning();
    }

    /// Replace the queue, keeping the playing item playing if it's in the
    /// new one.
    pub fn update_play_queue(&self, items: Vec<MediaItem>) {
        self.commands.update_play_queue(items);
    }

    pub fn remove_tracks_from_queue(&self, idxs: Vec<usize>) {
        self.commands.remove_tracks(idxs);
    }

    pub fn stop_and_clear_play_queue(&self) {
        self.commands.stop_and_clear();
    }

    pub fn set_shuffle(&self, shuffle: bool) {
        self.commands.set_shuffle(shuffle);
    }

    pub fn play_queue(&self) -> Vec<MediaItem> {
        self.engine.lock().play_queue()
    }

    pub fn on_track_favorite_status_changed(&self, id: &str, favorite: bool) {
        self.engine.lock().on_track_favorite_status_changed(id, favorite);
    }

    pub fn on_track_rating_changed(&self, id: &str, rating: u8) {
        self.engine.lock().on_track_rating_changed(id, rating);
    }

    // ========================================================================
    // Transport
    // ========================================================================

    pub fn play_track_at(&self, idx: usize) {
        self.commands.play_track_at(idx);
    }

    pub fn play_from_beginning(&self) {
        self.play_track_at(0);
    }

    pub fn stop(&self) {
        self.commands.stop();
    }

    pub fn pause(&self) {
        self.commands.pause();
    }

    pub fn continue_playback(&self) {
        self.commands.continue_playback();
    }

    /// Toggle between playing and paused. Starts the queue when stopped.
    pub fn play_pause(&self) {
        let state = self.engine.lock().playback_status().state;
        match state {
            PlayerState::Playing => self.pause(),
            PlayerState::Paused => self.continue_playback(),
            PlayerState::Stopped => self.play_track_at(0),
        }
    }

    pub fn seek_next(&self) {
        self.commands.seek_next();
    }

    pub fn seek_back_or_previous(&self) {
        self.commands.seek_back_or_previous();
    }

    /// Seek to an absolute position in the current item.
    pub fn seek_seconds(&self, secs: f64) {
        self.commands.seek_seconds(secs);
    }

    /// Seek relative to the current position, clamped to the item.
    pub fn seek_by_seconds(&self, delta: f64) {
        let status = self.engine.lock().playback_status();
        let target = (status.time_pos + delta).min(status.duration).max(0.0);
        self.commands.seek_seconds(target);
    }

    /// Seek to a fraction (0 - 1) of the current item's duration.
    pub fn seek_fraction(&self, fraction: f64) {
        let duration = self.engine.lock().playback_status().duration;
        self.commands.seek_seconds(duration * fraction.clamp(0.0, 1.0));
    }

    pub fn set_volume(&self, volume: i32) {
        self.commands.set_volume(volume);
    }

    pub fn set_loop_mode(&self, mode: LoopMode) {
        self.commands.set_loop_mode(mode);
    }

    /// Step through None -> All -> One -> None.
    pub fn set_next_loop_mode(&self) {
        let mode = self.engine.lock().loop_mode();
        self.commands.set_loop_mode(mode.cycled());
    }

    pub fn set_pause_after_current(&self, pause_after_current: bool) {
        self.engine.lock().set_pause_after_current(pause_after_current);
    }

    pub fn set_replay_gain_options(&self, config: ReplayGainConfig) {
        self.engine.lock().set_replay_gain_options(config);
    }

    pub fn set_replay_gain_mode(&self, mode: ReplayGainMode) {
        self.engine.lock().set_replay_gain_mode(mode);
    }

    // ========================================================================
    // Status
    // ========================================================================

    pub fn now_playing(&self) -> Option<MediaItem> {
        self.engine.lock().now_playing().cloned()
    }

    pub fn now_playing_index(&self) -> Option<usize> {
        self.engine.lock().now_playing_index()
    }

    pub fn playback_status(&self) -> PlaybackStatus {
        self.engine.lock().playback_status()
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.engine.lock().loop_mode()
    }

    pub fn is_shuffled(&self) -> bool {
        self.engine.lock().is_shuffled()
    }

    pub fn volume(&self) -> u8 {
        self.engine.lock().volume()
    }

    pub fn is_seeking(&self) -> bool {
        self.engine.lock().is_seeking()
    }

    pub fn pause_after_current(&self) -> bool {
        self.engine.lock().pause_after_current()
    }

    /// Snapshot the queue in the form it is saved to disk.
    pub fn saved_play_queue(&self, server_id: &str) -> SavedPlayQueue {
        SavedPlayQueue::capture(server_id, &self.engine.lock())
    }

    /// Stop the driver and the backend. Commands still queued are dropped.
    pub fn shutdown(&mut self) {
        let Some(driver) = self.driver.take() else {
            return;
        };
        let _ = self.input_tx.send(EngineInput::Shutdown);
        if driver.join().is_err() {
            tracing::warn!(target: "manager", "Playback driver panicked");
        }
        let dropped = self.commands.drain().len();
        if dropped > 0 {
            tracing::debug!(target: "manager", dropped, "Discarded pending commands");
        }
        self.engine.lock().shutdown();
        tracing::info!(target: "manager", "Playback driver stopped");
    }
}

impl Drop for PlaybackManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Driver
// ============================================================================

fn drive(engine: &Mutex<PlaybackEngine>, commands: &CommandQueue, inputs: &Receiver<EngineInput>) {
    for input in inputs.iter() {
        match input {
            EngineInput::Shutdown => break,
            EngineInput::Wake => {
                // One wake may cover several commands, later wakes find nothing
                while let Some(command) = commands.pop() {
                    let mut engine = engine.lock();
                    execute(&mut engine, command);
                }
            }
            other => engine.lock().handle_input(other),
        }
    }
}

fn execute(engine: &mut PlaybackEngine, command: PlaybackCommand) {
    let kind = command.kind();
    tracing::trace!(target: "manager", ?kind, "Applying command");
    let result: Result<(), EngineError> = match command {
        PlaybackCommand::Stop => engine.stop(),
        PlaybackCommand::Continue => engine.continue_playback(),
        PlaybackCommand::Pause => engine.pause(),
        PlaybackCommand::PlayTrackAt(idx) => engine.play_track_at(idx),
        PlaybackCommand::SeekSeconds(secs) => engine.seek_seconds(secs),
        PlaybackCommand::SeekFwdBackN(n) => engine.seek_fwd_back_n(n),
        PlaybackCommand::Volume(volume) => engine.set_volume(volume),
        PlaybackCommand::LoopMode(mode) => {
            engine.set_loop_mode(mode);
            Ok(())
        }
        PlaybackCommand::Shuffle(shuffle) => {
            engine.set_shuffle(shuffle);
            Ok(())
        }
        PlaybackCommand::StopAndClear => {
            engine.stop_and_clear_play_queue();
            Ok(())
        }
        PlaybackCommand::UpdatePlayQueue(items) => engine.update_play_queue(items),
        PlaybackCommand::RemoveTracks(idxs) => {
            engine.remove_tracks_from_queue(&idxs);
            Ok(())
        }
        PlaybackCommand::LoadItems {
            items,
            mode,
            shuffle,
        } => {
            engine.load_items(items, mode, shuffle);
            Ok(())
        }
        PlaybackCommand::LoadRadioStation { station, mode } => {
            engine.load_radio_station(station, mode);
            Ok(())
        }
    };
    if let Err(e) = result {
        tracing::warn!(target: "manager", ?kind, error = %e, "Playback command failed");
    }
}
