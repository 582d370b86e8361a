//! Contract between the playback engine and a native audio backend.
//!
//! The engine never decodes audio itself. It drives a [`BasePlayer`] and
//! listens for the events the backend reports through a [`PlayerEventSink`].
//! A backend must expose at least one playback capability: stream URLs
//! ([`UrlPlayer`]) or domain tracks ([`TrackPlayer`]).

use super::PlayerError;
use super::engine::EngineInput;
use crate::model::{MediaItemMetadata, Track};
use crossbeam_channel::Sender;

/// The playback state (Stopped, Paused, or Playing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    #[default]
    Stopped,
    Paused,
    Playing,
}

/// Backend status snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlayerStatus {
    pub state: PlayerState,
    /// Seconds into the current item
    pub time_pos: f64,
    /// Duration as the backend sees it (may be a buffered length for streams)
    pub duration: f64,
}

/// Events a backend reports, in the order they happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    Paused,
    Playing,
    Stopped,
    Seeked,
    /// A new item started, either requested or a gapless advance
    TrackChanged,
}

/// Where a backend delivers its events.
///
/// Cheap to clone; sending never blocks.
#[derive(Debug, Clone)]
pub struct PlayerEventSink {
    tx: Sender<EngineInput>,
}

impl PlayerEventSink {
    pub(crate) fn new(tx: Sender<EngineInput>) -> Self {
        Self { tx }
    }

    /// Report an event. Dropped silently once the engine is gone.
    pub fn emit(&self, event: PlayerEvent) {
        let _ = self.tx.send(EngineInput::Player(event));
    }
}

/// ReplayGain normalization mode understood by backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplayGainMode {
    #[default]
    None,
    Track,
    Album,
}

/// Argument to [`ReplayGainPlayer::set_replay_gain_options`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReplayGainOptions {
    pub mode: ReplayGainMode,
    pub preamp_gain_db: f64,
    pub prevent_clipping: bool,
}

/// Transport controls every backend provides.
pub trait BasePlayer: Send {
    /// Resume from pause.
    fn continue_playback(&mut self) -> Result<(), PlayerError>;
    fn pause(&mut self) -> Result<(), PlayerError>;
    fn stop(&mut self) -> Result<(), PlayerError>;

    fn seek_seconds(&mut self, secs: f64) -> Result<(), PlayerError>;
    fn is_seeking(&self) -> bool;

    /// Volume 0-100.
    fn set_volume(&mut self, volume: u8) -> Result<(), PlayerError>;
    fn volume(&self) -> u8;

    fn status(&self) -> PlayerStatus;

    /// Attach (or detach with `None`) the engine's event sink.
    fn set_event_sink(&mut self, sink: Option<PlayerEventSink>);

    fn as_url_player(&mut self) -> Option<&mut dyn UrlPlayer> {
        None
    }

    fn as_track_player(&mut self) -> Option<&mut dyn TrackPlayer> {
        None
    }

    fn as_replay_gain(&mut self) -> Option<&mut dyn ReplayGainPlayer> {
        None
    }
}

/// The next item primed for gapless playback.
#[derive(Debug, Clone, PartialEq)]
pub struct NextFile {
    pub url: String,
    pub metadata: MediaItemMetadata,
}

/// Backend that plays resolved URLs (or local file paths).
pub trait UrlPlayer {
    fn play_file(
        &mut self,
        url: &str,
        metadata: &MediaItemMetadata,
        start_secs: f64,
    ) -> Result<(), PlayerError>;

    /// Prime (or clear with `None`) the gapless next slot.
    fn set_next_file(&mut self, next: Option<NextFile>) -> Result<(), PlayerError>;
}

/// Backend that takes domain tracks and resolves streams itself.
pub trait TrackPlayer {
    fn play_track(&mut self, track: &Track, start_secs: f64) -> Result<(), PlayerError>;
    fn set_next_track(&mut self, track: Option<&Track>) -> Result<(), PlayerError>;
}

pub trait ReplayGainPlayer {
    fn set_replay_gain_options(&mut self, options: ReplayGainOptions) -> Result<(), PlayerError>;
}

/// Whether a backend can actually play anything.
pub(crate) fn has_playback_capability(player: &mut dyn BasePlayer) -> bool {
    player.as_url_player().is_some() || player.as_track_player().is_some()
}
