//! Test utilities and fixtures for sonic-engine tests.
//!
//! This module provides mock backends, a mock server and cache, a manual
//! clock and track factories to reduce boilerplate in tests.
//!
//! # Example
//!
//! ```ignore
//! use sonic_engine::test_utils::{MockPlayer, MockServer, mock_tracks};
//!
//! let player = MockPlayer::url();
//! let handle = player.handle();
//! let engine = PlaybackEngine::builder(Box::new(player), Arc::new(MockServer::new()))
//!     .build()?;
//! // ... drive the engine, then inspect handle.calls()
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::cache::{AudioCache, CacheRequest};
use crate::model::{MediaItem, MediaItemMetadata, RadioStation, Track};
use crate::player::{
    BasePlayer, Clock, NextFile, PlayerError, PlayerEvent, PlayerEventSink, PlayerState,
    PlayerStatus, ReplayGainOptions, ReplayGainPlayer, TrackPlayer, UrlPlayer,
};
use crate::server::{MediaServer, ServerError, TranscodeSettings};

// ============================================================================
// Fixtures
// ============================================================================

/// Tracks `t0`, `t1`, ... of three minutes each.
pub fn mock_tracks(n: usize) -> Vec<Track> {
    (0..n)
        .map(|i| {
            let mut track = Track::new(format!("t{i}"), format!("Track {i}"), 180.0);
            track.album = "Mock Album".to_string();
            track.artist_names = vec!["Mock Artist".to_string()];
            track
        })
        .collect()
}

/// Same as [`mock_tracks`], wrapped as queue items.
pub fn mock_items(n: usize) -> Vec<MediaItem> {
    mock_tracks(n).into_iter().map(MediaItem::from).collect()
}

pub fn mock_radio(id: &str) -> RadioStation {
    RadioStation::new(id, format!("Radio {id}"), format!("http://radio.test/{id}"))
}

/// Let tasks spawned on the current-thread test runtime run to completion.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

// ============================================================================
// Clock
// ============================================================================

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

// ============================================================================
// Player
// ============================================================================

/// A backend call recorded by [`MockPlayer`].
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCall {
    PlayFile { url: String, start_secs: f64 },
    PlayTrack { id: String, start_secs: f64 },
    /// URL of the primed item, `None` when cleared
    SetNextFile(Option<String>),
    /// ID of the primed track, `None` when cleared
    SetNextTrack(Option<String>),
    Continue,
    Pause,
    Stop,
    Seek(f64),
    SetVolume(u8),
    ReplayGain(ReplayGainOptions),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capability {
    Url,
    Track,
    Neither,
}

#[derive(Default)]
struct MockPlayerState {
    status: PlayerStatus,
    volume: u8,
    calls: Vec<PlayerCall>,
    /// Duration of whatever is primed in the gapless slot
    next: Option<f64>,
    sink: Option<PlayerEventSink>,
}

/// In-memory backend that behaves like a well-mannered native player:
/// starting an item reports `TrackChanged` (plus `Playing` when it wasn't
/// already playing), stopping reports `Stopped`, and so on.
pub struct MockPlayer {
    capability: Capability,
    replay_gain: bool,
    state: Arc<Mutex<MockPlayerState>>,
}

/// Test-side view of a [`MockPlayer`] that was moved into an engine.
#[derive(Clone)]
pub struct MockPlayerHandle {
    state: Arc<Mutex<MockPlayerState>>,
}

impl MockPlayer {
    fn with_capability(capability: Capability) -> Self {
        Self {
            capability,
            replay_gain: false,
            state: Arc::new(Mutex::new(MockPlayerState {
                volume: 100,
                ..Default::default()
            })),
        }
    }

    /// A backend that plays URLs.
    pub fn url() -> Self {
        Self::with_capability(Capability::Url)
    }

    /// A backend that takes tracks.
    pub fn track() -> Self {
        Self::with_capability(Capability::Track)
    }

    /// A backend that can't play anything.
    pub fn incapable() -> Self {
        Self::with_capability(Capability::Neither)
    }

    pub fn with_replay_gain(mut self) -> Self {
        self.replay_gain = true;
        self
    }

    pub fn with_volume(self, volume: u8) -> Self {
        self.state.lock().volume = volume;
        self
    }

    pub fn handle(&self) -> MockPlayerHandle {
        MockPlayerHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn start_item(&mut self, call: PlayerCall, start_secs: f64, duration: f64) {
        let mut state = self.state.lock();
        state.calls.push(call);
        let was_playing = state.status.state == PlayerState::Playing;
        state.status = PlayerStatus {
            state: PlayerState::Playing,
            time_pos: start_secs,
            duration,
        };
        state.next = None;
        if let Some(sink) = &state.sink {
            sink.emit(PlayerEvent::TrackChanged);
            if !was_playing {
                sink.emit(PlayerEvent::Playing);
            }
        }
    }
}

impl BasePlayer for MockPlayer {
    fn continue_playback(&mut self) -> Result<(), PlayerError> {
        let mut state = self.state.lock();
        state.calls.push(PlayerCall::Continue);
        if state.status.state == PlayerState::Paused {
            state.status.state = PlayerState::Playing;
            if let Some(sink) = &state.sink {
                sink.emit(PlayerEvent::Playing);
            }
        }
        Ok(())
    }

    fn pause(&mut self) -> Result<(), PlayerError> {
        let mut state = self.state.lock();
        state.calls.push(PlayerCall::Pause);
        if state.status.state == PlayerState::Playing {
            state.status.state = PlayerState::Paused;
            if let Some(sink) = &state.sink {
                sink.emit(PlayerEvent::Paused);
            }
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PlayerError> {
        let mut state = self.state.lock();
        state.calls.push(PlayerCall::Stop);
        state.next = None;
        if state.status.state != PlayerState::Stopped {
            state.status = PlayerStatus::default();
            if let Some(sink) = &state.sink {
                sink.emit(PlayerEvent::Stopped);
            }
        }
        Ok(())
    }

    fn seek_seconds(&mut self, secs: f64) -> Result<(), PlayerError> {
        let mut state = self.state.lock();
        state.calls.push(PlayerCall::Seek(secs));
        state.status.time_pos = secs;
        if let Some(sink) = &state.sink {
            sink.emit(PlayerEvent::Seeked);
        }
        Ok(())
    }

    fn is_seeking(&self) -> bool {
        false
    }

    fn set_volume(&mut self, volume: u8) -> Result<(), PlayerError> {
        let mut state = self.state.lock();
        state.calls.push(PlayerCall::SetVolume(volume));
        state.volume = volume;
        Ok(())
    }

    fn volume(&self) -> u8 {
        self.state.lock().volume
    }

    fn status(&self) -> PlayerStatus {
        self.state.lock().status
    }

    fn set_event_sink(&mut self, sink: Option<PlayerEventSink>) {
        self.state.lock().sink = sink;
    }

    fn as_url_player(&mut self) -> Option<&mut dyn UrlPlayer> {
        match self.capability {
            Capability::Url => Some(self),
            _ => None,
        }
    }

    fn as_track_player(&mut self) -> Option<&mut dyn TrackPlayer> {
        match self.capability {
            Capability::Track => Some(self),
            _ => None,
        }
    }

    fn as_replay_gain(&mut self) -> Option<&mut dyn ReplayGainPlayer> {
        if self.replay_gain { Some(self) } else { None }
    }
}

impl UrlPlayer for MockPlayer {
    fn play_file(
        &mut self,
        url: &str,
        metadata: &MediaItemMetadata,
        start_secs: f64,
    ) -> Result<(), PlayerError> {
        let call = PlayerCall::PlayFile {
            url: url.to_string(),
            start_secs,
        };
        self.start_item(call, start_secs, metadata.duration_secs);
        Ok(())
    }

    fn set_next_file(&mut self, next: Option<NextFile>) -> Result<(), PlayerError> {
        let mut state = self.state.lock();
        state.next = next.as_ref().map(|n| n.metadata.duration_secs);
        state
            .calls
            .push(PlayerCall::SetNextFile(next.map(|n| n.url)));
        Ok(())
    }
}

impl TrackPlayer for MockPlayer {
    fn play_track(&mut self, track: &Track, start_secs: f64) -> Result<(), PlayerError> {
        let call = PlayerCall::PlayTrack {
            id: track.id.clone(),
            start_secs,
        };
        self.start_item(call, start_secs, track.duration_secs);
        Ok(())
    }

    fn set_next_track(&mut self, track: Option<&Track>) -> Result<(), PlayerError> {
        let mut state = self.state.lock();
        state.next = track.map(|t| t.duration_secs);
        state
            .calls
            .push(PlayerCall::SetNextTrack(track.map(|t| t.id.clone())));
        Ok(())
    }
}

impl ReplayGainPlayer for MockPlayer {
    fn set_replay_gain_options(&mut self, options: ReplayGainOptions) -> Result<(), PlayerError> {
        self.state.lock().calls.push(PlayerCall::ReplayGain(options));
        Ok(())
    }
}

impl MockPlayerHandle {
    pub fn calls(&self) -> Vec<PlayerCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn status(&self) -> PlayerStatus {
        self.state.lock().status
    }

    pub fn volume(&self) -> u8 {
        self.state.lock().volume
    }

    /// Whether anything is primed in the gapless slot.
    pub fn has_next(&self) -> bool {
        self.state.lock().next.is_some()
    }

    pub fn is_attached(&self) -> bool {
        self.state.lock().sink.is_some()
    }

    /// Force the reported state without emitting anything.
    pub fn set_state(&self, state: PlayerState) {
        self.state.lock().status.state = state;
    }

    /// Move the play position without a seek event, as playback would.
    pub fn set_time_pos(&self, secs: f64) {
        self.state.lock().status.time_pos = secs;
    }

    /// Report an arbitrary event.
    pub fn emit(&self, event: PlayerEvent) {
        if let Some(sink) = &self.state.lock().sink {
            sink.emit(event);
        }
    }

    /// The current item reaches its end: advance gaplessly into the primed
    /// item, or stop if nothing is primed.
    pub fn finish_track(&self) {
        let mut state = self.state.lock();
        match state.next.take() {
            Some(duration) => {
                state.status.time_pos = 0.0;
                state.status.duration = duration;
                if let Some(sink) = &state.sink {
                    sink.emit(PlayerEvent::TrackChanged);
                }
            }
            None => {
                state.status = PlayerStatus::default();
                if let Some(sink) = &state.sink {
                    sink.emit(PlayerEvent::Stopped);
                }
            }
        }
    }
}

// ============================================================================
// Server
// ============================================================================

/// A scrobble report recorded by [`MockServer`].
#[derive(Debug, Clone, PartialEq)]
pub enum ServerCall {
    Began(String),
    Ended {
        id: String,
        position_secs: u32,
        submission: bool,
    },
}

/// Server that hands out `mock://` URLs and records scrobbles.
pub struct MockServer {
    client_decides: bool,
    calls: Mutex<Vec<ServerCall>>,
}

impl MockServer {
    pub fn new() -> Self {
        Self {
            client_decides: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A server that counts a play as soon as it starts.
    pub fn server_decides() -> Self {
        Self {
            client_decides: false,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<ServerCall> {
        self.calls.lock().clone()
    }

    /// Only the `Ended` reports, as `(id, submission)`.
    pub fn ended(&self) -> Vec<(String, bool)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                ServerCall::Ended { id, submission, .. } => Some((id.clone(), *submission)),
                ServerCall::Began(_) => None,
            })
            .collect()
    }
}

impl Default for MockServer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaServer for MockServer {
    fn stream_url(
        &self,
        track_id: &str,
        transcode: Option<&TranscodeSettings>,
        force_raw: bool,
    ) -> Result<String, ServerError> {
        if track_id.is_empty() {
            return Err(ServerError::InvalidUrl("empty track id".to_string()));
        }
        let mut url = format!("mock://stream/{track_id}");
        if force_raw {
            url.push_str("?format=raw");
        } else if let Some(t) = transcode {
            url.push_str(&format!("?format={}", t.codec));
        }
        Ok(url)
    }

    fn client_decides_scrobble(&self) -> bool {
        self.client_decides
    }

    async fn track_began_playback(&self, track_id: &str) -> Result<(), ServerError> {
        self.calls.lock().push(ServerCall::Began(track_id.to_string()));
        Ok(())
    }

    async fn track_ended_playback(
        &self,
        track_id: &str,
        position_secs: u32,
        submission: bool,
    ) -> Result<(), ServerError> {
        self.calls.lock().push(ServerCall::Ended {
            id: track_id.to_string(),
            position_secs,
            submission,
        });
        Ok(())
    }
}

// ============================================================================
// Cache
// ============================================================================

/// Cache that records requests and serves whatever was marked cached.
#[derive(Default)]
pub struct MockCache {
    cached: Mutex<HashMap<String, PathBuf>>,
    file_requests: Mutex<Vec<(String, String)>>,
    keep_requests: Mutex<Vec<(String, Vec<String>)>>,
}

impl MockCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_cached(&self, id: &str, path: impl Into<PathBuf>) {
        self.cached.lock().insert(id.to_string(), path.into());
    }

    /// `(id, url)` of every `cache_file` call.
    pub fn file_requests(&self) -> Vec<(String, String)> {
        self.file_requests.lock().clone()
    }

    /// `(keep_id, fetch_ids)` of the latest `cache_only` call.
    pub fn last_keep(&self) -> Option<(String, Vec<String>)> {
        self.keep_requests.lock().last().cloned()
    }
}

impl AudioCache for MockCache {
    fn cache_file(&self, id: &str, url: &str) {
        self.file_requests
            .lock()
            .push((id.to_string(), url.to_string()));
    }

    fn cache_only(&self, keep_id: &str, fetch: Vec<CacheRequest>) {
        let ids = fetch.into_iter().map(|r| r.id).collect();
        self.keep_requests.lock().push((keep_id.to_string(), ids));
    }

    fn path_for_cached_file(&self, id: &str) -> Option<PathBuf> {
        self.cached.lock().get(id).cloned()
    }
}
