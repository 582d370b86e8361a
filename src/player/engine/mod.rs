//! The playback engine.
//!
//! Owns the play queue and the now-playing cursor, decides what plays next
//! under the current shuffle and loop settings, and keeps play counts and
//! scrobbles in step with what the backend actually played.
//!
//! The engine is a plain `&mut self` state machine. Backend events and poll
//! ticks arrive as [`EngineInput`] on a channel; whoever owns the engine
//! feeds them back through [`PlaybackEngine::handle_input`] or
//! [`PlaybackEngine::process_pending`]. [`PlaybackManager`] does this on a
//! dedicated thread.
//!
//! [`PlaybackManager`]: super::PlaybackManager

mod lifecycle;
mod queue_ops;
mod scrobble;
mod transport;


use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::runtime::Handle;

use super::PlayerError;
use super::backend::{
    BasePlayer, NextFile, PlayerEvent, PlayerEventSink, PlayerState, ReplayGainOptions,
    has_playback_capability,
};
use super::events::{EngineEvent, EventBus, EventMask, EventSuppression};
use super::poll::PollHandle;
use super::queue::{LoopMode, PlayQueue};
use super::stopwatch::{Clock, Stopwatch, SystemClock};
use crate::cache::{AudioCache, CacheRequest};
use crate::config::{Config, PlaybackConfig, ReplayGainConfig, ScrobbleConfig, TranscodingConfig};
use crate::model::{MediaItem, Track};
use crate::server::MediaServer;

/// Everything that can drive the engine forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineInput {
    /// Reported by the audio backend
    Player(PlayerEvent),
    /// Time-position poll
    Tick,
    /// Commands are waiting in the manager's queue
    Wake,
    /// The driver should exit
    Shutdown,
}

/// Engine errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("track index ({index}) out of range (0-{len})")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("no stream URL for {0}")]
    NoStreamUrl(String),

    #[error("cannot play non-track item {0} with a track player")]
    NonTrackItem(String),

    #[error("player supports neither URL nor track playback")]
    UnsupportedPlayer,

    #[error("no tokio runtime available for background work")]
    NoRuntime,

    #[error(transparent)]
    Player(#[from] PlayerError),
}

/// Snapshot of playback for display.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlaybackStatus {
    pub state: PlayerState,
    pub time_pos: f64,
    /// Known duration of the current item
    pub duration: f64,
    pub playlist_pos: Option<usize>,
}

/// The playback engine.
pub struct PlaybackEngine {
    player: Box<dyn BasePlayer>,
    server: Arc<dyn MediaServer>,
    cache: Option<Arc<dyn AudioCache>>,
    runtime: Handle,

    queue: PlayQueue,
    now_playing: Option<usize>,
    /// Latest index requested from the backend
    pending_track_change: Option<usize>,
    /// TrackChanged events still owed for requests; each adopts the latest one
    pending_change_events: usize,
    /// TrackChanged events owed for requests a stop cancelled; ignored
    cancelled_change_events: usize,
    loop_mode: LoopMode,
    is_radio: bool,
    pause_after_current: bool,

    /// True until the first TrackChanged after a stop
    was_stopped: bool,
    /// The outgoing track was already scrobbled before the backend moved on
    already_scrobbled: bool,
    /// The backend's gapless slot must be refreshed near the end of the track
    need_to_set_next_track: bool,
    /// Status of the old backend while switching players
    pending_player_change: Option<super::PlayerStatus>,

    cur_track_duration: f64,
    /// High-water mark of the play position, cleared by each scrobble check
    latest_track_position: f64,
    play_time: Stopwatch,
    last_scrobbled: Option<Track>,

    rng: StdRng,
    events: EventBus,
    poller: Option<PollHandle>,
    input_tx: Sender<EngineInput>,
    input_rx: Receiver<EngineInput>,

    playback_cfg: PlaybackConfig,
    scrobble_cfg: ScrobbleConfig,
    transcode_cfg: TranscodingConfig,
    replay_gain_cfg: ReplayGainConfig,
}

impl PlaybackEngine {
    /// Start building an engine around a backend and a server.
    pub fn builder(
        player: Box<dyn BasePlayer>,
        server: Arc<dyn MediaServer>,
    ) -> PlaybackEngineBuilder {
        PlaybackEngineBuilder::new(player, server)
    }

    // ------------------------------------------------------------------
    // Inputs
    // ------------------------------------------------------------------

    /// Apply one input.
    pub fn handle_input(&mut self, input: EngineInput) {
        match input {
            EngineInput::Player(event) => self.handle_player_event(event),
            EngineInput::Tick => self.handle_time_pos_update(false),
            EngineInput::Wake | EngineInput::Shutdown => {}
        }
    }

    /// Apply every input already waiting on the channel. Returns how many
    /// were handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(input) = self.input_rx.try_recv() {
            self.handle_input(input);
            handled += 1;
        }
        handled
    }

    /// Sender for inputs. The manager uses it to wake its driver.
    pub fn input_sender(&self) -> Sender<EngineInput> {
        self.input_tx.clone()
    }

    pub(crate) fn input_receiver(&self) -> Receiver<EngineInput> {
        self.input_rx.clone()
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Receive the events selected by `mask`. Drop the receiver to
    /// unsubscribe.
    pub fn subscribe(&mut self, mask: EventMask) -> Receiver<EngineEvent> {
        self.events.subscribe(mask)
    }

    /// Silence all events while the returned guard lives.
    pub fn suppress_events(&self) -> EventSuppression {
        self.events.suppress()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Copy of the queue in play order.
    pub fn play_queue(&self) -> Vec<MediaItem> {
        self.queue.to_vec()
    }

    pub fn play_queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn play_queue_item_at(&self, idx: usize) -> Option<&MediaItem> {
        self.queue.get(idx)
    }

    /// The item playing right now. `None` while the backend is stopped.
    pub fn now_playing(&self) -> Option<&MediaItem> {
        if self.player.status().state == PlayerState::Stopped {
            return None;
        }
        self.now_playing.and_then(|i| self.queue.get(i))
    }

    pub fn now_playing_index(&self) -> Option<usize> {
        self.now_playing
    }

    pub fn is_shuffled(&self) -> bool {
        self.queue.is_shuffled()
    }

    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    pub fn pause_after_current(&self) -> bool {
        self.pause_after_current
    }

    pub fn volume(&self) -> u8 {
        self.player.volume()
    }

    pub fn replay_gain_config(&self) -> &ReplayGainConfig {
        &self.replay_gain_cfg
    }

    pub fn is_seeking(&self) -> bool {
        self.player.is_seeking()
    }

    pub fn playback_status(&self) -> PlaybackStatus {
        let status = self
            .pending_player_change
            .unwrap_or_else(|| self.player.status());
        PlaybackStatus {
            state: status.state,
            time_pos: status.time_pos,
            duration: self.cur_track_duration,
            playlist_pos: self.now_playing,
        }
    }

    /// The active position that plays after the current one.
    pub fn next_playing_index(&self) -> Option<usize> {
        let len = self.queue.len();
        match self.loop_mode {
            LoopMode::One => self.now_playing,
            LoopMode::None => match self.now_playing {
                _ if len == 0 => None,
                None => Some(0),
                Some(i) if i + 1 >= len => None,
                Some(i) => Some(i + 1),
            },
            LoopMode::All => match self.now_playing {
                _ if len == 0 => None,
                None => Some(0),
                Some(i) if i + 1 >= len => Some(0),
                Some(i) => Some(i + 1),
            },
        }
    }

    // ------------------------------------------------------------------
    // Backend plumbing
    // ------------------------------------------------------------------

    /// Stream URL for any queue item; empty when it can't be resolved.
    fn media_url(&self, item: &MediaItem) -> String {
        match item {
            MediaItem::Track(track) => self.track_url(track),
            MediaItem::Radio(station) => station.stream_url.clone(),
        }
    }

    fn track_url(&self, track: &Track) -> String {
        let transcode = self.transcode_cfg.settings();
        match self.server.stream_url(
            &track.id,
            transcode.as_ref(),
            self.transcode_cfg.force_raw_file,
        ) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(target: "engine", id = %track.id, error = %e, "Failed to resolve stream URL");
                String::new()
            }
        }
    }

    fn cached_path(&self, item: &MediaItem) -> Option<String> {
        let (Some(cache), MediaItem::Track(track)) = (&self.cache, item) else {
            return None;
        };
        cache
            .path_for_cached_file(&track.id)
            .map(|p| p.to_string_lossy().into_owned())
    }

    /// Start playing the item at `idx` on the backend.
    fn set_track(&mut self, idx: usize, start_secs: f64) -> Result<(), EngineError> {
        let len = self.queue.len();
        let item = self
            .queue
            .get(idx)
            .cloned()
            .ok_or(EngineError::IndexOutOfRange {
                index: idx as i64,
                len,
            })?;
        let url = self.media_url(&item);

        if let (Some(cache), MediaItem::Track(track)) = (&self.cache, &item) {
            cache.cache_file(&track.id, &url);
        }
        let cached = self.cached_path(&item);

        if let Some(player) = self.player.as_url_player() {
            let url = cached.unwrap_or(url);
            if url.is_empty() {
                return Err(EngineError::NoStreamUrl(item.id().to_string()));
            }
            player.play_file(&url, &item.metadata(), start_secs)?;
            return Ok(());
        }
        if let Some(player) = self.player.as_track_player() {
            let MediaItem::Track(track) = &item else {
                return Err(EngineError::NonTrackItem(item.id().to_string()));
            };
            player.play_track(track, start_secs)?;
            return Ok(());
        }
        Err(EngineError::UnsupportedPlayer)
    }

    /// Start `idx` on the backend and remember the request, so the
    /// TrackChanged it produces moves the cursor there whatever the loop
    /// mode says.
    fn request_track(&mut self, idx: usize, start_secs: f64) -> Result<(), EngineError> {
        self.set_track(idx, start_secs)?;
        self.pending_track_change = Some(idx);
        self.pending_change_events += 1;
        Ok(())
    }

    /// Forget the outstanding track request. Confirmations still on their
    /// way are ignored until the backend reports a stop.
    fn cancel_track_requests(&mut self) {
        self.cancelled_change_events += self.pending_change_events;
        self.pending_change_events = 0;
        self.pending_track_change = None;
    }

    /// Follow the outstanding request through a queue edit. `remap` maps an
    /// old active position to its new one, or `None` if the item is gone.
    fn remap_track_request(&mut self, remap: impl Fn(usize) -> Option<usize>) {
        if let Some(idx) = self.pending_track_change {
            self.pending_track_change = remap(idx);
        }
    }

    /// Stop the backend, cancelling any unconfirmed track request.
    fn stop_player(&mut self) -> Result<(), PlayerError> {
        if self.player.status().state == PlayerState::Stopped {
            // Nothing is loading, so nothing will be confirmed
            self.pending_change_events = 0;
            self.pending_track_change = None;
        } else {
            self.cancel_track_requests();
        }
        self.player.stop()
    }

    /// Prime (or clear) the backend's gapless slot.
    fn set_next_track(&mut self, idx: Option<usize>) -> Result<(), EngineError> {
        let item = idx.and_then(|i| self.queue.get(i)).cloned();
        let url = item.as_ref().map(|it| self.media_url(it)).unwrap_or_default();
        let cached = item.as_ref().and_then(|it| self.cached_path(it));

        if let Some(player) = self.player.as_url_player() {
            let next = match item {
                Some(item) => {
                    let url = cached.unwrap_or(url);
                    if url.is_empty() {
                        return Err(EngineError::NoStreamUrl(item.id().to_string()));
                    }
                    Some(NextFile {
                        url,
                        metadata: item.metadata(),
                    })
                }
                None => None,
            };
            player.set_next_file(next)?;
            return Ok(());
        }
        if let Some(player) = self.player.as_track_player() {
            let track = match &item {
                Some(MediaItem::Track(track)) => Some(track),
                Some(other) => return Err(EngineError::NonTrackItem(other.id().to_string())),
                None => None,
            };
            player.set_next_track(track)?;
            return Ok(());
        }
        Err(EngineError::UnsupportedPlayer)
    }

    /// The item after the current one changed: refresh the cache window,
    /// flag the gapless slot for update and tell observers.
    fn on_next_track_updated(&mut self) {
        self.cache_next_tracks();
        self.need_to_set_next_track = true;
        let next = self
            .next_playing_index()
            .and_then(|i| self.queue.get(i))
            .cloned();
        self.events.emit(EngineEvent::NextItemChanged(next));
    }

    /// Keep the current track and prefetch the two after it.
    fn cache_next_tracks(&self) {
        let Some(cache) = &self.cache else {
            return;
        };
        let start = self.now_playing.unwrap_or(0);
        let len = self.queue.len();
        let fetch: Vec<CacheRequest> = (start..start + 3)
            .filter(|&i| i > 0 && i < len)
            .filter_map(|i| match self.queue.get(i) {
                Some(MediaItem::Track(track)) => {
                    Some(CacheRequest::new(track.id.clone(), self.track_url(track)))
                }
                _ => None,
            })
            .collect();
        let keep = self
            .now_playing()
            .map(|item| item.id().to_string())
            .unwrap_or_default();
        cache.cache_only(&keep, fetch);
    }

    fn start_poll(&mut self) {
        if self.poller.is_some() {
            return;
        }
        let interval = if self.playback_cfg.use_waveform_seekbar {
            super::poll::FAST_POLL_INTERVAL
        } else {
            super::poll::POLL_INTERVAL
        };
        match PollHandle::spawn(interval, self.input_tx.clone()) {
            Ok(handle) => self.poller = Some(handle),
            Err(e) => tracing::warn!(target: "engine", error = %e, "Failed to start position poller"),
        }
    }

    fn stop_poll(&mut self) {
        if let Some(mut poller) = self.poller.take() {
            poller.stop();
        }
    }

    fn is_on_last_item(&self) -> bool {
        self.now_playing.map_or(-1, |i| i as i64) == self.queue.len() as i64 - 1
    }

    /// Stop background work and the backend.
    pub fn shutdown(&mut self) {
        self.stop_poll();
        if let Err(e) = self.player.stop() {
            tracing::warn!(target: "engine", error = %e, "Failed to stop player on shutdown");
        }
        self.player.set_event_sink(None);
    }
}

fn replay_gain_options(cfg: &ReplayGainConfig) -> ReplayGainOptions {
    ReplayGainOptions {
        mode: cfg.mode.into(),
        preamp_gain_db: cfg.preamp_gain_db,
        prevent_clipping: cfg.prevent_clipping,
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop_poll();
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for configuring a [`PlaybackEngine`]
pub struct PlaybackEngineBuilder {
    player: Box<dyn BasePlayer>,
    server: Arc<dyn MediaServer>,
    cache: Option<Arc<dyn AudioCache>>,
    runtime: Option<Handle>,
    rng: Option<StdRng>,
    clock: Option<Arc<dyn Clock>>,
    playback: PlaybackConfig,
    scrobbling: ScrobbleConfig,
    transcoding: TranscodingConfig,
    replay_gain: ReplayGainConfig,
}

impl PlaybackEngineBuilder {
    pub fn new(player: Box<dyn BasePlayer>, server: Arc<dyn MediaServer>) -> Self {
        Self {
            player,
            server,
            cache: None,
            runtime: None,
            rng: None,
            clock: None,
            playback: PlaybackConfig::default(),
            scrobbling: ScrobbleConfig::default(),
            transcoding: TranscodingConfig::default(),
            replay_gain: ReplayGainConfig::default(),
        }
    }

    /// Use a local audio cache
    pub fn cache(mut self, cache: Arc<dyn AudioCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Runtime for scrobble requests (default: the current one)
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Random source for shuffling
    pub fn rng(mut self, rng: StdRng) -> Self {
        self.rng = Some(rng);
        self
    }

    /// Clock for the listening-time stopwatch
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Take every engine-related section from the app config
    pub fn config(mut self, config: &Config) -> Self {
        self.playback = config.playback.clone();
        self.scrobbling = config.scrobbling.clone();
        self.transcoding = config.transcoding.clone();
        self.replay_gain = config.replay_gain.clone();
        self
    }

    pub fn playback(mut self, playback: PlaybackConfig) -> Self {
        self.playback = playback;
        self
    }

    pub fn scrobbling(mut self, scrobbling: ScrobbleConfig) -> Self {
        self.scrobbling = scrobbling;
        self
    }

    pub fn transcoding(mut self, transcoding: TranscodingConfig) -> Self {
        self.transcoding = transcoding;
        self
    }

    pub fn replay_gain(mut self, replay_gain: ReplayGainConfig) -> Self {
        self.replay_gain = replay_gain;
        self
    }

    /// Build the engine
    ///
    /// Fails if the backend can't play anything or no runtime is available.
    pub fn build(self) -> Result<PlaybackEngine, EngineError> {
        let mut player = self.player;
        if !has_playback_capability(player.as_mut()) {
            return Err(EngineError::UnsupportedPlayer);
        }
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| EngineError::NoRuntime)?,
        };

        let (input_tx, input_rx) = unbounded();
        player.set_event_sink(Some(PlayerEventSink::new(input_tx.clone())));

        if let Err(e) = player.set_volume(self.playback.volume.min(100)) {
            tracing::warn!(target: "engine", error = %e, "Failed to set initial volume");
        }

        let mut scrobbling = self.scrobbling;
        // 100% can be missed to rounding at the very end of a track
        scrobbling.threshold_percent = scrobbling.threshold_percent.min(99);

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let rng = self.rng.unwrap_or_else(StdRng::from_os_rng);

        let mut engine = PlaybackEngine {
            player,
            server: self.server,
            cache: self.cache,
            runtime,
            queue: PlayQueue::with_policy(self.playback.shuffle_insert_policy),
            now_playing: None,
            pending_track_change: None,
            pending_change_events: 0,
            cancelled_change_events: 0,
            loop_mode: self.playback.repeat_mode,
            is_radio: false,
            pause_after_current: false,
            was_stopped: true,
            already_scrobbled: false,
            need_to_set_next_track: false,
            pending_player_change: None,
            cur_track_duration: 0.0,
            latest_track_position: 0.0,
            play_time: Stopwatch::new(clock),
            last_scrobbled: None,
            rng,
            events: EventBus::new(),
            poller: None,
            input_tx,
            input_rx,
            playback_cfg: self.playback,
            scrobble_cfg: scrobbling,
            transcode_cfg: self.transcoding,
            replay_gain_cfg: self.replay_gain,
        };

        let options = replay_gain_options(&engine.replay_gain_cfg);
        if let Some(rg) = engine.player.as_replay_gain()
            && let Err(e) = rg.set_replay_gain_options(options)
        {
            tracing::warn!(target: "engine", error = %e, "Failed to apply ReplayGain settings");
        }

        Ok(engine)
    }
}
