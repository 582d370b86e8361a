//! Coalescing queue of playback commands.
//!
//! UI actions can arrive faster than the backend reacts. Commands wait here
//! until the manager's driver thread gets to them, and redundant ones are
//! folded together on the way in: five volume drags become one volume
//! change, three taps on "next" become a single skip of three.

use std::collections::VecDeque;

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use super::engine::EngineInput;
use super::queue::{InsertMode, LoopMode};
use crate::model::{MediaItem, RadioStation};

/// A request for the engine, applied on the driver thread.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackCommand {
    Stop,
    Continue,
    Pause,
    PlayTrackAt(usize),
    SeekSeconds(f64),
    /// Move this many items forward, or back when negative
    SeekFwdBackN(i64),
    Volume(i32),
    LoopMode(LoopMode),
    Shuffle(bool),
    StopAndClear,
    UpdatePlayQueue(Vec<MediaItem>),
    RemoveTracks(Vec<usize>),
    LoadItems {
        items: Vec<MediaItem>,
        mode: InsertMode,
        shuffle: bool,
    },
    LoadRadioStation {
        station: RadioStation,
        mode: InsertMode,
    },
}

/// Discriminant of a [`PlaybackCommand`], used for coalescing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Stop,
    Continue,
    Pause,
    PlayTrackAt,
    SeekSeconds,
    SeekFwdBackN,
    Volume,
    LoopMode,
    Shuffle,
    StopAndClear,
    UpdatePlayQueue,
    RemoveTracks,
    LoadItems,
    LoadRadioStation,
}

const TRANSPORT: &[CommandKind] = &[CommandKind::Continue, CommandKind::Pause, CommandKind::Stop];

impl PlaybackCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Stop => CommandKind::Stop,
            Self::Continue => CommandKind::Continue,
            Self::Pause => CommandKind::Pause,
            Self::PlayTrackAt(_) => CommandKind::PlayTrackAt,
            Self::SeekSeconds(_) => CommandKind::SeekSeconds,
            Self::SeekFwdBackN(_) => CommandKind::SeekFwdBackN,
            Self::Volume(_) => CommandKind::Volume,
            Self::LoopMode(_) => CommandKind::LoopMode,
            Self::Shuffle(_) => CommandKind::Shuffle,
            Self::StopAndClear => CommandKind::StopAndClear,
            Self::UpdatePlayQueue(_) => CommandKind::UpdatePlayQueue,
            Self::RemoveTracks(_) => CommandKind::RemoveTracks,
            Self::LoadItems { .. } => CommandKind::LoadItems,
            Self::LoadRadioStation { .. } => CommandKind::LoadRadioStation,
        }
    }
}

impl CommandKind {
    /// Commands that change the queue layout. Relative skips queued before
    /// one of these can't be merged with skips queued after it.
    fn modifies_queue(self) -> bool {
        matches!(
            self,
            Self::RemoveTracks
                | Self::LoadItems
                | Self::PlayTrackAt
                | Self::LoadRadioStation
                | Self::UpdatePlayQueue
                | Self::StopAndClear
        )
    }
}

/// Pending commands, shared between callers and the driver thread.
pub struct CommandQueue {
    pending: Mutex<VecDeque<PlaybackCommand>>,
    wake: Sender<EngineInput>,
}

impl CommandQueue {
    /// `wake` receives an [`EngineInput::Wake`] after every enqueue.
    pub fn new(wake: Sender<EngineInput>) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            wake,
        }
    }

    pub fn stop(&self) {
        self.replace_kinds(TRANSPORT, PlaybackCommand::Stop);
    }

    pub fn continue_playback(&self) {
        self.replace_kinds(TRANSPORT, PlaybackCommand::Continue);
    }

    pub fn pause(&self) {
        self.replace_kinds(TRANSPORT, PlaybackCommand::Pause);
    }

    pub fn play_track_at(&self, idx: usize) {
        self.replace_kinds(
            &[
                CommandKind::Continue,
                CommandKind::Pause,
                CommandKind::Stop,
                CommandKind::PlayTrackAt,
            ],
            PlaybackCommand::PlayTrackAt(idx),
        );
    }

    pub fn stop_and_clear(&self) {
        self.replace_kinds(
            &[
                CommandKind::Continue,
                CommandKind::Pause,
                CommandKind::Stop,
                CommandKind::StopAndClear,
            ],
            PlaybackCommand::StopAndClear,
        );
    }

    pub fn set_volume(&self, volume: i32) {
        self.replace_same_kind(PlaybackCommand::Volume(volume));
    }

    pub fn set_loop_mode(&self, mode: LoopMode) {
        self.replace_same_kind(PlaybackCommand::LoopMode(mode));
    }

    pub fn set_shuffle(&self, shuffle: bool) {
        self.replace_same_kind(PlaybackCommand::Shuffle(shuffle));
    }

    pub fn seek_seconds(&self, secs: f64) {
        self.replace_same_kind(PlaybackCommand::SeekSeconds(secs));
    }

    pub fn update_play_queue(&self, items: Vec<MediaItem>) {
        self.replace_same_kind(PlaybackCommand::UpdatePlayQueue(items));
    }

    pub fn seek_next(&self) {
        self.seek_relative(1);
    }

    pub fn seek_back_or_previous(&self) {
        self.seek_relative(-1);
    }

    pub fn remove_tracks(&self, idxs: Vec<usize>) {
        self.push(PlaybackCommand::RemoveTracks(idxs));
    }

    pub fn load_items(&self, items: Vec<MediaItem>, mode: InsertMode, shuffle: bool) {
        self.push(PlaybackCommand::LoadItems {
            items,
            mode,
            shuffle,
        });
    }

    pub fn load_radio_station(&self, station: RadioStation, mode: InsertMode) {
        self.push(PlaybackCommand::LoadRadioStation { station, mode });
    }

    /// Take the oldest pending command.
    pub fn pop(&self) -> Option<PlaybackCommand> {
        self.pending.lock().pop_front()
    }

    /// Take every pending command, oldest first.
    pub fn drain(&self) -> Vec<PlaybackCommand> {
        self.pending.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Copy of the pending commands, oldest first.
    pub fn snapshot(&self) -> Vec<PlaybackCommand> {
        self.pending.lock().iter().cloned().collect()
    }

    // ------------------------------------------------------------------
    // Coalescing
    // ------------------------------------------------------------------

    fn push(&self, command: PlaybackCommand) {
        self.pending.lock().push_back(command);
        self.notify();
    }

    fn replace_same_kind(&self, command: PlaybackCommand) {
        let kind = command.kind();
        self.replace_kinds(&[kind], command);
    }

    /// Drop every queued command of the given kinds, then append `command`.
    fn replace_kinds(&self, kinds: &[CommandKind], command: PlaybackCommand) {
        {
            let mut pending = self.pending.lock();
            pending.retain(|queued| !kinds.contains(&queued.kind()));
            pending.push_back(command);
        }
        self.notify();
    }

    /// Fold a relative skip into the skips already queued since the last
    /// queue-modifying command.
    fn seek_relative(&self, direction: i64) {
        {
            let mut pending = self.pending.lock();

            let mut first_mergeable = None;
            for (i, queued) in pending.iter().enumerate().rev() {
                let kind = queued.kind();
                if kind.modifies_queue() {
                    break;
                }
                if kind == CommandKind::SeekFwdBackN {
                    first_mergeable = Some(i);
                }
            }

            let mut n = direction;
            if let Some(start) = first_mergeable {
                let tail: Vec<PlaybackCommand> = pending.drain(start..).collect();
                for queued in tail {
                    match queued {
                        PlaybackCommand::SeekFwdBackN(m) => n += m,
                        other => pending.push_back(other),
                    }
                }
            }
            pending.push_back(PlaybackCommand::SeekFwdBackN(n));
        }
        self.notify();
    }

    fn notify(&self) {
        if self.wake.send(EngineInput::Wake).is_err() {
            tracing::debug!(target: "manager", "Command queued after the driver exited");
        }
    }
}
