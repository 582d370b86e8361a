//! Client-side playback engine.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 PlaybackManager (any thread)                    │
//! │       UI calls are queued and coalesced in a CommandQueue       │
//! └────────────────────────────┬────────────────────────────────────┘
//!                              │ EngineInput::Wake
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Driver thread (single writer)                  │
//! │   PlaybackEngine: queue, cursor, shuffle/loop, scrobbling       │
//! └───────┬─────────────────────▲───────────────────────▲───────────┘
//!         │ BasePlayer calls    │ EngineInput::Player   │ EngineInput::Tick
//!         ▼                     │                       │
//! ┌──────────────────────────────────────┐   ┌──────────────────────┐
//! │     Audio backend (opaque)           │   │  PollHandle thread   │
//! └──────────────────────────────────────┘   └──────────────────────┘
//! ```
//!
//! Everything that mutates the engine arrives on one crossbeam channel, so
//! backend events, poll ticks and user commands are applied one at a time
//! in arrival order.

pub mod backend;
pub mod commands;
pub mod engine;
pub mod events;
pub mod manager;
mod poll;
pub mod queue;
pub mod stopwatch;

pub use backend::{
    BasePlayer, NextFile, PlayerEvent, PlayerEventSink, PlayerState, PlayerStatus,
    ReplayGainMode, ReplayGainOptions, ReplayGainPlayer, TrackPlayer, UrlPlayer,
};
pub use commands::{CommandKind, CommandQueue, PlaybackCommand};
pub use engine::{EngineError, EngineInput, PlaybackEngine, PlaybackEngineBuilder, PlaybackStatus};
pub use events::{EngineEvent, EventMask, EventSuppression};
pub use manager::PlaybackManager;
pub use queue::{InsertMode, LoopMode, PlayQueue, ShuffleInsertPolicy};
pub use stopwatch::{Clock, Stopwatch, SystemClock};

/// Player backend errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlayerError {
    #[error("Audio backend error: {0}")]
    Backend(String),

    #[error("Audio channel closed")]
    ChannelClosed,

    #[error("Unsupported by this backend: {0}")]
    Unsupported(String),
}
