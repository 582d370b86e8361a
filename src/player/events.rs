//! Engine change notifications.
//!
//! Observers call [`EventBus::subscribe`] with a mask of the event kinds
//! they care about and get a channel back. Events are delivered in the order
//! the engine emits them. Dropping the receiver unsubscribes.

use super::queue::LoopMode;
use crate::model::{MediaItem, Track};
use bitflags::bitflags;
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Something observable changed in the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The now-playing item changed (`None` once playback stops).
    /// `last_scrobbled` is the track that was just counted as played, if any.
    SongChanged {
        now_playing: Option<MediaItem>,
        last_scrobbled: Option<Track>,
    },
    QueueChanged,
    LoopModeChanged(LoopMode),
    VolumeChanged(u8),
    Stopped,
    Playing,
    Paused,
    Seeked,
    PlayTimeUpdate {
        pos: f64,
        duration: f64,
        seeked: bool,
    },
    /// The item that will play after the current one changed
    NextItemChanged(Option<MediaItem>),
}

bitflags! {
    /// Event kinds a subscriber wants.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EventMask: u16 {
        const SONG_CHANGED = 1 << 0;
        const QUEUE_CHANGED = 1 << 1;
        const LOOP_MODE_CHANGED = 1 << 2;
        const VOLUME_CHANGED = 1 << 3;
        const STOPPED = 1 << 4;
        const PLAYING = 1 << 5;
        const PAUSED = 1 << 6;
        const SEEKED = 1 << 7;
        const PLAY_TIME_UPDATE = 1 << 8;
        const NEXT_ITEM_CHANGED = 1 << 9;

        const TRANSPORT = Self::STOPPED.bits() | Self::PLAYING.bits() | Self::PAUSED.bits();
    }
}

impl EngineEvent {
    /// The mask bit this event is filtered by.
    pub fn mask(&self) -> EventMask {
        match self {
            Self::SongChanged { .. } => EventMask::SONG_CHANGED,
            Self::QueueChanged => EventMask::QUEUE_CHANGED,
            Self::LoopModeChanged(_) => EventMask::LOOP_MODE_CHANGED,
            Self::VolumeChanged(_) => EventMask::VOLUME_CHANGED,
            Self::Stopped => EventMask::STOPPED,
            Self::Playing => EventMask::PLAYING,
            Self::Paused => EventMask::PAUSED,
            Self::Seeked => EventMask::SEEKED,
            Self::PlayTimeUpdate { .. } => EventMask::PLAY_TIME_UPDATE,
            Self::NextItemChanged(_) => EventMask::NEXT_ITEM_CHANGED,
        }
    }
}

struct Subscriber {
    mask: EventMask,
    tx: Sender<EngineEvent>,
}

/// Fan-out of engine events to subscribers.
#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Subscriber>,
    suppressed: Arc<AtomicUsize>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, mask: EventMask) -> Receiver<EngineEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(Subscriber { mask, tx });
        rx
    }

    /// Deliver an event unless suppressed. Subscribers whose receiver is
    /// gone are dropped.
    pub fn emit(&mut self, event: EngineEvent) {
        if self.is_suppressed() {
            return;
        }
        let kind = event.mask();
        self.subscribers
            .retain(|sub| !sub.mask.contains(kind) || sub.tx.send(event.clone()).is_ok());
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed.load(Ordering::Acquire) > 0
    }

    /// Silence all events until the returned guard is dropped.
    pub fn suppress(&self) -> EventSuppression {
        self.suppressed.fetch_add(1, Ordering::AcqRel);
        EventSuppression {
            counter: Arc::clone(&self.suppressed),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

/// Scoped event suppression. Guards nest; events resume when the last one
/// is dropped.
#[must_use = "events are only suppressed while the guard is alive"]
pub struct EventSuppression {
    counter: Arc<AtomicUsize>,
}

impl Drop for EventSuppression {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_filters_events() {
        let mut bus = EventBus::new();
        let queue_rx = bus.subscribe(EventMask::QUEUE_CHANGED);
        let all_rx = bus.subscribe(EventMask::all());

        bus.emit(EngineEvent::Paused);
        bus.emit(EngineEvent::QueueChanged);

        assert_eq!(queue_rx.try_iter().collect::<Vec<_>>(), vec![EngineEvent::QueueChanged]);
        assert_eq!(
            all_rx.try_iter().collect::<Vec<_>>(),
            vec![EngineEvent::Paused, EngineEvent::QueueChanged]
        );
    }

    #[test]
    fn test_suppression_guard_nests() {
        let mut bus = EventBus::new();
        let rx = bus.subscribe(EventMask::all());

        let outer = bus.suppress();
        {
            let _inner = bus.suppress();
            bus.emit(EngineEvent::Stopped);
        }
        bus.emit(EngineEvent::Stopped);
        assert!(rx.try_recv().is_err());

        drop(outer);
        bus.emit(EngineEvent::Playing);
        assert_eq!(rx.try_recv().ok(), Some(EngineEvent::Playing));
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let mut bus = EventBus::new();
        let rx = bus.subscribe(EventMask::all());
        let _keep = bus.subscribe(EventMask::all());
        drop(rx);

        bus.emit(EngineEvent::QueueChanged);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_transport_mask() {
        assert!(EventMask::TRANSPORT.contains(EngineEvent::Paused.mask()));
        assert!(!EventMask::TRANSPORT.contains(EngineEvent::Seeked.mask()));
    }
}
