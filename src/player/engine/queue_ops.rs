//! Queue mutations: loading, inserting, removing, replacing, shuffling.
//!
//! Items handed to the engine are owned by it from then on. Play counts,
//! favorites and ratings are tracked on those copies.

use std::collections::BTreeSet;

use rand::seq::SliceRandom;

use super::{EngineError, PlaybackEngine};
use crate::model::{MediaItem, RadioStation, Track};
use crate::player::events::EngineEvent;
use crate::player::queue::InsertMode;

impl PlaybackEngine {
    /// Add items to the queue.
    ///
    /// `Replace` stops playback first. With `shuffle` (or while the queue
    /// is shuffled) the batch is shuffled before it goes in.
    pub fn load_items(&mut self, items: Vec<MediaItem>, mode: InsertMode, shuffle: bool) {
        if mode == InsertMode::Replace {
            self.stop_for_replace();
        }
        let next_changed = !items.is_empty() && (mode != InsertMode::Append || self.is_on_last_item());

        let mut items = items;
        if shuffle || self.queue.is_shuffled() {
            items.shuffle(&mut self.rng);
        }

        let count = items.len();
        match mode {
            InsertMode::InsertNext => {
                let at = self.now_playing.map_or(0, |i| i + 1);
                self.queue.insert_at(at, items);
                self.remap_track_request(|p| Some(if p >= at { p + count } else { p }));
            }
            InsertMode::Append | InsertMode::Replace => self.queue.append(items),
        }
        tracing::debug!(target: "engine::queue", ?mode, count, "Loaded items");

        self.events.emit(EngineEvent::QueueChanged);
        if next_changed {
            self.on_next_track_updated();
        }
    }

    pub fn load_tracks(&mut self, tracks: Vec<Track>, mode: InsertMode, shuffle: bool) {
        self.load_items(tracks.into_iter().map(MediaItem::from).collect(), mode, shuffle);
    }

    /// Add a radio station. It is never shuffled into the queue: "play
    /// next" keeps it right after the current item in both orders.
    pub fn load_radio_station(&mut self, station: RadioStation, mode: InsertMode) {
        if mode == InsertMode::Replace {
            self.stop_for_replace();
        }
        let next_changed = mode == InsertMode::InsertNext
            || (mode == InsertMode::Append && self.is_on_last_item());

        let item = MediaItem::from(station);
        match mode {
            InsertMode::InsertNext => {
                let at = self.now_playing.map_or(0, |i| i + 1);
                self.queue.insert_pinned_at(at, vec![item]);
                self.remap_track_request(|p| Some(if p >= at { p + 1 } else { p }));
            }
            InsertMode::Append | InsertMode::Replace => self.queue.append(vec![item]),
        }

        self.events.emit(EngineEvent::QueueChanged);
        if next_changed {
            self.on_next_track_updated();
        }
    }

    /// Splice items into the play order at `idx` (clamped to the end).
    pub fn insert_items_at(&mut self, items: Vec<MediaItem>, idx: usize) {
        let count = items.len();
        if count == 0 {
            return;
        }
        let idx = idx.min(self.queue.len());
        self.queue.insert_at(idx, items);
        self.remap_track_request(|p| Some(if p >= idx { p + count } else { p }));

        if let Some(cursor) = self.now_playing {
            if idx <= cursor {
                self.now_playing = Some(cursor + count);
            } else if idx == cursor + 1 {
                self.on_next_track_updated();
            }
        }
        self.events.emit(EngineEvent::QueueChanged);
    }

    /// Remove the items at the given positions.
    ///
    /// Removing the playing item (or the one the backend was asked to
    /// play) moves playback to whatever takes its place, or stops if it
    /// was the last one.
    pub fn remove_tracks_from_queue(&mut self, idxs: &[usize]) {
        let len = self.queue.len();
        let doomed: BTreeSet<usize> = idxs.iter().copied().filter(|&i| i < len).collect();
        if doomed.is_empty() {
            return;
        }
        let shift = |i: usize| (!doomed.contains(&i)).then(|| i - doomed.range(..i).count());

        let cursor = self.now_playing;
        let requested = self.pending_track_change;
        let current = requested.or(cursor);
        let current_removed = current.is_some_and(|c| doomed.contains(&c));
        let next_removed = !current_removed && cursor.is_some_and(|c| doomed.contains(&(c + 1)));

        if current_removed && requested.is_none() {
            // Scrobble against the queue as it was
            self.check_scrobble();
            self.already_scrobbled = true;
        }

        let positions: Vec<usize> = doomed.iter().copied().collect();
        self.queue.remove(&positions);
        self.now_playing = cursor.and_then(&shift);
        self.remap_track_request(&shift);
        tracing::debug!(target: "engine::queue", count = positions.len(), "Removed items");

        if let Some(current) = current.filter(|_| current_removed) {
            let slot = current - doomed.range(..current).count();
            if slot < self.queue.len() {
                if requested.is_none() {
                    self.now_playing = Some(slot);
                }
                // Whatever slid into the slot plays next, regardless of loop mode
                if let Err(e) = self.request_track(slot, 0.0) {
                    tracing::warn!(target: "engine", error = %e, "Failed to play replacement track");
                }
            } else {
                self.now_playing = None;
                if let Err(e) = self.stop_player() {
                    tracing::warn!(target: "engine", error = %e, "Failed to stop player");
                }
            }
        } else if next_removed {
            if self.next_playing_index().is_some() {
                self.on_next_track_updated();
            } else if let Err(e) = self.set_next_track(None) {
                tracing::warn!(target: "engine", error = %e, "Failed to clear next track");
            }
        }

        self.events.emit(EngineEvent::QueueChanged);
    }

    /// Replace the queue, keeping playback going if the playing item (or
    /// the one the backend was asked to play) is still in it.
    pub fn update_play_queue(&mut self, items: Vec<MediaItem>) -> Result<(), EngineError> {
        let position_in_new = |idx: Option<usize>| {
            let id = idx.and_then(|i| self.queue.get(i))?.id();
            items.iter().position(|item| item.id() == id)
        };
        let new_cursor = position_in_new(self.now_playing);
        let new_request = position_in_new(self.pending_track_change);

        let playing_gone = match self.pending_track_change {
            Some(_) => new_request.is_none(),
            None => self.now_playing.is_some() && new_cursor.is_none(),
        };
        if playing_gone && self.pending_track_change.is_none() {
            self.check_scrobble();
            self.already_scrobbled = true;
        }

        self.queue.replace(items);
        self.now_playing = new_cursor;
        self.pending_track_change = new_request;

        if playing_gone {
            self.now_playing = None;
            self.events.emit(EngineEvent::QueueChanged);
            return self.stop();
        }
        if self.now_playing.is_some() {
            self.on_next_track_updated();
        }
        self.events.emit(EngineEvent::QueueChanged);
        Ok(())
    }

    /// Stop playback and empty the queue.
    pub fn stop_and_clear_play_queue(&mut self) {
        let changed = !self.queue.is_empty();
        if let Err(e) = self.stop_player() {
            tracing::warn!(target: "engine", error = %e, "Failed to stop player");
        }
        self.queue.clear();
        self.now_playing = None;
        if changed {
            self.events.emit(EngineEvent::QueueChanged);
        }
    }

    /// Turn shuffle on or off. The playing item stays playing; when turning
    /// shuffle on it becomes the first item of the new order.
    pub fn set_shuffle(&mut self, shuffle: bool) {
        if self.queue.is_shuffled() == shuffle {
            return;
        }
        if let Some(cursor) = self.now_playing
            && cursor >= self.queue.len()
        {
            tracing::warn!(target: "engine::queue", cursor, len = self.queue.len(), "Cursor out of range, not changing shuffle");
            return;
        }

        // Positions change wholesale; carry the cursor and any outstanding
        // request over by canonical index
        let cursor = self.now_playing.and_then(|p| self.queue.canonical_index(p));
        let requested = self
            .pending_track_change
            .and_then(|p| self.queue.canonical_index(p));
        if shuffle {
            // Whatever the backend is heading for goes first
            let first = self.skip_origin();
            self.queue.shuffle(&mut self.rng, first);
        } else {
            self.queue.unshuffle(None);
        }
        self.now_playing = cursor.and_then(|c| self.queue.active_position(c));
        self.pending_track_change = requested.and_then(|c| self.queue.active_position(c));

        if self.now_playing.is_some() {
            self.on_next_track_updated();
        }
        self.events.emit(EngineEvent::QueueChanged);
    }

    /// Update every queued copy of a track after its favorite flag changed
    /// elsewhere.
    pub fn on_track_favorite_status_changed(&mut self, id: &str, favorite: bool) {
        for item in self.queue.items_with_id_mut(id) {
            if let Some(track) = item.as_track_mut() {
                track.favorite = favorite;
            }
        }
    }

    /// Update every queued copy of a track after its rating changed
    /// elsewhere.
    pub fn on_track_rating_changed(&mut self, id: &str, rating: u8) {
        for item in self.queue.items_with_id_mut(id) {
            if let Some(track) = item.as_track_mut() {
                track.rating = rating;
            }
        }
    }

    fn stop_for_replace(&mut self) {
        if let Err(e) = self.stop_player() {
            tracing::warn!(target: "engine", error = %e, "Failed to stop player");
        }
        self.now_playing = None;
        self.queue.clear();
    }
}
