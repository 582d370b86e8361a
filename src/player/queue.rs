//! Play queue management.
//!
//! The queue stores items once, in canonical (insertion) order. Shuffle is a
//! derived permutation over those items: `order[active_position]` gives the
//! canonical index. Every index the outside world sees is an *active*
//! position, translated through the permutation when shuffled, so the
//! shuffled and unshuffled views can never disagree on length or contents.

use crate::model::MediaItem;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Loop (repeat) mode for the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoopMode {
    #[default]
    None,
    /// Repeat entire queue
    All,
    /// Repeat current track
    One,
}

impl LoopMode {
    /// The next mode in the None -> All -> One cycle.
    pub fn cycled(self) -> Self {
        match self {
            Self::None => Self::All,
            Self::All => Self::One,
            Self::One => Self::None,
        }
    }
}

/// How a batch of items enters the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertMode {
    /// Stop playback and replace the whole queue
    Replace,
    /// Add after the last item
    Append,
    /// Add right after the now-playing item
    InsertNext,
}

/// Where "play next" items land in canonical order while shuffled.
///
/// In shuffle order they always land right after the current item. This
/// decides what happens when shuffle is turned off again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShuffleInsertPolicy {
    /// Also right after the current item in canonical order
    #[default]
    FollowCurrent,
    /// At the end of canonical order
    CanonicalEnd,
}

/// The play queue.
#[derive(Debug, Clone, Default)]
pub struct PlayQueue {
    /// All items in canonical order
    items: Vec<MediaItem>,
    /// Active position -> canonical index, present only while shuffled
    order: Option<Vec<usize>>,
    /// Canonical placement of mid-queue inserts while shuffled
    insert_policy: ShuffleInsertPolicy,
}

impl PlayQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(insert_policy: ShuffleInsertPolicy) -> Self {
        Self {
            insert_policy,
            ..Self::default()
        }
    }

    pub fn insert_policy(&self) -> ShuffleInsertPolicy {
        self.insert_policy
    }

    pub fn set_insert_policy(&mut self, policy: ShuffleInsertPolicy) {
        self.insert_policy = policy;
    }

    /// Check if queue is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get queue length.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_shuffled(&self) -> bool {
        self.order.is_some()
    }

    /// Translate an active position to its canonical index.
    pub fn canonical_index(&self, position: usize) -> Option<usize> {
        match &self.order {
            Some(order) => order.get(position).copied(),
            None => (position < self.items.len()).then_some(position),
        }
    }

    /// Translate a canonical index to its active position.
    pub fn active_position(&self, canonical: usize) -> Option<usize> {
        match &self.order {
            Some(order) => order.iter().position(|&c| c == canonical),
            None => (canonical < self.items.len()).then_some(canonical),
        }
    }

    /// Item at an active position.
    pub fn get(&self, position: usize) -> Option<&MediaItem> {
        self.canonical_index(position).and_then(|i| self.items.get(i))
    }

    pub fn get_mut(&mut self, position: usize) -> Option<&mut MediaItem> {
        self.canonical_index(position)
            .and_then(move |i| self.items.get_mut(i))
    }

    /// Iterate items in active order.
    pub fn iter(&self) -> impl Iterator<Item = &MediaItem> + '_ {
        (0..self.len()).filter_map(move |p| self.get(p))
    }

    /// Copy of the active view.
    pub fn to_vec(&self) -> Vec<MediaItem> {
        self.iter().cloned().collect()
    }

    /// Items in canonical order, regardless of shuffle.
    pub fn canonical(&self) -> &[MediaItem] {
        &self.items
    }

    /// Active position of the first item with this ID.
    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.iter().position(|item| item.id() == id)
    }

    /// Every stored copy with this ID (duplicates included).
    pub fn items_with_id_mut<'a>(
        &'a mut self,
        id: &'a str,
    ) -> impl Iterator<Item = &'a mut MediaItem> + 'a {
        self.items.iter_mut().filter(move |item| item.id() == id)
    }

    /// Clear the queue. Shuffle mode is kept; the permutation becomes empty.
    pub fn clear(&mut self) {
        self.items.clear();
        if let Some(order) = self.order.as_mut() {
            order.clear();
        }
    }

    /// Add items after the last one, in both orders.
    pub fn append(&mut self, batch: Vec<MediaItem>) {
        let start = self.items.len();
        let count = batch.len();
        self.items.extend(batch);
        if let Some(order) = self.order.as_mut() {
            order.extend(start..start + count);
        }
    }

    /// Insert items at an active position, using the configured shuffle
    /// insert policy for their canonical placement.
    pub fn insert_at(&mut self, position: usize, batch: Vec<MediaItem>) {
        self.insert_with(position, batch, self.insert_policy);
    }

    /// Insert items that must stay adjacent to their neighbour in both
    /// orders (radio stations).
    pub fn insert_pinned_at(&mut self, position: usize, batch: Vec<MediaItem>) {
        self.insert_with(position, batch, ShuffleInsertPolicy::FollowCurrent);
    }

    fn insert_with(&mut self, position: usize, batch: Vec<MediaItem>, policy: ShuffleInsertPolicy) {
        let position = position.min(self.len());
        let count = batch.len();
        if count == 0 {
            return;
        }

        match self.order.as_mut() {
            None => {
                self.items.splice(position..position, batch);
            }
            Some(order) => {
                let canonical = match policy {
                    ShuffleInsertPolicy::FollowCurrent if position == 0 => 0,
                    ShuffleInsertPolicy::FollowCurrent => order[position - 1] + 1,
                    ShuffleInsertPolicy::CanonicalEnd => self.items.len(),
                };
                for idx in order.iter_mut() {
                    if *idx >= canonical {
                        *idx += count;
                    }
                }
                self.items.splice(canonical..canonical, batch);
                order.splice(position..position, canonical..canonical + count);
            }
        }
    }

    /// Remove items at the given active positions.
    ///
    /// Out-of-range and duplicate positions are ignored. Returns the removed
    /// items in canonical order.
    pub fn remove(&mut self, positions: &[usize]) -> Vec<MediaItem> {
        let mut doomed = vec![false; self.items.len()];
        for &p in positions {
            if let Some(c) = self.canonical_index(p) {
                doomed[c] = true;
            }
        }

        let mut remap = vec![usize::MAX; self.items.len()];
        let mut next = 0;
        for (i, gone) in doomed.iter().enumerate() {
            if !gone {
                remap[i] = next;
                next += 1;
            }
        }

        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(next);
        for (i, item) in self.items.drain(..).enumerate() {
            if doomed[i] {
                removed.push(item);
            } else {
                kept.push(item);
            }
        }
        self.items = kept;

        if let Some(order) = self.order.as_mut() {
            order.retain(|c| !doomed[*c]);
            for c in order.iter_mut() {
                *c = remap[*c];
            }
        }
        removed
    }

    /// Replace the active view wholesale.
    ///
    /// While shuffled, surviving items (matched by ID, first unused copy)
    /// keep their relative canonical order and new items go to the
    /// canonical end.
    pub fn replace(&mut self, new_items: Vec<MediaItem>) {
        if self.order.is_none() {
            self.items = new_items;
            return;
        }

        let mut old_positions: HashMap<&str, VecDeque<usize>> = HashMap::new();
        for (i, item) in self.items.iter().enumerate() {
            old_positions.entry(item.id()).or_default().push_back(i);
        }
        let old_len = self.items.len();
        let sort_keys: Vec<usize> = new_items
            .iter()
            .enumerate()
            .map(|(pos, item)| {
                old_positions
                    .get_mut(item.id())
                    .and_then(VecDeque::pop_front)
                    .unwrap_or(old_len + pos)
            })
            .collect();

        let mut by_canonical: Vec<usize> = (0..new_items.len()).collect();
        by_canonical.sort_by_key(|&p| sort_keys[p]);

        let mut order = vec![0; new_items.len()];
        for (canonical, &active) in by_canonical.iter().enumerate() {
            order[active] = canonical;
        }

        let mut slots: Vec<Option<MediaItem>> = new_items.into_iter().map(Some).collect();
        self.items = by_canonical
            .iter()
            .filter_map(|&active| slots[active].take())
            .collect();
        self.order = Some(order);
    }

    /// Turn shuffle on with a fresh permutation.
    ///
    /// The item at `current` (an active position) is moved to the front of
    /// the shuffle order. Returns its new active position.
    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R, current: Option<usize>) -> Option<usize> {
        let current = current.and_then(|p| self.canonical_index(p));

        let mut order: Vec<usize> = (0..self.items.len()).collect();
        order.shuffle(rng);

        if let Some(current) = current
            && let Some(at) = order.iter().position(|&i| i == current)
        {
            order.remove(at);
            order.insert(0, current);
        }

        self.order = Some(order);
        current.map(|_| 0)
    }

    /// Turn shuffle off. Returns the canonical position of `current`.
    pub fn unshuffle(&mut self, current: Option<usize>) -> Option<usize> {
        let current = current.and_then(|p| self.canonical_index(p));
        self.order = None;
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RadioStation, Track};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn make_item(id: &str) -> MediaItem {
        MediaItem::from(Track::new(id, id, 180.0))
    }

    fn make_queue(ids: &[&str]) -> PlayQueue {
        let mut queue = PlayQueue::new();
        queue.append(ids.iter().map(|id| make_item(id)).collect());
        queue
    }

    fn active_ids(queue: &PlayQueue) -> Vec<String> {
        queue.iter().map(|i| i.id().to_string()).collect()
    }

    fn canonical_ids(queue: &PlayQueue) -> Vec<String> {
        queue.canonical().iter().map(|i| i.id().to_string()).collect()
    }

    #[test]
    fn test_queue_basic() {
        let queue = make_queue(&["a", "b", "c"]);
        assert_eq!(queue.len(), 3);
        assert!(!queue.is_shuffled());
        assert_eq!(queue.get(1).map(|i| i.id()), Some("b"));
        assert!(queue.get(3).is_none());
    }

    #[test]
    fn test_insert_at_unshuffled() {
        let mut queue = make_queue(&["a", "c"]);
        queue.insert_at(1, vec![make_item("b")]);
        assert_eq!(active_ids(&queue), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_insert_at_clamps_position() {
        let mut queue = make_queue(&["a"]);
        queue.insert_at(10, vec![make_item("b")]);
        assert_eq!(active_ids(&queue), vec!["a", "b"]);
    }

    #[test]
    fn test_shuffle_keeps_current_first() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut queue = make_queue(&["a", "b", "c", "d", "e"]);

        let cursor = queue.shuffle(&mut rng, Some(2));
        assert_eq!(cursor, Some(0));
        assert_eq!(queue.get(0).map(|i| i.id()), Some("c"));
        assert_eq!(queue.len(), 5);
    }

    #[test]
    fn test_active_position_inverts_canonical_index() {
        let mut queue = make_queue(&["a", "b", "c", "d"]);
        assert_eq!(queue.active_position(2), Some(2));
        assert_eq!(queue.active_position(4), None);

        queue.shuffle(&mut StdRng::seed_from_u64(3), Some(1));
        for position in 0..queue.len() {
            let canonical = queue.canonical_index(position).unwrap();
            assert_eq!(queue.active_position(canonical), Some(position));
        }
    }

    #[test]
    fn test_unshuffle_restores_canonical_order() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut queue = make_queue(&["a", "b", "c", "d", "e"]);
        queue.shuffle(&mut rng, Some(3));

        let cursor = queue.unshuffle(Some(0));
        assert_eq!(cursor, Some(3));
        assert_eq!(active_ids(&queue), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_insert_next_follow_current_while_shuffled() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut queue = make_queue(&["a", "b", "c", "d"]);
        queue.shuffle(&mut rng, Some(1)); // "b" now at active 0

        queue.insert_at(1, vec![make_item("x")]);

        // Adjacent in shuffle order...
        assert_eq!(queue.get(1).map(|i| i.id()), Some("x"));
        // ...and in canonical order
        assert_eq!(canonical_ids(&queue), vec!["a", "b", "x", "c", "d"]);
    }

    #[test]
    fn test_insert_next_canonical_end_while_shuffled() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut queue = PlayQueue::with_policy(ShuffleInsertPolicy::CanonicalEnd);
        queue.append(vec![make_item("a"), make_item("b"), make_item("c")]);
        queue.shuffle(&mut rng, Some(0));

        queue.insert_at(1, vec![make_item("x")]);

        assert_eq!(queue.get(1).map(|i| i.id()), Some("x"));
        assert_eq!(canonical_ids(&queue), vec!["a", "b", "c", "x"]);
    }

    #[test]
    fn test_pinned_insert_ignores_policy() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut queue = PlayQueue::with_policy(ShuffleInsertPolicy::CanonicalEnd);
        queue.append(vec![make_item("a"), make_item("b"), make_item("c")]);
        queue.shuffle(&mut rng, Some(0));

        let radio = MediaItem::from(RadioStation::new("r", "Radio", "http://r"));
        queue.insert_pinned_at(1, vec![radio]);

        assert_eq!(queue.get(1).map(|i| i.id()), Some("r"));
        assert_eq!(canonical_ids(&queue), vec!["a", "r", "b", "c"]);
    }

    #[test]
    fn test_append_while_shuffled_goes_to_both_ends() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut queue = make_queue(&["a", "b", "c"]);
        queue.shuffle(&mut rng, None);

        queue.append(vec![make_item("d"), make_item("e")]);

        assert_eq!(queue.get(3).map(|i| i.id()), Some("d"));
        assert_eq!(queue.get(4).map(|i| i.id()), Some("e"));
        assert_eq!(canonical_ids(&queue), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_remove_unshuffled() {
        let mut queue = make_queue(&["a", "b", "c", "d"]);
        let removed = queue.remove(&[1, 3, 3, 99]);
        assert_eq!(removed.len(), 2);
        assert_eq!(active_ids(&queue), vec!["a", "c"]);
    }

    #[test]
    fn test_remove_while_shuffled_updates_both_orders() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut queue = make_queue(&["a", "b", "c", "d", "e"]);
        queue.shuffle(&mut rng, None);
        let doomed = queue.get(2).map(|i| i.id().to_string());

        queue.remove(&[2]);

        assert_eq!(queue.len(), 4);
        assert!(queue.iter().all(|i| Some(i.id().to_string()) != doomed));
        queue.unshuffle(None);
        let expected: Vec<String> = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|s| s.to_string())
            .filter(|s| Some(s) != doomed.as_ref())
            .collect();
        assert_eq!(active_ids(&queue), expected);
    }

    #[test]
    fn test_remove_duplicate_ids_by_position() {
        let mut queue = make_queue(&["a", "b", "a"]);
        queue.remove(&[2]);
        assert_eq!(active_ids(&queue), vec!["a", "b"]);
    }

    #[test]
    fn test_replace_unshuffled() {
        let mut queue = make_queue(&["a", "b", "c"]);
        queue.replace(vec![make_item("c"), make_item("a")]);
        assert_eq!(active_ids(&queue), vec!["c", "a"]);
    }

    #[test]
    fn test_replace_while_shuffled_keeps_canonical_order() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut queue = make_queue(&["a", "b", "c", "d"]);
        queue.shuffle(&mut rng, None);

        // User reorders the shuffled view and drops "b", adds "z"
        queue.replace(vec![make_item("d"), make_item("z"), make_item("a"), make_item("c")]);

        assert_eq!(active_ids(&queue), vec!["d", "z", "a", "c"]);
        assert_eq!(canonical_ids(&queue), vec!["a", "c", "d", "z"]);
    }

    #[test]
    fn test_clear_keeps_shuffle_mode() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut queue = make_queue(&["a", "b"]);
        queue.shuffle(&mut rng, None);
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.is_shuffled());

        queue.append(vec![make_item("x")]);
        assert_eq!(queue.get(0).map(|i| i.id()), Some("x"));
    }

    #[test]
    fn test_items_with_id_updates_duplicates() {
        let mut queue = make_queue(&["a", "b", "a"]);
        for item in queue.items_with_id_mut("a") {
            if let Some(track) = item.as_track_mut() {
                track.favorite = true;
            }
        }
        let favs = queue
            .iter()
            .filter(|i| i.as_track().is_some_and(|t| t.favorite))
            .count();
        assert_eq!(favs, 2);
    }

    #[test]
    fn test_loop_mode_cycle() {
        assert_eq!(LoopMode::None.cycled(), LoopMode::All);
        assert_eq!(LoopMode::All.cycled(), LoopMode::One);
        assert_eq!(LoopMode::One.cycled(), LoopMode::None);
    }
}
