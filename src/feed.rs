use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use rand::Rng;

use crate::catalog::{CatalogError, ItemDescriptor};

/// Append another shuffled batch once the active position is within this
/// many items of the tail.
pub const LOAD_MORE_THRESHOLD: usize = 5;

/// Simulated latency between a refresh request and the sequence swap.
pub const REFRESH_LATENCY: Duration = Duration::from_millis(500);

/// Stable identity of one rendered slot. Descriptors repeat across batches;
/// the key never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey(u64);

#[derive(Debug, Clone)]
pub struct Slot {
    pub item: ItemDescriptor,
    pub key: SlotKey,
}

/// Sequence mutations the observer layer must re-subscribe for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEvent {
    Extended { appended: usize },
    Refreshed,
}

/// Produces the ordered, lazily-extended feed sequence: an initial shuffle
/// of the catalog, another full shuffled batch appended near the tail, and
/// a wholesale replacement on refresh.
pub struct Sequencer {
    catalog: Vec<ItemDescriptor>,
    slots: Vec<Slot>,
    next_key: u64,
    refresh_started: Option<Instant>,
}

impl Sequencer {
    pub fn new(catalog: Vec<ItemDescriptor>) -> Result<Self, CatalogError> {
        if catalog.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut sequencer = Self {
            catalog,
            slots: Vec::new(),
            next_key: 0,
            refresh_started: None,
        };
        let initial = sequencer.shuffled_batch(&mut rand::thread_rng());
        sequencer.slots = initial;
        Ok(sequencer)
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn batch_size(&self) -> usize {
        self.catalog.len()
    }

    /// Appends one full shuffled catalog batch when the active position is
    /// within `LOAD_MORE_THRESHOLD` of the tail. Appending never moves the
    /// active position; duplicates against already-shown items are accepted.
    pub fn extend_if_needed(&mut self, active_index: usize) -> Option<FeedEvent> {
        if self.slots.len().saturating_sub(active_index) > LOAD_MORE_THRESHOLD {
            return None;
        }
        let batch = self.shuffled_batch(&mut rand::thread_rng());
        let appended = batch.len();
        self.slots.extend(batch);
        Some(FeedEvent::Extended { appended })
    }

    /// Starts a refresh cycle. A refresh already in flight wins; further
    /// requests are ignored until it resolves.
    pub fn request_refresh(&mut self, now: Instant) -> bool {
        if self.refresh_started.is_some() {
            return false;
        }
        self.refresh_started = Some(now);
        true
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh_started.is_some()
    }

    /// Completes an in-flight refresh once the simulated latency has
    /// elapsed, replacing the sequence with a fresh shuffle.
    pub fn poll_refresh(&mut self, now: Instant) -> Option<FeedEvent> {
        let started = self.refresh_started?;
        if now.duration_since(started) < REFRESH_LATENCY {
            return None;
        }
        self.refresh_started = None;
        self.slots = self.shuffled_batch(&mut rand::thread_rng());
        Some(FeedEvent::Refreshed)
    }

    fn shuffled_batch<R: Rng>(&mut self, rng: &mut R) -> Vec<Slot> {
        let mut items = self.catalog.clone();
        items.shuffle(rng);
        items
            .into_iter()
            .map(|item| {
                let key = SlotKey(self.next_key);
                self.next_key += 1;
                Slot { item, key }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;

    fn ids(slots: &[Slot]) -> Vec<u32> {
        slots.iter().map(|slot| slot.item.id).collect()
    }

    fn sorted_ids(slots: &[Slot]) -> Vec<u32> {
        let mut ids = ids(slots);
        ids.sort_unstable();
        ids
    }

    #[test]
    fn initial_sequence_is_a_permutation_of_the_catalog() {
        let items = catalog::builtin();
        let mut expected: Vec<u32> = items.iter().map(|item| item.id).collect();
        expected.sort_unstable();

        let sequencer = Sequencer::new(items).unwrap();
        assert_eq!(sorted_ids(sequencer.slots()), expected);
    }

    #[test]
    fn empty_catalog_fails_initialization() {
        assert!(matches!(
            Sequencer::new(Vec::new()),
            Err(CatalogError::Empty)
        ));
    }

    #[test]
    fn slot_keys_are_unique_across_batches() {
        let mut sequencer = Sequencer::new(catalog::builtin()).unwrap();
        sequencer.extend_if_needed(sequencer.len().saturating_sub(1));
        let mut keys: Vec<SlotKey> = sequencer.slots().iter().map(|slot| slot.key).collect();
        let total = keys.len();
        keys.sort_unstable_by_key(|key| key.0);
        keys.dedup();
        assert_eq!(keys.len(), total);
    }

    #[test]
    fn extends_exactly_one_batch_at_the_threshold() {
        // Catalog of 3, active index 0, length 3: 3 - 0 <= 5 holds.
        let items: Vec<_> = catalog::builtin().into_iter().take(3).collect();
        let mut sequencer = Sequencer::new(items).unwrap();
        assert_eq!(sequencer.len(), 3);

        let event = sequencer.extend_if_needed(0);
        assert_eq!(event, Some(FeedEvent::Extended { appended: 3 }));
        assert_eq!(sequencer.len(), 6);
    }

    #[test]
    fn does_not_extend_far_from_the_tail() {
        let mut sequencer = Sequencer::new(catalog::builtin()).unwrap();
        sequencer.extend_if_needed(0); // len 8, 8 - 0 <= 5 is false
        assert_eq!(sequencer.len(), 8);
    }

    #[test]
    fn appended_batch_is_itself_a_permutation() {
        let items = catalog::builtin();
        let mut expected: Vec<u32> = items.iter().map(|item| item.id).collect();
        expected.sort_unstable();

        let mut sequencer = Sequencer::new(items).unwrap();
        let before = sequencer.len();
        sequencer.extend_if_needed(before - 1);
        let mut tail: Vec<u32> = ids(&sequencer.slots()[before..]);
        tail.sort_unstable();
        assert_eq!(tail, expected);
    }

    #[test]
    fn refresh_replaces_after_latency() {
        let mut sequencer = Sequencer::new(catalog::builtin()).unwrap();
        let keys_before: Vec<SlotKey> =
            sequencer.slots().iter().map(|slot| slot.key).collect();

        let start = Instant::now();
        assert!(sequencer.request_refresh(start));
        assert!(sequencer.is_refreshing());
        assert_eq!(sequencer.poll_refresh(start), None);

        let done = start + REFRESH_LATENCY;
        assert_eq!(sequencer.poll_refresh(done), Some(FeedEvent::Refreshed));
        assert!(!sequencer.is_refreshing());
        assert!(sequencer
            .slots()
            .iter()
            .all(|slot| !keys_before.contains(&slot.key)));
    }

    #[test]
    fn concurrent_refresh_requests_collapse_to_one() {
        let mut sequencer = Sequencer::new(catalog::builtin()).unwrap();
        let start = Instant::now();
        assert!(sequencer.request_refresh(start));
        assert!(!sequencer.request_refresh(start + Duration::from_millis(100)));

        let done = start + REFRESH_LATENCY;
        assert_eq!(sequencer.poll_refresh(done), Some(FeedEvent::Refreshed));
        // The ignored second request left nothing in flight.
        assert_eq!(sequencer.poll_refresh(done + REFRESH_LATENCY), None);
    }
}
