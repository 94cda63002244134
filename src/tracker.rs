use std::collections::HashSet;

use crate::feed::SlotKey;

/// A slot becomes the active item once more than half its area is inside
/// the viewport.
pub const INTERSECTION_THRESHOLD: f64 = 0.5;

/// Visibility report for one observed slot, forwarded by the render layer.
#[derive(Debug, Clone, Copy)]
pub struct IntersectionEvent {
    pub key: SlotKey,
    pub index: usize,
    pub ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveChanged {
    pub previous: Option<usize>,
    pub current: usize,
}

/// Owns the single active position. Everything else reads it; only refresh
/// (forcing the head) and intersection delivery write it. When several slots
/// cross the threshold in one tick, the last delivered event wins.
pub struct VisibilityTracker {
    observed: HashSet<SlotKey>,
    active: Option<usize>,
}

impl VisibilityTracker {
    pub fn new() -> Self {
        Self {
            observed: HashSet::new(),
            active: None,
        }
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    /// Replaces the observed-slot set after a sequence mutation. New slots
    /// are observed, stale ones released; events for released slots become
    /// no-ops rather than leaking delivery.
    pub fn resubscribe<I>(&mut self, keys: I)
    where
        I: IntoIterator<Item = SlotKey>,
    {
        self.observed.clear();
        self.observed.extend(keys);
        if self.observed.is_empty() {
            self.active = None;
        }
    }

    /// Delivers one intersection report. Reports for unobserved slots are
    /// tolerated as no-ops (the slot may have been removed before its
    /// observer detached).
    pub fn deliver(&mut self, event: IntersectionEvent) -> Option<ActiveChanged> {
        if !self.observed.contains(&event.key) {
            return None;
        }
        if event.ratio <= INTERSECTION_THRESHOLD {
            return None;
        }
        if self.active == Some(event.index) {
            return None;
        }
        let previous = self.active;
        self.active = Some(event.index);
        Some(ActiveChanged {
            previous,
            current: event.index,
        })
    }

    /// Forces the active position to the head of the sequence. Used when a
    /// refresh replaces the feed and resets the scroll to the top.
    pub fn force_head(&mut self) -> Option<ActiveChanged> {
        if self.observed.is_empty() {
            self.active = None;
            return None;
        }
        let previous = self.active;
        self.active = Some(0);
        if previous == Some(0) {
            return None;
        }
        Some(ActiveChanged {
            previous,
            current: 0,
        })
    }
}

impl Default for VisibilityTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::feed::Sequencer;

    fn tracker_over(sequencer: &Sequencer) -> VisibilityTracker {
        let mut tracker = VisibilityTracker::new();
        tracker.resubscribe(sequencer.slots().iter().map(|slot| slot.key));
        tracker
    }

    #[test]
    fn crossing_the_threshold_activates_the_slot() {
        let sequencer = Sequencer::new(catalog::builtin()).unwrap();
        let mut tracker = tracker_over(&sequencer);
        let key = sequencer.slots()[2].key;

        let change = tracker.deliver(IntersectionEvent {
            key,
            index: 2,
            ratio: 0.6,
        });
        assert_eq!(
            change,
            Some(ActiveChanged {
                previous: None,
                current: 2
            })
        );
        assert_eq!(tracker.active_index(), Some(2));
    }

    #[test]
    fn at_or_below_threshold_is_ignored() {
        let sequencer = Sequencer::new(catalog::builtin()).unwrap();
        let mut tracker = tracker_over(&sequencer);
        let key = sequencer.slots()[0].key;

        assert!(tracker
            .deliver(IntersectionEvent {
                key,
                index: 0,
                ratio: 0.5,
            })
            .is_none());
        assert_eq!(tracker.active_index(), None);
    }

    #[test]
    fn stale_slot_reports_are_no_ops() {
        let mut sequencer = Sequencer::new(catalog::builtin()).unwrap();
        let mut tracker = tracker_over(&sequencer);
        let stale = sequencer.slots()[0].key;

        let start = std::time::Instant::now();
        sequencer.request_refresh(start);
        sequencer.poll_refresh(start + crate::feed::REFRESH_LATENCY);
        tracker.resubscribe(sequencer.slots().iter().map(|slot| slot.key));

        assert!(tracker
            .deliver(IntersectionEvent {
                key: stale,
                index: 0,
                ratio: 0.9,
            })
            .is_none());
    }

    #[test]
    fn last_delivered_event_wins() {
        let sequencer = Sequencer::new(catalog::builtin()).unwrap();
        let mut tracker = tracker_over(&sequencer);
        let slots = sequencer.slots();

        tracker.deliver(IntersectionEvent {
            key: slots[1].key,
            index: 1,
            ratio: 0.8,
        });
        tracker.deliver(IntersectionEvent {
            key: slots[2].key,
            index: 2,
            ratio: 0.6,
        });
        assert_eq!(tracker.active_index(), Some(2));
    }

    #[test]
    fn redelivery_of_the_active_slot_is_silent() {
        let sequencer = Sequencer::new(catalog::builtin()).unwrap();
        let mut tracker = tracker_over(&sequencer);
        let key = sequencer.slots()[1].key;
        let event = IntersectionEvent {
            key,
            index: 1,
            ratio: 0.7,
        };
        assert!(tracker.deliver(event).is_some());
        assert!(tracker.deliver(event).is_none());
    }

    #[test]
    fn force_head_resets_to_the_first_slot() {
        let sequencer = Sequencer::new(catalog::builtin()).unwrap();
        let mut tracker = tracker_over(&sequencer);
        tracker.deliver(IntersectionEvent {
            key: sequencer.slots()[3].key,
            index: 3,
            ratio: 0.9,
        });

        let change = tracker.force_head();
        assert_eq!(
            change,
            Some(ActiveChanged {
                previous: Some(3),
                current: 0
            })
        );
    }
}
