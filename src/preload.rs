/// Slots within this distance of the active item get a full preload.
pub const PRELOAD_AHEAD_COUNT: usize = 2;

/// How aggressively the render layer should fetch media for a slot ahead
/// of its activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreloadHint {
    Full,
    MetadataOnly,
}

/// Pure policy: recomputed on every active-index change, with no memory of
/// prior hints. Before the first activation the head of the feed is warmed.
pub fn preload_hint(slot_index: usize, active_index: Option<usize>) -> PreloadHint {
    match active_index {
        None => {
            if slot_index < PRELOAD_AHEAD_COUNT {
                PreloadHint::Full
            } else {
                PreloadHint::MetadataOnly
            }
        }
        Some(active) => {
            if slot_index.abs_diff(active) <= PRELOAD_AHEAD_COUNT {
                PreloadHint::Full
            } else {
                PreloadHint::MetadataOnly
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_within_the_preload_window() {
        for active in 0..10usize {
            for slot in 0..10usize {
                let expected = if slot.abs_diff(active) <= PRELOAD_AHEAD_COUNT {
                    PreloadHint::Full
                } else {
                    PreloadHint::MetadataOnly
                };
                assert_eq!(preload_hint(slot, Some(active)), expected);
            }
        }
    }

    #[test]
    fn window_covers_both_directions() {
        assert_eq!(preload_hint(5, Some(5)), PreloadHint::Full);
        assert_eq!(preload_hint(3, Some(5)), PreloadHint::Full);
        assert_eq!(preload_hint(7, Some(5)), PreloadHint::Full);
        assert_eq!(preload_hint(2, Some(5)), PreloadHint::MetadataOnly);
        assert_eq!(preload_hint(8, Some(5)), PreloadHint::MetadataOnly);
    }

    #[test]
    fn unknown_active_warms_the_head() {
        assert_eq!(preload_hint(0, None), PreloadHint::Full);
        assert_eq!(preload_hint(1, None), PreloadHint::Full);
        assert_eq!(preload_hint(2, None), PreloadHint::MetadataOnly);
        assert_eq!(preload_hint(9, None), PreloadHint::MetadataOnly);
    }
}
