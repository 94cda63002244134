use std::time::{Duration, Instant};

/// Controls inside the overlay only become actionable after this delay,
/// since the opening gesture may land where a panel control sits.
pub const OVERLAY_INTERACT_DELAY: Duration = Duration::from_millis(500);

/// Modal overlay interlock. While open it suspends the active item's
/// playback; closing restores whatever play state held before.
pub struct OverlayPanel {
    opened_at: Option<Instant>,
    resume_on_close: bool,
}

impl OverlayPanel {
    pub fn new() -> Self {
        Self {
            opened_at: None,
            resume_on_close: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.opened_at.is_some()
    }

    /// Opens the panel. `was_playing` is captured so close can restore it.
    /// Returns false when already open.
    pub fn open(&mut self, was_playing: bool, now: Instant) -> bool {
        if self.opened_at.is_some() {
            return false;
        }
        self.opened_at = Some(now);
        self.resume_on_close = was_playing;
        true
    }

    /// Closes the panel; the return value says whether playback should
    /// resume.
    pub fn close(&mut self) -> bool {
        if self.opened_at.take().is_none() {
            return false;
        }
        std::mem::take(&mut self.resume_on_close)
    }

    /// Anti-mis-click guard: whether panel controls accept input yet.
    pub fn interactable(&self, now: Instant) -> bool {
        match self.opened_at {
            Some(opened) => now.duration_since(opened) >= OVERLAY_INTERACT_DELAY,
            None => false,
        }
    }
}

impl Default for OverlayPanel {
    fn default() -> Self {
        Self::new()
    }
}
