use std::time::{Duration, Instant};

/// How long a freshly activated item's call-to-action stays in its muted
/// style before switching to the highlighted one.
pub const CTA_REVEAL_DELAY: Duration = Duration::from_millis(1000);

/// The underlying media surface for one slot. `play` is fallible: the
/// terminal analog of an autoplay denial is the player refusing to start.
pub trait MediaElement {
    fn play(&mut self) -> Result<(), PlayRejected>;
    fn pause(&mut self);
    /// Stops playback and resets the position to the start, so the next
    /// activation begins a fresh buffering cycle.
    fn rewind(&mut self);
    fn set_muted(&mut self, muted: bool);
}

/// Recoverable play refusal. Absorbed into a paused visual state, never
/// surfaced as a failure to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayRejected;

/// Media lifecycle signals, independent of the active/inactive transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaEvent {
    Waiting,
    CanPlay,
    Playing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Loading,
    Playing,
    Paused,
}

/// What the render layer should draw for a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualState {
    Inactive,
    Buffering,
    Playing,
    /// Paused by a held press; shows the transient pause glyph.
    HoldPaused,
    /// Paused independently of any hold (user pause or play rejection);
    /// shows the play affordance.
    PausedAffordance,
}

/// Per-slot playback machine. Created when the slot enters the sequence,
/// dropped when the sequence replaces it.
pub struct PlaybackMachine {
    state: PlaybackState,
    media_ready: bool,
    user_paused: bool,
    long_press_active: bool,
    activated_at: Option<Instant>,
}

impl PlaybackMachine {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::Idle,
            media_ready: false,
            user_paused: false,
            long_press_active: false,
            activated_at: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn media_ready(&self) -> bool {
        self.media_ready
    }

    /// The slot became the active item. Always clears a stale user pause
    /// first; a rejected play degrades to the paused affordance.
    pub fn activate(&mut self, media: &mut dyn MediaElement, now: Instant) {
        self.user_paused = false;
        self.long_press_active = false;
        self.activated_at = Some(now);
        match media.play() {
            Ok(()) => self.state = PlaybackState::Playing,
            Err(PlayRejected) => {
                self.user_paused = true;
                self.state = PlaybackState::Paused;
            }
        }
    }

    /// The slot stopped being the active item: stop, reset to the start,
    /// and return to `Loading` so re-activation buffers fresh.
    pub fn deactivate(&mut self, media: &mut dyn MediaElement) {
        media.pause();
        media.rewind();
        self.state = PlaybackState::Loading;
        self.media_ready = false;
        self.user_paused = false;
        self.long_press_active = false;
        self.activated_at = None;
    }

    pub fn media_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::Waiting => self.media_ready = false,
            MediaEvent::CanPlay | MediaEvent::Playing => self.media_ready = true,
        }
        if self.state == PlaybackState::Idle {
            self.state = PlaybackState::Loading;
        }
    }

    /// A held press crossed the classification interval: force a pause.
    pub fn hold_pause(&mut self, media: &mut dyn MediaElement) {
        if self.state != PlaybackState::Playing {
            return;
        }
        media.pause();
        self.state = PlaybackState::Paused;
        self.long_press_active = true;
    }

    /// The held press released. Resumes only when the pause came from the
    /// hold itself, not from an independent user pause.
    pub fn hold_release(&mut self, media: &mut dyn MediaElement) {
        let resume = self.long_press_active && !self.user_paused;
        self.long_press_active = false;
        if !resume || self.state != PlaybackState::Paused {
            return;
        }
        match media.play() {
            Ok(()) => self.state = PlaybackState::Playing,
            Err(PlayRejected) => {
                self.user_paused = true;
            }
        }
    }

    /// Suspends playback for the overlay interlock. Returns whether the
    /// item was playing, so close can restore it.
    pub fn suspend(&mut self, media: &mut dyn MediaElement) -> bool {
        if self.state != PlaybackState::Playing {
            return false;
        }
        media.pause();
        self.state = PlaybackState::Paused;
        true
    }

    /// Restores playback after the overlay closes, unless the user paused
    /// in the meantime.
    pub fn resume(&mut self, media: &mut dyn MediaElement) {
        if self.state != PlaybackState::Paused || self.user_paused || self.long_press_active {
            return;
        }
        match media.play() {
            Ok(()) => self.state = PlaybackState::Playing,
            Err(PlayRejected) => {
                self.user_paused = true;
            }
        }
    }

    pub fn visual(&self, active: bool) -> VisualState {
        if !active {
            return VisualState::Inactive;
        }
        if self.long_press_active {
            return VisualState::HoldPaused;
        }
        if !self.media_ready {
            return VisualState::Buffering;
        }
        match self.state {
            PlaybackState::Paused => VisualState::PausedAffordance,
            _ => VisualState::Playing,
        }
    }

    /// Whether the call-to-action has switched to its highlighted style.
    pub fn cta_revealed(&self, now: Instant) -> bool {
        match self.activated_at {
            Some(activated) => now.duration_since(activated) >= CTA_REVEAL_DELAY,
            None => false,
        }
    }
}

impl Default for PlaybackMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Records commands instead of driving a player.
    #[derive(Debug, Default)]
    pub struct ScriptedMedia {
        pub reject_play: bool,
        pub commands: Vec<&'static str>,
    }

    impl MediaElement for ScriptedMedia {
        fn play(&mut self) -> Result<(), PlayRejected> {
            self.commands.push("play");
            if self.reject_play {
                Err(PlayRejected)
            } else {
                Ok(())
            }
        }

        fn pause(&mut self) {
            self.commands.push("pause");
        }

        fn rewind(&mut self) {
            self.commands.push("rewind");
        }

        fn set_muted(&mut self, muted: bool) {
            self.commands.push(if muted { "mute" } else { "unmute" });
        }
    }
}
