use std::time::{Duration, Instant};

/// A press held this long without release classifies as a long press.
pub const LONG_PRESS_DELAY: Duration = Duration::from_millis(200);

/// Pull distance at which releasing triggers a refresh. Also the visual
/// clamp for the pull indicator.
pub const PULL_REFRESH_THRESHOLD: f32 = 70.0;

/// Movement beyond this distance stops a press from reading as a tap.
const TAP_SLOP: f32 = 3.0;

/// Nested interactive controls. A tap landing on one activates that control
/// alone; propagation stops there and the mute toggle is suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Mute,
    Follow,
    CallToAction,
    Logo,
    Like,
    Comment,
    Send,
    Save,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressTarget {
    Media,
    Control(Control),
}

/// Discrete outcomes handed to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ToggleMute,
    HoldPause,
    HoldRelease,
    Refresh,
    Activate(Control),
}

struct PressSession {
    started: Instant,
    origin: (f32, f32),
    target: PressTarget,
    long_press: bool,
    pull_enabled: bool,
    pull_distance: f32,
    moved: f32,
}

/// Interprets one pointer session at a time: `Idle → Pressed →
/// {LongPress | TapReleased | DragReleased}`. The classification timer is
/// an explicit deadline; press-end or cancel always clears it, so no timer
/// outlives its session.
pub struct GestureInterpreter {
    session: Option<PressSession>,
}

impl GestureInterpreter {
    pub fn new() -> Self {
        Self { session: None }
    }

    pub fn is_pressed(&self) -> bool {
        self.session.is_some()
    }

    /// Begins a press session. While the overlay is open, feed gestures are
    /// suppressed entirely. Pull tracking engages only when the press lands
    /// with the scroll offset exactly at the top.
    pub fn press_start(
        &mut self,
        pos: (f32, f32),
        target: PressTarget,
        at_top: bool,
        overlay_open: bool,
        now: Instant,
    ) {
        if overlay_open {
            self.session = None;
            return;
        }
        self.session = Some(PressSession {
            started: now,
            origin: pos,
            target,
            long_press: false,
            pull_enabled: at_top,
            pull_distance: 0.0,
            moved: 0.0,
        });
    }

    /// Tracks movement. Only downward, vertically dominant motion feeds the
    /// pull distance; upward motion collapses it.
    pub fn press_move(&mut self, pos: (f32, f32)) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let dx = pos.0 - session.origin.0;
        let dy = pos.1 - session.origin.1;
        session.moved = session.moved.max(dx.abs().max(dy.abs()));
        if session.pull_enabled {
            if dy > 0.0 && dy >= dx.abs() {
                session.pull_distance = dy;
            } else if dy <= 0.0 {
                session.pull_distance = 0.0;
            }
        }
    }

    /// Fires the classification deadline. A press on the media surface held
    /// past the interval becomes a long press; the classification persists
    /// until release and suppresses the tap outcome. A press that already
    /// wandered into a drag never classifies.
    pub fn tick(&mut self, now: Instant) -> Option<Command> {
        let session = self.session.as_mut()?;
        if session.long_press
            || session.target != PressTarget::Media
            || session.moved > TAP_SLOP
        {
            return None;
        }
        if now.duration_since(session.started) < LONG_PRESS_DELAY {
            return None;
        }
        session.long_press = true;
        Some(Command::HoldPause)
    }

    /// Ends the session and resolves its single outcome.
    pub fn press_end(&mut self) -> Option<Command> {
        let session = self.session.take()?;
        if session.long_press {
            return Some(Command::HoldRelease);
        }
        if session.pull_enabled && session.pull_distance >= PULL_REFRESH_THRESHOLD {
            return Some(Command::Refresh);
        }
        if session.moved > TAP_SLOP {
            // DragReleased: the pull collapsed short of the threshold or the
            // motion was an ordinary scroll.
            return None;
        }
        match session.target {
            PressTarget::Media => Some(Command::ToggleMute),
            PressTarget::Control(control) => Some(Command::Activate(control)),
        }
    }

    /// Aborts the session (pointer left the surface, focus lost). A hold
    /// pause in effect still gets its release.
    pub fn cancel(&mut self) -> Option<Command> {
        let session = self.session.take()?;
        session.long_press.then_some(Command::HoldRelease)
    }

    /// Current pull distance, clamped for the indicator.
    pub fn pull_distance(&self) -> f32 {
        self.raw_pull().min(PULL_REFRESH_THRESHOLD)
    }

    /// Whether releasing now would trigger a refresh.
    pub fn pull_armed(&self) -> bool {
        self.raw_pull() >= PULL_REFRESH_THRESHOLD
    }

    fn raw_pull(&self) -> f32 {
        self.session
            .as_ref()
            .filter(|session| session.pull_enabled)
            .map(|session| session.pull_distance)
            .unwrap_or(0.0)
    }
}

impl Default for GestureInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pressed(interp: &mut GestureInterpreter, target: PressTarget, at_top: bool) -> Instant {
        let now = Instant::now();
        interp.press_start((10.0, 10.0), target, at_top, false, now);
        now
    }

    #[test]
    fn quick_release_toggles_mute_exactly_once() {
        let mut interp = GestureInterpreter::new();
        let start = pressed(&mut interp, PressTarget::Media, false);
        assert_eq!(interp.tick(start + Duration::from_millis(100)), None);
        assert_eq!(interp.press_end(), Some(Command::ToggleMute));
        // The session is gone; a second release produces nothing.
        assert_eq!(interp.press_end(), None);
    }

    #[test]
    fn held_press_classifies_long_and_suppresses_mute() {
        let mut interp = GestureInterpreter::new();
        let start = pressed(&mut interp, PressTarget::Media, false);
        assert_eq!(
            interp.tick(start + LONG_PRESS_DELAY),
            Some(Command::HoldPause)
        );
        // Classification persists; the timer never re-fires.
        assert_eq!(interp.tick(start + Duration::from_millis(400)), None);
        assert_eq!(interp.press_end(), Some(Command::HoldRelease));
    }

    #[test]
    fn tap_on_nested_control_takes_precedence() {
        let mut interp = GestureInterpreter::new();
        pressed(&mut interp, PressTarget::Control(Control::Follow), false);
        assert_eq!(
            interp.press_end(),
            Some(Command::Activate(Control::Follow))
        );
    }

    #[test]
    fn controls_never_classify_as_long_press() {
        let mut interp = GestureInterpreter::new();
        let start = pressed(&mut interp, PressTarget::Control(Control::Mute), false);
        assert_eq!(interp.tick(start + Duration::from_secs(1)), None);
        assert_eq!(
            interp.press_end(),
            Some(Command::Activate(Control::Mute))
        );
    }

    #[test]
    fn pull_released_below_threshold_is_a_no_op() {
        let mut interp = GestureInterpreter::new();
        pressed(&mut interp, PressTarget::Media, true);
        interp.press_move((10.0, 50.0));
        assert!(interp.pull_distance() > 0.0);
        assert!(!interp.pull_armed());
        assert_eq!(interp.press_end(), None);
    }

    #[test]
    fn pull_released_at_threshold_triggers_one_refresh() {
        let mut interp = GestureInterpreter::new();
        pressed(&mut interp, PressTarget::Media, true);
        interp.press_move((10.0, 10.0 + PULL_REFRESH_THRESHOLD));
        assert!(interp.pull_armed());
        assert_eq!(interp.press_end(), Some(Command::Refresh));
        assert_eq!(interp.press_end(), None);
    }

    #[test]
    fn pull_distance_clamps_for_display() {
        let mut interp = GestureInterpreter::new();
        pressed(&mut interp, PressTarget::Media, true);
        interp.press_move((10.0, 300.0));
        assert_eq!(interp.pull_distance(), PULL_REFRESH_THRESHOLD);
    }

    #[test]
    fn upward_and_horizontal_motion_do_not_engage_pull() {
        let mut interp = GestureInterpreter::new();
        pressed(&mut interp, PressTarget::Media, true);
        interp.press_move((10.0, 2.0));
        assert_eq!(interp.pull_distance(), 0.0);

        pressed(&mut interp, PressTarget::Media, true);
        interp.press_move((120.0, 40.0));
        assert_eq!(interp.pull_distance(), 0.0);
    }

    #[test]
    fn pull_needs_the_scroll_top() {
        let mut interp = GestureInterpreter::new();
        pressed(&mut interp, PressTarget::Media, false);
        interp.press_move((10.0, 200.0));
        assert_eq!(interp.pull_distance(), 0.0);
        assert_eq!(interp.press_end(), None); // DragReleased
    }

    #[test]
    fn overlay_suppresses_feed_gestures() {
        let mut interp = GestureInterpreter::new();
        let now = Instant::now();
        interp.press_start((10.0, 10.0), PressTarget::Media, true, true, now);
        assert!(!interp.is_pressed());
        assert_eq!(interp.tick(now + Duration::from_secs(1)), None);
        assert_eq!(interp.press_end(), None);
    }

    #[test]
    fn drag_suppresses_the_classification_timer() {
        let mut interp = GestureInterpreter::new();
        let start = pressed(&mut interp, PressTarget::Media, false);
        interp.press_move((10.0, 40.0));
        assert_eq!(interp.tick(start + LONG_PRESS_DELAY), None);
        assert_eq!(interp.press_end(), None);
    }

    #[test]
    fn cancel_releases_an_active_hold() {
        let mut interp = GestureInterpreter::new();
        let start = pressed(&mut interp, PressTarget::Media, false);
        assert_eq!(
            interp.tick(start + LONG_PRESS_DELAY),
            Some(Command::HoldPause)
        );
        assert_eq!(interp.cancel(), Some(Command::HoldRelease));

        // Cancel without a classified hold produces nothing.
        pressed(&mut interp, PressTarget::Media, false);
        assert_eq!(interp.cancel(), None);
    }
}
