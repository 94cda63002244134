use std::sync::Arc;
use std::time::Instant;

use crate::catalog::{CatalogError, ItemDescriptor};
use crate::feed::{FeedEvent, Sequencer, Slot, SlotKey};
use crate::gesture::{Command, Control, GestureInterpreter, PressTarget};
use crate::overlay::OverlayPanel;
use crate::playback::{MediaElement, MediaEvent, PlaybackMachine, VisualState};
use crate::preload::{preload_hint, PreloadHint};
use crate::tracker::{ActiveChanged, IntersectionEvent, VisibilityTracker};

/// Builds the media surface for a slot when it enters the sequence. The
/// whole slot is handed over so implementations can tag their async
/// lifecycle events with the slot key.
pub trait MediaFactory: Send {
    fn create(&self, slot: &Slot) -> Box<dyn MediaElement>;
}

/// What the render layer needs to draw one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotView {
    pub is_active: bool,
    pub is_muted: bool,
    pub preload: PreloadHint,
    pub visual: VisualState,
    pub cta_revealed: bool,
}

/// Engine outcomes the render layer reacts to (status line, scroll reset,
/// preload scheduling).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    MuteToggled(bool),
    RefreshStarted,
    RefreshCompleted,
    ScrollReset,
    ActiveChanged { previous: Option<usize>, current: usize },
    Extended { appended: usize },
    ControlActivated(Control),
    OverlayOpened,
    OverlayClosed,
}

struct SlotRuntime {
    machine: PlaybackMachine,
    media: Box<dyn MediaElement>,
}

/// Top-level session object for the feed: owns the shared mute flag and
/// composes the sequencer, visibility tracker, per-slot playback machines,
/// gesture interpreter, preload policy and overlay interlock.
///
/// Single-threaded by construction: the render layer's tick loop is the
/// only driver, so the mute flag and active position each have exactly one
/// writer.
pub struct FeedEngine {
    sequencer: Sequencer,
    tracker: VisibilityTracker,
    gesture: GestureInterpreter,
    overlay: OverlayPanel,
    runtimes: Vec<SlotRuntime>,
    factory: Arc<dyn MediaFactory>,
    muted: bool,
}

impl FeedEngine {
    pub fn new(
        catalog: Vec<ItemDescriptor>,
        factory: Arc<dyn MediaFactory>,
    ) -> Result<Self, CatalogError> {
        let sequencer = Sequencer::new(catalog)?;
        let mut engine = Self {
            sequencer,
            tracker: VisibilityTracker::new(),
            gesture: GestureInterpreter::new(),
            overlay: OverlayPanel::new(),
            runtimes: Vec::new(),
            factory,
            // Feeds start muted; only an explicit toggle changes this.
            muted: true,
        };
        engine.rebuild_runtimes();
        engine.resubscribe();
        Ok(engine)
    }

    pub fn slots(&self) -> &[Slot] {
        self.sequencer.slots()
    }

    pub fn slot_count(&self) -> usize {
        self.sequencer.len()
    }

    pub fn active_index(&self) -> Option<usize> {
        self.tracker.active_index()
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_refreshing(&self) -> bool {
        self.sequencer.is_refreshing()
    }

    pub fn overlay_open(&self) -> bool {
        self.overlay.is_open()
    }

    pub fn overlay_interactable(&self, now: Instant) -> bool {
        self.overlay.interactable(now)
    }

    pub fn pull_distance(&self) -> f32 {
        self.gesture.pull_distance()
    }

    pub fn pull_armed(&self) -> bool {
        self.gesture.pull_armed()
    }

    pub fn slot_view(&self, index: usize, now: Instant) -> SlotView {
        let active_index = self.tracker.active_index();
        let is_active = active_index == Some(index);
        let runtime = &self.runtimes[index];
        SlotView {
            is_active,
            is_muted: self.muted,
            preload: preload_hint(index, active_index),
            visual: runtime.machine.visual(is_active),
            cta_revealed: runtime.machine.cta_revealed(now),
        }
    }

    /// One intersection report from the render layer. Settles the previous
    /// item's deactivation before the new item plays.
    pub fn handle_intersection(
        &mut self,
        event: IntersectionEvent,
        now: Instant,
    ) -> Vec<Reaction> {
        match self.tracker.deliver(event) {
            Some(change) => self.apply_active_change(change, now),
            None => Vec::new(),
        }
    }

    /// Media lifecycle signal addressed by slot key. Signals for slots the
    /// sequence no longer holds are dropped.
    pub fn media_event(&mut self, key: SlotKey, event: MediaEvent) {
        let Some(index) = self
            .sequencer
            .slots()
            .iter()
            .position(|slot| slot.key == key)
        else {
            return;
        };
        self.runtimes[index].machine.media_event(event);
    }

    pub fn press_start(
        &mut self,
        pos: (f32, f32),
        target: PressTarget,
        at_top: bool,
        now: Instant,
    ) {
        self.gesture
            .press_start(pos, target, at_top, self.overlay.is_open(), now);
    }

    pub fn press_move(&mut self, pos: (f32, f32)) {
        self.gesture.press_move(pos);
    }

    pub fn press_end(&mut self, now: Instant) -> Vec<Reaction> {
        match self.gesture.press_end() {
            Some(command) => self.apply(command, now),
            None => Vec::new(),
        }
    }

    pub fn press_cancel(&mut self, now: Instant) -> Vec<Reaction> {
        match self.gesture.cancel() {
            Some(command) => self.apply(command, now),
            None => Vec::new(),
        }
    }

    /// Advances every engine deadline: the press-classification timer and
    /// an in-flight refresh.
    pub fn tick(&mut self, now: Instant) -> Vec<Reaction> {
        let mut reactions = Vec::new();
        if let Some(command) = self.gesture.tick(now) {
            reactions.extend(self.apply(command, now));
        }
        if let Some(FeedEvent::Refreshed) = self.sequencer.poll_refresh(now) {
            reactions.extend(self.finish_refresh(now));
        }
        reactions
    }

    pub fn request_refresh(&mut self, now: Instant) -> Vec<Reaction> {
        if self.sequencer.request_refresh(now) {
            vec![Reaction::RefreshStarted]
        } else {
            Vec::new()
        }
    }

    pub fn toggle_mute(&mut self) -> Reaction {
        self.muted = !self.muted;
        for runtime in &mut self.runtimes {
            runtime.media.set_muted(self.muted);
        }
        Reaction::MuteToggled(self.muted)
    }

    pub fn open_overlay(&mut self, now: Instant) -> Vec<Reaction> {
        let was_playing = match self.tracker.active_index() {
            Some(index) => {
                let runtime = &mut self.runtimes[index];
                runtime.machine.suspend(runtime.media.as_mut())
            }
            None => false,
        };
        if self.overlay.open(was_playing, now) {
            vec![Reaction::OverlayOpened]
        } else {
            Vec::new()
        }
    }

    pub fn close_overlay(&mut self) -> Vec<Reaction> {
        if !self.overlay.is_open() {
            return Vec::new();
        }
        let resume = self.overlay.close();
        if resume {
            if let Some(index) = self.tracker.active_index() {
                let runtime = &mut self.runtimes[index];
                runtime.machine.resume(runtime.media.as_mut());
            }
        }
        vec![Reaction::OverlayClosed]
    }

    fn apply(&mut self, command: Command, now: Instant) -> Vec<Reaction> {
        match command {
            Command::ToggleMute => vec![self.toggle_mute()],
            Command::HoldPause => {
                if let Some(index) = self.tracker.active_index() {
                    let runtime = &mut self.runtimes[index];
                    runtime.machine.hold_pause(runtime.media.as_mut());
                }
                Vec::new()
            }
            Command::HoldRelease => {
                if let Some(index) = self.tracker.active_index() {
                    let runtime = &mut self.runtimes[index];
                    runtime.machine.hold_release(runtime.media.as_mut());
                }
                Vec::new()
            }
            Command::Refresh => self.request_refresh(now),
            Command::Activate(Control::Mute) => {
                // The mute button's own action; propagation stopped there.
                vec![
                    self.toggle_mute(),
                    Reaction::ControlActivated(Control::Mute),
                ]
            }
            Command::Activate(Control::Logo) => {
                let mut reactions = self.open_overlay(now);
                reactions.push(Reaction::ControlActivated(Control::Logo));
                reactions
            }
            Command::Activate(control) => vec![Reaction::ControlActivated(control)],
        }
    }

    fn apply_active_change(&mut self, change: ActiveChanged, now: Instant) -> Vec<Reaction> {
        // The outgoing item settles completely before the next one plays,
        // so two items never sound at once.
        if let Some(previous) = change.previous {
            if previous < self.runtimes.len() {
                let runtime = &mut self.runtimes[previous];
                runtime.machine.deactivate(runtime.media.as_mut());
            }
        }
        let runtime = &mut self.runtimes[change.current];
        runtime.media.set_muted(self.muted);
        runtime.machine.activate(runtime.media.as_mut(), now);

        let mut reactions = vec![Reaction::ActiveChanged {
            previous: change.previous,
            current: change.current,
        }];
        if let Some(FeedEvent::Extended { appended }) =
            self.sequencer.extend_if_needed(change.current)
        {
            self.extend_runtimes(appended);
            self.resubscribe();
            reactions.push(Reaction::Extended { appended });
        }
        reactions
    }

    fn finish_refresh(&mut self, now: Instant) -> Vec<Reaction> {
        // Deactivate against the outgoing runtime set before it drops.
        if let Some(previous) = self.tracker.active_index() {
            if previous < self.runtimes.len() {
                let runtime = &mut self.runtimes[previous];
                runtime.machine.deactivate(runtime.media.as_mut());
            }
        }
        self.rebuild_runtimes();
        self.resubscribe();

        let mut reactions = vec![Reaction::RefreshCompleted, Reaction::ScrollReset];
        if self.tracker.force_head().is_some() || self.tracker.active_index() == Some(0) {
            let runtime = &mut self.runtimes[0];
            runtime.media.set_muted(self.muted);
            runtime.machine.activate(runtime.media.as_mut(), now);
            reactions.push(Reaction::ActiveChanged {
                previous: None,
                current: 0,
            });
        }
        reactions
    }

    fn rebuild_runtimes(&mut self) {
        self.runtimes = self
            .sequencer
            .slots()
            .iter()
            .map(|slot| SlotRuntime {
                machine: PlaybackMachine::new(),
                media: self.factory.create(slot),
            })
            .collect();
    }

    fn extend_runtimes(&mut self, appended: usize) {
        let start = self.sequencer.len() - appended;
        for slot in &self.sequencer.slots()[start..] {
            self.runtimes.push(SlotRuntime {
                machine: PlaybackMachine::new(),
                media: self.factory.create(slot),
            });
        }
    }

    fn resubscribe(&mut self) {
        self.tracker
            .resubscribe(self.sequencer.slots().iter().map(|slot| slot.key));
    }

    #[cfg(test)]
    fn playing_count(&self) -> usize {
        self.runtimes
            .iter()
            .filter(|runtime| runtime.machine.is_playing())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::feed::REFRESH_LATENCY;
    use crate::gesture::LONG_PRESS_DELAY;
    use crate::playback::PlayRejected;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct CommandLog {
        entries: Arc<Mutex<Vec<(u32, &'static str)>>>,
    }

    impl CommandLog {
        fn take(&self) -> Vec<(u32, &'static str)> {
            std::mem::take(&mut *self.entries.lock())
        }
    }

    struct LogMedia {
        id: u32,
        log: CommandLog,
        reject: bool,
    }

    impl MediaElement for LogMedia {
        fn play(&mut self) -> Result<(), PlayRejected> {
            self.log.entries.lock().push((self.id, "play"));
            if self.reject {
                Err(PlayRejected)
            } else {
                Ok(())
            }
        }

        fn pause(&mut self) {
            self.log.entries.lock().push((self.id, "pause"));
        }

        fn rewind(&mut self) {
            self.log.entries.lock().push((self.id, "rewind"));
        }

        fn set_muted(&mut self, muted: bool) {
            self.log
                .entries
                .lock()
                .push((self.id, if muted { "mute" } else { "unmute" }));
        }
    }

    struct LogFactory {
        log: CommandLog,
        reject: bool,
    }

    impl MediaFactory for LogFactory {
        fn create(&self, slot: &Slot) -> Box<dyn MediaElement> {
            Box::new(LogMedia {
                id: slot.item.id,
                log: self.log.clone(),
                reject: self.reject,
            })
        }
    }

    fn engine_with_log() -> (FeedEngine, CommandLog) {
        let log = CommandLog::default();
        let factory = Arc::new(LogFactory {
            log: log.clone(),
            reject: false,
        });
        let engine = FeedEngine::new(catalog::builtin(), factory).unwrap();
        (engine, log)
    }

    fn activate(engine: &mut FeedEngine, index: usize, now: Instant) -> Vec<Reaction> {
        let key = engine.slots()[index].key;
        engine.handle_intersection(
            IntersectionEvent {
                key,
                index,
                ratio: 0.6,
            },
            now,
        )
    }

    #[test]
    fn exactly_one_item_plays_at_a_time() {
        let (mut engine, _log) = engine_with_log();
        let now = Instant::now();
        activate(&mut engine, 0, now);
        assert_eq!(engine.playing_count(), 1);
        activate(&mut engine, 1, now);
        assert_eq!(engine.playing_count(), 1);
        activate(&mut engine, 4, now);
        assert_eq!(engine.playing_count(), 1);
        assert_eq!(engine.active_index(), Some(4));
    }

    #[test]
    fn previous_item_settles_before_the_next_plays() {
        let (mut engine, log) = engine_with_log();
        let now = Instant::now();
        activate(&mut engine, 0, now);
        let first_id = engine.slots()[0].item.id;
        let second_id = engine.slots()[1].item.id;
        log.take();

        activate(&mut engine, 1, now);
        let entries = log.take();
        let pause_at = entries
            .iter()
            .position(|entry| *entry == (first_id, "pause"))
            .expect("previous paused");
        let rewind_at = entries
            .iter()
            .position(|entry| *entry == (first_id, "rewind"))
            .expect("previous rewound");
        let play_at = entries
            .iter()
            .position(|entry| *entry == (second_id, "play"))
            .expect("next played");
        assert!(pause_at < play_at && rewind_at < play_at);
    }

    #[test]
    fn activation_near_the_tail_extends_the_sequence() {
        let (mut engine, _log) = engine_with_log();
        let now = Instant::now();
        let batch = engine.slots().len();
        let reactions = activate(&mut engine, batch - 1, now);
        assert!(reactions
            .iter()
            .any(|reaction| matches!(reaction, Reaction::Extended { appended } if *appended == batch)));
        assert_eq!(engine.slot_count(), batch * 2);
        // Appending never moves the active position.
        assert_eq!(engine.active_index(), Some(batch - 1));
    }

    #[test]
    fn refresh_replaces_once_and_resets_to_head() {
        let (mut engine, _log) = engine_with_log();
        let start = Instant::now();
        activate(&mut engine, 3, start);

        assert_eq!(engine.request_refresh(start), vec![Reaction::RefreshStarted]);
        // A second request while one is in flight is ignored.
        assert!(engine.request_refresh(start + Duration::from_millis(50)).is_empty());

        let reactions = engine.tick(start + REFRESH_LATENCY);
        assert!(reactions.contains(&Reaction::RefreshCompleted));
        assert!(reactions.contains(&Reaction::ScrollReset));
        assert_eq!(engine.active_index(), Some(0));
        assert_eq!(engine.playing_count(), 1);

        // Nothing further completes.
        assert!(engine.tick(start + REFRESH_LATENCY * 2).is_empty());
    }

    #[test]
    fn tap_toggles_mute_and_long_press_does_not() {
        let (mut engine, _log) = engine_with_log();
        let now = Instant::now();
        activate(&mut engine, 0, now);
        assert!(engine.is_muted());

        engine.press_start((5.0, 5.0), PressTarget::Media, false, now);
        let reactions = engine.press_end(now + Duration::from_millis(80));
        assert_eq!(reactions, vec![Reaction::MuteToggled(false)]);

        engine.press_start((5.0, 5.0), PressTarget::Media, false, now);
        engine.tick(now + LONG_PRESS_DELAY);
        let reactions = engine.press_end(now + Duration::from_millis(400));
        assert!(reactions.is_empty());
        assert!(!engine.is_muted());
    }

    #[test]
    fn long_press_pauses_and_release_resumes() {
        let (mut engine, log) = engine_with_log();
        let now = Instant::now();
        activate(&mut engine, 0, now);
        let id = engine.slots()[0].item.id;
        log.take();

        engine.press_start((5.0, 5.0), PressTarget::Media, false, now);
        engine.tick(now + LONG_PRESS_DELAY);
        assert_eq!(engine.playing_count(), 0);
        assert!(log.take().contains(&(id, "pause")));

        engine.press_end(now + Duration::from_millis(300));
        assert_eq!(engine.playing_count(), 1);
    }

    #[test]
    fn nested_control_tap_does_not_toggle_mute() {
        let (mut engine, _log) = engine_with_log();
        let now = Instant::now();
        activate(&mut engine, 0, now);

        engine.press_start(
            (5.0, 5.0),
            PressTarget::Control(Control::Follow),
            false,
            now,
        );
        let reactions = engine.press_end(now);
        assert_eq!(reactions, vec![Reaction::ControlActivated(Control::Follow)]);
        assert!(engine.is_muted());
    }

    #[test]
    fn mute_button_toggles_exactly_once() {
        let (mut engine, _log) = engine_with_log();
        let now = Instant::now();
        engine.press_start((5.0, 5.0), PressTarget::Control(Control::Mute), false, now);
        let reactions = engine.press_end(now);
        assert_eq!(
            reactions,
            vec![
                Reaction::MuteToggled(false),
                Reaction::ControlActivated(Control::Mute)
            ]
        );
    }

    #[test]
    fn overlay_suspends_playback_and_restores_it() {
        let (mut engine, _log) = engine_with_log();
        let now = Instant::now();
        activate(&mut engine, 0, now);
        assert_eq!(engine.playing_count(), 1);

        engine.open_overlay(now);
        assert!(engine.overlay_open());
        assert_eq!(engine.playing_count(), 0);
        assert!(!engine.overlay_interactable(now));
        assert!(engine.overlay_interactable(now + crate::overlay::OVERLAY_INTERACT_DELAY));

        engine.close_overlay();
        assert!(!engine.overlay_open());
        assert_eq!(engine.playing_count(), 1);
    }

    #[test]
    fn overlay_suppresses_feed_gestures() {
        let (mut engine, _log) = engine_with_log();
        let now = Instant::now();
        activate(&mut engine, 0, now);
        engine.open_overlay(now);

        engine.press_start((5.0, 5.0), PressTarget::Media, true, now);
        engine.press_move((5.0, 200.0));
        assert!(engine.press_end(now + Duration::from_millis(50)).is_empty());
        assert!(!engine.is_refreshing());
        assert!(engine.is_muted());
    }

    #[test]
    fn play_rejection_degrades_to_paused_affordance() {
        let log = CommandLog::default();
        let factory = Arc::new(LogFactory {
            log,
            reject: true,
        });
        let mut engine = FeedEngine::new(catalog::builtin(), factory).unwrap();
        let now = Instant::now();
        activate(&mut engine, 0, now);
        assert_eq!(engine.playing_count(), 0);

        let key = engine.slots()[0].key;
        engine.media_event(key, MediaEvent::CanPlay);
        let view = engine.slot_view(0, now);
        assert_eq!(view.visual, VisualState::PausedAffordance);
    }

    #[test]
    fn stale_media_events_are_dropped() {
        let (mut engine, _log) = engine_with_log();
        let start = Instant::now();
        let stale_key = engine.slots()[0].key;
        engine.request_refresh(start);
        engine.tick(start + REFRESH_LATENCY);
        // The old slot is gone; its late signal is a no-op.
        engine.media_event(stale_key, MediaEvent::Playing);
        let view = engine.slot_view(0, start + REFRESH_LATENCY);
        assert_eq!(view.visual, VisualState::Buffering);
    }

    #[test]
    fn slot_views_expose_the_preload_window() {
        let (mut engine, _log) = engine_with_log();
        let now = Instant::now();
        activate(&mut engine, 3, now);
        assert_eq!(engine.slot_view(3, now).preload, PreloadHint::Full);
        assert_eq!(engine.slot_view(1, now).preload, PreloadHint::Full);
        assert_eq!(engine.slot_view(5, now).preload, PreloadHint::Full);
        assert_eq!(engine.slot_view(0, now).preload, PreloadHint::MetadataOnly);
        assert_eq!(engine.slot_view(6, now).preload, PreloadHint::MetadataOnly);
    }
}
