use std::collections::HashMap;
use std::io::{self, Stdout};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::Receiver;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseEvent,
    MouseEventKind,
};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, window_size, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use parking_lot::Mutex;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Clear, Padding, Paragraph};
use ratatui::{Frame, Terminal};
use textwrap::{wrap, Options as WrapOptions};
use unicode_width::UnicodeWidthStr;

use crate::catalog::{self, ItemDescriptor};
use crate::engine::{FeedEngine, Reaction};
use crate::feed::SlotKey;
use crate::gesture::{Control, PressTarget, PULL_REFRESH_THRESHOLD};
use crate::media;
use crate::playback::{MediaEvent, VisualState};
use crate::player::Placement;
use crate::preload::{preload_hint, PreloadHint};

const COLOR_BG: Color = Color::Rgb(30, 30, 46);
const COLOR_PANEL_BG: Color = Color::Rgb(24, 24, 36);
const COLOR_BORDER: Color = Color::Rgb(49, 50, 68);
const COLOR_TEXT_PRIMARY: Color = Color::Rgb(205, 214, 244);
const COLOR_TEXT_SECONDARY: Color = Color::Rgb(166, 173, 200);
const COLOR_ACCENT: Color = Color::Rgb(137, 180, 250);
const COLOR_SUCCESS: Color = Color::Rgb(166, 227, 161);
const COLOR_ERROR: Color = Color::Rgb(243, 139, 168);

const CTA_ACCENTS: [Color; catalog::CTA_ACCENT_COUNT] = [
    Color::Rgb(59, 130, 246),
    Color::Rgb(34, 197, 94),
    Color::Rgb(147, 51, 234),
    Color::Rgb(239, 68, 68),
    Color::Rgb(99, 102, 241),
    Color::Rgb(236, 72, 153),
    Color::Rgb(20, 184, 166),
    Color::Rgb(249, 115, 22),
];

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

const PROJECT_LINK_URL: &str = "https://github.com/reel-tui/reel-tui";
const SUPPORT_LINK_URL: &str = "https://ko-fi.com/reeltui";

struct Spinner {
    index: usize,
    last_tick: Instant,
}

impl Spinner {
    fn new() -> Self {
        Self {
            index: 0,
            last_tick: Instant::now(),
        }
    }

    fn frame(&self) -> &'static str {
        SPINNER_FRAMES[self.index % SPINNER_FRAMES.len()]
    }

    fn advance(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_tick) >= Duration::from_millis(120) {
            self.index = (self.index + 1) % SPINNER_FRAMES.len();
            self.last_tick = now;
            true
        } else {
            false
        }
    }

    fn reset(&mut self) {
        self.index = 0;
        self.last_tick = Instant::now();
    }
}

#[derive(Clone, Copy)]
struct CellMetrics {
    width: f32,
    height: f32,
}

fn terminal_cell_metrics() -> CellMetrics {
    static METRICS: OnceLock<CellMetrics> = OnceLock::new();
    *METRICS.get_or_init(|| {
        if let Ok(size) = window_size() {
            if size.columns > 0 && size.rows > 0 && size.width > 0 && size.height > 0 {
                return CellMetrics {
                    width: size.width as f32 / size.columns as f32,
                    height: size.height as f32 / size.rows as f32,
                };
            }
        }
        CellMetrics {
            width: 8.0,
            height: 16.0,
        }
    })
}

pub struct Options {
    pub engine: Option<FeedEngine>,
    pub status_message: String,
    pub media_handle: Option<media::Handle>,
    pub media_events: Option<Receiver<(SlotKey, MediaEvent)>>,
    pub placement: Option<Arc<Mutex<Placement>>>,
    pub config_path: String,
}

/// Regions a press can land on, rebuilt each draw for hit testing.
#[derive(Default, Clone, Copy)]
struct HitRegions {
    logo: Option<Rect>,
    mute: Option<Rect>,
    follow: Option<Rect>,
    cta: Option<Rect>,
    like: Option<Rect>,
    comment: Option<Rect>,
    send: Option<Rect>,
    save: Option<Rect>,
    overlay_close: Option<Rect>,
}

fn rect_contains(rect: Rect, col: u16, row: u16) -> bool {
    col >= rect.x && col < rect.x + rect.width && row >= rect.y && row < rect.y + rect.height
}

pub struct Model {
    engine: Option<FeedEngine>,
    status_message: String,
    media_handle: Option<media::Handle>,
    media_events: Option<Receiver<(SlotKey, MediaEvent)>>,
    placement: Option<Arc<Mutex<Placement>>>,
    config_path: String,
    scroll_slot: usize,
    needs_redraw: bool,
    bootstrapped: bool,
    spinner: Spinner,
    regions: HitRegions,
    scheduled: HashMap<SlotKey, PreloadHint>,
}

impl Model {
    pub fn new(options: Options) -> Self {
        Self {
            engine: options.engine,
            status_message: options.status_message,
            media_handle: options.media_handle,
            media_events: options.media_events,
            placement: options.placement,
            config_path: options.config_path,
            scroll_slot: 0,
            needs_redraw: true,
            bootstrapped: false,
            spinner: Spinner::new(),
            regions: HitRegions::default(),
            scheduled: HashMap::new(),
        }
    }

    fn mark_dirty(&mut self) {
        self.needs_redraw = true;
    }

    pub fn run(&mut self) -> Result<()> {
        let mut stdout = io::stdout();
        enable_raw_mode()?;
        stdout.execute(EnterAlternateScreen)?;
        stdout.execute(EnableMouseCapture)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode()?;
        terminal.backend_mut().execute(DisableMouseCapture)?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        let mut last_tick = Instant::now();
        let tick_rate = Duration::from_millis(120);

        loop {
            if self.poll_async() {
                self.mark_dirty();
            }

            if self.needs_redraw {
                terminal.draw(|frame| self.draw(frame))?;
                self.needs_redraw = false;
            }

            if !self.bootstrapped {
                self.bootstrapped = true;
                self.activate_scroll_slot();
                self.schedule_preloads();
            }

            let timeout = tick_rate
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_millis(16));

            if event::poll(timeout)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        match self.handle_key(key.code) {
                            Ok(true) => break,
                            Ok(false) => {}
                            Err(err) => {
                                self.status_message = format!("Error: {}", err);
                                self.mark_dirty();
                            }
                        }
                    }
                    Event::Mouse(mouse) => {
                        self.handle_mouse(mouse);
                    }
                    Event::FocusLost => {
                        // The pointer left with a press in flight; abort the
                        // session so no hold pause sticks.
                        let reactions = match self.engine.as_mut() {
                            Some(engine) => engine.press_cancel(Instant::now()),
                            None => Vec::new(),
                        };
                        self.process_reactions(reactions);
                    }
                    Event::Resize(_, _) => self.mark_dirty(),
                    _ => {}
                }
            }

            if self.poll_async() {
                self.mark_dirty();
            }

            if last_tick.elapsed() >= tick_rate {
                last_tick = Instant::now();
                let now = Instant::now();
                let reactions = match self.engine.as_mut() {
                    Some(engine) => engine.tick(now),
                    None => Vec::new(),
                };
                self.process_reactions(reactions);
                if self.is_busy() {
                    if self.spinner.advance() {
                        self.mark_dirty();
                    }
                } else {
                    self.spinner.reset();
                }
            }
        }

        Ok(())
    }

    fn is_busy(&self) -> bool {
        let Some(engine) = self.engine.as_ref() else {
            return false;
        };
        if engine.is_refreshing() {
            return true;
        }
        match engine.active_index() {
            Some(index) => {
                engine.slot_view(index, Instant::now()).visual == VisualState::Buffering
            }
            None => false,
        }
    }

    /// Drains lifecycle events from the player threads into the engine.
    fn poll_async(&mut self) -> bool {
        let Some(events) = self.media_events.as_ref() else {
            return false;
        };
        let Some(engine) = self.engine.as_mut() else {
            return false;
        };
        let mut changed = false;
        while let Ok((key, event)) = events.try_recv() {
            engine.media_event(key, event);
            changed = true;
        }
        changed
    }

    fn handle_key(&mut self, code: KeyCode) -> Result<bool> {
        let now = Instant::now();
        if let Some(engine) = self.engine.as_mut() {
            if engine.overlay_open() {
                match code {
                    KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q') => {
                        let reactions = engine.close_overlay();
                        self.process_reactions(reactions);
                    }
                    _ => {}
                }
                return Ok(false);
            }
        }

        match code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Char('j') | KeyCode::Down => self.scroll_to(self.scroll_slot + 1),
            KeyCode::Char('k') | KeyCode::Up => {
                self.scroll_to(self.scroll_slot.saturating_sub(1))
            }
            KeyCode::Char('m') => {
                if let Some(engine) = self.engine.as_mut() {
                    let reaction = engine.toggle_mute();
                    self.process_reactions(vec![reaction]);
                }
            }
            KeyCode::Char('r') => {
                if let Some(engine) = self.engine.as_mut() {
                    let reactions = engine.request_refresh(now);
                    self.process_reactions(reactions);
                }
            }
            KeyCode::Char('o') => {
                if let Some(engine) = self.engine.as_mut() {
                    let reactions = engine.open_overlay(now);
                    self.process_reactions(reactions);
                }
            }
            _ => {}
        }
        Ok(false)
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        let now = Instant::now();
        let Some(engine) = self.engine.as_mut() else {
            return;
        };

        if engine.overlay_open() {
            if let MouseEventKind::Down(_) = mouse.kind {
                if !engine.overlay_interactable(now) {
                    return;
                }
                if self
                    .regions
                    .overlay_close
                    .map(|rect| rect_contains(rect, mouse.column, mouse.row))
                    .unwrap_or(true)
                {
                    let reactions = engine.close_overlay();
                    self.process_reactions(reactions);
                }
            }
            return;
        }

        match mouse.kind {
            MouseEventKind::Down(_) => {
                let target = self.hit_target(mouse.column, mouse.row);
                let pos = to_units(mouse.column, mouse.row);
                let at_top = self.scroll_slot == 0;
                if let Some(engine) = self.engine.as_mut() {
                    engine.press_start(pos, target, at_top, now);
                }
                self.mark_dirty();
            }
            MouseEventKind::Drag(_) => {
                let pos = to_units(mouse.column, mouse.row);
                if let Some(engine) = self.engine.as_mut() {
                    engine.press_move(pos);
                }
                self.mark_dirty();
            }
            MouseEventKind::Up(_) => {
                let reactions = match self.engine.as_mut() {
                    Some(engine) => engine.press_end(now),
                    None => Vec::new(),
                };
                self.process_reactions(reactions);
                self.mark_dirty();
            }
            MouseEventKind::ScrollDown => self.scroll_to(self.scroll_slot + 1),
            MouseEventKind::ScrollUp => self.scroll_to(self.scroll_slot.saturating_sub(1)),
            _ => {}
        }
    }

    fn hit_target(&self, col: u16, row: u16) -> PressTarget {
        let regions = &self.regions;
        let controls = [
            (regions.logo, Control::Logo),
            (regions.mute, Control::Mute),
            (regions.follow, Control::Follow),
            (regions.cta, Control::CallToAction),
            (regions.like, Control::Like),
            (regions.comment, Control::Comment),
            (regions.send, Control::Send),
            (regions.save, Control::Save),
        ];
        for (rect, control) in controls {
            if rect.map(|rect| rect_contains(rect, col, row)).unwrap_or(false) {
                return PressTarget::Control(control);
            }
        }
        PressTarget::Media
    }

    /// Snap scroll: every programmatic move lands a whole slot in view, so
    /// the slot reports full visibility.
    fn scroll_to(&mut self, slot: usize) {
        let Some(engine) = self.engine.as_ref() else {
            return;
        };
        if engine.overlay_open() || engine.slot_count() == 0 {
            return;
        }
        let clamped = slot.min(engine.slot_count() - 1);
        if clamped == self.scroll_slot {
            return;
        }
        self.scroll_slot = clamped;
        self.activate_scroll_slot();
        self.mark_dirty();
    }

    fn activate_scroll_slot(&mut self) {
        let now = Instant::now();
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        let Some(slot) = engine.slots().get(self.scroll_slot) else {
            return;
        };
        let event = crate::tracker::IntersectionEvent {
            key: slot.key,
            index: self.scroll_slot,
            ratio: 1.0,
        };
        let reactions = engine.handle_intersection(event, now);
        self.process_reactions(reactions);
    }

    fn process_reactions(&mut self, reactions: Vec<Reaction>) {
        for reaction in reactions {
            match reaction {
                Reaction::MuteToggled(muted) => {
                    self.status_message = if muted {
                        "Sound off".to_string()
                    } else {
                        "Sound on".to_string()
                    };
                }
                Reaction::RefreshStarted => {
                    self.status_message = "Refreshing feed…".to_string();
                }
                Reaction::RefreshCompleted => {
                    self.status_message = "Feed refreshed".to_string();
                    self.scheduled.clear();
                    self.schedule_preloads();
                }
                Reaction::ScrollReset => {
                    self.scroll_slot = 0;
                }
                Reaction::ActiveChanged { .. } => {
                    self.schedule_preloads();
                }
                Reaction::Extended { .. } => {
                    self.schedule_preloads();
                }
                Reaction::ControlActivated(control) => {
                    self.status_message = self.control_message(control);
                }
                Reaction::OverlayOpened | Reaction::OverlayClosed => {}
            }
            self.mark_dirty();
        }
    }

    fn control_message(&self, control: Control) -> String {
        let author = self
            .engine
            .as_ref()
            .and_then(|engine| engine.active_index())
            .and_then(|index| {
                self.engine
                    .as_ref()
                    .map(|engine| engine.slots()[index].item.author.clone())
            })
            .unwrap_or_default();
        match control {
            Control::Follow => format!("Following {}", author),
            Control::CallToAction => "Opening offer…".to_string(),
            Control::Like => "Liked".to_string(),
            Control::Comment => "Comments are not available offline".to_string(),
            Control::Send => "Sharing is not available offline".to_string(),
            Control::Save => "Saved".to_string(),
            Control::Mute | Control::Logo => self.status_message.clone(),
        }
    }

    /// Feeds the preload window to the fetch pool. The policy itself is
    /// stateless; this only avoids re-submitting an unchanged hint.
    fn schedule_preloads(&mut self) {
        let Some(handle) = self.media_handle.as_ref() else {
            return;
        };
        let Some(engine) = self.engine.as_ref() else {
            return;
        };
        let active = engine.active_index();
        for (index, slot) in engine.slots().iter().enumerate() {
            let hint = preload_hint(index, active);
            if self.scheduled.get(&slot.key) == Some(&hint) {
                continue;
            }
            self.scheduled.insert(slot.key, hint);
            let _ = handle.enqueue(media::Request::new(slot.item.src.clone(), hint));
        }
    }

    fn draw(&mut self, frame: &mut Frame) {
        let area = frame.size();
        frame.render_widget(Block::default().style(Style::default().bg(COLOR_BG)), area);

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(1)])
            .split(area);
        let feed_area = chunks[0];
        let status_area = chunks[1];

        self.regions = HitRegions::default();

        if self.engine.is_some() {
            self.draw_feed(frame, feed_area);
        } else {
            self.draw_empty_state(frame, feed_area);
        }

        self.draw_status(frame, status_area);

        let overlay_open = self
            .engine
            .as_ref()
            .map(|engine| engine.overlay_open())
            .unwrap_or(false);
        if overlay_open {
            self.draw_overlay(frame, feed_area);
        }
    }

    fn draw_empty_state(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(COLOR_BORDER))
            .style(Style::default().bg(COLOR_PANEL_BG));
        let text = Text::from(vec![
            Line::from(""),
            Line::from(Span::styled(
                "Nothing to watch yet",
                Style::default()
                    .fg(COLOR_TEXT_PRIMARY)
                    .add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(Span::styled(
                format!("Add items to a catalog file and point {} at it.", self.config_path),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            )),
        ]);
        frame.render_widget(
            Paragraph::new(text).alignment(Alignment::Center).block(block),
            area,
        );
    }

    fn draw_feed(&mut self, frame: &mut Frame, area: Rect) {
        let now = Instant::now();
        let (index, item, view, pull, refreshing) = {
            let Some(engine) = self.engine.as_ref() else {
                return;
            };
            if engine.slot_count() == 0 {
                return;
            }
            let index = self.scroll_slot.min(engine.slot_count() - 1);
            (
                index,
                engine.slots()[index].item.clone(),
                engine.slot_view(index, now),
                engine.pull_distance(),
                engine.is_refreshing(),
            )
        };

        // Pull indicator claims the top rows while a pull or refresh is
        // under way.
        let show_pull = pull > 0.0 || refreshing;
        let (pull_area, slot_area) = if show_pull && area.height > 4 {
            let split = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(2), Constraint::Min(1)])
                .split(area);
            (Some(split[0]), split[1])
        } else {
            (None, area)
        };

        if let Some(pull_area) = pull_area {
            self.draw_pull_indicator(frame, pull_area, pull);
        }

        self.draw_slot(frame, slot_area, index, item, view);
    }

    fn draw_pull_indicator(&self, frame: &mut Frame, area: Rect, pull: f32) {
        let engine = self.engine.as_ref();
        let refreshing = engine.map(|engine| engine.is_refreshing()).unwrap_or(false);
        let armed = engine.map(|engine| engine.pull_armed()).unwrap_or(false);
        let line = if refreshing {
            Line::from(vec![
                Span::styled(self.spinner.frame(), Style::default().fg(COLOR_ACCENT)),
                Span::styled(" Refreshing…", Style::default().fg(COLOR_TEXT_SECONDARY)),
            ])
        } else if armed {
            Line::from(Span::styled(
                "↑ Release to refresh",
                Style::default().fg(COLOR_SUCCESS),
            ))
        } else {
            let filled = ((pull / PULL_REFRESH_THRESHOLD) * 10.0) as usize;
            let gauge: String = "▪".repeat(filled.min(10));
            Line::from(vec![
                Span::styled("↓ Pull to refresh ", Style::default().fg(COLOR_TEXT_SECONDARY)),
                Span::styled(gauge, Style::default().fg(COLOR_ACCENT)),
            ])
        };
        frame.render_widget(
            Paragraph::new(line).alignment(Alignment::Center),
            area,
        );
    }

    fn draw_slot(
        &mut self,
        frame: &mut Frame,
        area: Rect,
        index: usize,
        item: ItemDescriptor,
        view: crate::engine::SlotView,
    ) {
        let engine_len = self
            .engine
            .as_ref()
            .map(|engine| engine.slot_count())
            .unwrap_or(0);

        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(COLOR_BORDER))
            .title(Span::styled(
                format!(" {} / {} ", index + 1, engine_len),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            ));
        let inner = block.inner(area);
        frame.render_widget(block, area);

        if inner.height < 6 || inner.width < 20 {
            return;
        }

        // Header row: logo button center, mute toggle right.
        let header = Rect::new(inner.x, inner.y, inner.width, 1);
        let logo_text = "· reel ·";
        let logo_width = logo_text.width() as u16 + 2;
        let logo_rect = Rect::new(
            inner.x + (inner.width.saturating_sub(logo_width)) / 2,
            header.y,
            logo_width,
            1,
        );
        self.regions.logo = Some(logo_rect);
        frame.render_widget(
            Paragraph::new(Line::from(Span::styled(
                logo_text,
                Style::default()
                    .fg(COLOR_TEXT_PRIMARY)
                    .add_modifier(Modifier::BOLD),
            )))
            .alignment(Alignment::Center),
            logo_rect,
        );

        let mute_label = if view.is_muted { " 🔇 " } else { " 🔊 " };
        let mute_rect = Rect::new(inner.x + inner.width.saturating_sub(5), header.y, 5, 1);
        self.regions.mute = Some(mute_rect);
        frame.render_widget(
            Paragraph::new(Line::from(Span::styled(
                mute_label,
                Style::default().fg(COLOR_TEXT_PRIMARY),
            )))
            .alignment(Alignment::Right),
            mute_rect,
        );

        // Video surface: the player paints over this region; we only record
        // its placement and draw state glyphs.
        let footer_height = 7u16.min(inner.height.saturating_sub(2));
        let video_area = Rect::new(
            inner.x,
            inner.y + 1,
            inner.width,
            inner.height.saturating_sub(1 + footer_height),
        );
        self.update_placement(video_area);

        let glyph = match view.visual {
            VisualState::Buffering => Some(Span::styled(
                format!("{} loading", self.spinner.frame()),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            )),
            VisualState::HoldPaused => Some(Span::styled(
                "⏸",
                Style::default().fg(COLOR_TEXT_PRIMARY),
            )),
            VisualState::PausedAffordance => Some(Span::styled(
                "▶",
                Style::default().fg(COLOR_TEXT_PRIMARY),
            )),
            VisualState::Playing | VisualState::Inactive => None,
        };
        if let Some(glyph) = glyph {
            let glyph_rect = Rect::new(
                video_area.x,
                video_area.y + video_area.height / 2,
                video_area.width,
                1,
            );
            frame.render_widget(
                Paragraph::new(Line::from(glyph)).alignment(Alignment::Center),
                glyph_rect,
            );
        }

        // Footer: author line, call to action, caption, counters column.
        let footer = Rect::new(
            inner.x,
            inner.y + inner.height - footer_height,
            inner.width,
            footer_height,
        );
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(10), Constraint::Length(12)])
            .split(footer);
        self.draw_footer_text(frame, columns[0], &item, view);
        self.draw_counters(frame, columns[1], &item);
    }

    fn draw_footer_text(
        &mut self,
        frame: &mut Frame,
        area: Rect,
        item: &ItemDescriptor,
        view: crate::engine::SlotView,
    ) {
        let mut lines: Vec<Line> = Vec::new();

        let mut author_spans = vec![Span::styled(
            item.author.clone(),
            Style::default()
                .fg(COLOR_TEXT_PRIMARY)
                .add_modifier(Modifier::BOLD),
        )];
        if item.verified {
            author_spans.push(Span::styled(" ✔", Style::default().fg(COLOR_ACCENT)));
        }
        author_spans.push(Span::raw("  "));
        let follow_label = "[ Follow ]";
        let author_width: u16 = author_spans
            .iter()
            .map(|span| span.content.width() as u16)
            .sum();
        author_spans.push(Span::styled(
            follow_label,
            Style::default().fg(COLOR_TEXT_SECONDARY),
        ));
        lines.push(Line::from(author_spans));
        self.regions.follow = Some(Rect::new(
            area.x + author_width,
            area.y,
            follow_label.width() as u16,
            1,
        ));

        if let Some(cta) = catalog::call_to_action(item) {
            let revealed = view.is_active && view.cta_revealed;
            let style = if revealed {
                Style::default()
                    .fg(Color::White)
                    .bg(CTA_ACCENTS[cta.accent])
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(COLOR_TEXT_SECONDARY).bg(COLOR_PANEL_BG)
            };
            let label = format!("  {}  ›", cta.label);
            lines.push(Line::from(Span::styled(label.clone(), style)));
            self.regions.cta = Some(Rect::new(
                area.x,
                area.y + 1,
                (label.width() as u16).min(area.width),
                1,
            ));
        } else {
            lines.push(Line::from(""));
        }

        let caption_width = area.width.saturating_sub(2) as usize;
        if caption_width > 0 {
            for wrapped in wrap(&item.caption, WrapOptions::new(caption_width)).iter().take(2) {
                lines.push(Line::from(Span::styled(
                    wrapped.to_string(),
                    Style::default().fg(COLOR_TEXT_PRIMARY),
                )));
            }
        }
        lines.push(Line::from(Span::styled(
            "Sponsored",
            Style::default()
                .fg(COLOR_TEXT_SECONDARY)
                .add_modifier(Modifier::DIM),
        )));

        frame.render_widget(Paragraph::new(lines), area);
    }

    fn draw_counters(&mut self, frame: &mut Frame, area: Rect, item: &ItemDescriptor) {
        let rows = [
            ("♥", item.likes.as_str()),
            ("🗨", item.comments.as_str()),
            ("➤", item.sends.as_str()),
            ("⛉", ""),
        ];
        let mut lines = Vec::new();
        for (icon, label) in rows {
            let text = if label.is_empty() {
                icon.to_string()
            } else {
                format!("{} {}", icon, label)
            };
            lines.push(Line::from(Span::styled(
                text,
                Style::default().fg(COLOR_TEXT_PRIMARY),
            )));
        }
        frame.render_widget(
            Paragraph::new(lines).alignment(Alignment::Right),
            area,
        );

        let row = |offset: u16| {
            (offset < area.height)
                .then(|| Rect::new(area.x, area.y + offset, area.width, 1))
        };
        self.regions.like = row(0);
        self.regions.comment = row(1);
        self.regions.send = row(2);
        self.regions.save = row(3);
    }

    fn draw_overlay(&mut self, frame: &mut Frame, area: Rect) {
        let now = Instant::now();
        let engine = match self.engine.as_ref() {
            Some(engine) => engine,
            None => return,
        };
        if area.width < 28 || area.height < 8 {
            return;
        }
        let width = area.width.saturating_sub(8).clamp(24, 52);
        let height = 10u16.min(area.height.saturating_sub(2));
        let rect = Rect::new(
            area.x + (area.width - width) / 2,
            area.y + (area.height.saturating_sub(height)) / 2,
            width,
            height,
        );
        frame.render_widget(Clear, rect);

        let interactable = engine.overlay_interactable(now);
        let close_label = if interactable { "[ ✕ close ]" } else { "  ✕ close  " };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(COLOR_ACCENT))
            .style(Style::default().bg(COLOR_PANEL_BG))
            .padding(Padding::uniform(1))
            .title(Span::styled(
                " reel ",
                Style::default()
                    .fg(COLOR_TEXT_PRIMARY)
                    .add_modifier(Modifier::BOLD),
            ));
        let inner = block.inner(rect);

        let mut lines = vec![
            Line::from(Span::styled(
                "An endless feed for your terminal.",
                Style::default().fg(COLOR_TEXT_PRIMARY),
            )),
            Line::from(""),
            Line::from(Span::styled(
                format!("Project   {}", PROJECT_LINK_URL),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            )),
            Line::from(Span::styled(
                format!("Support   {}", SUPPORT_LINK_URL),
                Style::default().fg(COLOR_TEXT_SECONDARY),
            )),
            Line::from(""),
        ];
        if interactable {
            lines.push(Line::from(Span::styled(
                close_label,
                Style::default().fg(COLOR_ACCENT),
            )));
        } else {
            lines.push(Line::from(Span::styled(
                "…",
                Style::default().fg(COLOR_TEXT_SECONDARY),
            )));
        }
        frame.render_widget(Paragraph::new(lines).block(block), rect);

        self.regions.overlay_close = Some(Rect::new(
            inner.x,
            inner.y + inner.height.saturating_sub(1),
            inner.width,
            1,
        ));
    }

    fn draw_status(&self, frame: &mut Frame, area: Rect) {
        let engine = self.engine.as_ref();
        let muted = engine.map(|engine| engine.is_muted()).unwrap_or(true);
        let hints = format!(
            "j/k scroll · tap/m {} · hold pause · r refresh · o about · q quit",
            if muted { "unmute" } else { "mute" }
        );
        let style = if self.status_message.starts_with("Error") {
            Style::default().fg(COLOR_ERROR)
        } else {
            Style::default().fg(COLOR_TEXT_SECONDARY)
        };
        let line = Line::from(vec![
            Span::styled(self.status_message.clone(), style),
            Span::raw("  "),
            Span::styled(hints, Style::default().fg(COLOR_BORDER)),
        ]);
        frame.render_widget(Paragraph::new(line), area);
    }

    /// Keeps the shared placement cell in sync with the video region so
    /// player spawns land where the slot is drawn.
    fn update_placement(&self, video_area: Rect) {
        let Some(cell) = self.placement.as_ref() else {
            return;
        };
        let metrics = terminal_cell_metrics();
        let mut placement = cell.lock();
        placement.col = video_area.x;
        placement.row = video_area.y;
        placement.term_cols = video_area.width as i32;
        placement.term_rows = video_area.height as i32;
        placement.pixel_width = (video_area.width as f32 * metrics.width) as i32;
        placement.pixel_height = (video_area.height as f32 * metrics.height) as i32;
    }
}

/// Maps terminal cells onto the gesture interpreter's pixel-like units, so
/// the pull threshold means the same distance it does on a touch screen.
fn to_units(col: u16, row: u16) -> (f32, f32) {
    let metrics = terminal_cell_metrics();
    (col as f32 * metrics.width, row as f32 * metrics.height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_containment_is_half_open() {
        let rect = Rect::new(2, 3, 4, 2);
        assert!(rect_contains(rect, 2, 3));
        assert!(rect_contains(rect, 5, 4));
        assert!(!rect_contains(rect, 6, 3));
        assert!(!rect_contains(rect, 2, 5));
    }

    #[test]
    fn spinner_cycles_through_frames() {
        let mut spinner = Spinner::new();
        let first = spinner.frame();
        spinner.last_tick = Instant::now() - Duration::from_millis(200);
        assert!(spinner.advance());
        assert_ne!(spinner.frame(), first);
        spinner.reset();
        assert_eq!(spinner.frame(), first);
    }
}
