//! Terminal front-end over a [`ReaderSession`].

use std::time::Duration;

use anyhow::Result;
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind};
use log::debug;
use ratatui::{
    Frame, Terminal,
    backend::Backend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Gauge, Paragraph, Wrap},
};

use crate::event_source::EventSource;
use crate::hud::{HudMessage, HudMode};
use crate::metrics::Viewport;
use crate::page_view::{CellSize, PageStrip, column_area};
use crate::session::{ChapterDirection, ReaderSession};
use crate::settings::TerminalSettings;
use crate::style::{FONT_SIZE_STEP, LINE_HEIGHT_STEP};
use crate::transition::TurnOutcome;

const IDLE_POLL: Duration = Duration::from_millis(250);
const HUD_DURATION: Duration = Duration::from_millis(1500);
const MAX_EVENTS_PER_FRAME: usize = 50;
const HELP_TEXT: &str =
    "←/→ page  n/p point  N/P chapter  +/- gap  [/] line  w/W weight  f font  t theme  </> speed  v voice  r read  q quit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppAction {
    Quit,
}

pub struct App {
    pub session: ReaderSession,
    cell: CellSize,
    tick: Duration,
    hud: Option<HudMessage>,
    should_quit: bool,
}

/// Header, page frame, progress bar, help line.
fn screen_layout(area: Rect) -> [Rect; 4] {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(1),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(area);
    [chunks[0], chunks[1], chunks[2], chunks[3]]
}

fn centered_line(area: Rect) -> Rect {
    Rect {
        x: area.x,
        y: area.y + area.height / 2,
        width: area.width,
        height: area.height.min(1),
    }
}

impl App {
    pub fn new(session: ReaderSession, terminal: &TerminalSettings) -> Self {
        Self {
            session,
            cell: CellSize {
                width: terminal.cell_width_px.max(1.0),
                height: terminal.cell_height_px.max(1.0),
            },
            tick: Duration::from_millis(terminal.tick_ms.max(1)),
            hud: None,
            should_quit: false,
        }
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn hud_message(&self) -> Option<&str> {
        self.hud.as_ref().map(|hud| hud.message.as_str())
    }

    /// Frame rate while something moves, a slow poll otherwise.
    pub fn poll_timeout(&self) -> Duration {
        if self.session.needs_frame() {
            self.tick
        } else {
            IDLE_POLL
        }
    }

    /// Maps the page frame for a terminal of `area` onto the session's px
    /// viewport. A changed size schedules a forced reflow.
    pub fn sync_viewport(&mut self, area: Rect) {
        let [_, frame, _, _] = screen_layout(area);
        self.session.set_viewport(Viewport::new(
            frame.width as f32 * self.cell.width,
            frame.height as f32 * self.cell.height,
        ));
    }

    fn notify(&mut self, message: impl Into<String>) {
        self.hud = Some(HudMessage::new(message, HUD_DURATION, HudMode::Normal));
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.hud = Some(HudMessage::new(message, HUD_DURATION, HudMode::Error));
    }

    pub fn handle_event(&mut self, event: &Event) -> Option<AppAction> {
        match event {
            Event::Key(key) => self.handle_key(*key),
            Event::Resize(width, height) => {
                debug!("Terminal resized to {width}x{height}");
                self.sync_viewport(Rect::new(0, 0, *width, *height));
                None
            }
            _ => None,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Option<AppAction> {
        if key.kind == KeyEventKind::Release {
            return None;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                self.should_quit = true;
                return Some(AppAction::Quit);
            }
            KeyCode::Left | KeyCode::Char('h') | KeyCode::PageUp => self.turn(-1),
            KeyCode::Right | KeyCode::Char('l') | KeyCode::Char(' ') | KeyCode::PageDown => {
                self.turn(1)
            }
            KeyCode::Char('n') => {
                if !self.session.next_point() {
                    self.warn("Last point");
                }
            }
            KeyCode::Char('p') => {
                if !self.session.prev_point() {
                    self.warn("First point");
                }
            }
            KeyCode::Char('N') => {
                if !self.session.change_chapter(ChapterDirection::Next) {
                    self.warn("Last chapter");
                }
            }
            KeyCode::Char('P') => {
                if !self.session.change_chapter(ChapterDirection::Previous) {
                    self.warn("First chapter");
                }
            }
            KeyCode::Char('+') | KeyCode::Char('=') => {
                self.session.adjust_font_size(FONT_SIZE_STEP);
                self.notify(format!("Size {}px (column gap)", self.session.state().style.font_size));
            }
            KeyCode::Char('-') => {
                self.session.adjust_font_size(-FONT_SIZE_STEP);
                self.notify(format!("Size {}px (column gap)", self.session.state().style.font_size));
            }
            KeyCode::Char(']') => {
                self.session.adjust_line_height(LINE_HEIGHT_STEP);
                self.notify(format!(
                    "Line height {:.1}",
                    self.session.state().style.line_height
                ));
            }
            KeyCode::Char('[') => {
                self.session.adjust_line_height(-LINE_HEIGHT_STEP);
                self.notify(format!(
                    "Line height {:.1}",
                    self.session.state().style.line_height
                ));
            }
            KeyCode::Char('w') => {
                self.session.adjust_font_weight(1);
                self.notify(format!("Weight {}", self.session.state().style.font_weight));
            }
            KeyCode::Char('W') => {
                self.session.adjust_font_weight(-1);
                self.notify(format!("Weight {}", self.session.state().style.font_weight));
            }
            KeyCode::Char('f') => {
                self.session.cycle_font(1);
                self.notify(format!("Font: {}", self.session.state().style.font().label));
            }
            KeyCode::Char('t') => {
                self.session.cycle_theme(1);
                self.notify(format!("Theme: {}", self.session.state().style.theme().label));
            }
            KeyCode::Char('>') => {
                self.session.adjust_turn_speed(1);
                self.notify(format!("Turn speed {:.1}x", self.session.state().turn_speed));
            }
            KeyCode::Char('<') => {
                self.session.adjust_turn_speed(-1);
                self.notify(format!("Turn speed {:.1}x", self.session.state().turn_speed));
            }
            KeyCode::Char('v') => {
                self.session.toggle_auto_voice();
                let state = if self.session.state().auto_voice {
                    "on"
                } else {
                    "off"
                };
                self.notify(format!("Voice-over {state}"));
            }
            KeyCode::Char('r') => {
                self.session.speak_visible_page();
                self.notify("Reading page");
            }
            _ => {}
        }
        None
    }

    fn turn(&mut self, delta: isize) {
        if self.session.change_page(delta) == TurnOutcome::Unchanged {
            debug!("Page turn by {delta} ignored at chapter edge");
        }
    }

    pub fn draw(&mut self, f: &mut Frame) {
        if self.hud.as_ref().is_some_and(HudMessage::is_expired) {
            self.hud = None;
        }

        let [header, frame, progress, help] = screen_layout(f.area());
        let style = self.session.state().style.clone();
        let theme = style.theme();
        let base = Style::default()
            .fg(theme.text.color())
            .bg(theme.backdrop.0.color());

        let chapter = self
            .session
            .chapter_title()
            .unwrap_or(self.session.state().chapter_id.as_str())
            .to_string();
        let mut spans = vec![Span::styled(
            format!(" {chapter}"),
            base.add_modifier(Modifier::BOLD),
        )];
        if let Some(point) = self.session.point_title() {
            spans.push(Span::styled(format!(" · {point}"), base));
        }
        f.render_widget(Paragraph::new(Line::from(spans)).style(base), header);

        f.render_widget(Block::default().style(base), frame);
        if let Some(fallback) = self.session.fallback() {
            f.render_widget(
                Paragraph::new(fallback.message())
                    .style(base.add_modifier(Modifier::ITALIC))
                    .centered()
                    .wrap(Wrap { trim: true }),
                centered_line(frame),
            );
        } else if let (Some(pagination), Some(metrics)) =
            (self.session.pagination(), self.session.metrics())
        {
            let strip = PageStrip::new(
                pagination,
                &style,
                theme,
                self.session.translate_x(),
                self.cell,
            )
            .dimmed(self.session.buffer_scale() < 0.999);
            f.render_widget(strip, column_area(frame, &metrics, self.cell));
        } else {
            f.render_widget(
                Paragraph::new("Window too small").style(base).centered(),
                centered_line(frame),
            );
        }

        let total = self.session.total_pages();
        let label = if total == 0 {
            "-".to_string()
        } else {
            format!("Page {}/{}", self.session.current_page() + 1, total)
        };
        f.render_widget(
            Gauge::default()
                .gauge_style(
                    Style::default()
                        .fg(theme.rule.color())
                        .bg(theme.backdrop.1.color()),
                )
                .ratio(self.session.progress_fraction().clamp(0.0, 1.0) as f64)
                .label(label),
            progress,
        );

        let help_line = match self.hud.as_ref() {
            Some(hud) => hud.styled_line(theme),
            None => Line::from(Span::styled(HELP_TEXT, base.add_modifier(Modifier::DIM))),
        };
        f.render_widget(Paragraph::new(help_line).style(base), help);
    }
}

/// Main loop: render what is pending, draw, then wait for input. Polls at
/// the tick rate while a turn animates and slowly otherwise.
pub fn run_app_with_event_source<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    event_source: &mut dyn EventSource,
) -> Result<()>
where
    B::Error: Send + Sync + 'static,
{
    loop {
        let size = terminal.size()?;
        app.sync_viewport(Rect::new(0, 0, size.width, size.height));
        app.session.tick();
        terminal.draw(|f| app.draw(f))?;

        if app.should_quit() {
            return Ok(());
        }

        if !event_source.poll(app.poll_timeout())? {
            continue;
        }
        let mut events_processed = 0;
        while events_processed < MAX_EVENTS_PER_FRAME {
            let event = event_source.read()?;
            events_processed += 1;
            if app.handle_event(&event) == Some(AppAction::Quit) {
                break;
            }
            if !event_source.poll(Duration::ZERO)? {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_source::SimulatedEventSource;
    use crate::test_utils::test_helpers::*;
    use crossterm::event::{KeyEventState, KeyModifiers};

    fn app() -> App {
        let (session, _clock, _storage) = cell_session(single_point_book(400));
        App::new(session, &TerminalSettings::default())
    }

    #[test]
    fn test_quit_keys() {
        let mut app = app();
        let quit = SimulatedEventSource::char_key('q');
        assert_eq!(app.handle_event(&quit), Some(AppAction::Quit));
        assert!(app.should_quit());
    }

    #[test]
    fn test_release_events_are_ignored() {
        let mut app = app();
        let release = KeyEvent {
            code: KeyCode::Char('q'),
            modifiers: KeyModifiers::empty(),
            kind: KeyEventKind::Release,
            state: KeyEventState::empty(),
        };
        assert_eq!(app.handle_key(release), None);
        assert!(!app.should_quit());
    }

    #[test]
    fn test_style_keys_update_session_and_hud() {
        let mut app = app();
        let size = app.session.state().style.font_size;
        let theme = app.session.state().style.theme_id.clone();

        app.handle_event(&SimulatedEventSource::char_key('+'));
        assert_eq!(app.session.state().style.font_size, size + 2);
        assert_eq!(app.hud_message(), Some(format!("Size {}px (column gap)", size + 2).as_str()));

        app.handle_event(&SimulatedEventSource::char_key('t'));
        assert_ne!(app.session.state().style.theme_id, theme);
        assert!(app.hud_message().unwrap().starts_with("Theme: "));

        app.handle_event(&SimulatedEventSource::char_key('>'));
        assert_eq!(app.session.state().turn_speed, 1.1);
    }

    #[test]
    fn test_resize_maps_cells_to_px() {
        let mut app = app();
        app.handle_event(&SimulatedEventSource::resize(80, 24));
        let viewport = app.session.viewport();
        assert_eq!(viewport.width, 800.0);
        assert_eq!(viewport.height, 21.0 * 20.0);
    }
}
