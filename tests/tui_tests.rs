use std::time::Duration;

use pageturn::book::BookData;
use pageturn::event_source::KeyCode;
use pageturn::settings::TerminalSettings;
use pageturn::test_utils::test_helpers::*;
use pageturn::{App, run_app_with_event_source};

fn app(book: BookData) -> (App, pageturn::scheduler::ManualClock) {
    let (session, clock, _storage) = cell_session(book);
    (App::new(session, &TerminalSettings::default()), clock)
}

#[test]
fn test_first_frame_shows_header_page_and_progress() {
    let (mut app, _clock) = app(two_chapter_book());
    let mut terminal = create_test_terminal(80, 24);
    let mut events = TestScenarioBuilder::new().quit().build();

    run_app_with_event_source(&mut terminal, &mut app, &mut events).unwrap();

    let screen = capture_terminal_state(&terminal);
    let lines: Vec<&str> = screen.lines().collect();
    assert_eq!(lines[0], " Chapter One · First");
    assert!(lines[2].contains("Chapter One"));
    assert!(screen.contains("abcd abcd abcd"));
    assert!(screen.contains("Page 1/4"));
    assert!(app.should_quit());
}

#[test]
fn test_arrow_key_starts_turn() {
    let (mut app, clock) = app(two_chapter_book());
    let mut terminal = create_test_terminal(80, 24);
    let mut events = TestScenarioBuilder::new().next_page(1).quit().build();

    run_app_with_event_source(&mut terminal, &mut app, &mut events).unwrap();
    assert!(app.session.is_animating());
    assert_eq!(app.session.current_page(), 1);
    assert!(capture_terminal_state(&terminal).contains("Page 2/4"));

    app.session.tick();
    clock.advance(Duration::from_secs(1));
    app.session.tick();
    assert!(!app.session.is_animating());
    let shift = app.session.pagination().unwrap().page_shift_width;
    assert_eq!(app.session.translate_x(), shift);
}

#[test]
fn test_chapter_keys_move_between_chapters() {
    let (mut app, _clock) = app(two_chapter_book());
    let mut terminal = create_test_terminal(80, 24);
    let mut events = TestScenarioBuilder::new()
        .press_char('N')
        .press_char('N')
        .quit()
        .build();

    run_app_with_event_source(&mut terminal, &mut app, &mut events).unwrap();
    assert_eq!(app.session.state().chapter_id, "c2");
    assert_eq!(app.hud_message(), Some("Last chapter"));
    let screen = capture_terminal_state(&terminal);
    assert!(screen.starts_with(" Chapter Two"));
    assert!(screen.contains("short"));
    assert!(screen.contains("Last chapter"));
}

#[test]
fn test_page_keys_are_ignored_at_edges() {
    let (mut app, _clock) = app(two_chapter_book());
    let mut terminal = create_test_terminal(80, 24);
    let mut events = TestScenarioBuilder::new()
        .press_key(KeyCode::PageUp)
        .press_key(KeyCode::Left)
        .quit()
        .build();

    run_app_with_event_source(&mut terminal, &mut app, &mut events).unwrap();
    assert_eq!(app.session.current_page(), 0);
    assert!(!app.session.is_animating());
}

#[test]
fn test_missing_content_shows_fallback_page() {
    let (mut app, _clock) = app(BookData::from_chapters(Vec::new()));
    let mut terminal = create_test_terminal(60, 12);
    let mut events = TestScenarioBuilder::new().quit().build();

    run_app_with_event_source(&mut terminal, &mut app, &mut events).unwrap();
    let screen = capture_terminal_state(&terminal);
    assert!(screen.contains("Content unavailable"));
    assert!(screen.contains(" -"));
}
