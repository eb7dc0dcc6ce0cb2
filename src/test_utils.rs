pub mod test_helpers {
    use crate::book::{BookData, Chapter, Point, Section};
    use crate::event_source::{Event, KeyCode, SimulatedEventSource};
    use crate::measure::{TextMeasure, WrapMeasure};
    use crate::metrics::Viewport;
    use crate::scheduler::ManualClock;
    use crate::session::ReaderSession;
    use crate::storage::{MemoryStorage, PREFERENCES_KEY, PreferencesRecord};
    use crate::style::ReaderStyle;
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    /// Builder for creating test scenarios with simulated user input
    #[derive(Default)]
    pub struct TestScenarioBuilder {
        events: Vec<Event>,
    }

    impl TestScenarioBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        /// Add a character key press
        pub fn press_char(mut self, c: char) -> Self {
            self.events.push(SimulatedEventSource::char_key(c));
            self
        }

        pub fn press_key(mut self, code: KeyCode) -> Self {
            self.events.push(SimulatedEventSource::code_key(code));
            self
        }

        /// Turn forward n pages (Right arrow)
        pub fn next_page(mut self, times: usize) -> Self {
            for _ in 0..times {
                self.events.push(SimulatedEventSource::code_key(KeyCode::Right));
            }
            self
        }

        /// Turn back n pages (Left arrow)
        pub fn prev_page(mut self, times: usize) -> Self {
            for _ in 0..times {
                self.events.push(SimulatedEventSource::code_key(KeyCode::Left));
            }
            self
        }

        pub fn resize(mut self, width: u16, height: u16) -> Self {
            self.events.push(SimulatedEventSource::resize(width, height));
            self
        }

        /// Quit the application (press 'q')
        pub fn quit(mut self) -> Self {
            self.events.push(SimulatedEventSource::char_key('q'));
            self
        }

        pub fn len(&self) -> usize {
            self.events.len()
        }

        pub fn is_empty(&self) -> bool {
            self.events.is_empty()
        }

        /// Build the simulated event source
        pub fn build(self) -> SimulatedEventSource {
            SimulatedEventSource::new(self.events)
        }
    }

    /// Create a test terminal for snapshot testing
    pub fn create_test_terminal(width: u16, height: u16) -> Terminal<TestBackend> {
        let backend = TestBackend::new(width, height);
        Terminal::new(backend).unwrap()
    }

    /// Capture the current terminal buffer as a string
    pub fn capture_terminal_state(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        let mut lines = Vec::new();

        for y in 0..buffer.area.height {
            let mut line = String::new();
            for x in 0..buffer.area.width {
                line.push_str(buffer[(x, y)].symbol());
            }
            // Trim trailing whitespace from each line
            lines.push(line.trim_end().to_string());
        }

        // Remove trailing empty lines
        while lines.last().map(|l| l.is_empty()).unwrap_or(false) {
            lines.pop();
        }

        lines.join("\n")
    }

    /// Roboto 20px at 1.5: 10px advance and 30px lines with the proportional
    /// model. Sessions clamp it to 24px (12px advance, 36px lines) once it is
    /// loaded as a saved preference.
    pub fn test_style() -> ReaderStyle {
        ReaderStyle {
            font_id: "roboto".into(),
            font_size: 20,
            line_height: 1.5,
            font_weight: 400,
            theme_id: "sepia".into(),
        }
    }

    /// `n` copies of a four-letter word.
    pub fn words(n: usize) -> String {
        vec!["abcd"; n].join(" ")
    }

    pub fn point(id: &str, title: Option<&str>, text: Vec<String>) -> Point {
        Point {
            id: id.into(),
            title: title.map(str::to_string),
            text,
        }
    }

    pub fn chapter(id: &str, title: Option<&str>, section_id: &str, points: Vec<Point>) -> Chapter {
        Chapter {
            id: id.into(),
            title: title.map(str::to_string),
            sections: vec![Section {
                id: section_id.into(),
                title: None,
                points,
            }],
        }
    }

    /// One chapter, one section, one untitled point holding `n` words.
    pub fn single_point_book(n: usize) -> BookData {
        BookData::from_chapters(vec![chapter(
            "c1",
            Some("Chapter One"),
            "s1",
            vec![point("p1", None, vec![words(n)])],
        )])
    }

    /// `c1` with two long points, `c2` with a short one.
    pub fn two_chapter_book() -> BookData {
        BookData::from_chapters(vec![
            chapter(
                "c1",
                Some("Chapter One"),
                "s1",
                vec![
                    point("p1", Some("First"), vec![words(200)]),
                    point("p2", Some("Second"), vec![words(200)]),
                ],
            ),
            chapter(
                "c2",
                Some("Chapter Two"),
                "s2",
                vec![point("p3", None, vec!["short".into()])],
            ),
        ])
    }

    pub fn store_style(storage: &MemoryStorage, style: &ReaderStyle) {
        let record = PreferencesRecord {
            style: style.clone(),
            turn_speed: 1.0,
            auto_voice: false,
            timestamp: chrono::Utc::now(),
        };
        storage.insert_raw(PREFERENCES_KEY, &serde_json::to_string(&record).unwrap());
    }

    /// Session on a manual clock and in-memory storage, with `style` already
    /// saved as the reader's preference.
    pub fn session_with(
        book: BookData,
        measurer: impl TextMeasure + 'static,
        viewport: Viewport,
        style: &ReaderStyle,
    ) -> (ReaderSession, ManualClock, MemoryStorage) {
        let clock = ManualClock::new();
        let storage = MemoryStorage::new();
        store_style(&storage, style);
        let session = ReaderSession::builder(book)
            .clock(clock.clone())
            .storage(storage.clone())
            .measurer(measurer)
            .viewport(viewport)
            .build();
        (session, clock, storage)
    }

    /// Session measured in 10x20 px terminal cells on an 80x21 cell page
    /// frame.
    pub fn cell_session(book: BookData) -> (ReaderSession, ManualClock, MemoryStorage) {
        session_with(
            book,
            WrapMeasure::cells(10.0, 20.0),
            Viewport::new(800.0, 420.0),
            &test_style(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::test_helpers::*;

    #[test]
    fn test_scenario_builder() {
        let scenario = TestScenarioBuilder::new()
            .next_page(2)
            .press_char('N')
            .resize(100, 30)
            .prev_page(1)
            .quit();
        assert_eq!(scenario.len(), 6);
        assert_eq!(scenario.build().remaining(), 6);
    }

    #[test]
    fn test_fixture_books_resolve() {
        let book = two_chapter_book();
        assert!(book.resolves("c1", "s1", "p2"));
        assert!(book.resolves("c2", "s2", "p3"));
        assert_eq!(words(3), "abcd abcd abcd");
    }
}
