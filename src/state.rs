//! Reader position and preferences, and how they are restored at startup.

use chrono::Utc;
use log::{info, warn};

use crate::book::{BookData, PointRef};
use crate::pagination::PaginationKey;
use crate::storage::{PreferencesRecord, ProgressRecord};
use crate::style::ReaderStyle;

pub const MIN_TURN_SPEED: f32 = 0.1;
pub const MAX_TURN_SPEED: f32 = 2.0;
pub const DEFAULT_TURN_SPEED: f32 = 1.0;
pub const TURN_SPEED_STEP: f32 = 0.1;

pub fn clamp_turn_speed(speed: f32) -> f32 {
    if !speed.is_finite() {
        return DEFAULT_TURN_SPEED;
    }
    speed.clamp(MIN_TURN_SPEED, MAX_TURN_SPEED)
}

/// Position overrides supplied at launch (CLI flags or a query string).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOverrides {
    pub chapter: Option<String>,
    pub section: Option<String>,
    pub point: Option<String>,
    pub page: Option<usize>,
}

impl LaunchOverrides {
    pub fn is_empty(&self) -> bool {
        self.chapter.is_none() && self.section.is_none() && self.point.is_none() && self.page.is_none()
    }

    fn has_position(&self) -> bool {
        self.chapter.is_some() || self.section.is_some() || self.point.is_some()
    }

    /// Parses `chapter=..&section=..&point=..&page=..`; `chunk` is accepted
    /// as an older name for `page`. Unknown keys are ignored.
    pub fn from_query(query: &str) -> Self {
        let mut overrides = Self::default();
        let query = query.trim_start_matches('?');
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let value = percent_decode(value);
            if value.is_empty() {
                continue;
            }
            match key {
                "chapter" => overrides.chapter = Some(value),
                "section" => overrides.section = Some(value),
                "point" => overrides.point = Some(value),
                "page" | "chunk" => match value.parse() {
                    Ok(page) => overrides.page = Some(page),
                    Err(_) => warn!("Ignoring non-numeric {key} parameter: {value}"),
                },
                _ => {}
            }
        }
        overrides
    }
}

/// URL-decode `%XX` escapes and `+`; malformed escapes are kept verbatim.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        decoded.push(byte);
                        i += 3;
                    }
                    None => {
                        decoded.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                decoded.push(b' ');
                i += 1;
            }
            byte => {
                decoded.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReaderState {
    pub chapter_id: String,
    pub section_id: String,
    pub point_id: String,
    pub page_index: usize,
    /// Derive the page from the anchor map on the next render instead of
    /// trusting `page_index`.
    pub auto_align_page: bool,
    pub style: ReaderStyle,
    pub turn_speed: f32,
    pub auto_voice: bool,
    pub pagination_key: Option<PaginationKey>,
}

impl ReaderState {
    fn at(position: Option<PointRef>) -> Self {
        let position = position.unwrap_or(PointRef {
            chapter_id: String::new(),
            section_id: String::new(),
            point_id: String::new(),
        });
        Self {
            chapter_id: position.chapter_id,
            section_id: position.section_id,
            point_id: position.point_id,
            page_index: 0,
            auto_align_page: true,
            style: ReaderStyle::default(),
            turn_speed: DEFAULT_TURN_SPEED,
            auto_voice: false,
            pagination_key: None,
        }
    }

    /// Startup state: stored preferences, then stored progress if its whole
    /// chain still resolves, then launch overrides on top.
    pub fn restore(
        book: &BookData,
        progress: Option<ProgressRecord>,
        preferences: Option<PreferencesRecord>,
        overrides: &LaunchOverrides,
    ) -> Self {
        let mut state = Self::at(book.default_point());

        if let Some(preferences) = preferences {
            state.style = preferences.style.clamped();
            state.turn_speed = clamp_turn_speed(preferences.turn_speed);
            state.auto_voice = preferences.auto_voice;
        }

        if let Some(progress) = progress {
            if book.resolves(&progress.chapter_id, &progress.section_id, &progress.point_id) {
                info!(
                    "Restoring progress {}/{}/{} page {}",
                    progress.chapter_id, progress.section_id, progress.point_id, progress.chunk_index
                );
                state.chapter_id = progress.chapter_id;
                state.section_id = progress.section_id;
                state.point_id = progress.point_id;
                state.page_index = progress.chunk_index;
                state.auto_align_page = false;
            } else {
                warn!(
                    "Stored progress {}/{}/{} no longer resolves, starting from the beginning",
                    progress.chapter_id, progress.section_id, progress.point_id
                );
            }
        }

        state.apply_overrides(book, overrides);
        state
    }

    fn apply_overrides(&mut self, book: &BookData, overrides: &LaunchOverrides) {
        if overrides.has_position() {
            let chapter_id = overrides.chapter.as_deref().unwrap_or(&self.chapter_id);
            let target = match (overrides.section.as_deref(), overrides.point.as_deref()) {
                (Some(section_id), Some(point_id)) => book
                    .resolves(chapter_id, section_id, point_id)
                    .then(|| PointRef {
                        chapter_id: chapter_id.to_string(),
                        section_id: section_id.to_string(),
                        point_id: point_id.to_string(),
                    }),
                (None, Some(point_id)) => book.find_point_in(chapter_id, point_id),
                (section_id, None) => book.first_point_in(chapter_id, section_id),
            };

            let Some(target) = target else {
                warn!("Ignoring launch position that does not resolve: {overrides:?}");
                return;
            };
            self.go_to(target);
        }

        if let Some(page) = overrides.page {
            self.page_index = page;
            self.auto_align_page = false;
        }
    }

    pub fn position(&self) -> PointRef {
        PointRef {
            chapter_id: self.chapter_id.clone(),
            section_id: self.section_id.clone(),
            point_id: self.point_id.clone(),
        }
    }

    /// Moves to a point; the page follows from the anchor map.
    pub fn go_to(&mut self, target: PointRef) {
        if target.chapter_id != self.chapter_id {
            self.pagination_key = None;
        }
        self.chapter_id = target.chapter_id;
        self.section_id = target.section_id;
        self.point_id = target.point_id;
        self.page_index = 0;
        self.auto_align_page = true;
    }

    pub fn progress_record(&self) -> ProgressRecord {
        ProgressRecord {
            chapter_id: self.chapter_id.clone(),
            section_id: self.section_id.clone(),
            point_id: self.point_id.clone(),
            chunk_index: self.page_index,
            timestamp: Utc::now(),
        }
    }

    pub fn preferences_record(&self) -> PreferencesRecord {
        PreferencesRecord {
            style: self.style.clone(),
            turn_speed: self.turn_speed,
            auto_voice: self.auto_voice,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{Chapter, Point, Section};

    fn book() -> BookData {
        let point = |id: &str| Point {
            id: id.into(),
            title: None,
            text: vec![format!("text of {id}")],
        };
        BookData::from_chapters(vec![
            Chapter {
                id: "c1".into(),
                title: None,
                sections: vec![Section {
                    id: "s1".into(),
                    title: None,
                    points: vec![point("p1"), point("p2")],
                }],
            },
            Chapter {
                id: "c2".into(),
                title: None,
                sections: vec![
                    Section {
                        id: "s2".into(),
                        title: None,
                        points: vec![point("p3")],
                    },
                    Section {
                        id: "s3".into(),
                        title: None,
                        points: vec![point("p4"), point("p5")],
                    },
                ],
            },
        ])
    }

    fn progress(chapter: &str, section: &str, point: &str, page: usize) -> ProgressRecord {
        ProgressRecord {
            chapter_id: chapter.into(),
            section_id: section.into(),
            point_id: point.into(),
            chunk_index: page,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_defaults_without_records() {
        let state = ReaderState::restore(&book(), None, None, &LaunchOverrides::default());
        assert_eq!(state.position().point_id, "p1");
        assert_eq!(state.page_index, 0);
        assert!(state.auto_align_page);
        assert_eq!(state.style, ReaderStyle::default());
    }

    #[test]
    fn test_valid_progress_is_authoritative() {
        let state = ReaderState::restore(
            &book(),
            Some(progress("c2", "s3", "p5", 4)),
            None,
            &LaunchOverrides::default(),
        );
        assert_eq!(state.chapter_id, "c2");
        assert_eq!(state.point_id, "p5");
        assert_eq!(state.page_index, 4);
        assert!(!state.auto_align_page);
    }

    #[test]
    fn test_broken_chain_discards_whole_record() {
        // p3 exists, but not under s3
        let state = ReaderState::restore(
            &book(),
            Some(progress("c2", "s3", "p3", 4)),
            None,
            &LaunchOverrides::default(),
        );
        assert_eq!(state.chapter_id, "c1");
        assert_eq!(state.section_id, "s1");
        assert_eq!(state.point_id, "p1");
        assert_eq!(state.page_index, 0);
    }

    #[test]
    fn test_preferences_are_clamped() {
        let mut style = ReaderStyle::default();
        style.font_size = 200;
        style.font_weight = 1234;
        style.theme_id = "neon".into();
        let prefs = PreferencesRecord {
            style,
            turn_speed: 9.0,
            auto_voice: true,
            timestamp: Utc::now(),
        };
        let state = ReaderState::restore(&book(), None, Some(prefs), &LaunchOverrides::default());
        assert_eq!(state.style.font_size, 72);
        assert_eq!(state.style.font_weight, 900);
        assert_eq!(state.style.theme_id, "sepia");
        assert_eq!(state.turn_speed, 2.0);
        assert!(state.auto_voice);
    }

    #[test]
    fn test_overrides_beat_progress() {
        let overrides = LaunchOverrides::from_query("?chapter=c2&section=s3&chunk=2");
        let state = ReaderState::restore(
            &book(),
            Some(progress("c1", "s1", "p2", 1)),
            None,
            &overrides,
        );
        assert_eq!(state.section_id, "s3");
        assert_eq!(state.point_id, "p4");
        assert_eq!(state.page_index, 2);
        assert!(!state.auto_align_page);
    }

    #[test]
    fn test_point_override_aligns_page() {
        let overrides = LaunchOverrides {
            chapter: Some("c2".into()),
            point: Some("p5".into()),
            ..Default::default()
        };
        let state = ReaderState::restore(&book(), None, None, &overrides);
        assert_eq!(state.section_id, "s3");
        assert_eq!(state.point_id, "p5");
        assert!(state.auto_align_page);
    }

    #[test]
    fn test_unresolved_override_is_ignored() {
        let overrides = LaunchOverrides::from_query("chapter=c9&page=3");
        let state = ReaderState::restore(
            &book(),
            Some(progress("c1", "s1", "p2", 1)),
            None,
            &overrides,
        );
        assert_eq!(state.point_id, "p2");
        assert_eq!(state.page_index, 1);
    }

    #[test]
    fn test_query_decoding() {
        let overrides = LaunchOverrides::from_query("point=caf%C3%A9+1&page=x&section=");
        assert_eq!(overrides.point.as_deref(), Some("café 1"));
        assert_eq!(overrides.page, None);
        assert_eq!(overrides.section, None);
        assert_eq!(percent_decode("100%"), "100%");
        assert_eq!(percent_decode("%zz"), "%zz");
    }

    #[test]
    fn test_turn_speed_clamp() {
        assert_eq!(clamp_turn_speed(0.0), 0.1);
        assert_eq!(clamp_turn_speed(f32::INFINITY), 1.0);
        assert_eq!(clamp_turn_speed(1.5), 1.5);
    }
}
