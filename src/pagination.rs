//! Page count and anchor derivation for one chapter at one layout.
//!
//! A [`Pagination`] is a pure function of its [`PaginationKey`]: same chapter
//! content, same style and same column box always produce the same pages.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::flow::{FlowPart, PageAnchor, content_hash};
use crate::measure::{PlacedFragment, TextMeasure};
use crate::metrics::ColumnMetrics;
use crate::style::ReaderStyle;

const PAGE_EPSILON: f32 = 1e-3;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PaginationError {
    #[error("degenerate column box {width}x{height}")]
    DegenerateMetrics { width: f32, height: f32 },
    #[error("text measurement returned a non-finite extent")]
    InvalidMeasurement,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaginationTuning {
    /// Vertical overflow below this many px is treated as rounding noise.
    pub overflow_tolerance: f32,
    /// Mounted width may exceed the prediction by this share of a column.
    pub mismatch_ratio: f32,
    pub mismatch_min_px: f32,
    /// Full rebuilds allowed after extending once.
    pub mismatch_retries: u8,
}

impl Default for PaginationTuning {
    fn default() -> Self {
        Self {
            overflow_tolerance: 4.0,
            mismatch_ratio: 0.25,
            mismatch_min_px: 48.0,
            mismatch_retries: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PaginationKey(String);

impl PaginationKey {
    pub fn new(
        chapter_id: &str,
        parts: &[FlowPart],
        style: &ReaderStyle,
        metrics: &ColumnMetrics,
    ) -> Self {
        Self(format!(
            "{}|{:016x}|{}|{}|{:.2}|{}|{}|{:.2}x{:.2}|{:.2}",
            chapter_id,
            content_hash(parts),
            style.font_id,
            style.font_size,
            style.line_height,
            style.font_weight,
            style.theme_id,
            metrics.column_width,
            metrics.column_height,
            metrics.column_gap,
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaginationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pagination {
    pub key: PaginationKey,
    pub chapter_id: String,
    pub total_pages: usize,
    pub page_shift_width: f32,
    pub column_width: f32,
    pub column_height: f32,
    pub column_gap: f32,
    pub scroll_width: f32,
    pub content_height: f32,
    /// Point id to the first page that point starts on.
    pub anchor_map: HashMap<String, usize>,
    /// First point starting on each page; `None` for pages that only carry
    /// the tail of an earlier point.
    pub page_anchors: Vec<Option<PageAnchor>>,
    pub fragments: Vec<PlacedFragment>,
    point_spans: HashMap<String, (usize, usize)>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WidthCheck {
    Fits,
    UnderCounted {
        required_pages: usize,
        measured: f32,
        predicted: f32,
    },
}

fn pages_for_width(width: f32, gap: f32, shift: f32) -> usize {
    ((width + gap) / shift - PAGE_EPSILON).ceil().max(0.0) as usize
}

pub fn build_pagination(
    chapter_id: &str,
    parts: &[FlowPart],
    metrics: &ColumnMetrics,
    style: &ReaderStyle,
    measurer: &dyn TextMeasure,
    tuning: &PaginationTuning,
) -> Result<Pagination, PaginationError> {
    if metrics.is_degenerate() {
        return Err(PaginationError::DegenerateMetrics {
            width: metrics.column_width,
            height: metrics.column_height,
        });
    }

    let measurement = measurer.measure(parts, metrics.column_box(), style);
    if !(measurement.scroll_width.is_finite()
        && measurement.content_height.is_finite()
        && measurement.stacked_overflow.is_finite())
    {
        return Err(PaginationError::InvalidMeasurement);
    }

    let shift = metrics.page_shift_width();
    let mut total_pages = pages_for_width(measurement.scroll_width, metrics.column_gap, shift).max(1);

    let overflow = measurement.stacked_overflow;
    if overflow > tuning.overflow_tolerance {
        let extra = (overflow / metrics.column_height).ceil() as usize;
        debug!(
            "Chapter {chapter_id} overflows its column by {overflow:.1}px, adding {extra} page(s)"
        );
        total_pages += extra;
    }

    let mut page_anchors: Vec<Option<PageAnchor>> = vec![None; total_pages];
    let mut anchor_map = HashMap::new();
    let mut point_spans: HashMap<String, (usize, usize)> = HashMap::new();

    for fragment in &measurement.fragments {
        let Some(anchor) = parts
            .get(fragment.part_index)
            .and_then(|part| part.provenance.as_ref())
            .and_then(|provenance| provenance.page_anchor())
        else {
            continue;
        };
        let page = ((fragment.rect.x / shift + PAGE_EPSILON).floor().max(0.0) as usize)
            .min(total_pages - 1);

        point_spans
            .entry(anchor.point_id.clone())
            .and_modify(|(_, last)| *last = (*last).max(page))
            .or_insert((page, page));

        if fragment.continued {
            continue;
        }
        anchor_map.entry(anchor.point_id.clone()).or_insert(page);
        if page_anchors[page].is_none() {
            page_anchors[page] = Some(anchor);
        }
    }

    debug!(
        "Paginated chapter {chapter_id}: {total_pages} page(s), {} anchored point(s), scroll width {:.1}",
        anchor_map.len(),
        measurement.scroll_width
    );

    Ok(Pagination {
        key: PaginationKey::new(chapter_id, parts, style, metrics),
        chapter_id: chapter_id.to_string(),
        total_pages,
        page_shift_width: shift,
        column_width: metrics.column_width,
        column_height: metrics.column_height,
        column_gap: metrics.column_gap,
        scroll_width: measurement.scroll_width,
        content_height: measurement.content_height,
        anchor_map,
        page_anchors,
        fragments: measurement.fragments,
        point_spans,
    })
}

impl Pagination {
    pub fn last_page(&self) -> usize {
        self.total_pages.saturating_sub(1)
    }

    pub fn clamp_page(&self, page: usize) -> usize {
        page.min(self.last_page())
    }

    pub fn clamp_signed(&self, page: i64) -> usize {
        if page <= 0 {
            0
        } else {
            self.clamp_page(page as usize)
        }
    }

    pub fn page_for_point(&self, point_id: &str) -> Option<usize> {
        self.anchor_map.get(point_id).copied()
    }

    /// Anchor in effect on `page`: the nearest anchored page at or before it.
    pub fn anchor_for_page(&self, page: usize) -> Option<&PageAnchor> {
        let page = self.clamp_page(page);
        self.page_anchors[..=page]
            .iter()
            .rev()
            .find_map(|anchor| anchor.as_ref())
    }

    /// Whether any text of the point lands on `page`.
    pub fn point_covers_page(&self, point_id: &str, page: usize) -> bool {
        self.point_spans
            .get(point_id)
            .is_some_and(|&(first, last)| first <= page && page <= last)
    }

    pub fn page_offset(&self, page: usize) -> f32 {
        self.clamp_page(page) as f32 * self.page_shift_width
    }

    /// Share of the chapter read once `page` is on screen.
    pub fn progress_fraction(&self, page: usize) -> f32 {
        (self.clamp_page(page) + 1) as f32 / self.total_pages.max(1) as f32
    }

    pub fn mismatch_tolerance(&self, tuning: &PaginationTuning) -> f32 {
        (self.column_width * tuning.mismatch_ratio).max(tuning.mismatch_min_px)
    }

    pub fn check_mounted_width(&self, measured: f32, tuning: &PaginationTuning) -> WidthCheck {
        if !measured.is_finite() || measured <= self.scroll_width + self.mismatch_tolerance(tuning) {
            return WidthCheck::Fits;
        }
        let required = pages_for_width(measured, self.column_gap, self.page_shift_width);
        WidthCheck::UnderCounted {
            required_pages: required.max(self.total_pages + 1),
            measured,
            predicted: self.scroll_width,
        }
    }

    /// Grows the page count; new pages carry no anchor.
    pub fn extend_to(&mut self, total_pages: usize) {
        if total_pages <= self.total_pages {
            return;
        }
        self.total_pages = total_pages;
        self.page_anchors.resize(total_pages, None);
        self.scroll_width = total_pages as f32 * self.column_width
            + (total_pages - 1) as f32 * self.column_gap;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidthAction {
    Accept,
    Extended { from: usize, to: usize },
    Rebuild,
    GiveUp,
}

/// Bounded self-correction for a mounted flow wider than predicted: extend
/// once, rebuild up to the configured retries, then stop.
#[derive(Debug, Default)]
pub struct WidthReconciler {
    key: Option<PaginationKey>,
    extended: bool,
    rebuilds: u8,
    gave_up: bool,
}

impl WidthReconciler {
    /// Starts a fresh correction budget when the layout key changes.
    pub fn track(&mut self, key: &PaginationKey) {
        if self.key.as_ref() != Some(key) {
            *self = Self {
                key: Some(key.clone()),
                ..Self::default()
            };
        }
    }

    pub fn gave_up(&self) -> bool {
        self.gave_up
    }

    pub fn reconcile(
        &mut self,
        pagination: &mut Pagination,
        measured: f32,
        tuning: &PaginationTuning,
    ) -> WidthAction {
        self.track(&pagination.key);
        if self.gave_up {
            return WidthAction::Accept;
        }

        let WidthCheck::UnderCounted {
            required_pages,
            measured,
            predicted,
        } = pagination.check_mounted_width(measured, tuning)
        else {
            return WidthAction::Accept;
        };

        if !self.extended {
            self.extended = true;
            let from = pagination.total_pages;
            pagination.extend_to(required_pages);
            debug!(
                "Mounted width {measured:.1}px exceeds predicted {predicted:.1}px, extending {from} -> {required_pages} pages"
            );
            return WidthAction::Extended {
                from,
                to: required_pages,
            };
        }

        if self.rebuilds < tuning.mismatch_retries {
            self.rebuilds += 1;
            debug!("Width mismatch persists after extending, forcing rebuild {}", self.rebuilds);
            return WidthAction::Rebuild;
        }

        self.gave_up = true;
        warn!(
            "{}",
            crate::error::ReaderError::WidthMismatch {
                measured,
                predicted
            }
        );
        WidthAction::GiveUp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{Chapter, Point, Section};
    use crate::flow::build_flow_parts;
    use crate::measure::{ColumnBox, FlowMeasurement, WrapMeasure};

    fn style() -> ReaderStyle {
        ReaderStyle {
            font_id: "roboto".into(),
            font_size: 20,
            line_height: 1.5,
            font_weight: 400,
            theme_id: "sepia".into(),
        }
    }

    fn words(count: usize) -> String {
        vec!["abcd"; count].join(" ")
    }

    fn chapter(points: Vec<(&str, Vec<String>)>) -> Chapter {
        Chapter {
            id: "c1".into(),
            title: None,
            sections: vec![Section {
                id: "s1".into(),
                title: None,
                points: points
                    .into_iter()
                    .map(|(id, text)| Point {
                        id: id.into(),
                        title: None,
                        text,
                    })
                    .collect(),
            }],
        }
    }

    fn paginate(chapter: &Chapter) -> Pagination {
        let parts = build_flow_parts(chapter);
        build_pagination(
            &chapter.id,
            &parts,
            &ColumnMetrics::new(300.0, 300.0, 240.0),
            &style(),
            &WrapMeasure::default(),
            &PaginationTuning::default(),
        )
        .unwrap()
    }

    /// Reports a fixed extent regardless of the content, with `stacked`
    /// px left below a single 300px column.
    struct FixedMeasure {
        scroll_width: f32,
        stacked: f32,
    }

    impl TextMeasure for FixedMeasure {
        fn measure(&self, _: &[FlowPart], _: ColumnBox, _: &ReaderStyle) -> FlowMeasurement {
            FlowMeasurement {
                fragments: Vec::new(),
                scroll_width: self.scroll_width,
                content_height: 300.0 + self.stacked,
                columns: 1,
                stacked_overflow: self.stacked,
            }
        }
    }

    #[test]
    fn test_short_chapter_is_one_page() {
        let pagination = paginate(&chapter(vec![(
            "p1",
            vec!["one".into(), "two".into(), "three".into()],
        )]));
        assert_eq!(pagination.total_pages, 1);
        assert_eq!(pagination.page_anchors.len(), 1);
        assert_eq!(pagination.page_for_point("p1"), Some(0));
    }

    #[test]
    fn test_three_column_overflow() {
        let pagination = paginate(&chapter(vec![("p1", vec![words(150)])]));
        assert_eq!(pagination.total_pages, 3);
        assert_eq!(pagination.page_shift_width, 540.0);
        assert_eq!(pagination.page_anchors[0].as_ref().unwrap().point_id, "p1");
        assert!(pagination.page_anchors[1].is_none());
        assert_eq!(pagination.anchor_for_page(2).unwrap().point_id, "p1");
        assert!(pagination.point_covers_page("p1", 2));
    }

    #[test]
    fn test_anchor_map_records_first_page() {
        // p1 fills page 0 exactly, p2 starts on page 1 and its second
        // paragraph opens page 2 ahead of p3.
        let pagination = paginate(&chapter(vec![
            ("p1", vec![words(60)]),
            ("p2", vec![words(60), words(6)]),
            ("p3", vec![words(6)]),
        ]));
        assert_eq!(pagination.page_for_point("p1"), Some(0));
        assert_eq!(pagination.page_for_point("p2"), Some(1));
        assert_eq!(pagination.page_for_point("p3"), Some(2));
        assert_eq!(pagination.page_anchors[2].as_ref().unwrap().point_id, "p2");
        assert!(pagination.point_covers_page("p2", 2));
        assert!(!pagination.point_covers_page("p1", 1));
    }

    #[test]
    fn test_degenerate_metrics_are_rejected() {
        let parts = build_flow_parts(&chapter(vec![("p1", vec!["x".into()])]));
        for metrics in [
            ColumnMetrics::new(0.0, 300.0, 240.0),
            ColumnMetrics::new(300.0, -5.0, 240.0),
            ColumnMetrics::new(f32::NAN, 300.0, 240.0),
        ] {
            let result = build_pagination(
                "c1",
                &parts,
                &metrics,
                &style(),
                &WrapMeasure::default(),
                &PaginationTuning::default(),
            );
            assert!(matches!(
                result,
                Err(PaginationError::DegenerateMetrics { .. })
            ));
        }
    }

    #[test]
    fn test_vertical_overflow_adds_pages() {
        let metrics = ColumnMetrics::new(300.0, 300.0, 240.0);
        let tuning = PaginationTuning::default();
        let within = FixedMeasure {
            scroll_width: 300.0,
            stacked: 3.0,
        };
        let over = FixedMeasure {
            scroll_width: 300.0,
            stacked: 350.0,
        };
        let build = |measure: &FixedMeasure| {
            build_pagination("c1", &[], &metrics, &style(), measure, &tuning).unwrap()
        };

        assert_eq!(build(&within).total_pages, 1);
        // 350px past the column: two extra shifts
        let tall = build(&over);
        assert_eq!(tall.total_pages, 3);
        assert_eq!(tall.page_anchors.len(), 3);
    }

    #[test]
    fn test_lines_taller_than_column_are_counted_once() {
        // 30px lines in a 20px column: every paragraph gets a column of its
        // own and no trailing page is added for the overflow.
        let chapter = chapter(vec![
            ("p1", vec!["one".into()]),
            ("p2", vec!["two".into()]),
            ("p3", vec!["three".into()]),
        ]);
        let pagination = build_pagination(
            "c1",
            &build_flow_parts(&chapter),
            &ColumnMetrics::new(300.0, 20.0, 240.0),
            &style(),
            &WrapMeasure::default(),
            &PaginationTuning::default(),
        )
        .unwrap();

        assert_eq!(pagination.total_pages, 3);
        assert_eq!(pagination.page_for_point("p1"), Some(0));
        assert_eq!(pagination.page_for_point("p3"), Some(2));
        assert!(pagination.page_anchors.iter().all(Option::is_some));
    }

    #[test]
    fn test_non_finite_measurement_fails() {
        let broken = FixedMeasure {
            scroll_width: f32::INFINITY,
            stacked: 0.0,
        };
        let result = build_pagination(
            "c1",
            &[],
            &ColumnMetrics::new(300.0, 300.0, 240.0),
            &style(),
            &broken,
            &PaginationTuning::default(),
        );
        assert_eq!(result, Err(PaginationError::InvalidMeasurement));
    }

    #[test]
    fn test_clamping() {
        let pagination = paginate(&chapter(vec![("p1", vec![words(150)])]));
        assert_eq!(pagination.clamp_signed(-3), 0);
        assert_eq!(pagination.clamp_signed(7), 2);
        assert_eq!(pagination.clamp_page(1), 1);
        assert_eq!(pagination.page_offset(2), 1080.0);
        assert_eq!(pagination.progress_fraction(2), 1.0);
        assert_eq!(pagination.progress_fraction(9), 1.0);
    }

    #[test]
    fn test_key_ignores_nothing_but_turn_speed() {
        let chapter = chapter(vec![("p1", vec!["x".into()])]);
        let parts = build_flow_parts(&chapter);
        let metrics = ColumnMetrics::new(300.0, 300.0, 240.0);
        let base = PaginationKey::new("c1", &parts, &style(), &metrics);

        let mut heavier = style();
        heavier.font_weight = 700;
        assert_ne!(base, PaginationKey::new("c1", &parts, &heavier, &metrics));

        let narrower = ColumnMetrics::new(280.0, 300.0, 240.0);
        assert_ne!(base, PaginationKey::new("c1", &parts, &style(), &narrower));
        assert_eq!(base, PaginationKey::new("c1", &parts, &style(), &metrics));
    }

    #[test]
    fn test_width_reconciler_is_bounded() {
        let mut pagination = paginate(&chapter(vec![("p1", vec![words(60)])]));
        let tuning = PaginationTuning::default();
        let mut reconciler = WidthReconciler::default();

        // Within max(0.25 * 300, 48) = 75px of the prediction.
        assert_eq!(
            reconciler.reconcile(&mut pagination, 360.0, &tuning),
            WidthAction::Accept
        );

        // A full extra column shows up once mounted.
        let mounted = 2.0 * 300.0 + 240.0;
        assert_eq!(
            reconciler.reconcile(&mut pagination, mounted, &tuning),
            WidthAction::Extended { from: 1, to: 2 }
        );
        assert_eq!(pagination.total_pages, 2);
        assert_eq!(pagination.page_anchors.len(), 2);

        let wider = 3.0 * 300.0 + 2.0 * 240.0;
        assert_eq!(
            reconciler.reconcile(&mut pagination, wider, &tuning),
            WidthAction::Rebuild
        );
        assert_eq!(
            reconciler.reconcile(&mut pagination, wider, &tuning),
            WidthAction::GiveUp
        );
        assert!(reconciler.gave_up());
        assert_eq!(
            reconciler.reconcile(&mut pagination, wider * 2.0, &tuning),
            WidthAction::Accept
        );
    }

    #[test]
    fn test_reconciler_resets_on_new_layout() {
        let tuning = PaginationTuning::default();
        let mut reconciler = WidthReconciler::default();
        let mut first = paginate(&chapter(vec![("p1", vec![words(60)])]));
        let mounted = 2.0 * 300.0 + 240.0;
        reconciler.reconcile(&mut first, mounted, &tuning);

        let mut other = paginate(&chapter(vec![("p1", vec![words(6)])]));
        assert_eq!(
            reconciler.reconcile(&mut other, mounted, &tuning),
            WidthAction::Extended { from: 1, to: 2 }
        );
    }
}
