//! Text measurement for column flow.
//!
//! The pagination engine never lays text out itself. It hands the flow parts
//! and a single column box to a [`TextMeasure`] and reads back where every
//! part landed. Columns fill top to bottom; whatever does not fit overflows
//! into the next column to the right, one page-shift further along.

use crate::flow::{FlowPart, FlowRole};
use crate::style::ReaderStyle;
use unicode_width::UnicodeWidthStr;

/// Slack for accumulated float error when checking whether a line fits.
const FIT_EPSILON: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnBox {
    pub width: f32,
    pub height: f32,
    pub gap: f32,
}

impl ColumnBox {
    pub fn shift(&self) -> f32 {
        self.width + self.gap
    }
}

/// Axis-aligned rectangle in flow coordinates (x grows across columns).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FlowRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FlowRect {
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Partial overlap on both axes counts.
    pub fn intersects(&self, other: &FlowRect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// The piece of one flow part that landed in one column.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedFragment {
    pub part_index: usize,
    pub role: FlowRole,
    pub column: usize,
    pub rect: FlowRect,
    pub lines: Vec<String>,
    /// The part started in an earlier column.
    pub continued: bool,
    pub line_height: f32,
}

impl PlacedFragment {
    pub fn text(&self) -> String {
        self.lines.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FlowMeasurement {
    pub fragments: Vec<PlacedFragment>,
    /// Horizontal extent of all used columns including the gaps between them.
    pub scroll_width: f32,
    /// Tallest column fill. Exceeds the column height only when a single
    /// line cannot fit in a column at all.
    pub content_height: f32,
    pub columns: usize,
    /// Height left stacked below a column bottom instead of flowing into the
    /// next column. Lines already moved to columns of their own are counted
    /// by `columns` and never here.
    pub stacked_overflow: f32,
}

pub trait TextMeasure {
    fn measure(&self, parts: &[FlowPart], column: ColumnBox, style: &ReaderStyle)
    -> FlowMeasurement;

    /// Width of the flow once mounted for display. Exact layouts report the
    /// measured width; engines with rounding drift may report more.
    fn mounted_extent(&self, parts: &[FlowPart], column: ColumnBox, style: &ReaderStyle) -> f32 {
        self.measure(parts, column, style).scroll_width
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GlyphModel {
    /// Proportional text sized in px from the style.
    Proportional,
    /// One character per terminal cell; the font size cannot change a cell.
    Cells { cell_width: f32, cell_height: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlyphMetrics {
    pub advance: f32,
    pub line_px: f32,
}

fn role_scale(role: FlowRole) -> f32 {
    match role {
        FlowRole::Title => 1.4,
        FlowRole::ChapterHeading => 1.15,
        FlowRole::Paragraph => 1.0,
    }
}

pub fn glyph_metrics(model: GlyphModel, role: FlowRole, style: &ReaderStyle) -> GlyphMetrics {
    match model {
        GlyphModel::Proportional => {
            let size = style.font_size as f32 * role_scale(role);
            let weight_factor = 1.0 + (style.font_weight as f32 - 400.0) / 100.0 * 0.02;
            GlyphMetrics {
                advance: size * style.font().advance_ratio * weight_factor,
                line_px: size * style.line_height,
            }
        }
        GlyphModel::Cells {
            cell_width,
            cell_height,
        } => GlyphMetrics {
            advance: cell_width,
            line_px: cell_height * style.line_height.round().max(1.0),
        },
    }
}

/// Greedy word-wrapping column flow built on `textwrap`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WrapMeasure {
    pub model: GlyphModel,
    /// Space after a paragraph, in lines of that paragraph.
    pub paragraph_spacing: f32,
    /// Space after a title or heading, in lines of that heading.
    pub heading_spacing: f32,
}

impl Default for WrapMeasure {
    fn default() -> Self {
        Self {
            model: GlyphModel::Proportional,
            paragraph_spacing: 0.5,
            heading_spacing: 0.75,
        }
    }
}

impl WrapMeasure {
    pub fn cells(cell_width: f32, cell_height: f32) -> Self {
        Self {
            model: GlyphModel::Cells {
                cell_width,
                cell_height,
            },
            paragraph_spacing: 1.0,
            heading_spacing: 1.0,
        }
    }

    fn spacing_after(&self, role: FlowRole, glyph: GlyphMetrics) -> f32 {
        match role {
            FlowRole::Paragraph => glyph.line_px * self.paragraph_spacing,
            FlowRole::Title | FlowRole::ChapterHeading => glyph.line_px * self.heading_spacing,
        }
    }
}

impl TextMeasure for WrapMeasure {
    fn measure(
        &self,
        parts: &[FlowPart],
        column: ColumnBox,
        style: &ReaderStyle,
    ) -> FlowMeasurement {
        let mut fragments = Vec::new();
        let mut col = 0usize;
        let mut y = 0.0f32;
        let mut content_height = 0.0f32;
        let mut placed_any = false;
        let mut pending_gap = 0.0f32;

        for (part_index, part) in parts.iter().enumerate() {
            let text = part.text.trim();
            if text.is_empty() {
                continue;
            }
            let glyph = glyph_metrics(self.model, part.role, style);
            let chars_per_line = ((column.width / glyph.advance).floor() as usize).max(1);

            if y > 0.0 {
                y += pending_gap;
            }

            let mut current: Option<PlacedFragment> = None;
            let mut part_started = false;
            for line in textwrap::wrap(text, chars_per_line) {
                if y > 0.0 && y + glyph.line_px > column.height + FIT_EPSILON {
                    if let Some(done) = current.take() {
                        fragments.push(done);
                    }
                    col += 1;
                    y = 0.0;
                }

                let fragment = match current.as_mut() {
                    Some(fragment) => fragment,
                    None => {
                        let continued = part_started;
                        part_started = true;
                        current.insert(PlacedFragment {
                            part_index,
                            role: part.role,
                            column: col,
                            rect: FlowRect {
                                x: col as f32 * column.shift(),
                                y,
                                width: 0.0,
                                height: 0.0,
                            },
                            lines: Vec::new(),
                            continued,
                            line_height: glyph.line_px,
                        })
                    }
                };

                let line_width = (line.width() as f32 * glyph.advance).min(column.width);
                fragment.rect.width = fragment.rect.width.max(line_width);
                fragment.rect.height += glyph.line_px;
                fragment.lines.push(line.into_owned());

                y += glyph.line_px;
                content_height = content_height.max(y);
                placed_any = true;
            }
            if let Some(done) = current.take() {
                fragments.push(done);
            }
            pending_gap = self.spacing_after(part.role, glyph);
        }

        let columns = if placed_any { col + 1 } else { 0 };
        let scroll_width = if columns == 0 {
            0.0
        } else {
            columns as f32 * column.width + (columns - 1) as f32 * column.gap
        };

        FlowMeasurement {
            fragments,
            scroll_width,
            content_height,
            columns,
            stacked_overflow: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowPart;

    fn paragraph(text: &str) -> FlowPart {
        FlowPart {
            text: text.to_string(),
            role: FlowRole::Paragraph,
            continuation: false,
            provenance: None,
        }
    }

    fn style_10px() -> ReaderStyle {
        // roboto at 20px, weight 400: 10px advance, 30px lines at 1.5
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

    const COLUMN: ColumnBox = ColumnBox {
        width: 300.0,
        height: 300.0,
        gap: 240.0,
    };

    #[test]
    fn test_glyph_metrics_follow_style() {
        let glyph = glyph_metrics(GlyphModel::Proportional, FlowRole::Paragraph, &style_10px());
        assert_eq!(glyph.advance, 10.0);
        assert_eq!(glyph.line_px, 30.0);

        let cells = glyph_metrics(
            GlyphModel::Cells {
                cell_width: 1.0,
                cell_height: 1.0,
            },
            FlowRole::Title,
            &style_10px(),
        );
        assert_eq!(cells.line_px, 2.0);
    }

    #[test]
    fn test_fills_column_before_overflowing() {
        // 6 words per 30-char line, 25 lines in total: 10 + 10 + 5
        let parts = vec![paragraph(&words(150))];
        let measurement = WrapMeasure::default().measure(&parts, COLUMN, &style_10px());

        assert_eq!(measurement.columns, 3);
        assert_eq!(measurement.fragments.len(), 3);
        assert_eq!(measurement.fragments[0].lines.len(), 10);
        assert_eq!(measurement.fragments[2].lines.len(), 5);
        assert!(!measurement.fragments[0].continued);
        assert!(measurement.fragments[1].continued);
        assert_eq!(measurement.fragments[1].rect.x, 540.0);
        assert_eq!(measurement.scroll_width, 3.0 * 300.0 + 2.0 * 240.0);
        assert_eq!(measurement.content_height, 300.0);
    }

    #[test]
    fn test_spacing_collapses_at_column_top() {
        // 10 lines fill the first column exactly; the next paragraph starts
        // at the top of column two with no leading gap.
        let parts = vec![paragraph(&words(60)), paragraph("tail")];
        let measurement = WrapMeasure::default().measure(&parts, COLUMN, &style_10px());

        let tail = &measurement.fragments[1];
        assert_eq!(tail.column, 1);
        assert_eq!(tail.rect.y, 0.0);
        assert!(!tail.continued);
    }

    #[test]
    fn test_line_taller_than_column_reports_overflow() {
        let short = ColumnBox {
            width: 300.0,
            height: 20.0,
            gap: 240.0,
        };
        let parts = vec![paragraph("abcd")];
        let measurement = WrapMeasure::default().measure(&parts, short, &style_10px());

        assert_eq!(measurement.columns, 1);
        assert_eq!(measurement.content_height, 30.0);
        assert_eq!(measurement.stacked_overflow, 0.0);
    }

    #[test]
    fn test_oversized_lines_take_a_column_each() {
        let short = ColumnBox {
            width: 300.0,
            height: 20.0,
            gap: 240.0,
        };
        let parts = vec![paragraph("one"), paragraph("two"), paragraph("three")];
        let measurement = WrapMeasure::default().measure(&parts, short, &style_10px());

        assert_eq!(measurement.columns, 3);
        assert_eq!(measurement.fragments[2].rect.x, 2.0 * 540.0);
        assert_eq!(measurement.stacked_overflow, 0.0);
    }

    #[test]
    fn test_empty_flow_has_no_extent() {
        let parts = vec![paragraph("   ")];
        let measurement = WrapMeasure::default().measure(&parts, COLUMN, &style_10px());
        assert_eq!(measurement.columns, 0);
        assert_eq!(measurement.scroll_width, 0.0);
        assert!(measurement.fragments.is_empty());
    }

    #[test]
    fn test_rect_intersection_counts_partial_overlap() {
        let page = FlowRect {
            x: 540.0,
            y: 0.0,
            width: 300.0,
            height: 300.0,
        };
        let straddling = FlowRect {
            x: 500.0,
            y: 280.0,
            width: 60.0,
            height: 40.0,
        };
        let in_gap = FlowRect {
            x: 300.0,
            y: 0.0,
            width: 240.0,
            height: 300.0,
        };
        assert!(page.intersects(&straddling));
        assert!(!page.intersects(&in_gap));
    }
}
