//! Drawing the column strip into a terminal buffer.
//!
//! The strip is the whole chapter laid out as side-by-side columns in px.
//! The page window is one column wide; it looks at the strip from
//! `translate_x`, so a turn in progress shows the edges of two pages.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Modifier, Style},
    widgets::Widget,
};
use unicode_width::UnicodeWidthChar;

use crate::flow::FlowRole;
use crate::metrics::ColumnMetrics;
use crate::pagination::Pagination;
use crate::style::{ReaderStyle, ThemePreset};

/// Terminal cell size in px.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellSize {
    pub width: f32,
    pub height: f32,
}

/// Where the column window sits inside the page frame, in cells.
pub fn column_area(frame: Rect, metrics: &ColumnMetrics, cell: CellSize) -> Rect {
    let dx = ((metrics.frame_inset + metrics.flow_padding_x) / cell.width).round() as u16;
    let dy = ((metrics.frame_inset + metrics.flow_padding_y) / cell.height).round() as u16;
    let width = (metrics.column_width / cell.width).floor() as u16;
    let height = (metrics.column_height / cell.height).floor() as u16;
    Rect {
        x: frame.x.saturating_add(dx),
        y: frame.y.saturating_add(dy),
        width: width.min(frame.width.saturating_sub(dx)),
        height: height.min(frame.height.saturating_sub(dy)),
    }
}

pub struct PageStrip<'a> {
    pagination: &'a Pagination,
    style: &'a ReaderStyle,
    theme: &'a ThemePreset,
    translate_x: f32,
    cell: CellSize,
    dimmed: bool,
}

impl<'a> PageStrip<'a> {
    pub fn new(
        pagination: &'a Pagination,
        style: &'a ReaderStyle,
        theme: &'a ThemePreset,
        translate_x: f32,
        cell: CellSize,
    ) -> Self {
        Self {
            pagination,
            style,
            theme,
            translate_x,
            cell,
            dimmed: false,
        }
    }

    /// Draw faded, e.g. while the buffer surface is still being revealed.
    pub fn dimmed(mut self, dimmed: bool) -> Self {
        self.dimmed = dimmed;
        self
    }

    fn text_style(&self, role: FlowRole) -> Style {
        let mut style = Style::default()
            .fg(self.theme.text.color())
            .bg(self.theme.backdrop.0.color());
        if role != FlowRole::Paragraph || self.style.font_weight >= 600 {
            style = style.add_modifier(Modifier::BOLD);
        }
        if self.dimmed {
            style = style.add_modifier(Modifier::DIM);
        }
        style
    }
}

impl Widget for PageStrip<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let area = area.intersection(buf.area);
        if area.is_empty() {
            return;
        }
        buf.set_style(
            area,
            Style::default()
                .fg(self.theme.text.color())
                .bg(self.theme.backdrop.0.color()),
        );

        let width = area.width as i64;
        for fragment in &self.pagination.fragments {
            let left = ((fragment.rect.x - self.translate_x) / self.cell.width).round() as i64;
            let span = (fragment.rect.width / self.cell.width).ceil() as i64;
            if left >= width || left + span <= 0 {
                continue;
            }
            let style = self.text_style(fragment.role);

            for (i, line) in fragment.lines.iter().enumerate() {
                let top = fragment.rect.y + i as f32 * fragment.line_height;
                let row = (top / self.cell.height).round() as i64;
                if row < 0 || row >= area.height as i64 {
                    continue;
                }
                let y = area.y + row as u16;

                let mut col = left;
                for ch in line.chars() {
                    let w = ch.width().unwrap_or(0) as i64;
                    if w == 0 {
                        continue;
                    }
                    if col >= 0 && col + w <= width {
                        if let Some(cell) = buf.cell_mut((area.x + col as u16, y)) {
                            cell.set_char(ch).set_style(style);
                        }
                    }
                    col += w;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowPart;
    use crate::measure::WrapMeasure;
    use crate::pagination::{PaginationTuning, build_pagination};
    use crate::style::theme_preset;

    const ONE_PX: CellSize = CellSize {
        width: 1.0,
        height: 1.0,
    };

    fn style() -> ReaderStyle {
        ReaderStyle {
            font_id: "roboto".into(),
            font_size: 24,
            line_height: 1.0,
            font_weight: 400,
            theme_id: "night".into(),
        }
    }

    /// Two pages: two lines on the first, one on the second.
    fn pagination() -> Pagination {
        let parts = vec![FlowPart {
            text: "one two three four five six seven eight nine ten".into(),
            role: FlowRole::Paragraph,
            continuation: false,
            provenance: None,
        }];
        build_pagination(
            "c1",
            &parts,
            &ColumnMetrics::new(20.0, 2.0, 4.0),
            &style(),
            &WrapMeasure::cells(1.0, 1.0),
            &PaginationTuning::default(),
        )
        .unwrap()
    }

    fn row(buf: &Buffer, y: u16) -> String {
        (0..buf.area.width)
            .map(|x| buf[(x, y)].symbol().to_string())
            .collect::<String>()
            .trim_end()
            .to_string()
    }

    fn draw(pagination: &Pagination, translate_x: f32) -> Buffer {
        let style = style();
        let theme = theme_preset("night").unwrap();
        let area = Rect::new(0, 0, 20, 2);
        let mut buf = Buffer::empty(area);
        PageStrip::new(pagination, &style, theme, translate_x, ONE_PX).render(area, &mut buf);
        buf
    }

    #[test]
    fn test_first_page_shows_first_column() {
        let pagination = pagination();
        assert_eq!(pagination.total_pages, 2);
        let buf = draw(&pagination, 0.0);
        assert_eq!(row(&buf, 0), "one two three four");
        assert_eq!(row(&buf, 1), "five six seven eight");
    }

    #[test]
    fn test_second_page_shows_second_column() {
        let pagination = pagination();
        let buf = draw(&pagination, pagination.page_offset(1));
        assert_eq!(row(&buf, 0), "nine ten");
        assert_eq!(row(&buf, 1), "");
    }

    #[test]
    fn test_mid_turn_shows_both_pages() {
        let pagination = pagination();
        let buf = draw(&pagination, 12.0);
        let top = row(&buf, 0);
        assert!(top.starts_with("e four"));
        assert!(top.ends_with("nine ten"));
    }

    #[test]
    fn test_column_area_skips_frame_and_padding() {
        let metrics = ColumnMetrics {
            frame_inset: 12.0,
            flow_padding_x: 8.0,
            flow_padding_y: 8.0,
            ..ColumnMetrics::new(760.0, 360.0, 240.0)
        };
        let cell = CellSize {
            width: 10.0,
            height: 20.0,
        };
        let area = column_area(Rect::new(1, 1, 80, 20), &metrics, cell);
        assert_eq!(area, Rect::new(3, 2, 76, 18));
    }
}
