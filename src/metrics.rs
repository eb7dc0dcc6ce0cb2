//! Column box derivation from the viewport and the current style.

use serde::{Deserialize, Serialize};

use crate::measure::ColumnBox;
use crate::style::ReaderStyle;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Container padding around the reading frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Insets {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Insets {
    pub fn uniform(value: f32) -> Self {
        Self {
            top: value,
            right: value,
            bottom: value,
            left: value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutTuning {
    /// Inset of the page frame on every edge, in px.
    pub frame_inset: f32,
    pub flow_padding_x: f32,
    pub flow_padding_y: f32,
    pub base_gap: f32,
    pub min_gap: f32,
    pub max_gap: f32,
    /// Font size that maps to a font scale of 1.
    pub base_font_size: f32,
}

impl Default for LayoutTuning {
    fn default() -> Self {
        Self {
            frame_inset: 12.0,
            flow_padding_x: 8.0,
            flow_padding_y: 8.0,
            base_gap: 24.0,
            min_gap: 240.0,
            max_gap: 720.0,
            base_font_size: 46.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnMetrics {
    pub column_width: f32,
    pub column_height: f32,
    pub column_gap: f32,
    pub inner_width: f32,
    pub inner_height: f32,
    pub frame_inset: f32,
    pub flow_padding_x: f32,
    pub flow_padding_y: f32,
}

impl ColumnMetrics {
    /// Metrics for a bare column box with no frame or padding.
    pub fn new(column_width: f32, column_height: f32, column_gap: f32) -> Self {
        Self {
            column_width,
            column_height,
            column_gap,
            inner_width: column_width,
            inner_height: column_height,
            frame_inset: 0.0,
            flow_padding_x: 0.0,
            flow_padding_y: 0.0,
        }
    }

    pub fn page_shift_width(&self) -> f32 {
        self.column_width + self.column_gap
    }

    pub fn column_box(&self) -> ColumnBox {
        ColumnBox {
            width: self.column_width,
            height: self.column_height,
            gap: self.column_gap,
        }
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.column_width.is_finite() && self.column_height.is_finite())
            || self.column_width <= 0.0
            || self.column_height <= 0.0
            || !self.column_gap.is_finite()
            || self.column_gap < 0.0
    }
}

/// Gap between columns, widened with the font so neighbouring pages stay
/// visually apart.
pub fn column_gap(font_size: u16, tuning: &LayoutTuning) -> f32 {
    let font_scale = font_size as f32 / tuning.base_font_size;
    (tuning.base_gap * font_scale.sqrt() * 10.0).clamp(tuning.min_gap, tuning.max_gap)
}

/// `None` means the container is not laid out yet; try again on the next
/// layout event.
pub fn compute_metrics(
    viewport: Viewport,
    container: Insets,
    style: &ReaderStyle,
    tuning: &LayoutTuning,
) -> Option<ColumnMetrics> {
    if !(viewport.width > 0.0 && viewport.height > 0.0) {
        return None;
    }

    let inner_width = viewport.width - container.left - container.right;
    let inner_height = viewport.height - container.top - container.bottom;
    let column_width = inner_width - 2.0 * tuning.frame_inset - 2.0 * tuning.flow_padding_x;
    let column_height = inner_height - 2.0 * tuning.frame_inset - 2.0 * tuning.flow_padding_y;
    if !(column_width > 0.0 && column_height > 0.0) {
        return None;
    }

    Some(ColumnMetrics {
        column_width: column_width.floor(),
        column_height: column_height.floor(),
        column_gap: column_gap(style.font_size, tuning),
        inner_width,
        inner_height,
        frame_inset: tuning.frame_inset,
        flow_padding_x: tuning.flow_padding_x,
        flow_padding_y: tuning.flow_padding_y,
    })
}
