//! Reader typography: fonts, theme presets and the style tuple that feeds
//! layout.

use ratatui::style::Color;
use serde::{Deserialize, Serialize};

use crate::metrics::ColumnMetrics;

pub const MIN_FONT_SIZE: u16 = 24;
pub const MAX_FONT_SIZE: u16 = 72;
pub const FONT_SIZE_STEP: i32 = 2;
pub const DEFAULT_FONT_SIZE: u16 = 46;

pub const MIN_LINE_HEIGHT: f32 = 1.0;
pub const MAX_LINE_HEIGHT: f32 = 2.0;
pub const LINE_HEIGHT_STEP: f32 = 0.1;
pub const DEFAULT_LINE_HEIGHT: f32 = 1.4;

pub const MIN_FONT_WEIGHT: u16 = 300;
pub const MAX_FONT_WEIGHT: u16 = 900;
pub const FONT_WEIGHT_STEP: u16 = 100;
pub const DEFAULT_FONT_WEIGHT: u16 = 500;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontOption {
    pub id: &'static str,
    pub label: &'static str,
    pub css: &'static str,
    /// Average glyph advance as a fraction of the font size.
    pub advance_ratio: f32,
}

pub static FONT_OPTIONS: [FontOption; 5] = [
    FontOption {
        id: "alice",
        label: "Alice",
        css: "'Alice', serif",
        advance_ratio: 0.52,
    },
    FontOption {
        id: "droid-serif",
        label: "Droid Serif",
        css: "'Droid Serif', serif",
        advance_ratio: 0.55,
    },
    FontOption {
        id: "roboto",
        label: "Roboto",
        css: "'Roboto', sans-serif",
        advance_ratio: 0.5,
    },
    FontOption {
        id: "rt-sans",
        label: "RT Sans",
        css: "'PT Sans', sans-serif",
        advance_ratio: 0.49,
    },
    FontOption {
        id: "comfortaa",
        label: "Comfortaa",
        css: "'Comfortaa', cursive",
        advance_ratio: 0.58,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }

    pub fn color(self) -> Color {
        Color::Rgb(self.0, self.1, self.2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThemePreset {
    pub id: &'static str,
    pub label: &'static str,
    pub text: Rgb,
    /// Gradient endpoints of the page backdrop.
    pub backdrop: (Rgb, Rgb),
    pub rule: Rgb,
}

impl ThemePreset {
    pub fn backdrop_css(&self) -> String {
        format!(
            "linear-gradient(135deg, {}, {})",
            self.backdrop.0.hex(),
            self.backdrop.1.hex()
        )
    }
}

pub static THEME_PRESETS: [ThemePreset; 7] = [
    ThemePreset {
        id: "day",
        label: "Day",
        text: Rgb(0x32, 0x22, 0x16),
        backdrop: (Rgb(0xfe, 0xf6, 0xdd), Rgb(0xf8, 0xe1, 0xb5)),
        rule: Rgb(0xd9, 0xc3, 0x96),
    },
    ThemePreset {
        id: "night",
        label: "Night",
        text: Rgb(0xf2, 0xf6, 0xff),
        backdrop: (Rgb(0x17, 0x20, 0x33), Rgb(0x05, 0x0b, 0x16)),
        rule: Rgb(0x2c, 0x39, 0x55),
    },
    ThemePreset {
        id: "night-contrast",
        label: "Night contrast",
        text: Rgb(0xfe, 0xfe, 0xfe),
        backdrop: (Rgb(0x1c, 0x1d, 0x3b), Rgb(0x01, 0x12, 0x21)),
        rule: Rgb(0x3a, 0x3c, 0x6e),
    },
    ThemePreset {
        id: "sepia",
        label: "Sepia",
        text: Rgb(0x3a, 0x1a, 0x00),
        backdrop: (Rgb(0xff, 0xf1, 0xd0), Rgb(0xf7, 0xd5, 0xa3)),
        rule: Rgb(0xd8, 0xb0, 0x78),
    },
    ThemePreset {
        id: "sepia-contrast",
        label: "Sepia contrast",
        text: Rgb(0x2b, 0x17, 0x00),
        backdrop: (Rgb(0xff, 0xe6, 0xbb), Rgb(0xee, 0xc3, 0x7a)),
        rule: Rgb(0xc4, 0x93, 0x4c),
    },
    ThemePreset {
        id: "dusk",
        label: "Dusk",
        text: Rgb(0x36, 0x1b, 0x44),
        backdrop: (Rgb(0xf7, 0xde, 0xf7), Rgb(0xa8, 0xc8, 0xff)),
        rule: Rgb(0xb9, 0x9c, 0xd4),
    },
    ThemePreset {
        id: "console",
        label: "Console",
        text: Rgb(0x21, 0xff, 0x88),
        backdrop: (Rgb(0x00, 0x19, 0x24), Rgb(0x00, 0x2c, 0x38)),
        rule: Rgb(0x0b, 0x5e, 0x44),
    },
];

pub const DEFAULT_FONT_ID: &str = "alice";
pub const DEFAULT_THEME_ID: &str = "sepia";

pub fn font_option(id: &str) -> Option<&'static FontOption> {
    FONT_OPTIONS.iter().find(|f| f.id == id)
}

pub fn theme_preset(id: &str) -> Option<&'static ThemePreset> {
    THEME_PRESETS.iter().find(|t| t.id == id)
}

fn cycle<T>(items: &'static [T], current: usize, direction: i32) -> &'static T {
    let len = items.len() as i32;
    let next = (current as i32 + direction).rem_euclid(len);
    &items[next as usize]
}

/// Typography inputs that change layout. Turn speed is deliberately not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReaderStyle {
    pub font_id: String,
    pub font_size: u16,
    pub line_height: f32,
    pub font_weight: u16,
    pub theme_id: String,
}

impl Default for ReaderStyle {
    fn default() -> Self {
        Self {
            font_id: DEFAULT_FONT_ID.to_string(),
            font_size: DEFAULT_FONT_SIZE,
            line_height: DEFAULT_LINE_HEIGHT,
            font_weight: DEFAULT_FONT_WEIGHT,
            theme_id: DEFAULT_THEME_ID.to_string(),
        }
    }
}

impl ReaderStyle {
    /// Bring every field into its usable range; unknown ids fall back to
    /// defaults.
    pub fn clamped(mut self) -> Self {
        self.font_size = self.font_size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE);
        self.line_height = clamp_line_height(self.line_height);
        self.font_weight = quantize_weight(self.font_weight);
        if font_option(&self.font_id).is_none() {
            self.font_id = DEFAULT_FONT_ID.to_string();
        }
        if theme_preset(&self.theme_id).is_none() {
            self.theme_id = DEFAULT_THEME_ID.to_string();
        }
        self
    }

    pub fn font(&self) -> &'static FontOption {
        font_option(&self.font_id).unwrap_or(&FONT_OPTIONS[0])
    }

    pub fn theme(&self) -> &'static ThemePreset {
        theme_preset(&self.theme_id).unwrap_or(&THEME_PRESETS[3])
    }

    pub fn adjust_font_size(&mut self, delta: i32) {
        let size = (self.font_size as i32 + delta)
            .clamp(MIN_FONT_SIZE as i32, MAX_FONT_SIZE as i32);
        self.font_size = size as u16;
    }

    pub fn adjust_line_height(&mut self, delta: f32) {
        self.line_height = clamp_line_height(self.line_height + delta);
    }

    pub fn adjust_font_weight(&mut self, steps: i32) {
        let weight = self.font_weight as i32 + steps * FONT_WEIGHT_STEP as i32;
        self.font_weight = quantize_weight(weight.max(0) as u16);
    }

    pub fn cycle_font(&mut self, direction: i32) {
        let current = FONT_OPTIONS
            .iter()
            .position(|f| f.id == self.font_id)
            .unwrap_or(0);
        self.font_id = cycle(&FONT_OPTIONS, current, direction).id.to_string();
    }

    pub fn cycle_theme(&mut self, direction: i32) {
        let current = THEME_PRESETS
            .iter()
            .position(|t| t.id == self.theme_id)
            .unwrap_or(3);
        self.theme_id = cycle(&THEME_PRESETS, current, direction).id.to_string();
    }
}

/// Line height snapped to one decimal so repeated steps never drift.
pub fn clamp_line_height(value: f32) -> f32 {
    if !value.is_finite() {
        return DEFAULT_LINE_HEIGHT;
    }
    let snapped = (value * 10.0).round() / 10.0;
    snapped.clamp(MIN_LINE_HEIGHT, MAX_LINE_HEIGHT)
}

pub fn quantize_weight(weight: u16) -> u16 {
    let rounded = ((weight as f32 / FONT_WEIGHT_STEP as f32).round() as u16) * FONT_WEIGHT_STEP;
    rounded.clamp(MIN_FONT_WEIGHT, MAX_FONT_WEIGHT)
}

/// Presentation values derived from style and metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleTokens {
    pub column_width: f32,
    pub column_gap: f32,
    pub rule_color: Rgb,
    pub font_family: &'static str,
    pub font_size: u16,
    pub line_height: f32,
    pub font_weight: u16,
    pub text_color: Rgb,
    pub backdrop: (Rgb, Rgb),
}

impl StyleTokens {
    pub fn resolve(style: &ReaderStyle, metrics: &ColumnMetrics) -> Self {
        let theme = style.theme();
        Self {
            column_width: metrics.column_width,
            column_gap: metrics.column_gap,
            rule_color: theme.rule,
            font_family: style.font().css,
            font_size: style.font_size,
            line_height: style.line_height,
            font_weight: style.font_weight,
            text_color: theme.text,
            backdrop: theme.backdrop,
        }
    }

    /// CSS custom properties, for a web presentation layer.
    pub fn css_properties(&self) -> Vec<(&'static str, String)> {
        vec![
            ("--reader-column-width", format!("{:.0}px", self.column_width)),
            ("--reader-column-gap", format!("{:.0}px", self.column_gap)),
            ("--reader-column-rule-color", self.rule_color.hex()),
            ("--reader-font-family", self.font_family.to_string()),
            ("--reader-font-size", format!("{}px", self.font_size)),
            ("--reader-line-height", format!("{:.2}", self.line_height)),
            ("--reader-font-weight", self.font_weight.to_string()),
            ("--reader-text-color", self.text_color.hex()),
            (
                "--reader-backdrop",
                format!(
                    "linear-gradient(135deg, {}, {})",
                    self.backdrop.0.hex(),
                    self.backdrop.1.hex()
                ),
            ),
        ]
    }
}
