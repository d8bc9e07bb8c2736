//! Paint, stroke and font settings passed to [`crate::canvas::Svg`].

use crate::color::{BLACK, Color};

/// Line drawn along a path or around a shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stroke {
    pub color: Color,
    pub width: f64,
    pub dashed: bool,
}

impl Stroke {
    pub const fn new(color: Color, width: f64) -> Self {
        Self { color, width, dashed: false }
    }

    pub const fn dashed(self) -> Self {
        Self { dashed: true, ..self }
    }
}

/// Interior and outline of a closed shape.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Paint {
    pub fill: Option<Color>,
    pub outline: Option<Stroke>,
}

impl Paint {
    pub const fn solid(color: Color) -> Self {
        Self { fill: Some(color), outline: None }
    }

    pub const fn outlined(self, outline: Stroke) -> Self {
        Self { outline: Some(outline), ..self }
    }
}

/// Horizontal placement of text relative to its anchor point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

/// Vertical placement of text relative to its anchor point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VAlign {
    #[default]
    Baseline,
    Middle,
    Top,
}

/// Text appearance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Font {
    pub size: f64,
    pub color: Color,
    pub bold: bool,
    pub italic: bool,
    pub align: Align,
    pub valign: VAlign,
}

impl Font {
    /// Regular black text of `size` points, left aligned on the baseline.
    pub const fn new(size: f64) -> Self {
        Self { size, color: BLACK, bold: false, italic: false, align: Align::Left, valign: VAlign::Baseline }
    }

    pub const fn bold(self) -> Self {
        Self { bold: true, ..self }
    }

    pub const fn italic(self) -> Self {
        Self { italic: true, ..self }
    }

    pub const fn colored(self, color: Color) -> Self {
        Self { color, ..self }
    }

    pub const fn placed(self, align: Align, valign: VAlign) -> Self {
        Self { align, valign, ..self }
    }
}
