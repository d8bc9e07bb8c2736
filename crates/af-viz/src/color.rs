//! Colours and the stack palettes.

use std::fmt;

/// sRGB colour with opacity in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub opacity: f64,
}

/// Opaque black.
pub const BLACK: Color = Color::rgb(0, 0, 0);
/// Opaque white.
pub const WHITE: Color = Color::rgb(255, 255, 255);

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, opacity: 1.0 }
    }

    /// Parse `#rrggbb` or `rrggbb`.
    pub fn parse(s: &str) -> Option<Self> {
        let digits = s.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.is_ascii() {
            return None;
        }
        let value = u32::from_str_radix(digits, 16).ok()?;
        let [_, r, g, b] = value.to_be_bytes();
        Some(Self::rgb(r, g, b))
    }

    pub const fn translucent(self, opacity: f64) -> Self {
        Self { opacity, ..self }
    }

    fn is_opaque(&self) -> bool {
        self.opacity >= 1.0 - 1e-6
    }
}

/// CSS form: `#rrggbb` when opaque, `rgba(..)` otherwise.
impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_opaque() {
            write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            write!(f, "rgba({},{},{},{:.3})", self.r, self.g, self.b, self.opacity)
        }
    }
}

/// Named colour sequence used for stacked simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Palette {
    /// Ten-colour CMS sequence.
    Petroff10,
    /// Six-colour CMS sequence.
    Petroff6,
    Tableau10,
}

impl Palette {
    /// Palette called `name`; unknown names give [`Palette::Petroff10`].
    pub fn named(name: &str) -> Self {
        match name {
            "cms_petroff6" => Self::Petroff6,
            "tableau10" => Self::Tableau10,
            _ => Self::Petroff10,
        }
    }

    fn codes(self) -> &'static [u32] {
        match self {
            Self::Petroff10 => &[
                0x3f90da, 0xffa90e, 0xbd1f01, 0x94a4a2, 0x832db6, 0xa96b59, 0xe76300, 0xb9ac70, 0x717581, 0x92dadd,
            ],
            Self::Petroff6 => &[0x5790fc, 0xf89c20, 0xe42536, 0x964a8b, 0x9c9ca1, 0x7a21dd],
            Self::Tableau10 => &[
                0x4e79a7, 0xf28e2b, 0xe15759, 0x76b7b2, 0x59a14f, 0xedc948, 0xb07aa1, 0xff9da7, 0x9c755f, 0xbab0ab,
            ],
        }
    }

    /// Colour of the `index`-th stacked component, wrapping around.
    pub fn color(self, index: usize) -> Color {
        let codes = self.codes();
        let [_, r, g, b] = codes[index % codes.len()].to_be_bytes();
        Color::rgb(r, g, b)
    }

    /// The first `n` colours.
    pub fn take(self, n: usize) -> Vec<Color> {
        (0..n).map(|i| self.color(i)).collect()
    }
}
