//! Streaming SVG writer.
//!
//! Elements are serialized into the body as they are drawn, so the document
//! is a pure function of the drawing calls. Coordinates are in points.

use std::fmt::{Display, Write};

use crate::color::{Color, WHITE};
use crate::primitives::{Align, Font, Paint, Stroke, VAlign};

const FONT_FAMILY: &str = "Helvetica, Arial, sans-serif";

/// An SVG document under construction.
#[derive(Debug, Clone)]
pub struct Svg {
    width: f64,
    height: f64,
    defs: String,
    body: String,
    clips: usize,
    open_groups: usize,
}

/// One element being written; attributes are appended until it is closed.
struct Tag<'a> {
    out: &'a mut String,
}

impl Tag<'_> {
    fn attr(mut self, key: &str, value: impl Display) -> Self {
        let _ = write!(self.out, r#" {key}="{value}""#);
        self
    }

    fn coord(mut self, key: &str, value: f64) -> Self {
        let _ = write!(self.out, r#" {key}="{value:.2}""#);
        self
    }

    fn stroke(self, stroke: &Stroke) -> Self {
        let tag = self.attr("stroke", stroke.color).coord("stroke-width", stroke.width);
        if stroke.dashed { tag.attr("stroke-dasharray", "6 3") } else { tag }
    }

    fn paint(self, paint: &Paint) -> Self {
        let tag = match paint.fill {
            Some(color) => self.attr("fill", color),
            None => self.attr("fill", "none"),
        };
        match &paint.outline {
            Some(outline) => tag.stroke(outline),
            None => tag,
        }
    }

    fn font(self, font: &Font) -> Self {
        let anchor = match font.align {
            Align::Left => "start",
            Align::Center => "middle",
            Align::Right => "end",
        };
        let baseline = match font.valign {
            VAlign::Baseline => "auto",
            VAlign::Middle => "central",
            VAlign::Top => "hanging",
        };
        let mut tag = self
            .attr("font-family", FONT_FAMILY)
            .attr("font-size", format_args!("{:.1}", font.size))
            .attr("fill", font.color)
            .attr("text-anchor", anchor)
            .attr("dominant-baseline", baseline);
        if font.bold {
            tag = tag.attr("font-weight", "bold");
        }
        if font.italic {
            tag = tag.attr("font-style", "italic");
        }
        tag
    }

    fn end(mut self) {
        self.out.push_str(" />\n");
    }

    fn end_with_text(mut self, name: &str, content: &str) {
        self.out.push('>');
        for ch in content.chars() {
            match ch {
                '<' => self.out.push_str("&lt;"),
                '>' => self.out.push_str("&gt;"),
                '&' => self.out.push_str("&amp;"),
                '"' => self.out.push_str("&quot;"),
                _ => self.out.push(ch),
            }
        }
        let _ = writeln!(self.out, "</{name}>");
    }
}

impl Svg {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height, defs: String::new(), body: String::new(), clips: 0, open_groups: 0 }
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    fn open(&mut self, name: &str) -> Tag<'_> {
        self.body.push('<');
        self.body.push_str(name);
        Tag { out: &mut self.body }
    }

    pub fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, paint: &Paint) {
        self.open("rect").coord("x", x).coord("y", y).coord("width", w).coord("height", h).paint(paint).end();
    }

    pub fn line(&mut self, from: (f64, f64), to: (f64, f64), stroke: &Stroke) {
        self.open("line")
            .coord("x1", from.0)
            .coord("y1", from.1)
            .coord("x2", to.0)
            .coord("y2", to.1)
            .stroke(stroke)
            .end();
    }

    pub fn polyline(&mut self, points: &[(f64, f64)], stroke: &Stroke) {
        if points.len() < 2 {
            return;
        }
        let list = points.iter().map(|(x, y)| format!("{x:.2},{y:.2}")).collect::<Vec<_>>().join(" ");
        self.open("polyline").attr("points", list).attr("fill", "none").stroke(stroke).end();
    }

    pub fn circle(&mut self, cx: f64, cy: f64, r: f64, paint: &Paint) {
        self.open("circle").coord("cx", cx).coord("cy", cy).coord("r", r).paint(paint).end();
    }

    /// Filled data point of radius `r`.
    pub fn dot(&mut self, cx: f64, cy: f64, r: f64, color: Color) {
        self.circle(cx, cy, r, &Paint::solid(color).outlined(Stroke::new(color, 0.5)));
    }

    pub fn text(&mut self, x: f64, y: f64, content: &str, font: &Font) {
        self.open("text").coord("x", x).coord("y", y).font(font).end_with_text("text", content);
    }

    /// Text reading bottom to top, anchored at `(x, y)`.
    pub fn text_vertical(&mut self, x: f64, y: f64, content: &str, font: &Font) {
        self.open("text")
            .coord("x", x)
            .coord("y", y)
            .font(font)
            .attr("transform", format_args!("rotate(-90,{x:.2},{y:.2})"))
            .end_with_text("text", content);
    }

    /// Clip everything drawn until [`Svg::end_clip`] to the given rectangle.
    pub fn begin_clip(&mut self, x: f64, y: f64, w: f64, h: f64) -> String {
        let id = format!("clip{}", self.clips);
        self.clips += 1;
        let _ = writeln!(
            self.defs,
            r#"<clipPath id="{id}"><rect x="{x:.2}" y="{y:.2}" width="{w:.2}" height="{h:.2}" /></clipPath>"#
        );
        let _ = writeln!(self.body, r#"<g clip-path="url(#{id})">"#);
        self.open_groups += 1;
        id
    }

    pub fn end_clip(&mut self) {
        if self.open_groups > 0 {
            self.open_groups -= 1;
            self.body.push_str("</g>\n");
        }
    }

    /// Approximate width of `content` set in `font`.
    pub fn text_width(content: &str, font: &Font) -> f64 {
        let em: f64 = content.chars().map(glyph_advance).sum();
        em * font.size * if font.bold { 1.06 } else { 1.0 }
    }

    /// Close open groups and return the document.
    pub fn finish(mut self) -> String {
        while self.open_groups > 0 {
            self.end_clip();
        }
        let mut out = String::with_capacity(self.defs.len() + self.body.len() + 256);
        let _ = writeln!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = self.width,
            h = self.height,
        );
        if !self.defs.is_empty() {
            let _ = write!(out, "<defs>\n{}</defs>\n", self.defs);
        }
        let _ = writeln!(out, r#"<rect width="{}" height="{}" fill="{WHITE}" />"#, self.width, self.height);
        out.push_str(&self.body);
        out.push_str("</svg>\n");
        out
    }
}

/// Advance width in em of one glyph, close to common sans-serif metrics.
fn glyph_advance(ch: char) -> f64 {
    match ch {
        'i' | 'j' | 'l' | '.' | ',' | ':' | ';' | '\'' | '|' | '!' => 0.28,
        'f' | 't' | 'r' | 'I' | ' ' | '(' | ')' | '[' | ']' | '/' | '-' => 0.36,
        'm' | 'w' | 'M' | 'W' => 0.86,
        c if c.is_ascii_uppercase() => 0.68,
        c if c.is_ascii_digit() => 0.56,
        _ => 0.55,
    }
}
