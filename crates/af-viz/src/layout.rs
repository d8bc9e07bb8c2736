//! Panel geometry, axis frames, the legend box and the experiment header.

use crate::axes::Axis;
use crate::canvas::Svg;
use crate::color::{BLACK, Color, WHITE};
use crate::config::RenderConfig;
use crate::primitives::{Align, Font, Paint, Stroke, VAlign};

const MAJOR_TICK: f64 = 6.0;
const MINOR_TICK: f64 = 3.0;
/// Tolerance for ticks sitting on the frame.
const EDGE_SLACK: f64 = 0.5;

/// Axis-aligned rectangle in points, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Panel {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Panel {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> f64 {
        self.x + self.w
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.h
    }

    /// Split into an upper panel and a lower one holding `lower_frac` of the
    /// height, separated by `gap`.
    pub fn split(&self, lower_frac: f64, gap: f64) -> (Panel, Panel) {
        let lower_h = self.h * lower_frac;
        let upper_h = self.h - lower_h - gap;
        (Panel::new(self.x, self.y, self.w, upper_h), Panel::new(self.x, self.y + upper_h + gap, self.w, lower_h))
    }

    fn x_of(&self, axis: &Axis, value: f64) -> Option<f64> {
        let px = axis.project(value, self.x, self.right());
        (self.x - EDGE_SLACK..=self.right() + EDGE_SLACK).contains(&px).then_some(px)
    }

    fn y_of(&self, axis: &Axis, value: f64) -> Option<f64> {
        let py = axis.project(value, self.bottom(), self.y);
        (self.y - EDGE_SLACK..=self.bottom() + EDGE_SLACK).contains(&py).then_some(py)
    }
}

/// Box frame with ticks pointing inwards on all four sides.
///
/// The y axis is always labelled. The x axis is labelled only when
/// `label_x` is set, so a main panel above a ratio panel leaves it bare.
pub fn draw_frame(svg: &mut Svg, panel: &Panel, x_axis: &Axis, y_axis: &Axis, label_x: bool, config: &RenderConfig) {
    let outline = Paint::default().outlined(Stroke::new(BLACK, 0.8));
    svg.rect(panel.x, panel.y, panel.w, panel.h, &outline);

    let tick = |major: bool| Stroke::new(BLACK, if major { 0.6 } else { 0.4 });
    for t in &x_axis.ticks {
        let Some(px) = panel.x_of(x_axis, t.value) else { continue };
        let len = if t.label.is_some() { MAJOR_TICK } else { MINOR_TICK };
        let stroke = tick(t.label.is_some());
        svg.line((px, panel.bottom()), (px, panel.bottom() - len), &stroke);
        svg.line((px, panel.y), (px, panel.y + len), &stroke);
    }
    for t in &y_axis.ticks {
        let Some(py) = panel.y_of(y_axis, t.value) else { continue };
        let len = if t.label.is_some() { MAJOR_TICK } else { MINOR_TICK };
        let stroke = tick(t.label.is_some());
        svg.line((panel.x, py), (panel.x + len, py), &stroke);
        svg.line((panel.right(), py), (panel.right() - len, py), &stroke);
    }

    let tick_font = Font::new(config.tick_size);
    let title_font = Font::new(config.label_size).placed(Align::Right, VAlign::Baseline);

    if label_x {
        let font = tick_font.placed(Align::Center, VAlign::Top);
        for (value, label) in x_axis.major() {
            if let Some(px) = panel.x_of(x_axis, value) {
                svg.text(px, panel.bottom() + 4.0, label, &font);
            }
        }
        if !x_axis.title.is_empty() {
            svg.text(panel.right(), panel.bottom() + config.tick_size + 20.0, &x_axis.title, &title_font);
        }
    }

    let font = tick_font.placed(Align::Right, VAlign::Middle);
    let mut widest = 0.0_f64;
    for (value, label) in y_axis.major() {
        if let Some(py) = panel.y_of(y_axis, value) {
            svg.text(panel.x - 4.0, py, label, &font);
            widest = widest.max(Svg::text_width(label, &font));
        }
    }
    if !y_axis.title.is_empty() {
        svg.text_vertical(panel.x - widest - 12.0, panel.y, &y_axis.title, &title_font);
    }
}

/// `<name> <status>` on the left and `<L> fb⁻¹ (<√s> TeV)` on the right,
/// just above `panel`.
pub fn draw_header(svg: &mut Svg, panel: &Panel, config: &RenderConfig) {
    let exp = &config.experiment;
    let y = panel.y - 6.0;

    if !exp.name.is_empty() {
        let name_font = Font::new(config.label_size * 1.3).bold();
        svg.text(panel.x, y, &exp.name, &name_font);
        if !exp.status.is_empty() {
            let x = panel.x + Svg::text_width(&exp.name, &name_font) + 5.0;
            svg.text(x, y, &exp.status, &Font::new(config.label_size * 1.1).italic());
        }
    }

    let lumi = (exp.lumi_fb_inv > 0.0).then(|| format!("{} fb\u{207B}\u{00B9}", exp.lumi_fb_inv));
    let energy = (exp.sqrt_s_tev > 0.0).then(|| format!("({} TeV)", exp.sqrt_s_tev));
    let info = [lumi, energy].into_iter().flatten().collect::<Vec<_>>().join(" ");
    if !info.is_empty() {
        svg.text(panel.right(), y, &info, &Font::new(config.label_size).placed(Align::Right, VAlign::Baseline));
    }
}

/// How a legend row draws its key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Swatch {
    /// Filled box, for stacked components.
    Fill(Color),
    /// Short line, for overlaid components.
    Line(Stroke),
    /// Data point.
    Dot(Color),
}

/// Legend rows in drawing order.
#[derive(Debug, Clone, Default)]
pub struct Legend {
    rows: Vec<(Swatch, String)>,
}

impl Legend {
    pub fn push(&mut self, swatch: Swatch, label: impl Into<String>) {
        self.rows.push((swatch, label.into()));
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Draw in the top-right corner of `panel` on a translucent white box.
    pub fn draw(&self, svg: &mut Svg, panel: &Panel, font_size: f64) {
        if self.rows.is_empty() {
            return;
        }
        let font = Font::new(font_size * 0.85).placed(Align::Left, VAlign::Middle);
        let (pad, key_w, key_h, gap) = (6.0, 14.0, font_size - 2.0, 6.0);
        let row_h = font_size + 4.0;

        let text_w = self.rows.iter().map(|(_, l)| Svg::text_width(l, &font)).fold(0.0_f64, f64::max);
        let w = 2.0 * pad + key_w + gap + text_w;
        let h = 2.0 * pad + self.rows.len() as f64 * row_h;
        let (x0, y0) = (panel.right() - w - 5.0, panel.y + 5.0);
        svg.rect(x0, y0, w, h, &Paint::solid(WHITE.translucent(0.9)));

        let kx = x0 + pad;
        for (i, (swatch, label)) in self.rows.iter().enumerate() {
            let cy = y0 + pad + (i as f64 + 0.5) * row_h;
            match swatch {
                Swatch::Fill(color) => svg.rect(kx, cy - key_h / 2.0, key_w, key_h, &Paint::solid(*color)),
                Swatch::Line(stroke) => svg.line((kx, cy), (kx + key_w, cy), stroke),
                Swatch::Dot(color) => svg.dot(kx + key_w / 2.0, cy, 3.0, *color),
            }
            svg.text(kx + key_w + gap, cy, label, &font);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_keeps_total_height() {
        let (main, ratio) = Panel::new(60.0, 40.0, 400.0, 400.0).split(0.25, 8.0);
        assert_eq!(ratio.h, 100.0);
        assert_eq!(main.h, 292.0);
        assert_eq!(ratio.y, main.bottom() + 8.0);
        assert_eq!(ratio.bottom(), 440.0);
    }

    #[test]
    fn header_text() {
        let mut svg = Svg::new(500.0, 500.0);
        draw_header(&mut svg, &Panel::new(50.0, 50.0, 400.0, 400.0), &RenderConfig::default());
        let doc = svg.finish();
        assert!(doc.contains(">CMS</text>"));
        assert!(doc.contains(">Preliminary</text>"));
        assert!(doc.contains("26.7 fb\u{207B}\u{00B9} (13.6 TeV)"));
    }

    #[test]
    fn frame_labels_only_visible_ticks() {
        let mut svg = Svg::new(300.0, 300.0);
        let panel = Panel::new(50.0, 20.0, 200.0, 200.0);
        let x = Axis::fixed(0.0, 10.0, 6).titled("mass");
        let y = Axis::padded(0.0, 9.0, 6);
        draw_frame(&mut svg, &panel, &x, &y, false, &RenderConfig::default());
        let doc = svg.finish();
        assert!(!doc.contains(">mass</text>"));
        assert!(doc.contains(">10</text>"));
    }

    #[test]
    fn empty_legend_draws_nothing() {
        let mut svg = Svg::new(100.0, 100.0);
        let before = svg.clone().finish();
        Legend::default().draw(&mut svg, &Panel::new(0.0, 0.0, 100.0, 100.0), 11.0);
        assert_eq!(svg.finish(), before);
    }
}
