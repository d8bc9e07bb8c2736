//! Stacked data/MC comparison of one reduced histogram.
//!
//! Simulation categories are stacked by decreasing yield (largest at the
//! bottom), signal categories are overlaid as lines, and data categories are
//! summed into one series with `sqrt(sumw2)` errors (`sqrt(N)` for unit
//! weights). With data present the lower panel shows data / MC.

use af_core::Completeness;
use af_hist::{Bins, HistDocument};

use crate::axes::Axis;
use crate::canvas::Svg;
use crate::color::{BLACK, Color, Palette};
use crate::config::RenderConfig;
use crate::layout::{Legend, Panel, Swatch, draw_frame, draw_header};
use crate::primitives::{Align, Font, Paint, Stroke, VAlign};
use crate::{RenderError, Result};

const MARGIN_LEFT: f64 = 64.0;
const MARGIN_RIGHT: f64 = 16.0;
const MARGIN_TOP: f64 = 30.0;
const MARGIN_BOTTOM: f64 = 46.0;

/// One drawn category.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub label: String,
    pub values: Vec<f64>,
    pub color: Color,
}

/// Summed data categories.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSeries {
    pub values: Vec<f64>,
    pub errors: Vec<f64>,
}

/// Everything a stack plot draws, resolved from a [`HistDocument`].
#[derive(Debug, Clone, PartialEq)]
pub struct StackPlot {
    pub x_label: String,
    pub y_label: String,
    pub edges: Vec<f64>,
    /// Bottom of the stack first.
    pub stack: Vec<Component>,
    pub mc_total: Vec<f64>,
    pub mc_errors: Vec<f64>,
    pub signal: Vec<Component>,
    pub data: Option<DataSeries>,
    pub log_y: bool,
    pub completeness: Completeness,
}

impl StackPlot {
    /// Resolve roles, rebinning and colours of `doc`.
    pub fn from_document(doc: &HistDocument, config: &RenderConfig) -> Result<Self> {
        let reduced = doc.reduced.hist();
        let hist = if doc.style.rebin > 1 { reduced.rebin(doc.style.rebin)? } else { reduced.clone() };

        let mut stacked: Vec<(&str, &Bins)> = Vec::new();
        let mut signal = Vec::new();
        let mut data_names = Vec::new();
        for cat in hist.categories() {
            let Some(bins) = hist.category(cat) else { continue };
            if doc.roles.is_data(cat) {
                data_names.push(cat);
            } else if doc.style.signal.iter().any(|s| s == cat) {
                signal.push((cat, bins));
            } else {
                stacked.push((cat, bins));
            }
        }
        // stable: equal yields keep category order
        stacked.sort_by(|a, b| b.1.total().total_cmp(&a.1.total()));

        let colors = Palette::named(&config.palette).take(stacked.len());
        let stack: Vec<Component> = stacked
            .iter()
            .zip(colors)
            .map(|((name, bins), color)| Component { label: name.to_string(), values: bins.sumw.clone(), color })
            .collect();
        let mc = hist.sum_categories(stacked.iter().map(|(name, _)| *name));
        let data = (!data_names.is_empty()).then(|| {
            let d = hist.sum_categories(data_names.iter().copied());
            DataSeries { errors: d.errors(), values: d.sumw }
        });
        let signal = signal
            .iter()
            .map(|(name, bins)| Component {
                label: name.to_string(),
                values: bins.sumw.clone(),
                color: BLACK,
            })
            .collect();

        let x_label = match &doc.style.x_label {
            Some(l) => l.clone(),
            None if !hist.label().is_empty() => hist.label().to_string(),
            None => doc.name.clone(),
        };

        Ok(Self {
            x_label,
            y_label: doc.style.y_label.clone(),
            edges: hist.axis().edges(),
            stack,
            mc_errors: mc.errors(),
            mc_total: mc.sumw,
            signal,
            data,
            log_y: doc.style.log_y,
            completeness: doc.reduced.completeness(),
        })
    }

    fn has_ratio(&self, config: &RenderConfig) -> bool {
        config.ratio && self.data.is_some() && !self.stack.is_empty()
    }

    fn y_axis(&self) -> Axis {
        let mut values: Vec<f64> = self.mc_total.iter().zip(&self.mc_errors).map(|(v, e)| v + e).collect();
        if let Some(d) = &self.data {
            values.extend(d.values.iter().zip(&d.errors).map(|(v, e)| v + e));
        }
        for s in &self.signal {
            values.extend(&s.values);
        }
        let max = values.iter().copied().filter(|v| v.is_finite()).fold(0.0_f64, f64::max);

        if self.log_y {
            let min_pos = values.iter().copied().filter(|v| v.is_finite() && *v > 0.0).fold(f64::INFINITY, f64::min);
            if min_pos.is_finite() {
                // headroom above for the legend
                Axis::decades(min_pos * 0.5, max * 50.0)
            } else {
                Axis::decades(0.1, 10.0)
            }
        } else {
            Axis::padded(0.0, if max > 0.0 { max * 1.35 } else { 1.0 }, 6)
        }
    }

    /// Draw to an SVG document.
    pub fn render(&self, config: &RenderConfig) -> Result<String> {
        let n = self.edges.len().saturating_sub(1);
        if n == 0 {
            return Err(RenderError::Layout("histogram has no bins".into()));
        }
        let frame = Panel::new(
            MARGIN_LEFT,
            MARGIN_TOP,
            config.width - MARGIN_LEFT - MARGIN_RIGHT,
            config.height - MARGIN_TOP - MARGIN_BOTTOM,
        );
        if frame.w < 50.0 || frame.h < 80.0 {
            return Err(RenderError::Layout(format!(
                "figure {}x{} is too small to draw into",
                config.width, config.height
            )));
        }

        let mut svg = Svg::new(config.width, config.height);
        let with_ratio = self.has_ratio(config);
        let (main, ratio) = if with_ratio {
            let (upper, lower) = frame.split(0.28, 6.0);
            (upper, Some(lower))
        } else {
            (frame, None)
        };

        let x_axis = Axis::fixed(self.edges[0], self.edges[n], 6).titled(&self.x_label);
        let y_axis = self.y_axis().titled(&self.y_label);
        let bin_x = |i: usize| {
            (x_axis.project(self.edges[i], main.x, main.right()), x_axis.project(self.edges[i + 1], main.x, main.right()))
        };
        let py = |y: f64| y_axis.project(y, main.bottom(), main.y).clamp(main.y, main.bottom());

        svg.begin_clip(main.x, main.y, main.w, main.h);

        let mut floor = vec![0.0; n];
        for comp in &self.stack {
            let paint = Paint::solid(comp.color);
            for (i, v) in comp.values.iter().enumerate().take(n) {
                let (lo, hi) = (py(floor[i]), py(floor[i] + v));
                let (x0, x1) = bin_x(i);
                if lo > hi {
                    svg.rect(x0, hi, x1 - x0, lo - hi, &paint);
                }
                floor[i] += v;
            }
        }

        if !self.stack.is_empty() {
            for i in 0..n {
                let (t, e) = (self.mc_total[i], self.mc_errors[i]);
                let (lo, hi) = (py(t - e), py(t + e));
                let (x0, x1) = bin_x(i);
                if e > 0.0 && lo > hi {
                    svg.rect(x0, hi, x1 - x0, lo - hi, &UNCERTAINTY);
                }
            }
        }

        for (k, comp) in self.signal.iter().enumerate() {
            let points: Vec<(f64, f64)> = comp
                .values
                .iter()
                .take(n)
                .enumerate()
                .flat_map(|(i, v)| {
                    let (x0, x1) = bin_x(i);
                    [(x0, py(*v)), (x1, py(*v))]
                })
                .collect();
            svg.polyline(&points, &signal_stroke(k, comp.color));
        }

        if let Some(data) = &self.data {
            for i in 0..n {
                let (v, e) = (data.values[i], data.errors[i]);
                if v > 0.0 {
                    let (x0, x1) = bin_x(i);
                    data_point(&mut svg, 0.5 * (x0 + x1), py(v), (py(v - e), py(v + e)));
                }
            }
        }
        svg.end_clip();

        draw_frame(&mut svg, &main, &x_axis, &y_axis, !with_ratio, config);
        if let Some(lower) = ratio {
            self.draw_ratio(&mut svg, &lower, &x_axis, config);
        }
        self.legend().draw(&mut svg, &main, config.label_size);
        draw_header(&mut svg, &main, config);

        if !self.completeness.is_complete() {
            let warn = Font::new(config.tick_size).bold().colored(WARNING).placed(Align::Left, VAlign::Top);
            svg.text(main.x + 8.0, main.y + 8.0, &self.completeness.to_string(), &warn);
        }

        Ok(svg.finish())
    }

    fn draw_ratio(&self, svg: &mut Svg, panel: &Panel, x_axis: &Axis, config: &RenderConfig) {
        let Some(data) = &self.data else { return };
        let n = self.edges.len() - 1;
        let y_axis = Axis::fixed(0.5, 1.5, 5).titled("Data/MC");
        let px = |x: f64| x_axis.project(x, panel.x, panel.right());
        let py = |y: f64| y_axis.project(y, panel.bottom(), panel.y).clamp(panel.y, panel.bottom());

        for i in 0..n {
            let (t, e) = (self.mc_total[i], self.mc_errors[i]);
            if t > 0.0 && e > 0.0 {
                let (x0, x1) = (px(self.edges[i]), px(self.edges[i + 1]));
                let (lo, hi) = (py(1.0 - e / t), py(1.0 + e / t));
                svg.rect(x0, hi, x1 - x0, lo - hi, &UNCERTAINTY);
            }
        }
        svg.line((panel.x, py(1.0)), (panel.right(), py(1.0)), &Stroke::new(Color::rgb(100, 100, 100), 0.8).dashed());

        for i in 0..n {
            let (t, v, e) = (self.mc_total[i], data.values[i], data.errors[i]);
            if t <= 0.0 || v <= 0.0 {
                continue;
            }
            let r = v / t;
            if (y_axis.lo..=y_axis.hi).contains(&r) {
                let x = 0.5 * (px(self.edges[i]) + px(self.edges[i + 1]));
                data_point(svg, x, py(r), (py(r - e / t), py(r + e / t)));
            }
        }

        draw_frame(svg, panel, x_axis, &y_axis, true, config);
    }

    fn legend(&self) -> Legend {
        let mut legend = Legend::default();
        if self.data.is_some() {
            legend.push(Swatch::Dot(BLACK), "Data");
        }
        // top of the stack first, as drawn
        for comp in self.stack.iter().rev() {
            legend.push(Swatch::Fill(comp.color), &comp.label);
        }
        for (k, comp) in self.signal.iter().enumerate() {
            legend.push(Swatch::Line(signal_stroke(k, comp.color)), &comp.label);
        }
        legend
    }
}

/// Band of the summed simulation uncertainty.
const UNCERTAINTY: Paint = Paint::solid(Color::rgb(60, 60, 60).translucent(0.3));
const WARNING: Color = Color::rgb(189, 31, 1);

/// First signal solid, later ones dashed.
fn signal_stroke(index: usize, color: Color) -> Stroke {
    let stroke = Stroke::new(color, 1.5);
    if index == 0 { stroke } else { stroke.dashed() }
}

/// Marker at `(x, y)` with a vertical error bar spanning `bar`.
fn data_point(svg: &mut Svg, x: f64, y: f64, bar: (f64, f64)) {
    svg.line((x, bar.0), (x, bar.1), &Stroke::new(BLACK, 1.0));
    svg.dot(x, y, 2.5, BLACK);
}

#[cfg(test)]
mod tests {
    use super::*;
    use af_core::ChunkTally;
    use af_hist::{Axis as HistAxis, Hist, PlotStyle, ReducedHist, SampleRoles};

    fn doc(tally: ChunkTally, style: PlotStyle) -> HistDocument {
        let mut h = Hist::new("NJet", "Jet multiplicity", HistAxis::regular(10, 0.0, 10.0).unwrap()).unwrap();
        h.fill("TT", &[4.5, 5.5, 5.5, 6.5], &[2.0; 4]).unwrap();
        h.fill("DY", &[4.5], &[0.5]).unwrap();
        h.fill("TTTT", &[7.5], &[0.01]).unwrap();
        h.fill("Muon", &[4.5, 5.5], &[1.0, 1.0]).unwrap();
        h.fill("EGamma", &[5.5], &[1.0]).unwrap();
        let roles = SampleRoles { data: ["Muon".to_string(), "EGamma".to_string()].into_iter().collect() };
        HistDocument::new("NJet", ReducedHist::new(h, tally), roles, style)
    }

    #[test]
    fn roles_and_order() {
        let cfg = RenderConfig::default();
        let p = StackPlot::from_document(&doc(ChunkTally::new(2), PlotStyle::default().with_signal("TTTT")), &cfg)
            .unwrap();
        assert_eq!(p.stack.iter().map(|c| c.label.as_str()).collect::<Vec<_>>(), vec!["TT", "DY"]);
        assert_eq!(Some(p.stack[0].color), Color::parse("#3f90da"));
        assert_eq!(p.signal[0].label, "TTTT");
        let data = p.data.as_ref().unwrap();
        assert_eq!(data.values[5], 2.0);
        assert_eq!(data.errors[5], 2.0_f64.sqrt());
        assert_eq!(p.mc_total[4], 2.5);
        assert_eq!(p.x_label, "Jet multiplicity");
    }

    #[test]
    fn rebin_applies() {
        let cfg = RenderConfig::default();
        let p = StackPlot::from_document(&doc(ChunkTally::new(1), PlotStyle::default().with_rebin(5)), &cfg).unwrap();
        assert_eq!(p.edges, vec![0.0, 5.0, 10.0]);
        assert_eq!(p.data.unwrap().values, vec![1.0, 2.0]);
    }

    #[test]
    fn partial_results_are_labelled() {
        let cfg = RenderConfig::default();
        let d = doc(ChunkTally { total: 3, failed: 1 }, PlotStyle::default());
        let svg = StackPlot::from_document(&d, &cfg).unwrap().render(&cfg).unwrap();
        assert!(svg.contains(">partial (1/3 failed)</text>"));
        assert!(svg.contains(">Data/MC</text>"));

        let complete = StackPlot::from_document(&doc(ChunkTally::new(3), PlotStyle::default()), &cfg)
            .unwrap()
            .render(&cfg)
            .unwrap();
        assert!(!complete.contains("partial"));
    }

    #[test]
    fn no_ratio_without_data() {
        let cfg = RenderConfig::default();
        let mut d = doc(ChunkTally::new(1), PlotStyle::default().linear());
        d.roles = SampleRoles::default();
        let svg = StackPlot::from_document(&d, &cfg).unwrap().render(&cfg).unwrap();
        assert!(!svg.contains("Data/MC"));
        assert!(svg.contains(">Muon</text>"));
    }

    #[test]
    fn tiny_figure_is_a_layout_error() {
        let cfg = RenderConfig { width: 60.0, ..RenderConfig::default() };
        let d = doc(ChunkTally::new(1), PlotStyle::default());
        let err = StackPlot::from_document(&d, &cfg).unwrap().render(&cfg).unwrap_err();
        assert!(matches!(err, RenderError::Layout(_)));
    }
}
