//! Axis ranges, tick placement and value-to-point projection.

/// Axis scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    Linear,
    /// Base-10 logarithmic; values at or below zero are pinned to the bottom.
    Log,
}

/// A tick mark. Minor ticks carry no label.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub value: f64,
    pub label: Option<String>,
}

/// One plot axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    pub lo: f64,
    pub hi: f64,
    pub scale: Scale,
    pub title: String,
    pub ticks: Vec<Tick>,
}

const MINOR_PER_MAJOR: i64 = 5;
const LOG_FLOOR: f64 = 1e-20;

impl Axis {
    /// Linear axis over exactly `[lo, hi]`, with roughly `approx_ticks` labelled ticks.
    ///
    /// Histogram x axes use this so the frame ends on the outer bin edges.
    pub fn fixed(lo: f64, hi: f64, approx_ticks: usize) -> Self {
        Self::linear(lo, hi, tick_step(hi - lo, approx_ticks))
    }

    /// Linear axis covering `[lo, hi]`, widened outwards to whole tick steps.
    pub fn padded(lo: f64, hi: f64, approx_ticks: usize) -> Self {
        if hi - lo <= f64::EPSILON * hi.abs().max(1.0) {
            return Self::linear(lo - 1.0, hi + 1.0, 1.0);
        }
        let step = tick_step(hi - lo, approx_ticks);
        Self::linear((lo / step).floor() * step, (hi / step).ceil() * step, step)
    }

    fn linear(lo: f64, hi: f64, step: f64) -> Self {
        let fine = step / MINOR_PER_MAJOR as f64;
        let first = (lo / fine - 1e-9).ceil() as i64;
        let last = (hi / fine + 1e-9).floor() as i64;
        let ticks = (first..=last)
            .map(|k| {
                let value = k as f64 * fine;
                let label = (k % MINOR_PER_MAJOR == 0).then(|| tick_label(value, step));
                Tick { value, label }
            })
            .collect();
        Self { lo, hi, scale: Scale::Linear, title: String::new(), ticks }
    }

    /// Logarithmic axis over the whole decades enclosing `[lo, hi]`.
    pub fn decades(lo: f64, hi: f64) -> Self {
        let first = lo.max(LOG_FLOOR).log10().floor() as i32;
        let last = (hi.max(lo).max(LOG_FLOOR).log10().ceil() as i32).max(first + 1);
        let mut ticks = Vec::new();
        for exp in first..=last {
            let decade = 10f64.powi(exp);
            ticks.push(Tick { value: decade, label: Some(format!("10{}", superscript(exp))) });
            if exp < last {
                ticks.extend((2..10).map(|m| Tick { value: f64::from(m) * decade, label: None }));
            }
        }
        Self { lo: 10f64.powi(first), hi: 10f64.powi(last), scale: Scale::Log, title: String::new(), ticks }
    }

    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Position of `value` when the axis spans `from..to` in points.
    ///
    /// `to` may be smaller than `from`, as for y axes drawn upwards.
    pub fn project(&self, value: f64, from: f64, to: f64) -> f64 {
        let t = match self.scale {
            Scale::Linear => (value - self.lo) / (self.hi - self.lo),
            Scale::Log => {
                let (v, lo, hi) = (value.max(LOG_FLOOR).log10(), self.lo.log10(), self.hi.log10());
                (v - lo) / (hi - lo)
            }
        };
        from + t * (to - from)
    }

    /// Labelled ticks.
    pub fn major(&self) -> impl Iterator<Item = (f64, &str)> {
        self.ticks.iter().filter_map(|t| t.label.as_deref().map(|l| (t.value, l)))
    }

    /// Unlabelled ticks.
    pub fn minor(&self) -> impl Iterator<Item = f64> + '_ {
        self.ticks.iter().filter(|t| t.label.is_none()).map(|t| t.value)
    }
}

/// 1, 2 or 5 times a power of ten, closest in ratio to `span / (approx_ticks - 1)`.
fn tick_step(span: f64, approx_ticks: usize) -> f64 {
    if span <= 0.0 || !span.is_finite() {
        return 1.0;
    }
    let rough = span / (approx_ticks.max(2) - 1) as f64;
    let magnitude = 10f64.powf(rough.log10().floor());
    let mantissa = rough / magnitude;
    let best = [1.0, 2.0, 5.0, 10.0]
        .into_iter()
        .min_by(|a: &f64, b: &f64| (a / mantissa).ln().abs().total_cmp(&(b / mantissa).ln().abs()))
        .unwrap_or(1.0);
    best * magnitude
}

fn tick_label(value: f64, step: f64) -> String {
    // snap values within rounding of zero, so no "-0"
    let value = if value.abs() < step * 1e-3 { 0.0 } else { value };
    if step >= 1.0 {
        format!("{}", value.round() as i64)
    } else {
        let digits = (-step.log10()).ceil().max(0.0) as usize;
        format!("{value:.digits$}")
    }
}

fn superscript(n: i32) -> String {
    const DIGITS: [char; 10] =
        ['\u{2070}', '\u{00B9}', '\u{00B2}', '\u{00B3}', '\u{2074}', '\u{2075}', '\u{2076}', '\u{2077}', '\u{2078}', '\u{2079}'];
    let mut out = String::new();
    if n < 0 {
        out.push('\u{207B}');
    }
    for d in n.unsigned_abs().to_string().bytes() {
        out.push(DIGITS[usize::from(d - b'0')]);
    }
    out
}
