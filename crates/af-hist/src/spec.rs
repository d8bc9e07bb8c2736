//! Histogram specs ("things to plot") and their display hints.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use af_core::{Dataset, Result};
use af_events::{Augmentation, EventsView};

use crate::hist::Hist;

/// A declared histogram: how to create its accumulator and fill it from one chunk.
///
/// Implementations must be pure with respect to their inputs: `events`,
/// `weights` and `augmentation` are borrowed and may be reused by other specs.
pub trait HistogramSpec: Send + Sync {
    /// Unique name within an analysis (also the plot title).
    fn name(&self) -> &str;

    /// File-system safe name used for output files.
    fn escaped_name(&self) -> String {
        escape_name(self.name())
    }

    /// Empty accumulator with this spec's axes.
    fn create(&self) -> Result<Hist>;

    /// Fill `hist` with the selected events of one chunk of `category`.
    ///
    /// `weights` is aligned with the rows of `events`.
    fn fill(
        &self,
        hist: &mut Hist,
        events: &EventsView,
        category: &str,
        weights: &[f64],
        augmentation: &Augmentation,
    ) -> Result<()>;

    /// Display hints.
    fn style(&self) -> PlotStyle {
        PlotStyle::default()
    }
}

/// Strip TeX math markers and replace characters unsafe in file names.
pub fn escape_name(name: &str) -> String {
    name.chars()
        .filter(|&c| c != '$')
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}

fn default_y_label() -> String {
    "Events".to_string()
}

fn default_rebin() -> usize {
    1
}

fn default_log_y() -> bool {
    true
}

/// Display hints carried with a reduced histogram so replots need no analysis code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotStyle {
    /// x-axis label (defaults to the histogram label).
    #[serde(default)]
    pub x_label: Option<String>,
    /// y-axis label.
    #[serde(default = "default_y_label")]
    pub y_label: String,
    /// Merge this many bins before drawing.
    #[serde(default = "default_rebin")]
    pub rebin: usize,
    /// Logarithmic y axis.
    #[serde(default = "default_log_y")]
    pub log_y: bool,
    /// Categories drawn as overlaid lines instead of stacked.
    #[serde(default)]
    pub signal: Vec<String>,
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            x_label: None,
            y_label: default_y_label(),
            rebin: default_rebin(),
            log_y: default_log_y(),
            signal: Vec::new(),
        }
    }
}

impl PlotStyle {
    /// Set the rebin factor.
    pub fn with_rebin(mut self, factor: usize) -> Self {
        self.rebin = factor;
        self
    }

    /// Set the x-axis label.
    pub fn with_x_label(mut self, label: impl Into<String>) -> Self {
        self.x_label = Some(label.into());
        self
    }

    /// Add an overlaid signal category.
    pub fn with_signal(mut self, category: impl Into<String>) -> Self {
        self.signal.push(category.into());
        self
    }

    /// Linear y axis.
    pub fn linear(mut self) -> Self {
        self.log_y = false;
        self
    }
}

/// Which categories hold recorded data (everything else is simulation).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRoles {
    /// Short names of data categories.
    pub data: BTreeSet<String>,
}

impl SampleRoles {
    /// Roles of the given datasets.
    pub fn from_datasets<'a>(datasets: impl IntoIterator<Item = &'a Dataset>) -> Self {
        Self {
            data: datasets
                .into_iter()
                .filter(|d| !d.is_simulated)
                .map(|d| d.short_name.clone())
                .collect(),
        }
    }

    /// Whether `category` is recorded data.
    pub fn is_data(&self, category: &str) -> bool {
        self.data.contains(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape() {
        assert_eq!(escape_name("$p_T$ leading lepton"), "p_T_leading_lepton");
        assert_eq!(escape_name("NJet"), "NJet");
        assert_eq!(escape_name("m/ll"), "m_ll");
    }

    #[test]
    fn style_defaults_from_json() {
        let s: PlotStyle = serde_json::from_str("{}").unwrap();
        assert_eq!(s, PlotStyle::default());
        assert!(s.log_y);
        assert_eq!(s.rebin, 1);
    }

    #[test]
    fn roles() {
        let ds = [
            Dataset::data("Muon_Run2022F", "Muon"),
            Dataset::simulated("TTTT", "TTTT", 0.01, 10),
        ];
        let r = SampleRoles::from_datasets(&ds);
        assert!(r.is_data("Muon"));
        assert!(!r.is_data("TTTT"));
    }
}
