//! Histograms most analyses plot: jet multiplicity, lepton kinematics by
//! index, dilepton mass and discriminant scores.
//!
//! Collections are jagged `<Collection>_<field>` columns (`Muon_pt`,
//! `Jet_btagDeepFlavB`). An event without the requested object is a data
//! error for its chunk.

use af_core::{Error, Result};
use af_events::{Augmentation, Column, EventsView};
use af_hist::{Axis, Hist, HistogramSpec, PlotStyle};

/// Display rebin factor of the 500-bin quantities.
pub const DISPLAY_REBIN: usize = 10;

/// `field` of the `index`-th object of `collection` in every event.
pub fn object_at(events: &EventsView, collection: &str, field: &str, index: usize) -> Result<Vec<f64>> {
    let name = format!("{collection}_{field}");
    let values = events.jagged(&name)?.at(index);
    values
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.ok_or_else(|| {
                Error::Data(format!(
                    "event {} has no {collection}[{index}]",
                    events.entries().get(row).copied().unwrap_or(row as u64)
                ))
            })
        })
        .collect()
}

/// `Counts / <width> <units>` for a regular axis shown rebinned by `rebin`.
pub fn counts_label(low: f64, high: f64, bins: usize, rebin: usize, units: &str) -> String {
    let width = (high - low) * rebin as f64 / bins as f64;
    if units.is_empty() { format!("Counts / {width}") } else { format!("Counts / {width} {units}") }
}

fn style(axis: (f64, f64, usize), units: &str, signal: &[String]) -> PlotStyle {
    PlotStyle {
        y_label: counts_label(axis.0, axis.1, axis.2, DISPLAY_REBIN, units),
        rebin: DISPLAY_REBIN,
        signal: signal.to_vec(),
        ..PlotStyle::default()
    }
}

/// Number of objects in a collection, on integer bins `[4, 15)`.
#[derive(Debug, Clone)]
pub struct NJet {
    title: String,
    collection: String,
    signal: Vec<String>,
}

impl NJet {
    /// Jet multiplicity of `Jet`.
    pub fn new() -> Self {
        Self { title: "NJets".into(), collection: "Jet".into(), signal: Vec::new() }
    }

    /// Count objects of another collection.
    pub fn of(title: impl Into<String>, collection: impl Into<String>) -> Self {
        Self { title: title.into(), collection: collection.into(), signal: Vec::new() }
    }

    /// Overlay `category` instead of stacking it.
    pub fn with_signal(mut self, category: impl Into<String>) -> Self {
        self.signal.push(category.into());
        self
    }
}

impl Default for NJet {
    fn default() -> Self {
        Self::new()
    }
}

impl HistogramSpec for NJet {
    fn name(&self) -> &str {
        &self.title
    }

    fn create(&self) -> Result<Hist> {
        Hist::new(&self.title, "Jet multiplicity", Axis::variable((4..16).map(f64::from).collect())?)
    }

    fn fill(&self, hist: &mut Hist, events: &EventsView, category: &str, weights: &[f64], _: &Augmentation) -> Result<()> {
        let counts: Vec<f64> = events
            .jagged(&format!("{}_pt", self.collection))?
            .counts()
            .into_iter()
            .map(|c| c as f64)
            .collect();
        hist.fill(category, &counts, weights)
    }

    fn style(&self) -> PlotStyle {
        // integer bins stay unmerged
        PlotStyle { signal: self.signal.clone(), ..PlotStyle::default() }
    }
}

/// pT of the `index`-th object of a collection, 500 bins in `[0, 500)` GeV.
#[derive(Debug, Clone)]
pub struct LeptonPt {
    title: String,
    lepton: String,
    index: usize,
    signal: Vec<String>,
}

impl LeptonPt {
    /// Object `index` (0 = leading) of collection `lepton`.
    pub fn new(title: impl Into<String>, lepton: impl Into<String>, index: usize) -> Self {
        Self { title: title.into(), lepton: lepton.into(), index, signal: Vec::new() }
    }

    /// Overlay `category` instead of stacking it.
    pub fn with_signal(mut self, category: impl Into<String>) -> Self {
        self.signal.push(category.into());
        self
    }
}

impl HistogramSpec for LeptonPt {
    fn name(&self) -> &str {
        &self.title
    }

    fn create(&self) -> Result<Hist> {
        Hist::new(&self.title, &self.title, Axis::regular(500, 0.0, 500.0)?)
    }

    fn fill(&self, hist: &mut Hist, events: &EventsView, category: &str, weights: &[f64], _: &Augmentation) -> Result<()> {
        hist.fill(category, &object_at(events, &self.lepton, "pt", self.index)?, weights)
    }

    fn style(&self) -> PlotStyle {
        style((0.0, 500.0, 500), "GeV", &self.signal)
    }
}

/// η of the `index`-th object of a collection, 500 bins in `[-5, 5)`.
#[derive(Debug, Clone)]
pub struct LeptonEta {
    title: String,
    lepton: String,
    index: usize,
    signal: Vec<String>,
}

impl LeptonEta {
    /// Object `index` (0 = leading) of collection `lepton`.
    pub fn new(title: impl Into<String>, lepton: impl Into<String>, index: usize) -> Self {
        Self { title: title.into(), lepton: lepton.into(), index, signal: Vec::new() }
    }

    /// Overlay `category` instead of stacking it.
    pub fn with_signal(mut self, category: impl Into<String>) -> Self {
        self.signal.push(category.into());
        self
    }
}

impl HistogramSpec for LeptonEta {
    fn name(&self) -> &str {
        &self.title
    }

    fn create(&self) -> Result<Hist> {
        Hist::new(&self.title, &self.title, Axis::regular(500, -5.0, 5.0)?)
    }

    fn fill(&self, hist: &mut Hist, events: &EventsView, category: &str, weights: &[f64], _: &Augmentation) -> Result<()> {
        hist.fill(category, &object_at(events, &self.lepton, "eta", self.index)?, weights)
    }

    fn style(&self) -> PlotStyle {
        style((-5.0, 5.0, 500), "", &self.signal)
    }
}

/// Invariant mass of two indexed leptons, 500 bins in `[0, 1000)` GeV.
///
/// `m = sqrt(2 pT1 pT2 (cosh Δη − cos Δφ))`, symmetric in the two leptons.
#[derive(Debug, Clone)]
pub struct DileptonMass {
    title: String,
    first: (String, usize),
    second: (String, usize),
    signal: Vec<String>,
}

impl DileptonMass {
    /// Pair of `(collection, index)` objects.
    pub fn new(
        title: impl Into<String>,
        first: (impl Into<String>, usize),
        second: (impl Into<String>, usize),
    ) -> Self {
        Self {
            title: title.into(),
            first: (first.0.into(), first.1),
            second: (second.0.into(), second.1),
            signal: Vec::new(),
        }
    }

    /// Overlay `category` instead of stacking it.
    pub fn with_signal(mut self, category: impl Into<String>) -> Self {
        self.signal.push(category.into());
        self
    }

    /// Masses of the selected pair in every event.
    pub fn masses(&self, events: &EventsView) -> Result<Vec<f64>> {
        let kin = |(lepton, index): &(String, usize)| -> Result<[Vec<f64>; 3]> {
            Ok([
                object_at(events, lepton, "pt", *index)?,
                object_at(events, lepton, "eta", *index)?,
                object_at(events, lepton, "phi", *index)?,
            ])
        };
        let [pt1, eta1, phi1] = kin(&self.first)?;
        let [pt2, eta2, phi2] = kin(&self.second)?;
        Ok((0..pt1.len())
            .map(|i| invariant_mass(pt1[i], eta1[i], phi1[i], pt2[i], eta2[i], phi2[i]))
            .collect())
    }
}

/// Mass of two massless objects.
pub fn invariant_mass(pt1: f64, eta1: f64, phi1: f64, pt2: f64, eta2: f64, phi2: f64) -> f64 {
    (2.0 * pt1 * pt2 * ((eta1 - eta2).cosh() - (phi1 - phi2).cos())).max(0.0).sqrt()
}

impl HistogramSpec for DileptonMass {
    fn name(&self) -> &str {
        &self.title
    }

    fn create(&self) -> Result<Hist> {
        Hist::new(&self.title, &self.title, Axis::regular(500, 0.0, 1000.0)?)
    }

    fn fill(&self, hist: &mut Hist, events: &EventsView, category: &str, weights: &[f64], _: &Augmentation) -> Result<()> {
        hist.fill(category, &self.masses(events)?, weights)
    }

    fn style(&self) -> PlotStyle {
        style((0.0, 1000.0, 500), "GeV", &self.signal)
    }
}

/// A score in `[0, 1]` (b-tagging, MVA output), 500 bins.
///
/// Reads a flat field, or the `index`-th entry of a jagged one.
#[derive(Debug, Clone)]
pub struct Discriminant {
    title: String,
    field: String,
    index: Option<usize>,
    signal: Vec<String>,
}

impl Discriminant {
    /// Flat per-event score.
    pub fn new(title: impl Into<String>, field: impl Into<String>) -> Self {
        Self { title: title.into(), field: field.into(), index: None, signal: Vec::new() }
    }

    /// Score of the `index`-th object of a jagged field.
    pub fn of_object(title: impl Into<String>, field: impl Into<String>, index: usize) -> Self {
        Self { index: Some(index), ..Self::new(title, field) }
    }

    /// Overlay `category` instead of stacking it.
    pub fn with_signal(mut self, category: impl Into<String>) -> Self {
        self.signal.push(category.into());
        self
    }
}

impl HistogramSpec for Discriminant {
    fn name(&self) -> &str {
        &self.title
    }

    fn create(&self) -> Result<Hist> {
        Hist::new(&self.title, &self.title, Axis::regular(500, 0.0, 1.0)?)
    }

    fn fill(&self, hist: &mut Hist, events: &EventsView, category: &str, weights: &[f64], _: &Augmentation) -> Result<()> {
        let scores = match (self.index, events.field(&self.field)?) {
            (Some(index), Column::Jagged(_)) => {
                let (collection, field) = self.field.split_once('_').ok_or_else(|| {
                    Error::Data(format!("'{}' is not a <collection>_<field> name", self.field))
                })?;
                object_at(events, collection, field, index)?
            }
            (None, column) => column
                .to_f64()
                .ok_or_else(|| Error::Data(format!("'{}' is jagged; give an object index", self.field)))?,
            (Some(_), column) => {
                return Err(Error::Data(format!(
                    "'{}' is a flat {} column; it has no objects",
                    self.field,
                    column.type_name()
                )));
            }
        };
        hist.fill(category, &scores, weights)
    }

    fn style(&self) -> PlotStyle {
        style((0.0, 1.0, 500), "", &self.signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use af_events::Jagged;
    use approx::assert_relative_eq;

    fn muons() -> EventsView {
        EventsView::from_columns(
            vec![
                ("Muon_pt".to_string(), Column::Jagged(Jagged::from_lists([vec![40.0, 30.0], vec![25.0]]))),
                ("Muon_eta".to_string(), Column::Jagged(Jagged::from_lists([vec![0.5, -0.5], vec![1.0]]))),
                ("Muon_phi".to_string(), Column::Jagged(Jagged::from_lists([vec![0.0, 3.0], vec![0.0]]))),
                ("Jet_btagDeepFlavB".to_string(), Column::Jagged(Jagged::from_lists([vec![0.9], vec![0.1, 0.2]]))),
                ("score".to_string(), Column::F64(vec![0.25, 0.75])),
            ],
            None,
        )
        .unwrap()
    }

    #[test]
    fn labels() {
        assert_eq!(counts_label(0.0, 500.0, 500, 10, "GeV"), "Counts / 10 GeV");
        assert_eq!(counts_label(-5.0, 5.0, 500, 10, ""), "Counts / 0.2");
        assert_eq!(counts_label(0.0, 1.0, 500, 10, ""), "Counts / 0.02");
        assert_eq!(LeptonPt::new("Leading muon pT", "Muon", 0).style().rebin, 10);
        assert_eq!(NJet::new().style().rebin, 1);
    }

    #[test]
    fn missing_object_is_a_data_error() {
        let ev = muons();
        assert_eq!(object_at(&ev, "Muon", "pt", 0).unwrap(), vec![40.0, 25.0]);
        let err = object_at(&ev, "Muon", "pt", 1).unwrap_err();
        assert!(matches!(err, Error::Data(ref m) if m.contains("event 1 has no Muon[1]")));
    }

    #[test]
    fn mass_is_symmetric() {
        let m = invariant_mass(40.0, 0.5, 0.0, 30.0, -0.5, 3.0);
        assert_relative_eq!(m, invariant_mass(30.0, -0.5, 3.0, 40.0, 0.5, 0.0), max_relative = 1e-15);
        // back to back at equal eta: m = 2 sqrt(pt1 pt2)
        assert_relative_eq!(invariant_mass(50.0, 0.0, 0.0, 50.0, 0.0, std::f64::consts::PI), 100.0, max_relative = 1e-12);
    }

    #[test]
    fn njet_counts_objects() {
        let ev = EventsView::from_columns(
            vec![("Jet_pt".to_string(), Column::Jagged(Jagged::from_lists([vec![30.0; 4], vec![30.0; 6], vec![]])))],
            None,
        )
        .unwrap();
        let spec = NJet::new();
        let mut h = spec.create().unwrap();
        spec.fill(&mut h, &ev, "TT", &[1.0, 2.0, 4.0], &Augmentation::empty()).unwrap();
        let b = h.category("TT").unwrap();
        assert_eq!(b.sumw[0], 1.0);
        assert_eq!(b.sumw[2], 2.0);
        assert_eq!(b.underflow, 4.0);
    }

    #[test]
    fn discriminant_flat_and_indexed() {
        let ev = muons();
        let flat = Discriminant::new("score", "score");
        let mut h = flat.create().unwrap();
        flat.fill(&mut h, &ev, "TT", &[1.0, 1.0], &Augmentation::empty()).unwrap();
        assert_eq!(h.category("TT").unwrap().sumw[125], 1.0);

        let lead = Discriminant::of_object("Leading jet b-tag", "Jet_btagDeepFlavB", 0);
        let mut h = lead.create().unwrap();
        lead.fill(&mut h, &ev, "TT", &[1.0, 1.0], &Augmentation::empty()).unwrap();
        assert_eq!(h.category("TT").unwrap().sumw[450], 1.0);
        assert!(Discriminant::new("b", "Jet_btagDeepFlavB").fill(&mut h, &ev, "TT", &[1.0, 1.0], &Augmentation::empty()).is_err());
    }
}
