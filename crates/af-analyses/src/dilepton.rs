//! Reference opposite-sign dimuon analysis.
//!
//! Objects: muons with pT > 15 GeV, |η| < 2.4; jets with pT > 30 GeV, |η| < 2.4.
//! Preselection: at least two muons. Selection: leading muon pT > 25 GeV, the
//! two leading muons of opposite charge, at least one jet.

use af_core::{Error, Result};
use af_events::{AugValue, Augmentation, Column, EventsView};
use af_hist::{Axis, Hist, HistogramSpec, PlotStyle};
use af_pipeline::Analysis;

use crate::common::{DileptonMass, Discriminant, LeptonEta, LeptonPt, NJet, counts_label};

const MUON_PT_MIN: f64 = 15.0;
const MUON_ETA_MAX: f64 = 2.4;
const JET_PT_MIN: f64 = 30.0;
const JET_ETA_MAX: f64 = 2.4;
const LEADING_MUON_PT_MIN: f64 = 25.0;

/// Augmentation key of the per-event scalar sum of jet pT.
pub const HT: &str = "HT";
/// Augmentation key of the number of selected events in the chunk.
pub const SELECTED: &str = "n_selected";

/// The dimuon reference analysis.
#[derive(Debug, Clone)]
pub struct Dilepton {
    signal: Vec<String>,
}

impl Dilepton {
    /// Analysis overlaying `signal` categories in its plots.
    pub fn new(signal: Vec<String>) -> Self {
        Self { signal }
    }
}

impl Default for Dilepton {
    fn default() -> Self {
        Self::new(vec!["TTTT".into()])
    }
}

/// Flat object mask over `<collection>_pt` and `<collection>_eta`.
fn kinematic_mask(events: &EventsView, collection: &str, pt_min: f64, eta_max: f64) -> Result<Vec<bool>> {
    let pt = events.jagged(&format!("{collection}_pt"))?;
    let eta = events.jagged(&format!("{collection}_eta"))?;
    if pt.offsets() != eta.offsets() {
        return Err(Error::Data(format!("{collection}_pt and {collection}_eta are not aligned")));
    }
    Ok(pt.values().iter().zip(eta.values()).map(|(p, e)| *p > pt_min && e.abs() < eta_max).collect())
}

fn counts(events: &EventsView, field: &str) -> Result<Vec<usize>> {
    Ok(events.jagged(field)?.counts())
}

impl Analysis for Dilepton {
    fn name(&self) -> &str {
        "dilepton"
    }

    fn define_objects(&self, events: EventsView) -> Result<EventsView> {
        let muons = kinematic_mask(&events, "Muon", MUON_PT_MIN, MUON_ETA_MAX)?;
        let events = events.filter_collection("Muon", &muons)?;
        let jets = kinematic_mask(&events, "Jet", JET_PT_MIN, JET_ETA_MAX)?;
        events.filter_collection("Jet", &jets)
    }

    fn preselect(&self, events: EventsView) -> Result<EventsView> {
        let mask: Vec<bool> = counts(&events, "Muon_pt")?.iter().map(|n| *n >= 2).collect();
        events.filter(&mask)
    }

    fn select(&self, events: EventsView) -> Result<EventsView> {
        let pt = events.jagged("Muon_pt")?;
        let charge = events.jagged("Muon_charge")?;
        let jets = counts(&events, "Jet_pt")?;
        let mask: Vec<bool> = (0..events.len())
            .map(|row| {
                let (p, q) = (pt.row(row), charge.row(row));
                p.len() >= 2
                    && q.len() >= 2
                    && p[0] > LEADING_MUON_PT_MIN
                    && q[0] * q[1] < 0.0
                    && jets[row] >= 1
            })
            .collect();
        events.filter(&mask)
    }

    fn augment(&self, events: &EventsView) -> Result<Augmentation> {
        let jet_pt = events.jagged("Jet_pt")?;
        let ht: Vec<f64> = (0..events.len()).map(|row| jet_pt.row(row).iter().sum()).collect();
        Ok(Augmentation::empty()
            .with(HT, AugValue::Column(Column::F64(ht)))
            .with(SELECTED, AugValue::Count(events.len() as u64)))
    }

    fn necessary_fields(&self) -> Vec<String> {
        ["Muon_pt", "Muon_eta", "Muon_phi", "Muon_charge", "Jet_pt", "Jet_eta", "Jet_btagDeepFlavB"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn things_to_plot(&self) -> Vec<Box<dyn HistogramSpec>> {
        let sig = &self.signal;
        vec![
            Box::new(sig.iter().fold(NJet::new(), |s, c| s.with_signal(c))),
            Box::new(sig.iter().fold(LeptonPt::new("Leading muon pT", "Muon", 0), |s, c| s.with_signal(c))),
            Box::new(sig.iter().fold(LeptonPt::new("Subleading muon pT", "Muon", 1), |s, c| s.with_signal(c))),
            Box::new(sig.iter().fold(LeptonEta::new("Leading muon eta", "Muon", 0), |s, c| s.with_signal(c))),
            Box::new(
                sig.iter().fold(DileptonMass::new("Dimuon mass", ("Muon", 0), ("Muon", 1)), |s, c| s.with_signal(c)),
            ),
            Box::new(sig.iter().fold(
                Discriminant::of_object("Leading jet b-tag score", "Jet_btagDeepFlavB", 0),
                |s, c| s.with_signal(c),
            )),
            Box::new(JetHt),
        ]
    }
}

/// Scalar sum of selected jet pT, read from the chunk augmentation.
struct JetHt;

impl HistogramSpec for JetHt {
    fn name(&self) -> &str {
        HT
    }

    fn create(&self) -> Result<Hist> {
        Hist::new(HT, "H_T [GeV]", Axis::regular(100, 0.0, 2000.0)?)
    }

    fn fill(
        &self,
        hist: &mut Hist,
        _events: &EventsView,
        category: &str,
        weights: &[f64],
        augmentation: &Augmentation,
    ) -> Result<()> {
        let ht = augmentation.column(HT)?.to_f64().ok_or_else(|| Error::Data("HT is not flat".into()))?;
        hist.fill(category, &ht, weights)
    }

    fn style(&self) -> PlotStyle {
        PlotStyle { y_label: counts_label(0.0, 2000.0, 100, 1, "GeV"), ..PlotStyle::default() }
    }
}
