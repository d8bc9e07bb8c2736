//! Weighted category × value histogram accumulator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use af_core::{ChunkTally, Completeness, Error, Result};

use crate::axis::{Axis, BinIndex};

/// Weighted storage of one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bins {
    /// Sum of weights per bin.
    pub sumw: Vec<f64>,
    /// Sum of squared weights per bin.
    pub sumw2: Vec<f64>,
    /// Underflow sum of weights.
    pub underflow: f64,
    /// Overflow sum of weights (includes NaN values).
    pub overflow: f64,
    /// Underflow sum of squared weights.
    pub underflow_sumw2: f64,
    /// Overflow sum of squared weights.
    pub overflow_sumw2: f64,
    /// Filled values, flows included.
    pub entries: u64,
}

impl Bins {
    fn zeros(n: usize) -> Self {
        Self {
            sumw: vec![0.0; n],
            sumw2: vec![0.0; n],
            underflow: 0.0,
            overflow: 0.0,
            underflow_sumw2: 0.0,
            overflow_sumw2: 0.0,
            entries: 0,
        }
    }

    fn add(&mut self, other: &Bins) {
        for (a, b) in self.sumw.iter_mut().zip(&other.sumw) {
            *a += b;
        }
        for (a, b) in self.sumw2.iter_mut().zip(&other.sumw2) {
            *a += b;
        }
        self.underflow += other.underflow;
        self.overflow += other.overflow;
        self.underflow_sumw2 += other.underflow_sumw2;
        self.overflow_sumw2 += other.overflow_sumw2;
        self.entries += other.entries;
    }

    /// In-range sum of weights.
    pub fn total(&self) -> f64 {
        self.sumw.iter().sum()
    }

    /// Per-bin statistical uncertainty, `sqrt(sumw2)`.
    pub fn errors(&self) -> Vec<f64> {
        self.sumw2.iter().map(|v| v.sqrt()).collect()
    }
}

/// Histogram accumulator: growable category axis × one value axis.
///
/// Categories are kept sorted, so two accumulators holding the same content
/// compare and serialize identically regardless of fill order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hist {
    name: String,
    label: String,
    axis: Axis,
    categories: BTreeMap<String, Bins>,
}

impl Hist {
    /// Empty accumulator with a validated axis.
    pub fn new(name: impl Into<String>, label: impl Into<String>, axis: Axis) -> Result<Self> {
        axis.validate()?;
        Ok(Self { name: name.into(), label: label.into(), axis, categories: BTreeMap::new() })
    }

    /// Histogram name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value-axis label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Value axis.
    pub fn axis(&self) -> &Axis {
        &self.axis
    }

    /// Category names, sorted.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    /// Storage of one category.
    pub fn category(&self, name: &str) -> Option<&Bins> {
        self.categories.get(name)
    }

    /// `true` when nothing was filled.
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Fill `values` with matching `weights` into `category`.
    ///
    /// The category is created on first use, even when `values` is empty.
    pub fn fill(&mut self, category: &str, values: &[f64], weights: &[f64]) -> Result<()> {
        if values.len() != weights.len() {
            return Err(Error::Data(format!(
                "histogram '{}': {} values but {} weights",
                self.name,
                values.len(),
                weights.len()
            )));
        }
        let n = self.axis.n_bins();
        let bins = self.categories.entry(category.to_string()).or_insert_with(|| Bins::zeros(n));
        for (&x, &w) in values.iter().zip(weights) {
            let w2 = w * w;
            match self.axis.index(x) {
                BinIndex::Underflow => {
                    bins.underflow += w;
                    bins.underflow_sumw2 += w2;
                }
                BinIndex::Overflow => {
                    bins.overflow += w;
                    bins.overflow_sumw2 += w2;
                }
                BinIndex::Bin(i) => {
                    bins.sumw[i] += w;
                    bins.sumw2[i] += w2;
                }
            }
            bins.entries += 1;
        }
        Ok(())
    }

    /// Add `other` into `self`. Name and axis must match.
    pub fn merge(&mut self, other: &Hist) -> Result<()> {
        if self.name != other.name {
            return Err(Error::SchemaMismatch {
                spec: self.name.clone(),
                detail: format!("cannot merge with histogram '{}'", other.name),
            });
        }
        if self.axis != other.axis {
            return Err(Error::SchemaMismatch {
                spec: self.name.clone(),
                detail: format!("axis {:?} differs from {:?}", self.axis, other.axis),
            });
        }
        for (cat, b) in &other.categories {
            match self.categories.get_mut(cat) {
                Some(a) => a.add(b),
                None => {
                    self.categories.insert(cat.clone(), b.clone());
                }
            }
        }
        Ok(())
    }

    /// `a + b` without mutating either.
    pub fn merged(a: &Hist, b: &Hist) -> Result<Hist> {
        let mut out = a.clone();
        out.merge(b)?;
        Ok(out)
    }

    /// Sum of several categories (missing ones count as empty).
    pub fn sum_categories<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Bins {
        let mut out = Bins::zeros(self.axis.n_bins());
        for n in names {
            if let Some(b) = self.categories.get(n) {
                out.add(b);
            }
        }
        out
    }

    /// Check that every category matches the axis (after deserialization).
    pub fn validate(&self) -> Result<()> {
        self.axis.validate()?;
        let n = self.axis.n_bins();
        for (cat, b) in &self.categories {
            if b.sumw.len() != n || b.sumw2.len() != n {
                return Err(Error::SchemaMismatch {
                    spec: self.name.clone(),
                    detail: format!("category '{cat}' has {} bins, axis has {n}", b.sumw.len()),
                });
            }
        }
        Ok(())
    }

    /// Merge groups of `factor` adjacent bins; flows are kept.
    pub fn rebin(&self, factor: usize) -> Result<Hist> {
        let axis = self.axis.rebin(factor)?;
        let categories = self
            .categories
            .iter()
            .map(|(k, b)| {
                let group = |v: &[f64]| -> Vec<f64> {
                    v.chunks(factor).map(|c| c.iter().sum::<f64>()).collect()
                };
                let rb = Bins { sumw: group(&b.sumw), sumw2: group(&b.sumw2), ..b.clone() };
                (k.clone(), rb)
            })
            .collect();
        Ok(Hist { name: self.name.clone(), label: self.label.clone(), axis, categories })
    }
}

/// Final, immutable accumulator of one histogram after reduction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReducedHist {
    hist: Hist,
    tally: ChunkTally,
}

impl ReducedHist {
    /// Seal a reduced accumulator.
    pub fn new(hist: Hist, tally: ChunkTally) -> Self {
        Self { hist, tally }
    }

    /// Shared view of the accumulator.
    pub fn hist(&self) -> &Hist {
        &self.hist
    }

    /// Chunk counts behind the result.
    pub fn tally(&self) -> ChunkTally {
        self.tally
    }

    /// `complete` or `partial (failed/total failed)`.
    pub fn completeness(&self) -> Completeness {
        self.tally.completeness()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn h() -> Hist {
        Hist::new("Pt", "p_T [GeV]", Axis::regular(4, 0.0, 4.0).unwrap()).unwrap()
    }

    #[test]
    fn fill_with_flows() {
        let mut a = h();
        a.fill("TTbar", &[0.5, 1.5, 1.5, -1.0, 9.0, f64::NAN], &[1.0, 2.0, 0.5, 1.0, 3.0, 1.0])
            .unwrap();
        let b = a.category("TTbar").unwrap();
        assert_eq!(b.sumw, vec![1.0, 2.5, 0.0, 0.0]);
        assert_eq!(b.sumw2, vec![1.0, 4.25, 0.0, 0.0]);
        assert_eq!(b.underflow, 1.0);
        assert_eq!(b.overflow, 4.0);
        assert_eq!(b.entries, 6);
    }

    #[test]
    fn fill_length_mismatch() {
        let err = h().fill("TTbar", &[1.0], &[]).unwrap_err();
        assert!(matches!(err, Error::Data(_)));
    }

    #[test]
    fn empty_fill_creates_category() {
        let mut a = h();
        a.fill("Muon", &[], &[]).unwrap();
        assert_eq!(a.categories().collect::<Vec<_>>(), vec!["Muon"]);
    }

    #[test]
    fn merge_adds_and_grows_categories() {
        let mut a = h();
        a.fill("TTbar", &[0.5], &[1.0]).unwrap();
        let mut b = h();
        b.fill("TTbar", &[0.5], &[2.0]).unwrap();
        b.fill("DY", &[3.5], &[1.0]).unwrap();
        a.merge(&b).unwrap();
        assert_eq!(a.category("TTbar").unwrap().sumw[0], 3.0);
        assert_eq!(a.category("DY").unwrap().sumw[3], 1.0);
    }

    #[test]
    fn merge_schema_mismatch() {
        let mut a = h();
        let b = Hist::new("Pt", "p_T [GeV]", Axis::regular(5, 0.0, 4.0).unwrap()).unwrap();
        match a.merge(&b) {
            Err(Error::SchemaMismatch { spec, .. }) => assert_eq!(spec, "Pt"),
            other => panic!("expected schema mismatch, got {other:?}"),
        }
        let c = Hist::new("Eta", "eta", Axis::regular(4, 0.0, 4.0).unwrap()).unwrap();
        assert!(a.merge(&c).is_err());
    }

    #[test]
    fn rebin_keeps_totals() {
        let mut a = Hist::new("M", "m", Axis::regular(500, 0.0, 1000.0).unwrap()).unwrap();
        let xs: Vec<f64> = (0..1000).map(|i| i as f64 + 0.5).collect();
        a.fill("DY", &xs, &vec![0.5; xs.len()]).unwrap();
        let r = a.rebin(10).unwrap();
        assert_eq!(r.axis().n_bins(), 50);
        assert_abs_diff_eq!(r.category("DY").unwrap().total(), 500.0, epsilon = 1e-9);
        assert_abs_diff_eq!(r.category("DY").unwrap().sumw[0], 10.0, epsilon = 1e-12);
    }

    #[test]
    fn sum_categories_skips_missing() {
        let mut a = h();
        a.fill("Muon", &[0.5], &[1.0]).unwrap();
        a.fill("EGamma", &[0.5, 1.5], &[1.0, 1.0]).unwrap();
        let d = a.sum_categories(["Muon", "EGamma", "MuonEG"]);
        assert_eq!(d.sumw, vec![2.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn reduced_is_tagged() {
        let r = ReducedHist::new(h(), ChunkTally { total: 3, failed: 1 });
        assert_eq!(r.completeness().to_string(), "partial (1/3 failed)");
        assert!(r.hist().is_empty());
    }
}
