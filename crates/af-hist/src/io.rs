//! Schema-versioned JSON form of reduced histograms.
//!
//! # Schema: `af_hist_v1`
//!
//! ```json
//! {
//!   "schema_version": "af_hist_v1",
//!   "name": "NJet",
//!   "escaped_name": "NJet",
//!   "roles": {"data": ["Muon"]},
//!   "style": {"x_label": null, "y_label": "Events", "rebin": 1, "log_y": true, "signal": []},
//!   "reduced": {
//!     "hist": {"name": "NJet", "label": "...", "axis": {...}, "categories": {...}},
//!     "tally": {"total": 12, "failed": 0}
//!   }
//! }
//! ```
//!
//! Floats are written with shortest round-trip formatting and parsed exactly,
//! so a document read back renders identically to the in-memory value.

use std::path::Path;

use serde::{Deserialize, Serialize};

use af_core::{Error, Result};

use crate::hist::ReducedHist;
use crate::spec::{PlotStyle, SampleRoles};

/// Schema version tag of [`HistDocument`].
pub const HIST_SCHEMA_V1: &str = "af_hist_v1";

/// Everything needed to render one reduced histogram without re-running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistDocument {
    /// Always [`HIST_SCHEMA_V1`].
    pub schema_version: String,
    /// Spec name.
    pub name: String,
    /// Output file stem.
    pub escaped_name: String,
    /// Data/simulation roles of the categories.
    pub roles: SampleRoles,
    /// Display hints.
    pub style: PlotStyle,
    /// The reduced accumulator.
    pub reduced: ReducedHist,
}

impl HistDocument {
    /// Wrap a reduced histogram.
    pub fn new(
        escaped_name: impl Into<String>,
        reduced: ReducedHist,
        roles: SampleRoles,
        style: PlotStyle,
    ) -> Self {
        Self {
            schema_version: HIST_SCHEMA_V1.to_string(),
            name: reduced.hist().name().to_string(),
            escaped_name: escaped_name.into(),
            roles,
            style,
            reduced,
        }
    }

    /// Check version and shape.
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != HIST_SCHEMA_V1 {
            return Err(Error::Validation(format!(
                "unsupported histogram schema_version '{}', expected '{HIST_SCHEMA_V1}'",
                self.schema_version
            )));
        }
        if self.name != self.reduced.hist().name() {
            return Err(Error::Validation(format!(
                "document name '{}' does not match histogram '{}'",
                self.name,
                self.reduced.hist().name()
            )));
        }
        self.reduced.hist().validate()
    }

    /// Pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and validate.
    pub fn from_json(s: &str) -> Result<Self> {
        let doc: HistDocument = serde_json::from_str(s)?;
        doc.validate()?;
        Ok(doc)
    }

    /// Write to `path`.
    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?).map_err(|e| Error::storage(path.display(), e))
    }

    /// Read from `path`.
    pub fn read(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).map_err(|e| Error::storage(path.display(), e))?;
        Self::from_json(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::Axis;
    use crate::hist::Hist;
    use af_core::ChunkTally;

    fn doc() -> HistDocument {
        let mut h = Hist::new("$m_{ll}$", "m_ll [GeV]", Axis::regular(3, 0.0, 3.0).unwrap()).unwrap();
        h.fill("DY", &[0.1, 1.7, 2.2], &[0.1 + 0.2, 1.0 / 3.0, 1e-300]).unwrap();
        HistDocument::new(
            "m_ll",
            ReducedHist::new(h, ChunkTally { total: 3, failed: 1 }),
            SampleRoles::default(),
            PlotStyle::default(),
        )
    }

    #[test]
    fn exact_roundtrip() {
        let d = doc();
        let back = HistDocument::from_json(&d.to_json().unwrap()).unwrap();
        assert_eq!(back, d);
        let b = back.reduced.hist().category("DY").unwrap();
        assert_eq!(b.sumw[0].to_bits(), (0.1f64 + 0.2).to_bits());
        assert_eq!(back.reduced.completeness().to_string(), "partial (1/3 failed)");
    }

    #[test]
    fn wrong_version_rejected() {
        let mut d = doc();
        d.schema_version = "af_hist_v0".into();
        let s = serde_json::to_string(&d).unwrap();
        assert!(matches!(HistDocument::from_json(&s), Err(Error::Validation(_))));
    }

    #[test]
    fn corrupted_shape_rejected() {
        let s = doc().to_json().unwrap().replacen("\"bins\": 3", "\"bins\": 4", 1);
        assert!(HistDocument::from_json(&s).is_err());
    }
}
