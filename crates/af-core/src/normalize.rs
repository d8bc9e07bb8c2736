//! Event-weight normalization for simulated and recorded samples.
//!
//! Simulated samples are scaled to the target luminosity with
//! `lumi · σ / N`, where `N` is the declared number of generated events.
//! When a chunk limit truncates the run the nominal factor no longer matches
//! the events actually processed, so an adjusted factor built from the
//! processed entry ranges is derived and applied instead; both are reported.
//! Recorded data always keeps unit weights; a limited data run is reported as
//! such and its luminosity is not corrected. A limit applied while skimming
//! counts the same as one applied to the run.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{ChunkRef, Dataset};
use crate::{Error, Result};

/// Default integrated luminosity in pb⁻¹ (2022 post-EE era).
pub const DEFAULT_LUMINOSITY_PB: f64 = 26_671.7;

/// Upper bound on the number of chunks processed per dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkLimit {
    /// `None` processes everything.
    pub max_chunks_per_dataset: Option<usize>,
}

impl ChunkLimit {
    /// No limit.
    pub fn unlimited() -> Self {
        Self { max_chunks_per_dataset: None }
    }

    /// At most `n` chunks per dataset.
    pub fn max(n: usize) -> Self {
        Self { max_chunks_per_dataset: Some(n) }
    }

    /// Chunks of `chunks` that will run.
    pub fn select<'a>(&self, chunks: &'a [ChunkRef]) -> &'a [ChunkRef] {
        match self.max_chunks_per_dataset {
            Some(n) if n < chunks.len() => &chunks[..n],
            _ => chunks,
        }
    }

    /// Whether the limit drops any chunk of `chunks`.
    pub fn truncates(&self, chunks: &[ChunkRef]) -> bool {
        self.select(chunks).len() < chunks.len()
    }
}

/// Scale applied to one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Normalization {
    /// Recorded data: weight 1.
    Data {
        /// The chunk limit dropped chunks.
        limited: bool,
        /// Chunks processed.
        processed_chunks: usize,
        /// Chunks in the partition.
        total_chunks: usize,
    },
    /// Simulated sample.
    Simulated {
        /// `lumi · σ / declared_event_count`.
        nominal: f64,
        /// Factor matching the processed subset; set only when the run is limited.
        adjusted: Option<f64>,
        /// Partition entries covered by the processed chunks.
        processed_entries: u64,
        /// Declared generated events.
        declared_entries: u64,
    },
}

impl Normalization {
    /// Normalization of `dataset` at `luminosity` (pb⁻¹) under `limit`.
    ///
    /// For raw inputs the adjusted factor uses the processed partition entries
    /// directly. Skimmed inputs have post-preselection partitions, so the
    /// processed fraction of skim entries scales the source entries instead:
    /// the declared count when the skim covers the whole source, the entries
    /// the skim was made from when a chunk limit cut it short.
    pub fn compute(dataset: &Dataset, luminosity: f64, limit: ChunkLimit) -> Result<Self> {
        if !(luminosity.is_finite() && luminosity > 0.0) {
            return Err(Error::Validation(format!("luminosity must be positive, got {luminosity}")));
        }
        dataset.validate()?;
        let processed = limit.select(&dataset.chunks);
        let run_limited = processed.len() < dataset.chunks.len();
        let skim_limit = dataset.skim_coverage.as_ref().filter(|c| c.is_limited());

        if !dataset.is_simulated {
            let (processed_chunks, total_chunks) = match skim_limit {
                Some(c) if !run_limited => (c.scheduled_chunks, c.source_chunks),
                _ => (processed.len(), dataset.chunks.len()),
            };
            return Ok(Normalization::Data {
                limited: run_limited || skim_limit.is_some(),
                processed_chunks,
                total_chunks,
            });
        }

        // validate() guarantees both are present for simulated samples
        let xsec = dataset.cross_section.unwrap_or(0.0);
        let declared = dataset.declared_event_count.unwrap_or(1);
        let nominal = luminosity * xsec / declared as f64;
        let run_entries: u64 = processed.iter().map(ChunkRef::entries).sum();
        let run_fraction = || match dataset.total_entries() {
            0 => 0.0,
            total => run_entries as f64 / total as f64,
        };

        // source-equivalent entries behind the processed chunks
        let effective = match (run_limited, skim_limit) {
            (false, None) => None,
            (false, Some(c)) => Some(c.scheduled_entries as f64),
            (true, Some(c)) => Some(c.scheduled_entries as f64 * run_fraction()),
            (true, None) if dataset.skimmed => Some(declared as f64 * run_fraction()),
            (true, None) => Some(run_entries as f64),
        };
        let (adjusted, processed_entries) = match effective {
            None => (None, run_entries),
            Some(n) if n <= 0.0 => {
                return Err(Error::Validation(format!(
                    "dataset '{}': chunk limit leaves no entries to normalize",
                    dataset.name
                )));
            }
            Some(n) if dataset.skimmed && skim_limit.is_none() => (Some(nominal * declared as f64 / n), run_entries),
            Some(n) => (Some(luminosity * xsec / n), n.round() as u64),
        };

        Ok(Normalization::Simulated { nominal, adjusted, processed_entries, declared_entries: declared })
    }

    /// Per-event weight factor applied by the pipeline.
    pub fn event_scale(&self) -> f64 {
        match self {
            Normalization::Data { .. } => 1.0,
            Normalization::Simulated { nominal, adjusted, .. } => adjusted.unwrap_or(*nominal),
        }
    }

    /// Whether a chunk limit changed what was processed.
    pub fn is_limited(&self) -> bool {
        match self {
            Normalization::Data { limited, .. } => *limited,
            Normalization::Simulated { adjusted, .. } => adjusted.is_some(),
        }
    }
}

/// Normalization of one dataset, as surfaced in run reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationReport {
    /// Dataset name.
    pub dataset: String,
    /// Applied normalization.
    pub normalization: Normalization,
}

impl fmt::Display for NormalizationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.normalization {
            Normalization::Data { limited: false, .. } => write!(f, "{}: data, weight 1", self.dataset),
            Normalization::Data { limited: true, processed_chunks, total_chunks } => write!(
                f,
                "{}: data limited to {processed_chunks}/{total_chunks} chunks, luminosity not corrected",
                self.dataset
            ),
            Normalization::Simulated { nominal, adjusted: None, .. } => {
                write!(f, "{}: simulated, scale {nominal:.6e}", self.dataset)
            }
            Normalization::Simulated {
                nominal,
                adjusted: Some(adj),
                processed_entries,
                declared_entries,
            } => write!(
                f,
                "{}: simulated limited to {processed_entries}/{declared_entries} entries, \
                 nominal {nominal:.6e}, adjusted {adj:.6e}",
                self.dataset
            ),
        }
    }
}
