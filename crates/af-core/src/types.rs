//! Dataset handles, chunk references and completeness bookkeeping

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// On-disk representation of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// A Parquet event file (raw input or full skim).
    Events,
    /// A delta skim that must be rebuilt against its baseline.
    SkimDelta,
}

/// Reference to one chunk: an entry range of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRef {
    /// Position of the chunk within its dataset (0-based, dense).
    pub ordinal: usize,
    /// File holding the chunk.
    pub path: PathBuf,
    /// First entry (inclusive).
    pub entry_start: u64,
    /// Last entry (exclusive).
    pub entry_stop: u64,
    /// File representation.
    pub kind: ChunkKind,
}

impl ChunkRef {
    /// Number of entries covered by the partition (not the post-selection row count).
    pub fn entries(&self) -> u64 {
        self.entry_stop.saturating_sub(self.entry_start)
    }
}

/// Handle to a partitioned collection of chunks plus its sample metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// Unique dataset name.
    pub name: String,
    /// Category name used on histogram category axes.
    pub short_name: String,
    /// Simulated (Monte Carlo) or recorded data.
    pub is_simulated: bool,
    /// Cross-section in pb (simulated only).
    pub cross_section: Option<f64>,
    /// Number of generated events the sample represents (simulated only).
    pub declared_event_count: Option<u64>,
    /// Chunk partition, ordered by ordinal.
    pub chunks: Vec<ChunkRef>,
    /// Chunks already went through object definition and preselection.
    #[serde(default)]
    pub skimmed: bool,
    /// Source coverage of the skim the chunks come from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skim_coverage: Option<SkimCoverage>,
}

impl Dataset {
    /// Recorded-data dataset.
    pub fn data(name: impl Into<String>, short_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            short_name: short_name.into(),
            is_simulated: false,
            cross_section: None,
            declared_event_count: None,
            chunks: Vec::new(),
            skimmed: false,
            skim_coverage: None,
        }
    }

    /// Simulated dataset with its cross-section (pb) and generated event count.
    pub fn simulated(
        name: impl Into<String>,
        short_name: impl Into<String>,
        cross_section: f64,
        declared_event_count: u64,
    ) -> Self {
        Self {
            name: name.into(),
            short_name: short_name.into(),
            is_simulated: true,
            cross_section: Some(cross_section),
            declared_event_count: Some(declared_event_count),
            chunks: Vec::new(),
            skimmed: false,
            skim_coverage: None,
        }
    }

    /// Attach a chunk partition.
    pub fn with_chunks(mut self, chunks: Vec<ChunkRef>) -> Self {
        self.chunks = chunks;
        self
    }

    /// Total entries across the partition.
    pub fn total_entries(&self) -> u64 {
        self.chunks.iter().map(ChunkRef::entries).sum()
    }

    /// Validate metadata consistency.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("dataset name must be non-empty".into()));
        }
        if self.short_name.trim().is_empty() {
            return Err(Error::Validation(format!(
                "dataset '{}' has an empty short name",
                self.name
            )));
        }
        if self.is_simulated {
            match self.cross_section {
                Some(x) if x.is_finite() && x >= 0.0 => {}
                Some(x) => {
                    return Err(Error::Validation(format!(
                        "dataset '{}' has invalid cross-section {x}",
                        self.name
                    )));
                }
                None => {
                    return Err(Error::Validation(format!(
                        "simulated dataset '{}' has no cross-section",
                        self.name
                    )));
                }
            }
            if !matches!(self.declared_event_count, Some(n) if n > 0) {
                return Err(Error::Validation(format!(
                    "simulated dataset '{}' needs a positive declared event count",
                    self.name
                )));
            }
        } else if self.cross_section.is_some() || self.declared_event_count.is_some() {
            return Err(Error::Validation(format!(
                "data dataset '{}' must not declare a cross-section or event count",
                self.name
            )));
        }
        if let Some(coverage) = &self.skim_coverage {
            coverage.validate()?;
        }
        for (i, c) in self.chunks.iter().enumerate() {
            if c.ordinal != i {
                return Err(Error::Validation(format!(
                    "dataset '{}': chunk ordinals must be dense, found {} at position {i}",
                    self.name, c.ordinal
                )));
            }
            if c.entry_stop < c.entry_start {
                return Err(Error::Validation(format!(
                    "dataset '{}': chunk {i} has inverted entry range",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Which source chunks a skim covers.
///
/// Datasets built from skims only see the skim parts. This records the source
/// partition and which part of it the skim actually holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkimCoverage {
    /// Chunks in the source partition.
    pub source_chunks: usize,
    /// Entries in the source partition.
    pub source_entries: u64,
    /// Chunks scheduled after the chunk limit.
    pub scheduled_chunks: usize,
    /// Source entries of the scheduled chunks.
    pub scheduled_entries: u64,
    /// Ordinals of scheduled chunks that failed.
    pub failed: Vec<usize>,
}

impl SkimCoverage {
    /// Coverage of skimming `scheduled` out of `source`, with `failed` ordinals.
    pub fn new(source: &[ChunkRef], scheduled: &[ChunkRef], mut failed: Vec<usize>) -> Self {
        failed.sort_unstable();
        failed.dedup();
        Self {
            source_chunks: source.len(),
            source_entries: source.iter().map(ChunkRef::entries).sum(),
            scheduled_chunks: scheduled.len(),
            scheduled_entries: scheduled.iter().map(ChunkRef::entries).sum(),
            failed,
        }
    }

    /// A chunk limit dropped source chunks.
    pub fn is_limited(&self) -> bool {
        self.scheduled_chunks < self.source_chunks
    }

    /// Skim-time failures as a tally of lost chunks.
    pub fn lost(&self) -> ChunkTally {
        ChunkTally { total: self.failed.len(), failed: self.failed.len() }
    }

    /// Check the counts are consistent.
    pub fn validate(&self) -> Result<()> {
        if self.scheduled_chunks > self.source_chunks || self.failed.len() > self.scheduled_chunks {
            return Err(Error::Validation(format!(
                "inconsistent skim coverage: {} of {} chunks scheduled, {} failed",
                self.scheduled_chunks,
                self.source_chunks,
                self.failed.len()
            )));
        }
        Ok(())
    }
}

/// Chunk success/failure counts for one dataset or one accumulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkTally {
    /// Chunks scheduled.
    pub total: usize,
    /// Chunks whose contribution is missing.
    pub failed: usize,
}

impl ChunkTally {
    /// Tally with `total` chunks and no failures yet.
    pub fn new(total: usize) -> Self {
        Self { total, failed: 0 }
    }

    /// Sum of two tallies (cross-dataset merges).
    pub fn combine(self, other: ChunkTally) -> ChunkTally {
        ChunkTally { total: self.total + other.total, failed: self.failed + other.failed }
    }

    /// Completeness tag.
    pub fn completeness(&self) -> Completeness {
        if self.failed == 0 {
            Completeness::Complete
        } else {
            Completeness::Partial { failed: self.failed, total: self.total }
        }
    }
}

/// Whether an accumulator reflects every scheduled chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Completeness {
    /// All chunks contributed.
    Complete,
    /// Some chunks failed and are missing from the result.
    Partial {
        /// Failed chunks.
        failed: usize,
        /// Scheduled chunks.
        total: usize,
    },
}

impl Completeness {
    /// `true` for [`Completeness::Complete`].
    pub fn is_complete(&self) -> bool {
        matches!(self, Completeness::Complete)
    }
}

impl fmt::Display for Completeness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completeness::Complete => write!(f, "complete"),
            Completeness::Partial { failed, total } => write!(f, "partial ({failed}/{total} failed)"),
        }
    }
}
