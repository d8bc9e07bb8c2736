//! Run reports and the persisted results document.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use af_core::{ChunkTally, Error, Normalization, Result};
use af_hist::HistDocument;

/// Schema version of `results.json`.
pub const RESULTS_SCHEMA_V1: &str = "af_results_v1";

/// File name of the results document inside an output directory.
pub const RESULTS_FILE: &str = "results.json";

/// One chunk that did not contribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkFailure {
    /// Dataset name.
    pub dataset: String,
    /// Chunk ordinal.
    pub ordinal: usize,
    /// Chunk file.
    pub path: String,
    /// Error message.
    pub error: String,
}

/// Per-dataset outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetReport {
    /// Dataset name.
    pub name: String,
    /// Category name.
    pub short_name: String,
    /// Simulated sample.
    pub is_simulated: bool,
    /// Chunk counts.
    pub tally: ChunkTally,
    /// Applied normalization.
    pub normalization: Normalization,
    /// Rows loaded.
    pub rows_in: u64,
    /// Rows after selection.
    pub rows_selected: u64,
}

impl fmt::Display for DatasetReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}]: {}, {} of {} rows selected",
            self.name,
            self.short_name,
            self.tally.completeness(),
            self.rows_selected,
            self.rows_in
        )
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// Analysis name.
    pub analysis: String,
    /// Analysis version.
    pub analysis_version: String,
    /// Datasets, in declaration order.
    pub datasets: Vec<DatasetReport>,
    /// Chunks that failed with a chunk-local error.
    pub failures: Vec<ChunkFailure>,
    /// Rows loaded over all datasets.
    pub entries_processed: u64,
    /// Wall time in seconds.
    pub wall_seconds: f64,
}

impl RunReport {
    /// Chunk counts over all datasets.
    pub fn tally(&self) -> ChunkTally {
        self.datasets.iter().fold(ChunkTally::default(), |a, d| a.combine(d.tally))
    }

    /// Loaded rows per second.
    pub fn entries_per_second(&self) -> f64 {
        if self.wall_seconds > 0.0 { self.entries_processed as f64 / self.wall_seconds } else { 0.0 }
    }
}

/// Everything a run produced: report plus one document per histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResults {
    /// Always [`RESULTS_SCHEMA_V1`].
    pub schema_version: String,
    /// Run report.
    pub report: RunReport,
    /// Reduced histograms, in spec order.
    pub histograms: Vec<HistDocument>,
}

impl RunResults {
    /// Bundle a report and histograms.
    pub fn new(report: RunReport, histograms: Vec<HistDocument>) -> Self {
        Self { schema_version: RESULTS_SCHEMA_V1.to_string(), report, histograms }
    }

    /// Write `results.json` and one `<name>.hist.json` per histogram into `dir`.
    pub fn write(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir).map_err(|e| Error::storage(dir.display(), e))?;
        let mut written = Vec::with_capacity(self.histograms.len() + 1);
        let path = dir.join(RESULTS_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)
            .map_err(|e| Error::storage(path.display(), e))?;
        written.push(path);
        for doc in &self.histograms {
            let p = dir.join(format!("{}.hist.json", doc.escaped_name));
            doc.write(&p)?;
            written.push(p);
        }
        tracing::info!(dir = %dir.display(), files = written.len(), "results written");
        Ok(written)
    }

    /// Read and validate a results document.
    pub fn read(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).map_err(|e| Error::storage(path.display(), e))?;
        let r: RunResults = serde_json::from_str(&s)?;
        if r.schema_version != RESULTS_SCHEMA_V1 {
            return Err(Error::Validation(format!(
                "unsupported results schema_version '{}', expected '{RESULTS_SCHEMA_V1}'",
                r.schema_version
            )));
        }
        for doc in &r.histograms {
            doc.validate()?;
        }
        Ok(r)
    }
}
