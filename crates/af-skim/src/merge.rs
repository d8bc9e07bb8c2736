//! Merging multi-part dataset skims into one file per dataset.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use af_core::{Error, Result};
use af_events::EventsView;
use af_events::event_parquet::{
    META_KEY_SCHEMA_VERSION, read_events_parquet, read_schema_metadata, write_events_parquet,
};

use crate::record::{META_KEY_COVERAGE, SkimManifest, commit, tmp_path};

/// Directory holding merged skims, next to the dataset directories.
pub const MERGED_DIR: &str = "merged";

/// One merged dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedDataset {
    /// Dataset directory name.
    pub name: String,
    /// Merged file.
    pub path: PathBuf,
    /// Parts merged.
    pub parts: usize,
    /// Rows written.
    pub rows: u64,
}

/// Result of [`merge_skims`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MergeOutcome {
    /// `merged/` already existed; nothing was touched.
    Skipped {
        /// The existing directory.
        dir: PathBuf,
    },
    /// Datasets merged, in directory-name order.
    Merged {
        /// Per-dataset results.
        datasets: Vec<MergedDataset>,
    },
}

/// Concatenate the parts of every dataset under `analysis_dir` into
/// `merged/<dataset>.parquet`.
///
/// Parts are taken in manifest order (or file-name order without a manifest).
/// The manifest's coverage is stored in the merged file's metadata. Delta
/// skims need their baseline to be read and cannot be merged.
pub fn merge_skims(analysis_dir: &Path) -> Result<MergeOutcome> {
    let merged_dir = analysis_dir.join(MERGED_DIR);
    if merged_dir.exists() {
        tracing::error!(dir = %merged_dir.display(), "directory exists, skipping merge");
        return Ok(MergeOutcome::Skipped { dir: merged_dir });
    }

    let mut plans = Vec::new();
    for dir in dataset_dirs(analysis_dir)? {
        let name = dir.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();
        let (parts, coverage) = match SkimManifest::read(&dir) {
            Ok(m) if m.has_delta() => {
                return Err(Error::Validation(format!(
                    "dataset '{}' is a delta skim; delta skims cannot be merged",
                    m.dataset
                )));
            }
            Ok(m) => {
                if !m.is_complete() {
                    tracing::warn!(
                        dataset = %m.dataset,
                        failed = m.coverage.failed.len(),
                        "merging an incomplete skim; runs from it stay partial"
                    );
                }
                let coverage = serde_json::to_string(&m.coverage)?;
                (m.records.into_iter().map(|r| r.file).collect(), Some(coverage))
            }
            Err(_) => (list_parts(&dir)?, None),
        };
        if parts.is_empty() {
            tracing::warn!(dir = %dir.display(), "no skim parts, skipping");
            continue;
        }
        plans.push((name, parts, coverage));
    }

    std::fs::create_dir_all(&merged_dir).map_err(|e| Error::storage(merged_dir.display(), e))?;
    let mut datasets = Vec::with_capacity(plans.len());
    for (name, parts, coverage) in plans {
        let views = parts.iter().map(|p| read_events_parquet(p)).collect::<Result<Vec<EventsView>>>()?;
        let merged = EventsView::concat(&views)?;
        let mut metadata = read_schema_metadata(&parts[0])?;
        metadata.remove(META_KEY_SCHEMA_VERSION);
        if let Some(coverage) = coverage {
            metadata.insert(META_KEY_COVERAGE.to_string(), coverage);
        }

        let path = merged_dir.join(format!("{name}.parquet"));
        let tmp = tmp_path(&path);
        write_events_parquet(&merged, &tmp, &metadata)?;
        commit(&tmp, &path)?;
        tracing::info!(dataset = %name, parts = parts.len(), rows = merged.len(), "merged skim");
        datasets.push(MergedDataset { name, path, parts: parts.len(), rows: merged.len() as u64 });
    }
    Ok(MergeOutcome::Merged { datasets })
}

fn dataset_dirs(analysis_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(analysis_dir).map_err(|e| Error::storage(analysis_dir.display(), e))?;
    let mut dirs = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::storage(analysis_dir.display(), e))?.path();
        if path.is_dir() && path.file_name().is_some_and(|n| n != MERGED_DIR) {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn list_parts(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| Error::storage(dir.display(), e))?;
    let mut parts = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::storage(dir.display(), e))?.path();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if name.starts_with("part-") && name.ends_with(".parquet") {
            if name.ends_with(".delta.parquet") {
                return Err(Error::Validation(format!(
                    "{} is a delta skim; delta skims cannot be merged",
                    path.display()
                )));
            }
            parts.push(path);
        }
    }
    parts.sort();
    Ok(parts)
}
