//! Datasets backed by skims instead of raw files.

use std::path::Path;

use af_core::{ChunkKind, ChunkRef, Dataset, Error, Result, SkimCoverage};
use af_events::event_parquet::{count_entries, read_schema_metadata};
use af_events::partition_file;

use crate::merge::MERGED_DIR;
use crate::record::{META_KEY_ANALYSIS, META_KEY_ANALYSIS_VERSION, META_KEY_COVERAGE, SkimManifest, check_provenance};

/// Dataset name as a directory name: path separators become `_`, and one
/// leading `_` is stripped.
pub fn escape_dataset_name(name: &str) -> String {
    let safe: String = name.chars().map(|c| if c == '/' || c == '\\' { '_' } else { c }).collect();
    match safe.strip_prefix('_') {
        Some(rest) => rest.to_string(),
        None => safe,
    }
}

/// Replace each dataset's chunks with its skim files under `analysis_dir`.
///
/// Prefers `merged/<name>.parquet` when a `merged` directory exists; otherwise
/// reads the dataset manifest. Datasets without skims are left out. Skims from
/// another analysis or analysis version are refused. Returned datasets are
/// flagged as skimmed, so runs skip object definition and preselection, and
/// carry the skim's [`SkimCoverage`] so failed or limited skims stay visible.
pub fn convert_to_skimmed(
    datasets: &[Dataset],
    analysis_dir: &Path,
    analysis: &str,
    version: &str,
    step: u64,
) -> Result<Vec<Dataset>> {
    let merged_dir = analysis_dir.join(MERGED_DIR);
    let has_merged = merged_dir.is_dir();
    if has_merged {
        tracing::info!(dir = %merged_dir.display(), "using merged skim files");
    }

    let mut out = Vec::with_capacity(datasets.len());
    for dataset in datasets {
        let safe = escape_dataset_name(&dataset.name);
        let (chunks, coverage) = if has_merged {
            let file = merged_dir.join(format!("{safe}.parquet"));
            if !file.is_file() {
                tracing::error!(
                    dataset = %dataset.name,
                    file = %file.display(),
                    "dataset does not have a merged skim, skipping"
                );
                continue;
            }
            let meta = read_schema_metadata(&file)?;
            check_provenance(
                &file.display().to_string(),
                meta.get(META_KEY_ANALYSIS).map(String::as_str),
                meta.get(META_KEY_ANALYSIS_VERSION).map(String::as_str),
                analysis,
                version,
            )?;
            let coverage = match meta.get(META_KEY_COVERAGE) {
                Some(json) => Some(serde_json::from_str::<SkimCoverage>(json).map_err(|e| {
                    Error::Validation(format!("{}: unreadable skim coverage: {e}", file.display()))
                })?),
                None => {
                    tracing::warn!(file = %file.display(), "merged skim records no coverage");
                    None
                }
            };
            (partition_file(&file, count_entries(&file)?, step, 0, ChunkKind::Events)?, coverage)
        } else {
            let dir = analysis_dir.join(&safe);
            if !dir.is_dir() {
                tracing::error!(
                    dataset = %dataset.name,
                    dir = %dir.display(),
                    "dataset does not have skims, skipping"
                );
                continue;
            }
            let manifest = match SkimManifest::read(&dir) {
                Ok(m) => m,
                Err(e) => {
                    tracing::error!(dataset = %dataset.name, "dataset has no usable skim manifest, skipping: {e}");
                    continue;
                }
            };
            manifest.check_analysis(analysis, version)?;
            (chunks_from_manifest(&manifest, step)?, Some(manifest.coverage))
        };

        if let Some(c) = &coverage {
            if !c.failed.is_empty() {
                tracing::warn!(
                    dataset = %dataset.name,
                    failed = ?c.failed,
                    "skim is missing failed source chunks; results will be partial"
                );
            }
            if c.is_limited() {
                tracing::warn!(
                    dataset = %dataset.name,
                    "skim covers {}/{} source chunks",
                    c.scheduled_chunks,
                    c.source_chunks
                );
            }
        }
        tracing::debug!(dataset = %dataset.name, chunks = chunks.len(), "loaded skimmed dataset");
        let mut skimmed = dataset.clone().with_chunks(chunks);
        skimmed.skimmed = true;
        skimmed.skim_coverage = coverage;
        skimmed.validate()?;
        out.push(skimmed);
    }
    Ok(out)
}

fn chunks_from_manifest(manifest: &SkimManifest, step: u64) -> Result<Vec<ChunkRef>> {
    let mut chunks = Vec::new();
    for r in &manifest.records {
        let kind = if r.is_delta() { ChunkKind::SkimDelta } else { ChunkKind::Events };
        let next = chunks.len();
        chunks.extend(partition_file(&r.file, r.rows, step, next, kind)?);
    }
    Ok(chunks)
}
