//! Skim writing: object definition, preselection and minification per chunk,
//! then an atomic write of one part and one record.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use af_core::{ChunkLimit, ChunkLoader, ChunkRef, ChunkTally, Dataset, Error, Result, SkimCoverage};
use af_events::EventsView;
use af_events::event_parquet::{read_events_parquet, write_events_parquet};
use af_pipeline::{Analysis, ChunkFailure, Pipeline};

use crate::delta::SkimDelta;
use crate::record::{
    BaselineSkimRecord, MANIFEST_FILE, SKIM_SCHEMA_V1, SkimKind, SkimManifest, SkimRecord, commit,
    sha256_file, skim_metadata, tmp_path,
};
use crate::skimmed::escape_dataset_name;
use crate::storage::SkimStorage;

/// Skim configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkimOptions {
    /// Worker threads; 0 uses the global rayon pool.
    pub threads: usize,
    /// Rewrite datasets that already have skim parts.
    pub overwrite: bool,
    /// Abort on the first chunk-local error.
    pub strict: bool,
    /// Extra attempts for retryable storage errors.
    pub retries: usize,
    /// Chunk limit per dataset.
    pub limit: ChunkLimit,
    /// Analysis directory of a baseline skim; parts are then written as deltas.
    pub baseline: Option<PathBuf>,
}

impl Default for SkimOptions {
    fn default() -> Self {
        Self {
            threads: 0,
            overwrite: false,
            strict: false,
            retries: 0,
            limit: ChunkLimit::unlimited(),
            baseline: None,
        }
    }
}

/// What happened to one dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkimStatus {
    /// Parts and manifest written.
    Written,
    /// Output directory already had parts and `overwrite` was off.
    SkippedExisting,
}

/// Outcome for one dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkimOutcome {
    /// Dataset name.
    pub dataset: String,
    /// Written or skipped.
    pub status: SkimStatus,
    /// Dataset skim directory.
    pub dir: PathBuf,
    /// Chunk counts.
    pub tally: ChunkTally,
    /// Rows written.
    pub rows: u64,
    /// Chunks that failed with a chunk-local error.
    pub failures: Vec<ChunkFailure>,
}

/// Writes skims of an analysis.
pub struct SkimWriter<L> {
    pipeline: Pipeline,
    loader: L,
    storage: SkimStorage,
    options: SkimOptions,
}

impl<L: ChunkLoader<Chunk = EventsView>> SkimWriter<L> {
    /// Create a writer.
    pub fn new(pipeline: Pipeline, loader: L, storage: SkimStorage, options: SkimOptions) -> Self {
        Self { pipeline, loader, storage, options }
    }

    /// Storage in use.
    pub fn storage(&self) -> &SkimStorage {
        &self.storage
    }

    /// Skim every dataset, one after the other; chunks run in parallel.
    pub fn skim(&self, datasets: &[Dataset]) -> Result<Vec<SkimOutcome>> {
        self.storage.prepare()?;
        let run = || datasets.iter().map(|d| self.skim_dataset(d)).collect::<Result<Vec<_>>>();
        if self.options.threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.options.threads)
                .build()
                .map_err(|e| Error::Validation(format!("failed to create thread pool: {e}")))?;
            pool.install(run)
        } else {
            run()
        }
    }

    /// Skim one dataset into `<root>/<analysis>/<dataset>`.
    pub fn skim_dataset(&self, dataset: &Dataset) -> Result<SkimOutcome> {
        dataset.validate()?;
        let analysis = self.pipeline.analysis();
        let dir = self.storage.dataset_dir(analysis.name(), &dataset.name);

        if has_parts(&dir)? {
            if !self.options.overwrite {
                tracing::error!(dir = %dir.display(), "output directory already has skims, skipping");
                return Ok(SkimOutcome {
                    dataset: dataset.name.clone(),
                    status: SkimStatus::SkippedExisting,
                    dir,
                    tally: ChunkTally::default(),
                    rows: 0,
                    failures: Vec::new(),
                });
            }
            tracing::warn!(dir = %dir.display(), "overwriting existing skims");
            clear_parts(&dir)?;
        }
        std::fs::create_dir_all(&dir).map_err(|e| Error::storage(dir.display(), e))?;

        let baseline = match &self.options.baseline {
            Some(root) => {
                let base_dir = root.join(escape_dataset_name(&dataset.name));
                let manifest = SkimManifest::read(&base_dir).map_err(|e| Error::Reconstruction {
                    skim: dataset.name.clone(),
                    detail: format!("no baseline skim in {}: {e}", base_dir.display()),
                })?;
                if manifest.has_delta() {
                    return Err(Error::Reconstruction {
                        skim: dataset.name.clone(),
                        detail: "baseline is itself a delta skim".into(),
                    });
                }
                Some(manifest)
            }
            None => None,
        };

        let chunks = self.options.limit.select(&dataset.chunks);
        tracing::info!(
            dataset = %dataset.name,
            chunks = chunks.len(),
            delta = baseline.is_some(),
            "skimming dataset"
        );
        let results: Vec<Result<SkimRecord>> = chunks
            .par_iter()
            .map(|chunk| self.attempt(dataset, chunk, &dir, baseline.as_ref()))
            .collect();

        let mut records = Vec::with_capacity(chunks.len());
        let mut failures = Vec::new();
        for (chunk, result) in chunks.iter().zip(results) {
            match result {
                Ok(r) => records.push(r),
                Err(e) if e.is_chunk_local() && !self.options.strict => {
                    tracing::warn!(
                        dataset = %dataset.name,
                        chunk = chunk.ordinal,
                        path = %chunk.path.display(),
                        "chunk failed: {e}"
                    );
                    failures.push(ChunkFailure {
                        dataset: dataset.name.clone(),
                        ordinal: chunk.ordinal,
                        path: chunk.path.display().to_string(),
                        error: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let coverage = SkimCoverage::new(&dataset.chunks, chunks, failures.iter().map(|f| f.ordinal).collect());
        let manifest = SkimManifest::new(analysis.name(), analysis.version(), &dataset.name, coverage, records);
        manifest.write(&dir)?;
        let tally = ChunkTally { total: chunks.len(), failed: failures.len() };
        tracing::info!(
            dataset = %dataset.name,
            rows = manifest.rows(),
            status = %tally.completeness(),
            limited = manifest.coverage.is_limited(),
            "skim written"
        );
        Ok(SkimOutcome {
            dataset: dataset.name.clone(),
            status: SkimStatus::Written,
            dir,
            tally,
            rows: manifest.rows(),
            failures,
        })
    }

    fn attempt(
        &self,
        dataset: &Dataset,
        chunk: &ChunkRef,
        dir: &Path,
        baseline: Option<&SkimManifest>,
    ) -> Result<SkimRecord> {
        let mut attempt = 0;
        loop {
            match self.skim_chunk(dataset, chunk, dir, baseline) {
                Err(e) if e.is_retryable() => {
                    // a vanished shared root is not the chunk's fault
                    self.storage.check_reachable()?;
                    if attempt >= self.options.retries {
                        return Err(e);
                    }
                    attempt += 1;
                    tracing::debug!(dataset = %dataset.name, chunk = chunk.ordinal, attempt, "retrying after: {e}");
                }
                other => return other,
            }
        }
    }

    fn skim_chunk(
        &self,
        dataset: &Dataset,
        chunk: &ChunkRef,
        dir: &Path,
        baseline: Option<&SkimManifest>,
    ) -> Result<SkimRecord> {
        let analysis = self.pipeline.analysis();
        let events = self.loader.load(dataset, chunk)?;
        let skimmed = self.pipeline.skim_chunk(events)?;
        let metadata = skim_metadata(analysis.name(), analysis.version(), &dataset.name);
        let stem = format!("part-{:05}", chunk.ordinal);

        let (path, kind) = match baseline {
            None => {
                let path = dir.join(format!("{stem}.parquet"));
                let tmp = tmp_path(&path);
                write_events_parquet(&skimmed, &tmp, &metadata)?;
                commit(&tmp, &path)?;
                (path, SkimKind::Full)
            }
            Some(manifest) => {
                let base = resolve_baseline(manifest, chunk, &dataset.name)?;
                let base_view = read_events_parquet(&base.path)?;
                let delta = SkimDelta::diff(base.clone(), &base_view, &skimmed)?;
                let path = dir.join(format!("{stem}.delta.parquet"));
                let tmp = tmp_path(&path);
                delta.write(&tmp, &metadata)?;
                commit(&tmp, &path)?;
                (path, SkimKind::Delta { baseline: base })
            }
        };

        let record = SkimRecord {
            schema_version: SKIM_SCHEMA_V1.to_string(),
            analysis: analysis.name().to_string(),
            analysis_version: analysis.version().to_string(),
            dataset: dataset.name.clone(),
            source: chunk.clone(),
            location: self.storage.location().clone(),
            sha256: sha256_file(&path)?,
            file: path,
            rows: skimmed.len() as u64,
            fields: skimmed.field_names().to_vec(),
            kind,
        };
        record.write(&dir.join(format!("{stem}.json")))?;
        tracing::debug!(dataset = %dataset.name, chunk = chunk.ordinal, rows = record.rows, "chunk skimmed");
        Ok(record)
    }
}

/// Baseline record of `chunk`, checked against the file on disk.
///
/// The baseline must have been skimmed from the same source entry range;
/// a different chunk size shows up here rather than as missing rows.
fn resolve_baseline(manifest: &SkimManifest, chunk: &ChunkRef, dataset: &str) -> Result<BaselineSkimRecord> {
    let ordinal = chunk.ordinal;
    let rec = manifest.find(ordinal).ok_or_else(|| Error::Reconstruction {
        skim: dataset.to_string(),
        detail: format!("baseline has no record for chunk {ordinal}"),
    })?;
    let src = &rec.source;
    if src.path != chunk.path || src.entry_start != chunk.entry_start || src.entry_stop != chunk.entry_stop {
        return Err(Error::Reconstruction {
            skim: dataset.to_string(),
            detail: format!(
                "baseline chunk {ordinal} covers {}[{}..{}), this skim reads {}[{}..{}); \
                 was the chunk size changed?",
                src.path.display(),
                src.entry_start,
                src.entry_stop,
                chunk.path.display(),
                chunk.entry_start,
                chunk.entry_stop
            ),
        });
    }
    if !rec.file.is_file() {
        return Err(Error::Reconstruction {
            skim: dataset.to_string(),
            detail: format!("baseline file {} is missing", rec.file.display()),
        });
    }
    let found = sha256_file(&rec.file)?;
    if found != rec.sha256 {
        return Err(Error::Reconstruction {
            skim: dataset.to_string(),
            detail: format!("baseline file {} changed since it was recorded", rec.file.display()),
        });
    }
    Ok(BaselineSkimRecord { path: rec.file.clone(), sha256: found, rows: rec.rows })
}

fn is_part(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("part-") && n.ends_with(".parquet"))
}

fn has_parts(dir: &Path) -> Result<bool> {
    if !dir.is_dir() {
        return Ok(false);
    }
    let entries = std::fs::read_dir(dir).map_err(|e| Error::storage(dir.display(), e))?;
    let mut empty = true;
    for entry in entries {
        let entry = entry.map_err(|e| Error::storage(dir.display(), e))?;
        if is_part(&entry.path()) {
            empty = false;
            break;
        }
    }
    if empty {
        tracing::warn!(dir = %dir.display(), "empty output directory, continuing");
    }
    Ok(!empty)
}

/// Remove parts, records and the manifest written by an earlier skim.
fn clear_parts(dir: &Path) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|e| Error::storage(dir.display(), e))?;
    for entry in entries {
        let path = entry.map_err(|e| Error::storage(dir.display(), e))?.path();
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if name.starts_with("part-") || name == MANIFEST_FILE {
            std::fs::remove_file(&path).map_err(|e| Error::storage(path.display(), e))?;
        }
    }
    Ok(())
}
