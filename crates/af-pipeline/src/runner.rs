//! Parallel chunk execution with failure isolation.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use af_core::{
    ChunkLimit, ChunkLoader, ChunkRef, DEFAULT_LUMINOSITY_PB, Dataset, Error, Normalization,
    NormalizationReport, Result,
};
use af_events::EventsView;
use af_hist::{HistDocument, SampleRoles};

use crate::pipeline::{ChunkOutput, Pipeline};
use crate::reducer::Reducer;
use crate::results::{ChunkFailure, DatasetReport, RunReport, RunResults};

/// Run configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Integrated luminosity in pb⁻¹.
    pub luminosity: f64,
    /// Chunk limit per dataset.
    pub limit: ChunkLimit,
    /// Worker threads; 0 uses the global rayon pool.
    pub threads: usize,
    /// Abort on the first chunk-local error instead of reporting a partial result.
    pub strict: bool,
    /// Extra attempts for chunks failing with a retryable storage error.
    pub retries: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            luminosity: DEFAULT_LUMINOSITY_PB,
            limit: ChunkLimit::unlimited(),
            threads: 0,
            strict: false,
            retries: 0,
        }
    }
}

/// Drives a [`Pipeline`] over datasets read through a [`ChunkLoader`].
pub struct Runner<L> {
    pipeline: Pipeline,
    loader: L,
    options: RunOptions,
}

struct Task<'a> {
    dataset: usize,
    chunk: &'a ChunkRef,
}

impl<L: ChunkLoader<Chunk = EventsView>> Runner<L> {
    /// Create a runner.
    pub fn new(pipeline: Pipeline, loader: L, options: RunOptions) -> Self {
        Self { pipeline, loader, options }
    }

    /// The composed pipeline.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Options in effect.
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Normalization of every dataset under the configured luminosity and limit.
    pub fn normalizations(&self, datasets: &[Dataset]) -> Result<Vec<NormalizationReport>> {
        datasets
            .iter()
            .map(|d| {
                Ok(NormalizationReport {
                    dataset: d.name.clone(),
                    normalization: Normalization::compute(
                        d,
                        self.options.luminosity,
                        self.options.limit,
                    )?,
                })
            })
            .collect()
    }

    /// Process every (limited) chunk of `datasets` and reduce.
    ///
    /// Chunk-local errors drop only that chunk, unless `strict` is set. The
    /// reduced histograms carry the completeness over all datasets.
    pub fn run(&self, datasets: &[Dataset]) -> Result<RunResults> {
        let start = std::time::Instant::now();
        if datasets.is_empty() {
            return Err(Error::Validation("no datasets to process".into()));
        }
        let mut names = HashSet::new();
        for d in datasets {
            if !names.insert(d.name.as_str()) {
                return Err(Error::Validation(format!("dataset '{}' listed twice", d.name)));
            }
        }

        let norms = self.normalizations(datasets)?;
        for n in &norms {
            if n.normalization.is_limited() {
                tracing::warn!("{n}");
            } else {
                tracing::info!("{n}");
            }
        }

        let selected: Vec<&[ChunkRef]> =
            datasets.iter().map(|d| self.options.limit.select(&d.chunks)).collect();
        let tasks: Vec<Task<'_>> = selected
            .iter()
            .enumerate()
            .flat_map(|(i, chunks)| chunks.iter().map(move |chunk| Task { dataset: i, chunk }))
            .collect();
        let mut reducer = Reducer::new(&selected.iter().map(|c| c.len()).collect::<Vec<_>>());
        for (i, d) in datasets.iter().enumerate() {
            if let Some(coverage) = d.skim_coverage.as_ref().filter(|c| !c.failed.is_empty()) {
                tracing::warn!(
                    dataset = %d.name,
                    failed = coverage.failed.len(),
                    "source chunks lost while skimming count as failed"
                );
                reducer.carry_lost(i, coverage.lost())?;
            }
        }
        let rows_in: Vec<AtomicU64> = datasets.iter().map(|_| AtomicU64::new(0)).collect();
        let rows_selected: Vec<AtomicU64> = datasets.iter().map(|_| AtomicU64::new(0)).collect();
        let failures: Mutex<Vec<(usize, ChunkFailure)>> = Mutex::new(Vec::new());

        tracing::info!(
            analysis = self.pipeline.analysis().name(),
            datasets = datasets.len(),
            chunks = tasks.len(),
            loader = self.loader.name(),
            "starting run"
        );

        let run_task = |task: &Task<'_>| -> Result<()> {
            let dataset = &datasets[task.dataset];
            let scale = norms[task.dataset].normalization.event_scale();
            match self.attempt(dataset, task.chunk, scale) {
                Ok(out) => {
                    rows_in[task.dataset].fetch_add(out.rows_in as u64, Ordering::Relaxed);
                    rows_selected[task.dataset].fetch_add(out.rows_selected as u64, Ordering::Relaxed);
                    reducer.submit(task.dataset, task.chunk.ordinal, Some(out.hists))
                }
                Err(e) if e.is_chunk_local() && !self.options.strict => {
                    tracing::warn!(
                        dataset = %dataset.name,
                        chunk = task.chunk.ordinal,
                        path = %task.chunk.path.display(),
                        "chunk failed: {e}"
                    );
                    failures.lock().unwrap_or_else(PoisonError::into_inner).push((
                        task.dataset,
                        ChunkFailure {
                            dataset: dataset.name.clone(),
                            ordinal: task.chunk.ordinal,
                            path: task.chunk.path.display().to_string(),
                            error: e.to_string(),
                        },
                    ));
                    reducer.submit(task.dataset, task.chunk.ordinal, None)
                }
                Err(e) => Err(e),
            }
        };
        let process = || tasks.par_iter().try_for_each(run_task);

        if self.options.threads > 0 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.options.threads)
                .build()
                .map_err(|e| Error::Validation(format!("failed to create thread pool: {e}")))?;
            pool.install(process)?;
        } else {
            process()?;
        }

        let templates = self.pipeline.specs().iter().map(|s| s.create()).collect::<Result<Vec<_>>>()?;
        let reduced = reducer.finish(templates)?;

        let mut failures = failures.into_inner().unwrap_or_else(PoisonError::into_inner);
        failures.sort_by_key(|(d, f)| (*d, f.ordinal));

        let reports: Vec<DatasetReport> = datasets
            .iter()
            .zip(norms)
            .zip(&reduced.dataset_tallies)
            .enumerate()
            .map(|(i, ((d, n), tally))| DatasetReport {
                name: d.name.clone(),
                short_name: d.short_name.clone(),
                is_simulated: d.is_simulated,
                tally: *tally,
                normalization: n.normalization,
                rows_in: rows_in[i].load(Ordering::Relaxed),
                rows_selected: rows_selected[i].load(Ordering::Relaxed),
            })
            .collect();

        let roles = SampleRoles::from_datasets(datasets);
        let histograms = self
            .pipeline
            .specs()
            .iter()
            .zip(reduced.hists)
            .map(|(spec, r)| HistDocument::new(spec.escaped_name(), r, roles.clone(), spec.style()))
            .collect();

        let entries_processed = reports.iter().map(|r| r.rows_in).sum();
        let wall_seconds = start.elapsed().as_secs_f64();
        let report = RunReport {
            analysis: self.pipeline.analysis().name().to_string(),
            analysis_version: self.pipeline.analysis().version().to_string(),
            datasets: reports,
            failures: failures.into_iter().map(|(_, f)| f).collect(),
            entries_processed,
            wall_seconds,
        };
        tracing::info!(
            status = %report.tally().completeness(),
            entries = entries_processed,
            entries_per_second = report.entries_per_second() as u64,
            "run finished in {wall_seconds:.2}s"
        );
        Ok(RunResults::new(report, histograms))
    }

    fn attempt(&self, dataset: &Dataset, chunk: &ChunkRef, scale: f64) -> Result<ChunkOutput> {
        let mut attempt = 0;
        loop {
            let result = self
                .loader
                .load(dataset, chunk)
                .and_then(|events| self.pipeline.execute_chunk(events, dataset, scale));
            match result {
                Err(e) if e.is_retryable() && attempt < self.options.retries => {
                    attempt += 1;
                    tracing::debug!(
                        dataset = %dataset.name,
                        chunk = chunk.ordinal,
                        attempt,
                        "retrying after: {e}"
                    );
                }
                other => return other,
            }
        }
    }
}
