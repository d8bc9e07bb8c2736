//! Local-file dataset source: entry counting, chunk partitioning and loading.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use af_core::traits::ChunkLoader;
use af_core::{ChunkKind, ChunkRef, Dataset, Error, Result};

use crate::event_parquet::{count_entries, read_events_parquet_range};
use crate::view::EventsView;

/// Split one file of `entries` entries into chunks of at most `step` entries.
///
/// Ordinals start at `first_ordinal`. A file without entries yields no chunk.
pub fn partition_file(
    path: &Path,
    entries: u64,
    step: u64,
    first_ordinal: usize,
    kind: ChunkKind,
) -> Result<Vec<ChunkRef>> {
    if step == 0 {
        return Err(Error::Validation("chunk size must be positive".into()));
    }
    let mut out = Vec::with_capacity(entries.div_ceil(step) as usize);
    let mut start = 0;
    while start < entries {
        let stop = (start + step).min(entries);
        out.push(ChunkRef {
            ordinal: first_ordinal + out.len(),
            path: path.to_path_buf(),
            entry_start: start,
            entry_stop: stop,
            kind,
        });
        start = stop;
    }
    Ok(out)
}

/// Partition several Parquet files, reading entry counts from their footers.
///
/// Files with zero entries are skipped with a warning. Returns the chunks and
/// the total entry count.
pub fn partition_files(paths: &[PathBuf], step: u64) -> Result<(Vec<ChunkRef>, u64)> {
    let mut chunks = Vec::new();
    let mut total = 0;
    for path in paths {
        let n = count_entries(path)?;
        if n == 0 {
            tracing::warn!(file = %path.display(), "file has no events, skipping");
            continue;
        }
        total += n;
        let next = chunks.len();
        chunks.extend(partition_file(path, n, step, next, ChunkKind::Events)?);
    }
    Ok((chunks, total))
}

/// File-level description of one dataset before partitioning.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalDataset {
    /// Dataset name.
    pub name: String,
    /// Category name.
    pub short_name: String,
    /// Simulated sample.
    pub is_simulated: bool,
    /// Cross-section in pb (simulated only).
    pub cross_section: Option<f64>,
    /// Declared generated events; summed from file entries when absent.
    pub event_count: Option<u64>,
    /// Input files.
    pub files: Vec<PathBuf>,
}

impl LocalDataset {
    /// Resolve into a partitioned [`Dataset`].
    ///
    /// Vetoed files are dropped first. Returns `None` when no file with events is left.
    pub fn resolve(&self, veto: &HashSet<PathBuf>, step: u64) -> Result<Option<Dataset>> {
        let files: Vec<PathBuf> = self
            .files
            .iter()
            .filter(|f| {
                let vetoed = veto.contains(*f);
                if vetoed {
                    tracing::info!(dataset = %self.name, file = %f.display(), "file vetoed");
                }
                !vetoed
            })
            .cloned()
            .collect();
        let (chunks, total) = partition_files(&files, step)?;
        if chunks.is_empty() {
            tracing::warn!(dataset = %self.name, "no files with events, dropping dataset");
            return Ok(None);
        }
        let dataset = if self.is_simulated {
            let xsec = self.cross_section.ok_or_else(|| {
                Error::Validation(format!("simulated dataset '{}' has no cross-section", self.name))
            })?;
            Dataset::simulated(&self.name, &self.short_name, xsec, self.event_count.unwrap_or(total))
        } else {
            Dataset::data(&self.name, &self.short_name)
        };
        let dataset = dataset.with_chunks(chunks);
        dataset.validate()?;
        Ok(Some(dataset))
    }
}

/// Loads [`ChunkKind::Events`] chunks straight from Parquet.
///
/// Delta skims need their baseline and are rejected here.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParquetChunkLoader;

impl ChunkLoader for ParquetChunkLoader {
    type Chunk = EventsView;

    fn load(&self, _dataset: &Dataset, chunk: &ChunkRef) -> Result<EventsView> {
        match chunk.kind {
            ChunkKind::Events => read_events_parquet_range(&chunk.path, chunk.entry_start, chunk.entry_stop),
            ChunkKind::SkimDelta => Err(Error::Validation(format!(
                "{} is a delta skim; load it with a baseline-aware loader",
                chunk.path.display()
            ))),
        }
    }

    fn name(&self) -> &str {
        "parquet"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_exact_and_remainder() {
        let c = partition_file(Path::new("a.parquet"), 250, 100, 3, ChunkKind::Events).unwrap();
        assert_eq!(c.len(), 3);
        assert_eq!(c[0].ordinal, 3);
        assert_eq!((c[2].entry_start, c[2].entry_stop), (200, 250));
        assert_eq!(c.iter().map(ChunkRef::entries).sum::<u64>(), 250);

        let c = partition_file(Path::new("a.parquet"), 200, 100, 0, ChunkKind::Events).unwrap();
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn partition_empty_and_bad_step() {
        assert!(partition_file(Path::new("a"), 0, 10, 0, ChunkKind::Events).unwrap().is_empty());
        assert!(partition_file(Path::new("a"), 10, 0, 0, ChunkKind::Events).is_err());
    }

    #[test]
    fn delta_chunks_rejected_by_plain_loader() {
        let ds = Dataset::data("d", "Muon");
        let c = ChunkRef {
            ordinal: 0,
            path: "delta.parquet".into(),
            entry_start: 0,
            entry_stop: 1,
            kind: ChunkKind::SkimDelta,
        };
        assert!(matches!(ParquetChunkLoader.load(&ds, &c), Err(Error::Validation(_))));
    }
}
