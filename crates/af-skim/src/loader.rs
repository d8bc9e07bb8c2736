//! Chunk loading for skimmed datasets, full or delta.

use af_core::{ChunkKind, ChunkLoader, ChunkRef, Dataset, Error, Result};
use af_events::event_parquet::read_events_parquet;
use af_events::{EventsView, ParquetChunkLoader};

use crate::delta::SkimDelta;
use crate::record::sha256_file;

/// Loads full chunks directly and rebuilds delta chunks against their baseline.
///
/// The baseline file must still hash to the value recorded in the delta;
/// anything else is an [`Error::Reconstruction`] and aborts the run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkimAwareLoader {
    events: ParquetChunkLoader,
}

impl SkimAwareLoader {
    /// New loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the whole delta file at `chunk.path`.
    pub fn reconstruct(&self, chunk: &ChunkRef) -> Result<EventsView> {
        let delta = SkimDelta::read(&chunk.path)?;
        let skim = chunk.path.display().to_string();
        let base = &delta.baseline.path;
        if !base.is_file() {
            return Err(Error::Reconstruction {
                skim,
                detail: format!("baseline {} is missing", base.display()),
            });
        }
        let found = sha256_file(base)?;
        if found != delta.baseline.sha256 {
            return Err(Error::Reconstruction {
                skim,
                detail: format!(
                    "baseline {} changed (sha256 {found}, expected {})",
                    base.display(),
                    delta.baseline.sha256
                ),
            });
        }
        let baseline_view = read_events_parquet(base)?;
        delta.reconstruct(&baseline_view).map_err(|e| match e {
            Error::Reconstruction { detail, .. } => Error::Reconstruction { skim, detail },
            other => other,
        })
    }
}

impl ChunkLoader for SkimAwareLoader {
    type Chunk = EventsView;

    fn load(&self, dataset: &Dataset, chunk: &ChunkRef) -> Result<EventsView> {
        match chunk.kind {
            ChunkKind::Events => self.events.load(dataset, chunk),
            ChunkKind::SkimDelta => {
                let full = self.reconstruct(chunk)?;
                let stop = usize::try_from(chunk.entry_stop).unwrap_or(usize::MAX).min(full.len());
                let start = usize::try_from(chunk.entry_start).unwrap_or(usize::MAX).min(stop);
                if start == 0 && stop == full.len() {
                    return Ok(full);
                }
                Ok(full.take(&(start..stop).collect::<Vec<_>>()))
            }
        }
    }

    fn name(&self) -> &str {
        "skim"
    }
}
