//! Core traits for afw
//!
//! The executor only sees chunks through [`ChunkLoader`], so the columnar
//! representation and the storage layout (raw files, full skims, delta skims
//! rebuilt against a baseline) can change without touching the pipeline.

use crate::Result;
use crate::types::{ChunkRef, Dataset};

/// Reads one chunk of a dataset into memory.
///
/// Errors confined to the chunk must be reported as chunk-local variants
/// ([`crate::Error::Storage`], [`crate::Error::Data`]); fatal variants abort the run.
pub trait ChunkLoader: Send + Sync {
    /// In-memory chunk representation.
    type Chunk;

    /// Load `chunk` of `dataset`.
    fn load(&self, dataset: &Dataset, chunk: &ChunkRef) -> Result<Self::Chunk>;

    /// Loader name for logs.
    fn name(&self) -> &str;
}
