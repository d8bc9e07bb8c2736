//! # af-core
//!
//! Shared vocabulary for the afw columnar event pipeline.
//!
//! This crate provides:
//! - The run-wide [`Error`] taxonomy and its chunk-local / fatal classification.
//! - Dataset handles and chunk references ([`Dataset`], [`ChunkRef`]).
//! - Chunk completeness bookkeeping ([`ChunkTally`], [`Completeness`]).
//! - Event-weight normalization under optional chunk limits ([`normalize`]).
//! - The [`ChunkLoader`] seam used by the executor to read chunks.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod normalize;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use normalize::{ChunkLimit, DEFAULT_LUMINOSITY_PB, Normalization, NormalizationReport};
pub use traits::ChunkLoader;
pub use types::{ChunkKind, ChunkRef, ChunkTally, Completeness, Dataset, SkimCoverage};
