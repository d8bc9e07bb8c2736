//! # af-skim
//!
//! Skims: chunks that went through object definition, preselection and
//! minification, persisted so later runs can start from them.
//!
//! ```text
//! <root>/<analysis>/<dataset>/part-00000.parquet   full skim of chunk 0
//!                             part-00000.json      its SkimRecord
//!                             manifest.json        every record of the dataset
//! <root>/<analysis>/merged/<dataset>.parquet       after merge_skims
//! ```
//!
//! - [`SkimStorage`] pairs a [`StorageLocation`] with an [`ExecutionScope`] and
//!   rejects node-local storage for multi-node execution.
//! - [`SkimWriter`] runs the skim stages per chunk and writes parts atomically,
//!   optionally as a [`SkimDelta`] against a baseline skim.
//! - [`SkimAwareLoader`] loads both kinds of parts, rebuilding deltas against
//!   their (hash-checked) baseline.
//! - [`merge_skims`] and [`convert_to_skimmed`] turn skims back into datasets.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod delta;
pub mod loader;
pub mod merge;
pub mod record;
pub mod skimmed;
pub mod storage;
pub mod writer;

pub use delta::SkimDelta;
pub use loader::SkimAwareLoader;
pub use merge::{MergeOutcome, MergedDataset, merge_skims};
pub use record::{BaselineSkimRecord, SKIM_SCHEMA_V1, SkimKind, SkimManifest, SkimRecord, sha256_file};
pub use skimmed::{convert_to_skimmed, escape_dataset_name};
pub use storage::{ExecutionScope, SkimStorage, StorageLocation};
pub use writer::{SkimOptions, SkimOutcome, SkimStatus, SkimWriter};
