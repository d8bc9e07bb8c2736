//! # af-pipeline
//!
//! The columnar event pipeline: stage composition, per-chunk execution and
//! reduction.
//!
//! ```text
//! Dataset ─▶ chunks ─▶ [parallel] ChunkExecutor ─▶ Reducer (merge tree) ─▶ RunResults
//!                       define → preselect → select → augment → weights → fill
//! ```
//!
//! - [`Analysis`] is the capability set an analysis provides.
//! - [`Pipeline::compose`] fixes stage order and checks stage contracts.
//! - [`Reducer`] merges per-chunk accumulators in a fixed-shape binary tree,
//!   so results do not depend on chunk completion order.
//! - [`Runner`] drives chunks on a rayon pool with failure isolation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod analysis;
pub mod pipeline;
pub mod reducer;
pub mod results;
pub mod runner;
pub mod stage;
pub mod weights;

pub use analysis::Analysis;
pub use pipeline::{ChunkOutput, Pipeline};
pub use reducer::{MergeTree, Reduced, Reducer};
pub use results::{ChunkFailure, DatasetReport, RESULTS_SCHEMA_V1, RunReport, RunResults};
pub use runner::{RunOptions, Runner};
pub use stage::{Stage, StageContract};
