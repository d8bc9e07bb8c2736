//! # af-events
//!
//! Chunk-scoped columnar event data for the afw pipeline.
//!
//! This crate provides:
//! - [`Column`] / [`Jagged`]: flat and per-event variable-length columns.
//! - [`EventsView`]: a structure-of-arrays view over one chunk, with masking,
//!   projection and per-collection element filtering. Every row remembers the
//!   source entry it came from.
//! - [`Augmentation`]: immutable per-chunk values derived after selection.
//! - [`event_parquet`]: the `afw_events_v1` Parquet schema and read/write helpers.
//! - [`source`]: entry counting, step-size chunk partitioning and the
//!   [`source::ParquetChunkLoader`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod augment;
pub mod column;
pub mod event_parquet;
pub mod source;
pub mod view;

pub use augment::{AugValue, Augmentation};
pub use column::{Column, Jagged};
pub use source::{ParquetChunkLoader, partition_file, partition_files};
pub use view::EventsView;
