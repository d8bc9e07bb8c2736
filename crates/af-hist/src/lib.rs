//! # af-hist
//!
//! Histogram accumulators for the afw pipeline.
//!
//! A [`Hist`] is a growable category axis (sample short names) crossed with
//! one value [`Axis`], with weighted storage. Merging is associative and
//! commutative; merging accumulators of different shape is a schema mismatch.
//!
//! Lifecycle of a histogram, encoded in types:
//! - declared: a [`HistogramSpec`] implementation;
//! - created / filling: [`HistogramSpec::create`] then [`HistogramSpec::fill`] on a [`Hist`];
//! - reduced: an immutable [`ReducedHist`] carrying its [`af_core::Completeness`];
//! - rendered: see `af-viz`.
//!
//! [`io`] holds the schema-versioned JSON form used for replotting.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod axis;
pub mod hist;
pub mod io;
pub mod spec;

pub use axis::{Axis, BinIndex};
pub use hist::{Bins, Hist, ReducedHist};
pub use io::{HIST_SCHEMA_V1, HistDocument};
pub use spec::{HistogramSpec, PlotStyle, SampleRoles, escape_name};
