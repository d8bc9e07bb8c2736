//! # af-viz
//!
//! SVG rendering of reduced histograms: a stacked simulation plot with
//! overlaid signal, data points and a data/MC ratio panel, CMS-style header.
//!
//! [`render_document`] writes the plot together with the serialized
//! accumulator; [`replot`] starts again from that file (or a run's
//! `results.json`) and produces byte-identical output for the same settings.

#![warn(clippy::all)]

pub mod axes;
pub mod canvas;
pub mod color;
pub mod config;
pub mod layout;
pub mod primitives;
pub mod render;
pub mod stack;

use thiserror::Error;

pub use config::{ExperimentConfig, RenderConfig};
pub use render::{
    HIST_SUFFIX, PlotRenderer, RenderedPlot, SvgRenderer, load_documents, render_all, render_document, replot,
};
pub use stack::StackPlot;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Hist(#[from] af_core::Error),
    #[error("deserialization error: {0}")]
    Deserialize(#[from] serde_json::Error),
    #[error("invalid histogram document: {0}")]
    Document(String),
    #[error("layout error: {0}")]
    Layout(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RenderError>;
