//! The renderer seam, rendered outputs and the replot entry point.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use af_hist::{HistDocument, escape_name};
use af_pipeline::RunResults;
use af_pipeline::results::RESULTS_FILE;

use crate::config::RenderConfig;
use crate::stack::StackPlot;
use crate::{RenderError, Result};

/// Suffix of serialized accumulators written next to each plot.
pub const HIST_SUFFIX: &str = ".hist.json";

/// Turns a reduced histogram into a plot artifact.
pub trait PlotRenderer: Send + Sync {
    /// File extension of the artifact, without the dot.
    fn extension(&self) -> &str;

    /// Render one document. Must depend on `doc` and the renderer's own
    /// settings only.
    fn render(&self, doc: &HistDocument) -> Result<Vec<u8>>;
}

/// Stacked data/MC plots as SVG.
#[derive(Debug, Clone, Default)]
pub struct SvgRenderer {
    config: RenderConfig,
}

impl SvgRenderer {
    /// Renderer with the given settings.
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    /// Settings in use.
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Render to an SVG string.
    pub fn render_svg(&self, doc: &HistDocument) -> Result<String> {
        StackPlot::from_document(doc, &self.config)?.render(&self.config)
    }
}

impl PlotRenderer for SvgRenderer {
    fn extension(&self) -> &str {
        "svg"
    }

    fn render(&self, doc: &HistDocument) -> Result<Vec<u8>> {
        Ok(self.render_svg(doc)?.into_bytes())
    }
}

/// Files written for one rendered histogram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedPlot {
    /// Histogram name.
    pub name: String,
    /// Plot artifact.
    pub plot_path: PathBuf,
    /// Serialized reduced accumulator, usable by [`replot`].
    pub hist_path: PathBuf,
}

/// Render `doc` into `out_dir` as `<escaped>.<ext>` plus `<escaped>.hist.json`.
pub fn render_document(renderer: &dyn PlotRenderer, doc: &HistDocument, out_dir: &Path) -> Result<RenderedPlot> {
    doc.validate()?;
    if escape_name(&doc.escaped_name) != doc.escaped_name || doc.escaped_name.is_empty() {
        return Err(RenderError::Document(format!(
            "'{}' is not a usable file name for histogram '{}'",
            doc.escaped_name, doc.name
        )));
    }
    std::fs::create_dir_all(out_dir)?;

    let bytes = renderer.render(doc)?;
    let plot_path = out_dir.join(format!("{}.{}", doc.escaped_name, renderer.extension()));
    std::fs::write(&plot_path, bytes)?;
    let hist_path = out_dir.join(format!("{}{HIST_SUFFIX}", doc.escaped_name));
    doc.write(&hist_path)?;

    tracing::info!(
        hist = %doc.name,
        status = %doc.reduced.completeness(),
        plot = %plot_path.display(),
        "rendered"
    );
    Ok(RenderedPlot { name: doc.name.clone(), plot_path, hist_path })
}

/// Render every document into `out_dir`.
pub fn render_all(renderer: &dyn PlotRenderer, docs: &[HistDocument], out_dir: &Path) -> Result<Vec<RenderedPlot>> {
    docs.iter().map(|d| render_document(renderer, d, out_dir)).collect()
}

/// Reduced histograms stored at `input`.
///
/// `input` may be a `*.hist.json` file, a results file, or a directory holding
/// either a results file or `*.hist.json` files.
pub fn load_documents(input: &Path) -> Result<Vec<HistDocument>> {
    if input.is_dir() {
        let results = input.join(RESULTS_FILE);
        if results.is_file() {
            return Ok(RunResults::read(&results)?.histograms);
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(input)? {
            let path = entry?.path();
            if is_hist_file(&path) {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(RenderError::Document(format!(
                "{} holds neither {RESULTS_FILE} nor *{HIST_SUFFIX} files",
                input.display()
            )));
        }
        files.sort();
        return files.iter().map(|f| Ok(HistDocument::read(f)?)).collect();
    }
    if is_hist_file(input) {
        return Ok(vec![HistDocument::read(input)?]);
    }
    Ok(RunResults::read(input)?.histograms)
}

fn is_hist_file(path: &Path) -> bool {
    path.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.ends_with(HIST_SUFFIX))
}

/// Re-render serialized reduced histograms without touching event data.
pub fn replot(renderer: &dyn PlotRenderer, inputs: &[PathBuf], out_dir: &Path) -> Result<Vec<RenderedPlot>> {
    let mut rendered = Vec::new();
    for input in inputs {
        let docs = load_documents(input)?;
        tracing::info!(input = %input.display(), histograms = docs.len(), "replotting");
        rendered.extend(render_all(renderer, &docs, out_dir)?);
    }
    Ok(rendered)
}
