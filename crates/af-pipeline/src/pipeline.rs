//! Stage composition and per-chunk execution.

use std::collections::HashSet;
use std::sync::Arc;

use af_core::{Dataset, Error, Result};
use af_events::EventsView;
use af_hist::{Hist, HistogramSpec};

use crate::analysis::Analysis;
use crate::stage::Stage;
use crate::weights::event_weights;

/// Stages of a full run over raw inputs.
pub const RUN_STAGES: &[Stage] = &[Stage::DefineObjects, Stage::Preselect, Stage::Select];

/// Stages of a full run over skimmed inputs.
pub const SKIMMED_RUN_STAGES: &[Stage] = &[Stage::Select];

/// Stages of a skim.
pub const SKIM_STAGES: &[Stage] = &[Stage::DefineObjects, Stage::Preselect, Stage::Minify];

/// Per-chunk result handed to the reducer.
#[derive(Debug, Clone)]
pub struct ChunkOutput {
    /// One filled accumulator per spec, in spec order.
    pub hists: Vec<Hist>,
    /// Rows loaded from storage.
    pub rows_in: usize,
    /// Rows left after selection.
    pub rows_selected: usize,
}

/// An analysis checked and ready to run.
pub struct Pipeline {
    analysis: Arc<dyn Analysis>,
    specs: Vec<Box<dyn HistogramSpec>>,
    necessary: Vec<String>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("analysis", &self.analysis.name())
            .field("specs", &self.spec_names())
            .field("necessary", &self.necessary)
            .finish()
    }
}

impl Pipeline {
    /// Compose and validate.
    ///
    /// Rejects duplicate histogram names (or output file names), duplicate
    /// necessary fields, axes that fail validation, and a minification
    /// contract that would drop rows.
    pub fn compose(analysis: Arc<dyn Analysis>) -> Result<Self> {
        let specs = analysis.things_to_plot();
        let mut names = HashSet::new();
        let mut files = HashSet::new();
        for s in &specs {
            if s.name().trim().is_empty() {
                return Err(Error::Validation("histogram spec with empty name".into()));
            }
            if !names.insert(s.name().to_string()) {
                return Err(Error::Validation(format!("duplicate histogram name '{}'", s.name())));
            }
            if !files.insert(s.escaped_name()) {
                return Err(Error::Validation(format!(
                    "histogram '{}' maps to an output name already in use ('{}')",
                    s.name(),
                    s.escaped_name()
                )));
            }
            s.create()?;
        }

        let necessary = analysis.necessary_fields();
        let mut seen = HashSet::new();
        if let Some(dup) = necessary.iter().find(|f| !seen.insert(f.as_str())) {
            return Err(Error::Validation(format!("necessary field '{dup}' listed twice")));
        }

        if !analysis.contract(Stage::Minify).preserves_rows() {
            return Err(Error::Validation(format!(
                "analysis '{}': minification must keep every row",
                analysis.name()
            )));
        }

        tracing::debug!(
            analysis = analysis.name(),
            specs = specs.len(),
            necessary = necessary.len(),
            "pipeline composed"
        );
        Ok(Self { analysis, specs, necessary })
    }

    /// The analysis.
    pub fn analysis(&self) -> &dyn Analysis {
        self.analysis.as_ref()
    }

    /// Histogram specs, in declaration order.
    pub fn specs(&self) -> &[Box<dyn HistogramSpec>] {
        &self.specs
    }

    /// Histogram names, in declaration order.
    pub fn spec_names(&self) -> Vec<&str> {
        self.specs.iter().map(|s| s.name()).collect()
    }

    /// Fields kept by minification.
    pub fn necessary_fields(&self) -> &[String] {
        &self.necessary
    }

    /// Project to the necessary fields; row count is unchanged.
    pub fn minify(&self, events: EventsView) -> Result<EventsView> {
        events.project(&self.necessary)
    }

    /// Apply one stage and enforce its contract.
    pub fn apply(&self, stage: Stage, events: EventsView) -> Result<EventsView> {
        let entries_in = events.entries().to_vec();
        let fields_in = events.field_names().to_vec();
        let out = match stage {
            Stage::DefineObjects => self.analysis.define_objects(events),
            Stage::Preselect => self.analysis.preselect(events),
            Stage::Minify => self.minify(events),
            Stage::Select => self.analysis.select(events),
        }
        .map_err(|e| match e {
            Error::Data(msg) => Error::Data(format!("{stage}: {msg}")),
            other => other,
        })?;
        self.analysis.contract(stage).check_shape(stage, &entries_in, &fields_in, &out)?;
        Ok(out)
    }

    /// Apply `stages` in order.
    pub fn run_stages(&self, events: EventsView, stages: &[Stage]) -> Result<EventsView> {
        stages.iter().try_fold(events, |ev, &stage| self.apply(stage, ev))
    }

    /// Object definition, preselection and minification of one chunk.
    pub fn skim_chunk(&self, events: EventsView) -> Result<EventsView> {
        self.run_stages(events, SKIM_STAGES)
    }

    /// Run one chunk end to end and fill every spec.
    ///
    /// Accumulators are built privately; nothing is returned unless every
    /// stage and every fill succeeded.
    pub fn execute_chunk(
        &self,
        events: EventsView,
        dataset: &Dataset,
        scale: f64,
    ) -> Result<ChunkOutput> {
        let rows_in = events.len();
        let stages = if dataset.skimmed { SKIMMED_RUN_STAGES } else { RUN_STAGES };
        let selected = self.run_stages(events, stages)?;

        let weights = event_weights(&selected, dataset, scale, self.analysis.generator_weight())?;
        let augmentation = self
            .analysis
            .augment(&selected)
            .map_err(|e| match e {
                Error::Data(msg) => Error::Data(format!("augment: {msg}")),
                other => other,
            })?;
        augmentation.check_rows(selected.len())?;

        let mut hists = Vec::with_capacity(self.specs.len());
        for spec in &self.specs {
            let mut h = spec.create()?;
            spec.fill(&mut h, &selected, &dataset.short_name, &weights, &augmentation)
                .map_err(|e| match e {
                    Error::Data(msg) => Error::Data(format!("fill '{}': {msg}", spec.name())),
                    other => other,
                })?;
            hists.push(h);
        }
        Ok(ChunkOutput { hists, rows_in, rows_selected: selected.len() })
    }
}
