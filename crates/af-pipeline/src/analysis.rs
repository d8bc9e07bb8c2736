//! The capability set an analysis provides to the pipeline.

use af_core::Result;
use af_events::{Augmentation, EventsView};
use af_hist::HistogramSpec;

use crate::stage::{Stage, StageContract};

/// An analysis: stages, derived values, histogram specs and skim content.
///
/// Stages are pure functions of their input view and must be total, including
/// over views with zero rows. A stage that cannot handle a chunk returns
/// [`af_core::Error::Data`]; the chunk is then dropped and reported.
pub trait Analysis: Send + Sync {
    /// Analysis name (also names its skim directory).
    fn name(&self) -> &str;

    /// Version recorded in skims; skims of another version are refused.
    fn version(&self) -> &str {
        "1"
    }

    /// Build or clean physics objects.
    fn define_objects(&self, events: EventsView) -> Result<EventsView>;

    /// Coarse event filter applied before skimming.
    fn preselect(&self, events: EventsView) -> Result<EventsView>;

    /// Final event selection.
    fn select(&self, events: EventsView) -> Result<EventsView>;

    /// Values derived from the selected view, shared by every fill.
    fn augment(&self, _events: &EventsView) -> Result<Augmentation> {
        Ok(Augmentation::empty())
    }

    /// Fields a skim keeps so that [`Analysis::select`] and every fill still work.
    fn necessary_fields(&self) -> Vec<String>;

    /// Histograms to produce.
    fn things_to_plot(&self) -> Vec<Box<dyn HistogramSpec>>;

    /// Per-event generator weight field multiplied into simulated weights.
    fn generator_weight(&self) -> Option<&str> {
        None
    }

    /// Contract of a user stage.
    fn contract(&self, stage: Stage) -> StageContract {
        match stage {
            Stage::DefineObjects => StageContract::Rewrite,
            Stage::Preselect => StageContract::Filter,
            Stage::Minify => StageContract::Rewrite,
            Stage::Select => StageContract::FilterAndRewrite,
        }
    }
}
