//! Per-event weights for the selected view of one chunk.

use af_core::{Dataset, Error, Result};
use af_events::EventsView;

/// Weights aligned with the rows of `events`.
///
/// Recorded data gets unit weights. Simulated events get `scale`, times the
/// per-event `generator_weight` field when one is given.
pub fn event_weights(
    events: &EventsView,
    dataset: &Dataset,
    scale: f64,
    generator_weight: Option<&str>,
) -> Result<Vec<f64>> {
    if !dataset.is_simulated {
        return Ok(vec![1.0; events.len()]);
    }
    if !scale.is_finite() {
        return Err(Error::Validation(format!(
            "dataset '{}': non-finite normalization {scale}",
            dataset.name
        )));
    }
    match generator_weight {
        None => Ok(vec![scale; events.len()]),
        Some(field) => {
            let gw = events.field(field)?.to_f64().ok_or_else(|| {
                Error::Data(format!("generator weight field '{field}' is not a flat column"))
            })?;
            Ok(gw.into_iter().map(|w| w * scale).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use af_events::Column;

    fn view() -> EventsView {
        EventsView::from_columns(vec![("genWeight".to_string(), Column::F64(vec![1.0, -1.0]))], None)
            .unwrap()
    }

    #[test]
    fn data_gets_unit_weights() {
        let ds = Dataset::data("Muon_Run2022F", "Muon");
        assert_eq!(event_weights(&view(), &ds, 123.0, Some("genWeight")).unwrap(), vec![1.0, 1.0]);
    }

    #[test]
    fn simulated_scale_and_generator_weight() {
        let ds = Dataset::simulated("TTTo2L2Nu", "TTbar", 1.0, 10);
        assert_eq!(event_weights(&view(), &ds, 0.5, None).unwrap(), vec![0.5, 0.5]);
        assert_eq!(event_weights(&view(), &ds, 0.5, Some("genWeight")).unwrap(), vec![0.5, -0.5]);
        assert!(event_weights(&view(), &ds, 0.5, Some("LHEWeight")).is_err());
    }
}
