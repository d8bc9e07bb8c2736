//! Stage roles and their row/field contracts.

use std::fmt;

use serde::{Deserialize, Serialize};

use af_core::{Error, Result};
use af_events::EventsView;

/// Pipeline stage roles, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Build or clean physics objects.
    DefineObjects,
    /// Coarse event filter shared by skims and full runs.
    Preselect,
    /// Project to the analysis' necessary fields (skims only).
    Minify,
    /// Final event selection.
    Select,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::DefineObjects => "define_objects",
            Stage::Preselect => "preselect",
            Stage::Minify => "minify",
            Stage::Select => "select",
        };
        f.write_str(s)
    }
}

/// What a stage may do to its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageContract {
    /// Drops rows; fields untouched.
    Filter,
    /// Changes fields; every row kept.
    Rewrite,
    /// May drop rows and change fields.
    FilterAndRewrite,
}

impl fmt::Display for StageContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageContract::Filter => "filter",
            StageContract::Rewrite => "rewrite",
            StageContract::FilterAndRewrite => "filter-and-rewrite",
        };
        f.write_str(s)
    }
}

impl StageContract {
    /// Whether the contract keeps every row.
    pub fn preserves_rows(&self) -> bool {
        matches!(self, StageContract::Rewrite)
    }

    /// Verify `output` against `input` for stage `stage`.
    ///
    /// Row order must be stable: output rows are a subsequence of input rows
    /// (by source entry). Violations are data errors for the chunk.
    pub fn check(&self, stage: Stage, input: &EventsView, output: &EventsView) -> Result<()> {
        self.check_shape(stage, input.entries(), input.field_names(), output)
    }

    /// [`StageContract::check`] against the recorded entries and field names of the input.
    pub fn check_shape(
        &self,
        stage: Stage,
        entries_in: &[u64],
        fields_in: &[String],
        output: &EventsView,
    ) -> Result<()> {
        let violation = |what: String| {
            Error::Data(format!("stage '{stage}' violated its {self} contract: {what}"))
        };
        match self {
            StageContract::Rewrite => {
                if output.entries() != entries_in {
                    return Err(violation(format!(
                        "{} rows in, {} rows out",
                        entries_in.len(),
                        output.len()
                    )));
                }
            }
            StageContract::Filter | StageContract::FilterAndRewrite => {
                if !is_subsequence(output.entries(), entries_in) {
                    return Err(violation("output rows are not an ordered subset of the input".into()));
                }
            }
        }
        if *self == StageContract::Filter && output.field_names() != fields_in {
            return Err(violation(format!(
                "fields changed from {:?} to {:?}",
                fields_in,
                output.field_names()
            )));
        }
        Ok(())
    }
}

fn is_subsequence(sub: &[u64], of: &[u64]) -> bool {
    let mut it = of.iter();
    sub.iter().all(|s| it.any(|o| o == s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use af_events::Column;

    fn view() -> EventsView {
        EventsView::from_columns(
            vec![("MET_pt".to_string(), Column::F64(vec![1.0, 2.0, 3.0]))],
            Some(vec![10, 11, 12]),
        )
        .unwrap()
    }

    #[test]
    fn filter_contract() {
        let v = view();
        let kept = v.filter(&[true, false, true]).unwrap();
        assert!(StageContract::Filter.check(Stage::Preselect, &v, &kept).is_ok());

        let rewritten = kept.clone().with_field("x", Column::F64(vec![0.0, 0.0])).unwrap();
        let err = StageContract::Filter.check(Stage::Preselect, &v, &rewritten).unwrap_err();
        assert!(err.to_string().contains("preselect"));
        assert!(StageContract::FilterAndRewrite.check(Stage::Select, &v, &rewritten).is_ok());
    }

    #[test]
    fn rewrite_contract() {
        let v = view();
        let extra = v.clone().with_field("x", Column::F64(vec![0.0; 3])).unwrap();
        assert!(StageContract::Rewrite.check(Stage::DefineObjects, &v, &extra).is_ok());
        let fewer = v.filter(&[true, true, false]).unwrap();
        assert!(matches!(
            StageContract::Rewrite.check(Stage::DefineObjects, &v, &fewer),
            Err(Error::Data(_))
        ));
    }

    #[test]
    fn reordering_is_rejected() {
        let v = view();
        let reversed = v.take(&[2, 0]);
        assert!(StageContract::FilterAndRewrite.check(Stage::Select, &v, &reversed).is_err());
    }

    #[test]
    fn stage_order() {
        assert!(Stage::DefineObjects < Stage::Preselect);
        assert!(Stage::Preselect < Stage::Minify);
        assert_eq!(Stage::Select.to_string(), "select");
    }
}
