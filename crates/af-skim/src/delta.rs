//! Skims stored as a difference against a baseline skim.
//!
//! A delta keeps the indices of the baseline rows that survive, the fields
//! whose values differ from (or are absent in) the baseline, the baseline
//! fields that were dropped, and the output field order. Rebuilding needs the
//! exact baseline file, identified by its SHA-256.

use std::collections::HashMap;
use std::path::Path;

use af_core::{Error, Result};
use af_events::event_parquet::{read_events_parquet, read_schema_metadata, write_events_parquet};
use af_events::{Column, EventsView};

use crate::record::BaselineSkimRecord;

/// Reserved column with the surviving baseline row index of each row.
pub const BASELINE_ROW_COLUMN: &str = "_baseline_row";

const META_KEY_BASELINE: &str = "afw.delta.baseline";
const META_KEY_BASELINE_SHA256: &str = "afw.delta.baseline_sha256";
const META_KEY_BASELINE_ROWS: &str = "afw.delta.baseline_rows";
const META_KEY_DROPPED: &str = "afw.delta.dropped";
const META_KEY_FIELD_ORDER: &str = "afw.delta.field_order";

/// Difference between a baseline skim chunk and a narrower skim of the same chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct SkimDelta {
    /// Baseline identity.
    pub baseline: BaselineSkimRecord,
    /// Baseline row index of every output row.
    pub rows: Vec<u64>,
    /// Fields that cannot be taken from the baseline, aligned with `rows`.
    /// Its entries are the entries of the rebuilt view.
    pub altered: EventsView,
    /// Baseline fields absent from the output.
    pub dropped: Vec<String>,
    /// Output field order.
    pub field_order: Vec<String>,
}

impl SkimDelta {
    /// Express `events` against `baseline_view`.
    ///
    /// Every row of `events` must come from a baseline row (matched by source
    /// entry); a row the baseline does not have is a data error.
    pub fn diff(
        baseline: BaselineSkimRecord,
        baseline_view: &EventsView,
        events: &EventsView,
    ) -> Result<Self> {
        let mut by_entry = HashMap::with_capacity(baseline_view.len());
        for (i, &e) in baseline_view.entries().iter().enumerate() {
            if by_entry.insert(e, i).is_some() {
                return Err(Error::Data(format!("baseline repeats entry {e}")));
            }
        }
        let idx = events
            .entries()
            .iter()
            .map(|e| {
                by_entry.get(e).copied().ok_or_else(|| {
                    Error::Data(format!(
                        "entry {e} is not in baseline {}; a delta can only narrow its baseline",
                        baseline.path.display()
                    ))
                })
            })
            .collect::<Result<Vec<usize>>>()?;

        let mut altered = EventsView::with_entries(events.entries().to_vec());
        for (name, col) in events.iter() {
            let same = baseline_view.field(name).map(|b| b.take(&idx) == *col).unwrap_or(false);
            if !same {
                altered = altered.with_field(name, col.clone())?;
            }
        }
        if altered.has_field(BASELINE_ROW_COLUMN) {
            return Err(Error::Data(format!("field name '{BASELINE_ROW_COLUMN}' is reserved")));
        }
        let dropped = baseline_view
            .field_names()
            .iter()
            .filter(|f| !events.has_field(f))
            .cloned()
            .collect();

        Ok(Self {
            baseline,
            rows: idx.into_iter().map(|i| i as u64).collect(),
            altered,
            dropped,
            field_order: events.field_names().to_vec(),
        })
    }

    /// Rows of the rebuilt view.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the rebuilt view is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rebuild the skimmed view. Pure: the same inputs always give the same view.
    pub fn reconstruct(&self, baseline_view: &EventsView) -> Result<EventsView> {
        let broken = |detail: String| Error::Reconstruction {
            skim: self.baseline.path.display().to_string(),
            detail,
        };
        if baseline_view.len() as u64 != self.baseline.rows {
            return Err(broken(format!(
                "baseline has {} rows, delta expects {}",
                baseline_view.len(),
                self.baseline.rows
            )));
        }
        let idx = self
            .rows
            .iter()
            .map(|&r| {
                usize::try_from(r)
                    .ok()
                    .filter(|&i| i < baseline_view.len())
                    .ok_or_else(|| broken(format!("baseline row {r} out of range")))
            })
            .collect::<Result<Vec<usize>>>()?;
        let taken = baseline_view.take(&idx);
        if taken.entries() != self.altered.entries() {
            return Err(broken("surviving baseline rows carry different entries".into()));
        }

        let mut columns = Vec::with_capacity(self.field_order.len());
        for name in &self.field_order {
            let col = if self.altered.has_field(name) {
                self.altered.field(name)?.clone()
            } else if self.dropped.contains(name) {
                return Err(broken(format!("field '{name}' is both kept and dropped")));
            } else {
                taken
                    .field(name)
                    .map_err(|_| broken(format!("baseline lacks field '{name}'")))?
                    .clone()
            };
            columns.push((name.clone(), col));
        }
        EventsView::from_columns(columns, Some(taken.entries().to_vec()))
    }

    /// Write as Parquet: altered fields, [`BASELINE_ROW_COLUMN`], and the rest in
    /// schema metadata next to `metadata`.
    pub fn write(&self, path: &Path, metadata: &HashMap<String, String>) -> Result<()> {
        let rows = self
            .rows
            .iter()
            .map(|&r| i64::try_from(r))
            .collect::<std::result::Result<Vec<i64>, _>>()
            .map_err(|_| Error::Data("baseline row index exceeds i64".into()))?;
        let view = self.altered.clone().with_field(BASELINE_ROW_COLUMN, Column::I64(rows))?;

        let mut meta = metadata.clone();
        meta.insert(META_KEY_BASELINE.into(), self.baseline.path.display().to_string());
        meta.insert(META_KEY_BASELINE_SHA256.into(), self.baseline.sha256.clone());
        meta.insert(META_KEY_BASELINE_ROWS.into(), self.baseline.rows.to_string());
        meta.insert(META_KEY_DROPPED.into(), serde_json::to_string(&self.dropped)?);
        meta.insert(META_KEY_FIELD_ORDER.into(), serde_json::to_string(&self.field_order)?);
        write_events_parquet(&view, path, &meta)
    }

    /// Read a delta written by [`SkimDelta::write`].
    pub fn read(path: &Path) -> Result<Self> {
        let meta = read_schema_metadata(path)?;
        let broken = |detail: String| Error::Reconstruction { skim: path.display().to_string(), detail };
        let get = |key: &str| {
            meta.get(key).ok_or_else(|| broken(format!("missing delta metadata '{key}'")))
        };
        let baseline = BaselineSkimRecord {
            path: get(META_KEY_BASELINE)?.into(),
            sha256: get(META_KEY_BASELINE_SHA256)?.clone(),
            rows: get(META_KEY_BASELINE_ROWS)?
                .parse()
                .map_err(|e| broken(format!("bad baseline row count: {e}")))?,
        };
        let dropped: Vec<String> = serde_json::from_str(get(META_KEY_DROPPED)?)?;
        let field_order: Vec<String> = serde_json::from_str(get(META_KEY_FIELD_ORDER)?)?;

        let view = read_events_parquet(path)?;
        let rows = view
            .i64s(BASELINE_ROW_COLUMN)
            .map_err(|_| broken(format!("missing column '{BASELINE_ROW_COLUMN}'")))?
            .iter()
            .map(|&r| u64::try_from(r).map_err(|_| broken(format!("negative baseline row {r}"))))
            .collect::<Result<Vec<u64>>>()?;
        let altered = view.drop_field(BASELINE_ROW_COLUMN)?;
        Ok(Self { baseline, rows, altered, dropped, field_order })
    }
}
