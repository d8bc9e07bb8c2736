//! Chunk-scoped columnar view over events.

use std::collections::HashMap;

use af_core::{Error, Result};

use crate::column::{Column, Jagged};

/// Columnar events of one chunk (Structure-of-Arrays).
///
/// Field order is preserved. Rows keep their source entry number in
/// [`EventsView::entries`], so any row subset can be traced back to the file
/// it came from. Operations never reorder rows.
#[derive(Debug, Clone, PartialEq)]
pub struct EventsView {
    n_rows: usize,
    names: Vec<String>,
    columns: Vec<Column>,
    name_to_index: HashMap<String, usize>,
    entries: Vec<u64>,
}

impl EventsView {
    /// A view with `entries.len()` rows and no fields.
    pub fn with_entries(entries: Vec<u64>) -> Self {
        Self {
            n_rows: entries.len(),
            names: Vec::new(),
            columns: Vec::new(),
            name_to_index: HashMap::new(),
            entries,
        }
    }

    /// Build from named columns. Entry numbers default to `0..n`.
    pub fn from_columns(
        columns: impl IntoIterator<Item = (String, Column)>,
        entries: Option<Vec<u64>>,
    ) -> Result<Self> {
        let columns: Vec<(String, Column)> = columns.into_iter().collect();
        let n_rows = match (&entries, columns.first()) {
            (Some(e), _) => e.len(),
            (None, Some((_, c))) => c.len(),
            (None, None) => 0,
        };
        let entries = entries.unwrap_or_else(|| (0..n_rows as u64).collect());
        let mut view = Self::with_entries(entries);
        for (name, col) in columns {
            if view.name_to_index.contains_key(&name) {
                return Err(Error::Data(format!("duplicate field '{name}'")));
            }
            view = view.with_field(name, col)?;
        }
        Ok(view)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.n_rows
    }

    /// `true` when the view has no rows.
    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    /// Field names in order.
    pub fn field_names(&self) -> &[String] {
        &self.names
    }

    /// Whether `name` is a field.
    pub fn has_field(&self, name: &str) -> bool {
        self.name_to_index.contains_key(name)
    }

    /// Source entry number of each row.
    pub fn entries(&self) -> &[u64] {
        &self.entries
    }

    /// Iterate `(name, column)` in field order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter())
    }

    /// Column by name; a missing field is a data error.
    pub fn field(&self, name: &str) -> Result<&Column> {
        self.name_to_index
            .get(name)
            .map(|&i| &self.columns[i])
            .ok_or_else(|| Error::Data(format!("missing field '{name}'")))
    }

    /// Flat float column.
    pub fn f64s(&self, name: &str) -> Result<&[f64]> {
        match self.field(name)? {
            Column::F64(v) => Ok(v),
            other => Err(type_error(name, "f64", other)),
        }
    }

    /// Flat integer column.
    pub fn i64s(&self, name: &str) -> Result<&[i64]> {
        match self.field(name)? {
            Column::I64(v) => Ok(v),
            other => Err(type_error(name, "i64", other)),
        }
    }

    /// Flat boolean column.
    pub fn bools(&self, name: &str) -> Result<&[bool]> {
        match self.field(name)? {
            Column::Bool(v) => Ok(v),
            other => Err(type_error(name, "bool", other)),
        }
    }

    /// Jagged collection column.
    pub fn jagged(&self, name: &str) -> Result<&Jagged> {
        match self.field(name)? {
            Column::Jagged(j) => Ok(j),
            other => Err(type_error(name, "jagged<f64>", other)),
        }
    }

    /// Add or replace a field. Replacement keeps the field's position.
    pub fn with_field(mut self, name: impl Into<String>, column: Column) -> Result<Self> {
        let name = name.into();
        if column.len() != self.n_rows {
            return Err(Error::Data(format!(
                "field '{name}' has {} rows, view has {}",
                column.len(),
                self.n_rows
            )));
        }
        if let Some(&i) = self.name_to_index.get(&name) {
            self.columns[i] = column;
        } else {
            self.name_to_index.insert(name.clone(), self.names.len());
            self.names.push(name);
            self.columns.push(column);
        }
        Ok(self)
    }

    /// Remove a field.
    pub fn drop_field(mut self, name: &str) -> Result<Self> {
        let i = self
            .name_to_index
            .remove(name)
            .ok_or_else(|| Error::Data(format!("cannot drop missing field '{name}'")))?;
        self.names.remove(i);
        self.columns.remove(i);
        self.reindex();
        Ok(self)
    }

    /// Rows where `mask` is `true`.
    pub fn filter(&self, mask: &[bool]) -> Result<Self> {
        if mask.len() != self.n_rows {
            return Err(Error::Data(format!(
                "mask has {} entries, view has {} rows",
                mask.len(),
                self.n_rows
            )));
        }
        let rows: Vec<usize> = mask.iter().enumerate().filter_map(|(i, &m)| m.then_some(i)).collect();
        Ok(self.take(&rows))
    }

    /// Rows at `rows` (must be increasing to keep row order stable).
    pub fn take(&self, rows: &[usize]) -> Self {
        Self {
            n_rows: rows.len(),
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.take(rows)).collect(),
            name_to_index: self.name_to_index.clone(),
            entries: rows.iter().map(|&r| self.entries[r]).collect(),
        }
    }

    /// Keep exactly `fields`, in the given order.
    pub fn project<S: AsRef<str>>(&self, fields: &[S]) -> Result<Self> {
        let mut out = Self::with_entries(self.entries.clone());
        for f in fields {
            let f = f.as_ref();
            out = out.with_field(f, self.field(f)?.clone())?;
        }
        Ok(out)
    }

    /// Filter the objects of collection `prefix` (all jagged `<prefix>_*` fields).
    ///
    /// `mask` is flat over the collection's objects. The fields must share offsets.
    /// An `n<prefix>` integer count field, when present, is updated.
    pub fn filter_collection(mut self, prefix: &str, mask: &[bool]) -> Result<Self> {
        let head = format!("{prefix}_");
        let members: Vec<usize> = self
            .names
            .iter()
            .enumerate()
            .filter(|(i, n)| n.starts_with(&head) && matches!(self.columns[*i], Column::Jagged(_)))
            .map(|(i, _)| i)
            .collect();
        if members.is_empty() {
            return Err(Error::Data(format!("no collection '{prefix}' in view")));
        }
        let mut counts = None;
        let mut shape: Option<Vec<usize>> = None;
        for i in members {
            let Column::Jagged(j) = &self.columns[i] else { continue };
            match &shape {
                Some(s) if s.as_slice() != j.offsets() => {
                    return Err(Error::Data(format!(
                        "collection '{prefix}': field '{}' is not aligned with its siblings",
                        self.names[i]
                    )));
                }
                Some(_) => {}
                None => shape = Some(j.offsets().to_vec()),
            }
            let filtered = j.filter_elements(mask).map_err(|e| {
                Error::Data(format!("collection '{prefix}', field '{}': {e}", self.names[i]))
            })?;
            counts.get_or_insert_with(|| filtered.counts());
            self.columns[i] = Column::Jagged(filtered);
        }
        let count_field = format!("n{prefix}");
        if let (Some(&i), Some(counts)) = (self.name_to_index.get(&count_field), counts)
            && matches!(self.columns[i], Column::I64(_))
        {
            self.columns[i] = Column::I64(counts.into_iter().map(|c| c as i64).collect());
        }
        Ok(self)
    }

    /// Concatenate views with identical field lists.
    pub fn concat(views: &[EventsView]) -> Result<Self> {
        let Some(first) = views.first() else {
            return Ok(Self::with_entries(Vec::new()));
        };
        let mut out = first.clone();
        for v in &views[1..] {
            if v.names != out.names {
                return Err(Error::Data(format!(
                    "cannot concatenate views with fields {:?} and {:?}",
                    out.names, v.names
                )));
            }
            for (a, b) in out.columns.iter_mut().zip(&v.columns) {
                a.append(b)?;
            }
            out.entries.extend_from_slice(&v.entries);
            out.n_rows += v.n_rows;
        }
        Ok(out)
    }

    fn reindex(&mut self) {
        self.name_to_index = self.names.iter().enumerate().map(|(i, n)| (n.clone(), i)).collect();
    }
}

fn type_error(name: &str, expected: &str, got: &Column) -> Error {
    Error::Data(format!("field '{name}' is {}, expected {expected}", got.type_name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EventsView {
        EventsView::from_columns(
            vec![
                ("MET_pt".to_string(), Column::F64(vec![10.0, 20.0, 30.0])),
                ("nJet".to_string(), Column::I64(vec![2, 1, 0])),
                ("Jet_pt".to_string(), Column::Jagged(Jagged::from_lists([vec![50.0, 25.0], vec![40.0], vec![]]))),
                ("Jet_eta".to_string(), Column::Jagged(Jagged::from_lists([vec![0.1, 3.0], vec![-1.0], vec![]]))),
            ],
            Some(vec![100, 101, 102]),
        )
        .unwrap()
    }

    #[test]
    fn missing_field_is_data_error() {
        let v = sample();
        let err = v.field("Muon_pt").unwrap_err();
        assert!(matches!(err, Error::Data(_)));
        assert!(v.f64s("nJet").is_err());
    }

    #[test]
    fn filter_keeps_provenance_and_order() {
        let v = sample().filter(&[true, false, true]).unwrap();
        assert_eq!(v.len(), 2);
        assert_eq!(v.entries(), &[100, 102]);
        assert_eq!(v.f64s("MET_pt").unwrap(), &[10.0, 30.0]);
        assert_eq!(v.field_names(), sample().field_names());
    }

    #[test]
    fn empty_view_is_total() {
        let v = sample().filter(&[false, false, false]).unwrap();
        assert!(v.is_empty());
        let v = v.filter(&[]).unwrap();
        assert_eq!(v.jagged("Jet_pt").unwrap().len(), 0);
        let v = v.filter_collection("Jet", &[]).unwrap();
        assert!(v.is_empty());
    }

    #[test]
    fn with_field_replaces_in_place() {
        let v = sample().with_field("nJet", Column::I64(vec![9, 9, 9])).unwrap();
        assert_eq!(v.field_names()[1], "nJet");
        assert!(sample().with_field("x", Column::F64(vec![1.0])).is_err());
    }

    #[test]
    fn project_exact_fields() {
        let v = sample().project(&["Jet_pt", "MET_pt"]).unwrap();
        assert_eq!(v.field_names(), &["Jet_pt".to_string(), "MET_pt".to_string()]);
        assert_eq!(v.len(), 3);
        assert!(sample().project(&["nope"]).is_err());
    }

    #[test]
    fn drop_field_reindexes() {
        let v = sample().drop_field("MET_pt").unwrap();
        assert_eq!(v.i64s("nJet").unwrap(), &[2, 1, 0]);
        assert!(v.clone().drop_field("MET_pt").is_err());
    }

    #[test]
    fn filter_collection_updates_count() {
        let v = sample();
        let pt = v.jagged("Jet_pt").unwrap();
        let mask: Vec<bool> = pt.values().iter().map(|&p| p > 30.0).collect();
        let v = v.filter_collection("Jet", &mask).unwrap();
        assert_eq!(v.jagged("Jet_eta").unwrap(), &Jagged::from_lists([vec![0.1], vec![-1.0], vec![]]));
        assert_eq!(v.i64s("nJet").unwrap(), &[1, 1, 0]);
        assert!(v.filter_collection("Muon", &[]).is_err());
    }

    #[test]
    fn concat_views() {
        let a = sample();
        let b = sample().filter(&[false, true, false]).unwrap();
        let c = EventsView::concat(&[a, b]).unwrap();
        assert_eq!(c.len(), 4);
        assert_eq!(c.entries(), &[100, 101, 102, 101]);
        let d = sample().project(&["MET_pt"]).unwrap();
        assert!(EventsView::concat(&[c, d]).is_err());
    }
}
