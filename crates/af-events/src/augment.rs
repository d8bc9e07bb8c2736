//! Per-chunk derived values shared by every histogram fill.

use std::collections::BTreeMap;

use af_core::{Error, Result};

use crate::column::Column;

/// One derived value.
#[derive(Debug, Clone, PartialEq)]
pub enum AugValue {
    /// A number for the whole chunk.
    Scalar(f64),
    /// A count for the whole chunk.
    Count(u64),
    /// One flag per row.
    Mask(Vec<bool>),
    /// One value (or list) per row.
    Column(Column),
}

/// Immutable named values derived from the fully selected view of a chunk.
///
/// Built once by consuming [`Augmentation::with`] calls, then only borrowed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Augmentation {
    values: BTreeMap<String, AugValue>,
}

impl Augmentation {
    /// No values.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add a value. A repeated name replaces the earlier value.
    pub fn with(mut self, name: impl Into<String>, value: AugValue) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// `true` when no value is present.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Value by name.
    pub fn get(&self, name: &str) -> Result<&AugValue> {
        self.values.get(name).ok_or_else(|| Error::Data(format!("missing augmentation '{name}'")))
    }

    /// Scalar value (counts are widened).
    pub fn scalar(&self, name: &str) -> Result<f64> {
        match self.get(name)? {
            AugValue::Scalar(x) => Ok(*x),
            AugValue::Count(n) => Ok(*n as f64),
            _ => Err(Error::Data(format!("augmentation '{name}' is not a scalar"))),
        }
    }

    /// Per-row mask.
    pub fn mask(&self, name: &str) -> Result<&[bool]> {
        match self.get(name)? {
            AugValue::Mask(m) => Ok(m),
            _ => Err(Error::Data(format!("augmentation '{name}' is not a mask"))),
        }
    }

    /// Per-row column.
    pub fn column(&self, name: &str) -> Result<&Column> {
        match self.get(name)? {
            AugValue::Column(c) => Ok(c),
            _ => Err(Error::Data(format!("augmentation '{name}' is not a column"))),
        }
    }

    /// Check that every per-row value has `rows` rows.
    pub fn check_rows(&self, rows: usize) -> Result<()> {
        for (name, v) in &self.values {
            let n = match v {
                AugValue::Mask(m) => m.len(),
                AugValue::Column(c) => c.len(),
                AugValue::Scalar(_) | AugValue::Count(_) => continue,
            };
            if n != rows {
                return Err(Error::Data(format!(
                    "augmentation '{name}' has {n} rows, selected view has {rows}"
                )));
            }
        }
        Ok(())
    }
}
