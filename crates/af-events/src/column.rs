//! Column storage: flat scalars per event and jagged per-object collections.

use af_core::{Error, Result};

/// Variable-length `f64` lists, one list per event (e.g. `Jet_pt`).
///
/// `offsets` has `rows + 1` monotonically non-decreasing entries starting at 0;
/// event `i` owns `values[offsets[i]..offsets[i + 1]]`.
#[derive(Debug, Clone, Default)]
pub struct Jagged {
    offsets: Vec<usize>,
    values: Vec<f64>,
}

impl Jagged {
    /// Build from raw offsets and flat values.
    pub fn new(offsets: Vec<usize>, values: Vec<f64>) -> Result<Self> {
        if offsets.first() != Some(&0) {
            return Err(Error::Data("jagged offsets must start at 0".into()));
        }
        if offsets.windows(2).any(|w| w[1] < w[0]) {
            return Err(Error::Data("jagged offsets must be non-decreasing".into()));
        }
        let last = offsets[offsets.len() - 1];
        if last != values.len() {
            return Err(Error::Data(format!(
                "jagged offsets end at {last} but {} values were given",
                values.len()
            )));
        }
        Ok(Self { offsets, values })
    }

    /// Build from per-event lists.
    pub fn from_lists<I, L>(lists: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: AsRef<[f64]>,
    {
        let mut offsets = vec![0];
        let mut values = Vec::new();
        for l in lists {
            values.extend_from_slice(l.as_ref());
            offsets.push(values.len());
        }
        Self { offsets, values }
    }

    /// Number of events.
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    /// `true` when there are no events.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Offsets (`len() + 1` entries).
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Flat values of all events.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Objects of event `row`.
    pub fn row(&self, row: usize) -> &[f64] {
        &self.values[self.offsets[row]..self.offsets[row + 1]]
    }

    /// Number of objects per event.
    pub fn counts(&self) -> Vec<usize> {
        self.offsets.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// `index`-th object of every event; `None` where the event has fewer objects.
    pub fn at(&self, index: usize) -> Vec<Option<f64>> {
        (0..self.len()).map(|r| self.row(r).get(index).copied()).collect()
    }

    /// Events at `rows`, in that order.
    pub fn take(&self, rows: &[usize]) -> Self {
        let mut offsets = Vec::with_capacity(rows.len() + 1);
        offsets.push(0);
        let mut values = Vec::new();
        for &r in rows {
            values.extend_from_slice(self.row(r));
            offsets.push(values.len());
        }
        Self { offsets, values }
    }

    /// Keep the objects whose flat mask entry is `true`; event count is unchanged.
    pub fn filter_elements(&self, mask: &[bool]) -> Result<Self> {
        if mask.len() != self.values.len() {
            return Err(Error::Data(format!(
                "element mask has {} entries, collection has {} objects",
                mask.len(),
                self.values.len()
            )));
        }
        let mut offsets = Vec::with_capacity(self.offsets.len());
        offsets.push(0);
        let mut values = Vec::with_capacity(self.values.len());
        for w in self.offsets.windows(2) {
            for i in w[0]..w[1] {
                if mask[i] {
                    values.push(self.values[i]);
                }
            }
            offsets.push(values.len());
        }
        Ok(Self { offsets, values })
    }

    /// Concatenate events of `self` and `other`.
    pub fn append(&mut self, other: &Jagged) {
        let base = self.values.len();
        self.values.extend_from_slice(&other.values);
        self.offsets.extend(other.offsets[1..].iter().map(|o| o + base));
    }
}

impl PartialEq for Jagged {
    fn eq(&self, other: &Self) -> bool {
        self.offsets == other.offsets && bits_eq(&self.values, &other.values)
    }
}

/// One event-aligned column.
#[derive(Debug, Clone)]
pub enum Column {
    /// One float per event.
    F64(Vec<f64>),
    /// One integer per event (counts, flags, run numbers).
    I64(Vec<i64>),
    /// One boolean per event (trigger bits, masks).
    Bool(Vec<bool>),
    /// A list of floats per event.
    Jagged(Jagged),
}

impl Column {
    /// Number of events.
    pub fn len(&self) -> usize {
        match self {
            Column::F64(v) => v.len(),
            Column::I64(v) => v.len(),
            Column::Bool(v) => v.len(),
            Column::Jagged(j) => j.len(),
        }
    }

    /// `true` when there are no events.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Column::F64(_) => "f64",
            Column::I64(_) => "i64",
            Column::Bool(_) => "bool",
            Column::Jagged(_) => "jagged<f64>",
        }
    }

    /// Events at `rows`, in that order.
    pub fn take(&self, rows: &[usize]) -> Column {
        match self {
            Column::F64(v) => Column::F64(rows.iter().map(|&r| v[r]).collect()),
            Column::I64(v) => Column::I64(rows.iter().map(|&r| v[r]).collect()),
            Column::Bool(v) => Column::Bool(rows.iter().map(|&r| v[r]).collect()),
            Column::Jagged(j) => Column::Jagged(j.take(rows)),
        }
    }

    /// Values as `f64`, converting integer and boolean columns.
    pub fn to_f64(&self) -> Option<Vec<f64>> {
        match self {
            Column::F64(v) => Some(v.clone()),
            Column::I64(v) => Some(v.iter().map(|&x| x as f64).collect()),
            Column::Bool(v) => Some(v.iter().map(|&b| if b { 1.0 } else { 0.0 }).collect()),
            Column::Jagged(_) => None,
        }
    }

    /// Append events of `other`; both columns must have the same type.
    pub fn append(&mut self, other: &Column) -> Result<()> {
        match (self, other) {
            (Column::F64(a), Column::F64(b)) => a.extend_from_slice(b),
            (Column::I64(a), Column::I64(b)) => a.extend_from_slice(b),
            (Column::Bool(a), Column::Bool(b)) => a.extend_from_slice(b),
            (Column::Jagged(a), Column::Jagged(b)) => a.append(b),
            (a, b) => {
                return Err(Error::Data(format!(
                    "cannot append {} column to {} column",
                    b.type_name(),
                    a.type_name()
                )));
            }
        }
        Ok(())
    }
}

/// Float columns compare bitwise so NaN payloads and signed zeros round-trip exactly.
impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Column::F64(a), Column::F64(b)) => bits_eq(a, b),
            (Column::I64(a), Column::I64(b)) => a == b,
            (Column::Bool(a), Column::Bool(b)) => a == b,
            (Column::Jagged(a), Column::Jagged(b)) => a == b,
            _ => false,
        }
    }
}

fn bits_eq(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jagged_from_lists() {
        let j = Jagged::from_lists([vec![1.0, 2.0], vec![], vec![3.0]]);
        assert_eq!(j.len(), 3);
        assert_eq!(j.counts(), vec![2, 0, 1]);
        assert_eq!(j.row(2), &[3.0]);
        assert_eq!(j.at(1), vec![Some(2.0), None, None]);
    }

    #[test]
    fn jagged_rejects_bad_offsets() {
        assert!(Jagged::new(vec![1, 2], vec![0.0, 1.0]).is_err());
        assert!(Jagged::new(vec![0, 2, 1], vec![0.0, 1.0]).is_err());
        assert!(Jagged::new(vec![0, 3], vec![0.0, 1.0]).is_err());
        assert!(Jagged::new(vec![0], vec![]).unwrap().is_empty());
    }

    #[test]
    fn jagged_filter_elements_keeps_events() {
        let j = Jagged::from_lists([vec![10.0, 40.0], vec![5.0], vec![]]);
        let f = j.filter_elements(&[false, true, false]).unwrap();
        assert_eq!(f, Jagged::from_lists([vec![40.0], vec![], vec![]]));
        assert!(j.filter_elements(&[true]).is_err());
    }

    #[test]
    fn take_and_append() {
        let c = Column::Jagged(Jagged::from_lists([vec![1.0], vec![2.0, 3.0]]));
        let mut t = c.take(&[1, 1]);
        assert_eq!(t, Column::Jagged(Jagged::from_lists([vec![2.0, 3.0], vec![2.0, 3.0]])));
        t.append(&c).unwrap();
        assert_eq!(t.len(), 4);
        assert!(t.append(&Column::F64(vec![1.0])).is_err());
    }

    #[test]
    fn nan_compares_bitwise() {
        assert_eq!(Column::F64(vec![f64::NAN]), Column::F64(vec![f64::NAN]));
        assert_ne!(Column::F64(vec![0.0]), Column::F64(vec![-0.0]));
    }
}
