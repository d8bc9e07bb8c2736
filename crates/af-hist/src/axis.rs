//! Value axes.

use serde::{Deserialize, Serialize};

use af_core::{Error, Result};

/// Binning of the value axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Axis {
    /// `bins` equal-width bins over `[low, high)`.
    Regular {
        /// Number of bins.
        bins: usize,
        /// Lower edge.
        low: f64,
        /// Upper edge.
        high: f64,
    },
    /// Explicit sorted edges (`n_bins + 1` values).
    Variable {
        /// Bin edges.
        edges: Vec<f64>,
    },
}

/// Where a value lands on an axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinIndex {
    /// Below the first edge.
    Underflow,
    /// In-range bin.
    Bin(usize),
    /// At or above the last edge, or NaN.
    Overflow,
}

impl Axis {
    /// Regular axis; validated.
    pub fn regular(bins: usize, low: f64, high: f64) -> Result<Self> {
        let axis = Axis::Regular { bins, low, high };
        axis.validate()?;
        Ok(axis)
    }

    /// Variable axis; validated.
    pub fn variable(edges: Vec<f64>) -> Result<Self> {
        let axis = Axis::Variable { edges };
        axis.validate()?;
        Ok(axis)
    }

    /// Check bin count and edge ordering.
    pub fn validate(&self) -> Result<()> {
        match self {
            Axis::Regular { bins, low, high } => {
                if *bins == 0 || !(low.is_finite() && high.is_finite() && low < high) {
                    return Err(Error::Validation(format!(
                        "invalid regular axis: {bins} bins over [{low}, {high})"
                    )));
                }
            }
            Axis::Variable { edges } => {
                if edges.len() < 2
                    || edges.iter().any(|e| !e.is_finite())
                    || edges.windows(2).any(|w| w[1] <= w[0])
                {
                    return Err(Error::Validation(format!(
                        "variable axis edges must be finite and strictly increasing: {edges:?}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Number of in-range bins.
    pub fn n_bins(&self) -> usize {
        match self {
            Axis::Regular { bins, .. } => *bins,
            Axis::Variable { edges } => edges.len() - 1,
        }
    }

    /// Bin edges (`n_bins + 1` values).
    pub fn edges(&self) -> Vec<f64> {
        match self {
            Axis::Regular { bins, low, high } => {
                let width = (high - low) / *bins as f64;
                (0..=*bins)
                    .map(|i| if i == *bins { *high } else { low + width * i as f64 })
                    .collect()
            }
            Axis::Variable { edges } => edges.clone(),
        }
    }

    /// Lower and upper edge.
    pub fn range(&self) -> (f64, f64) {
        match self {
            Axis::Regular { low, high, .. } => (*low, *high),
            Axis::Variable { edges } => (edges[0], edges[edges.len() - 1]),
        }
    }

    /// Locate `x`.
    pub fn index(&self, x: f64) -> BinIndex {
        let (low, high) = self.range();
        if x.is_nan() || x >= high {
            return BinIndex::Overflow;
        }
        if x < low {
            return BinIndex::Underflow;
        }
        match self {
            Axis::Regular { bins, low, high } => {
                let i = ((x - low) / (high - low) * *bins as f64) as usize;
                BinIndex::Bin(i.min(bins - 1))
            }
            Axis::Variable { edges } => {
                // first edge strictly greater than x, minus one
                let i = edges.partition_point(|&e| e <= x);
                BinIndex::Bin(i - 1)
            }
        }
    }

    /// Merge groups of `factor` adjacent bins. The last group may be shorter.
    pub fn rebin(&self, factor: usize) -> Result<Axis> {
        if factor == 0 {
            return Err(Error::Validation("rebin factor must be positive".into()));
        }
        let n = self.n_bins();
        match self {
            Axis::Regular { low, high, .. } if n % factor == 0 => {
                Ok(Axis::Regular { bins: n / factor, low: *low, high: *high })
            }
            _ => {
                let edges = self.edges();
                let mut out: Vec<f64> = edges.iter().step_by(factor).copied().collect();
                if n % factor != 0 {
                    out.push(edges[n]);
                }
                Ok(Axis::Variable { edges: out })
            }
        }
    }
}
