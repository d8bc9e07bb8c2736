//! Deterministic reduction of per-chunk accumulators.
//!
//! Each dataset owns a [`MergeTree`]: a binary tree of fixed shape over the
//! chunk ordinals. A node is merged as soon as both of its children are
//! complete, always merging the right child into the left, so the final value depends
//! only on the chunk contents and never on the order in which chunks finish.
//! Floating-point sums therefore come out bit-for-bit identical across runs.
//!
//! Datasets are reduced independently (one lock each) and combined in their
//! declaration order at the end.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use af_core::{ChunkTally, Error, Result};
use af_hist::{Hist, ReducedHist};

type Partial = Option<Vec<Hist>>;

/// Fixed-shape merge tree over `leaves` chunk ordinals.
///
/// A failed chunk completes its leaf as empty (`None`) and is counted.
#[derive(Debug)]
pub struct MergeTree {
    leaves: usize,
    root_level: u32,
    pending: HashMap<(u32, usize), Partial>,
    submitted: Vec<bool>,
    failed: usize,
    root: Option<Partial>,
}

impl MergeTree {
    /// Tree for `leaves` chunks. A tree without leaves is complete and empty.
    pub fn new(leaves: usize) -> Self {
        Self {
            leaves,
            root_level: leaves.max(1).next_power_of_two().trailing_zeros(),
            pending: HashMap::new(),
            submitted: vec![false; leaves],
            failed: 0,
            root: if leaves == 0 { Some(None) } else { None },
        }
    }

    /// Complete leaf `ordinal`; `None` marks a failed chunk.
    pub fn submit(&mut self, ordinal: usize, value: Partial) -> Result<()> {
        if ordinal >= self.leaves {
            return Err(Error::Validation(format!(
                "chunk ordinal {ordinal} out of range (tree has {} leaves)",
                self.leaves
            )));
        }
        if std::mem::replace(&mut self.submitted[ordinal], true) {
            return Err(Error::Validation(format!("chunk ordinal {ordinal} submitted twice")));
        }
        if value.is_none() {
            self.failed += 1;
        }

        let (mut level, mut idx, mut value) = (0u32, ordinal, value);
        loop {
            if level == self.root_level {
                self.root = Some(value);
                return Ok(());
            }
            let sibling = idx ^ 1;
            if sibling << level >= self.leaves {
                // right sibling covers no chunk: promote unchanged
                level += 1;
                idx /= 2;
                continue;
            }
            match self.pending.remove(&(level, sibling)) {
                Some(other) => {
                    value = if idx % 2 == 0 { combine(value, other)? } else { combine(other, value)? };
                    level += 1;
                    idx /= 2;
                }
                None => {
                    self.pending.insert((level, idx), value);
                    return Ok(());
                }
            }
        }
    }

    /// Whether every leaf was submitted.
    pub fn is_complete(&self) -> bool {
        self.root.is_some()
    }

    /// Chunk counts so far.
    pub fn tally(&self) -> ChunkTally {
        ChunkTally { total: self.leaves, failed: self.failed }
    }

    /// Root value and tally; fails if leaves are missing.
    pub fn into_result(self) -> Result<(Partial, ChunkTally)> {
        let tally = self.tally();
        match self.root {
            Some(v) => Ok((v, tally)),
            None => Err(Error::Validation(format!(
                "merge tree incomplete: {} of {} chunks submitted",
                self.submitted.iter().filter(|s| **s).count(),
                self.leaves
            ))),
        }
    }
}

fn combine(left: Partial, right: Partial) -> Result<Partial> {
    match (left, right) {
        (None, x) | (x, None) => Ok(x),
        (Some(mut a), Some(b)) => {
            if a.len() != b.len() {
                return Err(Error::Validation(format!(
                    "partial results hold {} and {} histograms",
                    a.len(),
                    b.len()
                )));
            }
            for (x, y) in a.iter_mut().zip(&b) {
                x.merge(y)?;
            }
            Ok(Some(a))
        }
    }
}

/// Reduced output of a run.
#[derive(Debug, Clone)]
pub struct Reduced {
    /// One reduced histogram per spec, in spec order.
    pub hists: Vec<ReducedHist>,
    /// Chunk counts per dataset, in declaration order.
    pub dataset_tallies: Vec<ChunkTally>,
}

/// Collects partial accumulators from concurrent chunk tasks.
#[derive(Debug)]
pub struct Reducer {
    trees: Vec<Mutex<MergeTree>>,
    lost: Vec<ChunkTally>,
}

impl Reducer {
    /// One tree per dataset with the given chunk counts.
    pub fn new(chunk_counts: &[usize]) -> Self {
        Self {
            trees: chunk_counts.iter().map(|&n| Mutex::new(MergeTree::new(n))).collect(),
            lost: vec![ChunkTally::default(); chunk_counts.len()],
        }
    }

    /// Count chunks of `dataset` that failed before this run, e.g. while
    /// skimming; they are added to the dataset's tally as failed.
    pub fn carry_lost(&mut self, dataset: usize, lost: ChunkTally) -> Result<()> {
        let slot = self
            .lost
            .get_mut(dataset)
            .ok_or_else(|| Error::Validation(format!("unknown dataset index {dataset}")))?;
        *slot = slot.combine(lost);
        Ok(())
    }

    /// Hand over the result of chunk `ordinal` of dataset `dataset`.
    pub fn submit(&self, dataset: usize, ordinal: usize, value: Option<Vec<Hist>>) -> Result<()> {
        let tree = self
            .trees
            .get(dataset)
            .ok_or_else(|| Error::Validation(format!("unknown dataset index {dataset}")))?;
        tree.lock().unwrap_or_else(PoisonError::into_inner).submit(ordinal, value)
    }

    /// Merge datasets in declaration order into `templates` (one empty
    /// accumulator per spec).
    pub fn finish(self, templates: Vec<Hist>) -> Result<Reduced> {
        let mut acc = templates;
        let mut dataset_tallies = Vec::with_capacity(self.trees.len());
        for (tree, lost) in self.trees.into_iter().zip(self.lost) {
            let tree = tree.into_inner().unwrap_or_else(PoisonError::into_inner);
            let (value, tally) = tree.into_result()?;
            if let Some(hists) = value {
                acc = combine(Some(acc), Some(hists))?.unwrap_or_default();
            }
            dataset_tallies.push(tally.combine(lost));
        }
        let total = dataset_tallies.iter().fold(ChunkTally::default(), |a, b| a.combine(*b));
        Ok(Reduced {
            hists: acc.into_iter().map(|h| ReducedHist::new(h, total)).collect(),
            dataset_tallies,
        })
    }
}
