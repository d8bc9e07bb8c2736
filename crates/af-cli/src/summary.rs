//! Dataset summary table: files and entries per category.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use serde::Serialize;

use af_core::Dataset;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryRow {
    pub category: String,
    pub is_simulated: bool,
    pub datasets: usize,
    pub files: usize,
    pub entries: u64,
}

/// One row per category, in category order.
pub fn summarize(datasets: &[Dataset]) -> Vec<CategoryRow> {
    let mut rows: BTreeMap<&str, CategoryRow> = BTreeMap::new();
    for d in datasets {
        let row = rows.entry(d.short_name.as_str()).or_insert_with(|| CategoryRow {
            category: d.short_name.clone(),
            is_simulated: d.is_simulated,
            ..CategoryRow::default()
        });
        let files: BTreeSet<_> = d.chunks.iter().map(|c| &c.path).collect();
        row.datasets += 1;
        row.files += files.len();
        row.entries += d.total_entries();
    }
    rows.into_values().collect()
}

/// Fixed-width table with a total line.
pub fn format_table(rows: &[CategoryRow]) -> String {
    let width = rows.iter().map(|r| r.category.len()).max().unwrap_or(0).max("category".len());
    let mut out = String::new();
    let _ = writeln!(out, "{:<width$}  {:>4}  {:>8}  {:>6}  {:>12}", "category", "kind", "datasets", "files", "entries");
    for r in rows {
        let kind = if r.is_simulated { "mc" } else { "data" };
        let _ = writeln!(
            out,
            "{:<width$}  {:>4}  {:>8}  {:>6}  {:>12}",
            r.category, kind, r.datasets, r.files, r.entries
        );
    }
    let _ = writeln!(
        out,
        "{:<width$}  {:>4}  {:>8}  {:>6}  {:>12}",
        "total",
        "",
        rows.iter().map(|r| r.datasets).sum::<usize>(),
        rows.iter().map(|r| r.files).sum::<usize>(),
        rows.iter().map(|r| r.entries).sum::<u64>()
    );
    out
}

/// Log the table line by line.
pub fn log_summary(datasets: &[Dataset]) {
    for line in format_table(&summarize(datasets)).lines() {
        tracing::info!("{line}");
    }
}
