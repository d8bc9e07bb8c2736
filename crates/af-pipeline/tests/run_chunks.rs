use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use approx::assert_relative_eq;

use af_core::{
    ChunkKind, ChunkLimit, ChunkLoader, ChunkRef, Dataset, Error, Normalization, Result,
};
use af_events::{Augmentation, Column, EventsView};
use af_hist::{Axis, Hist, HistogramSpec};
use af_pipeline::{Analysis, Pipeline, RunOptions, Runner};

struct MetAnalysis;

struct MetSpec;

impl HistogramSpec for MetSpec {
    fn name(&self) -> &str {
        "MET"
    }

    fn create(&self) -> Result<Hist> {
        Hist::new("MET", "$p_T^{miss}$", Axis::regular(50, 0.0, 50.0)?)
    }

    fn fill(
        &self,
        hist: &mut Hist,
        events: &EventsView,
        category: &str,
        weights: &[f64],
        _augmentation: &Augmentation,
    ) -> Result<()> {
        hist.fill(category, events.f64s("MET_pt")?, weights)
    }
}

impl Analysis for MetAnalysis {
    fn name(&self) -> &str {
        "met_test"
    }

    fn define_objects(&self, events: EventsView) -> Result<EventsView> {
        let met = events.f64s("MET_pt")?;
        if met.iter().any(|m| *m < 0.0) {
            return Err(Error::Data("negative MET".into()));
        }
        let doubled = met.iter().map(|m| 2.0 * m).collect();
        events.with_field("MET_pt2", Column::F64(doubled))
    }

    fn preselect(&self, events: EventsView) -> Result<EventsView> {
        Ok(events)
    }

    fn select(&self, events: EventsView) -> Result<EventsView> {
        if events.f64s("MET_pt")?.iter().any(|m| *m > 1000.0) {
            return Err(Error::Data("MET beyond calibrated range".into()));
        }
        Ok(events)
    }

    fn necessary_fields(&self) -> Vec<String> {
        vec!["MET_pt".into()]
    }

    fn things_to_plot(&self) -> Vec<Box<dyn HistogramSpec>> {
        vec![Box::new(MetSpec)]
    }
}

/// Serves MET values per (dataset, ordinal) from memory.
struct MemoryLoader {
    chunks: HashMap<(String, usize), Vec<f64>>,
}

impl ChunkLoader for MemoryLoader {
    type Chunk = EventsView;

    fn load(&self, dataset: &Dataset, chunk: &ChunkRef) -> Result<EventsView> {
        let met = self
            .chunks
            .get(&(dataset.name.clone(), chunk.ordinal))
            .ok_or_else(|| Error::storage(chunk.path.display(), "no such chunk"))?;
        let entries = (chunk.entry_start..chunk.entry_stop).collect();
        EventsView::from_columns(vec![("MET_pt".to_string(), Column::F64(met.clone()))], Some(entries))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

fn chunk_refs(name: &str, sizes: &[u64]) -> Vec<ChunkRef> {
    let mut start = 0;
    sizes
        .iter()
        .enumerate()
        .map(|(ordinal, n)| {
            let c = ChunkRef {
                ordinal,
                path: PathBuf::from(format!("/store/{name}.parquet")),
                entry_start: start,
                entry_stop: start + n,
                kind: ChunkKind::Events,
            };
            start += n;
            c
        })
        .collect()
}

fn runner(loader: MemoryLoader, options: RunOptions) -> Runner<MemoryLoader> {
    let pipeline = Pipeline::compose(Arc::new(MetAnalysis)).unwrap();
    Runner::new(pipeline, loader, options)
}

#[test]
fn failed_object_definition_yields_partial_result() {
    let loader = MemoryLoader {
        chunks: HashMap::from([
            (("TTTo2L2Nu".to_string(), 0), vec![10.5]),
            (("TTTo2L2Nu".to_string(), 1), vec![-1.0]),
            (("TTTo2L2Nu".to_string(), 2), vec![30.5]),
        ]),
    };
    let ds = Dataset::simulated("TTTo2L2Nu", "TTbar", 1.0, 3)
        .with_chunks(chunk_refs("TTTo2L2Nu", &[1, 1, 1]));
    let options = RunOptions { luminosity: 3.0, ..RunOptions::default() };

    let results = runner(loader, options).run(&[ds]).unwrap();
    let doc = &results.histograms[0];
    assert_eq!(doc.reduced.completeness().to_string(), "partial (1/3 failed)");
    let bins = doc.reduced.hist().category("TTbar").unwrap();
    assert_relative_eq!(bins.sumw[10], 1.0);
    assert_relative_eq!(bins.sumw[30], 1.0);
    assert_relative_eq!(bins.sumw.iter().sum::<f64>(), 2.0);

    let failures = &results.report.failures;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].ordinal, 1);
    assert!(failures[0].error.contains("define_objects"));
    assert_eq!(results.report.datasets[0].rows_in, 2);
}

#[test]
fn failed_selection_keeps_other_chunks() {
    let loader = MemoryLoader {
        chunks: HashMap::from([
            (("WZ".to_string(), 0), vec![4.5, 5.5]),
            (("WZ".to_string(), 1), vec![12.5, 2000.0]),
            (("WZ".to_string(), 2), vec![20.5]),
            (("WZ".to_string(), 3), vec![21.5]),
        ]),
    };
    let ds = Dataset::data("WZ", "WZ").with_chunks(chunk_refs("WZ", &[2, 2, 1, 1]));

    let results = runner(loader, RunOptions::default()).run(&[ds]).unwrap();
    let failures = &results.report.failures;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].ordinal, 1);
    assert!(failures[0].error.contains("select: MET beyond calibrated range"), "{}", failures[0].error);

    let doc = &results.histograms[0];
    assert_eq!(doc.reduced.completeness().to_string(), "partial (1/4 failed)");
    let bins = doc.reduced.hist().category("WZ").unwrap();
    for b in [4, 5, 20, 21] {
        assert_eq!(bins.sumw[b], 1.0);
    }
    assert_eq!(bins.sumw[12], 0.0);
    assert_eq!(bins.sumw.iter().sum::<f64>(), 4.0);
    assert_eq!(results.report.datasets[0].tally.failed, 1);
}

#[test]
fn strict_mode_aborts_on_chunk_error() {
    let loader = MemoryLoader {
        chunks: HashMap::from([(("TTTo2L2Nu".to_string(), 0), vec![-3.0])]),
    };
    let ds = Dataset::simulated("TTTo2L2Nu", "TTbar", 1.0, 1)
        .with_chunks(chunk_refs("TTTo2L2Nu", &[1]));
    let options = RunOptions { strict: true, ..RunOptions::default() };
    assert!(matches!(runner(loader, options).run(&[ds]), Err(Error::Data(_))));
}

#[test]
fn missing_chunk_is_a_storage_failure() {
    let loader = MemoryLoader { chunks: HashMap::new() };
    let ds = Dataset::data("Muon_Run2022F", "Muon").with_chunks(chunk_refs("Muon_Run2022F", &[4]));
    let options = RunOptions { retries: 2, ..RunOptions::default() };
    let results = runner(loader, options).run(&[ds]).unwrap();
    assert_eq!(results.report.tally().failed, 1);
    assert!(results.report.failures[0].error.contains("no such chunk"));
}

#[test]
fn limited_simulation_is_renormalized() {
    let loader = MemoryLoader {
        chunks: HashMap::from([
            (("DYJets".to_string(), 0), vec![5.5, 6.5]),
            (("DYJets".to_string(), 1), vec![7.5, 8.5]),
        ]),
    };
    let ds = Dataset::simulated("DYJets", "DY", 2.0, 1_000_000)
        .with_chunks(chunk_refs("DYJets", &[2, 2]));
    let options = RunOptions { luminosity: 10.0, limit: ChunkLimit::max(1), ..RunOptions::default() };

    let results = runner(loader, options).run(&[ds]).unwrap();
    match &results.report.datasets[0].normalization {
        Normalization::Simulated { nominal, adjusted, processed_entries, .. } => {
            assert_relative_eq!(*nominal, 2.0e-5);
            assert_relative_eq!(adjusted.unwrap(), 10.0);
            assert_eq!(*processed_entries, 2);
        }
        other => panic!("unexpected normalization {other:?}"),
    }
    let bins = results.histograms[0].reduced.hist().category("DY").unwrap();
    assert_relative_eq!(bins.sumw.iter().sum::<f64>(), 20.0);
    assert!(results.histograms[0].reduced.completeness().is_complete());
}

#[test]
fn data_is_unit_weighted_and_tagged() {
    let loader = MemoryLoader {
        chunks: HashMap::from([(("Muon_Run2022F".to_string(), 0), vec![1.5, 1.5, 2.5])]),
    };
    let ds = Dataset::data("Muon_Run2022F", "Muon").with_chunks(chunk_refs("Muon_Run2022F", &[3]));
    let results = runner(loader, RunOptions::default()).run(&[ds]).unwrap();
    let doc = &results.histograms[0];
    assert!(doc.roles.is_data("Muon"));
    let bins = doc.reduced.hist().category("Muon").unwrap();
    assert_eq!(bins.sumw[1], 2.0);
    assert_eq!(bins.sumw[2], 1.0);
}

#[test]
fn thread_count_does_not_change_results() {
    let sizes = [3u64; 9];
    let mut chunks = HashMap::new();
    for o in 0..sizes.len() {
        chunks.insert(("WW".to_string(), o), vec![0.1 * o as f64 + 3.3, 7.7, 12.1]);
    }
    let ds = Dataset::simulated("WW", "WW", 118.7, 15_000).with_chunks(chunk_refs("WW", &sizes));

    let serial = runner(MemoryLoader { chunks: chunks.clone() }, RunOptions { threads: 1, ..RunOptions::default() })
        .run(std::slice::from_ref(&ds))
        .unwrap();
    let parallel = runner(MemoryLoader { chunks }, RunOptions { threads: 4, ..RunOptions::default() })
        .run(&[ds])
        .unwrap();
    assert_eq!(
        serde_json::to_string(&serial.histograms).unwrap(),
        serde_json::to_string(&parallel.histograms).unwrap()
    );
}

#[test]
fn duplicate_datasets_are_rejected() {
    let ds = Dataset::data("Muon_Run2022F", "Muon");
    let err = runner(MemoryLoader { chunks: HashMap::new() }, RunOptions::default())
        .run(&[ds.clone(), ds])
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn results_roundtrip_through_disk() {
    let loader = MemoryLoader {
        chunks: HashMap::from([(("Muon_Run2022F".to_string(), 0), vec![1.5])]),
    };
    let ds = Dataset::data("Muon_Run2022F", "Muon").with_chunks(chunk_refs("Muon_Run2022F", &[1]));
    let results = runner(loader, RunOptions::default()).run(&[ds]).unwrap();

    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("af_results_{}_{nanos}", std::process::id()));
    let written = results.write(&dir).unwrap();
    assert_eq!(written.len(), 2);
    assert!(dir.join("MET.hist.json").exists());
    let back = af_pipeline::RunResults::read(&dir.join("results.json")).unwrap();
    assert_eq!(back.histograms, results.histograms);
    std::fs::remove_dir_all(&dir).ok();
}
