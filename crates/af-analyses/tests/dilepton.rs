use std::collections::HashMap;
use std::f64::consts::PI;
use std::path::PathBuf;
use std::sync::Arc;

use approx::assert_relative_eq;

use af_core::Dataset;
use af_events::event_parquet::write_events_parquet;
use af_events::{Column, EventsView, Jagged, ParquetChunkLoader, partition_files};
use af_analyses::common::invariant_mass;
use af_analyses::{Dilepton, lookup};
use af_pipeline::{Pipeline, RunOptions, RunResults, Runner};

fn temp_dir(tag: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("af_analyses_{tag}_{}_{nanos}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn jagged(lists: &[&[f64]]) -> Column {
    Column::Jagged(Jagged::from_lists(lists.iter().copied()))
}

/// Six events, two of which pass the full selection (rows 0 and 5).
fn events() -> EventsView {
    EventsView::from_columns(
        vec![
            ("Muon_pt".to_string(), jagged(&[&[40.0, 20.0], &[30.0, 10.0], &[30.0, 22.0], &[50.0, 30.0], &[22.0, 18.0], &[60.0, 45.0, 16.0]])),
            ("Muon_eta".to_string(), jagged(&[&[0.1, -0.5], &[0.0, 0.0], &[0.0, 0.0], &[0.0, 0.0], &[0.0, 0.0], &[0.0, 3.0, 1.0]])),
            ("Muon_phi".to_string(), jagged(&[&[0.0, PI], &[0.0, 1.0], &[0.0, 1.0], &[0.0, 1.0], &[0.0, 1.0], &[0.5, 0.0, -0.5]])),
            ("Muon_charge".to_string(), jagged(&[&[1.0, -1.0], &[1.0, -1.0], &[1.0, 1.0], &[1.0, -1.0], &[1.0, -1.0], &[-1.0, 1.0, 1.0]])),
            ("Jet_pt".to_string(), jagged(&[&[50.0, 35.0], &[80.0], &[80.0], &[25.0], &[100.0], &[40.0, 31.0]])),
            ("Jet_eta".to_string(), jagged(&[&[0.0, 1.0], &[0.0], &[0.0], &[0.0], &[0.0], &[0.5, 2.5]])),
            ("Jet_btagDeepFlavB".to_string(), jagged(&[&[0.951, 0.1], &[0.5], &[0.5], &[0.5], &[0.5], &[0.25, 0.9]])),
            ("Electron_pt".to_string(), jagged(&[&[], &[12.0], &[], &[], &[], &[]])),
        ],
        None,
    )
    .unwrap()
}

fn run(step: u64) -> RunResults {
    let dir = temp_dir("dilepton");
    let path = dir.join("DoubleMuon.parquet");
    write_events_parquet(&events(), &path, &HashMap::new()).unwrap();
    let (chunks, _) = partition_files(&[path], step).unwrap();
    let dataset = Dataset::data("DoubleMuon_2022C", "Data").with_chunks(chunks);

    let pipeline = Pipeline::compose(Arc::new(Dilepton::default())).unwrap();
    let results = Runner::new(pipeline, ParquetChunkLoader, RunOptions::default()).run(&[dataset]).unwrap();
    std::fs::remove_dir_all(&dir).ok();
    results
}

fn bins<'a>(results: &'a RunResults, name: &str) -> &'a af_hist::Bins {
    results
        .histograms
        .iter()
        .find(|d| d.name == name)
        .unwrap_or_else(|| panic!("no histogram '{name}'"))
        .reduced
        .hist()
        .category("Data")
        .unwrap()
}

#[test]
fn selection_keeps_opposite_sign_events_with_jets() {
    let results = run(4);
    let report = &results.report.datasets[0];
    assert_eq!(report.rows_in, 6);
    assert_eq!(report.rows_selected, 2);
    assert!(results.report.failures.is_empty());
    assert!(report.tally.completeness().is_complete());

    let lead = bins(&results, "Leading muon pT");
    assert_relative_eq!(lead.sumw[40], 1.0);
    assert_relative_eq!(lead.sumw[60], 1.0);
    assert_relative_eq!(lead.total(), 2.0);

    // the 45 GeV muon at |eta| = 3 is dropped by the object definition
    let sub = bins(&results, "Subleading muon pT");
    assert_relative_eq!(sub.sumw[20], 1.0);
    assert_relative_eq!(sub.sumw[16], 1.0);
}

#[test]
fn jet_quantities_use_selected_jets() {
    let results = run(6);

    // one and two jets sit below the first multiplicity edge
    let njet = bins(&results, "NJets");
    assert_relative_eq!(njet.underflow, 2.0);
    assert_relative_eq!(njet.total(), 0.0);

    let ht = bins(&results, "HT");
    assert_relative_eq!(ht.sumw[4], 1.0); // 85 GeV
    assert_relative_eq!(ht.sumw[2], 1.0); // 40 GeV

    let btag = bins(&results, "Leading jet b-tag score");
    assert_relative_eq!(btag.sumw[475], 1.0);
    assert_relative_eq!(btag.sumw[125], 1.0);
}

#[test]
fn dimuon_mass_lands_in_its_bin() {
    let results = run(3);
    let expected = [
        invariant_mass(40.0, 0.1, 0.0, 20.0, -0.5, PI),
        invariant_mass(60.0, 0.0, 0.5, 16.0, 1.0, -0.5),
    ];
    let mass = bins(&results, "Dimuon mass");
    for m in expected {
        let bin = (m / 2.0).floor() as usize;
        assert!(mass.sumw[bin] >= 1.0, "mass {m} not in bin {bin}");
    }
    assert_relative_eq!(mass.total(), 2.0);
}

#[test]
fn chunking_does_not_change_results() {
    let whole = run(6);
    let split = run(1);
    for (a, b) in whole.histograms.iter().zip(&split.histograms) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.reduced.hist().category("Data"), b.reduced.hist().category("Data"));
    }
    assert_eq!(split.report.datasets[0].tally.total, 6);
}

#[test]
fn registry_signal_overrides_default_overlay() {
    let analysis = lookup("dilepton", &["ZPrime".to_string()]).unwrap();
    let pipeline = Pipeline::compose(analysis).unwrap();
    let names = pipeline.spec_names();
    assert!(names.contains(&"Dimuon mass"));
    let styles: Vec<_> = pipeline.specs().iter().map(|s| s.style()).collect();
    assert!(styles.iter().any(|s| s.signal == vec!["ZPrime".to_string()]));
    assert!(styles.iter().all(|s| !s.signal.contains(&"TTTT".to_string())));
}
