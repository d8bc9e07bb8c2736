use std::path::PathBuf;

use af_core::ChunkTally;
use af_hist::{Axis, Hist, HistDocument, PlotStyle, ReducedHist, SampleRoles};
use af_pipeline::{RunReport, RunResults};
use af_viz::{PlotRenderer, RenderConfig, SvgRenderer, render_document, replot};

fn tmp_root(tag: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("af_viz_{tag}_{}_{nanos}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Weights that do not survive a lossy float round trip.
fn documents() -> Vec<HistDocument> {
    let roles = SampleRoles { data: ["Muon".to_string()].into_iter().collect() };

    let mut mll = Hist::new("$m_{ll}$", "Dilepton mass [GeV]", Axis::regular(40, 0.0, 200.0).unwrap()).unwrap();
    let values: Vec<f64> = (0..200).map(|i| 20.0 + (i as f64 * 0.731) % 150.0).collect();
    let weights: Vec<f64> = (0..200).map(|i| 0.1 + 1.0 / (3.0 + i as f64)).collect();
    mll.fill("DY", &values, &weights).unwrap();
    mll.fill("TT", &values[..80], &weights[..80]).unwrap();
    mll.fill("TTTT", &values[..10], &[1e-3; 10]).unwrap();
    mll.fill("Muon", &values[..150], &[1.0; 150]).unwrap();

    let mut njet = Hist::new("NJet", "Jet multiplicity", Axis::variable((4..16).map(f64::from).collect()).unwrap())
        .unwrap();
    njet.fill("TT", &[4.0, 5.0, 5.0, 9.0], &[0.3, 0.3, 0.3, 0.3]).unwrap();

    vec![
        HistDocument::new(
            "m_ll",
            ReducedHist::new(mll, ChunkTally { total: 4, failed: 1 }),
            roles.clone(),
            PlotStyle::default().with_signal("TTTT").with_rebin(4),
        ),
        HistDocument::new("NJet", ReducedHist::new(njet, ChunkTally::new(4)), roles, PlotStyle::default().linear()),
    ]
}

fn report() -> RunReport {
    RunReport {
        analysis: "dilepton".into(),
        analysis_version: "1".into(),
        datasets: Vec::new(),
        failures: Vec::new(),
        entries_processed: 400,
        wall_seconds: 0.5,
    }
}

#[test]
fn replot_from_hist_files_is_byte_identical() {
    let root = tmp_root("hist");
    let renderer = SvgRenderer::default();
    let direct: Vec<_> =
        documents().iter().map(|d| render_document(&renderer, d, &root.join("direct")).unwrap()).collect();

    let inputs: Vec<PathBuf> = direct.iter().map(|r| r.hist_path.clone()).collect();
    let again = replot(&renderer, &inputs, &root.join("again")).unwrap();
    assert_eq!(again.len(), 2);
    for (a, b) in direct.iter().zip(&again) {
        assert_eq!(a.name, b.name);
        assert_eq!(std::fs::read(&a.plot_path).unwrap(), std::fs::read(&b.plot_path).unwrap());
        assert_eq!(std::fs::read(&a.hist_path).unwrap(), std::fs::read(&b.hist_path).unwrap());
    }
    assert!(direct[0].plot_path.ends_with("m_ll.svg"));
    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn replot_from_results_matches_in_memory_render() {
    let root = tmp_root("results");
    let renderer = SvgRenderer::new(RenderConfig { palette: "tableau10".into(), ..RenderConfig::default() });
    let docs = documents();
    RunResults::new(report(), docs.clone()).write(&root.join("run")).unwrap();

    let from_file = replot(&renderer, &[root.join("run/results.json")], &root.join("plots")).unwrap();
    let from_dir = replot(&renderer, &[root.join("run")], &root.join("plots_dir")).unwrap();
    for (doc, (a, b)) in docs.iter().zip(from_file.iter().zip(&from_dir)) {
        let fresh = renderer.render(doc).unwrap();
        assert_eq!(std::fs::read(&a.plot_path).unwrap(), fresh);
        assert_eq!(std::fs::read(&b.plot_path).unwrap(), fresh);
    }
    std::fs::remove_dir_all(&root).ok();
}

#[test]
fn replot_of_unknown_directory_fails() {
    let root = tmp_root("empty");
    let renderer = SvgRenderer::default();
    assert!(replot(&renderer, &[root.clone()], &root.join("out")).is_err());
    std::fs::remove_dir_all(&root).ok();
}
