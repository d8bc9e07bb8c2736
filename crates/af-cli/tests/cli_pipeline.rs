use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use af_events::event_parquet::write_events_parquet;
use af_events::{Column, EventsView, Jagged};
use af_pipeline::RunResults;
use af_pipeline::results::RESULTS_FILE;

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_afw"))
}

fn tmp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("afw_cli_{}_{}_{}", std::process::id(), nanos, name));
    std::fs::create_dir_all(&p).unwrap();
    p
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .env_remove("AFW_SKIM_LOCATION")
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

fn assert_ok(out: &Output) {
    assert!(
        out.status.success(),
        "afw failed\nstdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
}

fn jagged(lists: &[&[f64]]) -> Column {
    Column::Jagged(Jagged::from_lists(lists.iter().copied()))
}

/// Dimuon events; rows 0, 4 and 5 pass the reference selection.
fn write_events(path: &Path) {
    let view = EventsView::from_columns(
        vec![
            ("Muon_pt".to_string(), jagged(&[&[40.0, 20.0], &[30.0, 10.0], &[30.0, 22.0], &[50.0, 30.0], &[70.0, 35.0], &[60.0, 16.0]])),
            ("Muon_eta".to_string(), jagged(&[&[0.1, -0.5], &[0.0, 0.0], &[0.0, 0.0], &[0.0, 0.0], &[1.0, -1.0], &[0.0, 1.0]])),
            ("Muon_phi".to_string(), jagged(&[&[0.0, 3.0], &[0.0, 1.0], &[0.0, 1.0], &[0.0, 1.0], &[2.0, -1.0], &[0.5, -0.5]])),
            ("Muon_charge".to_string(), jagged(&[&[1.0, -1.0], &[1.0, -1.0], &[1.0, 1.0], &[1.0, -1.0], &[-1.0, 1.0], &[-1.0, 1.0]])),
            ("Jet_pt".to_string(), jagged(&[&[50.0, 35.0], &[80.0], &[80.0], &[25.0], &[120.0, 60.0, 45.0], &[40.0]])),
            ("Jet_eta".to_string(), jagged(&[&[0.0, 1.0], &[0.0], &[0.0], &[0.0], &[0.2, -0.4, 1.9], &[0.5]])),
            ("Jet_btagDeepFlavB".to_string(), jagged(&[&[0.91, 0.1], &[0.5], &[0.5], &[0.5], &[0.33, 0.71, 0.05], &[0.27]])),
            ("MET_pt".to_string(), Column::F64(vec![12.0, 40.0, 7.5, 33.0, 80.0, 21.0])),
        ],
        None,
    )
    .unwrap();
    write_events_parquet(&view, path, &HashMap::new()).unwrap();
}

fn setup(name: &str) -> PathBuf {
    let dir = tmp_dir(name);
    std::fs::create_dir_all(dir.join("inputs")).unwrap();
    write_events(&dir.join("inputs/data.parquet"));
    write_events(&dir.join("inputs/tt.parquet"));
    std::fs::write(
        dir.join("afw.yaml"),
        r#"analysis: dilepton
data:
  DoubleMuon_2022C: { short_name: Data, files: [inputs/data.parquet] }
monte_carlo:
  TTTo2L2Nu:
    short_name: TTbar
    cross_section: 2.0
    files: [inputs/tt.parquet]
output: out
skim_location: skims
chunk_size: 4
skim_chunk_size: 5
luminosity: 3.0
threads: 2
"#,
    )
    .unwrap();
    dir
}

fn results(dir: &Path) -> RunResults {
    RunResults::read(&dir.join(RESULTS_FILE)).unwrap()
}

fn assert_same_contents(a: &RunResults, b: &RunResults) {
    assert_eq!(a.histograms.len(), b.histograms.len());
    for (x, y) in a.histograms.iter().zip(&b.histograms) {
        assert_eq!(x.name, y.name);
        let (hx, hy) = (x.reduced.hist(), y.reduced.hist());
        assert_eq!(hx.categories().collect::<Vec<_>>(), hy.categories().collect::<Vec<_>>());
        for cat in hx.categories() {
            let (bx, by) = (hx.category(cat).unwrap(), hy.category(cat).unwrap());
            for (u, v) in bx.sumw.iter().zip(&by.sumw) {
                assert!((u - v).abs() <= 1e-12 * u.abs().max(1.0), "{} [{cat}]: {u} vs {v}", x.name);
            }
            assert_eq!(bx.entries, by.entries, "{} [{cat}]", x.name);
        }
    }
}

#[test]
fn run_writes_results_and_plots() {
    let dir = setup("run");
    let cfg = dir.join("afw.yaml");
    assert_ok(&run(&["run", "-c", cfg.to_str().unwrap()]));

    let out = dir.join("out");
    let res = results(&out);
    assert_eq!(res.report.analysis, "dilepton");
    assert_eq!(res.report.entries_processed, 12);
    assert!(res.report.failures.is_empty());
    let tt = res.report.datasets.iter().find(|d| d.name == "TTTo2L2Nu").unwrap();
    assert_eq!(tt.rows_selected, 3);
    assert_eq!(tt.tally.total, 2);

    // lumi * xsec / events = 3 * 2 / 6
    let lead = res.histograms.iter().find(|d| d.name == "Leading muon pT").unwrap();
    let bins = lead.reduced.hist().category("TTbar").unwrap();
    assert!((bins.sumw[70] - 1.0).abs() < 1e-12);

    let svgs: Vec<_> = std::fs::read_dir(out.join("plots"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|e| e == "svg"))
        .collect();
    assert_eq!(svgs.len(), res.histograms.len());
}

#[test]
fn replot_reproduces_run_plots() {
    let dir = setup("replot");
    let cfg = dir.join("afw.yaml");
    assert_ok(&run(&["run", "-c", cfg.to_str().unwrap()]));

    let out = dir.join("out");
    let again = dir.join("replot");
    assert_ok(&run(&["replot", out.join(RESULTS_FILE).to_str().unwrap(), "-o", again.to_str().unwrap()]));
    for doc in &results(&out).histograms {
        let name = format!("{}.svg", doc.escaped_name);
        let a = std::fs::read(out.join("plots").join(&name)).unwrap();
        let b = std::fs::read(again.join(&name)).unwrap();
        assert!(a == b, "{name} differs after replot");
    }
}

#[test]
fn skimmed_runs_match_raw_run() {
    let dir = setup("skims");
    let cfg = dir.join("afw.yaml");
    let cfg = cfg.to_str().unwrap();
    let raw = dir.join("raw");
    assert_ok(&run(&["run", "-c", cfg, "-o", raw.to_str().unwrap(), "--no-plots"]));

    assert_ok(&run(&["skim", "-c", cfg]));
    assert!(dir.join("skims/dilepton/TTTo2L2Nu/manifest.json").is_file());

    let from_parts = dir.join("from_parts");
    assert_ok(&run(&["run", "-c", cfg, "--skims", "-o", from_parts.to_str().unwrap(), "--no-plots"]));
    assert_same_contents(&results(&raw), &results(&from_parts));

    assert_ok(&run(&["merge-skims", "-c", cfg]));
    assert!(dir.join("skims/dilepton/merged/DoubleMuon_2022C.parquet").is_file());

    let from_merged = dir.join("from_merged");
    assert_ok(&run(&["run", "-c", cfg, "--skims", "-o", from_merged.to_str().unwrap(), "--no-plots"]));
    assert_same_contents(&results(&raw), &results(&from_merged));
}

#[test]
fn summary_reports_categories_and_limits() {
    let dir = setup("summary");
    let cfg = dir.join("afw.yaml");
    let out = run(&["summary", "-c", cfg.to_str().unwrap(), "--json"]);
    assert_ok(&out);
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let cats = v["categories"].as_array().unwrap();
    assert_eq!(cats.len(), 2);
    assert_eq!(cats[0]["category"], "Data");
    assert_eq!(cats[1]["entries"], 6);
    assert_eq!(v["normalizations"].as_array().unwrap().len(), 2);
}

#[test]
fn unknown_analysis_is_rejected() {
    let dir = setup("unknown");
    let cfg = dir.join("afw.yaml");
    let text = std::fs::read_to_string(&cfg).unwrap().replace("analysis: dilepton", "analysis: trilepton");
    std::fs::write(&cfg, text).unwrap();
    let out = run(&["run", "-c", cfg.to_str().unwrap()]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("unknown analysis"));
}
