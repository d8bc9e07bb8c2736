//! afw CLI

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use af_core::Normalization;
use af_events::ParquetChunkLoader;
use af_pipeline::{Pipeline, RunResults, Runner};
use af_skim::{MergeOutcome, SkimAwareLoader, SkimStatus, SkimWriter, convert_to_skimmed, merge_skims};
use af_viz::{RenderConfig, SvgRenderer, render_all, replot};

mod config;
mod summary;

use config::{AfwConfig, read_config};

#[derive(Parser)]
#[command(name = "afw")]
#[command(about = "afw - columnar event processing and histogramming")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    log_level: tracing::Level,

    /// Debug logging; the first bad chunk aborts the run.
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the analysis and write histograms and plots
    Run {
        /// Run configuration (YAML, or JSON by extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Read the analysis skims instead of the raw files.
        #[arg(long)]
        skims: bool,

        /// Output directory. Overrides `output` from the config.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Process at most N chunks per dataset. Overrides `max_chunks`.
        #[arg(long)]
        max_chunks: Option<usize>,

        /// Write results only.
        #[arg(long)]
        no_plots: bool,
    },

    /// Write skims (object definition + preselection + minification)
    Skim {
        /// Run configuration (YAML, or JSON by extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Analysis skim directory to diff against; parts are written as deltas.
        #[arg(long)]
        baseline: Option<PathBuf>,

        /// Rewrite datasets that already have skims.
        #[arg(long)]
        overwrite: bool,
    },

    /// Concatenate skim parts into one file per dataset
    MergeSkims {
        /// Run configuration (YAML, or JSON by extension)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Re-render plots from results.json or *.hist.json files
    Replot {
        /// Results files, histogram files or directories holding them
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory for plots
        #[arg(short, long)]
        output: PathBuf,

        /// Plot options (YAML/JSON; the `plot` section of a run config)
        #[arg(long)]
        plot_config: Option<PathBuf>,
    },

    /// Print the dataset table and normalizations without processing events
    Summary {
        /// Run configuration (YAML, or JSON by extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { tracing::Level::DEBUG } else { cli.log_level };
    tracing_subscriber::fmt().with_max_level(level).with_target(false).init();

    match cli.command {
        Commands::Run { config, skims, output, max_chunks, no_plots } => {
            cmd_run(&config, skims, output, max_chunks, no_plots, cli.debug)
        }
        Commands::Skim { config, baseline, overwrite } => cmd_skim(&config, baseline, overwrite, cli.debug),
        Commands::MergeSkims { config } => cmd_merge_skims(&config),
        Commands::Replot { inputs, output, plot_config } => cmd_replot(&inputs, &output, plot_config.as_deref()),
        Commands::Summary { config, json } => cmd_summary(&config, json),
    }
}

fn pipeline(cfg: &AfwConfig) -> Result<Pipeline> {
    let analysis = af_analyses::lookup(&cfg.analysis, &cfg.signal)?;
    tracing::info!(analysis = analysis.name(), version = analysis.version(), "analysis loaded");
    Ok(Pipeline::compose(analysis)?)
}

fn cmd_run(
    config: &Path,
    skims: bool,
    output: Option<PathBuf>,
    max_chunks: Option<usize>,
    no_plots: bool,
    debug: bool,
) -> Result<()> {
    let mut cfg = read_config(config)?;
    if let Some(n) = max_chunks {
        anyhow::ensure!(n > 0, "--max-chunks must be positive");
        cfg.max_chunks = Some(n);
    }
    let out_dir = output.unwrap_or_else(|| cfg.output_dir());
    let pipeline = pipeline(&cfg)?;
    let options = cfg.run_options(debug);

    let results = if skims {
        let storage = cfg.skim_storage()?;
        storage.check_reachable()?;
        let analysis = pipeline.analysis();
        let raw = cfg.datasets(cfg.skim_chunk_size)?;
        let datasets = convert_to_skimmed(
            &raw,
            &storage.analysis_dir(analysis.name()),
            analysis.name(),
            analysis.version(),
            cfg.chunk_size,
        )?;
        anyhow::ensure!(!datasets.is_empty(), "no dataset has skims under {}", storage.root().display());
        summary::log_summary(&datasets);
        Runner::new(pipeline, SkimAwareLoader::new(), options).run(&datasets)?
    } else {
        let datasets = cfg.datasets(cfg.chunk_size)?;
        summary::log_summary(&datasets);
        Runner::new(pipeline, ParquetChunkLoader, options).run(&datasets)?
    };

    report_run(&results);
    results.write(&out_dir)?;
    if !no_plots {
        let renderer = SvgRenderer::new(cfg.plot.clone());
        let plots = render_all(&renderer, &results.histograms, &out_dir.join("plots"))?;
        tracing::info!(plots = plots.len(), dir = %out_dir.join("plots").display(), "plots written");
    }
    Ok(())
}

fn report_run(results: &RunResults) {
    for d in &results.report.datasets {
        if d.tally.completeness().is_complete() {
            tracing::info!("{d}");
        } else {
            tracing::warn!("{d}");
        }
    }
    for f in &results.report.failures {
        tracing::warn!(dataset = %f.dataset, chunk = f.ordinal, file = %f.path, "chunk failed: {}", f.error);
    }
}

fn cmd_skim(config: &Path, baseline: Option<PathBuf>, overwrite: bool, debug: bool) -> Result<()> {
    let cfg = read_config(config)?;
    let pipeline = pipeline(&cfg)?;
    let datasets = cfg.datasets(cfg.skim_chunk_size)?;
    summary::log_summary(&datasets);

    let storage = cfg.skim_storage()?;
    tracing::info!(location = %storage.location(), scope = ?storage.scope(), "skim storage");
    let writer = SkimWriter::new(pipeline, ParquetChunkLoader, storage, cfg.skim_options(debug, overwrite, baseline));
    let outcomes = writer.skim(&datasets)?;

    let mut failed = 0;
    for o in &outcomes {
        match o.status {
            SkimStatus::Written => tracing::info!(
                dataset = %o.dataset,
                rows = o.rows,
                status = %o.tally.completeness(),
                dir = %o.dir.display(),
                "skimmed"
            ),
            SkimStatus::SkippedExisting => tracing::warn!(dataset = %o.dataset, "skipped, skims exist"),
        }
        failed += o.failures.len();
    }
    if failed > 0 {
        tracing::warn!(failed_chunks = failed, "some chunks were not skimmed");
    }
    Ok(())
}

fn cmd_merge_skims(config: &Path) -> Result<()> {
    let cfg = read_config(config)?;
    let storage = cfg.skim_storage()?;
    storage.check_reachable()?;
    let analysis = af_analyses::lookup(&cfg.analysis, &cfg.signal)?;
    match merge_skims(&storage.analysis_dir(analysis.name()))? {
        MergeOutcome::Skipped { dir } => {
            tracing::warn!(dir = %dir.display(), "merged skims already exist, nothing done");
        }
        MergeOutcome::Merged { datasets } => {
            for d in &datasets {
                tracing::info!(dataset = %d.name, parts = d.parts, rows = d.rows, file = %d.path.display(), "merged");
            }
        }
    }
    Ok(())
}

fn read_render_config(path: &Path) -> Result<RenderConfig> {
    let bytes = std::fs::read(path)?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
    Ok(if ext == "json" { serde_json::from_slice(&bytes)? } else { serde_yaml_ng::from_slice(&bytes)? })
}

fn cmd_replot(inputs: &[PathBuf], output: &Path, plot_config: Option<&Path>) -> Result<()> {
    let config = match plot_config {
        Some(p) => read_render_config(p)?,
        None => RenderConfig::default(),
    };
    let plots = replot(&SvgRenderer::new(config), inputs, output)?;
    tracing::info!(plots = plots.len(), dir = %output.display(), "replot finished");
    Ok(())
}

fn cmd_summary(config: &Path, json: bool) -> Result<()> {
    let cfg = read_config(config)?;
    let datasets = cfg.datasets(cfg.chunk_size)?;
    let rows = summary::summarize(&datasets);
    let options = cfg.run_options(false);
    let norms = datasets
        .iter()
        .map(|d| Ok((d.name.as_str(), Normalization::compute(d, options.luminosity, options.limit)?)))
        .collect::<Result<Vec<_>>>()?;

    if json {
        let value = serde_json::json!({
            "analysis": cfg.analysis,
            "luminosity_pb": options.luminosity,
            "categories": rows,
            "normalizations": norms
                .iter()
                .map(|(name, n)| serde_json::json!({ "dataset": name, "normalization": n }))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print!("{}", summary::format_table(&rows));
        for (name, n) in &norms {
            println!("{name}: scale {:.6e}{}", n.event_scale(), if n.is_limited() { " (limited)" } else { "" });
        }
    }
    Ok(())
}
