//! `afw` run configuration (YAML, or JSON by extension).

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use af_core::{ChunkLimit, DEFAULT_LUMINOSITY_PB, Dataset};
use af_events::source::LocalDataset;
use af_pipeline::RunOptions;
use af_skim::{ExecutionScope, SkimOptions, SkimStorage, StorageLocation};
use af_viz::RenderConfig;

/// Environment variable naming the default skim location.
pub const SKIM_LOCATION_ENV: &str = "AFW_SKIM_LOCATION";

/// One dataset of the `data` or `monte_carlo` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetEntry {
    /// Category the dataset fills.
    pub short_name: String,
    /// Parquet files, relative to the config file.
    pub files: Vec<PathBuf>,
    /// Cross-section in pb (simulated only).
    #[serde(default)]
    pub cross_section: Option<f64>,
    /// Declared generated events; summed from file entries when absent.
    #[serde(default)]
    pub event_count: Option<u64>,
}

/// Everything `afw` needs for one analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AfwConfig {
    /// Registered analysis name.
    pub analysis: String,

    /// Categories overlaid as signal; the analysis default when empty.
    #[serde(default)]
    pub signal: Vec<String>,

    /// Recorded data, by dataset name.
    #[serde(default)]
    pub data: BTreeMap<String, DatasetEntry>,

    /// Simulated samples, by dataset name.
    #[serde(default)]
    pub monte_carlo: BTreeMap<String, DatasetEntry>,

    /// Files never read.
    #[serde(default)]
    pub veto: Vec<PathBuf>,

    /// Results and plots.
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Skim root (`shared:<path>`, `local:<path>` or a bare node-local path).
    /// Falls back to `$AFW_SKIM_LOCATION`, then `<output>/skims`.
    #[serde(default)]
    pub skim_location: Option<String>,

    #[serde(default)]
    pub execution_scope: ExecutionScope,

    /// Entries per chunk when running on raw files.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Entries per chunk when skimming.
    #[serde(default = "default_skim_chunk_size")]
    pub skim_chunk_size: u64,

    /// Process at most this many chunks per dataset.
    #[serde(default)]
    pub max_chunks: Option<usize>,

    /// Integrated luminosity in pb⁻¹.
    #[serde(default = "default_luminosity")]
    pub luminosity: f64,

    /// Worker threads (0 = auto).
    #[serde(default)]
    pub threads: usize,

    #[serde(default)]
    pub retries: usize,

    /// Abort on the first chunk error.
    #[serde(default)]
    pub strict: bool,

    #[serde(default)]
    pub plot: RenderConfig,

    /// Directory holding the config; relative paths are resolved against it.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

fn default_output() -> PathBuf {
    PathBuf::from("afw-output")
}

fn default_chunk_size() -> u64 {
    500_000
}

fn default_skim_chunk_size() -> u64 {
    100_000
}

fn default_luminosity() -> f64 {
    DEFAULT_LUMINOSITY_PB
}

/// Read a config file; `.json` is parsed as JSON, anything else as YAML.
pub fn read_config(path: &Path) -> Result<AfwConfig> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("").to_ascii_lowercase();
    let mut cfg: AfwConfig = if ext == "json" {
        serde_json::from_slice(&bytes)?
    } else {
        serde_yaml_ng::from_slice(&bytes)?
    };
    cfg.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    cfg.validate()?;
    Ok(cfg)
}

impl AfwConfig {
    fn validate(&self) -> Result<()> {
        if self.data.is_empty() && self.monte_carlo.is_empty() {
            anyhow::bail!("config declares no datasets");
        }
        if let Some(name) = self.data.keys().find(|n| self.monte_carlo.contains_key(*n)) {
            anyhow::bail!("dataset '{name}' is declared as both data and monte_carlo");
        }
        for (name, entry) in &self.data {
            if entry.cross_section.is_some() || entry.event_count.is_some() {
                anyhow::bail!("data dataset '{name}' must not set cross_section or event_count");
            }
        }
        if let Some((name, _)) = self.monte_carlo.iter().find(|(_, e)| e.cross_section.is_none()) {
            anyhow::bail!("monte_carlo dataset '{name}' needs a cross_section");
        }
        if self.chunk_size == 0 || self.skim_chunk_size == 0 {
            anyhow::bail!("chunk sizes must be positive");
        }
        if matches!(self.max_chunks, Some(0)) {
            anyhow::bail!("max_chunks must be positive when set");
        }
        Ok(())
    }

    /// `path` relative to the config file, unless absolute.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() { path.to_path_buf() } else { self.base_dir.join(path) }
    }

    /// Output directory.
    pub fn output_dir(&self) -> PathBuf {
        self.resolve_path(&self.output)
    }

    /// Every declared dataset, data first, each section in name order.
    pub fn local_datasets(&self) -> Vec<LocalDataset> {
        let section = |entries: &BTreeMap<String, DatasetEntry>, is_simulated: bool| {
            entries
                .iter()
                .map(|(name, e)| LocalDataset {
                    name: name.clone(),
                    short_name: e.short_name.clone(),
                    is_simulated,
                    cross_section: e.cross_section,
                    event_count: e.event_count,
                    files: e.files.iter().map(|f| self.resolve_path(f)).collect(),
                })
                .collect::<Vec<_>>()
        };
        let mut out = section(&self.data, false);
        out.extend(section(&self.monte_carlo, true));
        out
    }

    /// Partition every dataset into chunks of `step` entries, dropping vetoed
    /// files and datasets left without events.
    pub fn datasets(&self, step: u64) -> Result<Vec<Dataset>> {
        let veto: HashSet<PathBuf> = self.veto.iter().map(|f| self.resolve_path(f)).collect();
        let mut out = Vec::new();
        for local in self.local_datasets() {
            if let Some(ds) = local.resolve(&veto, step).with_context(|| format!("dataset '{}'", local.name))? {
                out.push(ds);
            }
        }
        if out.is_empty() {
            anyhow::bail!("no dataset has any events");
        }
        Ok(out)
    }

    /// Chunk limit from `max_chunks`.
    pub fn limit(&self) -> ChunkLimit {
        self.max_chunks.map(ChunkLimit::max).unwrap_or_else(ChunkLimit::unlimited)
    }

    /// Run options; `strict` is forced on by `debug`.
    pub fn run_options(&self, debug: bool) -> RunOptions {
        RunOptions {
            luminosity: self.luminosity,
            limit: self.limit(),
            threads: self.threads,
            strict: self.strict || debug,
            retries: self.retries,
        }
    }

    /// Skim options; `strict` is forced on by `debug`.
    pub fn skim_options(&self, debug: bool, overwrite: bool, baseline: Option<PathBuf>) -> SkimOptions {
        SkimOptions {
            threads: self.threads,
            overwrite,
            strict: self.strict || debug,
            retries: self.retries,
            limit: self.limit(),
            baseline: baseline.map(|b| self.resolve_path(&b)),
        }
    }

    /// Skim location from the config, the environment, or under the output directory.
    pub fn skim_location(&self) -> Result<StorageLocation> {
        let raw = match &self.skim_location {
            Some(s) => Some(s.clone()),
            None => std::env::var(SKIM_LOCATION_ENV).ok().filter(|s| !s.trim().is_empty()),
        };
        let location = match raw {
            Some(s) => StorageLocation::parse(&s)?,
            None => StorageLocation::NodeLocal(self.output_dir().join("skims")),
        };
        Ok(match location {
            StorageLocation::NodeLocal(p) => StorageLocation::NodeLocal(self.resolve_path(&p)),
            StorageLocation::Shared(p) => StorageLocation::Shared(self.resolve_path(&p)),
        })
    }

    /// Validated skim storage for the configured execution scope.
    pub fn skim_storage(&self) -> Result<SkimStorage> {
        Ok(SkimStorage::new(self.skim_location()?, self.execution_scope)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
analysis: dilepton
data:
  DoubleMuon_2022C: { short_name: Data, files: [data/a.parquet] }
monte_carlo:
  TTTo2L2Nu:
    short_name: TTbar
    cross_section: 98.0
    files: [/store/tt.parquet]
max_chunks: 2
plot: { ratio: false }
"#;

    fn parse(s: &str) -> AfwConfig {
        let mut cfg: AfwConfig = serde_yaml_ng::from_str(s).unwrap();
        cfg.base_dir = PathBuf::from("/cfg");
        cfg
    }

    #[test]
    fn defaults_and_sections() {
        let cfg = parse(YAML);
        cfg.validate().unwrap();
        assert_eq!(cfg.chunk_size, 500_000);
        assert_eq!(cfg.skim_chunk_size, 100_000);
        assert_eq!(cfg.luminosity, DEFAULT_LUMINOSITY_PB);
        assert!(!cfg.plot.ratio);
        assert_eq!(cfg.plot.experiment.name, "CMS");

        let locals = cfg.local_datasets();
        assert_eq!(locals.len(), 2);
        assert!(!locals[0].is_simulated);
        assert_eq!(locals[0].files, vec![PathBuf::from("/cfg/data/a.parquet")]);
        assert!(locals[1].is_simulated);
        assert_eq!(locals[1].files, vec![PathBuf::from("/store/tt.parquet")]);
    }

    #[test]
    fn debug_forces_strict() {
        let cfg = parse(YAML);
        assert!(!cfg.run_options(false).strict);
        assert!(cfg.run_options(true).strict);
        assert!(cfg.skim_options(true, false, None).strict);
        assert_eq!(cfg.run_options(false).limit, ChunkLimit::max(2));
    }

    #[test]
    fn rejects_inconsistent_datasets() {
        let mut cfg = parse(YAML);
        cfg.monte_carlo.get_mut("TTTo2L2Nu").unwrap().cross_section = None;
        assert!(cfg.validate().unwrap_err().to_string().contains("cross_section"));

        let mut cfg = parse(YAML);
        cfg.data.get_mut("DoubleMuon_2022C").unwrap().event_count = Some(10);
        assert!(cfg.validate().is_err());

        assert!(serde_yaml_ng::from_str::<AfwConfig>("analysis: x\nlumi: 3\n").is_err());
    }

    #[test]
    fn explicit_skim_location() {
        let mut cfg = parse(YAML);
        cfg.skim_location = Some("shared:skims".into());
        cfg.execution_scope = ExecutionScope::MultiNode;
        assert_eq!(cfg.skim_location().unwrap(), StorageLocation::Shared(PathBuf::from("/cfg/skims")));
        assert!(cfg.skim_storage().is_ok());

        cfg.skim_location = Some("local:/scratch".into());
        assert!(cfg.skim_storage().is_err());
    }
}
