//! Per-chunk skim records, dataset manifests and file helpers.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use af_core::{ChunkRef, Error, Result, SkimCoverage};

use crate::storage::StorageLocation;

/// Schema version of skim records and manifests.
pub const SKIM_SCHEMA_V1: &str = "af_skim_v1";

/// Manifest file name inside a dataset skim directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Parquet metadata key: analysis that wrote the skim.
pub const META_KEY_ANALYSIS: &str = "afw.analysis";
/// Parquet metadata key: version of that analysis.
pub const META_KEY_ANALYSIS_VERSION: &str = "afw.analysis_version";
/// Parquet metadata key: source dataset name.
pub const META_KEY_DATASET: &str = "afw.dataset";
/// Parquet metadata key: [`SkimCoverage`] as JSON, on merged skims.
pub const META_KEY_COVERAGE: &str = "afw.skim_coverage";

/// The full skim a delta was computed against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineSkimRecord {
    /// Baseline Parquet file.
    pub path: PathBuf,
    /// SHA-256 of that file when the delta was written.
    pub sha256: String,
    /// Rows in the baseline file.
    pub rows: u64,
}

/// What a skim file holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkimKind {
    /// Complete events.
    Full,
    /// Surviving baseline rows plus altered fields.
    Delta {
        /// Baseline identity.
        baseline: BaselineSkimRecord,
    },
}

/// One skimmed chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkimRecord {
    /// Always [`SKIM_SCHEMA_V1`].
    pub schema_version: String,
    /// Analysis that wrote the skim.
    pub analysis: String,
    /// Its version.
    pub analysis_version: String,
    /// Source dataset name.
    pub dataset: String,
    /// Chunk the skim was made from.
    pub source: ChunkRef,
    /// Storage the file was written to.
    pub location: StorageLocation,
    /// Skim file.
    pub file: PathBuf,
    /// Rows after preselection.
    pub rows: u64,
    /// Fields, in file order.
    pub fields: Vec<String>,
    /// Full or delta.
    #[serde(flatten)]
    pub kind: SkimKind,
    /// SHA-256 of `file`.
    pub sha256: String,
}

impl SkimRecord {
    /// Whether the file is a delta.
    pub fn is_delta(&self) -> bool {
        matches!(self.kind, SkimKind::Delta { .. })
    }

    /// Write the record atomically.
    pub fn write(&self, path: &Path) -> Result<()> {
        write_atomic(path, serde_json::to_string_pretty(self)?.as_bytes())
    }

    /// Read a record.
    pub fn read(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).map_err(|e| Error::storage(path.display(), e))?;
        let r: SkimRecord = serde_json::from_str(&s)?;
        check_schema(&r.schema_version, path)?;
        Ok(r)
    }
}

/// All records of one dataset skim, by chunk ordinal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkimManifest {
    /// Always [`SKIM_SCHEMA_V1`].
    pub schema_version: String,
    /// Analysis that wrote the skim.
    pub analysis: String,
    /// Its version.
    pub analysis_version: String,
    /// Source dataset name.
    pub dataset: String,
    /// Source chunks scheduled, and those that failed.
    pub coverage: SkimCoverage,
    /// Records of the chunks that were written, sorted by source ordinal.
    pub records: Vec<SkimRecord>,
}

impl SkimManifest {
    /// Collect records; they are sorted by source ordinal.
    pub fn new(
        analysis: impl Into<String>,
        analysis_version: impl Into<String>,
        dataset: impl Into<String>,
        coverage: SkimCoverage,
        mut records: Vec<SkimRecord>,
    ) -> Self {
        records.sort_by_key(|r| r.source.ordinal);
        Self {
            schema_version: SKIM_SCHEMA_V1.to_string(),
            analysis: analysis.into(),
            analysis_version: analysis_version.into(),
            dataset: dataset.into(),
            coverage,
            records,
        }
    }

    /// Whether every scheduled source chunk has a record.
    pub fn is_complete(&self) -> bool {
        self.coverage.failed.is_empty()
    }

    /// Record of source chunk `ordinal`.
    pub fn find(&self, ordinal: usize) -> Option<&SkimRecord> {
        self.records
            .binary_search_by_key(&ordinal, |r| r.source.ordinal)
            .ok()
            .map(|i| &self.records[i])
    }

    /// Skimmed rows over all records.
    pub fn rows(&self) -> u64 {
        self.records.iter().map(|r| r.rows).sum()
    }

    /// Whether any record is a delta.
    pub fn has_delta(&self) -> bool {
        self.records.iter().any(SkimRecord::is_delta)
    }

    /// Refuse skims written by another analysis or analysis version.
    pub fn check_analysis(&self, analysis: &str, version: &str) -> Result<()> {
        check_provenance(
            &self.dataset,
            Some(&self.analysis),
            Some(&self.analysis_version),
            analysis,
            version,
        )
    }

    /// Write `<dir>/manifest.json` atomically.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(MANIFEST_FILE);
        write_atomic(&path, serde_json::to_string_pretty(self)?.as_bytes())?;
        Ok(path)
    }

    /// Read `<dir>/manifest.json`.
    pub fn read(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let s = std::fs::read_to_string(&path).map_err(|e| Error::storage(path.display(), e))?;
        let m: SkimManifest = serde_json::from_str(&s)?;
        check_schema(&m.schema_version, &path)?;
        m.coverage.validate()?;
        if m.records.len() + m.coverage.failed.len() != m.coverage.scheduled_chunks {
            return Err(Error::Validation(format!(
                "{}: {} records and {} failed chunks do not add up to {} scheduled",
                path.display(),
                m.records.len(),
                m.coverage.failed.len(),
                m.coverage.scheduled_chunks
            )));
        }
        Ok(m)
    }
}

/// Parquet metadata stamped on every skim file.
pub fn skim_metadata(analysis: &str, version: &str, dataset: &str) -> HashMap<String, String> {
    HashMap::from([
        (META_KEY_ANALYSIS.to_string(), analysis.to_string()),
        (META_KEY_ANALYSIS_VERSION.to_string(), version.to_string()),
        (META_KEY_DATASET.to_string(), dataset.to_string()),
    ])
}

/// Compare recorded provenance with the running analysis.
pub(crate) fn check_provenance(
    skim: &str,
    found_analysis: Option<&str>,
    found_version: Option<&str>,
    analysis: &str,
    version: &str,
) -> Result<()> {
    match (found_analysis, found_version) {
        (Some(a), Some(v)) if a == analysis && v == version => Ok(()),
        (Some(a), Some(v)) => Err(Error::Validation(format!(
            "skim '{skim}' was written by {a} v{v}, running {analysis} v{version}; re-run the skim"
        ))),
        _ => Err(Error::Validation(format!("skim '{skim}' carries no analysis provenance"))),
    }
}

fn check_schema(found: &str, path: &Path) -> Result<()> {
    if found != SKIM_SCHEMA_V1 {
        return Err(Error::Validation(format!(
            "{}: unsupported skim schema_version '{found}', expected '{SKIM_SCHEMA_V1}'",
            path.display()
        )));
    }
    Ok(())
}

/// Hex SHA-256 of a file's bytes.
pub fn sha256_file(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| Error::storage(path.display(), e))?;
    let out = Sha256::digest(&bytes);
    let mut s = String::with_capacity(64);
    for b in out {
        s.push_str(&format!("{:02x}", b));
    }
    Ok(s)
}

/// Sibling temporary path used before the final rename.
pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}

/// Move a fully written temporary file into place.
pub(crate) fn commit(tmp: &Path, path: &Path) -> Result<()> {
    std::fs::rename(tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(tmp);
        Error::storage(path.display(), format!("failed to move skim into place: {e}"))
    })
}

/// Write `bytes` to a temporary sibling, then rename over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = tmp_path(path);
    let mut f = std::fs::File::create(&tmp).map_err(|e| Error::storage(tmp.display(), e))?;
    f.write_all(bytes).map_err(|e| Error::storage(tmp.display(), e))?;
    drop(f);
    commit(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use af_core::ChunkKind;

    fn record(ordinal: usize, kind: SkimKind) -> SkimRecord {
        SkimRecord {
            schema_version: SKIM_SCHEMA_V1.into(),
            analysis: "dilepton".into(),
            analysis_version: "2".into(),
            dataset: "TTTo2L2Nu".into(),
            source: ChunkRef {
                ordinal,
                path: "/store/tt.parquet".into(),
                entry_start: 0,
                entry_stop: 10,
                kind: ChunkKind::Events,
            },
            location: StorageLocation::NodeLocal("/skims".into()),
            file: format!("/skims/dilepton/TTTo2L2Nu/part-{ordinal:05}.parquet").into(),
            rows: 4,
            fields: vec!["MET_pt".into()],
            kind,
            sha256: "00".into(),
        }
    }

    #[test]
    fn manifest_sorts_and_finds() {
        let coverage = SkimCoverage {
            source_chunks: 3,
            source_entries: 30,
            scheduled_chunks: 3,
            scheduled_entries: 30,
            failed: vec![1],
        };
        let m = SkimManifest::new(
            "dilepton",
            "2",
            "TTTo2L2Nu",
            coverage,
            vec![record(2, SkimKind::Full), record(0, SkimKind::Full)],
        );
        assert!(!m.is_complete());
        assert_eq!(m.records[0].source.ordinal, 0);
        assert!(m.find(2).is_some());
        assert!(m.find(1).is_none());
        assert_eq!(m.rows(), 8);
        assert!(!m.has_delta());
    }

    #[test]
    fn provenance_mismatch_is_rejected() {
        let m = SkimManifest::new("dilepton", "2", "TTTo2L2Nu", SkimCoverage::default(), vec![]);
        assert!(m.check_analysis("dilepton", "2").is_ok());
        assert!(matches!(m.check_analysis("dilepton", "3"), Err(Error::Validation(_))));
        assert!(check_provenance("x", None, None, "dilepton", "2").is_err());
    }

    #[test]
    fn record_json_roundtrip() {
        let r = record(
            1,
            SkimKind::Delta {
                baseline: BaselineSkimRecord { path: "/base/part-00001.parquet".into(), sha256: "ab".into(), rows: 9 },
            },
        );
        let s = serde_json::to_string(&r).unwrap();
        assert!(s.contains("\"kind\":\"delta\""));
        let back: SkimRecord = serde_json::from_str(&s).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn sha256_of_known_bytes() {
        let nanos = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos();
        let p = std::env::temp_dir().join(format!("af_skim_sha_{}_{nanos}", std::process::id()));
        write_atomic(&p, b"abc").unwrap();
        assert_eq!(
            sha256_file(&p).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(!tmp_path(&p).exists());
        std::fs::remove_file(&p).ok();
    }
}
