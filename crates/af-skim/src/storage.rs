//! Where skims live and who may see them.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use af_core::{Error, Result};

use crate::skimmed::escape_dataset_name;

/// Skim storage root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum StorageLocation {
    /// Disk of the node running the job; invisible to other nodes.
    NodeLocal(PathBuf),
    /// Filesystem mounted on every node.
    Shared(PathBuf),
}

impl StorageLocation {
    /// Parse `shared:<path>`, `local:<path>` or a bare path (node-local).
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (ctor, path): (fn(PathBuf) -> Self, &str) = if let Some(p) = s.strip_prefix("shared:") {
            (StorageLocation::Shared, p)
        } else if let Some(p) = s.strip_prefix("local:") {
            (StorageLocation::NodeLocal, p)
        } else {
            (StorageLocation::NodeLocal, s)
        };
        if path.is_empty() {
            return Err(Error::Validation(format!("skim location '{s}' has no path")));
        }
        Ok(ctor(PathBuf::from(path)))
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        match self {
            StorageLocation::NodeLocal(p) | StorageLocation::Shared(p) => p,
        }
    }

    /// Whether other nodes can read it.
    pub fn is_shared(&self) -> bool {
        matches!(self, StorageLocation::Shared(_))
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageLocation::NodeLocal(p) => write!(f, "local:{}", p.display()),
            StorageLocation::Shared(p) => write!(f, "shared:{}", p.display()),
        }
    }
}

/// How many nodes run chunk tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionScope {
    /// Every task runs on this node.
    #[default]
    SingleNode,
    /// Tasks may run on other nodes.
    MultiNode,
}

/// A validated storage location for a given execution scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkimStorage {
    location: StorageLocation,
    scope: ExecutionScope,
}

impl SkimStorage {
    /// Validate the combination: node-local storage needs single-node execution.
    pub fn new(location: StorageLocation, scope: ExecutionScope) -> Result<Self> {
        if scope == ExecutionScope::MultiNode && !location.is_shared() {
            return Err(Error::Validation(format!(
                "skim location {location} is node-local but execution spans several nodes; \
                 use a shared location"
            )));
        }
        Ok(Self { location, scope })
    }

    /// Storage location.
    pub fn location(&self) -> &StorageLocation {
        &self.location
    }

    /// Execution scope.
    pub fn scope(&self) -> ExecutionScope {
        self.scope
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        self.location.root()
    }

    /// `<root>/<analysis>`.
    pub fn analysis_dir(&self, analysis: &str) -> PathBuf {
        self.root().join(analysis)
    }

    /// `<root>/<analysis>/<escaped dataset>`.
    pub fn dataset_dir(&self, analysis: &str, dataset: &str) -> PathBuf {
        self.analysis_dir(analysis).join(escape_dataset_name(dataset))
    }

    /// Make the root usable before writing.
    ///
    /// A node-local root is created. A shared root must already exist and be
    /// writable; otherwise the whole store is down ([`Error::StorageOutage`]).
    pub fn prepare(&self) -> Result<()> {
        let root = self.root();
        match &self.location {
            StorageLocation::NodeLocal(_) => {
                std::fs::create_dir_all(root).map_err(|e| Error::storage(root.display(), e))
            }
            StorageLocation::Shared(_) => {
                self.check_reachable()?;
                let marker = root.join(format!(".afw-write-check-{}", std::process::id()));
                std::fs::write(&marker, b"")
                    .and_then(|_| std::fs::remove_file(&marker))
                    .map_err(|e| Error::StorageOutage {
                        location: root.display().to_string(),
                        message: format!("shared root is not writable: {e}"),
                    })
            }
        }
    }

    /// Fail with [`Error::StorageOutage`] when a shared root has gone away.
    ///
    /// Always succeeds for node-local storage.
    pub fn check_reachable(&self) -> Result<()> {
        if let StorageLocation::Shared(root) = &self.location
            && !root.is_dir()
        {
            return Err(Error::StorageOutage {
                location: root.display().to_string(),
                message: "shared root is not reachable".into(),
            });
        }
        Ok(())
    }
}
