// VMBENCH ARTIFACT CATALOG
// LOOKUP BY KIND + NAME KEYWORD. LocalCatalog SERVES A DIRECTORY THAT WAS
// SYNCED FROM THE ARTIFACT BUCKET AHEAD OF TIME:
//
//   <dir>/catalog.json  {"artifacts": [{"kind": "disk", "name": "bionic",
//                          "path": "disks/bionic.ext4",
//                          "ssh_key": "disks/bionic.id_rsa"}, ...]}

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::artifacts::{Artifact, ArtifactKind, ArtifactSet};
use crate::error::{BenchError, Result};

pub const MANIFEST: &str = "catalog.json";

pub trait ArtifactCatalog {
    fn list(&self, kind: ArtifactKind, keyword: &str) -> Result<Vec<Artifact>>;

    fn set(&self, kind: ArtifactKind, keyword: &str) -> Result<ArtifactSet> {
        ArtifactSet::from_artifacts(kind, self.list(kind, keyword)?)
    }

    fn microvms(&self, keyword: &str) -> Result<ArtifactSet> {
        self.set(ArtifactKind::Microvm, keyword)
    }

    fn kernels(&self, keyword: &str) -> Result<ArtifactSet> {
        self.set(ArtifactKind::Kernel, keyword)
    }

    fn disks(&self, keyword: &str) -> Result<ArtifactSet> {
        self.set(ArtifactKind::Disk, keyword)
    }
}

#[derive(Deserialize)]
struct Manifest {
    artifacts: Vec<Artifact>,
}

pub struct LocalCatalog {
    dir: PathBuf,
    artifacts: Vec<Artifact>,
}

impl LocalCatalog {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let path = dir.join(MANIFEST);
        let raw = fs::read_to_string(&path)?;
        let manifest: Manifest = serde_json::from_str(&raw).map_err(|e| {
            BenchError::Collaborator(format!("bad catalog {}: {}", path.display(), e))
        })?;
        let artifacts = manifest
            .artifacts
            .into_iter()
            .map(|a| a.rebase(&dir))
            .collect::<Vec<_>>();
        debug!(dir = %dir.display(), count = artifacts.len(), "opened artifact catalog");
        Ok(Self { dir, artifacts })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactCatalog for LocalCatalog {
    // EMPTY KEYWORD MATCHES EVERYTHING OF THAT KIND
    fn list(&self, kind: ArtifactKind, keyword: &str) -> Result<Vec<Artifact>> {
        Ok(self
            .artifacts
            .iter()
            .filter(|a| a.kind() == kind && a.name().contains(keyword))
            .cloned()
            .collect())
    }
}
