// VMBENCH TEST ARTIFACTS
// AN ARTIFACT IS ONE NAMED INPUT FROM THE CATALOG: A MICROVM SHAPE, A GUEST
// KERNEL, OR A ROOTFS DISK. AN ArtifactSet HOLDS ONE KIND, DEDUPLICATED BY
// NAME, IN INSERTION ORDER -- THE MATRIX RELIES ON THAT ORDER.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{BenchError, Result};

static COPY_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Microvm,
    Kernel,
    Disk,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [Self::Microvm, Self::Kernel, Self::Disk];

    pub fn label(self) -> &'static str {
        match self {
            Self::Microvm => "microvm",
            Self::Kernel => "kernel",
            Self::Disk => "disk",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// MACHINE SHAPE CARRIED BY A MICROVM ARTIFACT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicrovmConfig {
    pub vcpu_count: usize,
    pub mem_size_mib: usize,
    #[serde(default)]
    pub smt: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    kind: ArtifactKind,
    name: String,
    path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ssh_key: Option<PathBuf>,
}

// IDENTITY IS (KIND, NAME). TWO CATALOG ENTRIES WITH THE SAME NAME ARE THE
// SAME ARTIFACT EVEN IF FETCHED TO DIFFERENT PATHS.
impl PartialEq for Artifact {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.name == other.name
    }
}

impl Eq for Artifact {}

impl Artifact {
    pub fn new(kind: ArtifactKind, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self { kind, name: name.into(), path: path.into(), ssh_key: None }
    }

    pub fn disk(name: impl Into<String>, path: impl Into<PathBuf>, ssh_key: impl Into<PathBuf>) -> Self {
        Self {
            kind: ArtifactKind::Disk,
            name: name.into(),
            path: path.into(),
            ssh_key: Some(ssh_key.into()),
        }
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // RESOLVE RELATIVE PATHS AGAINST THE CATALOG DIRECTORY
    pub(crate) fn rebase(mut self, base: &Path) -> Self {
        if self.path.is_relative() {
            self.path = base.join(&self.path);
        }
        if let Some(key) = self.ssh_key.take() {
            self.ssh_key = Some(if key.is_relative() { base.join(key) } else { key });
        }
        self
    }

    fn require_disk(&self) -> Result<()> {
        if self.kind != ArtifactKind::Disk {
            return Err(BenchError::NotADisk { name: self.name.clone(), kind: self.kind });
        }
        Ok(())
    }

    // WRITABLE CLONE OF A DISK IMAGE. THE CATALOG COPY STAYS PRISTINE.
    pub fn copy(&self, scratch_dir: &Path) -> Result<PathBuf> {
        self.require_disk()?;
        fs::create_dir_all(scratch_dir)?;
        let seq = COPY_SEQ.fetch_add(1, Ordering::Relaxed);
        let dest = scratch_dir.join(format!("{}-{}-{}.rw", self.name, std::process::id(), seq));
        fs::copy(&self.path, &dest)?;
        Ok(dest)
    }

    pub fn ssh_key(&self) -> Result<PathBuf> {
        self.require_disk()?;
        match &self.ssh_key {
            Some(key) => Ok(key.clone()),
            None => Ok(self.path.with_extension("id_rsa")),
        }
    }

    pub fn microvm_config(&self) -> Result<MicrovmConfig> {
        if self.kind != ArtifactKind::Microvm {
            return Err(BenchError::Collaborator(format!(
                "artifact {} is a {}, not a microvm config", self.name, self.kind
            )));
        }
        let raw = fs::read_to_string(&self.path)?;
        serde_json::from_str(&raw).map_err(|e| {
            BenchError::Collaborator(format!("bad microvm config {}: {}", self.path.display(), e))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    kind: ArtifactKind,
    items: Vec<Artifact>,
}

impl ArtifactSet {
    pub fn new(kind: ArtifactKind) -> Self {
        Self { kind, items: Vec::new() }
    }

    // BUILD FROM A CATALOG LISTING. ARTIFACTS OF ANOTHER KIND ARE REJECTED.
    pub fn from_artifacts(kind: ArtifactKind, artifacts: impl IntoIterator<Item = Artifact>) -> Result<Self> {
        let mut set = Self::new(kind);
        for a in artifacts {
            set.insert(a)?;
        }
        Ok(set)
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    // FALSE IF AN EQUAL ARTIFACT IS ALREADY PRESENT
    pub fn insert(&mut self, artifact: Artifact) -> Result<bool> {
        if artifact.kind != self.kind {
            return Err(BenchError::KindMismatch { this: self.kind, other: artifact.kind });
        }
        if self.items.contains(&artifact) {
            return Ok(false);
        }
        self.items.push(artifact);
        Ok(true)
    }

    pub fn union(&mut self, other: &ArtifactSet) -> Result<()> {
        if other.kind != self.kind {
            return Err(BenchError::KindMismatch { this: self.kind, other: other.kind });
        }
        for a in &other.items {
            self.insert(a.clone())?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Artifact> {
        self.items.get(idx)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Artifact> {
        self.items.iter()
    }
}

impl<'a> IntoIterator for &'a ArtifactSet {
    type Item = &'a Artifact;
    type IntoIter = std::slice::Iter<'a, Artifact>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
