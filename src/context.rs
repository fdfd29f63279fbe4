// VMBENCH TEST CONTEXT
// Custom: COLLABORATORS SHARED BY EVERY COMBINATION, FIXED AT CONSTRUCTION.
// TestContext: ONE PER COMBINATION, BUILT FRESH BY THE MATRIX. IT BORROWS
// Custom AND BINDS EXACTLY ONE ARTIFACT PER KIND. NOTHING IS OVERWRITTEN IN
// PLACE BETWEEN COMBINATIONS.

use std::collections::BTreeMap;

use crate::artifacts::{Artifact, ArtifactKind};
use crate::config::BenchConfig;
use crate::host::HostInfo;
use crate::results::ResultsSink;
use crate::ssh::ShellConnector;
use crate::topology::Topology;
use crate::vm::VmBuilder;

pub struct Custom {
    pub name: String,
    pub builder: Box<dyn VmBuilder>,
    pub results_file_dumper: Box<dyn ResultsSink>,
    pub shell: Box<dyn ShellConnector>,
    pub topology: Topology,
    pub host: HostInfo,
    pub config: BenchConfig,
    pub metadata: BTreeMap<String, String>,
}

impl Custom {
    pub fn new(
        name: impl Into<String>,
        builder: Box<dyn VmBuilder>,
        results_file_dumper: Box<dyn ResultsSink>,
        shell: Box<dyn ShellConnector>,
        topology: Topology,
    ) -> Self {
        Self {
            name: name.into(),
            builder,
            results_file_dumper,
            shell,
            topology,
            host: HostInfo {
                cpu_model_name: "unknown".to_string(),
                kernel_version: "unknown".to_string(),
            },
            config: BenchConfig::default(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_host(mut self, host: HostInfo) -> Self {
        self.host = host;
        self
    }

    pub fn with_config(mut self, config: BenchConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub struct TestContext<'a> {
    pub custom: &'a Custom,
    pub microvm: &'a Artifact,
    pub kernel: &'a Artifact,
    pub disk: &'a Artifact,
    // POSITION IN THE MATRIX (0-BASED) AND TOTAL COMBINATIONS
    pub index: usize,
    pub total: usize,
}

impl<'a> TestContext<'a> {
    pub fn artifact(&self, kind: ArtifactKind) -> &'a Artifact {
        match kind {
            ArtifactKind::Microvm => self.microvm,
            ArtifactKind::Kernel => self.kernel,
            ArtifactKind::Disk => self.disk,
        }
    }

    // "microvm=2vcpu_1024mb kernel=vmlinux-4.14 disk=bionic"
    pub fn label(&self) -> String {
        ArtifactKind::ALL
            .iter()
            .map(|&k| format!("{}={}", k, self.artifact(k).name()))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
