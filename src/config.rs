//! Benchmark configuration.
//!
//! Loaded from a TOML file; every field has a default matching the stock
//! UnixBench syscall run, so an empty file (or no file) is valid:
//!
//! ```toml
//! name = "unixbench_test"
//! catalog_dir = "/srv/vmbench/artifacts"
//! continue_on_failure = false
//! cpu_template = "T2"
//!
//! [artifacts]
//! microvm = "2vcpu_1024mb"
//! kernel = "4.14"
//! disk = "bionic"
//!
//! [network]
//! tap = "vmtap0"
//! guest_ip = "172.16.0.2"
//! ```

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_ENV: &str = "VMBENCH_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub name: String,
    pub catalog_dir: PathBuf,
    pub scratch_dir: PathBuf,
    pub results_file: PathBuf,
    pub continue_on_failure: bool,
    pub cpu_template: String,
    pub artifacts: ArtifactKeywords,
    pub firecracker: FirecrackerSettings,
    pub network: NetworkSettings,
    pub ssh: SshSettings,
    pub benchmark: BenchmarkSettings,
}

// CATALOG KEYWORDS, ONE PER MATRIX DIMENSION
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactKeywords {
    pub microvm: String,
    pub kernel: String,
    pub disk: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirecrackerSettings {
    pub binary: PathBuf,
    pub boot_args: String,
    pub boot_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    pub tap: String,
    pub guest_mac: String,
    pub guest_ip: Ipv4Addr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSettings {
    pub username: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkSettings {
    pub build_cmd: String,
    pub run_cmd: String,
    pub spectre_cmd: String,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            name: "unixbench_test".to_string(),
            catalog_dir: PathBuf::from("/srv/vmbench/artifacts"),
            scratch_dir: PathBuf::from("/tmp/vmbench/scratch"),
            results_file: PathBuf::from("/tmp/vmbench/results.ndjson"),
            continue_on_failure: false,
            cpu_template: "T2".to_string(),
            artifacts: ArtifactKeywords::default(),
            firecracker: FirecrackerSettings::default(),
            network: NetworkSettings::default(),
            ssh: SshSettings::default(),
            benchmark: BenchmarkSettings::default(),
        }
    }
}

impl Default for ArtifactKeywords {
    fn default() -> Self {
        Self {
            microvm: "2vcpu_1024mb".to_string(),
            kernel: "4.14".to_string(),
            disk: "bionic".to_string(),
        }
    }
}

impl Default for FirecrackerSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("firecracker"),
            boot_args: "console=ttyS0 reboot=k panic=1 pci=off".to_string(),
            boot_timeout_secs: 10,
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            tap: "vmtap0".to_string(),
            guest_mac: "06:00:ac:10:00:02".to_string(),
            guest_ip: Ipv4Addr::new(172, 16, 0, 2),
        }
    }
}

impl Default for SshSettings {
    fn default() -> Self {
        Self { username: "root".to_string(), timeout_secs: 10 }
    }
}

impl Default for BenchmarkSettings {
    fn default() -> Self {
        Self {
            build_cmd: "cd ~/byte-unixbench-master/UnixBench; make".to_string(),
            run_cmd: "cd ~/byte-unixbench-master/UnixBench; ./Run syscall".to_string(),
            spectre_cmd: "cat /sys/devices/system/cpu/vulnerabilities/spectre_v2".to_string(),
        }
    }
}

impl BenchConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Explicit path first, then `$VMBENCH_CONFIG`, then built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(p) = path {
            return Self::from_file(p);
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(p) => Self::from_file(PathBuf::from(p)),
            None => Ok(Self::default()),
        }
    }
}
