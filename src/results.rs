// VMBENCH RESULTS SINK
// ONE RECORD PER MATRIX COMBINATION. WRITE-ONLY FROM THE ORCHESTRATOR'S SIDE;
// FORMATTING AND COMPARISON HAPPEN DOWNSTREAM.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pinning {
    pub thread: String,
    pub core: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchRecord {
    pub test: String,
    pub microvm: String,
    pub kernel: String,
    pub disk: String,
    pub cpu_model_name: String,
    pub host_kernel: String,
    pub timestamp: u64,
    pub pinning: Vec<Pinning>,
    pub spectre_v2: String,
    pub build_exit_code: i32,
    pub bench_exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

pub trait ResultsSink {
    fn record(&self, record: &BenchRecord) -> Result<()>;
}

// APPENDS ONE JSON OBJECT PER LINE. FLUSHED PER RECORD SO A LATER FAILING
// COMBINATION DOES NOT LOSE EARLIER RESULTS.
pub struct ResultsFileDumper {
    path: PathBuf,
    out: Mutex<BufWriter<File>>,
}

impl ResultsFileDumper {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open results file {}", path.display()))?;
        Ok(Self { path, out: Mutex::new(BufWriter::new(file)) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultsSink for ResultsFileDumper {
    fn record(&self, record: &BenchRecord) -> Result<()> {
        let line = serde_json::to_string(record)?;
        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow::anyhow!("results writer poisoned"))?;
        writeln!(out, "{}", line)?;
        out.flush()?;
        Ok(())
    }
}
