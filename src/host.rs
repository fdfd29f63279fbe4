// VMBENCH HOST INFO
// WHAT THE RESULTS RECORD NEEDS TO KNOW ABOUT THE MACHINE UNDER TEST

use std::fs;

use crate::topology::{parse_cpu_list, SYSFS_CPU_ROOT};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub cpu_model_name: String,
    pub kernel_version: String,
}

impl HostInfo {
    pub fn detect() -> Self {
        Self {
            cpu_model_name: cpu_model_name(),
            kernel_version: kernel_version(),
        }
    }
}

pub fn parse_cpu_model(cpuinfo: &str) -> Option<String> {
    cpuinfo
        .lines()
        .find(|l| l.starts_with("model name"))
        .and_then(|l| l.split_once(':'))
        .map(|(_, v)| v.trim().to_string())
}

pub fn cpu_model_name() -> String {
    fs::read_to_string("/proc/cpuinfo")
        .ok()
        .and_then(|raw| parse_cpu_model(&raw))
        .unwrap_or_else(|| "unknown".to_string())
}

pub fn kernel_version() -> String {
    fs::read_to_string("/proc/sys/kernel/osrelease")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

pub fn online_cpus() -> usize {
    fs::read_to_string(format!("{}/online", SYSFS_CPU_ROOT))
        .ok()
        .and_then(|raw| parse_cpu_list(&raw).ok())
        .map(|cpus| cpus.len())
        .unwrap_or(0)
}
