// VMBENCH -- PINNED MICROVM BENCHMARK MATRIX
// CROSS PRODUCT OF MICROVM SHAPES x KERNELS x DISKS. EACH COMBINATION BOOTS A
// MICROVM, PINS ITS VMM/API/VCPU THREADS TO DISTINCT PHYSICAL CORES, RUNS
// UnixBench IN THE GUEST OVER SSH AND APPENDS ONE RESULTS RECORD.
//
// PURE MODULES (TESTABLE OFFLINE): topology, alloc, artifacts, matrix, report.
// HOST-TOUCHING MODULES: firecracker, ssh, host, catalog, results.

pub mod alloc;
pub mod artifacts;
pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod firecracker;
pub mod host;
pub mod matrix;
pub mod report;
pub mod results;
pub mod ssh;
pub mod topology;
pub mod vm;
pub mod workload;

pub use error::{BenchError, Result};
