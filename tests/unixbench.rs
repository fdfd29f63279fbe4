// VMBENCH UNIXBENCH MATRIX -- REAL FIRECRACKER MICROVMS
// MICROVM SHAPES x KERNELS x DISKS FROM THE LOCAL CATALOG. EACH COMBINATION
// BOOTS A GUEST, PINS ITS THREADS AND RUNS THE UnixBench SYSCALL SUITE.
//
// REQUIRES ROOT + KVM + FIRECRACKER + A POPULATED CATALOG.
// RUN: sudo -E cargo test --test unixbench --release -- --ignored --test-threads=1 --nocapture
// CONFIG: $VMBENCH_CONFIG (TOML), ELSE BUILT-IN DEFAULTS.

use vmbench::config::BenchConfig;
use vmbench::workload::{unixbench_matrix, unixbench_workload};

#[test]
#[ignore]
fn unixbench_syscalls() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vmbench=info".into()),
        )
        .with_test_writer()
        .try_init();

    let config = BenchConfig::load(None).expect("loading config");
    let matrix = unixbench_matrix(config).expect("assembling matrix");
    assert!(!matrix.is_empty(), "catalog yielded no combinations");

    let report = matrix.run_test(unixbench_workload).expect("matrix aborted");
    report.summary();
    assert!(report.is_success(), "{} combination(s) failed", report.failed());
}
