use std::process::Command;

use anyhow::{bail, Result};

use super::TARGET_DIR;

pub fn run_test_gate() -> Result<()> {
    let project_root = env!("CARGO_MANIFEST_DIR");

    println!();
    println!("VMBENCH TEST GATE");
    println!("{}", "=".repeat(60));

    // LAYER 1: OFFLINE TESTS (NO ROOT, NO KVM)
    println!("LAYER 1: UNIT + OFFLINE INTEGRATION TESTS");
    let l1 = Command::new("cargo")
        .args(["test", "--release"])
        .env("CARGO_TARGET_DIR", TARGET_DIR)
        .current_dir(project_root)
        .status()?;

    if !l1.success() {
        bail!("LAYER 1 FAILED -- SKIPPING BENCHMARK");
    }
    println!();

    // LAYER 2: THE BENCHMARK MATRIX (ROOT FOR THREAD AFFINITY + TAP DEVICES)
    println!("LAYER 2: UNIXBENCH MATRIX (REQUIRES ROOT + KVM)");
    let l2 = Command::new("sudo")
        .args([
            "-E",
            &format!("CARGO_TARGET_DIR={}", TARGET_DIR),
            "cargo",
            "test",
            "--test",
            "unixbench",
            "--release",
            "--",
            "--ignored",
            "--test-threads=1",
            "--nocapture",
        ])
        .env("CARGO_TARGET_DIR", TARGET_DIR)
        .current_dir(project_root)
        .status()?;

    if !l2.success() {
        std::process::exit(l2.code().unwrap_or(1));
    }

    Ok(())
}
