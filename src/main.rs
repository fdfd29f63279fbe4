// VMBENCH v0.3.0 -- PINNED MICROVM BENCHMARK MATRIX
//
// ONE COMBINATION AT A TIME. CTRL+C STOPS THE MATRIX BETWEEN COMBINATIONS;
// THE COMBINATION IN FLIGHT RUNS TO COMPLETION.

mod cli;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vmbench::config::BenchConfig;
use vmbench::host::online_cpus;
use vmbench::workload::{plan_pinning, unixbench_matrix, unixbench_workload};

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[derive(Parser)]
#[command(name = "vmbench")]
#[command(about = "VMBENCH -- PINNED MICROVM BENCHMARK MATRIX")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    // RUN THE UNIXBENCH MATRIX
    Run {
        // TOML CONFIG (DEFAULT: $VMBENCH_CONFIG, THEN BUILT-IN DEFAULTS)
        #[arg(long)]
        config: Option<PathBuf>,

        // RECORD FAILING COMBINATIONS AND KEEP GOING
        #[arg(long)]
        continue_on_failure: bool,

        // LIST COMBINATIONS AND PIN PLANS, BOOT NOTHING
        #[arg(long)]
        dry_run: bool,
    },

    // CHECK HOST DEPENDENCIES (KVM, FIRECRACKER, SSH)
    Check,

    // PRINT SIBLING GROUPS AND THE PIN PLAN FOR A VM
    Topology {
        #[arg(long, default_value_t = 2)]
        vcpus: usize,
    },

    // OFFLINE TESTS, THEN THE ROOT-ONLY BENCHMARK TEST
    TestGate,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vmbench=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match Cli::parse().command {
        Command::Run { config, continue_on_failure, dry_run } => {
            run(config, continue_on_failure, dry_run)
        }
        Command::Check => cli::check::run_check(),
        Command::Topology { vcpus } => cli::topology::run_topology(vcpus),
        Command::TestGate => cli::test_gate::run_test_gate(),
    }
}

fn run(config: Option<PathBuf>, continue_on_failure: bool, dry_run: bool) -> Result<()> {
    let mut cfg = BenchConfig::load(config.as_deref())?;
    cfg.continue_on_failure |= continue_on_failure;

    println!("VMBENCH v0.3.0");
    println!("TEST:            {}", cfg.name);
    println!("CATALOG:         {}", cfg.catalog_dir.display());
    println!("KEYWORDS:        microvm={} kernel={} disk={}",
             cfg.artifacts.microvm, cfg.artifacts.kernel, cfg.artifacts.disk);
    println!("CPU TEMPLATE:    {}", cfg.cpu_template);
    println!("ONLINE CPUS:     {}", online_cpus());
    println!("ON FAILURE:      {}", if cfg.continue_on_failure { "CONTINUE" } else { "ABORT" });
    println!("RESULTS:         {}", cfg.results_file.display());
    println!();

    let matrix = unixbench_matrix(cfg)?;

    if dry_run {
        println!("{} COMBINATIONS", matrix.len());
        let topology = &matrix.custom().topology;
        for (i, combo) in matrix.combinations().enumerate() {
            let names: Vec<&str> = combo.iter().map(|a| a.name()).collect();
            println!("  {:>3}  {}", i + 1, names.join("  "));
        }
        for vm in matrix.sets().iter().flat_map(|s| s.iter()) {
            let Ok(shape) = vm.microvm_config() else { continue };
            match plan_pinning(topology, shape.vcpu_count) {
                Ok(plan) => {
                    let cells: Vec<String> = plan.iter().map(|(t, c)| format!("{}={}", t, c)).collect();
                    println!("  PIN {}: {}", vm.name(), cells.join(" "));
                }
                Err(e) => println!("  PIN {}: {}", vm.name(), e),
            }
        }
        return Ok(());
    }

    ctrlc::set_handler(move || {
        SHUTDOWN.store(true, Ordering::Relaxed);
    })?;

    println!("VMBENCH IS RUNNING (CTRL+C STOPS AFTER THE CURRENT COMBINATION)");
    let report = matrix.run_test_until(unixbench_workload, &SHUTDOWN)?;
    report.summary();

    if !report.is_success() {
        bail!("{} of {} combinations did not pass", report.total - report.passed(), report.total);
    }
    println!("VMBENCH OUT.");
    Ok(())
}
