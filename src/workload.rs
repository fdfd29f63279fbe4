// VMBENCH UNIXBENCH WORKLOAD
// ONE COMBINATION, STRICTLY IN ORDER:
//   PROVISION -> CAPACITY CHECK -> PIN VMM -> PIN API -> PIN VCPUs
//   -> BUILD BENCHMARK -> RUN BENCHMARK -> RECORD
// ANY FAILURE ABORTS THE COMBINATION. A HALF-PINNED VM IS NOT UNPINNED; IT
// IS TORN DOWN WHEN ITS HANDLE DROPS.

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::alloc::CoreAllocator;
use crate::catalog::{ArtifactCatalog, LocalCatalog};
use crate::config::{BenchConfig, BenchmarkSettings};
use crate::context::{Custom, TestContext};
use crate::error::BenchError;
use crate::firecracker::FirecrackerBuilder;
use crate::host::HostInfo;
use crate::matrix::TestMatrix;
use crate::results::{BenchRecord, Pinning, ResultsFileDumper};
use crate::ssh::{CommandOutput, RemoteShell, SshConnector};
use crate::topology::Topology;
use crate::vm::{BuildRequest, VmInstance, VmThread};

// ONE VMM THREAD + ONE API THREAD, EACH ON ITS OWN CORE
pub const NON_VCPU_THREADS: usize = 2;

// PIN ORDER: VMM, API, THEN VCPUs BY INDEX
pub fn pin_order(vcpus: usize) -> Vec<VmThread> {
    [VmThread::Vmm, VmThread::Api]
        .into_iter()
        .chain((0..vcpus).map(VmThread::Vcpu))
        .collect()
}

// WALK THE PIN ORDER: ALLOCATE A CORE, HAND IT TO `pin`, STOP ON THE FIRST
// REJECTION. THE `used` SET LIVES AND DIES HERE: IT IS NEVER SHARED WITH
// ANOTHER VM.
fn assign_cores<F>(
    topology: &Topology,
    vcpus: usize,
    mut pin: F,
) -> std::result::Result<Vec<(VmThread, usize)>, BenchError>
where
    F: FnMut(VmThread, usize) -> bool,
{
    let required = NON_VCPU_THREADS + vcpus;
    let available = topology.online_count();
    if available < required {
        return Err(BenchError::InsufficientCores { available, required });
    }

    let mut alloc = CoreAllocator::new(topology);
    let mut plan = Vec::with_capacity(required);
    for thread in pin_order(vcpus) {
        let core = alloc.next()?;
        if !pin(thread, core) {
            return Err(BenchError::PinRejected { thread, core });
        }
        plan.push((thread, core));
    }
    debug!(used = ?alloc.used(), "core assignment complete");
    Ok(plan)
}

// WHERE EACH THREAD OF A VM WITH `vcpus` VCPUs WOULD LAND. NOTHING IS PINNED.
pub fn plan_pinning(
    topology: &Topology,
    vcpus: usize,
) -> std::result::Result<Vec<(VmThread, usize)>, BenchError> {
    assign_cores(topology, vcpus, |_, _| true)
}

pub fn pin_vm_threads(
    vm: &mut dyn VmInstance,
    topology: &Topology,
) -> std::result::Result<Vec<(VmThread, usize)>, BenchError> {
    let vcpus = vm.vcpus_count();
    assign_cores(topology, vcpus, |thread, core| {
        info!("pinning {} on core {}", thread, core);
        vm.pin(thread, core)
    })
}

#[derive(Debug)]
pub struct BenchOutput {
    pub build: CommandOutput,
    pub spectre_v2: String,
    pub run: CommandOutput,
}

// BUILD MUST SUCCEED. THE RUN'S EXIT CODE IS ONLY RECORDED: UnixBench CAN
// EXIT NON-ZERO ON BENIGN CONDITIONS.
pub fn run_benchmark(shell: &dyn RemoteShell, cmds: &BenchmarkSettings) -> Result<BenchOutput> {
    let build = shell
        .execute_command(&cmds.build_cmd)
        .context("benchmark build command")?;
    if build.exit_code != 0 {
        debug!(stderr = %build.stderr, "build output");
        return Err(BenchError::BuildFailed { exit_code: build.exit_code }.into());
    }

    let spectre = shell
        .execute_command(&cmds.spectre_cmd)
        .context("spectre_v2 probe")?;
    let spectre_v2 = spectre.stdout.trim().to_string();
    info!(spectre_v2 = %spectre_v2, "guest mitigation status");

    let run = shell
        .execute_command(&cmds.run_cmd)
        .context("benchmark run command")?;
    if run.exit_code != 0 {
        warn!(exit_code = run.exit_code, "benchmark exited non-zero (recorded, not fatal)");
    }
    info!("benchmark stdout:\n{}", run.stdout);
    if !run.stderr.is_empty() {
        info!("benchmark stderr:\n{}", run.stderr);
    }

    Ok(BenchOutput { build, spectre_v2, run })
}

// WRITABLE DISK COPY, REMOVED WHEN THE COMBINATION ENDS
struct ScratchDisk {
    path: PathBuf,
}

impl Drop for ScratchDisk {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

pub fn unixbench_workload(ctx: &TestContext<'_>) -> Result<()> {
    let custom = ctx.custom;
    let cfg = &custom.config;

    // PROVISION
    let rw_disk = ScratchDisk {
        path: ctx
            .disk
            .copy(&cfg.scratch_dir)
            .with_context(|| format!("copying disk {}", ctx.disk.name()))?,
    };
    let ssh_key = ctx.disk.ssh_key()?;
    let machine = ctx.microvm.microvm_config()?;

    let mut vm = custom
        .builder
        .build(BuildRequest {
            kernel: ctx.kernel.path(),
            disks: vec![rw_disk.path.clone()],
            ssh_key,
            config: machine,
            cpu_template: &cfg.cpu_template,
        })
        .context("building microvm")?;
    vm.start().context("starting microvm")?;

    info!("testing with microvm: \"{}\", kernel {}, disk {}",
          ctx.microvm.name(), ctx.kernel.name(), ctx.disk.name());

    // CAPACITY CHECK + PINNING
    let plan = pin_vm_threads(&mut *vm, &custom.topology)?;

    // BENCHMARK
    let shell = custom
        .shell
        .connect(&vm.ssh_config())
        .context("connecting to guest")?;
    let out = run_benchmark(&*shell, &cfg.benchmark)?;

    let record = BenchRecord {
        test: custom.name.clone(),
        microvm: ctx.microvm.name().to_string(),
        kernel: ctx.kernel.name().to_string(),
        disk: ctx.disk.name().to_string(),
        cpu_model_name: custom.host.cpu_model_name.clone(),
        host_kernel: custom.host.kernel_version.clone(),
        timestamp: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
        pinning: plan
            .iter()
            .map(|(thread, core)| Pinning { thread: thread.to_string(), core: *core })
            .collect(),
        spectre_v2: out.spectre_v2,
        build_exit_code: out.build.exit_code,
        bench_exit_code: out.run.exit_code,
        stdout: out.run.stdout,
        stderr: out.run.stderr,
    };
    custom
        .results_file_dumper
        .record(&record)
        .context("writing results")?;

    // VM GOES DOWN BEFORE ITS DISK COPY IS REMOVED
    drop(vm);
    drop(rw_disk);
    Ok(())
}

// ASSEMBLE THE STOCK MATRIX FROM CONFIG: CATALOG LOOKUPS FOR THE THREE
// DIMENSIONS, HOST TOPOLOGY RESOLVED ONCE, FIRECRACKER + SSH COLLABORATORS.
pub fn unixbench_matrix(config: BenchConfig) -> Result<TestMatrix> {
    let catalog = LocalCatalog::open(&config.catalog_dir)
        .with_context(|| format!("opening catalog {}", config.catalog_dir.display()))?;
    let keywords = &config.artifacts;
    let microvms = catalog.microvms(&keywords.microvm)?;
    let kernels = catalog.kernels(&keywords.kernel)?;
    let disks = catalog.disks(&keywords.disk)?;
    info!(microvms = microvms.len(), kernels = kernels.len(), disks = disks.len(),
          "artifact sets resolved");

    let topology = Topology::from_sysfs().context("reading host cpu topology")?;
    let host = HostInfo::detect();
    info!("testing on processor {}", host.cpu_model_name);

    let custom = Custom::new(
        config.name.clone(),
        Box::new(FirecrackerBuilder::from_config(&config)),
        Box::new(ResultsFileDumper::create(&config.results_file)?),
        Box::new(SshConnector { timeout_secs: config.ssh.timeout_secs }),
        topology,
    )
    .with_host(host)
    .with_config(config.clone());

    Ok(TestMatrix::new(custom, vec![microvms, kernels, disks])?
        .continue_on_failure(config.continue_on_failure))
}
