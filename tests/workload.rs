// VMBENCH WORKLOAD TESTS
// PINNING PROTOCOL, BENCHMARK EXIT-CODE POLICY AND THE FULL UNIXBENCH
// COMBINATION AGAINST IN-MEMORY COLLABORATORS.
//
// NO KVM, NO SSH, NO ROOT. DISK AND CONFIG FILES LIVE IN A TEMPDIR.

mod common;

use common::{disk_file, kernel_file, microvm_file, output, FakeShell, Harness};
use vmbench::artifacts::{ArtifactKind, ArtifactSet, MicrovmConfig};
use vmbench::config::{BenchConfig, BenchmarkSettings};
use vmbench::matrix::TestMatrix;
use vmbench::topology::Topology;
use vmbench::vm::{BuildRequest, VmBuilder, VmInstance, VmThread};
use vmbench::workload::{pin_vm_threads, run_benchmark, unixbench_workload};
use vmbench::BenchError;

fn settings() -> BenchmarkSettings {
    BenchmarkSettings {
        build_cmd: "make".to_string(),
        run_cmd: "./Run".to_string(),
        spectre_cmd: "cat spectre_v2".to_string(),
    }
}

fn fake_vm(h: &Harness, vcpus: usize) -> Box<dyn VmInstance> {
    let dir = tempfile::tempdir().unwrap();
    let shape = MicrovmConfig { vcpu_count: vcpus, mem_size_mib: 512, smt: false };
    let custom = h.custom(Topology::without_smt(1));
    custom
        .builder
        .build(BuildRequest {
            kernel: dir.path(),
            disks: Vec::new(),
            ssh_key: dir.path().join("key"),
            config: shape,
            cpu_template: "T2",
        })
        .unwrap()
}

// === PINNING ===

#[test]
fn pins_vmm_api_then_vcpus() {
    let h = Harness::new();
    let mut vm = fake_vm(&h, 2);
    let plan = pin_vm_threads(&mut *vm, &Topology::without_smt(4)).unwrap();
    let expected = vec![
        (VmThread::Vmm, 0),
        (VmThread::Api, 1),
        (VmThread::Vcpu(0), 2),
        (VmThread::Vcpu(1), 3),
    ];
    assert_eq!(plan, expected);
    assert_eq!(h.vm.borrow().pins, expected);
}

#[test]
fn pins_one_thread_per_physical_core() {
    let h = Harness::new();
    let mut vm = fake_vm(&h, 2);
    let topo = Topology::interleaved(4, 2);
    pin_vm_threads(&mut *vm, &topo).unwrap();
    let cores: Vec<usize> = h.vm.borrow().pins.iter().map(|&(_, c)| c).collect();
    assert_eq!(cores, vec![0, 1, 2, 3]);
}

#[test]
fn too_few_cores_pins_nothing() {
    let h = Harness::new();
    let mut vm = fake_vm(&h, 4);
    let err = pin_vm_threads(&mut *vm, &Topology::without_smt(5)).unwrap_err();
    assert!(matches!(err, BenchError::InsufficientCores { available: 5, required: 6 }));
    assert!(h.vm.borrow().pins.is_empty());
}

#[test]
fn rejected_pin_stops_sequence() {
    let mut h = Harness::new();
    h.reject = Some(VmThread::Api);
    let mut vm = fake_vm(&h, 2);
    let err = pin_vm_threads(&mut *vm, &Topology::without_smt(4)).unwrap_err();
    assert!(matches!(err, BenchError::PinRejected { thread: VmThread::Api, core: 1 }));
    // VMM STAYS PINNED, NOTHING AFTER THE API IS ATTEMPTED
    assert_eq!(h.vm.borrow().pins, vec![(VmThread::Vmm, 0)]);
}

#[test]
fn rejected_vcpu_reports_its_index() {
    let mut h = Harness::new();
    h.reject = Some(VmThread::Vcpu(1));
    let mut vm = fake_vm(&h, 3);
    let err = pin_vm_threads(&mut *vm, &Topology::without_smt(8)).unwrap_err();
    assert!(matches!(err, BenchError::PinRejected { thread: VmThread::Vcpu(1), core: 3 }));
    assert_eq!(h.vm.borrow().pins.len(), 3);
}

// === BENCHMARK ===

#[test]
fn failed_build_never_runs_benchmark() {
    let shell = FakeShell::scripted(vec![("make", output(2, ""))]);
    let err = run_benchmark(&shell, &settings()).unwrap_err();
    match err.downcast_ref::<BenchError>() {
        Some(BenchError::BuildFailed { exit_code }) => assert_eq!(*exit_code, 2),
        other => panic!("expected BuildFailed, got {:?}", other),
    }
    assert_eq!(shell.executed(), vec!["make".to_string()]);
}

#[test]
fn nonzero_benchmark_exit_is_recorded_not_fatal() {
    let shell = FakeShell::scripted(vec![
        ("cat spectre_v2", output(0, "Mitigation: Retpolines\n")),
        ("./Run", output(1, "System Call Overhead  1234.5 lps")),
    ]);
    let out = run_benchmark(&shell, &settings()).unwrap();
    assert_eq!(out.build.exit_code, 0);
    assert_eq!(out.run.exit_code, 1);
    assert_eq!(out.spectre_v2, "Mitigation: Retpolines");
    assert!(out.run.stdout.contains("1234.5"));
    assert_eq!(shell.executed(), vec!["make", "cat spectre_v2", "./Run"]);
}

// === FULL COMBINATION ===

struct Fixture {
    _dir: tempfile::TempDir,
    config: BenchConfig,
    sets: Vec<ArtifactSet>,
}

fn fixture(vcpus: usize, disks: &[&str]) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let mut config = BenchConfig::default();
    config.scratch_dir = dir.path().join("scratch");
    config.benchmark = settings();

    let microvms = ArtifactSet::from_artifacts(
        ArtifactKind::Microvm,
        [microvm_file(dir.path(), &format!("{}vcpu_1024mb", vcpus), vcpus)],
    )
    .unwrap();
    let kernels = ArtifactSet::from_artifacts(ArtifactKind::Kernel, [kernel_file(dir.path(), "vmlinux-4.14")]).unwrap();
    let disks = ArtifactSet::from_artifacts(
        ArtifactKind::Disk,
        disks.iter().map(|d| disk_file(dir.path(), d)).collect::<Vec<_>>(),
    )
    .unwrap();

    Fixture { _dir: dir, config, sets: vec![microvms, kernels, disks] }
}

fn scratch_entries(config: &BenchConfig) -> usize {
    std::fs::read_dir(&config.scratch_dir).map(|d| d.count()).unwrap_or(0)
}

#[test]
fn unixbench_records_one_result_per_combination() {
    let shell = FakeShell::scripted(vec![
        ("cat spectre_v2", output(0, "Vulnerable\n")),
        ("./Run", output(0, "score 42")),
    ]);
    let h = Harness::with_shell(shell.clone());
    let fx = fixture(2, &["bionic", "focal"]);
    let custom = h.custom(Topology::without_smt(4)).with_config(fx.config.clone());

    let report = TestMatrix::new(custom, fx.sets).unwrap().run_test(unixbench_workload).unwrap();
    assert!(report.is_success());

    let records = h.sink.records.borrow();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].disk, "bionic");
    assert_eq!(records[1].disk, "focal");
    let r = &records[0];
    assert_eq!(r.test, "fake_test");
    assert_eq!(r.microvm, "2vcpu_1024mb");
    assert_eq!(r.kernel, "vmlinux-4.14");
    assert_eq!(r.spectre_v2, "Vulnerable");
    assert_eq!(r.build_exit_code, 0);
    assert_eq!(r.stdout, "score 42");
    let pins: Vec<(String, usize)> = r.pinning.iter().map(|p| (p.thread.clone(), p.core)).collect();
    assert_eq!(
        pins,
        vec![
            ("vmm".to_string(), 0),
            ("api".to_string(), 1),
            ("vcpu0".to_string(), 2),
            ("vcpu1".to_string(), 3),
        ]
    );

    let vm = h.vm.borrow();
    assert_eq!(vm.builds, 2);
    assert_eq!(vm.started, 2);
    assert_eq!(vm.dropped, 2);
    assert_eq!(vm.cpu_templates, vec!["T2", "T2"]);
    // EACH VM BOOTED FROM ITS OWN WRITABLE COPY, GONE AFTERWARDS
    assert_eq!(vm.disks.len(), 2);
    assert_ne!(vm.disks[0], vm.disks[1]);
    assert!(vm.disks.iter().all(|d| d.starts_with(&fx.config.scratch_dir)));
    assert_eq!(scratch_entries(&fx.config), 0);
}

#[test]
fn oversized_vm_fails_combination_without_record() {
    let h = Harness::new();
    let fx = fixture(4, &["bionic"]);
    let custom = h.custom(Topology::without_smt(4)).with_config(fx.config.clone());

    let err = TestMatrix::new(custom, fx.sets).unwrap().run_test(unixbench_workload).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<BenchError>(),
        Some(BenchError::InsufficientCores { available: 4, required: 6 })
    ));
    assert!(h.sink.records.borrow().is_empty());
    // NOTHING RAN IN THE GUEST, VM AND DISK COPY STILL CLEANED UP
    assert!(h.shell.executed().is_empty());
    assert_eq!(h.vm.borrow().dropped, 1);
    assert_eq!(scratch_entries(&fx.config), 0);
}

#[test]
fn build_failure_keeps_going_when_asked() {
    let shell = FakeShell::scripted(vec![("make", output(1, ""))]);
    let h = Harness::with_shell(shell);
    let fx = fixture(1, &["bionic", "focal"]);
    let custom = h.custom(Topology::without_smt(4)).with_config(fx.config.clone());

    let report = TestMatrix::new(custom, fx.sets)
        .unwrap()
        .continue_on_failure(true)
        .run_test(unixbench_workload)
        .unwrap();
    assert_eq!(report.failed(), 2);
    assert!(report.failures().all(|o| o.error.as_deref().unwrap_or("").contains("exited with code 1")));
    assert!(h.sink.records.borrow().is_empty());
}

#[test]
fn vm_that_will_not_start_fails_combination() {
    let mut h = Harness::new();
    h.fail_start = true;
    let fx = fixture(1, &["bionic"]);
    let custom = h.custom(Topology::without_smt(4)).with_config(fx.config.clone());

    let err = TestMatrix::new(custom, fx.sets).unwrap().run_test(unixbench_workload).unwrap_err();
    assert!(format!("{:#}", err).contains("starting microvm"));
    assert!(h.vm.borrow().pins.is_empty());
}
