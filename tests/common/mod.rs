// IN-MEMORY COLLABORATORS FOR OFFLINE TESTS: A VM THAT RECORDS PIN CALLS, A
// SHELL WITH SCRIPTED REPLIES, AND A RESULTS SINK THAT KEEPS RECORDS IN A VEC.
#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{anyhow, Result};

use vmbench::artifacts::{Artifact, ArtifactKind, ArtifactSet};
use vmbench::context::Custom;
use vmbench::results::{BenchRecord, ResultsSink};
use vmbench::ssh::{CommandOutput, RemoteShell, ShellConnector};
use vmbench::topology::Topology;
use vmbench::vm::{BuildRequest, SshConfig, VmBuilder, VmInstance, VmThread};

// ---------------------------------------------------------------------------
// VM
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct VmLog {
    pub builds: usize,
    pub started: usize,
    pub dropped: usize,
    pub pins: Vec<(VmThread, usize)>,
    pub disks: Vec<PathBuf>,
    pub cpu_templates: Vec<String>,
}

pub struct FakeBuilder {
    pub log: Rc<RefCell<VmLog>>,
    pub reject: Option<VmThread>,
    pub fail_start: bool,
}

struct FakeVm {
    log: Rc<RefCell<VmLog>>,
    vcpus: usize,
    reject: Option<VmThread>,
    fail_start: bool,
}

impl VmBuilder for FakeBuilder {
    fn build(&self, request: BuildRequest<'_>) -> Result<Box<dyn VmInstance>> {
        {
            let mut log = self.log.borrow_mut();
            log.builds += 1;
            log.disks.extend(request.disks.iter().cloned());
            log.cpu_templates.push(request.cpu_template.to_string());
        }
        Ok(Box::new(FakeVm {
            log: Rc::clone(&self.log),
            vcpus: request.config.vcpu_count,
            reject: self.reject,
            fail_start: self.fail_start,
        }))
    }
}

impl FakeVm {
    fn record(&mut self, thread: VmThread, core: usize) -> bool {
        if self.reject == Some(thread) {
            return false;
        }
        self.log.borrow_mut().pins.push((thread, core));
        true
    }
}

impl VmInstance for FakeVm {
    fn start(&mut self) -> Result<()> {
        if self.fail_start {
            return Err(anyhow!("fake vm refused to start"));
        }
        self.log.borrow_mut().started += 1;
        Ok(())
    }

    fn pin_vmm(&mut self, core: usize) -> bool {
        self.record(VmThread::Vmm, core)
    }

    fn pin_api(&mut self, core: usize) -> bool {
        self.record(VmThread::Api, core)
    }

    fn pin_vcpu(&mut self, index: usize, core: usize) -> bool {
        self.record(VmThread::Vcpu(index), core)
    }

    fn vcpus_count(&self) -> usize {
        self.vcpus
    }

    fn ssh_config(&self) -> SshConfig {
        SshConfig {
            host: Ipv4Addr::new(172, 16, 0, 2),
            username: "root".to_string(),
            key_path: PathBuf::from("/dev/null"),
        }
    }
}

impl Drop for FakeVm {
    fn drop(&mut self) {
        self.log.borrow_mut().dropped += 1;
    }
}

// ---------------------------------------------------------------------------
// SHELL
// ---------------------------------------------------------------------------

pub fn output(exit_code: i32, stdout: &str) -> CommandOutput {
    CommandOutput { exit_code, stdout: stdout.to_string(), stderr: String::new() }
}

// UNSCRIPTED COMMANDS SUCCEED WITH EMPTY OUTPUT
#[derive(Clone, Default)]
pub struct FakeShell {
    pub replies: Rc<HashMap<String, CommandOutput>>,
    pub executed: Rc<RefCell<Vec<String>>>,
}

impl FakeShell {
    pub fn scripted(replies: Vec<(&str, CommandOutput)>) -> Self {
        Self {
            replies: Rc::new(replies.into_iter().map(|(c, o)| (c.to_string(), o)).collect()),
            executed: Rc::default(),
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.borrow().clone()
    }
}

impl RemoteShell for FakeShell {
    fn execute_command(&self, cmd: &str) -> Result<CommandOutput> {
        self.executed.borrow_mut().push(cmd.to_string());
        Ok(self.replies.get(cmd).cloned().unwrap_or_else(|| output(0, "")))
    }
}

impl ShellConnector for FakeShell {
    fn connect(&self, _config: &SshConfig) -> Result<Box<dyn RemoteShell>> {
        Ok(Box::new(self.clone()))
    }
}

// ---------------------------------------------------------------------------
// RESULTS
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct MemorySink {
    pub records: Rc<RefCell<Vec<BenchRecord>>>,
}

impl ResultsSink for MemorySink {
    fn record(&self, record: &BenchRecord) -> Result<()> {
        self.records.borrow_mut().push(record.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// HARNESS
// ---------------------------------------------------------------------------

pub struct Harness {
    pub vm: Rc<RefCell<VmLog>>,
    pub shell: FakeShell,
    pub sink: MemorySink,
    pub reject: Option<VmThread>,
    pub fail_start: bool,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_shell(FakeShell::default())
    }

    pub fn with_shell(shell: FakeShell) -> Self {
        Self {
            vm: Rc::default(),
            shell,
            sink: MemorySink::default(),
            reject: None,
            fail_start: false,
        }
    }

    pub fn custom(&self, topology: Topology) -> Custom {
        Custom::new(
            "fake_test",
            Box::new(FakeBuilder {
                log: Rc::clone(&self.vm),
                reject: self.reject,
                fail_start: self.fail_start,
            }),
            Box::new(self.sink.clone()),
            Box::new(self.shell.clone()),
            topology,
        )
    }
}

// ---------------------------------------------------------------------------
// ARTIFACTS
// ---------------------------------------------------------------------------

// NAMES ONLY, PATHS ARE NEVER TOUCHED
pub fn named_set(kind: ArtifactKind, names: &[&str]) -> ArtifactSet {
    ArtifactSet::from_artifacts(
        kind,
        names.iter().map(|n| Artifact::new(kind, *n, format!("/nonexistent/{}", n))),
    )
    .unwrap()
}

pub fn microvm_file(dir: &Path, name: &str, vcpus: usize) -> Artifact {
    let path = dir.join(format!("{}.json", name));
    fs::write(
        &path,
        format!(r#"{{"vcpu_count": {}, "mem_size_mib": 1024}}"#, vcpus),
    )
    .unwrap();
    Artifact::new(ArtifactKind::Microvm, name, path)
}

pub fn kernel_file(dir: &Path, name: &str) -> Artifact {
    let path = dir.join(name);
    fs::write(&path, b"vmlinux").unwrap();
    Artifact::new(ArtifactKind::Kernel, name, path)
}

pub fn disk_file(dir: &Path, name: &str) -> Artifact {
    let path = dir.join(format!("{}.ext4", name));
    fs::write(&path, b"rootfs").unwrap();
    let key = dir.join(format!("{}.id_rsa", name));
    fs::write(&key, b"key").unwrap();
    Artifact::disk(name, path, key)
}
