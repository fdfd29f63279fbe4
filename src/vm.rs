// VMBENCH VM COLLABORATOR BOUNDARY
// THE ORCHESTRATOR ONLY NEEDS TO BUILD A VM, START IT, PIN ITS THREADS AND
// REACH IT OVER SSH. EVERYTHING ELSE ABOUT VM LIFECYCLE LIVES BEHIND THESE
// TRAITS (SEE firecracker.rs FOR THE REAL ONE).

use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;

use anyhow::Result;

use crate::artifacts::MicrovmConfig;

// A HOST THREAD OF A RUNNING VM THAT CAN BE PINNED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VmThread {
    Vmm,
    Api,
    Vcpu(usize),
}

impl fmt::Display for VmThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vmm => f.write_str("vmm"),
            Self::Api => f.write_str("api"),
            Self::Vcpu(i) => write!(f, "vcpu{}", i),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshConfig {
    pub host: Ipv4Addr,
    pub username: String,
    pub key_path: PathBuf,
}

pub struct BuildRequest<'a> {
    pub kernel: &'a std::path::Path,
    pub disks: Vec<PathBuf>,
    pub ssh_key: PathBuf,
    pub config: MicrovmConfig,
    pub cpu_template: &'a str,
}

pub trait VmBuilder {
    fn build(&self, request: BuildRequest<'_>) -> Result<Box<dyn VmInstance>>;
}

// DROPPING AN INSTANCE MUST TEAR THE VM DOWN
pub trait VmInstance {
    fn start(&mut self) -> Result<()>;

    // FALSE MEANS THE VM REFUSED OR COULD NOT FIND THE THREAD
    fn pin_vmm(&mut self, core: usize) -> bool;
    fn pin_api(&mut self, core: usize) -> bool;
    fn pin_vcpu(&mut self, index: usize, core: usize) -> bool;

    fn vcpus_count(&self) -> usize;
    fn ssh_config(&self) -> SshConfig;

    fn pin(&mut self, thread: VmThread, core: usize) -> bool {
        match thread {
            VmThread::Vmm => self.pin_vmm(core),
            VmThread::Api => self.pin_api(core),
            VmThread::Vcpu(i) => self.pin_vcpu(i, core),
        }
    }
}
