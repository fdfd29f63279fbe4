// VMBENCH FIRECRACKER ADAPTER
// BUILDS A MICROVM FROM ARTIFACTS: WRITES A --config-file, SPAWNS THE VMM IN
// ITS OWN PROCESS GROUP, AND PINS ITS THREADS BY NAME.
//
// FIRECRACKER THREAD NAMES (/proc/<pid>/task/<tid>/comm):
//   firecracker   VMM EVENT LOOP (tid == pid)
//   fc_api        API SERVER
//   fc_vcpu N     ONE PER VCPU

use std::collections::BTreeMap;
use std::fs;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::{BenchConfig, NetworkSettings};
use crate::vm::{BuildRequest, SshConfig, VmBuilder, VmInstance};

static VM_SEQ: AtomicU64 = AtomicU64::new(0);

const VMM_COMM: &str = "firecracker";
const API_COMM: &str = "fc_api";
const VCPU_PATTERN: &str = r"^fc_vcpu\s*(\d+)$";

// ---------------------------------------------------------------------------
// THREAD DISCOVERY
// ---------------------------------------------------------------------------

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ThreadMap {
    pub vmm: Option<i32>,
    pub api: Option<i32>,
    pub vcpus: BTreeMap<usize, i32>,
}

// CLASSIFY (TID, COMM) PAIRS. THE VMM THREAD IS THE ONE WHOSE TID IS THE PID;
// OTHER firecracker-NAMED THREADS ARE HELPERS AND ARE IGNORED.
pub fn classify_threads(pid: i32, threads: &[(i32, String)], vcpu_re: &Regex) -> ThreadMap {
    let mut map = ThreadMap::default();
    for (tid, comm) in threads {
        let comm = comm.trim();
        if comm == VMM_COMM && *tid == pid {
            map.vmm = Some(*tid);
        } else if comm == API_COMM {
            map.api = Some(*tid);
        } else if let Some(idx) = vcpu_re
            .captures(comm)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<usize>().ok())
        {
            map.vcpus.insert(idx, *tid);
        }
    }
    map
}

fn list_threads(pid: i32) -> Vec<(i32, String)> {
    let dir = format!("/proc/{}/task", pid);
    let entries = match fs::read_dir(&dir) {
        Ok(e) => e,
        Err(_) => return Vec::new(),
    };
    entries
        .flatten()
        .filter_map(|e| {
            let tid = e.file_name().to_string_lossy().parse::<i32>().ok()?;
            let comm = fs::read_to_string(e.path().join("comm")).ok()?;
            Some((tid, comm))
        })
        .collect()
}

fn set_affinity(tid: i32, core: usize) -> bool {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_SET(core, &mut set);
        libc::sched_setaffinity(tid, std::mem::size_of::<libc::cpu_set_t>(), &set) == 0
    }
}

// ---------------------------------------------------------------------------
// CONFIG FILE
// ---------------------------------------------------------------------------

pub fn vm_config_json(
    request: &BuildRequest<'_>,
    boot_args: &str,
    network: &NetworkSettings,
) -> serde_json::Value {
    let drives: Vec<serde_json::Value> = request
        .disks
        .iter()
        .enumerate()
        .map(|(i, path)| {
            json!({
                "drive_id": if i == 0 { "rootfs".to_string() } else { format!("disk{}", i) },
                "path_on_host": path,
                "is_root_device": i == 0,
                "is_read_only": false,
            })
        })
        .collect();

    json!({
        "boot-source": {
            "kernel_image_path": request.kernel,
            "boot_args": boot_args,
        },
        "drives": drives,
        "machine-config": {
            "vcpu_count": request.config.vcpu_count,
            "mem_size_mib": request.config.mem_size_mib,
            "smt": request.config.smt,
            "cpu_template": request.cpu_template,
        },
        "network-interfaces": [{
            "iface_id": "eth0",
            "guest_mac": network.guest_mac,
            "host_dev_name": network.tap,
        }],
    })
}

// ---------------------------------------------------------------------------
// BUILDER
// ---------------------------------------------------------------------------

pub struct FirecrackerBuilder {
    binary: PathBuf,
    work_dir: PathBuf,
    boot_args: String,
    boot_timeout: Duration,
    network: NetworkSettings,
    ssh_user: String,
}

impl FirecrackerBuilder {
    pub fn from_config(cfg: &BenchConfig) -> Self {
        Self {
            binary: cfg.firecracker.binary.clone(),
            work_dir: cfg.scratch_dir.clone(),
            boot_args: cfg.firecracker.boot_args.clone(),
            boot_timeout: Duration::from_secs(cfg.firecracker.boot_timeout_secs),
            network: cfg.network.clone(),
            ssh_user: cfg.ssh.username.clone(),
        }
    }
}

impl VmBuilder for FirecrackerBuilder {
    fn build(&self, request: BuildRequest<'_>) -> Result<Box<dyn VmInstance>> {
        let seq = VM_SEQ.fetch_add(1, Ordering::Relaxed);
        let dir = self.work_dir.join(format!("fc-{}-{}", std::process::id(), seq));
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let config_path = dir.join("vm_config.json");
        let config = vm_config_json(&request, &self.boot_args, &self.network);
        fs::write(&config_path, serde_json::to_vec_pretty(&config)?)
            .with_context(|| format!("failed to write {}", config_path.display()))?;
        debug!(path = %config_path.display(), "wrote firecracker config");

        Ok(Box::new(FirecrackerVm {
            binary: self.binary.clone(),
            api_sock: dir.join("api.sock"),
            config_path,
            dir,
            boot_timeout: self.boot_timeout,
            vcpus: request.config.vcpu_count,
            ssh: SshConfig {
                host: self.network.guest_ip,
                username: self.ssh_user.clone(),
                key_path: request.ssh_key,
            },
            vcpu_re: Regex::new(VCPU_PATTERN)?,
            child: None,
            threads: ThreadMap::default(),
        }))
    }
}

// ---------------------------------------------------------------------------
// INSTANCE
// ---------------------------------------------------------------------------

pub struct FirecrackerVm {
    binary: PathBuf,
    dir: PathBuf,
    config_path: PathBuf,
    api_sock: PathBuf,
    boot_timeout: Duration,
    vcpus: usize,
    ssh: SshConfig,
    vcpu_re: Regex,
    child: Option<Child>,
    threads: ThreadMap,
}

impl FirecrackerVm {
    fn pid(&self) -> Option<i32> {
        self.child.as_ref().map(|c| c.id() as i32)
    }

    fn log_tail(&self) -> String {
        let raw = fs::read_to_string(self.dir.join("firecracker.log")).unwrap_or_default();
        let lines: Vec<&str> = raw.lines().collect();
        lines[lines.len().saturating_sub(10)..].join("\n")
    }

    // SAME SHUTDOWN AS A PROCESS GUARD: SIGINT, GRACE PERIOD, THEN SIGKILL
    fn stop(&mut self) {
        let child = match self.child.as_mut() {
            Some(c) => c,
            None => return,
        };
        let pgid = child.id() as i32;
        if let Ok(Some(_)) = child.try_wait() {
            return;
        }
        unsafe { libc::killpg(pgid, libc::SIGINT); }
        let deadline = Instant::now() + Duration::from_millis(500);
        loop {
            match child.try_wait() {
                Ok(Some(_)) => return,
                Ok(None) if Instant::now() >= deadline => break,
                Ok(None) => std::thread::sleep(Duration::from_millis(50)),
                Err(_) => break,
            }
        }
        unsafe { libc::killpg(pgid, libc::SIGKILL); }
        let _ = child.wait();
    }

    fn pin_tid(&self, tid: Option<i32>, core: usize, what: &str) -> bool {
        match tid {
            Some(tid) => {
                let ok = set_affinity(tid, core);
                if !ok {
                    warn!(tid, core, "sched_setaffinity failed for {}", what);
                }
                ok
            }
            None => {
                warn!("no {} thread found", what);
                false
            }
        }
    }
}

impl VmInstance for FirecrackerVm {
    fn start(&mut self) -> Result<()> {
        if self.child.is_some() {
            bail!("microvm already started");
        }
        let log = fs::File::create(self.dir.join("firecracker.log"))?;
        let child = unsafe {
            Command::new(&self.binary)
                .arg("--api-sock")
                .arg(&self.api_sock)
                .arg("--config-file")
                .arg(&self.config_path)
                .process_group(0)
                .stdin(Stdio::null())
                .stdout(log.try_clone()?)
                .stderr(log)
                .pre_exec(|| {
                    libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL as libc::c_ulong);
                    Ok(())
                })
                .spawn()
                .with_context(|| format!("failed to spawn {}", self.binary.display()))?
        };
        let pid = child.id() as i32;
        self.child = Some(child);
        info!(pid, "firecracker started");

        // WAIT FOR EVERY THREAD WE INTEND TO PIN
        let deadline = Instant::now() + self.boot_timeout;
        loop {
            if let Some(c) = self.child.as_mut() {
                if let Ok(Some(status)) = c.try_wait() {
                    bail!("firecracker exited during boot ({}):\n{}", status, self.log_tail());
                }
            }
            self.threads = classify_threads(pid, &list_threads(pid), &self.vcpu_re);
            if self.threads.vmm.is_some()
                && self.threads.api.is_some()
                && self.threads.vcpus.len() >= self.vcpus
            {
                debug!(threads = ?self.threads, "firecracker threads up");
                return Ok(());
            }
            if Instant::now() >= deadline {
                bail!("firecracker threads not up after {:?}: {:?}", self.boot_timeout, self.threads);
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }

    fn pin_vmm(&mut self, core: usize) -> bool {
        let tid = self.threads.vmm.or_else(|| self.pid());
        self.pin_tid(tid, core, "vmm")
    }

    fn pin_api(&mut self, core: usize) -> bool {
        self.pin_tid(self.threads.api, core, "api")
    }

    fn pin_vcpu(&mut self, index: usize, core: usize) -> bool {
        let tid = self.threads.vcpus.get(&index).copied();
        self.pin_tid(tid, core, &format!("vcpu {}", index))
    }

    fn vcpus_count(&self) -> usize {
        self.vcpus
    }

    fn ssh_config(&self) -> SshConfig {
        self.ssh.clone()
    }
}

impl Drop for FirecrackerVm {
    fn drop(&mut self) {
        self.stop();
        let _ = fs::remove_dir_all(&self.dir);
    }
}
