use std::io::Read;
use std::path::Path;
use std::process::Command;

use anyhow::Result;

use vmbench::topology::Topology;

fn check_tool(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn check_kernel_config() -> bool {
    let file = match std::fs::File::open("/proc/config.gz") {
        Ok(f) => f,
        Err(_) => {
            println!("  /proc/config.gz       NOT FOUND (SKIPPED)");
            return true;
        }
    };
    let mut decoder = flate2::read::GzDecoder::new(file);
    let mut config = String::new();
    if decoder.read_to_string(&mut config).is_err() {
        println!("  /proc/config.gz       UNREADABLE (SKIPPED)");
        return true;
    }
    let found = config
        .lines()
        .any(|l| l == "CONFIG_KVM=y" || l == "CONFIG_KVM=m");
    if found {
        println!("  CONFIG_KVM            OK");
    } else {
        println!("  CONFIG_KVM            NOT FOUND -- kvm may not be available");
    }
    found
}

fn check_kvm() -> bool {
    let kvm = Path::new("/dev/kvm");
    if !kvm.exists() {
        println!("  /dev/kvm              MISSING");
        return false;
    }
    match std::fs::OpenOptions::new().read(true).write(true).open(kvm) {
        Ok(_) => {
            println!("  /dev/kvm              OK");
            true
        }
        Err(e) => {
            println!("  /dev/kvm              NO ACCESS ({})", e);
            false
        }
    }
}

pub fn run_check() -> Result<()> {
    println!("VMBENCH DEPENDENCY CHECK");
    println!();

    let mut ok = true;
    let tools = ["firecracker", "ssh", "ip"];
    for tool in &tools {
        if check_tool(tool) {
            println!("  {:<22}OK", tool);
        } else {
            println!("  {:<22}MISSING", tool);
            ok = false;
        }
    }
    println!();

    // SCHED_SETAFFINITY ON ANOTHER USER'S THREADS AND TAP DEVICES NEED ROOT
    if unsafe { libc::geteuid() } == 0 {
        println!("  {:<22}OK", "root");
    } else {
        println!("  {:<22}NOT ROOT -- run and test-gate need sudo", "root");
    }
    println!();

    println!("KERNEL:");
    if !check_kernel_config() {
        ok = false;
    }
    if !check_kvm() {
        ok = false;
    }
    println!();

    match Topology::from_sysfs() {
        Ok(topo) => {
            let smt = topo.groups().iter().any(|g| g.len() > 1);
            println!("  topology              {} CPUS / {} CORES (SMT {})",
                     topo.online_count(), topo.physical_cores(), if smt { "ON" } else { "OFF" });
        }
        Err(e) => {
            println!("  topology              UNREADABLE ({})", e);
            ok = false;
        }
    }
    println!();

    if ok {
        println!("ALL CHECKS PASSED");
    } else {
        println!("SOME CHECKS FAILED");
        if !check_tool("firecracker") {
            println!("  Install firecracker: https://github.com/firecracker-microvm/firecracker/releases");
        }
        std::process::exit(1);
    }

    Ok(())
}
