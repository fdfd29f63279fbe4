// HOST TOPOLOGY REPORT -- SIBLING GROUPS AS THE ALLOCATOR SEES THEM, PLUS
// THE CORE EACH THREAD OF AN N-VCPU MICROVM WOULD BE PINNED TO

use anyhow::Result;

use vmbench::topology::Topology;
use vmbench::workload::plan_pinning;

pub fn run_topology(vcpus: usize) -> Result<()> {
    let topo = Topology::from_sysfs()?;

    println!("VMBENCH HOST TOPOLOGY");
    println!("  LOGICAL CPUS:    {} ({} online)", topo.len(), topo.online_count());
    println!("  PHYSICAL CORES:  {}", topo.physical_cores());
    if !topo.offline().is_empty() {
        println!("  OFFLINE:         {:?}", topo.offline());
    }
    println!();

    println!("{:<8} {}", "CORE", "SIBLINGS");
    println!("{}", "-".repeat(30));
    for (i, group) in topo.groups().iter().enumerate() {
        let cpus: Vec<String> = group.iter().map(|c| c.to_string()).collect();
        println!("{:<8} {}", i, cpus.join(","));
    }
    println!();

    println!("PIN PLAN ({} VCPU{}):", vcpus, if vcpus == 1 { "" } else { "S" });
    match plan_pinning(&topo, vcpus) {
        Ok(plan) => {
            for (thread, core) in plan {
                println!("  {:<8} -> CPU {}", thread.to_string(), core);
            }
        }
        Err(e) => {
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}
