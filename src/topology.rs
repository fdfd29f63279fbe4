// VMBENCH HOST TOPOLOGY
// IMMUTABLE MAP: LOGICAL CPU -> HYPERTHREAD SIBLING GROUP.
// RESOLVED ONCE BEFORE THE MATRIX RUNS (SYSFS ON REAL HOSTS, SYNTHETIC IN
// TESTS) AND SHARED READ-ONLY BY EVERY CORE ALLOCATION.

use std::fs;
use std::path::Path;

use crate::error::{BenchError, Result};

pub const SYSFS_CPU_ROOT: &str = "/sys/devices/system/cpu";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    group_of: Vec<usize>,
    groups: Vec<Vec<usize>>,
    offline: Vec<usize>,
}

// PARSE A KERNEL CPU LIST ("0", "0,4", "0-3,8-11") INTO SORTED INDICES
pub fn parse_cpu_list(raw: &str) -> Result<Vec<usize>> {
    let mut cpus = Vec::new();
    for range in raw.trim().split(',').filter(|r| !r.is_empty()) {
        let bad = || BenchError::Topology(format!("malformed cpu list {:?}", raw.trim()));
        match range.split_once('-') {
            None => cpus.push(range.trim().parse::<usize>().map_err(|_| bad())?),
            Some((lo, hi)) => {
                let lo = lo.trim().parse::<usize>().map_err(|_| bad())?;
                let hi = hi.trim().parse::<usize>().map_err(|_| bad())?;
                if hi < lo {
                    return Err(bad());
                }
                cpus.extend(lo..=hi);
            }
        }
    }
    cpus.sort_unstable();
    cpus.dedup();
    Ok(cpus)
}

impl Topology {
    // lists[i] IS THE SIBLING LIST REPORTED FOR CPU i. EVERY LIST MUST
    // CONTAIN ITS OWN CPU AND ALL MEMBERS OF A GROUP MUST AGREE ON IT.
    pub fn from_sibling_lists(lists: Vec<Vec<usize>>) -> Result<Self> {
        let n = lists.len();
        if n == 0 {
            return Err(BenchError::Topology("no cpus".into()));
        }
        let mut group_of = vec![usize::MAX; n];
        let mut groups: Vec<Vec<usize>> = Vec::new();

        for (cpu, list) in lists.iter().enumerate() {
            let mut members = list.clone();
            members.sort_unstable();
            members.dedup();
            if !members.contains(&cpu) {
                return Err(BenchError::Topology(format!(
                    "cpu {} missing from its own sibling list {:?}", cpu, members
                )));
            }
            if let Some(&out) = members.iter().find(|&&m| m >= n) {
                return Err(BenchError::Topology(format!(
                    "cpu {} lists sibling {} beyond {} cpus", cpu, out, n
                )));
            }
            if group_of[cpu] != usize::MAX {
                if groups[group_of[cpu]] != members {
                    return Err(BenchError::Topology(format!(
                        "cpu {} disagrees with its siblings: {:?} vs {:?}",
                        cpu, members, groups[group_of[cpu]]
                    )));
                }
                continue;
            }
            let id = groups.len();
            for &m in &members {
                if group_of[m] != usize::MAX {
                    return Err(BenchError::Topology(format!(
                        "cpu {} claimed by two sibling groups", m
                    )));
                }
                group_of[m] = id;
            }
            groups.push(members);
        }

        Ok(Self { group_of, groups, offline: Vec::new() })
    }

    // EVERY CPU IS ITS OWN PHYSICAL CORE (SMT DISABLED)
    pub fn without_smt(cpus: usize) -> Self {
        Self {
            group_of: (0..cpus).collect(),
            groups: (0..cpus).map(|c| vec![c]).collect(),
            offline: Vec::new(),
        }
    }

    // LINUX x86 ENUMERATION: CPU c AND c + physical SHARE A CORE
    pub fn interleaved(physical: usize, threads_per_core: usize) -> Self {
        let cpus = physical * threads_per_core;
        let lists = (0..cpus)
            .map(|c| {
                let base = c % physical;
                (0..threads_per_core).map(|t| base + t * physical).collect()
            })
            .collect();
        Self::from_sibling_lists(lists).unwrap_or_else(|_| Self::without_smt(cpus))
    }

    pub fn from_sysfs() -> Result<Self> {
        Self::from_sysfs_root(Path::new(SYSFS_CPU_ROOT))
    }

    // READS <root>/online AND <root>/cpuN/topology/thread_siblings_list.
    // OFFLINE CPUs HAVE NO TOPOLOGY DIRECTORY; THEY BECOME SINGLETONS THAT
    // THE ALLOCATOR TREATS AS ALREADY USED.
    pub fn from_sysfs_root(root: &Path) -> Result<Self> {
        let online = parse_cpu_list(&fs::read_to_string(root.join("online"))?)?;
        let max = *online
            .last()
            .ok_or_else(|| BenchError::Topology("no online cpus".into()))?;

        let mut lists = Vec::with_capacity(max + 1);
        let mut offline = Vec::new();
        for cpu in 0..=max {
            if online.binary_search(&cpu).is_err() {
                lists.push(vec![cpu]);
                offline.push(cpu);
                continue;
            }
            let path = root.join(format!("cpu{}/topology/thread_siblings_list", cpu));
            let raw = fs::read_to_string(&path)?;
            // SIBLINGS THAT ARE OFFLINE OR BEYOND THE ONLINE RANGE CANNOT RUN
            // ANYTHING; DROP THEM SO GROUPS STAY WITHIN BOUNDS.
            let siblings = parse_cpu_list(&raw)?
                .into_iter()
                .filter(|s| online.binary_search(s).is_ok())
                .collect();
            lists.push(siblings);
        }

        let mut topo = Self::from_sibling_lists(lists)?;
        topo.offline = offline;
        Ok(topo)
    }

    // NUMBER OF LOGICAL CPU INDICES (ONLINE OR NOT)
    pub fn len(&self) -> usize {
        self.group_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.group_of.is_empty()
    }

    pub fn online_count(&self) -> usize {
        self.len() - self.offline.len()
    }

    pub fn offline(&self) -> &[usize] {
        &self.offline
    }

    pub fn siblings(&self, cpu: usize) -> &[usize] {
        &self.groups[self.group_of[cpu]]
    }

    pub fn group_of(&self, cpu: usize) -> usize {
        self.group_of[cpu]
    }

    pub fn groups(&self) -> &[Vec<usize>] {
        &self.groups
    }

    // PHYSICAL CORES WITH AT LEAST ONE ONLINE THREAD
    pub fn physical_cores(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| g.iter().any(|c| !self.offline.contains(c)))
            .count()
    }
}
