// VMBENCH PHYSICAL CORE ALLOCATOR
// HANDS OUT ONE LOGICAL CPU PER VM THREAD SO THAT NO TWO ASSIGNED CPUs SHARE
// A PHYSICAL CORE. PURE OVER AN IMMUTABLE TOPOLOGY; THE ONLY STATE IS THE
// CALLER'S `used` SET.
//
// SCAN ORDER IS STRICTLY MONOTONIC: SAME TOPOLOGY, SAME ASSIGNMENT.

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::{BenchError, Result};
use crate::topology::Topology;

// RETURN THE NEXT CPU AT OR ABOVE current + 1 (OR 0) THAT IS NOT IN `used`,
// AND MARK ITS WHOLE SIBLING GROUP USED. ONLY THE CANDIDATE IS RETURNED.
pub fn next_core(
    topology: &Topology,
    used: &mut BTreeSet<usize>,
    current: Option<usize>,
) -> Result<usize> {
    let mut candidate = current.map_or(0, |c| c + 1);
    while used.contains(&candidate) {
        candidate += 1;
    }
    if candidate >= topology.len() {
        return Err(BenchError::ResourceExhausted { cores: topology.len() });
    }
    used.extend(topology.siblings(candidate).iter().copied());
    debug!(core = candidate, used = ?used, "allocated core");
    Ok(candidate)
}

// ONE PINNING SEQUENCE (ONE VM). OWNS ITS `used` SET; DROP IT WHEN DONE.
pub struct CoreAllocator<'a> {
    topology: &'a Topology,
    used: BTreeSet<usize>,
    last: Option<usize>,
}

impl<'a> CoreAllocator<'a> {
    pub fn new(topology: &'a Topology) -> Self {
        Self {
            topology,
            used: topology.offline().iter().copied().collect(),
            last: None,
        }
    }

    // NEXT CORE RELATIVE TO THE PREVIOUS ASSIGNMENT
    pub fn next(&mut self) -> Result<usize> {
        let core = next_core(self.topology, &mut self.used, self.last)?;
        self.last = Some(core);
        Ok(core)
    }

    pub fn used(&self) -> &BTreeSet<usize> {
        &self.used
    }

    pub fn last(&self) -> Option<usize> {
        self.last
    }

    // PHYSICAL CORES A FURTHER next() CAN STILL REACH
    pub fn remaining(&self) -> usize {
        let start = self.last.map_or(0, |c| c + 1);
        let mut seen = BTreeSet::new();
        (start..self.topology.len())
            .filter(|c| !self.used.contains(c))
            .filter(|&c| seen.insert(self.topology.group_of(c)))
            .count()
    }
}
