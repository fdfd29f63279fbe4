// VMBENCH TEST MATRIX
// CROSS PRODUCT OF ARTIFACT SETS, ONE WORKLOAD CALL PER COMBINATION.
//
// ORDER: FIRST SET IS THE OUTER LOOP, LAST SET VARIES FASTEST. EACH SET
// ITERATES IN INSERTION ORDER, SO THE WHOLE SEQUENCE IS REPRODUCIBLE.
//
// ONE COMBINATION AT A TIME ON THE CALLING THREAD. BENCHMARKS RUNNING SIDE BY
// SIDE WOULD FIGHT OVER THE SAME PHYSICAL CORES.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use anyhow::Result;
use tracing::{error, info, info_span, warn};

use crate::artifacts::{Artifact, ArtifactKind, ArtifactSet};
use crate::context::{Custom, TestContext};
use crate::error::BenchError;
use crate::report::MatrixReport;

fn slot(kind: ArtifactKind) -> usize {
    match kind {
        ArtifactKind::Microvm => 0,
        ArtifactKind::Kernel => 1,
        ArtifactKind::Disk => 2,
    }
}

pub struct TestMatrix {
    custom: Custom,
    sets: Vec<ArtifactSet>,
    // SET INDEX FEEDING EACH CONTEXT SLOT (MICROVM, KERNEL, DISK)
    dims: [usize; 3],
    continue_on_failure: bool,
}

impl TestMatrix {
    // EVERY ARTIFACT KIND MUST BE SUPPLIED BY EXACTLY ONE SET
    pub fn new(custom: Custom, sets: Vec<ArtifactSet>) -> Result<Self, BenchError> {
        let mut dims = [usize::MAX; 3];
        for (i, set) in sets.iter().enumerate() {
            let s = slot(set.kind());
            if dims[s] != usize::MAX {
                return Err(BenchError::DuplicateDimension(set.kind()));
            }
            dims[s] = i;
        }
        for kind in ArtifactKind::ALL {
            if dims[slot(kind)] == usize::MAX {
                return Err(BenchError::MissingDimension(kind));
            }
        }
        Ok(Self { custom, sets, dims, continue_on_failure: false })
    }

    // RECORD FAILURES AND KEEP GOING INSTEAD OF ABORTING THE MATRIX
    pub fn continue_on_failure(mut self, enabled: bool) -> Self {
        self.continue_on_failure = enabled;
        self
    }

    pub fn custom(&self) -> &Custom {
        &self.custom
    }

    pub fn sets(&self) -> &[ArtifactSet] {
        &self.sets
    }

    // NUMBER OF COMBINATIONS (ZERO IF ANY SET IS EMPTY)
    pub fn len(&self) -> usize {
        self.sets.iter().map(|s| s.len()).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn combinations(&self) -> Combinations<'_> {
        let start = if self.sets.iter().any(|s| s.is_empty()) {
            None
        } else {
            Some(vec![0; self.sets.len()])
        };
        Combinations { sets: &self.sets, next: start }
    }

    pub fn run_test<F>(&self, workload: F) -> Result<MatrixReport>
    where
        F: FnMut(&TestContext<'_>) -> Result<()>,
    {
        self.run_test_until(workload, &AtomicBool::new(false))
    }

    // SAME AS run_test, BUT STOPS BEFORE THE NEXT COMBINATION ONCE `shutdown`
    // IS SET. THE COMBINATION IN FLIGHT IS NEVER INTERRUPTED.
    pub fn run_test_until<F>(&self, mut workload: F, shutdown: &AtomicBool) -> Result<MatrixReport>
    where
        F: FnMut(&TestContext<'_>) -> Result<()>,
    {
        let total = self.len();
        let mut report = MatrixReport::new(&self.custom.name, total);
        info!(test = %self.custom.name, combinations = total,
              continue_on_failure = self.continue_on_failure, "starting test matrix");

        for (index, combo) in self.combinations().enumerate() {
            if shutdown.load(Ordering::Relaxed) {
                warn!(done = index, total, "shutdown requested, skipping remaining combinations");
                report.interrupted = true;
                break;
            }

            let ctx = TestContext {
                custom: &self.custom,
                microvm: combo[self.dims[0]],
                kernel: combo[self.dims[1]],
                disk: combo[self.dims[2]],
                index,
                total,
            };
            let label = ctx.label();
            let span = info_span!(
                "combination",
                test = %self.custom.name,
                index,
                microvm = ctx.microvm.name(),
                kernel = ctx.kernel.name(),
                disk = ctx.disk.name(),
            );
            let _enter = span.enter();
            info!("testing combination {}/{}", index + 1, total);

            let started = Instant::now();
            match workload(&ctx) {
                Ok(()) => report.record_pass(label, started.elapsed()),
                Err(e) if self.continue_on_failure => {
                    error!(error = %format!("{:#}", e), "combination failed, continuing");
                    report.record_failure(label, started.elapsed(), format!("{:#}", e));
                }
                Err(e) => {
                    error!(error = %format!("{:#}", e), "combination failed, aborting matrix");
                    return Err(e.context(format!(
                        "combination {}/{} failed ({})", index + 1, total, label
                    )));
                }
            }
        }

        Ok(report)
    }
}

// ODOMETER OVER SET INDICES; RIGHT-MOST DIGIT TURNS FASTEST
pub struct Combinations<'m> {
    sets: &'m [ArtifactSet],
    next: Option<Vec<usize>>,
}

impl<'m> Iterator for Combinations<'m> {
    type Item = Vec<&'m Artifact>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        let sets = self.sets;
        let item = current
            .iter()
            .zip(sets)
            .filter_map(|(&i, set)| set.get(i))
            .collect();

        let mut idx = current;
        let mut digit = idx.len();
        while digit > 0 {
            digit -= 1;
            idx[digit] += 1;
            if idx[digit] < sets[digit].len() {
                self.next = Some(idx);
                break;
            }
            idx[digit] = 0;
        }
        Some(item)
    }
}
