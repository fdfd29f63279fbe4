// VMBENCH MATRIX REPORT
// OUTCOME OF EVERY COMBINATION THE MATRIX REACHED, IN VISIT ORDER.
// COMBINATIONS NEVER REACHED (ABORT OR SHUTDOWN) DO NOT APPEAR.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub label: String,
    pub elapsed: Duration,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixReport {
    pub test: String,
    pub total: usize,
    pub outcomes: Vec<Outcome>,
    pub interrupted: bool,
}

impl MatrixReport {
    pub fn new(test: &str, total: usize) -> Self {
        Self {
            test: test.to_string(),
            total,
            outcomes: Vec::with_capacity(total),
            interrupted: false,
        }
    }

    pub fn record_pass(&mut self, label: String, elapsed: Duration) {
        self.outcomes.push(Outcome { label, elapsed, error: None });
    }

    pub fn record_failure(&mut self, label: String, elapsed: Duration, error: String) {
        self.outcomes.push(Outcome { label, elapsed, error: Some(error) });
    }

    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.error.is_none()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| o.error.is_some())
    }

    pub fn failed(&self) -> usize {
        self.failures().count()
    }

    // EVERY COMBINATION RAN AND NONE FAILED
    pub fn is_success(&self) -> bool {
        !self.interrupted && self.outcomes.len() == self.total && self.failed() == 0
    }

    pub fn summary(&self) {
        println!("\n{}", "=".repeat(60));
        println!("VMBENCH SUMMARY: {}", self.test);
        println!("{}", "=".repeat(60));
        println!("  COMBINATIONS:  {}", self.total);
        println!("  RAN:           {}", self.outcomes.len());
        println!("  PASSED:        {}", self.passed());
        println!("  FAILED:        {}", self.failed());
        if self.interrupted {
            println!("  INTERRUPTED:   {} NOT RUN", self.total - self.outcomes.len());
        }
        if self.outcomes.is_empty() {
            return;
        }
        println!();
        println!("{:<6} {:<8} {:>9}  {}", "#", "RESULT", "ELAPSED", "COMBINATION");
        println!("{}", "-".repeat(60));
        for (i, o) in self.outcomes.iter().enumerate() {
            println!("{:<6} {:<8} {:>8.1}s  {}",
                i + 1,
                if o.error.is_none() { "PASS" } else { "FAIL" },
                o.elapsed.as_secs_f64(),
                o.label);
            if let Some(e) = &o.error {
                println!("{:<16}{}", "", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_success() {
        let mut r = MatrixReport::new("t", 2);
        r.record_pass("a".into(), Duration::from_secs(1));
        assert!(!r.is_success()); // ONE NOT YET RUN
        r.record_failure("b".into(), Duration::from_secs(2), "boom".into());
        assert_eq!(r.passed(), 1);
        assert_eq!(r.failed(), 1);
        assert!(!r.is_success());
        assert_eq!(r.failures().next().unwrap().label, "b");
    }

    #[test]
    fn interrupted_is_not_success() {
        let mut r = MatrixReport::new("t", 1);
        r.record_pass("a".into(), Duration::ZERO);
        assert!(r.is_success());
        r.interrupted = true;
        assert!(!r.is_success());
    }

    #[test]
    fn summary_no_panic_empty() {
        MatrixReport::new("t", 0).summary();
    }

    #[test]
    fn summary_no_panic_with_failure() {
        let mut r = MatrixReport::new("t", 3);
        r.record_pass("a".into(), Duration::from_millis(1500));
        r.record_failure("b".into(), Duration::ZERO, "pin rejected".into());
        r.interrupted = true;
        r.summary();
    }
}
