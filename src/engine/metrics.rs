//! Scan metrics.
//!
//! Collected for every top-level wikify and handed back by [`Engine::wikify_verbose`](crate::Engine::wikify_verbose)
//! for profiling and for the debug report. Counting is cheap enough to stay on in the normal path; only
//! the wall time is measured by the caller.

use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ScanMetrics {
    /// Total elapsed time of the top-level wikify.
    pub total: Duration,
    /// How many times each grammar rule fired.
    pub rule_hits: BTreeMap<String, usize>,
    /// How many times each macro was invoked, keyed by its canonical name.
    pub macro_calls: BTreeMap<String, usize>,
    /// Number of scan loops run, nested ones included.
    pub scans: usize,
    /// Deepest wikify nesting reached.
    pub max_depth: usize,
    /// Inline error markers emitted.
    pub errors: usize,
}

impl ScanMetrics {
    pub fn record_rule(&mut self, name: &str) {
        *self.rule_hits.entry(name.to_string()).or_default() += 1;
    }

    pub fn record_macro(&mut self, name: &str) {
        *self.macro_calls.entry(name.to_string()).or_default() += 1;
    }

    pub fn record_depth(&mut self, depth: usize) {
        self.max_depth = self.max_depth.max(depth);
    }

    pub fn total_rule_hits(&self) -> usize {
        self.rule_hits.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_accumulate() {
        let mut m = ScanMetrics::default();
        m.record_rule("macro");
        m.record_rule("macro");
        m.record_rule("lineBreak");
        m.record_depth(3);
        m.record_depth(1);

        assert_eq!(m.rule_hits["macro"], 2);
        assert_eq!(m.total_rule_hits(), 3);
        assert_eq!(m.max_depth, 3);
    }
}
