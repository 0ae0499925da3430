//! Attempt budgets for the bounded retry phases.

use std::time::Duration;

/// Counter of repair attempts bounded by a fixed ceiling.
///
/// Each retry phase owns one budget; budgets are never shared or reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptBudget {
    used: u32,
    max: u32,
}

impl AttemptBudget {
    pub fn new(max: u32) -> Self {
        Self { used: 0, max }
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.max
    }

    /// Record one attempt and return its 1-indexed number, or `None` when exhausted.
    pub fn consume(&mut self) -> Option<u32> {
        if self.is_exhausted() {
            return None;
        }
        self.used += 1;
        Some(self.used)
    }
}

/// Upper bound on time spent polling one deployment (`interval * cycles`).
pub fn poll_window(interval: Duration, max_cycles: u32) -> Duration {
    interval.saturating_mul(max_cycles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_counts_up_to_max_then_stops() {
        let mut budget = AttemptBudget::new(2);
        assert_eq!(budget.consume(), Some(1));
        assert_eq!(budget.consume(), Some(2));
        assert!(budget.is_exhausted());
        assert_eq!(budget.consume(), None);
        assert_eq!(budget.used(), 2);
    }

    #[test]
    fn zero_budget_is_exhausted_immediately() {
        let mut budget = AttemptBudget::new(0);
        assert!(budget.is_exhausted());
        assert_eq!(budget.consume(), None);
    }

    #[test]
    fn poll_window_is_interval_times_cycles() {
        assert_eq!(
            poll_window(Duration::from_secs(5), 40),
            Duration::from_secs(200)
        );
    }
}
