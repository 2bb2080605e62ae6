//! Per-resolver bookkeeping: lifecycle state, failure memory, error budget.

use std::collections::HashSet;

use serde::Serialize;

/// How a streaming binding is being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamingMode {
    /// An engine session feeds the element.
    Engine,
    /// The element plays the manifest itself.
    Native,
}

/// Lifecycle of a [`SourceResolver`](crate::SourceResolver).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolverState {
    /// No element or no source.
    Idle,
    /// Target picked, binding in progress.
    Resolving,
    /// Manifest bound.
    Streaming(StreamingMode),
    /// Progressive file bound.
    Progressive,
    /// An error was surfaced; nothing is bound.
    Failed,
    /// Unmounted.
    TornDown,
}

impl ResolverState {
    /// `true` while something is bound to the element.
    pub fn is_bound(self) -> bool {
        matches!(self, Self::Streaming(_) | Self::Progressive)
    }
}

/// Sources whose manifest failed once. Never forgets within a resolver's
/// lifetime, except when a later manifest parse for the same source
/// succeeds.
#[derive(Debug, Clone, Default)]
pub struct FailureMemory {
    failed: HashSet<String>,
}

impl FailureMemory {
    /// Record `source`. Returns `false` if it was already recorded.
    pub fn mark(&mut self, source: &str) -> bool {
        self.failed.insert(source.to_string())
    }

    pub fn contains(&self, source: &str) -> bool {
        self.failed.contains(source)
    }

    pub fn clear(&mut self, source: &str) {
        self.failed.remove(source);
    }

    pub fn len(&self) -> usize {
        self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Consecutive non-fatal error counter.
#[derive(Debug, Clone, Copy)]
pub struct ErrorBudget {
    threshold: u32,
    used: u32,
}

impl ErrorBudget {
    pub fn new(threshold: u32) -> Self {
        Self { threshold, used: 0 }
    }

    /// Count one error. Returns `true` once the count exceeds the threshold.
    pub fn record(&mut self) -> bool {
        self.used = self.used.saturating_add(1);
        self.used > self.threshold
    }

    pub fn reset(&mut self) {
        self.used = 0;
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_trips_after_threshold() {
        let mut budget = ErrorBudget::new(5);
        for _ in 0..5 {
            assert!(!budget.record());
        }
        assert!(budget.record());
        assert_eq!(budget.used(), 6);

        budget.reset();
        assert_eq!(budget.used(), 0);
        assert!(!budget.record());
    }

    #[test]
    fn zero_budget_trips_immediately() {
        let mut budget = ErrorBudget::new(0);
        assert!(budget.record());
    }

    #[test]
    fn failure_memory_marks_once() {
        let mut memory = FailureMemory::default();
        assert!(memory.mark("a.mp4"));
        assert!(!memory.mark("a.mp4"));
        assert!(memory.contains("a.mp4"));
        assert_eq!(memory.len(), 1);
        memory.clear("a.mp4");
        assert!(memory.is_empty());
    }

    #[test]
    fn bound_states() {
        assert!(ResolverState::Progressive.is_bound());
        assert!(ResolverState::Streaming(StreamingMode::Native).is_bound());
        assert!(!ResolverState::Failed.is_bound());
        assert!(!ResolverState::Resolving.is_bound());
    }
}
