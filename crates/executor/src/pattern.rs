//! Line-oriented fault pattern detection for process output.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Default pattern scanned for in process output.
///
/// A Rust binary that panics prints `thread '...' panicked at ...` to
/// stderr, so any occurrence marks the run as faulty even when the
/// process exits cleanly afterwards.
pub const DEFAULT_FAULT_PATTERN: &str = "panicked at";

/// Counts lines of process output that contain a fixed substring.
///
/// One detector is attached per output stream. The count is read back
/// after the process exits via [`PatternDetector::hits`].
#[derive(Debug)]
pub struct PatternDetector {
    pattern: String,
    hits: AtomicUsize,
}

impl PatternDetector {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            hits: AtomicUsize::new(0),
        }
    }

    /// Scans a single complete line. A line counts at most once no
    /// matter how often the pattern repeats within it.
    pub fn scan_line(&self, line: &str) {
        if !self.pattern.is_empty() && line.contains(&self.pattern) {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }
}
