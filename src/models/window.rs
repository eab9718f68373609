//! Window Arithmetic
//!
//! Pure mapping between absolute time in milliseconds and window identifiers.
//! All time arithmetic in the engine goes through this module; it is integer
//! math end to end.

use serde::{Deserialize, Serialize};

/// Identifier of a fixed-width time window
///
/// Window `w` covers the interval `[w * window_ms, (w + 1) * window_ms)`.
/// Valid identifiers start at [`FIRST_WINDOW_ID`]; timestamps below one
/// window width map below the domain and are rejected at ingestion.
pub type WindowId = i64;

/// Smallest window identifier the engine stores or reports.
pub const FIRST_WINDOW_ID: WindowId = 1;

/// Mapper between absolute time and window identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowIndex {
    window_ms: i64,
}

impl WindowIndex {
    /// Create an index over windows of the given width in milliseconds.
    /// The width must be positive; `MonitorConfig::validate` enforces this
    /// before an index is built.
    pub fn new(window_ms: i64) -> Self {
        Self { window_ms }
    }

    /// Window width in milliseconds.
    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    /// The window containing the given time.
    pub fn window_of(&self, t_ms: i64) -> WindowId {
        t_ms.div_euclid(self.window_ms)
    }

    /// Start of a window in absolute milliseconds.
    pub fn window_start(&self, window: WindowId) -> i64 {
        window * self.window_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_of_buckets_by_width() {
        let index = WindowIndex::new(1_000);
        assert_eq!(index.window_of(1_000), 1);
        assert_eq!(index.window_of(1_999), 1);
        assert_eq!(index.window_of(2_000), 2);
        assert_eq!(index.window_of(38_000), 38);
    }

    #[test]
    fn test_timestamps_below_one_width_map_below_the_domain() {
        let index = WindowIndex::new(1_000);
        assert!(index.window_of(-1) < FIRST_WINDOW_ID);
        assert!(index.window_of(0) < FIRST_WINDOW_ID);
        assert!(index.window_of(999) < FIRST_WINDOW_ID);
        assert_eq!(index.window_of(1_000), FIRST_WINDOW_ID);
    }

    #[test]
    fn test_window_start_inverts_window_of() {
        let index = WindowIndex::new(300_000);
        for w in [1, 2, 17, 40] {
            assert_eq!(index.window_of(index.window_start(w)), w);
            assert_eq!(index.window_of(index.window_start(w + 1) - 1), w);
        }
    }
}
