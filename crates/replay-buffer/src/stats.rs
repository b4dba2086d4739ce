//! Cumulative counters for buffer traffic and chain surgery.

/// Cumulative statistics about a [`BlockCirclebuf`](crate::BlockCirclebuf).
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct BufferStats {
    /// Elements accepted by `write` and `reserve`.
    pub written: u64,
    /// Elements copied out by `read`.
    pub read: u64,
    /// Elements discarded by `skip`.
    pub skipped: u64,
    /// Unread elements lost because the head overwrote or lapped them.
    pub displaced: u64,
    /// Successful block splits.
    pub splits: u64,
    /// Successful block merges.
    pub merges: u64,
    /// Superblocks allocated, including the first.
    pub superblocks: u64,
    /// Blocks moved out of the logical rotation.
    pub protections: u64,
}

impl BufferStats {
    /// Fraction of written elements that were lost to displacement.
    ///
    /// Returns `0.0` if nothing has been written.
    pub fn displacement_ratio(&self) -> f64 {
        if self.written == 0 {
            return 0.0;
        }
        self.displaced as f64 / self.written as f64
    }

    pub(crate) fn record_displaced(&mut self, count: usize) {
        self.displaced += count as u64;
    }

    /// Returns a human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "{} written, {} read, {} skipped, {} displaced ({:.1}%), \
             {} splits, {} merges, {} superblocks, {} protections",
            self.written,
            self.read,
            self.skipped,
            self.displaced,
            self.displacement_ratio() * 100.0,
            self.splits,
            self.merges,
            self.superblocks,
            self.protections,
        )
    }
}
