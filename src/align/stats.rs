//! 整次运行的计数器：由驱动持有，以引用共享给工作线程。

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::classify::UnmappedReason;

#[derive(Debug, Default)]
pub struct MapStats {
    reads: AtomicU64,
    mapped: AtomicU64,
    unmapped: AtomicU64,
    seeds: AtomicU64,
    absent_seeds: AtomicU64,
    repetitive_seeds: AtomicU64,
    early_exits: AtomicU64,
    candidates: AtomicU64,
    verified: AtomicU64,
    verified_hits: AtomicU64,
    locator_anomalies: AtomicU64,
    alignments_reported: AtomicU64,
}

/// 运行结束时取得的计数快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub reads: u64,
    pub mapped: u64,
    pub unmapped: u64,
    pub seeds: u64,
    pub absent_seeds: u64,
    pub repetitive_seeds: u64,
    pub early_exits: u64,
    pub candidates: u64,
    pub verified: u64,
    pub verified_hits: u64,
    pub locator_anomalies: u64,
    pub alignments_reported: u64,
}

#[inline]
fn bump(c: &AtomicU64, n: u64) {
    c.fetch_add(n, Ordering::Relaxed);
}

impl MapStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_read(&self) {
        bump(&self.reads, 1);
    }

    pub fn record_seeds(&self, total: usize, absent: usize, repetitive: usize) {
        bump(&self.seeds, total as u64);
        bump(&self.absent_seeds, absent as u64);
        bump(&self.repetitive_seeds, repetitive as u64);
    }

    pub fn record_candidates(&self, n: usize) {
        bump(&self.candidates, n as u64);
    }

    pub fn record_verified(&self, hit: bool) {
        bump(&self.verified, 1);
        if hit {
            bump(&self.verified_hits, 1);
        }
    }

    pub fn record_locator_anomaly(&self) {
        bump(&self.locator_anomalies, 1);
    }

    pub fn record_mapped(&self, reported: usize) {
        bump(&self.mapped, 1);
        bump(&self.alignments_reported, reported as u64);
    }

    pub fn record_unmapped(&self, reason: UnmappedReason) {
        bump(&self.unmapped, 1);
        if matches!(reason, UnmappedReason::AllAbsent | UnmappedReason::NoTrustedSeeds) {
            bump(&self.early_exits, 1);
        }
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            reads: get(&self.reads),
            mapped: get(&self.mapped),
            unmapped: get(&self.unmapped),
            seeds: get(&self.seeds),
            absent_seeds: get(&self.absent_seeds),
            repetitive_seeds: get(&self.repetitive_seeds),
            early_exits: get(&self.early_exits),
            candidates: get(&self.candidates),
            verified: get(&self.verified),
            verified_hits: get(&self.verified_hits),
            locator_anomalies: get(&self.locator_anomalies),
            alignments_reported: get(&self.alignments_reported),
        }
    }
}

impl StatsSnapshot {
    pub fn mapped_fraction(&self) -> f64 {
        if self.reads == 0 {
            0.0
        } else {
            self.mapped as f64 / self.reads as f64
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "reads: {}", self.reads)?;
        writeln!(f, "mapped: {} ({:.2}%)", self.mapped, self.mapped_fraction() * 100.0)?;
        writeln!(f, "unmapped: {} (early exits: {})", self.unmapped, self.early_exits)?;
        writeln!(
            f,
            "seeds: {} (absent: {}, repetitive: {})",
            self.seeds, self.absent_seeds, self.repetitive_seeds
        )?;
        writeln!(f, "candidates: {}, verified: {}, hits: {}", self.candidates, self.verified, self.verified_hits)?;
        writeln!(f, "alignments reported: {}", self.alignments_reported)?;
        write!(f, "locator anomalies: {}", self.locator_anomalies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_across_threads() {
        let stats = MapStats::new();
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..100 {
                        stats.record_read();
                        stats.record_verified(true);
                    }
                });
            }
        });
        let snap = stats.snapshot();
        assert_eq!(snap.reads, 400);
        assert_eq!(snap.verified, 400);
        assert_eq!(snap.verified_hits, 400);
    }

    #[test]
    fn early_exits_are_counted_separately() {
        let stats = MapStats::new();
        stats.record_unmapped(UnmappedReason::AllAbsent);
        stats.record_unmapped(UnmappedReason::NoAlignment);
        stats.record_mapped(3);
        let snap = stats.snapshot();
        assert_eq!(snap.unmapped, 2);
        assert_eq!(snap.early_exits, 1);
        assert_eq!(snap.alignments_reported, 3);
        assert!(snap.to_string().contains("early exits: 1"));
    }
}
