use std::fmt;

use super::seed::{HitClass, Seed};

/// read 未比对上的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnmappedReason {
    EmptyRead,
    NoSeeds,
    AllAbsent,
    NoTrustedSeeds,
    NoCandidates,
    NoAlignment,
}

impl fmt::Display for UnmappedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnmappedReason::EmptyRead => "empty read",
            UnmappedReason::NoSeeds => "no seeds",
            UnmappedReason::AllAbsent => "all seeds absent",
            UnmappedReason::NoTrustedSeeds => "only repetitive or absent seeds",
            UnmappedReason::NoCandidates => "no valid candidate positions",
            UnmappedReason::NoAlignment => "no alignment within the edit bound",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedStats {
    pub unique: usize,
    pub moderate: usize,
    pub repetitive: usize,
    pub absent: usize,
}

impl SeedStats {
    pub fn of(seeds: &[Seed]) -> Self {
        let mut st = SeedStats::default();
        for s in seeds {
            match s.class {
                HitClass::Unique => st.unique += 1,
                HitClass::Moderate => st.moderate += 1,
                HitClass::Repetitive => st.repetitive += 1,
                HitClass::Absent => st.absent += 1,
            }
        }
        st
    }

    pub fn total(&self) -> usize {
        self.unique + self.moderate + self.repetitive + self.absent
    }
}

/// 单条 read 的验证参数，交给验证与过滤阶段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPlan {
    pub max_edits: u32,
    /// 用于生成候选的种子下标，唯一种子在前
    pub trusted: Vec<usize>,
    pub stats: SeedStats,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Extend(ReadPlan),
    Unmapped { reason: UnmappedReason, stats: SeedStats },
}

#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    max_edit_distance: u32,
    max_error_rate: f64,
}

impl Classifier {
    pub fn new(max_edit_distance: u32, max_error_rate: f64) -> Self {
        Self { max_edit_distance, max_error_rate }
    }

    /// `min(max_edit_distance, floor(len * max_error_rate))`
    pub fn max_edits(&self, read_len: usize) -> u32 {
        let by_rate = (read_len as f64 * self.max_error_rate).floor() as u32;
        self.max_edit_distance.min(by_rate)
    }

    pub fn classify(&self, read_len: usize, seeds: &[Seed]) -> Classification {
        let stats = SeedStats::of(seeds);
        if seeds.is_empty() {
            return Classification::Unmapped { reason: UnmappedReason::NoSeeds, stats };
        }
        if stats.absent == seeds.len() {
            return Classification::Unmapped { reason: UnmappedReason::AllAbsent, stats };
        }

        let mut trusted: Vec<usize> = (0..seeds.len()).filter(|&i| seeds[i].class.is_trusted()).collect();
        if trusted.is_empty() {
            return Classification::Unmapped { reason: UnmappedReason::NoTrustedSeeds, stats };
        }
        trusted.sort_by_key(|&i| (seeds[i].class, i));

        Classification::Extend(ReadPlan { max_edits: self.max_edits(read_len), trusted, stats })
    }
}
