//! 原始文本坐标 → 染色体内坐标。

use super::fm::{GenomeIndex, Segment};
use super::Strand;

/// 在片段边界表中解析后的原始坐标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    /// `GenomeIndex::segments()` 下标
    pub segment: usize,
    pub contig: usize,
    /// 相对片段起点的偏移，`< contig 长度`
    pub offset: u64,
    pub strand: Strand,
}

/// 在已加载索引的片段表上二分查找
#[derive(Debug, Clone, Copy)]
pub struct Locator<'a> {
    segments: &'a [Segment],
}

impl<'a> Locator<'a> {
    pub fn new(index: &'a GenomeIndex) -> Self {
        Self { segments: index.segments() }
    }

    pub fn from_segments(segments: &'a [Segment]) -> Self {
        Self { segments }
    }

    /// 不落在任何片段内（哨兵或损坏的采样）时返回 `None`，调用方丢弃该候选
    pub fn resolve(&self, raw: u64) -> Option<Location> {
        let i = self.segments.partition_point(|s| s.start <= raw).checked_sub(1)?;
        let seg = &self.segments[i];
        if !seg.contains(raw) {
            return None;
        }
        Some(Location { segment: i, contig: seg.contig, offset: raw - seg.start, strand: seg.strand })
    }

    pub fn segment(&self, i: usize) -> &'a Segment {
        &self.segments[i]
    }

    /// 区间 `[loc.offset, loc.offset + span)` 的正链偏移。反链片段做镜像；
    /// 区间越过染色体末端时返回 `None`。
    pub fn to_forward(&self, loc: &Location, span: u64) -> Option<u64> {
        let len = self.segments[loc.segment].len;
        if loc.offset + span > len {
            return None;
        }
        match loc.strand {
            Strand::Forward => Some(loc.offset),
            Strand::Reverse => Some(len - loc.offset - span),
        }
    }
}
