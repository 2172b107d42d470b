use crate::index::{GenomeIndex, SaRange, Strand};

/// 种子划分策略，由配置选择
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedStrategy {
    /// 定长平铺：起点 0, step, 2·step …；网格未覆盖到 read 末端时补一个末端种子
    Fixed { length: usize, step: usize },
    /// 自右向左逐字符延长，直到长度 ≥ min_length 且命中数不超过重复阈值
    Adaptive { min_length: usize },
}

impl SeedStrategy {
    pub fn min_length(&self) -> usize {
        match *self {
            SeedStrategy::Fixed { length, .. } => length,
            SeedStrategy::Adaptive { min_length } => min_length,
        }
    }
}

/// 种子命中数分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HitClass {
    Unique,
    Moderate,
    Repetitive,
    Absent,
}

impl HitClass {
    pub fn of(count: u64, cutoff: u64) -> Self {
        match count {
            0 => HitClass::Absent,
            1 => HitClass::Unique,
            c if c <= cutoff => HitClass::Moderate,
            _ => HitClass::Repetitive,
        }
    }

    pub fn is_trusted(self) -> bool {
        matches!(self, HitClass::Unique | HitClass::Moderate)
    }
}

/// read 某一方向上的区间 [start, end) 及其在索引中的精确出现
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seed {
    pub strand: Strand,
    pub start: usize,
    pub end: usize,
    pub range: SaRange,
    /// 原始文本坐标（升序）。重复或缺失种子为空。
    pub hits: Vec<u64>,
    pub class: HitClass,
}

impl Seed {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn count(&self) -> u64 {
        self.range.len()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Seeder<'a> {
    index: &'a GenomeIndex,
    strategy: SeedStrategy,
    cutoff: u64,
}

impl<'a> Seeder<'a> {
    pub fn new(index: &'a GenomeIndex, strategy: SeedStrategy, repetitive_cutoff: u64) -> Self {
        Self { index, strategy, cutoff: repetitive_cutoff }
    }

    /// 对一个方向的编码序列生成种子，惰性、单遍
    pub fn seeds<'p>(&self, pattern: &'p [u8], strand: Strand) -> SeedIter<'a, 'p> {
        let cursor = match self.strategy {
            SeedStrategy::Fixed { length, step } => Cursor::Fixed { next: 0, length: length.max(1), step: step.max(1), covered: 0 },
            SeedStrategy::Adaptive { min_length } => Cursor::Adaptive { end: pattern.len(), min_length: min_length.max(1) },
        };
        SeedIter { index: self.index, cutoff: self.cutoff, pattern, strand, cursor }
    }
}

enum Cursor {
    Fixed { next: usize, length: usize, step: usize, covered: usize },
    Adaptive { end: usize, min_length: usize },
}

pub struct SeedIter<'a, 'p> {
    index: &'a GenomeIndex,
    cutoff: u64,
    pattern: &'p [u8],
    strand: Strand,
    cursor: Cursor,
}

impl<'a, 'p> SeedIter<'a, 'p> {
    fn materialize(&self, start: usize, end: usize, range: SaRange) -> Seed {
        let class = HitClass::of(range.len(), self.cutoff);
        let mut hits: Vec<u64> = if class.is_trusted() {
            range.rows().map(|row| self.index.locate(row)).collect()
        } else {
            Vec::new()
        };
        hits.sort_unstable();
        Seed { strand: self.strand, start, end, range, hits, class }
    }

    fn next_fixed(&mut self) -> Option<(usize, usize)> {
        let n = self.pattern.len();
        let Cursor::Fixed { next, length, step, covered } = &mut self.cursor else {
            return None;
        };
        if n == 0 || *covered >= n {
            return None;
        }
        // read 比种子短：整条 read 作为一个种子
        if n < *length {
            *covered = n;
            return Some((0, n));
        }
        let start = if *next + *length <= n { *next } else { n - *length };
        *next += *step;
        *covered = start + *length;
        Some((start, start + *length))
    }

    fn next_adaptive(&mut self) -> Option<Seed> {
        let Cursor::Adaptive { end, min_length } = self.cursor else {
            return None;
        };
        if end == 0 {
            return None;
        }
        let mut range = self.index.full_range();
        let mut s = end;
        loop {
            s -= 1;
            let next = self.index.extend(range, self.pattern[s]);
            if next.is_empty() {
                // 跳过导致失配的碱基
                self.cursor = Cursor::Adaptive { end: s, min_length };
                return Some(self.materialize(s, end, SaRange::EMPTY));
            }
            range = next;
            if (end - s >= min_length && range.len() <= self.cutoff) || s == 0 {
                self.cursor = Cursor::Adaptive { end: s, min_length };
                return Some(self.materialize(s, end, range));
            }
        }
    }
}

impl<'a, 'p> Iterator for SeedIter<'a, 'p> {
    type Item = Seed;

    fn next(&mut self) -> Option<Seed> {
        match self.cursor {
            Cursor::Fixed { .. } => {
                let (start, end) = self.next_fixed()?;
                let range = self.index.search(&self.pattern[start..end]);
                Some(self.materialize(start, end, range))
            }
            Cursor::Adaptive { .. } => self.next_adaptive(),
        }
    }
}
