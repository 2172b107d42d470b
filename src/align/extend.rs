//! 位并行有界编辑距离验证（Myers / Hyyrö 分块算法，64 位字）。
//!
//! 模式为 read 的一个方向，文本为候选位置两侧各放宽 k 的参考窗口；
//! 半全局模式：read 必须完整比对，文本起止自由。结果在界 k 内是精确的。

use std::fmt::Write as _;

use super::bitctx::{BitContext, WORD_BITS};
use crate::index::{GenomeIndex, Strand};

const HIGH_BIT: u64 = 1 << (WORD_BITS - 1);

/// 打分参数，只用于排序与 MAPQ；编辑距离本身与打分无关
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scoring {
    pub match_score: i32,
    pub mismatch_penalty: i32,
    pub gap_penalty: i32,
}

impl Default for Scoring {
    fn default() -> Self {
        Self { match_score: 1, mismatch_penalty: 4, gap_penalty: 6 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditOp {
    Match,
    Mismatch,
    /// read 中多出的碱基
    Insertion,
    /// 参考中多出的碱基
    Deletion,
}

impl EditOp {
    pub fn code(self) -> char {
        match self {
            EditOp::Match => '=',
            EditOp::Mismatch => 'X',
            EditOp::Insertion => 'I',
            EditOp::Deletion => 'D',
        }
    }

    /// SAM 中 =/X 合并为 M
    pub fn sam_code(self) -> char {
        match self {
            EditOp::Match | EditOp::Mismatch => 'M',
            other => other.code(),
        }
    }
}

/// 待验证的候选：read 方向上 read 起点所在的原始文本坐标（对角线）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub diag: i64,
    pub segment: usize,
    pub strand: Strand,
    /// 产生该候选的种子下标（可能属于另一方向）
    pub seed: usize,
}

/// 一次验证成功的比对
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub segment: usize,
    pub strand: Strand,
    /// 原始文本坐标 [ref_start, ref_end)
    pub ref_start: u64,
    pub ref_end: u64,
    pub edit_distance: u32,
    pub score: i32,
    pub ops: Vec<(EditOp, u32)>,
}

impl Match {
    pub fn span(&self) -> u64 {
        self.ref_end - self.ref_start
    }

    pub fn cigar(&self) -> String {
        ops_to_cigar(&self.ops, EditOp::sam_code)
    }

    pub fn extended_cigar(&self) -> String {
        ops_to_cigar(&self.ops, EditOp::code)
    }
}

/// 窗口内的比对结果（窗口相对坐标）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowAlignment {
    pub start: usize,
    pub end: usize,
    pub distance: u32,
    pub ops: Vec<(EditOp, u32)>,
}

pub fn ops_to_cigar(ops: &[(EditOp, u32)], code: impl Fn(EditOp) -> char) -> String {
    let mut cigar = String::new();
    let mut iter = ops.iter().map(|&(op, n)| (code(op), n)).peekable();
    while let Some((c, mut n)) = iter.next() {
        while let Some(&(c2, n2)) = iter.peek() {
            if c2 != c {
                break;
            }
            n += n2;
            iter.next();
        }
        let _ = write!(&mut cigar, "{}{}", n, c);
    }
    cigar
}

fn push_op(ops: &mut Vec<(EditOp, u32)>, op: EditOp) {
    match ops.last_mut() {
        Some((last, n)) if *last == op => *n += 1,
        _ => ops.push((op, 1)),
    }
}

#[inline]
fn delta_at(ph: u64, mh: u64, mask: u64) -> i64 {
    i64::from(ph & mask != 0) - i64::from(mh & mask != 0)
}

/// 推进一个块一列。返回新的 (Pv, Mv)、块最高位的水平差（传给下一块）
/// 以及 `bottom` 位上的水平差（块底行得分的增量）。
#[inline]
fn advance_block(pv: u64, mv: u64, eq: u64, hin: i64, bottom: u64) -> (u64, u64, i64, i64) {
    let hin_neg = u64::from(hin < 0);
    let xv = eq | mv;
    let eq = eq | hin_neg;
    let xh = ((eq & pv).wrapping_add(pv) ^ pv) | eq;
    let mut ph = mv | !(xh | pv);
    let mut mh = pv & xh;
    let carry = delta_at(ph, mh, HIGH_BIT);
    let bottom_delta = delta_at(ph, mh, bottom);
    ph = (ph << 1) | u64::from(hin > 0);
    mh = (mh << 1) | hin_neg;
    (mh | !(xv | ph), ph & xv, carry, bottom_delta)
}

/// `f(i) = max(a + i, 0) + max(c - i, 0)` 在 [lo, hi] 上的最小值（凸函数，取平台区间端点的夹逼值）
fn convex_min(a: i64, c: i64, lo: i64, hi: i64) -> i64 {
    let f = |i: i64| (a + i).max(0) + (c - i).max(0);
    f(c.clamp(lo, hi)).min(f((-a).clamp(lo, hi)))
}

/// 第 j 列已算完时，任何后续终点得分的下界。
/// 穿过第 i 行：D[i][j] + max(0, m - i - R)；在 j 之后才开始：max(0, m - R)。
/// 块内 D[i][j] ≥ S_b - (hi_b - i)。
fn future_lower_bound(scores: &[i64], m: usize, remaining: usize) -> i64 {
    let m = m as i64;
    let r = remaining as i64;
    let mut bound = (m - r).max(0);
    for (b, &s) in scores.iter().enumerate() {
        let lo = (b * WORD_BITS + 1) as i64;
        let hi = (((b + 1) * WORD_BITS) as i64).min(m);
        bound = bound.min(convex_min(s - hi, m - r, lo, hi));
    }
    bound
}

/// 第 j 列（0 = 空前缀）第 i 行的 DP 值，由 Pv/Mv 历史做前缀 popcount 得到
fn cell(ctx: &BitContext, i: usize, j: usize) -> i64 {
    let blocks = ctx.blocks();
    let pv = &ctx.hist_pv[j * blocks..(j + 1) * blocks];
    let mv = &ctx.hist_mv[j * blocks..(j + 1) * blocks];
    let full = i / WORD_BITS;
    let mut v = 0i64;
    for b in 0..full {
        v += i64::from(pv[b].count_ones()) - i64::from(mv[b].count_ones());
    }
    let rem = i % WORD_BITS;
    if rem > 0 {
        let mask = (1u64 << rem) - 1;
        v += i64::from((pv[full] & mask).count_ones()) - i64::from((mv[full] & mask).count_ones());
    }
    v
}

/// 在窗口内求 read（`strand` 方向）的最佳半全局比对，距离不超过 k 时返回。
///
/// 终点选择：距离最小，其次离 `expected_end` 最近，再次最靠左。
/// 调用前需 `ctx.load_read`。
pub fn align_window(
    ctx: &mut BitContext,
    strand: Strand,
    window: &[u8],
    k: u32,
    expected_end: usize,
) -> Option<WindowAlignment> {
    let m = ctx.pattern_len();
    let n = window.len();
    if m == 0 || n + (k as usize) < m {
        return None;
    }
    let blocks = ctx.blocks();
    let last_bit = 1u64 << ((m - 1) % WORD_BITS);
    let k = i64::from(k);
    ctx.reserve_columns(n);

    for b in 0..blocks {
        ctx.pv[b] = u64::MAX;
        ctx.mv[b] = 0;
        ctx.scores[b] = ((b + 1) * WORD_BITS).min(m) as i64;
        ctx.hist_pv[b] = u64::MAX;
        ctx.hist_mv[b] = 0;
    }

    // (距离, 与期望终点的偏差, 列)
    let mut best: Option<(i64, usize, usize)> = None;
    for j in 0..n {
        let a = window[j];
        let mut hin = 0i64;
        for b in 0..blocks {
            let eq = ctx.peq(strand, a, b);
            let bottom = if b + 1 == blocks { last_bit } else { HIGH_BIT };
            let (pv, mv, carry, bottom_delta) = advance_block(ctx.pv[b], ctx.mv[b], eq, hin, bottom);
            ctx.pv[b] = pv;
            ctx.mv[b] = mv;
            ctx.scores[b] += bottom_delta;
            hin = carry;
        }
        let col = j + 1;
        let base = col * blocks;
        ctx.hist_pv[base..base + blocks].copy_from_slice(&ctx.pv[..blocks]);
        ctx.hist_mv[base..base + blocks].copy_from_slice(&ctx.mv[..blocks]);

        let d = ctx.scores[blocks - 1];
        if d <= k {
            let key = (d, col.abs_diff(expected_end), col);
            if best.map_or(true, |b| key < b) {
                best = Some(key);
            }
        }

        let limit = best.map_or(k, |(bd, _, _)| bd);
        if future_lower_bound(&ctx.scores[..blocks], m, n - col) > limit {
            break;
        }
    }

    let (distance, _, end) = best?;
    let (start, ops) = traceback(ctx, strand, window, end);
    Some(WindowAlignment { start, end, distance: distance as u32, ops })
}

/// 从 (m, end) 回溯到第 0 行，优先对角线，其次插入、删除
fn traceback(ctx: &BitContext, strand: Strand, window: &[u8], end: usize) -> (usize, Vec<(EditOp, u32)>) {
    let pattern = ctx.pattern(strand);
    let mut i = pattern.len();
    let mut j = end;
    let mut here = cell(ctx, i, j);
    let mut rev_ops: Vec<(EditOp, u32)> = Vec::new();

    while i > 0 {
        if j > 0 {
            let p = pattern[i - 1];
            let same = p == window[j - 1] && (1..=4).contains(&p);
            let diag = cell(ctx, i - 1, j - 1);
            if diag + i64::from(!same) == here {
                push_op(&mut rev_ops, if same { EditOp::Match } else { EditOp::Mismatch });
                i -= 1;
                j -= 1;
                here = diag;
                continue;
            }
        }
        let up = cell(ctx, i - 1, j);
        if up + 1 == here {
            push_op(&mut rev_ops, EditOp::Insertion);
            i -= 1;
            here = up;
            continue;
        }
        debug_assert!(j > 0, "traceback stuck at column 0");
        let left = cell(ctx, i, j - 1);
        debug_assert_eq!(left + 1, here, "inconsistent DP history");
        push_op(&mut rev_ops, EditOp::Deletion);
        j -= 1;
        here = left;
    }
    rev_ops.reverse();
    (j, rev_ops)
}

pub fn score_ops(ops: &[(EditOp, u32)], scoring: &Scoring) -> i32 {
    ops.iter()
        .map(|&(op, n)| {
            let n = n as i32;
            match op {
                EditOp::Match => n * scoring.match_score,
                EditOp::Mismatch => -n * scoring.mismatch_penalty,
                EditOp::Insertion | EditOp::Deletion => -n * scoring.gap_penalty,
            }
        })
        .sum()
}

/// 候选验证器：取参考窗口并运行位并行 DP
#[derive(Debug, Clone, Copy)]
pub struct Extender<'a> {
    index: &'a GenomeIndex,
    scoring: Scoring,
}

impl<'a> Extender<'a> {
    pub fn new(index: &'a GenomeIndex, scoring: Scoring) -> Self {
        Self { index, scoring }
    }

    /// 验证一个候选，窗口限制在候选所在片段内。距离超过 k 返回 None。
    pub fn verify(&self, ctx: &mut BitContext, cand: &Candidate, k: u32) -> Option<Match> {
        let seg = &self.index.segments()[cand.segment];
        let m = ctx.pattern_len() as i64;
        let k64 = i64::from(k);
        let ws = (cand.diag - k64).max(seg.start as i64);
        let we = (cand.diag + m + k64).min(seg.end() as i64);
        if we <= ws {
            return None;
        }

        let mut window = std::mem::take(&mut ctx.window);
        self.index.fetch_into(ws as u64, we as u64, &mut window);
        let expected_end = (cand.diag + m - ws).max(0) as usize;
        let aln = align_window(ctx, cand.strand, &window, k, expected_end);
        ctx.window = window;

        let aln = aln?;
        Some(Match {
            segment: cand.segment,
            strand: cand.strand,
            ref_start: ws as u64 + aln.start as u64,
            ref_end: ws as u64 + aln.end as u64,
            edit_distance: aln.distance,
            score: score_ops(&aln.ops, &self.scoring),
            ops: aln.ops,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::dna;

    /// 二次复杂度的半全局编辑距离，作为独立参照
    fn naive_semiglobal(p: &[u8], t: &[u8]) -> (u32, usize) {
        let m = p.len();
        let mut prev: Vec<u32> = (0..=m as u32).collect();
        let mut best = (prev[m], 0usize);
        for (j, &tc) in t.iter().enumerate() {
            let mut cur = vec![0u32; m + 1];
            for i in 1..=m {
                let same = p[i - 1] == tc && (1..=4).contains(&tc);
                cur[i] = (prev[i - 1] + u32::from(!same)).min(prev[i] + 1).min(cur[i - 1] + 1);
            }
            if cur[m] < best.0 {
                best = (cur[m], j + 1);
            }
            prev = cur;
        }
        best
    }

    fn naive_global(p: &[u8], t: &[u8]) -> u32 {
        let mut prev: Vec<u32> = (0..=t.len() as u32).collect();
        for i in 1..=p.len() {
            let mut cur = vec![i as u32; t.len() + 1];
            for j in 1..=t.len() {
                let same = p[i - 1] == t[j - 1] && (1..=4).contains(&p[i - 1]);
                cur[j] = (prev[j - 1] + u32::from(!same)).min(prev[j] + 1).min(cur[j - 1] + 1);
            }
            prev = cur;
        }
        prev[t.len()]
    }

    struct Lcg(u32);

    impl Lcg {
        fn next(&mut self) -> u32 {
            self.0 = self.0.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            self.0 >> 16
        }

        fn seq(&mut self, len: usize) -> Vec<u8> {
            (0..len).map(|_| (self.next() % 4) as u8 + 1).collect()
        }

        /// 在 seq 上随机施加 edits 次替换/插入/删除
        fn mutate(&mut self, seq: &[u8], edits: usize) -> Vec<u8> {
            let mut s = seq.to_vec();
            for _ in 0..edits {
                let pos = self.next() as usize % s.len();
                match self.next() % 3 {
                    0 => s[pos] = s[pos] % 4 + 1,
                    1 => s.insert(pos, (self.next() % 4) as u8 + 1),
                    _ => {
                        if s.len() > 1 {
                            s.remove(pos);
                        }
                    }
                }
            }
            s
        }
    }

    fn load(ctx: &mut BitContext, read: &[u8]) {
        ctx.load_read(read, &dna::revcomp_codes(read));
    }

    fn apply_ops(ops: &[(EditOp, u32)]) -> (usize, usize, u32) {
        let (mut q, mut r, mut nm) = (0usize, 0usize, 0u32);
        for &(op, n) in ops {
            let n_us = n as usize;
            match op {
                EditOp::Match => {
                    q += n_us;
                    r += n_us;
                }
                EditOp::Mismatch => {
                    q += n_us;
                    r += n_us;
                    nm += n;
                }
                EditOp::Insertion => {
                    q += n_us;
                    nm += n;
                }
                EditOp::Deletion => {
                    r += n_us;
                    nm += n;
                }
            }
        }
        (q, r, nm)
    }

    #[test]
    fn exact_match_in_window() {
        let mut ctx = BitContext::new();
        let read = dna::encode(b"ACGTTGCA");
        load(&mut ctx, &read);
        let window = dna::encode(b"GGACGTTGCAGG");
        let aln = align_window(&mut ctx, Strand::Forward, &window, 1, 10).unwrap();
        assert_eq!((aln.start, aln.end, aln.distance), (2, 10, 0));
        assert_eq!(aln.ops, vec![(EditOp::Match, 8)]);
    }

    #[test]
    fn substitution_insertion_deletion() {
        let mut ctx = BitContext::new();
        let window = dna::encode(b"TTTTACGTACGGATCCTTTT");

        let read = dna::encode(b"ACGTACTGATCC");
        load(&mut ctx, &read);
        let aln = align_window(&mut ctx, Strand::Forward, &window, 2, 16).unwrap();
        assert_eq!(aln.distance, 1);
        assert_eq!(ops_to_cigar(&aln.ops, EditOp::code), "6=1X5=");

        let ins = dna::encode(b"ACGTACAGGATCC");
        load(&mut ctx, &ins);
        let aln = align_window(&mut ctx, Strand::Forward, &window, 2, 16).unwrap();
        assert_eq!(aln.distance, 1);
        assert_eq!(ops_to_cigar(&aln.ops, EditOp::sam_code).matches('I').count(), 1);

        let del = dna::encode(b"ACGTACGATCC");
        load(&mut ctx, &del);
        let aln = align_window(&mut ctx, Strand::Forward, &window, 2, 16).unwrap();
        assert_eq!(aln.distance, 1);
        assert!(aln.ops.iter().any(|&(op, n)| op == EditOp::Deletion && n == 1));
        assert_eq!((aln.start, aln.end), (4, 16));
    }

    #[test]
    fn over_bound_is_rejected() {
        let mut ctx = BitContext::new();
        let read = dna::encode(b"AAAAAAAAAA");
        load(&mut ctx, &read);
        let window = dna::encode(b"CCCCCCCCCCCC");
        assert!(align_window(&mut ctx, Strand::Forward, &window, 3, 11).is_none());
        // 窗口过短
        assert!(align_window(&mut ctx, Strand::Forward, &dna::encode(b"AAAA"), 3, 4).is_none());
    }

    #[test]
    fn n_never_matches() {
        let mut ctx = BitContext::new();
        let read = dna::encode(b"ACGNACG");
        load(&mut ctx, &read);
        let window = dna::encode(b"ACGNACG");
        let aln = align_window(&mut ctx, Strand::Forward, &window, 2, 7).unwrap();
        assert_eq!(aln.distance, 1);
    }

    #[test]
    fn reverse_orientation_uses_its_own_peq() {
        let mut ctx = BitContext::new();
        let read = dna::encode(b"AACCGGTTAG");
        load(&mut ctx, &read);
        let window = dna::revcomp_codes(&read);
        let aln = align_window(&mut ctx, Strand::Reverse, &window, 0, 10).unwrap();
        assert_eq!(aln.distance, 0);
        assert!(align_window(&mut ctx, Strand::Forward, &window, 0, 10).is_none());
    }

    #[test]
    fn bit_parallel_matches_quadratic_dp() {
        let mut rng = Lcg(2024);
        let mut ctx = BitContext::new();
        for &m in &[1usize, 5, 31, 63, 64, 65, 100, 128, 129, 200] {
            for trial in 0..12 {
                let read = rng.seq(m);
                let k = (trial % 6) as u32;
                let edits = (rng.next() % 8) as usize;
                let core = rng.mutate(&read, edits);
                let mut window = rng.seq(k as usize);
                window.extend_from_slice(&core);
                window.extend(rng.seq(k as usize));

                load(&mut ctx, &read);
                let expected_end = k as usize + m;
                let got = align_window(&mut ctx, Strand::Forward, &window, k, expected_end);
                let (naive_d, _) = naive_semiglobal(&read, &window);

                match got {
                    Some(aln) => {
                        assert_eq!(aln.distance, naive_d, "m={} trial={}", m, trial);
                        assert!(aln.distance <= k);
                        let (q, r, nm) = apply_ops(&aln.ops);
                        assert_eq!(q, m);
                        assert_eq!(r, aln.end - aln.start);
                        assert_eq!(nm, aln.distance);
                        assert_eq!(naive_global(&read, &window[aln.start..aln.end]), aln.distance);
                    }
                    None => assert!(naive_d > k, "missed alignment m={} d={} k={}", m, naive_d, k),
                }
            }
        }
    }

    #[test]
    fn prefers_end_closest_to_expected() {
        // 读段在窗口中出现两次，距离相同时取靠近期望终点的一处
        let mut ctx = BitContext::new();
        let read = dna::encode(b"GATTACA");
        load(&mut ctx, &read);
        let window = dna::encode(b"GATTACATTGATTACA");
        let left = align_window(&mut ctx, Strand::Forward, &window, 1, 7).unwrap();
        assert_eq!((left.start, left.end), (0, 7));
        let right = align_window(&mut ctx, Strand::Forward, &window, 1, 16).unwrap();
        assert_eq!((right.start, right.end), (9, 16));
    }

    #[test]
    fn cigar_merges_runs() {
        let ops = vec![(EditOp::Match, 3), (EditOp::Mismatch, 1), (EditOp::Match, 2), (EditOp::Insertion, 2)];
        assert_eq!(ops_to_cigar(&ops, EditOp::sam_code), "6M2I");
        assert_eq!(ops_to_cigar(&ops, EditOp::code), "3=1X2=2I");
        assert_eq!(score_ops(&ops, &Scoring::default()), 5 - 4 - 12);
    }
}
