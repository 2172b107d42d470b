use crate::index::Strand;
use crate::util::dna::SIGMA;

pub const WORD_BITS: usize = 64;

/// 每个工作线程私有的位并行 DP 缓冲区。
///
/// - 两个方向各一张 Peq 表（σ × blocks 个字），每条 read 只计算一次
/// - 当前列的 Pv/Mv 与每个块底行的得分
/// - 每列 Pv/Mv 历史，用于回溯
/// - 参考窗口缓冲
///
/// 所有缓冲只增不减：新 read 或新窗口更长时扩容，否则原地复用。
#[derive(Debug, Default)]
pub struct BitContext {
    m: usize,
    blocks: usize,
    patterns: [Vec<u8>; 2],
    peq: [Vec<u64>; 2],
    pub(crate) pv: Vec<u64>,
    pub(crate) mv: Vec<u64>,
    pub(crate) scores: Vec<i64>,
    pub(crate) hist_pv: Vec<u64>,
    pub(crate) hist_mv: Vec<u64>,
    pub(crate) window: Vec<u8>,
    grow_events: u64,
}

#[inline]
fn ensure_len<T: Clone + Default>(v: &mut Vec<T>, need: usize, grew: &mut bool) {
    if v.len() < need {
        v.resize(need, T::default());
        *grew = true;
    }
}

impl BitContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// 载入一条 read 的两个方向（编码序列，长度相同），预计算 Peq
    pub fn load_read(&mut self, forward: &[u8], reverse: &[u8]) {
        debug_assert_eq!(forward.len(), reverse.len());
        let m = forward.len();
        let blocks = (m + WORD_BITS - 1) / WORD_BITS;
        self.m = m;
        self.blocks = blocks;

        let mut grew = false;
        for (slot, pat) in [forward, reverse].into_iter().enumerate() {
            self.patterns[slot].clear();
            self.patterns[slot].extend_from_slice(pat);

            ensure_len(&mut self.peq[slot], SIGMA * blocks, &mut grew);
            let peq = &mut self.peq[slot][..SIGMA * blocks];
            peq.fill(0);
            for (i, &a) in pat.iter().enumerate() {
                // N 与任何字符都不相等
                if (1..=4).contains(&a) {
                    peq[a as usize * blocks + i / WORD_BITS] |= 1u64 << (i % WORD_BITS);
                }
            }
        }
        ensure_len(&mut self.pv, blocks, &mut grew);
        ensure_len(&mut self.mv, blocks, &mut grew);
        ensure_len(&mut self.scores, blocks, &mut grew);
        if grew {
            self.grow_events += 1;
        }
    }

    /// 确保列历史能容纳 `cols + 1` 列
    pub(crate) fn reserve_columns(&mut self, cols: usize) {
        let need = (cols + 1) * self.blocks;
        let mut grew = false;
        ensure_len(&mut self.hist_pv, need, &mut grew);
        ensure_len(&mut self.hist_mv, need, &mut grew);
        if grew {
            self.grow_events += 1;
        }
    }

    pub fn pattern_len(&self) -> usize {
        self.m
    }

    pub fn blocks(&self) -> usize {
        self.blocks
    }

    pub fn pattern(&self, strand: Strand) -> &[u8] {
        &self.patterns[strand.index()]
    }

    /// 文本符号 a 对应的 Peq 第 b 块；非 ACGT 符号返回 0
    #[inline]
    pub(crate) fn peq(&self, strand: Strand, a: u8, b: usize) -> u64 {
        if (1..=4).contains(&a) {
            self.peq[strand.index()][a as usize * self.blocks + b]
        } else {
            0
        }
    }

    /// 缓冲区扩容的次数（复用时不变）
    pub fn grow_events(&self) -> u64 {
        self.grow_events
    }
}
