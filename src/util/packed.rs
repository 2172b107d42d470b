use serde::{Deserialize, Serialize};

/// 定宽位压缩整数数组：每个元素占 `width` 位，连续存放在 u64 字中。
/// 元素可以跨越字边界。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedVec {
    width: u32,
    len: usize,
    words: Vec<u64>,
}

/// 表示 `max` 所需的最少位数（至少 1 位）
pub fn bits_for(max: u64) -> u32 {
    (64 - max.leading_zeros()).max(1)
}

impl PackedVec {
    pub fn new(width: u32, len: usize) -> Self {
        assert!((1..=64).contains(&width), "packed width must be in 1..=64");
        let total_bits = len * width as usize;
        Self { width, len, words: vec![0; (total_bits + 63) / 64] }
    }

    /// 以 `width` 位打包给定取值；取值超出宽度会 panic
    pub fn from_values(width: u32, values: impl ExactSizeIterator<Item = u64>) -> Self {
        let mut v = Self::new(width, values.len());
        for (i, x) in values.enumerate() {
            v.set(i, x);
        }
        v
    }

    #[inline]
    fn mask(&self) -> u64 {
        if self.width == 64 { u64::MAX } else { (1u64 << self.width) - 1 }
    }

    #[inline]
    pub fn get(&self, i: usize) -> u64 {
        debug_assert!(i < self.len);
        let bit = i * self.width as usize;
        let w = bit / 64;
        let off = (bit % 64) as u32;
        let mut val = self.words[w] >> off;
        if off + self.width > 64 {
            val |= self.words[w + 1] << (64 - off);
        }
        val & self.mask()
    }

    pub fn set(&mut self, i: usize, value: u64) {
        assert!(i < self.len, "packed index {} out of bounds ({})", i, self.len);
        let mask = self.mask();
        assert!(value & !mask == 0, "value {} does not fit in {} bits", value, self.width);
        let bit = i * self.width as usize;
        let w = bit / 64;
        let off = (bit % 64) as u32;
        self.words[w] = (self.words[w] & !(mask << off)) | (value << off);
        if off + self.width > 64 {
            let spill = off + self.width - 64;
            let hi_mask = (1u64 << spill) - 1;
            self.words[w + 1] = (self.words[w + 1] & !hi_mask) | (value >> (64 - off));
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.len).map(move |i| self.get(i))
    }

    /// 底层存储是否与 `len * width` 一致（加载时做完整性检查）
    pub fn is_consistent(&self) -> bool {
        (1..=64).contains(&self.width) && self.words.len() == (self.len * self.width as usize + 63) / 64
    }

    pub fn heap_bytes(&self) -> usize {
        self.words.len() * 8
    }
}

const SUPERBLOCK_WORDS: usize = 8;

/// 支持 rank 查询的位向量：每 512 位记录一次累计 1 的个数，块内用 popcount 补偿。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankBitVec {
    len: usize,
    bits: Vec<u64>,
    /// superblock 起点之前 1 的个数
    ranks: PackedVec,
}

impl RankBitVec {
    /// 以置位位置集合构造
    pub fn from_positions(len: usize, positions: impl IntoIterator<Item = usize>) -> Self {
        let mut bits = vec![0u64; (len + 63) / 64];
        for p in positions {
            assert!(p < len, "bit position {} out of bounds ({})", p, len);
            bits[p / 64] |= 1u64 << (p % 64);
        }
        let n_super = bits.len() / SUPERBLOCK_WORDS + 1;
        let mut ranks = PackedVec::new(bits_for(len as u64), n_super);
        let mut acc = 0u64;
        for (sb, chunk) in bits.chunks(SUPERBLOCK_WORDS).enumerate() {
            ranks.set(sb, acc);
            acc += chunk.iter().map(|w| u64::from(w.count_ones())).sum::<u64>();
        }
        if bits.len() % SUPERBLOCK_WORDS == 0 {
            ranks.set(n_super - 1, acc);
        }
        Self { len, bits, ranks }
    }

    #[inline]
    pub fn get(&self, i: usize) -> bool {
        debug_assert!(i < self.len);
        self.bits[i / 64] >> (i % 64) & 1 == 1
    }

    /// [0, i) 中 1 的个数
    #[inline]
    pub fn rank1(&self, i: usize) -> usize {
        debug_assert!(i <= self.len);
        let w = i / 64;
        let sb = w / SUPERBLOCK_WORDS;
        let mut r = self.ranks.get(sb) as usize;
        for word in &self.bits[sb * SUPERBLOCK_WORDS..w] {
            r += word.count_ones() as usize;
        }
        let rem = i % 64;
        if rem > 0 {
            r += (self.bits[w] & ((1u64 << rem) - 1)).count_ones() as usize;
        }
        r
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn count_ones(&self) -> usize {
        self.rank1(self.len)
    }

    pub fn is_consistent(&self) -> bool {
        self.bits.len() == (self.len + 63) / 64
            && self.ranks.is_consistent()
            && self.ranks.len() == self.bits.len() / SUPERBLOCK_WORDS + 1
    }

    pub fn heap_bytes(&self) -> usize {
        self.bits.len() * 8 + self.ranks.heap_bytes()
    }
}
