use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::Strand;
use crate::error::IndexError;
use crate::util::dna::{self, SENTINEL, SIGMA};
use crate::util::packed::{bits_for, PackedVec, RankBitVec};

pub const INDEX_MAGIC: &[u8; 8] = b"BPMAPIDX";
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contig {
    pub name: String,
    pub len: u64,
    /// 正链在参考文本中的起始偏移
    pub offset: u64,
}

/// 参考文本中的一段：某条染色体的正链或其反向互补
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub contig: usize,
    pub start: u64,
    pub len: u64,
    pub strand: Strand,
}

impl Segment {
    #[inline]
    pub fn end(&self) -> u64 {
        self.start + self.len
    }

    #[inline]
    pub fn contains(&self, pos: u64) -> bool {
        pos >= self.start && pos < self.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub reference_file: Option<String>,
    pub build_args: Option<String>,
    pub build_timestamp: Option<String>,
}

/// 后缀数组区间 [lo, hi)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaRange {
    pub lo: u64,
    pub hi: u64,
}

impl SaRange {
    pub const EMPTY: SaRange = SaRange { lo: 0, hi: 0 };

    #[inline]
    pub fn len(&self) -> u64 {
        self.hi.saturating_sub(self.lo)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hi <= self.lo
    }

    pub fn rows(&self) -> std::ops::Range<u64> {
        self.lo..self.hi
    }
}

/// 压缩 FM 索引（查询侧）。
///
/// 参考文本布局：`F · revcomp(F) · $`，其中 F 是所有染色体正链按 FASTA 顺序拼接。
/// 因此反链半区的位置 p 对应正链位置 `2F - 1 - p`，反链片段按染色体逆序排列。
///
/// - BWT 以 3 位/符号打包
/// - Occ 按 `occ_interval` 定长采样，块内顺扫补偿
/// - SA 按文本位置稀疏采样：文本位置是 `sample_interval` 的倍数的行被标记，
///   locate 至多走 `sample_interval - 1` 步 LF
/// - 另存正链参考（3 位/符号），用于取验证窗口
///
/// 加载后不可变，查询无需同步。
#[derive(Debug, Serialize, Deserialize)]
pub struct GenomeIndex {
    meta: IndexMeta,
    contigs: Vec<Contig>,
    segments: Vec<Segment>,
    /// 文本总长（含哨兵）
    n: u64,
    /// C[a] = 文本中字母 < a 的数量；C[SIGMA] = n
    c: [u64; SIGMA + 1],
    bwt: PackedVec,
    /// BWT 中哨兵所在行
    primary: u64,
    occ_interval: u32,
    /// occ[cp * SIGMA + a] = BWT[0 .. cp * occ_interval) 中 a 的个数
    occ: PackedVec,
    sample_interval: u32,
    sampled_rows: RankBitVec,
    /// 被采样行的 SA 值除以 sample_interval，按行号顺序存放
    samples: PackedVec,
    forward: PackedVec,
}

impl GenomeIndex {
    /// 由文本与完整后缀数组生成压缩索引。`text` 必须以唯一哨兵结尾，
    /// 且哨兵之前的内容是正链半区与其整体反向互补。
    pub fn from_sa(
        text: &[u8],
        sa: &[u64],
        contigs: Vec<Contig>,
        occ_interval: u32,
        sample_interval: u32,
    ) -> Self {
        let n = text.len();
        assert!(n >= 1 && text[n - 1] == SENTINEL, "text must end with the sentinel");
        assert_eq!(sa.len(), n, "suffix array length must match text length");
        assert!(occ_interval > 0 && sample_interval > 0, "sampling intervals must be positive");
        let fwd_len = (n - 1) / 2;

        // BWT 与哨兵行
        let mut primary = 0u64;
        let bwt = PackedVec::from_values(
            3,
            sa.iter().enumerate().map(|(row, &p)| {
                if p == 0 {
                    primary = row as u64;
                    u64::from(text[n - 1])
                } else {
                    u64::from(text[p as usize - 1])
                }
            }),
        );

        // C 表
        let mut freq = [0u64; SIGMA];
        for &ch in text {
            freq[ch as usize] += 1;
        }
        let mut c = [0u64; SIGMA + 1];
        for a in 0..SIGMA {
            c[a + 1] = c[a] + freq[a];
        }

        // Occ 采样
        let block = occ_interval as usize;
        let n_cp = n / block + 1;
        let mut occ = PackedVec::new(bits_for(n as u64), n_cp * SIGMA);
        let mut running = [0u64; SIGMA];
        for row in 0..n {
            if row % block == 0 {
                for a in 0..SIGMA {
                    occ.set((row / block) * SIGMA + a, running[a]);
                }
            }
            running[bwt.get(row) as usize] += 1;
        }
        if n % block == 0 {
            for a in 0..SIGMA {
                occ.set((n / block) * SIGMA + a, running[a]);
            }
        }

        // SA 稀疏采样（按文本位置）
        let interval = u64::from(sample_interval);
        let sampled: Vec<usize> = (0..n).filter(|&row| sa[row] % interval == 0).collect();
        let sampled_rows = RankBitVec::from_positions(n, sampled.iter().copied());
        let samples = PackedVec::from_values(
            bits_for(n as u64 / interval),
            sampled.iter().map(|&row| sa[row] / interval),
        );

        let forward = PackedVec::from_values(3, text[..fwd_len].iter().map(|&b| u64::from(b)));
        let segments = build_segments(&contigs, fwd_len as u64);

        Self {
            meta: IndexMeta::default(),
            contigs,
            segments,
            n: n as u64,
            c,
            bwt,
            primary,
            occ_interval,
            occ,
            sample_interval,
            sampled_rows,
            samples,
            forward,
        }
    }

    pub fn set_meta(&mut self, meta: IndexMeta) {
        self.meta = meta;
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn contigs(&self) -> &[Contig] {
        &self.contigs
    }

    /// 片段边界表，按起始偏移升序
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// 文本总长（含哨兵）
    pub fn text_len(&self) -> u64 {
        self.n
    }

    /// 正链半区长度
    pub fn forward_len(&self) -> u64 {
        self.forward.len() as u64
    }

    pub fn sample_interval(&self) -> u32 {
        self.sample_interval
    }

    /// BWT[0..pos) 中 a 的出现次数
    #[inline]
    pub fn occ(&self, a: u8, pos: u64) -> u64 {
        let block = self.occ_interval as u64;
        let cp = pos / block;
        let mut count = self.occ.get(cp as usize * SIGMA + a as usize);
        for row in cp * block..pos {
            if self.bwt.get(row as usize) == u64::from(a) {
                count += 1;
            }
        }
        count
    }

    /// 向左扩展一个字符后的新区间
    #[inline]
    pub fn extend(&self, range: SaRange, a: u8) -> SaRange {
        if a == SENTINEL || a as usize >= SIGMA || range.is_empty() {
            return SaRange::EMPTY;
        }
        let base = self.c[a as usize];
        SaRange { lo: base + self.occ(a, range.lo), hi: base + self.occ(a, range.hi) }
    }

    /// 整个文本对应的区间（空模式）
    pub fn full_range(&self) -> SaRange {
        SaRange { lo: 0, hi: self.n }
    }

    /// 反向搜索精确匹配；pat 为编码后的字母表。区间为空即提前终止。
    pub fn search(&self, pat: &[u8]) -> SaRange {
        let mut range = self.full_range();
        for &a in pat.iter().rev() {
            range = self.extend(range, a);
            if range.is_empty() {
                return SaRange::EMPTY;
            }
        }
        range
    }

    /// LF 映射：文本位置 SA[row]-1 所在的行
    #[inline]
    fn lf(&self, row: u64) -> u64 {
        let a = self.bwt.get(row as usize) as u8;
        debug_assert_ne!(row, self.primary, "LF walked past text start");
        self.c[a as usize] + self.occ(a, row)
    }

    /// 将一行解析为原始文本坐标：沿 LF 走到最近的采样行后补偿步数。
    pub fn locate(&self, row: u64) -> u64 {
        let mut row = row;
        let mut steps = 0u64;
        while !self.sampled_rows.get(row as usize) {
            row = self.lf(row);
            steps += 1;
        }
        let k = self.sampled_rows.rank1(row as usize);
        self.samples.get(k) * u64::from(self.sample_interval) + steps
    }

    /// 原始坐标处的符号；反链半区由正链互补得到
    #[inline]
    pub fn symbol_at(&self, pos: u64) -> u8 {
        let f = self.forward_len();
        if pos < f {
            self.forward.get(pos as usize) as u8
        } else if pos < 2 * f {
            dna::complement_code(self.forward.get((2 * f - 1 - pos) as usize) as u8)
        } else {
            SENTINEL
        }
    }

    /// 取原始区间 [start, end) 的参考符号，越界部分截断
    pub fn fetch(&self, start: u64, end: u64) -> Vec<u8> {
        let end = end.min(self.n);
        (start.min(end)..end).map(|p| self.symbol_at(p)).collect()
    }

    /// 与 `fetch` 相同，但写入调用方提供的缓冲区
    pub fn fetch_into(&self, start: u64, end: u64, out: &mut Vec<u8>) {
        out.clear();
        let end = end.min(self.n);
        out.extend((start.min(end)..end).map(|p| self.symbol_at(p)));
    }

    pub fn heap_bytes(&self) -> usize {
        self.bwt.heap_bytes()
            + self.occ.heap_bytes()
            + self.sampled_rows.heap_bytes()
            + self.samples.heap_bytes()
            + self.forward.heap_bytes()
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut w = BufWriter::new(File::create(path.as_ref())?);
        w.write_all(INDEX_MAGIC)?;
        w.write_all(&FORMAT_VERSION.to_le_bytes())?;
        bincode::serialize_into(&mut w, self)?;
        w.flush()?;
        Ok(())
    }

    /// 加载索引。文件缺失、截断、魔数或版本不符、内部结构不一致都是致命错误。
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(IndexError::Missing { path: path.to_path_buf() });
        }
        let f = File::open(path).map_err(|source| IndexError::Io { path: path.to_path_buf(), source })?;
        let mut r = BufReader::new(f);

        let mut header = [0u8; 12];
        r.read_exact(&mut header).map_err(|e| IndexError::Corrupt {
            path: path.to_path_buf(),
            reason: format!("header: {}", e),
        })?;
        if &header[..8] != INDEX_MAGIC {
            return Err(IndexError::BadMagic { path: path.to_path_buf() });
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&header[8..12]);
        let found = u32::from_le_bytes(version);
        if found != FORMAT_VERSION {
            return Err(IndexError::Version { path: path.to_path_buf(), found, expected: FORMAT_VERSION });
        }

        let idx: Self = bincode::deserialize_from(r).map_err(|e| IndexError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        idx.check_consistency()
            .map_err(|reason| IndexError::Corrupt { path: path.to_path_buf(), reason })?;
        Ok(idx)
    }

    fn check_consistency(&self) -> std::result::Result<(), String> {
        let n = self.n as usize;
        let fwd = self.forward.len();
        if n != 2 * fwd + 1 {
            return Err(format!("text length {} does not match forward length {}", n, fwd));
        }
        if self.occ_interval == 0 || self.sample_interval == 0 {
            return Err("zero sampling interval".into());
        }
        if self.bwt.len() != n || self.sampled_rows.len() != n {
            return Err("BWT / sampled-row length mismatch".into());
        }
        if self.occ.len() != (n / self.occ_interval as usize + 1) * SIGMA {
            return Err("occ checkpoint table has wrong size".into());
        }
        if self.samples.len() != self.sampled_rows.count_ones() {
            return Err("sample count does not match sampled rows".into());
        }
        if self.c[SIGMA] != self.n || self.primary >= self.n {
            return Err("C table or primary row out of range".into());
        }
        if ![&self.bwt, &self.occ, &self.samples, &self.forward].iter().all(|p| p.is_consistent())
            || !self.sampled_rows.is_consistent()
        {
            return Err("packed array storage mismatch".into());
        }
        if self.c.windows(2).any(|w| w[0] > w[1]) {
            return Err("C table is not monotone".into());
        }
        // 越界符号会让 LF 越过 C 表；哨兵行未采样会让 locate 越过文本起点
        if self.bwt.iter().any(|a| a as usize >= SIGMA) || self.forward.iter().any(|a| a as usize >= SIGMA) {
            return Err("symbol outside the alphabet".into());
        }
        if self.bwt.get(self.primary as usize) != u64::from(SENTINEL)
            || !self.sampled_rows.get(self.primary as usize)
        {
            return Err("sentinel row is not marked or not sampled".into());
        }
        if self.segments.len() != self.contigs.len() * 2
            || self.segments.iter().map(|s| s.len).sum::<u64>() != 2 * fwd as u64
            || self.segments.iter().any(|s| s.contig >= self.contigs.len())
        {
            return Err("chromosome boundary table does not cover the text".into());
        }
        Ok(())
    }
}

/// 由正链 contig 表生成完整的片段边界表（正链段 + 反链段），按起点排序
fn build_segments(contigs: &[Contig], fwd_len: u64) -> Vec<Segment> {
    let mut segments: Vec<Segment> = Vec::with_capacity(contigs.len() * 2);
    for (ci, c) in contigs.iter().enumerate() {
        segments.push(Segment { contig: ci, start: c.offset, len: c.len, strand: Strand::Forward });
        segments.push(Segment {
            contig: ci,
            start: 2 * fwd_len - c.offset - c.len,
            len: c.len,
            strand: Strand::Reverse,
        });
    }
    segments.sort_by_key(|s| s.start);
    segments
}
