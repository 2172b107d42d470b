//! 离线索引构建：FASTA → 正链 + 反向互补文本 → SA → 压缩 FM 索引。
//!
//! 这是查询侧之外的协作者，只负责产出不可变的索引文件。

use std::path::Path;

use anyhow::{bail, Context, Result};
use log::{info, warn};

use super::fm::{Contig, GenomeIndex, IndexMeta};
use super::sa;
use crate::io::fasta::FastaReader;
use crate::util::dna;

/// Occ 采样间隔默认值
pub const DEFAULT_OCC_INTERVAL: u32 = 64;
/// SA 采样间隔默认值
pub const DEFAULT_SAMPLE_INTERVAL: u32 = 16;

/// 一条参考序列（ASCII）
#[derive(Debug, Clone)]
pub struct ReferenceSeq {
    pub name: String,
    pub seq: Vec<u8>,
}

/// 拼接文本：`F · revcomp(F) · $`，并返回正链 contig 表
pub fn concat_text(refs: &[ReferenceSeq]) -> (Vec<u8>, Vec<Contig>) {
    let mut forward: Vec<u8> = Vec::new();
    let mut contigs: Vec<Contig> = Vec::with_capacity(refs.len());
    for r in refs {
        if r.seq.is_empty() {
            warn!("skipping empty reference sequence '{}'", r.name);
            continue;
        }
        let offset = forward.len() as u64;
        forward.extend(r.seq.iter().map(|&b| dna::to_alphabet(b)));
        contigs.push(Contig { name: r.name.clone(), len: r.seq.len() as u64, offset });
    }
    let mut text = Vec::with_capacity(forward.len() * 2 + 1);
    text.extend_from_slice(&forward);
    text.extend(dna::revcomp_codes(&forward));
    text.push(dna::SENTINEL);
    (text, contigs)
}

pub fn build_index(refs: &[ReferenceSeq], occ_interval: u32, sample_interval: u32) -> Result<GenomeIndex> {
    if occ_interval == 0 || sample_interval == 0 {
        bail!("sampling intervals must be positive");
    }
    let (text, contigs) = concat_text(refs);
    if contigs.is_empty() {
        bail!("reference contains no non-empty sequences");
    }
    let sa_arr = sa::build_sa(&text);
    Ok(GenomeIndex::from_sa(&text, &sa_arr, contigs, occ_interval, sample_interval))
}

/// 读取 FASTA 并构建索引，附带构建元信息
pub fn build_from_fasta(reference: &Path, occ_interval: u32, sample_interval: u32) -> Result<GenomeIndex> {
    let fh = std::fs::File::open(reference)
        .with_context(|| format!("cannot open reference FASTA '{}'", reference.display()))?;
    let mut reader = FastaReader::new(std::io::BufReader::new(fh));

    let mut refs: Vec<ReferenceSeq> = Vec::new();
    while let Some(rec) = reader.next_record()? {
        refs.push(ReferenceSeq { name: rec.id, seq: rec.seq });
    }
    if refs.is_empty() {
        bail!("FASTA file '{}' contains no sequences", reference.display());
    }
    let total_len: usize = refs.iter().map(|r| r.seq.len()).sum();
    info!("reference: {}", reference.display());
    info!("sequences: {}, total_len: {}", refs.len(), total_len);

    let mut idx = build_index(&refs, occ_interval, sample_interval)
        .with_context(|| format!("cannot index '{}'", reference.display()))?;
    idx.set_meta(IndexMeta {
        reference_file: Some(reference.display().to_string()),
        build_args: Some(std::env::args().collect::<Vec<_>>().join(" ")),
        build_timestamp: Some(chrono::Utc::now().to_rfc3339()),
    });
    info!("index built: text_len={}, {} bytes of tables", idx.text_len(), idx.heap_bytes());
    Ok(idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_layout() {
        let refs = vec![
            ReferenceSeq { name: "a".into(), seq: b"AAC".to_vec() },
            ReferenceSeq { name: "empty".into(), seq: Vec::new() },
            ReferenceSeq { name: "b".into(), seq: b"GT".to_vec() },
        ];
        let (text, contigs) = concat_text(&refs);
        // AACGT · ACGTT · $
        assert_eq!(text, vec![1, 1, 2, 3, 4, 1, 2, 3, 4, 4, 0]);
        assert_eq!(contigs.len(), 2);
        assert_eq!(contigs[1], Contig { name: "b".into(), len: 2, offset: 3 });
    }

    #[test]
    fn build_rejects_empty_reference() {
        let refs = vec![ReferenceSeq { name: "e".into(), seq: Vec::new() }];
        assert!(build_index(&refs, 64, 16).is_err());
        assert!(build_index(&[], 64, 16).is_err());
    }

    #[test]
    fn build_from_fasta_file() {
        let dir = tempfile::tempdir().unwrap();
        let fa = dir.path().join("ref.fa");
        std::fs::write(&fa, b">chr1 test\nACGTACGTTTGACCA\n>chr2\nGGGCCCAAT\n").unwrap();
        let idx = build_from_fasta(&fa, 8, 4).unwrap();
        assert_eq!(idx.contigs().len(), 2);
        assert_eq!(idx.forward_len(), 24);
        assert!(idx.meta().build_timestamp.is_some());
        assert!(!idx.search(&dna::encode(b"TTGACC")).is_empty());
    }
}
