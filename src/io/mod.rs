//! FASTA / FASTQ 解析与 SAM 输出。

pub mod fasta;
pub mod fastq;
pub mod sam;
