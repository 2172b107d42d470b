//! # bpmap
//!
//! 基于 FM 索引与位并行有界编辑距离验证的短序列比对器。
//!
//! - **索引**：正链 + 反向互补拼接文本上的压缩 FM 索引（3 位 BWT、Occ 采样、按文本位置采样的 SA）
//! - **种子**：定长平铺或自适应延长，按命中数分为唯一 / 中等 / 重复 / 缺失
//! - **分类**：由 read 长度与错误率上限决定编辑距离界 k，挑选可信种子
//! - **验证**：Myers / Hyyrö 分块位并行 DP，k 内精确，带可靠剪枝与回溯
//! - **过滤**：排序、聚簇去重、MAPQ
//!
//! ## 快速示例
//!
//! ```rust,no_run
//! use bpmap::align::{BitContext, MapOpt, MapStats, Mapper, Read};
//! use bpmap::index::build::{build_index, ReferenceSeq};
//!
//! let reference = ReferenceSeq { name: "ref".to_string(), seq: b"ACGTACGTAGCTGATCGTAGGATTACAGATTACCA".to_vec() };
//! let index = build_index(&[reference], 64, 16).unwrap();
//!
//! let opt = MapOpt { seed_length: 8, seed_step: 8, ..MapOpt::default() };
//! let stats = MapStats::new();
//! let mapper = Mapper::new(&index, &opt, &stats);
//! let mut ctx = BitContext::new();
//! let outcome = mapper.map_read(Read::new("r1", b"GCTGATCGTAGGATTA".to_vec()), &mut ctx);
//! for m in outcome.matches() {
//!     println!("{} pos={} nm={}", index.contigs()[m.contig].name, m.pos, m.edit_distance);
//! }
//! ```
//!
//! ## 模块说明
//!
//! - [`io`]：FASTA / FASTQ 解析，SAM 输出
//! - [`index`]：后缀数组、离线构建、FM 索引查询、坐标定位
//! - [`align`]：种子、分类、位并行验证、过滤、并行驱动
//! - [`util`]：DNA 编码 / 反向互补，定宽打包数组
//! - [`error`]：索引加载错误

pub mod io;
pub mod index;
pub mod util;
pub mod align;
pub mod error;
