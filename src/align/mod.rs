//! 比对核心：种子 → 分类 → 位并行验证 → 过滤，以及按批并行驱动。

pub mod bitctx;
pub mod classify;
pub mod extend;
pub mod filter;
pub mod mapper;
pub mod seed;
pub mod stats;

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use anyhow::{bail, Context, Result};
use log::info;
use rayon::prelude::*;

pub use bitctx::BitContext;
pub use classify::{Classification, Classifier, ReadPlan, SeedStats, UnmappedReason};
pub use extend::{Candidate, EditOp, Extender, Match, Scoring};
pub use filter::{Filter, MatchSet, MAX_MAPQ};
pub use mapper::{LocatedMatch, Mapper, Outcome, Read, ReadOutcome, ReadState};
pub use seed::{HitClass, Seed, SeedStrategy, Seeder};
pub use stats::{MapStats, StatsSnapshot};

use crate::index::GenomeIndex;
use crate::io::fastq::FastqReader;
use crate::io::sam::SamWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SeedMode {
    Fixed,
    Adaptive,
}

/// 比对参数
#[derive(Debug, Clone, PartialEq)]
pub struct MapOpt {
    pub seed_length: usize,
    pub seed_step: usize,
    pub seed_mode: SeedMode,
    pub max_edit_distance: u32,
    pub max_error_rate: f64,
    /// 命中数超过该值的种子视为重复，不定位、不用于延伸
    pub repetitive_seed_cutoff: u64,
    pub max_reported_alignments: usize,
    pub worker_count: usize,
    pub batch_size: usize,
    pub scoring: Scoring,
}

impl Default for MapOpt {
    fn default() -> Self {
        Self {
            seed_length: 16,
            seed_step: 16,
            seed_mode: SeedMode::Fixed,
            max_edit_distance: 4,
            max_error_rate: 0.08,
            repetitive_seed_cutoff: 64,
            max_reported_alignments: 5,
            worker_count: 1,
            batch_size: 4096,
            scoring: Scoring::default(),
        }
    }
}

impl MapOpt {
    pub fn validate(&self) -> Result<()> {
        if self.seed_length == 0 {
            bail!("seed length must be positive");
        }
        if self.seed_step == 0 {
            bail!("seed step must be positive");
        }
        if !(0.0..1.0).contains(&self.max_error_rate) {
            bail!("max error rate must be in [0, 1), got {}", self.max_error_rate);
        }
        if self.repetitive_seed_cutoff == 0 {
            bail!("repetitive seed cutoff must be positive");
        }
        if self.max_reported_alignments == 0 {
            bail!("max reported alignments must be positive");
        }
        if self.worker_count == 0 {
            bail!("worker count must be positive");
        }
        if self.batch_size == 0 {
            bail!("batch size must be positive");
        }
        Ok(())
    }

    pub fn seed_strategy(&self) -> SeedStrategy {
        match self.seed_mode {
            SeedMode::Fixed => SeedStrategy::Fixed { length: self.seed_length, step: self.seed_step },
            SeedMode::Adaptive => SeedStrategy::Adaptive { min_length: self.seed_length },
        }
    }
}

/// 按批读取 read，在线程池中并行比对，再按输入顺序写出。
///
/// 每个工作线程在整个运行期间独占一个 `BitContext`（按线程下标取用）。
/// 读写失败是致命错误：设置 `cancel` 并立即返回，当前批次不再写出。
pub fn map_reads<R: BufRead, W: Write>(
    index: &GenomeIndex,
    reader: &mut FastqReader<R>,
    writer: &mut SamWriter<'_, W>,
    opt: &MapOpt,
    stats: &MapStats,
    cancel: &AtomicBool,
) -> Result<()> {
    opt.validate()?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opt.worker_count)
        .build()
        .context("cannot start worker pool")?;
    let contexts: Vec<Mutex<BitContext>> = (0..opt.worker_count).map(|_| Mutex::new(BitContext::new())).collect();
    let mapper = Mapper::new(index, opt, stats);

    let mut n_batches = 0usize;
    loop {
        if cancel.load(Ordering::Relaxed) {
            bail!("mapping cancelled");
        }
        let batch = match reader.next_batch(opt.batch_size) {
            Ok(b) => b,
            Err(e) => {
                cancel.store(true, Ordering::Relaxed);
                return Err(e.context("cannot read FASTQ batch"));
            }
        };
        if batch.is_empty() {
            break;
        }
        n_batches += 1;

        let results: Vec<Option<ReadOutcome>> = pool.install(|| {
            batch
                .into_par_iter()
                .map(|rec| {
                    if cancel.load(Ordering::Relaxed) {
                        return None;
                    }
                    let slot = rayon::current_thread_index().unwrap_or(0) % contexts.len();
                    let mut ctx = contexts[slot].lock().unwrap_or_else(PoisonError::into_inner);
                    Some(mapper.map_read(Read::from(rec), &mut ctx))
                })
                .collect()
        });
        let Some(outcomes) = results.into_iter().collect::<Option<Vec<ReadOutcome>>>() else {
            bail!("mapping cancelled");
        };

        if let Err(e) = writer.write_batch(&outcomes) {
            cancel.store(true, Ordering::Relaxed);
            return Err(e.context("cannot write SAM records"));
        }
        info!("batch {}: {} reads", n_batches, outcomes.len());
    }
    writer.flush()?;
    Ok(())
}

/// 载入索引、打开 FASTQ、写出 SAM（未指定输出路径时写到 stdout），返回统计
pub fn map_fastq(index_path: &str, reads_path: &str, out_path: Option<&str>, opt: &MapOpt) -> Result<StatsSnapshot> {
    opt.validate()?;
    let index = GenomeIndex::load_from_file(index_path).with_context(|| format!("cannot load index '{}'", index_path))?;
    info!(
        "index loaded: {} chromosome(s), {} bp, {} bytes",
        index.contigs().len(),
        index.forward_len(),
        index.heap_bytes()
    );

    let fq = File::open(reads_path).with_context(|| format!("cannot open reads FASTQ '{}'", reads_path))?;
    let mut reader = FastqReader::new(BufReader::new(fq));

    let out: Box<dyn Write> = if let Some(p) = out_path {
        Box::new(BufWriter::new(File::create(p).with_context(|| format!("cannot create '{}'", p))?))
    } else {
        Box::new(BufWriter::new(std::io::stdout()))
    };
    let mut writer = SamWriter::new(out, index.contigs());
    let cmdline = std::env::args().collect::<Vec<_>>().join(" ");
    writer.write_header(&cmdline)?;

    let stats = MapStats::new();
    let cancel = AtomicBool::new(false);
    map_reads(&index, &mut reader, &mut writer, opt, &stats, &cancel)?;

    let snap = stats.snapshot();
    info!("mapping finished: {} of {} reads mapped", snap.mapped, snap.reads);
    Ok(snap)
}
