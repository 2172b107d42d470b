use std::path::Path;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use bpmap::align::{self, MapOpt, Scoring, SeedMode};
use bpmap::index::build::{self, DEFAULT_OCC_INTERVAL, DEFAULT_SAMPLE_INTERVAL};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "bpmap", author, version, about = "Short-read mapper with exact bounded edit distance verification", arg_required_else_help = true)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the FM index of a reference FASTA
    Index {
        /// Reference FASTA file
        reference: String,
        /// Output prefix; the index is written to <prefix>.bpi
        #[arg(short, long, default_value = "ref")]
        output: String,
        /// Occ checkpoint interval
        #[arg(long = "occ-interval", default_value_t = DEFAULT_OCC_INTERVAL)]
        occ_interval: u32,
        /// Suffix array sampling interval (text positions)
        #[arg(long = "sa-interval", default_value_t = DEFAULT_SAMPLE_INTERVAL)]
        sample_interval: u32,
    },
    /// Map reads (FASTQ) against an index and write SAM
    Map {
        /// Path to the index (.bpi)
        #[arg(short = 'i', long = "index")]
        index: String,
        /// Reads FASTQ file
        reads: String,
        /// Output SAM path (stdout if omitted)
        #[arg(short, long)]
        out: Option<String>,
        #[arg(long = "seed-length", default_value_t = 16)]
        seed_length: usize,
        #[arg(long = "seed-step", default_value_t = 16)]
        seed_step: usize,
        #[arg(long = "seed-mode", value_enum, default_value_t = SeedMode::Fixed)]
        seed_mode: SeedMode,
        #[arg(short = 'k', long = "max-edits", default_value_t = 4)]
        max_edit_distance: u32,
        #[arg(long = "max-error-rate", default_value_t = 0.08)]
        max_error_rate: f64,
        #[arg(long = "repeat-cutoff", default_value_t = 64)]
        repetitive_seed_cutoff: u64,
        #[arg(short = 'N', long = "max-reported", default_value_t = 5)]
        max_reported_alignments: usize,
        #[arg(short = 't', long = "threads", default_value_t = 1)]
        threads: usize,
        #[arg(long = "batch-size", default_value_t = 4096)]
        batch_size: usize,
        #[arg(long = "match", default_value_t = 1)]
        match_score: i32,
        #[arg(long = "mismatch", default_value_t = 4)]
        mismatch_penalty: i32,
        #[arg(long = "gap", default_value_t = 6)]
        gap_penalty: i32,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::from_default_env().filter_level(level).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.command {
        Commands::Index { reference, output, occ_interval, sample_interval } => {
            run_index(&reference, &output, occ_interval, sample_interval)
        }
        Commands::Map {
            index,
            reads,
            out,
            seed_length,
            seed_step,
            seed_mode,
            max_edit_distance,
            max_error_rate,
            repetitive_seed_cutoff,
            max_reported_alignments,
            threads,
            batch_size,
            match_score,
            mismatch_penalty,
            gap_penalty,
        } => {
            let opt = MapOpt {
                seed_length,
                seed_step,
                seed_mode,
                max_edit_distance,
                max_error_rate,
                repetitive_seed_cutoff,
                max_reported_alignments,
                worker_count: threads,
                batch_size,
                scoring: Scoring { match_score, mismatch_penalty, gap_penalty },
            };
            run_map(&index, &reads, out.as_deref(), &opt)
        }
    }
}

fn run_index(reference: &str, output: &str, occ_interval: u32, sample_interval: u32) -> Result<()> {
    let idx = build::build_from_fasta(Path::new(reference), occ_interval, sample_interval)?;
    let out_path = format!("{}.bpi", output);
    idx.save_to_file(&out_path)
        .with_context(|| format!("cannot write index to '{}'", out_path))?;
    info!("index saved: {} ({} bytes in memory)", out_path, idx.heap_bytes());
    Ok(())
}

fn run_map(index_path: &str, reads_path: &str, out_path: Option<&str>, opt: &MapOpt) -> Result<()> {
    opt.validate().context("invalid mapping options")?;
    let snap = align::map_fastq(index_path, reads_path, out_path, opt)?;
    eprintln!("{}", snap);
    Ok(())
}
