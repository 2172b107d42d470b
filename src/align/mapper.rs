//! 单条 read 的比对流程：种子 → 分类 → 验证 → 过滤 → 坐标定位。

use std::collections::HashSet;

use log::{debug, warn};

use super::bitctx::BitContext;
use super::classify::{Classification, Classifier, ReadPlan, UnmappedReason};
use super::extend::{Candidate, EditOp, Extender, Match};
use super::filter::Filter;
use super::seed::{Seed, Seeder};
use super::stats::MapStats;
use super::MapOpt;
use crate::index::{GenomeIndex, Locator, Strand};
use crate::io::fastq::FastqRecord;
use crate::util::dna;

/// 待比对的 read；质量值原样透传
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Read {
    pub id: String,
    pub seq: Vec<u8>,
    pub qual: Option<Vec<u8>>,
}

impl Read {
    pub fn new(id: impl Into<String>, seq: impl Into<Vec<u8>>) -> Self {
        Self { id: id.into(), seq: seq.into(), qual: None }
    }
}

impl From<FastqRecord> for Read {
    fn from(rec: FastqRecord) -> Self {
        Self { id: rec.id, seq: rec.seq, qual: Some(rec.qual) }
    }
}

/// read 的处理阶段，只能向后推进。`Emitted` 与 `Unmapped` 为终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReadState {
    Received,
    Seeded,
    Classified,
    Extending,
    Filtered,
    Located,
    Emitted,
    Unmapped,
}

impl ReadState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ReadState::Emitted | ReadState::Unmapped)
    }

    pub fn advance(&mut self, next: ReadState) {
        debug_assert!(
            !self.is_terminal() && next > *self,
            "illegal read state transition {:?} -> {:?}",
            self,
            next
        );
        *self = next;
    }
}

/// 已转换到染色体正链坐标的比对
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedMatch {
    pub contig: usize,
    /// 0-based，正链坐标
    pub pos: u64,
    pub span: u64,
    pub strand: Strand,
    pub edit_distance: u32,
    pub score: i32,
    pub ops: Vec<(EditOp, u32)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Mapped { matches: Vec<LocatedMatch>, mapq: u8 },
    Unmapped(UnmappedReason),
}

/// 每条输入 read 恰好产生一个结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutcome {
    pub read: Read,
    pub state: ReadState,
    pub outcome: Outcome,
}

impl ReadOutcome {
    pub fn is_mapped(&self) -> bool {
        matches!(self.outcome, Outcome::Mapped { .. })
    }

    pub fn matches(&self) -> &[LocatedMatch] {
        match &self.outcome {
            Outcome::Mapped { matches, .. } => matches,
            Outcome::Unmapped(_) => &[],
        }
    }
}

/// 组合各阶段组件，无内部可变状态，可在线程间共享
pub struct Mapper<'a> {
    seeder: Seeder<'a>,
    classifier: Classifier,
    extender: Extender<'a>,
    filter: Filter,
    locator: Locator<'a>,
    forward_len: u64,
    stats: &'a MapStats,
}

impl<'a> Mapper<'a> {
    pub fn new(index: &'a GenomeIndex, opt: &MapOpt, stats: &'a MapStats) -> Self {
        Self {
            seeder: Seeder::new(index, opt.seed_strategy(), opt.repetitive_seed_cutoff),
            classifier: Classifier::new(opt.max_edit_distance, opt.max_error_rate),
            extender: Extender::new(index, opt.scoring),
            filter: Filter::new(opt.max_reported_alignments),
            locator: Locator::new(index),
            forward_len: index.forward_len(),
            stats,
        }
    }

    pub fn map_read(&self, read: Read, ctx: &mut BitContext) -> ReadOutcome {
        self.stats.record_read();
        let mut state = ReadState::Received;
        match self.run(&read, ctx, &mut state) {
            Ok((matches, mapq)) => {
                state.advance(ReadState::Emitted);
                self.stats.record_mapped(matches.len());
                debug!("{}: {} alignment(s), mapq {}", read.id, matches.len(), mapq);
                ReadOutcome { read, state, outcome: Outcome::Mapped { matches, mapq } }
            }
            Err(reason) => {
                state.advance(ReadState::Unmapped);
                self.stats.record_unmapped(reason);
                debug!("{}: unmapped ({})", read.id, reason);
                ReadOutcome { read, state, outcome: Outcome::Unmapped(reason) }
            }
        }
    }

    fn run(
        &self,
        read: &Read,
        ctx: &mut BitContext,
        state: &mut ReadState,
    ) -> Result<(Vec<LocatedMatch>, u8), UnmappedReason> {
        let forward = dna::encode(&read.seq);
        if forward.is_empty() {
            return Err(UnmappedReason::EmptyRead);
        }
        let reverse = dna::revcomp_codes(&forward);

        let mut seeds: Vec<Seed> = self.seeder.seeds(&forward, Strand::Forward).collect();
        seeds.extend(self.seeder.seeds(&reverse, Strand::Reverse));
        state.advance(ReadState::Seeded);

        let plan = match self.classifier.classify(forward.len(), &seeds) {
            Classification::Extend(plan) => plan,
            Classification::Unmapped { reason, stats } => {
                self.stats.record_seeds(stats.total(), stats.absent, stats.repetitive);
                return Err(reason);
            }
        };
        self.stats.record_seeds(plan.stats.total(), plan.stats.absent, plan.stats.repetitive);
        state.advance(ReadState::Classified);

        let candidates = self.candidates(&seeds, &plan, forward.len());
        self.stats.record_candidates(candidates.len());
        if candidates.is_empty() {
            return Err(UnmappedReason::NoCandidates);
        }
        state.advance(ReadState::Extending);

        ctx.load_read(&forward, &reverse);
        let mut verified: Vec<Match> = Vec::new();
        for cand in &candidates {
            let hit = self.extender.verify(ctx, cand, plan.max_edits);
            self.stats.record_verified(hit.is_some());
            verified.extend(hit);
        }

        let set = self.filter.apply(verified, forward.len()).ok_or(UnmappedReason::NoAlignment)?;
        state.advance(ReadState::Filtered);

        let located: Vec<LocatedMatch> = set.matches.iter().filter_map(|m| self.locate(&read.id, m)).collect();
        if located.is_empty() {
            return Err(UnmappedReason::NoAlignment);
        }
        state.advance(ReadState::Located);
        Ok((located, set.mapq))
    }

    /// 可信种子的命中 → 去重后的候选。落在反链片段上的命中换算为另一方向 read
    /// 在正链片段上的镜像命中，所有验证都在正链半区进行。
    fn candidates(&self, seeds: &[Seed], plan: &ReadPlan, read_len: usize) -> Vec<Candidate> {
        let fwd = self.forward_len;
        let m = read_len as i64;
        let mut seen: HashSet<(Strand, usize, i64)> = HashSet::new();
        let mut out: Vec<Candidate> = Vec::new();
        for &si in &plan.trusted {
            let seed = &seeds[si];
            let seed_len = (seed.end - seed.start) as u64;
            for &raw in &seed.hits {
                let Some(loc) = self.locator.resolve(raw) else {
                    warn!("seed hit at raw position {} is outside every chromosome", raw);
                    self.stats.record_locator_anomaly();
                    continue;
                };
                let (strand, diag, loc) = if loc.strand.is_reverse() {
                    // 反链 [p, p+L) 是正链 [2F-p-L, 2F-p) 的反向互补，对应另一方向 read 的 [m-e, m-s)
                    let Some((q, mirror)) = (2 * fwd)
                        .checked_sub(raw + seed_len)
                        .and_then(|q| self.locator.resolve(q).map(|l| (q, l)))
                    else {
                        warn!("reverse seed hit at raw position {} has no forward mirror", raw);
                        self.stats.record_locator_anomaly();
                        continue;
                    };
                    (seed.strand.flip(), q as i64 - (m - seed.end as i64), mirror)
                } else {
                    (seed.strand, raw as i64 - seed.start as i64, loc)
                };
                if seen.insert((strand, loc.segment, diag)) {
                    out.push(Candidate { diag, segment: loc.segment, strand, seed: si });
                }
            }
        }
        out
    }

    fn locate(&self, read_id: &str, m: &Match) -> Option<LocatedMatch> {
        let located = self
            .locator
            .resolve(m.ref_start)
            .filter(|loc| loc.segment == m.segment)
            .and_then(|loc| self.locator.to_forward(&loc, m.span()).map(|pos| (loc.contig, pos)));
        let Some((contig, pos)) = located else {
            warn!("{}: alignment at raw [{}, {}) does not fit its chromosome", read_id, m.ref_start, m.ref_end);
            self.stats.record_locator_anomaly();
            return None;
        };
        Some(LocatedMatch {
            contig,
            pos,
            span: m.span(),
            strand: m.strand,
            edit_distance: m.edit_distance,
            score: m.score,
            ops: m.ops.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::build::{build_index, ReferenceSeq};

    fn random_seq(len: usize, seed: u64) -> Vec<u8> {
        let mut x = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
        (0..len)
            .map(|_| {
                x = x.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
                b"ACGT"[(x >> 62) as usize]
            })
            .collect()
    }

    fn opt() -> MapOpt {
        MapOpt { seed_length: 12, seed_step: 12, repetitive_seed_cutoff: 8, ..MapOpt::default() }
    }

    #[test]
    fn state_only_moves_forward() {
        let mut s = ReadState::Received;
        s.advance(ReadState::Seeded);
        s.advance(ReadState::Extending);
        s.advance(ReadState::Unmapped);
        assert!(s.is_terminal());
        assert!(ReadState::Located < ReadState::Emitted);
    }

    #[test]
    #[should_panic(expected = "illegal read state transition")]
    #[cfg(debug_assertions)]
    fn backward_transition_panics() {
        let mut s = ReadState::Filtered;
        s.advance(ReadState::Seeded);
    }

    #[test]
    fn maps_both_orientations_to_forward_coordinates() {
        let chr1 = random_seq(600, 1);
        let chr2 = random_seq(400, 2);
        let idx = build_index(
            &[ReferenceSeq { name: "chr1".into(), seq: chr1.clone() }, ReferenceSeq { name: "chr2".into(), seq: chr2.clone() }],
            16,
            4,
        )
        .unwrap();
        let stats = MapStats::new();
        let mapper = Mapper::new(&idx, &opt(), &stats);
        let mut ctx = BitContext::new();

        let fwd = mapper.map_read(Read::new("f", chr2[100..160].to_vec()), &mut ctx);
        assert_eq!(fwd.state, ReadState::Emitted);
        let m = &fwd.matches()[0];
        assert_eq!((m.contig, m.pos, m.strand, m.edit_distance), (1, 100, Strand::Forward, 0));

        let rc = dna::revcomp(&chr1[250..310]);
        let rev = mapper.map_read(Read::new("r", rc), &mut ctx);
        let m = &rev.matches()[0];
        assert_eq!((m.contig, m.pos, m.strand, m.edit_distance), (0, 250, Strand::Reverse, 0));
        assert_eq!(m.span, 60);
        assert_eq!(stats.snapshot().mapped, 2);
    }

    #[test]
    fn candidates_are_deduplicated_per_diagonal() {
        let chr = random_seq(800, 9);
        let idx = build_index(&[ReferenceSeq { name: "chr".into(), seq: chr.clone() }], 16, 4).unwrap();
        let stats = MapStats::new();
        let o = MapOpt { seed_length: 12, seed_step: 4, ..opt() };
        let mapper = Mapper::new(&idx, &o, &stats);
        let mut ctx = BitContext::new();
        let out = mapper.map_read(Read::new("r", chr[300..360].to_vec()), &mut ctx);
        assert!(out.is_mapped());
        // 所有重叠种子指向同一对角线：只验证一次
        assert_eq!(stats.snapshot().candidates, 1);
        assert_eq!(stats.snapshot().verified, 1);
    }

    #[test]
    fn empty_and_unanchored_reads_are_unmapped() {
        let chr = random_seq(300, 4);
        let idx = build_index(&[ReferenceSeq { name: "chr".into(), seq: chr }], 16, 4).unwrap();
        let stats = MapStats::new();
        let mapper = Mapper::new(&idx, &opt(), &stats);
        let mut ctx = BitContext::new();

        let out = mapper.map_read(Read::new("e", Vec::new()), &mut ctx);
        assert_eq!(out.outcome, Outcome::Unmapped(UnmappedReason::EmptyRead));
        assert_eq!(out.state, ReadState::Unmapped);

        let out = mapper.map_read(Read::new("n", vec![b'N'; 40]), &mut ctx);
        assert_eq!(out.outcome, Outcome::Unmapped(UnmappedReason::AllAbsent));
        assert_eq!(stats.snapshot().verified, 0);
    }
}
