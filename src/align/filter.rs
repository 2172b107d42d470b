use super::extend::Match;

pub const MAX_MAPQ: u8 = 60;

/// 一条 read 的最终比对集合，下标 0 为主比对
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSet {
    pub matches: Vec<Match>,
    pub mapq: u8,
}

impl MatchSet {
    pub fn primary(&self) -> Option<&Match> {
        self.matches.first()
    }
}

/// 由最优与次优簇的得分计算 MAPQ
pub fn mapq_from_scores(best: i32, second: Option<i32>) -> u8 {
    let Some(second) = second else {
        return MAX_MAPQ;
    };
    if best <= 0 {
        return 0;
    }
    let diff = f64::from(best - second);
    let q = (f64::from(MAX_MAPQ) * diff / f64::from(best)).round();
    q.clamp(0.0, f64::from(MAX_MAPQ)) as u8
}

#[derive(Debug, Clone, Copy)]
pub struct Filter {
    max_reported: usize,
}

impl Filter {
    pub fn new(max_reported: usize) -> Self {
        Self { max_reported: max_reported.max(1) }
    }

    /// 排序、按片段/方向/起点聚簇去重、计算 MAPQ、截断。没有任何比对时返回 None。
    pub fn apply(&self, mut matches: Vec<Match>, read_len: usize) -> Option<MatchSet> {
        if matches.is_empty() {
            return None;
        }
        matches.sort_by(|a, b| {
            a.edit_distance
                .cmp(&b.edit_distance)
                .then(b.score.cmp(&a.score))
                .then(a.segment.cmp(&b.segment))
                .then(a.strand.cmp(&b.strand))
                .then(a.ref_start.cmp(&b.ref_start))
        });

        // 起点相差小于 read 长度的同片段同方向比对视为同一簇，只保留最优者
        let radius = read_len.max(1) as u64;
        let mut kept: Vec<Match> = Vec::with_capacity(matches.len());
        for m in matches {
            let dup = kept.iter().any(|k| {
                k.segment == m.segment && k.strand == m.strand && k.ref_start.abs_diff(m.ref_start) < radius
            });
            if !dup {
                kept.push(m);
            }
        }

        let mapq = mapq_from_scores(kept[0].score, kept.get(1).map(|m| m.score));
        kept.truncate(self.max_reported);
        Some(MatchSet { matches: kept, mapq })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::extend::EditOp;
    use crate::index::Strand;

    fn mk(segment: usize, strand: Strand, start: u64, nm: u32, score: i32) -> Match {
        Match {
            segment,
            strand,
            ref_start: start,
            ref_end: start + 20,
            edit_distance: nm,
            score,
            ops: vec![(EditOp::Match, 20)],
        }
    }

    #[test]
    fn mapq_formula() {
        assert_eq!(mapq_from_scores(20, None), 60);
        assert_eq!(mapq_from_scores(20, Some(20)), 0);
        assert_eq!(mapq_from_scores(20, Some(10)), 30);
        assert_eq!(mapq_from_scores(20, Some(15)), 15);
        assert_eq!(mapq_from_scores(0, Some(-5)), 0);
        assert_eq!(mapq_from_scores(10, Some(12)), 0);
    }

    #[test]
    fn sorts_by_distance_then_score() {
        let f = Filter::new(5);
        let set = f
            .apply(
                vec![
                    mk(0, Strand::Forward, 500, 1, 15),
                    mk(0, Strand::Forward, 100, 0, 20),
                    mk(1, Strand::Reverse, 40, 1, 17),
                ],
                20,
            )
            .unwrap();
        let order: Vec<u64> = set.matches.iter().map(|m| m.ref_start).collect();
        assert_eq!(order, vec![100, 40, 500]);
        assert_eq!(set.primary().unwrap().edit_distance, 0);
        assert_eq!(set.mapq, 9);
    }

    #[test]
    fn collapses_nearby_duplicates() {
        let f = Filter::new(5);
        let set = f
            .apply(
                vec![
                    mk(0, Strand::Forward, 100, 1, 14),
                    mk(0, Strand::Forward, 101, 0, 20),
                    mk(0, Strand::Forward, 100, 0, 20),
                    mk(0, Strand::Reverse, 100, 0, 20),
                    mk(0, Strand::Forward, 120, 0, 20),
                ],
                20,
            )
            .unwrap();
        let keys: Vec<(Strand, u64)> = set.matches.iter().map(|m| (m.strand, m.ref_start)).collect();
        assert_eq!(keys, vec![(Strand::Forward, 100), (Strand::Forward, 120), (Strand::Reverse, 100)]);
        assert_eq!(set.mapq, 0);
    }

    #[test]
    fn single_cluster_gets_max_quality_and_truncation_applies() {
        let f = Filter::new(1);
        let set = f.apply(vec![mk(2, Strand::Forward, 7, 0, 20), mk(2, Strand::Forward, 9, 2, 8)], 20).unwrap();
        assert_eq!(set.matches.len(), 1);
        assert_eq!(set.mapq, MAX_MAPQ);

        let set = f.apply(vec![mk(0, Strand::Forward, 0, 0, 20), mk(1, Strand::Forward, 0, 1, 15)], 20).unwrap();
        assert_eq!(set.matches.len(), 1, "truncated to max_reported");
        assert_eq!(set.mapq, 15, "mapq is computed before truncation");
        assert!(f.apply(Vec::new(), 20).is_none());
    }
}
