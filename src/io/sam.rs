use anyhow::Result;
use std::io::Write;

use crate::align::extend::{ops_to_cigar, EditOp};
use crate::align::mapper::{Outcome, ReadOutcome};
use crate::index::{Contig, Strand};
use crate::util::dna;

const FLAG_REVERSE: u16 = 16;
const FLAG_UNMAPPED: u16 = 4;
const FLAG_SECONDARY: u16 = 256;

/// Minimal SAM writer: one primary record per mapped read, secondaries
/// with `*` SEQ/QUAL, and an explicit record for every unmapped read.
pub struct SamWriter<'a, W: Write> {
    out: W,
    contigs: &'a [Contig],
}

impl<'a, W: Write> SamWriter<'a, W> {
    pub fn new(out: W, contigs: &'a [Contig]) -> Self {
        Self { out, contigs }
    }

    pub fn write_header(&mut self, command_line: &str) -> Result<()> {
        writeln!(self.out, "@HD\tVN:1.6\tSO:unsorted")?;
        for c in self.contigs {
            writeln!(self.out, "@SQ\tSN:{}\tLN:{}", c.name, c.len)?;
        }
        writeln!(
            self.out,
            "@PG\tID:{0}\tPN:{0}\tVN:{1}\tCL:{2}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            command_line
        )?;
        Ok(())
    }

    pub fn write_outcome(&mut self, outcome: &ReadOutcome) -> Result<()> {
        self.write_batch(std::slice::from_ref(outcome))
    }

    /// Renders the whole batch, then hands it to the sink in one `write_all`.
    pub fn write_batch(&mut self, outcomes: &[ReadOutcome]) -> Result<()> {
        let mut buf: Vec<u8> = Vec::with_capacity(outcomes.len() * 256);
        for outcome in outcomes {
            render_outcome(&mut buf, self.contigs, outcome)?;
        }
        self.out.write_all(&buf)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

fn render_outcome<V: Write>(out: &mut V, contigs: &[Contig], outcome: &ReadOutcome) -> Result<()> {
    let read = &outcome.read;
    let qname = &read.id;
    let seq = field_or_star(&read.seq);
    let qual = read.qual.as_deref().map_or_else(|| "*".to_string(), field_or_star);

    match &outcome.outcome {
        Outcome::Unmapped(_) => {
            writeln!(out, "{}\t{}\t*\t0\t0\t*\t*\t0\t0\t{}\t{}", qname, FLAG_UNMAPPED, seq, qual)?;
        }
        Outcome::Mapped { matches, mapq } => {
            for (i, m) in matches.iter().enumerate() {
                let mut flag = 0u16;
                if m.strand == Strand::Reverse {
                    flag |= FLAG_REVERSE;
                }
                let (seq_field, qual_field, mapq) = if i == 0 {
                    if m.strand == Strand::Reverse {
                        let rc = field_or_star(&dna::revcomp(&read.seq));
                        let rq = read.qual.as_deref().map_or_else(
                            || "*".to_string(),
                            |q| field_or_star(&q.iter().rev().copied().collect::<Vec<u8>>()),
                        );
                        (rc, rq, *mapq)
                    } else {
                        (seq.clone(), qual.clone(), *mapq)
                    }
                } else {
                    flag |= FLAG_SECONDARY;
                    ("*".to_string(), "*".to_string(), 0)
                };
                let rname = contigs.get(m.contig).map_or("*", |c| c.name.as_str());
                writeln!(
                    out,
                    "{}\t{}\t{}\t{}\t{}\t{}\t*\t0\t0\t{}\t{}\tNM:i:{}\tAS:i:{}",
                    qname,
                    flag,
                    rname,
                    m.pos + 1,
                    mapq,
                    ops_to_cigar(&m.ops, EditOp::sam_code),
                    seq_field,
                    qual_field,
                    m.edit_distance,
                    m.score,
                )?;
            }
        }
    }
    Ok(())
}

fn field_or_star(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        "*".to_string()
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::classify::UnmappedReason;
    use crate::align::mapper::{LocatedMatch, Read, ReadState};

    fn contigs() -> Vec<Contig> {
        vec![Contig { name: "chr1".into(), len: 100, offset: 0 }, Contig { name: "chr2".into(), len: 50, offset: 100 }]
    }

    fn lm(contig: usize, pos: u64, strand: Strand) -> LocatedMatch {
        LocatedMatch {
            contig,
            pos,
            span: 4,
            strand,
            edit_distance: 1,
            score: -1,
            ops: vec![(EditOp::Match, 2), (EditOp::Mismatch, 1), (EditOp::Match, 1)],
        }
    }

    fn render(outcome: &ReadOutcome) -> String {
        let cs = contigs();
        let mut w = SamWriter::new(Vec::new(), &cs);
        w.write_outcome(outcome).unwrap();
        String::from_utf8(w.into_inner()).unwrap()
    }

    #[test]
    fn header_lists_every_chromosome() {
        let cs = contigs();
        let mut w = SamWriter::new(Vec::new(), &cs);
        w.write_header("bpmap map -i ref.idx reads.fq").unwrap();
        let text = String::from_utf8(w.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "@HD\tVN:1.6\tSO:unsorted");
        assert_eq!(lines[1], "@SQ\tSN:chr1\tLN:100");
        assert_eq!(lines[2], "@SQ\tSN:chr2\tLN:50");
        assert!(lines[3].starts_with("@PG\tID:bpmap"));
        assert!(lines[3].ends_with("CL:bpmap map -i ref.idx reads.fq"));
    }

    #[test]
    fn unmapped_record() {
        let out = ReadOutcome {
            read: Read { id: "r1".into(), seq: b"ACGT".to_vec(), qual: Some(b"IIII".to_vec()) },
            state: ReadState::Unmapped,
            outcome: Outcome::Unmapped(UnmappedReason::NoSeeds),
        };
        assert_eq!(render(&out), "r1\t4\t*\t0\t0\t*\t*\t0\t0\tACGT\tIIII\n");
    }

    #[test]
    fn reverse_primary_and_secondary_records() {
        let out = ReadOutcome {
            read: Read { id: "r2".into(), seq: b"AACG".to_vec(), qual: Some(b"ABCD".to_vec()) },
            state: ReadState::Emitted,
            outcome: Outcome::Mapped {
                matches: vec![lm(1, 9, Strand::Reverse), lm(0, 0, Strand::Forward)],
                mapq: 37,
            },
        };
        let text = render(&out);
        let lines: Vec<Vec<&str>> = text.lines().map(|l| l.split('\t').collect()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0][..11], ["r2", "16", "chr2", "10", "37", "4M", "*", "0", "0", "CGTT", "DCBA"]);
        assert_eq!(lines[0][11], "NM:i:1");
        assert_eq!(lines[1][..6], ["r2", "256", "chr1", "1", "0", "4M"]);
        assert_eq!((lines[1][9], lines[1][10]), ("*", "*"));
    }

    /// Accepts a single write only while it fits under `cap`.
    struct CappedSink {
        buf: Vec<u8>,
        cap: usize,
    }

    impl Write for CappedSink {
        fn write(&mut self, b: &[u8]) -> std::io::Result<usize> {
            if self.buf.len() + b.len() > self.cap {
                return Err(std::io::Error::new(std::io::ErrorKind::WriteZero, "sink full"));
            }
            self.buf.extend_from_slice(b);
            Ok(b.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_batch_leaves_sink_untouched() {
        let cs = contigs();
        let mapped = ReadOutcome {
            read: Read { id: "r4".into(), seq: b"AACG".to_vec(), qual: Some(b"ABCD".to_vec()) },
            state: ReadState::Emitted,
            outcome: Outcome::Mapped {
                matches: vec![lm(0, 9, Strand::Forward), lm(1, 2, Strand::Reverse)],
                mapq: 12,
            },
        };
        let unmapped = ReadOutcome {
            read: Read::new("r5", b"ACGT".to_vec()),
            state: ReadState::Unmapped,
            outcome: Outcome::Unmapped(UnmappedReason::AllAbsent),
        };
        let batch = vec![mapped.clone(), unmapped];

        let first = render(&mapped);
        let mut w = SamWriter::new(CappedSink { buf: Vec::new(), cap: first.len() + 5 }, &cs);
        assert!(w.write_batch(&batch).is_err());
        assert!(w.into_inner().buf.is_empty());

        let mut w = SamWriter::new(CappedSink { buf: Vec::new(), cap: 4096 }, &cs);
        w.write_batch(&batch).unwrap();
        let text = String::from_utf8(w.into_inner().buf).unwrap();
        assert!(text.starts_with(&first));
        assert_eq!(text.lines().count(), 3);
        assert!(text.ends_with("r5\t4\t*\t0\t0\t*\t*\t0\t0\tACGT\t*\n"));
    }

    #[test]
    fn missing_quality_is_star() {
        let out = ReadOutcome {
            read: Read::new("r3", b"ACGT".to_vec()),
            state: ReadState::Emitted,
            outcome: Outcome::Mapped { matches: vec![lm(0, 4, Strand::Forward)], mapq: 60 },
        };
        let text = render(&out);
        assert!(text.starts_with("r3\t0\tchr1\t5\t60\t4M\t*\t0\t0\tACGT\t*\t"));
    }
}
