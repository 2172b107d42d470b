use anyhow::Result;
use std::io::BufRead;

#[derive(Debug, Clone)]
pub struct FastaRecord {
    pub id: String,
    pub desc: Option<String>,
    pub seq: Vec<u8>,
}

/// Streaming FASTA reader over raw bytes; sequence lines may wrap and may
/// carry CR/LF or stray whitespace.
pub struct FastaReader<R: BufRead> {
    reader: R,
    line: Vec<u8>,
    pending_header: Option<Vec<u8>>,
    done: bool,
}

fn split_header(raw: &[u8]) -> (String, Option<String>) {
    let header = String::from_utf8_lossy(raw);
    let header = header.trim();
    let mut parts = header.splitn(2, char::is_whitespace);
    let id = parts.next().unwrap_or("").to_string();
    let desc = parts.next().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    (id, desc)
}

impl<R: BufRead> FastaReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, line: Vec::new(), pending_header: None, done: false }
    }

    fn read_line(&mut self) -> Result<bool> {
        self.line.clear();
        Ok(self.reader.read_until(b'\n', &mut self.line)? > 0)
    }

    pub fn next_record(&mut self) -> Result<Option<FastaRecord>> {
        if self.done {
            return Ok(None);
        }

        let header = match self.pending_header.take() {
            Some(h) => h,
            None => loop {
                if !self.read_line()? {
                    self.done = true;
                    return Ok(None);
                }
                if self.line.first() == Some(&b'>') {
                    break self.line[1..].to_vec();
                }
            },
        };
        let (id, desc) = split_header(&header);

        let mut seq: Vec<u8> = Vec::new();
        loop {
            if !self.read_line()? {
                self.done = true;
                break;
            }
            if self.line.first() == Some(&b'>') {
                self.pending_header = Some(self.line[1..].to_vec());
                break;
            }
            seq.extend(
                self.line
                    .iter()
                    .filter(|b| !b.is_ascii_whitespace())
                    .map(u8::to_ascii_uppercase),
            );
        }

        Ok(Some(FastaRecord { id, desc, seq }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parse_simple_fasta() {
        let data = b">chr1 first\nACgTNN\n>chr2\nAAA\n";
        let mut r = FastaReader::new(Cursor::new(&data[..]));

        let r1 = r.next_record().unwrap().unwrap();
        assert_eq!(r1.id, "chr1");
        assert_eq!(r1.desc.as_deref(), Some("first"));
        assert_eq!(r1.seq, b"ACGTNN");

        let r2 = r.next_record().unwrap().unwrap();
        assert_eq!(r2.id, "chr2");
        assert_eq!(r2.desc, None);
        assert_eq!(r2.seq, b"AAA");

        assert!(r.next_record().unwrap().is_none());
    }

    #[test]
    fn parse_fasta_with_crlf_and_whitespace() {
        let data = b">chr1 desc\r\nAC g t n\r\n acgt\r\n>chr2 \r\n N N N \r\n";
        let mut r = FastaReader::new(Cursor::new(&data[..]));

        let r1 = r.next_record().unwrap().unwrap();
        assert_eq!(r1.id, "chr1");
        assert_eq!(r1.desc.as_deref(), Some("desc"));
        assert_eq!(r1.seq, b"ACGTNACGT");

        let r2 = r.next_record().unwrap().unwrap();
        assert_eq!(r2.id, "chr2");
        assert_eq!(r2.seq, b"NNN");

        assert!(r.next_record().unwrap().is_none());
    }

    #[test]
    fn parse_fasta_without_trailing_newline() {
        let data = b"\n\n>chr1\nACGT";
        let mut r = FastaReader::new(Cursor::new(&data[..]));
        let r1 = r.next_record().unwrap().unwrap();
        assert_eq!(r1.seq, b"ACGT");
        assert!(r.next_record().unwrap().is_none());
    }
}
