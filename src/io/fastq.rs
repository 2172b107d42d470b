use anyhow::{anyhow, Result};
use std::io::BufRead;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastqRecord {
    pub id: String,
    pub desc: Option<String>,
    pub seq: Vec<u8>,
    pub qual: Vec<u8>,
}

pub struct FastqReader<R: BufRead> {
    reader: R,
    buf: String,
    done: bool,
    line_no: u64,
}

impl<R: BufRead> FastqReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, buf: String::new(), done: false, line_no: 0 }
    }

    fn read_line(&mut self) -> Result<usize> {
        self.buf.clear();
        let n = self.reader.read_line(&mut self.buf)?;
        if n > 0 {
            self.line_no += 1;
        }
        Ok(n)
    }

    pub fn next_record(&mut self) -> Result<Option<FastqRecord>> {
        if self.done {
            return Ok(None);
        }

        // header line starting with '@'; blank lines between records are skipped
        loop {
            if self.read_line()? == 0 {
                self.done = true;
                return Ok(None);
            }
            if !self.buf.trim().is_empty() {
                break;
            }
        }
        if !self.buf.starts_with('@') {
            return Err(anyhow!("line {}: FASTQ header not starting with '@'", self.line_no));
        }
        let header = self.buf[1..].trim_end().to_string();
        let mut parts = header.splitn(2, char::is_whitespace);
        let id = parts.next().unwrap_or("").to_string();
        let desc = parts.next().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        // sequence line
        if self.read_line()? == 0 {
            return Err(anyhow!("record '{}': unexpected EOF after header", id));
        }
        let seq = self.buf.trim_end().as_bytes().to_vec();

        // plus line
        if self.read_line()? == 0 || !self.buf.starts_with('+') {
            return Err(anyhow!("record '{}': missing '+' line", id));
        }

        // quality line
        if self.read_line()? == 0 {
            return Err(anyhow!("record '{}': missing quality line", id));
        }
        let qual = self.buf.trim_end().as_bytes().to_vec();
        if qual.len() != seq.len() {
            return Err(anyhow!("record '{}': seq/qual length mismatch ({} vs {})", id, seq.len(), qual.len()));
        }

        Ok(Some(FastqRecord { id, desc, seq, qual }))
    }

    /// Reads up to `max` records; an empty batch means end of input.
    pub fn next_batch(&mut self, max: usize) -> Result<Vec<FastqRecord>> {
        let mut batch = Vec::with_capacity(max.min(1 << 16));
        while batch.len() < max {
            match self.next_record()? {
                Some(rec) => batch.push(rec),
                None => break,
            }
        }
        Ok(batch)
    }
}
