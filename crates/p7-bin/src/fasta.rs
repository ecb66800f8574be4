//! Minimal FASTA input: the one sequence format the drivers consume.

use anyhow::{bail, Context, Result};
use std::io::BufRead;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaRecord {
    pub name: String,
    pub desc: Option<String>,
    pub seq: Vec<u8>,
}

/// Parse every record from a FASTA stream. Residue lines are concatenated
/// verbatim (minus whitespace), so aligned FASTA keeps its gap characters.
pub fn read_fasta<R: BufRead>(reader: R) -> Result<Vec<FastaRecord>> {
    let mut records: Vec<FastaRecord> = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("reading FASTA line {}", lineno + 1))?;
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(header) = trimmed.strip_prefix('>') {
            let mut parts = header.splitn(2, char::is_whitespace);
            let name = parts.next().unwrap_or("").to_string();
            if name.is_empty() {
                bail!("empty sequence name at line {}", lineno + 1);
            }
            let desc = parts
                .next()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string);
            records.push(FastaRecord {
                name,
                desc,
                seq: Vec::new(),
            });
        } else {
            let Some(cur) = records.last_mut() else {
                bail!("sequence data before any '>' header at line {}", lineno + 1);
            };
            cur.seq
                .extend(trimmed.bytes().filter(|b| !b.is_ascii_whitespace()));
        }
    }
    records.retain(|r| !r.seq.is_empty());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_multiple_records_with_descriptions() {
        let input = b">seq1 first one\nACGT\nACG T\n\n>seq2\nTTTT\n";
        let recs = read_fasta(Cursor::new(&input[..])).unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].name, "seq1");
        assert_eq!(recs[0].desc.as_deref(), Some("first one"));
        assert_eq!(recs[0].seq, b"ACGTACGT");
        assert_eq!(recs[1].name, "seq2");
        assert_eq!(recs[1].desc, None);
    }

    #[test]
    fn keeps_gap_characters_for_aligned_input() {
        let input = b">a\nAC-GT\n>b\nA.CGT\n";
        let recs = read_fasta(Cursor::new(&input[..])).unwrap();
        assert_eq!(recs[0].seq, b"AC-GT");
        assert_eq!(recs[1].seq, b"A.CGT");
    }

    #[test]
    fn data_before_header_is_an_error() {
        assert!(read_fasta(Cursor::new(&b"ACGT\n"[..])).is_err());
    }

    #[test]
    fn empty_records_are_dropped() {
        let input = b">empty\n>real\nACGT\n";
        let recs = read_fasta(Cursor::new(&input[..])).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].name, "real");
    }
}
