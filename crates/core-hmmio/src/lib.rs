//! Profile save files.
//!
//! Two on-disk forms carry the same information: a line-oriented ASCII
//! format under the `HMMER2.0` magic line, and a native-endian binary
//! format under a 4-byte magic. Probabilities are stored as scaled integer
//! log-odds ("*" for -infinity in ASCII); reading recovers the probability
//! form exactly to integer-score precision, and the caller runs
//! `logoddsify` before any DP.

mod ascii;
mod binary;
mod checksum;

pub use ascii::{read_ascii, write_ascii};
pub use binary::{write_binary, BINARY_MAGIC};
pub use checksum::{gcg_checksum, gcg_checksum_one};

use core_alphabet::Alphabet;
use core_model::Plan7;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HmmIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("parse error at line {line}: {msg}")]
    Parse { line: usize, msg: String },
    #[error("bad magic 0x{0:08x}: not a profile save file")]
    BadMagic(u32),
    #[error("model '{model}' is {found}, search is configured for {expected}")]
    AlphabetMismatch {
        model: String,
        found: String,
        expected: String,
    },
    #[error("truncated save file")]
    Truncated,
}

/// A stream of models from one save file, ASCII or binary, autodetected
/// from the leading bytes. Databases are simple concatenations; call
/// [`HmmFile::read_next`] until it returns `None`.
pub struct HmmFile<R: BufRead> {
    reader: R,
    line: usize,
    binary: Option<bool>,
}

impl HmmFile<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, HmmIoError> {
        Ok(Self::from_reader(BufReader::new(File::open(path)?)))
    }
}

impl<R: BufRead> HmmFile<R> {
    pub fn from_reader(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            binary: None,
        }
    }

    /// Read the next model, or `None` at end of file.
    pub fn read_next(&mut self, abet: &Alphabet) -> Result<Option<Plan7>, HmmIoError> {
        if self.binary.is_none() {
            let head = self.reader.fill_buf()?;
            if head.is_empty() {
                return Ok(None);
            }
            self.binary = Some(head.len() >= 4 && head[..4] == BINARY_MAGIC.to_ne_bytes());
        }
        let hmm = if self.binary == Some(true) {
            binary::read_binary(&mut self.reader, abet)?
        } else {
            read_ascii(&mut self.reader, &mut self.line, abet)?
        };
        if let Some(hmm) = &hmm {
            tracing::debug!(target: "hmmio", name = %hmm.name, m = hmm.m, "model read");
        }
        Ok(hmm)
    }
}
