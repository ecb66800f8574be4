//! The native-endian binary save format: the same information as the ASCII
//! form in fixed-width fields, preceded by a 4-byte magic. Both the
//! probability tables and the integer score tables are written; readers
//! rebuild scores with `logoddsify` and ignore the stored ones if stale.

use crate::HmmIoError;
use core_alphabet::{Alphabet, AlphabetKind};
use core_model::{EvdParams, ModelFlags, Plan7};
use std::io::{BufRead, Read, Write};

/// Magic prefix of a binary save file.
pub const BINARY_MAGIC: u32 = 0xE8ED_EDB6;

fn w_u32<W: Write>(w: &mut W, v: u32) -> std::io::Result<()> {
    w.write_all(&v.to_ne_bytes())
}

fn w_i32<W: Write>(w: &mut W, v: i32) -> std::io::Result<()> {
    w.write_all(&v.to_ne_bytes())
}

fn w_f32<W: Write>(w: &mut W, v: f32) -> std::io::Result<()> {
    w.write_all(&v.to_ne_bytes())
}

fn w_str<W: Write>(w: &mut W, s: &str) -> std::io::Result<()> {
    w_u32(w, s.len() as u32)?;
    w.write_all(s.as_bytes())
}

fn w_opt_pair<W: Write>(w: &mut W, p: Option<(f32, f32)>) -> std::io::Result<()> {
    match p {
        Some((a, b)) => {
            w.write_all(&[1])?;
            w_f32(w, a)?;
            w_f32(w, b)
        }
        None => w.write_all(&[0]),
    }
}

fn r_u32<R: Read>(r: &mut R) -> Result<u32, HmmIoError> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b).map_err(eof)?;
    Ok(u32::from_ne_bytes(b))
}

fn r_i32<R: Read>(r: &mut R) -> Result<i32, HmmIoError> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b).map_err(eof)?;
    Ok(i32::from_ne_bytes(b))
}

fn r_f32<R: Read>(r: &mut R) -> Result<f32, HmmIoError> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b).map_err(eof)?;
    Ok(f32::from_ne_bytes(b))
}

fn r_u8<R: Read>(r: &mut R) -> Result<u8, HmmIoError> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b).map_err(eof)?;
    Ok(b[0])
}

fn r_str<R: Read>(r: &mut R) -> Result<String, HmmIoError> {
    let n = r_u32(r)? as usize;
    let mut buf = vec![0u8; n];
    r.read_exact(&mut buf).map_err(eof)?;
    String::from_utf8(buf).map_err(|_| HmmIoError::Parse {
        line: 0,
        msg: "non-UTF8 string field".into(),
    })
}

fn r_opt_pair<R: Read>(r: &mut R) -> Result<Option<(f32, f32)>, HmmIoError> {
    if r_u8(r)? == 0 {
        Ok(None)
    } else {
        Ok(Some((r_f32(r)?, r_f32(r)?)))
    }
}

fn eof(e: std::io::Error) -> HmmIoError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        HmmIoError::Truncated
    } else {
        HmmIoError::Io(e)
    }
}

pub fn write_binary<W: Write>(
    hmm: &Plan7,
    abet: &Alphabet,
    w: &mut W,
) -> std::io::Result<()> {
    let m = hmm.m;
    let asize = abet.size();

    w_u32(w, BINARY_MAGIC)?;
    w_u32(w, m as u32)?;
    w.write_all(&[match hmm.abet {
        AlphabetKind::Amino => 0u8,
        AlphabetKind::Nucleic => 1u8,
    }])?;
    w_str(w, &hmm.name)?;
    match &hmm.acc {
        Some(a) => {
            w.write_all(&[1])?;
            w_str(w, a)?;
        }
        None => w.write_all(&[0])?,
    }
    match &hmm.desc {
        Some(d) => {
            w.write_all(&[1])?;
            w_str(w, d)?;
        }
        None => w.write_all(&[0])?,
    }
    w_u32(w, hmm.comlog.len() as u32)?;
    for com in &hmm.comlog {
        w_str(w, com)?;
    }
    w_str(w, &hmm.ctime)?;
    w_u32(w, hmm.nseq)?;
    w_u32(w, hmm.checksum)?;

    match &hmm.rf {
        Some(rf) => {
            w.write_all(&[1])?;
            w.write_all(&rf[1..=m])?;
        }
        None => w.write_all(&[0])?,
    }
    match &hmm.cs {
        Some(cs) => {
            w.write_all(&[1])?;
            w.write_all(&cs[1..=m])?;
        }
        None => w.write_all(&[0])?,
    }
    match &hmm.map {
        Some(map) => {
            w.write_all(&[1])?;
            for k in 1..=m {
                w_u32(w, map[k] as u32)?;
            }
        }
        None => w.write_all(&[0])?,
    }
    w_opt_pair(w, hmm.ga)?;
    w_opt_pair(w, hmm.tc)?;
    w_opt_pair(w, hmm.nc)?;
    w_opt_pair(w, hmm.evd.map(|e| (e.mu, e.lambda)))?;

    for x in 0..asize {
        w_f32(w, hmm.null[x])?;
    }
    w_f32(w, hmm.p1)?;
    for s in 0..4 {
        w_f32(w, hmm.xt[s][0])?;
        w_f32(w, hmm.xt[s][1])?;
    }
    for k in 1..=m {
        w_f32(w, hmm.begin[k])?;
        w_f32(w, hmm.end[k])?;
        for x in 0..asize {
            w_f32(w, hmm.mat[k][x])?;
        }
        if k < m {
            for x in 0..asize {
                w_f32(w, hmm.ins[k][x])?;
            }
            for t in 0..7 {
                w_f32(w, hmm.t[k][t])?;
            }
        }
    }

    // score tables, when current
    if hmm.has_bits() {
        w.write_all(&[1])?;
        for t in 0..7 {
            for k in 0..m {
                w_i32(w, hmm.tsc[t][k])?;
            }
        }
        for row in &hmm.msc {
            for k in 0..=m {
                w_i32(w, row[k])?;
            }
        }
        for row in &hmm.isc {
            for k in 0..m {
                w_i32(w, row[k])?;
            }
        }
        for k in 0..=m {
            w_i32(w, hmm.bsc[k])?;
            w_i32(w, hmm.esc[k])?;
        }
        for s in 0..4 {
            w_i32(w, hmm.xsc[s][0])?;
            w_i32(w, hmm.xsc[s][1])?;
        }
    } else {
        w.write_all(&[0])?;
    }
    Ok(())
}

pub fn read_binary<R: BufRead>(
    r: &mut R,
    abet: &Alphabet,
) -> Result<Option<Plan7>, HmmIoError> {
    // distinguish clean EOF from a truncated record
    if r.fill_buf()?.is_empty() {
        return Ok(None);
    }
    let magic = r_u32(r)?;
    if magic != BINARY_MAGIC {
        return Err(HmmIoError::BadMagic(magic));
    }
    let m = r_u32(r)? as usize;
    let kind = match r_u8(r)? {
        0 => AlphabetKind::Amino,
        1 => AlphabetKind::Nucleic,
        other => {
            return Err(HmmIoError::Parse {
                line: 0,
                msg: format!("unknown alphabet code {other}"),
            })
        }
    };
    let name = r_str(r)?;
    if kind != abet.kind() {
        return Err(HmmIoError::AlphabetMismatch {
            model: name,
            found: kind.to_string(),
            expected: abet.kind().to_string(),
        });
    }
    let asize = abet.size();

    let mut hmm = Plan7::new(m, abet).map_err(|e| HmmIoError::Parse {
        line: 0,
        msg: e.to_string(),
    })?;
    hmm.name = name;
    if r_u8(r)? == 1 {
        hmm.acc = Some(r_str(r)?);
    }
    if r_u8(r)? == 1 {
        hmm.desc = Some(r_str(r)?);
    }
    let ncom = r_u32(r)? as usize;
    for _ in 0..ncom {
        hmm.comlog.push(r_str(r)?);
    }
    hmm.ctime = r_str(r)?;
    hmm.nseq = r_u32(r)?;
    hmm.checksum = r_u32(r)?;

    if r_u8(r)? == 1 {
        let mut rf = vec![b' '; m + 1];
        r.read_exact(&mut rf[1..=m]).map_err(eof)?;
        hmm.rf = Some(rf);
    }
    if r_u8(r)? == 1 {
        let mut cs = vec![b' '; m + 1];
        r.read_exact(&mut cs[1..=m]).map_err(eof)?;
        hmm.cs = Some(cs);
    }
    if r_u8(r)? == 1 {
        let mut map = vec![0usize; m + 1];
        for k in 1..=m {
            map[k] = r_u32(r)? as usize;
        }
        hmm.map = Some(map);
    }
    hmm.ga = r_opt_pair(r)?;
    hmm.tc = r_opt_pair(r)?;
    hmm.nc = r_opt_pair(r)?;
    hmm.evd = r_opt_pair(r)?.map(|(mu, lambda)| EvdParams { mu, lambda });

    let mut null = vec![0.0f32; asize];
    for slot in &mut null {
        *slot = r_f32(r)?;
    }
    let p1 = r_f32(r)?;
    hmm.set_null_model(null, p1);
    for s in 0..4 {
        hmm.xt[s][0] = r_f32(r)?;
        hmm.xt[s][1] = r_f32(r)?;
    }
    for k in 1..=m {
        hmm.begin[k] = r_f32(r)?;
        hmm.end[k] = r_f32(r)?;
        for x in 0..asize {
            hmm.mat[k][x] = r_f32(r)?;
        }
        if k < m {
            for x in 0..asize {
                hmm.ins[k][x] = r_f32(r)?;
            }
            for t in 0..7 {
                hmm.t[k][t] = r_f32(r)?;
            }
        }
    }

    if r_u8(r)? == 1 {
        for t in 0..7 {
            for k in 0..m {
                hmm.tsc[t][k] = r_i32(r)?;
            }
        }
        for x in 0..hmm.acode() {
            for k in 0..=m {
                hmm.msc[x][k] = r_i32(r)?;
            }
        }
        for x in 0..hmm.acode() {
            for k in 0..m {
                hmm.isc[x][k] = r_i32(r)?;
            }
        }
        for k in 0..=m {
            hmm.bsc[k] = r_i32(r)?;
            hmm.esc[k] = r_i32(r)?;
        }
        for s in 0..4 {
            hmm.xsc[s][0] = r_i32(r)?;
            hmm.xsc[s][1] = r_i32(r)?;
        }
        hmm.flags.insert(ModelFlags::HASBITS);
    }

    Ok(Some(hmm))
}
