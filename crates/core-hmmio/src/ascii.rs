//! The line-oriented ASCII save format.

use crate::HmmIoError;
use core_alphabet::{Alphabet, AlphabetKind};
use core_model::{prob2score, score2prob, EvdParams, Plan7, NEG_INF};
use std::io::{BufRead, Write};

const MAGIC_LINE: &str = "HMMER2.0";

fn s2a(sc: i32) -> String {
    if sc <= NEG_INF {
        "*".to_string()
    } else {
        sc.to_string()
    }
}

fn p2a(p: f32, null: f32) -> String {
    s2a(prob2score(p, null))
}

fn a2s(tok: &str, line: usize) -> Result<i32, HmmIoError> {
    if tok == "*" {
        Ok(NEG_INF)
    } else {
        tok.parse().map_err(|_| HmmIoError::Parse {
            line,
            msg: format!("expected integer score, got '{tok}'"),
        })
    }
}

fn a2p(tok: &str, null: f32, line: usize) -> Result<f32, HmmIoError> {
    Ok(score2prob(a2s(tok, line)?, null))
}

fn annot_char(c: u8) -> char {
    if c.is_ascii_whitespace() || c == 0 {
        '.'
    } else {
        c as char
    }
}

/// Write one model in the ASCII format. Emission and transition lines are
/// derived from the probability form, so the file is independent of any
/// Viterbi-mode scoring currently loaded on the model.
pub fn write_ascii<W: Write>(
    hmm: &Plan7,
    abet: &Alphabet,
    w: &mut W,
) -> std::io::Result<()> {
    let m = hmm.m;
    let asize = abet.size();
    let flat = 1.0 / asize as f32;

    writeln!(w, "{MAGIC_LINE}  [plan7]")?;
    writeln!(w, "NAME  {}", hmm.name)?;
    if let Some(acc) = &hmm.acc {
        writeln!(w, "ACC   {acc}")?;
    }
    if let Some(desc) = &hmm.desc {
        writeln!(w, "DESC  {desc}")?;
    }
    writeln!(w, "LENG  {m}")?;
    writeln!(
        w,
        "ALPH  {}",
        match hmm.abet {
            AlphabetKind::Amino => "Amino",
            AlphabetKind::Nucleic => "Nucleic",
        }
    )?;
    writeln!(w, "RF    {}", if hmm.rf.is_some() { "yes" } else { "no" })?;
    writeln!(w, "CS    {}", if hmm.cs.is_some() { "yes" } else { "no" })?;
    writeln!(w, "MAP   {}", if hmm.map.is_some() { "yes" } else { "no" })?;
    for com in &hmm.comlog {
        writeln!(w, "COM   {com}")?;
    }
    writeln!(w, "NSEQ  {}", hmm.nseq)?;
    writeln!(w, "DATE  {}", hmm.ctime)?;
    writeln!(w, "CKSUM {}", hmm.checksum)?;
    if let Some((g1, g2)) = hmm.ga {
        writeln!(w, "GA    {g1} {g2}")?;
    }
    if let Some((t1, t2)) = hmm.tc {
        writeln!(w, "TC    {t1} {t2}")?;
    }
    if let Some((n1, n2)) = hmm.nc {
        writeln!(w, "NC    {n1} {n2}")?;
    }
    let xt = &hmm.xt;
    writeln!(
        w,
        "XT    {}",
        (0..4)
            .flat_map(|s| [p2a(xt[s][0], 1.0), p2a(xt[s][1], 1.0)])
            .collect::<Vec<_>>()
            .join(" ")
    )?;
    writeln!(w, "NULT  {} {}", p2a(hmm.p1, 1.0), p2a(1.0 - hmm.p1, 1.0))?;
    writeln!(
        w,
        "NULE  {}",
        (0..asize)
            .map(|x| p2a(hmm.null[x], flat))
            .collect::<Vec<_>>()
            .join(" ")
    )?;
    if let Some(EvdParams { mu, lambda }) = hmm.evd {
        writeln!(w, "EVD   {mu} {lambda}")?;
    }

    write!(w, "HMM     ")?;
    for x in 0..asize {
        write!(w, " {:>6}", abet.symbol(x as u8))?;
    }
    writeln!(w)?;
    writeln!(
        w,
        "        {:>6} {:>6} {:>6} {:>6} {:>6} {:>6} {:>6} {:>6} {:>6}",
        "m->m", "m->i", "m->d", "i->m", "i->i", "d->m", "d->d", "b->m", "m->e"
    )?;

    for k in 1..=m {
        // match line: scores, then map / rf / cs annotation columns
        write!(w, "{k:>6}")?;
        for x in 0..asize {
            write!(w, " {:>6}", p2a(hmm.mat[k][x], hmm.null[x]))?;
        }
        match &hmm.map {
            Some(map) => write!(w, " {:>6}", map[k])?,
            None => write!(w, " {:>6}", "-")?,
        }
        match &hmm.rf {
            // annotation is tokenized on read, so blanks become dots
            Some(rf) => write!(w, " {}", annot_char(rf[k]))?,
            None => write!(w, " -")?,
        }
        match &hmm.cs {
            Some(cs) => write!(w, " {}", annot_char(cs[k]))?,
            None => write!(w, " -")?,
        }
        writeln!(w)?;

        // insert line
        write!(w, "{:>6}", "-")?;
        for x in 0..asize {
            if k < m {
                write!(w, " {:>6}", p2a(hmm.ins[k][x], hmm.null[x]))?;
            } else {
                write!(w, " {:>6}", "*")?;
            }
        }
        writeln!(w)?;

        // transition line, with folded entry/exit columns
        write!(w, "{:>6}", "-")?;
        for t in 0..7 {
            if k < m {
                let null = if t == 2 || t == 6 { 1.0 } else { hmm.p1 };
                write!(w, " {:>6}", p2a(hmm.t[k][t], null))?;
            } else {
                write!(w, " {:>6}", "*")?;
            }
        }
        write!(w, " {:>6}", p2a(hmm.begin[k], hmm.p1))?;
        writeln!(w, " {:>6}", p2a(hmm.end[k], 1.0))?;
    }
    writeln!(w, "//")
}

fn next_line<R: BufRead>(
    r: &mut R,
    line_no: &mut usize,
) -> Result<Option<String>, HmmIoError> {
    let mut buf = String::new();
    loop {
        buf.clear();
        if r.read_line(&mut buf)? == 0 {
            return Ok(None);
        }
        *line_no += 1;
        if !buf.trim().is_empty() {
            return Ok(Some(buf.trim_end().to_string()));
        }
    }
}

fn require_line<R: BufRead>(r: &mut R, line_no: &mut usize) -> Result<String, HmmIoError> {
    next_line(r, line_no)?.ok_or(HmmIoError::Truncated)
}

/// Read one model, or `None` at a clean end of file.
pub fn read_ascii<R: BufRead>(
    r: &mut R,
    line_no: &mut usize,
    abet: &Alphabet,
) -> Result<Option<Plan7>, HmmIoError> {
    let Some(first) = next_line(r, line_no)? else {
        return Ok(None);
    };
    if !first.starts_with(MAGIC_LINE) {
        return Err(HmmIoError::Parse {
            line: *line_no,
            msg: format!("expected {MAGIC_LINE} header, got '{first}'"),
        });
    }

    let asize = abet.size();
    let flat = 1.0 / asize as f32;
    let mut name = String::new();
    let mut acc = None;
    let mut desc = None;
    let mut comlog = Vec::new();
    let mut ctime = String::new();
    let mut nseq = 0u32;
    let mut checksum = 0u32;
    let mut leng = 0usize;
    let mut has_rf = false;
    let mut has_cs = false;
    let mut has_map = false;
    let mut ga = None;
    let mut tc = None;
    let mut nc = None;
    let mut evd = None;
    let mut xt = [[0.0f32; 2]; 4];
    let mut p1 = 0.0f32;
    let mut null = vec![flat; asize];

    let parse_pair = |rest: &str, ln: usize| -> Result<(f32, f32), HmmIoError> {
        let mut it = rest.split_whitespace();
        let a = it.next().and_then(|t| t.parse().ok());
        let b = it.next().and_then(|t| t.parse().ok());
        match (a, b) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(HmmIoError::Parse {
                line: ln,
                msg: format!("expected two numbers, got '{rest}'"),
            }),
        }
    };

    loop {
        let line = require_line(r, line_no)?;
        let (key, rest) = match line.split_once(char::is_whitespace) {
            Some((k, v)) => (k, v.trim()),
            None => (line.as_str(), ""),
        };
        match key {
            "NAME" => name = rest.to_string(),
            "ACC" => acc = Some(rest.to_string()),
            "DESC" => desc = Some(rest.to_string()),
            "LENG" => {
                leng = rest.parse().map_err(|_| HmmIoError::Parse {
                    line: *line_no,
                    msg: format!("bad LENG '{rest}'"),
                })?
            }
            "ALPH" => {
                let found = match rest {
                    "Amino" => AlphabetKind::Amino,
                    "Nucleic" => AlphabetKind::Nucleic,
                    other => {
                        return Err(HmmIoError::Parse {
                            line: *line_no,
                            msg: format!("unknown alphabet '{other}'"),
                        })
                    }
                };
                if found != abet.kind() {
                    return Err(HmmIoError::AlphabetMismatch {
                        model: name.clone(),
                        found: found.to_string(),
                        expected: abet.kind().to_string(),
                    });
                }
            }
            "RF" => has_rf = rest == "yes",
            "CS" => has_cs = rest == "yes",
            "MAP" => has_map = rest == "yes",
            "COM" => comlog.push(rest.to_string()),
            "NSEQ" => nseq = rest.parse().unwrap_or(0),
            "DATE" => ctime = rest.to_string(),
            "CKSUM" => checksum = rest.parse().unwrap_or(0),
            "GA" => ga = Some(parse_pair(rest, *line_no)?),
            "TC" => tc = Some(parse_pair(rest, *line_no)?),
            "NC" => nc = Some(parse_pair(rest, *line_no)?),
            "EVD" => {
                let (mu, lambda) = parse_pair(rest, *line_no)?;
                evd = Some(EvdParams { mu, lambda });
            }
            "XT" => {
                let toks: Vec<&str> = rest.split_whitespace().collect();
                if toks.len() != 8 {
                    return Err(HmmIoError::Parse {
                        line: *line_no,
                        msg: "XT needs eight fields".into(),
                    });
                }
                for s in 0..4 {
                    xt[s][0] = a2p(toks[s * 2], 1.0, *line_no)?;
                    xt[s][1] = a2p(toks[s * 2 + 1], 1.0, *line_no)?;
                }
            }
            "NULT" => {
                let toks: Vec<&str> = rest.split_whitespace().collect();
                if toks.len() != 2 {
                    return Err(HmmIoError::Parse {
                        line: *line_no,
                        msg: "NULT needs two fields".into(),
                    });
                }
                // recover p1 through its complement: near 1.0 the direct
                // log-odds loses most of the precision that 1-p1 carries
                p1 = 1.0 - a2p(toks[1], 1.0, *line_no)?;
            }
            "NULE" => {
                let toks: Vec<&str> = rest.split_whitespace().collect();
                if toks.len() != asize {
                    return Err(HmmIoError::Parse {
                        line: *line_no,
                        msg: format!("NULE needs {asize} fields"),
                    });
                }
                for (x, tok) in toks.iter().enumerate() {
                    null[x] = a2p(tok, flat, *line_no)?;
                }
            }
            "HMM" => break,
            other => {
                return Err(HmmIoError::Parse {
                    line: *line_no,
                    msg: format!("unknown header key '{other}'"),
                })
            }
        }
    }

    if leng == 0 {
        return Err(HmmIoError::Parse {
            line: *line_no,
            msg: "missing or zero LENG".into(),
        });
    }
    // the transition-name header line under HMM
    require_line(r, line_no)?;

    let mut hmm = Plan7::new(leng, abet).map_err(|e| HmmIoError::Parse {
        line: *line_no,
        msg: e.to_string(),
    })?;
    hmm.name = name;
    hmm.acc = acc;
    hmm.desc = desc;
    hmm.comlog = comlog;
    hmm.ctime = ctime;
    hmm.nseq = nseq;
    hmm.checksum = checksum;
    hmm.ga = ga;
    hmm.tc = tc;
    hmm.nc = nc;
    hmm.evd = evd;
    hmm.xt = xt;
    hmm.set_null_model(null, p1);
    if has_rf {
        hmm.rf = Some(vec![b' '; leng + 1]);
    }
    if has_cs {
        hmm.cs = Some(vec![b' '; leng + 1]);
    }
    if has_map {
        hmm.map = Some(vec![0; leng + 1]);
    }

    for k in 1..=leng {
        // match line
        let line = require_line(r, line_no)?;
        let toks: Vec<&str> = line.split_whitespace().collect();
        if toks.len() < 1 + asize + 3 {
            return Err(HmmIoError::Parse {
                line: *line_no,
                msg: format!("short match line for node {k}"),
            });
        }
        for x in 0..asize {
            hmm.mat[k][x] = a2p(toks[1 + x], hmm.null[x], *line_no)?;
        }
        if let Some(map) = &mut hmm.map {
            map[k] = toks[1 + asize].parse().map_err(|_| HmmIoError::Parse {
                line: *line_no,
                msg: format!("bad map column '{}'", toks[1 + asize]),
            })?;
        }
        if let Some(rf) = &mut hmm.rf {
            rf[k] = toks[2 + asize].as_bytes()[0];
        }
        if let Some(cs) = &mut hmm.cs {
            cs[k] = toks[3 + asize].as_bytes()[0];
        }

        // insert line
        let line = require_line(r, line_no)?;
        let toks: Vec<&str> = line.split_whitespace().collect();
        if toks.len() < 1 + asize {
            return Err(HmmIoError::Parse {
                line: *line_no,
                msg: format!("short insert line for node {k}"),
            });
        }
        if k < leng {
            for x in 0..asize {
                hmm.ins[k][x] = a2p(toks[1 + x], hmm.null[x], *line_no)?;
            }
        }

        // transition line
        let line = require_line(r, line_no)?;
        let toks: Vec<&str> = line.split_whitespace().collect();
        if toks.len() < 1 + 7 + 2 {
            return Err(HmmIoError::Parse {
                line: *line_no,
                msg: format!("short transition line for node {k}"),
            });
        }
        if k < leng {
            for t in 0..7 {
                let nullp = if t == 2 || t == 6 { 1.0 } else { hmm.p1 };
                hmm.t[k][t] = a2p(toks[1 + t], nullp, *line_no)?;
            }
        }
        hmm.begin[k] = a2p(toks[8], hmm.p1, *line_no)?;
        hmm.end[k] = a2p(toks[9], 1.0, *line_no)?;
    }

    let closer = require_line(r, line_no)?;
    if closer != "//" {
        return Err(HmmIoError::Parse {
            line: *line_no,
            msg: format!("expected '//', got '{closer}'"),
        });
    }
    Ok(Some(hmm))
}
