//! The three-line human-readable domain alignment attached to a hit.

use core_alphabet::Alphabet;
use core_model::Plan7;
use core_trace::{StateType, Trace};
use std::fmt;

/// Model consensus, match line, and sequence, column for column, with
/// coordinates. Optional reference/consensus-structure annotation rows are
/// carried when the model has them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FancyAli {
    pub rfline: Option<String>,
    pub csline: Option<String>,
    pub model: String,
    pub mline: String,
    pub aseq: String,
    pub seqname: String,
    pub sqfrom: usize,
    pub sqto: usize,
}

impl FancyAli {
    /// Render one domain trace. The trace must be a decomposed domain
    /// (S-N-B-core-E-C-T); only the core contributes columns.
    pub fn new(
        tr: &Trace,
        hmm: &Plan7,
        dsq: &[u8],
        abet: &Alphabet,
        seqname: &str,
    ) -> Self {
        let has_rf = hmm.rf.is_some();
        let has_cs = hmm.cs.is_some();
        let mut rfline = String::new();
        let mut csline = String::new();
        let mut model = String::new();
        let mut mline = String::new();
        let mut aseq = String::new();
        let mut sqfrom = 0usize;
        let mut sqto = 0usize;

        for step in tr.steps() {
            match step.state {
                StateType::M | StateType::D => {
                    let k = step.node;
                    let cons = hmm.consensus_symbol(k);
                    let cons_ch = abet.symbol(cons);
                    if let Some(rf) = &hmm.rf {
                        rfline.push(rf[k] as char);
                    }
                    if let Some(cs) = &hmm.cs {
                        csline.push(cs[k] as char);
                    }
                    model.push(cons_ch);
                    if step.state == StateType::M {
                        let sym = dsq[step.pos];
                        let ch = abet.symbol(sym);
                        if sym == cons {
                            mline.push(ch);
                        } else if hmm.msc[sym as usize][k] > 0 {
                            mline.push('+');
                        } else {
                            mline.push(' ');
                        }
                        aseq.push(ch);
                        if sqfrom == 0 {
                            sqfrom = step.pos;
                        }
                        sqto = step.pos;
                    } else {
                        mline.push(' ');
                        aseq.push('-');
                    }
                }
                StateType::I => {
                    if has_rf {
                        rfline.push('.');
                    }
                    if has_cs {
                        csline.push('.');
                    }
                    model.push('.');
                    mline.push(' ');
                    aseq.push(abet.symbol(dsq[step.pos]).to_ascii_lowercase());
                    if sqfrom == 0 {
                        sqfrom = step.pos;
                    }
                    sqto = step.pos;
                }
                _ => {}
            }
        }

        Self {
            rfline: has_rf.then_some(rfline),
            csline: has_cs.then_some(csline),
            model,
            mline,
            aseq,
            seqname: seqname.to_string(),
            sqfrom,
            sqto,
        }
    }

    pub fn width(&self) -> usize {
        self.model.len()
    }
}

impl fmt::Display for FancyAli {
    /// Blocks of 50 columns, sequence line flanked by coordinates.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const BLOCK: usize = 50;
        let name_w = self.seqname.len().max(8);
        let mut pos = self.sqfrom;
        let mut col = 0;
        while col < self.width() {
            let hi = (col + BLOCK).min(self.width());
            if let Some(rf) = &self.rfline {
                writeln!(f, "{:name_w$} {:6} {}", "", "RF", &rf[col..hi])?;
            }
            if let Some(cs) = &self.csline {
                writeln!(f, "{:name_w$} {:6} {}", "", "CS", &cs[col..hi])?;
            }
            writeln!(f, "{:name_w$} {:6} {}", "", "", &self.model[col..hi])?;
            writeln!(f, "{:name_w$} {:6} {}", "", "", &self.mline[col..hi])?;
            let emitted = self.aseq[col..hi]
                .chars()
                .filter(|c| *c != '-')
                .count();
            let from = pos;
            let to = if emitted == 0 { pos } else { pos + emitted - 1 };
            writeln!(
                f,
                "{:name_w$} {:6} {}",
                self.seqname,
                from,
                &self.aseq[col..hi]
            )?;
            writeln!(f, "{:name_w$} {:6} {}", "", to, "")?;
            pos = to + if emitted == 0 { 0 } else { 1 };
            col = hi;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_cover_match_insert_delete() {
        let abet = Alphabet::nucleic();
        let mut hmm = Plan7::new(3, &abet).unwrap();
        hmm.name = "fancy".into();
        for k in 1..=3 {
            hmm.mat[k] = vec![0.05; 4];
            hmm.mat[k][k - 1] = 0.85;
        }
        for k in 1..3 {
            hmm.ins[k] = vec![0.25; 4];
            hmm.t[k] = [0.8, 0.1, 0.1, 0.8, 0.2, 0.8, 0.2];
        }
        hmm.config_sw(0.5, 0.01);
        hmm.logoddsify(&abet, true);

        // M1, I1, M2, D3: sequence residues A, g(insert), C
        let mut tr = Trace::new();
        tr.push(StateType::S, 0, 0);
        tr.push(StateType::N, 0, 0);
        tr.push(StateType::B, 0, 0);
        tr.push(StateType::M, 1, 1);
        tr.push(StateType::I, 1, 2);
        tr.push(StateType::M, 2, 3);
        tr.push(StateType::D, 3, 0);
        tr.push(StateType::E, 0, 0);
        tr.push(StateType::C, 0, 0);
        tr.push(StateType::T, 0, 0);

        let dsq = abet.digitize(b"AGC").unwrap();
        let ali = FancyAli::new(&tr, &hmm, dsq.as_slice(), &abet, "seq1");
        assert_eq!(ali.model, "A.CG");
        assert_eq!(ali.aseq, "AgC-");
        assert_eq!(ali.mline, "A C ");
        assert_eq!((ali.sqfrom, ali.sqto), (1, 3));
        let shown = ali.to_string();
        assert!(shown.contains("seq1"));
        assert!(shown.contains("AgC-"));
    }
}
