//! State paths (traces) through a Plan 7 model.
//!
//! A [`Trace`] is an ordered list of (state type, model node, sequence
//! position) triples running S..T. Emitting steps carry a 1-based sequence
//! position; nonemitting steps carry 0. Traces are built back-to-front by
//! every traceback and reversed once complete.
//!
//! Conventions (shared with the DP engines):
//!   - M/I steps carry a node in 1..=M and a position in 1..=L.
//!   - N/J/C runs: the first step after the preceding state is nonemitting,
//!     each subsequent loop step emits one position.
//!   - S/B/E/T never emit.

use core_alphabet::Msa;
use core_matrix::XCOLS;
use core_model::{
    Plan7, LOOP, MOVE, TDD, TDM, TII, TIM, TMD, TMI, TMM, XTC, XTE, XTJ, XTN,
};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("illegal transition {from}->{to} in trace")]
    IllegalTransition { from: StateType, to: StateType },
    #[error("malformed trace: {0}")]
    Malformed(&'static str),
}

/// Plan 7 state types. `Bogus` marks unset shadow-matrix cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum StateType {
    #[default]
    Bogus = 0,
    M = 1,
    D = 2,
    I = 3,
    S = 4,
    N = 5,
    B = 6,
    E = 7,
    C = 8,
    T = 9,
    J = 10,
}

impl fmt::Display for StateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StateType::Bogus => "BOGUS",
            StateType::M => "M",
            StateType::D => "D",
            StateType::I => "I",
            StateType::S => "S",
            StateType::N => "N",
            StateType::B => "B",
            StateType::E => "E",
            StateType::C => "C",
            StateType::T => "T",
            StateType::J => "J",
        };
        f.write_str(s)
    }
}

impl StateType {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => StateType::Bogus,
            1 => StateType::M,
            2 => StateType::D,
            3 => StateType::I,
            4 => StateType::S,
            5 => StateType::N,
            6 => StateType::B,
            7 => StateType::E,
            8 => StateType::C,
            9 => StateType::T,
            10 => StateType::J,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceStep {
    pub state: StateType,
    pub node: usize,
    pub pos: usize,
}

/// An ordered state path. Backing storage grows as needed; `for_seq` sizes
/// the initial buffer for a typical single alignment of length L.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    steps: Vec<TraceStep>,
}

impl Trace {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn for_seq(l: usize) -> Self {
        Self {
            steps: Vec::with_capacity(2 * l + 6),
        }
    }

    pub fn push(&mut self, state: StateType, node: usize, pos: usize) {
        self.steps.push(TraceStep { state, node, pos });
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, i: usize) -> TraceStep {
        self.steps[i]
    }

    pub fn steps(&self) -> &[TraceStep] {
        &self.steps
    }

    pub fn last(&self) -> Option<&TraceStep> {
        self.steps.last()
    }

    pub fn last_mut(&mut self) -> Option<&mut TraceStep> {
        self.steps.last_mut()
    }

    /// Tracebacks build back-to-front; call once at the end.
    pub fn reverse(&mut self) {
        self.steps.reverse();
    }

    /// Number of domains (B states) in the trace.
    pub fn domain_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.state == StateType::B)
            .count()
    }

    /// Integer score of the path: every transition plus every M/I emission.
    pub fn score_scaled(&self, hmm: &Plan7, dsq: &[u8]) -> Result<i32, TraceError> {
        let mut score = 0i64;
        for w in self.steps.windows(2) {
            let (cur, nxt) = (w[0], w[1]);
            match cur.state {
                StateType::M => score += hmm.msc[dsq[cur.pos] as usize][cur.node] as i64,
                StateType::I => score += hmm.isc[dsq[cur.pos] as usize][cur.node] as i64,
                _ => {}
            }
            score +=
                transition_score(hmm, cur.state, cur.node, nxt.state, nxt.node)? as i64;
        }
        Ok(score.clamp(core_model::NEG_INF as i64, i32::MAX as i64) as i32)
    }

    /// Bit score of the path.
    pub fn score(&self, hmm: &Plan7, dsq: &[u8]) -> Result<f32, TraceError> {
        Ok(core_model::scorify(self.score_scaled(hmm, dsq)?))
    }

    /// Split a multi-hit trace into one trace per domain at B..E spans,
    /// each framed S-N-B-..-E-C-T.
    pub fn decompose(&self) -> Vec<Trace> {
        let mut out = Vec::new();
        let mut i = 0;
        while i < self.steps.len() {
            if self.steps[i].state != StateType::B {
                i += 1;
                continue;
            }
            let mut tr = Trace::new();
            tr.push(StateType::S, 0, 0);
            tr.push(StateType::N, 0, 0);
            let mut j = i;
            while j < self.steps.len() && self.steps[j].state != StateType::E {
                tr.steps.push(self.steps[j]);
                j += 1;
            }
            if j == self.steps.len() {
                break; // unterminated domain; drop it
            }
            tr.push(StateType::E, 0, 0);
            tr.push(StateType::C, 0, 0);
            tr.push(StateType::T, 0, 0);
            out.push(tr);
            i = j + 1;
        }
        out
    }

    /// (i1, i2, k1, k2): first/last emitted sequence position and first/last
    /// visited model node. `None` for a trace that never enters the model.
    pub fn simple_bounds(&self) -> Option<(usize, usize, usize, usize)> {
        let mut i1 = None;
        let mut i2 = 0;
        let mut k1 = None;
        let mut k2 = 0;
        for s in &self.steps {
            match s.state {
                StateType::M | StateType::I => {
                    if i1.is_none() {
                        i1 = Some(s.pos);
                    }
                    i2 = s.pos;
                }
                _ => {}
            }
            if matches!(s.state, StateType::M | StateType::D) {
                if k1.is_none() {
                    k1 = Some(s.node);
                }
                k2 = s.node;
            }
        }
        Some((i1?, i2, k1?, k2))
    }

    /// Debug walk over the §invariants: S..T framing, node and position
    /// ranges, and full coverage of the sequence by emitting states.
    pub fn verify(&self, m: usize, l: usize) -> Result<(), TraceError> {
        if self.steps.first().map(|s| s.state) != Some(StateType::S) {
            return Err(TraceError::Malformed("trace does not start with S"));
        }
        if self.steps.last().map(|s| s.state) != Some(StateType::T) {
            return Err(TraceError::Malformed("trace does not end with T"));
        }
        let mut emitted = 0usize;
        for s in &self.steps {
            match s.state {
                StateType::M | StateType::I => {
                    if s.node < 1 || s.node > m {
                        return Err(TraceError::Malformed("M/I node out of range"));
                    }
                    if s.pos < 1 || s.pos > l {
                        return Err(TraceError::Malformed("M/I position out of range"));
                    }
                    emitted += 1;
                }
                StateType::D => {
                    if s.node < 1 || s.node > m {
                        return Err(TraceError::Malformed("D node out of range"));
                    }
                }
                StateType::N | StateType::J | StateType::C => {
                    if s.pos > 0 {
                        emitted += 1;
                    }
                }
                StateType::S | StateType::B | StateType::E | StateType::T => {
                    if s.pos != 0 {
                        return Err(TraceError::Malformed("nonemitter carries a position"));
                    }
                }
                StateType::Bogus => {
                    return Err(TraceError::Malformed("bogus state in trace"));
                }
            }
        }
        if emitted != l {
            return Err(TraceError::Malformed("emitted positions do not cover L"));
        }
        Ok(())
    }
}

/// Score of the transition between two adjacent trace states. The B->D and
/// D->E pairs cost nothing: they occur only in wing-unfolded traces, where
/// the folded begin/end score already carries the delete path.
pub fn transition_score(
    hmm: &Plan7,
    st1: StateType,
    k1: usize,
    st2: StateType,
    k2: usize,
) -> Result<i32, TraceError> {
    use StateType::*;
    let illegal = |from: StateType, to: StateType| TraceError::IllegalTransition { from, to };
    let sc = match st1 {
        S => match st2 {
            N => 0, // S->N, p = 1
            _ => return Err(illegal(st1, st2)),
        },
        N => match st2 {
            B => hmm.xsc[XTN][MOVE],
            N => hmm.xsc[XTN][LOOP],
            _ => return Err(illegal(st1, st2)),
        },
        B => match st2 {
            M => hmm.bsc[k2],
            D => 0, // unfolded entry wing
            _ => return Err(illegal(st1, st2)),
        },
        M => match st2 {
            M => hmm.tsc[TMM][k1],
            I => hmm.tsc[TMI][k1],
            D => hmm.tsc[TMD][k1],
            E => hmm.esc[k1],
            _ => return Err(illegal(st1, st2)),
        },
        I => match st2 {
            M => hmm.tsc[TIM][k1],
            I => hmm.tsc[TII][k1],
            _ => return Err(illegal(st1, st2)),
        },
        D => match st2 {
            M => hmm.tsc[TDM][k1],
            D => hmm.tsc[TDD][k1],
            E => 0, // unfolded exit wing
            _ => return Err(illegal(st1, st2)),
        },
        E => match st2 {
            C => hmm.xsc[XTE][MOVE],
            J => hmm.xsc[XTE][LOOP],
            _ => return Err(illegal(st1, st2)),
        },
        J => match st2 {
            B => hmm.xsc[XTJ][MOVE],
            J => hmm.xsc[XTJ][LOOP],
            _ => return Err(illegal(st1, st2)),
        },
        C => match st2 {
            T => hmm.xsc[XTC][MOVE],
            C => hmm.xsc[XTC][LOOP],
            _ => return Err(illegal(st1, st2)),
        },
        T | Bogus => return Err(illegal(st1, st2)),
    };
    Ok(sc)
}

/// Per-cell traceback pointers for the alignment-mode Viterbi, sized
/// (rows) x (M+2) for the three node grids plus a 5-wide special grid and
/// the per-row E source node.
#[derive(Debug)]
pub struct ShadowMatrix {
    rows: usize,
    cols: usize,
    mtb: Vec<StateType>,
    itb: Vec<StateType>,
    dtb: Vec<StateType>,
    xtb: Vec<StateType>,
    /// Node the E state pulled its max from, per row.
    pub esrc: Vec<usize>,
}

impl ShadowMatrix {
    pub fn new(rows: usize, m: usize) -> Self {
        let cols = m + 2;
        Self {
            rows,
            cols,
            mtb: vec![StateType::Bogus; rows * cols],
            itb: vec![StateType::Bogus; rows * cols],
            dtb: vec![StateType::Bogus; rows * cols],
            xtb: vec![StateType::Bogus; rows * XCOLS],
            esrc: vec![0; rows],
        }
    }

    pub fn m(&self, i: usize, k: usize) -> StateType {
        self.mtb[i * self.cols + k]
    }
    pub fn set_m(&mut self, i: usize, k: usize, s: StateType) {
        self.mtb[i * self.cols + k] = s;
    }
    pub fn i(&self, i: usize, k: usize) -> StateType {
        self.itb[i * self.cols + k]
    }
    pub fn set_i(&mut self, i: usize, k: usize, s: StateType) {
        self.itb[i * self.cols + k] = s;
    }
    pub fn d(&self, i: usize, k: usize) -> StateType {
        self.dtb[i * self.cols + k]
    }
    pub fn set_d(&mut self, i: usize, k: usize, s: StateType) {
        self.dtb[i * self.cols + k] = s;
    }
    pub fn x(&self, i: usize, xi: usize) -> StateType {
        self.xtb[i * XCOLS + xi]
    }
    pub fn set_x(&mut self, i: usize, xi: usize, s: StateType) {
        self.xtb[i * XCOLS + xi] = s;
    }

    pub fn rows(&self) -> usize {
        self.rows
    }
}

/// Build a master trace over alignment columns from a model->column map:
/// mapped columns become M steps, the rest become I steps.
pub fn master_trace_from_map(map: &[usize], m: usize, alen: usize) -> Trace {
    let mut tr = Trace::for_seq(alen);
    tr.push(StateType::S, 0, 0);
    tr.push(StateType::N, 0, 0);
    tr.push(StateType::B, 0, 0);
    let mut k = 0usize;
    for apos in 1..=alen {
        if k < m && map[k + 1] == apos {
            k += 1;
            tr.push(StateType::M, k, apos);
        } else {
            tr.push(StateType::I, k.max(1), apos);
        }
    }
    tr.push(StateType::E, 0, 0);
    tr.push(StateType::C, 0, 0);
    tr.push(StateType::T, 0, 0);
    tr
}

/// Impose a master trace (positions are alignment columns) onto each row of
/// the alignment, producing one per-sequence trace with residue positions.
///
/// A match column with a gap in the row becomes a D; an insert or flank
/// column with a gap contributes nothing.
pub fn impose_master_trace(msa: &Msa, mtr: &Trace) -> Vec<Trace> {
    let mut out = Vec::with_capacity(msa.nseq());
    for row in &msa.rows {
        let mut tr = Trace::new();
        let mut rpos = 0usize;
        for step in mtr.steps() {
            use StateType::*;
            match step.state {
                S | B | E | T => tr.push(step.state, step.node, 0),
                M => {
                    if residue_at(row, step.pos) {
                        rpos += 1;
                        tr.push(M, step.node, rpos);
                    } else {
                        tr.push(D, step.node, 0);
                    }
                }
                D => tr.push(D, step.node, 0),
                I => {
                    if residue_at(row, step.pos) {
                        rpos += 1;
                        tr.push(I, step.node, rpos);
                    }
                }
                N | C | J => {
                    if step.pos == 0 {
                        tr.push(step.state, 0, 0);
                    } else if residue_at(row, step.pos) {
                        rpos += 1;
                        tr.push(step.state, 0, rpos);
                    }
                }
                Bogus => {}
            }
        }
        out.push(tr);
    }
    out
}

fn residue_at(row: &[u8], apos: usize) -> bool {
    apos >= 1 && apos <= row.len() && !core_alphabet::is_gap(row[apos - 1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_alphabet::Alphabet;

    fn scored_model(m: usize) -> (Alphabet, Plan7) {
        let abet = Alphabet::nucleic();
        let mut hmm = Plan7::new(m, &abet).unwrap();
        for k in 1..=m {
            hmm.mat[k] = vec![0.1; 4];
            hmm.mat[k][(k - 1) % 4] = 0.7;
        }
        for k in 1..m {
            hmm.ins[k] = vec![0.25; 4];
            hmm.t[k] = [0.9, 0.05, 0.05, 0.8, 0.2, 0.8, 0.2];
        }
        hmm.config_global();
        hmm.logoddsify(&abet, true);
        (abet, hmm)
    }

    fn global_trace(l: usize) -> Trace {
        // S-N-B-M1..Ml-E-C-T over positions 1..=l
        let mut tr = Trace::new();
        tr.push(StateType::S, 0, 0);
        tr.push(StateType::N, 0, 0);
        tr.push(StateType::B, 0, 0);
        for i in 1..=l {
            tr.push(StateType::M, i, i);
        }
        tr.push(StateType::E, 0, 0);
        tr.push(StateType::C, 0, 0);
        tr.push(StateType::T, 0, 0);
        tr
    }

    #[test]
    fn score_matches_hand_sum() {
        let (abet, hmm) = scored_model(3);
        let dsq = abet.digitize(b"ACG").unwrap();
        let tr = global_trace(3);
        tr.verify(3, 3).unwrap();
        let got = tr.score_scaled(&hmm, dsq.as_slice()).unwrap();
        let want = hmm.xsc[XTN][MOVE]
            + hmm.bsc[1]
            + hmm.msc[0][1]
            + hmm.tsc[TMM][1]
            + hmm.msc[1][2]
            + hmm.tsc[TMM][2]
            + hmm.msc[2][3]
            + hmm.esc[3]
            + hmm.xsc[XTE][MOVE]
            + hmm.xsc[XTC][MOVE];
        assert_eq!(got, want);
    }

    #[test]
    fn illegal_transition_is_reported() {
        let (abet, hmm) = scored_model(3);
        let dsq = abet.digitize(b"ACG").unwrap();
        let mut tr = Trace::new();
        tr.push(StateType::S, 0, 0);
        tr.push(StateType::C, 0, 0); // S->C is not a Plan 7 edge
        tr.push(StateType::T, 0, 0);
        assert!(matches!(
            tr.score_scaled(&hmm, dsq.as_slice()),
            Err(TraceError::IllegalTransition { .. })
        ));
    }

    #[test]
    fn decompose_splits_at_domains() {
        let mut tr = Trace::new();
        tr.push(StateType::S, 0, 0);
        tr.push(StateType::N, 0, 0);
        tr.push(StateType::B, 0, 0);
        tr.push(StateType::M, 1, 1);
        tr.push(StateType::M, 2, 2);
        tr.push(StateType::E, 0, 0);
        tr.push(StateType::J, 0, 0);
        tr.push(StateType::J, 0, 3);
        tr.push(StateType::B, 0, 0);
        tr.push(StateType::M, 1, 4);
        tr.push(StateType::M, 2, 5);
        tr.push(StateType::E, 0, 0);
        tr.push(StateType::C, 0, 0);
        tr.push(StateType::T, 0, 0);
        assert_eq!(tr.domain_count(), 2);
        let doms = tr.decompose();
        assert_eq!(doms.len(), 2);
        for d in &doms {
            assert_eq!(d.get(0).state, StateType::S);
            assert_eq!(d.last().unwrap().state, StateType::T);
            assert_eq!(d.domain_count(), 1);
        }
        assert_eq!(doms[1].simple_bounds(), Some((4, 5, 1, 2)));
    }

    #[test]
    fn bounds_include_wing_deletes_in_model_range() {
        let mut tr = Trace::new();
        tr.push(StateType::S, 0, 0);
        tr.push(StateType::N, 0, 0);
        tr.push(StateType::B, 0, 0);
        tr.push(StateType::D, 1, 0);
        tr.push(StateType::D, 2, 0);
        tr.push(StateType::M, 3, 1);
        tr.push(StateType::E, 0, 0);
        tr.push(StateType::C, 0, 0);
        tr.push(StateType::T, 0, 0);
        assert_eq!(tr.simple_bounds(), Some((1, 1, 1, 3)));
    }

    #[test]
    fn verify_rejects_partial_coverage() {
        let tr = global_trace(3);
        assert!(tr.verify(3, 3).is_ok());
        assert!(tr.verify(3, 4).is_err()); // one position short
        assert!(tr.verify(2, 3).is_err()); // node out of range
    }

    #[test]
    fn reverse_restores_forward_order() {
        let mut tr = global_trace(2);
        tr.reverse();
        assert_eq!(tr.get(0).state, StateType::T);
        tr.reverse();
        assert_eq!(tr.get(0).state, StateType::S);
    }

    #[test]
    fn master_trace_imposition() {
        let msa = Msa::new(
            vec!["one".into(), "two".into()],
            vec![b"ACGT".to_vec(), b"A-GT".to_vec()],
        );
        // map: nodes 1..=3 sit at columns 1, 2, 4; column 3 is an insert
        let map = vec![0usize, 1, 2, 4];
        let mtr = master_trace_from_map(&map, 3, 4);
        mtr.verify(3, 4).unwrap();
        let traces = impose_master_trace(&msa, &mtr);
        // row one: M1 M2 I2 M3 over residues 1..4
        let states: Vec<StateType> = traces[0].steps().iter().map(|s| s.state).collect();
        assert_eq!(
            states,
            vec![
                StateType::S,
                StateType::N,
                StateType::B,
                StateType::M,
                StateType::M,
                StateType::I,
                StateType::M,
                StateType::E,
                StateType::C,
                StateType::T
            ]
        );
        // row two: the gapped match column becomes a delete
        assert_eq!(traces[1].get(4).state, StateType::D);
        assert_eq!(traces[1].get(4).node, 2);
        traces[1].verify(3, 3).unwrap();
    }
}
