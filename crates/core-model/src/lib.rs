//! The Plan 7 profile hidden Markov model.
//!
//! A [`Plan7`] carries both the probability form of the model (emission and
//! transition distributions, entry/exit vectors, special-state transitions)
//! and its integer log-odds mirror used by the DP engines. The probability
//! form is authoritative; [`Plan7::logoddsify`] derives the score form
//! against the null background and must run before any DP.
//!
//! Five alignment shapes are selectable by the `config_*` functions: naked,
//! global, ls (multi-hit glocal), sw (single-hit local), and fs (multi-hit
//! local). Each rewrites the special-state transitions and the entry/exit
//! vectors, then renormalizes the node transitions so probability flow
//! through the exits stays proper.

pub mod score;

use bitflags::bitflags;
use core_alphabet::{Alphabet, AlphabetKind};
use thiserror::Error;

pub use score::{ilogsum, prob2score, score2prob, scorify, INTSCALE, NEG_INF};

/// Node-transition indices into `t[k]` / `tsc`.
pub const TMM: usize = 0;
pub const TMI: usize = 1;
pub const TMD: usize = 2;
pub const TIM: usize = 3;
pub const TII: usize = 4;
pub const TDM: usize = 5;
pub const TDD: usize = 6;

/// Special-state rows of `xt` / `xsc`.
pub const XTN: usize = 0;
pub const XTE: usize = 1;
pub const XTC: usize = 2;
pub const XTJ: usize = 3;

/// Columns of `xt` / `xsc`.
pub const MOVE: usize = 0;
pub const LOOP: usize = 1;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model has no nodes")]
    Empty,
    #[error("model '{0}' has no log-odds scores; call logoddsify first")]
    NoScores(String),
}

bitflags! {
    /// Derived-state markers on a model. Presence of optional data (map,
    /// cutoffs, statistics) is expressed with `Option` fields instead.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModelFlags: u32 {
        /// Log-odds score tables are current.
        const HASBITS  = 1 << 0;
        /// Entry distribution was imposed by a local config.
        const BIMPOSED = 1 << 1;
        /// Exit distribution was imposed by a local config.
        const EIMPOSED = 1 << 2;
    }
}

/// Extreme value distribution location/scale from calibration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvdParams {
    pub mu: f32,
    pub lambda: f32,
}

/// A Plan 7 model of length M.
///
/// Probability vectors are 1-indexed like the DP: index 0 is allocated and
/// unused. Node transitions exist for nodes 1..M-1 (`t`, `ins`); match
/// emissions for 1..M.
#[derive(Debug, Clone)]
pub struct Plan7 {
    pub name: String,
    pub acc: Option<String>,
    pub desc: Option<String>,
    pub comlog: Vec<String>,
    pub ctime: String,
    pub nseq: u32,
    pub checksum: u32,

    pub m: usize,
    pub abet: AlphabetKind,
    asize: usize,
    acode: usize,

    /// Node transitions, `t[k][TMM..=TDD]`, k in 1..M.
    pub t: Vec<[f32; 7]>,
    /// Match emissions, `mat[k][x]`, k in 1..=M.
    pub mat: Vec<Vec<f32>>,
    /// Insert emissions, `ins[k][x]`, k in 1..M.
    pub ins: Vec<Vec<f32>>,
    /// Local entry, B->Mk.
    pub begin: Vec<f32>,
    /// Local exit, Mk->E.
    pub end: Vec<f32>,
    /// Special-state transitions, `xt[XTN..=XTJ][MOVE|LOOP]`.
    pub xt: [[f32; 2]; 4],

    /// Null model emission frequencies.
    pub null: Vec<f32>,
    /// Null model extension probability.
    pub p1: f32,

    pub rf: Option<Vec<u8>>,
    pub cs: Option<Vec<u8>>,
    /// Map from node to training-alignment column.
    pub map: Option<Vec<usize>>,
    pub ga: Option<(f32, f32)>,
    pub tc: Option<(f32, f32)>,
    pub nc: Option<(f32, f32)>,
    pub evd: Option<EvdParams>,
    pub flags: ModelFlags,

    /// Integer transition scores, `tsc[ttype][k]`; `tsc[*][0]` stays -inf.
    pub tsc: [Vec<i32>; 7],
    /// Match emission scores by symbol code, `msc[x][k]`; the last code row
    /// is the boundary sentinel and stays -inf.
    pub msc: Vec<Vec<i32>>,
    /// Insert emission scores by symbol code, `isc[x][k]`.
    pub isc: Vec<Vec<i32>>,
    pub bsc: Vec<i32>,
    pub esc: Vec<i32>,
    pub xsc: [[i32; 2]; 4],
}

impl Plan7 {
    pub fn new(m: usize, abet: &Alphabet) -> Result<Self, ModelError> {
        if m == 0 {
            return Err(ModelError::Empty);
        }
        let asize = abet.size();
        let acode = abet.code_range();
        let mut hmm = Self {
            name: String::new(),
            acc: None,
            desc: None,
            comlog: Vec::new(),
            ctime: String::new(),
            nseq: 0,
            checksum: 0,
            m,
            abet: abet.kind(),
            asize,
            acode,
            t: vec![[0.0; 7]; m],
            mat: vec![vec![0.0; asize]; m + 1],
            ins: vec![vec![0.0; asize]; m],
            begin: vec![0.0; m + 1],
            end: vec![0.0; m + 1],
            xt: [[0.0; 2]; 4],
            null: vec![0.0; asize],
            p1: 0.0,
            rf: None,
            cs: None,
            map: None,
            ga: None,
            tc: None,
            nc: None,
            evd: None,
            flags: ModelFlags::empty(),
            tsc: std::array::from_fn(|_| vec![NEG_INF; m]),
            msc: vec![vec![NEG_INF; m + 1]; acode],
            isc: vec![vec![NEG_INF; m]; acode],
            bsc: vec![NEG_INF; m + 1],
            esc: vec![NEG_INF; m + 1],
            xsc: [[NEG_INF; 2]; 4],
        };
        hmm.set_default_null(abet);
        Ok(hmm)
    }

    pub fn asize(&self) -> usize {
        self.asize
    }

    pub fn acode(&self) -> usize {
        self.acode
    }

    pub fn has_bits(&self) -> bool {
        self.flags.contains(ModelFlags::HASBITS)
    }

    /// Install the standard single-parameter null model for the alphabet:
    /// flat for nucleic, database composition for amino.
    pub fn set_default_null(&mut self, abet: &Alphabet) {
        match abet.kind() {
            AlphabetKind::Nucleic => {
                self.null = vec![0.25; 4];
                self.p1 = 1000.0 / 1001.0;
            }
            AlphabetKind::Amino => {
                self.null = AMINO_NULL.to_vec();
                self.p1 = 350.0 / 351.0;
            }
        }
    }

    pub fn set_null_model(&mut self, null: Vec<f32>, p1: f32) {
        self.null = null;
        self.p1 = p1;
        self.flags.remove(ModelFlags::HASBITS);
    }

    /// Fill every integer score table from the probability form. With
    /// `viterbi_mode` set, insert emission scores are forced to zero so
    /// inserts emit null-equivalently (historical Viterbi scoring).
    pub fn logoddsify(&mut self, abet: &Alphabet, viterbi_mode: bool) {
        let m = self.m;
        let p1 = self.p1;

        for k in 1..m {
            self.tsc[TMM][k] = prob2score(self.t[k][TMM], p1);
            self.tsc[TMI][k] = prob2score(self.t[k][TMI], p1);
            self.tsc[TMD][k] = prob2score(self.t[k][TMD], 1.0);
            self.tsc[TIM][k] = prob2score(self.t[k][TIM], p1);
            self.tsc[TII][k] = prob2score(self.t[k][TII], p1);
            self.tsc[TDM][k] = prob2score(self.t[k][TDM], p1);
            self.tsc[TDD][k] = prob2score(self.t[k][TDD], 1.0);
        }
        for x in 0..7 {
            self.tsc[x][0] = NEG_INF; // no node 0
        }

        for k in 1..=m {
            for x in 0..self.asize {
                self.msc[x][k] = prob2score(self.mat[k][x], self.null[x]);
            }
            for x in self.asize..abet.iupac_size() {
                self.msc[x][k] =
                    degenerate_symbol_score(abet, &self.mat[k], &self.null, x as u8);
            }
        }
        for k in 1..m {
            for x in 0..self.asize {
                self.isc[x][k] = if viterbi_mode {
                    0
                } else {
                    prob2score(self.ins[k][x], self.null[x])
                };
            }
            for x in self.asize..abet.iupac_size() {
                self.isc[x][k] = if viterbi_mode {
                    0
                } else {
                    degenerate_symbol_score(abet, &self.ins[k], &self.null, x as u8)
                };
            }
        }
        // the sentinel code row never scores
        let sentinel = abet.sentinel() as usize;
        for k in 0..=m {
            self.msc[sentinel][k] = NEG_INF;
        }
        for k in 0..m {
            self.isc[sentinel][k] = NEG_INF;
        }

        self.xsc[XTN][LOOP] = prob2score(self.xt[XTN][LOOP], p1);
        self.xsc[XTN][MOVE] = prob2score(self.xt[XTN][MOVE], 1.0);
        self.xsc[XTE][LOOP] = prob2score(self.xt[XTE][LOOP], 1.0);
        self.xsc[XTE][MOVE] = prob2score(self.xt[XTE][MOVE], 1.0);
        self.xsc[XTC][LOOP] = prob2score(self.xt[XTC][LOOP], p1);
        self.xsc[XTC][MOVE] = prob2score(self.xt[XTC][MOVE], 1.0 - p1);
        self.xsc[XTJ][LOOP] = prob2score(self.xt[XTJ][LOOP], p1);
        self.xsc[XTJ][MOVE] = prob2score(self.xt[XTJ][MOVE], 1.0);

        self.bsc[0] = NEG_INF;
        self.esc[0] = NEG_INF;
        for k in 1..=m {
            self.bsc[k] = prob2score(self.begin[k], p1);
            self.esc[k] = prob2score(self.end[k], 1.0);
        }

        self.flags.insert(ModelFlags::HASBITS);
    }

    /// Normalize every distribution in the probability form.
    pub fn renormalize(&mut self) {
        for k in 1..=self.m {
            normalize(&mut self.mat[k]);
        }
        for k in 1..self.m {
            normalize(&mut self.ins[k]);
            normalize(&mut self.t[k][TMM..=TMD]);
            normalize(&mut self.t[k][TIM..=TII]);
            normalize(&mut self.t[k][TDM..=TDD]);
        }
        let d: f32 = self.begin[1..].iter().sum();
        if d > 0.0 {
            for b in &mut self.begin[1..] {
                *b /= d;
            }
        }
        for row in &mut self.xt {
            normalize(row);
        }
        self.flags.remove(ModelFlags::HASBITS);
    }

    /// Scale the match-transition group at each node so that
    /// `end[k] + sum(t[k][TMM..=TMD])` is a proper distribution.
    pub fn renormalize_exits(&mut self) {
        for k in 1..self.m {
            let d: f32 = self.t[k][TMM..=TMD].iter().sum();
            if d > 0.0 && self.end[k] < 1.0 {
                let scale = 1.0 / (d + d * self.end[k] / (1.0 - self.end[k]));
                for v in &mut self.t[k][TMM..=TMD] {
                    *v *= scale;
                }
            }
        }
    }

    /// No N/C tails, no local entry: a bare model-only alignment shape.
    pub fn config_naked(&mut self) {
        self.xt[XTN] = [1.0, 0.0];
        self.xt[XTE] = [1.0, 0.0];
        self.xt[XTC] = [1.0, 0.0];
        self.xt[XTJ] = [0.0, 1.0]; // J unreachable
        self.impose_unihit_entry_exit();
        self.flags.remove(ModelFlags::BIMPOSED | ModelFlags::EIMPOSED);
    }

    /// Global with respect to the model: must enter at M1, exit at MM; N and
    /// C tails absorb flanking sequence.
    pub fn config_global(&mut self) {
        self.xt[XTN] = [1.0 - self.p1, self.p1];
        self.xt[XTE] = [1.0, 0.0];
        self.xt[XTC] = [1.0 - self.p1, self.p1];
        self.xt[XTJ] = [1.0 - self.p1, self.p1]; // unused: E never loops
        self.impose_unihit_entry_exit();
        self.flags.remove(ModelFlags::BIMPOSED | ModelFlags::EIMPOSED);
    }

    /// Multi-hit glocal (the classic `ls` shape): global in the model,
    /// local in the sequence, J-loop reentry allowed.
    pub fn config_ls(&mut self) {
        self.xt[XTN] = [1.0 - self.p1, self.p1];
        self.xt[XTE] = [0.5, 0.5];
        self.xt[XTC] = [1.0 - self.p1, self.p1];
        self.xt[XTJ] = [1.0 - self.p1, self.p1];
        self.impose_unihit_entry_exit();
        self.flags.remove(ModelFlags::BIMPOSED | ModelFlags::EIMPOSED);
    }

    /// Single-hit local (Smith/Waterman-style): one domain, local
    /// entry/exit distributed over the nodes.
    pub fn config_sw(&mut self, pentry: f32, pexit: f32) {
        self.xt[XTN] = [1.0 - self.p1, self.p1];
        self.xt[XTE] = [1.0, 0.0];
        self.xt[XTC] = [1.0 - self.p1, self.p1];
        self.xt[XTJ] = [1.0 - self.p1, self.p1]; // unused
        self.impose_local_entry_exit(pentry, pexit);
    }

    /// Multi-hit local (the `fs` shape): local entry/exit with J-loop
    /// reentry between domains.
    pub fn config_fs(&mut self, pentry: f32, pexit: f32) {
        self.xt[XTN] = [1.0 - self.p1, self.p1];
        self.xt[XTE] = [0.5, 0.5];
        self.xt[XTC] = [1.0 - self.p1, self.p1];
        self.xt[XTJ] = [1.0 - self.p1, self.p1];
        self.impose_local_entry_exit(pentry, pexit);
    }

    fn impose_unihit_entry_exit(&mut self) {
        self.begin[1..].fill(0.0);
        self.begin[1] = 1.0;
        self.end[1..].fill(0.0);
        self.end[self.m] = 1.0;
        self.renormalize_exits();
        self.flags.remove(ModelFlags::HASBITS);
    }

    fn impose_local_entry_exit(&mut self, pentry: f32, pexit: f32) {
        let m = self.m;
        self.begin[1] = 1.0 - pentry;
        if m > 1 {
            self.begin[2..=m].fill(pentry / (m - 1) as f32);
        }
        self.end[m] = 1.0;
        if m > 1 {
            // conditional exits chosen so the marginal exit is flat over k
            let basep = pexit / (m - 1) as f32;
            for k in 1..m {
                self.end[k] = basep / (1.0 - basep * (k - 1) as f32);
            }
        }
        self.renormalize_exits();
        self.flags.remove(ModelFlags::HASBITS);
        self.flags.insert(ModelFlags::BIMPOSED | ModelFlags::EIMPOSED);
    }

    /// P-value of a bit score against this model. Uses the calibrated EVD
    /// when present, always bounded by the conservative `1/(1+2^sc)` tail.
    pub fn pvalue(&self, sc: f32) -> f64 {
        let mut p = match self.evd {
            Some(EvdParams { mu, lambda }) => extreme_value_p(sc, mu, lambda),
            None => 1.0,
        };
        let bound = 1.0 / (1.0 + (sc as f64).exp2());
        if p > bound {
            p = bound;
        }
        p.min(1.0)
    }

    /// The consensus (highest-probability) match symbol at node k.
    pub fn consensus_symbol(&self, k: usize) -> u8 {
        let mut best = 0usize;
        for x in 1..self.asize {
            if self.mat[k][x] > self.mat[k][best] {
                best = x;
            }
        }
        best as u8
    }
}

/// Survival function of the extreme value distribution,
/// `P(S >= x) = 1 - exp(-exp(-lambda (x - mu)))`, with the usual tail
/// approximation where the double exponential underflows.
fn extreme_value_p(x: f32, mu: f32, lambda: f32) -> f64 {
    let y = (lambda * (x - mu)) as f64;
    if y < -700.0 {
        1.0
    } else if y > 50.0 {
        (-y).exp()
    } else {
        1.0 - (-(-y).exp()).exp()
    }
}

/// Log-odds score of a degeneracy code: total probability mass of the
/// covered symbols against the matching null mass.
pub fn degenerate_symbol_score(abet: &Alphabet, p: &[f32], null: &[f32], code: u8) -> i32 {
    let cover = abet.degeneracy(code);
    let n = abet.degen_count(code) as f32;
    let mut numer = 0.0f32;
    let mut denom = 0.0f32;
    for (x, covered) in cover.iter().enumerate() {
        if *covered {
            numer += p[x];
            denom += null[x];
        }
    }
    if denom == 0.0 {
        NEG_INF
    } else {
        prob2score(numer / n, denom / n)
    }
}

fn normalize(v: &mut [f32]) {
    let d: f32 = v.iter().sum();
    if d > 0.0 {
        for x in v {
            *x /= d;
        }
    }
}

/// Amino null frequencies (database composition).
const AMINO_NULL: [f32; 20] = [
    0.075520, 0.016973, 0.053029, 0.063204, 0.040762, 0.068448, 0.022406, 0.057284, 0.059398,
    0.093399, 0.023569, 0.045293, 0.049262, 0.040231, 0.051573, 0.072209, 0.057454, 0.065287,
    0.012513, 0.031985,
];

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_model(m: usize) -> (Alphabet, Plan7) {
        let abet = Alphabet::nucleic();
        let mut hmm = Plan7::new(m, &abet).unwrap();
        hmm.name = "toy".into();
        for k in 1..=m {
            hmm.mat[k] = vec![0.25; 4];
            hmm.mat[k][(k - 1) % 4] = 0.7;
            normalize(&mut hmm.mat[k]);
        }
        for k in 1..m {
            hmm.ins[k] = vec![0.25; 4];
            hmm.t[k] = [0.8, 0.1, 0.1, 0.8, 0.2, 0.8, 0.2];
        }
        (abet, hmm)
    }

    #[test]
    fn logoddsify_sets_boundary_scores() {
        let (abet, mut hmm) = toy_model(5);
        hmm.config_ls();
        hmm.logoddsify(&abet, true);
        assert!(hmm.has_bits());
        for x in 0..7 {
            assert_eq!(hmm.tsc[x][0], NEG_INF);
        }
        let sent = abet.sentinel() as usize;
        for k in 0..=5 {
            assert_eq!(hmm.msc[sent][k], NEG_INF);
        }
        // viterbi mode zeroes canonical insert scores
        for k in 1..5 {
            for x in 0..4 {
                assert_eq!(hmm.isc[x][k], 0);
            }
        }
        assert_eq!(hmm.bsc[0], NEG_INF);
        assert_eq!(hmm.esc[5], 0); // end[M] = 1 scores as 0
    }

    #[test]
    fn forward_mode_keeps_insert_scores() {
        let (abet, mut hmm) = toy_model(4);
        hmm.config_ls();
        hmm.logoddsify(&abet, false);
        // flat inserts over a flat null score zero anyway; skew one
        hmm.ins[2] = vec![0.7, 0.1, 0.1, 0.1];
        hmm.logoddsify(&abet, false);
        assert!(hmm.isc[0][2] > 0);
        assert!(hmm.isc[1][2] < 0);
    }

    #[test]
    fn ls_config_transition_groups_stay_normalized() {
        let (_, mut hmm) = toy_model(6);
        hmm.config_ls();
        for k in 1..6 {
            let mm: f32 = hmm.t[k][TMM..=TMD].iter().sum();
            let im: f32 = hmm.t[k][TIM..=TII].iter().sum();
            let dm: f32 = hmm.t[k][TDM..=TDD].iter().sum();
            let with_exit = mm + hmm.end[k];
            assert!((with_exit - 1.0).abs() < 1e-5, "k={k} sum={with_exit}");
            assert!((im - 1.0).abs() < 1e-5);
            assert!((dm - 1.0).abs() < 1e-5);
        }
        assert_eq!(hmm.begin[1], 1.0);
        assert_eq!(hmm.end[6], 1.0);
    }

    #[test]
    fn sw_exit_marginal_is_flat() {
        let (_, mut hmm) = toy_model(6);
        hmm.config_sw(0.5, 1.0);
        // with pexit = 1, marginal exit at each node should be ~1/(M-1)
        // conditioned on reaching it: end[k] = 1/(M-k)
        for k in 1..6 {
            assert!((hmm.end[k] - 1.0 / (6 - k) as f32).abs() < 1e-5, "k={k}");
        }
        let entry: f32 = hmm.begin[1..].iter().sum();
        assert!((entry - 1.0).abs() < 1e-5);
        assert!(hmm.flags.contains(ModelFlags::BIMPOSED));
    }

    #[test]
    fn pvalue_is_bounded_and_monotonic_in_score() {
        let (abet, mut hmm) = toy_model(4);
        hmm.logoddsify(&abet, true);
        let p_low = hmm.pvalue(-5.0);
        let p_mid = hmm.pvalue(10.0);
        let p_high = hmm.pvalue(50.0);
        assert!(p_low <= 1.0 && p_low > p_mid && p_mid > p_high);
        // with EVD stats the bound still caps the tail
        hmm.evd = Some(EvdParams {
            mu: -30.0,
            lambda: 0.7,
        });
        let p = hmm.pvalue(20.0);
        assert!(p <= 1.0 / (1.0 + (20.0f64).exp2()) + 1e-12);
    }

    #[test]
    fn consensus_symbol_tracks_peak_emission() {
        let (_, hmm) = toy_model(4);
        assert_eq!(hmm.consensus_symbol(1), 0);
        assert_eq!(hmm.consensus_symbol(2), 1);
    }

    #[test]
    fn degenerate_score_averages_coverage() {
        let abet = Alphabet::nucleic();
        let p = vec![0.7, 0.1, 0.1, 0.1];
        let null = vec![0.25; 4];
        let r = abet.symbol_index(b'R'); // A|G
        let sc = degenerate_symbol_score(&abet, &p, &null, r);
        // mass 0.8/2 vs 0.5/2: log2(1.6) bits
        assert_eq!(sc, prob2score(0.4, 0.25));
        assert!(sc > 0);
    }
}
