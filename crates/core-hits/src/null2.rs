//! The ad-hoc second null model ("null2").
//!
//! A trace-dependent correction: build a position-independent null from the
//! average emission profile of the match and insert states the trace
//! visits, rescore the trace's emitted residues against it, and subtract a
//! 1/256 prior. The result is subtracted from the raw bit score, damping
//! biased-composition hits.

use core_alphabet::Alphabet;
use core_model::{degenerate_symbol_score, ilogsum, prob2score, scorify, Plan7, INTSCALE};
use core_trace::{StateType, Trace};

pub fn trace_score_correction(
    hmm: &Plan7,
    tr: &Trace,
    dsq: &[u8],
    abet: &Alphabet,
) -> f32 {
    let asize = abet.size();

    // Average emission distribution over the visited M/I states.
    let mut p = vec![0.0f32; asize];
    for step in tr.steps() {
        match step.state {
            StateType::M => {
                for x in 0..asize {
                    p[x] += hmm.mat[step.node][x];
                }
            }
            StateType::I => {
                for x in 0..asize {
                    p[x] += hmm.ins[step.node][x];
                }
            }
            _ => {}
        }
    }
    let d: f32 = p.iter().sum();
    if d <= 0.0 {
        return 0.0; // no emitting model states in the trace
    }
    for v in &mut p {
        *v /= d;
    }

    let mut sc = vec![0i32; abet.iupac_size()];
    for (x, slot) in sc.iter_mut().enumerate().take(asize) {
        *slot = prob2score(p[x], hmm.null[x]);
    }
    for x in asize..abet.iupac_size() {
        sc[x] = degenerate_symbol_score(abet, &p, &hmm.null, x as u8);
    }

    // Rescore the emitted residues under the second null.
    let mut score = 0i32;
    for step in tr.steps() {
        if matches!(step.state, StateType::M | StateType::I) {
            score = score.saturating_add(sc[dsq[step.pos] as usize]);
        }
    }

    // 1/256 prior on the second null versus the standard one.
    score -= 8 * INTSCALE;

    scorify(ilogsum(0, score))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn biased_setup() -> (Alphabet, Plan7, Trace) {
        let abet = Alphabet::nucleic();
        let mut hmm = Plan7::new(3, &abet).unwrap();
        hmm.name = "biased".into();
        for k in 1..=3 {
            hmm.mat[k] = vec![0.85, 0.05, 0.05, 0.05]; // strongly A-biased
        }
        for k in 1..3 {
            hmm.ins[k] = vec![0.25; 4];
            hmm.t[k] = [0.9, 0.05, 0.05, 0.9, 0.1, 0.9, 0.1];
        }
        hmm.config_sw(0.5, 0.01);
        hmm.logoddsify(&abet, true);

        let mut tr = Trace::new();
        tr.push(StateType::S, 0, 0);
        tr.push(StateType::N, 0, 0);
        tr.push(StateType::B, 0, 0);
        for i in 1..=3 {
            tr.push(StateType::M, i, i);
        }
        tr.push(StateType::E, 0, 0);
        tr.push(StateType::C, 0, 0);
        tr.push(StateType::T, 0, 0);
        (abet, hmm, tr)
    }

    #[test]
    fn biased_composition_gets_a_positive_correction() {
        let (abet, hmm, tr) = biased_setup();
        let dsq = abet.digitize(b"AAA").unwrap();
        let corr = trace_score_correction(&hmm, &tr, dsq.as_slice(), &abet);
        // an all-A hit to an A-biased model is partly explained by null2
        assert!(corr > 0.0, "correction {corr}");
    }

    #[test]
    fn unbiased_composition_is_barely_corrected() {
        let (abet, hmm, tr) = biased_setup();
        // residues the second null does not favor
        let dsq = abet.digitize(b"CGT").unwrap();
        let corr = trace_score_correction(&hmm, &tr, dsq.as_slice(), &abet);
        // ilogsum(0, very negative) stays near zero from above
        assert!((0.0..0.1).contains(&corr), "correction {corr}");
    }

    #[test]
    fn correction_never_goes_below_zero() {
        let (abet, hmm, tr) = biased_setup();
        for seq in [&b"ACG"[..], b"TTT", b"ANR"] {
            let dsq = abet.digitize(seq).unwrap();
            let corr = trace_score_correction(&hmm, &tr, dsq.as_slice(), &abet);
            assert!(corr >= 0.0);
        }
    }
}
