//! Shared model builders for the DP test suites.
#![allow(dead_code)]

use core_alphabet::Alphabet;
use core_model::Plan7;

/// Deterministic xorshift stream of probabilities in (0, 1]; keeps every
/// distribution entry positive so all paths stay finite.
pub fn prob_stream(seed: u64) -> impl FnMut() -> f32 {
    let mut state = seed | 1;
    move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        ((state % 1000) as f32 + 1.0) / 1001.0
    }
}

/// A random but well-formed model: positive emissions and transitions,
/// renormalized, configured per `cfg`, scored in Viterbi mode.
pub fn random_model(abet: &Alphabet, m: usize, cfg: u8, seed: u64) -> Plan7 {
    let mut next = prob_stream(seed);
    let mut hmm = Plan7::new(m, abet).expect("m >= 1");
    hmm.name = format!("rnd-m{m}-c{cfg}");
    for k in 1..=m {
        for x in 0..abet.size() {
            hmm.mat[k][x] = next();
        }
    }
    for k in 1..m {
        for x in 0..abet.size() {
            hmm.ins[k][x] = next();
        }
        for t in 0..7 {
            hmm.t[k][t] = next();
        }
    }
    hmm.renormalize();
    match cfg % 4 {
        0 => hmm.config_global(),
        1 => hmm.config_ls(),
        2 => hmm.config_sw(0.5, 0.01),
        _ => hmm.config_fs(0.5, 0.01),
    }
    hmm.logoddsify(abet, true);
    hmm
}

/// A model with a strong consensus sequence: each node prefers one symbol
/// heavily, transitions favor match-match.
pub fn consensus_model(abet: &Alphabet, consensus: &[u8]) -> Plan7 {
    let m = consensus.len();
    let mut hmm = Plan7::new(m, abet).expect("m >= 1");
    hmm.name = "consensus".into();
    for (k, &c) in consensus.iter().enumerate() {
        let k = k + 1;
        hmm.mat[k] = vec![0.02; abet.size()];
        hmm.mat[k][abet.symbol_index(c) as usize] = 1.0;
        let d: f32 = hmm.mat[k].iter().sum();
        for v in &mut hmm.mat[k] {
            *v /= d;
        }
    }
    for k in 1..m {
        hmm.ins[k] = vec![1.0 / abet.size() as f32; abet.size()];
        hmm.t[k] = [0.9, 0.05, 0.05, 0.9, 0.1, 0.9, 0.1];
    }
    hmm
}
