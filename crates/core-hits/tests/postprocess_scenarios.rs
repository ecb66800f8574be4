//! End-to-end postprocessing scenarios driven by real DP traces.

use core_alphabet::Alphabet;
use core_dp::{forward, parsing_viterbi, viterbi};
use core_hits::{
    postprocess_significant_hit, Autocut, ScanMode, Thresholds, TopHits,
};
use core_matrix::DpMatrix;
use core_model::Plan7;

fn island_model(abet: &Alphabet, consensus: &[u8]) -> Plan7 {
    let m = consensus.len();
    let mut hmm = Plan7::new(m, abet).unwrap();
    hmm.name = "island".into();
    for (k, &c) in consensus.iter().enumerate() {
        let k = k + 1;
        hmm.mat[k] = vec![0.05 / 3.0; 4];
        hmm.mat[k][abet.symbol_index(c) as usize] = 0.95;
    }
    for k in 1..m {
        hmm.ins[k] = vec![0.25; 4];
        hmm.t[k] = [0.9, 0.05, 0.05, 0.9, 0.1, 0.9, 0.1];
    }
    hmm
}

/// Two strong islands separated by 50 background positions.
fn two_hit_setup() -> (Alphabet, Plan7, Vec<u8>) {
    let abet = Alphabet::nucleic();
    let mut hmm = island_model(&abet, b"ACGTACGT");
    hmm.config_fs(0.5, 0.01);
    hmm.logoddsify(&abet, true);
    let mut seq = b"ACGTACGT".to_vec();
    seq.extend(std::iter::repeat_n(b'T', 50));
    seq.extend_from_slice(b"ACGTACGT");
    (abet, hmm, seq)
}

#[test]
fn two_hit_multidomain_reports_both_domains() {
    let (abet, hmm, seq) = two_hit_setup();
    let l = seq.len();
    let dsq = abet.digitize(&seq).unwrap();

    // the parse itself finds two (B, E) pairs
    let (_, ctr) = parsing_viterbi(dsq.as_slice(), l, &hmm).unwrap();
    assert_eq!(ctr.expect("parse exists").domain_count(), 2);

    let mut mx = DpMatrix::new(64, 16, 16, 4);
    let (sc, tr) = viterbi(dsq.as_slice(), l, &hmm, &mut mx, true).unwrap();
    let tr = tr.expect("alignment exists");

    let mut ghit = TopHits::new();
    let mut dhit = TopHits::new();
    let thresh = Thresholds::default();
    let whole = postprocess_significant_hit(
        &mut ghit,
        &mut dhit,
        Some(&tr),
        &hmm,
        &abet,
        dsq.as_slice(),
        l,
        "twohit",
        None,
        None,
        false,
        sc,
        false,
        &thresh,
        ScanMode::ModelAgainstSeqs,
    )
    .unwrap();

    assert_eq!(dhit.len(), 2);
    assert_eq!(ghit.len(), 1);
    // whole-sequence score is the sum of the kept domain scores
    let sum: f32 = dhit.iter().map(|h| h.score).sum();
    assert!((whole - sum).abs() < 1e-4);
    assert_eq!(ghit.get(0).ndom, 2);

    dhit.full_sort();
    let first = dhit.iter().find(|h| h.sqfrom == 1).expect("left island");
    assert_eq!(first.sqto, 8);
    let second = dhit.iter().find(|h| h.sqfrom == 59).expect("right island");
    assert_eq!(second.sqto, 66);
    for h in dhit.iter() {
        assert!(h.score > 0.0);
        assert!(h.ali.is_some());
        assert_eq!(h.ndom, 2);
    }
}

#[test]
fn forward_override_replaces_whole_sequence_score_only() {
    let (abet, hmm, seq) = two_hit_setup();
    let l = seq.len();
    let dsq = abet.digitize(&seq).unwrap();

    let mut mx = DpMatrix::new(64, 16, 16, 4);
    let (sc_vit, tr) = viterbi(dsq.as_slice(), l, &hmm, &mut mx, true).unwrap();
    let tr = tr.expect("alignment exists");
    let sc_fwd = forward(dsq.as_slice(), l, &hmm).unwrap();
    assert!(sc_fwd > sc_vit);

    let run = |do_forward: bool, override_sc: f32| {
        let mut ghit = TopHits::new();
        let mut dhit = TopHits::new();
        let whole = postprocess_significant_hit(
            &mut ghit,
            &mut dhit,
            Some(&tr),
            &hmm,
            &abet,
            dsq.as_slice(),
            l,
            "twohit",
            None,
            None,
            do_forward,
            override_sc,
            false,
            &Thresholds::default(),
            ScanMode::ModelAgainstSeqs,
        )
        .unwrap();
        let dscores: Vec<f32> = dhit.iter().map(|h| h.score).collect();
        (whole, dscores)
    };

    let (whole_v, doms_v) = run(false, sc_vit);
    let (whole_f, doms_f) = run(true, sc_fwd);
    assert!(whole_f > whole_v);
    assert_eq!(whole_f, sc_fwd);
    // domain scores stay trace-derived
    assert_eq!(doms_v, doms_f);
}

#[test]
fn ga_autocut_gates_domains_and_keeps_whole_sequence() {
    let abet = Alphabet::nucleic();
    let mut hmm = island_model(&abet, b"ACGTACGT");
    hmm.config_fs(0.5, 0.01);
    hmm.logoddsify(&abet, true);

    // strong left island, weakened right island (one masked position)
    let mut seq = b"ACGTACGT".to_vec();
    seq.extend(std::iter::repeat_n(b'T', 50));
    seq.extend_from_slice(b"ACGTACGN");
    let l = seq.len();
    let dsq = abet.digitize(&seq).unwrap();

    let mut mx = DpMatrix::new(64, 16, 16, 4);
    let (sc, tr) = viterbi(dsq.as_slice(), l, &hmm, &mut mx, true).unwrap();
    let tr = tr.expect("alignment exists");

    // learn the two domain scores, then set GA between them
    let doms = tr.decompose();
    assert_eq!(doms.len(), 2);
    let mut scores: Vec<f32> = doms
        .iter()
        .map(|d| d.score(&hmm, dsq.as_slice()).unwrap())
        .collect();
    scores.sort_by(f32::total_cmp);
    let (weak, strong) = (scores[0], scores[1]);
    assert!(weak > 0.0 && strong > weak);

    hmm.ga = Some((weak + strong - 1.0, (weak + strong) / 2.0));
    let mut thresh = Thresholds {
        autocut: Autocut::Ga,
        ..Thresholds::default()
    };
    thresh.set_autocuts(&hmm).unwrap();

    let mut ghit = TopHits::new();
    let mut dhit = TopHits::new();
    let whole = postprocess_significant_hit(
        &mut ghit,
        &mut dhit,
        Some(&tr),
        &hmm,
        &abet,
        dsq.as_slice(),
        l,
        "gated",
        None,
        None,
        false,
        sc,
        false,
        &thresh,
        ScanMode::ModelAgainstSeqs,
    )
    .unwrap();

    // only the strong domain clears domT; the whole sequence clears globT
    assert_eq!(dhit.len(), 1);
    assert!((dhit.get(0).score - strong).abs() < 1e-4);
    assert_eq!(ghit.len(), 1);
    assert!(whole >= thresh.glob_t);
}

#[test]
fn weak_single_domain_rule_reports_one_negative_domain() {
    let abet = Alphabet::nucleic();
    let mut hmm = island_model(&abet, b"AAAAAA");
    hmm.config_sw(0.5, 0.01);
    hmm.logoddsify(&abet, true);

    // nothing here matches the model well
    let dsq = abet.digitize(b"TTTTTT").unwrap();
    let mut mx = DpMatrix::new(16, 8, 4, 4);
    let (sc, tr) = viterbi(dsq.as_slice(), 6, &hmm, &mut mx, true).unwrap();
    let tr = tr.expect("alignment exists");
    assert!(sc < 0.0);

    let mut ghit = TopHits::new();
    let mut dhit = TopHits::new();
    let whole = postprocess_significant_hit(
        &mut ghit,
        &mut dhit,
        Some(&tr),
        &hmm,
        &abet,
        dsq.as_slice(),
        6,
        "weak",
        None,
        None,
        false,
        sc,
        false,
        &Thresholds::default(),
        ScanMode::ModelAgainstSeqs,
    )
    .unwrap();

    assert_eq!(dhit.len(), 1);
    assert!(dhit.get(0).score < 0.0);
    assert_eq!(whole, dhit.get(0).score);
    // default globT is -infinity, so even a weak hit registers
    assert_eq!(ghit.len(), 1);
}

#[test]
fn null_trace_returns_override_and_registers_nothing() {
    let abet = Alphabet::nucleic();
    let mut hmm = island_model(&abet, b"ACG");
    hmm.config_sw(0.5, 0.01);
    hmm.logoddsify(&abet, true);
    let dsq = abet.digitize(b"ACG").unwrap();

    let mut ghit = TopHits::new();
    let mut dhit = TopHits::new();
    let whole = postprocess_significant_hit(
        &mut ghit,
        &mut dhit,
        None,
        &hmm,
        &abet,
        dsq.as_slice(),
        3,
        "nothing",
        None,
        None,
        false,
        -12.5,
        true,
        &Thresholds::default(),
        ScanMode::SeqAgainstModels,
    )
    .unwrap();
    assert_eq!(whole, -12.5);
    assert!(ghit.is_empty() && dhit.is_empty());
}
