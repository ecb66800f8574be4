//! Throughput of the DP inner loops on a mid-sized model.

use core_alphabet::Alphabet;
use core_dp::{forward, parsing_viterbi, viterbi};
use core_matrix::DpMatrix;
use core_model::Plan7;
use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

fn bench_model(abet: &Alphabet, m: usize) -> Plan7 {
    let mut hmm = Plan7::new(m, abet).unwrap();
    hmm.name = "bench".into();
    for k in 1..=m {
        hmm.mat[k] = vec![0.05; abet.size()];
        hmm.mat[k][k % abet.size()] = 0.6;
    }
    for k in 1..m {
        hmm.ins[k] = vec![1.0 / abet.size() as f32; abet.size()];
        hmm.t[k] = [0.85, 0.08, 0.07, 0.85, 0.15, 0.85, 0.15];
    }
    hmm.renormalize();
    hmm.config_fs(0.5, 0.01);
    hmm.logoddsify(abet, true);
    hmm
}

fn dp_benches(c: &mut Criterion) {
    let abet = Alphabet::amino();
    let hmm = bench_model(&abet, 120);
    let seq: Vec<u8> = (0..800)
        .map(|i| b"ACDEFGHIKLMNPQRSTVWY"[(i * 13 + i / 7) % 20])
        .collect();
    let dsq = abet.digitize(&seq).unwrap();
    let l = dsq.len();

    let mut mx = DpMatrix::new(l, hmm.m, 0, 0);
    c.bench_function("viterbi_800x120", |b| {
        b.iter(|| {
            let (sc, _) =
                viterbi(black_box(dsq.as_slice()), l, &hmm, &mut mx, false).unwrap();
            black_box(sc)
        })
    });

    c.bench_function("parsing_viterbi_800x120", |b| {
        b.iter(|| {
            let (sc, _) = parsing_viterbi(black_box(dsq.as_slice()), l, &hmm).unwrap();
            black_box(sc)
        })
    });

    c.bench_function("forward_800x120", |b| {
        b.iter(|| black_box(forward(black_box(dsq.as_slice()), l, &hmm).unwrap()))
    });
}

criterion_group!(benches, dp_benches);
criterion_main!(benches);
