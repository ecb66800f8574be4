//! Write/read identity on both save formats.

use core_alphabet::{Alphabet, AlphabetKind};
use core_hmmio::{
    gcg_checksum, read_ascii, write_ascii, write_binary, HmmFile, HmmIoError,
};
use core_model::{EvdParams, Plan7};
use std::io::{Cursor, Write};

fn sample_model(abet: &Alphabet) -> Plan7 {
    let m = 5;
    let mut hmm = Plan7::new(m, abet).unwrap();
    hmm.name = "sample".into();
    hmm.acc = Some("PF99999".into());
    hmm.desc = Some("a sample profile".into());
    hmm.comlog.push("hmmbuild sample.hmm sample.sto".into());
    hmm.ctime = "Fri Aug  1 12:00:00 2025".into();
    hmm.nseq = 12;
    hmm.checksum = gcg_checksum(&[b"ACGTA".to_vec(), b"ACG-A".to_vec()]);
    for k in 1..=m {
        hmm.mat[k] = vec![0.1; abet.size()];
        hmm.mat[k][(k * 3) % abet.size()] = 0.7;
    }
    for k in 1..m {
        hmm.ins[k] = vec![0.2, 0.3, 0.3, 0.2];
        hmm.t[k] = [0.8, 0.1, 0.1, 0.85, 0.15, 0.7, 0.3];
    }
    hmm.renormalize();
    hmm.map = Some(vec![0, 1, 2, 4, 6, 7]);
    hmm.rf = Some(vec![b' ', b'x', b'x', b'.', b'x', b'x']);
    hmm.ga = Some((25.0, 22.0));
    hmm.nc = Some((18.25, 15.5));
    hmm.evd = Some(EvdParams {
        mu: -42.75,
        lambda: 0.693,
    });
    hmm.config_ls();
    hmm
}

#[test]
fn ascii_round_trip_is_a_fixed_point() {
    let abet = Alphabet::nucleic();
    let hmm = sample_model(&abet);

    let mut first = Vec::new();
    write_ascii(&hmm, &abet, &mut first).unwrap();

    let mut line = 0;
    let mut cur = Cursor::new(first.clone());
    let back = read_ascii(&mut cur, &mut line, &abet).unwrap().unwrap();

    assert_eq!(back.name, "sample");
    assert_eq!(back.acc.as_deref(), Some("PF99999"));
    assert_eq!(back.m, 5);
    assert_eq!(back.nseq, 12);
    assert_eq!(back.checksum, hmm.checksum);
    assert_eq!(back.ga, Some((25.0, 22.0)));
    assert_eq!(back.nc, Some((18.25, 15.5)));
    assert_eq!(back.tc, None);
    assert_eq!(back.map, hmm.map);
    assert_eq!(back.evd, hmm.evd);

    // quantization is stable: writing the reread model reproduces the bytes
    let mut second = Vec::new();
    write_ascii(&back, &abet, &mut second).unwrap();
    assert_eq!(
        String::from_utf8(first).unwrap(),
        String::from_utf8(second).unwrap()
    );
}

#[test]
fn ascii_scores_survive_exactly() {
    let abet = Alphabet::nucleic();
    let mut hmm = sample_model(&abet);
    hmm.logoddsify(&abet, false);

    let mut buf = Vec::new();
    write_ascii(&hmm, &abet, &mut buf).unwrap();
    let mut line = 0;
    let mut back = read_ascii(&mut Cursor::new(buf), &mut line, &abet)
        .unwrap()
        .unwrap();
    back.logoddsify(&abet, false);

    for k in 1..=5 {
        for x in 0..4 {
            assert_eq!(back.msc[x][k], hmm.msc[x][k], "msc[{x}][{k}]");
        }
        assert_eq!(back.bsc[k], hmm.bsc[k]);
        assert_eq!(back.esc[k], hmm.esc[k]);
    }
    for k in 1..5 {
        for t in 0..7 {
            assert_eq!(back.tsc[t][k], hmm.tsc[t][k], "tsc[{t}][{k}]");
        }
        for x in 0..4 {
            assert_eq!(back.isc[x][k], hmm.isc[x][k]);
        }
    }
    assert_eq!(back.xsc, hmm.xsc);
}

#[test]
fn binary_round_trip_preserves_probabilities_bitwise() {
    let abet = Alphabet::nucleic();
    let mut hmm = sample_model(&abet);
    hmm.logoddsify(&abet, true);

    let mut buf = Vec::new();
    write_binary(&hmm, &abet, &mut buf).unwrap();
    let mut file = HmmFile::from_reader(Cursor::new(buf));
    let back = file.read_next(&abet).unwrap().unwrap();
    assert!(file.read_next(&abet).unwrap().is_none());

    assert_eq!(back.name, hmm.name);
    assert_eq!(back.mat, hmm.mat);
    assert_eq!(back.ins, hmm.ins);
    assert_eq!(back.t, hmm.t);
    assert_eq!(back.begin, hmm.begin);
    assert_eq!(back.end, hmm.end);
    assert_eq!(back.xt, hmm.xt);
    assert_eq!(back.null, hmm.null);
    assert_eq!(back.p1, hmm.p1);
    assert_eq!(back.rf, hmm.rf);
    assert_eq!(back.map, hmm.map);
    // the stored score tables come back verbatim
    assert!(back.has_bits());
    assert_eq!(back.tsc, hmm.tsc);
    assert_eq!(back.msc, hmm.msc);
    assert_eq!(back.bsc, hmm.bsc);
    assert_eq!(back.xsc, hmm.xsc);
}

#[test]
fn hmm_databases_stream_multiple_models() {
    let abet = Alphabet::nucleic();
    let mut a = sample_model(&abet);
    a.name = "first".into();
    let mut b = sample_model(&abet);
    b.name = "second".into();

    let mut buf = Vec::new();
    write_ascii(&a, &abet, &mut buf).unwrap();
    write_ascii(&b, &abet, &mut buf).unwrap();

    let mut file = HmmFile::from_reader(Cursor::new(buf));
    let names: Vec<String> = std::iter::from_fn(|| {
        file.read_next(&abet).unwrap().map(|h| h.name)
    })
    .collect();
    assert_eq!(names, vec!["first", "second"]);
}

#[test]
fn on_disk_round_trip_through_a_real_file() {
    let abet = Alphabet::nucleic();
    let hmm = sample_model(&abet);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.hmm");
    {
        let mut f = std::fs::File::create(&path).unwrap();
        write_binary(&hmm, &abet, &mut f).unwrap();
        f.flush().unwrap();
    }
    let mut file = HmmFile::open(&path).unwrap();
    let back = file.read_next(&abet).unwrap().unwrap();
    assert_eq!(back.name, hmm.name);
    assert_eq!(back.mat, hmm.mat);
}

#[test]
fn corrupt_inputs_are_descriptive_errors() {
    let abet = Alphabet::nucleic();

    // garbage text
    let mut line = 0;
    let err = read_ascii(
        &mut Cursor::new(b"not a save file\n".to_vec()),
        &mut line,
        &abet,
    )
    .unwrap_err();
    assert!(matches!(err, HmmIoError::Parse { .. }));

    // mismatched alphabet is fatal
    let amino = Alphabet::amino();
    let hmm = sample_model(&abet);
    let mut buf = Vec::new();
    write_ascii(&hmm, &abet, &mut buf).unwrap();
    let mut line = 0;
    let err = read_ascii(&mut Cursor::new(buf), &mut line, &amino).unwrap_err();
    assert!(matches!(err, HmmIoError::AlphabetMismatch { .. }));

    // truncated node block
    let mut buf = Vec::new();
    write_ascii(&hmm, &abet, &mut buf).unwrap();
    buf.truncate(buf.len() / 2);
    let mut line = 0;
    let err = read_ascii(&mut Cursor::new(buf), &mut line, &abet).unwrap_err();
    assert!(matches!(
        err,
        HmmIoError::Truncated | HmmIoError::Parse { .. }
    ));
}
