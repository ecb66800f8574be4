//! Small Viterbi: parse into domains, align each domain under the memory
//! cap, stitch the sub-traces back into one full trace.

use crate::{parsing_viterbi, viterbi, wee_viterbi, DpError};
use core_matrix::DpMatrix;
use core_model::Plan7;
use core_trace::{StateType, Trace};
use tracing::debug;

/// Linear-memory replacement for [`viterbi`] on large (L, M). The parsing
/// pass finds the optimal domain segmentation; each subsequence is then
/// aligned by full Viterbi if a matrix fits under `ram_limit_mb`, by the
/// divide-and-conquer engine otherwise. A length-1 subsequence gets a
/// dedicated tiny matrix: the divide-and-conquer engine needs length >= 2.
pub fn small_viterbi(
    dsq: &[u8],
    l: usize,
    hmm: &Plan7,
    mx: &mut DpMatrix,
    want_trace: bool,
    ram_limit_mb: usize,
) -> Result<(f32, Option<Trace>), DpError> {
    let (sc, ctr) = parsing_viterbi(dsq, l, hmm)?;

    let Some(ctr) = ctr else {
        return Ok((sc, None));
    };
    if !want_trace {
        return Ok((sc, None));
    }

    // Collapsed trace is S, (B, E)*, T.
    let ndom = ctr.len() / 2 - 1;
    let mut subs: Vec<Trace> = Vec::with_capacity(ndom);
    for d in 0..ndom {
        let b_pos = ctr.get(d * 2 + 1).pos;
        let e_pos = ctr.get(d * 2 + 2).pos;
        let sqlen = e_pos - b_pos;
        let window = &dsq[b_pos..=b_pos + sqlen];

        let sub = if mx.space_ok(sqlen, hmm.m, ram_limit_mb) {
            debug!(target: "dp.small", domain = d, sqlen, "full viterbi on domain");
            let (_, tr) = viterbi(window, sqlen, hmm, mx, true)?;
            tr
        } else if sqlen == 1 {
            // the divide-and-conquer engine can't take L=1, and growing the
            // shared matrix here would break the memory guarantee
            let mut tiny = DpMatrix::new(1, hmm.m, 0, 0);
            let (_, tr) = viterbi(window, sqlen, hmm, &mut tiny, true)?;
            tr
        } else {
            debug!(target: "dp.small", domain = d, sqlen, "wee viterbi on domain");
            let (_, tr) = wee_viterbi(window, sqlen, hmm)?;
            Some(tr)
        };
        match sub {
            Some(tr) => subs.push(tr),
            None => return Ok((sc, None)),
        }
    }

    // Stitch: S, N run to the first B; each sub-trace minus its S/N and C/T
    // framing, positions shifted by the domain offset; J (or final C) runs
    // over the gaps; C run to the end.
    let mut tr = Trace::for_seq(l);
    tr.push(StateType::S, 0, 0);
    tr.push(StateType::N, 0, 0);
    for pos in 1..=ctr.get(1).pos {
        tr.push(StateType::N, 0, pos);
    }

    for (d, sub) in subs.iter().enumerate() {
        let offset = ctr.get(d * 2 + 1).pos;
        for t2 in 2..sub.len() - 2 {
            let step = sub.get(t2);
            let pos = if step.pos > 0 { step.pos + offset } else { 0 };
            tr.push(step.state, step.node, pos);
        }
        let closer = if d == ndom - 1 {
            StateType::C
        } else {
            StateType::J
        };
        tr.push(closer, 0, 0);
        if d != ndom - 1 {
            for pos in ctr.get(d * 2 + 2).pos + 1..=ctr.get((d + 1) * 2 + 1).pos {
                tr.push(StateType::J, 0, pos);
            }
        }
    }

    for pos in ctr.get(ndom * 2).pos + 1..=l {
        tr.push(StateType::C, 0, pos);
    }
    tr.push(StateType::T, 0, 0);

    Ok((sc, Some(tr)))
}
