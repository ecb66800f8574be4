//! Parsing Viterbi: linear memory, collapsed domain parse.

use crate::{badd, require_bits, DpError};
use core_matrix::{DpMatrix, Grid, XCOLS, XMB, XMC, XME, XMJ, XMN};
use core_model::{
    scorify, Plan7, LOOP, MOVE, NEG_INF, TDD, TDM, TII, TIM, TMD, TMI, TMM, XTC, XTE, XTJ, XTN,
};
use core_trace::{StateType, Trace};

/// Two-row Viterbi that recovers only the domain structure of the optimal
/// alignment: a collapsed trace S, (B, E)*, T whose positions delimit each
/// domain's subsequence. Score is identical to full Viterbi.
///
/// Alongside the score rows, a parallel set of rows propagates one trace
/// pointer per cell: the row at which the current path last left B. When a
/// path reaches E, the B it started from is recorded in `etr`; when a path
/// reenters B through the J loop (or from the start), the E it came from
/// (or 0) is recorded in `btr`. Walking `btr`/`etr` backward from the final
/// C yields the parse.
pub fn parsing_viterbi(
    dsq: &[u8],
    l: usize,
    hmm: &Plan7,
) -> Result<(f32, Option<Trace>), DpError> {
    require_bits(hmm)?;
    let m = hmm.m;

    let mut mx = DpMatrix::two_rows(m);
    // trace-pointer rows, same shape as the score rows
    let mut mtr = Grid::new(2, m + 2);
    let mut itr = Grid::new(2, m + 2);
    let mut dtr = Grid::new(2, m + 2);
    let mut xtr = Grid::new(2, XCOLS);
    let mut btr = vec![0i32; l + 1];
    let mut etr = vec![0i32; l + 1];

    {
        let x0 = mx.xmx.row_mut(0);
        x0[XMN] = 0;
        x0[XMB] = hmm.xsc[XTN][MOVE];
        x0[XME] = NEG_INF;
        x0[XMC] = NEG_INF;
        x0[XMJ] = NEG_INF;
    }
    btr[0] = 0;
    etr[0] = -1;
    for k in 0..=m {
        mx.mmx.set(0, k, NEG_INF);
        mx.imx.set(0, k, NEG_INF);
        mx.dmx.set(0, k, NEG_INF);
    }

    let mut cur = 1usize;
    for i in 1..=l {
        cur = i % 2;
        let prv = (i - 1) % 2;
        let ms = &hmm.msc[dsq[i] as usize];
        let is = &hmm.isc[dsq[i] as usize];

        mx.mmx.set(cur, 0, NEG_INF);
        mx.imx.set(cur, 0, NEG_INF);
        mx.dmx.set(cur, 0, NEG_INF);

        for k in 1..=m {
            // match; propagate the B row of the winning predecessor
            let mut best = badd(mx.mmx.get(prv, k - 1), hmm.tsc[TMM][k - 1]);
            let mut bp = mtr.get(prv, k - 1);
            let sc = badd(mx.imx.get(prv, k - 1), hmm.tsc[TIM][k - 1]);
            if sc > best {
                best = sc;
                bp = itr.get(prv, k - 1);
            }
            let sc = badd(mx.xmx.get(prv, XMB), hmm.bsc[k]);
            if sc > best {
                best = sc;
                bp = (i - 1) as i32;
            }
            let sc = badd(mx.dmx.get(prv, k - 1), hmm.tsc[TDM][k - 1]);
            if sc > best {
                best = sc;
                bp = dtr.get(prv, k - 1);
            }
            mx.mmx.set(cur, k, badd(best, ms[k]));
            mtr.set(cur, k, bp);

            // delete
            let mut best = badd(mx.mmx.get(cur, k - 1), hmm.tsc[TMD][k - 1]);
            let mut bp = mtr.get(cur, k - 1);
            let sc = badd(mx.dmx.get(cur, k - 1), hmm.tsc[TDD][k - 1]);
            if sc > best {
                best = sc;
                bp = dtr.get(cur, k - 1);
            }
            mx.dmx.set(cur, k, best);
            dtr.set(cur, k, bp);

            // insert
            if k < m {
                let mut best = badd(mx.mmx.get(prv, k), hmm.tsc[TMI][k]);
                let mut bp = mtr.get(prv, k);
                let sc = badd(mx.imx.get(prv, k), hmm.tsc[TII][k]);
                if sc > best {
                    best = sc;
                    bp = itr.get(prv, k);
                }
                mx.imx.set(cur, k, badd(best, is[k]));
                itr.set(cur, k, bp);
            }
        }

        // specials; order matters
        let xn = badd(mx.xmx.get(prv, XMN), hmm.xsc[XTN][LOOP]);
        mx.xmx.set(cur, XMN, xn);

        let mut xe = NEG_INF;
        for k in 1..=m {
            let sc = badd(mx.mmx.get(cur, k), hmm.esc[k]);
            if sc > xe {
                xe = sc;
                etr[i] = mtr.get(cur, k);
            }
        }
        mx.xmx.set(cur, XME, xe);

        let mut xj = badd(mx.xmx.get(prv, XMJ), hmm.xsc[XTJ][LOOP]);
        let mut jp = xtr.get(prv, XMJ);
        let sc = badd(xe, hmm.xsc[XTE][LOOP]);
        if sc > xj {
            xj = sc;
            jp = i as i32;
        }
        mx.xmx.set(cur, XMJ, xj);
        xtr.set(cur, XMJ, jp);

        let mut xb = badd(xn, hmm.xsc[XTN][MOVE]);
        btr[i] = 0;
        let sc = badd(xj, hmm.xsc[XTJ][MOVE]);
        if sc > xb {
            xb = sc;
            btr[i] = xtr.get(cur, XMJ);
        }
        mx.xmx.set(cur, XMB, xb);

        let mut xc = badd(mx.xmx.get(prv, XMC), hmm.xsc[XTC][LOOP]);
        let mut cp = xtr.get(prv, XMC);
        let sc = badd(xe, hmm.xsc[XTE][MOVE]);
        if sc > xc {
            xc = sc;
            cp = i as i32;
        }
        mx.xmx.set(cur, XMC, xc);
        xtr.set(cur, XMC, cp);
    }

    let sc = badd(mx.xmx.get(cur, XMC), hmm.xsc[XTC][MOVE]);
    if sc <= NEG_INF {
        return Ok((scorify(sc), None));
    }

    // Collapsed traceback: from the final C, hop E <- B <- E ... to 0.
    let mut tr = Trace::new();
    tr.push(StateType::T, 0, 0);
    let mut i = xtr.get(l % 2, XMC);
    while i > 0 {
        tr.push(StateType::E, 0, i as usize);
        i = etr[i as usize];
        tr.push(StateType::B, 0, i as usize);
        i = btr[i as usize];
    }
    tr.push(StateType::S, 0, 0);
    tr.reverse();

    if tr.domain_count() == 0 {
        return Ok((scorify(sc), None));
    }
    Ok((scorify(sc), Some(tr)))
}
