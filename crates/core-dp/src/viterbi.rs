//! Full-matrix Viterbi and its traceback.

use crate::{badd, require_bits, DpError};
use core_matrix::{DpMatrix, XMB, XMC, XME, XMJ, XMN};
use core_model::{
    prob2score, scorify, Plan7, INTSCALE, LOOP, MOVE, NEG_INF, TDD, TDM, TII, TIM, TMD, TMI,
    TMM, XTC, XTE, XTJ, XTN,
};
use core_trace::{StateType, Trace};

/// Viterbi over the whole sequence with a full 0..=L row matrix. Returns the
/// bit score and, when asked, the optimal trace (`None` when the alignment
/// is impossible for a degenerate input).
pub fn viterbi(
    dsq: &[u8],
    l: usize,
    hmm: &Plan7,
    mx: &mut DpMatrix,
    want_trace: bool,
) -> Result<(f32, Option<Trace>), DpError> {
    require_bits(hmm)?;
    let m = hmm.m;
    mx.resize(l, m);

    // Row zero: only S->N->B is alive.
    {
        let x0 = mx.xmx.row_mut(0);
        x0[XMN] = 0;
        x0[XMB] = hmm.xsc[XTN][MOVE];
        x0[XME] = NEG_INF;
        x0[XMC] = NEG_INF;
        x0[XMJ] = NEG_INF;
    }
    for k in 0..=m {
        mx.mmx.set(0, k, NEG_INF);
        mx.imx.set(0, k, NEG_INF);
        mx.dmx.set(0, k, NEG_INF);
    }

    // Recursion, done as a pull. tsc[*][0] is -inf, so node 0 never feeds in.
    for i in 1..=l {
        let ms = &hmm.msc[dsq[i] as usize];
        let is = &hmm.isc[dsq[i] as usize];
        let xmb = mx.xmx.get(i - 1, XMB);
        let (mpp, mc) = mx.mmx.prev_cur(i);
        let (ipp, ic) = mx.imx.prev_cur(i);
        let (dpp, dc) = mx.dmx.prev_cur(i);
        mc[0] = NEG_INF;
        ic[0] = NEG_INF;
        dc[0] = NEG_INF;

        for k in 1..=m {
            // match: MM, IM, B, DM
            let mut sc = badd(mpp[k - 1], hmm.tsc[TMM][k - 1]);
            let t = badd(ipp[k - 1], hmm.tsc[TIM][k - 1]);
            if t > sc {
                sc = t;
            }
            let t = badd(xmb, hmm.bsc[k]);
            if t > sc {
                sc = t;
            }
            let t = badd(dpp[k - 1], hmm.tsc[TDM][k - 1]);
            if t > sc {
                sc = t;
            }
            mc[k] = badd(sc, ms[k]);

            // delete: MD, DD
            let mut sc = badd(mc[k - 1], hmm.tsc[TMD][k - 1]);
            let t = badd(dc[k - 1], hmm.tsc[TDD][k - 1]);
            if t > sc {
                sc = t;
            }
            dc[k] = sc;

            // insert: MI, II (insert at node M does not exist)
            if k < m {
                let mut sc = badd(mpp[k], hmm.tsc[TMI][k]);
                let t = badd(ipp[k], hmm.tsc[TII][k]);
                if t > sc {
                    sc = t;
                }
                ic[k] = badd(sc, is[k]);
            }
        }

        // Specials, in order: N, E, J, B, C. C and J emit at zero score.
        let xn = badd(mx.xmx.get(i - 1, XMN), hmm.xsc[XTN][LOOP]);

        let mut xe = NEG_INF;
        let mrow = mx.mmx.row(i);
        for k in 1..=m {
            let sc = badd(mrow[k], hmm.esc[k]);
            if sc > xe {
                xe = sc;
            }
        }

        let mut xj = badd(mx.xmx.get(i - 1, XMJ), hmm.xsc[XTJ][LOOP]);
        let t = badd(xe, hmm.xsc[XTE][LOOP]);
        if t > xj {
            xj = t;
        }

        let mut xb = badd(xn, hmm.xsc[XTN][MOVE]);
        let t = badd(xj, hmm.xsc[XTJ][MOVE]);
        if t > xb {
            xb = t;
        }

        let mut xc = badd(mx.xmx.get(i - 1, XMC), hmm.xsc[XTC][LOOP]);
        let t = badd(xe, hmm.xsc[XTE][MOVE]);
        if t > xc {
            xc = t;
        }

        let xrow = mx.xmx.row_mut(i);
        xrow[XMN] = xn;
        xrow[XME] = xe;
        xrow[XMJ] = xj;
        xrow[XMB] = xb;
        xrow[XMC] = xc;
    }

    let sc = badd(mx.xmx.get(l, XMC), hmm.xsc[XTC][MOVE]);

    let tr = if want_trace {
        viterbi_trace(hmm, dsq, l, mx)?
    } else {
        None
    };
    Ok((scorify(sc), tr))
}

/// Recover the optimal state path from a filled Viterbi matrix, re-deriving
/// each predecessor by subtracting the emission and testing candidates in
/// tie-break order. Returns `None` when the terminal cell is unreachable.
///
/// Two nonemitting extensions happen here: when an entry B->Mk or exit
/// Mk->E carries a folded delete wing, the wing's D states are written back
/// into the trace.
pub fn viterbi_trace(
    hmm: &Plan7,
    dsq: &[u8],
    n: usize,
    mx: &DpMatrix,
) -> Result<Option<Trace>, DpError> {
    use StateType::*;
    let m = hmm.m;
    let mut tr = Trace::for_seq(n);

    // Built back to front, reversed at the end.
    tr.push(T, 0, 0);
    tr.push(C, 0, 0);
    let mut i = n; // seq position being assigned
    let mut k = 0usize; // model node being assigned

    loop {
        let cur = tr.last().expect("trace never empty").state;
        if cur == S {
            break;
        }
        match cur {
            M => {
                // M at (i+1, k+1) connects back to M/I/D at i,k or B.
                let cell = mx.mmx.get(i + 1, k + 1);
                if cell <= NEG_INF {
                    return Ok(None);
                }
                let sc = cell - hmm.msc[dsq[i + 1] as usize][k + 1];
                if sc == badd(mx.mmx.get(i, k), hmm.tsc[TMM][k]) {
                    tr.push(M, k, i);
                    k -= 1;
                    i -= 1;
                } else if sc == badd(mx.imx.get(i, k), hmm.tsc[TIM][k]) {
                    tr.push(I, k, i);
                    i -= 1;
                } else if sc == badd(mx.xmx.get(i, XMB), hmm.bsc[k + 1]) {
                    // wing unfolding: B->D1..Dk->M(k+1) was folded into bsc
                    if prob2score(hmm.begin[k + 1], hmm.p1) + INTSCALE <= hmm.bsc[k + 1] {
                        while k > 0 {
                            tr.push(D, k, 0);
                            k -= 1;
                        }
                    }
                    tr.push(B, 0, 0);
                } else if sc == badd(mx.dmx.get(i, k), hmm.tsc[TDM][k]) {
                    tr.push(D, k, 0);
                    k -= 1;
                } else {
                    return Err(DpError::TracebackFailed { state: M, i, k });
                }
            }
            D => {
                // D at (i, k+1) connects from M or D at k.
                let cell = mx.dmx.get(i, k + 1);
                if cell <= NEG_INF {
                    return Ok(None);
                }
                if cell == badd(mx.mmx.get(i, k), hmm.tsc[TMD][k]) {
                    tr.push(M, k, i);
                    k -= 1;
                    i -= 1;
                } else if cell == badd(mx.dmx.get(i, k), hmm.tsc[TDD][k]) {
                    tr.push(D, k, 0);
                    k -= 1;
                } else {
                    return Err(DpError::TracebackFailed { state: D, i, k });
                }
            }
            I => {
                // I at (i+1, k) connects from M or I at k.
                let cell = mx.imx.get(i + 1, k);
                if cell <= NEG_INF {
                    return Ok(None);
                }
                let sc = cell - hmm.isc[dsq[i + 1] as usize][k];
                if sc == badd(mx.mmx.get(i, k), hmm.tsc[TMI][k]) {
                    tr.push(M, k, i);
                    k -= 1;
                    i -= 1;
                } else if sc == badd(mx.imx.get(i, k), hmm.tsc[TII][k]) {
                    tr.push(I, k, i);
                    i -= 1;
                } else {
                    return Err(DpError::TracebackFailed { state: I, i, k });
                }
            }
            N => {
                if i == 0 && mx.xmx.get(0, XMN) == 0 {
                    tr.push(S, 0, 0);
                } else if i > 0
                    && mx.xmx.get(i + 1, XMN)
                        == badd(mx.xmx.get(i, XMN), hmm.xsc[XTN][LOOP])
                {
                    // first N of the run is the nonemitter
                    tr.last_mut().expect("has last").pos = i;
                    tr.push(N, 0, 0);
                    i -= 1;
                } else {
                    return Err(DpError::TracebackFailed { state: N, i, k });
                }
            }
            B => {
                let cell = mx.xmx.get(i, XMB);
                if cell <= NEG_INF {
                    return Ok(None);
                }
                if cell == badd(mx.xmx.get(i, XMN), hmm.xsc[XTN][MOVE]) {
                    tr.push(N, 0, 0);
                } else if cell == badd(mx.xmx.get(i, XMJ), hmm.xsc[XTJ][MOVE]) {
                    tr.push(J, 0, 0);
                } else {
                    return Err(DpError::TracebackFailed { state: B, i, k });
                }
            }
            E => {
                // E pulls from any M on this row; ascending k, first wins.
                let cell = mx.xmx.get(i, XME);
                if cell <= NEG_INF {
                    return Ok(None);
                }
                let mut found = false;
                for kk in 1..=m {
                    if cell == badd(mx.mmx.get(i, kk), hmm.esc[kk]) {
                        // wing unfolding on the exit side
                        if prob2score(hmm.end[kk], 1.0) + INTSCALE <= hmm.esc[kk] {
                            for dk in (kk + 1..=m).rev() {
                                tr.push(D, dk, 0);
                            }
                        }
                        tr.push(M, kk, i);
                        k = kk - 1;
                        i -= 1;
                        found = true;
                        break;
                    }
                }
                if !found {
                    return Err(DpError::TracebackFailed { state: E, i, k });
                }
            }
            C => {
                let cell = mx.xmx.get(i, XMC);
                if cell <= NEG_INF {
                    return Ok(None);
                }
                if i > 0 && cell == badd(mx.xmx.get(i - 1, XMC), hmm.xsc[XTC][LOOP]) {
                    tr.last_mut().expect("has last").pos = i;
                    tr.push(C, 0, 0);
                    i -= 1;
                } else if cell == badd(mx.xmx.get(i, XME), hmm.xsc[XTE][MOVE]) {
                    tr.push(E, 0, 0);
                } else {
                    return Err(DpError::TracebackFailed { state: C, i, k });
                }
            }
            J => {
                let cell = mx.xmx.get(i, XMJ);
                if cell <= NEG_INF {
                    return Ok(None);
                }
                if i > 0 && cell == badd(mx.xmx.get(i - 1, XMJ), hmm.xsc[XTJ][LOOP]) {
                    tr.last_mut().expect("has last").pos = i;
                    tr.push(J, 0, 0);
                    i -= 1;
                } else if cell == badd(mx.xmx.get(i, XME), hmm.xsc[XTE][LOOP]) {
                    tr.push(E, 0, 0);
                } else {
                    return Err(DpError::TracebackFailed { state: J, i, k });
                }
            }
            S | T | Bogus => {
                return Err(DpError::TracebackFailed { state: cur, i, k });
            }
        }
    }

    tr.reverse();
    Ok(Some(tr))
}
