//! Divide-and-conquer ("wee") Viterbi: optimal alignment of one domain
//! interval in Theta(M) memory.

use crate::{badd, require_bits, DpError};
use core_matrix::{DpMatrix, XMB, XMC, XME, XMN};
use core_model::{
    prob2score, scorify, Plan7, INTSCALE, LOOP, MOVE, NEG_INF, TDD, TDM, TII, TIM, TMD, TMI,
    TMM, XTC, XTE, XTN,
};
use core_trace::{StateType, Trace};

/// Align `dsq[1..=l]` to the model with memory linear in M, by recursively
/// splitting the sequence at optimal midpoints. J cycles are disallowed:
/// the caller has already segmented multi-hit alignments into domains.
///
/// The subsequence must have length >= 2; the midpoint search cannot place
/// a split inside a length-1 interval (the caller special-cases L=1 with a
/// tiny full matrix instead).
pub fn wee_viterbi(dsq: &[u8], l: usize, hmm: &Plan7) -> Result<(f32, Trace), DpError> {
    require_bits(hmm)?;
    if l < 2 {
        return Err(DpError::SubsequenceTooShort(l));
    }
    let m = hmm.m;

    // kassign/tassign: the model node and state type every sequence
    // position ends up aligned to.
    let mut kassign = vec![0usize; l + 1];
    let mut tassign = vec![StateType::Bogus; l + 1];
    let mut stack: Vec<(usize, usize)> = Vec::with_capacity(64);

    stack.push((1, l));
    kassign[1] = 1;
    kassign[l] = m;
    tassign[1] = StateType::S; // provisional; becomes N or M
    tassign[l] = StateType::T; // provisional; becomes M or C

    let mut ret_sc = 0.0f32;
    while let Some((s1, s3)) = stack.pop() {
        let (k1, t1) = (kassign[s1], tassign[s1]);
        let (k3, t3) = (kassign[s3], tassign[s3]);

        let (sc, k2, t2, s2) = wee_midpoint(hmm, dsq, k1, t1, s1, k3, t3, s3)?;
        kassign[s2] = k2;
        tassign[s2] = t2;
        // the first split spans the whole interval; its score is the answer
        if t1 == StateType::S && t3 == StateType::T {
            ret_sc = sc;
        }

        if t2 != StateType::N && (s2 - s1 > 1 || (s2 - s1 == 1 && t1 == StateType::S)) {
            stack.push((s1, s2));
        }
        if t2 != StateType::C && (s3 - s2 > 1 || (s3 - s2 == 1 && t3 == StateType::T)) {
            stack.push((s2, s3));
        }
        // an N midpoint pins the whole N-terminal side; C likewise
        if t2 == StateType::N {
            for s in (s1..=s2).rev() {
                kassign[s] = 1;
                tassign[s] = StateType::N;
            }
        }
        if t2 == StateType::C {
            for s in s2..=s3 {
                kassign[s] = m;
                tassign[s] = StateType::C;
            }
        }
    }

    // Interpolate the nonemitting states back into a full trace.
    let mut tr = Trace::for_seq(l);
    tr.push(StateType::S, 0, 0);
    tr.push(StateType::N, 0, 0);

    for i in 1..=l {
        match tassign[i] {
            StateType::M => {
                // first match: emit B, with entry wing if folded
                if tr.last().map(|s| s.state) == Some(StateType::N) {
                    tr.push(StateType::B, 0, 0);
                    if prob2score(hmm.begin[kassign[i]], hmm.p1) + INTSCALE
                        <= hmm.bsc[kassign[i]]
                    {
                        for k in 1..kassign[i] {
                            tr.push(StateType::D, k, 0);
                        }
                    }
                }
                tr.push(StateType::M, kassign[i], i);
                // deletes up to the next match
                if i < l && tassign[i + 1] == StateType::M && kassign[i + 1] > kassign[i] + 1
                {
                    for k in kassign[i] + 1..kassign[i + 1] {
                        tr.push(StateType::D, k, 0);
                    }
                }
                // last match: exit wing, E, nonemitting C
                if i == l || tassign[i + 1] == StateType::C {
                    if prob2score(hmm.end[kassign[i]], 1.0) + INTSCALE <= hmm.esc[kassign[i]]
                    {
                        for k in kassign[i] + 1..=m {
                            tr.push(StateType::D, k, 0);
                        }
                    }
                    tr.push(StateType::E, 0, 0);
                    tr.push(StateType::C, 0, 0);
                }
            }
            StateType::I => tr.push(StateType::I, kassign[i], i),
            StateType::N => tr.push(StateType::N, 0, i),
            StateType::C => tr.push(StateType::C, 0, i),
            other => {
                return Err(DpError::TracebackFailed {
                    state: other,
                    i,
                    k: kassign[i],
                })
            }
        }
    }
    tr.push(StateType::T, 0, 0);

    Ok((ret_sc, tr))
}

/// Find the optimal midpoint of a segment: run two-row Viterbi forward from
/// (s1, k1, t1) and backward from (s3, k3, t3), then take the argmax of
/// fwd + bck over the middle row s2, across M/I at each node plus the N and
/// C specials.
#[allow(clippy::too_many_arguments)]
fn wee_midpoint(
    hmm: &Plan7,
    dsq: &[u8],
    k1: usize,
    t1: StateType,
    s1: usize,
    k3: usize,
    t3: StateType,
    s3: usize,
) -> Result<(f32, usize, StateType, usize), DpError> {
    use StateType::*;
    let m = hmm.m;

    // Midpoint choice; adjacent endpoints against a provisional S/T pin the
    // midpoint onto the endpoint that will be replaced.
    let mut s2 = s1 + (s3 - s1) / 2;
    if s3 - s1 == 1 && t1 == S {
        s2 = s1;
    }
    if s3 - s1 == 1 && t3 == T {
        s2 = s3;
    }

    // S aligns to row zero by convention; DP then starts at row 1.
    let start = if t1 == S { 0 } else { s1 };

    // ---- forward sweep ----
    let mut fwd = DpMatrix::two_rows(m);
    blank(&mut fwd);
    let mut cur = start % 2;

    match t1 {
        M => fwd.mmx.set(cur, k1, 0),
        I => fwd.imx.set(cur, k1, 0),
        N => fwd.xmx.set(cur, XMN, 0),
        C => fwd.xmx.set(cur, XMC, 0),
        S => fwd.xmx.set(cur, XMN, 0),
        other => {
            return Err(DpError::TracebackFailed {
                state: other,
                i: s1,
                k: k1,
            })
        }
    }

    // horizontal (nonemitting) moves available on the start row
    if t1 == M {
        for k in k1 + 1..=k3 {
            let mut sc = badd(fwd.mmx.get(cur, k - 1), hmm.tsc[TMD][k - 1]);
            let alt = badd(fwd.dmx.get(cur, k - 1), hmm.tsc[TDD][k - 1]);
            if alt > sc {
                sc = alt;
            }
            fwd.dmx.set(cur, k, sc);
        }
        fwd.xmx
            .set(cur, XME, badd(fwd.mmx.get(cur, k1), hmm.esc[k1]));
    }
    let b = badd(fwd.xmx.get(cur, XMN), hmm.xsc[XTN][MOVE]);
    fwd.xmx.set(cur, XMB, b);
    let c = badd(fwd.xmx.get(cur, XME), hmm.xsc[XTE][MOVE]);
    fwd.xmx.set(cur, XMC, c);

    for i in start + 1..=s2 {
        cur = i % 2;
        let prv = 1 - cur;
        let ms = &hmm.msc[dsq[i] as usize];
        let is = &hmm.isc[dsq[i] as usize];

        fwd.mmx.set(cur, k1, NEG_INF);
        fwd.imx.set(cur, k1, NEG_INF);
        fwd.dmx.set(cur, k1, NEG_INF);

        // column k1 sees only its insert and the B->M entry
        if k1 < m {
            let mut sc = badd(fwd.mmx.get(prv, k1), hmm.tsc[TMI][k1]);
            let alt = badd(fwd.imx.get(prv, k1), hmm.tsc[TII][k1]);
            if alt > sc {
                sc = alt;
            }
            fwd.imx.set(cur, k1, badd(sc, is[k1]));
        }
        let entry = badd(fwd.xmx.get(prv, XMB), hmm.bsc[k1]);
        fwd.mmx.set(cur, k1, badd(entry, ms[k1]));

        for k in k1 + 1..=k3 {
            let mut sc = badd(fwd.mmx.get(prv, k - 1), hmm.tsc[TMM][k - 1]);
            let alt = badd(fwd.imx.get(prv, k - 1), hmm.tsc[TIM][k - 1]);
            if alt > sc {
                sc = alt;
            }
            let alt = badd(fwd.xmx.get(prv, XMB), hmm.bsc[k]);
            if alt > sc {
                sc = alt;
            }
            let alt = badd(fwd.dmx.get(prv, k - 1), hmm.tsc[TDM][k - 1]);
            if alt > sc {
                sc = alt;
            }
            fwd.mmx.set(cur, k, badd(sc, ms[k]));

            let mut sc = NEG_INF;
            if k < m {
                sc = badd(fwd.mmx.get(cur, k - 1), hmm.tsc[TMD][k - 1]);
                let alt = badd(fwd.dmx.get(cur, k - 1), hmm.tsc[TDD][k - 1]);
                if alt > sc {
                    sc = alt;
                }
            }
            fwd.dmx.set(cur, k, sc);

            let mut sc = NEG_INF;
            if k < m {
                sc = badd(fwd.mmx.get(prv, k), hmm.tsc[TMI][k]);
                let alt = badd(fwd.imx.get(prv, k), hmm.tsc[TII][k]);
                if alt > sc {
                    sc = alt;
                }
                sc = badd(sc, is[k]);
            }
            fwd.imx.set(cur, k, sc);
        }

        let xn = badd(fwd.xmx.get(prv, XMN), hmm.xsc[XTN][LOOP]);
        fwd.xmx.set(cur, XMN, xn);
        let mut xe = NEG_INF;
        for k in k1..=k3.min(m) {
            let sc = badd(fwd.mmx.get(cur, k), hmm.esc[k]);
            if sc > xe {
                xe = sc;
            }
        }
        fwd.xmx.set(cur, XME, xe);
        fwd.xmx.set(cur, XMB, badd(xn, hmm.xsc[XTN][MOVE]));
        let mut xc = badd(fwd.xmx.get(prv, XMC), hmm.xsc[XTC][LOOP]);
        let alt = badd(xe, hmm.xsc[XTE][MOVE]);
        if alt > xc {
            xc = alt;
        }
        fwd.xmx.set(cur, XMC, xc);
    }

    // ---- backward sweep ----
    let mut bck = DpMatrix::two_rows(m);
    blank(&mut bck);
    let nxt = s3 % 2;

    match t3 {
        M => bck.mmx.set(nxt, k3, 0),
        I => bck.imx.set(nxt, k3, 0),
        N => bck.xmx.set(nxt, XMN, 0),
        C => bck.xmx.set(nxt, XMC, 0),
        T => bck.xmx.set(nxt, XMC, hmm.xsc[XTC][MOVE]), // C->T implied
        other => {
            return Err(DpError::TracebackFailed {
                state: other,
                i: s3,
                k: k3,
            })
        }
    }

    // T is the one nonemitting endpoint: horizontal moves exist on row s3
    if t3 == T {
        let xe = badd(bck.xmx.get(nxt, XMC), hmm.xsc[XTE][MOVE]);
        bck.xmx.set(nxt, XME, xe);
        for k in (k1..=k3).rev() {
            let mut sc = badd(xe, hmm.esc[k]);
            if s3 != s2 {
                sc = badd(sc, hmm.msc[dsq[s3] as usize][k]);
            }
            bck.mmx.set(nxt, k, sc);
        }
    }

    let mut i = s3;
    while i > s2 {
        i -= 1;
        let cur = i % 2;
        let nxt = 1 - cur;
        let ms = &hmm.msc[dsq[i] as usize];
        let is = &hmm.isc[dsq[i] as usize];

        let xc = badd(bck.xmx.get(nxt, XMC), hmm.xsc[XTC][LOOP]);
        bck.xmx.set(cur, XMC, xc);

        let mut xb = NEG_INF;
        for k in k1..=k3 {
            let sc = badd(bck.mmx.get(nxt, k), hmm.bsc[k]);
            if sc > xb {
                xb = sc;
            }
        }
        bck.xmx.set(cur, XMB, xb);

        // E pulls from C alone; no J inside a domain
        let xe = badd(xc, hmm.xsc[XTE][MOVE]);
        bck.xmx.set(cur, XME, xe);

        let mut xn = badd(xb, hmm.xsc[XTN][MOVE]);
        let alt = badd(bck.xmx.get(nxt, XMN), hmm.xsc[XTN][LOOP]);
        if alt > xn {
            xn = alt;
        }
        bck.xmx.set(cur, XMN, xn);

        for k in (k1..=k3).rev() {
            if k == m {
                // M_M transits to E with probability one
                let mut sc = bck.xmx.get(cur, XME);
                bck.dmx.set(cur, k, NEG_INF);
                bck.imx.set(cur, k, NEG_INF);
                if i != s2 {
                    sc = badd(sc, ms[k]);
                }
                bck.mmx.set(cur, k, sc);
                continue;
            }

            let mut sc = badd(bck.xmx.get(cur, XME), hmm.esc[k]);
            let alt = badd(bck.mmx.get(nxt, k + 1), hmm.tsc[TMM][k]);
            if alt > sc {
                sc = alt;
            }
            let alt = badd(bck.imx.get(nxt, k), hmm.tsc[TMI][k]);
            if alt > sc {
                sc = alt;
            }
            let alt = badd(bck.dmx.get(cur, k + 1), hmm.tsc[TMD][k]);
            if alt > sc {
                sc = alt;
            }
            if i != s2 {
                sc = badd(sc, ms[k]);
            }
            bck.mmx.set(cur, k, sc);

            let mut sc = badd(bck.mmx.get(nxt, k + 1), hmm.tsc[TDM][k]);
            let alt = badd(bck.dmx.get(cur, k + 1), hmm.tsc[TDD][k]);
            if alt > sc {
                sc = alt;
            }
            bck.dmx.set(cur, k, sc);

            let mut sc = badd(bck.mmx.get(nxt, k + 1), hmm.tsc[TIM][k]);
            let alt = badd(bck.imx.get(nxt, k), hmm.tsc[TII][k]);
            if alt > sc {
                sc = alt;
            }
            if i != s2 {
                sc = badd(sc, is[k]);
            }
            bck.imx.set(cur, k, sc);
        }
    }

    // ---- combine on row s2 ----
    let row = s2 % 2;
    let mut max = NEG_INF;
    let mut k2 = k1;
    let mut t2 = Bogus;
    for k in k1..=k3 {
        let sc = badd(fwd.mmx.get(row, k), bck.mmx.get(row, k));
        if sc > max {
            max = sc;
            k2 = k;
            t2 = M;
        }
        let sc = badd(fwd.imx.get(row, k), bck.imx.get(row, k));
        if sc > max {
            max = sc;
            k2 = k;
            t2 = I;
        }
    }
    let sc = badd(fwd.xmx.get(row, XMN), bck.xmx.get(row, XMN));
    if sc > max {
        max = sc;
        k2 = 1;
        t2 = N;
    }
    let sc = badd(fwd.xmx.get(row, XMC), bck.xmx.get(row, XMC));
    if sc > max {
        max = sc;
        k2 = m;
        t2 = C;
    }

    if t2 == Bogus {
        return Err(DpError::NoMidpoint { s1, s3 });
    }
    Ok((scorify(max), k2, t2, s2))
}

/// Set every cell of a two-row matrix to -infinity.
fn blank(mx: &mut DpMatrix) {
    for i in 0..=1 {
        mx.mmx.row_mut(i).fill(NEG_INF);
        mx.imx.row_mut(i).fill(NEG_INF);
        mx.dmx.row_mut(i).fill(NEG_INF);
        mx.xmx.row_mut(i).fill(NEG_INF);
    }
}
