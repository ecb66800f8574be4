//! Alignment-against-alignment Viterbi: align a whole multiple alignment,
//! treated as a weighted consensus, to the model; the resulting master
//! trace is imposed onto each row.

use crate::{badd, require_bits, DpError};
use core_alphabet::{is_gap, Alphabet, Msa};
use core_matrix::{DpMatrix, XMB, XMC, XME, XMJ, XMN};
use core_model::{
    prob2score, Plan7, INTSCALE, LOOP, MOVE, NEG_INF, TDD, TDM, TII, TIM, TMD, TMI, TMM, XTC,
    XTE, XTN,
};
use core_trace::{ShadowMatrix, StateType, Trace};

/// Viterbi where column i emits the weighted consensus of the alignment:
/// emission contribution is `sum_x con[i][x] * msc[x][k]`, and transitions
/// into and out of insert states are scaled by fractional column occupancy.
/// Gap-heavy columns carry proportionally less weight.
///
/// The score grid is two rows; a full shadow matrix records the argmax at
/// every cell and the traceback walks it. No J: one domain, global in the
/// sequence dimension.
pub fn align_alignment(msa: &Msa, hmm: &Plan7, abet: &Alphabet) -> Result<Trace, DpError> {
    use StateType as St;
    require_bits(hmm)?;
    let m = hmm.m;
    let alen = msa.alen;
    let asize = abet.size();

    // Weighted consensus counts per column, normalized so a full column has
    // total weight 1; occupancy = that total.
    let denom: f32 = msa.wgt.iter().sum();
    let mut con = vec![vec![0.0f32; asize]; alen + 1];
    let mut mocc = vec![0.0f32; alen + 1];
    mocc[0] = -9999.0;
    for i in 1..=alen {
        for (idx, row) in msa.rows.iter().enumerate() {
            let c = row[i - 1];
            if !is_gap(c) {
                abet.count_symbol(&mut con[i], abet.symbol_index(c), msa.wgt[idx]);
            }
        }
        for v in &mut con[i] {
            *v /= denom;
        }
        mocc[i] = con[i].iter().sum();
    }

    let mut mx = DpMatrix::two_rows(m);
    let mut tb = ShadowMatrix::new(alen + 1, m);

    {
        let x0 = mx.xmx.row_mut(0);
        x0[XMN] = 0;
        x0[XMB] = hmm.xsc[XTN][MOVE];
        x0[XME] = NEG_INF;
        x0[XMC] = NEG_INF;
        x0[XMJ] = NEG_INF;
    }
    tb.set_x(0, XMN, St::S);
    tb.set_x(0, XMB, St::N);
    for k in 0..=m {
        mx.mmx.set(0, k, NEG_INF);
        mx.imx.set(0, k, NEG_INF);
        mx.dmx.set(0, k, NEG_INF);
    }

    for i in 1..=alen {
        let cur = i % 2;
        let prv = 1 - cur;

        mx.mmx.set(cur, 0, NEG_INF);
        mx.imx.set(cur, 0, NEG_INF);
        mx.dmx.set(cur, 0, NEG_INF);

        for k in 1..=m {
            // match
            let mut best = NEG_INF;
            let mut who = St::Bogus;
            let sc = badd(mx.mmx.get(prv, k - 1), hmm.tsc[TMM][k - 1]);
            if sc > best {
                best = sc;
                who = St::M;
            }
            if mx.imx.get(prv, k - 1) > NEG_INF && hmm.tsc[TIM][k - 1] > NEG_INF {
                let sc = (mx.imx.get(prv, k - 1) as f32
                    + hmm.tsc[TIM][k - 1] as f32 * mocc[i - 1]) as i32;
                if sc > best {
                    best = sc;
                    who = St::I;
                }
            }
            let sc = badd(mx.xmx.get(prv, XMB), hmm.bsc[k]);
            if sc > best {
                best = sc;
                who = St::B;
            }
            let sc = badd(mx.dmx.get(prv, k - 1), hmm.tsc[TDM][k - 1]);
            if sc > best {
                best = sc;
                who = St::D;
            }
            // consensus-weighted emission
            if best > NEG_INF {
                let mut acc = best as f32;
                for x in 0..asize {
                    if con[i][x] > 0.0 {
                        if hmm.msc[x][k] <= NEG_INF {
                            best = NEG_INF;
                            break;
                        }
                        acc += hmm.msc[x][k] as f32 * con[i][x];
                    }
                }
                if best > NEG_INF {
                    best = acc as i32;
                }
            }
            mx.mmx.set(cur, k, best);
            tb.set_m(i, k, who);

            // delete
            let mut best = NEG_INF;
            let mut who = St::Bogus;
            let sc = badd(mx.mmx.get(cur, k - 1), hmm.tsc[TMD][k - 1]);
            if sc > best {
                best = sc;
                who = St::M;
            }
            let sc = badd(mx.dmx.get(cur, k - 1), hmm.tsc[TDD][k - 1]);
            if sc > best {
                best = sc;
                who = St::D;
            }
            mx.dmx.set(cur, k, best);
            tb.set_d(i, k, who);

            // insert
            if k < m {
                let mut best = NEG_INF;
                let mut who = St::Bogus;
                if mx.mmx.get(prv, k) > NEG_INF && hmm.tsc[TMI][k] > NEG_INF {
                    let sc =
                        (mx.mmx.get(prv, k) as f32 + hmm.tsc[TMI][k] as f32 * mocc[i]) as i32;
                    if sc > best {
                        best = sc;
                        who = St::M;
                    }
                }
                if mx.imx.get(prv, k) > NEG_INF && hmm.tsc[TII][k] > NEG_INF {
                    let sc = (mx.imx.get(prv, k) as f32
                        + hmm.tsc[TII][k] as f32 * mocc[i - 1] * mocc[i])
                        as i32;
                    if sc > best {
                        best = sc;
                        who = St::I;
                    }
                }
                if best > NEG_INF {
                    let mut acc = best as f32;
                    for x in 0..asize {
                        if con[i][x] > 0.0 {
                            if hmm.isc[x][k] <= NEG_INF {
                                best = NEG_INF;
                                break;
                            }
                            acc += hmm.isc[x][k] as f32 * con[i][x];
                        }
                    }
                    if best > NEG_INF {
                        best = acc as i32;
                    }
                }
                mx.imx.set(cur, k, best);
                tb.set_i(i, k, who);
            }
        }

        // specials; N and C loops are occupancy-weighted, J is not used
        let mut xn = NEG_INF;
        if mx.xmx.get(prv, XMN) > NEG_INF && hmm.xsc[XTN][LOOP] > NEG_INF {
            xn = (mx.xmx.get(prv, XMN) as f32 + hmm.xsc[XTN][LOOP] as f32 * mocc[i]) as i32;
            tb.set_x(i, XMN, St::N);
        }
        mx.xmx.set(cur, XMN, xn);

        let mut xe = NEG_INF;
        for k in 1..=m {
            let sc = badd(mx.mmx.get(cur, k), hmm.esc[k]);
            if sc > xe {
                xe = sc;
                tb.esrc[i] = k;
            }
        }
        mx.xmx.set(cur, XME, xe);

        let mut xb = NEG_INF;
        let sc = badd(xn, hmm.xsc[XTN][MOVE]);
        if sc > xb {
            xb = sc;
            tb.set_x(i, XMB, St::N);
        }
        mx.xmx.set(cur, XMB, xb);

        let mut xc = NEG_INF;
        if mx.xmx.get(prv, XMC) > NEG_INF && hmm.xsc[XTC][LOOP] > NEG_INF {
            xc = (mx.xmx.get(prv, XMC) as f32 + hmm.xsc[XTC][LOOP] as f32 * mocc[i]) as i32;
            tb.set_x(i, XMC, St::C);
        }
        let sc = badd(xe, hmm.xsc[XTE][MOVE]);
        if sc > xc {
            xc = sc;
            tb.set_x(i, XMC, St::E);
        }
        mx.xmx.set(cur, XMC, xc);
    }

    shadow_trace(&tb, hmm, alen)
}

/// Walk a shadow matrix back from (L, C) to (0, S), building the master
/// trace. Positions in the result are alignment columns.
pub fn shadow_trace(tb: &ShadowMatrix, hmm: &Plan7, l: usize) -> Result<Trace, DpError> {
    use StateType as St;
    let mut tr = Trace::for_seq(l);

    tr.push(St::T, 0, 0);
    let mut i = l;
    let mut k = 0usize;
    let mut nxt = St::C;

    while nxt != St::S {
        match nxt {
            St::M => {
                nxt = tb.m(i, k);
                tr.push(St::M, k, i);
                k -= 1;
                i -= 1;
            }
            St::I => {
                nxt = tb.i(i, k);
                tr.push(St::I, k, i);
                i -= 1;
            }
            St::D => {
                nxt = tb.d(i, k);
                tr.push(St::D, k, 0);
                k -= 1;
            }
            St::N => {
                nxt = tb.x(i, XMN);
                let pos = if nxt == St::N {
                    let p = i;
                    i -= 1;
                    p
                } else {
                    0 // first N of the run does not emit
                };
                tr.push(St::N, 0, pos);
            }
            St::B => {
                // unfold the entry wing if the folded bsc carries it
                if prob2score(hmm.begin[k + 1], hmm.p1) + INTSCALE <= hmm.bsc[k + 1] {
                    while k > 0 {
                        tr.push(St::D, k, 0);
                        k -= 1;
                    }
                }
                nxt = tb.x(i, XMB);
                tr.push(St::B, 0, 0);
            }
            St::E => {
                k = tb.esrc[i];
                nxt = St::M;
                tr.push(St::E, 0, 0);
                if prob2score(hmm.end[k], 1.0) + INTSCALE <= hmm.esc[k] {
                    for dk in (k + 1..=hmm.m).rev() {
                        tr.push(St::D, dk, 0);
                    }
                }
            }
            St::C => {
                nxt = tb.x(i, XMC);
                let pos = if nxt == St::C {
                    let p = i;
                    i -= 1;
                    p
                } else {
                    0
                };
                tr.push(St::C, 0, pos);
            }
            other => {
                return Err(DpError::TracebackFailed { state: other, i, k });
            }
        }
    }
    tr.push(St::S, 0, 0);
    tr.reverse();
    Ok(tr)
}
