//! Forward: total log-odds probability over all paths.

use crate::{badd, require_bits, DpError};
use core_matrix::{DpMatrix, XMB, XMC, XME, XMJ, XMN};
use core_model::{
    ilogsum, scorify, Plan7, LOOP, MOVE, NEG_INF, TDD, TDM, TII, TIM, TMD, TMI, TMM, XTC, XTE,
    XTJ, XTN,
};

/// The Forward score in bits: the Viterbi recurrence with integer log-sum
/// in place of max. Always >= the Viterbi score for the same pair.
pub fn forward(dsq: &[u8], l: usize, hmm: &Plan7) -> Result<f32, DpError> {
    require_bits(hmm)?;
    let m = hmm.m;
    let mut mx = DpMatrix::new(l, m, 0, 0);

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
            let sum = ilogsum(
                ilogsum(
                    badd(mpp[k - 1], hmm.tsc[TMM][k - 1]),
                    badd(ipp[k - 1], hmm.tsc[TIM][k - 1]),
                ),
                ilogsum(
                    badd(xmb, hmm.bsc[k]),
                    badd(dpp[k - 1], hmm.tsc[TDM][k - 1]),
                ),
            );
            mc[k] = badd(sum, ms[k]);

            dc[k] = ilogsum(
                badd(mc[k - 1], hmm.tsc[TMD][k - 1]),
                badd(dc[k - 1], hmm.tsc[TDD][k - 1]),
            );

            if k < m {
                let sum = ilogsum(
                    badd(mpp[k], hmm.tsc[TMI][k]),
                    badd(ipp[k], hmm.tsc[TII][k]),
                );
                ic[k] = badd(sum, is[k]);
            }
        }

        let xn = badd(mx.xmx.get(i - 1, XMN), hmm.xsc[XTN][LOOP]);

        let mut xe = NEG_INF;
        let mrow = mx.mmx.row(i);
        for k in 1..=m {
            xe = ilogsum(xe, badd(mrow[k], hmm.esc[k]));
        }

        let xj = ilogsum(
            badd(mx.xmx.get(i - 1, XMJ), hmm.xsc[XTJ][LOOP]),
            badd(xe, hmm.xsc[XTE][LOOP]),
        );
        let xb = ilogsum(
            badd(xn, hmm.xsc[XTN][MOVE]),
            badd(xj, hmm.xsc[XTJ][MOVE]),
        );
        let xc = ilogsum(
            badd(mx.xmx.get(i - 1, XMC), hmm.xsc[XTC][LOOP]),
            badd(xe, hmm.xsc[XTE][MOVE]),
        );

        let xrow = mx.xmx.row_mut(i);
        xrow[XMN] = xn;
        xrow[XME] = xe;
        xrow[XMJ] = xj;
        xrow[XMB] = xb;
        xrow[XMC] = xc;
    }

    let sc = badd(mx.xmx.get(l, XMC), hmm.xsc[XTC][MOVE]);
    Ok(scorify(sc))
}
