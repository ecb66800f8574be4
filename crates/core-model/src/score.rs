//! Integer log-odds score arithmetic.
//!
//! All DP scores are signed integers scaled by [`INTSCALE`] in base-2 log
//! space: probability 1.0 maps to 0, and -infinity is the [`NEG_INF`]
//! sentinel. Any operand at or below the sentinel must be treated as
//! -infinity and kept out of further additions.

use std::sync::OnceLock;

/// Integer scores per bit.
pub const INTSCALE: i32 = 1000;

/// The -infinity sentinel.
pub const NEG_INF: i32 = -987_654_321;

/// Gap range covered by the log-sum table; beyond it the smaller operand
/// contributes nothing at integer precision.
const LOGSUM_TBL: usize = 16_000;

/// Scaled integer log-odds of probability `p` against background `null`.
pub fn prob2score(p: f32, null: f32) -> i32 {
    if p == 0.0 {
        NEG_INF
    } else {
        (INTSCALE as f32 * (p / null).log2()).round() as i32
    }
}

/// Inverse of [`prob2score`]: recover a probability from a scaled score.
pub fn score2prob(sc: i32, null: f32) -> f32 {
    if sc <= NEG_INF {
        0.0
    } else {
        null * (sc as f32 / INTSCALE as f32).exp2()
    }
}

/// Convert a scaled integer score to bits.
pub fn scorify(sc: i32) -> f32 {
    sc as f32 / INTSCALE as f32
}

fn logsum_table() -> &'static [i32; LOGSUM_TBL] {
    static TABLE: OnceLock<[i32; LOGSUM_TBL]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut t = [0i32; LOGSUM_TBL];
        for (d, slot) in t.iter_mut().enumerate() {
            let x = -(d as f32) / INTSCALE as f32;
            *slot = (INTSCALE as f32 * (1.0 + x.exp2()).log2()).round() as i32;
        }
        t
    })
}

/// log2-space sum of two scaled scores: the Forward recurrence's replacement
/// for `max`. Table-driven; exact max when the gap exceeds the table range.
pub fn ilogsum(a: i32, b: i32) -> i32 {
    if a <= NEG_INF {
        return b;
    }
    if b <= NEG_INF {
        return a;
    }
    let (hi, lo) = if a > b { (a, b) } else { (b, a) };
    let d = (hi - lo) as usize;
    if d >= LOGSUM_TBL {
        hi
    } else {
        hi + logsum_table()[d]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_probability_scores_zero() {
        assert_eq!(prob2score(1.0, 1.0), 0);
        assert_eq!(prob2score(0.0, 0.25), NEG_INF);
        assert_eq!(prob2score(0.5, 0.25), INTSCALE); // one bit
    }

    #[test]
    fn score_prob_round_trip_is_fixed_point() {
        for &(p, null) in &[(0.3f32, 0.25f32), (0.05, 0.0761), (0.9, 0.25)] {
            let sc = prob2score(p, null);
            let p2 = score2prob(sc, null);
            assert_eq!(prob2score(p2, null), sc);
        }
        assert_eq!(score2prob(NEG_INF, 0.25), 0.0);
    }

    #[test]
    fn ilogsum_dominates_max() {
        assert_eq!(ilogsum(NEG_INF, 1234), 1234);
        assert_eq!(ilogsum(1234, NEG_INF), 1234);
        // equal operands gain exactly one bit
        assert_eq!(ilogsum(0, 0), INTSCALE);
        // sum is never below max, never more than a bit above
        for (a, b) in [(0, -500), (2000, 1999), (-3000, 4000)] {
            let s = ilogsum(a, b);
            let m = a.max(b);
            assert!(s >= m && s <= m + INTSCALE, "a={a} b={b} s={s}");
        }
        // beyond the table the small operand vanishes
        assert_eq!(ilogsum(0, -(LOGSUM_TBL as i32)), 0);
    }

    #[test]
    fn scorify_scales_to_bits() {
        assert!((scorify(2500) - 2.5).abs() < 1e-6);
    }
}
