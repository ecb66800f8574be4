//! Plan 7 dynamic-programming algorithms.
//!
//! Four engines share one recurrence and one tie-break contract and must
//! agree bit-for-bit on scores:
//!   - [`viterbi`]: full O(LM) matrix, optimal trace recovered by
//!     [`viterbi_trace`].
//!   - [`forward`]: same sweep with integer log-sum in place of max.
//!   - [`parsing_viterbi`]: two rows plus O(L) begin/end back-pointers;
//!     returns a collapsed domain parse.
//!   - [`wee_viterbi`]: divide-and-conquer over one domain interval, Theta(M)
//!     memory.
//! [`small_viterbi`] composes the last two under a memory cap, and
//! [`align_alignment`] runs the consensus-weighted variant over a multiple
//! alignment.
//!
//! Tie-breaking: when predecessors tie, the first checked wins, in the
//! order M: MM, IM, B, DM; D: MD, DD; I: MI, II; E: ascending k. All
//! tracebacks resolve ties in this same order.

mod align;
mod forward;
mod parsing;
mod small;
mod viterbi;
mod wee;

pub use align::{align_alignment, shadow_trace};
pub use forward::forward;
pub use parsing::parsing_viterbi;
pub use small::small_viterbi;
pub use viterbi::{viterbi, viterbi_trace};
pub use wee::wee_viterbi;

use core_matrix::DpMatrix;
use core_model::{Plan7, NEG_INF};
use core_trace::{StateType, Trace, TraceError};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DpError {
    #[error("traceback failed in {state} at i={i}, k={k}")]
    TracebackFailed { state: StateType, i: usize, k: usize },
    #[error("divide-and-conquer needs a subsequence of length >= 2, got {0}")]
    SubsequenceTooShort(usize),
    #[error("no usable midpoint in segment {s1}..{s3}")]
    NoMidpoint { s1: usize, s3: usize },
    #[error("model '{0}' has no log-odds scores; call logoddsify first")]
    NoScores(String),
    #[error(transparent)]
    Trace(#[from] TraceError),
}

/// Addition on the integer score scale: any -infinity operand is absorbing.
#[inline]
pub(crate) fn badd(a: i32, b: i32) -> i32 {
    if a <= NEG_INF || b <= NEG_INF {
        NEG_INF
    } else {
        a.saturating_add(b)
    }
}

pub(crate) fn require_bits(hmm: &Plan7) -> Result<(), DpError> {
    if hmm.has_bits() {
        Ok(())
    } else {
        Err(DpError::NoScores(hmm.name.clone()))
    }
}

/// Run the optimal-alignment engine appropriate to the memory budget:
/// full Viterbi when the matrix fits under `ram_limit_mb`, the
/// parse-then-expand small Viterbi otherwise.
pub fn viterbi_auto(
    dsq: &[u8],
    l: usize,
    hmm: &Plan7,
    mx: &mut DpMatrix,
    want_trace: bool,
    ram_limit_mb: usize,
) -> Result<(f32, Option<Trace>), DpError> {
    if mx.space_ok(l, hmm.m, ram_limit_mb) {
        debug!(target: "dp.choose", l, m = hmm.m, "full viterbi");
        viterbi(dsq, l, hmm, mx, want_trace)
    } else {
        debug!(target: "dp.choose", l, m = hmm.m, "small viterbi");
        small_viterbi(dsq, l, hmm, mx, want_trace, ram_limit_mb)
    }
}
