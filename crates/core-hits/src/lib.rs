//! Hit postprocessing: thresholds, the ad-hoc second null model, fancy
//! alignments, top-hit lists, and the significant-hit pipeline that turns a
//! raw (trace, score) pair into reported per-sequence and per-domain hits.

mod fancy;
mod null2;
mod postprocess;
mod threshold;
mod tophits;

pub use fancy::FancyAli;
pub use null2::trace_score_correction;
pub use postprocess::{postprocess_significant_hit, ScanMode};
pub use threshold::{Autocut, ThresholdError, Thresholds};
pub use tophits::{Hit, TopHits};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HitError {
    #[error("trace decomposed into zero domains")]
    EmptyTrace,
    #[error(transparent)]
    Trace(#[from] core_trace::TraceError),
}
