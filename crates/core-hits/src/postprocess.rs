//! Turning one scored alignment into reported hits.

use crate::{trace_score_correction, FancyAli, Hit, HitError, Thresholds, TopHits};
use core_alphabet::Alphabet;
use core_model::Plan7;
use core_trace::Trace;
use tracing::debug;

/// Which scanner is running; decides hit naming and sort keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// One sequence against many models: per-sequence hits sort by E-value
    /// (score breaks ties at E = 0, since score and E-value need not be
    /// monotonic across differently calibrated models); domain hits sort by
    /// position in the sequence.
    SeqAgainstModels,
    /// One model against many sequences: sort by score, which is monotonic
    /// with E-value for a single model.
    ModelAgainstSeqs,
}

/// Postprocess a significant hit: decompose the trace into domains,
/// rescore each (optionally null2-corrected), apply domain thresholds, and
/// register per-domain hits plus one whole-sequence hit. Returns the final
/// whole-sequence score.
///
/// With `do_forward`, the whole-sequence score is the caller's Forward
/// score (`sc_override`) rather than the sum of domain scores; domain
/// scores stay trace-derived. A `None` trace means the alignment was
/// impossible: the override score is returned and nothing registers.
#[allow(clippy::too_many_arguments)]
pub fn postprocess_significant_hit(
    ghit: &mut TopHits,
    dhit: &mut TopHits,
    tr: Option<&Trace>,
    hmm: &Plan7,
    abet: &Alphabet,
    dsq: &[u8],
    l: usize,
    seqname: &str,
    seqacc: Option<&str>,
    seqdesc: Option<&str>,
    do_forward: bool,
    sc_override: f32,
    do_null2: bool,
    thresh: &Thresholds,
    mode: ScanMode,
) -> Result<f32, HitError> {
    let Some(tr) = tr else {
        return Ok(sc_override);
    };

    let tarr = tr.decompose();
    if tarr.is_empty() {
        return Err(HitError::EmptyTrace);
    }

    // Rescore each domain; positive scorers are kept and summed into the
    // whole-sequence score.
    let mut score = Vec::with_capacity(tarr.len());
    let mut usedomain = vec![false; tarr.len()];
    let mut ndom = 0usize;
    let mut whole_sc = 0.0f32;
    for (tidx, dom) in tarr.iter().enumerate() {
        let mut sc = dom.score(hmm, dsq)?;
        if do_null2 {
            sc -= trace_score_correction(hmm, dom, dsq, abet);
        }
        score.push(sc);
        if sc > 0.0 {
            usedomain[tidx] = true;
            ndom += 1;
            whole_sc += sc;
        }
    }

    // Weak single domain rule: always report at least one domain per
    // sequence, even at a negative score. The architecture can report one
    // negative-scoring domain but not more.
    if ndom == 0 {
        let best = score
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .expect("at least one domain");
        usedomain[best] = true;
        whole_sc = score[best];
        ndom = 1;
    }

    // Forward override: whole-sequence score comes from Forward; the
    // trace-derived null2 is already the caller's approximation.
    if do_forward {
        whole_sc = sc_override;
    }

    let (name, acc, desc) = match mode {
        ScanMode::SeqAgainstModels => (
            hmm.name.as_str(),
            hmm.acc.as_deref(),
            hmm.desc.as_deref(),
        ),
        ScanMode::ModelAgainstSeqs => (seqname, seqacc, seqdesc),
    };

    let whole_pval = hmm.pvalue(whole_sc);
    let mut didx = 1usize;
    for (tidx, dom) in tarr.iter().enumerate() {
        if !usedomain[tidx] {
            continue;
        }
        let Some((i1, i2, k1, k2)) = dom.simple_bounds() else {
            didx += 1;
            continue;
        };
        let pvalue = hmm.pvalue(score[tidx]);
        if pvalue <= thresh.dom_e && score[tidx] >= thresh.dom_t {
            let ali = FancyAli::new(dom, hmm, dsq, abet, seqname);
            let sortkey = match mode {
                // report domains in sequence order
                ScanMode::SeqAgainstModels => -(i1 as f64),
                ScanMode::ModelAgainstSeqs => score[tidx] as f64,
            };
            dhit.register(Hit {
                sortkey,
                pvalue,
                score: score[tidx],
                motherp: whole_pval,
                mothersc: whole_sc,
                name: name.to_string(),
                acc: acc.map(str::to_string),
                desc: desc.map(str::to_string),
                sqfrom: i1,
                sqto: i2,
                sqlen: l,
                hmmfrom: k1,
                hmmto: k2,
                hmmlen: hmm.m,
                domidx: didx,
                ndom,
                ali: Some(ali),
            });
        }
        didx += 1;
    }

    // Whole-sequence hit. Only the bit threshold is checked here: E-value
    // thresholding waits for the output stage, where Z is final.
    if whole_sc >= thresh.glob_t {
        let sortkey = match mode {
            ScanMode::SeqAgainstModels => {
                if whole_pval > 0.0 {
                    -whole_pval.ln()
                } else {
                    100_000.0 + whole_sc as f64
                }
            }
            ScanMode::ModelAgainstSeqs => whole_sc as f64,
        };
        ghit.register(Hit {
            sortkey,
            pvalue: whole_pval,
            score: whole_sc,
            motherp: 0.0,
            mothersc: 0.0,
            name: name.to_string(),
            acc: acc.map(str::to_string),
            desc: desc.map(str::to_string),
            sqfrom: 0,
            sqto: 0,
            sqlen: 0,
            hmmfrom: 0,
            hmmto: 0,
            hmmlen: 0,
            domidx: 0,
            ndom,
            ali: None,
        });
    } else {
        debug!(
            target: "hits.postprocess",
            name,
            whole_sc,
            "below global bit threshold"
        );
    }

    Ok(whole_sc)
}
