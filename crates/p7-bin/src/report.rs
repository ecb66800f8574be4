//! Ranked report tables: whole-sequence scores, parsed domains, and the
//! top domain alignments.

use core_hits::{Thresholds, TopHits};
use std::io::Write;

pub struct ReportOptions {
    pub show_acc: bool,
    /// Cap on rendered alignments; 0 suppresses the alignment section.
    pub ali_limit: usize,
}

fn display_name(h: &core_hits::Hit, show_acc: bool) -> &str {
    if show_acc {
        h.acc.as_deref().unwrap_or(&h.name)
    } else {
        &h.name
    }
}

/// Print the three report sections. `searched` is the number of targets
/// actually scanned, standing in for Z when the caller never set it.
pub fn print_report<W: Write>(
    out: &mut W,
    ghit: &mut TopHits,
    dhit: &mut TopHits,
    thresh: &Thresholds,
    searched: usize,
    opts: &ReportOptions,
    target_label: &str,
) -> std::io::Result<()> {
    ghit.full_sort();
    dhit.full_sort();

    let namewidth = ghit.max_name_len().max(dhit.max_name_len()).max(8);

    writeln!(
        out,
        "\nScores for complete sequences (score includes all domains):"
    )?;
    writeln!(
        out,
        "{:<namewidth$} {:>7} {:>10} {:>3}",
        target_label, "Score", "E-value", "N"
    )?;
    writeln!(
        out,
        "{:<namewidth$} {:>7} {:>10} {:>3}",
        "--------", "-----", "-------", "---"
    )?;
    let mut reported = 0usize;
    for h in ghit.iter() {
        let evalue = thresh.evalue(h.pvalue, searched);
        if evalue <= thresh.glob_e && h.score >= thresh.glob_t {
            writeln!(
                out,
                "{:<namewidth$} {:>7.1} {:>10.2e} {:>3}",
                display_name(h, opts.show_acc),
                h.score,
                evalue,
                h.ndom
            )?;
            reported += 1;
        }
    }
    if reported == 0 {
        writeln!(out, "\t[no hits above thresholds]")?;
    }

    writeln!(out, "\nParsed for domains:")?;
    writeln!(
        out,
        "{:<namewidth$} {:>7} {:>5} {:>5}    {:>5} {:>5}    {:>7} {:>9}",
        target_label, "Domain", "seq-f", "seq-t", "hmm-f", "hmm-t", "score", "E-value"
    )?;
    writeln!(
        out,
        "{:<namewidth$} {:>7} {:>5} {:>5}    {:>5} {:>5}    {:>7} {:>9}",
        "--------", "-------", "-----", "-----", "-----", "-----", "-----", "-------"
    )?;
    reported = 0;
    for h in dhit.iter() {
        let evalue = thresh.evalue(h.pvalue, searched);
        // the mother sequence must itself satisfy the global thresholds
        if thresh.evalue(h.motherp, searched) > thresh.glob_e || h.mothersc < thresh.glob_t
        {
            continue;
        }
        if evalue <= thresh.dom_e && h.score >= thresh.dom_t {
            writeln!(
                out,
                "{:<namewidth$} {:>3}/{:<3} {:>5} {:>5} {}{} {:>5} {:>5} {}{} {:>7.1} {:>9.2e}",
                display_name(h, opts.show_acc),
                h.domidx,
                h.ndom,
                h.sqfrom,
                h.sqto,
                if h.sqfrom == 1 { '[' } else { '.' },
                if h.sqto == h.sqlen { ']' } else { '.' },
                h.hmmfrom,
                h.hmmto,
                if h.hmmfrom == 1 { '[' } else { '.' },
                if h.hmmto == h.hmmlen { ']' } else { '.' },
                h.score,
                evalue
            )?;
            reported += 1;
        }
    }
    if reported == 0 {
        writeln!(out, "\t[no hits above thresholds]")?;
    }

    if opts.ali_limit > 0 {
        writeln!(out, "\nAlignments of top-scoring domains:")?;
        reported = 0;
        for h in dhit.iter() {
            if reported == opts.ali_limit {
                writeln!(
                    out,
                    "\t[output cut off at A = {} top alignments]",
                    opts.ali_limit
                )?;
                break;
            }
            let evalue = thresh.evalue(h.pvalue, searched);
            if thresh.evalue(h.motherp, searched) > thresh.glob_e
                || h.mothersc < thresh.glob_t
            {
                continue;
            }
            if evalue <= thresh.dom_e && h.score >= thresh.dom_t {
                if let Some(ali) = &h.ali {
                    writeln!(
                        out,
                        "{}: domain {} of {}, from {} to {}: score {:.1}, E = {:.2e}",
                        display_name(h, opts.show_acc),
                        h.domidx,
                        h.ndom,
                        h.sqfrom,
                        h.sqto,
                        h.score,
                        evalue
                    )?;
                    write!(out, "{ali}")?;
                    reported += 1;
                }
            }
        }
        if reported == 0 {
            writeln!(out, "\t[no hits above thresholds]")?;
        }
    }

    writeln!(out, "//")
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_hits::Hit;

    fn hit(name: &str, score: f32, pvalue: f64) -> Hit {
        Hit {
            sortkey: score as f64,
            pvalue,
            score,
            motherp: pvalue,
            mothersc: score,
            name: name.into(),
            acc: Some(format!("ACC_{name}")),
            desc: None,
            sqfrom: 1,
            sqto: 40,
            sqlen: 40,
            hmmfrom: 1,
            hmmto: 10,
            hmmlen: 10,
            domidx: 1,
            ndom: 1,
            ali: None,
        }
    }

    #[test]
    fn thresholds_gate_the_tables() {
        let mut ghit = TopHits::new();
        let mut dhit = TopHits::new();
        ghit.register(hit("keeper", 50.0, 1e-12));
        ghit.register(hit("discard", 3.0, 0.9));
        dhit.register(hit("keeper", 48.0, 1e-11));
        let thresh = Thresholds {
            glob_e: 1e-3,
            ..Thresholds::default()
        };
        let mut buf = Vec::new();
        print_report(
            &mut buf,
            &mut ghit,
            &mut dhit,
            &thresh,
            100,
            &ReportOptions {
                show_acc: false,
                ali_limit: 10,
            },
            "Sequence",
        )
        .unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("keeper"));
        assert!(!text.contains("discard"));
        assert!(text.contains("//"));
    }

    #[test]
    fn accession_display_is_optional() {
        let mut ghit = TopHits::new();
        let mut dhit = TopHits::new();
        ghit.register(hit("named", 30.0, 1e-9));
        let mut buf = Vec::new();
        print_report(
            &mut buf,
            &mut ghit,
            &mut dhit,
            &Thresholds::default(),
            10,
            &ReportOptions {
                show_acc: true,
                ali_limit: 0,
            },
            "Model",
        )
        .unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("ACC_named"));
    }
}
