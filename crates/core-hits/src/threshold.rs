//! Score and E-value cutoffs, including Pfam autocuts.

use core_model::Plan7;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThresholdError {
    #[error("model '{model}' does not carry the {cutoff} cutoffs")]
    MissingCutoff {
        model: String,
        cutoff: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Autocut {
    #[default]
    None,
    /// Pfam gathering thresholds.
    Ga,
    /// Trusted cutoffs.
    Tc,
    /// Noise cutoffs.
    Nc,
}

/// The active cutoff set for one search. `z` is the effective database
/// size; when unset, the number of targets searched so far stands in, so
/// E-value thresholds are only final at output time.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub glob_e: f64,
    pub glob_t: f32,
    pub dom_e: f64,
    pub dom_t: f32,
    pub autocut: Autocut,
    pub z: Option<usize>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            glob_e: 10.0,
            glob_t: f32::NEG_INFINITY,
            dom_e: f64::INFINITY,
            dom_t: f32::NEG_INFINITY,
            autocut: Autocut::None,
            z: None,
        }
    }
}

impl Thresholds {
    /// Replace the bit thresholds with the model's embedded cutoff pair and
    /// disable E-value thresholds. No effect when autocut is `None`; an
    /// error when the model lacks the requested pair.
    pub fn set_autocuts(&mut self, hmm: &Plan7) -> Result<(), ThresholdError> {
        let (pair, which) = match self.autocut {
            Autocut::None => return Ok(()),
            Autocut::Ga => (hmm.ga, "GA"),
            Autocut::Tc => (hmm.tc, "TC"),
            Autocut::Nc => (hmm.nc, "NC"),
        };
        let Some((glob, dom)) = pair else {
            return Err(ThresholdError::MissingCutoff {
                model: hmm.name.clone(),
                cutoff: which,
            });
        };
        self.glob_t = glob;
        self.dom_t = dom;
        self.glob_e = f64::INFINITY;
        self.dom_e = f64::INFINITY;
        Ok(())
    }

    /// E-value for a P-value, given how many targets have been searched.
    pub fn evalue(&self, pvalue: f64, searched: usize) -> f64 {
        pvalue * self.z.unwrap_or(searched) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_alphabet::Alphabet;

    fn model_with_cutoffs() -> Plan7 {
        let abet = Alphabet::nucleic();
        let mut hmm = Plan7::new(2, &abet).unwrap();
        hmm.name = "cutoffs".into();
        hmm.ga = Some((25.0, 22.0));
        hmm
    }

    #[test]
    fn ga_overrides_bit_thresholds_and_disables_evalues() {
        let hmm = model_with_cutoffs();
        let mut th = Thresholds {
            autocut: Autocut::Ga,
            ..Thresholds::default()
        };
        th.set_autocuts(&hmm).unwrap();
        assert_eq!(th.glob_t, 25.0);
        assert_eq!(th.dom_t, 22.0);
        assert!(th.glob_e.is_infinite());
        assert!(th.dom_e.is_infinite());
    }

    #[test]
    fn missing_cutoff_is_an_error() {
        let hmm = model_with_cutoffs();
        let mut th = Thresholds {
            autocut: Autocut::Tc,
            ..Thresholds::default()
        };
        assert!(matches!(
            th.set_autocuts(&hmm),
            Err(ThresholdError::MissingCutoff { cutoff: "TC", .. })
        ));
        // autocut None leaves everything alone
        let mut th = Thresholds::default();
        th.set_autocuts(&hmm).unwrap();
        assert_eq!(th.glob_e, 10.0);
    }

    #[test]
    fn evalue_scales_by_z_or_searched_count() {
        let mut th = Thresholds::default();
        assert_eq!(th.evalue(0.01, 300), 3.0);
        th.z = Some(10_000);
        assert_eq!(th.evalue(0.01, 300), 100.0);
    }
}
