//! Growable ranked lists of hits.

use crate::FancyAli;

/// One reported hit: sort key plus identity, significance, coordinate
/// ranges, domain bookkeeping, and an optional attached alignment. A
/// per-domain hit carries its "mother" (whole-sequence) significance so the
/// output stage can re-check global thresholds.
#[derive(Debug, Clone)]
pub struct Hit {
    pub sortkey: f64,
    pub pvalue: f64,
    pub score: f32,
    pub motherp: f64,
    pub mothersc: f32,
    pub name: String,
    pub acc: Option<String>,
    pub desc: Option<String>,
    pub sqfrom: usize,
    pub sqto: usize,
    pub sqlen: usize,
    pub hmmfrom: usize,
    pub hmmto: usize,
    pub hmmlen: usize,
    pub domidx: usize,
    pub ndom: usize,
    pub ali: Option<FancyAli>,
}

/// A hit collection: registration in any order, one full sort by sort key
/// before reporting. Registration order is non-deterministic under the
/// worker pool; the sort restores a stable order.
#[derive(Debug, Default)]
pub struct TopHits {
    hits: Vec<Hit>,
}

impl TopHits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hit: Hit) {
        self.hits.push(hit);
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Sort descending by sort key; ties keep registration order.
    pub fn full_sort(&mut self) {
        self.hits
            .sort_by(|a, b| b.sortkey.total_cmp(&a.sortkey));
    }

    /// Widest hit name, for column layout.
    pub fn max_name_len(&self) -> usize {
        self.hits.iter().map(|h| h.name.len()).max().unwrap_or(0)
    }

    pub fn get(&self, rank: usize) -> &Hit {
        &self.hits[rank]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hit> {
        self.hits.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(name: &str, sortkey: f64, score: f32) -> Hit {
        Hit {
            sortkey,
            pvalue: 1e-3,
            score,
            motherp: 1e-3,
            mothersc: score,
            name: name.into(),
            acc: None,
            desc: None,
            sqfrom: 1,
            sqto: 10,
            sqlen: 10,
            hmmfrom: 1,
            hmmto: 5,
            hmmlen: 5,
            domidx: 1,
            ndom: 1,
            ali: None,
        }
    }

    #[test]
    fn sort_is_descending_and_stable() {
        let mut th = TopHits::new();
        th.register(hit("mid", 5.0, 5.0));
        th.register(hit("first-of-tie", 9.0, 9.0));
        th.register(hit("second-of-tie", 9.0, 9.1));
        th.register(hit("low", -2.0, -2.0));
        th.full_sort();
        let names: Vec<&str> = th.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["first-of-tie", "second-of-tie", "mid", "low"]);
    }

    #[test]
    fn name_width_tracks_longest() {
        let mut th = TopHits::new();
        assert_eq!(th.max_name_len(), 0);
        th.register(hit("ab", 1.0, 1.0));
        th.register(hit("a-much-longer-name", 2.0, 2.0));
        assert_eq!(th.max_name_len(), 18);
    }
}
