use crate::index::{
    Fragment,
    FragmentSource,
    Terminality,
};
use crate::models::{
    CrossLinker,
    Peptide,
    Scan,
};
use crate::tolerance::MassTolerance;
use crate::utils::math::lnfact;
use nohash_hasher::IntSet;
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::{
    BTreeMap,
    HashMap,
};
use std::sync::Arc;

/// One or two peptides and the cross-linker joining them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidatePair {
    pub alpha: Arc<Peptide>,
    pub beta: Option<Arc<Peptide>>,
    /// Index into the configured cross-linkers.
    pub crosslinker: Option<usize>,
}

impl CandidatePair {
    pub fn linear(alpha: Arc<Peptide>) -> Self {
        Self {
            alpha,
            beta: None,
            crosslinker: None,
        }
    }

    pub fn crosslinked(alpha: Arc<Peptide>, beta: Arc<Peptide>, crosslinker: usize) -> Self {
        Self {
            alpha,
            beta: Some(beta),
            crosslinker: Some(crosslinker),
        }
    }

    pub fn is_crosslinked(&self) -> bool {
        self.beta.is_some()
    }

    pub fn peptides(&self) -> Vec<Arc<Peptide>> {
        std::iter::once(self.alpha.clone())
            .chain(self.beta.iter().cloned())
            .collect()
    }

    pub fn is_decoy(&self) -> bool {
        self.alpha.is_decoy() || self.beta.as_ref().is_some_and(|b| b.is_decoy())
    }
}

/// A theoretical fragment explained by an observed peak.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FragmentMatch {
    /// 0 for alpha, 1 for beta.
    pub peptide: u8,
    /// Index of the fragment in the peptide's theoretical list.
    pub fragment: u32,
    pub terminality: Terminality,
    pub theoretical_mz: f64,
    pub peak: usize,
    pub error: f64,
}

/// Post-match clean-up steps, applied in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchCleanup {
    /// One fragment per peak, the smallest absolute error wins.
    DuplicatePeaks,
    /// One peak per fragment, the most intense peak wins.
    PrimaryFragments,
}

/// Full match of a candidate pair against a scan.
#[derive(Debug, Clone)]
pub struct CandidateMatch<'a> {
    pub scan: &'a Scan,
    pub pair: CandidatePair,
    pub crosslinker: Option<&'a CrossLinker>,
    pub link_sites: Vec<usize>,
    pub theoretical_count: usize,
    pub matches: Vec<FragmentMatch>,
}

impl<'a> CandidateMatch<'a> {
    pub fn build(
        scan: &'a Scan,
        pair: CandidatePair,
        crosslinker: Option<&'a CrossLinker>,
        source: &dyn FragmentSource,
        tolerance: MassTolerance,
    ) -> Self {
        let mut link_sites = Vec::new();
        let theoretical: Vec<Vec<Fragment>> = match (&pair.beta, crosslinker) {
            (Some(beta), Some(xl)) => {
                let site_a = xl.link_sites(&pair.alpha).first().copied().unwrap_or(0);
                let site_b = xl.link_sites(beta).first().copied().unwrap_or(0);
                link_sites = vec![site_a, site_b];
                vec![
                    source.crosslinked_fragments(&pair.alpha, site_a, beta.mass(), xl),
                    source.crosslinked_fragments(beta, site_b, pair.alpha.mass(), xl),
                ]
            }
            _ => vec![source.fragments(&pair.alpha)],
        };

        let mut matches = Vec::new();
        for (pep_idx, frags) in theoretical.iter().enumerate() {
            for (frag_idx, frag) in frags.iter().enumerate() {
                let (lo, hi) = tolerance.window(frag.mz, frag.mz);
                for peak in scan.peak_range(lo, hi) {
                    matches.push(FragmentMatch {
                        peptide: pep_idx as u8,
                        fragment: frag_idx as u32,
                        terminality: frag.terminality,
                        theoretical_mz: frag.mz,
                        peak,
                        error: scan.peaks()[peak].mz - frag.mz,
                    });
                }
            }
        }

        Self {
            scan,
            pair,
            crosslinker,
            link_sites,
            theoretical_count: theoretical.iter().map(|f| f.len()).sum(),
            matches,
        }
    }

    pub fn apply_cleanup(&mut self, steps: &[MatchCleanup]) {
        for step in steps {
            match step {
                MatchCleanup::DuplicatePeaks => self.resolve_duplicate_peaks(),
                MatchCleanup::PrimaryFragments => self.select_primary_fragments(),
            }
        }
    }

    /// Keeps, per key, the match that `better` prefers; the first one on ties.
    fn retain_best<K: std::hash::Hash + Eq>(
        &mut self,
        key: impl Fn(&FragmentMatch) -> K,
        better: impl Fn(&FragmentMatch, &FragmentMatch) -> bool,
    ) {
        let mut best: HashMap<K, usize> = HashMap::new();
        for (i, m) in self.matches.iter().enumerate() {
            best.entry(key(m))
                .and_modify(|b| {
                    if better(m, &self.matches[*b]) {
                        *b = i;
                    }
                })
                .or_insert(i);
        }
        let keep: IntSet<usize> = best.into_values().collect();
        let mut i = 0;
        self.matches.retain(|_| {
            let k = keep.contains(&i);
            i += 1;
            k
        });
    }

    fn resolve_duplicate_peaks(&mut self) {
        self.retain_best(|m| m.peak, |a, b| a.error.abs() < b.error.abs());
    }

    fn select_primary_fragments(&mut self) {
        let peaks = self.scan.peaks();
        self.retain_best(
            |m| (m.peptide, m.fragment),
            |a, b| peaks[a.peak].intensity > peaks[b.peak].intensity,
        );
    }

    fn matched_peaks(&self) -> IntSet<usize> {
        self.matches.iter().map(|m| m.peak).collect()
    }

    pub fn matched_peak_count(&self) -> usize {
        self.matched_peaks().len()
    }

    pub fn matched_intensity(&self) -> f64 {
        let peaks = self.scan.peaks();
        self.matched_peaks().iter().map(|i| peaks[*i].intensity).sum()
    }

    /// Distinct matched fragments per ion series.
    pub fn series_counts(&self) -> (u32, u32) {
        let mut seen = std::collections::HashSet::new();
        let (mut n, mut c) = (0, 0);
        for m in self.matches.iter() {
            if !seen.insert((m.peptide, m.fragment)) {
                continue;
            }
            match m.terminality {
                Terminality::NTerm => n += 1,
                Terminality::CTerm => c += 1,
                Terminality::None => {}
            }
        }
        (n, c)
    }
}

/// A named score computed from a full match.
pub trait SubScore: Send + Sync {
    fn name(&self) -> &'static str;
    fn score(&self, m: &CandidateMatch<'_>) -> f64;
}

pub struct FragmentsMatched;
pub struct PeakCoverage;
pub struct ExplainedIntensity;

/// `ln(Nn!) + ln(Nc!) + ln(1 + matched intensity)`, with `Nn`/`Nc` the number
/// of matched N- and C-terminal fragments.
pub struct MatchScore;

impl SubScore for FragmentsMatched {
    fn name(&self) -> &'static str {
        "fragments_matched"
    }

    fn score(&self, m: &CandidateMatch<'_>) -> f64 {
        let (n, c) = m.series_counts();
        (n + c) as f64
    }
}

impl SubScore for PeakCoverage {
    fn name(&self) -> &'static str {
        "peak_coverage"
    }

    fn score(&self, m: &CandidateMatch<'_>) -> f64 {
        let total = m.scan.peaks().len();
        if total == 0 {
            return 0.0;
        }
        m.matched_peak_count() as f64 / total as f64
    }
}

impl SubScore for ExplainedIntensity {
    fn name(&self) -> &'static str {
        "explained_intensity"
    }

    fn score(&self, m: &CandidateMatch<'_>) -> f64 {
        let total = m.scan.total_intensity();
        if total <= 0.0 {
            return 0.0;
        }
        m.matched_intensity() / total
    }
}

impl SubScore for MatchScore {
    fn name(&self) -> &'static str {
        "match_score"
    }

    fn score(&self, m: &CandidateMatch<'_>) -> f64 {
        let (n, c) = m.series_counts();
        lnfact(n) + lnfact(c) + m.matched_intensity().max(0.0).ln_1p()
    }
}

pub fn default_sub_scores() -> Vec<Box<dyn SubScore>> {
    vec![
        Box::new(FragmentsMatched),
        Box::new(PeakCoverage),
        Box::new(ExplainedIntensity),
        Box::new(MatchScore),
    ]
}

/// Runs every sub-score, in registration order.
pub fn compute_sub_scores(
    m: &CandidateMatch<'_>,
    sub_scores: &[Box<dyn SubScore>],
) -> BTreeMap<String, f64> {
    sub_scores
        .iter()
        .map(|s| (s.name().to_string(), s.score(m)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ResidueLadder;
    use crate::index::fragment_index::{
        PROTON,
        WATER,
    };
    use crate::models::{
        DecoyMarking,
        Peak,
    };

    fn ladder() -> ResidueLadder {
        ResidueLadder::new(
            [('G', 57.02146), ('A', 71.03711), ('K', 128.09496)]
                .into_iter()
                .collect(),
        )
    }

    fn gak() -> Arc<Peptide> {
        let mass = ladder().peptide_mass("GAK", &[]).unwrap();
        Arc::new(Peptide::new("GAK", mass, DecoyMarking::Target))
    }

    #[test]
    fn test_match_and_cleanup() {
        let b1 = 57.02146 + PROTON;
        let y1 = 128.09496 + WATER + PROTON;
        let scan = Scan::new(
            "run",
            1,
            300.0,
            1,
            vec![
                Peak { mz: b1 - 0.0001, intensity: 10.0 },
                Peak { mz: b1 + 0.00002, intensity: 5.0 },
                Peak { mz: y1, intensity: 20.0 },
                Peak { mz: 500.0, intensity: 65.0 },
            ],
        );
        let l = ladder();
        let mut m = CandidateMatch::build(
            &scan,
            CandidatePair::linear(gak()),
            None,
            &l,
            MassTolerance::Ppm(20.0),
        );
        assert_eq!(m.theoretical_count, 4);
        // b1 hits two peaks, y1 one
        assert_eq!(m.matches.len(), 3);

        m.apply_cleanup(&[MatchCleanup::DuplicatePeaks, MatchCleanup::PrimaryFragments]);
        assert_eq!(m.matches.len(), 2);
        // The more intense of the two b1 candidates is kept.
        assert!(m.matches.iter().any(|x| x.peak == 0));
        assert_eq!(m.series_counts(), (1, 1));
        assert_eq!(m.matched_intensity(), 30.0);

        let scores = compute_sub_scores(&m, &default_sub_scores());
        assert_eq!(scores["fragments_matched"], 2.0);
        assert_eq!(scores["peak_coverage"], 0.5);
        assert_eq!(scores["explained_intensity"], 0.3);
        assert!((scores["match_score"] - 31f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn test_pair_identity() {
        let a = CandidatePair::linear(gak());
        let b = CandidatePair::linear(gak());
        assert_eq!(a, b);
        assert!(!a.is_crosslinked());
        assert_eq!(a.peptides().len(), 1);
    }
}
