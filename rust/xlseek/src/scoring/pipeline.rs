//! Per-scan search pipeline.
//!
//! Every scan goes through the same four stages, each timed separately:
//!
//! 1. **Coarse (MGC)**: the most intense peaks of the scan are looked up in
//!    the fragment index. Every peptide owning a fragment at a peak gains
//!    `-ln(p)`, `p` being the chance that a random fragment falls on that
//!    peak, so rare fragments weigh more than common ones.
//! 2. **Candidates**: the best coarse peptides become alpha candidates.
//!    Alphas at the precursor mass are linear candidates, the others are
//!    paired with beta peptides that complete the precursor mass for each
//!    cross-linker.
//! 3. **Matching (MGX + full match)**: pairs are re-scored against a wider
//!    peak subset, the best survive to a full fragment match, clean-up and
//!    the registered sub-scores.
//! 4. **Ranking**: see [`super::ranking::rank_scan`].
//!
//! The pipeline holds no mutable state, so one instance is shared by every
//! worker thread.

use super::occurrence::ScoredOccurrence;
use super::ranking::{
    RankingParameters,
    ScoredCandidate,
    rank_scan,
};
use super::subscores::{
    CandidateMatch,
    CandidatePair,
    MatchCleanup,
    SubScore,
    compute_sub_scores,
    default_sub_scores,
};
use super::timings::ScanTimings;
use crate::errors::{
    Result,
    SearchError,
};
use crate::index::{
    FragmentIndex,
    FragmentSource,
    PeptideIndices,
};
use crate::models::{
    CrossLinker,
    MatchRecord,
    Peptide,
    Scan,
};
use crate::tolerance::MassTolerance;
use indexmap::IndexMap;
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{
    debug,
    trace,
};

/// Score names recorded by the pipeline itself, next to the sub-scores.
pub const PIPELINE_SCORES: [&str; 8] = [
    "mgc_alpha",
    "mgc_beta",
    "mgc_score",
    "mgc_delta",
    "mgc_rank",
    "mgx_score",
    "mgx_delta",
    "mgx_rank",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchParameters {
    pub precursor_tolerance: MassTolerance,
    pub fragment_tolerance: MassTolerance,

    /// Alpha peptide ranks kept after the coarse stage.
    pub top_mgc_hits: usize,
    /// Candidate pair ranks kept after the fine stage.
    pub top_mgx_hits: usize,

    /// Peaks kept per `peak_window` for the coarse stage. The fine stage
    /// uses twice as many.
    pub mgc_peaks: usize,
    pub peak_window: f64,

    pub evaluate_linears: bool,
    pub min_top_score: f64,
    pub output_top_only: bool,

    /// Name of the score used for ranking.
    pub primary_score: String,

    /// Coarse score ranks considered before the base sequence cut, as a
    /// multiple of `top_mgc_hits`.
    pub coarse_rank_widening: usize,
    /// Upper bound on the peptides considered before the base sequence cut,
    /// as a multiple of `top_mgc_hits`.
    pub coarse_total_widening: usize,

    /// Lightest mass a beta peptide can have (glycine).
    pub minimum_residue_mass: f64,
    pub cleanup: Vec<MatchCleanup>,
}

impl Default for SearchParameters {
    fn default() -> Self {
        Self {
            precursor_tolerance: MassTolerance::Ppm(6.0),
            fragment_tolerance: MassTolerance::Ppm(20.0),
            top_mgc_hits: 10,
            top_mgx_hits: 10,
            mgc_peaks: 20,
            peak_window: 100.0,
            evaluate_linears: true,
            min_top_score: f64::NEG_INFINITY,
            output_top_only: false,
            primary_score: "match_score".into(),
            coarse_rank_widening: 10,
            coarse_total_widening: 100,
            minimum_residue_mass: 57.02146,
            cleanup: vec![MatchCleanup::DuplicatePeaks, MatchCleanup::PrimaryFragments],
        }
    }
}

impl SearchParameters {
    fn ranking(&self) -> RankingParameters {
        RankingParameters {
            min_top_score: self.min_top_score,
            output_top_only: self.output_top_only,
        }
    }
}

/// Coarse evidence gathered for a pair before the fine stage.
#[derive(Debug, Clone, Copy, Default)]
struct PairEvidence {
    mgc_alpha: f64,
    mgc_beta: f64,
    mgc_delta: f64,
    mgc_rank: u32,
}

/// An alpha peptide that survived the coarse stage.
#[derive(Debug, Clone)]
struct Alpha {
    peptide: Arc<Peptide>,
    score: f64,
    rank: u32,
    /// Score gap to the next lower rank, 0 for the last rank.
    delta: f64,
}

pub struct SearchPipeline {
    params: SearchParameters,
    indices: Arc<PeptideIndices>,
    fragment_index: Arc<dyn FragmentIndex>,
    fragment_source: Arc<dyn FragmentSource>,
    crosslinkers: Vec<CrossLinker>,
    sub_scores: Vec<Box<dyn SubScore>>,
}

impl std::fmt::Debug for SearchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchPipeline")
            .field("params", &self.params)
            .field("peptides", &self.indices.len())
            .field("fragments", &self.fragment_index.fragment_count())
            .field("crosslinkers", &self.crosslinkers)
            .field(
                "sub_scores",
                &self.sub_scores.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl SearchPipeline {
    pub fn new(
        params: SearchParameters,
        indices: Arc<PeptideIndices>,
        fragment_index: Arc<dyn FragmentIndex>,
        fragment_source: Arc<dyn FragmentSource>,
        crosslinkers: Vec<CrossLinker>,
    ) -> Result<Self> {
        let out = Self {
            params,
            indices,
            fragment_index,
            fragment_source,
            crosslinkers,
            sub_scores: default_sub_scores(),
        };
        out.validate()?;
        Ok(out)
    }

    /// Registers an additional sub-score, computed after the built-ins.
    pub fn with_sub_score(mut self, sub_score: Box<dyn SubScore>) -> Result<Self> {
        if self.sub_scores.iter().any(|s| s.name() == sub_score.name()) {
            return Err(SearchError::Configuration {
                reason: format!("sub-score '{}' is registered twice", sub_score.name()),
            });
        }
        self.sub_scores.push(sub_score);
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        let primary = self.params.primary_score.as_str();
        let known = PIPELINE_SCORES.contains(&primary)
            || self.sub_scores.iter().any(|s| s.name() == primary);
        if !known {
            return Err(SearchError::Configuration {
                reason: format!("primary score '{primary}' is not computed by any sub-score"),
            });
        }
        if self.params.top_mgc_hits == 0 || self.params.top_mgx_hits == 0 {
            return Err(SearchError::Configuration {
                reason: "top_mgc_hits and top_mgx_hits must be at least 1".into(),
            });
        }
        if !(self.params.peak_window > 0.0) {
            return Err(SearchError::Configuration {
                reason: format!("peak_window must be positive, got {}", self.params.peak_window),
            });
        }
        Ok(())
    }

    pub fn params(&self) -> &SearchParameters {
        &self.params
    }

    pub fn indices(&self) -> &PeptideIndices {
        &self.indices
    }

    pub fn crosslinkers(&self) -> &[CrossLinker] {
        &self.crosslinkers
    }

    /// Heaviest peptide worth scoring: the precursor itself when linear
    /// matches are evaluated, else the precursor minus the lightest linker.
    fn max_candidate_mass(&self, precursor: f64) -> f64 {
        let upper = self.params.precursor_tolerance.max_bound(precursor, precursor);
        let lightest = self
            .crosslinkers
            .iter()
            .map(|xl| xl.mass())
            .min_by(|a, b| a.total_cmp(b));
        match lightest {
            Some(mass) if !self.params.evaluate_linears => upper - mass,
            _ => upper,
        }
    }

    fn coarse_scores(&self, scan: &Scan) -> ScoredOccurrence<Arc<Peptide>> {
        let mut coarse = ScoredOccurrence::new();
        let total = self.fragment_index.fragment_count() as f64;
        if total <= 0.0 {
            return coarse;
        }
        let max_mass = self.max_candidate_mass(scan.precursor_mass);
        for peak in scan.top_peaks(self.params.mgc_peaks, self.params.peak_window) {
            let owners = self.fragment_index.peptides_for_fragment_mass(peak.mz);
            if owners.is_empty() {
                continue;
            }
            let evidence = -(owners.len() as f64 / total).ln();
            for pep in owners.into_iter().filter(|p| p.mass() <= max_mass) {
                coarse.add(pep, evidence);
            }
        }
        coarse
    }

    /// Best coarse peptides, ranked densely by base sequence so that
    /// modification variants of one peptide share a rank.
    fn select_alphas(&self, coarse: &ScoredOccurrence<Arc<Peptide>>) -> Vec<Alpha> {
        let top = self.params.top_mgc_hits;
        let keys = coarse.top_n(
            top.saturating_mul(self.params.coarse_rank_widening),
            Some(top.saturating_mul(self.params.coarse_total_widening)),
        );

        let mut ranks: HashMap<&str, u32> = HashMap::new();
        let mut rank_scores: Vec<f64> = Vec::new();
        let mut out = Vec::with_capacity(keys.len());
        for pep in keys.iter() {
            let score = coarse.score(pep, 0.0);
            let rank = match ranks.get(pep.base_sequence()) {
                Some(r) => *r,
                None => {
                    let r = match rank_scores.last() {
                        Some(last) if *last == score => rank_scores.len() as u32,
                        _ => {
                            rank_scores.push(score);
                            rank_scores.len() as u32
                        }
                    };
                    ranks.insert(pep.base_sequence(), r);
                    r
                }
            };
            if rank as usize > top {
                break;
            }
            out.push(Alpha {
                peptide: pep.clone(),
                score,
                rank,
                delta: 0.0,
            });
        }
        for alpha in out.iter_mut() {
            if let Some(next) = rank_scores.get(alpha.rank as usize) {
                alpha.delta = rank_scores[alpha.rank as usize - 1] - next;
            }
        }
        out
    }

    /// Linear and cross-linked pairs for the selected alphas. A cross-linked
    /// pair found from either side is only kept once.
    fn candidate_pairs(
        &self,
        scan: &Scan,
        alphas: &[Alpha],
        coarse: &ScoredOccurrence<Arc<Peptide>>,
    ) -> Result<IndexMap<CandidatePair, PairEvidence>> {
        let precursor = scan.precursor_mass;
        let tol = self.params.precursor_tolerance;
        let mut pairs: IndexMap<CandidatePair, PairEvidence> = IndexMap::new();

        for alpha in alphas {
            let evidence = PairEvidence {
                mgc_alpha: alpha.score,
                mgc_beta: 0.0,
                mgc_delta: alpha.delta,
                mgc_rank: alpha.rank,
            };
            if tol.compare(alpha.peptide.mass(), precursor).is_eq() {
                pairs
                    .entry(CandidatePair::linear(alpha.peptide.clone()))
                    .or_insert(evidence);
                continue;
            }

            for (xl_idx, xl) in self.crosslinkers.iter().enumerate() {
                if !xl.can_crosslink(&alpha.peptide) {
                    continue;
                }
                let beta_mass = precursor - alpha.peptide.mass() - xl.mass();
                if beta_mass < self.params.minimum_residue_mass {
                    continue;
                }
                let (lo, hi) = tol.window(beta_mass, precursor);
                for beta in self.indices.crosslinkable.range_query(lo, hi)? {
                    if !xl.can_crosslink_pair(&alpha.peptide, &beta) {
                        continue;
                    }
                    let swapped =
                        CandidatePair::crosslinked(beta.clone(), alpha.peptide.clone(), xl_idx);
                    if pairs.contains_key(&swapped) {
                        continue;
                    }
                    let mgc_beta = coarse.score(&beta, 0.0);
                    pairs
                        .entry(CandidatePair::crosslinked(
                            alpha.peptide.clone(),
                            beta,
                            xl_idx,
                        ))
                        .or_insert(PairEvidence {
                            mgc_beta,
                            ..evidence
                        });
                }
            }
        }

        if self.params.evaluate_linears {
            let (lo, hi) = tol.window(precursor, precursor);
            let linears = self
                .indices
                .linear
                .range_query(lo, hi)?
                .into_iter()
                .chain(self.indices.crosslinkable.range_query(lo, hi)?);
            for pep in linears {
                let mgc_alpha = coarse.score(&pep, 0.0);
                pairs
                    .entry(CandidatePair::linear(pep))
                    .or_insert(PairEvidence {
                        mgc_alpha,
                        ..Default::default()
                    });
            }
        }
        Ok(pairs)
    }

    /// `-ln` of the chance that the peaks explained by the pair are explained
    /// by random fragments. Linear pairs use a `+1` pseudo-count so a linear
    /// candidate never outscores an equally explained cross-link.
    fn fine_score(&self, fine_scan: &Scan, pair: &CandidatePair) -> f64 {
        let total = self.fragment_index.fragment_count() as f64;
        let xl = pair.crosslinker.and_then(|i| self.crosslinkers.get(i));
        let mut m = CandidateMatch::build(
            fine_scan,
            pair.clone(),
            xl,
            self.fragment_source.as_ref(),
            self.params.fragment_tolerance,
        );
        m.apply_cleanup(&[MatchCleanup::DuplicatePeaks]);
        let pseudo = if pair.is_crosslinked() { 0.0 } else { 1.0 };
        let mut seen = nohash_hasher::IntSet::default();
        m.matches
            .iter()
            .filter(|x| seen.insert(x.peak))
            .map(|x| {
                let mz = fine_scan.peaks()[x.peak].mz;
                let count = self.fragment_index.count_peptides(mz).max(1) as f64;
                -((count + pseudo) / total).min(1.0).ln()
            })
            .sum()
    }

    /// Runs a scan through every stage. Errors are specific to this scan
    /// unless they report an index inconsistency.
    pub fn process_scan(&self, scan: &Scan, timings: &mut ScanTimings) -> Result<Vec<MatchRecord>> {
        scan.validate()?;

        let st = Instant::now();
        let coarse = self.coarse_scores(scan);
        timings.coarse += st.elapsed();
        if coarse.is_empty() && !self.params.evaluate_linears {
            return Ok(Vec::new());
        }

        let st = Instant::now();
        let alphas = self.select_alphas(&coarse);
        let pairs = self.candidate_pairs(scan, &alphas, &coarse)?;
        timings.candidates += st.elapsed();
        trace!(
            "Scan {}: {} coarse peptides, {} alphas, {} pairs",
            scan,
            coarse.len(),
            alphas.len(),
            pairs.len()
        );
        if pairs.is_empty() {
            return Ok(Vec::new());
        }

        let st = Instant::now();
        let scored = self.score_pairs(scan, pairs)?;
        timings.matching += st.elapsed();

        let st = Instant::now();
        let out = rank_scan(scan, scored, &self.crosslinkers, &self.params.ranking());
        timings.ranking += st.elapsed();
        debug!("Scan {}: {} results", scan, out.len());
        Ok(out)
    }

    fn score_pairs(
        &self,
        scan: &Scan,
        pairs: IndexMap<CandidatePair, PairEvidence>,
    ) -> Result<Vec<ScoredCandidate>> {
        let fine_scan = scan.with_peaks(
            scan.top_peaks(self.params.mgc_peaks * 2, self.params.peak_window),
        );
        let mut fine: ScoredOccurrence<CandidatePair> = ScoredOccurrence::new();
        for pair in pairs.keys() {
            fine.add(pair.clone(), self.fine_score(&fine_scan, pair));
        }

        let top = self.params.top_mgx_hits;
        let kept = fine.top_n(top, Some(top.saturating_mul(top)));
        let mut mgx_scores: Vec<f64> = kept.iter().map(|p| fine.score(p, 0.0)).collect();
        mgx_scores.dedup();

        let mut out = Vec::with_capacity(kept.len());
        for pair in kept {
            let mgx_score = fine.score(&pair, 0.0);
            let mgx_rank = mgx_scores
                .iter()
                .position(|s| *s == mgx_score)
                .map_or(mgx_scores.len(), |i| i + 1);
            let mgx_delta = mgx_scores.get(mgx_rank).map_or(0.0, |next| mgx_score - next);
            let evidence = pairs.get(&pair).copied().unwrap_or_default();

            let xl = pair.crosslinker.and_then(|i| self.crosslinkers.get(i));
            let mut m = CandidateMatch::build(
                scan,
                pair,
                xl,
                self.fragment_source.as_ref(),
                self.params.fragment_tolerance,
            );
            m.apply_cleanup(&self.params.cleanup);
            if m.matches.is_empty() {
                continue;
            }

            let mut scores = compute_sub_scores(&m, &self.sub_scores);
            if let Some((name, value)) = scores.iter().find(|(_, v)| !v.is_finite()) {
                return Err(SearchError::NonFiniteScore {
                    name: name.clone(),
                    value: *value,
                });
            }
            scores.insert("mgc_alpha".into(), evidence.mgc_alpha);
            scores.insert("mgc_beta".into(), evidence.mgc_beta);
            scores.insert("mgc_score".into(), evidence.mgc_alpha + evidence.mgc_beta);
            scores.insert("mgc_delta".into(), evidence.mgc_delta);
            scores.insert("mgc_rank".into(), evidence.mgc_rank as f64);
            scores.insert("mgx_score".into(), mgx_score);
            scores.insert("mgx_delta".into(), mgx_delta);
            scores.insert("mgx_rank".into(), mgx_rank as f64);

            let score = scores
                .get(&self.params.primary_score)
                .copied()
                .unwrap_or(f64::NEG_INFINITY);
            out.push(ScoredCandidate {
                pair: m.pair,
                link_sites: m.link_sites,
                scores,
                score,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::fragment_index::PROTON;
    use crate::index::{
        FragmentTable,
        IndexBuilder,
        IndexParameters,
        ResidueLadder,
    };
    use crate::models::{
        DecoyMarking,
        Peak,
    };

    fn ladder() -> ResidueLadder {
        ResidueLadder::new(
            [
                ('G', 57.02146),
                ('A', 71.03711),
                ('S', 87.03203),
                ('P', 97.05276),
                ('V', 99.06841),
                ('L', 113.08406),
                ('E', 129.04259),
                ('K', 128.09496),
                ('R', 156.10111),
            ]
            .into_iter()
            .collect(),
        )
    }

    fn peptide(seq: &str) -> Peptide {
        let mass = ladder().peptide_mass(seq, &[]).unwrap();
        Peptide::new(seq, mass, DecoyMarking::Target).with_source("P1", 0)
    }

    fn pipeline(peptides: &[&str], params: SearchParameters) -> SearchPipeline {
        let index_params = IndexParameters {
            min_length: 3,
            ..Default::default()
        };
        let indices = IndexBuilder::new(index_params, &[]).build(peptides.iter().map(|s| peptide(s)));
        let ladder = Arc::new(ladder());
        let table = FragmentTable::build(
            indices.iter().cloned().collect(),
            ladder.as_ref(),
            params.fragment_tolerance,
        );
        SearchPipeline::new(params, Arc::new(indices), Arc::new(table), ladder, vec![]).unwrap()
    }

    fn spectrum_of(seq: &str) -> Scan {
        let l = ladder();
        let pep = peptide(seq);
        let peaks = l
            .fragments(&pep)
            .into_iter()
            .enumerate()
            .map(|(i, f)| Peak {
                mz: f.mz,
                intensity: 10.0 + i as f64,
            })
            .collect();
        Scan::new("run", 1, pep.mass(), 2, peaks)
    }

    #[test]
    fn test_rejects_unknown_primary_score() {
        let params = SearchParameters {
            primary_score: "hyperscore".into(),
            ..Default::default()
        };
        let indices = IndexBuilder::new(IndexParameters::default(), &[]).build(vec![]);
        let ladder = Arc::new(ladder());
        let table = FragmentTable::build(vec![], ladder.as_ref(), params.fragment_tolerance);
        let err = SearchPipeline::new(params, Arc::new(indices), Arc::new(table), ladder, vec![])
            .unwrap_err();
        assert!(matches!(err, SearchError::Configuration { .. }));
    }

    #[test]
    fn test_linear_sole_match() {
        let pipe = pipeline(&["PEPSVLEK", "GASPVLR"], SearchParameters::default());
        let scan = spectrum_of("PEPSVLEK");
        let mut timings = ScanTimings::default();
        let out = pipe.process_scan(&scan, &mut timings).unwrap();
        assert_eq!(out.len(), 1);
        let top = &out[0];
        assert_eq!(top.base_sequence(), "PEPSVLEK");
        assert!(!top.is_crosslinked());
        assert_eq!(top.rank, 1);
        assert_eq!(top.combined_delta, top.score);
        assert!(top.sub_score("mgc_alpha").unwrap() > 0.0);
        assert_eq!(top.sub_score("mgc_rank"), Some(1.0));
    }

    #[test]
    fn test_invalid_scan_is_recoverable() {
        let pipe = pipeline(&["PEPSVLEK"], SearchParameters::default());
        let scan = Scan::new("run", 3, 900.0, 2, vec![]);
        let err = pipe
            .process_scan(&scan, &mut ScanTimings::default())
            .unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_no_fragments_no_results() {
        let pipe = pipeline(&["PEPSVLEK"], SearchParameters::default());
        let scan = Scan::new(
            "run",
            4,
            peptide("PEPSVLEK").mass(),
            2,
            vec![Peak {
                mz: 5000.0 + PROTON,
                intensity: 1.0,
            }],
        );
        // The precursor matches, but no fragment explains any peak.
        let out = pipe
            .process_scan(&scan, &mut ScanTimings::default())
            .unwrap();
        assert!(out.is_empty());
    }
}
