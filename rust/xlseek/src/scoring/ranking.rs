//! Per-scan ranking and delta scores.

use super::subscores::CandidatePair;
use crate::models::{
    CrossLinker,
    MatchRecord,
    Scan,
};
use std::collections::{
    BTreeMap,
    HashMap,
    HashSet,
};

/// A fully scored candidate waiting to be ranked.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub pair: CandidatePair,
    pub link_sites: Vec<usize>,
    pub scores: BTreeMap<String, f64>,
    /// Value of the primary score.
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankingParameters {
    pub min_top_score: f64,
    pub output_top_only: bool,
}

impl Default for RankingParameters {
    fn default() -> Self {
        Self {
            min_top_score: f64::NEG_INFINITY,
            output_top_only: false,
        }
    }
}

/// Base sequences of the top-scoring candidates: every peptide to the set of
/// partner peptides seen with it, in both orientations.
fn top_lookup(top: &[&ScoredCandidate]) -> HashMap<String, HashSet<String>> {
    let mut lookup: HashMap<String, HashSet<String>> = HashMap::new();
    for c in top {
        let alpha = c.pair.alpha.base_sequence();
        let partners = lookup.entry(alpha.to_string()).or_default();
        if let Some(beta) = &c.pair.beta {
            partners.insert(beta.base_sequence().to_string());
            lookup
                .entry(beta.base_sequence().to_string())
                .or_default()
                .insert(alpha.to_string());
        }
    }
    lookup
}

/// Whether a candidate explains the scan with different peptides than the
/// top match(es), ignoring modification states.
fn is_distinct(c: &ScoredCandidate, lookup: &HashMap<String, HashSet<String>>) -> bool {
    match lookup.get(c.pair.alpha.base_sequence()) {
        None => true,
        Some(partners) => match &c.pair.beta {
            Some(beta) => !partners.contains(beta.base_sequence()),
            None => false,
        },
    }
}

/// Sorts by primary score (descending), assigns dense ranks and the delta
/// scores, and turns the survivors into records. Returns nothing when the
/// best score is below `min_top_score`.
///
/// `delta` is the top score minus the best score of a candidate with a
/// different base sequence than the top match, 0 when there is none, and is
/// shared by every record of the scan. `combined_delta` averages `delta` and
/// the top score. `delta_mod` is each record's score minus the second best
/// score of the scan. A sole match gets its own score for all three.
pub fn rank_scan(
    scan: &Scan,
    mut candidates: Vec<ScoredCandidate>,
    crosslinkers: &[CrossLinker],
    params: &RankingParameters,
) -> Vec<MatchRecord> {
    if candidates.is_empty() {
        return Vec::new();
    }
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    let top_score = candidates[0].score;
    if top_score < params.min_top_score {
        return Vec::new();
    }

    let (delta, second_score) = if candidates.len() == 1 {
        (top_score, None)
    } else {
        let top: Vec<&ScoredCandidate> = candidates
            .iter()
            .take_while(|c| c.score == top_score)
            .collect();
        let lookup = top_lookup(&top);
        let distinct = candidates
            .iter()
            .filter(|c| c.score < top_score)
            .find(|c| is_distinct(c, &lookup))
            .map_or(0.0, |c| c.score);
        (top_score - distinct, Some(candidates[1].score))
    };
    let combined_delta = (delta + top_score) / 2.0;

    let mut out = Vec::with_capacity(candidates.len());
    let mut rank = 1;
    let mut previous = top_score;
    for c in candidates {
        if c.score < previous {
            rank += 1;
            previous = c.score;
        }
        if params.output_top_only && rank > 1 {
            break;
        }
        let delta_mod = second_score.map_or(c.score, |s| c.score - s);
        out.push(MatchRecord {
            run: scan.run.clone(),
            scan_number: scan.scan_number,
            precursor_mass: scan.precursor_mass,
            precursor_charge: scan.precursor_charge,
            is_decoy: c.pair.is_decoy(),
            peptides: c.pair.peptides(),
            crosslinker: c
                .pair
                .crosslinker
                .and_then(|i| crosslinkers.get(i))
                .map(|xl| xl.name().to_string()),
            link_sites: c.link_sites,
            scores: c.scores,
            score: c.score,
            rank,
            delta,
            combined_delta,
            delta_mod,
        });
    }
    out
}
