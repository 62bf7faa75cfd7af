use super::peptide::Peptide;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A scored, ranked candidate for one scan.
///
/// Holds one peptide for linear matches and two for cross-linked pairs.
#[derive(Debug, Clone, Serialize)]
pub struct MatchRecord {
    pub run: Arc<str>,
    pub scan_number: u32,
    pub precursor_mass: f64,
    pub precursor_charge: u8,
    pub peptides: Vec<Arc<Peptide>>,
    pub crosslinker: Option<String>,
    /// Zero-based link sites, parallel to `peptides` for cross-linked pairs.
    pub link_sites: Vec<usize>,
    pub scores: BTreeMap<String, f64>,
    pub score: f64,
    pub rank: u32,
    pub delta: f64,
    pub combined_delta: f64,
    pub delta_mod: f64,
    pub is_decoy: bool,
}

impl MatchRecord {
    pub fn is_crosslinked(&self) -> bool {
        self.peptides.len() > 1
    }

    pub fn is_top(&self) -> bool {
        self.rank == 1
    }

    pub fn sub_score(&self, name: &str) -> Option<f64> {
        self.scores.get(name).copied()
    }

    /// Base sequence of the first peptide.
    pub fn base_sequence(&self) -> &str {
        self.peptides
            .first()
            .map(|p| p.base_sequence())
            .unwrap_or("")
    }

    /// `PEPTIDEK-LINKERK` style label, used in logs and tests.
    pub fn label(&self) -> String {
        self.peptides
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join("-")
    }
}
