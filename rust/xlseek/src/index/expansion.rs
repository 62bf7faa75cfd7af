//! Building the crosslinkable/linear index pair.
//!
//! Digestion and modification enumeration are supplied through the
//! [`ModificationExpander`] and [`DigestionRule`] traits. The simple
//! config-driven implementations here cover the common cases.

use super::mass_index::MassIndex;
use crate::models::{
    CrossLinker,
    DecoyReconciliation,
    Modification,
    Peptide,
};
use crate::tolerance::MassTolerance;
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

/// Which half of the index pair an index holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexRole {
    Crosslinkable,
    Linear,
}

/// Enumerates modified variants of a peptide. The peptide itself is not part
/// of the output.
pub trait ModificationExpander: Send + Sync {
    fn expand(&self, peptide: &Peptide) -> Vec<Peptide>;
}

/// Decides whether a (modified) peptide is still a valid digestion product.
pub trait DigestionRule: Send + Sync {
    fn is_digested_peptide(&self, peptide: &Peptide) -> bool;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariableModification {
    pub name: String,
    pub mass_delta: f64,
    /// One-letter codes of the residues it can sit on.
    pub residues: String,
}

/// Every combination of up to `max_per_peptide` variable modifications.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariableModifications {
    pub modifications: Vec<VariableModification>,
    pub max_per_peptide: usize,
}

impl ModificationExpander for VariableModifications {
    fn expand(&self, peptide: &Peptide) -> Vec<Peptide> {
        let mut seen: HashSet<Peptide> = HashSet::new();
        let mut frontier = vec![peptide.clone()];
        let mut out = Vec::new();
        let names: Vec<Arc<str>> = self
            .modifications
            .iter()
            .map(|m| Arc::from(m.name.as_str()))
            .collect();

        while let Some(current) = frontier.pop() {
            if current.modifications().len() >= self.max_per_peptide {
                continue;
            }
            for (vm, name) in self.modifications.iter().zip(names.iter()) {
                for (pos, aa) in current.residues().iter().enumerate() {
                    if !vm.residues.contains(*aa as char) {
                        continue;
                    }
                    let Some(variant) = current.modified(Modification {
                        position: pos as u16,
                        name: name.clone(),
                        mass_delta: vm.mass_delta,
                    }) else {
                        continue;
                    };
                    if seen.insert(variant.clone()) {
                        frontier.push(variant.clone());
                        out.push(variant);
                    }
                }
            }
        }
        out
    }
}

/// Cleavage after any of `residues` unless that residue is modified. Protein
/// C-terminal peptides are always accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpecificCleavage {
    pub residues: String,
}

impl SpecificCleavage {
    pub fn trypsin() -> Self {
        Self {
            residues: "KR".into(),
        }
    }
}

impl DigestionRule for SpecificCleavage {
    fn is_digested_peptide(&self, peptide: &Peptide) -> bool {
        if peptide.is_protein_c_term() {
            return true;
        }
        let Some(last) = peptide.residues().last() else {
            return false;
        };
        self.residues.contains(*last as char)
            && peptide.modification_at(peptide.len() - 1).is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexParameters {
    pub tolerance: MassTolerance,
    pub min_length: usize,
    pub max_ambiguity: usize,
    pub max_protein_ambiguity: usize,
    pub decoy_mode: DecoyReconciliation,
    pub decoy_seed: u64,
    pub max_decoy_attempts: usize,
    /// Adds an inner-reversed decoy for every supplied target.
    pub generate_reversed_decoys: bool,
}

impl Default for IndexParameters {
    fn default() -> Self {
        Self {
            tolerance: MassTolerance::Ppm(6.0),
            min_length: 6,
            max_ambiguity: 10,
            max_protein_ambiguity: 10,
            decoy_mode: DecoyReconciliation::default(),
            decoy_seed: 42,
            max_decoy_attempts: 10,
            generate_reversed_decoys: false,
        }
    }
}

/// The two indices searched against. Read-only once built.
#[derive(Debug, Clone)]
pub struct PeptideIndices {
    pub crosslinkable: MassIndex,
    pub linear: MassIndex,
    pub unresolved_decoys: Vec<Arc<Peptide>>,
}

impl PeptideIndices {
    pub fn len(&self) -> usize {
        self.crosslinkable.len() + self.linear.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Both indices, crosslinkable first.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Peptide>> {
        self.crosslinkable.iter().chain(self.linear.iter())
    }
}

pub struct IndexBuilder<'a> {
    params: IndexParameters,
    crosslinkers: &'a [CrossLinker],
    expansion: Option<(&'a dyn ModificationExpander, &'a dyn DigestionRule)>,
}

impl<'a> IndexBuilder<'a> {
    pub fn new(params: IndexParameters, crosslinkers: &'a [CrossLinker]) -> Self {
        Self {
            params,
            crosslinkers,
            expansion: None,
        }
    }

    pub fn with_modifications(
        mut self,
        expander: &'a dyn ModificationExpander,
        digestion: &'a dyn DigestionRule,
    ) -> Self {
        self.expansion = Some((expander, digestion));
        self
    }

    fn is_crosslinkable(&self, peptide: &Peptide) -> bool {
        self.crosslinkers.iter().any(|xl| xl.can_crosslink(peptide))
    }

    /// Routes, expands, cleans up and reconciles decoys, in that order.
    pub fn build(self, peptides: impl IntoIterator<Item = Peptide>) -> PeptideIndices {
        let mut crosslinkable = MassIndex::new(self.params.tolerance);
        let mut linear = MassIndex::new(self.params.tolerance);

        let mut route = |p: Peptide| {
            if self.is_crosslinkable(&p) {
                crosslinkable.insert(p);
            } else {
                linear.insert(p);
            }
        };
        for pep in peptides {
            if self.params.generate_reversed_decoys && !pep.is_decoy() {
                route(pep.reversed_decoy());
            }
            route(pep);
        }
        info!(
            "Routed peptides: {} crosslinkable, {} linear",
            crosslinkable.len(),
            linear.len()
        );

        if let Some((expander, digestion)) = self.expansion {
            let xl_summary = crosslinkable.expand_variable_modifications(
                expander,
                digestion,
                self.crosslinkers,
                IndexRole::Crosslinkable,
                Some(&mut linear),
            );
            let lin_summary = linear.expand_variable_modifications(
                expander,
                digestion,
                self.crosslinkers,
                IndexRole::Linear,
                Some(&mut crosslinkable),
            );
            info!(
                "Modification expansion: crosslinkable {:?}, linear {:?}",
                xl_summary, lin_summary
            );
        }

        let removed = crosslinkable.cleanup(
            self.params.min_length,
            self.params.max_ambiguity,
            self.params.max_protein_ambiguity,
        ) + linear.cleanup(
            self.params.min_length,
            self.params.max_ambiguity,
            self.params.max_protein_ambiguity,
        );

        let discarded = crosslinkable.discarded().map_or(0, |d| d.len())
            + linear.discarded().map_or(0, |d| d.len());
        let mut unresolved = crosslinkable.reconcile_discarded_decoys(
            self.params.decoy_mode,
            self.params.max_decoy_attempts,
            self.params.decoy_seed,
        );
        unresolved.extend(linear.reconcile_discarded_decoys(
            self.params.decoy_mode,
            self.params.max_decoy_attempts,
            self.params.decoy_seed.wrapping_add(1),
        ));

        info!(
            "Index built: {} crosslinkable ({:?} - {:?} Da), {} linear, {} removed by cleanup, {} discarded decoys, {} unresolved",
            crosslinkable.len(),
            crosslinkable.min_mass(),
            crosslinkable.max_mass(),
            linear.len(),
            removed,
            discarded,
            unresolved.len()
        );

        PeptideIndices {
            crosslinkable,
            linear,
            unresolved_decoys: unresolved,
        }
    }
}
