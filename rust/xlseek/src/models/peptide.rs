use super::decoy::{
    DecoyMarking,
    reversed_inner_order,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::hash::{
    Hash,
    Hasher,
};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Modification {
    /// Zero-based residue index the modification sits on.
    pub position: u16,
    pub name: Arc<str>,
    pub mass_delta: f64,
}

/// Where a peptide was digested from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PeptideSource {
    pub protein: Arc<str>,
    pub start: u32,
}

/// A digested (and possibly modified) sequence with its monoisotopic mass.
///
/// Residues are single ASCII characters. Equality and hashing use the
/// residues, the modifications and the target/decoy class, so two values
/// compare equal exactly when they are "sequence-equal" members of the same
/// class. Mass and originating positions do not take part.
#[derive(Debug, Clone, Serialize)]
pub struct Peptide {
    sequence: Arc<str>,
    modifications: Vec<Modification>,
    mass: f64,
    decoy: DecoyMarking,
    sources: Vec<PeptideSource>,
    protein_n_term: bool,
    protein_c_term: bool,
}

impl Peptide {
    pub fn new(sequence: impl Into<Arc<str>>, mass: f64, decoy: DecoyMarking) -> Self {
        Self {
            sequence: sequence.into(),
            modifications: Vec::new(),
            mass,
            decoy,
            sources: Vec::new(),
            protein_n_term: false,
            protein_c_term: false,
        }
    }

    /// Modifications are kept sorted by position. Adding them does not change
    /// the mass, callers pass the mass of the modified form.
    pub fn with_modifications(mut self, mut modifications: Vec<Modification>) -> Self {
        modifications.sort_by(|a, b| a.position.cmp(&b.position).then(a.name.cmp(&b.name)));
        self.modifications = modifications;
        self
    }

    pub fn with_source(mut self, protein: impl Into<Arc<str>>, start: u32) -> Self {
        self.sources.push(PeptideSource {
            protein: protein.into(),
            start,
        });
        self
    }

    pub fn with_terminals(mut self, protein_n_term: bool, protein_c_term: bool) -> Self {
        self.protein_n_term = protein_n_term;
        self.protein_c_term = protein_c_term;
        self
    }

    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    /// Residues without modification annotations.
    pub fn base_sequence(&self) -> &str {
        &self.sequence
    }

    pub fn residues(&self) -> &[u8] {
        self.sequence.as_bytes()
    }

    pub fn modifications(&self) -> &[Modification] {
        &self.modifications
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn decoy(&self) -> DecoyMarking {
        self.decoy
    }

    pub fn is_decoy(&self) -> bool {
        self.decoy.is_decoy()
    }

    pub fn sources(&self) -> &[PeptideSource] {
        &self.sources
    }

    pub fn is_protein_n_term(&self) -> bool {
        self.protein_n_term
    }

    pub fn is_protein_c_term(&self) -> bool {
        self.protein_c_term
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// Number of originating positions, the ambiguity of the peptide.
    pub fn position_count(&self) -> usize {
        self.sources.len().max(1)
    }

    pub fn protein_count(&self) -> usize {
        let mut proteins: Vec<&str> = self.sources.iter().map(|s| s.protein.as_ref()).collect();
        proteins.sort_unstable();
        proteins.dedup();
        proteins.len().max(1)
    }

    /// Residues and modifications match, regardless of target/decoy class.
    pub fn sequence_eq(&self, other: &Peptide) -> bool {
        self.sequence == other.sequence && self.same_modifications(other)
    }

    fn same_modifications(&self, other: &Peptide) -> bool {
        self.modifications.len() == other.modifications.len()
            && self
                .modifications
                .iter()
                .zip(other.modifications.iter())
                .all(|(a, b)| a.position == b.position && a.name == b.name)
    }

    /// Takes over the originating positions of a duplicate.
    pub fn absorb_sources(&mut self, other: &Peptide) {
        for src in other.sources.iter() {
            if !self.sources.contains(src) {
                self.sources.push(src.clone());
            }
        }
    }

    pub fn modification_at(&self, position: usize) -> Option<&Modification> {
        self.modifications
            .iter()
            .find(|m| m.position as usize == position)
    }

    /// Adds one modification, returning the modified variant. `None` if the
    /// position is out of range or already modified.
    pub fn modified(&self, modification: Modification) -> Option<Peptide> {
        let pos = modification.position as usize;
        if pos >= self.len() || self.modification_at(pos).is_some() {
            return None;
        }
        let mut out = self.clone();
        out.mass += modification.mass_delta;
        out.modifications.push(modification);
        out.modifications.sort_by_key(|m| m.position);
        Some(out)
    }

    /// Rearranges residues so that residue `i` of the result is residue
    /// `order[i]` of `self`. Modifications travel with their residue, so the
    /// composition and the mass are unchanged.
    pub fn rearranged(&self, order: &[usize], decoy: DecoyMarking) -> Peptide {
        let residues = self.residues();
        let sequence: String = order.iter().map(|&i| residues[i] as char).collect();
        let mut modifications: Vec<Modification> = order
            .iter()
            .enumerate()
            .filter_map(|(new_pos, &old_pos)| {
                self.modification_at(old_pos).map(|m| Modification {
                    position: new_pos as u16,
                    ..m.clone()
                })
            })
            .collect();
        modifications.sort_by_key(|m| m.position);
        Peptide {
            sequence: sequence.into(),
            modifications,
            mass: self.mass,
            decoy,
            sources: self.sources.clone(),
            protein_n_term: self.protein_n_term,
            protein_c_term: self.protein_c_term,
        }
    }

    /// Decoy with the inner residues reversed.
    pub fn reversed_decoy(&self) -> Peptide {
        self.rearranged(&reversed_inner_order(self.len()), DecoyMarking::Decoy)
    }
}

impl PartialEq for Peptide {
    fn eq(&self, other: &Self) -> bool {
        self.sequence_eq(other) && self.decoy.same_class(&other.decoy)
    }
}

impl Eq for Peptide {}

impl Hash for Peptide {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sequence.hash(state);
        for m in self.modifications.iter() {
            m.position.hash(state);
            m.name.hash(state);
        }
        self.decoy.is_decoy().hash(state);
    }
}

impl std::fmt::Display for Peptide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut mods = self.modifications.iter().peekable();
        for (i, c) in self.sequence.chars().enumerate() {
            write!(f, "{}", c)?;
            while let Some(m) = mods.next_if(|m| m.position as usize == i) {
                write!(f, "[{}]", m.name)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ox(position: u16) -> Modification {
        Modification {
            position,
            name: "ox".into(),
            mass_delta: 15.9949,
        }
    }

    #[test]
    fn test_display_and_equality() {
        let pep = Peptide::new("PEPMIDEK", 900.0, DecoyMarking::Target)
            .with_modifications(vec![ox(3)]);
        assert_eq!(pep.to_string(), "PEPM[ox]IDEK");

        let plain = Peptide::new("PEPMIDEK", 884.0, DecoyMarking::Target);
        assert!(!pep.sequence_eq(&plain));

        let decoy = Peptide::new("PEPMIDEK", 900.0, DecoyMarking::Decoy)
            .with_modifications(vec![ox(3)]);
        assert!(pep.sequence_eq(&decoy));
        assert_ne!(pep, decoy);
    }

    #[test]
    fn test_protein_ambiguity() {
        let mut pep = Peptide::new("PEPTIDEK", 900.0, DecoyMarking::Target)
            .with_source("P1", 10)
            .with_source("P1", 50);
        let other = Peptide::new("PEPTIDEK", 900.0, DecoyMarking::Target).with_source("P2", 3);
        pep.absorb_sources(&other);
        pep.absorb_sources(&other);
        assert_eq!(pep.position_count(), 3);
        assert_eq!(pep.protein_count(), 2);
    }

    #[test]
    fn test_rearranged_moves_modifications() {
        let pep = Peptide::new("AMK", 400.0, DecoyMarking::Target).with_modifications(vec![ox(1)]);
        let shuffled = pep.rearranged(&[1, 0, 2], DecoyMarking::SynthesizedDecoy);
        assert_eq!(shuffled.to_string(), "M[ox]AK");
        assert_eq!(shuffled.mass(), pep.mass());
        assert!(shuffled.is_decoy());
    }

    #[test]
    fn test_modified() {
        let pep = Peptide::new("AMK", 400.0, DecoyMarking::Target);
        let m = pep.modified(ox(1)).unwrap();
        assert!((m.mass() - 415.9949).abs() < 1e-9);
        assert!(m.modified(ox(1)).is_none());
        assert!(pep.modified(ox(5)).is_none());
    }
}
