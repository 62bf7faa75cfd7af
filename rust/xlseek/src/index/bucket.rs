use crate::models::Peptide;
use std::sync::Arc;

/// Candidates sharing one exact mass key.
#[derive(Debug, Clone)]
pub struct MassBucket {
    mass: f64,
    entries: Vec<Arc<Peptide>>,
}

impl MassBucket {
    pub fn new(mass: f64) -> Self {
        Self {
            mass,
            entries: Vec::with_capacity(1),
        }
    }

    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Peptide>> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[Arc<Peptide>] {
        &self.entries
    }

    /// Index of the first entry that is sequence-equal to `peptide`, of any class.
    pub fn find_sequence_eq(&self, peptide: &Peptide) -> Option<usize> {
        self.entries.iter().position(|e| e.sequence_eq(peptide))
    }

    pub(crate) fn get_mut(&mut self, idx: usize) -> &mut Arc<Peptide> {
        &mut self.entries[idx]
    }

    pub(crate) fn push(&mut self, peptide: Arc<Peptide>) {
        self.entries.push(peptide);
    }

    pub(crate) fn replace(&mut self, idx: usize, peptide: Arc<Peptide>) -> Arc<Peptide> {
        std::mem::replace(&mut self.entries[idx], peptide)
    }

    /// Removes the entries at the given (ascending, unique) indices.
    pub(crate) fn remove_indices(&mut self, indices: &[usize]) -> usize {
        for idx in indices.iter().rev() {
            self.entries.remove(*idx);
        }
        indices.len()
    }

    pub(crate) fn take_all(&mut self) -> Vec<Arc<Peptide>> {
        std::mem::take(&mut self.entries)
    }
}
