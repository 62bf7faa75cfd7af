//! Replacement decoys for decoys that collided with a target.
//!
//! Both generators only rearrange residues (modifications travel along), so a
//! replacement has the composition and the mass of the decoy it stands in
//! for. The C-terminal residue stays where the protease left it.

use crate::models::{
    DecoyMarking,
    Peptide,
};
use rand::Rng;
use rand::seq::SliceRandom;
use std::sync::Arc;

/// Key a residue is permuted by: the residue and its modification, if any.
fn residue_key(peptide: &Peptide, position: usize) -> (u8, Option<Arc<str>>) {
    (
        peptide.residues()[position],
        peptide.modification_at(position).map(|m| m.name.clone()),
    )
}

/// One random rearrangement of the movable residues.
pub fn shuffled<R: Rng + ?Sized>(peptide: &Peptide, rng: &mut R) -> Peptide {
    let n = peptide.len();
    let mut order: Vec<usize> = (0..n).collect();
    if n > 2 {
        order[..n - 1].shuffle(rng);
    }
    peptide.rearranged(&order, DecoyMarking::SynthesizedDecoy)
}

/// Distinct rearrangements in lexicographic order, starting right after the
/// peptide's own arrangement and wrapping around. The original arrangement
/// itself is never produced.
pub struct Permutations<'a> {
    peptide: &'a Peptide,
    keys: Vec<(u8, Option<Arc<str>>)>,
    order: Vec<usize>,
    done: bool,
}

pub fn permutations(peptide: &Peptide) -> Permutations<'_> {
    let movable = peptide.len().saturating_sub(1);
    let keys = (0..peptide.len()).map(|i| residue_key(peptide, i)).collect();
    Permutations {
        peptide,
        keys,
        order: (0..movable).collect(),
        done: movable < 2,
    }
}

impl Permutations<'_> {
    /// In place next permutation of `order`, comparing by residue key so
    /// repeated residues do not produce repeated sequences. Wraps to the
    /// lowest arrangement after the highest one.
    fn advance(&mut self) {
        let keys = &self.keys;
        let order = &mut self.order;
        let n = order.len();
        let mut i = n - 1;
        while i > 0 && keys[order[i - 1]] >= keys[order[i]] {
            i -= 1;
        }
        if i == 0 {
            order.reverse();
            return;
        }
        let mut j = n - 1;
        while keys[order[j]] <= keys[order[i - 1]] {
            j -= 1;
        }
        order.swap(i - 1, j);
        order[i..].reverse();
    }

    fn is_original(&self) -> bool {
        self.order
            .iter()
            .enumerate()
            .all(|(pos, &idx)| self.keys[idx] == self.keys[pos])
    }
}

impl Iterator for Permutations<'_> {
    type Item = Peptide;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        self.advance();
        if self.is_original() {
            self.done = true;
            return None;
        }
        let mut full = self.order.clone();
        full.push(self.peptide.len() - 1);
        Some(self.peptide.rearranged(&full, DecoyMarking::SynthesizedDecoy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_permutations_are_distinct_and_exclude_original() {
        let pep = Peptide::new("AABK", 500.0, DecoyMarking::Decoy);
        let seqs: Vec<String> = permutations(&pep).map(|p| p.to_string()).collect();
        // 3!/2! arrangements of "AAB", minus the original
        assert_eq!(seqs, vec!["ABAK", "BAAK"]);
    }

    #[test]
    fn test_permutations_wrap_around() {
        let pep = Peptide::new("CBAK", 500.0, DecoyMarking::Decoy);
        let seqs: Vec<String> = permutations(&pep).map(|p| p.to_string()).collect();
        assert_eq!(seqs.len(), 5);
        assert_eq!(seqs[0], "ABCK");
        assert!(seqs.iter().all(|s| s.ends_with('K') && s != "CBAK"));
    }

    #[test]
    fn test_short_peptides_have_no_permutations() {
        let pep = Peptide::new("AK", 200.0, DecoyMarking::Decoy);
        assert_eq!(permutations(&pep).count(), 0);
        let pep = Peptide::new("AAAK", 200.0, DecoyMarking::Decoy);
        assert_eq!(permutations(&pep).count(), 0);
    }

    #[test]
    fn test_shuffle_is_seeded() {
        let pep = Peptide::new("PEPTIDEPINK", 1200.0, DecoyMarking::Decoy);
        let a = shuffled(&pep, &mut ChaCha8Rng::seed_from_u64(7));
        let b = shuffled(&pep, &mut ChaCha8Rng::seed_from_u64(7));
        assert_eq!(a.sequence(), b.sequence());
        assert!(a.sequence().ends_with('K'));
        assert_eq!(a.mass(), pep.mass());
        let mut x: Vec<u8> = a.residues().to_vec();
        let mut y: Vec<u8> = pep.residues().to_vec();
        x.sort_unstable();
        y.sort_unstable();
        assert_eq!(x, y);
    }
}
