//! Fragment m/z lookup.
//!
//! Fragment chemistry lives behind [`FragmentSource`]. [`ResidueLadder`] is a
//! plain singly-charged b/y ladder over a residue mass table, enough to build
//! an index from sequence-only input.

use crate::models::{
    CrossLinker,
    Modification,
    Peptide,
};
use crate::tolerance::MassTolerance;
use crate::utils::{
    DoubleVec,
    PrimitiveVec,
};
use nohash_hasher::IntSet;
use rayon::iter::{
    FromParallelIterator,
    IndexedParallelIterator,
    IntoParallelIterator,
    IntoParallelRefIterator,
    ParallelIterator,
};
use rayon::slice::ParallelSliceMut;
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

pub const PROTON: f64 = 1.007276466;
pub const WATER: f64 = 18.010564684;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Terminality {
    NTerm,
    CTerm,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    pub mz: f64,
    pub terminality: Terminality,
}

/// Produces theoretical fragments for candidates.
pub trait FragmentSource: Send + Sync {
    fn fragments(&self, peptide: &Peptide) -> Vec<Fragment>;

    /// Fragments of `peptide` while it is linked at `site` to a partner of
    /// mass `partner_mass`. Fragments spanning the site carry the partner and
    /// the cross-linker.
    fn crosslinked_fragments(
        &self,
        peptide: &Peptide,
        site: usize,
        partner_mass: f64,
        crosslinker: &CrossLinker,
    ) -> Vec<Fragment>;
}

/// Peptides that have a fragment at a given m/z.
pub trait FragmentIndex: Send + Sync {
    /// Distinct peptides, in the order their fragments are stored.
    fn peptides_for_fragment_mass(&self, mz: f64) -> Vec<Arc<Peptide>>;

    fn count_peptides(&self, mz: f64) -> usize {
        self.peptides_for_fragment_mass(mz).len()
    }

    /// Number of stored fragments.
    fn fragment_count(&self) -> u64;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResidueLadder {
    pub residue_masses: BTreeMap<char, f64>,
}

impl ResidueLadder {
    pub fn new(residue_masses: BTreeMap<char, f64>) -> Self {
        Self { residue_masses }
    }

    /// Neutral mass, `None` for unknown residues.
    pub fn peptide_mass(&self, sequence: &str, modifications: &[Modification]) -> Option<f64> {
        let residues = self.residue_ladder(sequence, modifications)?;
        Some(residues.iter().sum::<f64>() + WATER)
    }

    /// Per-residue masses including modifications.
    fn residue_ladder(&self, sequence: &str, modifications: &[Modification]) -> Option<Vec<f64>> {
        let mut out: Vec<f64> = sequence
            .chars()
            .map(|c| self.residue_masses.get(&c).copied())
            .collect::<Option<Vec<f64>>>()?;
        for m in modifications {
            *out.get_mut(m.position as usize)? += m.mass_delta;
        }
        Some(out)
    }

    /// b ions spanning residues `[0, i)` and y ions spanning `[n - j, n)`;
    /// `shift(first, last)` adds extra mass to the ion covering residues
    /// `first..=last`.
    fn ladder(&self, peptide: &Peptide, shift: impl Fn(usize, usize) -> f64) -> Vec<Fragment> {
        let Some(masses) = self.residue_ladder(peptide.sequence(), peptide.modifications()) else {
            return Vec::new();
        };
        let n = masses.len();
        let mut out = Vec::with_capacity(2 * n.saturating_sub(1));
        let mut b = 0.0;
        for i in 1..n {
            b += masses[i - 1];
            out.push(Fragment {
                mz: b + PROTON + shift(0, i - 1),
                terminality: Terminality::NTerm,
            });
        }
        let mut y = WATER;
        for j in 1..n {
            y += masses[n - j];
            out.push(Fragment {
                mz: y + PROTON + shift(n - j, n - 1),
                terminality: Terminality::CTerm,
            });
        }
        out
    }
}

impl FragmentSource for ResidueLadder {
    fn fragments(&self, peptide: &Peptide) -> Vec<Fragment> {
        self.ladder(peptide, |_, _| 0.0)
    }

    fn crosslinked_fragments(
        &self,
        peptide: &Peptide,
        site: usize,
        partner_mass: f64,
        crosslinker: &CrossLinker,
    ) -> Vec<Fragment> {
        let extra = partner_mass + crosslinker.mass();
        self.ladder(peptide, |first, last| {
            if first <= site && site <= last { extra } else { 0.0 }
        })
    }
}

/// Fragments of many peptides, sorted by m/z.
#[derive(Debug, Clone)]
pub struct FragmentTable {
    tolerance: MassTolerance,
    mzs: DoubleVec,
    owners: PrimitiveVec<u32>,
    peptides: Vec<Arc<Peptide>>,
}

/// Fold/reduce collector for `(peptide id, fragments)` pairs.
#[derive(Default)]
struct FragmentAccumulator {
    entries: Vec<(f64, u32)>,
}

impl FragmentAccumulator {
    fn reduce(mut self, other: Self) -> Self {
        self.entries.extend(other.entries);
        self
    }

    fn fold(mut self, item: (u32, Vec<Fragment>)) -> Self {
        let (id, frags) = item;
        self.entries
            .extend(frags.into_iter().map(|f| (f.mz, id)).filter(|x| x.0.is_finite()));
        self
    }
}

impl FromParallelIterator<(u32, Vec<Fragment>)> for FragmentAccumulator {
    fn from_par_iter<I>(par_iter: I) -> Self
    where
        I: IntoParallelIterator<Item = (u32, Vec<Fragment>)>,
    {
        par_iter
            .into_par_iter()
            .fold(FragmentAccumulator::default, FragmentAccumulator::fold)
            .reduce(FragmentAccumulator::default, FragmentAccumulator::reduce)
    }
}

impl FragmentTable {
    pub fn build(
        peptides: Vec<Arc<Peptide>>,
        source: &dyn FragmentSource,
        tolerance: MassTolerance,
    ) -> Self {
        let acc: FragmentAccumulator = peptides
            .par_iter()
            .enumerate()
            .map(|(i, p)| (i as u32, source.fragments(p)))
            .collect();
        let mut entries = acc.entries;
        entries.par_sort_unstable_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut mzs = DoubleVec::with_capacity(entries.len());
        let mut owners = PrimitiveVec::with_capacity(entries.len());
        for (mz, id) in entries {
            mzs.push(mz);
            owners.push(id);
        }
        info!(
            "Built fragment table: {} fragments from {} peptides",
            mzs.len(),
            peptides.len()
        );
        Self {
            tolerance,
            mzs,
            owners,
            peptides,
        }
    }

    pub fn tolerance(&self) -> MassTolerance {
        self.tolerance
    }

    fn owners_at(&self, mz: f64) -> Vec<u32> {
        let (lo, hi) = self.tolerance.window(mz, mz);
        let mut seen = IntSet::default();
        self.owners[self.mzs.sorted_range(lo, hi)]
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect()
    }
}

impl FragmentIndex for FragmentTable {
    fn peptides_for_fragment_mass(&self, mz: f64) -> Vec<Arc<Peptide>> {
        self.owners_at(mz)
            .into_iter()
            .map(|id| self.peptides[id as usize].clone())
            .collect()
    }

    fn count_peptides(&self, mz: f64) -> usize {
        self.owners_at(mz).len()
    }

    fn fragment_count(&self) -> u64 {
        self.mzs.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DecoyMarking;

    fn ladder() -> ResidueLadder {
        ResidueLadder::new(
            [('G', 57.02146), ('A', 71.03711), ('K', 128.09496)]
                .into_iter()
                .collect(),
        )
    }

    #[test]
    fn test_ladder_masses() {
        let l = ladder();
        let mass = l.peptide_mass("GAK", &[]).unwrap();
        assert!((mass - (57.02146 + 71.03711 + 128.09496 + WATER)).abs() < 1e-9);
        assert!(l.peptide_mass("GXK", &[]).is_none());

        let pep = Peptide::new("GAK", mass, DecoyMarking::Target);
        let frags = l.fragments(&pep);
        assert_eq!(frags.len(), 4);
        // b1 and y1
        assert!((frags[0].mz - (57.02146 + PROTON)).abs() < 1e-9);
        assert!((frags[2].mz - (128.09496 + WATER + PROTON)).abs() < 1e-9);
        assert_eq!(frags[2].terminality, Terminality::CTerm);
    }

    #[test]
    fn test_crosslinked_fragments_shift_spanning_ions() {
        let l = ladder();
        let xl = CrossLinker::Symmetric {
            name: "DSS".into(),
            mass: 138.0,
            residues: "K".into(),
            protein_n_term: false,
        };
        let pep = Peptide::new("GKA", 300.0, DecoyMarking::Target);
        let plain = l.fragments(&pep);
        let linked = l.crosslinked_fragments(&pep, 1, 500.0, &xl);
        // b1 (G) does not span the site, b2 (GK) does
        assert_eq!(plain[0].mz, linked[0].mz);
        assert!((linked[1].mz - plain[1].mz - 638.0).abs() < 1e-9);
        // y1 (A) does not, y2 (KA) does
        assert_eq!(plain[2].mz, linked[2].mz);
        assert!((linked[3].mz - plain[3].mz - 638.0).abs() < 1e-9);
    }

    #[test]
    fn test_fragment_table_lookup() {
        let l = ladder();
        let peps: Vec<Arc<Peptide>> = ["GAK", "AGK", "GGK"]
            .iter()
            .map(|s| {
                let mass = l.peptide_mass(s, &[]).unwrap();
                Arc::new(Peptide::new(*s, mass, DecoyMarking::Target))
            })
            .collect();
        let table = FragmentTable::build(peps, &l, MassTolerance::Ppm(10.0));
        assert_eq!(table.fragment_count(), 12);

        // y1 is shared by all three
        let y1 = 128.09496 + WATER + PROTON;
        assert_eq!(table.count_peptides(y1), 3);
        // b1 of G is shared by GAK and GGK
        let hits = table.peptides_for_fragment_mass(57.02146 + PROTON);
        let seqs: Vec<&str> = hits.iter().map(|p| p.sequence()).collect();
        assert_eq!(seqs, vec!["GAK", "GGK"]);
        assert_eq!(table.count_peptides(1000.0), 0);
    }
}
