use super::bucket::MassBucket;
use super::decoy_synthesis;
use super::expansion::{
    DigestionRule,
    IndexRole,
    ModificationExpander,
};
use crate::errors::{
    Result,
    SearchError,
};
use crate::models::{
    CrossLinker,
    DecoyReconciliation,
    Peptide,
};
use crate::tolerance::MassTolerance;
use ordered_float::OrderedFloat;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{
    debug,
    info,
    warn,
};

/// What happened to a candidate handed to [`MassIndex::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// New slot in the index.
    Added,
    /// A sequence-equal candidate of the same class absorbed it as an
    /// alternate source.
    Merged,
    /// It took the slot of a sequence-equal decoy, which moved to the discard
    /// index.
    ReplacedDecoy,
    /// It is a decoy shadowed by a sequence-equal target and went straight to
    /// the discard index.
    Discarded,
    /// Non-finite mass.
    Dropped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpansionSummary {
    pub variants: usize,
    pub kept: usize,
    pub routed: usize,
    pub rejected: usize,
}

/// Peptides ordered by monoisotopic mass.
///
/// Buckets are keyed by the exact mass the candidate was inserted with;
/// tolerance only comes into play at query time. Non-zero tolerance indices
/// carry a discard index for decoys shadowed by sequence-identical targets.
#[derive(Debug, Clone)]
pub struct MassIndex {
    tolerance: MassTolerance,
    buckets: BTreeMap<OrderedFloat<f64>, MassBucket>,
    count: usize,
    min_mass: f64,
    max_mass: f64,
    discarded: Option<Box<MassIndex>>,
}

impl MassIndex {
    pub fn new(tolerance: MassTolerance) -> Self {
        let discarded = if tolerance.is_zero() {
            None
        } else {
            Some(Box::new(MassIndex::new(MassTolerance::Absolute(0.0))))
        };
        Self {
            tolerance,
            buckets: BTreeMap::new(),
            count: 0,
            min_mass: f64::MAX,
            max_mass: f64::MIN,
            discarded,
        }
    }

    pub fn tolerance(&self) -> MassTolerance {
        self.tolerance
    }

    /// Total number of candidates, always the sum of the bucket sizes.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Lightest key ever inserted, `None` while empty.
    pub fn min_mass(&self) -> Option<f64> {
        (!self.buckets.is_empty()).then_some(self.min_mass)
    }

    pub fn max_mass(&self) -> Option<f64> {
        (!self.buckets.is_empty()).then_some(self.max_mass)
    }

    pub fn discarded(&self) -> Option<&MassIndex> {
        self.discarded.as_deref()
    }

    pub fn buckets(&self) -> impl Iterator<Item = &MassBucket> {
        self.buckets.values()
    }

    /// All candidates in ascending mass order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Peptide>> {
        self.buckets.values().flat_map(|b| b.iter())
    }

    fn track_bounds(&mut self, mass: f64) {
        if mass < self.min_mass {
            self.min_mass = mass;
        }
        if mass > self.max_mass {
            self.max_mass = mass;
        }
    }

    fn discard(&mut self, peptide: Arc<Peptide>) {
        match self.discarded.as_mut() {
            Some(discarded) => {
                discarded.insert_shared(peptide);
            }
            None => debug!("Dropping shadowed decoy {} (no discard index)", peptide),
        }
    }

    pub fn insert(&mut self, peptide: Peptide) -> InsertOutcome {
        self.insert_shared(Arc::new(peptide))
    }

    /// Inserts resolving target/decoy collisions: the target always wins the
    /// slot and the decoy ends up in the discard index.
    pub fn insert_shared(&mut self, peptide: Arc<Peptide>) -> InsertOutcome {
        let mass = peptide.mass();
        if !mass.is_finite() {
            return InsertOutcome::Dropped;
        }

        let key = OrderedFloat(mass);
        let outcome = match self.buckets.get_mut(&key) {
            Some(bucket) => match bucket.find_sequence_eq(&peptide) {
                Some(idx) => {
                    let existing = bucket.get_mut(idx);
                    if existing.decoy().same_class(&peptide.decoy()) {
                        Arc::make_mut(existing).absorb_sources(&peptide);
                        return InsertOutcome::Merged;
                    } else if peptide.decoy().is_target() {
                        let evicted = bucket.replace(idx, peptide);
                        self.discard(evicted);
                        return InsertOutcome::ReplacedDecoy;
                    } else {
                        self.discard(peptide);
                        return InsertOutcome::Discarded;
                    }
                }
                None => {
                    bucket.push(peptide);
                    InsertOutcome::Added
                }
            },
            None => {
                let mut bucket = MassBucket::new(mass);
                bucket.push(peptide);
                self.buckets.insert(key, bucket);
                self.track_bounds(mass);
                InsertOutcome::Added
            }
        };
        self.count += 1;
        outcome
    }

    /// Adds without any collision handling.
    pub fn force_admit(&mut self, peptide: Arc<Peptide>) {
        let mass = peptide.mass();
        if !mass.is_finite() {
            return;
        }
        self.buckets
            .entry(OrderedFloat(mass))
            .or_insert_with(|| MassBucket::new(mass))
            .push(peptide);
        self.track_bounds(mass);
        self.count += 1;
    }

    /// Candidates with keys in `[min_mass, max_mass)` in ascending mass
    /// order. `min_mass == max_mass` looks up that exact key.
    pub fn range_query(&self, min_mass: f64, max_mass: f64) -> Result<Vec<Arc<Peptide>>> {
        if min_mass == max_mass {
            return Ok(self.exact(min_mass));
        }
        // Also rejects NaN bounds.
        if !(min_mass < max_mass) {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for (key, bucket) in self
            .buckets
            .range(OrderedFloat(min_mass)..OrderedFloat(max_mass))
        {
            if key.0 != bucket.mass() || bucket.is_empty() {
                return Err(SearchError::IndexInconsistency {
                    context: format!(
                        "bucket keyed at {} records mass {} with {} entries",
                        key.0,
                        bucket.mass(),
                        bucket.len()
                    ),
                });
            }
            out.extend(bucket.iter().cloned());
        }
        Ok(out)
    }

    pub fn exact(&self, mass: f64) -> Vec<Arc<Peptide>> {
        self.buckets
            .get(&OrderedFloat(mass))
            .map(|b| b.entries().to_vec())
            .unwrap_or_default()
    }

    /// Candidates whose mass equals `mass` within tolerance, the window sized
    /// by `reference` when the tolerance is relative.
    pub fn candidates_for_mass(&self, mass: f64, reference: f64) -> Result<Vec<Arc<Peptide>>> {
        let (lo, hi) = self.tolerance.window(mass, reference);
        self.range_query(lo, hi)
    }

    /// Sequence-equal candidate of either class at the exact same mass key.
    pub fn contains_peptide(&self, peptide: &Peptide) -> bool {
        self.buckets
            .get(&OrderedFloat(peptide.mass()))
            .is_some_and(|b| b.find_sequence_eq(peptide).is_some())
    }

    fn recompute_bounds(&mut self) {
        self.min_mass = self.buckets.keys().next().map(|k| k.0).unwrap_or(f64::MAX);
        self.max_mass = self
            .buckets
            .keys()
            .next_back()
            .map(|k| k.0)
            .unwrap_or(f64::MIN);
    }

    /// Removes candidates shorter than `min_length`, with more than
    /// `max_ambiguity` origins or seen in more than `max_protein_ambiguity`
    /// proteins. Returns how many were removed.
    pub fn cleanup(
        &mut self,
        min_length: usize,
        max_ambiguity: usize,
        max_protein_ambiguity: usize,
    ) -> usize {
        // First pass: mark.
        let marked: Vec<(OrderedFloat<f64>, Vec<usize>)> = self
            .buckets
            .iter()
            .filter_map(|(key, bucket)| {
                let idx: Vec<usize> = bucket
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| {
                        p.len() < min_length
                            || p.position_count() > max_ambiguity
                            || p.protein_count() > max_protein_ambiguity
                    })
                    .map(|(i, _)| i)
                    .collect();
                (!idx.is_empty()).then_some((*key, idx))
            })
            .collect();

        // Second pass: remove.
        let mut removed = 0;
        for (key, idx) in marked {
            if let Some(bucket) = self.buckets.get_mut(&key) {
                removed += bucket.remove_indices(&idx);
                if bucket.is_empty() {
                    self.buckets.remove(&key);
                }
            }
        }
        self.count -= removed;
        self.recompute_bounds();
        debug!("Cleanup removed {} candidates, {} left", removed, self.count);
        removed
    }

    /// Generates modified variants of every candidate, keeps the ones that
    /// are still digestion products and routes them by cross-link
    /// eligibility: variants matching `role` stay here, the others go to
    /// `counterpart` (or stay here when there is none).
    pub fn expand_variable_modifications(
        &mut self,
        expander: &dyn ModificationExpander,
        digestion: &dyn DigestionRule,
        crosslinkers: &[CrossLinker],
        role: IndexRole,
        mut counterpart: Option<&mut MassIndex>,
    ) -> ExpansionSummary {
        let mut summary = ExpansionSummary::default();

        // First pass: collect variants without touching the index.
        let mut variants = Vec::new();
        for (i, pep) in self.iter().enumerate() {
            if i > 0 && i % 10_000 == 0 {
                info!("Expanded modifications of {} of {} peptides", i, self.count);
            }
            for variant in expander.expand(pep) {
                summary.variants += 1;
                if digestion.is_digested_peptide(&variant) {
                    variants.push(variant);
                } else {
                    summary.rejected += 1;
                }
            }
        }

        // Second pass: route.
        for variant in variants {
            let eligible = crosslinkers.iter().any(|xl| xl.can_crosslink(&variant));
            match counterpart.as_deref_mut() {
                Some(other) if eligible != (role == IndexRole::Crosslinkable) => {
                    other.insert(variant);
                    summary.routed += 1;
                }
                _ => {
                    self.insert(variant);
                    summary.kept += 1;
                }
            }
        }
        summary
    }

    /// Puts decoys from the discard index back, either unchanged (`Force`)
    /// or as non-colliding rearrangements. Returns the decoys for which no
    /// replacement was found in `max_attempts` tries. The discard index is
    /// empty afterwards, so running this twice is a no-op the second time.
    pub fn reconcile_discarded_decoys(
        &mut self,
        mode: DecoyReconciliation,
        max_attempts: usize,
        seed: u64,
    ) -> Vec<Arc<Peptide>> {
        let pending = match self.discarded.as_mut() {
            Some(discarded) => discarded.take_all(),
            None => return Vec::new(),
        };
        if pending.is_empty() {
            return Vec::new();
        }
        info!(
            "Reconciling {} discarded decoys (mode = {})",
            pending.len(),
            mode
        );

        let mut unresolved = Vec::new();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        for decoy in pending {
            let replacement = match mode {
                DecoyReconciliation::Force => {
                    self.force_admit(decoy);
                    continue;
                }
                DecoyReconciliation::Random => (0..max_attempts)
                    .map(|_| decoy_synthesis::shuffled(&decoy, &mut rng))
                    .find(|cand| !self.contains_peptide(cand)),
                DecoyReconciliation::Permute => decoy_synthesis::permutations(&decoy)
                    .take(max_attempts)
                    .find(|cand| !self.contains_peptide(cand)),
            };
            match replacement {
                Some(cand) => {
                    self.insert(cand);
                }
                None => unresolved.push(decoy),
            }
        }

        if !unresolved.is_empty() {
            warn!(
                "{} discarded decoys could not be replaced after {} attempts",
                unresolved.len(),
                max_attempts
            );
        }
        unresolved
    }

    fn take_all(&mut self) -> Vec<Arc<Peptide>> {
        let out = std::mem::take(&mut self.buckets)
            .into_values()
            .flat_map(|mut b| b.take_all())
            .collect();
        self.count = 0;
        self.recompute_bounds();
        out
    }
}
