//! Per-candidate score accumulation with tie-aware ranked extraction.

use indexmap::IndexMap;
use ordered_float::OrderedFloat;
use std::collections::BTreeMap;
use std::hash::Hash;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Occurrence {
    pub value: f64,
    pub count: u32,
}

/// Accumulates a value per distinct key across repeated observations.
///
/// The first observation seeds the value (so additive and multiplicative
/// accumulation start from 0 and 1 respectively), every observation bumps the
/// count. Iteration follows first-observation order.
#[derive(Debug, Clone)]
pub struct ScoredOccurrence<K: Hash + Eq + Clone> {
    entries: IndexMap<K, Occurrence>,
}

impl<K: Hash + Eq + Clone> Default for ScoredOccurrence<K> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<K: Hash + Eq + Clone> ScoredOccurrence<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: K, delta: f64) {
        self.entries
            .entry(key)
            .and_modify(|o| {
                o.value += delta;
                o.count += 1;
            })
            .or_insert(Occurrence {
                value: delta,
                count: 1,
            });
    }

    pub fn multiply(&mut self, key: K, factor: f64) {
        self.entries
            .entry(key)
            .and_modify(|o| {
                o.value *= factor;
                o.count += 1;
            })
            .or_insert(Occurrence {
                value: factor,
                count: 1,
            });
    }

    /// Sets the value, overwriting any accumulation so far.
    pub fn set(&mut self, key: K, value: f64) {
        self.entries
            .entry(key)
            .and_modify(|o| {
                o.value = value;
                o.count += 1;
            })
            .or_insert(Occurrence { value, count: 1 });
    }

    pub fn score(&self, key: &K, default: f64) -> f64 {
        self.entries.get(key).map_or(default, |o| o.value)
    }

    pub fn count(&self, key: &K) -> u32 {
        self.entries.get(key).map_or(0, |o| o.count)
    }

    pub fn seen(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &Occurrence)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    /// Keys grouped by exact value, NaN values left out.
    fn buckets(&self) -> BTreeMap<OrderedFloat<f64>, Vec<&K>> {
        let mut out: BTreeMap<OrderedFloat<f64>, Vec<&K>> = BTreeMap::new();
        for (k, o) in self.entries.iter().filter(|(_, o)| !o.value.is_nan()) {
            out.entry(OrderedFloat(o.value)).or_default().push(k);
        }
        out
    }

    /// Walks whole value buckets, stopping after `ranks` buckets or before
    /// the bucket that would push the total past `max_total`.
    fn take_buckets<'a>(
        buckets: impl Iterator<Item = Vec<&'a K>>,
        ranks: usize,
        max_total: Option<usize>,
    ) -> Vec<K>
    where
        K: 'a,
    {
        let mut out = Vec::new();
        for bucket in buckets.take(ranks) {
            if max_total.is_some_and(|m| out.len() + bucket.len() > m) {
                break;
            }
            out.extend(bucket.into_iter().cloned());
        }
        out
    }

    /// Keys of the `ranks` highest distinct values, highest first. Buckets of
    /// equal values are never split, so a bucket that does not fit under
    /// `max_total` ends the walk. `None` means no total limit.
    ///
    /// ```
    /// use xlseek::scoring::ScoredOccurrence;
    ///
    /// let mut occ = ScoredOccurrence::new();
    /// for (k, v) in [("A", 10.0), ("B", 10.0), ("C", 8.0), ("D", 8.0), ("E", 8.0), ("F", 5.0)] {
    ///     occ.add(k, v);
    /// }
    /// assert_eq!(occ.top_n(2, Some(5)), vec!["A", "B", "C", "D", "E"]);
    /// assert_eq!(occ.top_n(2, Some(4)), vec!["A", "B"]);
    /// ```
    pub fn top_n(&self, ranks: usize, max_total: Option<usize>) -> Vec<K> {
        Self::take_buckets(self.buckets().into_values().rev(), ranks, max_total)
    }

    /// Mirror of [`ScoredOccurrence::top_n`], lowest values first.
    pub fn bottom_n(&self, ranks: usize, max_total: Option<usize>) -> Vec<K> {
        Self::take_buckets(self.buckets().into_values(), ranks, max_total)
    }

    fn subset(&self, keys: Vec<K>) -> Self {
        let entries = keys
            .into_iter()
            .filter_map(|k| self.entries.get(&k).map(|o| (k, *o)))
            .collect();
        Self { entries }
    }

    /// [`ScoredOccurrence::top_n`] keeping the accumulated values.
    pub fn top_n_map(&self, ranks: usize, max_total: Option<usize>) -> Self {
        self.subset(self.top_n(ranks, max_total))
    }

    pub fn bottom_n_map(&self, ranks: usize, max_total: Option<usize>) -> Self {
        self.subset(self.bottom_n(ranks, max_total))
    }

    /// Copies entries of `other` whose key is not present yet.
    pub fn merge_keep_new(&mut self, other: &Self) {
        for (k, o) in other.entries.iter() {
            if !self.entries.contains_key(k) {
                self.entries.insert(k.clone(), *o);
            }
        }
    }

    /// Keeps the higher value for shared keys, copies the others.
    pub fn merge_keep_max(&mut self, other: &Self) {
        self.merge_with(other, |a, b| b.value > a.value);
    }

    /// Keeps the lower value for shared keys, copies the others.
    pub fn merge_keep_min(&mut self, other: &Self) {
        self.merge_with(other, |a, b| b.value < a.value);
    }

    fn merge_with(&mut self, other: &Self, replace: impl Fn(&Occurrence, &Occurrence) -> bool) {
        for (k, o) in other.entries.iter() {
            match self.entries.get_mut(k) {
                Some(existing) if replace(existing, o) => *existing = *o,
                Some(_) => {}
                None => {
                    self.entries.insert(k.clone(), *o);
                }
            }
        }
    }

    /// Entries sorted by ascending value, ties in first-observation order.
    pub fn sorted_entries(&self) -> Vec<(K, f64)> {
        let mut out: Vec<(K, f64)> = self
            .entries
            .iter()
            .map(|(k, o)| (k.clone(), o.value))
            .collect();
        out.sort_by(|a, b| a.1.total_cmp(&b.1));
        out
    }

    pub fn lowest_score(&self) -> Option<f64> {
        self.entries
            .values()
            .map(|o| o.value)
            .filter(|v| !v.is_nan())
            .min_by(|a, b| a.total_cmp(b))
    }

    pub fn highest_score(&self) -> Option<f64> {
        self.entries
            .values()
            .map(|o| o.value)
            .filter(|v| !v.is_nan())
            .max_by(|a, b| a.total_cmp(b))
    }
}
