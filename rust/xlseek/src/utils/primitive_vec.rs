use std::ops::{
    Add,
    Deref,
    Mul,
};

/// Numeric element types that can be stored unboxed in a [`PrimitiveVec`].
pub trait Primitive:
    Copy + PartialOrd + Default + Add<Output = Self> + Mul<Output = Self> + std::fmt::Debug
{
}

impl Primitive for i32 {}
impl Primitive for i64 {}
impl Primitive for u32 {}
impl Primitive for usize {}
impl Primitive for f32 {}
impl Primitive for f64 {}

/// Growable flat array of plain numbers.
///
/// Most of the read surface comes from `Deref<Target = [T]>`, this type only
/// adds the numeric bulk operations the index and the accumulators need.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrimitiveVec<T: Primitive> {
    data: Vec<T>,
}

pub type IntVec = PrimitiveVec<i32>;
pub type FloatVec = PrimitiveVec<f32>;
pub type DoubleVec = PrimitiveVec<f64>;

fn cmp_partial<T: PartialOrd>(a: &T, b: &T) -> std::cmp::Ordering {
    a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
}

impl<T: Primitive> PrimitiveVec<T> {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, value: T) {
        self.data.push(value);
    }

    pub fn pop(&mut self) -> Option<T> {
        self.data.pop()
    }

    pub fn extend_from_slice(&mut self, values: &[T]) {
        self.data.extend_from_slice(values);
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn set(&mut self, index: usize, value: T) {
        self.data[index] = value;
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Inserts keeping ascending order. Assumes the vector is already sorted.
    /// Returns the insertion index.
    pub fn insert_sorted(&mut self, value: T) -> usize {
        let idx = self.data.partition_point(|x| cmp_partial(x, &value).is_le());
        self.data.insert(idx, value);
        idx
    }

    pub fn index_of(&self, value: T) -> Option<usize> {
        self.data.iter().position(|x| *x == value)
    }

    /// Removes the first element equal to `value`.
    pub fn remove_value(&mut self, value: T) -> bool {
        match self.index_of(value) {
            Some(idx) => {
                self.data.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, index: usize) -> T {
        self.data.remove(index)
    }

    pub fn add_to_all(&mut self, value: T) {
        self.data.iter_mut().for_each(|x| *x = *x + value);
    }

    pub fn multiply_to_all(&mut self, value: T) {
        self.data.iter_mut().for_each(|x| *x = *x * value);
    }

    pub fn sum(&self) -> T {
        self.data.iter().fold(T::default(), |acc, x| acc + *x)
    }

    pub fn min(&self) -> Option<T> {
        self.data.iter().copied().min_by(cmp_partial)
    }

    pub fn max(&self) -> Option<T> {
        self.data.iter().copied().max_by(cmp_partial)
    }

    pub fn sort(&mut self) {
        self.data.sort_by(cmp_partial);
    }

    /// Index range `[start, end)` of the elements within `[low, high)`.
    /// Assumes the vector is sorted ascending.
    pub fn sorted_range(&self, low: T, high: T) -> std::ops::Range<usize> {
        let start = self.data.partition_point(|x| cmp_partial(x, &low).is_lt());
        let end = self.data.partition_point(|x| cmp_partial(x, &high).is_lt());
        start..end.max(start)
    }
}

impl<T: Primitive> Deref for PrimitiveVec<T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}

impl<T: Primitive> From<Vec<T>> for PrimitiveVec<T> {
    fn from(data: Vec<T>) -> Self {
        Self { data }
    }
}

impl<T: Primitive> FromIterator<T> for PrimitiveVec<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            data: iter.into_iter().collect(),
        }
    }
}

impl<T: Primitive> Extend<T> for PrimitiveVec<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.data.extend(iter);
    }
}

impl<T: Primitive> IntoIterator for PrimitiveVec<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.into_iter()
    }
}

impl<'a, T: Primitive> IntoIterator for &'a PrimitiveVec<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_sorted_keeps_order() {
        let mut v = DoubleVec::new();
        for x in [3.0, 1.0, 2.0, 2.0, 0.5] {
            v.insert_sorted(x);
        }
        assert_eq!(v.as_slice(), &[0.5, 1.0, 2.0, 2.0, 3.0]);
    }

    #[test]
    fn test_bulk_ops() {
        let mut v: IntVec = vec![1, 2, 3].into();
        v.add_to_all(2);
        assert_eq!(v.as_slice(), &[3, 4, 5]);
        v.multiply_to_all(2);
        assert_eq!(v.sum(), 24);
        assert_eq!(v.min(), Some(6));
        assert_eq!(v.max(), Some(10));
        assert!(v.remove_value(8));
        assert!(!v.remove_value(8));
        assert_eq!(v.len(), 2);
    }

    #[test]
    fn test_sorted_range() {
        let v: DoubleVec = vec![1.0, 2.0, 2.0, 3.0, 4.0].into();
        assert_eq!(v.sorted_range(2.0, 4.0), 1..4);
        assert_eq!(v.sorted_range(5.0, 6.0), 5..5);
        assert_eq!(v.sorted_range(3.0, 1.0), 3..3);
        let empty = FloatVec::new();
        assert_eq!(empty.min(), None);
        assert_eq!(empty.sum(), 0.0);
    }
}
