//! Grid cell coordinates.

use std::fmt;

/// Integer coordinate of one grid cell, one bucket index per axis.
///
/// Keys order lexicographically: the first axis that differs decides.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey(Vec<u32>);

impl CellKey {
    /// Create a key from per-axis bucket indices.
    pub fn new(buckets: Vec<u32>) -> Self {
        Self(buckets)
    }

    /// Number of axes.
    #[inline]
    pub fn dims(&self) -> usize {
        self.0.len()
    }

    /// Bucket index along `axis`.
    #[inline]
    pub fn axis(&self, axis: usize) -> u32 {
        self.0[axis]
    }

    /// All bucket indices.
    #[inline]
    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    /// Face adjacency: no axis differs by more than one bucket, and at most one
    /// axis differs at all.
    ///
    /// Diagonal cells are not adjacent, which limits a cell to `2 * d` neighbors
    /// instead of `3^d - 1`. A key is adjacent to itself.
    pub fn is_adjacent(&self, other: &CellKey) -> bool {
        debug_assert_eq!(self.dims(), other.dims());
        let mut stepped = 0usize;
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            match a.abs_diff(*b) {
                0 => {}
                1 => {
                    stepped += 1;
                    if stepped > 1 {
                        return false;
                    }
                }
                _ => return false,
            }
        }
        true
    }
}

impl From<Vec<u32>> for CellKey {
    fn from(buckets: Vec<u32>) -> Self {
        Self::new(buckets)
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}
