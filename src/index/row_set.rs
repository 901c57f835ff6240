//! Sets of segment-local row positions
//!
//! Index lookups return a [`RowSet`] in one of two interchangeable forms:
//! a roaring bitmap for dense results and a sorted array for sparse ones.
//! Both expose the same operations; `union_with` keeps whatever form the
//! receiver already has.

use roaring::RoaringBitmap;

/// A set of row positions within one segment
#[derive(Debug, Clone)]
pub enum RowSet {
    /// Bitmap-backed, efficient for dense results
    Bitmap(RoaringBitmap),
    /// Sorted-array-backed, efficient for sparse results
    Array(Vec<u32>),
}

impl Default for RowSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<RoaringBitmap> for RowSet {
    fn from(bitmap: RoaringBitmap) -> Self {
        Self::Bitmap(bitmap)
    }
}

impl RowSet {
    /// An empty sparse set
    pub fn empty() -> Self {
        Self::Array(Vec::new())
    }

    /// An empty dense set
    pub fn bitmap() -> Self {
        Self::Bitmap(RoaringBitmap::new())
    }

    /// Insert a position; returns whether it was newly added
    pub fn add(&mut self, position: u32) -> bool {
        match self {
            Self::Bitmap(bits) => bits.insert(position),
            Self::Array(values) => match values.binary_search(&position) {
                Ok(_) => false,
                Err(idx) => {
                    values.insert(idx, position);
                    true
                }
            },
        }
    }

    pub fn contains(&self, position: u32) -> bool {
        match self {
            Self::Bitmap(bits) => bits.contains(position),
            Self::Array(values) => values.binary_search(&position).is_ok(),
        }
    }

    pub fn len(&self) -> u64 {
        match self {
            Self::Bitmap(bits) => bits.len(),
            Self::Array(values) => values.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Add every position of `other` into this set
    pub fn union_with(&mut self, other: &RowSet) {
        match (self, other) {
            (Self::Bitmap(bits), Self::Bitmap(other_bits)) => *bits |= other_bits,
            (this, other) => {
                for position in other.iter() {
                    this.add(position);
                }
            }
        }
    }

    /// Iterate positions in ascending order
    pub fn iter(&self) -> Box<dyn Iterator<Item = u32> + '_> {
        match self {
            Self::Bitmap(bits) => Box::new(bits.iter()),
            Self::Array(values) => Box::new(values.iter().copied()),
        }
    }

    pub fn to_vec(&self) -> Vec<u32> {
        self.iter().collect()
    }
}
