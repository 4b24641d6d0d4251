use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::structure::Label;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PermutationError {
    #[error("Mismatched length: {target_len} labels vs {source_len} labels")]
    MismatchedLength { target_len: usize, source_len: usize },
    #[error("label sets are not a permutation of each other: {label} not found")]
    NotAPermutation { label: Label },
}

/// A permutation of positions, stored together with its inverse.
///
/// `apply_slice` reads `out[i] = s[map[i]]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Permutation {
    map: Vec<usize>,
    inv: Vec<usize>,
}

impl PartialOrd for Permutation {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.map.partial_cmp(&other.map)
    }
}

impl Permutation {
    /// Aligns two label sequences.
    ///
    /// Finds `P` such that `target[i] == source[P[i]]` for all `i`. Each source
    /// position is used at most once, so a repeated target label needs as
    /// many copies in the source.
    ///
    /// # Errors
    ///
    /// `MismatchedLength` if the sequences differ in length,
    /// `NotAPermutation` if a target label has no unused counterpart in the source.
    pub fn match_labels(target: &[Label], source: &[Label]) -> Result<Self, PermutationError> {
        if target.len() != source.len() {
            return Err(PermutationError::MismatchedLength {
                target_len: target.len(),
                source_len: source.len(),
            });
        }

        let mut used = vec![false; source.len()];
        let mut map = Vec::with_capacity(target.len());
        for &label in target {
            let j = (0..source.len())
                .find(|&j| !used[j] && source[j] == label)
                .ok_or(PermutationError::NotAPermutation { label })?;
            used[j] = true;
            map.push(j);
        }

        Ok(Self::from_map(map))
    }

    pub fn apply_slice<T: Clone, S>(&self, slice: S) -> Vec<T>
    where
        S: AsRef<[T]>,
    {
        let s = slice.as_ref();
        self.map.iter().map(|&idx| s[idx].clone()).collect()
    }

    pub fn apply_slice_inv<T: Clone, S>(&self, slice: S) -> Vec<T>
    where
        S: AsRef<[T]>,
    {
        let s = slice.as_ref();
        self.inv.iter().map(|&idx| s[idx].clone()).collect()
    }

    #[must_use]
    pub fn inverse(&self) -> Self {
        Permutation {
            map: self.inv.clone(),
            inv: self.map.clone(),
        }
    }

    pub fn id(n: usize) -> Self {
        Permutation {
            map: (0..n).collect(),
            inv: (0..n).collect(),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.map.iter().enumerate().all(|(i, &j)| i == j)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn map(&self) -> &[usize] {
        &self.map
    }

    pub fn from_map(map: Vec<usize>) -> Self {
        let mut inv = vec![0; map.len()];
        for (i, &j) in map.iter().enumerate() {
            inv[j] = i;
        }
        Permutation { map, inv }
    }
}

impl Display for Permutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.map)
    }
}
