use std::collections::TryReserveError;
use std::fmt::Display;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod concrete_index;
pub mod label;
pub mod slot;
pub mod variance;

pub use concrete_index::{ConcreteIndex, ExpandedIndex, FlatIndex};
pub use label::{labels_from_str, Label};
pub use slot::Slot;
pub use variance::Variance;

use crate::iterators::TensorStructureIndexIterator;

/// Number of components along every index.
pub const DIMENSION: usize = 4;

#[derive(Error, Debug)]
pub enum StructureError {
    #[error("signature {0:?} has odd length, expected marker/label pairs")]
    OddSignature(String),
    #[error("invalid variance marker {0:?}, expected '^' or '_'")]
    InvalidVarianceMarker(char),
    #[error("wrong number of labels: {found}, expected {expected}")]
    LabelCountMismatch { expected: usize, found: usize },
    #[error("label {label} appears {count} times, at most twice is allowed")]
    RepeatedLabel { label: Label, count: usize },
    #[error("label {label} repeated with the same variance {variance}")]
    SameVarianceRepeat { label: Label, variance: Variance },
    #[error("Mismatched order: {found} indices, vs rank {expected}")]
    MismatchedOrder { expected: usize, found: usize },
    #[error("Index {index} out of bounds at position {position}, dimension is {}", DIMENSION)]
    IndexOutOfBounds { index: ConcreteIndex, position: usize },
    #[error("Flat index {index} out of bounds for size {size}")]
    FlatIndexOutOfBounds { index: FlatIndex, size: usize },
    #[error("rank {0} is too large, component count overflows")]
    RankTooLarge(usize),
    #[error("storage holds {found} components, expected {expected}")]
    StorageLength { expected: usize, found: usize },
    #[error("could not allocate storage: {0}")]
    Allocation(#[from] TryReserveError),
}

/// Number of components of a tensor of the given rank, `DIMENSION^rank`.
pub fn size_of_rank(rank: usize) -> Result<usize, StructureError> {
    u32::try_from(rank)
        .ok()
        .and_then(|r| DIMENSION.checked_pow(r))
        .ok_or(StructureError::RankTooLarge(rank))
}

/// Parses a compact signature of the form `"^a_b^c"` into its slots.
///
/// # Errors
///
/// `OddSignature` if the signature is not made of marker/label pairs,
/// `InvalidVarianceMarker` if a marker is neither `^` nor `_`.
pub fn parse_signature(signature: &str) -> Result<Vec<Slot>, StructureError> {
    let chars: Vec<char> = signature.chars().collect();
    if chars.len() % 2 != 0 {
        return Err(StructureError::OddSignature(signature.to_string()));
    }
    chars
        .chunks(2)
        .map(|pair| Ok(Slot::new(pair[1], Variance::try_from(pair[0])?)))
        .collect()
}

/// Index signature shared by dense tensors and indexed views.
///
/// Storage is always row major with the most significant index first:
/// `offset = sum_j indices[j] * DIMENSION^(rank-1-j)`.
pub trait TensorStructure {
    fn rank(&self) -> usize;

    fn variance(&self, i: usize) -> Option<Variance>;

    fn variances(&self) -> Vec<Variance> {
        (0..self.rank()).filter_map(|i| self.variance(i)).collect()
    }

    /// `DIMENSION^rank`.
    ///
    /// # Errors
    ///
    /// `RankTooLarge` if the component count overflows a `usize`
    fn size(&self) -> Result<usize, StructureError> {
        size_of_rank(self.rank())
    }

    fn is_scalar(&self) -> bool {
        self.rank() == 0
    }

    /// Verifies that the list of indices provided are valid for the tensor
    ///
    /// # Errors
    ///
    /// `MismatchedOrder` if the length of the indices is different from the rank,
    ///
    /// `IndexOutOfBounds` if a coordinate is outside `[0, DIMENSION)`
    fn verify_indices<C: AsRef<[ConcreteIndex]>>(&self, indices: C) -> Result<(), StructureError> {
        let indices = indices.as_ref();
        if indices.len() != self.rank() {
            return Err(StructureError::MismatchedOrder {
                expected: self.rank(),
                found: indices.len(),
            });
        }
        if let Some(position) = indices.iter().position(|&i| i >= DIMENSION) {
            return Err(StructureError::IndexOutOfBounds {
                index: indices[position],
                position,
            });
        }
        Ok(())
    }

    /// yields the flat index of the tensor given a list of indices
    ///
    /// # Errors
    ///
    /// Same as [`Self::verify_indices`], and `RankTooLarge` as [`Self::size`]
    fn flat_index<C: AsRef<[ConcreteIndex]>>(&self, indices: C) -> Result<FlatIndex, StructureError> {
        self.verify_indices(&indices)?;
        self.size()?;
        Ok(linearize(indices.as_ref()))
    }

    /// yields the expanded index of the tensor given a flat index
    ///
    /// # Errors
    ///
    /// `FlatIndexOutOfBounds` if the flat index is out of bounds for the tensor
    fn expanded_index(&self, flat_index: FlatIndex) -> Result<ExpandedIndex, StructureError> {
        let size = self.size()?;
        if usize::from(flat_index) >= size {
            return Err(StructureError::FlatIndexOutOfBounds {
                index: flat_index,
                size,
            });
        }
        Ok(delinearize(flat_index, self.rank()))
    }

    /// yields an iterator over all the expanded indices, in storage order
    fn index_iter(&self) -> TensorStructureIndexIterator
    where
        Self: Sized,
    {
        TensorStructureIndexIterator::new(self.rank())
    }
}

/// Unchecked row-major linearization.
pub(crate) fn linearize(indices: &[ConcreteIndex]) -> FlatIndex {
    indices
        .iter()
        .fold(0, |acc, &i| acc * DIMENSION + i)
        .into()
}

/// Unchecked inverse of [`linearize`].
pub(crate) fn delinearize(flat_index: FlatIndex, rank: usize) -> ExpandedIndex {
    let mut index: usize = flat_index.into();
    let mut indices = vec![0; rank];
    for slot in indices.iter_mut().rev() {
        *slot = index % DIMENSION;
        index /= DIMENSION;
    }
    indices.into()
}

/// Structure of a dense tensor: one variance per index, labels optional.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawIndexStructure")]
pub struct IndexStructure {
    variances: Vec<Variance>,
    labels: Option<Vec<Label>>,
}

#[derive(Deserialize)]
struct RawIndexStructure {
    variances: Vec<Variance>,
    labels: Option<Vec<Label>>,
}

impl TryFrom<RawIndexStructure> for IndexStructure {
    type Error = StructureError;

    fn try_from(raw: RawIndexStructure) -> Result<Self, Self::Error> {
        let mut structure = Self::new(raw.variances)?;
        if let Some(labels) = raw.labels {
            structure.set_labels(labels)?;
        }
        Ok(structure)
    }
}

impl IndexStructure {
    /// # Errors
    ///
    /// `RankTooLarge` if `DIMENSION^rank` overflows
    pub fn new<I: IntoIterator<Item = Variance>>(variances: I) -> Result<Self, StructureError> {
        let variances: Vec<Variance> = variances.into_iter().collect();
        size_of_rank(variances.len())?;
        Ok(IndexStructure {
            variances,
            labels: None,
        })
    }

    pub fn scalar() -> Self {
        IndexStructure {
            variances: vec![],
            labels: None,
        }
    }

    /// # Errors
    ///
    /// Same as [`parse_signature`] and [`IndexStructure::new`]
    pub fn from_signature(signature: &str) -> Result<Self, StructureError> {
        let slots = parse_signature(signature)?;
        let mut structure = Self::new(slots.iter().map(|s| s.variance))?;
        structure.labels = Some(slots.into_iter().map(|s| s.label).collect());
        Ok(structure)
    }

    pub fn variances_slice(&self) -> &[Variance] {
        &self.variances
    }

    pub fn labels(&self) -> Option<&[Label]> {
        self.labels.as_deref()
    }

    pub fn is_labeled(&self) -> bool {
        self.labels.is_some()
    }

    /// # Errors
    ///
    /// `LabelCountMismatch` if the number of labels differs from the rank
    pub fn set_labels<I: IntoIterator<Item = Label>>(&mut self, labels: I) -> Result<(), StructureError> {
        let labels: Vec<Label> = labels.into_iter().collect();
        if labels.len() != self.rank() {
            return Err(StructureError::LabelCountMismatch {
                expected: self.rank(),
                found: labels.len(),
            });
        }
        self.labels = Some(labels);
        Ok(())
    }

    pub fn clear_labels(&mut self) {
        self.labels = None;
    }

    /// The labeled form of this structure, if labels are set.
    pub fn slots(&self) -> Option<LabeledStructure> {
        self.labels.as_ref().map(|labels| {
            labels
                .iter()
                .zip(&self.variances)
                .map(|(&l, &v)| Slot::new(l, v))
                .collect()
        })
    }

    /// Concatenation, `self` first. The result is labeled only if both sides are.
    ///
    /// # Errors
    ///
    /// `RankTooLarge` if the combined rank overflows
    pub fn merge(&self, other: &Self) -> Result<Self, StructureError> {
        let mut merged = Self::new(self.variances.iter().chain(&other.variances).copied())?;
        if let (Some(a), Some(b)) = (&self.labels, &other.labels) {
            merged.labels = Some(a.iter().chain(b).copied().collect());
        }
        Ok(merged)
    }

    /// Removes positions `i` and `j`, keeping the remaining order.
    #[must_use]
    pub fn traced(&self, i: usize, j: usize) -> Self {
        let keep = |k: &usize| *k != i && *k != j;
        IndexStructure {
            variances: (0..self.rank())
                .filter(keep)
                .map(|k| self.variances[k])
                .collect(),
            labels: self
                .labels
                .as_ref()
                .map(|l| (0..self.rank()).filter(keep).map(|k| l[k]).collect()),
        }
    }
}

impl TensorStructure for IndexStructure {
    fn rank(&self) -> usize {
        self.variances.len()
    }

    fn variance(&self, i: usize) -> Option<Variance> {
        self.variances.get(i).copied()
    }
}

impl From<LabeledStructure> for IndexStructure {
    fn from(value: LabeledStructure) -> Self {
        IndexStructure {
            variances: value.slots.iter().map(|s| s.variance).collect(),
            labels: Some(value.slots.iter().map(|s| s.label).collect()),
        }
    }
}

impl Display for IndexStructure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.labels {
            Some(labels) => {
                for (v, l) in self.variances.iter().zip(labels) {
                    write!(f, "{v}{l}")?;
                }
            }
            None => {
                for v in &self.variances {
                    write!(f, "{v}")?;
                }
            }
        }
        Ok(())
    }
}

/// Ordered slots of an indexed tensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct LabeledStructure {
    slots: Vec<Slot>,
}

impl FromIterator<Slot> for LabeledStructure {
    fn from_iter<T: IntoIterator<Item = Slot>>(iter: T) -> Self {
        LabeledStructure {
            slots: iter.into_iter().collect(),
        }
    }
}

impl LabeledStructure {
    /// # Errors
    ///
    /// `LabelCountMismatch` if there are not as many labels as variances
    pub fn new(variances: &[Variance], labels: &[Label]) -> Result<Self, StructureError> {
        if variances.len() != labels.len() {
            return Err(StructureError::LabelCountMismatch {
                expected: variances.len(),
                found: labels.len(),
            });
        }
        Ok(labels
            .iter()
            .zip(variances)
            .map(|(&l, &v)| Slot::new(l, v))
            .collect())
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn labels(&self) -> Vec<Label> {
        self.slots.iter().map(|s| s.label).collect()
    }

    pub fn label(&self, i: usize) -> Option<Label> {
        self.slots.get(i).map(|s| s.label)
    }

    /// Concatenation, `self` first.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        self.slots.iter().chain(&other.slots).copied().collect()
    }

    /// Removes positions `i` and `j`, keeping the remaining order.
    #[must_use]
    pub fn traced(&self, i: usize, j: usize) -> Self {
        self.slots
            .iter()
            .enumerate()
            .filter(|(k, _)| *k != i && *k != j)
            .map(|(_, s)| *s)
            .collect()
    }

    /// Finds all pairs of positions to be summed over, in order of first occurrence.
    ///
    /// A label seen once is a free index, a label seen twice with opposite
    /// variance is a contraction.
    ///
    /// # Errors
    ///
    /// `SameVarianceRepeat` if a label is repeated with equal variance,
    /// `RepeatedLabel` if a label occurs three times or more.
    pub fn traces(&self) -> Result<Vec<[usize; 2]>, StructureError> {
        let mut positions: IndexMap<Label, Vec<usize>, ahash::RandomState> = IndexMap::default();

        for (index, slot) in self.slots.iter().enumerate() {
            positions.entry(slot.label).or_default().push(index);
        }

        let mut traces = vec![];
        for (label, indices) in positions {
            match indices.as_slice() {
                [_] => {}
                &[i, j] => {
                    let (a, b) = (self.slots[i], self.slots[j]);
                    if !a.matches(&b) {
                        return Err(StructureError::SameVarianceRepeat {
                            label,
                            variance: a.variance,
                        });
                    }
                    traces.push([i, j]);
                }
                _ => {
                    return Err(StructureError::RepeatedLabel {
                        label,
                        count: indices.len(),
                    })
                }
            }
        }
        Ok(traces)
    }
}

impl TensorStructure for LabeledStructure {
    fn rank(&self) -> usize {
        self.slots.len()
    }

    fn variance(&self, i: usize) -> Option<Variance> {
        self.slots.get(i).map(|s| s.variance)
    }
}

impl Display for LabeledStructure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for slot in &self.slots {
            write!(f, "{slot}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_parsing() {
        let slots = parse_signature("^a_b_c").unwrap();
        assert_eq!(
            slots,
            vec![
                Slot::new('a', Variance::Up),
                Slot::new('b', Variance::Down),
                Slot::new('c', Variance::Down),
            ]
        );

        assert!(matches!(
            parse_signature("^a_"),
            Err(StructureError::OddSignature(_))
        ));
        assert!(matches!(
            parse_signature("^a.b"),
            Err(StructureError::InvalidVarianceMarker('.'))
        ));
        assert!(parse_signature("").unwrap().is_empty());
    }

    #[test]
    fn linearization_roundtrip() {
        for rank in 0..=4 {
            let structure = IndexStructure::new(vec![Variance::Up; rank]).unwrap();
            for i in 0..size_of_rank(rank).unwrap() {
                let expanded = structure.expanded_index(i.into()).unwrap();
                assert_eq!(structure.flat_index(&expanded).unwrap(), FlatIndex::from(i));
            }
        }
    }

    #[test]
    fn most_significant_first() {
        let structure = IndexStructure::from_signature("^a_b^c").unwrap();
        assert_eq!(usize::from(structure.flat_index([1, 2, 3]).unwrap()), 16 + 8 + 3);
        assert_eq!(
            structure.expanded_index(27.into()).unwrap(),
            ExpandedIndex::from(vec![1, 2, 3])
        );
    }

    #[test]
    fn verify_indices() {
        let structure = IndexStructure::from_signature("^a_b").unwrap();
        assert!(structure.verify_indices([3, 0]).is_ok());
        assert!(matches!(
            structure.verify_indices([0, 4]),
            Err(StructureError::IndexOutOfBounds {
                index: 4,
                position: 1
            })
        ));
        assert!(matches!(
            structure.verify_indices([0]),
            Err(StructureError::MismatchedOrder {
                expected: 2,
                found: 1
            })
        ));
        assert!(matches!(
            structure.expanded_index(16.into()),
            Err(StructureError::FlatIndexOutOfBounds { size: 16, .. })
        ));
    }

    #[test]
    fn rank_overflow() {
        assert!(matches!(
            IndexStructure::new(vec![Variance::Down; 64]),
            Err(StructureError::RankTooLarge(64))
        ));
        assert_eq!(size_of_rank(0).unwrap(), 1);
        assert_eq!(size_of_rank(3).unwrap(), 64);
    }

    #[test]
    fn traces() {
        let s: LabeledStructure = parse_signature("^a_b_a^c^b").unwrap().into_iter().collect();
        assert_eq!(s.traces().unwrap(), vec![[0, 2], [1, 4]]);

        let free: LabeledStructure = parse_signature("^a_b").unwrap().into_iter().collect();
        assert!(free.traces().unwrap().is_empty());

        let same: LabeledStructure = parse_signature("^a^a").unwrap().into_iter().collect();
        assert!(matches!(
            same.traces(),
            Err(StructureError::SameVarianceRepeat { .. })
        ));

        let triple: LabeledStructure = parse_signature("^a_a^a").unwrap().into_iter().collect();
        assert!(matches!(
            triple.traces(),
            Err(StructureError::RepeatedLabel { count: 3, .. })
        ));
    }

    #[test]
    fn oversized_slot_list() {
        let slots: LabeledStructure = (0..40).map(|_| Slot::new('a', Variance::Up)).collect();
        assert!(matches!(slots.size(), Err(StructureError::RankTooLarge(40))));
        assert!(matches!(
            slots.expanded_index(0.into()),
            Err(StructureError::RankTooLarge(40))
        ));
        assert!(matches!(
            slots.flat_index(vec![3; 40]),
            Err(StructureError::RankTooLarge(40))
        ));
    }

    #[test]
    fn traced_keeps_order() {
        let s = IndexStructure::from_signature("^a_b^c_d").unwrap();
        let t = s.traced(3, 0);
        assert_eq!(t.to_string(), "_b^c");
    }
}
