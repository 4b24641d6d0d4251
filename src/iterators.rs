//! Iterators over the components of dense tensors.
//!
//! All iterators walk storage order, i.e. row major with the most significant
//! index first.

use crate::data::DenseTensor;
use crate::structure::{delinearize, size_of_rank, ExpandedIndex, FlatIndex, TensorStructure};

/// Yields every expanded index of a structure of the given rank.
#[derive(Debug, Clone)]
pub struct TensorStructureIndexIterator {
    rank: usize,
    size: usize,
    current_flat_index: FlatIndex,
}

impl TensorStructureIndexIterator {
    #[must_use]
    pub fn new(rank: usize) -> Self {
        TensorStructureIndexIterator {
            rank,
            size: size_of_rank(rank).unwrap_or(0),
            current_flat_index: 0.into(),
        }
    }
}

impl Iterator for TensorStructureIndexIterator {
    type Item = ExpandedIndex;
    fn next(&mut self) -> Option<Self::Item> {
        if usize::from(self.current_flat_index) >= self.size {
            return None;
        }
        let indices = delinearize(self.current_flat_index, self.rank);
        self.current_flat_index += 1.into();
        Some(indices)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.size - usize::from(self.current_flat_index);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for TensorStructureIndexIterator {}

/// An iterator over all elements of a dense tensor
///
/// Returns the expanded index and the element at that index
pub struct DenseTensorIterator<'a, D> {
    tensor: &'a DenseTensor<D>,
    indices: TensorStructureIndexIterator,
    current_flat_index: usize,
}

impl<'a, D: AsRef<[f64]>> DenseTensorIterator<'a, D> {
    pub fn new(tensor: &'a DenseTensor<D>) -> Self {
        DenseTensorIterator {
            tensor,
            indices: TensorStructureIndexIterator::new(tensor.rank()),
            current_flat_index: 0,
        }
    }
}

impl<'a, D: AsRef<[f64]>> Iterator for DenseTensorIterator<'a, D> {
    type Item = (ExpandedIndex, &'a f64);

    fn next(&mut self) -> Option<Self::Item> {
        let indices = self.indices.next()?;
        let value = self.tensor.data().get(self.current_flat_index)?;
        self.current_flat_index += 1;
        Some((indices, value))
    }
}

/// An iterator over all elements of a dense tensor
///
/// Returns the flat index and the element at that index
pub struct DenseTensorLinearIterator<'a, D> {
    tensor: &'a DenseTensor<D>,
    current_flat_index: FlatIndex,
}

impl<'a, D> DenseTensorLinearIterator<'a, D> {
    pub fn new(tensor: &'a DenseTensor<D>) -> Self {
        DenseTensorLinearIterator {
            tensor,
            current_flat_index: 0.into(),
        }
    }
}

impl<'a, D: AsRef<[f64]>> Iterator for DenseTensorLinearIterator<'a, D> {
    type Item = (FlatIndex, &'a f64);

    fn next(&mut self) -> Option<Self::Item> {
        let value = self.tensor.get_linear(self.current_flat_index)?;
        let index = self.current_flat_index;
        self.current_flat_index += 1.into();
        Some((index, value))
    }
}

impl<'a, D: AsRef<[f64]>> IntoIterator for &'a DenseTensor<D> {
    type Item = (ExpandedIndex, &'a f64);
    type IntoIter = DenseTensorIterator<'a, D>;

    fn into_iter(self) -> Self::IntoIter {
        DenseTensorIterator::new(self)
    }
}
