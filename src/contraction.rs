use log::trace;
use thiserror::Error;

use crate::data::{DenseTensor, TensorError};
use crate::structure::{delinearize, linearize, TensorStructure, Variance, DIMENSION};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractionError {
    #[error("cannot contract positions {pos1} and {pos2}: both are {variance}")]
    SameVariance {
        pos1: usize,
        pos2: usize,
        variance: Variance,
    },
    #[error("position {position} out of range for rank {rank}")]
    PositionOutOfRange { position: usize, rank: usize },
    #[error("cannot contract position {0} with itself")]
    CoincidentPositions(usize),
}

pub trait ExteriorProduct<T> {
    type LCM;
    fn exterior_product(&self, other: &T) -> Result<Self::LCM, TensorError>;
}

pub trait Trace {
    type Output;

    /// Sums over every pair of positions sharing a label with opposite variance.
    fn internal_contract(&self) -> Result<Self::Output, TensorError>;
}

impl<D: AsRef<[f64]>> DenseTensor<D> {
    /// Sums over positions `pos1` and `pos2`, which must have opposite variance.
    ///
    /// The result has rank two lower and keeps the remaining indices, labels
    /// included, in their original order.
    ///
    /// # Errors
    ///
    /// `PositionOutOfRange`, `CoincidentPositions` or `SameVariance`
    pub fn contract(&self, pos1: usize, pos2: usize) -> Result<DenseTensor, TensorError> {
        let rank = self.rank();
        for position in [pos1, pos2] {
            if position >= rank {
                return Err(ContractionError::PositionOutOfRange { position, rank }.into());
            }
        }
        if pos1 == pos2 {
            return Err(ContractionError::CoincidentPositions(pos1).into());
        }
        let variances = self.structure().variances_slice();
        if variances[pos1] == variances[pos2] {
            return Err(ContractionError::SameVariance {
                pos1,
                pos2,
                variance: variances[pos1],
            }
            .into());
        }

        trace!("contracting positions {pos1} and {pos2} of {}", self.structure());
        let mut result = DenseTensor::zeros(self.structure().traced(pos1, pos2))?;
        let data = self.data();
        let mut indices = vec![0; rank];
        for (i, x) in result.data_mut().iter_mut().enumerate() {
            let free = delinearize(i.into(), rank - 2);
            let mut free = free.iter();
            for (k, index) in indices.iter_mut().enumerate() {
                if k != pos1 && k != pos2 {
                    *index = free.next().copied().unwrap_or_default();
                }
            }
            let mut sum = 0.0;
            for d in 0..DIMENSION {
                indices[pos1] = d;
                indices[pos2] = d;
                sum += data[usize::from(linearize(&indices))];
            }
            *x = sum;
        }
        Ok(result)
    }
}

impl<D: AsRef<[f64]>> Trace for DenseTensor<D> {
    type Output = DenseTensor;

    /// Contracts the first repeated label, then repeats on the result until
    /// no label is repeated. Unlabeled tensors are returned unchanged.
    fn internal_contract(&self) -> Result<DenseTensor, TensorError> {
        let Some(slots) = self.structure().slots() else {
            return Ok(self.to_owned_tensor());
        };
        match slots.traces()?.first() {
            Some(&[i, j]) => self.contract(i, j)?.internal_contract(),
            None => Ok(self.to_owned_tensor()),
        }
    }
}

impl<D: AsRef<[f64]>, E: AsRef<[f64]>> ExteriorProduct<DenseTensor<E>> for DenseTensor<D> {
    type LCM = DenseTensor;

    /// `out[i * other.data().len() + j] = self[i] * other[j]`, indices of `self` first.
    ///
    /// # Errors
    ///
    /// `MissingLabels` if only one side is labeled, `RankTooLarge` if the
    /// combined rank overflows
    fn exterior_product(&self, other: &DenseTensor<E>) -> Result<DenseTensor, TensorError> {
        if self.is_labeled() != other.is_labeled() {
            return Err(TensorError::MissingLabels);
        }
        let final_structure = self.structure().merge(other.structure())?;
        let mut out = DenseTensor::zeros(final_structure)?;

        let stride = other.data().len();
        let data = out.data_mut();
        for (i, u) in self.data().iter().enumerate() {
            for (j, t) in other.data().iter().enumerate() {
                data[i * stride + j] = u * t;
            }
        }

        Ok(out)
    }
}
