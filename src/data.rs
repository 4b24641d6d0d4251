use std::fmt::Display;
use std::ops::{Index, IndexMut};

use delegate::delegate;
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::contraction::ContractionError;
use crate::indexed::IndexedView;
use crate::iterators::DenseTensorLinearIterator;
use crate::permutation::{Permutation, PermutationError};
use crate::structure::{
    delinearize, labels_from_str, linearize, size_of_rank, ConcreteIndex, ExpandedIndex,
    FlatIndex, IndexStructure, Label, LabeledStructure, StructureError, TensorStructure,
    Variance,
};

#[derive(Error, Debug)]
pub enum TensorError {
    #[error("{0}")]
    Structure(#[from] StructureError),
    #[error("{0}")]
    Permutation(#[from] PermutationError),
    #[error("{0}")]
    Contraction(#[from] ContractionError),
    #[error("variance mismatch at position {position}: expected {expected}, found {found}")]
    VarianceMismatch {
        position: usize,
        expected: Variance,
        found: Variance,
    },
    #[error("Mismatched rank: {found} vs {expected}")]
    RankMismatch { expected: usize, found: usize },
    #[error("tensor has no labels")]
    MissingLabels,
    #[error("buffer holds {available} components, {needed} needed")]
    BufferTooSmall { needed: usize, available: usize },
}

/// Dense tensor in four dimensions, generic on the storage `D`.
///
/// Components are stored row major with the most significant index first, so
/// `D^rank` values in total. The default storage is an owned `Vec<f64>`; a
/// caller-supplied `&mut [f64]` can be wrapped instead with
/// [`DenseTensor::from_storage`], in which case dropping the tensor leaves the
/// buffer alone.
///
/// # Example
///
/// ```
/// # use ricci::data::DenseTensor;
/// let mut t = DenseTensor::from_signature("^a_b").unwrap();
/// *t.get_mut([0, 1]).unwrap() = 2.0;
/// let trace = t.label("aa").unwrap().evaluate(&[]).unwrap();
/// assert_eq!(trace, 0.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "RawDenseTensor<D>",
    bound(deserialize = "D: Deserialize<'de> + AsRef<[f64]>")
)]
pub struct DenseTensor<D = Vec<f64>> {
    data: D,
    structure: IndexStructure,
}

#[derive(Deserialize)]
struct RawDenseTensor<D> {
    data: D,
    structure: IndexStructure,
}

impl<D: AsRef<[f64]>> TryFrom<RawDenseTensor<D>> for DenseTensor<D> {
    type Error = TensorError;

    fn try_from(raw: RawDenseTensor<D>) -> Result<Self, Self::Error> {
        Self::with_structure(raw.data, raw.structure)
    }
}

fn zeroed(size: usize) -> Result<Vec<f64>, StructureError> {
    let mut data = Vec::new();
    data.try_reserve_exact(size)?;
    data.resize(size, 0.0);
    Ok(data)
}

impl DenseTensor {
    /// Zero tensor with the given structure.
    ///
    /// # Errors
    ///
    /// `RankTooLarge` or `Allocation` if the storage cannot be built
    pub fn zeros(structure: IndexStructure) -> Result<Self, TensorError> {
        let data = zeroed(size_of_rank(structure.rank())?)?;
        Ok(DenseTensor { data, structure })
    }

    /// Zero tensor with one index per variance, unlabeled.
    ///
    /// # Errors
    ///
    /// Same as [`DenseTensor::zeros`]
    pub fn new<I: IntoIterator<Item = Variance>>(variances: I) -> Result<Self, TensorError> {
        Self::zeros(IndexStructure::new(variances)?)
    }

    /// Zero tensor with the given variances and one label character per index.
    ///
    /// # Errors
    ///
    /// Same as [`DenseTensor::zeros`], plus `LabelCountMismatch`
    pub fn new_labeled<I: IntoIterator<Item = Variance>>(
        variances: I,
        labels: &str,
    ) -> Result<Self, TensorError> {
        let mut structure = IndexStructure::new(variances)?;
        structure.set_labels(labels_from_str(labels))?;
        Self::zeros(structure)
    }

    /// Zero tensor from a compact signature such as `"^a_b_c"`.
    ///
    /// # Errors
    ///
    /// `OddSignature` or `InvalidVarianceMarker` for malformed signatures
    pub fn from_signature(signature: &str) -> Result<Self, TensorError> {
        Self::zeros(IndexStructure::from_signature(signature)?)
    }

    pub fn scalar(value: f64) -> Self {
        DenseTensor {
            data: vec![value],
            structure: IndexStructure::scalar(),
        }
    }

    /// # Errors
    ///
    /// `StorageLength` if `data` does not hold exactly `D^rank` values
    pub fn from_data<I: IntoIterator<Item = Variance>>(
        data: Vec<f64>,
        variances: I,
    ) -> Result<Self, TensorError> {
        Self::from_storage(data, variances)
    }

    /// Evaluates every component of `view` into a new tensor carrying the
    /// view's variances and labels.
    ///
    /// # Errors
    ///
    /// `RankTooLarge` or `Allocation` if the storage cannot be built
    pub fn from_view(view: &IndexedView<'_>) -> Result<Self, TensorError> {
        let rank = view.rank();
        let mut data = zeroed(size_of_rank(rank)?)?;
        debug!("materialising view {view} into {} components", data.len());
        for (i, x) in data.iter_mut().enumerate() {
            *x = view.component(&delinearize(i.into(), rank));
        }
        Ok(DenseTensor {
            data,
            structure: view.structure().clone().into(),
        })
    }
}

impl<D: AsRef<[f64]>> DenseTensor<D> {
    /// Wraps existing storage.
    ///
    /// # Errors
    ///
    /// `StorageLength` if `storage` does not hold exactly `D^rank` values
    pub fn from_storage<I: IntoIterator<Item = Variance>>(
        storage: D,
        variances: I,
    ) -> Result<Self, TensorError> {
        Self::with_structure(storage, IndexStructure::new(variances)?)
    }

    /// Wraps existing storage, with variances and labels given by a compact signature.
    ///
    /// # Errors
    ///
    /// Signature errors as [`DenseTensor::from_signature`], `StorageLength` as
    /// [`DenseTensor::from_storage`]
    pub fn from_signature_with_storage(signature: &str, storage: D) -> Result<Self, TensorError> {
        Self::with_structure(storage, IndexStructure::from_signature(signature)?)
    }

    fn with_structure(storage: D, structure: IndexStructure) -> Result<Self, TensorError> {
        let expected = size_of_rank(structure.rank())?;
        let found = storage.as_ref().len();
        if found != expected {
            return Err(StructureError::StorageLength { expected, found }.into());
        }
        Ok(DenseTensor {
            data: storage,
            structure,
        })
    }

    pub fn data(&self) -> &[f64] {
        self.data.as_ref()
    }

    pub fn structure(&self) -> &IndexStructure {
        &self.structure
    }

    delegate! {
        to self.structure {
            pub fn labels(&self) -> Option<&[Label]>;
            pub fn is_labeled(&self) -> bool;
        }
    }

    /// Deep copy into owned storage.
    pub fn to_owned_tensor(&self) -> DenseTensor {
        DenseTensor {
            data: self.data().to_vec(),
            structure: self.structure.clone(),
        }
    }

    pub fn get_linear(&self, index: FlatIndex) -> Option<&f64> {
        self.data().get(usize::from(index))
    }

    /// # Errors
    ///
    /// `MismatchedOrder` or `IndexOutOfBounds` from [`TensorStructure::verify_indices`]
    pub fn get<C: AsRef<[ConcreteIndex]>>(&self, indices: C) -> Result<&f64, TensorError> {
        let index = self.flat_index(indices)?;
        Ok(&self.data()[usize::from(index)])
    }

    pub fn iter_flat(&self) -> DenseTensorLinearIterator<'_, D> {
        DenseTensorLinearIterator::new(self)
    }

    /// Copies all components into `out`, returning how many were copied (`D^rank`).
    ///
    /// # Errors
    ///
    /// `BufferTooSmall` if `out` cannot hold every component
    pub fn get_components(&self, out: &mut [f64]) -> Result<usize, TensorError> {
        let data = self.data();
        let available = out.len();
        let out = out.get_mut(..data.len()).ok_or(TensorError::BufferTooSmall {
            needed: data.len(),
            available,
        })?;
        out.copy_from_slice(data);
        Ok(data.len())
    }

    /// Indexed view over this tensor's storage with the given labels.
    ///
    /// Repeated labels of opposite variance are summed over straight away, so
    /// `T.label("aa")` on a `^_` tensor is its trace.
    ///
    /// # Errors
    ///
    /// `LabelCountMismatch` if there is not one label per index, and the
    /// repeated-label errors of [`LabeledStructure::traces`]
    pub fn label(&self, labels: &str) -> Result<IndexedView<'_>, TensorError> {
        let structure =
            LabeledStructure::new(self.structure.variances_slice(), &labels_from_str(labels))?;
        IndexedView::leaf(self.data(), structure)
    }

    /// Indexed view using the tensor's own labels.
    ///
    /// # Errors
    ///
    /// `MissingLabels` if no labels are set
    pub fn view(&self) -> Result<IndexedView<'_>, TensorError> {
        let structure = self.structure.slots().ok_or(TensorError::MissingLabels)?;
        IndexedView::leaf(self.data(), structure)
    }

    /// Permutation taking this tensor's index order to `other`'s, so that
    /// `other_indices = p.apply_slice(indices)`.
    ///
    /// Labeled tensors are matched by label, unlabeled tensors by position.
    pub(crate) fn alignment<E: AsRef<[f64]>>(
        &self,
        other: &DenseTensor<E>,
    ) -> Result<Permutation, TensorError> {
        if self.rank() != other.rank() {
            return Err(TensorError::RankMismatch {
                expected: self.rank(),
                found: other.rank(),
            });
        }
        let permutation = match (self.labels(), other.labels()) {
            (Some(ours), Some(theirs)) => Permutation::match_labels(theirs, ours)?,
            (None, None) => Permutation::id(self.rank()),
            _ => return Err(TensorError::MissingLabels),
        };
        check_variances(&permutation, &self.variances(), &other.variances())?;
        Ok(permutation)
    }
}

/// Checks that `found[j] == expected[p[j]]` for every position.
pub(crate) fn check_variances(
    permutation: &Permutation,
    expected: &[Variance],
    found: &[Variance],
) -> Result<(), TensorError> {
    for (j, &position) in permutation.map().iter().enumerate() {
        if expected[position] != found[j] {
            return Err(TensorError::VarianceMismatch {
                position,
                expected: expected[position],
                found: found[j],
            });
        }
    }
    Ok(())
}

impl<D: AsRef<[f64]> + AsMut<[f64]>> DenseTensor<D> {
    pub fn data_mut(&mut self) -> &mut [f64] {
        self.data.as_mut()
    }

    pub fn get_linear_mut(&mut self, index: FlatIndex) -> Option<&mut f64> {
        self.data_mut().get_mut(usize::from(index))
    }

    /// # Errors
    ///
    /// `MismatchedOrder` or `IndexOutOfBounds` from [`TensorStructure::verify_indices`]
    pub fn get_mut<C: AsRef<[ConcreteIndex]>>(
        &mut self,
        indices: C,
    ) -> Result<&mut f64, TensorError> {
        let index = self.flat_index(indices)?;
        Ok(&mut self.data_mut()[usize::from(index)])
    }

    /// # Errors
    ///
    /// Same as [`DenseTensor::get_mut`]
    pub fn set<C: AsRef<[ConcreteIndex]>>(
        &mut self,
        indices: C,
        value: f64,
    ) -> Result<(), TensorError> {
        *self.get_mut(indices)? = value;
        Ok(())
    }

    /// Copies `D^rank` components from `input`, returning how many were copied.
    ///
    /// # Errors
    ///
    /// `BufferTooSmall` if `input` holds fewer than `D^rank` values
    pub fn set_components(&mut self, input: &[f64]) -> Result<usize, TensorError> {
        let data = self.data_mut();
        let input = input.get(..data.len()).ok_or(TensorError::BufferTooSmall {
            needed: data.len(),
            available: input.len(),
        })?;
        data.copy_from_slice(input);
        Ok(data.len())
    }

    /// # Errors
    ///
    /// `LabelCountMismatch` if there is not one label per index
    pub fn set_labels(&mut self, labels: &str) -> Result<(), TensorError> {
        Ok(self.structure.set_labels(labels_from_str(labels))?)
    }

    /// # Errors
    ///
    /// Same as [`DenseTensor::set_labels`]
    pub fn with_labels(mut self, labels: &str) -> Result<Self, TensorError> {
        self.set_labels(labels)?;
        Ok(self)
    }

    /// Overwrites every component with the value of `view`.
    ///
    /// The view's labels must be a permutation of this tensor's, with matching
    /// variances; destination index `i` is read from the view at the position
    /// carrying the same label. Nothing is written unless all checks pass. A
    /// rank-0 tensor takes the value of a rank-0 view, labels or not.
    ///
    /// # Errors
    ///
    /// `MissingLabels`, `RankMismatch`, `NotAPermutation` or `VarianceMismatch`
    pub fn assign(&mut self, view: &IndexedView<'_>) -> Result<(), TensorError> {
        if view.rank() != self.rank() {
            return Err(TensorError::RankMismatch {
                expected: self.rank(),
                found: view.rank(),
            });
        }

        if self.is_scalar() {
            self.data_mut()[0] = view.component(&[]);
            return Ok(());
        }

        let labels = self.labels().ok_or(TensorError::MissingLabels)?;
        let permutation = Permutation::match_labels(&view.labels(), labels)?;
        check_variances(&permutation, &self.variances(), &view.variances())?;
        debug!("assigning {view} to {} with {permutation}", self.structure);

        let rank = self.rank();
        for (i, x) in self.data_mut().iter_mut().enumerate() {
            let indices = delinearize(i.into(), rank);
            *x = view.component(&permutation.apply_slice(&indices));
        }
        Ok(())
    }

    /// Relabels this tensor, then assigns `view` to it.
    ///
    /// # Errors
    ///
    /// Same as [`DenseTensor::set_labels`] and [`DenseTensor::assign`]. On
    /// failure the tensor keeps its previous labels and components.
    pub fn assign_labeled(
        &mut self,
        labels: &str,
        view: &IndexedView<'_>,
    ) -> Result<(), TensorError> {
        let previous = self.structure.clone();
        self.set_labels(labels)?;
        self.assign(view).inspect_err(|_| self.structure = previous)
    }

    /// Assigns another dense tensor, matching indices by label.
    ///
    /// # Errors
    ///
    /// Same as [`DenseTensor::assign`]
    pub fn assign_from<E: AsRef<[f64]>>(
        &mut self,
        other: &DenseTensor<E>,
    ) -> Result<(), TensorError> {
        let permutation = self.alignment(other)?;
        let rank = self.rank();
        let theirs = other.data();
        for (i, x) in self.data.as_mut().iter_mut().enumerate() {
            let indices = permutation.apply_slice(&delinearize(i.into(), rank));
            *x = theirs[usize::from(linearize(&indices))];
        }
        Ok(())
    }
}

impl<D> TensorStructure for DenseTensor<D> {
    delegate! {
        to self.structure {
            fn rank(&self) -> usize;
            fn variance(&self, i: usize) -> Option<Variance>;
        }
    }
}

impl<D: AsRef<[f64]>> Index<FlatIndex> for DenseTensor<D> {
    type Output = f64;

    fn index(&self, index: FlatIndex) -> &Self::Output {
        &self.data()[usize::from(index)]
    }
}

impl<D: AsRef<[f64]> + AsMut<[f64]>> IndexMut<FlatIndex> for DenseTensor<D> {
    fn index_mut(&mut self, index: FlatIndex) -> &mut Self::Output {
        &mut self.data_mut()[usize::from(index)]
    }
}

impl<D: AsRef<[f64]>, const N: usize> Index<[ConcreteIndex; N]> for DenseTensor<D> {
    type Output = f64;

    fn index(&self, index: [ConcreteIndex; N]) -> &Self::Output {
        match self.get(index) {
            Ok(x) => x,
            Err(e) => panic!("{e}"),
        }
    }
}

impl<D: AsRef<[f64]> + AsMut<[f64]>, const N: usize> IndexMut<[ConcreteIndex; N]>
    for DenseTensor<D>
{
    fn index_mut(&mut self, index: [ConcreteIndex; N]) -> &mut Self::Output {
        match self.get_mut(index) {
            Ok(x) => x,
            Err(e) => panic!("{e}"),
        }
    }
}

impl<D: AsRef<[f64]>> Display for DenseTensor<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, v) in self.iter_flat() {
            let index: ExpandedIndex = delinearize(i, self.rank());
            writeln!(f, "{}: {}", index, v)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction() {
        let t = DenseTensor::new([Variance::Up, Variance::Down, Variance::Down]).unwrap();
        assert_eq!(t.rank(), 3);
        assert_eq!(t.data().len(), 64);
        assert!(t.data().iter().all(|&x| x == 0.0));
        assert!(!t.is_labeled());

        let s = DenseTensor::from_signature("^a_b").unwrap();
        assert_eq!(s.variances(), vec![Variance::Up, Variance::Down]);
        assert_eq!(s.labels().unwrap(), labels_from_str("ab").as_slice());

        assert!(matches!(
            DenseTensor::from_signature("^a_"),
            Err(TensorError::Structure(StructureError::OddSignature(_)))
        ));
        assert!(matches!(
            DenseTensor::new_labeled([Variance::Up], "ab"),
            Err(TensorError::Structure(
                StructureError::LabelCountMismatch { .. }
            ))
        ));
        assert!(matches!(
            DenseTensor::new(vec![Variance::Up; 40]),
            Err(TensorError::Structure(StructureError::RankTooLarge(40)))
        ));
    }

    #[test]
    fn element_access() {
        let mut t = DenseTensor::from_signature("^a_b").unwrap();
        t.set([1, 2], 3.5).unwrap();
        assert_eq!(*t.get([1, 2]).unwrap(), 3.5);
        assert_eq!(t[[1, 2]], 3.5);
        assert_eq!(t[FlatIndex::from(6)], 3.5);
        t[[3, 3]] = -1.0;
        assert_eq!(t.data()[15], -1.0);

        assert!(matches!(
            t.get([4, 0]),
            Err(TensorError::Structure(StructureError::IndexOutOfBounds {
                index: 4,
                position: 0
            }))
        ));
        assert!(matches!(
            t.set([0, 0, 0], 1.0),
            Err(TensorError::Structure(StructureError::MismatchedOrder { .. }))
        ));
    }

    #[test]
    #[should_panic]
    fn index_out_of_range_panics() {
        let t = DenseTensor::from_signature("^a").unwrap();
        let _ = t[[4]];
    }

    #[test]
    fn scalar() {
        let none: [usize; 0] = [];
        let mut s = DenseTensor::scalar(2.0);
        assert!(s.is_scalar());
        assert_eq!(*s.get(none).unwrap(), 2.0);
        s[none] = 3.0;
        assert_eq!(s.data(), &[3.0]);
    }

    #[test]
    fn bulk_transfer() {
        let mut t = DenseTensor::from_signature("^a").unwrap();
        assert_eq!(t.set_components(&[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap(), 4);
        let mut out = [0.0; 4];
        assert_eq!(t.get_components(&mut out).unwrap(), 4);
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0]);

        assert!(matches!(
            t.get_components(&mut [0.0; 3]),
            Err(TensorError::BufferTooSmall {
                needed: 4,
                available: 3
            })
        ));
        assert!(matches!(
            t.set_components(&[0.0; 2]),
            Err(TensorError::BufferTooSmall { .. })
        ));
    }

    #[test]
    fn borrowed_storage() {
        let mut buffer = vec![0.0; 16];
        {
            let mut t =
                DenseTensor::from_signature_with_storage("^a_b", buffer.as_mut_slice()).unwrap();
            t.set([0, 3], 7.0).unwrap();
            let copy = t.to_owned_tensor();
            assert_eq!(copy[[0, 3]], 7.0);
        }
        assert_eq!(buffer[3], 7.0);

        assert!(matches!(
            DenseTensor::from_storage(&mut buffer[..5], [Variance::Up]),
            Err(TensorError::Structure(StructureError::StorageLength {
                expected: 4,
                found: 5
            }))
        ));
    }

    #[test]
    fn deserialization_checks_storage() {
        let t: DenseTensor = serde_json::from_str(
            r#"{"data":[1.0,2.0,3.0,4.0],"structure":{"variances":["Up"],"labels":["a"]}}"#,
        )
        .unwrap();
        assert_eq!(t[[2]], 3.0);
        assert_eq!(t.structure().to_string(), "^a");

        let short = serde_json::from_str::<DenseTensor>(
            r#"{"data":[1.0],"structure":{"variances":["Up"],"labels":null}}"#,
        )
        .unwrap_err();
        assert!(short
            .to_string()
            .starts_with("storage holds 1 components, expected 4"));

        let mislabeled = serde_json::from_str::<DenseTensor>(
            r#"{"data":[1.0,2.0,3.0,4.0],"structure":{"variances":["Up"],"labels":["a","b"]}}"#,
        )
        .unwrap_err();
        assert!(mislabeled
            .to_string()
            .starts_with("wrong number of labels: 2, expected 1"));
    }

    #[test]
    fn clone_is_deep() {
        let mut t = DenseTensor::from_signature("^a").unwrap();
        let copy = t.clone();
        t.set([0], 1.0).unwrap();
        assert_eq!(copy[[0]], 0.0);
    }

    #[test]
    fn display() {
        let mut t = DenseTensor::new([Variance::Up]).unwrap();
        t.set_components(&[1.0, 2.0, 0.5, -1.0]).unwrap();
        insta::assert_snapshot!(t.to_string().trim_end(), @r###"
        [0]: 1
        [1]: 2
        [2]: 0.5
        [3]: -1
        "###);
    }
}
