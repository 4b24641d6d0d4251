/*!

Four dimensional tensor algebra with Einstein summation.

A [`DenseTensor`] stores `4^rank` `f64` components, row major with the most
significant index first, and carries one [`Variance`] per index, up
(contravariant) or down (covariant), plus optional single-character labels.

Labeling a tensor yields an [`IndexedView`], a lazy expression that can be
added, subtracted, scaled and multiplied with other views. Indices are
matched by label, not position, and any label that appears once up and once
down is summed over. Results are computed only when a component is
evaluated, or when a view is assigned back into a dense tensor.

```
# use ricci::{DenseTensor, FallibleAdd};
let mut t = DenseTensor::from_signature("^a_b").unwrap();
let mut u = DenseTensor::from_signature("_b^a").unwrap();
t.set([0, 1], 1.0).unwrap();
u.set([0, 1], 2.0).unwrap();

let sum = t.label("ab").unwrap().add_fallible(&u.label("ba").unwrap()).unwrap();
let mut out = DenseTensor::from_signature("^a_b").unwrap();
out.assign(&sum).unwrap();
assert_eq!(out[[0, 1]], 1.0);
assert_eq!(out[[1, 0]], 2.0);
```

Named collections of tensors with flat bulk transfer live in [`TensorList`].

*/

/// Index structures: variances, labels, slots and linearization
pub mod structure;

/// Iterators over structures and dense tensors
pub mod iterators;

/// Dense tensors
pub mod data;

/// Tensor contraction and exterior products
pub mod contraction;

/// Fallible addition and multiplication, and scalar arithmetic
pub mod arithmetic;

/// Lazy indexed views and their expression trees
pub mod indexed;

/// Label matching
pub mod permutation;

/// Named collections of tensors
pub mod collection;

pub use arithmetic::{FallibleAdd, FallibleAddAssign, FallibleMul, FallibleSub, FallibleSubAssign};
pub use collection::TensorList;
pub use contraction::{ContractionError, ExteriorProduct, Trace};
pub use data::{DenseTensor, TensorError};
pub use indexed::{IndexedView, ViewKind};
pub use permutation::{Permutation, PermutationError};
pub use structure::{
    ConcreteIndex, ExpandedIndex, FlatIndex, IndexStructure, Label, LabeledStructure, Slot,
    StructureError, TensorStructure, Variance, DIMENSION,
};

#[cfg(test)]
mod tests;
