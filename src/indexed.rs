//! Lazy Einstein-summation expressions.
//!
//! An [`IndexedView`] is a labeled, read-only expression tree over the storage
//! of one or more [`DenseTensor`]s. Nothing is computed when views are
//! combined; each component is evaluated on demand by walking the tree, and a
//! whole view is materialised with [`IndexedView::to_tensor`] or
//! [`DenseTensor::assign`].
//!
//! Whenever a label appears twice with opposite variance, the view is wrapped
//! in a contraction node summing over that pair, so the resulting view only
//! carries free labels.
//!
//! ```
//! # use ricci::{DenseTensor, FallibleMul};
//! let mut m = DenseTensor::from_signature("^a_b").unwrap();
//! let mut v = DenseTensor::from_signature("^c").unwrap();
//! m.set_components(&[1.0; 16]).unwrap();
//! v.set_components(&[1.0, 2.0, 3.0, 4.0]).unwrap();
//!
//! let mv = m.label("ab").unwrap().mul_fallible(&v.label("b").unwrap()).unwrap();
//! assert_eq!(mv.to_string(), "^a");
//! assert_eq!(mv.evaluate(&[0]).unwrap(), 10.0);
//! ```

use std::fmt::Display;
use std::ops::{Div, Mul, Neg};
use std::rc::Rc;

use delegate::delegate;
use duplicate::duplicate;
use log::trace;

use crate::arithmetic::{FallibleAdd, FallibleMul, FallibleSub};
use crate::data::{check_variances, DenseTensor, TensorError};
use crate::permutation::Permutation;
use crate::structure::{
    linearize, size_of_rank, ConcreteIndex, Label, LabeledStructure, StructureError,
    TensorStructure, Variance, DIMENSION,
};

/// Shape of one node of a view expression.
#[derive(Debug)]
pub enum ViewKind<'a> {
    /// Borrowed storage of a dense tensor.
    Leaf { data: &'a [f64] },
    /// `left + coefficient * right`, where `right` is read at `permutation.apply_slice(indices)`.
    Addition {
        left: IndexedView<'a>,
        right: IndexedView<'a>,
        coefficient: f64,
        permutation: Permutation,
    },
    ScalarMul {
        operand: IndexedView<'a>,
        coefficient: f64,
    },
    /// Indices of `left` first, then those of `right`.
    OuterMul {
        left: IndexedView<'a>,
        right: IndexedView<'a>,
    },
    /// Sum over two positions of `operand`.
    Contraction {
        operand: IndexedView<'a>,
        positions: [usize; 2],
    },
}

#[derive(Debug)]
struct ViewNode<'a> {
    structure: LabeledStructure,
    kind: ViewKind<'a>,
}

/// Handle to a node of a view expression.
///
/// Cloning is cheap and shares the node, so a sub-expression can feed several
/// larger expressions.
#[derive(Debug, Clone)]
pub struct IndexedView<'a> {
    node: Rc<ViewNode<'a>>,
}

impl<'a> IndexedView<'a> {
    fn from_kind(structure: LabeledStructure, kind: ViewKind<'a>) -> Self {
        IndexedView {
            node: Rc::new(ViewNode { structure, kind }),
        }
    }

    /// View over raw storage, with every repeated label summed over.
    ///
    /// # Errors
    ///
    /// `StorageLength` if `data` does not hold `D^rank` values, and the
    /// repeated-label errors of [`LabeledStructure::traces`]
    pub fn leaf(data: &'a [f64], structure: LabeledStructure) -> Result<Self, TensorError> {
        let expected = size_of_rank(structure.rank())?;
        if data.len() != expected {
            return Err(StructureError::StorageLength {
                expected,
                found: data.len(),
            }
            .into());
        }
        Self::from_kind(structure, ViewKind::Leaf { data }).contracted()
    }

    /// Wraps `self` in contraction nodes until no label is repeated.
    fn contracted(self) -> Result<Self, TensorError> {
        let traces = self.node.structure.traces()?;
        let Some(&[i, j]) = traces.first() else {
            return Ok(self);
        };
        trace!("contracting positions {i} and {j} of {self}");
        let structure = self.node.structure.traced(i, j);
        Self::from_kind(
            structure,
            ViewKind::Contraction {
                operand: self,
                positions: [i, j],
            },
        )
        .contracted()
    }

    pub fn kind(&self) -> &ViewKind<'a> {
        &self.node.kind
    }

    pub fn structure(&self) -> &LabeledStructure {
        &self.node.structure
    }

    delegate! {
        to self.node.structure {
            pub fn labels(&self) -> Vec<Label>;
            pub fn label(&self, i: usize) -> Option<Label>;
        }
    }

    #[must_use]
    pub fn scalar_mul(&self, coefficient: f64) -> Self {
        Self::from_kind(
            self.node.structure.clone(),
            ViewKind::ScalarMul {
                operand: self.clone(),
                coefficient,
            },
        )
    }

    /// `self + coefficient * rhs`, with indices of `rhs` matched to ours by label.
    ///
    /// The result keeps the label order of `self`.
    ///
    /// # Errors
    ///
    /// `RankMismatch` if the ranks differ, `NotAPermutation` if the label sets
    /// differ, `VarianceMismatch` if a shared label changes variance
    pub fn add_scaled(&self, rhs: &Self, coefficient: f64) -> Result<Self, TensorError> {
        if rhs.rank() != self.rank() {
            return Err(TensorError::RankMismatch {
                expected: self.rank(),
                found: rhs.rank(),
            });
        }
        let permutation = Permutation::match_labels(&rhs.labels(), &self.labels())?;
        check_variances(&permutation, &self.variances(), &rhs.variances())?;

        Ok(Self::from_kind(
            self.node.structure.clone(),
            ViewKind::Addition {
                left: self.clone(),
                right: rhs.clone(),
                coefficient,
                permutation,
            },
        ))
    }

    /// Outer product, then summation over every label shared by both sides.
    ///
    /// # Errors
    ///
    /// `RankTooLarge` if the combined rank overflows, and the repeated-label
    /// errors of [`LabeledStructure::traces`]
    pub fn outer(&self, rhs: &Self) -> Result<Self, TensorError> {
        let structure = self.node.structure.merge(&rhs.node.structure);
        size_of_rank(structure.rank())?;
        Self::from_kind(
            structure,
            ViewKind::OuterMul {
                left: self.clone(),
                right: rhs.clone(),
            },
        )
        .contracted()
    }

    /// Component at `indices`, one coordinate per free label.
    ///
    /// # Errors
    ///
    /// `MismatchedOrder` or `IndexOutOfBounds` from [`TensorStructure::verify_indices`]
    pub fn evaluate(&self, indices: &[ConcreteIndex]) -> Result<f64, TensorError> {
        self.verify_indices(indices)?;
        Ok(self.component(indices))
    }

    /// Unchecked evaluation, `indices` must already be valid for this view.
    pub(crate) fn component(&self, indices: &[ConcreteIndex]) -> f64 {
        match &self.node.kind {
            ViewKind::Leaf { data } => data[usize::from(linearize(indices))],
            ViewKind::Addition {
                left,
                right,
                coefficient,
                permutation,
            } => {
                left.component(indices)
                    + coefficient * right.component(&permutation.apply_slice(indices))
            }
            ViewKind::ScalarMul {
                operand,
                coefficient,
            } => coefficient * operand.component(indices),
            ViewKind::OuterMul { left, right } => {
                let (l, r) = indices.split_at(left.rank());
                left.component(l) * right.component(r)
            }
            ViewKind::Contraction {
                operand,
                positions: [i, j],
            } => {
                let (lo, hi) = (*i.min(j), *i.max(j));
                let mut full = indices.to_vec();
                full.insert(lo, 0);
                full.insert(hi, 0);
                (0..DIMENSION)
                    .map(|d| {
                        full[lo] = d;
                        full[hi] = d;
                        operand.component(&full)
                    })
                    .sum()
            }
        }
    }

    /// Evaluates every component into a new dense tensor carrying this view's labels.
    ///
    /// # Errors
    ///
    /// Same as [`DenseTensor::from_view`]
    pub fn to_tensor(&self) -> Result<DenseTensor, TensorError> {
        DenseTensor::from_view(self)
    }
}

impl TensorStructure for IndexedView<'_> {
    delegate! {
        to self.node.structure {
            fn rank(&self) -> usize;
            fn variance(&self, i: usize) -> Option<Variance>;
        }
    }
}

impl Display for IndexedView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.node.structure)
    }
}

impl<'a> FallibleAdd<IndexedView<'a>> for IndexedView<'a> {
    type Output = IndexedView<'a>;

    fn add_fallible(&self, rhs: &IndexedView<'a>) -> Result<Self::Output, TensorError> {
        self.add_scaled(rhs, 1.0)
    }
}

impl<'a> FallibleSub<IndexedView<'a>> for IndexedView<'a> {
    type Output = IndexedView<'a>;

    fn sub_fallible(&self, rhs: &IndexedView<'a>) -> Result<Self::Output, TensorError> {
        self.add_scaled(rhs, -1.0)
    }
}

impl<'a> FallibleMul<IndexedView<'a>> for IndexedView<'a> {
    type Output = IndexedView<'a>;

    fn mul_fallible(&self, rhs: &IndexedView<'a>) -> Result<Self::Output, TensorError> {
        self.outer(rhs)
    }
}

duplicate! {
    [lhs; [IndexedView<'a>]; [&IndexedView<'a>]]

    impl<'a> Mul<f64> for lhs {
        type Output = IndexedView<'a>;

        fn mul(self, rhs: f64) -> IndexedView<'a> {
            self.scalar_mul(rhs)
        }
    }

    impl<'a> Mul<lhs> for f64 {
        type Output = IndexedView<'a>;

        fn mul(self, rhs: lhs) -> IndexedView<'a> {
            rhs.scalar_mul(self)
        }
    }

    impl<'a> Div<f64> for lhs {
        type Output = IndexedView<'a>;

        fn div(self, rhs: f64) -> IndexedView<'a> {
            self.scalar_mul(1.0 / rhs)
        }
    }

    impl<'a> Neg for lhs {
        type Output = IndexedView<'a>;

        fn neg(self) -> IndexedView<'a> {
            self.scalar_mul(-1.0)
        }
    }
}
