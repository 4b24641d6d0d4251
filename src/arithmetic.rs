use std::ops::{Div, DivAssign, Mul, MulAssign, Neg};

use duplicate::duplicate;

use crate::contraction::{ExteriorProduct, Trace};
use crate::data::{DenseTensor, TensorError};
use crate::structure::{delinearize, linearize, TensorStructure};

pub trait FallibleAdd<Rhs> {
    type Output;
    fn add_fallible(&self, rhs: &Rhs) -> Result<Self::Output, TensorError>;
}

pub trait FallibleSub<Rhs> {
    type Output;
    fn sub_fallible(&self, rhs: &Rhs) -> Result<Self::Output, TensorError>;
}

pub trait FallibleMul<Rhs> {
    type Output;
    fn mul_fallible(&self, rhs: &Rhs) -> Result<Self::Output, TensorError>;
}

pub trait FallibleAddAssign<Rhs> {
    fn add_assign_fallible(&mut self, rhs: &Rhs) -> Result<(), TensorError>;
}

pub trait FallibleSubAssign<Rhs> {
    fn sub_assign_fallible(&mut self, rhs: &Rhs) -> Result<(), TensorError>;
}

impl<D: AsRef<[f64]> + AsMut<[f64]>> DenseTensor<D> {
    /// `self += coefficient * rhs`, with indices of `rhs` matched to ours by label.
    fn accumulate<E: AsRef<[f64]>>(
        &mut self,
        rhs: &DenseTensor<E>,
        coefficient: f64,
    ) -> Result<(), TensorError> {
        let permutation = self.alignment(rhs)?;
        let rank = self.rank();
        let theirs = rhs.data();
        for (i, x) in self.data_mut().iter_mut().enumerate() {
            let indices = permutation.apply_slice(&delinearize(i.into(), rank));
            *x += coefficient * theirs[usize::from(linearize(&indices))];
        }
        Ok(())
    }
}

duplicate! {
    [
        trait_name          method                  coefficient;
        [FallibleAddAssign] [add_assign_fallible]   [1.0];
        [FallibleSubAssign] [sub_assign_fallible]   [-1.0];
    ]
    impl<D, E> trait_name<DenseTensor<E>> for DenseTensor<D>
    where
        D: AsRef<[f64]> + AsMut<[f64]>,
        E: AsRef<[f64]>,
    {
        fn method(&mut self, rhs: &DenseTensor<E>) -> Result<(), TensorError> {
            self.accumulate(rhs, coefficient)
        }
    }
}

duplicate! {
    [
        trait_name      method          coefficient;
        [FallibleAdd]   [add_fallible]  [1.0];
        [FallibleSub]   [sub_fallible]  [-1.0];
    ]
    impl<D, E> trait_name<DenseTensor<E>> for DenseTensor<D>
    where
        D: AsRef<[f64]>,
        E: AsRef<[f64]>,
    {
        type Output = DenseTensor;

        fn method(&self, rhs: &DenseTensor<E>) -> Result<DenseTensor, TensorError> {
            let mut out = self.to_owned_tensor();
            out.accumulate(rhs, coefficient)?;
            Ok(out)
        }
    }
}

impl<D: AsRef<[f64]>, E: AsRef<[f64]>> FallibleMul<DenseTensor<E>> for DenseTensor<D> {
    type Output = DenseTensor;

    /// Outer product, followed by summation over every repeated label when both
    /// sides are labeled.
    fn mul_fallible(&self, rhs: &DenseTensor<E>) -> Result<DenseTensor, TensorError> {
        let product = self.exterior_product(rhs)?;
        if product.is_labeled() {
            product.internal_contract()
        } else {
            Ok(product)
        }
    }
}

impl<D: AsRef<[f64]> + AsMut<[f64]>> MulAssign<f64> for DenseTensor<D> {
    fn mul_assign(&mut self, rhs: f64) {
        self.data_mut().iter_mut().for_each(|x| *x *= rhs);
    }
}

impl<D: AsRef<[f64]> + AsMut<[f64]>> DivAssign<f64> for DenseTensor<D> {
    fn div_assign(&mut self, rhs: f64) {
        self.data_mut().iter_mut().for_each(|x| *x /= rhs);
    }
}

duplicate! {
    [lhs; [DenseTensor<D>]; [&DenseTensor<D>]]

    impl<D: AsRef<[f64]>> Mul<f64> for lhs {
        type Output = DenseTensor;

        fn mul(self, rhs: f64) -> DenseTensor {
            let mut out = self.to_owned_tensor();
            out *= rhs;
            out
        }
    }

    impl<D: AsRef<[f64]>> Mul<lhs> for f64 {
        type Output = DenseTensor;

        fn mul(self, rhs: lhs) -> DenseTensor {
            rhs * self
        }
    }

    impl<D: AsRef<[f64]>> Div<f64> for lhs {
        type Output = DenseTensor;

        fn div(self, rhs: f64) -> DenseTensor {
            let mut out = self.to_owned_tensor();
            out /= rhs;
            out
        }
    }

    impl<D: AsRef<[f64]>> Neg for lhs {
        type Output = DenseTensor;

        fn neg(self) -> DenseTensor {
            self * -1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::{Variance, DIMENSION};
    use approx::assert_relative_eq;

    fn filled(signature: &str, f: impl Fn(usize) -> f64) -> DenseTensor {
        let mut t = DenseTensor::from_signature(signature).unwrap();
        for (i, x) in t.data_mut().iter_mut().enumerate() {
            *x = f(i);
        }
        t
    }

    #[test]
    fn add_matches_by_label() {
        let a = filled("^a_b", |i| i as f64);
        let b = filled("_b^a", |i| 100.0 * i as f64);
        let sum = a.add_fallible(&b).unwrap();
        assert_eq!(sum.structure(), a.structure());
        for i in 0..DIMENSION {
            for j in 0..DIMENSION {
                assert_eq!(sum[[i, j]], a[[i, j]] + b[[j, i]]);
            }
        }

        let diff = a.sub_fallible(&a).unwrap();
        assert!(diff.data().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn add_assign_in_place() {
        let mut a = filled("^a^b", |_| 1.0);
        let b = filled("^b^a", |i| i as f64);
        a.add_assign_fallible(&b).unwrap();
        assert_eq!(a[[1, 2]], 1.0 + b[[2, 1]]);
        a.sub_assign_fallible(&b).unwrap();
        assert!(a.data().iter().all(|&x| x == 1.0));
    }

    #[test]
    fn add_failures() {
        let mut a = filled("^a_b", |_| 1.0);
        let before = a.clone();

        let wrong_variance = filled("_a_b", |_| 1.0);
        assert!(matches!(
            a.add_assign_fallible(&wrong_variance),
            Err(TensorError::VarianceMismatch { position: 0, .. })
        ));

        let wrong_labels = filled("^a_c", |_| 1.0);
        assert!(matches!(
            a.add_assign_fallible(&wrong_labels),
            Err(TensorError::Permutation(_))
        ));

        let wrong_rank = filled("^a", |_| 1.0);
        assert!(matches!(
            a.add_assign_fallible(&wrong_rank),
            Err(TensorError::RankMismatch { .. })
        ));

        let unlabeled = DenseTensor::new([Variance::Up, Variance::Down]).unwrap();
        assert!(matches!(
            a.add_assign_fallible(&unlabeled),
            Err(TensorError::MissingLabels)
        ));
        assert_eq!(a, before);
    }

    #[test]
    fn unlabeled_add_positionally() {
        let mut a = DenseTensor::from_data(vec![1.0; 4], [Variance::Down]).unwrap();
        let b = DenseTensor::from_data(vec![1.0, 2.0, 3.0, 4.0], [Variance::Down]).unwrap();
        a.add_assign_fallible(&b).unwrap();
        assert_eq!(a.data(), &[2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn scalar_ops() {
        let a = filled("^a", |i| i as f64);
        assert_eq!((&a * 2.0).data(), &[0.0, 2.0, 4.0, 6.0]);
        assert_eq!((2.0 * &a).data(), &[0.0, 2.0, 4.0, 6.0]);
        assert_eq!((&a / 2.0).data(), &[0.0, 0.5, 1.0, 1.5]);
        assert_eq!((-&a).data(), &[0.0, -1.0, -2.0, -3.0]);

        let mut b = a.clone();
        b *= 3.0;
        b /= 6.0;
        for (x, y) in b.data().iter().zip(a.data()) {
            assert_relative_eq!(*x, y / 2.0);
        }
        assert_eq!((-a).structure().to_string(), "^a");
    }

    #[test]
    fn multiply_contracts() {
        let m = filled("^a_b", |i| i as f64);
        let v = filled("^b", |i| (i + 1) as f64);
        let mv = m.mul_fallible(&v).unwrap();
        assert_eq!(mv.structure().to_string(), "^a");
        for a in 0..DIMENSION {
            let expected: f64 = (0..DIMENSION).map(|b| m[[a, b]] * v[[b]]).sum();
            assert_relative_eq!(mv[[a]], expected);
        }

        let u = DenseTensor::from_data(vec![1.0, 2.0, 3.0, 4.0], [Variance::Up]).unwrap();
        let w = DenseTensor::from_data(vec![1.0, 0.0, 0.0, 1.0], [Variance::Down]).unwrap();
        let outer = u.mul_fallible(&w).unwrap();
        assert_eq!(outer.rank(), 2);
        assert_eq!(outer[[3, 3]], 4.0);
        assert_eq!(outer[[3, 1]], 0.0);
    }
}
