use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::{label::Label, variance::Variance};

/// A [`Slot`] is an index, identified by a [`Label`] and a [`Variance`].
///
/// A vector of slots identifies the index signature of an indexed tensor.
/// Two slots are summed over if their labels agree and their variances are dual.
///
/// # Example
///
/// ```
/// # use ricci::structure::{Slot, Variance};
/// let mu_up = Slot::new('m', Variance::Up);
/// let mu_down = mu_up.dual();
/// assert!(mu_up.matches(&mu_down));
/// assert_eq!("^m", format!("{mu_up}"));
/// ```
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Slot {
    pub label: Label,
    pub variance: Variance,
}

impl Slot {
    pub fn new<L: Into<Label>>(label: L, variance: Variance) -> Self {
        Slot {
            label: label.into(),
            variance,
        }
    }

    #[must_use]
    pub fn dual(self) -> Self {
        Slot {
            label: self.label,
            variance: self.variance.dual(),
        }
    }

    /// Same label, opposite variance.
    pub fn matches(&self, other: &Slot) -> bool {
        self.label == other.label && self.variance.matches(&other.variance)
    }
}

impl Display for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.variance, self.label)
    }
}

#[test]
fn doc_slot() {
    let mu_up = Slot::new('m', Variance::Up);
    let mu_down = mu_up.dual();

    assert!(mu_up.matches(&mu_down));
    assert!(!mu_up.matches(&mu_up));
    assert!(!mu_up.matches(&Slot::new('n', Variance::Down)));
    assert_eq!("_m", format!("{mu_down}"));
}
