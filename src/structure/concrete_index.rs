use std::ops::Deref;

use derive_more::Add;
use derive_more::AddAssign;
use derive_more::Display;
use derive_more::From;
use derive_more::Index;
use derive_more::Into;
use derive_more::IntoIterator;

use serde::{Deserialize, Serialize};

/// A concrete index, i.e. the coordinate in `[0, DIMENSION)` along one tensor index
pub type ConcreteIndex = usize;

#[derive(
    Debug,
    Clone,
    Ord,
    PartialOrd,
    Eq,
    PartialEq,
    Hash,
    Index,
    Serialize,
    Deserialize,
    From,
    Into,
    Display,
    IntoIterator,
)]
#[display(fmt = "{:?}", indices)]
pub struct ExpandedIndex {
    indices: Vec<ConcreteIndex>,
}

impl Deref for ExpandedIndex {
    type Target = [ConcreteIndex];

    fn deref(&self) -> &Self::Target {
        &self.indices
    }
}

impl AsRef<[ConcreteIndex]> for ExpandedIndex {
    fn as_ref(&self) -> &[ConcreteIndex] {
        &self.indices
    }
}

impl FromIterator<ConcreteIndex> for ExpandedIndex {
    fn from_iter<T: IntoIterator<Item = ConcreteIndex>>(iter: T) -> Self {
        ExpandedIndex {
            indices: iter.into_iter().collect(),
        }
    }
}

/// Offset into the row-major flat storage of a dense tensor
#[derive(
    Debug,
    Copy,
    Clone,
    Ord,
    PartialOrd,
    Eq,
    PartialEq,
    Hash,
    Serialize,
    Deserialize,
    From,
    Into,
    Display,
    Add,
    AddAssign,
)]
#[display(fmt = "{}", index)]
pub struct FlatIndex {
    index: usize,
}
