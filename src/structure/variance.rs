use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::StructureError;

/// The type of a tensor index.
///
/// `Up` indices are contravariant (vector type), `Down` indices are covariant
/// (covector type). Contraction is only ever legal between one of each.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Variance {
    Up,
    Down,
}

impl Variance {
    pub const CONTRAVARIANT: Variance = Variance::Up;
    pub const COVARIANT: Variance = Variance::Down;

    pub const UP_MARKER: char = '^';
    pub const DOWN_MARKER: char = '_';

    #[must_use]
    pub fn dual(self) -> Self {
        match self {
            Variance::Up => Variance::Down,
            Variance::Down => Variance::Up,
        }
    }

    /// Whether an index of this variance may be summed against `other`.
    pub fn matches(&self, other: &Variance) -> bool {
        self.dual() == *other
    }

    pub fn marker(&self) -> char {
        match self {
            Variance::Up => Self::UP_MARKER,
            Variance::Down => Self::DOWN_MARKER,
        }
    }
}

impl TryFrom<char> for Variance {
    type Error = StructureError;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        match value {
            Self::UP_MARKER => Ok(Variance::Up),
            Self::DOWN_MARKER => Ok(Variance::Down),
            c => Err(StructureError::InvalidVarianceMarker(c)),
        }
    }
}

impl Display for Variance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.marker())
    }
}
