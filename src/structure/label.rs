use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

/// The name of a tensor index, used for Einstein-convention matching across
/// operands. Labels compare by raw character identity.
#[derive(
    Debug,
    Copy,
    Clone,
    Hash,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    From,
    Into,
)]
pub struct Label(char);

impl Label {
    pub fn new(c: char) -> Self {
        Label(c)
    }

    pub fn as_char(&self) -> char {
        self.0
    }
}

impl PartialEq<char> for Label {
    fn eq(&self, other: &char) -> bool {
        self.0 == *other
    }
}

/// Splits a label string into one [`Label`] per character.
pub fn labels_from_str(labels: &str) -> Vec<Label> {
    labels.chars().map(Label).collect()
}
