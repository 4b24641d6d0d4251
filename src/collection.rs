use std::ops::{Index, IndexMut};

use anyhow::{anyhow, bail, Context, Result};
use indexmap::IndexMap;
use log::debug;

use crate::data::DenseTensor;

/// Named dense tensors, kept in name order.
///
/// Bulk transfers flatten every tensor in turn, in name order, each in its own
/// storage order.
#[derive(Debug, Clone, Default)]
pub struct TensorList {
    tensors: IndexMap<String, DenseTensor>,
}

impl TensorList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a zero tensor built from a compact signature such as `"^a_b"`.
    pub fn append(&mut self, name: &str, signature: &str) -> Result<()> {
        let tensor = DenseTensor::from_signature(signature)
            .with_context(|| format!("building tensor {name} from signature {signature:?}"))?;
        self.insert(name, tensor)
    }

    pub fn append_scalar(&mut self, name: &str) -> Result<()> {
        self.insert(name, DenseTensor::scalar(0.0))
    }

    pub fn insert(&mut self, name: &str, tensor: DenseTensor) -> Result<()> {
        if self.tensors.contains_key(name) {
            bail!("tensor {name} is already in the list");
        }
        debug!("adding tensor {name} with structure {}", tensor.structure());
        self.tensors.insert(name.to_string(), tensor);
        self.tensors.sort_keys();
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&DenseTensor> {
        self.tensors
            .get(name)
            .ok_or_else(|| anyhow!("no tensor named {name}"))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut DenseTensor> {
        self.tensors
            .get_mut(name)
            .ok_or_else(|| anyhow!("no tensor named {name}"))
    }

    /// Total number of components over all tensors.
    pub fn num_components(&self) -> usize {
        self.tensors.values().map(|t| t.data().len()).sum()
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DenseTensor)> {
        self.tensors.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copies every component into `out`, returning how many were copied.
    pub fn get_components(&self, out: &mut [f64]) -> Result<usize> {
        self.check_buffer(out.len())?;
        let mut offset = 0;
        for (name, tensor) in &self.tensors {
            offset += tensor
                .get_components(&mut out[offset..])
                .with_context(|| format!("reading components of {name}"))?;
        }
        Ok(offset)
    }

    /// Overwrites every component from `input`, returning how many were read.
    pub fn set_components(&mut self, input: &[f64]) -> Result<usize> {
        self.check_buffer(input.len())?;
        let mut offset = 0;
        for (name, tensor) in &mut self.tensors {
            offset += tensor
                .set_components(&input[offset..])
                .with_context(|| format!("writing components of {name}"))?;
        }
        Ok(offset)
    }

    fn check_buffer(&self, len: usize) -> Result<()> {
        let needed = self.num_components();
        if len < needed {
            bail!("buffer holds {len} components, the list has {needed}");
        }
        Ok(())
    }
}

impl Index<&str> for TensorList {
    type Output = DenseTensor;

    fn index(&self, name: &str) -> &Self::Output {
        match self.tensors.get(name) {
            Some(t) => t,
            None => panic!("no tensor named {name}"),
        }
    }
}

impl IndexMut<&str> for TensorList {
    fn index_mut(&mut self, name: &str) -> &mut Self::Output {
        match self.tensors.get_mut(name) {
            Some(t) => t,
            None => panic!("no tensor named {name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::TensorStructure;

    fn list() -> TensorList {
        let mut list = TensorList::new();
        list.append("g", "_a_b").unwrap();
        list.append("A", "^a").unwrap();
        list.append_scalar("phi").unwrap();
        list
    }

    #[test]
    fn name_order() {
        let list = list();
        assert_eq!(list.names().collect::<Vec<_>>(), vec!["A", "g", "phi"]);
        assert_eq!(list.num_components(), 4 + 16 + 1);
        assert_eq!(list.len(), 3);
        assert!(list["phi"].is_scalar());
    }

    #[test]
    fn rejects_duplicates_and_unknown_names() {
        let mut list = list();
        assert!(list.append("g", "^a").is_err());
        assert_eq!(list.num_components(), 21);
        assert!(list.get("h").is_err());
        assert!(list.append("bad", "^a_").is_err());
    }

    #[test]
    fn flattening() {
        let mut list = list();
        list["A"].set([2], 5.0).unwrap();
        list.get_mut("g").unwrap().set([0, 1], 7.0).unwrap();
        list["phi"].set_components(&[9.0]).unwrap();

        let mut out = vec![0.0; list.num_components()];
        assert_eq!(list.get_components(&mut out).unwrap(), 21);
        assert_eq!(out[2], 5.0);
        assert_eq!(out[4 + 1], 7.0);
        assert_eq!(out[20], 9.0);

        let input: Vec<f64> = (0..21).map(f64::from).collect();
        assert_eq!(list.set_components(&input).unwrap(), 21);
        assert_eq!(list["g"][[0, 0]], 4.0);
        assert_eq!(list["phi"].data(), &[20.0]);

        assert!(list.get_components(&mut [0.0; 20]).is_err());
        assert!(list.set_components(&input[..3]).is_err());
    }

    #[test]
    fn replacing_a_tensor_resizes_the_list() {
        let mut list = list();
        *list.get_mut("A").unwrap() = DenseTensor::from_signature("^a_b").unwrap();
        assert_eq!(list.num_components(), 16 + 16 + 1);

        let mut out = vec![0.0; list.num_components()];
        assert_eq!(list.get_components(&mut out).unwrap(), 33);

        list["g"] = DenseTensor::scalar(2.0);
        assert_eq!(list.num_components(), 16 + 1 + 1);
        let input = vec![1.0; list.num_components()];
        assert_eq!(list.set_components(&input).unwrap(), 18);
        assert_eq!(list["g"].data(), &[1.0]);
    }
}
