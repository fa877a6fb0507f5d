//! Ordered collection of named arrays attached to points or cells.

use crate::data::array::DataArray;
use crate::mesh_error::MeshError;

/// Arrays keep insertion order; names are unique.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FieldData {
    arrays: Vec<DataArray>,
}

impl FieldData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an array; fails if the name is taken.
    pub fn add(&mut self, array: DataArray) -> Result<(), MeshError> {
        if self.contains(array.name()) {
            return Err(MeshError::DuplicateArrayName(array.name().to_string()));
        }
        self.arrays.push(array);
        Ok(())
    }

    /// Add or replace in place (keeps the original position on replace).
    pub fn set(&mut self, array: DataArray) {
        match self.arrays.iter_mut().find(|a| a.name() == array.name()) {
            Some(slot) => *slot = array,
            None => self.arrays.push(array),
        }
    }

    pub fn get(&self, name: &str) -> Option<&DataArray> {
        self.arrays.iter().find(|a| a.name() == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut DataArray> {
        self.arrays.iter_mut().find(|a| a.name() == name)
    }

    /// Look up an array that must exist.
    pub fn require(&self, name: &str) -> Result<&DataArray, MeshError> {
        self.get(name)
            .ok_or_else(|| MeshError::MissingArray(name.to_string()))
    }

    /// Single-component `i64` view of an array that must exist.
    pub fn require_i64(&self, name: &str) -> Result<&[i64], MeshError> {
        let arr = self.require(name)?;
        match arr.as_i64() {
            Some(v) if arr.components() == 1 => Ok(v),
            _ => Err(MeshError::ArrayTypeMismatch {
                name: name.to_string(),
                expected: "single-component i64",
            }),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<DataArray> {
        let idx = self.arrays.iter().position(|a| a.name() == name)?;
        Some(self.arrays.remove(idx))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataArray> {
        self.arrays.iter()
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    /// Same arrays, zero tuples each.
    pub fn empty_like(&self, capacity_tuples: usize) -> Self {
        Self {
            arrays: self
                .arrays
                .iter()
                .map(|a| a.empty_like(capacity_tuples))
                .collect(),
        }
    }

    /// New collection holding the listed tuples of every array.
    pub fn gather(&self, tuples: &[usize]) -> Self {
        Self {
            arrays: self.arrays.iter().map(|a| a.gather(tuples)).collect(),
        }
    }

    /// Check every array has exactly `n_tuples` tuples.
    pub fn validate(&self, n_tuples: usize) -> Result<(), MeshError> {
        for a in &self.arrays {
            if a.num_tuples() != n_tuples {
                return Err(MeshError::InvalidArrayLength {
                    name: a.name().to_string(),
                    expected: n_tuples * a.components(),
                    got: a.num_tuples() * a.components(),
                });
            }
        }
        Ok(())
    }

    /// Fail on the first array that cannot travel over the wire.
    pub fn check_serializable(&self) -> Result<(), MeshError> {
        for a in &self.arrays {
            if !a.scalar_type().is_serializable() {
                return Err(MeshError::UnsupportedArrayType {
                    name: a.name().to_string(),
                    scalar: a.scalar_type().as_str(),
                });
            }
        }
        Ok(())
    }

    /// Check that `other` carries the same arrays (any order), reporting the
    /// first difference.
    pub fn check_same_schema(&self, other: &FieldData) -> Result<(), MeshError> {
        if self.len() != other.len() {
            return Err(MeshError::SchemaMismatch(format!(
                "{} arrays vs {} arrays",
                self.len(),
                other.len()
            )));
        }
        for a in &self.arrays {
            match other.get(a.name()) {
                Some(b) if a.same_layout(b) => {}
                Some(_) => {
                    return Err(MeshError::SchemaMismatch(format!(
                        "array `{}` differs in type or width",
                        a.name()
                    )));
                }
                None => {
                    return Err(MeshError::SchemaMismatch(format!(
                        "array `{}` missing",
                        a.name()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Append tuple `tuple` of every array of `src`, matched by name.
    /// `src` must share this collection's schema.
    pub fn push_tuple_from(&mut self, src: &FieldData, tuple: usize) -> Result<(), MeshError> {
        for a in &mut self.arrays {
            let s = src
                .get(a.name())
                .ok_or_else(|| MeshError::SchemaMismatch(format!("array `{}` missing", a.name())))?;
            a.push_tuple_from(s, tuple)?;
        }
        Ok(())
    }

    /// Append, to every array, a tuple interpolated between its own tuples
    /// `a` and `b`.
    pub fn push_lerp_within(&mut self, a: usize, b: usize, t: f64) {
        for arr in &mut self.arrays {
            arr.push_lerp_within(a, b, t);
        }
    }

    pub fn shrink_to_fit(&mut self) {
        for a in &mut self.arrays {
            a.shrink_to_fit();
        }
    }
}
