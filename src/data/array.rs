//! Named data arrays with a closed set of element types.
//!
//! The element type of an array is fixed when the array is built and every
//! operation dispatches on the [`ArrayValues`] variant with one `match`.

use crate::mesh_error::MeshError;
use num_traits::{NumCast, ToPrimitive};

/// Element type tag.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ScalarType {
    F64,
    F32,
    I64,
    I32,
    U64,
    U32,
    U8,
    /// String arrays; stored but never sent over the wire.
    Text,
}

impl ScalarType {
    /// Returns a stable string label for the scalar type.
    pub fn as_str(self) -> &'static str {
        match self {
            ScalarType::F64 => "f64",
            ScalarType::F32 => "f32",
            ScalarType::I64 => "i64",
            ScalarType::I32 => "i32",
            ScalarType::U64 => "u64",
            ScalarType::U32 => "u32",
            ScalarType::U8 => "u8",
            ScalarType::Text => "text",
        }
    }

    /// Whether arrays of this type can be serialized by [`crate::algs::wire`].
    pub fn is_serializable(self) -> bool {
        !matches!(self, ScalarType::Text)
    }

    pub(crate) fn to_wire(self) -> u8 {
        match self {
            ScalarType::F64 => 1,
            ScalarType::F32 => 2,
            ScalarType::I64 => 3,
            ScalarType::I32 => 4,
            ScalarType::U64 => 5,
            ScalarType::U32 => 6,
            ScalarType::U8 => 7,
            ScalarType::Text => 0xFF,
        }
    }

    pub(crate) fn from_wire(code: u8) -> Option<Self> {
        Some(match code {
            1 => ScalarType::F64,
            2 => ScalarType::F32,
            3 => ScalarType::I64,
            4 => ScalarType::I32,
            5 => ScalarType::U64,
            6 => ScalarType::U32,
            7 => ScalarType::U8,
            _ => return None,
        })
    }
}

/// Flat value storage, `components` values per tuple.
#[derive(Clone, Debug, PartialEq)]
pub enum ArrayValues {
    F64(Vec<f64>),
    F32(Vec<f32>),
    I64(Vec<i64>),
    I32(Vec<i32>),
    U64(Vec<u64>),
    U32(Vec<u32>),
    U8(Vec<u8>),
    Text(Vec<String>),
}

/// Run `$body` with `$v` bound to the inner `Vec` of every variant.
macro_rules! for_each_variant {
    ($values:expr, $v:ident => $body:expr) => {
        match $values {
            ArrayValues::F64($v) => $body,
            ArrayValues::F32($v) => $body,
            ArrayValues::I64($v) => $body,
            ArrayValues::I32($v) => $body,
            ArrayValues::U64($v) => $body,
            ArrayValues::U32($v) => $body,
            ArrayValues::U8($v) => $body,
            ArrayValues::Text($v) => $body,
        }
    };
}

/// Run `$body` on matching variant pairs; callers check layouts first.
macro_rules! zip_variants {
    ($dst:expr, $src:expr, ($d:ident, $s:ident) => $body:expr) => {
        match ($dst, $src) {
            (ArrayValues::F64($d), ArrayValues::F64($s)) => $body,
            (ArrayValues::F32($d), ArrayValues::F32($s)) => $body,
            (ArrayValues::I64($d), ArrayValues::I64($s)) => $body,
            (ArrayValues::I32($d), ArrayValues::I32($s)) => $body,
            (ArrayValues::U64($d), ArrayValues::U64($s)) => $body,
            (ArrayValues::U32($d), ArrayValues::U32($s)) => $body,
            (ArrayValues::U8($d), ArrayValues::U8($s)) => $body,
            (ArrayValues::Text($d), ArrayValues::Text($s)) => $body,
            _ => unreachable!("array layouts checked by caller"),
        }
    };
}

impl ArrayValues {
    /// Scalar type tag for this buffer.
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            ArrayValues::F64(_) => ScalarType::F64,
            ArrayValues::F32(_) => ScalarType::F32,
            ArrayValues::I64(_) => ScalarType::I64,
            ArrayValues::I32(_) => ScalarType::I32,
            ArrayValues::U64(_) => ScalarType::U64,
            ArrayValues::U32(_) => ScalarType::U32,
            ArrayValues::U8(_) => ScalarType::U8,
            ArrayValues::Text(_) => ScalarType::Text,
        }
    }

    /// Number of scalar values (not tuples).
    pub fn len(&self) -> usize {
        for_each_variant!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empty buffer of the given type with room for `capacity` values.
    pub fn with_capacity(scalar: ScalarType, capacity: usize) -> Self {
        match scalar {
            ScalarType::F64 => ArrayValues::F64(Vec::with_capacity(capacity)),
            ScalarType::F32 => ArrayValues::F32(Vec::with_capacity(capacity)),
            ScalarType::I64 => ArrayValues::I64(Vec::with_capacity(capacity)),
            ScalarType::I32 => ArrayValues::I32(Vec::with_capacity(capacity)),
            ScalarType::U64 => ArrayValues::U64(Vec::with_capacity(capacity)),
            ScalarType::U32 => ArrayValues::U32(Vec::with_capacity(capacity)),
            ScalarType::U8 => ArrayValues::U8(Vec::with_capacity(capacity)),
            ScalarType::Text => ArrayValues::Text(Vec::with_capacity(capacity)),
        }
    }

    fn shrink_to_fit(&mut self) {
        for_each_variant!(self, v => v.shrink_to_fit())
    }
}

fn lerp_tuple<T>(dst: &mut Vec<T>, src: &[T], a: usize, b: usize, t: f64, nc: usize, round: bool)
where
    T: Copy + ToPrimitive + NumCast,
{
    for k in 0..nc {
        let va = src[a * nc + k];
        let vb = src[b * nc + k];
        let fa = va.to_f64().unwrap_or(0.0);
        let fb = vb.to_f64().unwrap_or(0.0);
        let mut f = fa + t * (fb - fa);
        if round {
            f = f.round();
        }
        // out-of-range integer casts keep the nearer endpoint
        let nearer = if t < 0.5 { va } else { vb };
        dst.push(<T as NumCast>::from(f).unwrap_or(nearer));
    }
}

/// A named array of `components`-wide tuples.
#[derive(Clone, Debug, PartialEq)]
pub struct DataArray {
    name: String,
    components: usize,
    values: ArrayValues,
}

impl DataArray {
    /// Build an array, checking that the value count is a whole number of tuples.
    pub fn new(
        name: impl Into<String>,
        components: usize,
        values: ArrayValues,
    ) -> Result<Self, MeshError> {
        let name = name.into();
        if components == 0 || values.len() % components != 0 {
            return Err(MeshError::InvalidArrayLength {
                expected: values.len().next_multiple_of(components.max(1)),
                got: values.len(),
                name,
            });
        }
        Ok(Self {
            name,
            components,
            values,
        })
    }

    /// Single-component `i64` array.
    pub fn from_i64(name: impl Into<String>, values: Vec<i64>) -> Self {
        Self {
            name: name.into(),
            components: 1,
            values: ArrayValues::I64(values),
        }
    }

    /// Single-component `u8` array.
    pub fn from_u8(name: impl Into<String>, values: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            components: 1,
            values: ArrayValues::U8(values),
        }
    }

    /// Single-component `f64` array.
    pub fn from_f64(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            components: 1,
            values: ArrayValues::F64(values),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn components(&self) -> usize {
        self.components
    }

    pub fn values(&self) -> &ArrayValues {
        &self.values
    }

    pub fn scalar_type(&self) -> ScalarType {
        self.values.scalar_type()
    }

    /// Number of tuples.
    pub fn num_tuples(&self) -> usize {
        self.values.len() / self.components
    }

    /// Borrow as `&[i64]` when the element type matches.
    pub fn as_i64(&self) -> Option<&[i64]> {
        match &self.values {
            ArrayValues::I64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> Option<&[u8]> {
        match &self.values {
            ArrayValues::U8(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u8_mut(&mut self) -> Option<&mut Vec<u8>> {
        match &mut self.values {
            ArrayValues::U8(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match &self.values {
            ArrayValues::F64(v) => Some(v),
            _ => None,
        }
    }

    /// Same name, type and width; zero tuples.
    pub fn empty_like(&self, capacity_tuples: usize) -> Self {
        Self {
            name: self.name.clone(),
            components: self.components,
            values: ArrayValues::with_capacity(
                self.scalar_type(),
                capacity_tuples * self.components,
            ),
        }
    }

    /// True when `other` has the same name, element type and width.
    pub fn same_layout(&self, other: &DataArray) -> bool {
        self.name == other.name
            && self.components == other.components
            && self.scalar_type() == other.scalar_type()
    }

    fn layout_error(&self, other: &DataArray) -> MeshError {
        MeshError::SchemaMismatch(format!(
            "array `{}` is {}x{}, other is {}x{}",
            self.name,
            self.scalar_type().as_str(),
            self.components,
            other.scalar_type().as_str(),
            other.components
        ))
    }

    fn check_layout(&self, src: &DataArray) -> Result<(), MeshError> {
        if self.components != src.components || self.scalar_type() != src.scalar_type() {
            return Err(self.layout_error(src));
        }
        Ok(())
    }

    /// Append tuple `tuple` of `src`.
    pub fn push_tuple_from(&mut self, src: &DataArray, tuple: usize) -> Result<(), MeshError> {
        self.check_layout(src)?;
        let nc = self.components;
        let range = tuple * nc..(tuple + 1) * nc;
        zip_variants!(&mut self.values, &src.values, (d, s) => d.extend_from_slice(&s[range]));
        Ok(())
    }

    /// Append an interpolated tuple between two of this array's own tuples.
    pub fn push_lerp_within(&mut self, a: usize, b: usize, t: f64) {
        let nc = self.components;
        match &mut self.values {
            ArrayValues::F64(v) => lerp_in_place(v, a, b, t, nc, false),
            ArrayValues::F32(v) => lerp_in_place(v, a, b, t, nc, false),
            ArrayValues::I64(v) => lerp_in_place(v, a, b, t, nc, true),
            ArrayValues::I32(v) => lerp_in_place(v, a, b, t, nc, true),
            ArrayValues::U64(v) => lerp_in_place(v, a, b, t, nc, true),
            ArrayValues::U32(v) => lerp_in_place(v, a, b, t, nc, true),
            ArrayValues::U8(v) => lerp_in_place(v, a, b, t, nc, true),
            ArrayValues::Text(v) => {
                let pick = if t < 0.5 { a } else { b };
                let tuple = v[pick * nc..(pick + 1) * nc].to_vec();
                v.extend(tuple);
            }
        }
    }

    /// New array holding the listed tuples, in order.
    pub fn gather(&self, tuples: &[usize]) -> DataArray {
        let nc = self.components;
        let values = match &self.values {
            ArrayValues::F64(v) => ArrayValues::F64(gather_vec(v, tuples, nc)),
            ArrayValues::F32(v) => ArrayValues::F32(gather_vec(v, tuples, nc)),
            ArrayValues::I64(v) => ArrayValues::I64(gather_vec(v, tuples, nc)),
            ArrayValues::I32(v) => ArrayValues::I32(gather_vec(v, tuples, nc)),
            ArrayValues::U64(v) => ArrayValues::U64(gather_vec(v, tuples, nc)),
            ArrayValues::U32(v) => ArrayValues::U32(gather_vec(v, tuples, nc)),
            ArrayValues::U8(v) => ArrayValues::U8(gather_vec(v, tuples, nc)),
            ArrayValues::Text(v) => ArrayValues::Text(gather_vec(v, tuples, nc)),
        };
        DataArray {
            name: self.name.clone(),
            components: nc,
            values,
        }
    }

    pub fn shrink_to_fit(&mut self) {
        self.values.shrink_to_fit();
    }
}

fn lerp_in_place<T>(v: &mut Vec<T>, a: usize, b: usize, t: f64, nc: usize, round: bool)
where
    T: Copy + ToPrimitive + NumCast,
{
    let mut tmp = Vec::with_capacity(nc);
    lerp_tuple(&mut tmp, v, a, b, t, nc, round);
    v.extend_from_slice(&tmp);
}

fn gather_vec<T: Clone>(v: &[T], tuples: &[usize], nc: usize) -> Vec<T> {
    let mut out = Vec::with_capacity(tuples.len() * nc);
    for &t in tuples {
        out.extend_from_slice(&v[t * nc..(t + 1) * nc]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_partial_tuples() {
        let err = DataArray::new("v", 3, ArrayValues::F64(vec![0.0; 4])).unwrap_err();
        assert!(matches!(err, MeshError::InvalidArrayLength { .. }));
    }

    #[test]
    fn lerp_rounds_integers_and_blends_floats() {
        let mut v = DataArray::new("v", 2, ArrayValues::I32(vec![0, 10, 4, 20])).unwrap();
        v.push_lerp_within(0, 1, 0.25);
        assert_eq!(v.values(), &ArrayValues::I32(vec![0, 10, 4, 20, 1, 13]));

        let mut f = DataArray::from_f64("f", vec![1.0, 3.0]);
        f.push_lerp_within(0, 1, 0.5);
        assert_eq!(f.as_f64(), Some(&[1.0, 3.0, 2.0][..]));
    }

    #[test]
    fn text_lerp_takes_nearer_endpoint() {
        let mut v = DataArray::new(
            "label",
            1,
            ArrayValues::Text(vec!["a".into(), "b".into()]),
        )
        .unwrap();
        v.push_lerp_within(0, 1, 0.2);
        v.push_lerp_within(0, 1, 0.8);
        assert_eq!(
            v.values(),
            &ArrayValues::Text(vec!["a".into(), "b".into(), "a".into(), "b".into()])
        );
    }

    #[test]
    fn push_from_mismatched_type_fails() {
        let a = DataArray::from_f64("x", vec![1.0]);
        let mut b = DataArray::from_i64("x", vec![]);
        assert!(matches!(
            b.push_tuple_from(&a, 0),
            Err(MeshError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn gather_keeps_tuple_order() {
        let a = DataArray::new("v", 2, ArrayValues::U32(vec![1, 2, 3, 4, 5, 6])).unwrap();
        let g = a.gather(&[2, 0]);
        assert_eq!(g.values(), &ArrayValues::U32(vec![5, 6, 1, 2]));
        assert_eq!(g.num_tuples(), 2);
    }
}
