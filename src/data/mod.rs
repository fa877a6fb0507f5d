//! Grid storage: typed arrays, field data and the unstructured grid.

pub mod array;
pub mod attributes;
pub mod grid;

pub use array::{ArrayValues, DataArray, ScalarType};
pub use attributes::FieldData;
pub use grid::UnstructuredGrid;
