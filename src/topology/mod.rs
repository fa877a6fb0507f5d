//! Cell types and connectivity helpers.

pub mod cell_type;
pub mod links;

pub use cell_type::CellType;
pub use links::CellLinks;
