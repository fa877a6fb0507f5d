#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-redistribute
//!
//! mesh-redistribute repartitions an unstructured grid that is spread across
//! a fixed group of SPMD ranks. Each rank ends up owning the cells inside its
//! spatial region(s), optionally surrounded by ghost cells up to a requested
//! depth and optionally clipped to its region box.
//!
//! ## Features
//! - Unstructured grids with typed point and cell data arrays
//! - Balanced k-d tree partitioning with contiguous, round-robin or explicit
//!   region-to-rank assignment
//! - A single ring pairwise-exchange primitive reused by every phase
//! - Global point and cell id generation
//! - Multi-level ghost-cell exchange under unique or duplicate assignment
//! - Box clipping with interpolated point data
//! - Pluggable communication backends (serial, in-process threads, MPI)
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! mesh-redistribute = "0.3"
//! # features = ["mpi-support", "rayon"]
//! ```
//!
//! ```no_run
//! use mesh_redistribute::prelude::*;
//!
//! let grid = hex_box([8, 8, 8], [0.0; 3], [1.0; 3])?;
//! let comm = NoComm;
//! let cfg = RedistributeConfig { ghost_level: 1, ..Default::default() };
//! let out = Redistributor::new(cfg).redistribute(&comm, &grid)?;
//! assert!(out.cell_data.get(GHOST_LEVELS).is_some());
//! # Ok::<(), MeshError>(())
//! ```
//!
//! Every rank must call [`algs::redistribute::Redistributor::redistribute`]
//! the same number of times with the same configuration; a rank that stalls
//! stalls the group.

pub mod algs;
pub mod data;
pub mod geometry;
pub mod mesh_error;
pub mod partitioning;
pub mod topology;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{Communicator, NoComm, RayonComm, Wait};
    pub use crate::algs::meshgen::{StructuredCellType, hex_box, structured_box, tet_box};
    pub use crate::algs::redistribute::{
        AssignmentPolicy, DEFAULT_CELL_IDS, DEFAULT_POINT_IDS, GHOST_LEVELS, INSIDE_BOX, RedistributeConfig,
        Redistributor, redistribute,
    };
    pub use crate::data::{ArrayValues, DataArray, FieldData, ScalarType, UnstructuredGrid};
    pub use crate::geometry::Aabb;
    pub use crate::mesh_error::MeshError;
    pub use crate::partitioning::{PartitionerConfig, RegionAssignment, SpatialPartition};
    pub use crate::topology::CellType;
}
