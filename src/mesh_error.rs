//! MeshError: unified error type for mesh-redistribute public APIs
//!
//! Every fallible operation in the crate returns `Result<_, MeshError>`.
//! Errors are local to the rank that observes them; there is no cross-rank
//! error broadcast.

use thiserror::Error;

/// Unified error type for redistribution operations.
#[derive(Debug, Error)]
pub enum MeshError {
    // ----- configuration ---------------------------------------------------
    /// No rank holds any cell, so there is nothing to partition.
    #[error("Configuration error: input grid is empty on every rank")]
    EmptyInput,
    /// Region count hint of zero, or a tree that could not produce regions.
    #[error("Configuration error: invalid region count {0}")]
    InvalidRegionCount(usize),
    /// A user-supplied region→rank table is malformed.
    #[error("Configuration error: invalid region assignment: {0}")]
    InvalidRegionAssignment(String),
    /// Clipping was requested but a rank's regions do not form one box.
    #[error("Configuration error: regions assigned to rank {rank} do not form a convex box")]
    NonConvexRegion { rank: usize },
    /// Any other invalid setting.
    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    // ----- unsupported data ------------------------------------------------
    /// An attribute array whose element type cannot be serialized.
    #[error("Unsupported data: array `{name}` has element type `{scalar}` which cannot be exchanged")]
    UnsupportedArrayType { name: String, scalar: &'static str },
    /// Array length is not a whole number of tuples for its owner.
    #[error("Array `{name}` has {got} values, expected {expected}")]
    InvalidArrayLength {
        name: String,
        expected: usize,
        got: usize,
    },

    // ----- structural ------------------------------------------------------
    /// Two arrays with the same name in one field-data collection.
    #[error("Duplicate array name `{0}`")]
    DuplicateArrayName(String),
    /// A named array that must exist was not found.
    #[error("Missing array `{0}`")]
    MissingArray(String),
    /// A named array exists but has the wrong element type or width.
    #[error("Array `{name}` has unexpected type: expected {expected}")]
    ArrayTypeMismatch { name: String, expected: &'static str },
    /// Grids handed to the merge engine disagree on their array sets.
    #[error("Schema mismatch between merged grids: {0}")]
    SchemaMismatch(String),
    /// A cell references a point index outside the point list.
    #[error("Cell {cell} references point {point}, but grid has {n_points} points")]
    CellPointOutOfRange {
        cell: usize,
        point: usize,
        n_points: usize,
    },
    /// A cell's point count does not match its type.
    #[error("Cell of type {cell_type} has {got} points")]
    InvalidCellArity { cell_type: &'static str, got: usize },

    // ----- transport -------------------------------------------------------
    /// Communication with a peer failed.
    #[error("Communication error with rank {neighbor}: {source}")]
    CommError {
        neighbor: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Received byte count disagreed with the announced header.
    #[error("Buffer size mismatch from rank {neighbor}: expected {expected} bytes, got {got}")]
    BufferSizeMismatch {
        neighbor: usize,
        expected: usize,
        got: usize,
    },
    /// A payload could not be decoded.
    #[error("Wire decode error: {0}")]
    WireDecode(String),
    /// A payload was produced by an incompatible wire version.
    #[error("Wire version mismatch: expected {expected}, got {got}")]
    WireVersion { expected: u16, got: u16 },
    /// Transport setup failed (e.g. MPI initialization).
    #[error("Transport initialization failed: {0}")]
    TransportInit(String),
}

impl MeshError {
    /// Convenience constructor for decode failures.
    pub(crate) fn decode(msg: impl Into<String>) -> Self {
        MeshError::WireDecode(msg.into())
    }

    /// True for errors raised before any communication takes place.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            MeshError::EmptyInput
                | MeshError::InvalidRegionCount(_)
                | MeshError::InvalidRegionAssignment(_)
                | MeshError::NonConvexRegion { .. }
                | MeshError::InvalidConfig(_)
        )
    }
}
