//! Communication, exchange and the redistribution phases built on them.

pub mod cell_assign;
pub mod clip;
pub mod communicator;
pub mod exchange;
pub mod ghost;
pub mod global_ids;
pub mod merge;
pub mod meshgen;
pub mod redistribute;
pub mod submesh;
pub mod wire;

pub use exchange::exchange;
pub use merge::{MergeOptions, PointKey, merge};
pub use redistribute::{RedistributeConfig, Redistributor, redistribute};
