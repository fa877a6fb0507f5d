//! Geometry utilities: boxes and point location.

pub mod aabb;
pub mod locator;

pub use aabb::Aabb;
pub use locator::PointLocator;
