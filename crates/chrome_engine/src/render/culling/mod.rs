//! Visibility culling
//!
//! A frustum snapshot is rebuilt once per frame from projection × view and then
//! queried concurrently by every recording job.

pub mod frustum;

pub use frustum::{Frustum, Plane};
