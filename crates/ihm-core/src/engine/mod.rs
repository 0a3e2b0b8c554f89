//! # Engine Module
//!
//! Implements the IHM import pipeline stages: identifier resolution,
//! starting-model loading, sphere-model construction, crosslink restraint
//! building, and localization-density rasterization.
//!
//! Stages are pure functions of the read-only table store plus the
//! collaborator provider. Each stage degrades to empty results when its
//! tables are absent and records skipped entities in the [`log::ImportLog`];
//! only a missing required table aborts an import.

pub mod crosslinks;
pub mod density;
pub mod error;
pub mod log;
pub mod resolver;
pub mod spheres;
pub mod starting_models;
