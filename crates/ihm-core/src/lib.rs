//! # IHM Core Library
//!
//! A library for importing integrative hybrid modeling (IHM) structural ensembles:
//! coarse sphere-bead models, starting atomic models, crosslink distance restraints,
//! and ensemble localization densities, read from a multi-table annotation file.
//!
//! ## Architectural Philosophy
//!
//! The library is designed with a strict three-layer architecture to ensure a clear
//! separation of concerns, making it modular, testable, and extensible.
//!
//! - **[`core`]: The Foundation.** Contains stateless data models (`SphereModel`,
//!   `AtomicModel`, `VolumeGrid`), the annotation-table store, file readers, and
//!   geometry utilities.
//!
//! - **[`engine`]: The Logic Core.** This layer implements the import pipeline
//!   stages: identifier resolution, starting-model loading, sphere-model and
//!   crosslink construction, and localization-density rasterization, together
//!   with the error taxonomy and the import diagnostics log.
//!
//! - **[`workflows`]: The Public API.** This is the highest-level, user-facing
//!   layer. It drives the engine stages in their fixed order and produces the
//!   assembled model hierarchy plus a human-readable import summary.

pub mod core;
pub mod engine;
pub mod workflows;
