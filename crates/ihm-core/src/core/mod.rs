//! # Core Module
//!
//! Provides the fundamental building blocks for IHM ensemble import: immutable
//! data models, annotation-table and coordinate-file readers, and geometry
//! utilities.
//!
//! ## Architecture
//!
//! - **Model Representation** ([`models`]) - Sphere-bead models, atomic starting
//!   models, crosslink restraints, volume grids, and grouping containers
//! - **File I/O** ([`io`]) - The annotation-table store, a PDB trajectory reader,
//!   and the collaborator seam for fetching external models and maps
//! - **Utilities** ([`utils`]) - Bounding boxes, rigid least-squares alignment,
//!   and deterministic per-chain coloring

pub mod io;
pub mod models;
pub mod utils;
