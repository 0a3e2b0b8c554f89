//! # Workflows Module
//!
//! The public, user-facing entry point: [`import::run`] reads one IHM file
//! and drives the engine stages in their fixed order, producing the
//! assembled ensemble hierarchy and a human-readable import summary.

pub mod import;
