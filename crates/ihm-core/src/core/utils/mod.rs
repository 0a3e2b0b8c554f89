//! Shared math and presentation utilities: axis-aligned bounds, rigid
//! least-squares alignment, and deterministic per-chain coloring.

pub mod colors;
pub mod geometry;
