//! Data models for the imported hierarchy: atomic starting models, coarse
//! sphere-bead models, crosslink restraints, probability volumes, and the
//! grouping containers that hold them.

pub mod atomic;
pub mod crosslink;
pub mod grid;
pub mod group;
pub mod ids;
pub mod sphere;
pub mod starting;

/// Explicit display-state interface for group-like entities.
///
/// Aggregating containers (crosslink restraint sets, model groups) report
/// themselves visible when any member is, and propagate `set_visible` to all
/// members.
pub trait Visible {
    fn is_visible(&self) -> bool;
    fn set_visible(&mut self, visible: bool);
}
