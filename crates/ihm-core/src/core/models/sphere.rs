use crate::core::models::Visible;
use crate::core::models::ids::BeadId;
use nalgebra::Point3;
use slotmap::SlotMap;
use std::collections::HashMap;

/// One coarse-grained bead covering a contiguous residue range of one chain.
#[derive(Debug, Clone, PartialEq)]
pub struct SphereBead {
    pub asym_id: String,
    pub seq_begin: i32,
    pub seq_end: i32,
    pub center: Point3<f64>,
    pub radius: f64,
    pub color: [u8; 4],
    pub display: bool,
}

impl SphereBead {
    /// The residue number assigned to the bead: the midpoint of its range,
    /// biased toward the range start for even lengths. Ensemble PDB files
    /// use this convention, so the floor division must match exactly.
    pub fn residue_number(&self) -> i32 {
        self.seq_begin + (self.seq_begin - self.seq_end + 1).div_euclid(2)
    }

    /// Number of residues the bead covers.
    pub fn residue_span(&self) -> i32 {
        self.seq_end - self.seq_begin + 1
    }
}

/// One full bead-chain model for one IHM model id.
///
/// Beads are slotmap-keyed; `order` preserves input order (ensemble
/// trajectories map atoms onto beads positionally), and `index` answers
/// `(asym_id, residue)` lookups for every residue a bead covers.
#[derive(Debug, Clone, Default)]
pub struct SphereModel {
    pub ihm_model_id: String,
    pub name: String,
    beads: SlotMap<BeadId, SphereBead>,
    order: Vec<BeadId>,
    index: HashMap<(String, i32), BeadId>,
    pub display: bool,
}

impl SphereModel {
    pub fn new(name: &str, ihm_model_id: &str) -> Self {
        Self {
            ihm_model_id: ihm_model_id.to_string(),
            name: name.to_string(),
            beads: SlotMap::with_key(),
            order: Vec::new(),
            index: HashMap::new(),
            display: true,
        }
    }

    /// Adds a bead and indexes every residue in its range. Residues already
    /// covered by an earlier bead keep that bead (coverage ranges are
    /// expected to be non-overlapping); the conflicting residue numbers are
    /// returned so the caller can report them.
    pub fn add_bead(&mut self, bead: SphereBead) -> (BeadId, Vec<i32>) {
        let asym_id = bead.asym_id.clone();
        let (seq_begin, seq_end) = (bead.seq_begin, bead.seq_end);
        let id = self.beads.insert(bead);
        self.order.push(id);
        let mut conflicts = Vec::new();
        for residue in seq_begin..=seq_end {
            let key = (asym_id.clone(), residue);
            if self.index.contains_key(&key) {
                conflicts.push(residue);
            } else {
                let _ = self.index.insert(key, id);
            }
        }
        (id, conflicts)
    }

    /// O(1) bead lookup for a residue, over the whole range the bead spans.
    pub fn residue_sphere(&self, asym_id: &str, residue_number: i32) -> Option<BeadId> {
        self.index
            .get(&(asym_id.to_string(), residue_number))
            .copied()
    }

    pub fn bead(&self, id: BeadId) -> &SphereBead {
        &self.beads[id]
    }

    pub fn bead_mut(&mut self, id: BeadId) -> &mut SphereBead {
        &mut self.beads[id]
    }

    /// Beads in input order.
    pub fn beads(&self) -> impl Iterator<Item = (BeadId, &SphereBead)> {
        self.order.iter().map(|&id| (id, &self.beads[id]))
    }

    pub fn num_beads(&self) -> usize {
        self.order.len()
    }

    /// Position of a bead in input order; ensemble atoms map onto beads by
    /// this ordinal.
    pub fn bead_ordinal(&self, id: BeadId) -> Option<usize> {
        self.order.iter().position(|&b| b == id)
    }

    /// Bead radii in input order, for copying onto ensemble trajectories.
    pub fn radii(&self) -> Vec<f64> {
        self.order.iter().map(|&id| self.beads[id].radius).collect()
    }

    /// Number of residues the residue→bead index covers.
    pub fn indexed_residue_count(&self) -> usize {
        self.index.len()
    }
}

impl Visible for SphereModel {
    fn is_visible(&self) -> bool {
        self.display
    }
    fn set_visible(&mut self, visible: bool) {
        self.display = visible;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bead(asym: &str, begin: i32, end: i32) -> SphereBead {
        SphereBead {
            asym_id: asym.to_string(),
            seq_begin: begin,
            seq_end: end,
            center: Point3::origin(),
            radius: 2.0,
            color: [255, 255, 255, 255],
            display: true,
        }
    }

    #[test]
    fn residue_number_uses_floor_division_midpoint() {
        // 10 + (10 - 14 + 1).div_euclid(2) = 10 + (-2) = 8
        assert_eq!(bead("A", 10, 14).residue_number(), 8);
        assert_eq!(bead("A", 1, 1).residue_number(), 1);
        assert_eq!(bead("A", 1, 2).residue_number(), 1);
        assert_eq!(bead("A", 5, 9).residue_number(), 3);
        assert_eq!(bead("A", 2, 5).residue_number(), 1);
    }

    #[test]
    fn index_covers_every_residue_in_each_range() {
        let mut m = SphereModel::new("cluster1", "1");
        let (b1, c1) = m.add_bead(bead("A", 1, 5));
        let (b2, c2) = m.add_bead(bead("A", 6, 6));
        let (b3, c3) = m.add_bead(bead("B", 1, 3));
        assert!(c1.is_empty() && c2.is_empty() && c3.is_empty());
        assert_eq!(m.indexed_residue_count(), 5 + 1 + 3);
        for r in 1..=5 {
            assert_eq!(m.residue_sphere("A", r), Some(b1));
        }
        assert_eq!(m.residue_sphere("A", 6), Some(b2));
        for r in 1..=3 {
            assert_eq!(m.residue_sphere("B", r), Some(b3));
        }
        assert_eq!(m.residue_sphere("A", 7), None);
        assert_eq!(m.residue_sphere("C", 1), None);
    }

    #[test]
    fn overlapping_range_keeps_first_bead() {
        let mut m = SphereModel::new("cluster1", "1");
        let (b1, _) = m.add_bead(bead("A", 1, 4));
        let (_b2, conflicts) = m.add_bead(bead("A", 3, 6));
        assert_eq!(conflicts, vec![3, 4]);
        assert_eq!(m.residue_sphere("A", 3), Some(b1));
        assert_eq!(m.residue_sphere("A", 4), Some(b1));
        assert_ne!(m.residue_sphere("A", 5), Some(b1));
    }

    #[test]
    fn bead_ordinals_follow_input_order() {
        let mut m = SphereModel::new("cluster1", "1");
        let (b1, _) = m.add_bead(bead("A", 1, 2));
        let (b2, _) = m.add_bead(bead("A", 3, 4));
        assert_eq!(m.bead_ordinal(b1), Some(0));
        assert_eq!(m.bead_ordinal(b2), Some(1));
        assert_eq!(m.radii(), vec![2.0, 2.0]);
    }
}
