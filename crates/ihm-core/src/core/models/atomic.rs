use crate::core::utils::colors::chain_rgba8;
use nalgebra::{Isometry3, Point3};
use std::collections::HashMap;

/// One atom of a starting or ensemble atomic model.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub name: String,
    pub chain_id: String,
    pub residue_number: i32,
    pub residue_name: String,
    pub position: Point3<f64>,
    /// Display radius in Angstroms; ensemble trajectories have none of their
    /// own and get radii copied from a sphere model.
    pub radius: f64,
    pub color: [u8; 4],
    pub display: bool,
}

impl Atom {
    pub fn new(name: &str, chain_id: &str, residue_number: i32, position: Point3<f64>) -> Self {
        Self {
            name: name.to_string(),
            chain_id: chain_id.to_string(),
            residue_number,
            residue_name: String::new(),
            position,
            radius: 0.0,
            color: [190, 190, 190, 255],
            display: true,
        }
    }
}

/// Outcome of trimming a model to a single chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrimOutcome {
    /// Atoms on other chains were removed.
    Trimmed { removed: usize },
    /// Every atom was already on the target chain.
    AlreadySingleChain,
    /// The target chain is absent; nothing was removed (a trim must never
    /// empty a model).
    ChainNotFound,
}

/// An atomic-coordinate model: a flat atom list plus optional extra
/// coordinate sets for multi-model trajectory files.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomicModel {
    pub name: String,
    pub atoms: Vec<Atom>,
    /// All coordinate sets of a trajectory, one position per atom each;
    /// empty for single-conformation models. `atoms[i].position` mirrors the
    /// first set.
    pub coord_sets: Vec<Vec<Point3<f64>>>,
    /// Rigid placement of the model in the assembled scene.
    pub placement: Isometry3<f64>,
    pub display: bool,
    pub single_color: [u8; 4],
}

impl AtomicModel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            atoms: Vec::new(),
            coord_sets: Vec::new(),
            placement: Isometry3::identity(),
            display: true,
            single_color: [190, 190, 190, 255],
        }
    }

    pub fn num_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn num_coord_sets(&self) -> usize {
        self.coord_sets.len().max(1)
    }

    /// Removes all atoms whose chain id differs from `chain_id`, unless that
    /// would remove every atom, in which case the model is left untouched.
    /// Deterministic and idempotent.
    pub fn keep_one_chain(&mut self, chain_id: &str) -> TrimOutcome {
        let removed = self
            .atoms
            .iter()
            .filter(|a| a.chain_id != chain_id)
            .count();
        if removed == 0 {
            return TrimOutcome::AlreadySingleChain;
        }
        if removed == self.atoms.len() {
            return TrimOutcome::ChainNotFound;
        }
        let keep: Vec<bool> = self.atoms.iter().map(|a| a.chain_id == chain_id).collect();
        self.atoms.retain(|a| a.chain_id == chain_id);
        for set in &mut self.coord_sets {
            let mut it = keep.iter();
            set.retain(|_| *it.next().unwrap_or(&false));
        }
        TrimOutcome::Trimmed { removed }
    }

    /// Geometric centers of each residue, in first-encounter order.
    pub fn residue_centers(&self) -> Vec<(String, i32, Point3<f64>)> {
        let mut order: Vec<(String, i32)> = Vec::new();
        let mut sums: HashMap<(String, i32), (Point3<f64>, usize)> = HashMap::new();
        for atom in &self.atoms {
            let key = (atom.chain_id.clone(), atom.residue_number);
            match sums.get_mut(&key) {
                Some((sum, count)) => {
                    sum.coords += atom.position.coords;
                    *count += 1;
                }
                None => {
                    order.push(key.clone());
                    let _ = sums.insert(key, (atom.position, 1));
                }
            }
        }
        order
            .into_iter()
            .map(|key| {
                let (sum, count) = &sums[&key];
                let center = Point3::from(sum.coords / *count as f64);
                (key.0, key.1, center)
            })
            .collect()
    }

    /// Index of the representative atom per residue: the CA atom when the
    /// residue has one, otherwise its first atom.
    pub fn principal_atoms(&self) -> HashMap<(String, i32), usize> {
        let mut map: HashMap<(String, i32), usize> = HashMap::new();
        for (i, atom) in self.atoms.iter().enumerate() {
            let key = (atom.chain_id.clone(), atom.residue_number);
            match map.get(&key) {
                None => {
                    let _ = map.insert(key, i);
                }
                Some(&j) if self.atoms[j].name != "CA" && atom.name == "CA" => {
                    let _ = map.insert(key, i);
                }
                Some(_) => {}
            }
        }
        map
    }

    /// Applies one color to every atom and records it as the model color.
    pub fn set_uniform_color(&mut self, color: [u8; 4]) {
        self.single_color = color;
        for atom in &mut self.atoms {
            atom.color = color;
        }
    }

    /// Colors each atom by its chain id, as ensemble trajectories are shown.
    pub fn color_by_chain(&mut self) {
        for atom in &mut self.atoms {
            atom.color = chain_rgba8(&atom.chain_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_chain_model() -> AtomicModel {
        let mut m = AtomicModel::new("test");
        for (chain, rnum, x) in [("A", 1, 0.0), ("A", 2, 1.0), ("B", 1, 2.0), ("B", 2, 3.0)] {
            m.atoms
                .push(Atom::new("CA", chain, rnum, Point3::new(x, 0.0, 0.0)));
        }
        m
    }

    #[test]
    fn trim_keeps_only_target_chain() {
        let mut m = two_chain_model();
        assert_eq!(m.keep_one_chain("A"), TrimOutcome::Trimmed { removed: 2 });
        assert_eq!(m.num_atoms(), 2);
        assert!(m.atoms.iter().all(|a| a.chain_id == "A"));
    }

    #[test]
    fn trim_is_idempotent() {
        let mut m = two_chain_model();
        let _ = m.keep_one_chain("A");
        let first = m.num_atoms();
        assert_eq!(m.keep_one_chain("A"), TrimOutcome::AlreadySingleChain);
        assert_eq!(m.num_atoms(), first);
    }

    #[test]
    fn trim_never_empties_a_model() {
        let mut m = two_chain_model();
        assert_eq!(m.keep_one_chain("C"), TrimOutcome::ChainNotFound);
        assert_eq!(m.num_atoms(), 4);
    }

    #[test]
    fn trim_drops_matching_trajectory_positions() {
        let mut m = two_chain_model();
        m.coord_sets = vec![
            m.atoms.iter().map(|a| a.position).collect(),
            m.atoms
                .iter()
                .map(|a| a.position + nalgebra::Vector3::new(0.0, 1.0, 0.0))
                .collect(),
        ];
        let _ = m.keep_one_chain("B");
        assert_eq!(m.coord_sets[0].len(), 2);
        assert_eq!(m.coord_sets[1].len(), 2);
        assert_eq!(m.coord_sets[0][0], Point3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn residue_centers_average_atom_positions() {
        let mut m = AtomicModel::new("test");
        m.atoms
            .push(Atom::new("N", "A", 1, Point3::new(0.0, 0.0, 0.0)));
        m.atoms
            .push(Atom::new("CA", "A", 1, Point3::new(2.0, 0.0, 0.0)));
        m.atoms
            .push(Atom::new("CA", "A", 2, Point3::new(5.0, 5.0, 5.0)));
        let centers = m.residue_centers();
        assert_eq!(centers.len(), 2);
        assert_eq!(centers[0], ("A".to_string(), 1, Point3::new(1.0, 0.0, 0.0)));
        assert_eq!(centers[1], ("A".to_string(), 2, Point3::new(5.0, 5.0, 5.0)));
    }

    #[test]
    fn principal_atom_prefers_ca() {
        let mut m = AtomicModel::new("test");
        m.atoms
            .push(Atom::new("N", "A", 1, Point3::new(0.0, 0.0, 0.0)));
        m.atoms
            .push(Atom::new("CA", "A", 1, Point3::new(1.0, 0.0, 0.0)));
        m.atoms
            .push(Atom::new("O", "A", 2, Point3::new(2.0, 0.0, 0.0)));
        let map = m.principal_atoms();
        assert_eq!(map[&("A".to_string(), 1)], 1);
        assert_eq!(map[&("A".to_string(), 2)], 2);
    }
}
