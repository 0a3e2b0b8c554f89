use crate::core::models::Visible;
use crate::core::models::ids::BeadId;
use nalgebra::Point3;

/// Pseudobond color for restraints whose observed length is within the
/// threshold (green) and for violated restraints (red).
pub const SATISFIED_COLOR: [u8; 4] = [0, 255, 0, 255];
pub const VIOLATED_COLOR: [u8; 4] = [255, 0, 0, 255];

/// One distance restraint between two (asym, residue) sites, as read from
/// the restraint table. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Crosslink {
    pub asym1: String,
    pub seq1: i32,
    pub asym2: String,
    pub seq2: i32,
    pub distance_threshold: f64,
}

/// Identity of a spatial site a crosslink endpoint resolved to. Used to
/// deduplicate restraints that collapse onto the same bead/atom pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteKey {
    Bead(BeadId),
    Atom { model: usize, atom: usize },
}

/// A resolved crosslink endpoint: its identity plus its position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BondSite {
    pub key: SiteKey,
    pub position: Point3<f64>,
}

/// One restraint edge between two resolved sites, annotated with its
/// observed length and colored by threshold comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Pseudobond {
    pub site1: BondSite,
    pub site2: BondSite,
    pub length: f64,
    pub restraint_distance: f64,
    pub color: [u8; 4],
    pub radius: f64,
}

impl Pseudobond {
    pub fn new(site1: BondSite, site2: BondSite, restraint_distance: f64) -> Self {
        let length = (site1.position - site2.position).norm();
        let color = if length > restraint_distance {
            VIOLATED_COLOR
        } else {
            SATISFIED_COLOR
        };
        Self {
            site1,
            site2,
            length,
            restraint_distance,
            color,
            radius: 1.0,
        }
    }

    pub fn is_violated(&self) -> bool {
        self.length > self.restraint_distance
    }
}

/// All pseudobonds of one restraint type on one model.
#[derive(Debug, Clone, PartialEq)]
pub struct PseudobondGroup {
    pub name: String,
    pub crosslink_type: String,
    /// The sphere/ensemble/atomic model the group annotates.
    pub model_id: String,
    pub pseudobonds: Vec<Pseudobond>,
    pub display: bool,
}

impl Visible for PseudobondGroup {
    fn is_visible(&self) -> bool {
        self.display
    }
    fn set_visible(&mut self, visible: bool) {
        self.display = visible;
    }
}

/// All crosslinks of one type, rendered as pseudobond groups across
/// potentially many models. Controls display of its groups but draws
/// nothing itself.
#[derive(Debug, Clone, PartialEq)]
pub struct CrosslinkRestraintSet {
    pub crosslink_type: String,
    /// Number of restraint rows of this type in the input file.
    pub restraint_count: usize,
    pub name: String,
    pub groups: Vec<PseudobondGroup>,
}

impl CrosslinkRestraintSet {
    pub fn new(crosslink_type: &str, restraint_count: usize) -> Self {
        Self {
            crosslink_type: crosslink_type.to_string(),
            restraint_count,
            name: format!("{} {} crosslinks", restraint_count, crosslink_type),
            groups: Vec::new(),
        }
    }

    pub fn add_groups(&mut self, groups: impl IntoIterator<Item = PseudobondGroup>) {
        self.groups.extend(groups);
    }
}

impl Visible for CrosslinkRestraintSet {
    fn is_visible(&self) -> bool {
        self.groups.iter().any(|g| g.display)
    }
    fn set_visible(&mut self, visible: bool) {
        for group in &mut self.groups {
            group.display = visible;
        }
    }
}
