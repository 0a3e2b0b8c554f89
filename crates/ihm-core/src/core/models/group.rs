use crate::core::models::Visible;
use crate::core::models::atomic::AtomicModel;
use crate::core::models::grid::DensityMap;
use crate::core::models::sphere::SphereModel;

/// A named collection of IHM models (one clustering result): the sphere
/// models and ensemble trajectories sharing one model group id, plus the
/// localization densities attached to the group.
#[derive(Debug, Clone, Default)]
pub struct ModelGroup {
    pub group_id: String,
    pub name: String,
    /// IHM model ids listed for this group, in input order.
    pub ihm_model_ids: Vec<String>,
    pub sphere_models: Vec<SphereModel>,
    pub ensemble_models: Vec<AtomicModel>,
    pub localization: Vec<LocalizationEnsemble>,
    pub display: bool,
}

impl ModelGroup {
    pub fn new(group_id: &str, name: &str) -> Self {
        Self {
            group_id: group_id.to_string(),
            name: name.to_string(),
            ihm_model_ids: Vec::new(),
            sphere_models: Vec::new(),
            ensemble_models: Vec::new(),
            localization: Vec::new(),
            display: true,
        }
    }
}

impl Visible for ModelGroup {
    fn is_visible(&self) -> bool {
        self.display
    }
    fn set_visible(&mut self, visible: bool) {
        self.display = visible;
    }
}

/// The localization maps of one ensemble, one [`DensityMap`] per asym.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalizationEnsemble {
    pub ensemble_id: String,
    /// Model group the ensemble belongs to; used to attach the maps under
    /// their group in the assembled hierarchy.
    pub group_id: String,
    pub name: String,
    pub maps: Vec<DensityMap>,
    pub display: bool,
}

impl LocalizationEnsemble {
    pub fn new(ensemble_id: &str, group_id: &str, name: &str) -> Self {
        Self {
            ensemble_id: ensemble_id.to_string(),
            group_id: group_id.to_string(),
            name: name.to_string(),
            maps: Vec::new(),
            display: true,
        }
    }
}

impl Visible for LocalizationEnsemble {
    fn is_visible(&self) -> bool {
        self.display
    }
    fn set_visible(&mut self, visible: bool) {
        self.display = visible;
    }
}

/// All starting models of one asym id, grouped for presentation. Members
/// are indices into the import result's starting-model and alignment
/// lists; the group itself owns nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartingModelGroup {
    pub asym_id: String,
    /// "<entity description> <asym id>".
    pub name: String,
    pub color: [u8; 4],
    pub starting_models: Vec<usize>,
    pub alignments: Vec<usize>,
    /// Templates that belong to no sequence alignment.
    pub extra_templates: Vec<usize>,
}
