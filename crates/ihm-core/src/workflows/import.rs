//! The IHM import workflow.
//!
//! [`run`] drives the pipeline in a fixed order: tables, starting models,
//! crosslink parsing, 2DEM images, model groups and sphere models,
//! crosslink materialization, rigid alignment of starting models onto the
//! reference bead model, and localization densities. Stages degrade
//! independently; only an unreadable input file or a missing model list
//! aborts.

use crate::core::io::cif::TableStore;
use crate::core::io::provider::ModelProvider;
use crate::core::models::grid::DensityMap;
use crate::core::models::group::ModelGroup;
use crate::engine::crosslinks::{
    create_sphere_model_crosslinks, create_starting_model_crosslinks, read_crosslinks,
};
use crate::engine::density::{DensityOptions, read_2dem_images, read_localization_maps};
use crate::engine::error::ImportError;
use crate::engine::log::ImportLog;
use crate::engine::resolver::IdResolver;
use crate::engine::spheres::{
    SphereModelStats, make_model_groups, make_sphere_models, sphere_model_order,
};
use crate::engine::starting_models::{StartingModels, align_to_sphere_model, read_starting_models};
use crate::core::models::crosslink::CrosslinkRestraintSet;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::instrument;

/// The tables the import consumes; everything else in the file is dropped
/// at parse time.
const TABLE_NAMES: &[&str] = &[
    "ihm_struct_assembly",
    "ihm_model_list",
    "ihm_sphere_obj_site",
    "ihm_cross_link_restraint",
    "ihm_ensemble_info",
    "ihm_gaussian_obj_ensemble",
    "ihm_ensemble_localization",
    "ihm_dataset_other",
    "ihm_starting_model_details",
];

/// Import configuration, loadable from a TOML file. Every field has a
/// default, so an empty document is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportOptions {
    /// Open comparative-model coordinate files referenced by datasets.
    pub load_linked_files: bool,
    /// Materialize crosslinks on sphere models and ensemble trajectories.
    pub show_sphere_crosslinks: bool,
    /// Materialize crosslinks on atomic starting models.
    pub show_atom_crosslinks: bool,
    pub density: DensityOptions,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            load_linked_files: true,
            show_sphere_crosslinks: true,
            show_atom_crosslinks: false,
            density: DensityOptions::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("Failed to read options file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse options file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ImportOptions {
    pub fn from_toml_file(path: &Path) -> Result<Self, OptionsError> {
        let text = std::fs::read_to_string(path).map_err(|source| OptionsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| OptionsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// The assembled result of one import: the model-group hierarchy plus the
/// flat starting-model, restraint, and image collections, and the
/// diagnostics accumulated along the way.
#[derive(Debug)]
pub struct IhmEnsemble {
    /// Input file stem.
    pub name: String,
    pub filename: PathBuf,
    pub starting_models: StartingModels,
    pub crosslink_sets: Vec<CrosslinkRestraintSet>,
    pub em2d_images: Vec<DensityMap>,
    pub groups: Vec<ModelGroup>,
    pub stats: SphereModelStats,
    /// All localization maps read, including maps of ensembles whose model
    /// group is absent and which therefore hang nowhere in the hierarchy.
    pub num_localization_maps: usize,
    /// Skip-and-degrade diagnostics, in the order they occurred.
    pub log: Vec<String>,
}

impl IhmEnsemble {
    /// Human-readable summary of what was read, followed by the
    /// diagnostics.
    pub fn description(&self) -> String {
        let num_comparative = self.starting_models.num_comparative();
        let num_experimental = self.starting_models.num_experimental();
        let num_alignments = self.starting_models.alignments.len();
        let num_templates = self.starting_models.num_templates();

        let crosslinks = if self.crosslink_sets.is_empty() {
            "0 crosslinks".to_string()
        } else {
            self.crosslink_sets
                .iter()
                .map(|s| s.name.clone())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let ensemble_sizes = self
            .groups
            .iter()
            .flat_map(|g| &g.ensemble_models)
            .map(|m| m.num_coord_sets().to_string())
            .collect::<Vec<_>>()
            .join(" and ");
        let mut message = format!(
            "Opened IHM file {}\n \
             {} xray/nmr models, {} comparative models, {} sequence alignments, {} templates\n \
             {}, {} 2D electron microscopy images\n \
             {} sphere models, {} ensembles with {} models, {} localization maps",
            self.filename.display(),
            num_experimental,
            num_comparative,
            num_alignments,
            num_templates,
            crosslinks,
            self.em2d_images.len(),
            self.stats.num_sphere_models,
            self.stats.num_ensemble_models,
            ensemble_sizes,
            self.num_localization_maps,
        );
        for line in &self.log {
            message.push('\n');
            message.push_str(line);
        }
        message
    }
}

/// Imports one IHM file.
#[instrument(skip(options, provider), fields(file = %path.display()))]
pub fn run(
    path: &Path,
    options: &ImportOptions,
    provider: &dyn ModelProvider,
) -> Result<IhmEnsemble, ImportError> {
    let mut log = ImportLog::new();
    let store = TableStore::read(path, TABLE_NAMES)?;
    let resolver = IdResolver::build(&store);

    let mut starting = read_starting_models(
        &store,
        &resolver,
        options.load_linked_files,
        provider,
        &mut log,
    );
    let (xlinks, mut crosslink_sets) = read_crosslinks(&store, &mut log);
    let em2d_images = read_2dem_images(&store, provider, &mut log);

    let mut groups = make_model_groups(&store)?;
    let stats = make_sphere_models(&store, &mut groups, provider, &mut log);

    if options.show_sphere_crosslinks {
        create_sphere_model_crosslinks(&xlinks, &mut groups, &mut crosslink_sets, &mut log);
    }
    if options.show_atom_crosslinks {
        create_starting_model_crosslinks(
            &xlinks,
            &starting.models,
            &mut crosslink_sets,
            &mut log,
        );
    }

    if let Some(&(gi, si)) = sphere_model_order(&groups).first() {
        align_to_sphere_model(&mut starting.models, &groups[gi].sphere_models[si], &mut log);
    }

    let localization =
        read_localization_maps(&store, &resolver, &options.density, provider, &mut log);
    let num_localization_maps = localization.iter().map(|l| l.maps.len()).sum();
    for ensemble in localization {
        match groups.iter_mut().find(|g| g.group_id == ensemble.group_id) {
            Some(group) => group.localization.push(ensemble),
            None => log.warn(format!(
                "Localization ensemble {} references no known model group",
                ensemble.ensemble_id
            )),
        }
    }

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(IhmEnsemble {
        name,
        filename: path.to_path_buf(),
        starting_models: starting,
        crosslink_sets,
        em2d_images,
        groups,
        stats,
        num_localization_maps,
        log: log.into_messages(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::provider::FileSystemProvider;
    use std::io::Write;

    const IHM_FILE: &str = "\
data_mediator
#
loop_
_ihm_struct_assembly.entity_description
_ihm_struct_assembly.asym_id
Med4 A
Med9 B
#
loop_
_ihm_model_list.model_id
_ihm_model_list.model_name
_ihm_model_list.model_group_id
_ihm_model_list.model_group_name
_ihm_model_list.file
1 'best scoring' 1 'cluster 1' .
2 . 1 'cluster 1' .
3 . 2 'cluster 2' .
#
loop_
_ihm_sphere_obj_site.seq_id_begin
_ihm_sphere_obj_site.seq_id_end
_ihm_sphere_obj_site.asym_id
_ihm_sphere_obj_site.Cartn_x
_ihm_sphere_obj_site.Cartn_y
_ihm_sphere_obj_site.Cartn_z
_ihm_sphere_obj_site.object_radius
_ihm_sphere_obj_site.model_id
1 5 A 0.0 0.0 0.0 4.0 1
6 6 A 8.0 0.0 0.0 2.5 1
1 3 B 30.0 0.0 0.0 3.0 1
1 5 A 1.0 1.0 1.0 4.0 2
1 5 A 2.0 2.0 2.0 4.0 3
#
loop_
_ihm_cross_link_restraint.asym_id_1
_ihm_cross_link_restraint.seq_id_1
_ihm_cross_link_restraint.asym_id_2
_ihm_cross_link_restraint.seq_id_2
_ihm_cross_link_restraint.type
_ihm_cross_link_restraint.distance_threshold
A 2 B 1 DSS 25.0
A 6 B 2 DSS 25.0
A 2 C 9 DSS 25.0
#
loop_
_ihm_ensemble_info.ensemble_id
_ihm_ensemble_info.model_group_id
_ihm_ensemble_info.num_ensemble_models
1 1 25
#
loop_
_ihm_gaussian_obj_ensemble.asym_id
_ihm_gaussian_obj_ensemble.mean_Cartn_x
_ihm_gaussian_obj_ensemble.mean_Cartn_y
_ihm_gaussian_obj_ensemble.mean_Cartn_z
_ihm_gaussian_obj_ensemble.weight
_ihm_gaussian_obj_ensemble.covariance_matrix[1][1]
_ihm_gaussian_obj_ensemble.covariance_matrix[1][2]
_ihm_gaussian_obj_ensemble.covariance_matrix[1][3]
_ihm_gaussian_obj_ensemble.covariance_matrix[2][1]
_ihm_gaussian_obj_ensemble.covariance_matrix[2][2]
_ihm_gaussian_obj_ensemble.covariance_matrix[2][3]
_ihm_gaussian_obj_ensemble.covariance_matrix[3][1]
_ihm_gaussian_obj_ensemble.covariance_matrix[3][2]
_ihm_gaussian_obj_ensemble.covariance_matrix[3][3]
_ihm_gaussian_obj_ensemble.ensemble_id
A 0.0 0.0 0.0 1.0 25.0 0.0 0.0 0.0 25.0 0.0 0.0 0.0 25.0 1
#
";

    const MINIMAL_FILE: &str = "\
data_minimal
#
loop_
_ihm_model_list.model_id
_ihm_model_list.model_group_id
_ihm_model_list.model_group_name
1 1 'cluster 1'
#
loop_
_ihm_sphere_obj_site.seq_id_begin
_ihm_sphere_obj_site.seq_id_end
_ihm_sphere_obj_site.asym_id
_ihm_sphere_obj_site.Cartn_x
_ihm_sphere_obj_site.Cartn_y
_ihm_sphere_obj_site.Cartn_z
_ihm_sphere_obj_site.object_radius
_ihm_sphere_obj_site.model_id
1 5 A 0.0 0.0 0.0 4.0 1
#
";

    fn write_input(dir: &Path, text: &str) -> PathBuf {
        let path = dir.join("mediator.cif");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(text.as_bytes()).unwrap();
        path
    }

    #[test]
    fn imports_groups_spheres_crosslinks_and_densities() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_input(dir.path(), IHM_FILE);
        let result = run(&path, &ImportOptions::default(), &FileSystemProvider).unwrap();

        assert_eq!(result.name, "mediator");
        assert_eq!(result.groups.len(), 2);
        assert_eq!(result.stats.num_sphere_models, 3);
        assert!(result.groups[0].display);
        assert!(!result.groups[1].display);

        // Beads of the reference model: A:1-5 spans residues, A:6 and B:1-3
        // are crosslink endpoints, so all stay displayed.
        let reference = &result.groups[0].sphere_models[0];
        assert_eq!(reference.name, "best scoring");
        assert_eq!(reference.num_beads(), 3);

        // One DSS set; pseudobond groups on all three sphere models, only
        // the reference model's displayed.
        assert_eq!(result.crosslink_sets.len(), 1);
        let dss = &result.crosslink_sets[0];
        assert_eq!(dss.name, "3 DSS crosslinks");
        assert_eq!(dss.groups.len(), 3);
        assert!(dss.groups[0].display);
        assert!(!dss.groups[1].display && !dss.groups[2].display);
        // The reference model resolves both endpoints of two restraints;
        // C:9 is missing and reported.
        assert_eq!(dss.groups[0].pseudobonds.len(), 2);
        assert!(
            result
                .log
                .iter()
                .any(|m| m.contains("Missing 1 crosslink residues /C:9"))
        );

        // Gaussian localization attached under group 1.
        assert_eq!(result.groups[0].localization.len(), 1);
        assert_eq!(result.groups[0].localization[0].maps.len(), 1);
        assert!(result.groups[1].localization.is_empty());
    }

    #[test]
    fn minimal_file_yields_one_group_one_model_one_bead() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_input(dir.path(), MINIMAL_FILE);
        let result = run(&path, &ImportOptions::default(), &FileSystemProvider).unwrap();

        assert_eq!(result.groups.len(), 1);
        assert_eq!(result.stats.num_sphere_models, 1);
        assert_eq!(result.stats.num_ensemble_models, 0);
        assert_eq!(result.groups[0].sphere_models[0].num_beads(), 1);
        assert!(result.crosslink_sets.is_empty());
        assert!(result.em2d_images.is_empty());
        assert!(result.starting_models.models.is_empty());

        let description = result.description();
        assert!(description.contains("0 xray/nmr models, 0 comparative models"));
        assert!(description.contains("0 crosslinks, 0 2D electron microscopy images"));
        assert!(description.contains("1 sphere models, 0 ensembles"));
        assert!(description.contains("0 localization maps"));
    }

    #[test]
    fn unattached_localization_maps_still_counted() {
        // The ensemble table names group 9, which the model list never
        // declares; the maps are read and tallied but hang nowhere.
        let text = format!(
            "{}{}",
            MINIMAL_FILE,
            "\
loop_
_ihm_ensemble_info.ensemble_id
_ihm_ensemble_info.model_group_id
_ihm_ensemble_info.num_ensemble_models
1 9 25
#
loop_
_ihm_gaussian_obj_ensemble.asym_id
_ihm_gaussian_obj_ensemble.mean_Cartn_x
_ihm_gaussian_obj_ensemble.mean_Cartn_y
_ihm_gaussian_obj_ensemble.mean_Cartn_z
_ihm_gaussian_obj_ensemble.weight
_ihm_gaussian_obj_ensemble.covariance_matrix[1][1]
_ihm_gaussian_obj_ensemble.covariance_matrix[1][2]
_ihm_gaussian_obj_ensemble.covariance_matrix[1][3]
_ihm_gaussian_obj_ensemble.covariance_matrix[2][1]
_ihm_gaussian_obj_ensemble.covariance_matrix[2][2]
_ihm_gaussian_obj_ensemble.covariance_matrix[2][3]
_ihm_gaussian_obj_ensemble.covariance_matrix[3][1]
_ihm_gaussian_obj_ensemble.covariance_matrix[3][2]
_ihm_gaussian_obj_ensemble.covariance_matrix[3][3]
_ihm_gaussian_obj_ensemble.ensemble_id
A 0.0 0.0 0.0 1.0 25.0 0.0 0.0 0.0 25.0 0.0 0.0 0.0 25.0 1
#
"
        );
        let dir = tempfile::tempdir().unwrap();
        let path = write_input(dir.path(), &text);
        let result = run(&path, &ImportOptions::default(), &FileSystemProvider).unwrap();

        assert!(result.groups[0].localization.is_empty());
        assert_eq!(result.num_localization_maps, 1);
        assert!(result.description().contains("1 localization maps"));
        assert!(
            result
                .log
                .iter()
                .any(|m| m.contains("Localization ensemble 1 references no known model group"))
        );
    }

    #[test]
    fn description_reports_counts_including_zeroes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_input(dir.path(), IHM_FILE);
        let result = run(&path, &ImportOptions::default(), &FileSystemProvider).unwrap();

        let description = result.description();
        assert!(description.starts_with("Opened IHM file"));
        assert!(description.contains("0 xray/nmr models, 0 comparative models"));
        assert!(description.contains("3 DSS crosslinks, 0 2D electron microscopy images"));
        assert!(description.contains("3 sphere models, 0 ensembles"));
        assert!(description.contains("1 localization maps"));
        // Diagnostics ride along at the end.
        assert!(description.contains("Missing 1 crosslink residues"));
    }

    #[test]
    fn missing_model_list_aborts_import() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_input(dir.path(), "data_empty\n_entry.id x\n");
        let err = run(&path, &ImportOptions::default(), &FileSystemProvider).unwrap_err();
        assert!(matches!(err, ImportError::Schema(_)));
    }

    #[test]
    fn unreadable_file_aborts_import() {
        let err = run(
            Path::new("/nonexistent/file.cif"),
            &ImportOptions::default(),
            &FileSystemProvider,
        )
        .unwrap_err();
        assert!(matches!(err, ImportError::Input(_)));
    }

    #[test]
    fn sphere_crosslinks_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_input(dir.path(), IHM_FILE);
        let options = ImportOptions {
            show_sphere_crosslinks: false,
            ..ImportOptions::default()
        };
        let result = run(&path, &options, &FileSystemProvider).unwrap();
        // The restraint set still exists (and is counted), but no
        // pseudobond groups were materialized.
        assert_eq!(result.crosslink_sets.len(), 1);
        assert!(result.crosslink_sets[0].groups.is_empty());
    }

    #[test]
    fn options_load_from_toml_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("import.toml");
        std::fs::write(
            &path,
            "load_linked_files = false\n\n[density]\nvoxel_size = 2.5\n",
        )
        .unwrap();
        let options = ImportOptions::from_toml_file(&path).unwrap();
        assert!(!options.load_linked_files);
        assert!(options.show_sphere_crosslinks);
        assert_eq!(options.density.voxel_size, 2.5);
        assert_eq!(options.density.level, 0.2);

        std::fs::write(&path, "").unwrap();
        assert_eq!(
            ImportOptions::from_toml_file(&path).unwrap(),
            ImportOptions::default()
        );
    }
}
