//! Localization densities and 2D class-average images.
//!
//! An ensemble's spatial uncertainty arrives either as precomputed map
//! files or as per-asym Gaussian mixtures that get rasterized onto a
//! probability grid here. Surface levels are mass-rank thresholds so a
//! fixed fraction of probability mass lies outside the shown surface.

use crate::core::io::cif::TableStore;
use crate::core::io::provider::ModelProvider;
use crate::core::models::grid::{DensityMap, VolumeGrid};
use crate::core::models::group::LocalizationEnsemble;
use crate::core::utils::colors::chain_rgba8_with_opacity;
use crate::core::utils::geometry::{Bounds, union_bounds};
use crate::engine::error::GeometryError;
use crate::engine::log::ImportLog;
use crate::engine::resolver::IdResolver;
use nalgebra::{Matrix3, Point3, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::instrument;

/// Rendering parameters for localization densities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DensityOptions {
    /// Edge length of a probability-grid voxel, in Angstroms.
    pub voxel_size: f64,
    /// Fraction of probability mass left outside the displayed surface.
    pub level: f64,
    /// Surface opacity.
    pub opacity: f64,
}

impl Default for DensityOptions {
    fn default() -> Self {
        Self {
            voxel_size: 5.0,
            level: 0.2,
            opacity: 0.5,
        }
    }
}

/// One weighted Gaussian component of a localization mixture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianComponent {
    pub weight: f64,
    pub center: Point3<f64>,
    pub covariance: Matrix3<f64>,
}

/// Reads localization densities for every ensemble: precomputed map files
/// when the localization table names them, Gaussian mixtures otherwise.
/// Only the first ensemble starts displayed.
#[instrument(skip_all)]
pub fn read_localization_maps(
    store: &TableStore,
    resolver: &IdResolver,
    options: &DensityOptions,
    provider: &dyn ModelProvider,
    log: &mut ImportLog,
) -> Vec<LocalizationEnsemble> {
    let mut ensembles = read_ensemble_localization_maps(store, resolver, options, provider, log);
    if ensembles.is_empty() {
        ensembles = read_gaussian_localization_maps(store, resolver, options, log);
    }
    for ensemble in ensembles.iter_mut().skip(1) {
        ensemble.display = false;
    }
    ensembles
}

fn read_ensemble_localization_maps(
    store: &TableStore,
    resolver: &IdResolver,
    options: &DensityOptions,
    provider: &dyn ModelProvider,
    log: &mut ImportLog,
) -> Vec<LocalizationEnsemble> {
    let Some(table) = store.table("ihm_ensemble_localization") else {
        return Vec::new();
    };
    let rows = match table.fields(&["asym_id", "ensemble_id", "file"], false) {
        Ok(rows) => rows,
        Err(e) => {
            log.warn(format!("Ignoring ihm_ensemble_localization table: {}", e));
            return Vec::new();
        }
    };

    let mut per_ensemble: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
    for row in rows {
        let [asym_id, ensemble_id, file] = <[String; 3]>::try_from(row).unwrap_or_default();
        per_ensemble.entry(ensemble_id).or_default().push((asym_id, file));
    }

    let mut ensembles = Vec::new();
    for (ensemble_id, mut asym_files) in per_ensemble {
        let Some((group_id, _)) = resolver.ensemble_group(&ensemble_id) else {
            log.warn(format!(
                "Ensemble {} references no known model group",
                ensemble_id
            ));
            continue;
        };
        let name = format!("Localization map ensemble {}", ensemble_id);
        let mut ensemble = LocalizationEnsemble::new(&ensemble_id, group_id, &name);
        asym_files.sort();
        for (asym_id, file) in asym_files {
            let path = store.resolve_path(&file);
            match provider.open_volume(&path) {
                Ok((grid, message)) => {
                    log.info(message);
                    let color = chain_rgba8_with_opacity(&asym_id, options.opacity);
                    ensemble
                        .maps
                        .push(DensityMap::new(Some(asym_id), grid, options.level, color));
                }
                Err(e) => log.warn(format!(
                    "Skipping localization map {}: {}",
                    path.display(),
                    e
                )),
            }
        }
        ensembles.push(ensemble);
    }
    ensembles
}

fn read_gaussian_localization_maps(
    store: &TableStore,
    resolver: &IdResolver,
    options: &DensityOptions,
    log: &mut ImportLog,
) -> Vec<LocalizationEnsemble> {
    let Some(table) = store.table("ihm_gaussian_obj_ensemble") else {
        return Vec::new();
    };
    let rows = match table.fields(
        &[
            "asym_id",
            "mean_Cartn_x",
            "mean_Cartn_y",
            "mean_Cartn_z",
            "weight",
            "covariance_matrix[1][1]",
            "covariance_matrix[1][2]",
            "covariance_matrix[1][3]",
            "covariance_matrix[2][1]",
            "covariance_matrix[2][2]",
            "covariance_matrix[2][3]",
            "covariance_matrix[3][1]",
            "covariance_matrix[3][2]",
            "covariance_matrix[3][3]",
            "ensemble_id",
        ],
        false,
    ) {
        Ok(rows) => rows,
        Err(e) => {
            log.warn(format!("Ignoring ihm_gaussian_obj_ensemble table: {}", e));
            return Vec::new();
        }
    };

    // ensemble id -> asym id -> mixture components
    let mut mixtures: BTreeMap<String, BTreeMap<String, Vec<GaussianComponent>>> = BTreeMap::new();
    for (row_index, row) in rows.into_iter().enumerate() {
        let values: Vec<f64> = row[1..14].iter().filter_map(|v| v.parse().ok()).collect();
        if values.len() != 13 {
            log.warn(format!(
                "Skipping unreadable Gaussian object row {}",
                row_index + 1
            ));
            continue;
        }
        let component = GaussianComponent {
            weight: values[3],
            center: Point3::new(values[0], values[1], values[2]),
            covariance: Matrix3::new(
                values[4], values[5], values[6],
                values[7], values[8], values[9],
                values[10], values[11], values[12],
            ),
        };
        mixtures
            .entry(row[14].clone())
            .or_default()
            .entry(row[0].clone())
            .or_default()
            .push(component);
    }

    let mut ensembles = Vec::new();
    for (ensemble_id, asym_mixtures) in mixtures {
        let Some((group_id, num_models)) = resolver.ensemble_group(&ensemble_id) else {
            log.warn(format!(
                "Ensemble {} references no known model group",
                ensemble_id
            ));
            continue;
        };
        let name = format!(
            "Localization map ensemble {} of {} models",
            ensemble_id, num_models
        );
        let mut ensemble = LocalizationEnsemble::new(&ensemble_id, group_id, &name);
        for (asym_id, components) in asym_mixtures {
            let grid_name = format!("{} Gaussians", asym_id);
            match probability_grid(&grid_name, &components, options.voxel_size) {
                Ok((grid, skipped)) => {
                    if skipped > 0 {
                        log.warn(
                            GeometryError::SingularCovariance {
                                asym_id: asym_id.clone(),
                            }
                            .to_string(),
                        );
                    }
                    let color = chain_rgba8_with_opacity(&asym_id, options.opacity);
                    ensemble
                        .maps
                        .push(DensityMap::new(Some(asym_id), grid, options.level, color));
                }
                Err(e) => log.warn(format!(
                    "Skipping Gaussian localization for asym {}: {}",
                    asym_id, e
                )),
            }
        }
        ensembles.push(ensemble);
    }
    ensembles
}

/// Rasterizes a Gaussian mixture onto a probability grid.
///
/// The grid covers the union of the one-sigma boxes of all components and
/// stores normalized density, so the voxel sum times the voxel volume
/// approximates the total mixture weight. Components with a singular
/// covariance are skipped and counted; all-singular mixtures are an error.
pub fn probability_grid(
    name: &str,
    components: &[GaussianComponent],
    voxel_size: f64,
) -> Result<(VolumeGrid, usize), GeometryError> {
    struct Prepared {
        center: Point3<f64>,
        inverse: Matrix3<f64>,
        scale: f64,
    }

    let mut prepared = Vec::with_capacity(components.len());
    let mut bounds = Vec::with_capacity(components.len());
    let mut skipped = 0;
    for component in components {
        let determinant = component.covariance.determinant();
        let inverse = component.covariance.try_inverse();
        match inverse {
            Some(inverse) if determinant > 0.0 => {
                // Normalization so each component integrates to its weight.
                let scale = component.weight
                    * (2.0 * std::f64::consts::PI).powf(-1.5)
                    / determinant.sqrt();
                let sigmas = Vector3::new(
                    component.covariance[(0, 0)].sqrt(),
                    component.covariance[(1, 1)].sqrt(),
                    component.covariance[(2, 2)].sqrt(),
                );
                bounds.push(Bounds::new(
                    component.center - sigmas,
                    component.center + sigmas,
                ));
                prepared.push(Prepared {
                    center: component.center,
                    inverse,
                    scale,
                });
            }
            _ => skipped += 1,
        }
    }
    let Some(bounds) = union_bounds(bounds) else {
        return Err(GeometryError::SingularCovariance {
            asym_id: name.to_string(),
        });
    };

    let size = bounds.size();
    let dims = [
        (size.x / voxel_size).ceil().max(1.0) as usize,
        (size.y / voxel_size).ceil().max(1.0) as usize,
        (size.z / voxel_size).ceil().max(1.0) as usize,
    ];
    let mut grid = VolumeGrid::new(name, bounds.min, voxel_size, dims);

    let (isize_, jsize) = (dims[0], dims[1]);
    let origin = grid.origin;
    grid.data
        .par_chunks_mut(isize_ * jsize)
        .enumerate()
        .for_each(|(k, slab)| {
            for j in 0..jsize {
                for i in 0..isize_ {
                    let p = origin
                        + Vector3::new(
                            (i as f64 + 0.5) * voxel_size,
                            (j as f64 + 0.5) * voxel_size,
                            (k as f64 + 0.5) * voxel_size,
                        );
                    let mut density = 0.0;
                    for g in &prepared {
                        let d = p - g.center;
                        density += g.scale * (-0.5 * d.dot(&(g.inverse * d))).exp();
                    }
                    slab[j * isize_ + i] = density as f32;
                }
            }
        });

    Ok((grid, skipped))
}

/// Opens 2D electron microscopy class-average images referenced by the
/// dataset table.
pub fn read_2dem_images(
    store: &TableStore,
    provider: &dyn ModelProvider,
    log: &mut ImportLog,
) -> Vec<DensityMap> {
    let Some(table) = store.table("ihm_dataset_other") else {
        return Vec::new();
    };
    let Ok(rows) = table.fields(&["data_type", "file"], true) else {
        return Vec::new();
    };

    let mut images = Vec::new();
    for row in rows {
        let [data_type, file] = <[String; 2]>::try_from(row).unwrap_or_default();
        if data_type != "2DEM class average" || !file.ends_with(".mrc") {
            continue;
        }
        let path = store.resolve_path(&file);
        if !path.is_file() {
            continue;
        }
        match provider.open_volume(&path) {
            Ok((mut grid, message)) => {
                log.info(message);
                grid.name = format!("{} 2D electron microscopy", grid.name);
                // Class averages show almost all of their mass.
                let mut map = DensityMap::new(None, grid, 0.01, [190, 190, 190, 255]);
                map.show_in_volume_viewer = true;
                images.push(map);
            }
            Err(e) => log.warn(format!(
                "Skipping 2DEM class average {}: {}",
                path.display(),
                e
            )),
        }
    }
    images
}
