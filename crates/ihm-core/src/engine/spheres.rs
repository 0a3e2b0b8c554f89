//! Sphere-model construction: model groups from the model list, bead
//! models from the sphere-object table, and ensemble trajectories from
//! referenced coordinate files.

use crate::core::io::cif::{SchemaError, TableStore, is_placeholder};
use crate::core::io::provider::ModelProvider;
use crate::core::models::group::ModelGroup;
use crate::core::models::sphere::{SphereBead, SphereModel};
use crate::core::utils::colors::chain_rgba8;
use crate::engine::error::ResolutionError;
use crate::engine::log::ImportLog;
use nalgebra::Point3;
use std::collections::{HashMap, HashSet};
use tracing::instrument;

/// Counts reported in the import summary.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SphereModelStats {
    pub num_sphere_models: usize,
    pub num_ensemble_models: usize,
}

/// Sort key for numeric-looking string ids: numeric order when the id
/// parses, falling back to the string itself.
fn id_sort_key(id: &str) -> (i64, String) {
    (id.parse().unwrap_or(i64::MAX), id.to_string())
}

/// Builds one [`ModelGroup`] per distinct model group in the model list,
/// sorted by group id. Only the first group starts displayed.
///
/// The model list is the one table an import cannot proceed without.
pub fn make_model_groups(store: &TableStore) -> Result<Vec<ModelGroup>, SchemaError> {
    let table = store.required("ihm_model_list")?;
    let rows = table.fields(&["model_id", "model_group_id", "model_group_name"], false)?;

    let mut order: Vec<(String, String)> = Vec::new();
    let mut members: HashMap<(String, String), Vec<String>> = HashMap::new();
    for row in rows {
        let [model_id, group_id, group_name] = <[String; 3]>::try_from(row).unwrap_or_default();
        let key = (group_id, group_name);
        let entry = members.entry(key.clone()).or_default();
        if entry.is_empty() {
            order.push(key);
        }
        entry.push(model_id);
    }

    let mut groups: Vec<ModelGroup> = order
        .into_iter()
        .map(|key| {
            let mut group = ModelGroup::new(&key.0, &key.1);
            group.ihm_model_ids = members.remove(&key).unwrap_or_default();
            group
        })
        .collect();
    groups.sort_by_key(|g| id_sort_key(&g.group_id));
    for group in groups.iter_mut().skip(1) {
        group.display = false;
    }
    Ok(groups)
}

/// Builds the bead models from the sphere-object table, attaches them to
/// their groups, and opens ensemble trajectory files referenced by the
/// model list for model ids with no beads of their own.
#[instrument(skip_all)]
pub fn make_sphere_models(
    store: &TableStore,
    groups: &mut [ModelGroup],
    provider: &dyn ModelProvider,
    log: &mut ImportLog,
) -> SphereModelStats {
    let model_rows = match store.table("ihm_model_list") {
        Some(table) => table
            .fields(&["model_id", "model_name", "model_group_id", "file"], true)
            .unwrap_or_default(),
        None => Vec::new(),
    };
    let model_names: HashMap<&str, &str> = model_rows
        .iter()
        .map(|row| (row[0].as_str(), row[1].as_str()))
        .collect();

    let group_index: HashMap<String, usize> = groups
        .iter()
        .enumerate()
        .flat_map(|(i, g)| g.ihm_model_ids.iter().map(move |id| (id.clone(), i)))
        .collect();

    let mut smodels = read_bead_models(store, &model_names, log);
    smodels.sort_by_key(|m| id_sort_key(&m.ihm_model_id));

    // Only the first sphere model of each group starts displayed.
    let mut stats = SphereModelStats::default();
    let mut sphere_model_ids: HashSet<String> = HashSet::new();
    let mut groups_seen: HashSet<usize> = HashSet::new();
    for mut smodel in smodels {
        let Some(&gi) = group_index.get(&smodel.ihm_model_id) else {
            log.warn(
                ResolutionError::UnknownModelGroup {
                    model_id: smodel.ihm_model_id.clone(),
                }
                .to_string(),
            );
            continue;
        };
        smodel.display = groups_seen.insert(gi);
        let _ = sphere_model_ids.insert(smodel.ihm_model_id.clone());
        groups[gi].sphere_models.push(smodel);
        stats.num_sphere_models += 1;
    }

    open_ensemble_models(
        store,
        groups,
        &group_index,
        &model_rows,
        &sphere_model_ids,
        provider,
        log,
        &mut stats,
    );
    copy_bead_radii(groups);
    stats
}

fn read_bead_models(
    store: &TableStore,
    model_names: &HashMap<&str, &str>,
    log: &mut ImportLog,
) -> Vec<SphereModel> {
    let Some(table) = store.table("ihm_sphere_obj_site") else {
        return Vec::new();
    };
    let rows = match table.fields(
        &[
            "seq_id_begin",
            "seq_id_end",
            "asym_id",
            "Cartn_x",
            "Cartn_y",
            "Cartn_z",
            "object_radius",
            "model_id",
        ],
        false,
    ) {
        Ok(rows) => rows,
        Err(e) => {
            log.warn(format!("Ignoring ihm_sphere_obj_site table: {}", e));
            return Vec::new();
        }
    };

    let mut order: Vec<String> = Vec::new();
    let mut models: HashMap<String, SphereModel> = HashMap::new();
    let mut overlaps: HashMap<String, usize> = HashMap::new();
    for (row_index, row) in rows.into_iter().enumerate() {
        let [seq_begin, seq_end, asym_id, x, y, z, radius, model_id] =
            <[String; 8]>::try_from(row).unwrap_or_default();
        let parsed = (|| {
            Some((
                seq_begin.parse::<i32>().ok()?,
                seq_end.parse::<i32>().ok()?,
                Point3::new(x.parse().ok()?, y.parse().ok()?, z.parse().ok()?),
                radius.parse::<f64>().ok()?,
            ))
        })();
        let Some((seq_begin, seq_end, center, radius)) = parsed else {
            log.warn(format!(
                "Skipping unreadable sphere row {} of model {}",
                row_index + 1,
                model_id
            ));
            continue;
        };

        let model = models.entry(model_id.clone()).or_insert_with(|| {
            order.push(model_id.clone());
            let name = model_names
                .get(model_id.as_str())
                .filter(|n| !n.is_empty() && !is_placeholder(n))
                .copied()
                .unwrap_or(&model_id);
            SphereModel::new(name, &model_id)
        });
        let color = chain_rgba8(&asym_id);
        let (_, conflicts) = model.add_bead(SphereBead {
            asym_id,
            seq_begin,
            seq_end,
            center,
            radius,
            color,
            display: true,
        });
        if !conflicts.is_empty() {
            *overlaps.entry(model_id).or_default() += conflicts.len();
        }
    }
    for (model_id, count) in overlaps {
        log.warn(format!(
            "Model {}: {} residues covered by more than one bead, keeping the first bead for each",
            model_id, count
        ));
    }

    order
        .into_iter()
        .filter_map(|id| models.remove(&id))
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn open_ensemble_models(
    store: &TableStore,
    groups: &mut [ModelGroup],
    group_index: &HashMap<String, usize>,
    model_rows: &[Vec<String>],
    sphere_model_ids: &HashSet<String>,
    provider: &dyn ModelProvider,
    log: &mut ImportLog,
    stats: &mut SphereModelStats,
) {
    for row in model_rows {
        let (model_id, model_name, file) = (&row[0], &row[1], &row[3]);
        if file.is_empty() || !file.ends_with(".pdb") || sphere_model_ids.contains(model_id) {
            continue;
        }
        let path = store.resolve_path(file);
        if !path.is_file() {
            continue;
        }
        let Some(&gi) = group_index.get(model_id) else {
            log.warn(
                ResolutionError::UnknownModelGroup {
                    model_id: model_id.clone(),
                }
                .to_string(),
            );
            continue;
        };
        match provider.open_atomic_file(&path) {
            Ok((mut models, message)) => {
                log.info(message);
                let Some(mut model) = models.drain(..).next() else {
                    continue;
                };
                if !model_name.is_empty() && !is_placeholder(model_name) {
                    model.name = model_name.clone();
                }
                model.display = false;
                model.color_by_chain();
                model.name = format!("{} {} models", model.name, model.num_coord_sets());
                groups[gi].ensemble_models.push(model);
                stats.num_ensemble_models += 1;
            }
            Err(e) => log.warn(format!("Skipping ensemble file {}: {}", path.display(), e)),
        }
    }
}

/// Ensemble trajectories carry no radii of their own; they inherit the
/// bead radii of the first sphere model, matched positionally.
fn copy_bead_radii(groups: &mut [ModelGroup]) {
    let Some((gi, si)) = sphere_model_order(groups).into_iter().next() else {
        return;
    };
    let radii = groups[gi].sphere_models[si].radii();
    for group in groups.iter_mut() {
        for emodel in &mut group.ensemble_models {
            for (atom, radius) in emodel.atoms.iter_mut().zip(&radii) {
                atom.radius = *radius;
            }
        }
    }
}

/// All sphere models across groups as (group index, model index) pairs, in
/// model-id order. The first entry is the reference model for crosslink
/// endpoint display, ensemble lookups, and starting-model alignment.
pub fn sphere_model_order(groups: &[ModelGroup]) -> Vec<(usize, usize)> {
    let mut order: Vec<(usize, usize)> = groups
        .iter()
        .enumerate()
        .flat_map(|(gi, g)| (0..g.sphere_models.len()).map(move |si| (gi, si)))
        .collect();
    order.sort_by_key(|&(gi, si)| id_sort_key(&groups[gi].sphere_models[si].ihm_model_id));
    order
}
