//! Starting-model loading: experimental structures fetched by database
//! code, comparative models read from linked dataset files, template
//! placeholders grouped under their sequence alignments, and rigid
//! alignment of the loaded models onto the reference bead model.

use crate::core::io::cif::TableStore;
use crate::core::io::provider::{ModelProvider, atomic_model_readable};
use crate::core::models::atomic::TrimOutcome;
use crate::core::models::group::StartingModelGroup;
use crate::core::models::sphere::SphereModel;
use crate::core::models::starting::{
    AlignmentKey, SequenceAlignment, StartingModel, TemplateModel,
};
use crate::core::utils::colors::chain_rgba8;
use crate::core::utils::geometry::align_points;
use crate::engine::error::GeometryError;
use crate::engine::log::ImportLog;
use crate::engine::resolver::IdResolver;
use std::collections::{BTreeMap, HashMap};
use tracing::instrument;

/// Everything the starting-model stage produces. Groups reference models,
/// alignments, and extra templates by index.
#[derive(Debug, Default)]
pub struct StartingModels {
    pub models: Vec<StartingModel>,
    pub alignments: Vec<SequenceAlignment>,
    /// Templates whose rows named no readable alignment file.
    pub extra_templates: Vec<TemplateModel>,
    pub groups: Vec<StartingModelGroup>,
}

impl StartingModels {
    pub fn num_comparative(&self) -> usize {
        self.models.iter().filter(|m| m.comparative).count()
    }

    pub fn num_experimental(&self) -> usize {
        self.models.len() - self.num_comparative()
    }

    pub fn num_templates(&self) -> usize {
        self.alignments
            .iter()
            .map(|a| a.templates.len())
            .sum::<usize>()
            + self.extra_templates.len()
    }
}

/// Reads the starting-model details and linked datasets, associates
/// comparative models with their sequence alignments, and groups
/// everything by asym id.
#[instrument(skip_all)]
pub fn read_starting_models(
    store: &TableStore,
    resolver: &IdResolver,
    load_linked_files: bool,
    provider: &dyn ModelProvider,
    log: &mut ImportLog,
) -> StartingModels {
    let mut result = read_starting_model_details(store, provider, log);
    if load_linked_files {
        let linked = read_linked_datasets(store, resolver, provider, log);
        result.models.extend(linked);
    }
    assign_comparative_models_to_alignments(&mut result);
    group_by_asym(&mut result, resolver);
    result
}

fn read_starting_model_details(
    store: &TableStore,
    provider: &dyn ModelProvider,
    log: &mut ImportLog,
) -> StartingModels {
    let mut result = StartingModels::default();
    let Some(table) = store.table("ihm_starting_model_details") else {
        return result;
    };
    let Ok(rows) = table.fields(
        &[
            "asym_id",
            "seq_id_begin",
            "seq_id_end",
            "starting_model_source",
            "starting_model_db_name",
            "starting_model_db_code",
            "starting_model_auth_asym_id",
            "dataset_list_id",
            "alignment_file",
        ],
        true,
    ) else {
        return result;
    };

    let mut alignment_index: HashMap<AlignmentKey, usize> = HashMap::new();
    for row in rows {
        let [asym_id, seq_begin, seq_end, source, db_name, db_code, auth_asym_id, dataset_id, seqfile] =
            <[String; 9]>::try_from(row).unwrap_or_default();
        if db_name != "PDB" || db_code == "?" {
            continue;
        }
        let seq_begin: i32 = seq_begin.parse().unwrap_or(0);
        let seq_end: i32 = seq_end.parse().unwrap_or(0);
        match source.as_str() {
            "comparative model" => {
                // A template for a comparative model; fetched lazily when
                // first shown, a placeholder until then.
                let mut template =
                    TemplateModel::new(&db_name, &db_code, &auth_asym_id, &asym_id, &dataset_id);
                template.seq_begin = seq_begin;
                template.seq_end = seq_end;

                let alignment_path = store.resolve_path(&seqfile);
                if !seqfile.is_empty() && alignment_path.is_file() {
                    let key: AlignmentKey =
                        (alignment_path.clone(), asym_id.clone(), dataset_id.clone());
                    let index = *alignment_index.entry(key).or_insert_with(|| {
                        result.alignments.push(SequenceAlignment::new(
                            &alignment_path,
                            &asym_id,
                            &dataset_id,
                        ));
                        result.alignments.len() - 1
                    });
                    result.alignments[index].add_template(template);
                } else {
                    result.extra_templates.push(template);
                }
            }
            "experimental model" => match provider.fetch_structure(&db_name, &db_code) {
                Ok((models, message)) => {
                    log.info(message);
                    for mut model in models {
                        if let TrimOutcome::ChainNotFound = model.keep_one_chain(&auth_asym_id) {
                            log.warn(format!("No chain {} in {}", auth_asym_id, model.name));
                        }
                        model.name = format!("{} {}", db_code, auth_asym_id);
                        model.set_uniform_color(chain_rgba8(&asym_id));
                        result.models.push(StartingModel {
                            model,
                            asym_id: asym_id.clone(),
                            auth_asym_id: auth_asym_id.clone(),
                            dataset_id: dataset_id.clone(),
                            seq_begin,
                            seq_end,
                            comparative: false,
                        });
                    }
                }
                Err(e) => log.warn(format!(
                    "Skipping experimental starting model {} chain {}: {}",
                    db_code, auth_asym_id, e
                )),
            },
            _ => {}
        }
    }
    result
}

/// Opens comparative-model coordinate files referenced by the dataset
/// table, directly or out of a DOI archive, and fans each file out to the
/// asym ids its dataset models.
fn read_linked_datasets(
    store: &TableStore,
    resolver: &IdResolver,
    provider: &dyn ModelProvider,
    log: &mut ImportLog,
) -> Vec<StartingModel> {
    let mut linked = Vec::new();
    let Some(table) = store.table("ihm_dataset_other") else {
        return linked;
    };
    let Ok(rows) = table.fields(
        &["dataset_list_id", "data_type", "doi", "content_filename", "file"],
        true,
    ) else {
        return linked;
    };

    for row in rows {
        let [dataset_id, data_type, doi, archive_filename, filename] =
            <[String; 5]>::try_from(row).unwrap_or_default();
        if data_type != "Comparative model" {
            continue;
        }
        let opened = if atomic_model_readable(&filename) {
            provider.open_atomic_file(&store.resolve_path(&filename))
        } else if atomic_model_readable(&archive_filename) {
            provider.fetch_doi_archive_file(&doi, &archive_filename)
        } else {
            log.warn(format!(
                "No readable atomic model file for dataset {}",
                dataset_id
            ));
            continue;
        };
        let models = match opened {
            Ok((models, message)) => {
                log.info(message);
                models
            }
            Err(e) => {
                log.warn(format!(
                    "Skipping comparative model for dataset {}: {}",
                    dataset_id, e
                ));
                continue;
            }
        };

        let pairs = resolver.dataset_asyms(&dataset_id);
        let fan_out = pairs.len() > 1;
        for (asym_id, model_chain) in pairs {
            for model in &models {
                let mut model = model.clone();
                if fan_out {
                    // One multi-chain file models several asyms; carve out
                    // the chain this asym corresponds to.
                    let _ = model.keep_one_chain(model_chain);
                    model.name = format!("{} {}", model.name, model_chain);
                }
                model.set_uniform_color(chain_rgba8(asym_id));
                linked.push(StartingModel {
                    model,
                    asym_id: asym_id.clone(),
                    auth_asym_id: model_chain.clone(),
                    dataset_id: dataset_id.clone(),
                    seq_begin: 0,
                    seq_end: 0,
                    comparative: true,
                });
            }
        }
    }
    linked
}

/// Ties each alignment to the comparative model sharing its (dataset,
/// asym) key. When several comparative models share the key the last one
/// wins.
fn assign_comparative_models_to_alignments(result: &mut StartingModels) {
    let mut by_key: HashMap<(String, String), usize> = HashMap::new();
    for (i, m) in result.models.iter().enumerate() {
        if m.comparative {
            let _ = by_key.insert((m.dataset_id.clone(), m.asym_id.clone()), i);
        }
    }
    for alignment in &mut result.alignments {
        let key = (alignment.dataset_id.clone(), alignment.asym_id.clone());
        if let Some(&index) = by_key.get(&key) {
            let _ = alignment.set_comparative_model(index);
        }
    }
}

fn group_entry<'a>(
    grouped: &'a mut BTreeMap<String, StartingModelGroup>,
    resolver: &IdResolver,
    asym_id: &str,
) -> &'a mut StartingModelGroup {
    grouped
        .entry(asym_id.to_string())
        .or_insert_with(|| StartingModelGroup {
            asym_id: asym_id.to_string(),
            name: match resolver.asym_name(asym_id) {
                Some(entity) => format!("{} {}", entity, asym_id),
                None => asym_id.to_string(),
            },
            color: chain_rgba8(asym_id),
            starting_models: Vec::new(),
            alignments: Vec::new(),
            extra_templates: Vec::new(),
        })
}

fn group_by_asym(result: &mut StartingModels, resolver: &IdResolver) {
    let mut grouped: BTreeMap<String, StartingModelGroup> = BTreeMap::new();
    for (i, m) in result.models.iter().enumerate() {
        group_entry(&mut grouped, resolver, &m.asym_id)
            .starting_models
            .push(i);
    }
    for (i, a) in result.alignments.iter().enumerate() {
        group_entry(&mut grouped, resolver, &a.asym_id)
            .alignments
            .push(i);
    }
    for (i, t) in result.extra_templates.iter().enumerate() {
        group_entry(&mut grouped, resolver, &t.asym_id)
            .extra_templates
            .push(i);
    }
    result.groups = grouped.into_values().collect();
}

/// Rigidly places each starting model onto the reference bead model by
/// least-squares fitting its residue centers to the bead centers covering
/// the same residues. Models with fewer than three matched residues stay
/// where they are.
pub fn align_to_sphere_model(
    models: &mut [StartingModel],
    smodel: &SphereModel,
    log: &mut ImportLog,
) {
    for m in models {
        let mut model_points = Vec::new();
        let mut sphere_points = Vec::new();
        for (_, residue, center) in m.model.residue_centers() {
            if let Some(bead) = smodel.residue_sphere(&m.asym_id, residue) {
                model_points.push(center);
                sphere_points.push(smodel.bead(bead).center);
            }
        }
        match align_points(&model_points, &sphere_points) {
            Some((placement, rmsd)) => {
                m.model.placement = placement;
                log.info(format!(
                    "Aligned {}, {} residues, rms {:.4}",
                    m.model.name,
                    model_points.len(),
                    rmsd
                ));
            }
            None => log.warn(
                GeometryError::InsufficientMatchedPoints {
                    name: m.model.name.clone(),
                    matched: model_points.len(),
                }
                .to_string(),
            ),
        }
    }
}
