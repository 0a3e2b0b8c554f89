//! Crosslink restraint construction.
//!
//! Restraint rows are parsed once into per-type lists, then materialized as
//! pseudobond groups against whichever models can answer an
//! `(asym, residue)` endpoint lookup: sphere-bead models, ensemble
//! trajectories (through the reference bead model), and atomic starting
//! models.

use crate::core::io::cif::TableStore;
use crate::core::models::crosslink::{
    BondSite, Crosslink, CrosslinkRestraintSet, Pseudobond, PseudobondGroup, SiteKey,
};
use crate::core::models::group::ModelGroup;
use crate::core::models::starting::StartingModel;
use crate::engine::log::ImportLog;
use crate::engine::spheres::sphere_model_order;
use std::collections::{HashMap, HashSet};
use tracing::instrument;

/// Crosslinks per restraint type, in input order of first appearance.
pub type CrosslinksByType = Vec<(String, Vec<Crosslink>)>;

/// Reads the restraint table into per-type crosslink lists plus one
/// (initially empty) restraint set per type.
pub fn read_crosslinks(
    store: &TableStore,
    log: &mut ImportLog,
) -> (CrosslinksByType, Vec<CrosslinkRestraintSet>) {
    let Some(table) = store.table("ihm_cross_link_restraint") else {
        return (Vec::new(), Vec::new());
    };
    let rows = match table.fields(
        &[
            "asym_id_1",
            "seq_id_1",
            "asym_id_2",
            "seq_id_2",
            "type",
            "distance_threshold",
        ],
        false,
    ) {
        Ok(rows) => rows,
        Err(e) => {
            log.warn(format!("Ignoring ihm_cross_link_restraint table: {}", e));
            return (Vec::new(), Vec::new());
        }
    };

    let mut xlinks: CrosslinksByType = Vec::new();
    for (row_index, row) in rows.into_iter().enumerate() {
        let [asym1, seq1, asym2, seq2, xltype, threshold] =
            <[String; 6]>::try_from(row).unwrap_or_default();
        let parsed = (|| {
            Some(Crosslink {
                asym1,
                seq1: seq1.parse().ok()?,
                asym2,
                seq2: seq2.parse().ok()?,
                distance_threshold: threshold.parse().ok()?,
            })
        })();
        let Some(crosslink) = parsed else {
            log.warn(format!(
                "Skipping unreadable crosslink restraint row {}",
                row_index + 1
            ));
            continue;
        };
        match xlinks.iter_mut().find(|(t, _)| *t == xltype) {
            Some((_, list)) => list.push(crosslink),
            None => xlinks.push((xltype, vec![crosslink])),
        }
    }

    let sets = xlinks
        .iter()
        .map(|(xltype, list)| CrosslinkRestraintSet::new(xltype, list.len()))
        .collect();
    (xlinks, sets)
}

/// Builds one pseudobond group per restraint type against an endpoint
/// lookup. Restraints whose endpoints collapse onto the same site pair (in
/// either order) are deduplicated; self-edges are dropped; unresolvable
/// endpoints are collected into one diagnostic per group.
pub fn make_crosslink_pseudobonds(
    xlinks: &CrosslinksByType,
    lookup: &dyn Fn(&str, i32) -> Option<BondSite>,
    model_id: &str,
    name_suffix: Option<&str>,
    log: &mut ImportLog,
) -> Vec<PseudobondGroup> {
    let mut groups = Vec::with_capacity(xlinks.len());
    for (xltype, list) in xlinks {
        let mut name = format!("{} {} crosslinks", list.len(), xltype);
        if let Some(suffix) = name_suffix {
            name = format!("{} {}", name, suffix);
        }
        let mut pseudobonds = Vec::new();
        let mut seen: HashSet<(SiteKey, SiteKey)> = HashSet::new();
        let mut missing: Vec<(&str, i32)> = Vec::new();
        for xl in list {
            let site1 = lookup(&xl.asym1, xl.seq1);
            let site2 = lookup(&xl.asym2, xl.seq2);
            match (site1, site2) {
                (Some(s1), Some(s2)) => {
                    if s1.key == s2.key || seen.contains(&(s1.key, s2.key)) {
                        // Both residues fall on one bead, or an earlier
                        // restraint already joined this pair.
                        continue;
                    }
                    let _ = seen.insert((s1.key, s2.key));
                    let _ = seen.insert((s2.key, s1.key));
                    pseudobonds.push(Pseudobond::new(s1, s2, xl.distance_threshold));
                }
                (None, _) => missing.push((&xl.asym1, xl.seq1)),
                (_, None) => missing.push((&xl.asym2, xl.seq2)),
            }
        }
        if !missing.is_empty() {
            let sites = missing
                .iter()
                .map(|(asym, seq)| format!("/{}:{}", asym, seq))
                .collect::<Vec<_>>()
                .join(",");
            log.warn(format!(
                "Missing {} crosslink residues {}",
                missing.len(),
                sites
            ));
        }
        groups.push(PseudobondGroup {
            name,
            crosslink_type: xltype.clone(),
            model_id: model_id.to_string(),
            pseudobonds,
            display: true,
        });
    }
    groups
}

/// Materializes crosslinks on every sphere model and ensemble trajectory
/// and attaches the resulting groups to their restraint sets.
///
/// On the first sphere model, single-residue beads are hidden and only
/// multi-residue beads plus crosslink endpoints stay shown; crosslink
/// groups on all later sphere models start hidden.
#[instrument(skip_all)]
pub fn create_sphere_model_crosslinks(
    xlinks: &CrosslinksByType,
    groups: &mut [ModelGroup],
    sets: &mut [CrosslinkRestraintSet],
    log: &mut ImportLog,
) {
    let order = sphere_model_order(groups);
    let mut built: Vec<PseudobondGroup> = Vec::new();

    for (i, &(gi, si)) in order.iter().enumerate() {
        let model_id = groups[gi].sphere_models[si].ihm_model_id.clone();
        let mut pbgs = {
            let smodel = &groups[gi].sphere_models[si];
            let lookup = |asym: &str, seq: i32| {
                smodel.residue_sphere(asym, seq).map(|id| BondSite {
                    key: SiteKey::Bead(id),
                    position: smodel.bead(id).center,
                })
            };
            make_crosslink_pseudobonds(xlinks, &lookup, &model_id, Some(&model_id), log)
        };
        if i == 0 {
            // Reference model: show only multi-residue beads and the beads
            // crosslinks attach to.
            let endpoint_beads: HashSet<SiteKey> = pbgs
                .iter()
                .flat_map(|g| g.pseudobonds.iter())
                .flat_map(|b| [b.site1.key, b.site2.key])
                .collect();
            let smodel = &mut groups[gi].sphere_models[si];
            let ids: Vec<_> = smodel.beads().map(|(id, _)| id).collect();
            for id in ids {
                let bead = smodel.bead_mut(id);
                bead.display =
                    bead.residue_span() > 1 || endpoint_beads.contains(&SiteKey::Bead(id));
            }
        } else {
            for pbg in &mut pbgs {
                pbg.display = false;
            }
        }
        built.extend(pbgs);
    }

    if let Some(&(rg, rs)) = order.first() {
        let mut emodel_index = 0;
        for gi in 0..groups.len() {
            for ei in 0..groups[gi].ensemble_models.len() {
                let pbgs = {
                    let smodel = &groups[rg].sphere_models[rs];
                    let emodel = &groups[gi].ensemble_models[ei];
                    let model = emodel_index;
                    // Ensemble atoms map onto reference beads positionally.
                    let lookup = |asym: &str, seq: i32| {
                        let bead = smodel.residue_sphere(asym, seq)?;
                        let atom_index = smodel.bead_ordinal(bead)?;
                        let atom = emodel.atoms.get(atom_index)?;
                        Some(BondSite {
                            key: SiteKey::Atom {
                                model,
                                atom: atom_index,
                            },
                            position: atom.position,
                        })
                    };
                    make_crosslink_pseudobonds(xlinks, &lookup, &emodel.name, None, log)
                };
                built.extend(pbgs);
                emodel_index += 1;
            }
        }
    }

    attach_to_sets(built, sets);
}

/// Materializes crosslinks on the atomic starting models. Starting models
/// may lack disordered regions, so some restraints resolve nowhere and are
/// reported rather than drawn.
pub fn create_starting_model_crosslinks(
    xlinks: &CrosslinksByType,
    starting_models: &[StartingModel],
    sets: &mut [CrosslinkRestraintSet],
    log: &mut ImportLog,
) {
    if starting_models.is_empty() {
        return;
    }
    // Principal atom per (asym, residue); a later model providing the same
    // residue shadows an earlier one.
    let mut sites: HashMap<(String, i32), BondSite> = HashMap::new();
    for (mi, sm) in starting_models.iter().enumerate() {
        for ((_, residue), ai) in sm.model.principal_atoms() {
            let _ = sites.insert(
                (sm.asym_id.clone(), residue),
                BondSite {
                    key: SiteKey::Atom { model: mi, atom: ai },
                    position: sm.model.atoms[ai].position,
                },
            );
        }
    }
    let lookup = |asym: &str, seq: i32| sites.get(&(asym.to_string(), seq)).copied();
    let pbgs = make_crosslink_pseudobonds(xlinks, &lookup, "starting models", None, log);
    attach_to_sets(pbgs, sets);
}

fn attach_to_sets(groups: Vec<PseudobondGroup>, sets: &mut [CrosslinkRestraintSet]) {
    for pbg in groups {
        if let Some(set) = sets
            .iter_mut()
            .find(|s| s.crosslink_type == pbg.crosslink_type)
        {
            set.add_groups([pbg]);
        }
    }
}
