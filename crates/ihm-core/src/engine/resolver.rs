//! Identifier resolution across annotation tables.
//!
//! IHM tables reference each other through string ids: models belong to
//! model groups, ensembles reference model groups, datasets fan out to asym
//! ids, and asym ids carry entity descriptions. The resolver joins these
//! once up front so the pipeline stages ask simple questions instead of
//! re-scanning tables.

use crate::core::io::cif::{Table, TableStore, is_placeholder};
use std::collections::HashMap;
use tracing::warn;

/// Precomputed identifier joins over the table store. Lookups on absent
/// ids return `None` or an empty slice, never an error; a malformed
/// optional table is reported and contributes nothing.
#[derive(Debug, Default)]
pub struct IdResolver {
    asym_names: HashMap<String, String>,
    dataset_asyms: HashMap<String, Vec<(String, String)>>,
    model_group: HashMap<String, String>,
    group_names: HashMap<String, String>,
    model_names: HashMap<String, String>,
    ensemble_groups: HashMap<String, (String, usize)>,
}

impl IdResolver {
    pub fn build(store: &TableStore) -> Self {
        let mut resolver = Self::default();
        if let Some(table) = store.table("ihm_struct_assembly") {
            resolver.read_asym_names(table);
        }
        if let Some(table) = store.table("ihm_model_list") {
            resolver.read_model_list(table);
        }
        if let Some(table) = store.table("ihm_ensemble_info") {
            resolver.read_ensemble_info(table);
        }
        if let Some(table) = store.table("ihm_starting_model_details") {
            resolver.read_dataset_asyms(table);
        }
        resolver
    }

    fn read_asym_names(&mut self, table: &Table) {
        match table.fields(&["entity_description", "asym_id"], false) {
            Ok(rows) => {
                for row in rows {
                    let [description, asym_id] = two(row);
                    let _ = self.asym_names.insert(asym_id, description);
                }
            }
            Err(e) => warn!("Ignoring ihm_struct_assembly table: {}", e),
        }
    }

    fn read_model_list(&mut self, table: &Table) {
        let Ok(rows) = table.fields(
            &["model_id", "model_name", "model_group_id", "model_group_name"],
            true,
        ) else {
            return;
        };
        for row in rows {
            let [model_id, model_name, group_id, group_name] = four(row);
            if !model_name.is_empty() && !is_placeholder(&model_name) {
                let _ = self.model_names.insert(model_id.clone(), model_name);
            }
            if !group_name.is_empty() && !is_placeholder(&group_name) {
                let _ = self.group_names.insert(group_id.clone(), group_name);
            }
            let _ = self.model_group.insert(model_id, group_id);
        }
    }

    fn read_ensemble_info(&mut self, table: &Table) {
        match table.fields(
            &["ensemble_id", "model_group_id", "num_ensemble_models"],
            false,
        ) {
            Ok(rows) => {
                for row in rows {
                    let [ensemble_id, group_id, num_models] = three(row);
                    let count = num_models.parse().unwrap_or(0);
                    let _ = self
                        .ensemble_groups
                        .insert(ensemble_id, (group_id, count));
                }
            }
            Err(e) => warn!("Ignoring ihm_ensemble_info table: {}", e),
        }
    }

    /// Maps each dataset id to the (asym, model-chain) pairs it models.
    ///
    /// When a starting model comes from a deposited database entry the
    /// model chain equals the asym id; for file-backed comparative models
    /// the author chain id identifies the chain inside the file.
    fn read_dataset_asyms(&mut self, table: &Table) {
        let Ok(rows) = table.fields(
            &[
                "asym_id",
                "starting_model_db_code",
                "starting_model_auth_asym_id",
                "dataset_list_id",
            ],
            true,
        ) else {
            return;
        };
        for row in rows {
            let [asym_id, db_code, auth_asym_id, dataset_id] = four(row);
            let model_chain = if db_code == "?" {
                auth_asym_id
            } else {
                asym_id.clone()
            };
            let pairs = self.dataset_asyms.entry(dataset_id).or_default();
            let pair = (asym_id, model_chain);
            if !pairs.contains(&pair) {
                pairs.push(pair);
            }
        }
    }

    /// Entity description for an asym id.
    pub fn asym_name(&self, asym_id: &str) -> Option<&str> {
        self.asym_names.get(asym_id).map(String::as_str)
    }

    /// The (asym, model-chain) pairs a dataset provides coordinates for.
    pub fn dataset_asyms(&self, dataset_id: &str) -> &[(String, String)] {
        self.dataset_asyms
            .get(dataset_id)
            .map_or(&[], Vec::as_slice)
    }

    /// Model group a model id belongs to.
    pub fn model_group_id(&self, model_id: &str) -> Option<&str> {
        self.model_group.get(model_id).map(String::as_str)
    }

    /// Display name of a model group.
    pub fn group_name(&self, group_id: &str) -> Option<&str> {
        self.group_names.get(group_id).map(String::as_str)
    }

    /// Display name of a model id, when the model list names it.
    pub fn model_name(&self, model_id: &str) -> Option<&str> {
        self.model_names.get(model_id).map(String::as_str)
    }

    /// Model group and declared model count of an ensemble id.
    pub fn ensemble_group(&self, ensemble_id: &str) -> Option<(&str, usize)> {
        self.ensemble_groups
            .get(ensemble_id)
            .map(|(gid, n)| (gid.as_str(), *n))
    }
}

fn two(row: Vec<String>) -> [String; 2] {
    <[String; 2]>::try_from(row).unwrap_or_default()
}

fn three(row: Vec<String>) -> [String; 3] {
    <[String; 3]>::try_from(row).unwrap_or_default()
}

fn four(row: Vec<String>) -> [String; 4] {
    <[String; 4]>::try_from(row).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn store(text: &str) -> TableStore {
        let mut reader = Cursor::new(text.as_bytes().to_vec());
        TableStore::from_reader(&mut reader, PathBuf::from("/data"), &[]).unwrap()
    }

    const TABLES: &str = "\
loop_
_ihm_struct_assembly.entity_description
_ihm_struct_assembly.asym_id
Nup84 A
Nup85 B
#
loop_
_ihm_model_list.model_id
_ihm_model_list.model_name
_ihm_model_list.model_group_id
_ihm_model_list.model_group_name
1 'best score' 1 'cluster 1'
2 . 2 'cluster 2'
#
loop_
_ihm_ensemble_info.ensemble_id
_ihm_ensemble_info.model_group_id
_ihm_ensemble_info.num_ensemble_models
1 2 100
#
loop_
_ihm_starting_model_details.asym_id
_ihm_starting_model_details.starting_model_db_code
_ihm_starting_model_details.starting_model_auth_asym_id
_ihm_starting_model_details.dataset_list_id
A ? C 5
B 1XYZ D 6
#
";

    #[test]
    fn joins_asym_names_and_model_groups() {
        let r = IdResolver::build(&store(TABLES));
        assert_eq!(r.asym_name("A"), Some("Nup84"));
        assert_eq!(r.asym_name("Z"), None);
        assert_eq!(r.model_group_id("1"), Some("1"));
        assert_eq!(r.model_group_id("2"), Some("2"));
        assert_eq!(r.model_name("1"), Some("best score"));
        assert_eq!(r.group_name("1"), Some("cluster 1"));
        assert_eq!(r.group_name("2"), Some("cluster 2"));
        assert_eq!(r.ensemble_group("1"), Some(("2", 100)));
        assert_eq!(r.ensemble_group("9"), None);
    }

    #[test]
    fn dataset_chain_uses_auth_asym_for_file_backed_models() {
        let r = IdResolver::build(&store(TABLES));
        // db_code "?" means the dataset file holds the chain under its
        // author id; a deposited entry models the asym id itself.
        assert_eq!(
            r.dataset_asyms("5"),
            &[("A".to_string(), "C".to_string())]
        );
        assert_eq!(
            r.dataset_asyms("6"),
            &[("B".to_string(), "B".to_string())]
        );
        assert!(r.dataset_asyms("7").is_empty());
    }

    #[test]
    fn absent_tables_resolve_to_nothing() {
        let r = IdResolver::build(&store("data_empty\n_entry.id x\n"));
        assert_eq!(r.asym_name("A"), None);
        assert!(r.dataset_asyms("1").is_empty());
        assert_eq!(r.model_group_id("1"), None);
    }
}
