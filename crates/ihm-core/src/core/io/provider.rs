//! Collaborator seam for external model and map sources.
//!
//! An IHM file references data the importer does not parse itself:
//! deposited structures fetched by database code, volume-map files, and
//! DOI-referenced archives. Each operation returns domain objects plus a
//! status message and fails independently; a failed source drops only the
//! affected sub-model, never the import.

use crate::core::io::cif::{CifError, TableStore};
use crate::core::io::pdb::{PdbError, read_pdb_path};
use crate::core::models::atomic::{Atom, AtomicModel};
use crate::core::models::grid::VolumeGrid;
use nalgebra::Point3;
use std::io;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SourceFetchError {
    #[error("I/O error for '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("Cannot read '{path}': unsupported format")]
    UnsupportedFormat { path: String },
    #[error("Remote fetch of {what} is not available")]
    RemoteUnavailable { what: String },
    #[error("Failed to parse '{path}': {message}")]
    Parse { path: String, message: String },
}

impl SourceFetchError {
    fn parse(path: &Path, message: impl ToString) -> Self {
        Self::Parse {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }
}

/// External data sources consumed by the import pipeline.
///
/// Every method returns the loaded domain objects together with a status
/// message describing what was read.
pub trait ModelProvider {
    /// Fetches a deposited structure by database name and accession code.
    fn fetch_structure(
        &self,
        db_name: &str,
        db_code: &str,
    ) -> Result<(Vec<AtomicModel>, String), SourceFetchError>;

    /// Opens an atomic-coordinate file, dispatching on its extension.
    fn open_atomic_file(&self, path: &Path)
    -> Result<(Vec<AtomicModel>, String), SourceFetchError>;

    /// Opens a volume-map file.
    fn open_volume(&self, path: &Path) -> Result<(VolumeGrid, String), SourceFetchError>;

    /// Fetches one member file out of a DOI-referenced archive and opens it
    /// as an atomic-coordinate file.
    fn fetch_doi_archive_file(
        &self,
        doi: &str,
        archive_filename: &str,
    ) -> Result<(Vec<AtomicModel>, String), SourceFetchError>;
}

/// Whether `filename` names a format the atomic readers handle.
pub fn atomic_model_readable(filename: &str) -> bool {
    filename.ends_with(".cif") || filename.ends_with(".pdb")
}

/// Provider serving local `.pdb`/`.cif` files; remote fetches and binary
/// map formats are declined and degrade per the import's skip policy.
#[derive(Debug, Default)]
pub struct FileSystemProvider;

impl ModelProvider for FileSystemProvider {
    fn fetch_structure(
        &self,
        db_name: &str,
        db_code: &str,
    ) -> Result<(Vec<AtomicModel>, String), SourceFetchError> {
        Err(SourceFetchError::RemoteUnavailable {
            what: format!("{} entry {}", db_name, db_code),
        })
    }

    fn open_atomic_file(
        &self,
        path: &Path,
    ) -> Result<(Vec<AtomicModel>, String), SourceFetchError> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());
        let filename = path.to_string_lossy();
        let model = if filename.ends_with(".pdb") {
            read_pdb_path(path, &name).map_err(|e| pdb_fetch_error(path, e))?
        } else if filename.ends_with(".cif") {
            read_mmcif_atoms(path, &name)?
        } else {
            return Err(SourceFetchError::UnsupportedFormat {
                path: filename.into_owned(),
            });
        };
        let message = format!(
            "Opened {} ({} atoms, {} coordinate sets)",
            path.display(),
            model.num_atoms(),
            model.num_coord_sets()
        );
        debug!("{}", message);
        Ok((vec![model], message))
    }

    fn open_volume(&self, path: &Path) -> Result<(VolumeGrid, String), SourceFetchError> {
        // Binary map formats are read by the host application.
        Err(SourceFetchError::UnsupportedFormat {
            path: path.display().to_string(),
        })
    }

    fn fetch_doi_archive_file(
        &self,
        doi: &str,
        archive_filename: &str,
    ) -> Result<(Vec<AtomicModel>, String), SourceFetchError> {
        Err(SourceFetchError::RemoteUnavailable {
            what: format!("archive member {} of DOI {}", archive_filename, doi),
        })
    }
}

fn pdb_fetch_error(path: &Path, error: PdbError) -> SourceFetchError {
    match error {
        PdbError::Io(source) => SourceFetchError::Io {
            path: path.display().to_string(),
            source,
        },
        other => SourceFetchError::parse(path, other),
    }
}

/// Reads the `atom_site` table of an mmCIF file into an [`AtomicModel`].
///
/// Multiple `pdbx_PDB_model_num` blocks become coordinate sets, the same
/// way MODEL blocks do for PDB files.
fn read_mmcif_atoms(path: &Path, name: &str) -> Result<AtomicModel, SourceFetchError> {
    let store = TableStore::read(path, &["atom_site"]).map_err(|e| match e {
        CifError::Io(source) => SourceFetchError::Io {
            path: path.display().to_string(),
            source,
        },
        other => SourceFetchError::parse(path, other),
    })?;
    let table = store
        .table("atom_site")
        .ok_or_else(|| SourceFetchError::parse(path, "no atom_site table"))?;
    let rows = table
        .fields(
            &[
                "label_atom_id",
                "label_comp_id",
                "auth_asym_id",
                "label_asym_id",
                "auth_seq_id",
                "label_seq_id",
                "Cartn_x",
                "Cartn_y",
                "Cartn_z",
                "pdbx_PDB_model_num",
            ],
            true,
        )
        .map_err(|e| SourceFetchError::parse(path, e))?;

    let mut model = AtomicModel::new(name);
    let mut coord_sets: Vec<Vec<Point3<f64>>> = Vec::new();
    let mut current_set: Vec<Point3<f64>> = Vec::new();
    let mut current_model_num: Option<String> = None;

    for row in rows {
        let [atom_name, comp, auth_asym, label_asym, auth_seq, label_seq, x, y, z, model_num] =
            <[String; 10]>::try_from(row)
                .map_err(|_| SourceFetchError::parse(path, "short atom_site row"))?;
        let chain = if auth_asym.is_empty() || auth_asym == "." {
            &label_asym
        } else {
            &auth_asym
        };
        let seq = if auth_seq.is_empty() || auth_seq == "." {
            &label_seq
        } else {
            &auth_seq
        };
        let residue_number: i32 = seq
            .parse()
            .map_err(|_| SourceFetchError::parse(path, format!("bad seq id '{}'", seq)))?;
        let position = Point3::new(
            parse_float(path, &x)?,
            parse_float(path, &y)?,
            parse_float(path, &z)?,
        );

        if current_model_num.as_deref() != Some(model_num.as_str()) {
            if !current_set.is_empty() {
                coord_sets.push(std::mem::take(&mut current_set));
            }
            current_model_num = Some(model_num.clone());
        }
        current_set.push(position);
        if coord_sets.is_empty() {
            let mut atom = Atom::new(&atom_name, chain, residue_number, position);
            atom.residue_name = comp;
            model.atoms.push(atom);
        }
    }
    if !current_set.is_empty() {
        coord_sets.push(current_set);
    }

    if model.atoms.is_empty() {
        return Err(SourceFetchError::parse(path, "atom_site table is empty"));
    }
    if coord_sets.len() > 1 {
        if coord_sets.iter().any(|s| s.len() != model.atoms.len()) {
            return Err(SourceFetchError::parse(
                path,
                "coordinate sets differ in atom count",
            ));
        }
        model.coord_sets = coord_sets;
    }
    Ok(model)
}

fn parse_float(path: &Path, value: &str) -> Result<f64, SourceFetchError> {
    value
        .parse()
        .map_err(|_| SourceFetchError::parse(path, format!("bad coordinate '{}'", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn declines_remote_fetches() {
        let p = FileSystemProvider;
        assert!(matches!(
            p.fetch_structure("PDB", "1XYZ"),
            Err(SourceFetchError::RemoteUnavailable { .. })
        ));
        assert!(matches!(
            p.fetch_doi_archive_file("10.1000/x", "models.zip"),
            Err(SourceFetchError::RemoteUnavailable { .. })
        ));
    }

    #[test]
    fn declines_unknown_extensions() {
        let p = FileSystemProvider;
        assert!(matches!(
            p.open_atomic_file(Path::new("model.xyz")),
            Err(SourceFetchError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            p.open_volume(Path::new("map.mrc")),
            Err(SourceFetchError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn reads_mmcif_atom_site_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.cif");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            "data_model\nloop_\n_atom_site.label_atom_id\n_atom_site.label_comp_id\n\
             _atom_site.auth_asym_id\n_atom_site.auth_seq_id\n\
             _atom_site.Cartn_x\n_atom_site.Cartn_y\n_atom_site.Cartn_z\n\
             CA ALA A 1 1.0 2.0 3.0\nCA GLY A 2 4.0 5.0 6.0"
        )
        .unwrap();
        drop(f);

        let p = FileSystemProvider;
        let (models, _msg) = p.open_atomic_file(&path).unwrap();
        assert_eq!(models.len(), 1);
        let m = &models[0];
        assert_eq!(m.num_atoms(), 2);
        assert_eq!(m.atoms[0].chain_id, "A");
        assert_eq!(m.atoms[1].position, Point3::new(4.0, 5.0, 6.0));
        assert_eq!(m.num_coord_sets(), 1);
    }

    #[test]
    fn missing_file_is_io_error() {
        let p = FileSystemProvider;
        assert!(matches!(
            p.open_atomic_file(Path::new("/nonexistent/m.pdb")),
            Err(SourceFetchError::Io { .. })
        ));
    }
}
