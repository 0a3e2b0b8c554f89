//! Minimal fixed-column PDB coordinate reader.
//!
//! Reads ATOM/HETATM records plus MODEL/ENDMDL trajectory blocks, which is
//! all the ensemble `.pdb` files linked from an IHM file use. Connectivity,
//! secondary structure, and anisotropic records are ignored.

use crate::core::models::atomic::{Atom, AtomicModel};
use nalgebra::Point3;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PdbError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse {
        line: usize,
        kind: PdbParseErrorKind,
    },
    #[error("Inconsistent data: {0}")]
    Inconsistency(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PdbParseErrorKind {
    #[error("Invalid integer format in columns {columns} (value: '{value}')")]
    InvalidInt { columns: String, value: String },
    #[error("Invalid float format in columns {columns} (value: '{value}')")]
    InvalidFloat { columns: String, value: String },
    #[error("Line is too short for an ATOM/HETATM record (needs 54 columns)")]
    LineTooShort,
}

fn slice_and_trim(line: &str, start: usize, end: usize) -> &str {
    line.get(start..end).unwrap_or("").trim()
}

fn parse_coord(line: &str, line_num: usize, start: usize, end: usize) -> Result<f64, PdbError> {
    let text = slice_and_trim(line, start, end);
    text.parse().map_err(|_| PdbError::Parse {
        line: line_num,
        kind: PdbParseErrorKind::InvalidFloat {
            columns: format!("{}-{}", start + 1, end),
            value: text.into(),
        },
    })
}

/// Reads a PDB file into an [`AtomicModel`] named `name`.
///
/// The first MODEL block (or the whole file, when there are no MODEL
/// records) defines the atom list; later blocks contribute coordinate sets
/// and must carry the same number of atoms.
pub fn read_pdb_path(path: &Path, name: &str) -> Result<AtomicModel, PdbError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    read_pdb(&mut reader, name)
}

pub fn read_pdb(reader: &mut impl BufRead, name: &str) -> Result<AtomicModel, PdbError> {
    let mut model = AtomicModel::new(name);
    let mut coord_sets: Vec<Vec<Point3<f64>>> = Vec::new();
    let mut current_set: Vec<Point3<f64>> = Vec::new();
    let mut first_block_done = false;

    for (line_num, line_res) in reader.lines().enumerate() {
        let line = line_res?;
        let line_num = line_num + 1;
        let record = slice_and_trim(&line, 0, 6);
        match record {
            "MODEL" => {}
            "ENDMDL" => {
                if !current_set.is_empty() {
                    finish_coord_set(&model, &mut coord_sets, std::mem::take(&mut current_set))?;
                    first_block_done = true;
                }
            }
            "ATOM" | "HETATM" => {
                if line.len() < 54 {
                    return Err(PdbError::Parse {
                        line: line_num,
                        kind: PdbParseErrorKind::LineTooShort,
                    });
                }
                let x = parse_coord(&line, line_num, 30, 38)?;
                let y = parse_coord(&line, line_num, 38, 46)?;
                let z = parse_coord(&line, line_num, 46, 54)?;
                let position = Point3::new(x, y, z);
                current_set.push(position);

                if !first_block_done {
                    let atom_name = slice_and_trim(&line, 12, 16);
                    let res_name = slice_and_trim(&line, 17, 20);
                    let chain_id = slice_and_trim(&line, 21, 22);
                    let res_num_str = slice_and_trim(&line, 22, 26);
                    let residue_number: i32 =
                        res_num_str.parse().map_err(|_| PdbError::Parse {
                            line: line_num,
                            kind: PdbParseErrorKind::InvalidInt {
                                columns: "23-26".into(),
                                value: res_num_str.into(),
                            },
                        })?;
                    let mut atom = Atom::new(atom_name, chain_id, residue_number, position);
                    atom.residue_name = res_name.to_string();
                    model.atoms.push(atom);
                }
            }
            "END" => break,
            _ => {}
        }
    }

    if !current_set.is_empty() {
        finish_coord_set(&model, &mut coord_sets, current_set)?;
    }

    if model.atoms.is_empty() {
        return Err(PdbError::Inconsistency(format!(
            "No ATOM records in '{}'",
            name
        )));
    }
    // A single-conformation file keeps its positions on the atoms alone.
    if coord_sets.len() > 1 {
        model.coord_sets = coord_sets;
    }
    Ok(model)
}

fn finish_coord_set(
    model: &AtomicModel,
    coord_sets: &mut Vec<Vec<Point3<f64>>>,
    set: Vec<Point3<f64>>,
) -> Result<(), PdbError> {
    if !model.atoms.is_empty() && set.len() != model.atoms.len() {
        return Err(PdbError::Inconsistency(format!(
            "Coordinate set {} has {} atoms, expected {}",
            coord_sets.len() + 1,
            set.len(),
            model.atoms.len()
        )));
    }
    coord_sets.push(set);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn atom_line(serial: usize, name: &str, chain: &str, resnum: i32, x: f64) -> String {
        format!(
            "ATOM  {:>5} {:<4} ALA {}{:>4}    {:8.3}{:8.3}{:8.3}  1.00  0.00",
            serial, name, chain, resnum, x, 0.0, 0.0
        )
    }

    #[test]
    fn reads_single_conformation_atoms() {
        let text = format!(
            "{}\n{}\nEND\n",
            atom_line(1, "CA", "A", 1, 1.5),
            atom_line(2, "CA", "B", 2, -2.25)
        );
        let mut reader = Cursor::new(text.into_bytes());
        let m = read_pdb(&mut reader, "test").unwrap();
        assert_eq!(m.num_atoms(), 2);
        assert_eq!(m.num_coord_sets(), 1);
        assert_eq!(m.atoms[0].chain_id, "A");
        assert_eq!(m.atoms[1].residue_number, 2);
        assert_eq!(m.atoms[1].position, Point3::new(-2.25, 0.0, 0.0));
    }

    #[test]
    fn model_blocks_become_coordinate_sets() {
        let text = format!(
            "MODEL        1\n{}\n{}\nENDMDL\nMODEL        2\n{}\n{}\nENDMDL\nEND\n",
            atom_line(1, "CA", "A", 1, 0.0),
            atom_line(2, "CA", "A", 2, 1.0),
            atom_line(1, "CA", "A", 1, 5.0),
            atom_line(2, "CA", "A", 2, 6.0)
        );
        let mut reader = Cursor::new(text.into_bytes());
        let m = read_pdb(&mut reader, "traj").unwrap();
        assert_eq!(m.num_atoms(), 2);
        assert_eq!(m.num_coord_sets(), 2);
        assert_eq!(m.coord_sets[1][0], Point3::new(5.0, 0.0, 0.0));
        // Atom positions mirror the first set.
        assert_eq!(m.atoms[0].position, Point3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn mismatched_model_sizes_are_inconsistent() {
        let text = format!(
            "MODEL        1\n{}\n{}\nENDMDL\nMODEL        2\n{}\nENDMDL\n",
            atom_line(1, "CA", "A", 1, 0.0),
            atom_line(2, "CA", "A", 2, 1.0),
            atom_line(1, "CA", "A", 1, 5.0)
        );
        let mut reader = Cursor::new(text.into_bytes());
        assert!(matches!(
            read_pdb(&mut reader, "traj"),
            Err(PdbError::Inconsistency(_))
        ));
    }

    #[test]
    fn short_atom_line_is_a_parse_error() {
        let mut reader = Cursor::new(b"ATOM      1  CA  ALA A   1\n".to_vec());
        assert!(matches!(
            read_pdb(&mut reader, "bad"),
            Err(PdbError::Parse {
                kind: PdbParseErrorKind::LineTooShort,
                ..
            })
        ));
    }

    #[test]
    fn empty_file_reports_no_atoms() {
        let mut reader = Cursor::new(b"REMARK nothing here\nEND\n".to_vec());
        assert!(matches!(
            read_pdb(&mut reader, "empty"),
            Err(PdbError::Inconsistency(_))
        ));
    }
}
