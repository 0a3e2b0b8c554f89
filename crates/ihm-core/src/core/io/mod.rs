//! Input functionality for IHM import: the annotation-table store, a PDB
//! trajectory reader, and the collaborator seam for external model and map
//! sources.

pub mod cif;
pub mod pdb;
pub mod provider;
