use crate::core::io::cif::{CifError, SchemaError};
use thiserror::Error;

/// An identifier referenced by one table is absent from another. Resolved
/// by skip-and-log, never by aborting the import.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ResolutionError {
    #[error("Crosslink endpoint /{asym_id}:{residue} has no bead or atom")]
    UnresolvedCrosslinkEndpoint { asym_id: String, residue: i32 },
    #[error("Model id {model_id} belongs to no model group")]
    UnknownModelGroup { model_id: String },
    #[error("Ensemble {ensemble_id} references no known model group")]
    UnknownEnsembleGroup { ensemble_id: String },
}

/// Numerical failures in derived geometry; reported as log messages, never
/// raised out of the pipeline.
#[derive(Debug, Error, PartialEq, Clone)]
pub enum GeometryError {
    #[error("Could not align {name} to spheres, {matched} matching residues (need 3)")]
    InsufficientMatchedPoints { name: String, matched: usize },
    #[error("Gaussian component for asym {asym_id} has a singular covariance matrix")]
    SingularCovariance { asym_id: String },
}

/// Errors that terminate the whole import: the input file itself cannot be
/// read, or a required table is missing. Everything else degrades to a
/// smaller result set plus diagnostics.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Failed to read IHM file: {0}")]
    Input(#[from] CifError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}
