use crate::core::io::provider::{ModelProvider, SourceFetchError};
use crate::core::models::Visible;
use crate::core::models::atomic::{AtomicModel, TrimOutcome};
use crate::core::utils::colors::{chain_rgba8, offset_rgba8};
use std::path::{Path, PathBuf};
use tracing::info;

/// One experimental or comparative atomic model contributing to an asym,
/// with its provenance metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct StartingModel {
    pub model: AtomicModel,
    pub asym_id: String,
    pub auth_asym_id: String,
    pub dataset_id: String,
    pub seq_begin: i32,
    pub seq_end: i32,
    pub comparative: bool,
}

impl Visible for StartingModel {
    fn is_visible(&self) -> bool {
        self.model.display
    }
    fn set_visible(&mut self, visible: bool) {
        self.model.display = visible;
    }
}

/// Key identifying the sequence alignment a template belongs to:
/// (alignment file path, asym id, dataset id).
pub type AlignmentKey = (PathBuf, String, String);

/// A comparative-model template is fetched only when first needed; until
/// then it is a tagged placeholder carrying its database reference.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateState {
    Unresolved {
        db_name: String,
        db_code: String,
        db_asym_id: String,
    },
    Resolved(AtomicModel),
}

/// A template model for a comparative starting model.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateModel {
    pub state: TemplateState,
    pub asym_id: String,
    pub dataset_id: String,
    pub seq_begin: i32,
    pub seq_end: i32,
    /// Back-reference to the owning alignment; lookup only, never drives
    /// ownership.
    pub alignment_ref: Option<AlignmentKey>,
}

impl TemplateModel {
    pub fn new(
        db_name: &str,
        db_code: &str,
        db_asym_id: &str,
        asym_id: &str,
        dataset_id: &str,
    ) -> Self {
        Self {
            state: TemplateState::Unresolved {
                db_name: db_name.to_string(),
                db_code: db_code.to_string(),
                db_asym_id: db_asym_id.to_string(),
            },
            asym_id: asym_id.to_string(),
            dataset_id: dataset_id.to_string(),
            seq_begin: 0,
            seq_end: 0,
            alignment_ref: None,
        }
    }

    pub fn name(&self) -> String {
        match &self.state {
            TemplateState::Unresolved {
                db_code, db_asym_id, ..
            } => format!("Template {} {}", db_code, db_asym_id),
            TemplateState::Resolved(model) => model.name.clone(),
        }
    }

    /// Fetches the referenced structure and replaces the placeholder with
    /// the trimmed, tinted atomic model. A no-op when already resolved.
    pub fn resolve(&mut self, provider: &dyn ModelProvider) -> Result<(), SourceFetchError> {
        let TemplateState::Unresolved {
            db_name,
            db_code,
            db_asym_id,
        } = &self.state
        else {
            return Ok(());
        };
        let (mut models, message) = provider.fetch_structure(db_name, db_code)?;
        info!("{}", message);
        let Some(mut model) = models.drain(..).next() else {
            return Err(SourceFetchError::Parse {
                path: format!("{} {}", db_name, db_code),
                message: "fetch returned no models".to_string(),
            });
        };
        model.name = format!("{} {}", db_code, db_asym_id);
        if let TrimOutcome::ChainNotFound = model.keep_one_chain(db_asym_id) {
            info!("No chain {} in {}", db_asym_id, model.name);
        }
        // Templates get a shifted chain tint to stand apart from the chain
        // they model.
        let color = offset_rgba8(chain_rgba8(&self.asym_id), db_code, 80);
        model.set_uniform_color(color);
        self.state = TemplateState::Resolved(model);
        Ok(())
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self.state, TemplateState::Resolved(_))
    }
}

/// The alignment file backing a comparative model. Owns its template
/// models; the associated comparative model is an index into the import's
/// comparative-model list, set at most once.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceAlignment {
    pub path: PathBuf,
    pub asym_id: String,
    pub dataset_id: String,
    pub templates: Vec<TemplateModel>,
    comparative_model: Option<usize>,
    pub display: bool,
}

impl SequenceAlignment {
    pub fn new(path: &Path, asym_id: &str, dataset_id: &str) -> Self {
        Self {
            path: path.to_path_buf(),
            asym_id: asym_id.to_string(),
            dataset_id: dataset_id.to_string(),
            templates: Vec::new(),
            comparative_model: None,
            display: false,
        }
    }

    pub fn key(&self) -> AlignmentKey {
        (
            self.path.clone(),
            self.asym_id.clone(),
            self.dataset_id.clone(),
        )
    }

    pub fn name(&self) -> String {
        let base = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string());
        format!("Alignment {}", base)
    }

    /// Adds a template and stamps its back-reference to this alignment.
    pub fn add_template(&mut self, mut template: TemplateModel) {
        template.alignment_ref = Some(self.key());
        self.templates.push(template);
    }

    /// Associates the comparative model, once. Returns false (and leaves
    /// the association untouched) when one is already set.
    pub fn set_comparative_model(&mut self, index: usize) -> bool {
        if self.comparative_model.is_some() {
            return false;
        }
        self.comparative_model = Some(index);
        true
    }

    pub fn comparative_model(&self) -> Option<usize> {
        self.comparative_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::atomic::Atom;
    use nalgebra::Point3;

    struct StubProvider;

    impl ModelProvider for StubProvider {
        fn fetch_structure(
            &self,
            _db_name: &str,
            db_code: &str,
        ) -> Result<(Vec<AtomicModel>, String), SourceFetchError> {
            let mut m = AtomicModel::new(db_code);
            m.atoms
                .push(Atom::new("CA", "B", 1, Point3::new(0.0, 0.0, 0.0)));
            m.atoms
                .push(Atom::new("CA", "C", 1, Point3::new(1.0, 0.0, 0.0)));
            Ok((vec![m], format!("Fetched {}", db_code)))
        }
        fn open_atomic_file(
            &self,
            _path: &Path,
        ) -> Result<(Vec<AtomicModel>, String), SourceFetchError> {
            unreachable!()
        }
        fn open_volume(
            &self,
            _path: &Path,
        ) -> Result<(crate::core::models::grid::VolumeGrid, String), SourceFetchError> {
            unreachable!()
        }
        fn fetch_doi_archive_file(
            &self,
            _doi: &str,
            _archive_filename: &str,
        ) -> Result<(Vec<AtomicModel>, String), SourceFetchError> {
            unreachable!()
        }
    }

    #[test]
    fn resolve_replaces_placeholder_with_trimmed_model() {
        let mut tm = TemplateModel::new("PDB", "1ABC", "B", "A", "d1");
        assert!(!tm.is_resolved());
        tm.resolve(&StubProvider).unwrap();
        assert!(tm.is_resolved());
        let TemplateState::Resolved(model) = &tm.state else {
            panic!("expected resolved state");
        };
        assert_eq!(model.num_atoms(), 1);
        assert_eq!(model.atoms[0].chain_id, "B");
        assert_eq!(model.name, "1ABC B");
    }

    #[test]
    fn resolve_is_idempotent() {
        let mut tm = TemplateModel::new("PDB", "1ABC", "B", "A", "d1");
        tm.resolve(&StubProvider).unwrap();
        let before = tm.clone();
        tm.resolve(&StubProvider).unwrap();
        assert_eq!(tm, before);
    }

    #[test]
    fn alignment_stamps_template_back_reference() {
        let mut sam = SequenceAlignment::new(Path::new("/d/align.fasta"), "A", "d1");
        sam.add_template(TemplateModel::new("PDB", "1ABC", "B", "A", "d1"));
        assert_eq!(sam.templates[0].alignment_ref, Some(sam.key()));
    }

    #[test]
    fn comparative_model_is_set_at_most_once() {
        let mut sam = SequenceAlignment::new(Path::new("/d/align.fasta"), "A", "d1");
        assert!(sam.set_comparative_model(3));
        assert!(!sam.set_comparative_model(9));
        assert_eq!(sam.comparative_model(), Some(3));
    }
}
