//! Model repository
//!
//! Owns the raw definition texts loaded from disk and the interface entities
//! that validated successfully. A repository belongs to one operation at a
//! time; it has no internal synchronization.

use crate::entity::ModelEntity;
use crate::error::RepositoryError;
use crate::id::ModelId;
use crate::parser::{parse_definitions, ModelParser};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// What loading does with texts loaded earlier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadMode {
    /// Drop previously loaded texts first
    #[default]
    Replace,
    /// Append to previously loaded texts
    Accumulate,
}

/// In-memory set of model definitions and their parsed interfaces
pub struct ModelRepository {
    parser: Arc<dyn ModelParser>,
    load_mode: LoadMode,
    models: BTreeMap<ModelId, ModelEntity>,
    raw_texts: Vec<String>,
}

impl std::fmt::Debug for ModelRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRepository")
            .field("load_mode", &self.load_mode)
            .field("models", &self.models.len())
            .field("raw_texts", &self.raw_texts.len())
            .finish()
    }
}

impl ModelRepository {
    /// Create empty repository backed by `parser`
    #[must_use]
    pub fn new(parser: Arc<dyn ModelParser>) -> Self {
        Self {
            parser,
            load_mode: LoadMode::default(),
            models: BTreeMap::new(),
            raw_texts: Vec::new(),
        }
    }

    /// With load mode
    #[inline]
    #[must_use]
    pub fn with_load_mode(mut self, mode: LoadMode) -> Self {
        self.load_mode = mode;
        self
    }

    /// Current load mode
    #[inline]
    #[must_use]
    pub fn load_mode(&self) -> LoadMode {
        self.load_mode
    }

    /// Read every definition file under `dir` (recursively)
    ///
    /// Returns the number of files read; zero is not an error.
    ///
    /// # Errors
    /// - `RepositoryError::DirectoryNotFound` if `dir` is not a directory
    /// - `RepositoryError::Io` if an entry under `dir` or a file cannot be read;
    ///   nothing is loaded in that case
    pub async fn load_model_content(&mut self, dir: impl AsRef<Path>) -> Result<usize, RepositoryError> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            tracing::error!(dir = %dir.display(), "model directory does not exist");
            return Err(RepositoryError::DirectoryNotFound(dir.to_path_buf()));
        }

        let mut files: Vec<PathBuf> = Vec::new();
        for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(|e| walk_error(dir, e))?;
            if entry.file_type().is_file() && self.parser.can_parse(entry.path()) {
                files.push(entry.into_path());
            }
        }

        let mut texts = Vec::with_capacity(files.len());
        for path in &files {
            let text = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| RepositoryError::io_error(path, e))?;
            tracing::debug!(file = %path.display(), "loaded model definition");
            texts.push(text);
        }

        if self.load_mode == LoadMode::Replace {
            self.raw_texts.clear();
        }
        self.raw_texts.extend(texts);
        tracing::info!(
            dir = %dir.display(),
            files = files.len(),
            total = self.raw_texts.len(),
            "loaded model content"
        );
        Ok(files.len())
    }

    /// Load `dir` and validate everything loaded so far
    ///
    /// On success every parsed interface is added to the repository and the
    /// number of interfaces is returned.
    ///
    /// # Errors
    /// - anything [`Self::load_model_content`] returns
    /// - `RepositoryError::Validation` with every parse issue; models are untouched
    pub async fn validate_models(&mut self, dir: impl AsRef<Path>) -> Result<usize, RepositoryError> {
        self.load_model_content(dir).await?;
        self.validate_loaded().await
    }

    /// Validate the texts currently held
    ///
    /// # Errors
    /// - `RepositoryError::Validation` with every parse issue
    /// - `RepositoryError::DuplicateModel` when accumulating and an interface is already present
    pub async fn validate_loaded(&mut self) -> Result<usize, RepositoryError> {
        let parsed = parse_definitions(self.parser.as_ref(), &self.raw_texts)
            .await
            .map_err(RepositoryError::Validation)?;
        let interfaces = parsed.into_interfaces();

        if self.load_mode == LoadMode::Replace {
            self.models.clear();
        } else if let Some(existing) = interfaces.iter().find(|e| self.models.contains_key(&e.id)) {
            return Err(RepositoryError::DuplicateModel(existing.id.clone()));
        }

        let count = interfaces.len();
        for entity in interfaces {
            self.add_model(entity.id.clone(), entity)?;
        }
        tracing::info!(interfaces = count, "validated models");
        Ok(count)
    }

    /// Replace held texts with `texts` (or append, when accumulating)
    pub fn load_texts(&mut self, texts: impl IntoIterator<Item = String>) {
        if self.load_mode == LoadMode::Replace {
            self.raw_texts.clear();
        }
        self.raw_texts.extend(texts);
    }

    /// Insert a parsed entity
    ///
    /// # Errors
    /// - `RepositoryError::DuplicateModel` if `id` is already present
    /// - `RepositoryError::KeyMismatch` if `id` is not `entity.id`
    pub fn add_model(&mut self, id: ModelId, entity: ModelEntity) -> Result<(), RepositoryError> {
        if id != entity.id {
            return Err(RepositoryError::KeyMismatch {
                key: id,
                entity: entity.id,
            });
        }
        if self.models.contains_key(&id) {
            return Err(RepositoryError::DuplicateModel(id));
        }
        self.models.insert(id, entity);
        Ok(())
    }

    /// Validated interfaces
    #[inline]
    #[must_use]
    pub fn models(&self) -> &BTreeMap<ModelId, ModelEntity> {
        &self.models
    }

    /// Raw definition texts
    #[inline]
    #[must_use]
    pub fn models_content(&self) -> &[String] {
        &self.raw_texts
    }

    /// Top-level definition documents held, one per interface document
    ///
    /// # Errors
    /// - `RepositoryError::Json` if a held text is not JSON
    pub fn definition_documents(&self) -> Result<Vec<Value>, RepositoryError> {
        let mut documents = Vec::new();
        for (index, text) in self.raw_texts.iter().enumerate() {
            match serde_json::from_str::<Value>(text)
                .map_err(|source| RepositoryError::Json { index, source })?
            {
                Value::Array(items) => documents.extend(items),
                other => documents.push(other),
            }
        }
        Ok(documents)
    }

    /// Drop all texts and models
    pub fn clear(&mut self) {
        self.models.clear();
        self.raw_texts.clear();
    }
}

fn walk_error(root: &Path, err: walkdir::Error) -> RepositoryError {
    let path = err.path().unwrap_or(root).to_path_buf();
    let message = err.to_string();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other(message));
    tracing::error!(path = %path.display(), "failed to read model directory entry: {source}");
    RepositoryError::io_error(path, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::DtdlParser;

    fn repository() -> ModelRepository {
        ModelRepository::new(Arc::new(DtdlParser::new()))
    }

    fn id(s: &str) -> ModelId {
        s.parse().unwrap()
    }

    #[test]
    fn add_model_rejects_duplicates() {
        let mut repo = repository();
        let entity = ModelEntity::interface(id("dtmi:t:Room;1"));

        repo.add_model(entity.id.clone(), entity.clone()).unwrap();
        let err = repo.add_model(entity.id.clone(), entity).unwrap_err();
        assert!(matches!(err, RepositoryError::DuplicateModel(dup) if dup == id("dtmi:t:Room;1")));
    }

    #[test]
    fn add_model_rejects_mismatched_key() {
        let mut repo = repository();
        let err = repo
            .add_model(id("dtmi:t:A;1"), ModelEntity::interface(id("dtmi:t:B;1")))
            .unwrap_err();
        assert!(matches!(err, RepositoryError::KeyMismatch { .. }));
        assert!(repo.models().is_empty());
    }

    #[test]
    fn load_texts_respects_mode() {
        let mut replace = repository();
        replace.load_texts(vec!["a".to_string()]);
        replace.load_texts(vec!["b".to_string()]);
        assert_eq!(replace.models_content(), ["b".to_string()]);

        let mut accumulate = repository().with_load_mode(LoadMode::Accumulate);
        accumulate.load_texts(vec!["a".to_string()]);
        accumulate.load_texts(vec!["b".to_string()]);
        assert_eq!(accumulate.models_content().len(), 2);
    }

    #[test]
    fn definition_documents_flatten_arrays() {
        let mut repo = repository();
        repo.load_texts(vec![
            r#"[{"@id":"dtmi:t:A;1"},{"@id":"dtmi:t:B;1"}]"#.to_string(),
            r#"{"@id":"dtmi:t:C;1"}"#.to_string(),
        ]);
        let docs = repo.definition_documents().unwrap();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[2]["@id"], "dtmi:t:C;1");
    }

    #[test]
    fn clear_empties_everything() {
        let mut repo = repository();
        repo.load_texts(vec!["x".to_string()]);
        repo.add_model(id("dtmi:t:A;1"), ModelEntity::interface(id("dtmi:t:A;1")))
            .unwrap();
        repo.clear();
        assert!(repo.models().is_empty());
        assert!(repo.models_content().is_empty());
    }
}
