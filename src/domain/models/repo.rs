use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::domain::DomainError;

/// Subdirectory under the repository root holding all persisted index state.
pub const DATA_DIR_NAME: &str = ".xtrc";

/// Identity of an indexed repository. The canonical absolute path is the
/// sole identity; the id and collection name are derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoHandle {
    root: PathBuf,
    id: String,
}

impl RepoHandle {
    /// Canonicalizes `path` and derives the repository id. Fails with
    /// `InvalidRepo` when the path is missing or not a directory.
    pub fn resolve(path: &str) -> Result<Self, DomainError> {
        let root = Path::new(path)
            .canonicalize()
            .map_err(|e| DomainError::invalid_repo(format!("{}: {}", path, e)))?;
        if !root.is_dir() {
            return Err(DomainError::invalid_repo(format!(
                "{} is not a directory",
                root.display()
            )));
        }

        let digest = Sha256::digest(root.to_string_lossy().as_bytes());
        let id = format!("{:x}", digest)[..16].to_string();

        Ok(Self { root, id })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path_string(&self) -> String {
        self.root.to_string_lossy().to_string()
    }

    /// Name of this repository's vector collection.
    pub fn collection_name(&self) -> String {
        format!("xtrc_{}", self.id)
    }

    /// `<repo>/.xtrc`, created on demand by the stores.
    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR_NAME)
    }

    pub fn metadata_db_path(&self) -> PathBuf {
        self.data_dir().join("metadata.duckdb")
    }

    pub fn vector_db_path(&self) -> PathBuf {
        self.data_dir().join("vectors.duckdb")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_rejects_missing_path() {
        let err = RepoHandle::resolve("/definitely/not/a/path").unwrap_err();
        assert_eq!(err.code(), "INVALID_REPO");
    }

    #[test]
    fn resolve_derives_stable_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_string_lossy().to_string();

        let a = RepoHandle::resolve(&path).unwrap();
        let b = RepoHandle::resolve(&path).unwrap();

        assert_eq!(a.id(), b.id());
        assert_eq!(a.id().len(), 16);
        assert_eq!(a.collection_name(), format!("xtrc_{}", a.id()));
        assert!(a.data_dir().ends_with(".xtrc"));
    }
}
