//! Descriptor loading from a config directory.

use std::path::{Path, PathBuf};

use crate::{definition::AgentDefinition, error::RegistryError};

/// Read and validate a single descriptor file.
///
/// # Errors
/// Returns `Io` if the file cannot be read, `Validation` if it is malformed.
pub async fn load_definition_file(path: &Path) -> Result<AgentDefinition, RegistryError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    AgentDefinition::from_toml(&content, Some(path))
}

/// Load every `*.toml` descriptor in `dir`, in file-name order.
///
/// Fail-fast: a single malformed descriptor or a duplicate id aborts the
/// whole load.
///
/// # Errors
/// Returns the first `Io` or `Validation` error encountered.
pub async fn load_definitions(dir: &Path) -> Result<Vec<AgentDefinition>, RegistryError> {
    let io_err = |source| RegistryError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    let mut paths: Vec<PathBuf> = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("toml") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut definitions: Vec<AgentDefinition> = Vec::with_capacity(paths.len());
    for path in paths {
        let definition = load_definition_file(&path).await?;
        if definitions.iter().any(|d| d.id == definition.id) {
            return Err(RegistryError::validation(
                path.display().to_string(),
                format!("duplicate agent id `{}`", definition.id),
            ));
        }
        definitions.push(definition);
    }

    tracing::info!(dir = %dir.display(), count = definitions.len(), "Loaded agent definitions");
    Ok(definitions)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn descriptor(id: &str) -> String {
        format!("id = \"{id}\"\nname = \"{id}\"\nrole = \"role\"\nversion = \"1.0.0\"\n")
    }

    #[tokio::test]
    async fn test_loads_in_file_name_order() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("20-beta.toml"), descriptor("beta")).unwrap();
        std::fs::write(dir.path().join("10-alpha.toml"), descriptor("alpha")).unwrap();
        std::fs::write(dir.path().join("README.md"), "ignored").unwrap();

        let defs = load_definitions(dir.path()).await.unwrap();
        let ids: Vec<&str> = defs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "beta"]);
        assert!(defs[0].source.as_ref().unwrap().ends_with("10-alpha.toml"));
    }

    #[tokio::test]
    async fn test_one_malformed_descriptor_aborts_load() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.toml"), descriptor("alpha")).unwrap();
        std::fs::write(dir.path().join("b.toml"), "id = \"Bad Id\"\nname = \"x\"").unwrap();

        let err = load_definitions(dir.path()).await.unwrap_err();
        assert!(matches!(err, RegistryError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_ids_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.toml"), descriptor("alpha")).unwrap();
        std::fs::write(dir.path().join("b.toml"), descriptor("alpha")).unwrap();
        assert!(load_definitions(dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_dir_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = load_definitions(&dir.path().join("nope")).await.unwrap_err();
        assert!(matches!(err, RegistryError::Io { .. }));
    }
}
