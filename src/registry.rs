//! Server registry
//!
//! On-disk collection of named server configurations: one directory per
//! server under a fixed root, holding a single `config.json`. Every
//! mutation persists the full configuration back to disk; there is no
//! transactional guarantee beyond what the filesystem gives.

use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::debug;

use crate::error::RegistryError;
use crate::model::{ServerConfig, ToolDefinition};

pub struct ServerStore {
    root: PathBuf,
}

impl ServerStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn config_path(&self, name: &str) -> PathBuf {
        self.root.join(name).join("config.json")
    }

    /// Create and persist an empty configuration.
    pub fn create(&self, name: &str) -> Result<ServerConfig, RegistryError> {
        validate_name(name)?;
        if self.config_path(name).exists() {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }
        let config = ServerConfig::empty(name);
        self.save(&config)?;
        Ok(config)
    }

    /// Names of all stored configurations, sorted.
    pub fn list(&self) -> Result<Vec<String>, RegistryError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.config_path(&name).is_file() {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Load a configuration. Absent and unreadable configurations both
    /// report as not found, with the underlying reason attached.
    pub fn load(&self, name: &str) -> Result<ServerConfig, RegistryError> {
        validate_name(name)?;
        let path = self.config_path(name);
        let data = fs::read_to_string(&path).map_err(|e| RegistryError::NotFound {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&data).map_err(|e| RegistryError::NotFound {
            name: name.to_string(),
            reason: format!("malformed configuration: {e}"),
        })
    }

    /// Write the full configuration back to its directory.
    pub fn save(&self, config: &ServerConfig) -> Result<(), RegistryError> {
        let dir = self.root.join(&config.name);
        fs::create_dir_all(&dir)?;
        let data = serde_json::to_string_pretty(config).map_err(io::Error::from)?;
        fs::write(dir.join("config.json"), data)?;
        debug!("Saved server configuration '{}'", config.name);
        Ok(())
    }

    /// Append a tool and persist. Name uniqueness is not enforced here;
    /// updates replace by name.
    pub fn add_tool(
        &self,
        config: &mut ServerConfig,
        mut tool: ToolDefinition,
    ) -> Result<(), RegistryError> {
        tool.sort_steps();
        config.tools.push(tool);
        self.save(config)
    }

    /// Replace the tool named `name` and persist.
    pub fn update_tool(
        &self,
        config: &mut ServerConfig,
        name: &str,
        mut tool: ToolDefinition,
    ) -> Result<(), RegistryError> {
        tool.sort_steps();
        let slot = config
            .tools
            .iter_mut()
            .find(|t| t.name == name)
            .ok_or_else(|| RegistryError::ToolNotFound(name.to_string()))?;
        *slot = tool;
        self.save(config)
    }

    /// Remove the tool named `name` and persist.
    pub fn delete_tool(
        &self,
        config: &mut ServerConfig,
        name: &str,
    ) -> Result<(), RegistryError> {
        let before = config.tools.len();
        config.tools.retain(|t| t.name != name);
        if config.tools.len() == before {
            return Err(RegistryError::ToolNotFound(name.to_string()));
        }
        self.save(config)
    }
}

/// Server names double as directory names; keep them path-safe.
fn validate_name(name: &str) -> Result<(), RegistryError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
    {
        return Err(RegistryError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Step, StepKind};
    use tempfile::TempDir;

    fn store() -> (ServerStore, TempDir) {
        let dir = TempDir::new().expect("temp dir");
        (ServerStore::new(dir.path()), dir)
    }

    fn sample_tool(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            args: vec!["city".to_string()],
            steps: vec![
                Step {
                    kind: StepKind::ReturnData,
                    order: 1,
                    code: "result = driver_title()".to_string(),
                },
                Step {
                    kind: StepKind::LoadPage,
                    order: 0,
                    code: "example.com".to_string(),
                },
            ],
        }
    }

    #[test]
    fn create_rejects_duplicates() {
        let (store, _dir) = store();
        store.create("alpha").unwrap();
        let err = store.create("alpha").unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName(_)));
    }

    #[test]
    fn create_rejects_path_unsafe_names() {
        let (store, _dir) = store();
        assert!(matches!(
            store.create("../escape"),
            Err(RegistryError::InvalidName(_))
        ));
        assert!(matches!(store.create(""), Err(RegistryError::InvalidName(_))));
    }

    #[test]
    fn load_missing_is_not_found() {
        let (store, _dir) = store();
        let err = store.load("ghost").unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
    }

    #[test]
    fn load_malformed_is_not_found() {
        let (store, dir) = store();
        let server_dir = dir.path().join("broken");
        fs::create_dir_all(&server_dir).unwrap();
        fs::write(server_dir.join("config.json"), "{not json").unwrap();
        let err = store.load("broken").unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
    }

    #[test]
    fn add_tool_sorts_steps_and_persists() {
        let (store, _dir) = store();
        let mut config = store.create("alpha").unwrap();
        store.add_tool(&mut config, sample_tool("getTitle")).unwrap();

        let loaded = store.load("alpha").unwrap();
        let steps = &loaded.tools[0].steps;
        assert_eq!(steps[0].kind, StepKind::LoadPage);
        assert_eq!(steps[1].kind, StepKind::ReturnData);
    }

    #[test]
    fn update_tool_replaces_by_name() {
        let (store, _dir) = store();
        let mut config = store.create("alpha").unwrap();
        store.add_tool(&mut config, sample_tool("getTitle")).unwrap();

        let mut replacement = sample_tool("getTitle");
        replacement.args = vec!["date".to_string()];
        store
            .update_tool(&mut config, "getTitle", replacement)
            .unwrap();

        let loaded = store.load("alpha").unwrap();
        assert_eq!(loaded.tools.len(), 1);
        assert_eq!(loaded.tools[0].args, vec!["date".to_string()]);
    }

    #[test]
    fn update_missing_tool_fails() {
        let (store, _dir) = store();
        let mut config = store.create("alpha").unwrap();
        let err = store
            .update_tool(&mut config, "ghost", sample_tool("ghost"))
            .unwrap_err();
        assert!(matches!(err, RegistryError::ToolNotFound(_)));
    }

    #[test]
    fn delete_tool_removes_and_persists() {
        let (store, _dir) = store();
        let mut config = store.create("alpha").unwrap();
        store.add_tool(&mut config, sample_tool("getTitle")).unwrap();
        store.delete_tool(&mut config, "getTitle").unwrap();

        assert!(store.load("alpha").unwrap().tools.is_empty());
        assert!(matches!(
            store.delete_tool(&mut config, "getTitle"),
            Err(RegistryError::ToolNotFound(_))
        ));
    }

    #[test]
    fn list_only_reports_directories_with_configs() {
        let (store, dir) = store();
        store.create("beta").unwrap();
        store.create("alpha").unwrap();
        fs::create_dir_all(dir.path().join("stray")).unwrap();

        assert_eq!(store.list().unwrap(), vec!["alpha", "beta"]);
    }
}
