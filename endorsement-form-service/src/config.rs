use endorsement_form::{ConfigError, FormConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "endorsement_form.yaml";
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";

/// Top-level service configuration. The form catalog and sink sections sit
/// beside `bind_address` in the same document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(flatten)]
    pub form: FormConfig,
}

fn default_bind_address() -> String {
    DEFAULT_BIND_ADDRESS.to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            form: FormConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = serde_yaml::from_str(raw)?;
        config.form.validate()?;
        Ok(config)
    }

    /// Load `path`, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use endorsement_form::{SelectionMode, SinkConfig};
    use std::io::Write;

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig::load_or_default(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.bind_address, "0.0.0.0:3000");
    }

    #[test]
    fn form_sections_sit_beside_bind_address() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "bind_address: 127.0.0.1:8080\n\
             form:\n  endorsement_selection_mode: single\n\
             sink:\n  kind: memory"
        )
        .unwrap();

        let config = ServiceConfig::load_or_default(file.path()).unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:8080");
        assert_eq!(
            config.form.form.endorsement_selection_mode,
            SelectionMode::Single
        );
        assert_eq!(config.form.sink, SinkConfig::Memory);
    }

    #[test]
    fn invalid_sink_is_rejected() {
        let err = ServiceConfig::from_yaml("sink:\n  kind: google_sheets\n  spreadsheet_name: ''")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
