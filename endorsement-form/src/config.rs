use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::catalog::FormCatalog;
use crate::error::ConfigError;
use crate::sink::{CsvFileSink, MemorySink, RecordSink};

pub const DEFAULT_CSV_PATH: &str = "policy_endorsements.csv";

/// How the Sheets sink obtains its first access token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionMode {
    /// Browser consent with a loopback redirect.
    LocalServer,
    /// Consent URL printed; the user pastes back the loopback address the
    /// browser was redirected to (the code is read from its query).
    #[default]
    Console,
    /// Pre-provisioned service-account key.
    ServiceAccount,
}

/// Credential file locations. Fixed at configuration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub mode: AcquisitionMode,
    #[serde(default = "default_client_secret_path")]
    pub client_secret_path: PathBuf,
    #[serde(default = "default_token_cache_path")]
    pub token_cache_path: PathBuf,
    #[serde(default = "default_service_account_path")]
    pub service_account_path: PathBuf,
}

fn default_client_secret_path() -> PathBuf {
    PathBuf::from("client_secret.json")
}

fn default_token_cache_path() -> PathBuf {
    PathBuf::from("token.json")
}

fn default_service_account_path() -> PathBuf {
    PathBuf::from("service_account.json")
}

fn default_csv_path() -> PathBuf {
    PathBuf::from(DEFAULT_CSV_PATH)
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            mode: AcquisitionMode::default(),
            client_secret_path: default_client_secret_path(),
            token_cache_path: default_token_cache_path(),
            service_account_path: default_service_account_path(),
        }
    }
}

/// Whether the Sheets sink sends one request per record or one per submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetsWriteMode {
    #[default]
    Batched,
    PerRow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkConfig {
    Csv {
        #[serde(default = "default_csv_path")]
        path: PathBuf,
    },
    GoogleSheets {
        spreadsheet_name: String,
        #[serde(default)]
        write_mode: SheetsWriteMode,
        #[serde(default)]
        credentials: CredentialsConfig,
    },
    Memory,
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::Csv {
            path: default_csv_path(),
        }
    }
}

impl SinkConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            SinkConfig::Csv { path } if path.as_os_str().is_empty() => Err(
                ConfigError::Invalid("csv sink path must not be empty".to_string()),
            ),
            SinkConfig::GoogleSheets {
                spreadsheet_name, ..
            } if spreadsheet_name.trim().is_empty() => Err(ConfigError::Invalid(
                "spreadsheet_name must not be blank".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Build the configured sink. Credentials are not touched until
    /// [`RecordSink::prepare`] or the first append.
    pub fn build(&self) -> Result<Arc<dyn RecordSink>, ConfigError> {
        match self {
            SinkConfig::Csv { path } => {
                info!(path = %path.display(), "Using CSV file sink");
                Ok(Arc::new(CsvFileSink::new(path)))
            }
            SinkConfig::Memory => {
                info!("Using in-memory sink; submissions are not persisted");
                Ok(Arc::new(MemorySink::new()))
            }
            #[cfg(feature = "sheets")]
            SinkConfig::GoogleSheets {
                spreadsheet_name,
                write_mode,
                credentials,
            } => {
                use crate::credentials::CredentialCache;
                use crate::sink::{GoogleSheetsSink, SheetsEndpoints};

                info!(
                    spreadsheet = %spreadsheet_name,
                    mode = ?credentials.mode,
                    "Using Google Sheets sink"
                );
                let client = reqwest::Client::new();
                let tokens = Arc::new(CredentialCache::new(client.clone(), credentials.clone()));
                Ok(Arc::new(GoogleSheetsSink::new(
                    client,
                    tokens,
                    spreadsheet_name.clone(),
                    *write_mode,
                    SheetsEndpoints::default(),
                )))
            }
            #[cfg(not(feature = "sheets"))]
            SinkConfig::GoogleSheets { .. } => Err(ConfigError::Invalid(
                "google_sheets sink requires the `sheets` feature".to_string(),
            )),
        }
    }
}

/// Form catalog plus sink selection: everything the pipeline is configured with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormConfig {
    #[serde(default)]
    pub form: FormCatalog,
    #[serde(default)]
    pub sink: SinkConfig,
}

impl FormConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.form.validate()?;
        self.sink.validate()
    }

    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: FormConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw)
    }
}
