//! CLI Configuration
//!
//! Layered, later layers winning: `config/default`, `config/local`, the
//! optional `--config` file, then `ARBITRA__SECTION__KEY` environment
//! variables. A `.env` file is loaded first.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use arbitra_escrow::EscrowConfig;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Journal storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Approval policy and notification settings
    #[serde(default)]
    pub escrow: EscrowConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the journal lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local; state is lost on exit
    Memory,
    /// Embedded sled database under `data_dir`
    Sled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            data_dir: default_data_dir(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_backend() -> StorageBackend {
    StorageBackend::Sled
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/arbitra")
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl CliConfig {
    /// Load configuration from environment and optional config file
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        Self::load_from(Path::new("."), config_path)
    }

    /// Like [`CliConfig::load`], resolving `config/` under `root`
    pub fn load_from(root: &Path, config_path: Option<&str>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let layer = |name: &str| root.join("config").join(name).to_string_lossy().into_owned();

        let mut builder = config::Config::builder()
            .add_source(config::File::with_name(&layer("default")).required(false))
            .add_source(config::File::with_name(&layer("local")).required(false));

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("ARBITRA")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let cli_config: CliConfig = builder.build()?.try_deserialize()?;
        Ok(cli_config)
    }
}
