use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, anyhow};
use thiserror::Error;

use crate::{
    models::{ConfigOverrides, ImportConfig},
    validation::{ConfigGuardRailError, ConfigWarnings, apply_guard_rails},
};

pub const CONFIG_PATH_ENV: &str = "LEDGERLOAD_CONFIG_PATH";
pub const CONFIG_JSON_ENV: &str = "LEDGERLOAD_CONFIG_JSON";

const DEFAULT_CONFIG_LOCATIONS: &[&str] = &[
    "ledgerload.toml",
    "ledgerload.json",
    "config/ledgerload.toml",
    "config/ledgerload.json",
];

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    Explicit(PathBuf),
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => f.write_str("built-in defaults"),
            ConfigSource::Explicit(path) => write!(f, "{} (--config)", path.display()),
            ConfigSource::EnvPath(path) => write!(f, "{} (${CONFIG_PATH_ENV})", path.display()),
            ConfigSource::EnvInline => write!(f, "${CONFIG_JSON_ENV}"),
            ConfigSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Configuration-related environment variables, captured once.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub config_json: Option<String>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self {
            config_path: non_empty_var(CONFIG_PATH_ENV).map(PathBuf::from),
            config_json: non_empty_var(CONFIG_JSON_ENV),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    /// Explicit file; beats every environment source.
    pub config_path: Option<PathBuf>,
    /// `.env` file to load first. Defaults to `./.env`.
    pub env_file: Option<PathBuf>,
    /// Directory default config locations are resolved against.
    pub search_root: Option<PathBuf>,
    pub overrides: ConfigOverrides,
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: ImportConfig,
    pub source: ConfigSource,
    pub warnings: ConfigWarnings,
    pub env_file_loaded: bool,
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to load configuration from {origin}")]
    Parse {
        origin: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    GuardRail(#[from] ConfigGuardRailError),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn with_search_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.options.search_root = Some(root.into());
        self
    }

    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        self.options.overrides = overrides;
        self
    }

    /// Load `.env`, read the process environment, then resolve.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = self.load_env_file()?;
        let mut load = self.load_with_env(&EnvConfig::gather())?;
        load.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Resolution order:
    /// 1) explicit `config_path`,
    /// 2) `$LEDGERLOAD_CONFIG_PATH` (TOML or JSON file),
    /// 3) `$LEDGERLOAD_CONFIG_JSON` (inline JSON),
    /// 4) the first existing default location,
    /// 5) defaults.
    ///
    /// Overrides are applied last, then guard rails.
    pub fn load_with_env(&self, env_config: &EnvConfig) -> Result<ConfigLoad, ConfigLoadError> {
        let (mut config, source) = self.resolve(env_config)?;
        self.options.overrides.apply(&mut config);
        let warnings = apply_guard_rails(&mut config)?;

        tracing::debug!(source = %source, warnings = warnings.len(), "configuration resolved");
        Ok(ConfigLoad {
            config,
            source,
            warnings,
            env_file_loaded: false,
        })
    }

    fn load_env_file(&self) -> Result<bool, ConfigLoadError> {
        let loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true),
            None => dotenvy::dotenv().map(|_| true),
        };
        match loaded {
            Ok(loaded) => Ok(loaded),
            Err(dotenvy::Error::Io(_)) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn resolve(
        &self,
        env_config: &EnvConfig,
    ) -> Result<(ImportConfig, ConfigSource), ConfigLoadError> {
        if let Some(path) = &self.options.config_path {
            if !path.exists() {
                return Err(ConfigLoadError::MissingConfig { path: path.clone() });
            }
            let config = load_file(path)?;
            return Ok((config, ConfigSource::Explicit(path.clone())));
        }

        if let Some(path) = &env_config.config_path {
            if !path.exists() {
                return Err(ConfigLoadError::MissingConfig { path: path.clone() });
            }
            let config = load_file(path)?;
            return Ok((config, ConfigSource::EnvPath(path.clone())));
        }

        if let Some(raw) = &env_config.config_json {
            let config = parse_json(raw)
                .with_context(|| format!("failed to parse {CONFIG_JSON_ENV}"))
                .map_err(|source| ConfigLoadError::Parse {
                    origin: CONFIG_JSON_ENV.to_string(),
                    source,
                })?;
            return Ok((config, ConfigSource::EnvInline));
        }

        if let Some(path) = self.find_default_file() {
            let config = load_file(&path)?;
            return Ok((config, ConfigSource::File(path)));
        }

        Ok((ImportConfig::default(), ConfigSource::Default))
    }

    fn find_default_file(&self) -> Option<PathBuf> {
        let root = self.options.search_root.as_deref().unwrap_or(Path::new("."));
        DEFAULT_CONFIG_LOCATIONS
            .iter()
            .map(|candidate| root.join(candidate))
            .find(|path| path.exists())
    }
}

fn load_file(path: &Path) -> Result<ImportConfig, ConfigLoadError> {
    read_config(path).map_err(|source| ConfigLoadError::Parse {
        origin: path.display().to_string(),
        source,
    })
}

fn read_config(path: &Path) -> anyhow::Result<ImportConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read import config from {}", path.display()))?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => {
            parse_json(&contents).with_context(|| format!("invalid import config {}", path.display()))
        }
        Some("toml") | Some("tml") => toml::from_str(&contents)
            .map_err(|err| anyhow!("invalid import config {}: {}", path.display(), err)),
        _ => parse_from_str(&contents, &path.display().to_string()),
    }
}

/// Try TOML first, then JSON.
pub fn parse_from_str(contents: &str, origin: &str) -> anyhow::Result<ImportConfig> {
    toml::from_str(contents).or_else(|toml_err| {
        serde_json::from_str(contents).map_err(|json_err| {
            anyhow!(
                "failed to parse import config {}: toml error: {}; json error: {}",
                origin,
                toml_err,
                json_err
            )
        })
    })
}

pub fn parse_json(raw: &str) -> anyhow::Result<ImportConfig> {
    serde_json::from_str(raw).map_err(|err| anyhow!("invalid import config json: {err}"))
}
