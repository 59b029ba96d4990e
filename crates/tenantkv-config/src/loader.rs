use crate::{ConfigError, KvConfig};
use config::{Config, Environment, File};
use std::path::{Path, PathBuf};

/// File read when no explicit path is given.
pub const DEFAULT_CONFIG_FILE: &str = "tenantkv.toml";

/// Prefix for environment overrides, e.g. `TENANTKV__REDIS__URL`.
pub const ENV_PREFIX: &str = "TENANTKV";

/// Load `.env` from the working directory if present.
///
/// A missing file is not an error; anything else is logged and ignored.
pub fn load_dotenv() {
    report_dotenv(dotenvy::dotenv().map(|_| ()));
}

/// Load variables from a specific env file. Variables already set win.
pub fn load_dotenv_from<P: AsRef<Path>>(path: P) {
    report_dotenv(dotenvy::from_path(path.as_ref()));
}

fn report_dotenv(result: Result<(), dotenvy::Error>) {
    if let Err(e) = result {
        if !e.not_found() {
            tracing::warn!(error = %e, "Failed to load .env file");
        }
    }
}

/// Load configuration from an optional TOML file plus environment overrides.
///
/// A path that does not exist is skipped, so a deployment can run from
/// environment variables alone.
pub fn load_config<P: AsRef<Path>>(path: Option<P>) -> Result<KvConfig, ConfigError> {
    load_with_environment(path, default_environment())
}

fn default_environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .try_parsing(true)
        .separator("__")
}

pub(crate) fn load_with_environment<P: AsRef<Path>>(
    path: Option<P>,
    environment: Environment,
) -> Result<KvConfig, ConfigError> {
    let pathbuf = match path {
        Some(p) => p.as_ref().to_path_buf(),
        None => PathBuf::from(DEFAULT_CONFIG_FILE),
    };

    let mut builder = Config::builder();
    if pathbuf.exists() {
        builder = builder.add_source(File::from(pathbuf.clone()));
    } else {
        tracing::debug!(path = %pathbuf.display(), "config file not found, using defaults");
    }
    builder = builder.add_source(environment);

    let merged: KvConfig = builder.build()?.try_deserialize()?;
    merged.validate()?;

    tracing::debug!(
        path = %pathbuf.display(),
        redis_disabled = merged.redis.disabled,
        "configuration loaded"
    );
    Ok(merged)
}
