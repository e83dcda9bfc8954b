//! Layered deployment configuration: built-in defaults, then the TOML file, then
//! `ISTAX_CONFIG_*` environment variables.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use istax_deploy::{CONFIG_FILENAME, DeploymentConfig};

/// Prefix of environment variables overriding configuration keys.
///
/// Nested keys are separated by `__`, e.g. `ISTAX_CONFIG_ISSUER__END_BLOCK=300000`.
const ENV_PREFIX: &str = "ISTAX_CONFIG_";

/// Resolve the configuration file to read.
///
/// An explicit path must exist; a directory stands for the `iStax.toml` inside it. Without a
/// path, `./iStax.toml` is used if present.
fn config_file(path: Option<&Path>) -> Result<Option<PathBuf>> {
    match path {
        Some(path) if path.is_dir() => {
            let file = path.join(CONFIG_FILENAME);
            if !file.exists() {
                anyhow::bail!("No {} in directory {}", CONFIG_FILENAME, path.display());
            }
            Ok(Some(file))
        }
        Some(path) if path.exists() => Ok(Some(path.to_path_buf())),
        Some(path) => anyhow::bail!("Configuration file not found: {}", path.display()),
        None => {
            let file = PathBuf::from(CONFIG_FILENAME);
            Ok(file.exists().then_some(file))
        }
    }
}

/// Load the deployment configuration.
///
/// The result is not validated here; building a plan validates it.
pub fn load_config(path: Option<&Path>) -> Result<DeploymentConfig> {
    let mut figment = Figment::from(Serialized::defaults(DeploymentConfig::default()));

    if let Some(file) = config_file(path)? {
        tracing::info!(path = %file.display(), "Loading deployment configuration");
        figment = figment.merge(Toml::file(file));
    } else {
        tracing::info!("No configuration file, using built-in defaults");
    }

    figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .context("Failed to load deployment configuration")
}
