//! Startup wiring: config discovery, store and provider construction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use secretsfs_core::SecretStore;
use secretsfs_core::config::Config;
use secretsfs_core::provider::ProviderRegistry;
use secretsfs_providers::{InternalProvider, SecretsProvider, SelfTestProvider, TemplatesProvider};
use secretsfs_vault::VaultStore;

/// Store kinds this binary can construct.
pub const STORE_KINDS: &[&str] = &[secretsfs_vault::STORE_KIND];

const SYSTEM_CONFIG: &str = "/etc/secretsfs/secretsfs.toml";

/// Config file locations in search order.
pub fn config_candidates(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(path) = explicit {
        candidates.push(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os("SFS_CONFIG_FILE").filter(|v| !v.is_empty()) {
        candidates.push(PathBuf::from(path));
    }
    if let Some(home) = std::env::var_os("HOME").filter(|v| !v.is_empty()) {
        candidates.push(PathBuf::from(home).join(".secretsfs").join("secretsfs.toml"));
    }
    candidates.push(PathBuf::from(SYSTEM_CONFIG));
    candidates
}

/// A parsed config plus what happened while finding it.
///
/// Logging is configured from the file, so warnings are collected here and
/// emitted once the subscriber is installed.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: Config,
    pub path: Option<PathBuf>,
    pub warnings: Vec<String>,
}

/// Find, read and parse the config, then apply environment overrides.
///
/// An explicit path that does not exist is an error; otherwise a missing
/// file falls back to defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit
        && !path.exists()
    {
        anyhow::bail!("config file {} does not exist", path.display());
    }

    let mut warnings = Vec::new();
    let found = config_candidates(explicit).into_iter().find(|p| p.is_file());
    let mut config = match &found {
        Some(path) => {
            #[cfg(unix)]
            {
                use std::os::unix::fs::MetadataExt;
                match std::fs::metadata(path) {
                    Ok(meta) if meta.mode() & 0o077 != 0 => warnings.push(format!(
                        "config file {} has mode {:o}, readable by group or others; recommend: chmod 600 {}",
                        path.display(),
                        meta.mode() & 0o777,
                        path.display()
                    )),
                    Ok(_) => {}
                    Err(e) => warnings.push(format!("could not check config file permissions: {e}")),
                }
            }
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("read config {}", path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("parse config {}", path.display()))?
        }
        None => {
            warnings.push("no config file found, using defaults".to_string());
            Config::default()
        }
    };
    config.apply_env();

    Ok(LoadedConfig {
        config,
        path: found,
        warnings,
    })
}

pub fn build_store(config: &Config) -> Result<Arc<dyn SecretStore>> {
    match config.store.kind.as_str() {
        secretsfs_vault::STORE_KIND => {
            let store = VaultStore::from_config(&config.store.vault)
                .context("configure vault_kv store")?;
            Ok(Arc::new(store))
        }
        other => anyhow::bail!("unknown store kind '{other}'"),
    }
}

/// Register every provider this binary ships; the config decides which are
/// enabled.
pub fn build_providers(config: &Config, store: &Arc<dyn SecretStore>) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new(&config.providers.enabled);
    registry.register(Arc::new(SecretsProvider::new(Arc::clone(store))));
    registry.register(Arc::new(TemplatesProvider::new(
        config.providers.templates.roots.clone(),
        Arc::clone(store),
    )));
    registry.register(Arc::new(InternalProvider::new(
        &config.providers.internal,
        Arc::clone(store),
    )));
    registry.register(Arc::new(SelfTestProvider::new()));

    for name in &config.providers.enabled {
        if registry.resolve(name).is_none() {
            tracing::warn!(provider = %name, "enabled provider does not exist, ignoring");
        }
    }
    registry
}

/// Check that `path` is an existing directory.
pub fn validate_mountpoint(path: &Path) -> Result<()> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("mountpoint {}", path.display()))?;
    if !meta.is_dir() {
        anyhow::bail!("mountpoint {} is not a directory", path.display());
    }
    Ok(())
}
