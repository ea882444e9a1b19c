mod bootstrap;
mod cli;
mod setup;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use secretsfs_core::config::Config;
use secretsfs_core::inode::InodeRegistry;
use secretsfs_core::provider::ProviderRegistry;
use secretsfs_core::router::Router;
use secretsfs_fuse::MountOptions;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;

use crate::cli::Cli;
use crate::setup::LoadedConfig;

/// Serialises tests that call `env::set_var`.
#[cfg(test)]
pub(crate) static TEST_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());

const EXIT_CONFIG: u8 = 1;
const EXIT_USAGE: u8 = 2;
const EXIT_MOUNT: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let loaded = match setup::load_config(cli.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("secretsfs: {e:#}");
            return ExitCode::from(EXIT_CONFIG);
        }
    };
    let options = MountOptions::parse(cli.options.iter().map(String::as_str));
    init_logging(&loaded.config.general.log_level, options.debug, cli.log_json);

    for warning in &loaded.warnings {
        tracing::warn!("{warning}");
    }
    if let Some(path) = &loaded.path {
        tracing::info!(path = %path.display(), "loaded config");
    }

    match run(cli, loaded, options).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "startup failed");
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

async fn run(cli: Cli, loaded: LoadedConfig, options: MountOptions) -> Result<ExitCode> {
    let config = loaded.config;

    if cli.is_info_query() {
        print_info(&cli, &config)?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(mountpoint) = cli.mountpoint.clone() else {
        eprintln!("secretsfs: a mountpoint is required");
        return Ok(ExitCode::from(EXIT_USAGE));
    };
    if let Err(e) = setup::validate_mountpoint(&mountpoint) {
        eprintln!("secretsfs: {e:#}");
        return Ok(ExitCode::from(EXIT_USAGE));
    }

    // Before any credential or secret is touched.
    bootstrap::secure_bootstrap();

    let store = setup::build_store(&config)?;
    tracing::info!(
        kind = store.kind(),
        addr = %config.store.vault.addr,
        mount = %config.store.vault.mount,
        "store configured"
    );
    let providers = Arc::new(setup::build_providers(&config, &store));
    tracing::info!(enabled = ?providers.enabled_names(), "providers registered");

    let router = Arc::new(Router::new(
        Arc::clone(&providers),
        Arc::new(InodeRegistry::new()),
    ));

    let handle = match secretsfs_fuse::mount(
        router,
        tokio::runtime::Handle::current(),
        &mountpoint,
        &options,
    ) {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "mount failed");
            return Ok(ExitCode::from(EXIT_MOUNT));
        }
    };

    let reload = spawn_reload(providers, cli.config.clone());

    shutdown_signal().await;
    tracing::info!(mountpoint = %handle.mountpoint().display(), "shutting down");
    if let Some(task) = reload {
        task.abort();
    }
    drop(handle);
    Ok(ExitCode::SUCCESS)
}

/// `RUST_LOG` wins over the configured level; `-o debug` adds per-request
/// logging from the FUSE layer.
fn init_logging(level: &str, fuse_debug: bool, json: bool) {
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if fuse_debug && let Ok(directive) = "secretsfs_fuse=debug".parse::<Directive>() {
        filter = filter.add_directive(directive);
    }

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_info(cli: &Cli, config: &Config) -> Result<()> {
    if cli.print_defaults {
        let defaults =
            toml::to_string_pretty(&Config::default()).context("serialise default config")?;
        print!("{defaults}");
    }
    if cli.print_stores {
        for kind in setup::STORE_KINDS {
            println!("{kind}");
        }
    }
    if cli.print_store {
        println!("{}", config.store.kind);
    }
    if cli.print_providers {
        let store = setup::build_store(config)?;
        let registry = setup::build_providers(config, &store);
        print_providers(&registry);
    }
    Ok(())
}

fn print_providers(registry: &ProviderRegistry) {
    for name in registry.names() {
        let state = if registry.is_enabled(&name) {
            "enabled"
        } else {
            "disabled"
        };
        println!("{name:<12} {state}");
    }
}

/// Recompute provider enablement from a fresh config read on every SIGHUP.
#[cfg(unix)]
fn spawn_reload(
    providers: Arc<ProviderRegistry>,
    explicit: Option<PathBuf>,
) -> Option<tokio::task::JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "failed to register SIGHUP handler, reload disabled");
            return None;
        }
    };
    Some(tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            match setup::load_config(explicit.as_deref()) {
                Ok(loaded) => {
                    for warning in &loaded.warnings {
                        tracing::warn!("{warning}");
                    }
                    providers.reload(&loaded.config.providers.enabled);
                    tracing::info!(enabled = ?providers.enabled_names(), "config reloaded");
                }
                Err(e) => {
                    tracing::warn!(error = %format!("{e:#}"), "config reload failed, keeping current providers");
                }
            }
        }
    }))
}

#[cfg(not(unix))]
fn spawn_reload(
    _providers: Arc<ProviderRegistry>,
    _explicit: Option<PathBuf>,
) -> Option<tokio::task::JoinHandle<()>> {
    None
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("failed to register SIGTERM handler: {e}, falling back to SIGINT only");
                ctrl_c.await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}
