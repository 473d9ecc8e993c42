//! Entry point: parse the CLI, load config and identity, build the
//! shared [`relay::RelayContext`], and run the OR-port listener, the
//! SOCKS listener, and the maintenance sweep side by side until either
//! a fatal error or Ctrl-C.
//!
//! Grounded on the teacher's `main`/`main_main` split
//! (`arti-relay/src/main.rs`): a thin `main` that installs a panic-proof
//! early logger before anything else can fail noisily, then hands off to
//! a `main_main` that can return a `Result` and log its own error on the
//! way out.

mod cli;
mod config;
mod err;
mod exit;
mod identity;
mod listener;
mod logging;
mod netdir;
mod reactor;
mod relay;
mod socks;
mod table;
mod tasks;

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use cli::{Cli, Commands, GlobalArgs};
use config::RelayConfig;
use err::{Error, Result};
use relay::RelayContext;

fn main() {
    let early_guard = logging::init_early(logging::DEFAULT_LOG_LEVEL);
    let cli = Cli::parse();
    if let Err(e) = main_main(cli, early_guard) {
        error!(error = %e, "orcore-relay exiting on error");
        std::process::exit(1);
    }
}

fn main_main(cli: Cli, early_guard: tracing::subscriber::DefaultGuard) -> Result<()> {
    match cli.command {
        Commands::BuildInfo => {
            print_build_info();
            Ok(())
        }
        Commands::Run => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|e| Error::Listen(Arc::new(e)))?;
            runtime.block_on(run(cli.global, early_guard))
        }
    }
}

fn print_build_info() {
    println!("orcore-relay {}", env!("CARGO_PKG_VERSION"));
}

async fn run(global: GlobalArgs, early_guard: tracing::subscriber::DefaultGuard) -> Result<()> {
    let config_path = global.config.clone().or_else(RelayConfig::default_path).ok_or_else(|| {
        Error::Config { path: "<none>".into(), source: Arc::new(std::io::Error::new(std::io::ErrorKind::NotFound, "no config path given and no platform default available")) }
    })?;
    let config = load_or_default_config(&config_path)?;

    let log_level = global
        .log_level
        .map(tracing::metadata::Level::from)
        .unwrap_or(logging::DEFAULT_LOG_LEVEL);
    drop(early_guard);
    let dispatch = logging::dispatch(log_level);
    tracing::dispatcher::set_global_default(dispatch).expect("only main ever installs the full dispatcher");

    let base_dir = config_path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    let identity_path = config.identity_key_path(&base_dir);
    let identity = identity::load_or_generate(&identity_path)?;
    info!(fingerprint = %identity::fingerprint(&identity), nickname = %config.nickname, "identity loaded");

    let routers = netdir::load(&config.routers)?;
    let exit_policy = netdir::parse_exit_policy(&config.exit_policy)
        .map_err(|e| Error::Identity(format!("parsing this relay's own exit policy: {e}")))?;

    let my_addrs = match config.or_listen.ip() {
        std::net::IpAddr::V4(v4) if !v4.is_unspecified() => vec![v4],
        _ => vec![Ipv4Addr::LOCALHOST],
    };

    let ctx = RelayContext::new(config, identity, my_addrs, routers, exit_policy);

    info!(or = %ctx.config.or_listen, socks = %ctx.config.socks_listen, "starting orcore-relay");

    let or_ctx = ctx.clone();
    let or_task = tokio::spawn(async move { listener::serve(or_ctx).await });

    let socks_ctx = ctx.clone();
    let socks_task = tokio::spawn(async move { socks::serve(socks_ctx).await });

    let sweep_ctx = ctx.clone();
    let sweep_task = tokio::spawn(async move {
        tasks::run(sweep_ctx).await;
    });

    tokio::select! {
        res = or_task => {
            sweep_task.abort();
            socks_task.abort();
            res.map_err(|e| Error::Listen(Arc::new(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))))??;
        }
        res = socks_task => {
            sweep_task.abort();
            or_task.abort();
            res.map_err(|e| Error::Socks(Arc::new(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))))??;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl-C, shutting down");
            or_task.abort();
            socks_task.abort();
            sweep_task.abort();
        }
    }

    Ok(())
}

/// Load the config file, tolerating a missing one on first run by
/// falling back to [`RelayConfig::default`] rather than refusing to
/// start — a fresh install has nowhere to have written one yet.
fn load_or_default_config(path: &std::path::Path) -> Result<RelayConfig> {
    match RelayConfig::load(path) {
        Ok(config) => Ok(config),
        Err(Error::Config { source, .. }) if source.downcast_ref::<std::io::Error>().map(|e| e.kind()) == Some(std::io::ErrorKind::NotFound) => {
            info!(path = %path.display(), "no config file found, using defaults");
            Ok(RelayConfig::default())
        }
        Err(e) => Err(e),
    }
}
