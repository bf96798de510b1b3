//! proxy-panel: management backend with the plugin runtime
//!
//! Usage:
//!   proxy-panel --config panel.toml [--data-dir <dir>] [--listen <addr>] [--log-filter <filter>]

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use proxy_panel::config::PanelConfig;
use proxy_panel::http::{ApiAuth, PanelApp, PanelServer};
use proxy_panel::module::api::{CommandReloader, ContextFactory, CoreApiImpl, EventBus, RouteTable};
use proxy_panel::module::ModuleManager;
use proxy_panel::modules::AuditModule;
use proxy_panel::storage::Storage;
use proxy_panel::utils::{init_logging_from_config, wait_for_shutdown_signal};

#[derive(Parser, Debug)]
#[command(name = "proxy-panel", version, about = "Reverse-proxy management panel")]
struct Args {
    /// Configuration file (.json or .toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root directory for module data, overrides `modules.data_dir`
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Management API address, overrides `http.listen_addr`
    #[arg(long)]
    listen: Option<String>,

    /// Log filter, overrides `logging.filter` (RUST_LOG still wins)
    #[arg(long)]
    log_filter: Option<String>,
}

fn load_config(args: &Args) -> Result<PanelConfig> {
    let mut config = match &args.config {
        Some(path) => PanelConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => PanelConfig::default(),
    };

    if let Some(dir) = &args.data_dir {
        config.modules.data_dir = dir.clone();
    }
    if let Some(listen) = &args.listen {
        config.http.listen_addr = listen.clone();
    }
    if let Some(filter) = &args.log_filter {
        config.logging.filter = Some(filter.clone());
    }
    config.validate()?;
    Ok(config)
}

fn open_storage(config: &PanelConfig) -> Result<Storage> {
    match config.storage.backend.backend() {
        Some(backend) => Storage::with_backend(&config.storage.path, backend),
        None => Storage::new(&config.storage.path),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_logging_from_config(&config.logging);

    info!("proxy-panel {} starting", env!("CARGO_PKG_VERSION"));

    let storage = Arc::new(open_storage(&config)?);
    let events = Arc::new(EventBus::new());
    let routes = Arc::new(RouteTable::new());
    let reloader = Arc::new(CommandReloader::new(config.proxy.reload_command.clone()));
    let core = Arc::new(CoreApiImpl::new(
        Arc::clone(&storage),
        Arc::clone(&events),
        reloader,
    ));
    let contexts = ContextFactory::new(
        config.modules.data_dir.clone(),
        Arc::clone(&events),
        Arc::clone(storage.settings()),
        Arc::clone(&routes),
        core,
    );
    let manager = Arc::new(ModuleManager::new(Arc::clone(&storage), contexts));

    if config.modules.enabled {
        manager.register(Box::new(AuditModule::new())).await?;
    } else {
        info!("Module system disabled by configuration");
    }

    // Init and start failures are fatal
    manager
        .init_all()
        .await
        .context("module initialization failed")?;
    if let Err(e) = manager.start_all().await {
        error!("{}", e);
        for failure in manager.stop_all().await {
            warn!("{}", failure);
        }
        return Err(anyhow::Error::new(e).context("module start failed"));
    }

    let app = PanelApp::new(
        Arc::clone(&manager),
        routes,
        ApiAuth::new(config.http.api_token.clone()),
    );
    let server = PanelServer::bind(config.http.socket_addr()?, app).await?;
    let shutdown = CancellationToken::new();
    let server_task = tokio::spawn(server.serve(shutdown.clone()));

    wait_for_shutdown_signal().await;
    shutdown.cancel();
    match server_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Management API stopped with error: {}", e),
        Err(e) => warn!("Management API task failed: {}", e),
    }

    let failures = manager.stop_all().await;
    if !failures.is_empty() {
        warn!("{} module(s) failed to stop cleanly", failures.len());
    }
    storage.flush()?;
    info!("proxy-panel stopped");
    Ok(())
}
