// # fleetdnsd - fleetdns Daemon
//
// ⚠️ ARCHITECTURAL CONSTRAINTS ⚠️
//
// - This is a THIN integration layer ONLY
// - DO NOT add rotation logic, DNS logic, or retry logic here
// - All control-plane logic MUST be in fleetdns-core
//
// The fleetdnsd daemon is responsible for:
// 1. Reading configuration (environment plus one JSON file)
// 2. Initializing logging and the runtime
// 3. Registering providers and wiring the components
// 4. Running the rotation engine and the reconcile worker until a signal
//
// ## Configuration
//
// - `FLEETDNS_CONFIG`: Path to the JSON configuration file (required)
// - `FLEETDNS_LOG_LEVEL`: trace, debug, info, warn, error (default: info)
// - `FLEETDNS_TICK_SECS`: Overrides `scheduler.tick_interval_secs`
// - `FLEETDNS_STATE_PATH`: Uses a file state store at this path
// - `FLEETDNS_MODE=dry-run`: Providers log writes instead of sending them
//
// ## Example
//
// ```bash
// export FLEETDNS_CONFIG=/etc/fleetdns/config.json
// export FLEETDNS_STATE_PATH=/var/lib/fleetdns/state.json
//
// fleetdnsd
// ```

use anyhow::{Context, Result};
use fleetdns_core::config::{FleetSourceConfig, StateStoreConfig};
use fleetdns_core::fleet::FleetSnapshot;
use fleetdns_core::membership::MembershipResolver;
use fleetdns_core::nameserver::{HickoryLookup, NameserverStatus, NameserverValidator};
use fleetdns_core::traits::{DnsProvider, GroupRegistry, MachineRegistry, StateStore};
use fleetdns_core::{
    ControlPlane, EngineEvent, FileFleet, FleetDnsConfig, ProviderRegistry, ProviderSet,
    Reconciler, ReconcileWorker, RotationEngine, StaticFleet,
};
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// How long the loops get to finish after a shutdown signal
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum FleetDnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<FleetDnsExitCode> for ExitCode {
    fn from(code: FleetDnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Process settings read from the environment
struct Settings {
    config_path: String,
    log_level: String,
    tick_secs: Option<u64>,
    state_path: Option<String>,
}

impl Settings {
    fn from_env() -> Result<Self> {
        let config_path = env::var("FLEETDNS_CONFIG").context(
            "FLEETDNS_CONFIG is required. \
            Set it via: export FLEETDNS_CONFIG=/etc/fleetdns/config.json",
        )?;

        let tick_secs = match env::var("FLEETDNS_TICK_SECS") {
            Ok(raw) => Some(
                raw.parse()
                    .with_context(|| format!("FLEETDNS_TICK_SECS is not a number: {raw}"))?,
            ),
            Err(_) => None,
        };

        Ok(Self {
            config_path,
            log_level: env::var("FLEETDNS_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            tick_secs,
            state_path: env::var("FLEETDNS_STATE_PATH").ok().filter(|p| !p.is_empty()),
        })
    }

    fn log_level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "FLEETDNS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }

    /// Load the JSON file and apply environment overrides
    fn load_config(&self) -> Result<FleetDnsConfig> {
        let mut config = FleetDnsConfig::from_file(&self.config_path)?;

        if let Some(tick) = self.tick_secs {
            config.scheduler.tick_interval_secs = tick;
        }

        if let Some(path) = &self.state_path {
            if let Some(parent) = std::path::Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                anyhow::bail!(
                    "FLEETDNS_STATE_PATH parent directory does not exist: {}. \
                    Create it first: sudo mkdir -p {}",
                    parent.display(),
                    parent.display()
                );
            }
            config.state_store = StateStoreConfig::File { path: path.clone() };
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    let settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return FleetDnsExitCode::ConfigError.into();
        }
    };

    let log_level = match settings.log_level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return FleetDnsExitCode::ConfigError.into();
        }
    };

    let config = match settings.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration validation error: {:#}", e);
            return FleetDnsExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return FleetDnsExitCode::ConfigError.into();
    }

    info!("Starting fleetdnsd daemon");
    info!(
        accounts = config.providers.len(),
        domains = config.domains.len(),
        "Configuration loaded"
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return FleetDnsExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {:#}", e);
            FleetDnsExitCode::RuntimeError
        } else {
            FleetDnsExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Build the fleet view named by the configuration
fn fleet_view(source: &FleetSourceConfig) -> (Arc<dyn MachineRegistry>, Arc<dyn GroupRegistry>) {
    match source {
        FleetSourceConfig::File { path } => {
            info!(path = %path, "Reading fleet from snapshot file");
            let fleet = Arc::new(FileFleet::new(path));
            (fleet.clone(), fleet)
        }
        FleetSourceConfig::Inline { machines, groups } => {
            info!(machines = machines.len(), groups = groups.len(), "Using inline fleet");
            let fleet = Arc::new(StaticFleet::from_snapshot(FleetSnapshot {
                machines: machines.clone(),
                groups: groups.clone(),
            }));
            (fleet.clone(), fleet)
        }
    }
}

/// Run the daemon
async fn run_daemon(config: FleetDnsConfig) -> Result<()> {
    let registry = ProviderRegistry::with_builtin_stores();

    #[cfg(feature = "cloudflare")]
    {
        info!("Registering Cloudflare provider");
        fleetdns_provider_cloudflare::register(&registry);
    }

    let providers = ProviderSet::build(
        &registry,
        &config.providers,
        config.reconcile.provider_timeout(),
    )?;
    if providers.is_empty() {
        warn!("No provider accounts configured; records will stay pending");
    }
    for account in providers.accounts() {
        let provider = providers.get(&account)?;
        match provider.validate_credentials().await {
            Ok(()) => info!(account = %account, "Provider credentials verified"),
            Err(e) => warn!(account = %account, error = %e, "Provider credentials rejected"),
        }
    }

    let store = registry.create_state_store(&config.state_store).await?;
    info!(store = config.state_store.type_name(), "State store ready");

    let (machines, groups) = fleet_view(&config.fleet);
    let resolver = MembershipResolver::new(
        machines,
        groups,
        config.scheduler.health_freshness(),
    );

    let reconciler = Arc::new(Reconciler::new(store.clone(), providers));
    let (worker, reconcile_handle) = ReconcileWorker::new(
        reconciler.clone(),
        config.reconcile.queue_capacity,
        config.reconcile.pass_interval(),
    );

    let (engine, events) = RotationEngine::new(store.clone(), resolver, &config.scheduler)?;
    let engine = if config.reconcile.push_on_rotate {
        engine.with_reconcile(reconcile_handle)
    } else {
        engine
    };
    let engine = Arc::new(engine);

    let plane = ControlPlane::new(
        engine.clone(),
        reconciler,
        NameserverValidator::new(Arc::new(HickoryLookup::new())),
    );

    // Declared domains, records and pools; repeated starts converge to the same state
    for domain in &config.domains {
        let registered = plane.declare_domain(domain).await?;
        info!(
            domain = %registered.name,
            records = domain.records.len(),
            record_pools = domain.record_pools.len(),
            wildcard_pool = domain.wildcard_pool.is_some(),
            "Domain declared"
        );

        let report = plane.check_nameservers(registered.id).await?;
        match report.status {
            NameserverStatus::Valid => {
                info!(domain = %report.domain, "Nameservers delegated to provider")
            }
            status => warn!(
                domain = %report.domain,
                status = ?status,
                missing = ?report.missing,
                error = ?report.error,
                "Nameservers not fully delegated"
            ),
        }
    }

    let events_task = tokio::spawn(log_events(events));

    let (worker_tx, worker_rx) = oneshot::channel();
    let worker_task = tokio::spawn(worker.run(worker_rx));

    let (engine_tx, engine_rx) = oneshot::channel();
    let engine_task = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run_with_shutdown(Some(engine_rx)).await })
    };

    info!("Daemon initialized successfully");

    let signal = wait_for_shutdown().await?;
    info!("Received shutdown signal: {}", signal);
    info!("Shutting down daemon");

    let _ = engine_tx.send(());
    let _ = worker_tx.send(());

    let stopped = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        let engine_result = engine_task.await;
        let _ = worker_task.await;
        engine_result
    })
    .await
    .map_err(|_| anyhow::anyhow!("Shutdown timeout after {:?}", SHUTDOWN_TIMEOUT))?;

    // The engine owns the last sender; the event stream ends with it
    drop(plane);
    drop(engine);
    let _ = tokio::time::timeout(Duration::from_secs(1), events_task).await;

    stopped??;
    store.flush().await?;
    Ok(())
}

/// Log engine events as they arrive
async fn log_events(events: tokio::sync::mpsc::Receiver<EngineEvent>) {
    let mut stream = ReceiverStream::new(events);
    while let Some(event) = stream.next().await {
        match event {
            EngineEvent::Started { pools } => info!(pools, "Rotation engine started"),
            EngineEvent::Rotated {
                pool_id,
                from_machine_id,
                to_machine_id,
                to_address,
                trigger,
            } => info!(
                pool_id,
                from = ?from_machine_id,
                to = to_machine_id,
                address = %to_address,
                trigger = ?trigger,
                "Pool rotated"
            ),
            EngineEvent::Unchanged { pool_id } => {
                tracing::debug!(pool_id, "Pool kept its target")
            }
            EngineEvent::RotationFailed { pool_id, error } => {
                warn!(pool_id, error = %error, "Rotation failed")
            }
            EngineEvent::TickCompleted { report } => tracing::debug!(?report, "Tick completed"),
            EngineEvent::Stopped { reason } => info!(reason = %reason, "Rotation engine stopped"),
        }
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
