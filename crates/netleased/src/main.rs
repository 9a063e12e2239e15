// # netleased - Lease-Driven Settings Daemon
//
// The netleased daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing the runtime and the reconciliation engine
// 3. Registering devices with the acquisition service
// 4. Driving lease completions into reconciliation passes
//
// This is a thin integration layer: arbitration, apply-state tracking
// and the acquisition protocol live in netlease-core, script execution
// in netlease-script.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Settings scripts
// - `NETLEASE_HOSTNAME_INSTALL`: Install script for the hostname
// - `NETLEASE_HOSTNAME_BACKUP`: Backup script for the hostname
// - `NETLEASE_HOSTNAME_RESTORE`: Restore script for the hostname
// - `NETLEASE_RESOLVER_INSTALL`: Install script for the resolver
// - `NETLEASE_RESOLVER_BACKUP`: Backup script for the resolver
// - `NETLEASE_RESOLVER_RESTORE`: Restore script for the resolver
//
// ### Devices
// - `NETLEASE_DEVICES`: Comma-separated list of device names
// - `NETLEASE_STATIC_HOSTNAME`: Hostname to acquire statically on the
//   first device at startup (optional)
//
// ### Engine
// - `NETLEASE_EVENT_CHANNEL_CAPACITY`: Engine event queue depth
// - `NETLEASE_LOG_LEVEL`: trace, debug, info, warn, error
//
// ## Example
//
// ```bash
// export NETLEASE_HOSTNAME_INSTALL="/etc/netlease/hostname.sh"
// export NETLEASE_RESOLVER_INSTALL="/etc/netlease/resolver.sh"
// export NETLEASE_DEVICES=eth0,eth1
// export NETLEASE_STATIC_HOSTNAME=worker-1
//
// netleased
// ```

use anyhow::Result;
use std::env;
use std::process::ExitCode;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use netlease_core::{
    AcquisitionService, BuilderRegistry, EngineEvent, LeaseStore, ReconcileEngine, ScriptSet,
    SettingKind, SettingsConfig, StaticNegotiator,
};
use netlease_script::ExecScriptExecutor;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DaemonExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DaemonExitCode> for ExitCode {
    fn from(code: DaemonExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    hostname_scripts: Option<ScriptSet>,
    resolver_scripts: Option<ScriptSet>,
    devices: Vec<String>,
    static_hostname: Option<String>,
    event_channel_capacity: Option<usize>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            hostname_scripts: Self::scripts_from_env("NETLEASE_HOSTNAME"),
            resolver_scripts: Self::scripts_from_env("NETLEASE_RESOLVER"),
            devices: env::var("NETLEASE_DEVICES")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            static_hostname: env::var("NETLEASE_STATIC_HOSTNAME").ok(),
            event_channel_capacity: env::var("NETLEASE_EVENT_CHANNEL_CAPACITY")
                .ok()
                .map(|s| s.parse().unwrap_or(1000)),
            log_level: env::var("NETLEASE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Read one kind's script block from `<prefix>_BACKUP` etc.
    ///
    /// Returns None when not even an install script is set; the kind
    /// then stays disabled.
    fn scripts_from_env(prefix: &str) -> Option<ScriptSet> {
        let backup = env::var(format!("{prefix}_BACKUP")).ok();
        let restore = env::var(format!("{prefix}_RESTORE")).ok();
        let install = env::var(format!("{prefix}_INSTALL")).ok();

        if backup.is_none() && restore.is_none() && install.is_none() {
            return None;
        }
        Some(ScriptSet {
            backup,
            restore,
            install,
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.hostname_scripts.is_none() && self.resolver_scripts.is_none() {
            anyhow::bail!(
                "no settings scripts configured. \
                Set at least one of NETLEASE_HOSTNAME_INSTALL or NETLEASE_RESOLVER_INSTALL"
            );
        }

        if self.devices.is_empty() {
            anyhow::bail!(
                "NETLEASE_DEVICES must contain at least one device. \
                Set it via: export NETLEASE_DEVICES=eth0,eth1"
            );
        }

        for device in &self.devices {
            if !device
                .chars()
                .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
            {
                anyhow::bail!("device name contains invalid characters: '{}'", device);
            }
        }

        if self.static_hostname.as_ref().is_some_and(|h| h.is_empty()) {
            anyhow::bail!("NETLEASE_STATIC_HOSTNAME cannot be empty when set");
        }

        if let Some(capacity) = self.event_channel_capacity
            && capacity == 0
        {
            anyhow::bail!("NETLEASE_EVENT_CHANNEL_CAPACITY must be at least 1");
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "NETLEASE_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Build the core settings config from the script blocks
    fn settings(&self) -> SettingsConfig {
        let mut settings = SettingsConfig::new();
        if let Some(scripts) = &self.hostname_scripts {
            settings.set_scripts(SettingKind::Hostname, scripts.clone());
        }
        if let Some(scripts) = &self.resolver_scripts {
            settings.set_scripts(SettingKind::Resolver, scripts.clone());
        }
        if let Some(capacity) = self.event_channel_capacity {
            settings.engine.event_channel_capacity = capacity;
        }
        settings
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DaemonExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return DaemonExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DaemonExitCode::ConfigError.into();
    }

    info!("Starting netleased daemon");
    info!("Configuration loaded: {} device(s)", config.devices.len());

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DaemonExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {}", e);
            DaemonExitCode::RuntimeError
        } else {
            DaemonExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let settings = config.settings();
    let (mut engine, mut engine_events) = ReconcileEngine::new(
        &settings,
        BuilderRegistry::with_defaults(),
        Box::new(ExecScriptExecutor::new()),
    )?;

    // Lease completions from the negotiation backend
    let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut service = AcquisitionService::new(Box::new(StaticNegotiator::new(done_tx)));

    let mut store = LeaseStore::new();
    for device in &config.devices {
        info!("Managing device: {}", device);
        service.register_device(device);
        store.add_device(device);
    }

    // A statically configured hostname is just another acquisition
    if let Some(hostname) = &config.static_hostname {
        let device = &config.devices[0];
        info!("Acquiring static hostname '{}' on {}", hostname, device);
        service
            .acquire(device, &serde_json::json!({ "hostname": hostname }))
            .await?;
    }

    // Settle whatever is already known before entering the loop
    engine.reconcile_all(&store).await?;

    #[cfg(unix)]
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    #[cfg(unix)]
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    info!("Daemon initialized, entering event loop");

    loop {
        #[cfg(unix)]
        let shutdown = async {
            tokio::select! {
                _ = sigterm.recv() => "SIGTERM",
                _ = sigint.recv() => "SIGINT",
            }
        };
        #[cfg(not(unix))]
        let shutdown = async {
            let _ = tokio::signal::ctrl_c().await;
            "SIGINT"
        };

        tokio::select! {
            completion = done_rx.recv() => {
                let Some(completion) = completion else {
                    warn!("Negotiation backend closed its completion channel");
                    break;
                };
                if service.handle_completion(&mut store, completion) {
                    engine.on_lease_changed(&store).await?;
                }
            }
            event = engine_events.recv() => {
                match event {
                    Some(EngineEvent::PassCompleted { changed, failed }) => {
                        debug!("Pass completed: {} changed, {} failed", changed, failed);
                    }
                    Some(event) => debug!("Engine event: {:?}", event),
                    None => {
                        warn!("Engine event channel closed");
                        break;
                    }
                }
            }
            signal_name = shutdown => {
                info!("Received shutdown signal: {}", signal_name);
                break;
            }
        }
    }

    info!("Shutting down daemon");
    Ok(())
}
