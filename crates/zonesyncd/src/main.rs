// # zonesyncd - zone reconciliation runner
//
// A thin integration layer over zonesync-core:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Registering providers
// 4. Running the reconciler once for every configured zone
//
// All audit, diff, ordering and execution logic lives in zonesync-core.
//
// ## Configuration
//
// - `ZONESYNC_CONFIG`: Path to the JSON zone configuration (required)
// - `ZONESYNC_MODE`: `preview` (default) or `push`
// - `ZONESYNC_ZONES`: Comma-separated list of zones to run (default: all)
// - `ZONESYNC_LOG_LEVEL`: trace, debug, info (default), warn, error
//
// ## Example
//
// ```bash
// export ZONESYNC_CONFIG=/etc/zonesync/zones.json
// export ZONESYNC_MODE=push
// export ZONESYNC_ZONES=example.com,example.net
//
// zonesyncd
// ```
//
// SIGINT/SIGTERM stop execution between corrections; the next run picks up
// the remaining work.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use zonesync_core::engine::{EngineEvent, Mode, Reconciler, ZoneJob};
use zonesync_core::{MemoryProviderFactory, ProviderRegistry, ZonesyncConfig};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ZonesyncExitCode {
    /// Every zone reconciled (or previewed) cleanly
    Clean = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
    /// At least one zone failed
    ZoneFailures = 3,
}

impl From<ZonesyncExitCode> for ExitCode {
    fn from(code: ZonesyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Runner configuration
#[derive(Debug)]
struct Config {
    config_path: PathBuf,
    mode: String,
    zones: Vec<String>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            config_path: env::var("ZONESYNC_CONFIG")
                .context("ZONESYNC_CONFIG is required. Set it via: export ZONESYNC_CONFIG=/path/to/zones.json")?
                .into(),
            mode: env::var("ZONESYNC_MODE").unwrap_or_else(|_| "preview".to_string()),
            zones: parse_zone_list(&env::var("ZONESYNC_ZONES").unwrap_or_default()),
            log_level: env::var("ZONESYNC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.config_path.as_os_str().is_empty() {
            anyhow::bail!("ZONESYNC_CONFIG cannot be empty");
        }
        if !self.config_path.exists() {
            anyhow::bail!("ZONESYNC_CONFIG file does not exist: {}", self.config_path.display());
        }

        self.mode()?;
        self.level()?;
        Ok(())
    }

    fn mode(&self) -> Result<Mode> {
        self.mode.parse::<Mode>().map_err(|_| {
            anyhow::anyhow!(
                "ZONESYNC_MODE '{}' is not valid. Valid modes: preview, push",
                self.mode
            )
        })
    }

    fn level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "ZONESYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }
}

fn parse_zone_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_end_matches('.').to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Registry with every provider this binary ships
fn build_registry() -> ProviderRegistry {
    let registry = ProviderRegistry::new();

    registry.register_provider("memory", Box::new(MemoryProviderFactory));

    #[cfg(feature = "cloudns")]
    zonesync_provider_cloudns::register(&registry);

    registry
}

/// Load and validate the zone configuration, then build one job per zone
fn prepare(config: &Config) -> Result<(Arc<Reconciler>, mpsc::Receiver<EngineEvent>, Vec<ZoneJob>)> {
    let zones = ZonesyncConfig::from_file(&config.config_path)
        .with_context(|| format!("Failed to read {}", config.config_path.display()))?;
    zones.validate()?;

    let registry = Arc::new(build_registry());
    debug!("Registered providers: {}", registry.list_providers().join(", "));

    let (reconciler, events) = Reconciler::new(registry, zones.engine.clone())?;
    let jobs = reconciler.jobs_from_config(&zones, &config.zones)?;

    Ok((Arc::new(reconciler), events, jobs))
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return ZonesyncExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return ZonesyncExitCode::ConfigError.into();
    }

    let log_level = config.level().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ZonesyncExitCode::ConfigError.into();
    }

    let mode = match config.mode() {
        Ok(mode) => mode,
        Err(e) => {
            error!("{:#}", e);
            return ZonesyncExitCode::ConfigError.into();
        }
    };

    let (reconciler, events, jobs) = match prepare(&config) {
        Ok(prepared) => prepared,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return ZonesyncExitCode::ConfigError.into();
        }
    };

    info!("Starting zonesyncd in {:?} mode for {} zone(s)", mode, jobs.len());

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return ZonesyncExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run(reconciler, events, jobs, mode).await {
            Ok(0) => ZonesyncExitCode::Clean,
            Ok(failed) => {
                error!("{} zone(s) failed", failed);
                ZonesyncExitCode::ZoneFailures
            }
            Err(e) => {
                error!("Runtime error: {:#}", e);
                ZonesyncExitCode::RuntimeError
            }
        }
    });

    result.into()
}

/// Reconcile every job and report per-zone results
///
/// # Returns
///
/// The number of zones that did not reach their desired state.
async fn run(
    reconciler: Arc<Reconciler>,
    mut events: mpsc::Receiver<EngineEvent>,
    jobs: Vec<ZoneJob>,
    mode: Mode,
) -> Result<usize> {
    let (cancel_tx, cancel_rx) = watch::channel(false);

    let event_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!("Engine event: {:?}", event);
        }
    });

    let signal_task = tokio::spawn(async move {
        match wait_for_shutdown().await {
            Ok(signal) => {
                warn!("Received {}, stopping after the current correction", signal);
                let _ = cancel_tx.send(true);
            }
            Err(e) => error!("Signal handling unavailable: {:#}", e),
        }
    });

    let results = reconciler.reconcile_all(jobs, mode, cancel_rx).await;
    signal_task.abort();

    let mut failed = 0;
    for (zone, result) in &results {
        match result {
            Ok(outcome) => match &outcome.execution {
                None => info!("{}: {} (preview)", zone, outcome.plan.summary()),
                Some(report) if report.is_complete() => {
                    info!("{}: applied {} correction(s)", zone, report.applied)
                }
                Some(report) => {
                    failed += 1;
                    warn!(
                        "{}: stopped after {} of {} correction(s): {:?}",
                        zone, report.applied, outcome.plan.change_count, report.outcome
                    );
                }
            },
            Err(e) => {
                failed += 1;
                error!("{}: {}", zone, e);
            }
        }
    }

    // The reconciler owns the event sender; dropping it ends the event task
    drop(reconciler);
    if let Err(e) = event_task.await {
        warn!("Event task ended abnormally: {}", e);
    }

    Ok(failed)
}

/// Wait for a shutdown signal (SIGTERM, SIGINT)
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

/// Wait for a shutdown signal (Ctrl-C only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn config(path: PathBuf) -> Config {
        Config {
            config_path: path,
            mode: "preview".to_string(),
            zones: Vec::new(),
            log_level: "info".to_string(),
        }
    }

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parse_zone_list() {
        assert_eq!(
            parse_zone_list(" Example.com., example.net ,,"),
            vec!["example.com".to_string(), "example.net".to_string()]
        );
        assert!(parse_zone_list("").is_empty());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let file = write_config("{}");

        let mut cfg = config(file.path().to_path_buf());
        assert!(cfg.validate().is_ok());

        cfg.mode = "apply".to_string();
        assert!(cfg.validate().is_err());

        cfg.mode = "PUSH".to_string();
        cfg.log_level = "verbose".to_string();
        assert!(cfg.validate().is_err());

        let missing = config(PathBuf::from("/nonexistent/zonesync.json"));
        assert!(missing.validate().is_err());
    }

    #[test]
    fn test_registry_ships_memory_provider() {
        let registry = build_registry();
        assert!(registry.has_provider("memory"));
        #[cfg(feature = "cloudns")]
        assert!(registry.has_provider("cloudns"));
    }

    #[test]
    fn test_prepare_builds_jobs_from_file() {
        let file = write_config(
            r#"{
                "providers": {"lab": {"type": "memory"}},
                "zones": [
                    {"name": "example.com", "provider": "lab",
                     "records": [{"name": "www", "type": "A", "address": "192.0.2.1"}]},
                    {"name": "example.net", "provider": "lab"}
                ]
            }"#,
        );

        let mut cfg = config(file.path().to_path_buf());
        let (_reconciler, _events, jobs) = prepare(&cfg).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].desired.len(), 1);

        cfg.zones = vec!["example.net".to_string()];
        let (_reconciler, _events, jobs) = prepare(&cfg).unwrap();
        assert_eq!(jobs.len(), 1);
    }

    #[test]
    fn test_prepare_rejects_invalid_config() {
        let file = write_config(r#"{"providers": {}, "zones": []}"#);
        assert!(prepare(&config(file.path().to_path_buf())).is_err());
    }

    #[tokio::test]
    async fn test_run_counts_failed_zones() {
        let file = write_config(
            r#"{
                "providers": {"lab": {"type": "memory"}},
                "zones": [
                    {"name": "good.example", "provider": "lab",
                     "records": [{"name": "www", "type": "A", "address": "192.0.2.1"}]},
                    {"name": "bad.example", "provider": "lab",
                     "records": [{"name": "@", "type": "MX", "preference": 0, "exchange": "."}]}
                ]
            }"#,
        );

        let (reconciler, events, jobs) = prepare(&config(file.path().to_path_buf())).unwrap();
        let failed = run(reconciler, events, jobs, Mode::Push).await.unwrap();
        assert_eq!(failed, 1);
    }
}
