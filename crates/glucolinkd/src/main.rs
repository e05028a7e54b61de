// # glucolinkd - reading upload daemon
//
// The glucolinkd daemon is a thin integration layer. It is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Wiring the file settings store, NDJSON reading source and Nightscout
//    collector into a `SyncEngine`
// 4. Running the engine until SIGTERM / SIGINT
//
// All verification and upload logic lives in glucolink-core.
//
// ## Configuration
//
// ### Storage
// - `GLUCOLINK_SETTINGS_PATH`: Settings file (required)
// - `GLUCOLINK_READINGS_PATH`: NDJSON file of recorded readings (required)
//
// ### Engine
// - `GLUCOLINK_SYNC_INTERVAL_SECS`: Periodic sync interval, 0 disables (default 0)
// - `GLUCOLINK_HTTP_TIMEOUT_SECS`: Per-request timeout (default 30)
// - `GLUCOLINK_MAX_READINGS`: Readings per upload (default 2016)
// - `GLUCOLINK_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ### Setting overrides
//
// Written through the settings store once the engine runs, so they take the
// same verify-then-sync path as any other change.
//
// - `GLUCOLINK_URL`: Collector base URL
// - `GLUCOLINK_API_KEY`: Collector API key
// - `GLUCOLINK_ENABLED`: Enable synchronization (true/false)
// - `GLUCOLINK_PRIMARY_ROLE`: Whether this instance uploads (true/false)
//
// ## Example
//
// ```bash
// export GLUCOLINK_SETTINGS_PATH=/var/lib/glucolink/settings.json
// export GLUCOLINK_READINGS_PATH=/var/lib/glucolink/readings.ndjson
// export GLUCOLINK_URL=https://ns.example.com
// export GLUCOLINK_API_KEY=your-api-secret
// export GLUCOLINK_ENABLED=true
// export GLUCOLINK_SYNC_INTERVAL_SECS=300
//
// glucolinkd           # run until stopped
// glucolinkd --once    # upload pending readings and exit
// ```

use anyhow::Result;
use glucolink_core::engine::{SyncEngine, SyncEvent};
use glucolink_core::traits::{
    ConfigurationSnapshot, LogAlertSink, SettingKey, SettingValue, SettingsStore,
};
use glucolink_core::{FileSettingsStore, NdjsonReadingSource, SyncConfig, UploadOutcome};
use glucolink_nightscout::NightscoutCollector;
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Time allowed for an in-flight cycle to finish after a signal
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum GlucolinkExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<GlucolinkExitCode> for ExitCode {
    fn from(code: GlucolinkExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    settings_path: PathBuf,
    readings_path: PathBuf,
    sync_interval_secs: Option<u64>,
    http_timeout_secs: Option<u64>,
    max_readings: Option<usize>,
    log_level: String,
    url: Option<String>,
    api_key: Option<String>,
    enabled: Option<bool>,
    primary_role: Option<bool>,
    once: bool,
}

impl Config {
    /// Load configuration from environment variables and arguments
    fn from_env() -> Result<Self> {
        let mut config = Self::from_lookup(|name| env::var(name).ok())?;
        config.once = env::args().skip(1).any(|arg| arg == "--once");
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |name: &str| -> Result<PathBuf> {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
                .ok_or_else(|| anyhow::anyhow!("{} is required", name))
        };

        Ok(Self {
            settings_path: required("GLUCOLINK_SETTINGS_PATH")?,
            readings_path: required("GLUCOLINK_READINGS_PATH")?,
            sync_interval_secs: parse_var(&lookup, "GLUCOLINK_SYNC_INTERVAL_SECS")?,
            http_timeout_secs: parse_var(&lookup, "GLUCOLINK_HTTP_TIMEOUT_SECS")?,
            max_readings: parse_var(&lookup, "GLUCOLINK_MAX_READINGS")?,
            log_level: lookup("GLUCOLINK_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            url: lookup("GLUCOLINK_URL").map(|url| url.trim().to_string()),
            api_key: lookup("GLUCOLINK_API_KEY"),
            enabled: parse_flag(&lookup, "GLUCOLINK_ENABLED")?,
            primary_role: parse_flag(&lookup, "GLUCOLINK_PRIMARY_ROLE")?,
            once: false,
        })
    }

    /// Validate the configuration
    ///
    /// Checks numeric ranges, the collector URL scheme, obvious placeholder
    /// API keys and the log level.
    fn validate(&self) -> Result<()> {
        if let Some(ref url) = self.url {
            if !url.starts_with("https://") && !url.starts_with("http://") {
                anyhow::bail!("GLUCOLINK_URL must use HTTP or HTTPS scheme. Got: {}", url);
            }

            if url.starts_with("http://") {
                eprintln!(
                    "WARNING: GLUCOLINK_URL uses HTTP (not HTTPS). \
                    The api-secret header will travel unencrypted."
                );
            }
        }

        if let Some(ref api_key) = self.api_key {
            // Nightscout refuses API secrets shorter than 12 characters
            if api_key.len() < 12 {
                anyhow::bail!(
                    "GLUCOLINK_API_KEY appears too short ({} chars). \
                    Nightscout API secrets are at least 12 characters.",
                    api_key.len()
                );
            }

            let key_lower = api_key.to_lowercase();
            if key_lower.contains("your-api-secret")
                || key_lower.contains("replace_me")
                || key_lower.contains("changeme")
            {
                anyhow::bail!(
                    "GLUCOLINK_API_KEY appears to be a placeholder. \
                    Use the API_SECRET configured on your collector."
                );
            }
        }

        if let Some(interval) = self.sync_interval_secs
            && interval != 0
            && !(60..=86_400).contains(&interval)
        {
            anyhow::bail!(
                "GLUCOLINK_SYNC_INTERVAL_SECS must be 0 or between 60 and 86400 seconds. Got: {}",
                interval
            );
        }

        if let Some(timeout) = self.http_timeout_secs
            && !(1..=300).contains(&timeout)
        {
            anyhow::bail!(
                "GLUCOLINK_HTTP_TIMEOUT_SECS must be between 1 and 300 seconds. Got: {}",
                timeout
            );
        }

        if let Some(max_readings) = self.max_readings
            && !(1..=10_000).contains(&max_readings)
        {
            anyhow::bail!(
                "GLUCOLINK_MAX_READINGS must be between 1 and 10000. Got: {}",
                max_readings
            );
        }

        if self.settings_path == self.readings_path {
            anyhow::bail!("GLUCOLINK_SETTINGS_PATH and GLUCOLINK_READINGS_PATH must differ");
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "GLUCOLINK_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Library configuration with environment overrides applied
    fn sync_config(&self) -> SyncConfig {
        let mut config = SyncConfig::default();
        if let Some(interval) = self.sync_interval_secs {
            config.engine.sync_interval_secs = interval;
        }
        if let Some(timeout) = self.http_timeout_secs {
            config.collector.http_timeout_secs = timeout;
        }
        if let Some(max_readings) = self.max_readings {
            config.upload.max_readings = max_readings;
        }
        config
    }

    /// Setting overrides in write order
    fn overrides(&self) -> Vec<(SettingKey, SettingValue)> {
        let mut overrides = Vec::new();
        // First, so credential changes are judged against the final role
        if let Some(primary) = self.primary_role {
            overrides.push((SettingKey::PrimaryRole, SettingValue::Flag(primary)));
        }
        if let Some(ref url) = self.url {
            overrides.push((SettingKey::Url, SettingValue::Text(url.clone())));
        }
        if let Some(ref api_key) = self.api_key {
            overrides.push((SettingKey::ApiKey, SettingValue::Text(api_key.clone())));
        }
        // Last, so a fresh install switches on with its credentials in place
        if let Some(enabled) = self.enabled {
            overrides.push((SettingKey::Enabled, SettingValue::Flag(enabled)));
        }
        overrides
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    lookup(name)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("{} is not valid: {}", name, e))
        })
        .transpose()
}

fn parse_flag(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<bool>> {
    lookup(name)
        .map(|value| match value.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            other => Err(anyhow::anyhow!(
                "{} must be true or false. Got: {}",
                name,
                other
            )),
        })
        .transpose()
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return GlucolinkExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return GlucolinkExitCode::ConfigError.into();
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
        return GlucolinkExitCode::ConfigError.into();
    }

    info!("Starting glucolinkd daemon");
    info!("Settings: {}", config.settings_path.display());
    info!("Readings: {}", config.readings_path.display());

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return GlucolinkExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {:#}", e);
            GlucolinkExitCode::RuntimeError
        } else {
            GlucolinkExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let sync_config = config.sync_config();

    let settings = Arc::new(FileSettingsStore::new(&config.settings_path).await?);
    let readings = Arc::new(NdjsonReadingSource::new(&config.readings_path));
    let collector = Arc::new(NightscoutCollector::new(&sync_config.collector)?);

    let (engine, mut events) = SyncEngine::new(
        settings.clone(),
        readings,
        collector,
        Arc::new(LogAlertSink),
        sync_config,
    )?;

    if config.once {
        apply_overrides(settings.as_ref(), &config).await?;
        let outcome = engine.synchronize().await?;
        report_outcome(&outcome);
        settings.flush().await?;
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let mut engine_task = tokio::spawn({
        let engine = engine.clone();
        async move { engine.run_with_shutdown(Some(shutdown_rx)).await }
    });

    // Overrides must land after the engine subscribed to changes
    match events.recv().await {
        Some(SyncEvent::Started) => {}
        other => anyhow::bail!("Engine did not start: {:?}", other),
    }

    let changed = apply_overrides(settings.as_ref(), &config).await?;
    let verifying = dispatches_verification(&changed, &settings.snapshot().await?);
    let event_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!("Engine event: {:?}", event);
        }
    });

    // Without a verification cycle nothing uploads until the next tick
    if !verifying {
        match engine.synchronize().await {
            Ok(outcome) => report_outcome(&outcome),
            Err(e) => warn!("Startup sync failed: {}", e),
        }
    }

    info!("Daemon initialized successfully");

    tokio::select! {
        received = wait_for_shutdown() => {
            info!("Received shutdown signal: {}", received?);
            info!("Shutting down daemon");
            let _ = shutdown_tx.send(());

            match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut engine_task).await {
                Ok(joined) => joined??,
                Err(_) => anyhow::bail!("Shutdown timeout after {:?}", SHUTDOWN_TIMEOUT),
            }
        }
        joined = &mut engine_task => {
            joined??;
            warn!("Engine stopped without a shutdown signal");
        }
    }

    event_task.abort();
    Ok(())
}

/// Write changed overrides through the store, returning how many were written
async fn apply_overrides(
    settings: &dyn SettingsStore,
    config: &Config,
) -> Result<Vec<(SettingKey, SettingValue)>> {
    let mut changed = Vec::new();
    for (key, value) in config.overrides() {
        if settings.get(key).await?.as_ref() == Some(&value) {
            debug!("Override for {} matches stored value", key);
            continue;
        }

        info!("Applying {} from environment", key);
        settings.set(key, Some(value.clone())).await?;
        changed.push((key, value));
    }
    Ok(changed)
}

/// Whether the written overrides make the engine run a verify→sync cycle
///
/// URL and API key changes verify, and so does switching on. Role changes
/// and switching off do not.
fn dispatches_verification(
    changed: &[(SettingKey, SettingValue)],
    snapshot: &ConfigurationSnapshot,
) -> bool {
    snapshot.is_ready()
        && changed.iter().any(|(key, value)| match key {
            SettingKey::Url | SettingKey::ApiKey => true,
            SettingKey::Enabled => value.as_flag() == Some(true),
            _ => false,
        })
}

fn report_outcome(outcome: &UploadOutcome) {
    match outcome {
        UploadOutcome::NotConfigured => {
            warn!("Synchronization is not configured (enabled, primary role, URL and API key)")
        }
        UploadOutcome::NothingPending => info!("No new readings to upload"),
        UploadOutcome::Uploaded { count, watermark } => info!(
            "Uploaded {} reading(s), watermark {}",
            count,
            watermark.to_rfc3339()
        ),
    }
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
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
