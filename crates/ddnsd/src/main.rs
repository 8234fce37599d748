// # ddnsd - DDNS Daemon
//
// The ddnsd daemon is a thin integration layer. It is responsible for:
// 1. Reading configuration from environment variables
// 2. Building the IP resolver, the DNSPod repository and the engine
// 3. Resolving the domain id before the first round
// 4. Logging engine events and running rounds until SIGTERM/SIGINT
//
// All DDNS logic lives in ddns-core.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### DNSPod
// - `DDNS_TOKEN`: Login token, formatted as `token_id,token` (required)
// - `DDNS_DOMAIN`: Root domain, e.g. `example.com` (required)
// - `DDNS_SUBDOMAINS`: Comma-separated record names, e.g. `www,@`
// - `DDNS_REMOTE_LANG`: Provider message language (`cn`, `en`)
//
// ### IP Detection
// - `DDNS_IP_SERVICE`: Built-in service name (default `ipify`)
// - `DDNS_IP_URL`: Custom plain-text endpoint, overrides the service
//
// ### Engine
// - `DDNS_INTERVAL_MS`: Delay between rounds (default 30000)
// - `DDNS_CONCURRENCY`: Parallel record updates (default 10)
// - `DDNS_REQUEST_TIMEOUT_SECS`: Deadline per remote call (default 60)
// - `DDNS_MODE`: `live` (default) or `dry-run`
// - `DDNS_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export DDNS_TOKEN=12345,0123456789abcdef
// export DDNS_DOMAIN=example.com
// export DDNS_SUBDOMAINS=www,@,home
// export DDNS_INTERVAL_MS=60000
//
// ddnsd
// ```

use anyhow::{Context, Result};
use ddns_core::config::parse_interval_ms;
use ddns_core::{DdnsConfig, DdnsEngine, EngineConfig, EngineEvent, EventStream, RemoteLang};
use ddns_ip_http::{HttpIpResolver, IpExtractor, IpService};
use ddns_provider_dnspod::DnspodRepository;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Extra time granted to the in-flight round after stop()
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum DdnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// How record updates are carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Live,
    DryRun,
}

/// Application configuration
struct Config {
    token: String,
    domain: String,
    subdomains: Vec<String>,
    interval_ms: u64,
    remote_lang: RemoteLang,
    ip_service: IpService,
    ip_url: Option<String>,
    concurrency: usize,
    request_timeout_secs: u64,
    mode: Mode,
    log_level: Level,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let engine_defaults = EngineConfig::default();

        let token = var("DDNS_TOKEN").context(
            "DDNS_TOKEN is required. Set it via: export DDNS_TOKEN=token_id,token",
        )?;
        let domain = var("DDNS_DOMAIN").context(
            "DDNS_DOMAIN is required. Set it via: export DDNS_DOMAIN=example.com",
        )?;

        let ip_service = match var("DDNS_IP_SERVICE") {
            Some(name) => name.parse::<IpService>()?,
            None => IpService::default(),
        };

        let ip_url = var("DDNS_IP_URL");
        if let Some(ref url) = ip_url
            && !url.starts_with("https://")
            && !url.starts_with("http://")
        {
            anyhow::bail!("DDNS_IP_URL must use HTTP or HTTPS scheme. Got: {}", url);
        }

        let mode = match var("DDNS_MODE").map(|m| m.to_lowercase()).as_deref() {
            None | Some("live") => Mode::Live,
            Some("dry-run") => Mode::DryRun,
            Some(other) => anyhow::bail!(
                "DDNS_MODE '{}' is not valid. Valid modes: live, dry-run",
                other
            ),
        };

        let log_level = match var("DDNS_LOG_LEVEL")
            .unwrap_or_else(|| "info".to_string())
            .to_lowercase()
            .as_str()
        {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            other => anyhow::bail!(
                "DDNS_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                other
            ),
        };

        Ok(Self {
            token,
            domain,
            subdomains: var("DDNS_SUBDOMAINS")
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            interval_ms: var("DDNS_INTERVAL_MS")
                .map(|raw| parse_interval_ms(&raw))
                .unwrap_or(ddns_core::config::DEFAULT_INTERVAL_MS),
            remote_lang: var("DDNS_REMOTE_LANG")
                .map(|code| RemoteLang::from_code(&code))
                .unwrap_or_default(),
            ip_service,
            ip_url,
            concurrency: parse_number(&var, "DDNS_CONCURRENCY", engine_defaults.concurrency)?,
            request_timeout_secs: parse_number(
                &var,
                "DDNS_REQUEST_TIMEOUT_SECS",
                engine_defaults.request_timeout_secs,
            )?,
            mode,
            log_level,
        })
    }

    /// Engine configuration derived from the environment
    fn ddns_config(&self) -> DdnsConfig {
        DdnsConfig::new(self.token.clone(), self.domain.clone(), self.subdomains.clone())
            .with_interval_ms(self.interval_ms)
            .with_remote_lang(self.remote_lang)
            .with_engine(EngineConfig {
                concurrency: self.concurrency,
                request_timeout_secs: self.request_timeout_secs,
                ..EngineConfig::default()
            })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        self.ddns_config().validate()?;

        if !self.token.contains(',') {
            anyhow::bail!(
                "DDNS_TOKEN must be formatted as token_id,token. \
                Create one in the DNSPod console under API Token."
            );
        }

        if self.subdomains.is_empty() {
            eprintln!("WARNING: DDNS_SUBDOMAINS is empty, every round will find no records.");
        }

        Ok(())
    }
}

/// Parse an optional numeric variable, falling back to `default`
fn parse_number<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{} must be a number. Got '{}': {}", key, raw, e)),
        None => Ok(default),
    }
}

fn main() -> ExitCode {
    // Load and validate configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return DdnsExitCode::ConfigError.into();
    }

    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DdnsExitCode::ConfigError.into();
    }

    info!("Starting ddnsd daemon");
    info!(
        "Configuration loaded: domain={}, {} subdomain(s), mode={:?}",
        config.domain,
        config.subdomains.len(),
        config.mode
    );

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DdnsExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match build_engine(&config) {
            Ok((engine, events)) => match run_daemon(engine, events).await {
                Ok(()) => DdnsExitCode::CleanShutdown,
                Err(e) => {
                    error!("Daemon error: {:#}", e);
                    DdnsExitCode::RuntimeError
                }
            },
            Err(e) => {
                error!("Startup error: {:#}", e);
                DdnsExitCode::ConfigError
            }
        }
    })
    .into()
}

/// Build the resolver, the repository and the engine
fn build_engine(config: &Config) -> Result<(Arc<DdnsEngine>, EventStream)> {
    let resolver = match config.ip_url {
        Some(ref url) => {
            info!("Detecting public IP via {}", url);
            HttpIpResolver::new(url.clone(), IpExtractor::PlainText)?
        }
        None => {
            info!("Detecting public IP via {} service", config.ip_service);
            HttpIpResolver::for_service(config.ip_service)?
        }
    };

    let repository = DnspodRepository::new(
        config.token.clone(),
        config.remote_lang,
        config.mode == Mode::DryRun,
    )?;
    if repository.is_dry_run() {
        warn!("DNSPod repository running in DRY-RUN mode - no changes will be made");
    }

    let (engine, events) =
        DdnsEngine::new(Arc::new(resolver), Arc::new(repository), config.ddns_config())?;

    Ok((Arc::new(engine), events))
}

/// Run the daemon until a shutdown signal arrives
async fn run_daemon(engine: Arc<DdnsEngine>, events: EventStream) -> Result<()> {
    let domain_id = engine
        .initialize()
        .await
        .context("Failed to resolve the DNSPod domain id")?;
    info!("Managing domain {} (id {})", engine.config().domain, domain_id);

    let logger = tokio::spawn(log_events(events));

    let Some(round_loop) = Arc::clone(&engine).start() else {
        anyhow::bail!("Engine was already started");
    };
    info!("Daemon initialized successfully");

    let signal = wait_for_shutdown().await?;
    info!("Received shutdown signal: {}", signal);
    info!("Shutting down daemon");

    engine.stop();

    let grace = engine.config().engine.request_timeout() * 3 + SHUTDOWN_GRACE;
    match tokio::time::timeout(grace, round_loop).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => anyhow::bail!("Round loop failed: {}", e),
        Err(_) => anyhow::bail!("Shutdown timeout after {:?}", grace),
    }

    // The stream ends once the engine (and its event bus) is gone.
    drop(engine);
    let _ = logger.await;

    Ok(())
}

/// Log every engine event
///
/// The event bus already logs at a level matching each event; this consumer
/// adds a structured line per event for log pipelines.
async fn log_events(mut events: EventStream) {
    while let Some(event) = events.next().await {
        match &event {
            EngineEvent::Detected { ip } => debug!(target: "ddnsd::events", event = event.name(), %ip),
            EngineEvent::Warn { error }
            | EngineEvent::Error { error } => debug!(target: "ddnsd::events", event = event.name(), %error),
            EngineEvent::Equal { record, ip } | EngineEvent::Changing { record, ip } => debug!(
                target: "ddnsd::events",
                event = event.name(),
                record = %record.name,
                value = %record.value,
                %ip
            ),
            EngineEvent::Changed { record } => debug!(
                target: "ddnsd::events",
                event = event.name(),
                record = %record.name,
                value = %record.value
            ),
            EngineEvent::SaveError { error, record } => debug!(
                target: "ddnsd::events",
                event = event.name(),
                record = %record.name,
                %error
            ),
            _ => debug!(target: "ddnsd::events", event = event.name()),
        }
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

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(signal)
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
