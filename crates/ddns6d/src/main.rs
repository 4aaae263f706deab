// # ddns6d - ddns6 Daemon
//
// Thin integration layer: reads configuration from the environment, binds the
// discovery strategy once, and runs one pipeline per managed record until a
// shutdown signal arrives. All discovery, reconciliation and retry logic lives
// in `ddns6-core` and the source/provider crates.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Provider
// - `DDNS6_API_TOKEN` (or `CF_TOKEN`): Cloudflare API token
// - `DDNS6_ZONE_ID`: Cloudflare zone holding the records
// - `DDNS6_MODE`: `dry-run` to log updates instead of sending them
//
// ### Records
// - `DDNS6_DOMAIN_V6`: AAAA record to manage
// - `DDNS6_DOMAIN_V4`: A record to manage
//
// ### Discovery
// - `DDNS6_STRATEGY`: `netlink` (default), `interface` or `stun`
// - `DDNS6_PREFIX_POLICY`: `dedup-egress` (default) or `same-prefix` (interface)
// - `DDNS6_STUN_SERVER`: STUN server `host:port` (stun)
//
// ### Engine
// - `DDNS6_POLL_INTERVAL_SECS`: Timer period for interface/stun
// - `DDNS6_CYCLE_TIMEOUT_SECS`: Deadline for one timer-driven cycle
// - `DDNS6_ATTEMPT_TIMEOUT_SECS`: Bound on a single attempt
// - `DDNS6_RETRY_INITIAL_DELAY_SECS` / `DDNS6_RETRY_MAX_DELAY_SECS`: Backoff
//
// ### Misc
// - `DDNS6_TEST`: Print discovered addresses once and exit
// - `DDNS6_LOG_LEVEL`: trace, debug, info, warn, error
//
// Variables may also live in a `.env` file in the working directory (or a
// parent). Values already set in the process environment take precedence.
//
// ## Example
//
// ```bash
// export DDNS6_API_TOKEN=your_token
// export DDNS6_ZONE_ID=023e105f4ecef8ad9ca31a8372d0c353
// export DDNS6_DOMAIN_V6=home.example.com
// export DDNS6_STRATEGY=netlink
//
// ddns6d
// ```

use anyhow::{Context, Result, anyhow};
use ddns6_core::config::DEFAULT_STUN_SERVER;
use ddns6_core::{
    AddressFamily, AddressSource, Ddns6Config, DiscoveryStrategy, DnsProvider, EngineConfig,
    Pipeline, PipelineEvent, PrefixPolicy, ProviderConfig, Reconciler, RecordConfig, Trigger,
};
use ddns6_provider_cloudflare::CloudflareProvider;
use std::collections::HashMap;
use std::env;
use std::fmt::Display;
use std::fs::File;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// How long pipelines get to wind down after a shutdown signal
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

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

/// Daemon configuration
#[derive(Debug)]
struct Config {
    ddns6: Ddns6Config,
    /// Discover once, print, exit
    test_mode: bool,
    log_level: Level,
}

impl Config {
    /// Load configuration from environment variables, falling back to `.env`
    fn from_env() -> Result<Self> {
        let file = dotenv_vars(dotenvy::dotenv_iter());
        Self::from_lookup(|key| env::var(key).ok().or_else(|| file.get(key).cloned()))
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let api_token = var("DDNS6_API_TOKEN").or_else(|| var("CF_TOKEN")).ok_or_else(|| {
            anyhow!("DDNS6_API_TOKEN is required. Set it via: export DDNS6_API_TOKEN=your_token")
        })?;

        let zone_id = var("DDNS6_ZONE_ID").ok_or_else(|| {
            anyhow!("DDNS6_ZONE_ID is required. Set it via: export DDNS6_ZONE_ID=your_zone_id")
        })?;

        let mut records = Vec::new();
        if let Some(domain) = var("DDNS6_DOMAIN_V6") {
            records.push(RecordConfig::new(domain, AddressFamily::V6));
        }
        if let Some(domain) = var("DDNS6_DOMAIN_V4") {
            records.push(RecordConfig::new(domain, AddressFamily::V4));
        }
        if records.is_empty() {
            anyhow::bail!(
                "No records configured. Set DDNS6_DOMAIN_V6 and/or DDNS6_DOMAIN_V4, \
                e.g. export DDNS6_DOMAIN_V6=home.example.com"
            );
        }

        let strategy = match var("DDNS6_STRATEGY")
            .map(|s| s.to_lowercase())
            .as_deref()
            .unwrap_or("netlink")
        {
            "netlink" => DiscoveryStrategy::Netlink,
            "interface" => DiscoveryStrategy::Interface {
                prefix_policy: var("DDNS6_PREFIX_POLICY")
                    .map(|p| p.parse::<PrefixPolicy>())
                    .transpose()?
                    .unwrap_or_default(),
            },
            "stun" => DiscoveryStrategy::Stun {
                server: var("DDNS6_STUN_SERVER").unwrap_or_else(|| DEFAULT_STUN_SERVER.to_string()),
            },
            other => anyhow::bail!(
                "DDNS6_STRATEGY '{}' is not supported. Supported strategies: netlink, interface, stun",
                other
            ),
        };

        let dry_run = match var("DDNS6_MODE").map(|m| m.to_lowercase()).as_deref() {
            None | Some("live") => false,
            Some("dry-run") => true,
            Some(other) => anyhow::bail!("DDNS6_MODE '{}' is not valid. Valid modes: live, dry-run", other),
        };

        let defaults = EngineConfig::default();
        let engine = EngineConfig {
            poll_interval_secs: parse_or(
                var("DDNS6_POLL_INTERVAL_SECS"),
                "DDNS6_POLL_INTERVAL_SECS",
                defaults.poll_interval_secs,
            )?,
            cycle_timeout_secs: parse_or(
                var("DDNS6_CYCLE_TIMEOUT_SECS"),
                "DDNS6_CYCLE_TIMEOUT_SECS",
                defaults.cycle_timeout_secs,
            )?,
            attempt_timeout_secs: parse_or(
                var("DDNS6_ATTEMPT_TIMEOUT_SECS"),
                "DDNS6_ATTEMPT_TIMEOUT_SECS",
                defaults.attempt_timeout_secs,
            )?,
            retry_initial_delay_secs: parse_or(
                var("DDNS6_RETRY_INITIAL_DELAY_SECS"),
                "DDNS6_RETRY_INITIAL_DELAY_SECS",
                defaults.retry_initial_delay_secs,
            )?,
            retry_max_delay_secs: parse_or(
                var("DDNS6_RETRY_MAX_DELAY_SECS"),
                "DDNS6_RETRY_MAX_DELAY_SECS",
                defaults.retry_max_delay_secs,
            )?,
            ..defaults
        };

        let test_mode = match var("DDNS6_TEST").map(|t| t.to_lowercase()).as_deref() {
            None | Some("0") | Some("false") | Some("no") => false,
            Some("1") | Some("true") | Some("yes") => true,
            Some(other) => anyhow::bail!("DDNS6_TEST '{}' is not a boolean", other),
        };

        let log_level = match var("DDNS6_LOG_LEVEL")
            .map(|l| l.to_lowercase())
            .as_deref()
            .unwrap_or("info")
        {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            other => anyhow::bail!(
                "DDNS6_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                other
            ),
        };

        let ddns6 = Ddns6Config {
            zone_id,
            provider: ProviderConfig::Cloudflare { api_token, dry_run },
            strategy,
            records,
            engine,
        };
        ddns6.validate()?;

        Ok(Self {
            ddns6,
            test_mode,
            log_level,
        })
    }
}

/// Variables from a `.env` file; a missing file yields none
fn dotenv_vars(file: dotenvy::Result<dotenvy::Iter<File>>) -> HashMap<String, String> {
    match file {
        Ok(iter) => iter.filter_map(|item| item.ok()).collect(),
        Err(_) => HashMap::new(),
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow!("{} must be a number, got '{}': {}", key, raw, e)),
    }
}

fn main() -> ExitCode {
    // Load and validate configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DdnsExitCode::ConfigError.into();
    }

    info!("Starting ddns6d daemon");
    info!(
        "Configuration loaded: {} record(s), strategy {}, provider {}",
        config.ddns6.records.len(),
        config.ddns6.strategy.name(),
        config.ddns6.provider.type_name()
    );

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

    let result = rt.block_on(async {
        let source = match build_source(&config.ddns6.strategy) {
            Ok(source) => source,
            Err(e) => {
                error!("Startup failed: {:#}", e);
                return DdnsExitCode::ConfigError;
            }
        };

        if config.test_mode {
            return run_discovery_test(source.as_ref(), &config.ddns6.records).await;
        }

        let cancel = CancellationToken::new();
        let pipelines = match start_pipelines(&config.ddns6, source, &cancel).await {
            Ok(pipelines) => pipelines,
            Err(e) => {
                error!("Startup failed: {:#}", e);
                cancel.cancel();
                return DdnsExitCode::ConfigError;
            }
        };

        match supervise(pipelines, cancel).await {
            Ok(()) => DdnsExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                DdnsExitCode::RuntimeError
            }
        }
    });

    result.into()
}

/// Bind the configured strategy to its address source
fn build_source(strategy: &DiscoveryStrategy) -> Result<Arc<dyn AddressSource>> {
    match strategy {
        #[cfg(feature = "netlink")]
        DiscoveryStrategy::Netlink => Ok(Arc::new(ddns6_ip_netlink::NetlinkSource::new())),

        #[cfg(feature = "interface")]
        DiscoveryStrategy::Interface { prefix_policy } => Ok(Arc::new(
            ddns6_ip_interface::InterfaceSource::new(*prefix_policy),
        )),

        #[cfg(feature = "stun")]
        DiscoveryStrategy::Stun { server } => {
            Ok(Arc::new(ddns6_ip_stun::StunSource::new(server.clone())))
        }

        #[allow(unreachable_patterns)]
        other => Err(anyhow!(
            "Discovery strategy '{}' is not compiled into this build",
            other.name()
        )),
    }
}

fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn DnsProvider>> {
    match config {
        ProviderConfig::Cloudflare { api_token, dry_run } => {
            if *dry_run {
                warn!("Cloudflare provider running in DRY-RUN mode - no changes will be made");
            }
            let provider = CloudflareProvider::new(api_token.clone(), *dry_run)
                .context("Failed to create Cloudflare provider")?;
            Ok(Arc::new(provider))
        }
    }
}

/// One-shot discovery for every configured family
async fn run_discovery_test(source: &dyn AddressSource, records: &[RecordConfig]) -> DdnsExitCode {
    let mut exit = DdnsExitCode::CleanShutdown;

    for record in records {
        match source.discover(record.family).await {
            Ok(set) => println!("{} via {}: {}", record.family, source.name(), set),
            Err(e) => {
                println!("{} via {}: discovery failed: {}", record.family, source.name(), e);
                exit = DdnsExitCode::RuntimeError;
            }
        }
    }

    exit
}

type PipelineResult = (String, ddns6_core::Result<()>);

/// Spawn one pipeline per record, each under its own child token
async fn start_pipelines(
    config: &Ddns6Config,
    source: Arc<dyn AddressSource>,
    cancel: &CancellationToken,
) -> Result<JoinSet<PipelineResult>> {
    let provider = build_provider(&config.provider)?;
    let engine = &config.engine;
    let mut pipelines = JoinSet::new();

    for record in &config.records {
        let token = cancel.child_token();
        let reconciler = Reconciler::new(provider.clone(), config.zone_id.clone(), record.clone());
        let (pipeline, events) = Pipeline::new(
            source.clone(),
            reconciler,
            engine.retry_policy(),
            token.clone(),
            engine.event_channel_capacity,
        );

        let (pipeline, trigger) = if config.strategy.is_event_driven() {
            let changes = subscribe_changes(engine, token)
                .await
                .with_context(|| format!("Failed to subscribe to address changes for {}", record.domain))?;
            (pipeline, Trigger::Changes(changes))
        } else {
            (
                pipeline.with_cycle_timeout(Some(engine.cycle_timeout())),
                Trigger::Interval(engine.poll_interval()),
            )
        };

        info!(
            "Managing {} record {} via {}",
            record.record_type(),
            record.domain,
            source.name()
        );

        tokio::spawn(drain_events(events));
        let domain = record.domain.clone();
        pipelines.spawn(async move { (domain, pipeline.run(trigger).await) });
    }

    Ok(pipelines)
}

#[cfg(feature = "netlink")]
async fn subscribe_changes(
    engine: &EngineConfig,
    cancel: CancellationToken,
) -> Result<ddns6_core::ChangeStream> {
    use ddns6_core::ChangeNotifier;

    let notifier = ddns6_ip_netlink::NetlinkNotifier::new(engine.change_channel_capacity);
    Ok(notifier.subscribe(cancel).await?)
}

#[cfg(not(feature = "netlink"))]
async fn subscribe_changes(
    _engine: &EngineConfig,
    _cancel: CancellationToken,
) -> Result<ddns6_core::ChangeStream> {
    Err(anyhow!("Address change notifications are not compiled into this build"))
}

async fn drain_events(mut events: mpsc::Receiver<PipelineEvent>) {
    while let Some(event) = events.recv().await {
        debug!("Pipeline event: {:?}", event);
    }
}

/// Wait for a shutdown signal while pipelines run
///
/// A halted pipeline is logged and the rest keep running. When none are left
/// the daemon has nothing to do and exits with an error.
async fn supervise(
    mut pipelines: JoinSet<PipelineResult>,
    cancel: CancellationToken,
) -> Result<()> {
    let shutdown = wait_for_shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                info!("Received shutdown signal: {}", signal?);
                break;
            }
            joined = pipelines.join_next() => match joined {
                None => anyhow::bail!("All pipelines halted"),
                Some(Ok((domain, Err(e)))) => error!("Pipeline for {} halted: {}", domain, e),
                Some(Ok((domain, Ok(())))) => info!("Pipeline for {} stopped", domain),
                Some(Err(e)) => error!("Pipeline task failed: {}", e),
            },
        }
    }

    info!("Shutting down daemon");
    cancel.cancel();

    tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        while pipelines.join_next().await.is_some() {}
    })
    .await
    .map_err(|_| anyhow!("Shutdown timeout after {:?}", SHUTDOWN_TIMEOUT))?;

    info!("All pipelines stopped");
    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
