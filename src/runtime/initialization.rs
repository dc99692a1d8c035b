//! # Initialization
//!
//! Adapter runtime initialization: rustls setup, tracing, metrics
//! registration, scaler construction from `ScaledObject` manifests, push
//! bridge startup, and the HTTP server.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::adapter::push_bridge::{ActivityEvent, PushBridge};
use crate::adapter::{InMemoryCache, MetricsAdapter, ScalerHandle, ScalersEntry};
use crate::constants;
use crate::crd::{ResolvedTriggerAuth, ScaledObject};
use crate::observability;
use crate::runtime::server::{start_server, ServerState};
use crate::scaler::factory::ScalerFactory;

/// Command-line arguments for the adapter binary
#[derive(Debug, Parser)]
#[command(name = "autoscaler-metrics-adapter", about = "External metrics adapter for event-driven autoscaling")]
pub struct AdapterArgs {
    /// Port for the HTTP server (external metrics, prometheus metrics, probes)
    #[arg(long, default_value_t = constants::DEFAULT_SERVER_PORT)]
    pub port: u16,

    /// Directory of ScaledObject manifests to serve in standalone mode.
    /// In-cluster, the controller populates the cache instead.
    #[arg(long)]
    pub manifest_dir: Option<String>,

    /// Ceiling on any single backend HTTP request, in milliseconds
    #[arg(long, default_value_t = constants::DEFAULT_HTTP_TIMEOUT.as_millis() as u64)]
    pub http_timeout_ms: u64,
}

/// Initialization result containing all long-lived runtime components
pub struct InitializationResult {
    /// Scaled-object cache shared with the adapter
    pub cache: Arc<InMemoryCache>,
    /// Scaler factory (owns the shared session cache)
    pub factory: Arc<ScalerFactory>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    /// The running HTTP server task
    pub server_handle: JoinHandle<()>,
    /// Bridges for push-capable scalers
    pub bridges: Vec<PushBridge>,
    /// Task draining activity events from the bridges
    pub activity_drain: JoinHandle<()>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult").finish_non_exhaustive()
    }
}

/// Initialize the adapter runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - Scaler construction from manifests (standalone mode)
/// - Push bridge startup
/// - HTTP server startup
///
/// # Errors
///
/// Returns an error when any startup step fails.
pub async fn initialize(args: AdapterArgs) -> Result<InitializationResult> {
    // Configure rustls crypto provider FIRST, before any other operations
    // Required for rustls 0.23+ when no default provider is set via features
    // We use ring as the crypto provider
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autoscaler_metrics_adapter=info".into()),
        )
        .init();

    info!("Starting Autoscaler Metrics Adapter");

    // Initialize metrics
    observability::metrics::register_metrics()?;

    let global_http_timeout = Duration::from_millis(args.http_timeout_ms.max(1));
    let factory = Arc::new(ScalerFactory::new());
    let cache = Arc::new(InMemoryCache::new());

    let (events_tx, mut events_rx) = mpsc::channel::<ActivityEvent>(64);
    let activity_drain = tokio::spawn(async move {
        // The controller consumes these in-cluster; standalone mode logs them.
        while let Some(event) = events_rx.recv().await {
            info!(
                namespace = %event.namespace,
                name = %event.name,
                active = event.active,
                "push scaler activity transition"
            );
        }
    });

    let mut bridges = Vec::new();
    if let Some(dir) = &args.manifest_dir {
        bridges = load_manifests(dir, global_http_timeout, &factory, &cache, &events_tx)
            .await
            .with_context(|| format!("failed to load manifests from {dir}"))?;
    }

    let adapter = Arc::new(MetricsAdapter::new(
        Arc::clone(&cache) as Arc<dyn crate::adapter::ScaledObjectCache>
    ));
    let server_state = Arc::new(ServerState {
        is_ready: AtomicBool::new(false),
        adapter,
        query_timeout: global_http_timeout,
    });

    // Start server in background task
    let server_port = args.port;
    let state_for_server = Arc::clone(&server_state);
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, state_for_server).await {
            error!("HTTP server error: {}", e);
        }
    });

    // Poll server startup - wait for it to be ready before proceeding
    // This ensures readiness probes pass immediately after startup
    wait_for_server_ready(&server_state).await?;

    Ok(InitializationResult {
        cache,
        factory,
        server_state,
        server_handle,
        bridges,
        activity_drain,
    })
}

/// Build scalers for every ScaledObject manifest in `dir` and start bridges
/// for the push-capable ones
async fn load_manifests(
    dir: &str,
    global_http_timeout: Duration,
    factory: &Arc<ScalerFactory>,
    cache: &Arc<InMemoryCache>,
    events_tx: &mpsc::Sender<ActivityEvent>,
) -> Result<Vec<PushBridge>> {
    let mut bridges = Vec::new();
    for entry in std::fs::read_dir(Path::new(dir))? {
        let path = entry?.path();
        let is_yaml = path
            .extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if !is_yaml {
            continue;
        }

        let raw = std::fs::read_to_string(&path)?;
        let object: ScaledObject = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        let name = object.metadata.name.clone().unwrap_or_default();
        let namespace = object
            .metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string());
        let labels: std::collections::BTreeMap<String, String> = object
            .metadata
            .labels
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect();

        // Standalone mode has no secret resolver; auth comes from metadata
        // and env indirection only.
        let configs =
            object.scaler_configs(global_http_timeout, |_| ResolvedTriggerAuth::default())?;

        let mut handles = Vec::with_capacity(configs.len());
        for config in configs {
            let trigger_index = config.trigger_index;
            let trigger_type = config.trigger_type.clone();
            match factory.build(config).await {
                Ok(scaler) => {
                    if let Some(bridge) =
                        PushBridge::start(&scaler, &namespace, &name, events_tx.clone())
                    {
                        bridges.push(bridge);
                    }
                    handles.push(ScalerHandle {
                        scaler,
                        trigger_index,
                    });
                }
                Err(err) => {
                    // Construction errors never degrade into runtime
                    // fallbacks; the trigger simply is not served.
                    error!(
                        scaled_object = %name,
                        trigger_type = %trigger_type,
                        trigger_index,
                        error = %err,
                        "failed to construct scaler, trigger skipped"
                    );
                }
            }
        }

        info!(
            scaled_object = %name,
            namespace = %namespace,
            scalers = handles.len(),
            "loaded scaled object"
        );
        cache.upsert(ScalersEntry {
            name,
            namespace,
            labels,
            scalers: handles,
        });
    }
    Ok(bridges)
}

/// Wait for the HTTP server to flip its readiness flag
async fn wait_for_server_ready(state: &Arc<ServerState>) -> Result<()> {
    for _ in 0..50 {
        if state.is_ready.load(Ordering::Acquire) {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    warn!("HTTP server did not become ready within 5s");
    anyhow::bail!("HTTP server failed to start")
}
