//! clinica - command-line entry point for the clinic admin client.
//!
//! Without arguments the process loads every collection, then keeps the
//! pending-operation queue flowing to the API until Ctrl-C. One-shot
//! commands inspect the local state or call the API directly.

use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use clinica_core::api::LogQuery;
use clinica_core::cache::SnapshotStore;
use clinica_core::models::{CachedRecord, Collection};
use clinica_core::store::{DataSource, StoreEvent, StoreSettings};
use clinica_core::sync::SyncWorker;
use clinica_core::utils::{format_clp, format_date, format_rut, truncate_string};
use clinica_core::{ApiClient, AppConfig, ClinicStore};

/// Daily log files are named `clinica.log.YYYY-MM-DD`
const LOG_FILE_PREFIX: &str = "clinica.log";

/// Rows shown per activity log query
const LOG_LIMIT: u32 = 50;

/// Width of the summary column in `--list`
const SUMMARY_WIDTH: usize = 48;

const USAGE: &str = "\
Usage: clinica [COMMAND]

Without a command, load all collections and sync pending changes until Ctrl-C.

Commands:
  --status              Connectivity, pending operations and snapshot ages
  --list <collection>   Print a collection (pacientes, ventas, pagos, sesiones, ofertas, boxes)
  --sync                Replay pending operations once
  --clear-dropped       Forget operations discarded after repeated failures
  --health              Probe the API health endpoint
  --backup              Ask the server to create a backup
  --logs [entity]       Show recent activity log entries
  --help                Show this message";

/// Initialize the tracing subscriber: stderr plus a daily file in `log_dir`.
/// The returned guard flushes the file writer when dropped.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // RUST_LOG controls the level (e.g. RUST_LOG=clinica_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = fmt::layer().with_writer(io::stderr);

    let Some(dir) = log_dir.filter(|dir| std::fs::create_dir_all(dir).is_ok()) else {
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .init();
        return None;
    };

    let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::layer().with_writer(writer).with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();
    Some(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(String::as_str);
    if matches!(command, Some("--help") | Some("-h")) {
        println!("{}", USAGE);
        return Ok(());
    }

    let mut config = AppConfig::load().context("Failed to load configuration")?;
    let data_dir = config.data_dir()?;
    let _log_guard = init_tracing(Some(&data_dir.join("logs")));
    info!(version = %config.app_version, env = %config.app_env, api = %config.api_url, "clinica starting");

    let api = connect(&mut config).await?;
    let snapshots = SnapshotStore::new(data_dir.join("snapshots"))?;
    let store = ClinicStore::new(api, Some(snapshots), StoreSettings::from_config(&config));

    match command {
        None => run(store, &config).await,
        Some("--status") => status(&store, &data_dir).await,
        Some("--list") => {
            let collection: Collection = args
                .get(2)
                .ok_or_else(|| anyhow::anyhow!("--list needs a collection name"))?
                .parse()
                .map_err(|e: String| anyhow::anyhow!(e))?;
            list(&store, collection).await
        }
        Some("--sync") => sync_once(&store).await,
        Some("--clear-dropped") => {
            println!("Cleared {} discarded operation(s)", store.clear_dropped());
            Ok(())
        }
        Some("--health") => health(store.api()).await,
        Some("--backup") => backup(store.api()).await,
        Some("--logs") => logs(store.api(), args.get(2).cloned()).await,
        Some(other) => {
            eprintln!("Unknown command: {}\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    }
}

/// Build the API client and overlay the server's `/config`. The server is
/// optional here: when it cannot be reached the local values stand.
async fn connect(config: &mut AppConfig) -> Result<ApiClient> {
    let api = ApiClient::new(config).context("Failed to create API client")?;
    match api.remote_config().await {
        Ok(remote) => {
            config.merge_remote(&remote);
            info!("Remote configuration applied");
            // Timeout, retries and cache settings may have changed
            ApiClient::new(config).context("Failed to create API client")
        }
        Err(e) => {
            warn!(error = %e, "Could not load remote configuration, using local values");
            Ok(api)
        }
    }
}

/// Page-lifecycle analogue: load, then sync in the background until Ctrl-C.
async fn run(store: ClinicStore, config: &AppConfig) -> Result<()> {
    let mut events = store.subscribe();
    let report = store.initialize().await;
    match report.source {
        DataSource::Server => info!(failed = ?report.failed, "Loaded collections from the API"),
        DataSource::Snapshot => warn!("Working offline from local snapshots"),
    }
    for (collection, count) in &report.counts {
        info!(collection = %collection, count, "Collection ready");
    }

    let handle = SyncWorker::spawn(store.clone(), config.sync_interval());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(StoreEvent::ConnectivityChanged { online }) => {
                    info!(online, pending = store.pending_count(), "Connectivity changed");
                }
                Some(StoreEvent::SyncCompleted(report)) if report.confirmed + report.failed > 0 => {
                    info!(confirmed = report.confirmed, failed = report.failed, remaining = report.remaining, "Sync finished");
                }
                Some(StoreEvent::SyncCompleted(_)) => {}
                Some(StoreEvent::OperationDropped(op)) => {
                    warn!(operation = %op.describe(), error = op.last_error.as_deref().unwrap_or("unknown"), "Pending change discarded");
                }
                None => break,
            },
        }
    }

    info!("Shutting down");
    handle.shutdown().await;
    Ok(())
}

async fn status(store: &ClinicStore, data_dir: &Path) -> Result<()> {
    let online = store.check_connectivity().await;
    let snapshots = SnapshotStore::new(data_dir.join("snapshots"))?;
    let ages = snapshots.ages();

    println!("API:      {} ({})", store.api().base_url(), if online { "online" } else { "offline" });
    println!("Data dir: {}", data_dir.display());
    println!();
    println!("{:<12} {:>8}  {}", "Collection", "Records", "Snapshot");
    for collection in Collection::ALL {
        let count = snapshots
            .load_collection(collection)
            .ok()
            .flatten()
            .map_or(0, |cached| cached.data.len());
        println!("{:<12} {:>8}  {}", collection.endpoint(), count, ages.age(collection));
    }

    let pending = store.pending_operations();
    println!();
    println!("Pending operations: {}", pending.len());
    for op in &pending {
        match op.last_error {
            Some(ref error) => println!("  {} (attempts: {}, last error: {})", op.describe(), op.attempts, error),
            None => println!("  {}", op.describe()),
        }
    }
    let dropped = store.dropped_operations();
    if !dropped.is_empty() {
        println!("Discarded after repeated failures: {} (clear with --clear-dropped)", dropped.len());
        for op in &dropped {
            println!("  {}", op.describe());
        }
    }
    Ok(())
}

async fn list(store: &ClinicStore, collection: Collection) -> Result<()> {
    store.initialize().await;
    let records = store.list(collection).await;

    println!("{:<10} {:<8} {}", "ID", "Status", collection.label());
    for record in &records {
        let status = if record.is_pending() { "pending" } else { "synced" };
        println!(
            "{:<10} {:<8} {}",
            record.id.to_string(),
            status,
            truncate_string(&summarize(collection, record), SUMMARY_WIDTH)
        );
    }
    println!("{} record(s){}", records.len(), if store.is_online() { "" } else { " (offline copy)" });
    Ok(())
}

/// One-line description of a record for `--list`.
fn summarize(collection: Collection, record: &CachedRecord) -> String {
    let number = |name: &str| record.data.get(name).and_then(serde_json::Value::as_i64);
    match collection {
        Collection::Pacientes => format!(
            "{} ({})",
            record.field("nombre").unwrap_or("-"),
            format_rut(record.field("rut").unwrap_or_default())
        ),
        Collection::Ventas => format!(
            "patient {} - {} sessions - {}",
            number("paciente_id").unwrap_or_default(),
            number("cantidad_sesiones").unwrap_or_default(),
            format_clp(number("precio_total").unwrap_or_default())
        ),
        Collection::Pagos => format!(
            "sale {} - {} ({})",
            number("venta_id").unwrap_or_default(),
            format_clp(number("monto").unwrap_or_default()),
            record.field("metodo_pago").unwrap_or("-")
        ),
        Collection::Sesiones => format!(
            "sale {} - box {} - {}",
            number("venta_id").unwrap_or_default(),
            number("box_id").unwrap_or_default(),
            record.field("fecha_planificada").map(format_date).unwrap_or_default()
        ),
        Collection::Ofertas | Collection::Boxes => record.field("nombre").unwrap_or("-").to_string(),
    }
}

async fn sync_once(store: &ClinicStore) -> Result<()> {
    store.initialize().await;
    if !store.is_online() {
        println!("API unreachable; {} operation(s) stay queued", store.pending_count());
        return Ok(());
    }
    let report = store.sync_pending().await;
    println!(
        "Confirmed: {}  Failed: {}  Skipped: {}  Discarded: {}  Remaining: {}",
        report.confirmed, report.failed, report.skipped, report.dropped, report.remaining
    );
    Ok(())
}

async fn health(api: &ApiClient) -> Result<()> {
    let health = api.health().await.context("Health check failed")?;
    println!("Status:   {}", if health.status.is_empty() { "ok" } else { health.status.as_str() });
    if let Some(ref version) = health.version {
        println!("Version:  {}", version);
    }
    if let Some(ref database) = health.database {
        println!("Database: {}", database);
    }
    Ok(())
}

async fn backup(api: &ApiClient) -> Result<()> {
    let result = api.create_backup().await.context("Backup failed")?;
    println!("Backup created");
    if !result.is_null() {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    Ok(())
}

async fn logs(api: &ApiClient, entidad: Option<String>) -> Result<()> {
    let query = LogQuery {
        entidad,
        limit: Some(LOG_LIMIT),
        ..LogQuery::default()
    };
    let logs = api.activity_logs(&query).await.context("Failed to fetch activity log")?;
    for log in &logs {
        let fecha = log.fecha.as_deref().map(format_date).unwrap_or_default();
        let usuario = log.usuario.as_deref().unwrap_or("-");
        println!("{:<10} {:<12} {}", fecha, usuario, log.summary());
    }
    if logs.is_empty() {
        println!("No activity recorded");
    }
    Ok(())
}
