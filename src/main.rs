// ███████╗██████╗ ███████╗██╗ ██████╗ ██╗  ██╗████████╗
// ██╔════╝██╔══██╗██╔════╝██║██╔════╝ ██║  ██║╚══██╔══╝
// █████╗  ██████╔╝█████╗  ██║██║  ███╗███████║   ██║
// ██╔══╝  ██╔══██╗██╔══╝  ██║██║   ██║██╔══██║   ██║
// ██║     ██║  ██║███████╗██║╚██████╔╝██║  ██║   ██║
// ╚═╝     ╚═╝  ╚═╝╚══════╝╚═╝ ╚═════╝ ╚═╝  ╚═╝   ╚═╝
//
// T R A C E
//
// Paste bills of lading, bookings or container numbers. Every carrier gets
// asked at once, the first real answer wins, and answers that turn out to
// describe the same boxes are folded into one shipment.

use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context, Result};
use crossbeam_channel::Receiver;
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use freight_trace_engine::metrics::MetricsCollector;
use freight_trace_engine::session::split_values;
use freight_trace_engine::{
    AdapterRegistry, Config, Orchestrator, ProgressStatus, SearchController, SessionUpdate,
};

fn print_banner() {
    let banner = r#"
    ╔══════════════════════════════════════════════════════════════════╗
    ║                                                                  ║
    ║        ⚓ FREIGHT TRACE - MULTI-CARRIER SHIPMENT LOOKUP ⚓        ║
    ║                                                                  ║
    ║   Race:      every carrier at once, first real answer wins       ║
    ║   Cache:     LRU + TTL, keyed by normalized tracking value       ║
    ║   Merge:     results sharing a container become one shipment     ║
    ║                                                                  ║
    ╚══════════════════════════════════════════════════════════════════╝
    "#;
    eprintln!("{}", banner);
}

fn usage() -> &'static str {
    "usage: freight-trace [--refresh] VALUE..."
}

/// Logs what the session is doing. Runs on its own thread until every
/// sender is gone; race losers still settling in the background keep one.
fn drain_updates(rx: Receiver<SessionUpdate>) {
    for update in rx.iter() {
        match update {
            SessionUpdate::AdapterProgress { value, progress, .. } => match progress.status {
                ProgressStatus::Error => warn!(
                    value = %value,
                    adapter = %progress.adapter_name,
                    detail = progress.detail.as_deref().unwrap_or(""),
                    "❌ carrier error"
                ),
                status => debug!(value = %value, adapter = %progress.adapter_name, %status, "carrier progress"),
            },
            SessionUpdate::Retrying { value, attempt, backoff } => {
                info!(value = %value, attempt, ?backoff, "🔁 retrying")
            }
            SessionUpdate::ShipmentUpdated { value, created, shipment } => {
                info!(value = %value, created, "📦 {}", shipment)
            }
            SessionUpdate::BatchProgress { completed, total } => {
                info!("⏳ {}/{} tracking values done", completed, total)
            }
            SessionUpdate::Finished { failures, .. } => {
                info!(failed = failures.len(), "✅ search finished")
            }
            SessionUpdate::Cancelled { generation } => warn!(generation, "🛑 search cancelled"),
        }
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    let mut force_refresh = false;
    let mut raw = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--refresh" | "-r" => force_refresh = true,
            "--help" | "-h" => {
                println!("{}", usage());
                return Ok(());
            }
            _ => raw.push(arg),
        }
    }
    let values = split_values(&raw.join(" "));
    if values.is_empty() {
        bail!(usage());
    }

    print_banner();

    let config = Config::from_env();
    let registry = AdapterRegistry::from_config(&config).context("building carrier adapters")?;
    if registry.is_empty() {
        bail!("no carriers configured; set FREIGHT_TRACE_ADAPTERS (id|Name|url-template[|tier];...)");
    }
    info!(carriers = registry.len(), values = values.len(), force_refresh, "🚢 freight trace starting");

    let metrics = Arc::new(MetricsCollector::new());
    let orchestrator = Arc::new(Orchestrator::new(registry, &config, metrics.clone()));

    let (update_tx, update_rx) = crossbeam_channel::unbounded();
    thread::Builder::new()
        .name("session-updates".into())
        .spawn(move || drain_updates(update_rx))
        .context("spawning update logger")?;

    let mut controller = SearchController::new(orchestrator.clone(), &config).with_updates(update_tx);

    let handle = controller.handle();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                warn!("🛑 Ctrl-C received, cancelling search");
                handle.cancel();
            }
            Err(err) => error!("❌ Signal listener error: {}", err),
        }
    });

    let report = controller.search(&values, force_refresh).await;

    for shipment in controller.shipments() {
        match shipment.latest_event() {
            Some(event) => info!("📍 {}: {} at {} ({})", shipment.id, event.description, event.location, event.date),
            None => info!("📍 {}: no events yet", shipment.id),
        }
    }
    let json = serde_json::to_string_pretty(controller.shipments())?;
    println!("{}", json);

    info!(metrics = ?metrics.snapshot(), cache = ?orchestrator.cache().snapshot(), "📊 run complete");

    drop(controller);

    if report.cancelled {
        bail!("search cancelled");
    }
    if let Some(message) = report.error_message() {
        eprintln!("{}", message);
        std::process::exit(1);
    }
    Ok(())
}
