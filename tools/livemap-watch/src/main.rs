use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::fmt::format::Format;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use livemap_core::alerts::{fetch_alerts, visible_alerts};
use livemap_core::aux_geometry::AuxGeometryLoader;
use livemap_core::config::{ChannelSettings, Endpoints, Preferences};
use livemap_core::live::{ChannelHandle, Debouncer, HttpSource, LiveChannel, RefreshRate, VehicleSource};
use livemap_core::map::InMemorySurface;
use livemap_core::marker::MarkerId;
use livemap_core::transit::{ShapeCatalog, VehicleCollection};
use livemap_core::LiveMap;

mod output;
mod summary;

use output::{surface_to_collection, write_snapshot_geojson};
use summary::{log_tallies, WatchStats};

/// Quiet period before a changed map is written out again
const SNAPSHOT_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Parser, Debug)]
#[command(
    name = "livemap-watch",
    author,
    version,
    about = "Follow a live transit vehicle feed and keep a rendered map in memory",
    long_about = "Polls the feed's /vehicles endpoint, upgrades to the /vehicles/stream \
                  event stream when the refresh rate is 'immediate', and keeps a \
                  headless map of markers current.\n\n\
                  Rail vehicles are snapped onto their route shapes once those have \
                  loaded. Per-category tallies are logged after each update, and the \
                  rendered markers can be written out as a GeoJSON FeatureCollection."
)]
struct Args {
    /// Base URL of the vehicle feed
    #[arg(short, long, env = "LIVEMAP_BASE_URL")]
    base_url: String,

    /// Refresh rate in seconds, or "immediate" to stream. Overrides the saved preference.
    #[arg(short, long, env = "LIVEMAP_REFRESH")]
    refresh: Option<RefreshRate>,

    /// Write the rendered markers to this GeoJSON file after each update
    #[arg(short, long)]
    snapshot: Option<PathBuf>,

    /// Fetch once, render, and exit
    #[arg(long)]
    once: bool,

    /// Stop after this many updates
    #[arg(long)]
    max_updates: Option<usize>,

    /// Also print the active service alerts
    #[arg(long)]
    alerts: bool,

    /// Follow one vehicle by id and log its popup on each update
    #[arg(long)]
    track: Option<String>,

    /// Third-party overlay GeoJSON to load alongside the feed
    #[arg(long)]
    aux_url: Option<String>,

    /// Directory for cached overlay data
    #[arg(long, default_value = ".livemap-cache")]
    cache_dir: PathBuf,

    /// Preferences file, created on exit if missing
    #[arg(long, default_value = "livemap-prefs.json")]
    prefs: PathBuf,

    /// Verbose output (show debug messages)
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(Format::default().without_time()))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    info!("=== Live Map Watch ===");
    info!("Feed: {}", args.base_url);

    if args.base_url.trim().is_empty() {
        bail!("Base URL must not be empty");
    }

    let mut prefs = Preferences::load(&args.prefs);
    if let Some(rate) = args.refresh {
        prefs.refresh_rate = rate;
    }
    info!("Refresh rate: {}", prefs.refresh_rate);

    let settings = ChannelSettings::default();
    let source = HttpSource::new(Endpoints::new(args.base_url.clone()), settings.request_timeout);

    let mut map = LiveMap::new(InMemorySurface::new());
    map.restore_visibility(prefs.layers.clone());

    if args.alerts {
        report_alerts(&source).await;
    }

    let overlay = args.aux_url.as_ref().map(|url| {
        AuxGeometryLoader::new(url.clone(), args.cache_dir.clone()).spawn(prefs.third_party_opt_out)
    });

    let mut stats = WatchStats::default();
    if args.once {
        run_once(&args, &source, &mut map, &mut stats).await?;
    } else {
        run_live(&args, source, prefs.refresh_rate, settings, &mut map, &mut stats).await?;
    }

    if let Some(overlay) = overlay {
        match overlay.await {
            Ok(Some(collection)) => info!("Overlay: {} features", collection.features.len()),
            Ok(None) => info!("Overlay skipped"),
            Err(e) => warn!("Overlay task failed: {e}"),
        }
    }

    info!("");
    stats.log_summary(map.tallies());

    prefs.layers = map.visibility().clone();
    prefs
        .save(&args.prefs)
        .with_context(|| format!("Failed to save preferences to {}", args.prefs.display()))?;

    Ok(())
}

async fn run_once(
    args: &Args,
    source: &HttpSource,
    map: &mut LiveMap<InMemorySurface>,
    stats: &mut WatchStats,
) -> Result<()> {
    let body = source
        .fetch_vehicles()
        .await
        .context("Failed to fetch vehicles")?;
    let collection = VehicleCollection::from_geojson(&body).context("Failed to parse vehicles")?;

    // First paint goes out unsnapped, shapes follow
    render(args, map, &collection, stats);
    stats.updates += 1;

    if let Some(shapes) = load_shapes(source).await {
        map.set_shapes(shapes);
        render(args, map, &collection, stats);
    }

    if let Some(path) = &args.snapshot {
        write_snapshot_geojson(surface_to_collection(map.surface()), path)
            .context("Failed to write snapshot")?;
        info!("Wrote snapshot to {}", path.display());
    }

    Ok(())
}

async fn run_live(
    args: &Args,
    source: HttpSource,
    rate: RefreshRate,
    settings: ChannelSettings,
    map: &mut LiveMap<InMemorySurface>,
    stats: &mut WatchStats,
) -> Result<()> {
    let (sink, mut updates) = mpsc::channel(16);
    let (handle, controls) = ChannelHandle::new();
    let channel = LiveChannel::new(source.clone(), rate, settings);
    let task = tokio::spawn(channel.run(sink, controls));

    // Shapes are fetched once the first vehicles are on screen
    let (shapes_tx, mut shapes_rx) = mpsc::channel(1);
    let mut shapes_requested = false;
    let mut snapshots = Debouncer::new(SNAPSHOT_DEBOUNCE);

    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(update) = update else { break };
                stats.record_update(&update);
                if update.stale {
                    warn!("Feed unreachable, showing last known positions");
                }
                render(args, map, &update.collection, stats);

                if !shapes_requested {
                    shapes_requested = true;
                    let source = source.clone();
                    let tx = shapes_tx.clone();
                    tokio::spawn(async move {
                        if let Some(shapes) = load_shapes(&source).await {
                            let _ = tx.send(shapes).await;
                        }
                    });
                }

                if let Some(path) = &args.snapshot {
                    let collection = surface_to_collection(map.surface());
                    let path = path.clone();
                    snapshots.schedule(async move {
                        if let Err(e) = write_snapshot_geojson(collection, &path) {
                            warn!("{e:#}");
                        }
                    });
                }

                if args.max_updates.is_some_and(|max| stats.updates >= max) {
                    info!("Reached {} updates, stopping", stats.updates);
                    handle.shutdown().await;
                }
            }
            Some(shapes) = shapes_rx.recv() => {
                map.set_shapes(shapes);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping");
                handle.shutdown().await;
            }
        }
    }

    snapshots.flush().await;
    let delivered = task.await.context("Live channel task failed")?;
    info!("Live channel delivered {delivered} updates");
    Ok(())
}

fn render(
    args: &Args,
    map: &mut LiveMap<InMemorySurface>,
    collection: &VehicleCollection,
    stats: &mut WatchStats,
) {
    let report = map.render(collection);
    stats.record_render(&report);
    info!(
        "Rendered {} features: +{} ~{} -{} ({} snapped)",
        collection.features.len(),
        report.diff.created,
        report.diff.updated,
        report.diff.removed,
        report.snapped
    );
    log_tallies(map.tallies());

    if let Some(id) = &args.track {
        if map.tracked().is_none() && map.track(id.as_str()) {
            info!("Tracking {id}");
        }
        match map.popup(&MarkerId::new(id), Utc::now()) {
            Some(popup) => {
                info!("  {}", popup.title);
                for (label, value) in &popup.rows {
                    info!("    {label}: {value}");
                }
            }
            None => info!("  {id} is not on the map"),
        }
    }
}

async fn load_shapes(source: &HttpSource) -> Option<ShapeCatalog> {
    let body = match source.fetch_shapes().await {
        Ok(body) => body,
        Err(e) => {
            warn!("Route shapes unavailable, vehicles stay unsnapped: {e}");
            return None;
        }
    };
    match ShapeCatalog::from_geojson(&body) {
        Ok(shapes) => {
            info!("Loaded {} route shapes", shapes.len());
            Some(shapes)
        }
        Err(e) => {
            warn!("Could not parse route shapes: {e}");
            None
        }
    }
}

async fn report_alerts(source: &HttpSource) {
    let alerts = match fetch_alerts(source).await {
        Ok(alerts) => alerts,
        Err(e) => {
            warn!("Alerts unavailable: {e}");
            return;
        }
    };

    let visible = visible_alerts(&alerts, Utc::now());
    if visible.is_empty() {
        info!("No active alerts");
        return;
    }

    info!("{} active alerts:", visible.len());
    for alert in visible {
        info!("  [{}] {}", alert.level(), alert.header);
    }
}
