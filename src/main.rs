mod abort;
mod config;
mod delegation;
mod predict;
mod scheduler;
mod tracker;
mod web;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::abort::AbortHandle;
use crate::config::Config;
use crate::delegation::{forward_pass_summaries, DelegationService, LocalAgentClient};
use crate::predict::{
    azimuth_to_direction, build_snapshot, find_passes, propagate, ObserverLocation,
    OrbitalElements, ScheduleSnapshot, SnapshotStore, TleLoader,
};
use crate::tracker::{
    Clock, JsonLinesSink, LogSink, SimulatedMount, TelemetryFanout, TrackingLoop,
};

const EARTH_RADIUS_KM: f64 = 6378.137;

#[derive(Parser)]
#[command(name = "sat-track")]
#[command(about = "Satellite antenna tracking")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a TLE file or a directory of them
    CheckTle {
        path: PathBuf,
        /// List the next passes over this point (`"lat, lon"`)
        #[arg(long)]
        observer: Option<String>,
        #[arg(long, default_value_t = 3)]
        passes: usize,
        #[arg(long, default_value_t = 10.0)]
        min_elevation: f64,
    },
    /// Print upcoming passes for the configured satellites
    Predict {
        #[arg(short, long)]
        config: String,
        #[arg(long, default_value_t = 24.0)]
        hours: f64,
    },
    /// Run the tracking loop against the simulated mount
    Run {
        #[arg(short, long)]
        config: String,
        /// Stop after this long (e.g. `90m`); runs until Ctrl-C otherwise
        #[arg(long, value_parser = humantime::parse_duration)]
        duration: Option<Duration>,
        /// Replay from this instant (RFC3339) on a simulated clock
        #[arg(long)]
        start: Option<DateTime<Utc>>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::CheckTle {
            path,
            observer,
            passes,
            min_elevation,
        } => {
            let observer = observer
                .as_deref()
                .map(|c| ObserverLocation::from_coordinates(c, None));
            let observer = match observer {
                Some(None) => {
                    eprintln!("--observer must be \"lat, lon\" in degrees");
                    return ExitCode::FAILURE;
                }
                Some(Some(o)) => Some(o),
                None => None,
            };
            check_tle(path, observer.map(|o| (o, passes, min_elevation)))
        }
        Commands::Predict { config, hours } => predict(&config, hours),
        Commands::Run {
            config,
            duration,
            start,
        } => run(&config, duration, start).await,
    }
}

fn check_tle(path: PathBuf, listing: Option<(ObserverLocation, usize, f64)>) -> ExitCode {
    let report = match TleLoader::new(path).load() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error loading elements: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!(
        "{} element sets loaded, {} rejected",
        report.elements.len(),
        report.rejected.len()
    );
    for elements in &report.elements {
        println!(
            "  {:>6} {:<24} epoch {}",
            elements.norad_id,
            elements.display_name(),
            elements.epoch.format("%Y-%m-%d %H:%M:%S")
        );
        if let Some((observer, count, min_elevation)) = &listing {
            print_next_passes(elements, observer, *count, *min_elevation);
        }
    }
    for rejected in &report.rejected {
        println!(
            "  record {} ({}): {}",
            rejected.position,
            rejected.name.as_deref().unwrap_or("unnamed"),
            rejected.error
        );
    }

    if report.elements.is_empty() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn print_next_passes(
    elements: &OrbitalElements,
    observer: &ObserverLocation,
    count: usize,
    min_elevation_deg: f64,
) {
    match propagate(elements, elements.epoch) {
        Ok(state) => {
            let [x, y, z] = state.position_km;
            let altitude = (x * x + y * y + z * z).sqrt() - EARTH_RADIUS_KM;
            println!("         altitude at epoch {:.0} km", altitude);
        }
        Err(e) => {
            println!("         cannot propagate: {}", e);
            return;
        }
    }

    let now = Utc::now();
    let finder = match find_passes(
        elements,
        observer,
        now,
        now + chrono::Duration::hours(24),
        min_elevation_deg,
    ) {
        Ok(f) => f,
        Err(e) => {
            println!("         cannot predict: {}", e);
            return;
        }
    };
    for pass in finder.take(count) {
        match pass {
            Ok(pass) => println!(
                "         {} {:>4}s max {:5.1}°",
                pass.rise.format("%Y-%m-%d %H:%M:%S"),
                pass.duration().num_seconds(),
                pass.max_elevation_deg
            ),
            Err(e) => {
                println!("         pass search stopped: {}", e);
                break;
            }
        }
    }
}

fn load_config(path: &str) -> Option<Config> {
    match Config::from_file(path) {
        Ok(c) => Some(c),
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            None
        }
    }
}

/// Loads the configured elements and predicts `[from, from + horizon]`.
fn load_snapshot(
    config: &Config,
    from: DateTime<Utc>,
    horizon: Duration,
) -> Result<ScheduleSnapshot, String> {
    let observer = config.observer().map_err(|e| e.to_string())?;
    let settings = config.pass_settings().map_err(|e| e.to_string())?;
    let horizon = chrono::Duration::from_std(horizon).map_err(|e| e.to_string())?;

    let report = TleLoader::new(config.elements.path.clone())
        .load()
        .map_err(|e| e.to_string())?;
    let (catalog, missing) = config.catalog(&report.latest_by_id());
    for id in missing {
        log::warn!("No elements loaded for satellite {}", id);
    }

    let snapshot = build_snapshot(&catalog, &observer, from, from + horizon, &settings);
    for excluded in &snapshot.excluded {
        log::warn!("Satellite {} excluded: {}", excluded.satellite, excluded.reason);
    }
    log::info!(
        "Schedule covers {} satellites, {} passes until {}",
        snapshot.satellites(),
        snapshot.candidates.len(),
        snapshot.to
    );
    Ok(snapshot)
}

fn predict(config_path: &str, hours: f64) -> ExitCode {
    let Some(config) = load_config(config_path) else {
        return ExitCode::FAILURE;
    };
    if !(hours.is_finite() && hours > 0.0) {
        eprintln!("--hours must be positive");
        return ExitCode::FAILURE;
    }

    let horizon = Duration::from_secs_f64(hours * 3600.0);
    let snapshot = match load_snapshot(&config, Utc::now(), horizon) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Prediction failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Some(name) = &config.station.name {
        println!("Passes over {}", name);
    }
    for candidate in &snapshot.candidates {
        let pass = &candidate.pass;
        println!(
            "  {:>6} {:<8} {} - {} ({:>2}m{:02}s)  max {:5.1}° at {}  {} -> {}{}",
            pass.satellite,
            <&'static str>::from(candidate.priority),
            pass.rise.format("%Y-%m-%d %H:%M:%S"),
            pass.set.format("%H:%M:%S"),
            pass.duration().num_minutes(),
            pass.duration().num_seconds() % 60,
            pass.max_elevation_deg,
            pass.culmination.format("%H:%M:%S"),
            azimuth_to_direction(pass.rise_azimuth_deg),
            azimuth_to_direction(pass.set_azimuth_deg),
            if pass.truncated_start || pass.truncated_end {
                " (partial)"
            } else {
                ""
            }
        );
    }
    println!("{} passes", snapshot.candidates.len());
    ExitCode::SUCCESS
}

async fn run(
    config_path: &str,
    duration: Option<Duration>,
    start: Option<DateTime<Utc>>,
) -> ExitCode {
    let Some(config) = load_config(config_path) else {
        return ExitCode::FAILURE;
    };
    let config = Arc::new(config);
    let settings = match config.tracking_settings() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let clock = match start {
        Some(start) => Clock::Simulated { start },
        None => Clock::Wall,
    };
    let started = tokio::time::Instant::now();
    let from = start.unwrap_or_else(Utc::now);
    let snapshot = match load_snapshot(&config, from, config.predict.horizon) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Prediction failed: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let snapshots = Arc::new(SnapshotStore::new(snapshot));

    let abort = AbortHandle::new();
    {
        let abort = abort.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                abort.abort("interrupted");
            }
        });
    }
    if let Some(duration) = duration {
        let abort = abort.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            abort.abort("run duration elapsed");
        });
    }

    // Element refresh
    {
        let config = config.clone();
        let snapshots = snapshots.clone();
        let mut signal = abort.signal();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = signal.aborted() => break,
                    _ = tokio::time::sleep(config.elements.refresh) => {}
                }
                let from = match start {
                    Some(start) => {
                        start
                            + chrono::Duration::from_std(started.elapsed())
                                .unwrap_or(chrono::Duration::zero())
                    }
                    None => Utc::now(),
                };
                let cfg = config.clone();
                let rebuilt = tokio::task::spawn_blocking(move || {
                    load_snapshot(&cfg, from, cfg.predict.horizon)
                })
                .await;
                match rebuilt {
                    // The loop may already be stowing; leave its schedule alone.
                    Ok(Ok(_)) if signal.is_aborted() => break,
                    Ok(Ok(snapshot)) => {
                        snapshots.replace(snapshot);
                        log::info!("Schedule refreshed");
                    }
                    Ok(Err(e)) => log::warn!("Element refresh failed, keeping old schedule: {}", e),
                    Err(e) => log::warn!("Element refresh task failed: {}", e),
                }
            }
        });
    }

    let mut sink = TelemetryFanout::new().with(LogSink);
    if let Some(telemetry) = &config.telemetry {
        match JsonLinesSink::open(&telemetry.path) {
            Ok(s) => sink = sink.with(s),
            Err(e) => {
                eprintln!("Error opening telemetry file: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    let mount = SimulatedMount::new(settings.stow, settings.max_slew_rate_deg_s);
    let mount_handle = mount.handle();
    let mut tracking = match TrackingLoop::new(mount, snapshots.clone(), settings) {
        Ok(t) => t.with_sink(sink).with_clock(clock),
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let delegation = match &config.delegation {
        Some(delegation_config) => {
            let mut service =
                match DelegationService::new(LocalAgentClient::new(), delegation_config.clone()) {
                    Ok(s) => s,
                    Err(e) => {
                        eprintln!("{}", e);
                        return ExitCode::FAILURE;
                    }
                };
            if let Err(e) = service.connect().await {
                eprintln!("Error connecting to delegation agent: {}", e);
                return ExitCode::FAILURE;
            }
            let (tx, mut rx) = mpsc::channel(delegation_config.queue_capacity);
            tracking = tracking.with_summaries(tx);
            Some(tokio::spawn(async move {
                forward_pass_summaries(&mut service, &mut rx).await;
                log::info!(
                    "Delegation worker stopped, {} tasks outstanding",
                    service.queue_status().len()
                );
                service.disconnect();
            }))
        }
        None => None,
    };

    let server = config.web.as_ref().map(|web_config| {
        let state = web::AppState {
            station: config.station.name.clone(),
            status: tracking.status_handle(),
            snapshots: snapshots.clone(),
            abort: abort.clone(),
        };
        let bind = web_config.bind.clone();
        let signal = abort.signal();
        tokio::spawn(async move {
            if let Err(e) = web::run_server(&bind, state, signal).await {
                log::error!("Status API failed: {}", e);
            }
        })
    });

    let result = tracking.run(abort.signal()).await;
    abort.abort("tracking loop finished");

    // The summary sender went away with the loop, so this drains and ends.
    if let Some(handle) = delegation {
        let _ = handle.await;
    }
    if let Some(handle) = server {
        let _ = handle.await;
    }

    let position = mount_handle.position();
    log::info!(
        "Mount accepted {} commands, resting at az {:.1}° el {:.1}°",
        mount_handle.commands().len(),
        position.azimuth_deg,
        position.elevation_deg
    );

    match result {
        Ok(report) => {
            println!(
                "Tracking finished: {} ticks, {} passes tracked, {} degraded",
                report.ticks, report.passes_tracked, report.passes_degraded
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Tracking stopped: {}", e);
            ExitCode::FAILURE
        }
    }
}
