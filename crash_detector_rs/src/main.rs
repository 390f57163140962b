use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use crash_detector_rs::simulation::{ReplaySource, Scenario};
use crash_detector_rs::{
    CrashDetectionService, CrashDetector, CrashSettingsRepository, ManualCooldownScheduler,
    SensitivityLevel, SensorAvailability, SensorEvent,
};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "crash_detector")]
#[command(about = "Replay sensor traces through the crash detector", long_about = None)]
struct Args {
    /// JSON-lines file of sensor events
    #[arg(long, conflicts_with = "simulate")]
    log: Option<PathBuf>,

    /// Built-in trace (resting, free-fall-crash, pothole, direct-impact)
    #[arg(long)]
    simulate: Option<Scenario>,

    /// LOW, MEDIUM or HIGH
    #[arg(long, default_value = "MEDIUM")]
    sensitivity: SensitivityLevel,

    /// Persisted settings file; overrides --sensitivity
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Pretend the device has no gyroscope
    #[arg(long)]
    no_gyro: bool,

    /// Pretend the device has no linear acceleration sensor
    #[arg(long)]
    no_linear: bool,

    /// Write the final detector status here
    #[arg(long)]
    status_out: Option<PathBuf>,
}

fn load_log(path: &Path) -> Result<Vec<SensorEvent>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut events = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: SensorEvent = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: bad sensor event", path.display(), i + 1))?;
        events.push(event);
    }
    Ok(events)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let sensitivity = match &args.settings {
        Some(path) => {
            let settings = CrashSettingsRepository::open(path)?.current();
            if !settings.detection_enabled {
                log::warn!("Detection disabled in {}, nothing to do", path.display());
                return Ok(());
            }
            settings.sensitivity
        }
        None => args.sensitivity,
    };

    let availability = SensorAvailability {
        linear_acceleration: !args.no_linear,
        gyroscope: !args.no_gyro,
        ..SensorAvailability::all()
    };

    let mut events = match (&args.log, args.simulate) {
        (Some(path), _) => load_log(path)?,
        (None, Some(scenario)) => scenario.events(args.no_linear),
        (None, None) => bail!("either --log or --simulate is required"),
    };
    events.sort_by_key(|e| e.timestamp_ms);

    log::info!(
        "[{}] Replaying {} events (sensitivity {})",
        Utc::now().format("%H:%M:%S"),
        events.len(),
        sensitivity
    );

    let source = Arc::new(ReplaySource::new(availability));
    let scheduler = Arc::new(ManualCooldownScheduler::new());
    let service = CrashDetectionService::new(
        CrashDetector::new(sensitivity),
        source.clone(),
        scheduler.clone(),
    );
    service.start()?;

    let mut skipped = 0usize;
    let mut crashes = 0usize;
    for event in &events {
        scheduler.fire_due(event.timestamp_ms);
        if !source.delivers(event.kind) {
            skipped += 1;
            continue;
        }
        if let Some(crash) = service.on_sensor_event(event)? {
            crashes += 1;
            println!("{}", serde_json::to_string(&crash)?);
        }
    }

    let status = service.status()?;
    log::info!("=== Replay Summary ===");
    log::info!("Events: {} ({} from unregistered sensors skipped)", events.len(), skipped);
    for line in status.to_string().lines() {
        log::info!("{}", line);
    }
    if let Some(path) = &args.status_out {
        status
            .save(path)
            .with_context(|| format!("writing status to {}", path.display()))?;
        log::info!("Status written to {}", path.display());
    }
    service.stop()?;

    if crashes == 0 {
        log::info!("No crash detected");
    }
    Ok(())
}
