// Example runner for the `thermal_sentry` library: replays recorded frames
// through the monitor and logs every alert, the way a live capture loop would.
//
// Usage: thermal_sentry <config.json> <recording.json>
//
// The recording maps sensor addresses to lists of flat 32 x 24 frames:
//   { "0x33": [[21.0, 21.4, ...], ...], "0x34": [...] }

use anyhow::{Context, bail};
use std::collections::HashMap;
use std::env;
use thermal_sentry::config::parse_addr;
use thermal_sentry::monitor::BoxedSource;
use thermal_sentry::{Config, Frame, Monitor, MonitorConfig, ReplaySource};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn load_recording(path: &str) -> anyhow::Result<HashMap<u16, BoxedSource>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let raw: HashMap<String, Vec<Vec<f64>>> =
        serde_json::from_str(&text).with_context(|| format!("parsing {path}"))?;

    let mut sources: HashMap<u16, BoxedSource> = HashMap::new();
    for (key, frames) in raw {
        let addr = parse_addr(&key).map_err(anyhow::Error::msg)?;
        let frames = frames
            .into_iter()
            .map(Frame::from_sensor)
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("frames of sensor {key}"))?;
        sources.insert(addr, Box::new(ReplaySource::new(frames)));
    }
    Ok(sources)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // --- 1. Argument Parsing & Setup ---
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        bail!("usage: {} <config.json> <recording.json>", args[0]);
    }
    let config = Config::from_path(&args[1]).with_context(|| format!("loading {}", args[1]))?;
    let sources = load_recording(&args[2])?;

    // --- 2. Monitoring ---
    let mut monitor = Monitor::from_config(&config, sources, MonitorConfig::default())?;
    info!("Monitoring...");
    while let Some(message) = monitor.next_event().await {
        let trigger = message.event.trigger;
        info!(
            "Alert '{}' triggered by {} with value {:.2} min: {:.2}, avg: {:.2}, med: {:.2}, max: {:.2} ({} triggers)",
            message.event.alert,
            trigger.offender,
            trigger.value,
            message.stats.min,
            message.stats.average,
            message.stats.median,
            message.stats.max,
            message.event.trigger_count,
        );
    }

    // --- 3. Summary ---
    for report in monitor.shutdown().await {
        info!(
            sensor = %report.name,
            frames = report.frames_published,
            dropped = report.events_dropped,
            "sensor finished"
        );
        for (alert, count) in report.trigger_counts {
            info!("  {alert}: {count} triggers");
        }
    }
    Ok(())
}
