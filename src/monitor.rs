// THEORY:
// The `monitor` module runs many sensors at once. Each sensor gets one worker
// task that owns its `SensorPipeline` and `FrameSource`, captures frames in a
// loop and publishes what it finds.
//
// Key architectural principles:
// 1.  **One Owner per Alert**: A pipeline (and therefore each of its alerts) lives
//     inside exactly one worker. Alerts need no locks.
// 2.  **Bounded Delivery**: Trigger events go onto a bounded channel that the caller
//     drains at its own pace. Each event carries a full frame, so the queue holds
//     at most `event_capacity` of them. When it is full the new event is dropped,
//     logged and counted in the sensor's report; capture never waits on a slow
//     consumer and the latest-frame board keeps updating.
// 3.  **Bounded CPU Work**: Capturing and auto-cropping are blocking, CPU-bound
//     steps. They run on the blocking pool, gated by a semaphore sized from the
//     number of cores, so a dozen sensors cannot starve the runtime.
// 4.  **Latest-Frame Board**: The most recent analysis per sensor is kept in a
//     shared map so a display can poll it without touching the workers.
// 5.  **Cooperative Shutdown**: A watch flag stops every worker; `shutdown` joins
//     them and returns each sensor's final trigger tallies.

use crate::config::Config;
use crate::core_modules::alert::TriggerEvent;
use crate::core_modules::frame::CropRect;
use crate::error::{Result, ThermalError};
use crate::pipeline::{FrameAnalysis, FrameSource, FrameStats, SensorPipeline};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{RwLock, Semaphore, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// A frame source that can be moved onto a worker.
pub type BoxedSource = Box<dyn FrameSource + Send>;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);
const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Tuning for the monitor's workers.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Captures allowed to run at the same time.
    pub worker_permits: usize,
    /// Pause between two captures of the same sensor.
    pub poll_interval: Duration,
    /// Undelivered events kept before new ones are dropped.
    pub event_capacity: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            worker_permits: num_cpus::get().max(1),
            poll_interval: DEFAULT_POLL_INTERVAL,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// A trigger event tagged with the sensor and frame it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorEvent {
    pub sensor: u16,
    pub sensor_name: String,
    /// The crop applied to the published frame.
    pub crop: CropRect,
    /// Statistics of the published (cropped) frame.
    pub stats: FrameStats,
    pub event: TriggerEvent,
}

/// Final tallies of one sensor worker.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReport {
    pub sensor: u16,
    pub name: String,
    pub frames_published: u64,
    /// Events discarded because the queue was full.
    pub events_dropped: u64,
    /// `(alert name, trigger count)` in registration order.
    pub trigger_counts: Vec<(String, u64)>,
}

impl From<&SensorPipeline> for SensorReport {
    fn from(pipeline: &SensorPipeline) -> Self {
        Self {
            sensor: pipeline.addr(),
            name: pipeline.name().to_string(),
            frames_published: pipeline.frames_published(),
            events_dropped: 0,
            trigger_counts: pipeline
                .alerts()
                .iter()
                .map(|a| (a.name().to_string(), a.trigger_count()))
                .collect(),
        }
    }
}

/// Shared state handed to every worker.
#[derive(Clone)]
struct WorkerContext {
    events: mpsc::Sender<SensorEvent>,
    latest: Arc<RwLock<HashMap<u16, FrameAnalysis>>>,
    permits: Arc<Semaphore>,
    running: watch::Receiver<bool>,
    poll_interval: Duration,
}

/// Concurrent capture loop over a set of sensors.
pub struct Monitor {
    events: mpsc::Receiver<SensorEvent>,
    latest: Arc<RwLock<HashMap<u16, FrameAnalysis>>>,
    running: watch::Sender<bool>,
    workers: Vec<JoinHandle<SensorReport>>,
}

impl Monitor {
    /// Spawns one worker per `(pipeline, source)` pair. Must be called inside a
    /// tokio runtime.
    pub fn start(sensors: Vec<(SensorPipeline, BoxedSource)>, config: MonitorConfig) -> Self {
        let (event_sender, events) = mpsc::channel(config.event_capacity.max(1));
        let (running, running_receiver) = watch::channel(true);
        let latest = Arc::new(RwLock::new(HashMap::new()));

        let context = WorkerContext {
            events: event_sender,
            latest: latest.clone(),
            permits: Arc::new(Semaphore::new(config.worker_permits.max(1))),
            running: running_receiver,
            poll_interval: config.poll_interval,
        };

        let workers = sensors
            .into_iter()
            .map(|(pipeline, source)| tokio::spawn(Self::run_sensor(pipeline, source, context.clone())))
            .collect();

        Self {
            events,
            latest,
            running,
            workers,
        }
    }

    /// Starts a worker for every configured sensor that has a source.
    ///
    /// A source for an address missing from `config` fails with `UnknownSensor`.
    pub fn from_config(
        config: &Config,
        mut sources: HashMap<u16, BoxedSource>,
        monitor_config: MonitorConfig,
    ) -> Result<Self> {
        if let Some(&addr) = sources.keys().find(|addr| config.sensor(**addr).is_err()) {
            return Err(ThermalError::UnknownSensor(addr));
        }

        let mut sensors = Vec::new();
        for settings in config.sensor_settings() {
            match sources.remove(&settings.addr) {
                Some(source) => sensors.push((SensorPipeline::new(settings)?, source)),
                None => warn!(sensor = %settings.name, "no frame source, sensor skipped"),
            }
        }
        Ok(Self::start(sensors, monitor_config))
    }

    async fn run_sensor(
        mut pipeline: SensorPipeline,
        mut source: BoxedSource,
        mut context: WorkerContext,
    ) -> SensorReport {
        let addr = pipeline.addr();
        let name = pipeline.name().to_string();
        info!(sensor = %name, "capture worker started");
        let mut events_dropped = 0u64;

        while *context.running.borrow() {
            let Ok(permit) = context.permits.clone().acquire_owned().await else {
                break;
            };
            let last_report = SensorReport {
                events_dropped,
                ..SensorReport::from(&pipeline)
            };
            let joined = tokio::task::spawn_blocking(move || {
                let analysis = pipeline.capture(source.as_mut());
                let closed = source.is_closed();
                (pipeline, source, analysis, closed)
            })
            .await;
            drop(permit);

            let (returned_pipeline, returned_source, analysis, closed) = match joined {
                Ok(parts) => parts,
                Err(err) => {
                    error!(sensor = %name, error = %err, "capture worker panicked");
                    return last_report;
                }
            };
            pipeline = returned_pipeline;
            source = returned_source;

            if let Some(analysis) = analysis {
                for event in &analysis.events {
                    let message = SensorEvent {
                        sensor: addr,
                        sensor_name: name.clone(),
                        crop: analysis.crop,
                        stats: analysis.stats,
                        event: event.clone(),
                    };
                    match context.events.try_send(message) {
                        Ok(()) => {}
                        Err(TrySendError::Full(dropped)) => {
                            events_dropped += 1;
                            warn!(
                                sensor = %name,
                                alert = %dropped.event.alert,
                                dropped = events_dropped,
                                "event queue full, event dropped"
                            );
                        }
                        Err(TrySendError::Closed(_)) => {
                            warn!(sensor = %name, "event receiver dropped");
                        }
                    }
                }
                context.latest.write().await.insert(addr, analysis);
            }

            if closed {
                info!(sensor = %name, "frame source closed");
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(context.poll_interval) => {}
                changed = context.running.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(sensor = %name, frames = pipeline.frames_published(), "capture worker stopped");
        SensorReport {
            events_dropped,
            ..SensorReport::from(&pipeline)
        }
    }

    /// Waits for the next trigger event. `None` once every worker has stopped and
    /// the queue is drained.
    pub async fn next_event(&mut self) -> Option<SensorEvent> {
        self.events.recv().await
    }

    /// The next queued trigger event, if one is already waiting.
    pub fn try_next_event(&mut self) -> Option<SensorEvent> {
        self.events.try_recv().ok()
    }

    /// The most recent analysis published for `addr`.
    pub async fn latest(&self, addr: u16) -> Option<FrameAnalysis> {
        self.latest.read().await.get(&addr).cloned()
    }

    /// Addresses that have published at least one frame, sorted.
    pub async fn active_sensors(&self) -> Vec<u16> {
        let mut addrs: Vec<u16> = self.latest.read().await.keys().copied().collect();
        addrs.sort_unstable();
        addrs
    }

    /// Stops every worker and returns their final reports.
    pub async fn shutdown(self) -> Vec<SensorReport> {
        // Workers that already finished have dropped their receivers.
        let _ = self.running.send(false);
        join_all(self.workers)
            .await
            .into_iter()
            .filter_map(|joined| match joined {
                Ok(report) => Some(report),
                Err(err) => {
                    error!(error = %err, "capture worker failed to join");
                    None
                }
            })
            .collect()
    }
}
