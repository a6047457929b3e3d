// THEORY:
// The `pipeline` module is the per-sensor entry point of the engine. It wraps the
// core modules into one call that turns a raw compensated frame into a published,
// cropped frame plus the alert events it caused.
//
// Stages, in order:
// 1.  **Outlier Suppression**: Samples far from the frame average (relative to the
//     average itself) are replaced by the average, masking dead or hot pixels.
// 2.  **Calibration**: The sensor's constant offset is added to every sample.
// 3.  **Validity Window**: A frame with any sample outside the configured window is
//     discarded as a bad read. Discarded frames never reach the alerts.
// 4.  **Crop**: Either the configured rectangle or the hottest region found by
//     change-point segmentation. A failed auto crop falls back to the full frame.
// 5.  **Alert Evaluation**: Every registered alert sees the calibrated full frame,
//     in registration order. Triggers come back as `TriggerEvent` values.
//
// The pipeline owns its alerts, so each alert has exactly one evaluator. Frame
// acquisition is behind the `FrameSource` trait; the pipeline never touches
// hardware.

use crate::config::{Config, CropConfig, SensorSettings};
use crate::core_modules::alert::{Alert, TriggerEvent};
use crate::core_modules::frame::{CropRect, Frame, Temperature};
use crate::core_modules::region_selector::region_selector::find_hottest_region;
use crate::core_modules::segmenter::Segmenter;
use crate::error::Result;
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Supplier of compensated frames for one sensor.
pub trait FrameSource {
    /// The next frame, or `Ok(None)` when no frame is ready yet.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// True once the source will never produce another frame.
    fn is_closed(&self) -> bool {
        false
    }
}

impl<F> FrameSource for F
where
    F: FnMut() -> Result<Option<Frame>>,
{
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self()
    }
}

/// Plays back a fixed list of recorded frames, then closes.
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    frames: VecDeque<Frame>,
}

impl ReplaySource {
    pub fn new(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.frames.pop_front())
    }

    fn is_closed(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Summary statistics of a published frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub min: Temperature,
    pub average: Temperature,
    pub median: Temperature,
    pub max: Temperature,
}

impl FrameStats {
    pub fn of(frame: &Frame) -> Result<Self> {
        Ok(Self {
            min: frame.min()?,
            average: frame.average()?,
            median: frame.median()?,
            max: frame.max()?,
        })
    }
}

/// The result of processing one valid frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameAnalysis {
    /// Address of the sensor the frame came from.
    pub sensor: u16,
    /// The calibrated frame, cropped to `crop`.
    pub frame: Frame,
    /// The rectangle applied, in full-frame coordinates.
    pub crop: CropRect,
    /// Statistics of the cropped frame.
    pub stats: FrameStats,
    /// Alerts triggered by this frame, in registration order.
    pub events: Vec<TriggerEvent>,
}

/// Processing chain for a single sensor.
#[derive(Debug)]
pub struct SensorPipeline {
    settings: SensorSettings,
    alerts: Vec<Alert>,
    segmenter: Segmenter,
    frames_published: u64,
}

impl SensorPipeline {
    pub fn new(settings: SensorSettings) -> Result<Self> {
        let segmenter = match settings.crop {
            CropConfig::Auto { jump, .. } => Segmenter::new(jump)?,
            CropConfig::Manual { .. } => Segmenter::default(),
        };
        let alerts = settings.build_alerts();
        Ok(Self {
            settings,
            alerts,
            segmenter,
            frames_published: 0,
        })
    }

    /// Pipeline for the sensor at `addr` of `config`.
    pub fn from_config(config: &Config, addr: u16) -> Result<Self> {
        Self::new(config.sensor(addr)?)
    }

    pub fn register_alert(&mut self, alert: Alert) {
        self.alerts.push(alert);
    }

    pub fn alerts(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn settings(&self) -> &SensorSettings {
        &self.settings
    }

    pub fn addr(&self) -> u16 {
        self.settings.addr
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn frames_published(&self) -> u64 {
        self.frames_published
    }

    /// Runs one raw frame through every stage.
    ///
    /// Returns `Ok(None)` when the frame falls outside the validity window.
    pub fn process(&mut self, raw: Frame) -> Result<Option<FrameAnalysis>> {
        // Stage 1 & 2: Outlier suppression and calibration
        let calibrated = raw
            .replace_outliers(self.settings.outlier_threshold)?
            .with_offset(self.settings.offset);

        // Stage 3: Validity window
        let (low, high) = self.settings.threshold;
        if !calibrated.all_within(low, high) {
            debug!(sensor = %self.settings.name, low, high, "frame outside validity window");
            return Ok(None);
        }

        // Stage 4: Crop (before alerts, so a bad crop cannot strand a trigger)
        let (crop, frame) = self.crop(&calibrated)?;
        let stats = FrameStats::of(&frame)?;

        // Stage 5: Alert evaluation on the full calibrated frame
        let mut events = Vec::new();
        for alert in &mut self.alerts {
            if let Some(event) = alert.evaluate(&calibrated)? {
                info!(
                    sensor = %self.settings.name,
                    alert = %event.alert,
                    offender = %event.trigger.offender,
                    value = event.trigger.value,
                    triggers = event.trigger_count,
                    "alert triggered"
                );
                events.push(event);
            }
        }

        self.frames_published += 1;
        Ok(Some(FrameAnalysis {
            sensor: self.settings.addr,
            frame,
            crop,
            stats,
            events,
        }))
    }

    /// Reads from `source` until a frame passes `process`, using at most
    /// `attempts` reads. Failed reads and rejected frames each cost one attempt.
    pub fn capture(&mut self, source: &mut dyn FrameSource) -> Option<FrameAnalysis> {
        for attempt in 1..=self.settings.attempts {
            match source.next_frame() {
                Ok(Some(raw)) => match self.process(raw) {
                    Ok(Some(analysis)) => return Some(analysis),
                    Ok(None) => {}
                    Err(err) => {
                        warn!(sensor = %self.settings.name, attempt, error = %err, "frame rejected");
                    }
                },
                Ok(None) => {
                    if source.is_closed() {
                        break;
                    }
                }
                Err(err) => {
                    warn!(sensor = %self.settings.name, attempt, error = %err, "frame read failed");
                }
            }
        }
        debug!(
            sensor = %self.settings.name,
            attempts = self.settings.attempts,
            "no valid frame captured"
        );
        None
    }

    fn crop(&self, frame: &Frame) -> Result<(CropRect, Frame)> {
        let rect = match self.settings.crop {
            CropConfig::Manual { x1, y1, x2, y2 } => {
                let x1 = x1.unwrap_or(0);
                let y1 = y1.unwrap_or(0);
                let x2 = x2.unwrap_or(frame.cols() as i64);
                let y2 = y2.unwrap_or(frame.rows() as i64);
                let cropped = frame.crop(x1, y1, x2, y2)?;
                let (left, top) = (x1.max(0) as usize, y1.max(0) as usize);
                let rect = CropRect::new(left, top, left + cropped.cols(), top + cropped.rows());
                return Ok((rect, cropped));
            }
            CropConfig::Auto { penalty, .. } => {
                match find_hottest_region(frame, &self.segmenter, penalty) {
                    Ok(rect) => rect,
                    Err(err) => {
                        warn!(sensor = %self.settings.name, error = %err, "auto crop failed, using full frame");
                        CropRect::full(frame.cols(), frame.rows())
                    }
                }
            }
        };
        Ok((rect, frame.crop_rect(rect)?))
    }
}
