// THEORY:
// This file is the main entry point for the `thermal_sentry` library crate. It
// defines the public API exposed to capture front-ends and dashboards.
//
// The layers, from the bottom up:
// - `core_modules`: the synchronous analysis core (frame model, change-point
//   segmentation, hottest-region selection, alert evaluation). Pure, I/O-free.
// - `config`: the declarative deployment description, loaded once and passed in.
// - `pipeline`: the per-sensor processing chain wrapped around the core.
// - `monitor`: the concurrent multi-sensor runner that queues trigger events.
//
// Frame acquisition, sensor compensation math and rendering live outside this
// crate; they meet it at the `FrameSource` trait and the `TriggerEvent` value.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod monitor;
pub mod pipeline;

// Re-export key data structures for the public API.
pub use crate::config::{Config, CropConfig, SensorSettings};
pub use crate::core_modules::alert::{Alert, Decision, Offender, Threshold, TriggerEvent, TriggerRecord};
pub use crate::core_modules::frame::{CropRect, FRAME_COLS, FRAME_ROWS, Frame, Temperature};
pub use crate::core_modules::region_selector::region_selector::{
    Surface, best_crop_axis, best_segment, find_hottest_region,
};
pub use crate::core_modules::segmenter::Segmenter;
pub use crate::error::{Result, ThermalError};
pub use crate::monitor::{Monitor, MonitorConfig, SensorEvent, SensorReport};
pub use crate::pipeline::{FrameAnalysis, FrameSource, FrameStats, ReplaySource, SensorPipeline};
