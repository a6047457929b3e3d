// THEORY:
// The `Alert` is the decision layer of the engine. It holds a declarative set of
// temperature bounds and a running trigger history, and decides for every captured
// frame whether that frame warrants a notification.
//
// Key architectural principles:
// 1.  **Explicit Priority Order**: The checks run in a fixed, reviewable order and
//     the first hit wins:
//       average band  >  per-sample min/max scan  >  custom condition.
//     The per-sample scan walks the frame in row-major order and reports the first
//     offending sample, testing the min rule before the max rule for each sample.
// 2.  **Pure Decision, Separate Mutation**: `should_trigger` is a pure function of
//     the alert's bounds and the frame and returns a tagged `Decision`. Only
//     `evaluate` mutates the history, and it does so in exactly one place.
// 3.  **Events, Not Callbacks**: A trigger produces a `TriggerEvent` value carrying
//     a snapshot of the alert (name, post-increment count, cause) and the frame.
//     Delivering that event is the caller's business, which keeps slow consumers
//     out of the evaluation path.
// 4.  **Forward-Only State**: An alert starts idle and moves to triggered on its
//     first hit. The counter never decreases and the last-trigger record always
//     describes the most recent trigger.

use crate::core_modules::frame::{Frame, Temperature};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A user-supplied extra trigger condition, consulted after every bound passed.
pub type Condition = Box<dyn Fn(&Frame) -> bool + Send + Sync>;

/// A bound on individual samples.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Threshold {
    /// No bound: every sample passes.
    #[default]
    Unset,
    /// A one-sided bound. As a minimum a sample passes when strictly greater;
    /// as a maximum it passes when strictly smaller.
    Value(Temperature),
    /// A half-open band `[low, high)` a sample must lie in to pass.
    Range(Temperature, Temperature),
}

impl Threshold {
    fn in_range(low: Temperature, high: Temperature, value: Temperature) -> bool {
        low <= value && value < high
    }

    /// True when `value` satisfies this threshold used as a lower bound.
    pub fn passes_min(&self, value: Temperature) -> bool {
        match *self {
            Threshold::Unset => true,
            Threshold::Value(test) => value > test,
            Threshold::Range(low, high) => Self::in_range(low, high, value),
        }
    }

    /// True when `value` satisfies this threshold used as an upper bound.
    pub fn passes_max(&self, value: Temperature) -> bool {
        match *self {
            Threshold::Unset => true,
            Threshold::Value(test) => value < test,
            Threshold::Range(low, high) => Self::in_range(low, high, value),
        }
    }
}

impl From<Temperature> for Threshold {
    fn from(value: Temperature) -> Self {
        Threshold::Value(value)
    }
}

impl From<(Temperature, Temperature)> for Threshold {
    fn from((low, high): (Temperature, Temperature)) -> Self {
        Threshold::Range(low, high)
    }
}

/// The rule that caused an alert to trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Offender {
    Min,
    Avg,
    Max,
    /// The custom condition.
    #[serde(rename = "cb")]
    Condition,
}

impl fmt::Display for Offender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Offender::Min => "min",
            Offender::Avg => "avg",
            Offender::Max => "max",
            Offender::Condition => "cb",
        };
        f.write_str(tag)
    }
}

/// The cause of one trigger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub offender: Offender,
    /// The offending sample, or the frame average for `Avg` and `Condition`.
    pub value: Temperature,
}

/// Outcome of checking one frame against an alert.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Decision {
    NoTrigger,
    Triggered(TriggerRecord),
}

/// Emitted by `Alert::evaluate` for every triggering frame.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerEvent {
    /// Name of the alert that fired.
    pub alert: String,
    /// The alert's trigger count including this trigger.
    pub trigger_count: u64,
    /// Why the alert fired.
    pub trigger: TriggerRecord,
    /// The frame that caused the trigger.
    pub frame: Frame,
}

/// A monitored temperature condition with its trigger history.
pub struct Alert {
    name: String,
    min: Threshold,
    average: Option<(Temperature, Temperature)>,
    max: Threshold,
    condition: Option<Condition>,
    trigger_count: u64,
    last_trigger: Option<TriggerRecord>,
}

impl Alert {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            min: Threshold::Unset,
            average: None,
            max: Threshold::Unset,
            condition: None,
            trigger_count: 0,
            last_trigger: None,
        }
    }

    pub fn with_min(mut self, min: impl Into<Threshold>) -> Self {
        self.min = min.into();
        self
    }

    pub fn with_max(mut self, max: impl Into<Threshold>) -> Self {
        self.max = max.into();
        self
    }

    /// Triggers when the frame average leaves `[low, high)`.
    pub fn with_average(mut self, low: Temperature, high: Temperature) -> Self {
        self.average = Some((low, high));
        self
    }

    pub fn with_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&Frame) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Box::new(condition));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min(&self) -> Threshold {
        self.min
    }

    pub fn max(&self) -> Threshold {
        self.max
    }

    pub fn average(&self) -> Option<(Temperature, Temperature)> {
        self.average
    }

    pub fn trigger_count(&self) -> u64 {
        self.trigger_count
    }

    /// The cause of the most recent trigger; `None` while the alert is idle.
    pub fn last_trigger(&self) -> Option<TriggerRecord> {
        self.last_trigger
    }

    pub fn is_triggered(&self) -> bool {
        self.last_trigger.is_some()
    }

    /// Decides whether `frame` triggers this alert, without touching its history.
    pub fn should_trigger(&self, frame: &Frame) -> Result<Decision> {
        let average = frame.average()?;

        // --- 1. Average band ---
        if let Some((low, high)) = self.average {
            if !(low <= average && average < high) {
                return Ok(Decision::Triggered(TriggerRecord {
                    offender: Offender::Avg,
                    value: average,
                }));
            }
        }

        // --- 2. Per-sample scan ---
        for &value in frame {
            if !self.min.passes_min(value) {
                return Ok(Decision::Triggered(TriggerRecord {
                    offender: Offender::Min,
                    value,
                }));
            }
            if !self.max.passes_max(value) {
                return Ok(Decision::Triggered(TriggerRecord {
                    offender: Offender::Max,
                    value,
                }));
            }
        }

        // --- 3. Custom condition ---
        if let Some(condition) = &self.condition {
            if condition(frame) {
                return Ok(Decision::Triggered(TriggerRecord {
                    offender: Offender::Condition,
                    value: average,
                }));
            }
        }

        Ok(Decision::NoTrigger)
    }

    /// Checks `frame` and records a trigger when it fires.
    pub fn evaluate(&mut self, frame: &Frame) -> Result<Option<TriggerEvent>> {
        match self.should_trigger(frame)? {
            Decision::NoTrigger => Ok(None),
            Decision::Triggered(record) => {
                self.trigger_count += 1;
                self.last_trigger = Some(record);
                Ok(Some(TriggerEvent {
                    alert: self.name.clone(),
                    trigger_count: self.trigger_count,
                    trigger: record,
                    frame: frame.clone(),
                }))
            }
        }
    }
}

impl fmt::Debug for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Alert")
            .field("name", &self.name)
            .field("min", &self.min)
            .field("average", &self.average)
            .field("max", &self.max)
            .field("has_condition", &self.condition.is_some())
            .field("trigger_count", &self.trigger_count)
            .field("last_trigger", &self.last_trigger)
            .finish()
    }
}
