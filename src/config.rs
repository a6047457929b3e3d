// THEORY:
// The `config` module is the declarative description of a deployment: which
// sensors exist, how each one's frames are cleaned and cropped, and which alerts
// watch them.
//
// Key architectural principles:
// 1.  **Explicit Values, No Global Cache**: A `Config` is loaded (or built) once by
//     the caller and handed to constructors. Two tests can hold two different
//     configurations side by side.
// 2.  **Defaults Then Overrides**: The `default` block supplies every setting; each
//     entry in `sensors` may override any of them. `Config::sensor` resolves the
//     two layers into a flat `SensorSettings`.
// 3.  **Validated at Load**: Impossible settings (zero attempts, an inverted
//     validity window, duplicate addresses) are rejected when the file is read,
//     not when the first frame arrives.

use crate::core_modules::alert::{Alert, Threshold};
use crate::core_modules::frame::{FRAME_COLS, FRAME_ROWS, Temperature};
use crate::core_modules::segmenter::DEFAULT_JUMP;
use crate::error::{Result, ThermalError};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

pub const DEFAULT_ATTEMPTS: u32 = 10;
pub const DEFAULT_VALIDITY_WINDOW: (Temperature, Temperature) = (-40.0, 300.0);
pub const DEFAULT_OUTLIER_THRESHOLD: f64 = 1.5;
pub const DEFAULT_PENALTY: u32 = 100;

fn default_attempts() -> u32 {
    DEFAULT_ATTEMPTS
}

fn default_threshold() -> (Temperature, Temperature) {
    DEFAULT_VALIDITY_WINDOW
}

fn default_outlier_threshold() -> f64 {
    DEFAULT_OUTLIER_THRESHOLD
}

fn default_penalty() -> u32 {
    DEFAULT_PENALTY
}

fn default_jump() -> usize {
    DEFAULT_JUMP
}

/// How frames of a sensor are cropped before they are published.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum CropConfig {
    /// A fixed rectangle. Missing edges default to the frame extent.
    Manual {
        #[serde(default)]
        x1: Option<i64>,
        #[serde(default)]
        y1: Option<i64>,
        #[serde(default)]
        x2: Option<i64>,
        #[serde(default)]
        y2: Option<i64>,
    },
    /// The hottest region, located per frame by change-point segmentation.
    Auto {
        #[serde(default = "default_penalty")]
        penalty: u32,
        #[serde(default = "default_jump")]
        jump: usize,
    },
}

impl Default for CropConfig {
    fn default() -> Self {
        CropConfig::Manual {
            x1: Some(0),
            y1: Some(0),
            x2: Some(FRAME_COLS as i64),
            y2: Some(FRAME_ROWS as i64),
        }
    }
}

/// Declarative form of an `Alert`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AlertSpec {
    #[serde(default)]
    pub min: Threshold,
    #[serde(default)]
    pub avg: Option<(Temperature, Temperature)>,
    #[serde(default)]
    pub max: Threshold,
    #[serde(default)]
    pub name: Option<String>,
}

impl AlertSpec {
    /// Builds the alert, naming it `fallback_name` when `name` is unset.
    pub fn build(&self, fallback_name: impl Into<String>) -> Alert {
        let name = self.name.clone().unwrap_or_else(|| fallback_name.into());
        let mut alert = Alert::new(name).with_min(self.min).with_max(self.max);
        if let Some((low, high)) = self.avg {
            alert = alert.with_average(low, high);
        }
        alert
    }
}

/// Settings shared by every sensor unless overridden.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultSensor {
    /// Reads attempted per capture before giving up.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default)]
    pub crop: CropConfig,
    /// Calibration offset added to every sample.
    #[serde(default)]
    pub offset: Temperature,
    /// Closed validity window; frames with any sample outside it are discarded.
    #[serde(default = "default_threshold")]
    pub threshold: (Temperature, Temperature),
    /// Samples deviating from the frame average by `outlier_threshold * average`
    /// or more are replaced with the average.
    #[serde(default = "default_outlier_threshold")]
    pub outlier_threshold: f64,
    #[serde(default)]
    pub alerts: Vec<AlertSpec>,
}

impl Default for DefaultSensor {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            crop: CropConfig::default(),
            offset: 0.0,
            threshold: DEFAULT_VALIDITY_WINDOW,
            outlier_threshold: DEFAULT_OUTLIER_THRESHOLD,
            alerts: Vec::new(),
        }
    }
}

/// One configured sensor. Every setting left out falls back to `default`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorConfig {
    /// Bus address, written as a number or a `"0x.."` string.
    #[serde(deserialize_with = "deserialize_addr")]
    pub addr: u16,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub attempts: Option<u32>,
    #[serde(default)]
    pub crop: Option<CropConfig>,
    #[serde(default)]
    pub offset: Option<Temperature>,
    #[serde(default)]
    pub threshold: Option<(Temperature, Temperature)>,
    #[serde(default)]
    pub outlier_threshold: Option<f64>,
    #[serde(default)]
    pub alerts: Option<Vec<AlertSpec>>,
}

impl SensorConfig {
    pub fn new(addr: u16) -> Self {
        Self {
            addr,
            name: None,
            attempts: None,
            crop: None,
            offset: None,
            threshold: None,
            outlier_threshold: None,
            alerts: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAddress {
    Number(u16),
    Text(String),
}

/// Parses a bus address written as decimal or `0x`-prefixed hex.
pub fn parse_addr(text: &str) -> std::result::Result<u16, String> {
    let trimmed = text.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => trimmed.parse::<u16>(),
    };
    parsed.map_err(|err| format!("invalid sensor address {text:?}: {err}"))
}

fn deserialize_addr<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    match RawAddress::deserialize(deserializer)? {
        RawAddress::Number(addr) => Ok(addr),
        RawAddress::Text(text) => parse_addr(&text).map_err(serde::de::Error::custom),
    }
}

/// Fully resolved settings for one sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSettings {
    pub addr: u16,
    pub name: String,
    pub attempts: u32,
    pub crop: CropConfig,
    pub offset: Temperature,
    pub threshold: (Temperature, Temperature),
    pub outlier_threshold: f64,
    pub alerts: Vec<AlertSpec>,
}

impl SensorSettings {
    /// Settings equal to `default`, for a sensor that is not in any file.
    pub fn from_default(addr: u16, default: &DefaultSensor) -> Self {
        Self::resolve(&SensorConfig::new(addr), default)
    }

    fn resolve(sensor: &SensorConfig, default: &DefaultSensor) -> Self {
        Self {
            addr: sensor.addr,
            name: sensor
                .name
                .clone()
                .unwrap_or_else(|| format!("sensor {:#04x}", sensor.addr)),
            attempts: sensor.attempts.unwrap_or(default.attempts),
            crop: sensor.crop.unwrap_or(default.crop),
            offset: sensor.offset.unwrap_or(default.offset),
            threshold: sensor.threshold.unwrap_or(default.threshold),
            outlier_threshold: sensor.outlier_threshold.unwrap_or(default.outlier_threshold),
            alerts: sensor
                .alerts
                .clone()
                .unwrap_or_else(|| default.alerts.clone()),
        }
    }

    /// Instantiates the configured alerts; unnamed ones become `"<name> alert (<i>)"`.
    pub fn build_alerts(&self) -> Vec<Alert> {
        self.alerts
            .iter()
            .enumerate()
            .map(|(i, spec)| spec.build(format!("{} alert ({i})", self.name)))
            .collect()
    }
}

/// The complete deployment description.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub default: DefaultSensor,
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,
}

impl Config {
    /// Reads and validates a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        debug!(
            path = %path.display(),
            sensors = config.sensors.len(),
            "loaded configuration"
        );
        Ok(config)
    }

    /// Parses and validates a JSON configuration document.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for sensor in &self.sensors {
            if !seen.insert(sensor.addr) {
                return Err(ThermalError::Config(format!(
                    "sensor {:#04x} is listed more than once",
                    sensor.addr
                )));
            }
        }
        for settings in self.sensor_settings() {
            if settings.attempts == 0 {
                return Err(ThermalError::Config(format!(
                    "{}: attempts must be at least 1",
                    settings.name
                )));
            }
            let (low, high) = settings.threshold;
            if low > high {
                return Err(ThermalError::Config(format!(
                    "{}: validity window [{low}, {high}] is inverted",
                    settings.name
                )));
            }
            if let CropConfig::Auto { jump: 0, .. } = settings.crop {
                return Err(ThermalError::Config(format!(
                    "{}: auto crop jump must be at least 1",
                    settings.name
                )));
            }
        }
        Ok(())
    }

    pub fn addresses(&self) -> Vec<u16> {
        self.sensors.iter().map(|s| s.addr).collect()
    }

    /// Resolved settings for the sensor at `addr`.
    pub fn sensor(&self, addr: u16) -> Result<SensorSettings> {
        self.sensors
            .iter()
            .find(|s| s.addr == addr)
            .map(|s| SensorSettings::resolve(s, &self.default))
            .ok_or(ThermalError::UnknownSensor(addr))
    }

    /// Resolved settings for every configured sensor, in file order.
    pub fn sensor_settings(&self) -> Vec<SensorSettings> {
        self.sensors
            .iter()
            .map(|s| SensorSettings::resolve(s, &self.default))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "default": {
            "attempts": 5,
            "offset": 1.5,
            "threshold": [-20, 150],
            "outlier_threshold": 2,
            "alerts": [{ "min": 0, "max": 38 }]
        },
        "sensors": [
            { "addr": "0x33" },
            {
                "addr": 52,
                "name": "furnace",
                "crop": { "mode": "auto", "penalty": 50 },
                "alerts": [
                    { "avg": [10, 60], "max": [0, 90], "name": "furnace hot" },
                    { "min": null }
                ]
            }
        ]
    }"#;

    #[test]
    fn sensor_inherits_defaults() {
        let config = Config::from_json(SAMPLE).unwrap();
        assert_eq!(config.addresses(), vec![0x33, 52]);

        let settings = config.sensor(0x33).unwrap();
        assert_eq!(settings.name, "sensor 0x33");
        assert_eq!(settings.attempts, 5);
        assert_eq!(settings.offset, 1.5);
        assert_eq!(settings.threshold, (-20.0, 150.0));
        assert_eq!(settings.outlier_threshold, 2.0);
        assert_eq!(settings.crop, CropConfig::default());
        assert_eq!(settings.alerts.len(), 1);
        assert_eq!(settings.alerts[0].min, Threshold::Value(0.0));
        assert_eq!(settings.alerts[0].max, Threshold::Value(38.0));
    }

    #[test]
    fn sensor_overrides_defaults() {
        let config = Config::from_json(SAMPLE).unwrap();
        let settings = config.sensor(52).unwrap();
        assert_eq!(settings.name, "furnace");
        assert_eq!(
            settings.crop,
            CropConfig::Auto {
                penalty: 50,
                jump: DEFAULT_JUMP
            }
        );
        assert_eq!(settings.attempts, 5);

        let alerts = settings.build_alerts();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].name(), "furnace hot");
        assert_eq!(alerts[0].average(), Some((10.0, 60.0)));
        assert_eq!(alerts[0].max(), Threshold::Range(0.0, 90.0));
        assert_eq!(alerts[1].name(), "furnace alert (1)");
        assert_eq!(alerts[1].min(), Threshold::Unset);
    }

    #[test]
    fn unknown_sensor_fails() {
        let config = Config::from_json(SAMPLE).unwrap();
        assert!(matches!(
            config.sensor(0x40),
            Err(ThermalError::UnknownSensor(0x40))
        ));
    }

    #[test]
    fn minimal_document_uses_built_in_defaults() {
        let config = Config::from_json(r#"{ "sensors": [{ "addr": 51 }] }"#).unwrap();
        let settings = config.sensor(51).unwrap();
        assert_eq!(settings.attempts, DEFAULT_ATTEMPTS);
        assert_eq!(settings.threshold, DEFAULT_VALIDITY_WINDOW);
        assert_eq!(settings.outlier_threshold, DEFAULT_OUTLIER_THRESHOLD);
        assert!(settings.alerts.is_empty());
    }

    #[test]
    fn auto_crop_defaults() {
        let crop: CropConfig = serde_json::from_str(r#"{ "mode": "auto" }"#).unwrap();
        assert_eq!(
            crop,
            CropConfig::Auto {
                penalty: DEFAULT_PENALTY,
                jump: DEFAULT_JUMP
            }
        );
        let crop: CropConfig = serde_json::from_str(r#"{ "mode": "manual", "x1": 4 }"#).unwrap();
        assert_eq!(
            crop,
            CropConfig::Manual {
                x1: Some(4),
                y1: None,
                x2: None,
                y2: None
            }
        );
    }

    #[test]
    fn addresses_parse_as_hex_or_decimal() {
        assert_eq!(parse_addr("0x33"), Ok(0x33));
        assert_eq!(parse_addr("0X0a"), Ok(10));
        assert_eq!(parse_addr("51"), Ok(51));
        assert!(parse_addr("0xzz").is_err());
        assert!(Config::from_json(r#"{ "sensors": [{ "addr": "bogus" }] }"#).is_err());
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let duplicate = r#"{ "sensors": [{ "addr": 51 }, { "addr": "0x33" }] }"#;
        assert!(matches!(
            Config::from_json(duplicate),
            Err(ThermalError::Config(_))
        ));
        let inverted = r#"{ "default": { "threshold": [10, 0] }, "sensors": [{ "addr": 1 }] }"#;
        assert!(matches!(
            Config::from_json(inverted),
            Err(ThermalError::Config(_))
        ));
        let no_attempts = r#"{ "sensors": [{ "addr": 1, "attempts": 0 }] }"#;
        assert!(matches!(
            Config::from_json(no_attempts),
            Err(ThermalError::Config(_))
        ));
        let zero_jump = r#"{ "sensors": [{ "addr": 1, "crop": { "mode": "auto", "jump": 0 } }] }"#;
        assert!(matches!(
            Config::from_json(zero_jump),
            Err(ThermalError::Config(_))
        ));
    }

    #[test]
    fn independent_configurations_do_not_leak() {
        let first = Config::from_json(SAMPLE).unwrap();
        let second = Config::from_json(r#"{ "sensors": [{ "addr": 7 }] }"#).unwrap();
        assert!(first.sensor(7).is_err());
        assert!(second.sensor(0x33).is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = Config::from_path(file.path()).unwrap();
        assert_eq!(config.sensors.len(), 2);
        assert!(matches!(
            Config::from_path(file.path().with_extension("missing")),
            Err(ThermalError::Io(_))
        ));
    }
}
