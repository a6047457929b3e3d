//! Error types shared by every layer of the engine.

use thiserror::Error;

/// Errors raised by frame analysis, configuration and the sensor pipeline.
#[derive(Debug, Error)]
pub enum ThermalError {
    #[error("Dimension mismatch: expected {expected} samples, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("{axis} index out of range: got {index}, length is {len}")]
    IndexOutOfRange {
        axis: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Invalid crop geometry: ({x1}, {y1}) -> ({x2}, {y2}) is empty")]
    InvalidCropGeometry {
        x1: i64,
        y1: i64,
        x2: i64,
        y2: i64,
    },

    #[error("Insufficient data: required {required}, got {got}")]
    InsufficientData { required: usize, got: usize },

    #[error("Frame has no samples")]
    EmptyFrame,

    #[error("Invalid parameter: {name} - {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sensor {0:#04x} is not in the configuration")]
    UnknownSensor(u16),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, ThermalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_mismatch_display() {
        let error = ThermalError::DimensionMismatch {
            expected: 768,
            actual: 767,
        };
        assert_eq!(
            error.to_string(),
            "Dimension mismatch: expected 768 samples, got 767"
        );
    }

    #[test]
    fn test_index_out_of_range_display() {
        let error = ThermalError::IndexOutOfRange {
            axis: "row",
            index: 24,
            len: 24,
        };
        assert_eq!(error.to_string(), "row index out of range: got 24, length is 24");
    }

    #[test]
    fn test_unknown_sensor_display() {
        let error = ThermalError::UnknownSensor(0x33);
        assert_eq!(error.to_string(), "Sensor 0x33 is not in the configuration");
    }

    #[test]
    fn test_json_error_converts() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let error: ThermalError = parse.unwrap_err().into();
        assert!(matches!(error, ThermalError::Json(_)));
    }

    #[test]
    fn test_all_error_variants_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ThermalError>();
    }
}
