// THEORY:
// The `Frame` is the fundamental unit of the analysis engine. It is one captured
// grid of calibrated temperature samples, stored as a flat row-major buffer with
// its row/column extent alongside it.
//
// Key architectural principles:
// 1.  **Value Semantics**: A `Frame` is immutable after construction. Every
//     transform (crop, outlier suppression, offset) produces a new `Frame`, so no
//     two owners can ever observe each other's edits.
// 2.  **Checked Geometry**: The sample count must equal `rows * cols`. Row, column
//     and crop access are bounds-checked and fail loudly instead of reading the
//     neighbouring row.
// 3.  **Self-Contained Statistics**: A frame knows how to summarise itself (min,
//     max, average, median) but knows nothing about other frames, alerts or
//     segmentation. Higher layers consume these summaries.
//
// The geometry is "x = column, y = row": a crop rectangle `(x1, y1, x2, y2)` selects
// columns `[x1, x2)` of rows `[y1, y2)`.

use crate::error::{Result, ThermalError};

/// A single calibrated temperature sample, in degrees Celsius.
pub type Temperature = f64;

/// Number of columns of the default sensor array.
pub const FRAME_COLS: usize = 32;
/// Number of rows of the default sensor array.
pub const FRAME_ROWS: usize = 24;

/// A half-open rectangle `[x1, x2) x [y1, y2)` in frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x1: usize,
    pub y1: usize,
    pub x2: usize,
    pub y2: usize,
}

impl CropRect {
    pub fn new(x1: usize, y1: usize, x2: usize, y2: usize) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// The rectangle covering a whole `cols x rows` frame.
    pub fn full(cols: usize, rows: usize) -> Self {
        Self::new(0, 0, cols, rows)
    }

    pub fn width(&self) -> usize {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> usize {
        self.y2.saturating_sub(self.y1)
    }
}

/// One captured grid of temperature samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Row-major samples, `rows * cols` long.
    samples: Vec<Temperature>,
    /// Number of columns (samples per row).
    cols: usize,
    /// Number of rows.
    rows: usize,
}

impl Frame {
    /// Builds a frame from a flat row-major buffer.
    ///
    /// Fails with `DimensionMismatch` when `samples.len() != cols * rows`, or when
    /// `cols * rows` does not fit in a `usize` (reported as `expected: usize::MAX`).
    pub fn new(samples: Vec<Temperature>, cols: usize, rows: usize) -> Result<Self> {
        let expected = cols.checked_mul(rows);
        if expected != Some(samples.len()) {
            return Err(ThermalError::DimensionMismatch {
                expected: expected.unwrap_or(usize::MAX),
                actual: samples.len(),
            });
        }
        Ok(Self {
            samples,
            cols,
            rows,
        })
    }

    /// Builds a frame with the default sensor geometry (32 x 24).
    pub fn from_sensor(samples: Vec<Temperature>) -> Result<Self> {
        Self::new(samples, FRAME_COLS, FRAME_ROWS)
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// True when the geometry differs from the default sensor array, e.g. after a crop.
    pub fn is_modified(&self) -> bool {
        self.cols != FRAME_COLS || self.rows != FRAME_ROWS
    }

    pub fn as_slice(&self) -> &[Temperature] {
        &self.samples
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Temperature> {
        self.samples.iter()
    }

    // ==================================Statistics===================================

    pub fn min(&self) -> Result<Temperature> {
        self.reduce(Temperature::min)
    }

    pub fn max(&self) -> Result<Temperature> {
        self.reduce(Temperature::max)
    }

    /// Arithmetic mean of every sample.
    pub fn average(&self) -> Result<Temperature> {
        if self.samples.is_empty() {
            return Err(ThermalError::EmptyFrame);
        }
        Ok(mean(&self.samples))
    }

    /// Standard median: the middle sample for odd counts, the mean of the two
    /// central samples for even counts.
    pub fn median(&self) -> Result<Temperature> {
        if self.samples.is_empty() {
            return Err(ThermalError::EmptyFrame);
        }
        let mut sorted = self.samples.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let n = sorted.len();
        if n % 2 == 0 {
            Ok((sorted[n / 2 - 1] + sorted[n / 2]) / 2.0)
        } else {
            Ok(sorted[n / 2])
        }
    }

    fn reduce(&self, op: fn(Temperature, Temperature) -> Temperature) -> Result<Temperature> {
        let (first, rest) = self.samples.split_first().ok_or(ThermalError::EmptyFrame)?;
        Ok(rest.iter().copied().fold(*first, op))
    }

    // ===================================Geometry====================================

    /// Linear index of `(row, col)`.
    pub fn index(&self, row: usize, col: usize) -> Result<usize> {
        if row >= self.rows {
            return Err(ThermalError::IndexOutOfRange {
                axis: "row",
                index: row,
                len: self.rows,
            });
        }
        if col >= self.cols {
            return Err(ThermalError::IndexOutOfRange {
                axis: "column",
                index: col,
                len: self.cols,
            });
        }
        Ok(row * self.cols + col)
    }

    /// Samples `[r * cols, r * cols + cols)`.
    pub fn row(&self, r: usize) -> Result<&[Temperature]> {
        if r >= self.rows {
            return Err(ThermalError::IndexOutOfRange {
                axis: "row",
                index: r,
                len: self.rows,
            });
        }
        let start = r * self.cols;
        Ok(&self.samples[start..start + self.cols])
    }

    /// Samples `{ r * cols + c | r in [0, rows) }`.
    pub fn column(&self, c: usize) -> Result<Vec<Temperature>> {
        if c >= self.cols {
            return Err(ThermalError::IndexOutOfRange {
                axis: "column",
                index: c,
                len: self.cols,
            });
        }
        Ok(self
            .samples
            .iter()
            .skip(c)
            .step_by(self.cols)
            .copied()
            .collect())
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[Temperature]> + '_ {
        self.samples.chunks(self.cols.max(1)).take(self.rows)
    }

    pub fn iter_cols(&self) -> impl Iterator<Item = Vec<Temperature>> + '_ {
        (0..self.cols).map(move |c| {
            (0..self.rows)
                .map(|r| self.samples[r * self.cols + c])
                .collect()
        })
    }

    /// Extracts columns `[x1, x2)` of rows `[y1, y2)`.
    ///
    /// `x1`/`y1` are clamped to zero and `x2`/`y2` to the frame extent before the
    /// rectangle is checked; an empty rectangle fails with `InvalidCropGeometry`.
    pub fn crop(&self, x1: i64, y1: i64, x2: i64, y2: i64) -> Result<Frame> {
        let x1 = x1.max(0);
        let y1 = y1.max(0);
        let x2 = x2.min(self.cols as i64);
        let y2 = y2.min(self.rows as i64);

        if x2 <= x1 || y2 <= y1 {
            return Err(ThermalError::InvalidCropGeometry { x1, y1, x2, y2 });
        }

        let (x1, y1, x2, y2) = (x1 as usize, y1 as usize, x2 as usize, y2 as usize);
        let mut samples = Vec::with_capacity((x2 - x1) * (y2 - y1));
        for row in y1..y2 {
            let start = row * self.cols;
            samples.extend_from_slice(&self.samples[start + x1..start + x2]);
        }
        Frame::new(samples, x2 - x1, y2 - y1)
    }

    pub fn crop_rect(&self, rect: CropRect) -> Result<Frame> {
        self.crop(
            rect.x1 as i64,
            rect.y1 as i64,
            rect.x2 as i64,
            rect.y2 as i64,
        )
    }

    // ==================================Transforms===================================

    /// Replaces every sample `x` with the frame average `a` when
    /// `|x - a| >= threshold * a`.
    ///
    /// The tolerance is proportional to the average, so it shrinks towards zero
    /// for cold frames and inverts for negative averages.
    pub fn replace_outliers(&self, threshold: f64) -> Result<Frame> {
        let avg = self.average()?;
        let tolerance = threshold * avg;
        let samples = self
            .samples
            .iter()
            .map(|&x| if (x - avg).abs() >= tolerance { avg } else { x })
            .collect();
        Frame::new(samples, self.cols, self.rows)
    }

    /// Adds a constant calibration offset to every sample.
    pub fn with_offset(&self, offset: Temperature) -> Frame {
        Frame {
            samples: self.samples.iter().map(|t| t + offset).collect(),
            cols: self.cols,
            rows: self.rows,
        }
    }

    /// True when every sample lies in the closed interval `[low, high]`.
    pub fn all_within(&self, low: Temperature, high: Temperature) -> bool {
        self.samples.iter().all(|t| (low..=high).contains(t))
    }
}

impl<'a> IntoIterator for &'a Frame {
    type Item = &'a Temperature;
    type IntoIter = std::slice::Iter<'a, Temperature>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

/// Arithmetic mean of a non-empty slice.
pub(crate) fn mean(values: &[Temperature]) -> Temperature {
    values.iter().sum::<Temperature>() / values.len() as Temperature
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn grid(cols: usize, rows: usize) -> Frame {
        let samples = (0..cols * rows).map(|i| i as Temperature).collect();
        Frame::new(samples, cols, rows).unwrap()
    }

    #[test]
    fn construction_rejects_wrong_sample_count() {
        let err = Frame::new(vec![1.0; 5], 3, 2).unwrap_err();
        assert!(matches!(
            err,
            ThermalError::DimensionMismatch {
                expected: 6,
                actual: 5
            }
        ));
    }

    #[test]
    fn construction_rejects_overflowing_geometry() {
        assert!(matches!(
            Frame::new(Vec::new(), usize::MAX, 2),
            Err(ThermalError::DimensionMismatch {
                expected: usize::MAX,
                actual: 0
            })
        ));
        assert!(Frame::new(Vec::new(), 1 << (usize::BITS - 1), 2).is_err());
    }

    #[test]
    fn sensor_frame_uses_default_geometry() {
        let frame = Frame::from_sensor(vec![20.0; FRAME_COLS * FRAME_ROWS]).unwrap();
        assert_eq!(frame.cols(), 32);
        assert_eq!(frame.rows(), 24);
        assert!(!frame.is_modified());
        assert!(frame.crop(0, 0, 16, 12).unwrap().is_modified());
    }

    #[test]
    fn statistics() {
        let frame = Frame::new(vec![4.0, -1.0, 7.0, 2.0], 2, 2).unwrap();
        assert_eq!(frame.min().unwrap(), -1.0);
        assert_eq!(frame.max().unwrap(), 7.0);
        assert_eq!(frame.average().unwrap(), 3.0);
    }

    #[test]
    fn median_odd_and_even() {
        let odd = Frame::new(vec![3.0, 1.0, 2.0], 3, 1).unwrap();
        assert_eq!(odd.median().unwrap(), 2.0);
        let even = Frame::new(vec![4.0, 1.0, 3.0, 2.0], 4, 1).unwrap();
        assert_eq!(even.median().unwrap(), 2.5);
    }

    #[test]
    fn empty_frame_statistics_fail() {
        let frame = Frame::new(Vec::new(), 0, 0).unwrap();
        assert!(matches!(frame.average(), Err(ThermalError::EmptyFrame)));
        assert!(matches!(frame.median(), Err(ThermalError::EmptyFrame)));
        assert!(matches!(frame.min(), Err(ThermalError::EmptyFrame)));
        assert!(matches!(frame.max(), Err(ThermalError::EmptyFrame)));
    }

    #[test]
    fn row_and_column_views() {
        let frame = grid(4, 3);
        assert_eq!(frame.row(1).unwrap(), &[4.0, 5.0, 6.0, 7.0]);
        assert_eq!(frame.column(2).unwrap(), vec![2.0, 6.0, 10.0]);
        assert_eq!(frame.iter_cols().count(), 4);
        assert_eq!(frame.iter_rows().count(), 3);
    }

    #[test]
    fn row_and_column_bounds_are_strict() {
        let frame = grid(4, 3);
        assert!(matches!(
            frame.row(3),
            Err(ThermalError::IndexOutOfRange { axis: "row", index: 3, len: 3 })
        ));
        assert!(matches!(
            frame.column(4),
            Err(ThermalError::IndexOutOfRange { axis: "column", index: 4, len: 4 })
        ));
        assert!(frame.index(2, 4).is_err());
        assert_eq!(frame.index(2, 3).unwrap(), 11);
    }

    #[test]
    fn crop_extracts_row_major_sub_grid() {
        let frame = grid(4, 3);
        let cropped = frame.crop(1, 1, 3, 3).unwrap();
        assert_eq!(cropped.cols(), 2);
        assert_eq!(cropped.rows(), 2);
        assert_eq!(cropped.as_slice(), &[5.0, 6.0, 9.0, 10.0]);

        let rect = CropRect::new(1, 1, 3, 3);
        assert_eq!((rect.width(), rect.height()), (cropped.cols(), cropped.rows()));
        assert_eq!(frame.crop_rect(rect).unwrap(), cropped);
    }

    #[test]
    fn crop_clamps_to_frame() {
        let frame = grid(4, 3);
        let cropped = frame.crop(-5, -2, 100, 100).unwrap();
        assert_eq!(cropped, frame);
    }

    #[test]
    fn crop_clamps_against_own_extent_not_sensor_geometry() {
        let frame = grid(4, 3);
        let cropped = frame.crop(2, 0, 32, 24).unwrap();
        assert_eq!(cropped.cols(), 2);
        assert_eq!(cropped.rows(), 3);
    }

    #[test]
    fn empty_crop_fails() {
        let frame = grid(4, 3);
        assert!(matches!(
            frame.crop(2, 0, 2, 3),
            Err(ThermalError::InvalidCropGeometry { .. })
        ));
        assert!(matches!(
            frame.crop(0, 5, 4, 10),
            Err(ThermalError::InvalidCropGeometry { x1: 0, y1: 5, x2: 4, y2: 3 })
        ));
    }

    #[test]
    fn outliers_are_replaced_relative_to_average() {
        // average = 20, tolerance = 0.5 * 20 = 10
        let frame = Frame::new(vec![20.0, 20.0, 20.0, 0.0, 40.0, 20.0], 3, 2).unwrap();
        let cleaned = frame.replace_outliers(0.5).unwrap();
        assert_eq!(cleaned.as_slice(), &[20.0; 6]);

        let frame = Frame::new(vec![18.0, 22.0, 20.0, 20.0], 2, 2).unwrap();
        assert_eq!(frame.replace_outliers(0.5).unwrap(), frame);
    }

    #[test]
    fn deviation_equal_to_tolerance_is_an_outlier() {
        // average = 10, tolerance = 1.0 * 10; |0 - 10| >= 10 and |20 - 10| >= 10
        let frame = Frame::new(vec![0.0, 20.0], 2, 1).unwrap();
        assert_eq!(frame.replace_outliers(1.0).unwrap().as_slice(), &[10.0, 10.0]);
    }

    #[test]
    fn offset_and_validity_window() {
        let frame = Frame::new(vec![1.0, 2.0], 2, 1).unwrap().with_offset(1.5);
        assert_eq!(frame.as_slice(), &[2.5, 3.5]);
        assert!(frame.all_within(2.5, 3.5));
        assert!(!frame.all_within(3.0, 10.0));
    }

    proptest! {
        #[test]
        fn rows_reconstruct_flat_samples(cols in 1usize..12, rows in 1usize..12, seed in -50.0f64..50.0) {
            let samples: Vec<f64> = (0..cols * rows).map(|i| seed + i as f64 * 0.25).collect();
            let frame = Frame::new(samples.clone(), cols, rows).unwrap();
            let rebuilt: Vec<f64> = (0..rows).flat_map(|r| frame.row(r).unwrap().to_vec()).collect();
            prop_assert_eq!(rebuilt, samples);
        }

        #[test]
        fn crop_is_idempotent(cols in 1usize..12, rows in 1usize..12, a in 0usize..12, b in 0usize..12) {
            let frame = grid(cols, rows);
            let (x1, x2) = (a % cols, cols);
            let (y1, y2) = (b % rows, rows);
            let once = frame.crop(x1 as i64, y1 as i64, x2 as i64, y2 as i64).unwrap();
            let twice = once.crop(0, 0, once.cols() as i64, once.rows() as i64).unwrap();
            prop_assert_eq!(&once, &twice);
            let full = frame.crop_rect(CropRect::full(cols, rows)).unwrap();
            prop_assert_eq!(full.as_slice(), frame.as_slice());
        }

        #[test]
        fn infinite_outlier_threshold_is_identity(values in prop::collection::vec(0.5f64..300.0, 1..64)) {
            let cols = values.len();
            let frame = Frame::new(values, cols, 1).unwrap();
            prop_assert_eq!(frame.replace_outliers(f64::INFINITY).unwrap(), frame);
        }
    }
}
