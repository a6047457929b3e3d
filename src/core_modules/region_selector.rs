// THEORY:
// The `RegionSelector` is the spatial layer of the engine. It turns the change
// points produced by the `Segmenter` into a single region of interest: the hottest
// contiguous surface of a frame.
//
// Key architectural principles & algorithm steps:
// 1.  **Best Segment (1-D)**: Segment one row or column and keep the segment with
//     the highest mean. The scan runs left to right and only a strictly hotter
//     segment replaces the current winner, so the first of several equally hot
//     segments wins.
// 2.  **Axis Aggregation**: Run the 1-D search over a batch of sequences (every row,
//     or every column of a band). Starts at exactly 0 and ends at exactly the full
//     length carry no information and are ignored; the tightest remaining bounds
//     (smallest start, largest end) define the axis range.
// 3.  **Row Pass, then Column Pass**: Rows are scanned first to choose the column
//     range `[x1, x2)`. Only the columns inside that range are then scanned to choose
//     the row range `[y1, y2)`.
// 4.  **Stateless Utility**: Every function here is pure. Nothing is cached between
//     frames and all functions are safe to call from any number of threads.

use crate::core_modules::frame::{CropRect, Frame, Temperature, mean};
use crate::core_modules::segmenter::Segmenter;
use crate::error::{Result, ThermalError};

pub mod region_selector {
    use super::*; // Make structs from parent module available.

    /// The winning segment of a single sequence.
    #[derive(Debug, Clone, PartialEq)]
    pub struct Surface {
        /// Index of the first sample of the segment.
        pub start: usize,
        /// One past the last sample of the segment.
        pub end: usize,
        /// The samples of the segment.
        pub values: Vec<Temperature>,
    }

    impl Surface {
        pub fn average(&self) -> Temperature {
            mean(&self.values)
        }
    }

    /// Picks the hottest segment of `sequence`.
    ///
    /// When no segment is strictly hotter than the sequence minimum (a flat
    /// sequence), the whole range is returned with `[min]` as its values.
    pub fn best_segment(
        sequence: &[Temperature],
        segmenter: &Segmenter,
        penalty: u32,
    ) -> Result<Surface> {
        let breakpoints = segmenter.breakpoints(sequence, penalty)?;
        let minimum = sequence
            .iter()
            .copied()
            .reduce(Temperature::min)
            .ok_or(ThermalError::EmptyFrame)?;

        let mut best = Surface {
            start: 0,
            end: sequence.len(),
            values: vec![minimum],
        };
        let mut best_average = minimum;

        for edge in breakpoints.windows(2) {
            let (start, end) = (edge[0], edge[1]);
            let surface = &sequence[start..end];
            let average = mean(surface);
            if average > best_average {
                best_average = average;
                best = Surface {
                    start,
                    end,
                    values: surface.to_vec(),
                };
            }
        }

        Ok(best)
    }

    /// Aggregates the best segments of a batch of sequences into one `[start, end)` range.
    ///
    /// `axis_len` is the full length of the axis; it is the fallback end and the
    /// value of an uninformative end.
    pub fn best_crop_axis<I, S>(
        sequences: I,
        axis_len: usize,
        segmenter: &Segmenter,
        penalty: u32,
    ) -> Result<(usize, usize)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[Temperature]>,
    {
        let mut starts = Vec::new();
        let mut ends = Vec::new();

        for sequence in sequences {
            let surface = best_segment(sequence.as_ref(), segmenter, penalty)?;
            if surface.start != 0 {
                starts.push(surface.start);
            }
            if surface.end != axis_len {
                ends.push(surface.end);
            }
        }

        let start = starts.into_iter().min().unwrap_or(0);
        let end = ends.into_iter().max().unwrap_or(axis_len);
        Ok((start, end))
    }

    /// Locates the hottest rectangular region of `frame`.
    ///
    /// Fails with `InvalidCropGeometry` when the row pass and the column pass
    /// disagree so badly that the resulting rectangle is empty.
    pub fn find_hottest_region(
        frame: &Frame,
        segmenter: &Segmenter,
        penalty: u32,
    ) -> Result<CropRect> {
        // --- 1. Row Pass ---
        let (x1, x2) = best_crop_axis(frame.iter_rows(), frame.cols(), segmenter, penalty)?;

        // --- 2. Column Pass (restricted to the chosen columns) ---
        let columns = (x1..x2)
            .map(|c| frame.column(c))
            .collect::<Result<Vec<_>>>()?;
        let (y1, y2) = best_crop_axis(&columns, frame.rows(), segmenter, penalty)?;

        if x2 <= x1 || y2 <= y1 {
            return Err(ThermalError::InvalidCropGeometry {
                x1: x1 as i64,
                y1: y1 as i64,
                x2: x2 as i64,
                y2: y2 as i64,
            });
        }
        Ok(CropRect::new(x1, y1, x2, y2))
    }
}
