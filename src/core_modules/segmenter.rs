// THEORY:
// The `Segmenter` is the signal-processing layer of the engine. Given a 1-D run of
// temperatures (one frame row or column) it finds the change points where the
// mean level shifts, partitioning the run into piecewise-flat "surfaces."
//
// Key architectural principles:
// 1.  **Penalised Objective**: A partition into segments S_1..S_k costs
//     `sum(cost(S_i)) + P * k`, where `cost(S)` is the squared error of
//     approximating `S` by its own mean. A larger penalty `P` buys fewer, wider
//     segments.
// 2.  **Exact Search with Pruning (PELT)**: For each candidate end point we keep the
//     best total cost `F(s)` over all admissible earlier breakpoints `t`. Once
//     `F(t) + cost(t, s) + P > F(s) + P`, going through `s` beats `t` for every
//     later end point that can use `s` as a breakpoint, i.e. from
//     `s + MIN_SEGMENT_SIZE` on. `t` stays admissible until then and is retired
//     afterwards.
// 3.  **Jump Grid**: Breakpoints are only considered on multiples of `jump`. With
//     `jump > 1` the result is optimal among jump-aligned partitions only; this is
//     the speed/accuracy dial for full-frame auto-cropping.
// 4.  **O(1) Segment Cost**: Prefix sums of `x` and `x^2` give the squared error of
//     any slice in constant time.
// 5.  **Stateless Utility**: A `Segmenter` holds only its search parameters and can
//     be shared freely across threads.

use crate::error::{Result, ThermalError};

/// Breakpoints closer than this are never produced (the minimum segment length).
pub const MIN_SEGMENT_SIZE: usize = 2;
/// Default breakpoint grid spacing used for auto-cropping.
pub const DEFAULT_JUMP: usize = 5;

/// Squared-error ("L2") segment cost backed by prefix sums.
pub(crate) struct L2Cost {
    /// `sums[i]` is the sum of the first `i` samples.
    sums: Vec<f64>,
    /// `squares[i]` is the sum of squares of the first `i` samples.
    squares: Vec<f64>,
}

impl L2Cost {
    pub(crate) fn new(signal: &[f64]) -> Self {
        let mut sums = Vec::with_capacity(signal.len() + 1);
        let mut squares = Vec::with_capacity(signal.len() + 1);
        sums.push(0.0);
        squares.push(0.0);
        for &x in signal {
            sums.push(sums[sums.len() - 1] + x);
            squares.push(squares[squares.len() - 1] + x * x);
        }
        Self { sums, squares }
    }

    /// Sum of `(x - mean)^2` over `signal[start..end]`. `end` must not exceed
    /// the signal length.
    pub(crate) fn error(&self, start: usize, end: usize) -> f64 {
        if end <= start {
            return 0.0;
        }
        let len = (end - start) as f64;
        let sum = self.sums[end] - self.sums[start];
        let squares = self.squares[end] - self.squares[start];
        // Cancellation can leave a tiny negative residue on flat runs.
        (squares - sum * sum / len).max(0.0)
    }
}

/// Best partition found so far for a prefix ending at some breakpoint.
#[derive(Debug, Clone, Copy)]
struct Partition {
    /// Total penalised cost of the prefix.
    cost: f64,
    /// The breakpoint preceding this one in the optimal partition.
    previous: usize,
}

/// An admissible breakpoint and the end point from which it is pruned.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    breakpoint: usize,
    retired_from: Option<usize>,
}

/// Penalised change-point detector (PELT over an L2 cost).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segmenter {
    jump: usize,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self { jump: DEFAULT_JUMP }
    }
}

impl Segmenter {
    /// A segmenter that only considers breakpoints on multiples of `jump`.
    pub fn new(jump: usize) -> Result<Self> {
        if jump == 0 {
            return Err(ThermalError::InvalidParameter {
                name: "jump".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(Self { jump })
    }

    /// An exhaustive segmenter (`jump = 1`).
    pub fn exact() -> Self {
        Self { jump: 1 }
    }

    pub fn jump(&self) -> usize {
        self.jump
    }

    /// Returns the ordered breakpoints `[0, b_1, .., n]` of the minimum-cost partition.
    pub fn breakpoints(&self, signal: &[f64], penalty: u32) -> Result<Vec<usize>> {
        let n = signal.len();
        if n < MIN_SEGMENT_SIZE {
            return Err(ThermalError::InsufficientData {
                required: MIN_SEGMENT_SIZE,
                got: n,
            });
        }

        let cost = L2Cost::new(signal);
        let penalty = f64::from(penalty);

        let mut ends: Vec<usize> = (0..n)
            .step_by(self.jump)
            .filter(|&k| k >= MIN_SEGMENT_SIZE)
            .collect();
        ends.push(n);

        let mut best: Vec<Option<Partition>> = vec![None; n + 1];
        best[0] = Some(Partition {
            cost: 0.0,
            previous: 0,
        });
        let mut admissible: Vec<Candidate> = Vec::new();
        let mut newest_pushed: Option<usize> = None;

        for end in ends {
            admissible.retain(|c| c.retired_from.is_none_or(|from| end < from));

            // The newest breakpoint still leaving a full segment before `end`.
            let newest = (end - MIN_SEGMENT_SIZE) / self.jump * self.jump;
            if newest_pushed != Some(newest) {
                admissible.push(Candidate {
                    breakpoint: newest,
                    retired_from: None,
                });
                newest_pushed = Some(newest);
            }

            // Breakpoints that never closed a valid prefix can never start a segment.
            admissible.retain(|c| best[c.breakpoint].is_some());

            let candidates: Vec<f64> = admissible
                .iter()
                .filter_map(|c| {
                    best[c.breakpoint].map(|p| p.cost + cost.error(c.breakpoint, end) + penalty)
                })
                .collect();

            // Strict comparison keeps the earliest breakpoint on ties.
            let mut winner: Option<(usize, f64)> = None;
            for (candidate, &total) in admissible.iter().zip(&candidates) {
                if winner.is_none_or(|(_, current)| total < current) {
                    winner = Some((candidate.breakpoint, total));
                }
            }
            let (previous, total) = winner.ok_or(ThermalError::InsufficientData {
                required: MIN_SEGMENT_SIZE,
                got: end,
            })?;
            best[end] = Some(Partition {
                cost: total,
                previous,
            });

            for (candidate, &through) in admissible.iter_mut().zip(&candidates) {
                if candidate.retired_from.is_none() && through > total + penalty {
                    candidate.retired_from = Some(end + MIN_SEGMENT_SIZE);
                }
            }
        }

        let mut breakpoints = vec![n];
        let mut cursor = n;
        while cursor > 0 {
            let partition = best[cursor].ok_or(ThermalError::InsufficientData {
                required: MIN_SEGMENT_SIZE,
                got: cursor,
            })?;
            cursor = partition.previous;
            breakpoints.push(cursor);
        }
        breakpoints.reverse();
        Ok(breakpoints)
    }
}
