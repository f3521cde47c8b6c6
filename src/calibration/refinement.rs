// False-positive-rate guard
//
// Raises a candidate threshold in fixed increments until the fraction of
// negative-control partitions at or above it no longer exceeds the limit:
//
//   while count(nc >= t) / n > limit { t += step }
//
// Instead of recounting the series every step, the guard finds the one value
// that keeps the loop running (the (k+1)-th largest reading, where k is the
// largest count the limit tolerates) and steps past it. The accumulated
// threshold is built by the same repeated addition, so the result is
// bit-identical to the naive loop.

use crate::cancel::CancelFlag;
use crate::config::CalibrationConfig;
use crate::error::CalibrationError;

/// Steps between cancellation checks
const CANCEL_CHECK_INTERVAL: u64 = 1 << 16;

/// Fraction of `negatives` at or above `threshold`
///
/// NaN readings count towards the denominator but never towards the
/// numerator. Returns NaN for an empty series.
pub fn false_positive_rate(negatives: &[f64], threshold: f64) -> f64 {
    let above = negatives.iter().filter(|v| **v >= threshold).count();
    above as f64 / negatives.len() as f64
}

/// Result of running the guard
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuardOutcome {
    /// Final threshold
    pub threshold: f64,
    /// Increments applied
    pub steps: u64,
    /// Negative-control false-positive rate at `threshold`
    pub false_positive_rate: f64,
}

/// Bounded step search for the FPR constraint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FprGuard {
    limit: f64,
    step: f64,
    max_steps: u64,
}

impl FprGuard {
    /// Validate guard parameters
    ///
    /// The limit must be a non-negative number and the step a positive
    /// finite number.
    pub fn new(limit: f64, step: f64, max_steps: u64) -> Result<Self, CalibrationError> {
        if limit.is_nan() || limit < 0.0 {
            return Err(CalibrationError::InvalidConfig {
                reason: format!("fpr_limit must be >= 0, got {}", limit),
            });
        }
        if !step.is_finite() || step <= 0.0 {
            return Err(CalibrationError::InvalidConfig {
                reason: format!("step must be a positive finite number, got {}", step),
            });
        }
        Ok(Self {
            limit,
            step,
            max_steps,
        })
    }

    pub fn from_config(config: &CalibrationConfig) -> Result<Self, CalibrationError> {
        Self::new(config.fpr_limit, config.step, config.max_refinement_steps)
    }

    pub fn limit(&self) -> f64 {
        self.limit
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    /// Raise `start` until the false-positive rate on `negatives` is within
    /// the limit
    ///
    /// # Errors
    /// * `EmptyNegativeControl` - `negatives` is empty
    /// * `RefinementLimitExceeded` - more than `max_steps` increments needed
    /// * `Cancelled` - `cancel` was set while stepping
    pub fn apply(
        &self,
        negatives: &[f64],
        start: f64,
        cancel: &CancelFlag,
    ) -> Result<GuardOutcome, CalibrationError> {
        let n = negatives.len();
        if n == 0 {
            return Err(CalibrationError::EmptyNegativeControl);
        }

        let mut threshold = start;
        let mut steps: u64 = 0;

        if let Some(blocking) = self.blocking_value(negatives) {
            while blocking >= threshold {
                if steps >= self.max_steps {
                    return Err(CalibrationError::RefinementLimitExceeded { steps, threshold });
                }
                if steps % CANCEL_CHECK_INTERVAL == 0 && steps > 0 && cancel.is_cancelled() {
                    return Err(CalibrationError::Cancelled);
                }
                threshold += self.step;
                steps += 1;
            }
        }

        Ok(GuardOutcome {
            threshold,
            steps,
            false_positive_rate: false_positive_rate(negatives, threshold),
        })
    }

    /// Largest tolerated count of readings at or above the threshold
    fn tolerated(&self, n: usize) -> usize {
        let total = n as f64;
        let mut k = (self.limit * total).floor().min(total) as usize;
        while k > 0 && k as f64 / total > self.limit {
            k -= 1;
        }
        while k < n && (k + 1) as f64 / total <= self.limit {
            k += 1;
        }
        k
    }

    /// Reading that keeps the loop condition true while the threshold does
    /// not exceed it; `None` when the limit tolerates every reading
    fn blocking_value(&self, negatives: &[f64]) -> Option<f64> {
        let tolerated = self.tolerated(negatives.len());
        let mut finite: Vec<f64> = negatives.iter().copied().filter(|v| !v.is_nan()).collect();
        if tolerated >= finite.len() {
            return None;
        }
        let idx = finite.len() - 1 - tolerated;
        let (_, blocking, _) = finite.select_nth_unstable_by(idx, f64::total_cmp);
        Some(*blocking)
    }
}
