// Two-means clustering of a one-dimensional RFU series
//
// Lloyd iterations over the sorted series. In one dimension the two clusters
// are always a prefix and a suffix of the sorted values, so each assignment
// step is a single split point.
//
// Initialization is deterministic: either the series extremes, or k-means++
// seeding from a fixed seed with several restarts (lowest inertia wins).

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::calibration::stats::{distinct_count, mean};
use crate::config::{KMeansConfig, KMeansInit};

/// Converged two-cluster partition
#[derive(Debug, Clone, PartialEq)]
pub struct TwoMeans {
    /// Cluster centers, ascending
    pub centers: [f64; 2],
    /// Members of the lower and upper cluster
    pub sizes: [usize; 2],
    /// Sum of squared distances to the assigned center
    pub inertia: f64,
    /// Lloyd iterations of the winning run
    pub iterations: usize,
}

impl TwoMeans {
    pub fn lower(&self) -> f64 {
        self.centers[0]
    }

    pub fn upper(&self) -> f64 {
        self.centers[1]
    }
}

/// Fit two clusters to `values`
///
/// Returns `None` when the series has fewer than two distinct values (NaN
/// ignored), where a two-cluster partition is undefined.
pub fn fit_two_means(values: &[f64], config: &KMeansConfig) -> Option<TwoMeans> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if distinct_count(&sorted) < 2 {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let max_iterations = config.max_iterations.max(1);
    match config.init {
        KMeansInit::Extremes => {
            let first = sorted[0];
            let last = sorted[sorted.len() - 1];
            Some(lloyd(&sorted, [first, last], max_iterations))
        }
        KMeansInit::Seeded => {
            let mut best: Option<TwoMeans> = None;
            for restart in 0..config.restarts.max(1) {
                let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(restart as u64));
                let init = plus_plus_init(&sorted, &mut rng);
                let fit = lloyd(&sorted, init, max_iterations);
                if best.as_ref().map_or(true, |b| fit.inertia < b.inertia) {
                    best = Some(fit);
                }
            }
            best
        }
    }
}

/// k-means++ seeding for two centers over sorted, non-constant values
fn plus_plus_init(sorted: &[f64], rng: &mut StdRng) -> [f64; 2] {
    let first = sorted[rng.gen_range(0..sorted.len())];
    let weights: Vec<f64> = sorted.iter().map(|v| (v - first) * (v - first)).collect();
    let total: f64 = weights.iter().sum();

    let mut target = rng.gen::<f64>() * total;
    let mut second = sorted[sorted.len() - 1];
    for (v, w) in sorted.iter().zip(&weights) {
        if *w > 0.0 && target < *w {
            second = *v;
            break;
        }
        target -= w;
    }
    if second == first {
        // rounding walked past every positive weight; take the farthest point
        second = if (sorted[0] - first).abs() > (sorted[sorted.len() - 1] - first).abs() {
            sorted[0]
        } else {
            sorted[sorted.len() - 1]
        };
    }

    if first <= second {
        [first, second]
    } else {
        [second, first]
    }
}

/// Lloyd iterations from `centers` (ascending) over sorted values
fn lloyd(sorted: &[f64], mut centers: [f64; 2], max_iterations: usize) -> TwoMeans {
    let mut split = split_point(sorted, centers);
    let mut iterations = 0;

    while iterations < max_iterations {
        iterations += 1;
        let (lower, upper) = sorted.split_at(split);
        centers = [mean(lower), mean(upper)];

        let next = split_point(sorted, centers);
        if next == split {
            break;
        }
        split = next;
    }

    let (lower, upper) = sorted.split_at(split);
    let inertia = lower.iter().map(|v| (v - centers[0]).powi(2)).sum::<f64>()
        + upper.iter().map(|v| (v - centers[1]).powi(2)).sum::<f64>();

    TwoMeans {
        centers,
        sizes: [lower.len(), upper.len()],
        inertia,
        iterations,
    }
}

/// Index of the first value assigned to the upper center
///
/// Ties go to the lower center. The result is clamped so both clusters keep
/// at least one member.
fn split_point(sorted: &[f64], centers: [f64; 2]) -> usize {
    let [c0, c1] = centers;
    let split = sorted.partition_point(|v| (v - c0).abs() <= (v - c1).abs());
    split.clamp(1, sorted.len() - 1)
}
