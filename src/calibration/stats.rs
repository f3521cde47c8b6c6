// Descriptive statistics over RFU series
//
// Population statistics (divide by n), summed pairwise so rounding error grows
// with log(n) rather than n on files with hundreds of thousands of partitions.

const PAIRWISE_BLOCK: usize = 128;
const UNROLL: usize = 8;

/// Pairwise sum of `values`
pub fn pairwise_sum(values: &[f64]) -> f64 {
    let n = values.len();
    if n < UNROLL {
        let mut sum = -0.0;
        for v in values {
            sum += v;
        }
        sum
    } else if n <= PAIRWISE_BLOCK {
        let mut acc = [0.0; UNROLL];
        acc.copy_from_slice(&values[..UNROLL]);
        let whole = n - n % UNROLL;
        for chunk in values[UNROLL..whole].chunks_exact(UNROLL) {
            for (a, v) in acc.iter_mut().zip(chunk) {
                *a += v;
            }
        }
        let mut sum = ((acc[0] + acc[1]) + (acc[2] + acc[3])) + ((acc[4] + acc[5]) + (acc[6] + acc[7]));
        for v in &values[whole..] {
            sum += v;
        }
        sum
    } else {
        let mut half = n / 2;
        half -= half % UNROLL;
        pairwise_sum(&values[..half]) + pairwise_sum(&values[half..])
    }
}

/// Arithmetic mean; NaN for an empty series
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    pairwise_sum(values) / values.len() as f64
}

/// Population standard deviation (no Bessel correction); NaN for an empty series
pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let m = mean(values);
    let squared: Vec<f64> = values
        .iter()
        .map(|v| {
            let d = v - m;
            d * d
        })
        .collect();
    (pairwise_sum(&squared) / values.len() as f64).sqrt()
}

/// `mean + multiplier * population_std_dev`
pub fn mean_plus_k_sigma(values: &[f64], multiplier: f64) -> f64 {
    mean(values) + multiplier * population_std_dev(values)
}

/// Number of distinct values, NaN excluded
pub fn distinct_count(values: &[f64]) -> usize {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup_by(|a, b| a == b);
    sorted.len()
}
