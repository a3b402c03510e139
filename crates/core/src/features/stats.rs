use serde::{Deserialize, Serialize};

/// Summary of one scalar feature across the frames of a clip.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct FeatureStats {
    pub mean: f32,
    pub median: f32,
    pub std: f32,
    pub min: f32,
    pub max: f32,
}

impl FeatureStats {
    /// All-zero stats for an empty input.
    pub fn from_values(values: &[f32]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let n = values.len() as f32;
        let mean = values.iter().sum::<f32>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;

        let mut sorted = values.to_vec();
        sorted.sort_by(f32::total_cmp);
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };

        Self {
            mean,
            median,
            std: variance.sqrt(),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
        }
    }
}

/// Per-coefficient mean and variance across frames. Empty input yields
/// `width` zeros for both.
pub fn mean_and_variance(rows: &[Vec<f32>], width: usize) -> (Vec<f32>, Vec<f32>) {
    if rows.is_empty() {
        return (vec![0.0; width], vec![0.0; width]);
    }
    let n = rows.len() as f32;

    let mut means = vec![0.0; width];
    for row in rows {
        for (acc, v) in means.iter_mut().zip(row) {
            *acc += v;
        }
    }
    means.iter_mut().for_each(|m| *m /= n);

    let mut variances = vec![0.0; width];
    for row in rows {
        for ((acc, v), m) in variances.iter_mut().zip(row).zip(&means) {
            *acc += (v - m).powi(2);
        }
    }
    variances.iter_mut().for_each(|v| *v /= n);

    (means, variances)
}
