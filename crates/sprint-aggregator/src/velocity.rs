//! Velocity history and trend classification (§4.D).

use sprint_core::types::{SprintVelocityPoint, VelocityReport, VelocityTrend};

/// Builds the velocity report from up to the last 5 sprints, oldest first.
/// The trend is the slope of a simple linear fit over `velocity` values,
/// classified against ±5% of the series mean.
pub fn build_velocity_report(sprints: Vec<SprintVelocityPoint>) -> VelocityReport {
    let average = if sprints.is_empty() {
        0.0
    } else {
        sprints.iter().map(|s| s.velocity).sum::<f64>() / sprints.len() as f64
    };

    let trend = classify_trend(&sprints.iter().map(|s| s.velocity).collect::<Vec<_>>());

    VelocityReport {
        sprints,
        average,
        trend,
    }
}

fn classify_trend(values: &[f64]) -> VelocityTrend {
    if values.len() < 2 {
        return VelocityTrend::Stable;
    }

    let slope = linear_fit_slope(values);
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if mean == 0.0 {
        return VelocityTrend::Stable;
    }

    let relative = slope / mean;
    if relative > 0.05 {
        VelocityTrend::Increasing
    } else if relative < -0.05 {
        VelocityTrend::Decreasing
    } else {
        VelocityTrend::Stable
    }
}

/// Ordinary least-squares slope of `values` against their index.
fn linear_fit_slope(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let xs: Vec<f64> = (0..values.len()).map(|i| i as f64).collect();
    let x_mean = xs.iter().sum::<f64>() / n;
    let y_mean = values.iter().sum::<f64>() / n;

    let numerator: f64 = xs
        .iter()
        .zip(values.iter())
        .map(|(x, y)| (x - x_mean) * (y - y_mean))
        .sum();
    let denominator: f64 = xs.iter().map(|x| (x - x_mean).powi(2)).sum();

    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Weighted mean of up to the last 5 sprints, most recent weighted
/// heaviest (weights `5..1`), used for the forward-looking forecast.
pub fn weighted_forecast(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len().min(5);
    let recent = &values[values.len() - n..];
    let weights: Vec<f64> = (1..=n).rev().map(|w| w as f64).collect();
    let weight_sum: f64 = weights.iter().sum();
    let weighted: f64 = recent.iter().zip(weights.iter()).map(|(v, w)| v * w).sum();
    weighted / weight_sum
}

/// Sample standard deviation, used to classify forecast confidence.
pub fn stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
