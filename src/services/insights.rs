use chrono::Utc;
use crate::models::{AiInsights, ChartData};

pub const RECOMMENDATIONS: [&str; 3] = [
    "Consider focusing on periods with higher values",
    "Look for patterns in the data distribution",
    "Monitor for any outliers or anomalies",
];

/// Summarises the first dataset of a chart: extremes, mean and fixed recommendations.
pub fn summarize(chart: &ChartData, value_label: &str) -> AiInsights {
    let data = chart.datasets.first().map(|d| d.data.as_slice()).unwrap_or_default();
    let recommendations = RECOMMENDATIONS.iter().map(|r| r.to_string()).collect();

    if data.is_empty() {
        return AiInsights {
            summary: format!("Analysis of {value_label} data shows 0 data points."),
            trends: Vec::new(),
            recommendations,
            generated_at: Utc::now(),
        };
    }

    // First occurrence wins on ties, so the highlighted label is stable.
    let (max_idx, max_value) = data
        .iter()
        .copied()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best });
    let min_value = data.iter().copied().fold(f64::INFINITY, f64::min);
    let average = data.iter().sum::<f64>() / data.len() as f64;
    let max_label = chart.labels.get(max_idx).map(String::as_str).unwrap_or("");

    AiInsights {
        summary: format!(
            "Analysis of {value_label} data shows {} data points with an average of {average:.2}.",
            data.len()
        ),
        trends: vec![
            format!("Highest value: {max_value} ({max_label})"),
            format!("Lowest value: {min_value}"),
            format!("Average: {average:.2}"),
        ],
        recommendations,
        generated_at: Utc::now(),
    }
}
