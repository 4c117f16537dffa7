//! Plot output using Plotters: segment scatter and forecast chart.

use std::path::Path;

use chrono::{Duration, NaiveDate};
use ndarray::Array2;
use plotters::prelude::*;
use tracing::warn;

use crate::cluster::Segmentation;
use crate::forecast::ForecastRow;

/// Color palette for the customer segments
const CLUSTER_COLORS: [RGBColor; 8] = [
    RED,
    BLUE,
    GREEN,
    MAGENTA,
    CYAN,
    RGBColor(255, 140, 0),
    RGBColor(128, 0, 128),
    RGBColor(110, 70, 20),
];

/// Length of the forecast reporting window, starting at the cutoff.
const REPORT_WINDOW_DAYS: i64 = 30;

fn cluster_color(label: usize) -> RGBColor {
    CLUSTER_COLORS[label % CLUSTER_COLORS.len()]
}

/// Scatter plot of the 2-D embedding, one color per segment.
///
/// The embedding axes are the t-SNE components; they carry no unit and no
/// standalone meaning, so the axes are labeled only by component index.
pub fn plot_segments(
    embedding: &Array2<f64>,
    segmentation: &Segmentation,
    output_path: &Path,
) -> crate::Result<()> {
    let xs: Vec<f64> = embedding.column(0).to_vec();
    let ys: Vec<f64> = embedding.column(1).to_vec();

    let (x_min, x_max) = padded_bounds(&xs);
    let (y_min, y_max) = padded_bounds(&ys);

    let root = BitMapBackend::new(output_path, (1000, 750)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Customer Segments (t-SNE projection)", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x_min..x_max, y_min..y_max)?;

    chart
        .configure_mesh()
        .x_desc("Component 1")
        .y_desc("Component 2")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    let sizes = segmentation.cluster_sizes();
    for label in 0..segmentation.k {
        let color = cluster_color(label);
        let points = segmentation
            .labels
            .iter()
            .enumerate()
            .filter(|(_, &l)| l == label)
            .map(|(i, _)| Circle::new((xs[i], ys[i]), 4, color.filled().stroke_width(0)));
        chart
            .draw_series(points)?
            .label(format!("Cluster {} ({} customers)", label, sizes[label]))
            .legend(move |(x, y)| Circle::new((x + 5, y), 4, color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.85))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    println!("Segment plot saved to: {}", output_path.display());
    Ok(())
}

/// Actual vs. predicted daily revenue with the 95% band, restricted to the
/// reporting window `[cutoff, cutoff + 29 days]` (capped at the last
/// predicted date).
pub fn plot_forecast(
    rows: &[ForecastRow],
    cutoff: NaiveDate,
    output_path: &Path,
) -> crate::Result<()> {
    let window_end = cutoff + Duration::days(REPORT_WINDOW_DAYS - 1);
    let window: Vec<&ForecastRow> = rows
        .iter()
        .filter(|row| row.date >= cutoff && row.date <= window_end)
        .collect();
    if window.len() < 2 {
        warn!("fewer than two evaluation days to plot, skipping forecast chart");
        return Ok(());
    }

    let first_date = window.first().expect("non-empty window").date;
    let last_date = window.last().expect("non-empty window").date;

    let mut y_values: Vec<f64> = Vec::new();
    for row in &window {
        y_values.push(row.yhat_lower);
        y_values.push(row.yhat_upper);
        if let Some(actual) = row.actual {
            y_values.push(actual);
        }
    }
    let (y_min, y_max) = padded_bounds(&y_values);

    let root = BitMapBackend::new(output_path, (1200, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("Daily Revenue: Actual vs Predicted ({first_date} .. {last_date})"),
            ("sans-serif", 28),
        )
        .margin(10)
        .x_label_area_size(60)
        .y_label_area_size(80)
        .build_cartesian_2d(first_date..last_date, y_min.max(0.0)..y_max)?;

    chart
        .configure_mesh()
        .x_labels(10)
        .x_label_formatter(&|date| date.format("%m-%d").to_string())
        .x_desc("Date")
        .y_desc("Daily revenue")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    // 95% band first so the lines draw on top of it.
    let mut band: Vec<(NaiveDate, f64)> = window
        .iter()
        .map(|row| (row.date, row.yhat_upper))
        .collect();
    band.extend(window.iter().rev().map(|row| (row.date, row.yhat_lower)));
    chart
        .draw_series(std::iter::once(Polygon::new(band, BLUE.mix(0.15))))?
        .label("95% interval")
        .legend(|(x, y)| Rectangle::new([(x, y - 4), (x + 10, y + 4)], BLUE.mix(0.3).filled()));

    chart
        .draw_series(LineSeries::new(
            window.iter().map(|row| (row.date, row.yhat)),
            BLUE.stroke_width(2),
        ))?
        .label("Predicted")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 14, y)], BLUE.stroke_width(2)));

    chart
        .draw_series(LineSeries::new(
            window
                .iter()
                .filter_map(|row| row.actual.map(|actual| (row.date, actual))),
            BLACK.stroke_width(2),
        ))?
        .label("Actual")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 14, y)], BLACK.stroke_width(2)));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.85))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    println!("Forecast plot saved to: {}", output_path.display());
    Ok(())
}

/// Min/max of the values with 5% padding on both sides.
fn padded_bounds(values: &[f64]) -> (f64, f64) {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    let pad = ((max - min) * 0.05).max(1e-6);
    (min - pad, max + pad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    use crate::features::UserFeatures;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn make_segmentation(n: usize, k: usize) -> Segmentation {
        let users = (0..n)
            .map(|i| UserFeatures {
                user_id: format!("u{i}"),
                purchase_cnt: (i + 1) as u64,
                total_paid: 100.0 * (i + 1) as f64,
                avg_paid: 100.0,
                avg_discount: 0.1,
                discount_usage_rate: 0.5,
                avg_app_time: 10.0 + i as f64,
                last_purchase: date(2024, 3, 1),
                recency_days: i as i64,
            })
            .collect();
        Segmentation {
            users,
            labels: (0..n).map(|i| i % k).collect(),
            centroids: Array2::zeros((k, 7)),
            scaled: Array2::zeros((n, 7)),
            inertia: 1.0,
            k,
        }
    }

    #[test]
    fn test_plot_segments_writes_file() {
        let segmentation = make_segmentation(12, 3);
        let embedding =
            Array2::from_shape_fn((12, 2), |(i, j)| i as f64 * 1.5 + j as f64 * 0.5 - 6.0);

        let dir = tempdir().unwrap();
        let path = dir.path().join("segments.png");
        plot_segments(&embedding, &segmentation, &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_plot_forecast_writes_file() {
        let rows: Vec<ForecastRow> = (0..20)
            .map(|i| {
                let yhat = 1_000.0 + i as f64 * 10.0;
                ForecastRow {
                    date: date(2024, 4, 1) + Duration::days(i),
                    yhat,
                    yhat_lower: yhat - 100.0,
                    yhat_upper: yhat + 100.0,
                    actual: if i % 3 == 0 { Some(yhat + 25.0) } else { None },
                }
            })
            .collect();

        let dir = tempdir().unwrap();
        let path = dir.path().join("forecast.png");
        plot_forecast(&rows, date(2024, 4, 1), &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_plot_forecast_skips_tiny_window() {
        let rows = vec![ForecastRow {
            date: date(2024, 4, 1),
            yhat: 10.0,
            yhat_lower: 5.0,
            yhat_upper: 15.0,
            actual: Some(11.0),
        }];
        let dir = tempdir().unwrap();
        let path = dir.path().join("forecast.png");
        plot_forecast(&rows, date(2024, 4, 1), &path).unwrap();
        assert!(!path.exists());
    }
}
