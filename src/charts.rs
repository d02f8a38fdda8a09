// src/charts.rs
//! SVG line charts for the trade page.

use crate::market::rolling_mean;
use crate::models::Candle;
use crate::views::escape;
use std::fmt::Write;
use std::path::{Path, PathBuf};

pub const HISTORY_DAYS: u32 = 100;
pub const MOVING_AVERAGE_DAYS: usize = 20;

const WIDTH: f64 = 800.0;
const HEIGHT: f64 = 400.0;
const MARGIN: f64 = 50.0;
const COLORS: [&str; 2] = ["#1f77b4", "#ff7f0e"];

pub struct Series<'a> {
    pub label: &'a str,
    pub points: Vec<Option<f64>>,
}

pub fn history_file(cur1: &str, cur2: &str) -> String {
    format!("history_{}_{}.svg", cur1, cur2)
}

pub fn moving_avg_file(cur1: &str, cur2: &str) -> String {
    format!("moving_avg_{}_{}.svg", cur1, cur2)
}

/// Writes the 100 day close chart and returns its path.
pub async fn write_history(dir: &Path, cur1: &str, cur2: &str, candles: &[Candle]) -> std::io::Result<PathBuf> {
    let labels: Vec<String> = candles
        .iter()
        .map(|c| c.timestamp().format("%Y-%m-%d").to_string())
        .collect();
    let series = [Series {
        label: "close",
        points: candles.iter().map(|c| Some(c.close)).collect(),
    }];
    let svg = render("100 days history", &labels, &series);
    write(dir, &history_file(cur1, cur2), svg).await
}

/// Writes the last `MOVING_AVERAGE_DAYS` closes with their trailing mean.
///
/// `candles` should hold `2 * MOVING_AVERAGE_DAYS - 1` days so every plotted
/// day has a full window; shorter input just leaves the first means empty.
pub async fn write_moving_average(dir: &Path, cur1: &str, cur2: &str, candles: &[Candle]) -> std::io::Result<PathBuf> {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let means = rolling_mean(&closes, MOVING_AVERAGE_DAYS);
    let skip = candles.len().saturating_sub(MOVING_AVERAGE_DAYS);

    let labels: Vec<String> = candles[skip..]
        .iter()
        .map(|c| c.timestamp().format("%Y-%m-%d").to_string())
        .collect();
    let series = [
        Series {
            label: "price",
            points: closes[skip..].iter().map(|c| Some(*c)).collect(),
        },
        Series {
            label: "20d rm",
            points: means[skip..].to_vec(),
        },
    ];
    let svg = render("20 days moving average", &labels, &series);
    write(dir, &moving_avg_file(cur1, cur2), svg).await
}

async fn write(dir: &Path, name: &str, svg: String) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(name);
    tokio::fs::write(&path, svg).await?;
    Ok(path)
}

/// Renders one or more series sharing an x axis of `labels`.
pub fn render(title: &str, labels: &[String], series: &[Series]) -> String {
    let values = series.iter().flat_map(|s| s.points.iter().flatten().copied());
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let (min, max) = match (min.is_finite(), max > min) {
        (false, _) => (0.0, 1.0),
        (true, false) => (min - 1.0, max + 1.0),
        (true, true) => (min, max),
    };

    let plot_w = WIDTH - 2.0 * MARGIN;
    let plot_h = HEIGHT - 2.0 * MARGIN;
    let steps = labels.len().max(2) - 1;
    let x = |i: usize| MARGIN + plot_w * i as f64 / steps as f64;
    let y = |v: f64| MARGIN + plot_h * (1.0 - (v - min) / (max - min));

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = WIDTH,
        h = HEIGHT
    );
    let _ = writeln!(svg, r#"<rect width="100%" height="100%" fill="white"/>"#);
    let _ = writeln!(
        svg,
        r#"<text x="{}" y="25" text-anchor="middle" font-family="sans-serif" font-size="16">{}</text>"#,
        WIDTH / 2.0,
        escape(title)
    );
    let _ = writeln!(
        svg,
        r#"<polyline points="{m},{m} {m},{b} {r},{b}" fill="none" stroke="black"/>"#,
        m = MARGIN,
        b = HEIGHT - MARGIN,
        r = WIDTH - MARGIN
    );
    for (v, anchor) in [(max, MARGIN), (min, HEIGHT - MARGIN)] {
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{:.1}" text-anchor="end" font-family="sans-serif" font-size="10">{:.2}</text>"#,
            MARGIN - 4.0,
            anchor,
            v
        );
    }
    if let (Some(first), Some(last)) = (labels.first(), labels.last()) {
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{}" font-family="sans-serif" font-size="10">{}</text>"#,
            MARGIN,
            HEIGHT - MARGIN + 15.0,
            escape(first)
        );
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="end" font-family="sans-serif" font-size="10">{}</text>"#,
            WIDTH - MARGIN,
            HEIGHT - MARGIN + 15.0,
            escape(last)
        );
    }

    for (n, s) in series.iter().enumerate() {
        let color = COLORS[n % COLORS.len()];
        let points: Vec<String> = s
            .points
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.map(|v| format!("{:.1},{:.1}", x(i), y(v))))
            .collect();
        if !points.is_empty() {
            let _ = writeln!(
                svg,
                r#"<polyline points="{}" fill="none" stroke="{}" stroke-width="1.5"/>"#,
                points.join(" "),
                color
            );
        }
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{}" fill="{}" font-family="sans-serif" font-size="12">{}</text>"#,
            WIDTH - MARGIN - 80.0,
            MARGIN + 15.0 * (n as f64 + 1.0),
            color,
            escape(s.label)
        );
    }
    svg.push_str("</svg>\n");
    svg
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candles(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| Candle {
                time: 86_400 * i as i64,
                high: *c,
                low: *c,
                close: *c,
            })
            .collect()
    }

    #[test]
    fn render_plots_every_defined_point() {
        let labels: Vec<String> = (0..3).map(|i| i.to_string()).collect();
        let svg = render(
            "a < b",
            &labels,
            &[Series { label: "s", points: vec![Some(1.0), None, Some(3.0)] }],
        );
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("a &lt; b"));
        assert!(svg.contains(r#"points="50.0,350.0 750.0,50.0""#));
    }

    #[test]
    fn flat_or_empty_series_still_render() {
        let flat = render("flat", &["x".to_string()], &[Series { label: "s", points: vec![Some(5.0)] }]);
        assert!(flat.contains("<polyline points=\"50.0,200.0\""));
        let empty = render("empty", &[], &[]);
        assert!(empty.ends_with("</svg>\n"));
    }

    #[tokio::test]
    async fn writes_both_trade_charts() {
        let dir = std::env::temp_dir().join(format!("coin_ledger_charts_{}", std::process::id()));
        let daily = candles(&(1..=39).map(f64::from).collect::<Vec<_>>());

        let history = write_history(&dir, "USD", "BTC", &daily).await.unwrap();
        let moving = write_moving_average(&dir, "USD", "BTC", &daily).await.unwrap();

        assert_eq!(history.file_name().unwrap(), "history_USD_BTC.svg");
        assert_eq!(moving.file_name().unwrap(), "moving_avg_USD_BTC.svg");
        let svg = tokio::fs::read_to_string(&moving).await.unwrap();
        assert!(svg.contains("20d rm"));
        assert_eq!(svg.matches("<polyline").count(), 3);
        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
