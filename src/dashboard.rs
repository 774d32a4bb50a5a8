//! Interactive dashboard over the pipeline artifacts.
//!
//! Single-process axum server; both parquet tables are loaded once at
//! startup and cached in shared state until the process restarts. Every
//! view is rendered server-side: charts are plotters SVG embedded in the
//! page, controls round-trip through query parameters.

use anyhow::{anyhow, Result};
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Datelike, NaiveDateTime, Timelike};
use load_forecaster::features::MS_PER_HOUR;
use plotters::prelude::*;
use polars::prelude::*;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::dataset_builder::DataPaths;

const DEFAULT_WINDOW_HOURS: i64 = 240;
const MIN_WINDOW_HOURS: i64 = 24;
const WINDOW_STEP_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy)]
struct LoadPoint {
    ts: i64,
    mw: f64,
}

#[derive(Debug, Clone, Copy)]
struct PredPoint {
    ts: i64,
    actual: f64,
    p10: f64,
    p50: f64,
    p90: f64,
    anomaly: bool,
}

pub struct DashboardData {
    /// Regions that have predictions; the selector only offers these.
    regions: Vec<String>,
    loads: HashMap<String, Vec<LoadPoint>>,
    preds: HashMap<String, Vec<PredPoint>>,
    span_hours: i64,
}

pub fn serve(port: u16) -> Result<()> {
    let paths = DataPaths::from_env();

    println!("📊 Loading dashboard data …");
    let data = Arc::new(load_data(&paths)?);
    println!(
        "✅ {} regions · serving on http://127.0.0.1:{}",
        data.regions.len(),
        port
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let app = Router::new()
            .route("/", get(render_dashboard))
            .route("/api/summary", get(api_summary))
            .route("/download/actuals.csv", get(download_actuals))
            .route("/download/forecast.csv", get(download_forecast))
            .with_state(data);

        let listener =
            tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], port))).await?;
        axum::serve(listener, app).await?;
        Ok(())
    })
}

fn load_data(paths: &DataPaths) -> Result<DashboardData> {
    let long = ParquetReader::new(File::open(paths.load_long())?).finish()?;
    let preds = ParquetReader::new(File::open(paths.preds())?).finish()?;

    let mut loads: HashMap<String, Vec<LoadPoint>> = HashMap::new();
    {
        let ts = long.column("timestamp")?.datetime()?;
        let region = long.column("region")?.utf8()?;
        let mw = long.column("load_MW")?.f64()?;
        for i in 0..long.height() {
            if let (Some(ts), Some(region), Some(mw)) = (ts.get(i), region.get(i), mw.get(i)) {
                loads
                    .entry(region.to_string())
                    .or_default()
                    .push(LoadPoint { ts, mw });
            }
        }
    }
    for series in loads.values_mut() {
        series.sort_by_key(|p| p.ts);
    }

    let mut pred_map: HashMap<String, Vec<PredPoint>> = HashMap::new();
    {
        let ts = preds.column("timestamp")?.datetime()?;
        let region = preds.column("region")?.utf8()?;
        let actual = preds.column("actual")?.f64()?;
        let p10 = preds.column("p10")?.f64()?;
        let p50 = preds.column("p50")?.f64()?;
        let p90 = preds.column("p90")?.f64()?;
        let anomaly = preds.column("anomaly")?.bool()?;
        for i in 0..preds.height() {
            if let (Some(ts), Some(region), Some(actual), Some(p10), Some(p50), Some(p90)) = (
                ts.get(i),
                region.get(i),
                actual.get(i),
                p10.get(i),
                p50.get(i),
                p90.get(i),
            ) {
                pred_map
                    .entry(region.to_string())
                    .or_default()
                    .push(PredPoint {
                        ts,
                        actual,
                        p10,
                        p50,
                        p90,
                        anomaly: anomaly.get(i).unwrap_or(false),
                    });
            }
        }
    }
    for series in pred_map.values_mut() {
        series.sort_by_key(|p| p.ts);
    }

    let mut regions: Vec<String> = pred_map.keys().cloned().collect();
    regions.sort();

    let (min_ts, max_ts) = loads
        .values()
        .flatten()
        .fold((i64::MAX, i64::MIN), |(lo, hi), p| {
            (lo.min(p.ts), hi.max(p.ts))
        });
    let span_hours = if max_ts > min_ts {
        (max_ts - min_ts) / MS_PER_HOUR
    } else {
        MIN_WINDOW_HOURS
    };

    Ok(DashboardData {
        regions,
        loads,
        preds: pred_map,
        span_hours,
    })
}

#[derive(Debug, Deserialize)]
struct ViewParams {
    region: Option<String>,
    hours: Option<i64>,
    theme: Option<String>,
    tab: Option<String>,
}

struct View {
    region: String,
    hours: i64,
    dark: bool,
    tab: &'static str,
}

impl DashboardData {
    fn resolve(&self, params: &ViewParams) -> Result<View> {
        if self.regions.is_empty() {
            return Err(anyhow!("predictions table has no regions"));
        }
        let region = params
            .region
            .as_ref()
            .filter(|r| self.regions.contains(r))
            .cloned()
            .unwrap_or_else(|| {
                self.regions
                    .iter()
                    .find(|r| r.as_str() == "Calgary")
                    .unwrap_or(&self.regions[0])
                    .clone()
            });

        let max_hours = self.span_hours.max(MIN_WINDOW_HOURS);
        let hours = params
            .hours
            .unwrap_or(DEFAULT_WINDOW_HOURS)
            .clamp(MIN_WINDOW_HOURS, max_hours);

        let dark = params.theme.as_deref() == Some("dark");
        let tab = match params.tab.as_deref() {
            Some("forecast") => "forecast",
            Some("anomaly") => "anomaly",
            Some("heatmap") => "heatmap",
            _ => "trend",
        };
        Ok(View {
            region,
            hours,
            dark,
            tab,
        })
    }
}

/// Trailing slice covering the last `hours` before the series' own end.
fn last_n<T>(points: &[T], ts_of: impl Fn(&T) -> i64, hours: i64) -> &[T] {
    let Some(last) = points.last() else {
        return points;
    };
    let start = ts_of(last) - hours * MS_PER_HOUR;
    let idx = points.partition_point(|p| ts_of(p) < start);
    &points[idx..]
}

fn ndt(ms: i64) -> NaiveDateTime {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.naive_utc())
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// HTTP handlers
// ---------------------------------------------------------------------------

async fn render_dashboard(
    State(data): State<Arc<DashboardData>>,
    Query(params): Query<ViewParams>,
) -> Html<String> {
    match build_page(&data, &params) {
        Ok(page) => Html(page),
        Err(e) => Html(format!(
            "<html><body><h1>Dashboard error</h1><pre>{}</pre></body></html>",
            esc(&e.to_string())
        )),
    }
}

/// Machine-readable view of what the dashboard is serving.
async fn api_summary(State(data): State<Arc<DashboardData>>) -> axum::Json<serde_json::Value> {
    let load_rows: usize = data.loads.values().map(|v| v.len()).sum();
    let pred_rows: usize = data.preds.values().map(|v| v.len()).sum();
    axum::Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "regions": data.regions,
        "load_rows": load_rows,
        "prediction_rows": pred_rows,
        "span_hours": data.span_hours,
    }))
}

async fn download_actuals(
    State(data): State<Arc<DashboardData>>,
    Query(params): Query<ViewParams>,
) -> Response {
    let view = match data.resolve(&params) {
        Ok(view) => view,
        Err(e) => return error_response(e),
    };
    let empty = Vec::new();
    let points = data.loads.get(&view.region).unwrap_or(&empty);
    let window = last_n(points, |p| p.ts, view.hours);

    let mut writer = csv::Writer::from_writer(Vec::new());
    let rows: Result<()> = (|| {
        writer.write_record(["timestamp", "region", "load_MW"])?;
        for p in window {
            writer.write_record([
                ndt(p.ts).format("%Y-%m-%d %H:%M").to_string(),
                view.region.clone(),
                format!("{:.3}", p.mw),
            ])?;
        }
        Ok(())
    })();
    match rows.and_then(|_| Ok(writer.into_inner()?)) {
        Ok(body) => csv_response(body, &format!("{}_load_window.csv", view.region)),
        Err(e) => error_response(e),
    }
}

async fn download_forecast(
    State(data): State<Arc<DashboardData>>,
    Query(params): Query<ViewParams>,
) -> Response {
    let view = match data.resolve(&params) {
        Ok(view) => view,
        Err(e) => return error_response(e),
    };
    let empty = Vec::new();
    let points = data.preds.get(&view.region).unwrap_or(&empty);
    let window = last_n(points, |p| p.ts, view.hours);

    let mut writer = csv::Writer::from_writer(Vec::new());
    let rows: Result<()> = (|| {
        writer.write_record([
            "timestamp", "region", "actual", "p10", "p50", "p90", "anomaly",
        ])?;
        for p in window {
            writer.write_record([
                ndt(p.ts).format("%Y-%m-%d %H:%M").to_string(),
                view.region.clone(),
                format!("{:.3}", p.actual),
                format!("{:.3}", p.p10),
                format!("{:.3}", p.p50),
                format!("{:.3}", p.p90),
                p.anomaly.to_string(),
            ])?;
        }
        Ok(())
    })();
    match rows.and_then(|_| Ok(writer.into_inner()?)) {
        Ok(body) => csv_response(body, &format!("{}_forecast_window.csv", view.region)),
        Err(e) => error_response(e),
    }
}

fn csv_response(body: Vec<u8>, file_name: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name.replace(' ', "_")),
            ),
        ],
        body,
    )
        .into_response()
}

fn error_response(e: anyhow::Error) -> Response {
    (
        axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        format!("dashboard error: {}", e),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Page assembly
// ---------------------------------------------------------------------------

struct ChartTheme {
    dark: bool,
}

impl ChartTheme {
    fn bg(&self) -> RGBColor {
        if self.dark {
            RGBColor(24, 26, 32)
        } else {
            RGBColor(255, 255, 255)
        }
    }

    fn fg(&self) -> RGBColor {
        if self.dark {
            RGBColor(225, 225, 230)
        } else {
            RGBColor(20, 20, 20)
        }
    }

    fn accent(&self) -> RGBColor {
        RGBColor(30, 144, 255)
    }
}

fn build_page(data: &DashboardData, params: &ViewParams) -> Result<String> {
    let view = data.resolve(params)?;
    let palette = ChartTheme { dark: view.dark };

    let empty_loads = Vec::new();
    let empty_preds = Vec::new();
    let region_loads = data.loads.get(&view.region).unwrap_or(&empty_loads);
    let region_preds = data.preds.get(&view.region).unwrap_or(&empty_preds);
    let ld = last_n(region_loads, |p| p.ts, view.hours);
    let pr = last_n(region_preds, |p| p.ts, view.hours);

    let kpis = kpi_strip(ld, pr);
    let body = match view.tab {
        "forecast" => forecast_tab(pr, ld, &view, &palette)?,
        "anomaly" => anomaly_tab(pr, &view, &palette)?,
        "heatmap" => heatmap_tab(region_loads, &view, &palette)?,
        _ => trend_tab(ld, &view, &palette)?,
    };

    Ok(page_shell(data, &view, &kpis, &body))
}

fn kpi_strip(ld: &[LoadPoint], pr: &[PredPoint]) -> String {
    let latest = ld
        .last()
        .map(|p| format!("{:.0} MW", p.mw))
        .unwrap_or_else(|| "-".to_string());

    let peak_today = ld
        .last()
        .map(|last| {
            let day = ndt(last.ts).date();
            ld.iter()
                .filter(|p| ndt(p.ts).date() == day)
                .map(|p| p.mw)
                .fold(f64::NEG_INFINITY, f64::max)
        })
        .map(|v| format!("{:.0}", v))
        .unwrap_or_else(|| "-".to_string());

    let avg_7d = ld
        .last()
        .map(|last| {
            let start = last.ts - 7 * 24 * MS_PER_HOUR;
            let window: Vec<f64> = ld
                .iter()
                .filter(|p| p.ts >= start)
                .map(|p| p.mw)
                .collect();
            window.iter().sum::<f64>() / window.len().max(1) as f64
        })
        .map(|v| format!("{:.0}", v))
        .unwrap_or_else(|| "-".to_string());

    let anomalies = pr.iter().filter(|p| p.anomaly).count();

    format!(
        r#"<div class="kpis">
  <div class="kpi"><span>Latest</span><strong>{latest}</strong></div>
  <div class="kpi"><span>Peak today</span><strong>{peak_today}</strong></div>
  <div class="kpi"><span>7-day avg</span><strong>{avg_7d}</strong></div>
  <div class="kpi"><span>Anomalies</span><strong>{anomalies}</strong></div>
</div>"#
    )
}

fn trend_tab(ld: &[LoadPoint], view: &View, palette: &ChartTheme) -> Result<String> {
    if ld.len() < 2 {
        return Ok("<p>No load data in this window.</p>".to_string());
    }

    let lo = ld.iter().map(|p| p.mw).fold(f64::INFINITY, f64::min);
    let hi = ld.iter().map(|p| p.mw).fold(f64::NEG_INFINITY, f64::max);
    let pad = (hi - lo).abs().max(1.0) * 0.05;
    let (t0, t1) = (ndt(ld[0].ts), ndt(ld[ld.len() - 1].ts));

    let mut buf = String::new();
    {
        let root = SVGBackend::with_string(&mut buf, (920, 360)).into_drawing_area();
        root.fill(&palette.bg())?;

        let mut chart = ChartBuilder::on(&root)
            .caption(
                format!("Load Trend — {}", view.region),
                ("sans-serif", 22).into_font().color(&palette.fg()),
            )
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(RangedDateTime::from(t0..t1), (lo - pad)..(hi + pad))?;

        chart
            .configure_mesh()
            .x_desc("Time")
            .y_desc("MW")
            .axis_style(palette.fg())
            .bold_line_style(palette.fg().mix(0.15))
            .light_line_style(palette.fg().mix(0.05))
            .label_style(("sans-serif", 12).into_font().color(&palette.fg()))
            .x_label_formatter(&|dt| dt.format("%m-%d %H:%M").to_string())
            .draw()?;

        chart.draw_series(LineSeries::new(
            ld.iter().map(|p| (ndt(p.ts), p.mw)),
            palette.accent().stroke_width(2),
        ))?;
        root.present()?;
    }
    Ok(buf)
}

fn forecast_tab(
    pr: &[PredPoint],
    ld: &[LoadPoint],
    view: &View,
    palette: &ChartTheme,
) -> Result<String> {
    if pr.len() < 2 {
        return Ok("<p>No forecast rows in this window.</p>".to_string());
    }

    let lo = pr
        .iter()
        .map(|p| p.p10.min(p.actual))
        .fold(f64::INFINITY, f64::min);
    let hi = pr
        .iter()
        .map(|p| p.p90.max(p.actual))
        .fold(f64::NEG_INFINITY, f64::max);
    let pad = (hi - lo).abs().max(1.0) * 0.05;
    let (t0, t1) = (ndt(pr[0].ts), ndt(pr[pr.len() - 1].ts));

    let mut buf = String::new();
    {
        let root = SVGBackend::with_string(&mut buf, (920, 400)).into_drawing_area();
        root.fill(&palette.bg())?;

        let mut chart = ChartBuilder::on(&root)
            .caption(
                format!("P10 / P50 / P90 Forecast — {}", view.region),
                ("sans-serif", 22).into_font().color(&palette.fg()),
            )
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(RangedDateTime::from(t0..t1), (lo - pad)..(hi + pad))?;

        chart
            .configure_mesh()
            .x_desc("Time")
            .y_desc("MW")
            .axis_style(palette.fg())
            .bold_line_style(palette.fg().mix(0.15))
            .light_line_style(palette.fg().mix(0.05))
            .label_style(("sans-serif", 12).into_font().color(&palette.fg()))
            .x_label_formatter(&|dt| dt.format("%m-%d %H:%M").to_string())
            .draw()?;

        // Fan band between the outer quantiles.
        let mut band: Vec<(NaiveDateTime, f64)> =
            pr.iter().map(|p| (ndt(p.ts), p.p90)).collect();
        band.extend(pr.iter().rev().map(|p| (ndt(p.ts), p.p10)));
        chart.draw_series(std::iter::once(Polygon::new(
            band,
            palette.accent().mix(0.15).filled(),
        )))?;

        chart
            .draw_series(LineSeries::new(
                pr.iter().map(|p| (ndt(p.ts), p.p50)),
                palette.accent().stroke_width(2),
            ))?
            .label("P50")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 10, y)], BLUE));

        chart
            .draw_series(LineSeries::new(
                ld.iter().map(|p| (ndt(p.ts), p.mw)),
                palette.fg().stroke_width(1),
            ))?
            .label("Actual")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 10, y)], BLACK));

        chart
            .configure_series_labels()
            .background_style(palette.bg().mix(0.8))
            .border_style(palette.fg())
            .label_font(("sans-serif", 14).into_font().color(&palette.fg()))
            .draw()?;
        root.present()?;
    }
    Ok(buf)
}

fn anomaly_tab(pr: &[PredPoint], view: &View, palette: &ChartTheme) -> Result<String> {
    if pr.len() < 2 {
        return Ok("<p>No forecast rows in this window.</p>".to_string());
    }
    let flagged: Vec<&PredPoint> = pr.iter().filter(|p| p.anomaly).collect();
    if flagged.is_empty() {
        return Ok("<p class=\"ok\">No anomalies detected in this window 🎉</p>".to_string());
    }

    let lo = pr.iter().map(|p| p.p50).fold(f64::INFINITY, f64::min);
    let hi = pr.iter().map(|p| p.p50).fold(f64::NEG_INFINITY, f64::max);
    let pad = (hi - lo).abs().max(1.0) * 0.1;
    let (t0, t1) = (ndt(pr[0].ts), ndt(pr[pr.len() - 1].ts));

    let mut buf = String::new();
    {
        let root = SVGBackend::with_string(&mut buf, (920, 360)).into_drawing_area();
        root.fill(&palette.bg())?;

        let mut chart = ChartBuilder::on(&root)
            .caption(
                format!("Anomaly Radar — {}", view.region),
                ("sans-serif", 22).into_font().color(&palette.fg()),
            )
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(RangedDateTime::from(t0..t1), (lo - pad)..(hi + pad))?;

        chart
            .configure_mesh()
            .x_desc("Time")
            .y_desc("MW")
            .axis_style(palette.fg())
            .bold_line_style(palette.fg().mix(0.15))
            .light_line_style(palette.fg().mix(0.05))
            .label_style(("sans-serif", 12).into_font().color(&palette.fg()))
            .x_label_formatter(&|dt| dt.format("%m-%d %H:%M").to_string())
            .draw()?;

        chart.draw_series(LineSeries::new(
            pr.iter().map(|p| (ndt(p.ts), p.p50)),
            palette.accent().stroke_width(1),
        ))?;
        chart.draw_series(
            flagged
                .iter()
                .map(|p| Circle::new((ndt(p.ts), p.p50), 4, RED.filled())),
        )?;
        root.present()?;
    }

    let mut table = String::from(
        "<table><tr><th>timestamp</th><th>actual</th><th>p50</th><th>p10</th><th>p90</th></tr>",
    );
    for p in flagged.iter().rev() {
        table.push_str(&format!(
            "<tr><td>{}</td><td>{:.1}</td><td>{:.1}</td><td>{:.1}</td><td>{:.1}</td></tr>",
            ndt(p.ts).format("%Y-%m-%d %H:%M"),
            p.actual,
            p.p50,
            p.p10,
            p.p90
        ));
    }
    table.push_str("</table>");

    Ok(format!("{buf}\n{table}"))
}

fn heatmap_tab(all_loads: &[LoadPoint], view: &View, palette: &ChartTheme) -> Result<String> {
    if all_loads.is_empty() {
        return Ok("<p>No load history for this region.</p>".to_string());
    }

    // Mean load by (month, hour) over the region's full history.
    let mut sums = [[0.0f64; 24]; 12];
    let mut counts = [[0usize; 24]; 12];
    for p in all_loads {
        let dt = ndt(p.ts);
        let m = dt.month() as usize - 1;
        let h = dt.hour() as usize;
        sums[m][h] += p.mw;
        counts[m][h] += 1;
    }
    let mut cells: Vec<(usize, usize, f64)> = Vec::new();
    for m in 0..12 {
        for h in 0..24 {
            if counts[m][h] > 0 {
                cells.push((m, h, sums[m][h] / counts[m][h] as f64));
            }
        }
    }
    let lo = cells.iter().map(|c| c.2).fold(f64::INFINITY, f64::min);
    let hi = cells.iter().map(|c| c.2).fold(f64::NEG_INFINITY, f64::max);

    let mut buf = String::new();
    {
        let root = SVGBackend::with_string(&mut buf, (920, 420)).into_drawing_area();
        root.fill(&palette.bg())?;

        let mut chart = ChartBuilder::on(&root)
            .caption(
                format!("Average Load — {} (Month × Hour)", view.region),
                ("sans-serif", 22).into_font().color(&palette.fg()),
            )
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(0i32..24i32, 1i32..13i32)?;

        chart
            .configure_mesh()
            .disable_mesh()
            .x_desc("Hour")
            .y_desc("Month")
            .x_labels(24)
            .y_labels(12)
            .axis_style(palette.fg())
            .label_style(("sans-serif", 12).into_font().color(&palette.fg()))
            .draw()?;

        chart.draw_series(cells.iter().map(|&(m, h, mean)| {
            let t = if hi > lo { (mean - lo) / (hi - lo) } else { 0.5 };
            Rectangle::new(
                [(h as i32, m as i32 + 1), (h as i32 + 1, m as i32 + 2)],
                heat_color(t).filled(),
            )
        }))?;
        root.present()?;
    }
    Ok(buf)
}

/// Cold-to-hot ramp: deep blue through amber to red.
fn heat_color(t: f64) -> RGBColor {
    let t = t.clamp(0.0, 1.0);
    if t < 0.5 {
        let u = t * 2.0;
        RGBColor(
            (40.0 + 210.0 * u) as u8,
            (60.0 + 140.0 * u) as u8,
            (150.0 - 100.0 * u) as u8,
        )
    } else {
        let u = (t - 0.5) * 2.0;
        RGBColor(
            (250.0 - 30.0 * u) as u8,
            (200.0 - 160.0 * u) as u8,
            (50.0 - 20.0 * u) as u8,
        )
    }
}

fn esc(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn href(region: &str, hours: i64, dark: bool, tab: &str) -> String {
    format!(
        "/?region={}&hours={}&theme={}&tab={}",
        region.replace(' ', "%20"),
        hours,
        if dark { "dark" } else { "light" },
        tab
    )
}

fn page_shell(data: &DashboardData, view: &View, kpis: &str, body: &str) -> String {
    let (bg, fg, card) = if view.dark {
        ("#181a20", "#e1e1e6", "#232630")
    } else {
        ("#ffffff", "#141414", "#f2f4f8")
    };

    let options: String = data
        .regions
        .iter()
        .map(|r| {
            format!(
                "<option value=\"{r}\"{sel}>{r}</option>",
                r = esc(r),
                sel = if *r == view.region { " selected" } else { "" }
            )
        })
        .collect();

    let tabs: String = [
        ("trend", "📊 Trend"),
        ("forecast", "📈 Forecast"),
        ("anomaly", "🚨 Anomaly"),
        ("heatmap", "🌡 Compare"),
    ]
    .iter()
    .map(|(tab, label)| {
        format!(
            "<a class=\"tab{active}\" href=\"{href}\">{label}</a>",
            active = if *tab == view.tab { " active" } else { "" },
            href = href(&view.region, view.hours, view.dark, tab),
        )
    })
    .collect();

    let theme_links = format!(
        "<a href=\"{}\">Light</a> · <a href=\"{}\">Dark</a>",
        href(&view.region, view.hours, false, view.tab),
        href(&view.region, view.hours, true, view.tab)
    );

    let max_hours = data.span_hours.max(MIN_WINDOW_HOURS);
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Alberta Load Forecast Dashboard</title>
<style>
  body {{ margin: 0; font-family: sans-serif; background: {bg}; color: {fg}; }}
  .layout {{ display: flex; min-height: 100vh; }}
  .sidebar {{ width: 250px; padding: 16px; background: {card}; }}
  .main {{ flex: 1; padding: 16px 24px; }}
  .kpis {{ display: flex; gap: 12px; margin-bottom: 16px; }}
  .kpi {{ background: {card}; padding: 10px 16px; border-radius: 8px; }}
  .kpi span {{ display: block; font-size: 12px; opacity: 0.7; }}
  .tab {{ margin-right: 12px; text-decoration: none; color: {fg}; opacity: 0.6; }}
  .tab.active {{ opacity: 1; font-weight: bold; border-bottom: 2px solid #1e90ff; }}
  table {{ border-collapse: collapse; margin-top: 16px; }}
  td, th {{ border: 1px solid #8884; padding: 4px 10px; font-size: 13px; }}
  a {{ color: #1e90ff; }}
  input, select {{ width: 100%; margin: 4px 0 12px 0; }}
</style>
</head>
<body>
<div class="layout">
  <div class="sidebar">
    <h3>⚙️ Controls</h3>
    <form method="get" action="/">
      <label>Region</label>
      <select name="region">{options}</select>
      <label>Last N hours ({hours})</label>
      <input type="range" name="hours" min="{min_hours}" max="{max_hours}" step="{step}" value="{hours}">
      <input type="hidden" name="theme" value="{theme}">
      <input type="hidden" name="tab" value="{tab}">
      <button type="submit">Apply</button>
    </form>
    <p>Theme: {theme_links}</p>
    <hr>
    <p><a href="/download/actuals.csv?region={region_q}&amp;hours={hours}">⬇ Actual window CSV</a></p>
    <p><a href="/download/forecast.csv?region={region_q}&amp;hours={hours}">⬇ Forecast window CSV</a></p>
  </div>
  <div class="main">
    <h2>Alberta Load Forecast — {region}</h2>
    {kpis}
    <nav>{tabs}</nav>
    <div class="view">{body}</div>
  </div>
</div>
</body>
</html>"#,
        bg = bg,
        fg = fg,
        card = card,
        options = options,
        hours = view.hours,
        min_hours = MIN_WINDOW_HOURS,
        max_hours = max_hours,
        step = WINDOW_STEP_HOURS,
        theme = if view.dark { "dark" } else { "light" },
        tab = view.tab,
        theme_links = theme_links,
        region = esc(&view.region),
        region_q = view.region.replace(' ', "%20"),
        kpis = kpis,
        tabs = tabs,
        body = body,
    )
}
