//! Self-contained HTML performance report.

use anyhow::Context;
use chrono::NaiveDate;
use handlebars::Handlebars;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use super::metrics::{drawdowns, monthly_returns, returns, PerformanceStats};
use ember_common::util::format_pct;

const TEMPLATE_NAME: &str = "tearsheet";

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{{title}}</title>
<style>
body { font-family: Arial, Helvetica, sans-serif; margin: 24px; color: #222; }
h1 { font-size: 22px; }
h2 { font-size: 16px; margin-top: 28px; }
table { border-collapse: collapse; font-size: 13px; }
th, td { padding: 4px 10px; text-align: right; border-bottom: 1px solid #eee; }
th:first-child, td:first-child { text-align: left; }
td.pos { color: #1a7f37; }
td.neg { color: #cf222e; }
.legend span { margin-right: 16px; font-size: 13px; }
</style>
</head>
<body>
<h1>{{title}}</h1>
<p>{{period}}</p>

<h2>Key Performance Metrics</h2>
<table>
<tr><th>Metric</th><th>Strategy</th>{{#if benchmark}}<th>Benchmark ({{benchmark}})</th>{{/if}}</tr>
{{#each metrics}}
<tr><td>{{name}}</td><td>{{strategy}}</td>{{#if ../benchmark}}<td>{{benchmark}}</td>{{/if}}</tr>
{{/each}}
</table>

<h2>Cumulative Returns</h2>
<div class="legend"><span style="color:#1f6feb">Strategy</span>{{#if benchmark}}<span style="color:#8c959f">{{benchmark}}</span>{{/if}}</div>
{{{equity_svg}}}

<h2>Underwater Plot</h2>
{{{drawdown_svg}}}

<h2>Monthly Returns</h2>
<table>
<tr><th>Year</th>{{#each months}}<th>{{this}}</th>{{/each}}<th>Year</th></tr>
{{#each monthly}}
<tr><td>{{year}}</td>{{#each cells}}<td class="{{class}}">{{value}}</td>{{/each}}<td class="{{total_class}}">{{total}}</td></tr>
{{/each}}
</table>
</body>
</html>
"#;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

const SVG_WIDTH: f64 = 900.0;
const SVG_HEIGHT: f64 = 260.0;
const STRATEGY_COLOR: &str = "#1f6feb";
const BENCHMARK_COLOR: &str = "#8c959f";
const DRAWDOWN_COLOR: &str = "#cf222e";

// ============================================================================
// Template data
// ============================================================================

#[derive(Debug, Serialize)]
struct MetricRow {
    name: &'static str,
    strategy: String,
    benchmark: String,
}

#[derive(Debug, Serialize)]
struct MonthCell {
    value: String,
    class: &'static str,
}

#[derive(Debug, Serialize)]
struct MonthlyRow {
    year: i32,
    cells: Vec<MonthCell>,
    total: String,
    total_class: &'static str,
}

#[derive(Debug, Serialize)]
struct TemplateData {
    title: String,
    period: String,
    benchmark: Option<String>,
    metrics: Vec<MetricRow>,
    equity_svg: String,
    drawdown_svg: String,
    months: [&'static str; 12],
    monthly: Vec<MonthlyRow>,
}

// ============================================================================
// Tear sheet
// ============================================================================

/// HTML report of a strategy equity curve against an optional benchmark.
#[derive(Debug, Clone)]
pub struct TearSheet {
    title: String,
    equity: Vec<(NaiveDate, f64)>,
    benchmark: Option<(String, Vec<(NaiveDate, f64)>)>,
}

impl TearSheet {
    pub fn new(title: impl Into<String>, equity: Vec<(NaiveDate, f64)>) -> Self {
        Self {
            title: title.into(),
            equity,
            benchmark: None,
        }
    }

    /// Compare against a price series (close-to-close returns).
    pub fn with_benchmark(mut self, name: impl Into<String>, prices: Vec<(NaiveDate, f64)>) -> Self {
        if prices.len() > 1 {
            self.benchmark = Some((name.into(), prices));
        }
        self
    }

    pub fn strategy_stats(&self) -> PerformanceStats {
        PerformanceStats::from_equity(&self.equity)
    }

    pub fn benchmark_stats(&self) -> Option<PerformanceStats> {
        self.benchmark
            .as_ref()
            .map(|(_, prices)| PerformanceStats::from_equity(prices))
    }

    pub fn render(&self) -> anyhow::Result<String> {
        let mut registry = Handlebars::new();
        registry
            .register_template_string(TEMPLATE_NAME, TEMPLATE)
            .context("invalid report template")?;

        let html = registry
            .render(TEMPLATE_NAME, &self.template_data())
            .context("rendering report")?;
        Ok(html)
    }

    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        let html = self.render()?;
        std::fs::write(path, html).with_context(|| format!("writing {}", path.display()))
    }

    fn template_data(&self) -> TemplateData {
        let strategy = self.strategy_stats();
        let benchmark = self.benchmark_stats();

        let period = match (strategy.start_date, strategy.end_date) {
            (Some(start), Some(end)) => format!("{} to {}", start, end),
            _ => String::new(),
        };

        let mut series = vec![(STRATEGY_COLOR, cumulative(&self.equity))];
        if let Some((_, prices)) = &self.benchmark {
            series.push((BENCHMARK_COLOR, cumulative(prices)));
        }
        let drawdown: Vec<(NaiveDate, f64)> = drawdowns(&self.equity);

        TemplateData {
            title: self.title.clone(),
            period,
            benchmark: self.benchmark.as_ref().map(|(name, _)| name.clone()),
            metrics: metric_rows(&strategy, benchmark.as_ref()),
            equity_svg: line_chart(&series, true),
            drawdown_svg: line_chart(&[(DRAWDOWN_COLOR, drawdown)], true),
            months: MONTHS,
            monthly: monthly_rows(&returns(&self.equity)),
        }
    }
}

/// Growth of one unit, minus one.
fn cumulative(curve: &[(NaiveDate, f64)]) -> Vec<(NaiveDate, f64)> {
    match curve.first() {
        Some((_, base)) if *base != 0.0 => curve.iter().map(|(d, v)| (*d, v / base - 1.0)).collect(),
        _ => Vec::new(),
    }
}

fn ratio(value: f64) -> String {
    if value.is_finite() {
        format!("{:.2}", value)
    } else {
        "-".to_string()
    }
}

fn metric_rows(strategy: &PerformanceStats, benchmark: Option<&PerformanceStats>) -> Vec<MetricRow> {
    type Getter = fn(&PerformanceStats) -> String;
    let rows: [(&'static str, Getter); 11] = [
        ("Total Return", |s| format_pct(s.total_return)),
        ("CAGR", |s| format_pct(s.cagr)),
        ("Volatility (ann.)", |s| format_pct(s.volatility)),
        ("Sharpe", |s| ratio(s.sharpe)),
        ("Sortino", |s| ratio(s.sortino)),
        ("Max Drawdown", |s| format_pct(s.max_drawdown)),
        ("Calmar", |s| ratio(s.calmar)),
        ("Best Day", |s| format_pct(s.best_day)),
        ("Worst Day", |s| format_pct(s.worst_day)),
        ("Win Days", |s| format_pct(s.win_days)),
        ("Trading Days", |s| s.periods.to_string()),
    ];

    rows.iter()
        .map(|&(name, get)| MetricRow {
            name,
            strategy: get(strategy),
            benchmark: benchmark.map(get).unwrap_or_default(),
        })
        .collect()
}

fn sign_class(value: f64) -> &'static str {
    if value > 0.0 {
        "pos"
    } else if value < 0.0 {
        "neg"
    } else {
        ""
    }
}

fn monthly_rows(rets: &[(NaiveDate, f64)]) -> Vec<MonthlyRow> {
    let months = monthly_returns(rets);
    let mut years: BTreeMap<i32, [Option<f64>; 12]> = BTreeMap::new();
    for ((year, month), value) in months {
        years.entry(year).or_insert([None; 12])[(month - 1) as usize] = Some(value);
    }

    years
        .into_iter()
        .map(|(year, values)| {
            let total = values.iter().flatten().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0;
            MonthlyRow {
                year,
                cells: values
                    .iter()
                    .map(|v| match v {
                        Some(r) => MonthCell {
                            value: format!("{:.2}", r * 100.0),
                            class: sign_class(*r),
                        },
                        None => MonthCell {
                            value: String::new(),
                            class: "",
                        },
                    })
                    .collect(),
                total: format!("{:.2}", total * 100.0),
                total_class: sign_class(total),
            }
        })
        .collect()
}

/// Inline SVG with one polyline per series, sharing the time axis of the first.
fn line_chart(series: &[(&str, Vec<(NaiveDate, f64)>)], zero_line: bool) -> String {
    let Some((_, primary)) = series.first() else {
        return String::new();
    };
    let (Some(start), Some(end)) = (primary.first().map(|p| p.0), primary.last().map(|p| p.0)) else {
        return String::new();
    };
    let span = ((end - start).num_days().max(1)) as f64;

    let values = series.iter().flat_map(|(_, s)| s.iter().map(|p| p.1));
    let (mut lo, mut hi) = values.fold((0.0f64, 0.0f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if hi - lo < 1e-12 {
        lo -= 0.01;
        hi += 0.01;
    }

    let pad = 8.0;
    let x = |d: NaiveDate| pad + (d - start).num_days() as f64 / span * (SVG_WIDTH - 2.0 * pad);
    let y = |v: f64| pad + (hi - v) / (hi - lo) * (SVG_HEIGHT - 2.0 * pad);

    let mut svg = String::new();
    let _ = write!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = SVG_WIDTH,
        h = SVG_HEIGHT
    );
    if zero_line {
        let _ = write!(
            svg,
            r##"<line x1="{:.1}" y1="{y0:.1}" x2="{:.1}" y2="{y0:.1}" stroke="#d0d7de" stroke-dasharray="4 3"/>"##,
            pad,
            SVG_WIDTH - pad,
            y0 = y(0.0)
        );
    }
    for (color, points) in series {
        let coords: Vec<String> = points
            .iter()
            .filter(|(d, _)| *d >= start && *d <= end)
            .map(|(d, v)| format!("{:.1},{:.1}", x(*d), y(*v)))
            .collect();
        if coords.len() < 2 {
            continue;
        }
        let _ = write!(
            svg,
            r#"<polyline fill="none" stroke="{}" stroke-width="1.5" points="{}"/>"#,
            color,
            coords.join(" ")
        );
    }
    let _ = write!(
        svg,
        r##"<text x="{:.1}" y="14" font-size="11" fill="#57606a">{}</text><text x="{:.1}" y="{:.1}" font-size="11" fill="#57606a">{}</text></svg>"##,
        pad,
        format_pct(hi),
        pad,
        SVG_HEIGHT - 4.0,
        format_pct(lo)
    );
    svg
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn equity() -> Vec<(NaiveDate, f64)> {
        vec![
            (d(2023, 12, 29), 100_000.0),
            (d(2024, 1, 2), 101_000.0),
            (d(2024, 1, 3), 99_990.0),
            (d(2024, 2, 1), 102_000.0),
        ]
    }

    #[test]
    fn test_render_with_benchmark() {
        let prices = vec![
            (d(2023, 12, 29), 470.0),
            (d(2024, 1, 2), 472.0),
            (d(2024, 1, 3), 468.0),
            (d(2024, 2, 1), 480.0),
        ];
        let sheet = TearSheet::new("AAPL EMA_CROSS Strategy", equity()).with_benchmark("AAPL", prices);
        let html = sheet.render().unwrap();

        assert!(html.contains("<title>AAPL EMA_CROSS Strategy</title>"));
        assert!(html.contains("Benchmark (AAPL)"));
        assert!(html.contains("Max Drawdown"));
        assert!(html.contains("<polyline"));
        // 2% total return
        assert!(html.contains("2.00%"));
        assert!(html.contains("<td>2024</td>"));
    }

    #[test]
    fn test_render_without_benchmark() {
        let sheet = TearSheet::new("Solo", equity()).with_benchmark("SPY", vec![]);
        assert!(sheet.benchmark_stats().is_none());
        let html = sheet.render().unwrap();
        assert!(!html.contains("Benchmark ("));
        assert!(html.contains("<svg"));
    }

    #[test]
    fn test_monthly_rows() {
        let rows = monthly_rows(&returns(&equity()));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].year, 2024);
        // Jan: 99990 / 100000 - 1
        assert_eq!(rows[0].cells[0].value, "-0.01");
        assert_eq!(rows[0].cells[0].class, "neg");
        assert_eq!(rows[0].cells[2].value, "");
        assert_eq!(rows[0].total, "2.00");
    }

    #[test]
    fn test_title_is_escaped() {
        let html = TearSheet::new("<b>x</b>", equity()).render().unwrap();
        assert!(html.contains("&lt;b&gt;x&lt;/b&gt;"));
    }
}
