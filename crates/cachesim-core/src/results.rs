//! Run reports and their text rendering.

use crate::collectors::{MetricValue, Results};
use crate::popularity::ProviderPopularity;
use serde::{Deserialize, Serialize};

/// Everything a finished run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub name: String,
    pub strategy: String,
    /// Whether the events came from a snapshot rather than a live workload.
    pub replayed: bool,
    pub events_processed: u64,
    pub provider_popularity: ProviderPopularity,
    /// Collector reports keyed by collector name.
    pub results: Results,
}

impl RunReport {
    /// Look up one metric by collector and metric name.
    pub fn metric(&self, collector: &str, metric: &str) -> Option<&MetricValue> {
        self.results.get(collector)?.get(metric)
    }

    /// Scalar shortcut for [`RunReport::metric`].
    pub fn value(&self, collector: &str, metric: &str) -> Option<f64> {
        self.metric(collector, metric)?.as_f64()
    }
}

fn format_metric(value: &MetricValue) -> String {
    match value {
        MetricValue::Count(n) => n.to_string(),
        MetricValue::Value(v) => format!("{:.4}", v),
        MetricValue::Map(m) => format!("{} entries", m.len()),
    }
}

/// Format a report as a pretty-printed table string.
pub fn format_table(report: &RunReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "\n{:=<70}\n",
        format!("  {} ({}) Results  ", report.name, report.strategy)
    ));
    out.push_str(&format!(
        "  Events: {} | Source: {}\n",
        report.events_processed,
        if report.replayed { "replay" } else { "fresh" }
    ));
    out.push_str(&format!("{:-<70}\n", "  Provider popularity  "));
    for share in report.provider_popularity.iter() {
        out.push_str(&format!(
            "  node {:<8} {:>10.4}\n",
            share.provider, share.probability
        ));
    }
    for (collector, metrics) in &report.results {
        out.push_str(&format!("{:-<70}\n", format!("  {}  ", collector)));
        for (metric, value) in metrics {
            out.push_str(&format!("  {:<24} {:>16}\n", metric, format_metric(value)));
            if let MetricValue::Map(entries) = value {
                for (key, v) in entries {
                    out.push_str(&format!("    {:<22} {:>16.4}\n", key, v));
                }
            }
        }
    }
    out.push_str(&format!("{:=<70}\n", ""));
    out
}

/// Format a comparison table of multiple runs, one row per run and one
/// column per scalar `mean` metric.
pub fn format_comparison_table(reports: &[RunReport]) -> String {
    if reports.is_empty() {
        return String::from("No results to compare.\n");
    }

    let mut collectors: Vec<&str> = reports
        .iter()
        .flat_map(|r| r.results.keys().map(String::as_str))
        .collect();
    collectors.sort_unstable();
    collectors.dedup();

    let width = 32 + 8 + 14 * collectors.len();
    let mut out = String::new();
    out.push_str(&format!("\n{:=<width$}\n", "  Run Comparison  "));
    out.push_str(&format!("{:<32} {:>8}", "Run", "Events"));
    for collector in &collectors {
        out.push_str(&format!(" {:>13}", truncate(collector, 13)));
    }
    out.push('\n');
    out.push_str(&format!("{:-<width$}\n", ""));

    for report in reports {
        let label = format!("{} ({})", report.name, report.strategy);
        out.push_str(&format!(
            "{:<32} {:>8}",
            truncate(&label, 32),
            report.events_processed
        ));
        for collector in &collectors {
            match report.value(collector, "mean") {
                Some(v) => out.push_str(&format!(" {:>13.4}", v)),
                None => out.push_str(&format!(" {:>13}", "-")),
            }
        }
        out.push('\n');
    }
    out.push_str(&format!("{:=<width$}\n", ""));
    out
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
