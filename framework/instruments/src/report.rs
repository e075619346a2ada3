mod tables;

use crate::aggregate::RunMetrics;
use crate::report::tables::{CheckRow, RequestRow};
use tabled::settings::Style;
use tabled::Table;

pub use tables::ThresholdRow;

/// Print the end of run summary: requests grouped by name, checks, and threshold results.
pub fn print_summary(scenario_name: &str, metrics: &RunMetrics, thresholds: &[ThresholdRow]) {
    println!(
        "\nSummary of [{}] after {:.1}s",
        scenario_name,
        metrics.run_duration.as_secs_f64()
    );

    print_requests(metrics);
    print_checks(metrics);

    if !thresholds.is_empty() {
        println!("\nThresholds");
        let mut table = Table::new(thresholds);
        table.with(Style::modern());
        println!("{table}");
    }
}

fn print_requests(metrics: &RunMetrics) {
    if metrics.requests_by_name.is_empty() {
        println!("\nNo requests were made");
        return;
    }

    println!("\nRequests");
    let rows = metrics
        .requests_by_name
        .iter()
        .map(|(name, stats)| RequestRow {
            name: name.clone(),
            requests: stats.duration.count(),
            failed: stats.failed,
            avg_ms: stats.duration.avg().unwrap_or_default(),
            min_ms: stats.duration.min().unwrap_or_default(),
            med_ms: stats.duration.med().unwrap_or_default(),
            p95_ms: stats.duration.percentile(95.0).unwrap_or_default(),
            max_ms: stats.duration.max().unwrap_or_default(),
        })
        .collect::<Vec<_>>();

    let mut table = Table::new(rows);
    table.with(Style::modern());
    println!("{table}");
}

fn print_checks(metrics: &RunMetrics) {
    if metrics.checks_by_name.is_empty() {
        return;
    }

    println!("\nChecks");
    let rows = metrics
        .checks_by_name
        .iter()
        .map(|(name, rate)| CheckRow {
            check: name.clone(),
            passed: rate.matched,
            failed: rate.unmatched(),
            rate: rate.rate().unwrap_or_default(),
        })
        .collect::<Vec<_>>();

    let mut table = Table::new(rows);
    table.with(Style::modern());
    println!("{table}");
}
