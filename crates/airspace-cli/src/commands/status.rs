//! Status command implementation.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// Health response from the server.
#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    #[serde(default)]
    running: bool,
    components: BTreeMap<String, ComponentStatus>,
}

/// Component status from the server.
#[derive(Debug, Deserialize)]
struct ComponentStatus {
    status: String,
    reason: Option<String>,
}

/// Metrics shown in the summary, in display order.
const SUMMARY: &[(&str, &str)] = &[
    ("airspace_ticks_total", "Poll Cycles"),
    ("airspace_records_published_total", "Records Published"),
    ("airspace_records_dropped_total", "Records Dropped"),
    ("airspace_poll_failures_total", "Poll Failures"),
    ("airspace_messages_consumed_total", "Messages Consumed"),
    ("airspace_messages_malformed_total", "Malformed Messages"),
    ("airspace_rows_written_total", "Rows Written"),
    ("airspace_flushes_total", "Batch Writes"),
    ("airspace_write_failures_total", "Write Failures"),
    ("airspace_backpressure_total", "Backpressure Events"),
    ("airspace_buffer_record_count", "Buffered Records"),
];

/// Show status and health.
pub async fn run(url: &str) -> Result<()> {
    let base = url.trim_end_matches('/');
    println!("Checking health at {}...\n", base);

    let client = reqwest::Client::new();

    match client.get(format!("{}/health", base)).send().await {
        Ok(response) => {
            let status_code = response.status();
            match response.json::<HealthResponse>().await {
                Ok(health) => print_health_status(&health, status_code.as_u16()),
                Err(e) => {
                    println!("Failed to parse health response: {}", e);
                    println!("HTTP Status: {}", status_code);
                }
            }
        }
        Err(e) => {
            println!("Failed to connect to health endpoint: {}", e);
            println!("\nIs an airspace process running?");
            println!("Start one with: airspace produce | airspace consume");
            return Ok(());
        }
    }

    println!("\n--- Metrics ---");
    let text = client
        .get(format!("{}/metrics", base))
        .send()
        .await
        .context("Failed to fetch metrics")?
        .text()
        .await
        .context("Failed to read metrics")?;
    print_metrics(&text);

    Ok(())
}

fn marker(status: &str) -> &'static str {
    match status {
        "healthy" => "[OK]",
        "degraded" => "[WARN]",
        "unhealthy" => "[FAIL]",
        _ => "[?]",
    }
}

fn print_health_status(health: &HealthResponse, status_code: u16) {
    println!(
        "{} Overall Status: {} (HTTP {}){}",
        marker(&health.status),
        health.status.to_uppercase(),
        status_code,
        if health.running { "" } else { " - not running" }
    );
    println!();

    if !health.components.is_empty() {
        println!("Components:");
        for (name, status) in &health.components {
            match &status.reason {
                Some(reason) => println!(
                    "  {} {}: {} ({})",
                    marker(&status.status),
                    name,
                    status.status,
                    reason
                ),
                None => println!("  {} {}: {}", marker(&status.status), name, status.status),
            }
        }
    }
}

/// Sample values keyed by metric name; comments and histogram series skipped.
fn parse_metrics(text: &str) -> HashMap<&str, u64> {
    text.lines()
        .filter(|line| !line.starts_with('#') && !line.contains('{'))
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let name = parts.next()?;
            let value = parts.next()?.parse::<u64>().ok()?;
            Some((name, value))
        })
        .collect()
}

fn print_metrics(metrics_text: &str) {
    let values = parse_metrics(metrics_text);
    if values.is_empty() {
        println!("No metrics available yet.");
        return;
    }

    for (name, label) in SUMMARY {
        if let Some(v) = values.get(name) {
            println!("{:<20} {}", format!("{}:", label), format_number(*v));
        }
    }
}

fn format_number(n: u64) -> String {
    if n >= 1_000_000_000 {
        format!("{:.2}B", n as f64 / 1_000_000_000.0)
    } else if n >= 1_000_000 {
        format!("{:.2}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.2}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metrics_skips_histogram_and_comments() {
        let text = "# HELP airspace_ticks_total Producer poll cycles started\n\
                    # TYPE airspace_ticks_total counter\n\
                    airspace_ticks_total 12\n\n\
                    airspace_flush_duration_seconds_bucket{le=\"0.1\"} 4\n\
                    airspace_flush_duration_seconds_sum 0.25\n";

        let values = parse_metrics(text);
        assert_eq!(values.get("airspace_ticks_total"), Some(&12));
        assert_eq!(values.len(), 1);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(2_000), "2.00K");
        assert_eq!(format_number(3_500_000), "3.50M");
    }

    #[test]
    fn test_health_response_shape() {
        let body = r#"{"status":"degraded","running":true,"components":{
            "kafka":{"status":"healthy"},
            "store":{"status":"degraded","reason":"Bulk upsert failed"}}}"#;
        let health: HealthResponse = serde_json::from_str(body).unwrap();
        assert!(health.running);
        assert_eq!(
            health.components["store"].reason.as_deref(),
            Some("Bulk upsert failed")
        );
    }
}
