use std::collections::BTreeSet;

use wibmon_core::metrics::interesting_tables;
use wibmon_core::{MonitorConfig, reduce_all, scrape};

pub fn run(config: &MonitorConfig, file: &str, tables: Option<&str>, metrics: bool) {
    let text = match std::fs::read_to_string(file) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error reading {file}: {e}");
            std::process::exit(1);
        }
    };

    let wanted: BTreeSet<String> = match tables {
        Some(list) => list
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => interesting_tables(&config.metrics),
    };
    let report = scrape(&text, &wanted);

    if metrics {
        let values = reduce_all(&report, &config.metrics);
        let width = config.metrics.iter().map(|m| m.label().len()).max().unwrap_or(0);
        for (spec, value) in config.metrics.iter().zip(&values) {
            println!("{:<8} {:<width$}  {value}", spec.group, spec.label());
        }
        return;
    }

    match serde_json::to_string_pretty(&report) {
        Ok(s) => println!("{s}"),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
