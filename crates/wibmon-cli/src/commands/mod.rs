pub mod once;
pub mod resolve;
pub mod run;
pub mod scrape;
pub mod serve;

use std::path::{Path, PathBuf};

use wibmon_core::{ButoolQuery, DirStore, Monitor, MonitorConfig};

/// Command-line values that take precedence over the config file.
#[derive(Default)]
pub struct Overrides {
    pub interval: Option<u64>,
    pub output: Option<String>,
    pub tool: Option<String>,
}

/// Load the config file (or defaults), apply overrides and validate.
/// Exits on error.
pub fn load_config(path: Option<&str>, overrides: &Overrides) -> MonitorConfig {
    let mut config = match MonitorConfig::load_or_default(path.map(Path::new)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {e}");
            std::process::exit(1);
        }
    };
    if let Some(interval) = overrides.interval {
        config.interval_secs = interval;
    }
    if let Some(output) = &overrides.output {
        config.output_dir = PathBuf::from(output);
    }
    if let Some(tool) = &overrides.tool {
        config.tool = tool.clone();
    }
    if let Err(e) = config.validate() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
    log::debug!(
        "{} devices, interval {}s, output {}",
        config.devices.len(),
        config.interval_secs,
        config.output_dir.display()
    );
    config
}

/// Build a poller that talks to the real control tool and writes to the
/// output directory. Exits on error.
pub fn make_monitor(config: &MonitorConfig) -> Monitor<ButoolQuery, DirStore> {
    if let Err(e) = std::fs::create_dir_all(&config.work_dir) {
        eprintln!("Error creating tool directory {}: {e}", config.work_dir.display());
        std::process::exit(1);
    }
    let query = ButoolQuery::new(&config.tool, &config.work_dir, config.query_timeout())
        .with_args(config.tool_args.clone());
    let store = DirStore::new(&config.output_dir);
    match Monitor::new(config, query, store) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
