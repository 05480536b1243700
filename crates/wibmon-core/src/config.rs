//! Poller configuration.
//!
//! Loaded from a JSON file; every field is optional and falls back to the
//! built-in NP04 fleet setup.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dashboard::DASHBOARD_TEMPLATE;
use crate::document::{DEFAULT_TITLE_PREFIX, EMPTY_TEMPLATE};
use crate::error::{MonitorError, Result};
use crate::metrics::{MetricSpec, default_metric_specs};
use crate::names::{Device, canonical_name, resolve};
use crate::query::{DEFAULT_TOOL, Scripts};

/// Default seconds between cycles.
pub const DEFAULT_INTERVAL_SECS: u64 = 120;

/// Default per-device query deadline.
pub const DEFAULT_QUERY_TIMEOUT_SECS: f64 = 30.0;

/// Template file names looked up in `template_dir`.
pub const EMPTY_TEMPLATE_FILE: &str = "empty.html";
pub const DASHBOARD_TEMPLATE_FILE: &str = "dashboard.html";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Board addresses: canonical names or bench subnet IPs.
    pub devices: Vec<String>,
    pub interval_secs: u64,
    /// Control tool executable.
    pub tool: String,
    /// Extra arguments placed before `-w ADDRESS -X SCRIPT`.
    pub tool_args: Vec<String>,
    pub scripts: Scripts,
    /// Working directory of the tool; the status report is written here.
    pub work_dir: PathBuf,
    pub query_timeout_secs: f64,
    /// Where pages, records and the dashboard are written.
    pub output_dir: PathBuf,
    pub title_prefix: String,
    /// Directory with `empty.html` and/or `dashboard.html` overrides.
    pub template_dir: Option<PathBuf>,
    pub metrics: Vec<MetricSpec>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            devices: default_fleet(),
            interval_secs: DEFAULT_INTERVAL_SECS,
            tool: DEFAULT_TOOL.to_string(),
            tool_args: Vec::new(),
            scripts: Scripts::default(),
            work_dir: std::env::temp_dir().join("wibmon"),
            query_timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
            output_dir: PathBuf::from("www"),
            title_prefix: DEFAULT_TITLE_PREFIX.to_string(),
            template_dir: None,
            metrics: default_metric_specs(),
        }
    }
}

/// The standard fleet: two bench boards plus five slots in each of the
/// seven detector zones.
pub fn default_fleet() -> Vec<String> {
    let mut devices = vec!["192.168.200.2".to_string(), "192.168.200.5".to_string()];
    for block in 0..7 {
        for unit in 1..=5 {
            devices.push(canonical_name(block * 100 + unit));
        }
    }
    devices
}

/// Page templates in effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Templates {
    pub empty: String,
    pub dashboard: String,
}

impl Default for Templates {
    fn default() -> Self {
        Self {
            empty: EMPTY_TEMPLATE.to_string(),
            dashboard: DASHBOARD_TEMPLATE.to_string(),
        }
    }
}

impl MonitorConfig {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// `load` when a path is given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.devices.is_empty() {
            return Err(MonitorError::Config("device list is empty".into()));
        }
        if self.interval_secs == 0 {
            return Err(MonitorError::Config("interval_secs must be greater than zero".into()));
        }
        if !(self.query_timeout_secs > 0.0 && Duration::try_from_secs_f64(self.query_timeout_secs).is_ok()) {
            return Err(MonitorError::Config(format!(
                "query_timeout_secs must be a positive number of seconds, got {}",
                self.query_timeout_secs
            )));
        }
        if self.tool.trim().is_empty() {
            return Err(MonitorError::Config("tool must not be empty".into()));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Per-device tool timeout. Falls back to the default for values
    /// [`validate`](Self::validate) would reject.
    pub fn query_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.query_timeout_secs)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or(Duration::from_secs_f64(DEFAULT_QUERY_TIMEOUT_SECS))
    }

    /// Resolve every configured address, in config order. A board listed
    /// twice (possibly under two spellings) is kept once.
    pub fn resolved_devices(&self) -> Vec<Device> {
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(self.devices.len());
        for raw in &self.devices {
            let device = resolve(raw);
            if !seen.insert(device.name.clone()) {
                log::warn!("device {raw} resolves to {} which is already configured; skipping", device.name);
                continue;
            }
            if device.zone.is_none() {
                log::warn!("device {} is outside every zone block", device.name);
            }
            out.push(device);
        }
        out
    }

    /// Templates from `template_dir`, falling back to the built-ins per file.
    pub fn templates(&self) -> Result<Templates> {
        let mut templates = Templates::default();
        let Some(dir) = &self.template_dir else {
            return Ok(templates);
        };
        if let Some(text) = read_optional(&dir.join(EMPTY_TEMPLATE_FILE))? {
            templates.empty = text;
        }
        if let Some(text) = read_optional(&dir.join(DASHBOARD_TEMPLATE_FILE))? {
            templates.dashboard = text;
        }
        Ok(templates)
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Selector;
    use crate::names::Zone;

    // -----------------------------------------------------------------------
    // Defaults
    // -----------------------------------------------------------------------

    #[test]
    fn default_fleet_matches_detector_layout() {
        let fleet = default_fleet();
        assert_eq!(fleet.len(), 37);
        assert_eq!(fleet[0], "192.168.200.2");
        assert_eq!(fleet[1], "192.168.200.5");
        assert_eq!(fleet[2], "np04-wib-001");
        assert_eq!(fleet[36], "np04-wib-605");
    }

    #[test]
    fn default_config_is_valid() {
        let config = MonitorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.interval(), Duration::from_secs(120));
        let devices = config.resolved_devices();
        assert_eq!(devices.len(), 37);
        assert_eq!(devices[0].name, "np04-wib-902");
        assert!(devices.iter().all(|d| d.zone.is_some()));
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    #[test]
    fn empty_fleet_is_rejected() {
        let config = MonitorConfig {
            devices: Vec::new(),
            ..MonitorConfig::default()
        };
        assert!(matches!(config.validate(), Err(MonitorError::Config(_))));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = MonitorConfig {
            interval_secs: 0,
            ..MonitorConfig::default()
        };
        assert!(matches!(config.validate(), Err(MonitorError::Config(_))));
    }

    #[test]
    fn bad_timeout_is_rejected() {
        for secs in [0.0, -1.0, f64::NAN, f64::INFINITY, 1e300] {
            let config = MonitorConfig {
                query_timeout_secs: secs,
                ..MonitorConfig::default()
            };
            assert!(config.validate().is_err(), "{secs}");
            assert_eq!(config.query_timeout(), Duration::from_secs(30), "{secs}");
        }
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    #[test]
    fn duplicate_spellings_are_dropped() {
        let config = MonitorConfig {
            devices: vec!["192.168.200.2".into(), "np04-wib-902".into(), "np04-wib-101".into()],
            ..MonitorConfig::default()
        };
        let names: Vec<String> = config.resolved_devices().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["np04-wib-902", "np04-wib-101"]);
    }

    #[test]
    fn resolved_devices_keep_zone() {
        let config = MonitorConfig {
            devices: vec!["np04-wib-605".into(), "np04-wib-801".into()],
            ..MonitorConfig::default()
        };
        let devices = config.resolved_devices();
        assert_eq!(devices[0].zone, Some(Zone::Msdas));
        assert_eq!(devices[1].zone, None);
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    #[test]
    fn load_partial_file_fills_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("wibmon.json");
        fs::write(
            &path,
            r#"{
                "devices": ["np04-wib-101"],
                "interval_secs": 30,
                "metrics": [{"table": "SYSTEM", "register": "FPGA_TEMP", "selector": 0, "group": "system"}]
            }"#,
        )
        .unwrap();
        let config = MonitorConfig::load(&path).unwrap();
        assert_eq!(config.devices, vec!["np04-wib-101"]);
        assert_eq!(config.interval_secs, 30);
        assert_eq!(config.tool, DEFAULT_TOOL);
        assert_eq!(config.metrics.len(), 1);
        assert_eq!(config.metrics[0].selector, Selector::Column(0));
    }

    #[test]
    fn load_rejects_invalid_config() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("wibmon.json");
        fs::write(&path, r#"{"devices": []}"#).unwrap();
        assert!(matches!(MonitorConfig::load(&path), Err(MonitorError::Config(_))));
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(MonitorConfig::load(&path), Err(MonitorError::Json(_))));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = MonitorConfig::load(Path::new("/nonexistent/wibmon.json")).unwrap_err();
        assert!(matches!(err, MonitorError::Io(_)));
    }

    #[test]
    fn config_json_round_trip() {
        let config = MonitorConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: MonitorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    // -----------------------------------------------------------------------
    // Templates
    // -----------------------------------------------------------------------

    #[test]
    fn templates_fall_back_per_file() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(EMPTY_TEMPLATE_FILE), "<body><h1>{title}</h1></body>").unwrap();
        let config = MonitorConfig {
            template_dir: Some(tmp.path().to_path_buf()),
            ..MonitorConfig::default()
        };
        let templates = config.templates().unwrap();
        assert_eq!(templates.empty, "<body><h1>{title}</h1></body>");
        assert_eq!(templates.dashboard, DASHBOARD_TEMPLATE);
        assert_eq!(MonitorConfig::default().templates().unwrap(), Templates::default());
    }
}
