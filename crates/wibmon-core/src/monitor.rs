//! Poll cycle scheduling.
//!
//! One sequential worker polls every board in turn, then rebuilds the
//! dashboard. Per-board failures are contained: tool errors and timeouts
//! count as absent, unexpected output leaves the board's page alone. Store
//! failures abandon the cycle, and [`Monitor::run_forever`] logs them and
//! carries on with the next one.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{NaiveDateTime, Timelike};
use log::{debug, error, info, warn};

use crate::config::{MonitorConfig, Templates};
use crate::dashboard::{self, DashboardView};
use crate::document::DeviceRecord;
use crate::error::{MonitorError, Result};
use crate::metrics::{self, MetricSpec};
use crate::names::Device;
use crate::overlay::{OverlayKind, Status, TIMESTAMP_FORMAT};
use crate::query::{self, DeviceQuery, PollOutcome, Scripts};
use crate::scrape::scrape;
use crate::store::{DASHBOARD_KEY, DocumentStore, SNAPSHOT_KEY, page_key, record_key};

/// Longest uninterrupted sleep between stop-flag checks.
const SLEEP_SLICE: Duration = Duration::from_millis(250);

/// Source of "now" for markers and freshness lines.
pub type Clock = Box<dyn FnMut() -> NaiveDateTime + Send>;

/// Local wall-clock time, second precision.
pub fn local_now() -> NaiveDateTime {
    let now = chrono::Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

/// Per-status device counts after a cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub good: usize,
    pub busy: usize,
    pub absent: usize,
    /// Boards whose output could not be understood this cycle.
    pub skipped: usize,
}

impl CycleSummary {
    fn count(&mut self, status: Status) {
        match status {
            Status::Good => self.good += 1,
            Status::Busy => self.busy += 1,
            Status::Absent => self.absent += 1,
        }
    }
}

/// What one device poll did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceUpdate {
    /// Page rewritten; the board now has this classification.
    Updated(Status),
    /// Output was not understood; page and record left as they were.
    Unchanged,
}

pub struct Monitor<Q: DeviceQuery, S: DocumentStore> {
    query: Q,
    store: S,
    devices: Vec<Device>,
    scripts: Scripts,
    specs: Vec<MetricSpec>,
    wanted: BTreeSet<String>,
    title_prefix: String,
    templates: Templates,
    interval: Duration,
    records: HashMap<String, DeviceRecord>,
    clock: Clock,
}

impl<Q: DeviceQuery, S: DocumentStore> Monitor<Q, S> {
    /// Set up a poller, restoring device records from the store.
    pub fn new(config: &MonitorConfig, query: Q, store: S) -> Result<Self> {
        config.validate()?;
        let devices = config.resolved_devices();
        let templates = config.templates()?;
        let records = devices
            .iter()
            .map(|d| (d.name.clone(), load_record(&store, &d.name)))
            .collect();
        Ok(Self {
            query,
            store,
            devices,
            scripts: config.scripts.clone(),
            wanted: metrics::interesting_tables(&config.metrics),
            specs: config.metrics.clone(),
            title_prefix: config.title_prefix.clone(),
            templates,
            interval: config.interval(),
            records,
            clock: Box::new(local_now),
        })
    }

    /// Replace the wall clock.
    pub fn with_clock(mut self, clock: impl FnMut() -> NaiveDateTime + Send + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn record(&self, name: &str) -> Option<&DeviceRecord> {
        self.records.get(name)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Poll one board and rewrite its page and record.
    pub fn poll_device(&mut self, device: &Device) -> Result<DeviceUpdate> {
        let name = device.name.as_str();
        let outcome = match query::poll(&self.query, name, &device.address, &self.scripts) {
            Ok(outcome) => outcome,
            Err(e) if e.is_device_fault() => {
                warn!("{name}: {e}; treating as absent");
                PollOutcome::Absent
            }
            Err(e @ MonitorError::UnexpectedFormat { .. }) => {
                error!("{name}: {e}");
                return Ok(DeviceUpdate::Unchanged);
            }
            Err(e) => return Err(e),
        };

        let now = (self.clock)();
        let record = self
            .records
            .entry(name.to_string())
            .or_insert_with(|| DeviceRecord::new(name));
        match outcome {
            PollOutcome::Success(report) => {
                let scraped = scrape(&report, &self.wanted);
                debug!("{name}: scraped {} tables", scraped.tables.len());
                record.apply_success(report, scraped, now);
                info!("{name}: status updated");
            }
            PollOutcome::Busy => {
                record.apply_overlay(OverlayKind::Busy, now);
                warn!("{name}: busy at {}", now.format(TIMESTAMP_FORMAT));
            }
            PollOutcome::Absent => {
                record.apply_overlay(OverlayKind::Absent, now);
                warn!("{name}: not found at {}", now.format(TIMESTAMP_FORMAT));
            }
        }

        let page = record.render(&self.title_prefix, &self.templates.empty);
        self.store.write(&page_key(name), &page)?;
        self.store
            .write(&record_key(name), &serde_json::to_string_pretty(record)?)?;
        Ok(DeviceUpdate::Updated(record.status()))
    }

    /// Current dashboard view of the fleet.
    pub fn view(&self) -> DashboardView {
        dashboard::build(&self.devices, &self.records, &self.specs)
    }

    /// Poll every board, then write the dashboard and fleet snapshot.
    pub fn run_cycle(&mut self) -> Result<CycleSummary> {
        let started = Instant::now();
        let mut summary = CycleSummary::default();
        for i in 0..self.devices.len() {
            let device = self.devices[i].clone();
            match self.poll_device(&device)? {
                DeviceUpdate::Updated(status) => summary.count(status),
                DeviceUpdate::Unchanged => summary.skipped += 1,
            }
        }

        let now = (self.clock)();
        let view = self.view();
        self.store
            .write(DASHBOARD_KEY, &view.render(&self.templates.dashboard, now))?;
        self.store
            .write(SNAPSHOT_KEY, &serde_json::to_string_pretty(&view.snapshot(now))?)?;

        info!(
            "cycle done in {:.1}s: {} good, {} busy, {} absent, {} skipped",
            started.elapsed().as_secs_f64(),
            summary.good,
            summary.busy,
            summary.absent,
            summary.skipped
        );
        Ok(summary)
    }

    /// Run cycles until `stop` is set, sleeping the configured interval
    /// between them. Errors are logged and never end the loop.
    pub fn run_forever(&mut self, stop: &AtomicBool) {
        info!(
            "polling {} devices every {}s",
            self.devices.len(),
            self.interval.as_secs()
        );
        while !stop.load(Ordering::Relaxed) {
            if let Err(e) = self.run_cycle() {
                error!("cycle abandoned at {}: {e}", local_now().format(TIMESTAMP_FORMAT));
            }
            sleep_unless_stopped(self.interval, stop);
        }
        info!("stopped");
    }
}

/// Restore a record from the store; anything unreadable starts fresh.
fn load_record<S: DocumentStore>(store: &S, name: &str) -> DeviceRecord {
    let text = match store.read(&record_key(name)) {
        Ok(Some(text)) => text,
        Ok(None) => return DeviceRecord::new(name),
        Err(e) => {
            warn!("{name}: cannot read saved record: {e}");
            return DeviceRecord::new(name);
        }
    };
    match serde_json::from_str::<DeviceRecord>(&text) {
        Ok(record) if record.name == name => record,
        Ok(record) => {
            warn!("{name}: saved record belongs to {}; ignoring it", record.name);
            DeviceRecord::new(name)
        }
        Err(e) => {
            warn!("{name}: saved record is corrupt: {e}");
            DeviceRecord::new(name)
        }
    }
}

/// Sleep for `total`, returning early once `stop` is set.
fn sleep_unless_stopped(total: Duration, stop: &AtomicBool) {
    let deadline = Instant::now() + total;
    while !stop.load(Ordering::Relaxed) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        thread::sleep(remaining.min(SLEEP_SLICE));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ToolOutput;
    use crate::store::MemoryStore;
    use chrono::NaiveDate;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    // -----------------------------------------------------------------------
    // Mock query
    // -----------------------------------------------------------------------

    #[derive(Clone, Copy)]
    enum Reply {
        Good,
        Busy,
        Absent,
        Garbage,
        Fail,
    }

    /// Answers by address; unknown addresses fail like a dead tool.
    #[derive(Default)]
    struct MockQuery {
        replies: Mutex<HashMap<String, Reply>>,
    }

    impl MockQuery {
        fn set(&self, address: &str, reply: Reply) {
            self.replies.lock().unwrap().insert(address.to_string(), reply);
        }
    }

    const REPORT: &str = "<html>\n<body>\n<table name=\"SYSTEM\"><tr><td>FIRMWARE_VERSION</td><td>0x42</td></tr></table>\n</body>\n</html>\n";

    impl DeviceQuery for MockQuery {
        fn run_script(&self, address: &str, script: &Path) -> Result<ToolOutput> {
            let reply = self.replies.lock().unwrap().get(address).copied().unwrap_or(Reply::Fail);
            let is_dnd = script == Scripts::default().dnd;
            let (stdout, report) = match (reply, is_dnd) {
                (Reply::Fail, _) => {
                    return Err(MonitorError::Tool {
                        command: "mock".into(),
                        output: "exit status 1".into(),
                    });
                }
                (Reply::Garbage, _) => ("???".to_string(), None),
                (Reply::Absent, _) => ("0xdead 0xbeef".to_string(), None),
                (Reply::Busy, true) => ("SYSTEM.SLOW_CONTROL_DND: 0x1\n".to_string(), None),
                (_, true) => ("SYSTEM.SLOW_CONTROL_DND: 0x0\n".to_string(), None),
                (_, false) => ("ok".to_string(), Some(REPORT.to_string())),
            };
            Ok(ToolOutput {
                command: "mock".into(),
                stdout,
                report,
            })
        }
    }

    fn config(devices: &[&str]) -> MonitorConfig {
        MonitorConfig {
            devices: devices.iter().map(|s| s.to_string()).collect(),
            interval_secs: 1,
            ..MonitorConfig::default()
        }
    }

    fn ticking_clock() -> impl FnMut() -> NaiveDateTime + Send + 'static {
        let mut minute = 0;
        move || {
            minute += 1;
            NaiveDate::from_ymd_opt(2026, 3, 14)
                .unwrap()
                .and_hms_opt(12, minute % 60, 0)
                .unwrap()
        }
    }

    fn monitor(devices: &[&str], query: MockQuery) -> Monitor<MockQuery, Arc<MemoryStore>> {
        Monitor::new(&config(devices), query, Arc::new(MemoryStore::new()))
            .unwrap()
            .with_clock(ticking_clock())
    }

    // -----------------------------------------------------------------------
    // poll_device
    // -----------------------------------------------------------------------

    #[test]
    fn good_poll_writes_page_and_record() {
        let q = MockQuery::default();
        q.set("np04-wib-101", Reply::Good);
        let mut m = monitor(&["np04-wib-101"], q);
        let device = m.devices()[0].clone();
        assert_eq!(m.poll_device(&device).unwrap(), DeviceUpdate::Updated(Status::Good));
        let page = m.store().read("wibs/np04-wib-101.html").unwrap().unwrap();
        assert!(page.contains("<h1>WIB Status Page for np04-wib-101</h1>"));
        assert!(m.store().read("wibs/np04-wib-101.json").unwrap().is_some());
        let record = m.record("np04-wib-101").unwrap();
        assert_eq!(record.scraped.row("SYSTEM", "FIRMWARE_VERSION").unwrap(), &["0x42"]);
    }

    #[test]
    fn tool_failure_counts_as_absent() {
        let mut m = monitor(&["np04-wib-101"], MockQuery::default());
        let device = m.devices()[0].clone();
        assert_eq!(m.poll_device(&device).unwrap(), DeviceUpdate::Updated(Status::Absent));
        let page = m.store().read("wibs/np04-wib-101.html").unwrap().unwrap();
        assert!(page.contains("<div id=nowiberr>"));
    }

    #[test]
    fn unexpected_output_leaves_page_untouched() {
        let q = MockQuery::default();
        q.set("np04-wib-101", Reply::Good);
        let mut m = monitor(&["np04-wib-101"], q);
        let device = m.devices()[0].clone();
        m.poll_device(&device).unwrap();
        let before = m.store().read("wibs/np04-wib-101.html").unwrap();

        m.query.set("np04-wib-101", Reply::Garbage);
        assert_eq!(m.poll_device(&device).unwrap(), DeviceUpdate::Unchanged);
        assert_eq!(m.store().read("wibs/np04-wib-101.html").unwrap(), before);
    }

    #[test]
    fn tool_gets_raw_address() {
        let q = MockQuery::default();
        q.set("192.168.200.2", Reply::Busy);
        let mut m = monitor(&["192.168.200.2"], q);
        let device = m.devices()[0].clone();
        assert_eq!(device.name, "np04-wib-902");
        assert_eq!(m.poll_device(&device).unwrap(), DeviceUpdate::Updated(Status::Busy));
        assert!(m.store().read("wibs/np04-wib-902.html").unwrap().is_some());
    }

    // -----------------------------------------------------------------------
    // run_cycle
    // -----------------------------------------------------------------------

    #[test]
    fn cycle_counts_and_writes_dashboard() {
        let q = MockQuery::default();
        q.set("np04-wib-001", Reply::Good);
        q.set("np04-wib-002", Reply::Busy);
        q.set("np04-wib-003", Reply::Absent);
        q.set("np04-wib-004", Reply::Garbage);
        let mut m = monitor(&["np04-wib-001", "np04-wib-002", "np04-wib-003", "np04-wib-004"], q);
        let summary = m.run_cycle().unwrap();
        assert_eq!(
            summary,
            CycleSummary {
                good: 1,
                busy: 1,
                absent: 1,
                skipped: 1
            }
        );
        let index = m.store().read(DASHBOARD_KEY).unwrap().unwrap();
        assert!(index.contains(r#"class="busy">np04-wib-002<"#));
        // Never answered, so the dashboard shows it absent.
        assert!(index.contains(r#"class="absent">np04-wib-004<"#));
        let snapshot: serde_json::Value =
            serde_json::from_str(&m.store().read(SNAPSHOT_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(snapshot["devices"][0]["name"], "np04-wib-004");
    }

    // -----------------------------------------------------------------------
    // Record restore
    // -----------------------------------------------------------------------

    #[test]
    fn records_are_restored_from_store() {
        let store = Arc::new(MemoryStore::new());
        let q = MockQuery::default();
        q.set("np04-wib-101", Reply::Busy);
        let mut first = Monitor::new(&config(&["np04-wib-101"]), q, store.clone())
            .unwrap()
            .with_clock(ticking_clock());
        first.run_cycle().unwrap();

        let second = Monitor::new(&config(&["np04-wib-101"]), MockQuery::default(), store).unwrap();
        assert_eq!(second.record("np04-wib-101").unwrap().status(), Status::Busy);
    }

    #[test]
    fn corrupt_record_starts_fresh() {
        let store = MemoryStore::new();
        store.write("wibs/np04-wib-101.json", "{broken").unwrap();
        store
            .write("wibs/np04-wib-102.json", r#"{"name":"np04-wib-999"}"#)
            .unwrap();
        assert_eq!(load_record(&store, "np04-wib-101"), DeviceRecord::new("np04-wib-101"));
        assert_eq!(load_record(&store, "np04-wib-102"), DeviceRecord::new("np04-wib-102"));
    }

    // -----------------------------------------------------------------------
    // run_forever
    // -----------------------------------------------------------------------

    #[test]
    fn run_forever_exits_when_stopped() {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let mut clock = ticking_clock();
        let q = MockQuery::default();
        q.set("np04-wib-101", Reply::Good);
        let mut m = monitor(&["np04-wib-101"], q).with_clock(move || {
            flag.store(true, Ordering::Relaxed);
            clock()
        });
        let start = Instant::now();
        m.run_forever(&stop);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(m.store().read(DASHBOARD_KEY).unwrap().is_some());
    }

    /// Fails the first write, then behaves. Raises `stop` once a fleet
    /// snapshot has been written.
    struct FlakyStore {
        inner: MemoryStore,
        failed_once: AtomicBool,
        stop: Arc<AtomicBool>,
    }

    impl DocumentStore for FlakyStore {
        fn read(&self, key: &str) -> Result<Option<String>> {
            self.inner.read(key)
        }

        fn write(&self, key: &str, text: &str) -> Result<()> {
            if !self.failed_once.swap(true, Ordering::Relaxed) {
                return Err(std::io::Error::other("disk full").into());
            }
            self.inner.write(key, text)?;
            if key == SNAPSHOT_KEY {
                self.stop.store(true, Ordering::Relaxed);
            }
            Ok(())
        }
    }

    #[test]
    fn abandoned_cycle_is_followed_by_the_next() {
        let stop = Arc::new(AtomicBool::new(false));
        let store = FlakyStore {
            inner: MemoryStore::new(),
            failed_once: AtomicBool::new(false),
            stop: stop.clone(),
        };
        let q = MockQuery::default();
        q.set("np04-wib-101", Reply::Good);
        let mut m = Monitor::new(&config(&["np04-wib-101"]), q, store)
            .unwrap()
            .with_clock(ticking_clock());

        // The first cycle dies on its first page write; the loop logs it,
        // sleeps and polls again.
        m.run_forever(&stop);
        assert!(m.store().failed_once.load(Ordering::Relaxed));
        let index = m.store().read(DASHBOARD_KEY).unwrap().unwrap();
        assert!(index.contains("np04-wib-101"));
        assert!(m.store().read("wibs/np04-wib-101.html").unwrap().is_some());
    }

    #[test]
    fn stopped_before_start_runs_nothing() {
        let stop = AtomicBool::new(true);
        let mut m = monitor(&["np04-wib-101"], MockQuery::default());
        m.run_forever(&stop);
        assert!(m.store().keys().is_empty());
    }

    #[test]
    fn sleep_returns_early_on_stop() {
        let stop = AtomicBool::new(true);
        let start = Instant::now();
        sleep_unless_stopped(Duration::from_secs(10), &stop);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
