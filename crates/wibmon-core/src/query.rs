//! Device queries through the external control tool.
//!
//! A poll runs two scripts against a board. The do-not-disturb check runs
//! first; only a present, idle board is asked for its full status report,
//! which the tool writes to a file in its working directory.

use std::fs;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};

/// Both of these in the tool output mean the board did not answer.
pub const ABSENT_SENTINELS: [&str; 2] = ["0xdead", "0xbeef"];

/// File the status script writes its report to.
pub const DEFAULT_REPORT_FILE: &str = "status.html";

/// Default control tool executable.
pub const DEFAULT_TOOL: &str = "BUTool.exe";

/// How often a running tool is checked for completion.
const POLL_SLICE: Duration = Duration::from_millis(20);

/// Captured result of one tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Command line, for error messages.
    pub command: String,
    pub stdout: String,
    /// Report file contents, when the script produced one.
    pub report: Option<String>,
}

/// Runs a query script against one board.
///
/// Implementations block until the tool finishes or give up with
/// [`MonitorError::Timeout`]. A tool that ran but failed is
/// [`MonitorError::Tool`].
pub trait DeviceQuery: Send + Sync {
    fn run_script(&self, address: &str, script: &Path) -> Result<ToolOutput>;
}

/// Classified result of a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Fresh status report text.
    Success(String),
    Busy,
    Absent,
}

/// Result of the do-not-disturb check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DndState {
    Clear,
    Busy,
    Absent,
}

/// Paths of the two query scripts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scripts {
    pub dnd: PathBuf,
    pub status: PathBuf,
}

impl Default for Scripts {
    fn default() -> Self {
        Self {
            dnd: PathBuf::from("checkDND.butool"),
            status: PathBuf::from("status.butool"),
        }
    }
}

fn dnd_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"SYSTEM\.SLOW_CONTROL_DND:\s*([0-9a-zA-Z]+)\s*?\n").expect("static regex")
    })
}

/// True when the output carries the board-absent sentinels.
pub fn is_absent(output: &str) -> bool {
    ABSENT_SENTINELS.iter().all(|s| output.contains(s))
}

/// Classify the output of the DND check script.
///
/// The register value is hexadecimal, with or without a `0x` prefix. A
/// missing register line or an unparsable value is
/// [`MonitorError::UnexpectedFormat`].
pub fn classify_dnd(device: &str, output: &str) -> Result<DndState> {
    if is_absent(output) {
        return Ok(DndState::Absent);
    }
    let unexpected = || MonitorError::UnexpectedFormat {
        device: device.to_string(),
        output: output.to_string(),
    };
    let caps = dnd_re().captures(output).ok_or_else(unexpected)?;
    let raw = &caps[1];
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    let value = u64::from_str_radix(digits, 16).map_err(|_| unexpected())?;
    Ok(if value > 0 {
        DndState::Busy
    } else {
        DndState::Clear
    })
}

/// Classify the output of the status script.
pub fn classify_status(output: ToolOutput) -> Result<PollOutcome> {
    if is_absent(&output.stdout) {
        return Ok(PollOutcome::Absent);
    }
    match output.report {
        Some(report) => Ok(PollOutcome::Success(report)),
        None => Err(MonitorError::Tool {
            command: output.command,
            output: format!("no status report was written\n{}", output.stdout),
        }),
    }
}

/// Two-phase poll of one board: DND check, then the status report.
pub fn poll(query: &dyn DeviceQuery, device: &str, address: &str, scripts: &Scripts) -> Result<PollOutcome> {
    let dnd = query.run_script(address, &scripts.dnd)?;
    match classify_dnd(device, &dnd.stdout)? {
        DndState::Absent => return Ok(PollOutcome::Absent),
        DndState::Busy => return Ok(PollOutcome::Busy),
        DndState::Clear => {}
    }
    let status = query.run_script(address, &scripts.status)?;
    classify_status(status)
}

// ---------------------------------------------------------------------------
// Control tool
// ---------------------------------------------------------------------------

/// Runs the control tool as a child process: `PROGRAM [ARGS..] -w ADDRESS -X SCRIPT`.
#[derive(Debug, Clone)]
pub struct ButoolQuery {
    program: String,
    args: Vec<String>,
    work_dir: PathBuf,
    report_file: String,
    timeout: Duration,
}

impl ButoolQuery {
    pub fn new(program: &str, work_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            work_dir: work_dir.into(),
            report_file: DEFAULT_REPORT_FILE.to_string(),
            timeout,
        }
    }

    /// Arguments placed before `-w`, for wrapper programs.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_report_file(mut self, name: &str) -> Self {
        self.report_file = name.to_string();
        self
    }

    pub fn report_path(&self) -> PathBuf {
        self.work_dir.join(&self.report_file)
    }

    fn command_line(&self, address: &str, script: &Path) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.extend([
            "-w".to_string(),
            address.to_string(),
            "-X".to_string(),
            script.display().to_string(),
        ]);
        parts.join(" ")
    }
}

impl DeviceQuery for ButoolQuery {
    fn run_script(&self, address: &str, script: &Path) -> Result<ToolOutput> {
        let command = self.command_line(address, script);
        let report_path = self.report_path();
        let report_error = |action: &str, e: std::io::Error| MonitorError::Tool {
            command: command.clone(),
            output: format!("{action} {}: {e}", report_path.display()),
        };
        match fs::remove_file(&report_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(report_error("removing stale report", e)),
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("-w")
            .arg(address)
            .arg("-X")
            .arg(script)
            .current_dir(&self.work_dir);

        let finished = run_with_timeout(&mut cmd, self.timeout).map_err(|e| MonitorError::Tool {
            command: command.clone(),
            output: e.to_string(),
        })?;
        let Some((status, stdout, stderr)) = finished else {
            return Err(MonitorError::Timeout {
                device: address.to_string(),
                secs: self.timeout.as_secs_f64(),
            });
        };
        if !status.success() {
            return Err(MonitorError::Tool {
                command,
                output: format!("{status}\n{stdout}{stderr}"),
            });
        }

        let report = match fs::read(&report_path) {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(report_error("reading report", e)),
        };
        Ok(ToolOutput {
            command,
            stdout,
            report,
        })
    }
}

/// Spawn `cmd` and wait at most `timeout` for it.
///
/// Returns `Ok(None)` if the deadline passed; the child is killed and reaped.
fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> std::io::Result<Option<(ExitStatus, String, String)>> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    // Drain both pipes on their own threads so a chatty tool can't block on
    // a full pipe while we wait for it.
    let stdout = child.stdout.take().map(drain);
    let stderr = child.stderr.take().map(drain);

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break Some(status);
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            let _ = child.kill();
            let _ = child.wait();
            break None;
        }
        thread::sleep(remaining.min(POLL_SLICE));
    };

    // After a kill, grandchildren may still hold the pipes open; leave the
    // drain threads to finish on their own.
    let Some(status) = status else {
        return Ok(None);
    };
    let collect = |h: Option<thread::JoinHandle<String>>| h.and_then(|h| h.join().ok()).unwrap_or_default();
    Ok(Some((status, collect(stdout), collect(stderr))))
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}
