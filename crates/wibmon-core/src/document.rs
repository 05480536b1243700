//! Per-device records and their rendered status pages.
//!
//! A [`DeviceRecord`] is the source of truth for one board: the last good
//! status report, the registers scraped from it, and the failure overlay.
//! The HTML page is always rendered from the record, never edited in place.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::overlay::{Overlay, OverlayKind, Status, TIMESTAMP_FORMAT};
use crate::scrape::ScrapedReport;

/// Page title prefix; the board name follows it.
pub const DEFAULT_TITLE_PREFIX: &str = "WIB Status Page for ";

/// Page used for a board that has never returned a status report.
/// `{title}` is replaced with the page title.
pub const EMPTY_TEMPLATE: &str = "<html>
<head><title>{title}</title></head>
<body>
<h1>{title}</h1>
<p>No status report has been read from this board yet.</p>
</body>
</html>
";

/// Everything the poller knows about one board.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub name: String,
    #[serde(default)]
    pub overlay: Overlay,
    /// Status report from the last successful poll, as produced by the tool.
    #[serde(default)]
    pub report: Option<String>,
    /// Time of the last successful poll.
    #[serde(default)]
    pub polled_at: Option<NaiveDateTime>,
    /// Registers scraped from `report`.
    #[serde(default)]
    pub scraped: ScrapedReport,
}

impl DeviceRecord {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Replace the record with a fresh report. Clears the overlay.
    pub fn apply_success(&mut self, report: String, scraped: ScrapedReport, at: NaiveDateTime) {
        self.report = Some(report);
        self.scraped = scraped;
        self.polled_at = Some(at);
        self.overlay.clear(at);
    }

    /// Annotate the last known state with a busy/absent observation.
    pub fn apply_overlay(&mut self, kind: OverlayKind, at: NaiveDateTime) {
        self.overlay.observe(kind, at);
    }

    /// Dashboard classification. A board with neither a report nor an
    /// overlay has never answered and counts as absent.
    pub fn status(&self) -> Status {
        match self.overlay.status() {
            Status::Good if self.report.is_none() => Status::Absent,
            status => status,
        }
    }

    /// Render the status page.
    pub fn render(&self, title_prefix: &str, empty_template: &str) -> String {
        let title = format!("{title_prefix}{}", self.name);
        let markers = self.overlay.render_markers();
        match (&self.report, self.polled_at) {
            (Some(report), Some(at)) => render_status(report, &title, &markers, at),
            _ => render_empty(empty_template, &title, &markers),
        }
    }
}

/// Status page for a successful poll: heading, overlay markers and the
/// freshness line go directly after `<body>`.
pub fn render_status(report: &str, title: &str, markers: &str, at: NaiveDateTime) -> String {
    let header = format!(
        "<h1>{title}</h1>\n{markers}<p>Updated at {} Geneva time</p>\n",
        at.format(TIMESTAMP_FORMAT)
    );
    insert_after_body(report, &header)
}

/// The empty template with markers inserted after its heading.
pub fn render_empty(template: &str, title: &str, markers: &str) -> String {
    let page = template.replace("{title}", title);
    if markers.is_empty() {
        return page;
    }
    match find_tag_end(&page, "</h1") {
        Some(pos) => {
            let mut out = String::with_capacity(page.len() + markers.len() + 1);
            out.push_str(&page[..pos]);
            out.push('\n');
            out.push_str(markers.trim_end_matches('\n'));
            out.push_str(&page[pos..]);
            out
        }
        None => insert_after_body(&page, markers),
    }
}

/// Insert `block` on its own line after the opening `<body>` tag, or at the
/// top when the document has none.
fn insert_after_body(doc: &str, block: &str) -> String {
    match find_tag_end(doc, "<body") {
        Some(pos) => {
            let mut out = String::with_capacity(doc.len() + block.len() + 1);
            out.push_str(&doc[..pos]);
            out.push('\n');
            out.push_str(block);
            out.push_str(doc[pos..].strip_prefix('\n').unwrap_or(&doc[pos..]));
            out
        }
        None => format!("{block}{doc}"),
    }
}

/// Byte offset just past the `>` closing the first tag starting with `open`
/// (ASCII case-insensitive).
fn find_tag_end(doc: &str, open: &str) -> Option<usize> {
    let start = doc.to_ascii_lowercase().find(open)?;
    let close = doc[start..].find('>')?;
    Some(start + close + 1)
}
