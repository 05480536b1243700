//! Fleet dashboard: zone grid plus metric summary tables.
//!
//! The view is rebuilt from scratch every cycle from the device records; it
//! carries no state of its own. Devices are always listed in descending
//! canonical-name order, both inside each zone cell and in every summary
//! table.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::document::DeviceRecord;
use crate::metrics::{self, MetricSpec};
use crate::names::{Device, Zone};
use crate::overlay::{Status, TIMESTAMP_FORMAT};
use crate::store::page_key;

/// Built-in dashboard page. Each zone has a `<td id=ZONE>` cell; grid
/// entries are inserted right after the opening tag. `{updated}`,
/// `{unassigned}` and `{summary}` are replaced with generated content.
pub const DASHBOARD_TEMPLATE: &str = r#"<html>
<head>
<title>WIB Status</title>
<meta http-equiv="refresh" content="60">
<style>
  body { font-family: sans-serif; }
  table { border-collapse: collapse; }
  td, th { border: 1px solid #999; padding: 2px 8px; vertical-align: top; }
  a.good, tr.good { color: #060; }
  a.busy, tr.busy { color: #b60; }
  a.absent, tr.absent { color: #c00; }
</style>
</head>
<body>
<h1>WIB Status</h1>
<p>Updated at {updated} Geneva time</p>
<table>
  <tr><th>Coldbox</th><th>DS RAS</th><th>MS RAS</th><th>US RAS</th></tr>
  <tr>
        <td id=coldbox></td>
        <td id=dsras></td>
        <td id=msras></td>
        <td id=usras></td>
  </tr>
  <tr><th>DS DAS</th><th>US DAS</th><th>MS DAS</th><th>Bench</th></tr>
  <tr>
        <td id=dsdas></td>
        <td id=usdas></td>
        <td id=msdas></td>
        <td id=bench></td>
  </tr>
</table>
{unassigned}
{summary}
</body>
</html>
"#;

/// Indentation of grid entries inside their cell.
const ENTRY_INDENT: &str = "          ";

/// One board as it appears on the dashboard and in the fleet snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSummary {
    pub name: String,
    pub zone: Option<Zone>,
    pub status: Status,
    /// Reduced metric values, in metric spec order.
    pub metrics: Vec<String>,
}

impl DeviceSummary {
    fn link(&self) -> String {
        format!(
            r#"<p><a href="./{}" class="{}">{}</a></p>"#,
            escape(&page_key(&self.name)),
            self.status.css_class(),
            escape(&self.name)
        )
    }
}

/// One metric summary table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryTable {
    pub group: String,
    pub headers: Vec<String>,
    /// (device name, status, cells), descending by name.
    pub rows: Vec<(String, Status, Vec<String>)>,
}

/// Everything the dashboard page shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardView {
    /// All boards, descending by name.
    pub devices: Vec<DeviceSummary>,
    pub tables: Vec<SummaryTable>,
}

/// Machine-readable fleet state written next to the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetSnapshot {
    pub generated_at: NaiveDateTime,
    pub devices: Vec<DeviceSummary>,
}

/// Build the dashboard view.
///
/// Boards without a record are shown as absent. Duplicate names are assumed
/// to have been removed by the caller.
pub fn build(devices: &[Device], records: &HashMap<String, DeviceRecord>, specs: &[MetricSpec]) -> DashboardView {
    let mut summaries: Vec<DeviceSummary> = devices
        .iter()
        .map(|device| match records.get(&device.name) {
            Some(record) => DeviceSummary {
                name: device.name.clone(),
                zone: device.zone,
                status: record.status(),
                metrics: metrics::reduce_all(&record.scraped, specs),
            },
            None => DeviceSummary {
                name: device.name.clone(),
                zone: device.zone,
                status: Status::Absent,
                metrics: vec![String::new(); specs.len()],
            },
        })
        .collect();
    summaries.sort_by(|a, b| b.name.cmp(&a.name));

    let tables = metrics::groups(specs)
        .into_iter()
        .map(|group| {
            let columns: Vec<usize> = specs
                .iter()
                .enumerate()
                .filter(|(_, spec)| spec.group == group)
                .map(|(i, _)| i)
                .collect();
            SummaryTable {
                group: group.to_string(),
                headers: columns.iter().map(|&i| specs[i].label().to_string()).collect(),
                rows: summaries
                    .iter()
                    .map(|s| {
                        let cells = columns.iter().map(|&i| s.metrics[i].clone()).collect();
                        (s.name.clone(), s.status, cells)
                    })
                    .collect(),
            }
        })
        .collect();

    DashboardView {
        devices: summaries,
        tables,
    }
}

impl DashboardView {
    /// Entries per zone, each list descending by name.
    pub fn zone_grid(&self) -> BTreeMap<Zone, Vec<&DeviceSummary>> {
        let mut grid: BTreeMap<Zone, Vec<&DeviceSummary>> = BTreeMap::new();
        for device in &self.devices {
            if let Some(zone) = device.zone {
                grid.entry(zone).or_default().push(device);
            }
        }
        grid
    }

    /// Boards outside every assigned zone block.
    pub fn unassigned(&self) -> Vec<&DeviceSummary> {
        self.devices.iter().filter(|d| d.zone.is_none()).collect()
    }

    pub fn snapshot(&self, generated_at: NaiveDateTime) -> FleetSnapshot {
        FleetSnapshot {
            generated_at,
            devices: self.devices.clone(),
        }
    }

    /// Render the page from a template.
    ///
    /// A zone whose cell is missing from the template has its boards moved
    /// to the unassigned list.
    pub fn render(&self, template: &str, updated: NaiveDateTime) -> String {
        let mut page = template.to_string();
        let mut unplaced = self.unassigned();

        for (zone, entries) in self.zone_grid() {
            let Some(pos) = cell_insert_point(&page, zone) else {
                log::warn!("dashboard template has no cell for zone {zone}; listing its boards as unassigned");
                unplaced.extend(entries);
                continue;
            };
            let mut block = String::new();
            for entry in &entries {
                let _ = write!(block, "\n{ENTRY_INDENT}{}", entry.link());
            }
            page.insert_str(pos, &block);
        }
        unplaced.sort_by(|a, b| b.name.cmp(&a.name));

        let unassigned = render_unassigned(&unplaced);
        let summary = self.render_tables();
        let updated = updated.format(TIMESTAMP_FORMAT).to_string();

        page = page.replace("{updated}", &updated);
        page = place(page, "{unassigned}", &unassigned);
        place(page, "{summary}", &summary)
    }

    fn render_tables(&self) -> String {
        let mut html = String::new();
        for table in &self.tables {
            html.push_str(&format!("<h2>{}</h2>\n", escape(&table.group)));
            html.push_str(&format!("<table id=summary-{}>\n", escape(&table.group)));
            html.push_str("  <tr><th>WIB</th>");
            for header in &table.headers {
                html.push_str(&format!("<th>{}</th>", escape(header)));
            }
            html.push_str("</tr>\n");
            for (name, status, cells) in &table.rows {
                html.push_str(&format!(
                    r#"  <tr class="{}"><td><a href="./{}">{}</a></td>"#,
                    status.css_class(),
                    escape(&page_key(name)),
                    escape(name)
                ));
                for cell in cells {
                    html.push_str(&format!("<td>{}</td>", escape(cell)));
                }
                html.push_str("</tr>\n");
            }
            html.push_str("</table>\n");
        }
        html
    }
}

fn render_unassigned(devices: &[&DeviceSummary]) -> String {
    if devices.is_empty() {
        return String::new();
    }
    let mut html = String::from("<h2>Unassigned</h2>\n<div id=unassigned>");
    for device in devices {
        let _ = write!(html, "\n{ENTRY_INDENT}{}", device.link());
    }
    html.push_str("\n</div>\n");
    html
}

/// Byte offset just past `<td id=ZONE>` (ASCII case-insensitive).
fn cell_insert_point(page: &str, zone: Zone) -> Option<usize> {
    let needle = format!("<td id={}>", zone.as_str());
    let start = page.to_ascii_lowercase().find(&needle)?;
    Some(start + needle.len())
}

/// Replace `placeholder`, or insert before `</body>` when the template lacks it.
fn place(page: String, placeholder: &str, content: &str) -> String {
    if page.contains(placeholder) {
        return page.replace(placeholder, content);
    }
    if content.is_empty() {
        return page;
    }
    match page.to_ascii_lowercase().rfind("</body") {
        Some(pos) => {
            let mut out = page;
            out.insert_str(pos, content);
            out
        }
        None => page + content,
    }
}

/// Escape text for an HTML element body or attribute value.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
