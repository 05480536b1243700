//! Dashboard metric extraction.
//!
//! A [`MetricSpec`] names one register in one scraped table and says how to
//! turn its value cells into a single display string. The ordered spec list
//! defines the dashboard summary columns and is fixed for the process
//! lifetime.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::scrape::ScrapedReport;

/// Which value cell(s) of a register row to display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SelectorRepr", into = "SelectorRepr")]
pub enum Selector {
    /// The k-th value cell (0-based, register name excluded).
    Column(usize),
    /// Every non-blank cell, trimmed and joined with a single space.
    All,
}

/// JSON form: a column index, or the string `"all"`.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SelectorRepr {
    Column(usize),
    Word(String),
}

impl TryFrom<SelectorRepr> for Selector {
    type Error = String;

    fn try_from(repr: SelectorRepr) -> Result<Self, Self::Error> {
        match repr {
            SelectorRepr::Column(k) => Ok(Self::Column(k)),
            SelectorRepr::Word(w) if w.eq_ignore_ascii_case("all") => Ok(Self::All),
            SelectorRepr::Word(w) => Err(format!("unknown selector '{w}', expected a column index or \"all\"")),
        }
    }
}

impl From<Selector> for SelectorRepr {
    fn from(sel: Selector) -> Self {
        match sel {
            Selector::Column(k) => Self::Column(k),
            Selector::All => Self::Word("all".to_string()),
        }
    }
}

/// One dashboard summary column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub table: String,
    pub register: String,
    pub selector: Selector,
    /// Summary table this column belongs to.
    pub group: String,
    /// Column heading; defaults to the register name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl MetricSpec {
    pub fn new(table: &str, register: &str, selector: Selector, group: &str) -> Self {
        Self {
            table: table.to_string(),
            register: register.to_string(),
            selector,
            group: group.to_string(),
            label: None,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.register)
    }
}

/// Reduce one register row to its display string.
///
/// `None` means the register (or its whole table) was missing. Missing or
/// short data always degrades to an empty string.
pub fn reduce(row: Option<&[String]>, selector: Selector) -> String {
    let Some(cells) = row else {
        return String::new();
    };
    match selector {
        Selector::Column(k) => cells.get(k).map(|c| c.trim().to_string()).unwrap_or_default(),
        Selector::All => cells
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
    }
}

/// Display strings for every spec, in spec order.
pub fn reduce_all(report: &ScrapedReport, specs: &[MetricSpec]) -> Vec<String> {
    specs
        .iter()
        .map(|spec| reduce(report.row(&spec.table, &spec.register), spec.selector))
        .collect()
}

/// Names of the tables the scraper needs to keep.
pub fn interesting_tables(specs: &[MetricSpec]) -> BTreeSet<String> {
    specs.iter().map(|spec| spec.table.clone()).collect()
}

/// Summary group ids in first-appearance order.
pub fn groups(specs: &[MetricSpec]) -> Vec<&str> {
    let mut out: Vec<&str> = Vec::new();
    for spec in specs {
        if !out.contains(&spec.group.as_str()) {
            out.push(&spec.group);
        }
    }
    out
}

/// Built-in column set for the standard status script.
pub fn default_metric_specs() -> Vec<MetricSpec> {
    vec![
        // System
        MetricSpec::new("SYSTEM", "FIRMWARE_VERSION", Selector::Column(0), "system").with_label("Firmware"),
        MetricSpec::new("SYSTEM", "SLOW_CONTROL_DND", Selector::Column(0), "system").with_label("DND"),
        MetricSpec::new("SYSTEM", "FPGA_TEMP", Selector::Column(0), "system").with_label("FPGA °C"),
        // Timing
        MetricSpec::new("TIMING", "PLL_LOCKED", Selector::Column(0), "timing").with_label("PLL lock"),
        MetricSpec::new("TIMING", "TIMESTAMP_SOURCE", Selector::Column(0), "timing").with_label("TS source"),
        MetricSpec::new("TIMING", "EVENT_COUNT", Selector::Column(0), "timing").with_label("Events"),
        // Front-end boards
        MetricSpec::new("FEMB", "POWER_ENABLE", Selector::All, "femb").with_label("Power"),
        MetricSpec::new("FEMB", "LINK_LOCKED", Selector::All, "femb").with_label("Links"),
        MetricSpec::new("FEMB", "CONVERT_ENABLE", Selector::All, "femb").with_label("Convert"),
    ]
}
