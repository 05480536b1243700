//! Register table scraping from status pages.
//!
//! The control tool renders its status dump as HTML tables, one per register
//! group. Each row starts with the register name, followed by one cell per
//! channel. Only tables named in the configured metric list are kept.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::overlay::{Status, classify_document};

/// Register name → value cells, in column order.
pub type RegisterMap = BTreeMap<String, Vec<String>>;

/// Table name → registers.
pub type TableMap = BTreeMap<String, RegisterMap>;

/// Everything read from one status page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapedReport {
    pub tables: TableMap,
    pub status: Status,
}

impl ScrapedReport {
    /// Value cells of one register, if the table and register were present.
    pub fn row(&self, table: &str, register: &str) -> Option<&[String]> {
        self.tables
            .get(table)
            .and_then(|regs| regs.get(register))
            .map(Vec::as_slice)
    }
}

fn table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<table\b([^>]*)>(.*?)</table\s*>").expect("static regex"))
}

fn name_attr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)\b(?:name|id)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>"']+))"#)
            .expect("static regex")
    })
}

fn caption_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<caption\b[^>]*>(.*?)</caption\s*>").expect("static regex"))
}

fn row_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<tr\b[^>]*>(.*?)</tr\s*>").expect("static regex"))
}

fn cell_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<(td|th)\b[^>]*>(.*?)</t[dh]\s*>").expect("static regex"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("static regex"))
}

/// Parse the register tables of a page.
///
/// Tables not in `wanted` are skipped without parsing their rows. Missing
/// tables, short rows and header rows are all tolerated; the result simply
/// has fewer entries. The first row seen for a register wins.
pub fn scrape(document: &str, wanted: &BTreeSet<String>) -> ScrapedReport {
    let mut tables = TableMap::new();

    for table in table_re().captures_iter(document) {
        let attrs = table.get(1).map_or("", |m| m.as_str());
        let body = table.get(2).map_or("", |m| m.as_str());
        let Some(name) = table_name(attrs, body) else {
            continue;
        };
        if !wanted.contains(&name) {
            continue;
        }

        let registers = tables.entry(name).or_default();
        for row in row_re().captures_iter(body) {
            let row_body = row.get(1).map_or("", |m| m.as_str());
            let mut cells = Vec::new();
            let mut all_header = true;
            for cell in cell_re().captures_iter(row_body) {
                if !cell[1].eq_ignore_ascii_case("th") {
                    all_header = false;
                }
                cells.push(cell_text(&cell[2]));
            }
            if cells.is_empty() || all_header {
                continue;
            }
            let register = cells.remove(0);
            if register.is_empty() {
                continue;
            }
            registers.entry(register).or_insert(cells);
        }
    }

    ScrapedReport {
        tables,
        status: classify_document(document),
    }
}

/// A table is named by its `name`/`id` attribute, falling back to its caption.
fn table_name(attrs: &str, body: &str) -> Option<String> {
    if let Some(caps) = name_attr_re().captures(attrs) {
        let value = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().trim())
            .unwrap_or_default();
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }
    caption_re()
        .captures(body)
        .map(|caps| cell_text(&caps[1]))
        .filter(|name| !name.is_empty())
}

/// Visible text of a cell: tags stripped, common entities decoded, trimmed.
fn cell_text(raw: &str) -> String {
    let text = tag_re().replace_all(raw, "");
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}
