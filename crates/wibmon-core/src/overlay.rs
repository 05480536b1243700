//! Failure overlay state machine.
//!
//! A board that is busy (do-not-disturb set) or missing keeps its last good
//! status page, annotated with a marker saying when the condition was seen.
//! The overlay is stored as structured state; the `<div>` markers in the
//! page are rendered from it.
//!
//! Merge rules for an incoming observation of kind `K`:
//! - a `K` marker already exists: refresh its timestamp in place;
//! - only the other kind exists: append a `K` marker after it, leaving the
//!   existing one alone, so a change of failure mode shows both;
//! - no marker: insert a single `K` marker.
//!
//! At most one marker of each kind is ever kept, even when both are
//! present, so a board that stays down doesn't grow its page.
//!
//! A successful poll clears every marker. Classification ranks
//! absent over busy over good.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Timestamp format used in markers and freshness lines.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Marker region ids. Kept compatible with pages written by earlier pollers.
pub const BUSY_MARKER_ID: &str = "busyerr";
pub const ABSENT_MARKER_ID: &str = "nowiberr";

/// Transitions kept per device.
pub const HISTORY_LIMIT: usize = 32;

/// Non-success poll outcome that annotates a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlayKind {
    Busy,
    Absent,
}

/// Display classification of a board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Good,
    Busy,
    Absent,
}

impl Status {
    /// CSS class used for links and summary rows.
    pub fn css_class(self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Busy => "busy",
            Self::Absent => "absent",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.css_class())
    }
}

impl From<OverlayKind> for Status {
    fn from(kind: OverlayKind) -> Self {
        match kind {
            OverlayKind::Busy => Self::Busy,
            OverlayKind::Absent => Self::Absent,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub kind: OverlayKind,
    pub at: NaiveDateTime,
}

impl Marker {
    /// Render the marker region.
    pub fn render(&self) -> String {
        let ts = self.at.format(TIMESTAMP_FORMAT);
        match self.kind {
            OverlayKind::Busy => {
                format!("<div id={BUSY_MARKER_ID}><p>WIB was busy at {ts} Geneva time</p></div>")
            }
            OverlayKind::Absent => {
                format!("<div id={ABSENT_MARKER_ID}><p>WIB not found at {ts} Geneva time</p></div>")
            }
        }
    }
}

/// A change of classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub status: Status,
    pub at: NaiveDateTime,
}

/// Per-device overlay: the live markers plus a bounded transition log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overlay {
    #[serde(default)]
    markers: Vec<Marker>,
    #[serde(default)]
    history: Vec<Transition>,
}

impl Overlay {
    /// Merge a busy/absent observation.
    pub fn observe(&mut self, kind: OverlayKind, at: NaiveDateTime) {
        match self.markers.iter_mut().find(|m| m.kind == kind) {
            Some(existing) => existing.at = at,
            None => self.markers.push(Marker { kind, at }),
        }
        self.record(self.status(), at);
    }

    /// Drop all markers after a successful poll.
    pub fn clear(&mut self, at: NaiveDateTime) {
        self.markers.clear();
        self.record(Status::Good, at);
    }

    /// Current classification, absent taking priority over busy.
    pub fn status(&self) -> Status {
        if self.has(OverlayKind::Absent) {
            Status::Absent
        } else if self.has(OverlayKind::Busy) {
            Status::Busy
        } else {
            Status::Good
        }
    }

    pub fn has(&self, kind: OverlayKind) -> bool {
        self.markers.iter().any(|m| m.kind == kind)
    }

    /// Markers in page order.
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Classification changes, oldest first.
    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Marker regions as they appear in the page, one per line.
    pub fn render_markers(&self) -> String {
        let mut out = String::new();
        for marker in &self.markers {
            out.push_str(&marker.render());
            out.push('\n');
        }
        out
    }

    fn record(&mut self, status: Status, at: NaiveDateTime) {
        if self.history.last().map(|t| t.status) == Some(status) {
            return;
        }
        self.history.push(Transition { status, at });
        if self.history.len() > HISTORY_LIMIT {
            let excess = self.history.len() - HISTORY_LIMIT;
            self.history.drain(..excess);
        }
    }
}

/// Classify a rendered page by the marker regions it contains.
///
/// Used on pages read back from disk; absent wins over busy.
pub fn classify_document(text: &str) -> Status {
    if text.contains(&format!("id={ABSENT_MARKER_ID}")) {
        Status::Absent
    } else if text.contains(&format!("id={BUSY_MARKER_ID}")) {
        Status::Busy
    } else {
        Status::Good
    }
}
