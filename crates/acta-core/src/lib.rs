//! Core domain model for ACTA: the raw activity handoff contract, the
//! canonical record set, and the derivation rules shared by the pipeline.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "acta-core";

/// Activity `type` value that switches primary-date derivation over to the
/// date3/date4 pair, regardless of whether date1 is present.
pub const ALTERNATE_SCHEDULE_TYPE: &str = "type1";

pub const STATUS_COMPLETE: &str = "Complete";
pub const STATUS_NOT_COMPLETE: &str = "Not Complete";

/// Comparable columns in the fixed order used for diffing and for insert
/// payloads. Sheet columns outside this set are ignored.
pub const COMPARABLE_FIELDS: [&str; 13] = [
    "unique_id",
    "project_id",
    "activity_id",
    "col1",
    "col2",
    "col3",
    "col4",
    "col5",
    "col6",
    "date3",
    "date4",
    "date5",
    "status",
];

/// Columns written by update mutations. `date3` is deliberately absent here
/// while insert payloads do carry it; keep the asymmetry.
pub const UPDATE_FIELDS: [&str; 6] = ["col1", "col2", "col3", "date4", "date5", "status"];

/// Columns that carry the typed DATE wrapper in mutation payloads.
pub const DATE_FIELDS: [&str; 3] = ["date3", "date4", "date5"];

/// Raw database pull row, one per project activity. Every column is nullable
/// at the source; this is the handoff contract from `acta-db` into the sync
/// pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRow {
    pub program: Option<String>,
    pub project_id: Option<String>,
    pub activity_id: Option<String>,
    pub col1: Option<f64>,
    pub col2: Option<String>,
    pub col3: Option<String>,
    pub col4: Option<String>,
    pub col5: Option<String>,
    pub col6: Option<String>,
    pub date1: Option<NaiveDate>,
    pub date2: Option<NaiveDate>,
    pub date3: Option<NaiveDate>,
    pub date4: Option<NaiveDate>,
    pub activity_type: Option<String>,
}

/// One row of authoritative truth after normalization: composite key, the
/// projected attribute columns, exchange-form dates, and the derived status.
/// Rebuilt from scratch on every run, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CanonicalRecord {
    pub program: String,
    pub unique_id: String,
    pub project_id: String,
    pub activity_id: String,
    pub col1: Option<String>,
    pub col2: Option<String>,
    pub col3: Option<String>,
    pub col4: Option<String>,
    pub col5: Option<String>,
    pub col6: Option<String>,
    pub date3: Option<String>,
    pub date4: Option<String>,
    pub date5: Option<String>,
    pub status: String,
}

impl CanonicalRecord {
    /// Values aligned index-for-index with [`COMPARABLE_FIELDS`].
    pub fn comparable_values(&self) -> [Option<&str>; COMPARABLE_FIELDS.len()] {
        [
            Some(self.unique_id.as_str()),
            Some(self.project_id.as_str()),
            Some(self.activity_id.as_str()),
            self.col1.as_deref(),
            self.col2.as_deref(),
            self.col3.as_deref(),
            self.col4.as_deref(),
            self.col5.as_deref(),
            self.col6.as_deref(),
            self.date3.as_deref(),
            self.date4.as_deref(),
            self.date5.as_deref(),
            Some(self.status.as_str()),
        ]
    }

    /// Look a comparable field up by column name.
    pub fn field(&self, name: &str) -> Option<&str> {
        let idx = COMPARABLE_FIELDS.iter().position(|f| *f == name)?;
        self.comparable_values()[idx]
    }
}

/// Composite business key: `project_id + ": " + activity_id`.
pub fn unique_id(project_id: &str, activity_id: &str) -> String {
    format!("{project_id}: {activity_id}")
}

/// Status rule over the per-key rate aggregate: complete when there is no
/// rate at all or the rate is exactly 1.0.
pub fn completion_status(rate: Option<f64>) -> &'static str {
    match rate {
        None => STATUS_COMPLETE,
        Some(r) if r == 1.0 => STATUS_COMPLETE,
        Some(_) => STATUS_NOT_COMPLETE,
    }
}

/// Exchange form for calendar dates (no time component).
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Render a numeric value the way sheet cells round-trip it: integral values
/// stay whole, everything else keeps its fraction.
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Comparison-side normalization: an absent value becomes the empty string
/// and surrounding whitespace is stripped, on both sides independently.
pub fn normalize_value(value: Option<&str>) -> String {
    value.map(str::trim).unwrap_or_default().to_string()
}
