//! Hours aggregation over timesheet entries
//!
//! Stored entries are a two-level JSON object whose nesting order varies
//! between `day -> task -> hours` and `task -> day -> hours`. They are
//! flattened into [`HourEntry`] triples as soon as they are deserialized, so
//! the aggregation code below never looks at the stored shape.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// One leaf of the nested entries map
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourEntry {
    pub outer: String,
    pub inner: String,
    pub hours: f64,
}

/// Which nesting level of the entries map to group by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Outer,
    Inner,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entries(Vec<HourEntry>);

impl Entries {
    /// Flatten any JSON value into entries.
    ///
    /// Numbers are taken as-is, numeric strings are parsed and every other
    /// leaf counts as zero. Outer values that are not objects are skipped.
    pub fn from_json(value: &Value) -> Self {
        let mut entries = Vec::new();

        if let Value::Object(outer) = value {
            for (outer_key, inner) in outer {
                let Value::Object(inner) = inner else {
                    continue;
                };
                for (inner_key, hours) in inner {
                    entries.push(HourEntry {
                        outer: outer_key.clone(),
                        inner: inner_key.clone(),
                        hours: coerce_hours(hours),
                    });
                }
            }
        }

        Self(entries)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HourEntry> {
        self.0.iter()
    }

    /// Sum of every leaf
    pub fn total(&self) -> f64 {
        self.0.iter().map(|e| e.hours).sum()
    }

    /// Subtotal per key of the chosen level
    pub fn totals_by(&self, axis: Axis) -> BTreeMap<String, f64> {
        let mut totals = BTreeMap::new();
        for entry in &self.0 {
            *totals.entry(key_for(entry, axis).to_string()).or_insert(0.0) += entry.hours;
        }
        totals
    }

    /// The level holding task names.
    ///
    /// When every outer key is a day (weekday name or ISO date) the tasks sit
    /// one level down; otherwise the outer level is the task level.
    pub fn task_axis(&self) -> Axis {
        let outer_keys: BTreeSet<&str> = self.0.iter().map(|e| e.outer.as_str()).collect();
        if !outer_keys.is_empty() && outer_keys.iter().all(|k| is_day_key(k)) {
            Axis::Inner
        } else {
            Axis::Outer
        }
    }

    /// Rebuild the nested `outer -> inner -> hours` object
    pub fn to_json(&self) -> Value {
        let mut outer = Map::new();
        for entry in &self.0 {
            let inner = outer
                .entry(entry.outer.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(inner) = inner {
                inner.insert(entry.inner.clone(), Value::from(entry.hours));
            }
        }
        Value::Object(outer)
    }
}

impl<'de> Deserialize<'de> for Entries {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(Entries::from_json(&value))
    }
}

impl Serialize for Entries {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

/// Hours per task across several timesheets.
///
/// Only positive leaves are counted and tasks that end up without hours are
/// left out, which is what the per-task report shows.
pub fn task_totals<'a>(timesheets: impl IntoIterator<Item = &'a Entries>) -> BTreeMap<String, f64> {
    let mut totals: BTreeMap<String, f64> = BTreeMap::new();

    for entries in timesheets {
        let axis = entries.task_axis();
        for entry in entries.iter().filter(|e| e.hours > 0.0) {
            *totals.entry(key_for(entry, axis).to_string()).or_insert(0.0) += entry.hours;
        }
    }

    totals.retain(|_, hours| *hours > 0.0);
    totals
}

// =============================================================================
// Week numbers
// =============================================================================

/// ISO-8601 week, with the week-based year it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct WeekNumber {
    pub year: i32,
    pub week: u32,
}

impl fmt::Display for WeekNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

/// Week containing the Thursday of the date's Monday-Sunday week
pub fn iso_week(date: NaiveDate) -> WeekNumber {
    let week = date.iso_week();
    WeekNumber {
        year: week.year(),
        week: week.week(),
    }
}

/// Parse a stored week start, accepting a bare date or a full timestamp
pub fn parse_week_start(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

// =============================================================================
// Helpers
// =============================================================================

fn key_for(entry: &HourEntry, axis: Axis) -> &str {
    match axis {
        Axis::Outer => &entry.outer,
        Axis::Inner => &entry.inner,
    }
}

fn coerce_hours(value: &Value) -> f64 {
    let hours = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => Some(0.0),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    hours.filter(|h| h.is_finite()).unwrap_or(0.0)
}

const DAY_NAMES: &[&str] = &[
    "mon", "tue", "wed", "thu", "fri", "sat", "sun", "monday", "tuesday", "wednesday", "thursday",
    "friday", "saturday", "sunday", "mån", "tis", "ons", "tor", "fre", "lör", "sön", "måndag",
    "tisdag", "onsdag", "torsdag", "fredag", "lördag", "söndag",
];

fn is_day_key(key: &str) -> bool {
    let lower = key.trim().to_lowercase();
    DAY_NAMES.contains(&lower.as_str()) || parse_week_start(&lower).is_some()
}
