//! Time entry data model
//!
//! An [`Entry`] is one tracked interval; a [`DayFile`] holds all entries whose
//! start falls on one calendar day. Timestamps keep the offset they were
//! recorded with so that a load/save cycle reproduces the file exactly.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Timelike};
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};

/// Tag attached to every entry imported from the Outlook calendar
pub const OUTLOOK_TAG: &str = "outlook";

const ID_SUFFIX_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const ID_SUFFIX_LEN: usize = 5;

/// Provenance of an entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Source {
    /// Created by the start/stop timer
    Manual,
    /// Imported from the Outlook calendar
    Outlook,
    /// Written by some other producer; preserved verbatim
    Other(String),
}

impl Source {
    pub fn as_str(&self) -> &str {
        match self {
            Source::Manual => "manual",
            Source::Outlook => "outlook",
            Source::Other(s) => s,
        }
    }
}

impl From<String> for Source {
    fn from(s: String) -> Self {
        match s.as_str() {
            "manual" => Source::Manual,
            "outlook" => Source::Outlook,
            _ => Source::Other(s),
        }
    }
}

impl From<Source> for String {
    fn from(source: Source) -> Self {
        match source {
            Source::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked interval
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Local identifier, never regenerated once assigned
    pub id: String,

    /// Remote calendar event id; only set on imported entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,

    pub project: String,

    #[serde(default)]
    pub task: Option<String>,

    #[serde(default)]
    pub comment: Option<String>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,

    pub start: DateTime<FixedOffset>,

    /// `None` while the timer is running
    #[serde(default)]
    pub end: Option<DateTime<FixedOffset>>,

    /// Always `end - start` in whole seconds when `end` is set
    #[serde(default)]
    pub duration_seconds: Option<i64>,

    pub source: Source,
}

impl Entry {
    /// Create an open manual entry starting at `start` with a fresh id
    pub fn start_manual(project: impl Into<String>, start: DateTime<FixedOffset>) -> Self {
        Self {
            id: generate_id(&start),
            external_id: None,
            project: project.into(),
            task: None,
            comment: None,
            tags: Vec::new(),
            start,
            end: None,
            duration_seconds: None,
            source: Source::Manual,
        }
    }

    /// Whether this entry is a running timer
    pub fn is_active(&self) -> bool {
        self.end.is_none()
    }

    /// Calendar day of the entry's DayFile
    pub fn day(&self) -> NaiveDate {
        self.start.date_naive()
    }

    /// Set `end` and recompute `duration_seconds`
    pub fn close_at(&mut self, end: DateTime<FixedOffset>) {
        self.duration_seconds = Some(whole_seconds(end - self.start));
        self.end = Some(end);
    }

    /// Append `extra` to the comment, newline-separated
    pub fn append_comment(&mut self, extra: &str) {
        if extra.is_empty() {
            return;
        }
        self.comment = Some(match self.comment.take() {
            Some(existing) => format!("{}\n{}", existing, extra),
            None => extra.to_string(),
        });
    }
}

/// Top-level structure of one day's JSON file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayFile {
    pub date: NaiveDate,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub entries: Vec<Entry>,
}

impl DayFile {
    pub fn empty(date: NaiveDate) -> Self {
        Self {
            date,
            entries: Vec::new(),
        }
    }

    /// Replace the entry with the same id, or append it.
    ///
    /// Returns `true` when an existing entry was replaced.
    pub fn upsert(&mut self, entry: Entry) -> bool {
        match self.entries.iter_mut().find(|e| e.id == entry.id) {
            Some(slot) => {
                *slot = entry;
                true
            }
            None => {
                self.entries.push(entry);
                false
            }
        }
    }

    pub fn find_by_external_id(&self, external_id: &str) -> Option<&Entry> {
        self.entries
            .iter()
            .find(|e| e.external_id.as_deref() == Some(external_id))
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Generate an entry id: `YYYYMMDD-HHMMSS-` plus a random lowercase suffix
pub fn generate_id(at: &DateTime<FixedOffset>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ID_SUFFIX_CHARS[rng.gen_range(0..ID_SUFFIX_CHARS.len())] as char)
        .collect();
    format!("{}-{}", at.format("%Y%m%d-%H%M%S"), suffix)
}

/// Whole seconds of a duration, rounded down
pub fn whole_seconds(duration: Duration) -> i64 {
    let secs = duration.num_seconds();
    if Duration::seconds(secs) > duration {
        secs - 1
    } else {
        secs
    }
}

/// 00:00:00 of the same calendar day, keeping the offset
pub fn start_of_day(at: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    at - Duration::seconds(i64::from(at.num_seconds_from_midnight()))
        - Duration::nanoseconds(i64::from(at.nanosecond()))
}

/// 23:59:59 of the same calendar day, keeping the offset
pub fn end_of_day(at: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    start_of_day(at) + Duration::seconds(86_399)
}

/// Format seconds as "1h 40m", "45m" or "30s"
pub fn format_duration(seconds: i64) -> String {
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{}h {}m", h, m)
    } else if m > 0 {
        format!("{}m", m)
    } else {
        format!("{}s", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn test_generate_id_shape() {
        let id = generate_id(&ts("2026-02-27T09:05:07+01:00"));
        assert!(id.starts_with("20260227-090507-"), "unexpected id {}", id);
        let suffix = id.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 5);
        assert!(suffix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_generate_id_is_unique_for_same_second() {
        let at = ts("2026-02-27T09:00:00Z");
        let ids: std::collections::HashSet<_> = (0..50).map(|_| generate_id(&at)).collect();
        assert!(ids.len() > 45);
    }

    #[test]
    fn test_source_round_trip_keeps_unknown_values() {
        let json = serde_json::to_string(&Source::Other("jira".to_string())).unwrap();
        assert_eq!(json, "\"jira\"");
        let parsed: Source = serde_json::from_str("\"outlook\"").unwrap();
        assert_eq!(parsed, Source::Outlook);
        let parsed: Source = serde_json::from_str("\"jira\"").unwrap();
        assert_eq!(parsed, Source::Other("jira".to_string()));
    }

    #[test]
    fn test_manual_entry_json_shape() {
        let entry = Entry {
            id: "20260227-090000-abcde".to_string(),
            external_id: None,
            project: "Work".to_string(),
            task: None,
            comment: None,
            tags: vec![],
            start: ts("2026-02-27T09:00:00+00:00"),
            end: None,
            duration_seconds: None,
            source: Source::Manual,
        };

        let value = serde_json::to_value(&entry).unwrap();
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("external_id"));
        assert!(obj["task"].is_null());
        assert!(obj["end"].is_null());
        assert!(obj["duration_seconds"].is_null());
        assert_eq!(obj["tags"], serde_json::json!([]));
        assert_eq!(obj["source"], "manual");
    }

    #[test]
    fn test_null_tags_are_read_as_empty() {
        let json = r#"{
            "date": "2026-02-27",
            "entries": [{
                "id": "x",
                "project": "Work",
                "task": null,
                "comment": null,
                "tags": null,
                "start": "2026-02-27T09:00:00Z",
                "end": null,
                "duration_seconds": null,
                "source": "manual"
            }]
        }"#;
        let day: DayFile = serde_json::from_str(json).unwrap();
        assert_eq!(day.date, NaiveDate::from_ymd_opt(2026, 2, 27).unwrap());
        assert!(day.entries[0].tags.is_empty());
        assert!(day.entries[0].is_active());
    }

    #[test]
    fn test_close_at_sets_duration() {
        let mut entry = Entry::start_manual("Work", ts("2026-02-27T09:00:00Z"));
        entry.close_at(ts("2026-02-27T10:30:00Z"));
        assert_eq!(entry.duration_seconds, Some(5400));
        assert!(!entry.is_active());
    }

    #[test]
    fn test_whole_seconds_rounds_down() {
        assert_eq!(whole_seconds(Duration::milliseconds(5_400_999)), 5400);
        assert_eq!(whole_seconds(Duration::milliseconds(-1_500)), -2);
        assert_eq!(whole_seconds(Duration::zero()), 0);
    }

    #[test]
    fn test_append_comment() {
        let mut entry = Entry::start_manual("Work", ts("2026-02-27T09:00:00Z"));
        entry.append_comment("");
        assert_eq!(entry.comment, None);
        entry.append_comment("first");
        entry.append_comment("second");
        assert_eq!(entry.comment.as_deref(), Some("first\nsecond"));
    }

    #[test]
    fn test_day_upsert_replaces_by_id() {
        let mut day = DayFile::empty(NaiveDate::from_ymd_opt(2026, 2, 27).unwrap());
        let mut entry = Entry::start_manual("Work", ts("2026-02-27T09:00:00Z"));
        assert!(!day.upsert(entry.clone()));
        entry.project = "Other".to_string();
        assert!(day.upsert(entry));
        assert_eq!(day.entries.len(), 1);
        assert_eq!(day.entries[0].project, "Other");
    }

    #[test]
    fn test_day_boundaries_keep_offset() {
        let at = ts("2026-02-27T15:42:10.250+02:00");
        assert_eq!(start_of_day(at), ts("2026-02-27T00:00:00+02:00"));
        assert_eq!(end_of_day(at), ts("2026-02-27T23:59:59+02:00"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(6000), "1h 40m");
        assert_eq!(format_duration(2700), "45m");
        assert_eq!(format_duration(30), "30s");
        assert_eq!(format_duration(3600), "1h 0m");
    }
}
