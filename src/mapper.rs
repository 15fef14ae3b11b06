//! Event classification and conversion into entries
//!
//! Pure functions: nothing here touches the store or the network.

use chrono::{DateTime, Duration, FixedOffset, LocalResult, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use tracing::debug;

use crate::calendar::RemoteEvent;
use crate::error::MappingError;
use crate::model::{generate_id, whole_seconds, Entry, Source, OUTLOOK_TAG};

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"];

/// Whether `event` should become an entry.
///
/// Cancelled, all-day, private and free events are never imported, nor are
/// events missing an id or a start or end time.
pub fn should_import(event: &RemoteEvent) -> bool {
    !(event.id.is_empty()
        || event.is_cancelled
        || event.is_all_day
        || event.sensitivity.eq_ignore_ascii_case("private")
        || event.show_as.eq_ignore_ascii_case("free")
        || event.start.date_time.is_empty()
        || event.end.date_time.is_empty())
}

/// Parse a Graph timestamp.
///
/// Values carrying an offset are taken as-is. Zone-less values such as
/// `2026-02-27T09:00:00.0000000` are read in `timezone`, or UTC when the
/// zone is empty or unknown.
pub fn parse_remote_time(value: &str, timezone: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt);
    }

    let naive = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())?;

    match resolve_zone(timezone) {
        Some(tz) => localize(&tz, naive),
        None => Some(naive.and_utc().fixed_offset()),
    }
}

fn resolve_zone(timezone: &str) -> Option<Tz> {
    if timezone.is_empty() {
        return None;
    }
    match timezone.parse::<Tz>() {
        Ok(tz) => Some(tz),
        Err(_) => {
            debug!("Unknown timezone {:?}, reading times as UTC", timezone);
            None
        }
    }
}

fn localize(tz: &Tz, naive: NaiveDateTime) -> Option<DateTime<FixedOffset>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.fixed_offset()),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.fixed_offset()),
        // Wall time skipped by a DST jump: move past the gap.
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.fixed_offset()),
    }
}

/// Preview text and location name, newline-joined; `None` when both are empty
pub fn build_comment(event: &RemoteEvent) -> Option<String> {
    let parts: Vec<&str> = [
        event.body_preview.as_str(),
        event.location.display_name.as_str(),
    ]
    .into_iter()
    .filter(|part| !part.is_empty())
    .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

/// Convert an event into a closed `outlook` entry under `project`
pub fn map_to_entry(
    event: &RemoteEvent,
    timezone: &str,
    project: &str,
) -> Result<Entry, MappingError> {
    let start = parse_remote_time(&event.start.date_time, timezone).ok_or_else(|| {
        MappingError::MalformedTimestamp {
            field: "start",
            value: event.start.date_time.clone(),
        }
    })?;
    let end = parse_remote_time(&event.end.date_time, timezone).ok_or_else(|| {
        MappingError::MalformedTimestamp {
            field: "end",
            value: event.end.date_time.clone(),
        }
    })?;

    Ok(Entry {
        id: generate_id(&start),
        external_id: Some(event.id.clone()),
        project: project.to_string(),
        task: Some(event.subject.clone()),
        comment: build_comment(event),
        tags: vec![OUTLOOK_TAG.to_string()],
        start,
        end: Some(end),
        duration_seconds: Some(whole_seconds(end - start)),
        source: Source::Outlook,
    })
}
