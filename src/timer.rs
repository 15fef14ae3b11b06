//! Manual start/stop timer
//!
//! At most one entry is open at a time: starting a timer closes any running
//! one first. Stopping a timer that ran past midnight splits it so every
//! piece stays inside its own day file.

use chrono::{DateTime, Days, FixedOffset, NaiveTime, TimeZone};
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::model::{end_of_day, generate_id, whole_seconds, Entry};
use crate::store::{ActiveEntry, EntryStore};

/// Fields supplied when starting a timer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTimer {
    pub project: String,
    pub task: Option<String>,
    pub comment: Option<String>,
    pub tags: Vec<String>,
}

/// A timer that was closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoppedTimer {
    /// The original entry, now closed
    pub entry: Entry,
    /// Pieces written to following days when the timer crossed midnight
    pub continuations: Vec<Entry>,
    /// Start to stop, across all pieces
    pub elapsed_seconds: i64,
}

/// Result of starting a timer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedTimer {
    pub entry: Entry,
    pub auto_stopped: Option<StoppedTimer>,
}

/// Split a comma-separated tag list, dropping blanks
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Start a timer at `now`, auto-stopping any running one
pub fn start_timer(
    store: &EntryStore,
    timer: NewTimer,
    now: DateTime<FixedOffset>,
) -> Result<StartedTimer, StoreError> {
    let auto_stopped = match store.find_active_entry_from(now.date_naive())? {
        Some(active) => {
            warn!(
                "Auto-stopping active timer for project {:?}",
                active.entry.project
            );
            Some(close_active(store, active, now, None)?)
        }
        None => None,
    };

    let mut entry = Entry::start_manual(timer.project, now);
    entry.task = timer.task.filter(|t| !t.is_empty());
    entry.comment = timer.comment.filter(|c| !c.is_empty());
    entry.tags = timer.tags;

    store.upsert_entry(entry.day(), entry.clone())?;
    info!("Started timer {} for project {:?}", entry.id, entry.project);

    Ok(StartedTimer {
        entry,
        auto_stopped,
    })
}

/// Stop the running timer at `now`. Returns `None` when nothing is running.
pub fn stop_timer(
    store: &EntryStore,
    comment: Option<&str>,
    now: DateTime<FixedOffset>,
) -> Result<Option<StoppedTimer>, StoreError> {
    match store.find_active_entry_from(now.date_naive())? {
        Some(active) => close_active(store, active, now, comment).map(Some),
        None => {
            debug!("No active timer to stop");
            Ok(None)
        }
    }
}

fn close_active(
    store: &EntryStore,
    active: ActiveEntry,
    now: DateTime<FixedOffset>,
    comment: Option<&str>,
) -> Result<StoppedTimer, StoreError> {
    let ActiveEntry { date, mut entry } = active;
    if let Some(extra) = comment {
        entry.append_comment(extra);
    }

    // A clock that went backwards closes the timer with zero length.
    let stop = if now < entry.start { entry.start } else { now };
    let elapsed_seconds = whole_seconds(stop - entry.start);

    let (first, continuations) = split_at_midnight(&entry, stop);
    store.upsert_entry(date, first.clone())?;
    for piece in &continuations {
        store.upsert_entry(piece.day(), piece.clone())?;
    }

    if !continuations.is_empty() {
        info!(
            "Timer {} crossed midnight, split into {} entries",
            first.id,
            continuations.len() + 1
        );
    }
    info!("Stopped timer {} after {}s", first.id, elapsed_seconds);

    Ok(StoppedTimer {
        entry: first,
        continuations,
        elapsed_seconds,
    })
}

/// Close `entry` at `stop`, splitting it into one piece per calendar day.
///
/// The first piece ends at 23:59:59 of its start day; each following piece
/// starts at 00:00:00 and ends at 23:59:59, except the last which ends at
/// `stop`. Every day boundary is taken in the offset of `entry.start`, so a
/// UTC offset change while the timer ran cannot make pieces overlap.
pub fn split_at_midnight(entry: &Entry, stop: DateTime<FixedOffset>) -> (Entry, Vec<Entry>) {
    let mut first = entry.clone();
    let offset = *entry.start.offset();
    let start_day = entry.start.date_naive();
    let stop_day = stop.with_timezone(&offset).date_naive();

    if stop_day <= start_day {
        first.close_at(stop);
        return (first, Vec::new());
    }

    first.close_at(end_of_day(entry.start));

    let mut continuations = Vec::new();
    let mut day = start_day;
    while let Some(next) = day.checked_add_days(Days::new(1)) {
        if next > stop_day {
            break;
        }
        day = next;

        let Some(piece_start) = offset
            .from_local_datetime(&day.and_time(NaiveTime::MIN))
            .single()
        else {
            continue;
        };
        let piece_end = if day == stop_day {
            stop
        } else {
            end_of_day(piece_start)
        };

        let mut piece = entry.clone();
        piece.id = generate_id(&piece_start);
        piece.external_id = None;
        piece.start = piece_start;
        piece.close_at(piece_end);
        continuations.push(piece);
    }

    (first, continuations)
}
