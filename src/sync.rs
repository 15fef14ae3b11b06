//! Sync Engine - Imports calendar events into the entry store
//!
//! Events are correlated with stored entries solely by `external_id`, so
//! manually tracked entries are never matched or modified. Re-running a sync
//! over an unchanged calendar writes nothing.

use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use tracing::{debug, info, warn};

use crate::auth::AccessTokenProvider;
use crate::calendar::{CalendarFetcher, RemoteEvent};
use crate::error::{self, FetchError};
use crate::mapper::{map_to_entry, should_import};
use crate::model::{format_duration, Entry};
use crate::store::EntryStore;

/// Options for a single sync run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Evaluate everything but write nothing
    pub dry_run: bool,
    /// Project assigned to imported entries
    pub project: String,
    /// IANA zone for zone-less event times; empty means UTC
    pub timezone: String,
}

/// Time window requested from the calendar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl SyncWindow {
    /// From 00:00:00 on `first` to 23:59:59 on `last`, both in `tz`
    pub fn for_days<Tz: TimeZone>(first: NaiveDate, last: NaiveDate, tz: &Tz) -> Self {
        let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
        Self {
            from: local_to_utc(tz, first.and_time(NaiveTime::MIN)),
            to: local_to_utc(tz, last.and_time(end_of_day)),
        }
    }
}

fn local_to_utc<Tz: TimeZone>(tz: &Tz, naive: chrono::NaiveDateTime) -> DateTime<Utc> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

/// What happened to one eligible event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Imported {
        subject: String,
        entry_id: String,
        duration_seconds: Option<i64>,
    },
    Updated {
        subject: String,
        entry_id: String,
        duration_seconds: Option<i64>,
    },
    /// Already stored with the same task, start and end
    Unchanged { subject: String, entry_id: String },
    Failed { subject: String, error: String },
}

/// Summary of a sync run
#[derive(Debug, Clone)]
pub struct SyncSummary {
    pub imported: usize,
    pub skipped: usize,
    pub updated: usize,
    pub errors: usize,
    pub dry_run: bool,
    pub duration: Duration,
    pub results: Vec<EventOutcome>,
}

impl SyncSummary {
    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }
}

/// Merges remote events into an [`EntryStore`]
pub struct SyncEngine {
    store: EntryStore,
}

impl SyncEngine {
    pub fn new(store: EntryStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &EntryStore {
        &self.store
    }

    /// Fetch the window from the calendar and merge the result.
    ///
    /// Authentication and fetch failures abort before anything is written.
    pub async fn run<A: AccessTokenProvider>(
        &self,
        fetcher: &mut CalendarFetcher<A>,
        window: SyncWindow,
        options: &SyncOptions,
    ) -> Result<SyncSummary, FetchError> {
        info!(
            "Syncing calendar from {} to {}{}",
            window.from,
            window.to,
            if options.dry_run { " [dry-run]" } else { "" }
        );
        let events = fetcher
            .get_events(window.from, window.to, &options.timezone)
            .await?;
        Ok(self.sync(&events, options))
    }

    /// Merge already fetched events
    pub fn sync(&self, events: &[RemoteEvent], options: &SyncOptions) -> SyncSummary {
        let started = Instant::now();
        let mut results = Vec::new();

        for event in events {
            if !should_import(event) {
                debug!("Filtered out event {:?} ({})", event.subject, event.id);
                continue;
            }
            results.push(self.sync_event(event, options));
        }

        let summary = compile_summary(results, options.dry_run, started.elapsed());
        info!(
            "Sync finished: {} imported, {} updated, {} skipped, {} errors",
            summary.imported, summary.updated, summary.skipped, summary.errors
        );
        summary
    }

    fn sync_event(&self, event: &RemoteEvent, options: &SyncOptions) -> EventOutcome {
        match self.apply_event(event, options) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Could not sync event {:?}: {}", event.subject, e);
                EventOutcome::Failed {
                    subject: event.subject.clone(),
                    error: e.to_string(),
                }
            }
        }
    }

    fn apply_event(
        &self,
        event: &RemoteEvent,
        options: &SyncOptions,
    ) -> error::Result<EventOutcome> {
        let subject = event.subject.clone();
        let mut candidate = map_to_entry(event, &options.timezone, &options.project)?;
        let date = candidate.day();

        // Dry runs read without quarantining corrupt files.
        let day = if options.dry_run {
            self.store.peek_day(date)?
        } else {
            self.store.load_day(date)?
        };

        let existing = day.find_by_external_id(&event.id);
        if let Some(existing) = existing {
            if is_unchanged(existing, &candidate) {
                debug!("Unchanged: {:?}", subject);
                return Ok(EventOutcome::Unchanged {
                    subject,
                    entry_id: existing.id.clone(),
                });
            }
            candidate.id = existing.id.clone();
        }
        let is_update = existing.is_some();

        if !options.dry_run {
            self.store.upsert_entry(date, candidate.clone())?;
        }

        let duration = candidate
            .duration_seconds
            .map(format_duration)
            .unwrap_or_default();
        if is_update {
            info!("Updated: {} ({})", subject, duration);
            Ok(EventOutcome::Updated {
                subject,
                entry_id: candidate.id,
                duration_seconds: candidate.duration_seconds,
            })
        } else {
            info!("Imported: {} ({})", subject, duration);
            Ok(EventOutcome::Imported {
                subject,
                entry_id: candidate.id,
                duration_seconds: candidate.duration_seconds,
            })
        }
    }
}

/// Only task, start and end decide whether a stored import is stale
fn is_unchanged(existing: &Entry, candidate: &Entry) -> bool {
    existing.task == candidate.task
        && existing.start == candidate.start
        && existing.end == candidate.end
}

fn compile_summary(results: Vec<EventOutcome>, dry_run: bool, duration: Duration) -> SyncSummary {
    let mut imported = 0;
    let mut skipped = 0;
    let mut updated = 0;
    let mut errors = 0;

    for result in &results {
        match result {
            EventOutcome::Imported { .. } => imported += 1,
            EventOutcome::Updated { .. } => updated += 1,
            EventOutcome::Unchanged { .. } => skipped += 1,
            EventOutcome::Failed { .. } => errors += 1,
        }
    }

    SyncSummary {
        imported,
        skipped,
        updated,
        errors,
        dry_run,
        duration,
        results,
    }
}
