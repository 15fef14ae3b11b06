//! Entry Store - Day-partitioned JSON persistence for time entries
//!
//! Every calendar day lives in its own file at `<base>/YYYY/MM/DD.json`
//! holding a [`DayFile`]. Writes replace the whole file atomically; there is
//! no locking, so callers must not run two writers against the same day.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{Days, Local, NaiveDate};
use tracing::{debug, warn};

use crate::atomic::write_atomic;
use crate::error::StoreError;
use crate::model::{DayFile, Entry};

/// Default number of days (today included) searched for a running timer
pub const DEFAULT_ACTIVE_SCAN_DAYS: u32 = 7;

/// A running timer together with the day file it lives in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveEntry {
    pub date: NaiveDate,
    pub entry: Entry,
}

/// Day-partitioned store rooted at a base directory
#[derive(Debug, Clone)]
pub struct EntryStore {
    base_dir: PathBuf,
    active_scan_days: u32,
}

impl EntryStore {
    /// Create a store rooted at `base_dir` with the default active-timer window
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            active_scan_days: DEFAULT_ACTIVE_SCAN_DAYS,
        }
    }

    /// Override how many days `find_active_entry` looks back (minimum 1)
    pub fn with_active_scan_days(mut self, days: u32) -> Self {
        self.active_scan_days = days.max(1);
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn active_scan_days(&self) -> u32 {
        self.active_scan_days
    }

    /// Location of the file for `date`
    pub fn day_path(&self, date: NaiveDate) -> PathBuf {
        self.base_dir
            .join(date.format("%Y").to_string())
            .join(date.format("%m").to_string())
            .join(format!("{}.json", date.format("%d")))
    }

    /// Load the entries for `date`, or an empty day if no file exists.
    ///
    /// A file that does not parse is moved aside to `*.corrupt` (or
    /// `*.corrupt.N` if that name is taken) before the error is returned.
    pub fn load_day(&self, date: NaiveDate) -> Result<DayFile, StoreError> {
        match self.peek_day(date) {
            Err(StoreError::Unparsable { path, source }) => {
                let backup = quarantine(&path)?;
                warn!(
                    "Corrupt day file {} moved to {}: {}",
                    path.display(),
                    backup.display(),
                    source
                );
                Err(StoreError::Corruption {
                    path,
                    backup,
                    source,
                })
            }
            other => other,
        }
    }

    /// Like [`EntryStore::load_day`], but never touches the filesystem.
    /// A corrupt file stays where it is and is reported as `Unparsable`.
    pub fn peek_day(&self, date: NaiveDate) -> Result<DayFile, StoreError> {
        let path = self.day_path(date);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No day file for {}, starting empty", date);
                return Ok(DayFile::empty(date));
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        };

        serde_json::from_slice::<DayFile>(&data)
            .map_err(|source| StoreError::Unparsable { path, source })
    }

    /// Write `day` as the file for `date`, replacing it atomically
    pub fn save_day(&self, date: NaiveDate, day: &DayFile) -> Result<(), StoreError> {
        let path = self.day_path(date);

        let relabelled;
        let day = if day.date == date {
            day
        } else {
            warn!(
                "Day file labelled {} saved under {}, correcting label",
                day.date, date
            );
            relabelled = DayFile {
                date,
                entries: day.entries.clone(),
            };
            &relabelled
        };

        let mut bytes = serde_json::to_vec_pretty(day).map_err(|source| StoreError::Serialize {
            path: path.clone(),
            source,
        })?;
        bytes.push(b'\n');

        write_atomic(&path, &bytes)?;
        debug!("Saved {} entries for {}", day.entries.len(), date);
        Ok(())
    }

    /// Replace the entry with the same id on `date`, or append it
    pub fn upsert_entry(&self, date: NaiveDate, entry: Entry) -> Result<(), StoreError> {
        let mut day = self.load_day(date)?;
        let id = entry.id.clone();
        let replaced = day.upsert(entry);
        self.save_day(date, &day)?;
        debug!(
            "{} entry {} on {}",
            if replaced { "Replaced" } else { "Appended" },
            id,
            date
        );
        Ok(())
    }

    /// All entries from `from` to `to` inclusive, in day order
    pub fn load_range(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<Entry>, StoreError> {
        let mut entries = Vec::new();
        for date in from.iter_days().take_while(|d| *d <= to) {
            entries.extend(self.load_day(date)?.entries);
        }
        Ok(entries)
    }

    /// Find the running timer, looking back from today
    pub fn find_active_entry(&self) -> Result<Option<ActiveEntry>, StoreError> {
        self.find_active_entry_from(Local::now().date_naive())
    }

    /// Find the running timer in the window ending at `today`.
    ///
    /// Days are searched most recent first and each day from its last entry
    /// backwards. Timers older than the window are not found.
    pub fn find_active_entry_from(
        &self,
        today: NaiveDate,
    ) -> Result<Option<ActiveEntry>, StoreError> {
        for offset in 0..u64::from(self.active_scan_days) {
            let Some(date) = today.checked_sub_days(Days::new(offset)) else {
                break;
            };
            let day = self.load_day(date)?;
            if let Some(entry) = day.entries.into_iter().rev().find(Entry::is_active) {
                debug!("Active entry {} found on {}", entry.id, date);
                return Ok(Some(ActiveEntry { date, entry }));
            }
        }
        Ok(None)
    }
}

/// Move an unreadable file to a free `.corrupt` sibling name
fn quarantine(path: &Path) -> Result<PathBuf, StoreError> {
    let base = format!("{}.corrupt", path.display());
    let mut backup = PathBuf::from(&base);
    let mut n = 1;
    while backup.exists() {
        backup = PathBuf::from(format!("{}.{}", base, n));
        n += 1;
    }
    fs::rename(path, &backup).map_err(|e| StoreError::io(path, e))?;
    Ok(backup)
}
