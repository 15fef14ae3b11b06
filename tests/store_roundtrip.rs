//! Property tests for the day file format

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone};
use daybook::{DayFile, Entry, EntryStore, Source};
use quickcheck::{Arbitrary, Gen};
use quickcheck_macros::quickcheck;
use tempfile::TempDir;

/// An entry starting somewhere on 2026-02-27 in an arbitrary offset
#[derive(Debug, Clone)]
struct ArbEntry(Entry);

fn opt_text(g: &mut Gen) -> Option<String> {
    if bool::arbitrary(g) {
        Some(String::arbitrary(g))
    } else {
        None
    }
}

impl Arbitrary for ArbEntry {
    fn arbitrary(g: &mut Gen) -> Self {
        let offset_hours = i32::from(u8::arbitrary(g) % 25) - 12;
        let offset = FixedOffset::east_opt(offset_hours * 3600).unwrap();
        let second_of_day = u32::arbitrary(g) % 86_400;
        let start: DateTime<FixedOffset> = offset
            .from_local_datetime(
                &NaiveDate::from_ymd_opt(2026, 2, 27)
                    .unwrap()
                    .and_hms_opt(second_of_day / 3600, (second_of_day / 60) % 60, second_of_day % 60)
                    .unwrap(),
            )
            .unwrap();

        let source = match u8::arbitrary(g) % 3 {
            0 => Source::Manual,
            1 => Source::Outlook,
            _ => Source::Other("import".to_string()),
        };

        let mut entry = Entry::start_manual(String::arbitrary(g), start);
        entry.source = source;
        entry.task = opt_text(g);
        entry.comment = opt_text(g);
        entry.tags = Vec::<String>::arbitrary(g);
        entry.external_id = opt_text(g);
        if bool::arbitrary(g) {
            let remaining = 86_399 - i64::from(second_of_day);
            entry.close_at(start + Duration::seconds(i64::from(u32::arbitrary(g)) % (remaining + 1)));
        }
        ArbEntry(entry)
    }
}

#[quickcheck]
fn prop_save_then_load_reproduces_entries(entries: Vec<ArbEntry>) -> bool {
    let temp_dir = TempDir::new().unwrap();
    let store = EntryStore::new(temp_dir.path());
    let date = NaiveDate::from_ymd_opt(2026, 2, 27).unwrap();

    let mut day = DayFile::empty(date);
    for (i, ArbEntry(mut entry)) in entries.into_iter().enumerate() {
        entry.id = format!("{}-{}", entry.id, i);
        day.entries.push(entry);
    }

    store.save_day(date, &day).unwrap();
    let first_bytes = std::fs::read(store.day_path(date)).unwrap();
    let loaded = store.load_day(date).unwrap();
    store.save_day(date, &loaded).unwrap();
    let second_bytes = std::fs::read(store.day_path(date)).unwrap();

    loaded == day && first_bytes == second_bytes
}
