//! Flat-file CSV event store.
//!
//! The first line of the file is the header row. Each batch is encoded in
//! memory and written with a single `write_all`; on failure the file is
//! truncated back to its previous length so a batch is never half-present.

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::{EventIter, EventStore, StoredRecord, HEADER};
use crate::collector::types::RawEvent;
use crate::error::PersistenceError;

/// CSV-backed [`EventStore`].
#[derive(Debug)]
pub struct CsvStore {
    path: PathBuf,
    /// Serializes appends so the length recorded for rollback stays valid.
    write_lock: Mutex<()>,
}

impl CsvStore {
    /// Open (or create) the log file at `path`.
    ///
    /// A missing or empty file gets the header row. A file whose last record
    /// was cut short gets a line break so the next batch starts on a new line.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;

        let len = file.metadata()?.len();
        if len == 0 {
            file.write_all(&header_bytes()?)?;
            file.sync_data()?;
        } else if !ends_with_newline(&mut file, len)? {
            warn!("Log file {:?} ends mid-record, terminating the partial line", path);
            file.write_all(b"\n")?;
            file.sync_data()?;
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventStore for CsvStore {
    fn append(&self, batch: &[RawEvent]) -> Result<(), PersistenceError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        for event in batch {
            writer.serialize(StoredRecord::from(event))?;
        }
        let encoded = writer.into_inner().map_err(|e| e.into_error())?;

        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;
        let start = file.metadata()?.len();

        let result = if start == 0 {
            // The file was removed underneath us; start it over with a header.
            header_bytes().and_then(|header| file.write_all(&header))
        } else {
            Ok(())
        }
        .and_then(|()| file.write_all(&encoded))
        .and_then(|()| file.sync_data());

        if let Err(e) = result {
            if let Err(truncate_err) = file.set_len(start) {
                warn!("Could not roll back partial batch: {}", truncate_err);
            }
            return Err(e.into());
        }

        debug!("Appended {} events to {:?}", batch.len(), self.path);
        Ok(())
    }

    fn scan(&self, since: Option<f64>) -> Result<EventIter<'_>, PersistenceError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Box::new(std::iter::empty()))
            }
            Err(e) => return Err(e.into()),
        };

        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(BufReader::new(file));

        Ok(Box::new(ScanIter {
            records: reader.into_deserialize(),
            since,
            skipped: 0,
            finished: false,
        }))
    }

    fn size_bytes(&self) -> Result<u64, PersistenceError> {
        Ok(std::fs::metadata(&self.path)?.len())
    }

    fn created_at(&self) -> Result<DateTime<Local>, PersistenceError> {
        let metadata = std::fs::metadata(&self.path)?;
        // Not every filesystem records a birth time.
        let created = metadata.created().or_else(|_| metadata.modified())?;
        Ok(DateTime::<Local>::from(created))
    }
}

fn header_bytes() -> io::Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(HEADER)?;
    writer.into_inner().map_err(|e| e.into_error())
}

fn ends_with_newline(file: &mut File, len: u64) -> io::Result<bool> {
    if len == 0 {
        return Ok(true);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Decodes rows lazily, skipping anything that does not parse.
struct ScanIter<R: Read> {
    records: csv::DeserializeRecordsIntoIter<R, StoredRecord>,
    since: Option<f64>,
    skipped: u64,
    finished: bool,
}

impl<R: Read> ScanIter<R> {
    fn finish(&mut self) {
        if !self.finished && self.skipped > 0 {
            warn!("Skipped {} unreadable records while scanning", self.skipped);
        }
        self.finished = true;
    }
}

impl<R: Read> Iterator for ScanIter<R> {
    type Item = RawEvent;

    fn next(&mut self) -> Option<RawEvent> {
        if self.finished {
            return None;
        }

        loop {
            let record = match self.records.next() {
                Some(Ok(record)) => record,
                Some(Err(e)) if e.is_io_error() => {
                    warn!("Stopping scan after read error: {}", e);
                    self.finish();
                    return None;
                }
                Some(Err(e)) => {
                    debug!("Skipping malformed record: {}", e);
                    self.skipped += 1;
                    continue;
                }
                None => {
                    self.finish();
                    return None;
                }
            };

            match RawEvent::try_from(record) {
                Ok(event) if self.since.map_or(true, |cutoff| event.timestamp >= cutoff) => {
                    return Some(event)
                }
                Ok(_) => continue,
                Err(e) => {
                    debug!("Skipping undecodable record: {}", e);
                    self.skipped += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::types::{EventTag, PointerButton, Position};
    use tempfile::tempdir;

    fn sample_batch() -> Vec<RawEvent> {
        vec![
            RawEvent::moved(10.0, Position::new(100.0, 0.0), 1.25),
            RawEvent::click(11.0, PointerButton::Left, Position::new(100.0, 0.0), true),
            RawEvent::click(11.1, PointerButton::Left, Position::new(100.0, 0.0), false),
            RawEvent::key(12.0, true),
        ]
    }

    #[test]
    fn test_open_writes_header_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("log.csv");

        CsvStore::open(&path).unwrap();
        CsvStore::open(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "timestamp,event,button,position,distance_in_inches\n");
    }

    #[test]
    fn test_append_and_scan() {
        let dir = tempdir().unwrap();
        let store = CsvStore::open(dir.path().join("log.csv")).unwrap();

        store.append(&sample_batch()).unwrap();
        let events: Vec<RawEvent> = store.scan(None).unwrap().collect();
        assert_eq!(events, sample_batch());

        let content = std::fs::read_to_string(store.path()).unwrap();
        assert!(content.contains(",Moved,,\"(100, 0)\",1.25"));
        assert!(content.contains("Key Pressed"));
    }

    #[test]
    fn test_scan_since_cutoff() {
        let dir = tempdir().unwrap();
        let store = CsvStore::open(dir.path().join("log.csv")).unwrap();
        store.append(&sample_batch()).unwrap();

        let tags: Vec<EventTag> = store.scan(Some(11.0)).unwrap().map(|e| e.tag()).collect();
        assert_eq!(tags, vec![EventTag::Pressed, EventTag::Released, EventTag::KeyPressed]);
    }

    #[test]
    fn test_scan_skips_corrupt_and_truncated_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        std::fs::write(
            &path,
            "timestamp,event,button,position,distance_in_inches\n\
             1.0,Pressed,Button.left,\"(5, 5)\",\n\
             not-a-number,Moved,,\"(1, 1)\",0.5\n\
             2.0,Exploded,,,\n\
             3.0,Key Pressed,,,\n\
             4.0,Mov",
        )
        .unwrap();

        let store = CsvStore {
            path: path.clone(),
            write_lock: Mutex::new(()),
        };
        let tags: Vec<EventTag> = store.scan(None).unwrap().map(|e| e.tag()).collect();
        assert_eq!(tags, vec![EventTag::Pressed, EventTag::KeyPressed]);
    }

    #[test]
    fn test_scan_keeps_rows_with_foreign_button_names() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        std::fs::write(
            &path,
            "timestamp,event,button,position,distance_in_inches\n\
             1.0,Gamepad Pressed,BTN_SOUTH,,\n\
             2.0,Gamepad Pressed,A,,\n\
             3.0,Gamepad Pressed,south,,\n\
             4.0,Gamepad Released,south,,\n\
             5.0,Pressed,Button.unknown,\"(5, 5)\",\n",
        )
        .unwrap();

        let store = CsvStore::open(&path).unwrap();
        let tags: Vec<EventTag> = store.scan(None).unwrap().map(|e| e.tag()).collect();
        assert_eq!(
            tags,
            vec![
                EventTag::GamepadPressed,
                EventTag::GamepadPressed,
                EventTag::GamepadPressed,
                EventTag::GamepadReleased,
                EventTag::Pressed,
            ]
        );

        let snapshot = crate::AggregateSnapshot::from_events(
            store.scan(None).unwrap(),
            None,
            chrono::Local::now(),
        );
        assert_eq!(snapshot.gamepad_actions(), 3);
        assert_eq!(snapshot.clicks(PointerButton::Left), 0);
        assert_eq!(snapshot.clicks(PointerButton::Unknown), 1);
    }

    #[test]
    fn test_open_terminates_partial_line() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        std::fs::write(
            &path,
            "timestamp,event,button,position,distance_in_inches\n3.0,Key Pressed,,,\n4.0,Mov",
        )
        .unwrap();

        let store = CsvStore::open(&path).unwrap();
        store.append(&[RawEvent::key(5.0, false)]).unwrap();

        let timestamps: Vec<f64> = store.scan(None).unwrap().map(|e| e.timestamp).collect();
        assert_eq!(timestamps, vec![3.0, 5.0]);
    }

    #[test]
    fn test_scan_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = CsvStore::open(dir.path().join("log.csv")).unwrap();
        std::fs::remove_file(store.path()).unwrap();

        assert_eq!(store.scan(None).unwrap().count(), 0);

        // Appending recreates the file with its header.
        store.append(&[RawEvent::key(1.0, true)]).unwrap();
        let content = std::fs::read_to_string(store.path()).unwrap();
        assert!(content.starts_with("timestamp,event"));
        assert_eq!(store.scan(None).unwrap().count(), 1);
    }

    #[test]
    fn test_size_and_created_at() {
        let dir = tempdir().unwrap();
        let store = CsvStore::open(dir.path().join("log.csv")).unwrap();
        let before = store.size_bytes().unwrap();
        store.append(&sample_batch()).unwrap();
        assert!(store.size_bytes().unwrap() > before);
        assert!(store.created_at().unwrap() <= Local::now());
    }
}
