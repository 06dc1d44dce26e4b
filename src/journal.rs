use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{error, warn};

use crate::model::Event;

/// Append-only booking journal, written one batch at a time.
///
/// Entry layout: `[u32 le: len][bincode: Event][u32 le: crc32(payload)]`.
///
/// The file never holds more than the acknowledged batches. A batch whose
/// write or fsync fails is cut back off the file before the error is
/// returned, and a damaged tail found at open is truncated away so later
/// batches stay reachable by replay.
pub struct Journal {
    file: File,
    path: PathBuf,
    /// Length of the prefix made of whole, acknowledged entries.
    committed_len: u64,
    appends_since_compact: u64,
    /// A failed batch could not be cut off; refuse to acknowledge anything after it.
    wedged: bool,
    #[cfg(test)]
    fail_next_commit: bool,
}

fn encode_entry(out: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    out.write_all(&(payload.len() as u32).to_le_bytes())?;
    out.write_all(&payload)?;
    out.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Fill `buf` completely. `Ok(false)` means the file ended first.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Next intact entry and its encoded size, or `None` at end of file or at
/// the first damaged entry.
fn read_entry(reader: &mut impl Read) -> io::Result<Option<(Event, u64)>> {
    let mut word = [0u8; 4];
    if !read_full(reader, &mut word)? {
        return Ok(None);
    }
    let mut payload = vec![0u8; u32::from_le_bytes(word) as usize];
    if !read_full(reader, &mut payload)? || !read_full(reader, &mut word)? {
        return Ok(None);
    }
    if u32::from_le_bytes(word) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    Ok(bincode::deserialize::<Event>(&payload)
        .ok()
        .map(|event| (event, payload.len() as u64 + 8)))
}

/// Intact events on disk plus the byte length they span.
fn scan(path: &Path) -> io::Result<(Vec<Event>, u64)> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e),
    };
    let mut reader = BufReader::new(file);
    let mut events = Vec::new();
    let mut good_len = 0u64;
    while let Some((event, size)) = read_entry(&mut reader)? {
        events.push(event);
        good_len += size;
    }
    Ok((events, good_len))
}

fn open_for_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

impl Journal {
    /// Open the journal at `path`, returning it with every intact event.
    /// Bytes past the last intact entry are truncated.
    pub fn open(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let (events, good_len) = scan(path)?;
        let file = open_for_append(path)?;
        let on_disk = file.metadata()?.len();
        if on_disk > good_len {
            warn!(
                "journal {}: dropping {} damaged trailing bytes",
                path.display(),
                on_disk - good_len
            );
            file.set_len(good_len)?;
            file.sync_all()?;
        }
        let journal = Self {
            file,
            path: path.to_path_buf(),
            committed_len: good_len,
            appends_since_compact: 0,
            wedged: false,
            #[cfg(test)]
            fail_next_commit: false,
        };
        Ok((journal, events))
    }

    /// Intact events on disk, oldest first. A missing file is empty.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        scan(path).map(|(events, _)| events)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Durably append `events` as one unit: either all of them are on disk
    /// and fsynced, or none of them are.
    pub fn commit(&mut self, events: &[Event]) -> io::Result<()> {
        if self.wedged {
            return Err(io::Error::other("journal refused write after failed rollback"));
        }
        let mut batch = Vec::new();
        for event in events {
            encode_entry(&mut batch, event)?;
        }
        match self.write_batch(&batch) {
            Ok(()) => {
                self.committed_len += batch.len() as u64;
                self.appends_since_compact += events.len() as u64;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = self.rollback() {
                    error!("journal {}: rollback failed: {rollback}", self.path.display());
                    self.wedged = true;
                }
                Err(e)
            }
        }
    }

    fn write_batch(&mut self, batch: &[u8]) -> io::Result<()> {
        self.file.write_all(batch)?;
        if self.take_injected_failure() {
            return Err(io::Error::other("injected journal failure"));
        }
        self.file.sync_data()
    }

    #[cfg(test)]
    fn take_injected_failure(&mut self) -> bool {
        std::mem::take(&mut self.fail_next_commit)
    }

    #[cfg(not(test))]
    fn take_injected_failure(&mut self) -> bool {
        false
    }

    /// Cut the file back to the acknowledged prefix and start from a fresh handle.
    fn rollback(&mut self) -> io::Result<()> {
        self.file.set_len(self.committed_len)?;
        self.file.sync_all()?;
        self.file = open_for_append(&self.path)?;
        Ok(())
    }

    /// Fail the next `commit` after its bytes reach the file.
    #[cfg(test)]
    pub(crate) fn fail_next_commit(&mut self) {
        self.fail_next_commit = true;
    }

    fn snapshot_path(path: &Path) -> PathBuf {
        path.with_extension("journal.tmp")
    }

    /// Write a snapshot next to the journal at `path` and fsync it.
    pub fn write_snapshot(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(Self::snapshot_path(path))?);
        for event in events {
            encode_entry(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the snapshot over the journal and continue appending to it.
    pub fn install_snapshot(&mut self) -> io::Result<()> {
        fs::rename(Self::snapshot_path(&self.path), &self.path)?;
        self.file = open_for_append(&self.path)?;
        self.committed_len = self.file.metadata()?.len();
        self.appends_since_compact = 0;
        self.wedged = false;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_snapshot(&self.path, events)?;
        self.install_snapshot()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;
    use ulid::Ulid;

    use super::*;
    use crate::model::*;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("farmstay_test_journal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn created(listing_id: Ulid) -> Event {
        let now = Utc::now();
        Event::BookingCreated {
            booking: Booking {
                id: Ulid::new(),
                listing_id,
                traveler_id: Ulid::new(),
                range: StayRange::new(
                    NaiveDate::from_ymd_opt(2025, 3, 10).unwrap(),
                    NaiveDate::from_ymd_opt(2025, 3, 12).unwrap(),
                ),
                guests: 4,
                total_price: Decimal::new(5000_50, 2),
                status: BookingStatus::Pending,
                payment_status: PaymentStatus::Pending,
                special_requests: Some("late arrival".into()),
                created_at: now,
                updated_at: now,
            },
        }
    }

    fn changed(event: &Event, status: BookingStatus) -> Event {
        let Event::BookingCreated { booking } = event else {
            panic!("expected BookingCreated");
        };
        Event::BookingStatusChanged {
            id: booking.id,
            listing_id: booking.listing_id,
            status,
            at: Utc::now(),
        }
    }

    #[test]
    fn commit_and_reopen() {
        let path = tmp_path("commit_and_reopen.journal");
        let first = created(Ulid::new());
        let events = vec![first.clone(), changed(&first, BookingStatus::Confirmed)];

        {
            let (mut journal, replayed) = Journal::open(&path).unwrap();
            assert!(replayed.is_empty());
            journal.commit(&events[..1]).unwrap();
            journal.commit(&events[1..]).unwrap();
            assert_eq!(journal.appends_since_compact(), 2);
        }

        let (_, replayed) = Journal::open(&path).unwrap();
        assert_eq!(replayed, events);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_missing_file_is_empty() {
        let path = tmp_path("missing.journal");
        assert!(Journal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn open_cuts_torn_tail_so_later_commits_replay() {
        let path = tmp_path("torn.journal");
        let event = created(Ulid::new());
        {
            let (mut journal, _) = Journal::open(&path).unwrap();
            journal.commit(std::slice::from_ref(&event)).unwrap();
        }
        let intact_len = fs::metadata(&path).unwrap().len();
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[9u8, 0, 0, 0, 1, 2]).unwrap();
        }

        let next = changed(&event, BookingStatus::Cancelled);
        {
            let (mut journal, replayed) = Journal::open(&path).unwrap();
            assert_eq!(replayed, vec![event.clone()]);
            assert_eq!(fs::metadata(&path).unwrap().len(), intact_len);
            journal.commit(std::slice::from_ref(&next)).unwrap();
        }

        assert_eq!(Journal::replay(&path).unwrap(), vec![event, next]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_rejects_bad_crc() {
        let path = tmp_path("bad_crc.journal");
        let payload = bincode::serialize(&created(Ulid::new())).unwrap();
        {
            let mut f = File::create(&path).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&0xDEAD_BEEFu32.to_le_bytes()).unwrap();
        }

        assert!(Journal::replay(&path).unwrap().is_empty());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn failed_commit_leaves_nothing_behind() {
        let path = tmp_path("failed_commit.journal");
        let kept = created(Ulid::new());
        let lost = created(Ulid::new());
        let after = created(Ulid::new());

        let (mut journal, _) = Journal::open(&path).unwrap();
        journal.commit(std::slice::from_ref(&kept)).unwrap();
        let len_before = fs::metadata(&path).unwrap().len();

        journal.fail_next_commit();
        assert!(journal.commit(&[lost.clone(), changed(&lost, BookingStatus::Confirmed)]).is_err());
        assert_eq!(fs::metadata(&path).unwrap().len(), len_before);
        assert_eq!(journal.appends_since_compact(), 1);

        // The next batch must not carry the failed one's bytes along.
        journal.commit(std::slice::from_ref(&after)).unwrap();
        drop(journal);

        let replayed = Journal::replay(&path).unwrap();
        assert_eq!(replayed, vec![kept, after]);
        assert!(!replayed.contains(&lost));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn compact_shrinks_and_keeps_appending() {
        let path = tmp_path("compact.journal");
        let listing = Ulid::new();
        let keep = created(listing);

        let (mut journal, _) = Journal::open(&path).unwrap();
        journal.commit(std::slice::from_ref(&keep)).unwrap();
        for _ in 0..10 {
            let churn = created(listing);
            let cancelled = changed(&churn, BookingStatus::Cancelled);
            journal.commit(&[churn, cancelled]).unwrap();
        }
        assert_eq!(journal.appends_since_compact(), 21);
        let before = fs::metadata(&path).unwrap().len();

        journal.compact(std::slice::from_ref(&keep)).unwrap();
        assert_eq!(journal.appends_since_compact(), 0);
        let after = fs::metadata(&path).unwrap().len();
        assert!(after < before, "compacted journal should be smaller: {after} < {before}");

        let next = changed(&keep, BookingStatus::Confirmed);
        journal.commit(std::slice::from_ref(&next)).unwrap();
        drop(journal);

        assert_eq!(Journal::replay(&path).unwrap(), vec![keep, next]);
        let _ = fs::remove_file(&path);
    }
}
