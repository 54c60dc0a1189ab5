//! File-backed record store
//!
//! One append-only log per store directory. The full id → location table is
//! rebuilt in memory on open; reads seek straight to the payload.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::config::SyncStrategy;

use super::{RecordId, RecordStore, StoreError, StoreResult};

// =============================================================================
// Format Constants
// =============================================================================

/// Magic bytes identifying a burrowkv record log
const MAGIC: &[u8; 4] = b"BKRS";

/// Current record log format version
const VERSION: u16 = 1;

/// Header size: Magic (4) + Version (2)
const HEADER_SIZE: u64 = 6;

/// Entry header: Op (1) + Id (8) + Len (4) + CRC (4)
const ENTRY_HEADER_SIZE: u64 = 17;

const OP_WRITE: u8 = 1;
const OP_DELETE: u8 = 2;

const LOG_FILENAME: &str = "records.log";
const COMPACT_FILENAME: &str = "records.log.compact";

/// Location of a live record's payload inside the log
#[derive(Debug, Clone, Copy)]
struct Slot {
    offset: u64,
    len: u32,
}

impl Slot {
    fn entry_size(&self) -> u64 {
        ENTRY_HEADER_SIZE + self.len as u64
    }
}

/// Space accounting for a record log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    /// Number of live records
    pub records: usize,

    /// Bytes held by live entries (headers included)
    pub live_bytes: u64,

    /// Bytes held by superseded or deleted entries
    pub dead_bytes: u64,
}

struct Inner {
    /// `None` once the store has been closed
    file: Option<File>,
    table: HashMap<RecordId, Slot>,
    next_id: RecordId,
    end: u64,
    live_bytes: u64,
    dead_bytes: u64,
    unsynced: usize,
}

/// Record store backed by a single append-only log file
///
/// ## Concurrency:
/// - All state sits behind one mutex; reads and appends are short critical
///   sections (a seek plus one read or write)
pub struct FileRecordStore {
    dir: PathBuf,
    sync_strategy: SyncStrategy,
    inner: Mutex<Inner>,
}

impl FileRecordStore {
    /// Open or create the store rooted at `dir`
    ///
    /// On startup:
    /// 1. Create the directory and log file if missing
    /// 2. Validate the header
    /// 3. Replay entries into the location table
    /// 4. Truncate a torn or checksum-failing tail
    pub fn open(dir: &Path, sync_strategy: SyncStrategy) -> StoreResult<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(LOG_FILENAME);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let file_len = file.metadata()?.len();
        let mut inner = Inner {
            file: None,
            table: HashMap::new(),
            next_id: 1,
            end: HEADER_SIZE,
            live_bytes: 0,
            dead_bytes: 0,
            unsynced: 0,
        };

        if file_len == 0 {
            file.write_all(MAGIC)?;
            file.write_all(&VERSION.to_le_bytes())?;
            file.sync_all()?;
        } else {
            replay(&mut file, file_len, &mut inner)?;
            if inner.end < file_len {
                tracing::warn!(
                    "Record log {} has a torn tail: truncating {} bytes at offset {}",
                    path.display(),
                    file_len - inner.end,
                    inner.end
                );
                file.set_len(inner.end)?;
                file.sync_all()?;
            }
        }

        tracing::debug!(
            "Opened record store {} ({} records, next id {})",
            dir.display(),
            inner.table.len(),
            inner.next_id
        );

        inner.file = Some(file);
        Ok(Self {
            dir: dir.to_path_buf(),
            sync_strategy,
            inner: Mutex::new(inner),
        })
    }

    /// Directory this store lives in
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Current space accounting
    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.lock();
        StoreStats {
            records: inner.table.len(),
            live_bytes: inner.live_bytes,
            dead_bytes: inner.dead_bytes,
        }
    }

    /// Rewrite the log keeping only live records
    ///
    /// The only dead entry left behind is a tombstone for the highest id
    /// when that id has been deleted.
    ///
    /// The compacted log is written next to the current one, synced, and
    /// renamed over it, so a crash mid-way leaves the old log intact.
    pub fn compact(&self) -> StoreResult<StoreStats> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let file = inner.file.as_mut().ok_or(StoreError::Closed)?;

        let mut ids: Vec<RecordId> = inner.table.keys().copied().collect();
        ids.sort_unstable();

        let tmp_path = self.dir.join(COMPACT_FILENAME);
        let mut out = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        out.write_all(MAGIC)?;
        out.write_all(&VERSION.to_le_bytes())?;

        let mut table = HashMap::with_capacity(ids.len());
        let mut end = HEADER_SIZE;
        for id in ids {
            let slot = inner.table[&id];
            let payload = read_payload(file, slot)?;
            let entry = encode_entry(OP_WRITE, id, &payload);
            out.write_all(&entry)?;
            table.insert(
                id,
                Slot {
                    offset: end + ENTRY_HEADER_SIZE,
                    len: slot.len,
                },
            );
            end += entry.len() as u64;
        }
        // Ids are never reused: a deleted highest id survives as a tombstone
        // so replay still starts assignment after it
        let mut marker_bytes = 0;
        let highest = inner.next_id - 1;
        if highest > 0 && !inner.table.contains_key(&highest) {
            let marker = encode_entry(OP_DELETE, highest, &[]);
            out.write_all(&marker)?;
            marker_bytes = marker.len() as u64;
            end += marker_bytes;
        }
        out.sync_all()?;
        drop(out);

        let path = self.dir.join(LOG_FILENAME);
        fs::rename(&tmp_path, &path)?;
        let reopened = OpenOptions::new().read(true).write(true).open(&path)?;

        let reclaimed = inner.dead_bytes.saturating_sub(marker_bytes);
        inner.file = Some(reopened);
        inner.table = table;
        inner.end = end;
        inner.live_bytes = end - HEADER_SIZE - marker_bytes;
        inner.dead_bytes = marker_bytes;
        inner.unsynced = 0;

        tracing::info!(
            "Compacted record store {}: {} records, {} bytes reclaimed",
            self.dir.display(),
            inner.table.len(),
            reclaimed
        );

        Ok(StoreStats {
            records: inner.table.len(),
            live_bytes: inner.live_bytes,
            dead_bytes: inner.dead_bytes,
        })
    }

    /// Append one entry and update the location table
    fn append(&self, inner: &mut Inner, op: u8, id: RecordId, data: &[u8]) -> StoreResult<()> {
        let entry = encode_entry(op, id, data);
        let offset = inner.end;
        {
            let file = inner.file.as_mut().ok_or(StoreError::Closed)?;
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(&entry)?;
        }
        inner.end += entry.len() as u64;

        let previous = match op {
            OP_WRITE => {
                let slot = Slot {
                    offset: offset + ENTRY_HEADER_SIZE,
                    len: data.len() as u32,
                };
                inner.live_bytes += slot.entry_size();
                inner.table.insert(id, slot)
            }
            _ => {
                // The tombstone itself is dead weight as soon as it lands
                inner.dead_bytes += entry.len() as u64;
                inner.table.remove(&id)
            }
        };
        if let Some(old) = previous {
            inner.live_bytes -= old.entry_size();
            inner.dead_bytes += old.entry_size();
        }
        if id >= inner.next_id {
            inner.next_id = id + 1;
        }

        self.maybe_sync(inner)
    }

    fn maybe_sync(&self, inner: &mut Inner) -> StoreResult<()> {
        let due = match self.sync_strategy {
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNWrites { count } => {
                inner.unsynced += 1;
                inner.unsynced >= count
            }
            SyncStrategy::OnClose => false,
        };
        if due {
            if let Some(file) = inner.file.as_mut() {
                file.sync_data()?;
            }
            inner.unsynced = 0;
        }
        Ok(())
    }
}

impl RecordStore for FileRecordStore {
    fn get(&self, id: RecordId) -> StoreResult<Option<Vec<u8>>> {
        let mut inner = self.inner.lock();
        let slot = match inner.table.get(&id) {
            Some(&slot) => slot,
            None => {
                // Still distinguish a closed store from a miss
                return match inner.file {
                    Some(_) => Ok(None),
                    None => Err(StoreError::Closed),
                };
            }
        };
        let file = inner.file.as_mut().ok_or(StoreError::Closed)?;
        read_payload(file, slot).map(Some)
    }

    fn put(&self, data: &[u8]) -> StoreResult<RecordId> {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        self.append(&mut inner, OP_WRITE, id, data)?;
        Ok(id)
    }

    fn set(&self, id: RecordId, data: &[u8]) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        self.append(&mut inner, OP_WRITE, id, data)
    }

    fn del(&self, id: RecordId) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.file.is_none() {
            return Err(StoreError::Closed);
        }
        if !inner.table.contains_key(&id) {
            return Ok(());
        }
        self.append(&mut inner, OP_DELETE, id, &[])
    }

    fn close(&self) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        match inner.file.take() {
            Some(file) => {
                file.sync_all()?;
                tracing::debug!("Closed record store {}", self.dir.display());
                Ok(())
            }
            None => Err(StoreError::Closed),
        }
    }

    fn len(&self) -> usize {
        self.inner.lock().table.len()
    }
}

// =============================================================================
// Private Helpers
// =============================================================================

/// Build `[op][id][len][crc][payload]`
fn encode_entry(op: u8, id: RecordId, data: &[u8]) -> Vec<u8> {
    let id_bytes = id.to_le_bytes();
    let len_bytes = (data.len() as u32).to_le_bytes();
    let crc = entry_crc(op, &id_bytes, &len_bytes, data);

    let mut entry = Vec::with_capacity(ENTRY_HEADER_SIZE as usize + data.len());
    entry.push(op);
    entry.extend_from_slice(&id_bytes);
    entry.extend_from_slice(&len_bytes);
    entry.extend_from_slice(&crc.to_le_bytes());
    entry.extend_from_slice(data);
    entry
}

fn entry_crc(op: u8, id_bytes: &[u8], len_bytes: &[u8], data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&[op]);
    hasher.update(id_bytes);
    hasher.update(len_bytes);
    hasher.update(data);
    hasher.finalize()
}

fn read_payload(file: &mut File, slot: Slot) -> StoreResult<Vec<u8>> {
    let mut buf = vec![0u8; slot.len as usize];
    file.seek(SeekFrom::Start(slot.offset))?;
    file.read_exact(&mut buf)?;
    Ok(buf)
}

/// Validate the header and rebuild the table; `inner.end` stops at the last
/// intact entry
fn replay(file: &mut File, file_len: u64, inner: &mut Inner) -> StoreResult<()> {
    file.seek(SeekFrom::Start(0))?;
    let mut reader = BufReader::new(&mut *file);

    let mut header = [0u8; HEADER_SIZE as usize];
    reader.read_exact(&mut header).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => StoreError::Corrupted("truncated header".to_string()),
        _ => StoreError::Io(e),
    })?;
    if &header[0..4] != MAGIC {
        return Err(StoreError::Corrupted(format!(
            "invalid magic: expected BKRS, got {:?}",
            &header[0..4]
        )));
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != VERSION {
        return Err(StoreError::Corrupted(format!(
            "unsupported record log version: {}",
            version
        )));
    }

    let mut offset = HEADER_SIZE;
    let mut entry_header = [0u8; ENTRY_HEADER_SIZE as usize];
    while offset + ENTRY_HEADER_SIZE <= file_len {
        if reader.read_exact(&mut entry_header).is_err() {
            break;
        }

        let op = entry_header[0];
        let id_bytes = &entry_header[1..9];
        let len_bytes = &entry_header[9..13];
        let len = u32::from_le_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]);
        let stored_crc = u32::from_le_bytes([
            entry_header[13],
            entry_header[14],
            entry_header[15],
            entry_header[16],
        ]);

        let entry_size = ENTRY_HEADER_SIZE + len as u64;
        if offset + entry_size > file_len || (op != OP_WRITE && op != OP_DELETE) {
            break;
        }

        let mut payload = vec![0u8; len as usize];
        if reader.read_exact(&mut payload).is_err() {
            break;
        }
        if entry_crc(op, id_bytes, len_bytes, &payload) != stored_crc {
            break;
        }

        let mut id_raw = [0u8; 8];
        id_raw.copy_from_slice(id_bytes);
        let id = RecordId::from_le_bytes(id_raw);

        let previous = if op == OP_WRITE {
            let slot = Slot {
                offset: offset + ENTRY_HEADER_SIZE,
                len,
            };
            inner.live_bytes += slot.entry_size();
            inner.table.insert(id, slot)
        } else {
            inner.dead_bytes += entry_size;
            inner.table.remove(&id)
        };
        if let Some(old) = previous {
            inner.live_bytes -= old.entry_size();
            inner.dead_bytes += old.entry_size();
        }
        if id >= inner.next_id {
            inner.next_id = id + 1;
        }

        offset += entry_size;
    }

    inner.end = offset;
    Ok(())
}
