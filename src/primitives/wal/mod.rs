#![forbid(unsafe_code)]
//! Durable append-only log of insert records.
//!
//! [`DurableLog`] is the contract the write path commits through. Two
//! implementations live here: [`MemoryWal`], which keeps records in memory,
//! and [`FileWal`], which frames each record with its length and a salted
//! CRC32 and appends it to a file.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::primitives::io::{FileIo, StdFileIo};
use crate::types::checksum::frame_crc32;
use crate::types::{Checksum, Crc32Fast, PenumbraError, Result};

const WAL_MAGIC: [u8; 4] = *b"PNBW";
const WAL_FORMAT_VERSION: u16 = 1;
/// Length of the file header that precedes the first frame.
pub const FILE_HEADER_LEN: usize = 32;
/// Length of the per-record frame header (`len: u32`, `crc32: u32`).
pub const FRAME_HEADER_LEN: usize = 8;
/// Upper bound on a single framed record.
pub const MAX_RECORD_LEN: usize = 64 << 20;

/// Append-only sink for committed records.
///
/// `append` must not return `Ok` until the bytes would survive a crash
/// (subject to the implementation's sync mode).
pub trait DurableLog: Send + Sync {
    /// Appends one complete record.
    fn append(&self, record: &[u8]) -> Result<()>;
}

/// Whether appends are forced to stable storage.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalSyncMode {
    /// fsync after every append.
    #[default]
    Full,
    /// Never fsync (tests and benchmarks only).
    Off,
}

/// Options for opening a [`FileWal`].
#[derive(Clone, Debug, Default)]
pub struct WalOptions {
    /// Salt mixed into every frame checksum. `None` adopts the salt of an
    /// existing file, or generates one for a new file.
    pub wal_salt: Option<u64>,
    /// Sync policy for appends.
    pub sync_mode: WalSyncMode,
}

impl WalOptions {
    /// Options with the given sync mode and no fixed salt.
    pub fn new(sync_mode: WalSyncMode) -> Self {
        Self {
            wal_salt: None,
            sync_mode,
        }
    }

    /// Pins the checksum salt.
    pub fn with_salt(mut self, salt: u64) -> Self {
        self.wal_salt = Some(salt);
        self
    }
}

/// Counters for log activity since open.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct WalStats {
    /// Records appended.
    pub records_appended: u64,
    /// Bytes written, frame headers included.
    pub bytes_appended: u64,
    /// fsync calls issued.
    pub syncs: u64,
}

/// In-memory [`DurableLog`]. Nothing survives the process.
#[derive(Default)]
pub struct MemoryWal {
    records: Mutex<Vec<Vec<u8>>>,
}

impl MemoryWal {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies out every appended record in order.
    pub fn records(&self) -> Vec<Vec<u8>> {
        self.records.lock().clone()
    }

    /// Number of appended records.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns true if nothing was appended.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl DurableLog for MemoryWal {
    fn append(&self, record: &[u8]) -> Result<()> {
        self.records.lock().push(record.to_vec());
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
struct FileHeader {
    wal_salt: u64,
}

impl FileHeader {
    fn encode(&self) -> [u8; FILE_HEADER_LEN] {
        let mut buf = [0u8; FILE_HEADER_LEN];
        buf[0..4].copy_from_slice(&WAL_MAGIC);
        buf[4..6].copy_from_slice(&WAL_FORMAT_VERSION.to_le_bytes());
        buf[8..16].copy_from_slice(&self.wal_salt.to_le_bytes());
        let crc = header_crc(&buf);
        buf[28..32].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    fn decode(src: &[u8; FILE_HEADER_LEN]) -> Result<Self> {
        if src[0..4] != WAL_MAGIC {
            return Err(PenumbraError::Corruption("wal magic mismatch"));
        }
        let version = u16::from_le_bytes([src[4], src[5]]);
        if version != WAL_FORMAT_VERSION {
            return Err(PenumbraError::Corruption("wal format version mismatch"));
        }
        if src[6..8] != [0, 0] || src[16..28].iter().any(|&b| b != 0) {
            return Err(PenumbraError::Corruption("wal reserved header bytes non-zero"));
        }
        let stored_crc = u32::from_le_bytes([src[28], src[29], src[30], src[31]]);
        if header_crc(src) != stored_crc {
            return Err(PenumbraError::Corruption("wal header crc mismatch"));
        }
        let mut salt = [0u8; 8];
        salt.copy_from_slice(&src[8..16]);
        Ok(Self {
            wal_salt: u64::from_le_bytes(salt),
        })
    }
}

fn header_crc(buf: &[u8; FILE_HEADER_LEN]) -> u32 {
    let mut hasher = Crc32Fast::default();
    hasher.update(&buf[..28]);
    hasher.finalize()
}

fn fresh_salt() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        // low 64 bits of the nanosecond clock
        .map(|d| (d.as_nanos() & u128::from(u64::MAX)) as u64)
        .unwrap_or(0);
    (nanos ^ (u64::from(std::process::id()) << 32)) | 1
}

struct WalState {
    append_offset: u64,
    /// Set when a failed append could not be rolled back.
    poisoned: bool,
    stats: WalStats,
}

/// File-backed [`DurableLog`].
///
/// Layout: a 32-byte header (magic, version, salt, CRC) followed by frames of
/// `len: u32 LE`, `crc32: u32 LE`, payload. The frame CRC covers the salt,
/// the length and the payload.
pub struct FileWal {
    io: Arc<dyn FileIo>,
    header: FileHeader,
    sync_mode: WalSyncMode,
    state: Mutex<WalState>,
}

impl FileWal {
    /// Opens or creates a log on `io`.
    ///
    /// An existing file has its frames validated; anything after the last
    /// intact frame is truncated away so new appends follow it.
    pub fn open(io: Arc<dyn FileIo>, options: WalOptions) -> Result<Self> {
        let len = io.len()?;
        let header = if len < FILE_HEADER_LEN as u64 {
            let header = FileHeader {
                wal_salt: options.wal_salt.unwrap_or_else(fresh_salt),
            };
            io.write_at(0, &header.encode())?;
            io.truncate(FILE_HEADER_LEN as u64)?;
            io.sync_all()?;
            debug!(salt = header.wal_salt, "wal.create");
            header
        } else {
            let header = read_header(io.as_ref())?;
            if let Some(salt) = options.wal_salt {
                if salt != header.wal_salt {
                    return Err(PenumbraError::Corruption("wal salt mismatch"));
                }
            }
            header
        };
        let end = io.len()?;
        let valid_up_to = {
            let mut iter = WalIterator::new(Arc::clone(&io), header.wal_salt, end);
            while iter.next_record()?.is_some() {}
            iter.valid_up_to()
        };
        if valid_up_to < end {
            warn!(
                valid_up_to,
                file_len = end,
                "wal.open.truncate_torn_tail"
            );
            io.truncate(valid_up_to)?;
            io.sync_all()?;
        }
        Ok(Self {
            io,
            header,
            sync_mode: options.sync_mode,
            state: Mutex::new(WalState {
                append_offset: valid_up_to,
                poisoned: false,
                stats: WalStats::default(),
            }),
        })
    }

    /// Opens or creates a log file at `path`.
    pub fn open_path(path: impl AsRef<Path>, options: WalOptions) -> Result<Self> {
        let io = StdFileIo::open(path)?;
        Self::open(Arc::new(io), options)
    }

    /// Returns an iterator over an existing log file without modifying it.
    pub fn read_path(path: impl AsRef<Path>) -> Result<WalIterator> {
        let io: Arc<dyn FileIo> = Arc::new(StdFileIo::open_read_only(path)?);
        let header = read_header(io.as_ref())?;
        let end = io.len()?;
        Ok(WalIterator::new(io, header.wal_salt, end))
    }

    /// Iterates over the intact records currently in the file.
    pub fn iter(&self) -> Result<WalIterator> {
        let end = self.state.lock().append_offset;
        Ok(WalIterator::new(
            Arc::clone(&self.io),
            self.header.wal_salt,
            end,
        ))
    }

    /// Forces appended frames to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.io.sync_all()?;
        self.state.lock().stats.syncs += 1;
        Ok(())
    }

    /// Checksum salt recorded in the file header.
    pub fn salt(&self) -> u64 {
        self.header.wal_salt
    }

    /// Sync policy this log was opened with.
    pub fn sync_mode(&self) -> WalSyncMode {
        self.sync_mode
    }

    /// Counters since open.
    pub fn stats(&self) -> WalStats {
        self.state.lock().stats.clone()
    }

    /// File length in bytes, header included.
    pub fn len(&self) -> Result<u64> {
        self.io.len()
    }

    /// Returns true if the log holds no frames.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? <= FILE_HEADER_LEN as u64)
    }
}

impl DurableLog for FileWal {
    fn append(&self, record: &[u8]) -> Result<()> {
        if record.is_empty() {
            return Err(PenumbraError::Invalid("wal record empty"));
        }
        if record.len() > MAX_RECORD_LEN {
            return Err(PenumbraError::Invalid("wal record exceeds maximum length"));
        }
        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + record.len());
        frame.extend_from_slice(&(record.len() as u32).to_le_bytes());
        frame.extend_from_slice(&frame_crc32(self.header.wal_salt, record).to_le_bytes());
        frame.extend_from_slice(record);

        let mut state = self.state.lock();
        if state.poisoned {
            return Err(PenumbraError::Invalid(
                "wal poisoned by an unrecoverable append failure",
            ));
        }
        if let Err(err) = self.write_frame(&mut state, &frame) {
            self.rollback(&mut state);
            return Err(err);
        }
        state.append_offset += frame.len() as u64;
        state.stats.records_appended += 1;
        state.stats.bytes_appended += frame.len() as u64;
        Ok(())
    }
}

impl FileWal {
    fn write_frame(&self, state: &mut WalState, frame: &[u8]) -> Result<()> {
        self.io.write_at(state.append_offset, frame)?;
        if self.sync_mode == WalSyncMode::Full {
            self.io.sync_all()?;
            state.stats.syncs += 1;
        }
        Ok(())
    }

    /// Cuts a partially written or unsynced frame off the file so a later
    /// open cannot replay it. If that fails the log refuses further appends.
    fn rollback(&self, state: &mut WalState) {
        let offset = state.append_offset;
        let restored = self
            .io
            .truncate(offset)
            .and_then(|()| self.io.sync_all());
        match restored {
            Ok(()) => warn!(offset, "wal.append.rolled_back"),
            Err(err) => {
                state.poisoned = true;
                error!(offset, %err, "wal.append.poisoned");
            }
        }
    }
}

fn read_header(io: &dyn FileIo) -> Result<FileHeader> {
    if io.len()? < FILE_HEADER_LEN as u64 {
        return Err(PenumbraError::Corruption("wal truncated header"));
    }
    let mut buf = [0u8; FILE_HEADER_LEN];
    io.read_at(0, &mut buf)?;
    FileHeader::decode(&buf)
}

/// Sequential reader over the frames of a log file.
///
/// Iteration ends at the first frame that is truncated, oversized or fails
/// its checksum; [`WalIterator::valid_up_to`] then reports the end of the
/// clean prefix.
pub struct WalIterator {
    io: Arc<dyn FileIo>,
    salt: u64,
    offset: u64,
    end: u64,
    valid_up_to: u64,
}

impl WalIterator {
    fn new(io: Arc<dyn FileIo>, salt: u64, end: u64) -> Self {
        Self {
            io,
            salt,
            offset: FILE_HEADER_LEN as u64,
            end,
            valid_up_to: FILE_HEADER_LEN as u64,
        }
    }

    /// Reads the next intact record, or `None` at the end of the clean prefix.
    pub fn next_record(&mut self) -> Result<Option<Vec<u8>>> {
        if self.offset + FRAME_HEADER_LEN as u64 > self.end {
            self.offset = self.end;
            return Ok(None);
        }
        let mut header = [0u8; FRAME_HEADER_LEN];
        self.io.read_at(self.offset, &mut header)?;
        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let stored_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let payload_off = self.offset + FRAME_HEADER_LEN as u64;
        if len == 0 || len > MAX_RECORD_LEN || payload_off + len as u64 > self.end {
            self.offset = self.end;
            return Ok(None);
        }
        let mut payload = vec![0u8; len];
        self.io.read_at(payload_off, &mut payload)?;
        if frame_crc32(self.salt, &payload) != stored_crc {
            self.offset = self.end;
            return Ok(None);
        }
        self.offset = payload_off + len as u64;
        self.valid_up_to = self.offset;
        Ok(Some(payload))
    }

    /// File offset up to which frames have been validated.
    pub fn valid_up_to(&self) -> u64 {
        self.valid_up_to
    }
}

impl Iterator for WalIterator {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}
