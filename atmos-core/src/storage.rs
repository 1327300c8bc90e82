//! Atomic persistence of small records
//!
//! Two records outlive a wake cycle: the calibration document and the last
//! battery state. Both go through [`BlobStore`], whose single guarantee is that
//! a reader sees either the previous commit or the new one, never a mix.
//!
//! Two implementations:
//!
//! - [`SlotStore`]: A/B slots in retained RAM or flash. Each commit goes to
//!   the slot not holding the current record, framed with a sequence number
//!   and CRC-32. A torn write fails its CRC and the older slot wins.
//! - [`AtomicFile`] (`std`): write to a temp file in the same directory,
//!   `fsync`, then rename over the target.

use alloc::vec;
use alloc::vec::Vec;

use crc::{Crc, CRC_32_ISO_HDLC};
use log::warn;

use crate::errors::PersistError;

/// Whole-record storage with atomic replace
pub trait BlobStore {
    /// Latest committed record, `None` if nothing was ever committed
    fn read(&mut self) -> Result<Option<Vec<u8>>, PersistError>;

    /// Replace the record; on error the previous record stays readable
    fn commit(&mut self, bytes: &[u8]) -> Result<(), PersistError>;
}

impl<B: BlobStore + ?Sized> BlobStore for &mut B {
    fn read(&mut self) -> Result<Option<Vec<u8>>, PersistError> {
        (**self).read()
    }

    fn commit(&mut self, bytes: &[u8]) -> Result<(), PersistError> {
        (**self).commit(bytes)
    }
}

/// Volatile store for hosts and tests
#[derive(Debug, Clone, Default)]
pub struct MemoryBlob {
    bytes: Option<Vec<u8>>,
}

impl MemoryBlob {
    /// Store preloaded with a record
    pub fn with_contents(bytes: &[u8]) -> Self {
        Self { bytes: Some(bytes.to_vec()) }
    }
}

impl BlobStore for MemoryBlob {
    fn read(&mut self) -> Result<Option<Vec<u8>>, PersistError> {
        Ok(self.bytes.clone())
    }

    fn commit(&mut self, bytes: &[u8]) -> Result<(), PersistError> {
        self.bytes = Some(bytes.to_vec());
        Ok(())
    }
}

/// Byte-addressable memory that survives deep sleep
///
/// RTC slow memory on ESP32 parts, a reserved flash page elsewhere.
pub trait SleepMemory {
    /// Total bytes available
    fn capacity(&self) -> usize;

    /// Copy `buf.len()` bytes starting at `offset`
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), PersistError>;

    /// Write `data` starting at `offset`; may stop part-way on power loss
    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), PersistError>;
}

fn out_of_range(offset: usize, len: usize, capacity: usize) -> PersistError {
    PersistError::Io(alloc::format!("range {offset}+{len} outside {capacity} bytes"))
}

impl SleepMemory for [u8] {
    fn capacity(&self) -> usize {
        self.len()
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), PersistError> {
        let src = self
            .get(offset..offset + buf.len())
            .ok_or_else(|| out_of_range(offset, buf.len(), self.len()))?;
        buf.copy_from_slice(src);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), PersistError> {
        let capacity = self.len();
        let dst = self
            .get_mut(offset..offset + data.len())
            .ok_or_else(|| out_of_range(offset, data.len(), capacity))?;
        dst.copy_from_slice(data);
        Ok(())
    }
}

impl<const N: usize> SleepMemory for [u8; N] {
    fn capacity(&self) -> usize {
        N
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), PersistError> {
        self.as_slice().read(offset, buf)
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), PersistError> {
        self.as_mut_slice().write(offset, data)
    }
}

impl SleepMemory for Vec<u8> {
    fn capacity(&self) -> usize {
        self.len()
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), PersistError> {
        self.as_slice().read(offset, buf)
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), PersistError> {
        self.as_mut_slice().write(offset, data)
    }
}

impl<M: SleepMemory + ?Sized> SleepMemory for &mut M {
    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), PersistError> {
        (**self).read(offset, buf)
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), PersistError> {
        (**self).write(offset, data)
    }
}

const SLOT_MAGIC: u16 = 0xA7_05;
// magic (2) + sequence (4) + payload length (2)
const HEADER_LEN: usize = 8;
const CRC_LEN: usize = 4;
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Framing overhead per slot in bytes
pub const SLOT_OVERHEAD: usize = HEADER_LEN + CRC_LEN;

/// Double-buffered record in [`SleepMemory`]
///
/// Memory is split into two equal slots. Frame layout, little endian:
///
/// ```text
/// | magic u16 | seq u32 | len u16 | payload[len] | crc32(seq, len, payload) |
/// ```
pub struct SlotStore<M> {
    memory: M,
    slot_len: usize,
}

impl<M: SleepMemory> SlotStore<M> {
    /// Split `memory` into two slots
    pub fn new(memory: M) -> Self {
        let slot_len = memory.capacity() / 2;
        Self { memory, slot_len }
    }

    /// Largest payload that fits one slot
    pub fn max_payload(&self) -> usize {
        self.slot_len.saturating_sub(SLOT_OVERHEAD).min(u16::MAX as usize)
    }

    /// Give the memory back
    pub fn into_inner(self) -> M {
        self.memory
    }

    fn read_slot(&self, index: usize) -> Option<(u32, Vec<u8>)> {
        let base = index * self.slot_len;
        let mut header = [0u8; HEADER_LEN];
        self.memory.read(base, &mut header).ok()?;

        if u16::from_le_bytes([header[0], header[1]]) != SLOT_MAGIC {
            return None;
        }
        let seq = u32::from_le_bytes([header[2], header[3], header[4], header[5]]);
        let len = u16::from_le_bytes([header[6], header[7]]) as usize;
        if HEADER_LEN + len + CRC_LEN > self.slot_len {
            warn!("slot {} claims {} bytes, larger than the slot", index, len);
            return None;
        }

        let mut body = vec![0u8; len + CRC_LEN];
        self.memory.read(base + HEADER_LEN, &mut body).ok()?;
        let (payload, trailer) = body.split_at(len);
        let stored = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);

        let mut digest = CRC32.digest();
        digest.update(&header[2..]);
        digest.update(payload);
        if digest.finalize() != stored {
            warn!("slot {} (seq {}) failed CRC, ignoring", index, seq);
            return None;
        }
        Some((seq, payload.to_vec()))
    }

    fn current(&self) -> Option<(usize, u32, Vec<u8>)> {
        let a = self.read_slot(0).map(|(seq, p)| (0, seq, p));
        let b = self.read_slot(1).map(|(seq, p)| (1, seq, p));
        match (a, b) {
            // serial-number order, so the newer slot still wins once seq wraps
            (Some(a), Some(b)) => Some(if (b.1.wrapping_sub(a.1) as i32) > 0 { b } else { a }),
            (a, b) => a.or(b),
        }
    }
}

impl<M: SleepMemory> BlobStore for SlotStore<M> {
    fn read(&mut self) -> Result<Option<Vec<u8>>, PersistError> {
        Ok(self.current().map(|(_, _, payload)| payload))
    }

    fn commit(&mut self, bytes: &[u8]) -> Result<(), PersistError> {
        if bytes.len() > self.max_payload() {
            return Err(PersistError::Capacity {
                needed: bytes.len() + SLOT_OVERHEAD,
                capacity: self.slot_len,
            });
        }

        let (target, seq) = match self.current() {
            Some((index, seq, _)) => (1 - index, seq.wrapping_add(1)),
            None => (0, 1),
        };

        let mut frame = Vec::with_capacity(bytes.len() + SLOT_OVERHEAD);
        frame.extend_from_slice(&SLOT_MAGIC.to_le_bytes());
        frame.extend_from_slice(&seq.to_le_bytes());
        frame.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
        frame.extend_from_slice(bytes);
        let crc = CRC32.checksum(&frame[2..]);
        frame.extend_from_slice(&crc.to_le_bytes());

        // Magic goes in last: a slot only becomes valid once its body is complete.
        let base = target * self.slot_len;
        self.memory.write(base, &[0, 0])?;
        self.memory.write(base + 2, &frame[2..])?;
        self.memory.write(base, &frame[..2])
    }
}

#[cfg(feature = "std")]
pub use file::AtomicFile;

#[cfg(feature = "std")]
mod file {
    use std::fs::{self, File};
    use std::io::{ErrorKind, Write};
    use std::path::{Path, PathBuf};

    use tempfile::NamedTempFile;

    use super::BlobStore;
    use crate::errors::PersistError;

    fn io(e: std::io::Error) -> PersistError {
        PersistError::Io(e.to_string())
    }

    /// File replaced atomically via temp file + rename
    #[derive(Debug, Clone)]
    pub struct AtomicFile {
        path: PathBuf,
    }

    impl AtomicFile {
        /// Store backed by `path`; the parent directory must exist
        pub fn new(path: impl Into<PathBuf>) -> Self {
            Self { path: path.into() }
        }

        /// Target path
        pub fn path(&self) -> &Path {
            &self.path
        }

        fn directory(&self) -> &Path {
            match self.path.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir,
                _ => Path::new("."),
            }
        }
    }

    impl BlobStore for AtomicFile {
        fn read(&mut self) -> Result<Option<Vec<u8>>, PersistError> {
            match fs::read(&self.path) {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(io(e)),
            }
        }

        fn commit(&mut self, bytes: &[u8]) -> Result<(), PersistError> {
            let dir = self.directory();
            let mut tmp = NamedTempFile::new_in(dir).map_err(io)?;
            tmp.write_all(bytes).map_err(io)?;
            tmp.as_file().sync_all().map_err(io)?;
            tmp.persist(&self.path).map_err(|e| io(e.error))?;

            // Make the rename itself durable; not supported on every platform.
            if let Ok(handle) = File::open(dir) {
                let _ = handle.sync_all();
            }
            Ok(())
        }
    }
}
