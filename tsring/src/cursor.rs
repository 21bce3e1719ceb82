//! Streaming read cursor over one record.

use tsring_block_device::BlockDevice;

use crate::checksum::{Checksum, Crc32};
use crate::error::Error;
use crate::sector::{LogEntry, SECTOR_SIZE, min_sector_for_size};

/// Read cursor bound to one record in the data area.
///
/// Handed to the [`iterate`](crate::Series::iterate) callback. Reads go
/// forward only, in sector-multiple chunks (the final chunk may be the
/// exact tail), and feed an accumulated CRC that the caller compares
/// against [`entry().checksum`](LogEntry::checksum) after reading the full
/// record.
pub struct DataLogEntry<'a, D: BlockDevice<SECTOR_SIZE>, S: Checksum = Crc32> {
    entry: LogEntry,
    data_sector_begin_addr: u32,
    io: &'a mut D,
    crc: S,
    idx: u32,
}

impl<'a, D: BlockDevice<SECTOR_SIZE>, S: Checksum> DataLogEntry<'a, D, S> {
    pub(crate) fn new(entry: LogEntry, data_sector_begin_addr: u32, io: &'a mut D) -> Self {
        Self {
            entry,
            data_sector_begin_addr,
            io,
            crc: S::default(),
            idx: 0,
        }
    }

    /// Descriptor of the record this cursor reads.
    #[must_use]
    pub fn entry(&self) -> &LogEntry {
        &self.entry
    }

    /// Read the next chunk of the record into `out`.
    ///
    /// `out.len()` must be a sector multiple unless it requests exactly the
    /// remaining tail of the record. The length is clamped to the bytes
    /// left; `0` is returned once the record is exhausted. Returns the
    /// number of bytes read.
    pub fn read(&mut self, out: &mut [u8]) -> Result<usize, Error<D::Error>> {
        let len = out.len() as u32;
        if len % SECTOR_SIZE as u32 != 0 && len + SECTOR_SIZE as u32 * self.idx != self.entry.size
        {
            return Err(Error::UnalignedChunk);
        }

        if self.idx > min_sector_for_size(self.entry.size) {
            return Ok(0);
        }
        let len = len.min(
            self.entry
                .size
                .saturating_sub(SECTOR_SIZE as u32 * self.idx),
        );
        if len == 0 {
            return Ok(0);
        }

        self.io
            .read_bytes_from_sectors(
                &mut out[..len as usize],
                self.data_sector_begin_addr + self.entry.begin_sector_offset + self.idx,
            )
            .map_err(Error::Io)?;
        self.crc.update(&out[..len as usize]);
        self.idx += min_sector_for_size(len);
        Ok(len as usize)
    }

    /// Checksum accumulated over everything read so far.
    ///
    /// After the full record has been read this equals
    /// [`entry().checksum`](LogEntry::checksum) for an intact record;
    /// callers treat a mismatch as
    /// [`Error::CorruptedData`](crate::Error::CorruptedData).
    #[must_use]
    pub fn accumulated_crc(&self) -> u32 {
        self.crc.value()
    }
}
