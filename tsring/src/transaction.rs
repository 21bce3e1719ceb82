//! Scoped streaming-write session bound to one pre-reserved slot.

use tsring_block_device::BlockDevice;

use crate::checksum::{Checksum, Crc32};
use crate::error::Error;
use crate::sector::{SECTOR_SIZE, min_sector_for_size};
use crate::series::{SeriesState, StateGuard};

/// Streaming insert bound to a single reserved entry.
///
/// Created by
/// [`Series::begin_insert_transaction`](crate::Series::begin_insert_transaction),
/// which reserves the slot and hands over the acquired series lock; no
/// other operation can run on the series while the transaction is alive,
/// which is what makes sector-by-sector writes safe.
///
/// Data arrives through [`write`](InsertTransaction::write) in
/// sector-multiple chunks (the final chunk may be the exact tail). When the
/// reserved size has been written the transaction finalizes itself:
/// the accumulated CRC is stored into the entry and the slot advances.
/// Dropping the transaction finalizes it on every exit path; an early drop
/// finalizes with whatever was written, which a later read reports as a
/// checksum mismatch.
pub struct InsertTransaction<'a, D: BlockDevice<SECTOR_SIZE>, S: Checksum = Crc32> {
    guard: StateGuard<'a, D, S>,
    data_begin_addr: u32,
    size: u32,
    written: u32,
    write_sector_idx: u32,
    crc: S,
    finalized: bool,
}

impl<'a, D: BlockDevice<SECTOR_SIZE>, S: Checksum> InsertTransaction<'a, D, S> {
    pub(crate) fn new(guard: StateGuard<'a, D, S>, data_begin_addr: u32, size: u32) -> Self {
        Self {
            guard,
            data_begin_addr,
            size,
            written: 0,
            write_sector_idx: 0,
            crc: S::default(),
            finalized: false,
        }
    }

    /// Whether the transaction has already finalized (all bytes written, or
    /// an explicit [`finalize`](InsertTransaction::finalize)).
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Append the next chunk of the record.
    ///
    /// Writing past the reserved size, or after finalization, fails with
    /// [`Error::Overflow`]. A non-final chunk that is not a sector multiple
    /// fails with [`Error::UnalignedChunk`]. Writing the last byte
    /// finalizes the transaction.
    pub fn write(&mut self, chunk: &[u8]) -> Result<(), Error<D::Error>> {
        if self.finalized {
            return Err(Error::Overflow);
        }
        if chunk.is_empty() {
            return Ok(());
        }
        let len = u32::try_from(chunk.len()).map_err(|_| Error::Overflow)?;
        if len > self.size - self.written {
            return Err(Error::Overflow);
        }
        if len % SECTOR_SIZE as u32 != 0 && self.written + len != self.size {
            return Err(Error::UnalignedChunk);
        }

        self.crc.update(chunk);
        self.guard
            .io
            .write_bytes_to_sectors(chunk, self.data_begin_addr + self.write_sector_idx)
            .map_err(Error::Io)?;
        self.write_sector_idx += min_sector_for_size(len);
        self.written += len;

        if self.written == self.size {
            self.complete()?;
        }
        Ok(())
    }

    /// Finalize explicitly and release the series lock.
    ///
    /// Stores the accumulated CRC into the reserved entry and advances the
    /// slot (which may sync the header sector). Idempotent with the
    /// auto-finalize performed by the last [`write`](InsertTransaction::write).
    pub fn finalize(mut self) -> Result<(), Error<D::Error>> {
        self.complete()
    }

    fn complete(&mut self) -> Result<(), Error<D::Error>> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;

        let checksum = self.crc.value();
        let state: &mut SeriesState<D, S> = &mut self.guard;
        state.manager.current_entry_mut().checksum = checksum;

        let SeriesState { io, manager } = state;
        manager.advance_slot(io)
    }
}

impl<D: BlockDevice<SECTOR_SIZE>, S: Checksum> Drop for InsertTransaction<'_, D, S> {
    fn drop(&mut self) {
        if self.complete().is_err() {
            error!("failed to finalize insert transaction on drop");
        }
    }
}
