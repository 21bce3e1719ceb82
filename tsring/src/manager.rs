//! Circular log of fixed-capacity metadata sectors.
//!
//! The manager owns the cached current header sector and the write cursors
//! (sector index, slot index, data-sector offset). It persists entry
//! descriptors, allocates data-sector ranges, and rebuilds the correct
//! next-write position from arbitrary on-disk state when a series is
//! opened: there is no explicit head or tail pointer on disk.
//!
//! Methods that touch the medium borrow the device for the duration of the
//! call; the manager itself is pure state.

use alloc::vec::Vec;
use core::marker::PhantomData;

use aligned::{A4, Aligned};
use tsring_block_device::BlockDevice;

use crate::checksum::{Checksum, Crc32};
use crate::error::Error;
use crate::sector::{HeaderSector, LogEntry, SECTOR_SIZE, min_sector_for_size};

/// Sector address relative to the first data sector of a partition.
pub type RelativeSectorAddress = u32;

/// Sector address on the device.
pub type AbsoluteSectorAddress = u32;

/// DMA-friendly scratch buffer for one raw sector.
type RawSector = Aligned<A4, [u8; SECTOR_SIZE]>;

/// Manager of the header-sector ring of one partition.
///
/// Generic over the [`Checksum`] used for header-sector CRCs. Construction
/// runs recovery; see [`HeaderSectorsManager::open`].
pub struct HeaderSectorsManager<S: Checksum = Crc32> {
    begin_sector_addr: u32,
    n_header_sectors: u32,
    n_data_sectors: u32,

    current: HeaderSector,
    current_sector_idx: u32,
    current_slot_idx: u32,

    /// Offset from the first data sector.
    current_data_sector_offset: u32,

    previous_timestamp: u64,

    _checksum: PhantomData<fn() -> S>,
}

impl<S: Checksum> HeaderSectorsManager<S> {
    /// Open the header ring at `begin_sector_addr` and reconstruct the
    /// write position from disk.
    ///
    /// Recovery runs in three stages:
    ///
    /// 1. Every header sector is CRC-checked; a torn sector is cleared,
    ///    re-CRC'd and flushed (healed, not reported).
    /// 2. Header sectors are scanned in order. The first sector with a free
    ///    or stale slot is the current one; fully-used monotonic sectors
    ///    contribute their last entry's end to the data offset and are
    ///    remembered by their first timestamp.
    /// 3. If every sector is fully used and monotonic, the run stopped
    ///    exactly at a sector boundary: writing resumes at slot 0 of the
    ///    sector with the smallest first timestamp, and the data offset
    ///    follows the last entry of the sector cyclically preceding it.
    ///
    /// # Panics
    ///
    /// Panics unless `0 < n_header_sectors < n_total_sectors`.
    pub fn open<D: BlockDevice<SECTOR_SIZE>>(
        io: &mut D,
        begin_sector_addr: u32,
        n_header_sectors: u32,
        n_total_sectors: u32,
    ) -> Result<Self, Error<D::Error>> {
        assert!(n_header_sectors > 0);
        assert!(n_header_sectors < n_total_sectors);

        let mut manager = Self {
            begin_sector_addr,
            n_header_sectors,
            n_data_sectors: n_total_sectors - n_header_sectors,
            current: HeaderSector::default(),
            current_sector_idx: 0,
            current_slot_idx: 0,
            current_data_sector_offset: 0,
            previous_timestamp: 0,
            _checksum: PhantomData,
        };
        manager.init(io)?;
        Ok(manager)
    }

    /// Number of data sectors behind the header ring.
    #[must_use]
    pub fn n_data_sectors(&self) -> u32 {
        self.n_data_sectors
    }

    /// Read access to the cached current header sector.
    #[must_use]
    pub fn header_sector_cache(&self) -> &HeaderSector {
        &self.current
    }

    /// Map a data-relative sector address to a device address.
    #[must_use]
    pub fn sector_addr_r2a(&self, addr: RelativeSectorAddress) -> AbsoluteSectorAddress {
        addr + self.n_header_sectors + self.begin_sector_addr
    }

    fn init<D: BlockDevice<SECTOR_SIZE>>(&mut self, io: &mut D) -> Result<(), Error<D::Error>> {
        for i in 0..self.n_header_sectors {
            let raw = self.read_raw(io, i)?;
            if HeaderSector::verify_crc::<S>(&raw[..]) {
                continue;
            }
            warn!("header sector {} failed its CRC check, clearing", i);
            self.current_sector_idx = i;
            self.current = HeaderSector::default();
            self.sync_current_sector(io)?;
        }

        let mut least_timestamp = u64::MAX;
        let mut least_timestamp_sector = None;

        // The first sector that still has a free or stale slot resumes the
        // run.
        for i in 0..self.n_header_sectors {
            self.load_header_sector(io, i)?;
            match self.current.find_empty_slot() {
                None => {
                    let last = &self.current.entries[HeaderSector::N_ENTRIES - 1];
                    self.current_data_sector_offset = last.end_sector_addr() + 1;

                    let first_ts = self.current.entries[0].timestamp;
                    if first_ts < least_timestamp {
                        least_timestamp = first_ts;
                        least_timestamp_sector = Some(i);
                    }
                }
                Some(slot) => {
                    if slot > 0 {
                        self.current_data_sector_offset =
                            self.current.entries[slot - 1].end_sector_addr() + 1;
                    }
                    // slot == 0 keeps the offset accumulated from the
                    // preceding fully-used sectors.
                    self.current_slot_idx = slot as u32;
                    debug!("recovered at header sector {} slot {}", i, slot);
                    return Ok(());
                }
            }
        }

        // Saturated exactly at a sector boundary: every sector is fully
        // used and monotonic. The oldest run starts at the sector with the
        // smallest first timestamp.
        let least = least_timestamp_sector.expect("header ring has at least one sector");
        let preceding = if least == 0 {
            self.n_header_sectors - 1
        } else {
            least - 1
        };

        self.load_header_sector(io, preceding)?;
        let last = &self.current.entries[HeaderSector::N_ENTRIES - 1];
        self.current_data_sector_offset =
            last.begin_sector_offset + min_sector_for_size(last.size);

        self.load_header_sector(io, least)?;
        self.current_slot_idx = 0;
        debug!(
            "saturated at a sector boundary, resuming at header sector {}",
            least
        );
        Ok(())
    }

    fn read_raw<D: BlockDevice<SECTOR_SIZE>>(
        &self,
        io: &mut D,
        sector_idx: u32,
    ) -> Result<RawSector, Error<D::Error>> {
        let mut raw: RawSector = Aligned([0u8; SECTOR_SIZE]);
        io.read_sectors(&mut raw[..], self.begin_sector_addr + sector_idx, 1)
            .map_err(Error::Io)?;
        Ok(raw)
    }

    fn load_header_sector<D: BlockDevice<SECTOR_SIZE>>(
        &mut self,
        io: &mut D,
        sector_idx: u32,
    ) -> Result<(), Error<D::Error>> {
        let raw = self.read_raw(io, sector_idx)?;
        self.current = HeaderSector::decode(&raw[..]);
        self.current_sector_idx = sector_idx;
        Ok(())
    }

    /// Reserve the current slot for a record whose checksum is not yet
    /// known and return it for later completion.
    ///
    /// A timestamp smaller than the previous one is bumped to
    /// `previous + 1`; slot-level monotonicity is what recovery relies on.
    /// A timestamp of `0` is bumped the same way: `0` marks an empty slot
    /// on disk and must never be stored in a live entry. The data-sector
    /// offset wraps to the head of the data area when the record does not
    /// fit before its end. Call [`advance_slot`](Self::advance_slot) once
    /// the checksum is filled in.
    pub fn add_log_partial<E>(
        &mut self,
        data_size: u32,
        timestamp: u64,
        attr: u32,
    ) -> Result<&mut LogEntry, Error<E>> {
        let mut timestamp = timestamp;
        if timestamp == 0 || timestamp < self.previous_timestamp {
            timestamp = self.previous_timestamp + 1;
        }
        self.previous_timestamp = timestamp;

        if data_size == 0 {
            return Err(Error::ZeroDataSize);
        }
        let required_sectors = min_sector_for_size(data_size);
        if required_sectors > self.n_data_sectors {
            return Err(Error::DataTooBig);
        }
        if required_sectors
            > self
                .n_data_sectors
                .saturating_sub(self.current_data_sector_offset)
        {
            // No space at the tail of the data area, start from the head.
            self.current_data_sector_offset = 0;
        }

        let entry = &mut self.current.entries[self.current_slot_idx as usize];
        *entry = LogEntry {
            timestamp,
            checksum: 0,
            begin_sector_offset: self.current_data_sector_offset,
            size: data_size,
            attr,
        };
        self.current_data_sector_offset += required_sectors;
        Ok(entry)
    }

    /// Append a complete entry and return the *relative* begin sector
    /// address assigned to its data.
    pub fn add_log<D: BlockDevice<SECTOR_SIZE>>(
        &mut self,
        io: &mut D,
        data_size: u32,
        checksum: u32,
        timestamp: u64,
        attr: u32,
    ) -> Result<RelativeSectorAddress, Error<D::Error>> {
        let entry = self.add_log_partial(data_size, timestamp, attr)?;
        entry.checksum = checksum;
        let begin = entry.begin_sector_offset;
        self.advance_slot(io)?;
        Ok(begin)
    }

    /// Mutable access to the slot most recently reserved by
    /// [`add_log_partial`](Self::add_log_partial).
    pub(crate) fn current_entry_mut(&mut self) -> &mut LogEntry {
        &mut self.current.entries[self.current_slot_idx as usize]
    }

    /// Move to the next slot; crossing the sector boundary syncs the full
    /// sector and loads the next one in the ring.
    pub fn advance_slot<D: BlockDevice<SECTOR_SIZE>>(
        &mut self,
        io: &mut D,
    ) -> Result<(), Error<D::Error>> {
        self.current_slot_idx += 1;
        if self.current_slot_idx >= HeaderSector::N_ENTRIES as u32 {
            self.sync_current_sector(io)?;
            let next = (self.current_sector_idx + 1) % self.n_header_sectors;
            self.load_header_sector(io, next)?;
            self.current_slot_idx = 0;
        }
        Ok(())
    }

    /// Flush the cached header sector, bumping its write counter.
    pub fn sync_current_sector<D: BlockDevice<SECTOR_SIZE>>(
        &mut self,
        io: &mut D,
    ) -> Result<(), Error<D::Error>> {
        self.current.write_count = self.current.write_count.wrapping_add(1);

        let mut raw: RawSector = Aligned([0u8; SECTOR_SIZE]);
        self.current.encode_into::<S>(&mut raw[..]);
        io.write_sectors(
            &raw[..],
            self.begin_sector_addr + self.current_sector_idx,
            1,
        )
        .map_err(Error::Io)
    }

    /// Step one slot backward along the ring; wrapping from slot 0 loads
    /// the previous header sector into `scratch`. No validity checks.
    fn previous_log_entry<D: BlockDevice<SECTOR_SIZE>>(
        &self,
        io: &mut D,
        scratch: &mut HeaderSector,
        sector_idx: &mut u32,
        slot_idx: &mut u32,
    ) -> Result<LogEntry, Error<D::Error>> {
        if *slot_idx == 0 {
            if self.n_header_sectors == 1 {
                // single sector: go straight back to its last slot
                *slot_idx = HeaderSector::N_ENTRIES as u32 - 1;
                return Ok(scratch.entries[*slot_idx as usize]);
            }
            *sector_idx = if *sector_idx == 0 {
                self.n_header_sectors - 1
            } else {
                *sector_idx - 1
            };
            let mut raw: RawSector = Aligned([0u8; SECTOR_SIZE]);
            io.read_sectors(&mut raw[..], self.begin_sector_addr + *sector_idx, 1)
                .map_err(Error::Io)?;
            *scratch = HeaderSector::decode(&raw[..]);
            *slot_idx = HeaderSector::N_ENTRIES as u32 - 1;
        } else {
            *slot_idx -= 1;
        }
        Ok(scratch.entries[*slot_idx as usize])
    }

    /// Newest-first list of the entries visible in the log, optionally
    /// restricted to `after <= timestamp < before` (a bound of `0` disables
    /// it). `descending == false` reverses the result.
    ///
    /// The walk starts from a snapshot of the current sector and steps
    /// backward slot by slot. It stops at the first unused slot, at the
    /// wraparound seam (a timestamp larger than the youngest one already
    /// stepped past), or when an entry's data range has been reused by the
    /// newest record. Window misses are skipped without stopping.
    ///
    /// The in-memory slot is synced first so the snapshot is consistent
    /// with the sectors read back from disk during the walk.
    pub fn get_entries<D: BlockDevice<SECTOR_SIZE>>(
        &mut self,
        io: &mut D,
        descending: bool,
        after: u64,
        before: u64,
    ) -> Result<Vec<LogEntry>, Error<D::Error>> {
        self.sync_current_sector(io)?;

        let mut entries = Vec::new();
        let mut scratch = self.current.clone();
        let mut sector_idx = self.current_sector_idx;
        let mut slot_idx = self.current_slot_idx;

        let mut decreasing_timestamp = u64::MAX;

        let last = self.previous_log_entry(io, &mut scratch, &mut sector_idx, &mut slot_idx)?;
        if last.timestamp != 0
            && (before == 0 || last.timestamp < before)
            && (after == 0 || last.timestamp >= after)
        {
            entries.push(last);
        }

        // One full lap of the slot ring bounds the walk.
        let max_steps = self.n_header_sectors as usize * HeaderSector::N_ENTRIES;
        let mut steps = 1;

        while steps < max_steps {
            steps += 1;
            let prev =
                self.previous_log_entry(io, &mut scratch, &mut sector_idx, &mut slot_idx)?;

            // An unused slot: the ring never filled this far back.
            if prev.timestamp == 0 {
                break;
            }

            // Monotonicity broke: this is the wraparound seam.
            if prev.timestamp > decreasing_timestamp {
                break;
            }
            decreasing_timestamp = prev.timestamp;

            // Outside the requested window: skip, but keep walking.
            if (before > 0 && prev.timestamp >= before)
                || (after > 0 && prev.timestamp < after)
            {
                continue;
            }

            // The newest record reused this entry's data sectors; older
            // entries are stale too.
            if prev.begin_sector_offset <= last.end_sector_addr()
                && prev.end_sector_addr() >= last.end_sector_addr()
            {
                break;
            }

            entries.push(prev);
        }

        if !descending {
            entries.reverse();
        }
        trace!("collected {} entries", entries.len());
        Ok(entries)
    }

    /// Remove all entries and reset the cursors to the start of the ring.
    pub fn clear<D: BlockDevice<SECTOR_SIZE>>(
        &mut self,
        io: &mut D,
    ) -> Result<(), Error<D::Error>> {
        for i in 0..self.n_header_sectors {
            self.load_header_sector(io, i)?;
            self.current.clear();
            self.sync_current_sector(io)?;
        }

        self.load_header_sector(io, 0)?;
        self.current_slot_idx = 0;
        self.current_data_sector_offset = 0;
        self.previous_timestamp = 0;
        info!("header ring cleared");
        Ok(())
    }
}
