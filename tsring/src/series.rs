//! Top-level series: one partition, one header ring, one lock.

#[cfg(feature = "std")]
use std::sync::Mutex;

#[cfg(not(feature = "std"))]
use spin::Mutex;

use tsring_block_device::BlockDevice;

use crate::checksum::{Checksum, Crc32, checksum_of};
use crate::cursor::DataLogEntry;
use crate::error::Error;
use crate::manager::HeaderSectorsManager;
use crate::partition::Partition;
use crate::sector::{HeaderSector, SECTOR_SIZE};
use crate::time::{Clock, SystemClock};
use crate::transaction::InsertTransaction;

/// Sizing configuration of one series.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesConfig {
    /// Requested number of retained records. Rounded up to whole header
    /// sectors; the effective capacity is `n_header_sectors() * 21`.
    pub max_entries: u32,
    /// Upper bound on a single record's size in bytes.
    pub max_file_size: u32,
}

impl SeriesConfig {
    /// Header sectors needed for `max_entries`.
    #[must_use]
    pub fn n_header_sectors(&self) -> u32 {
        self.max_entries / HeaderSector::N_ENTRIES as u32 + 1
    }
}

pub(crate) struct SeriesState<D, S: Checksum> {
    pub(crate) io: D,
    pub(crate) manager: HeaderSectorsManager<S>,
}

#[cfg(feature = "std")]
pub(crate) type StateGuard<'a, D, S> = std::sync::MutexGuard<'a, SeriesState<D, S>>;

#[cfg(not(feature = "std"))]
pub(crate) type StateGuard<'a, D, S> = spin::MutexGuard<'a, SeriesState<D, S>>;

/// One time-series log on one partition of a block device.
///
/// The series owns the device handle and coordinates the header-sectors
/// manager with data-sector I/O behind a single blocking mutex. All
/// operations are linearized by that mutex; a live [`InsertTransaction`]
/// holds it until finalized or dropped.
///
/// Generic over the device `D`, the [`Checksum`] implementation `S` used
/// for both header CRCs and record checksums, and the [`Clock`] `C`
/// consulted when an insert omits its timestamp.
pub struct Series<D, S: Checksum = Crc32, C = SystemClock> {
    state: Mutex<SeriesState<D, S>>,
    partition: Partition,
    cfg: SeriesConfig,
    clock: C,
}

#[cfg(feature = "std")]
impl<D: BlockDevice<SECTOR_SIZE>> Series<D> {
    /// Open (or create) a series on `partition`, running recovery.
    ///
    /// Torn header sectors are healed silently. Uses the [`SystemClock`]
    /// and CRC-32; see [`with_clock`](Series::with_clock) for injection.
    ///
    /// # Panics
    ///
    /// Panics if the configuration or partition is unusable: zero
    /// `max_file_size`, a header ring as large as the partition, or a
    /// partition extending past the device.
    pub fn new(io: D, partition: Partition, cfg: SeriesConfig) -> Result<Self, Error<D::Error>> {
        Self::with_clock(io, partition, cfg, SystemClock)
    }
}

impl<D: BlockDevice<SECTOR_SIZE>, S: Checksum, C: Clock> Series<D, S, C> {
    /// Open (or create) a series with an injected clock, running recovery.
    ///
    /// # Panics
    ///
    /// Same preconditions as [`new`](Series::new).
    pub fn with_clock(
        mut io: D,
        partition: Partition,
        cfg: SeriesConfig,
        clock: C,
    ) -> Result<Self, Error<D::Error>> {
        assert!(cfg.max_file_size > 0);
        let n_header_sectors = cfg.n_header_sectors();
        assert!(n_header_sectors < partition.n_sectors);
        assert!(partition.begin_sector_addr + partition.n_sectors <= io.n_sectors());

        let manager = HeaderSectorsManager::open(
            &mut io,
            partition.begin_sector_addr,
            n_header_sectors,
            partition.n_sectors,
        )?;

        Ok(Self {
            state: Mutex::new(SeriesState { io, manager }),
            partition,
            cfg,
            clock,
        })
    }

    /// The partition this series owns.
    #[must_use]
    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// The configuration the series was opened with.
    #[must_use]
    pub fn config(&self) -> &SeriesConfig {
        &self.cfg
    }

    fn lock_state(&self) -> StateGuard<'_, D, S> {
        #[cfg(feature = "std")]
        {
            self.state
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
        }
        #[cfg(not(feature = "std"))]
        {
            self.state.lock()
        }
    }

    fn resolve_timestamp(&self, timestamp: u64) -> u64 {
        if timestamp == 0 {
            self.clock.now_seconds()
        } else {
            timestamp
        }
    }

    /// Append one record, timestamped by the clock, with `attr == 0`.
    pub fn insert(&self, data: &[u8]) -> Result<(), Error<D::Error>> {
        self.insert_with(data, 0, 0)
    }

    /// Append one record atomically.
    ///
    /// A `timestamp` of `0` takes the current clock seconds; a timestamp
    /// smaller than the previous record's is bumped to `previous + 1`. The
    /// payload checksum is computed up front, the entry is reserved, and
    /// the data sectors are written with the final fragment zero-padded.
    pub fn insert_with(
        &self,
        data: &[u8],
        attr: u32,
        timestamp: u64,
    ) -> Result<(), Error<D::Error>> {
        let len = u32::try_from(data.len()).map_err(|_| Error::DataTooBig)?;
        if len == 0 {
            return Err(Error::ZeroDataSize);
        }
        if len > self.cfg.max_file_size {
            return Err(Error::DataTooBig);
        }

        let mut state = self.lock_state();
        let timestamp = self.resolve_timestamp(timestamp);
        let checksum = checksum_of::<S>(data);

        let SeriesState { io, manager } = &mut *state;
        let relative = manager.add_log(io, len, checksum, timestamp, attr)?;
        let absolute = manager.sector_addr_r2a(relative);
        io.write_bytes_to_sectors(data, absolute).map_err(Error::Io)
    }

    /// Reserve a slot for `len` bytes and open a streaming transaction,
    /// timestamped by the clock, with `attr == 0`.
    pub fn begin_insert_transaction(
        &self,
        len: u32,
    ) -> Result<InsertTransaction<'_, D, S>, Error<D::Error>> {
        self.begin_insert_transaction_with(len, 0, 0)
    }

    /// Reserve a slot for `len` bytes and open a streaming transaction.
    ///
    /// Acquires the series lock and keeps it inside the returned
    /// [`InsertTransaction`]; no other operation on this series can run
    /// until the transaction finalizes or drops.
    pub fn begin_insert_transaction_with(
        &self,
        len: u32,
        attr: u32,
        timestamp: u64,
    ) -> Result<InsertTransaction<'_, D, S>, Error<D::Error>> {
        if len == 0 {
            return Err(Error::ZeroDataSize);
        }
        if len > self.cfg.max_file_size {
            return Err(Error::DataTooBig);
        }

        let mut state = self.lock_state();
        let timestamp = self.resolve_timestamp(timestamp);

        let entry = state.manager.add_log_partial(len, timestamp, attr)?;
        let relative = entry.begin_sector_offset;
        let data_begin = state.manager.sector_addr_r2a(relative);

        Ok(InsertTransaction::new(state, data_begin, len))
    }

    /// Enumerate records newest-first, no timestamp window.
    ///
    /// The callback receives a [`DataLogEntry`] read cursor per record and
    /// returns `false` to stop early.
    pub fn iterate<F>(&self, f: F) -> Result<(), Error<D::Error>>
    where
        F: FnMut(&mut DataLogEntry<'_, D, S>) -> bool,
    {
        self.iterate_range(true, 0, 0, f)
    }

    /// Enumerate records, optionally windowed to
    /// `after <= timestamp < before` (a bound of `0` disables it).
    ///
    /// `descending == true` yields newest first.
    pub fn iterate_range<F>(
        &self,
        descending: bool,
        after: u64,
        before: u64,
        mut f: F,
    ) -> Result<(), Error<D::Error>>
    where
        F: FnMut(&mut DataLogEntry<'_, D, S>) -> bool,
    {
        let mut state = self.lock_state();
        let SeriesState { io, manager } = &mut *state;

        let entries = manager.get_entries(io, descending, after, before)?;
        let data_base = manager.sector_addr_r2a(0);

        for entry in entries {
            let mut record = DataLogEntry::new(entry, data_base, &mut *io);
            if !f(&mut record) {
                break;
            }
        }
        Ok(())
    }

    /// Erase every record and reset the write position.
    pub fn clear(&self) -> Result<(), Error<D::Error>> {
        let mut state = self.lock_state();
        let SeriesState { io, manager } = &mut *state;
        manager.clear(io)
    }

    /// Flush the live header sector.
    ///
    /// Entries written since the last sector boundary are durable only
    /// after a sync (or after an iteration, which syncs for consistency).
    pub fn sync(&self) -> Result<(), Error<D::Error>> {
        let mut state = self.lock_state();
        let SeriesState { io, manager } = &mut *state;
        manager.sync_current_sector(io)
    }
}
