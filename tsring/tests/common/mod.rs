//! Shared test fixtures: a RAM-backed block device and a stepping clock.

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tsring::{BlockDevice, Clock, SECTOR_SIZE};

/// Error returned by [`MemDevice`] for out-of-range accesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfRange;

/// RAM-backed sector device.
///
/// Clones share the same storage, which is how several series (or a series
/// and the test's own assertions) see one medium, like partitions of a
/// single flash chip.
#[derive(Clone)]
pub struct MemDevice {
    mem: Arc<Mutex<Vec<[u8; SECTOR_SIZE]>>>,
}

impl MemDevice {
    pub fn new(n_sectors: u32) -> Self {
        Self {
            mem: Arc::new(Mutex::new(vec![[0u8; SECTOR_SIZE]; n_sectors as usize])),
        }
    }

    /// Raw copy of one sector, for on-disk assertions.
    pub fn sector(&self, idx: u32) -> [u8; SECTOR_SIZE] {
        self.mem.lock().unwrap()[idx as usize]
    }

    /// Overwrite one raw sector, for simulating torn writes.
    pub fn patch_sector(&self, idx: u32, f: impl FnOnce(&mut [u8; SECTOR_SIZE])) {
        f(&mut self.mem.lock().unwrap()[idx as usize]);
    }
}

impl BlockDevice<SECTOR_SIZE> for MemDevice {
    type Error = OutOfRange;

    fn read_sectors(
        &mut self,
        buf: &mut [u8],
        begin_sector: u32,
        n_sectors: u32,
    ) -> Result<(), Self::Error> {
        let mem = self.mem.lock().unwrap();
        if begin_sector as usize + n_sectors as usize > mem.len() {
            return Err(OutOfRange);
        }
        for i in 0..n_sectors as usize {
            buf[i * SECTOR_SIZE..(i + 1) * SECTOR_SIZE]
                .copy_from_slice(&mem[begin_sector as usize + i]);
        }
        Ok(())
    }

    fn write_sectors(
        &mut self,
        buf: &[u8],
        begin_sector: u32,
        n_sectors: u32,
    ) -> Result<(), Self::Error> {
        let mut mem = self.mem.lock().unwrap();
        if begin_sector as usize + n_sectors as usize > mem.len() {
            return Err(OutOfRange);
        }
        for i in 0..n_sectors as usize {
            mem[begin_sector as usize + i]
                .copy_from_slice(&buf[i * SECTOR_SIZE..(i + 1) * SECTOR_SIZE]);
        }
        Ok(())
    }

    fn n_sectors(&self) -> u32 {
        self.mem.lock().unwrap().len() as u32
    }
}

/// Deterministic clock: every reading is one second after the previous one.
///
/// Clones share the counter, so a clock handed to a reopened series
/// continues where the previous instance stopped, like real wall time.
#[derive(Debug, Default, Clone)]
pub struct StepClock(Arc<AtomicU64>);

impl StepClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(seconds: u64) -> Self {
        Self(Arc::new(AtomicU64::new(seconds)))
    }
}

impl Clock for StepClock {
    fn now_seconds(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
