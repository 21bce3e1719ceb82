//! Core block device abstraction for the tsring ecosystem.
//!
//! This crate provides the fundamental [`BlockDevice`] trait that defines
//! how storage devices are accessed in a sector-oriented manner.
//!
//! # Features
//!
//! - `no_std` compatible by default
//! - Synchronous, blocking design (no executor required)
//! - Byte-granular helper methods layered on top of the sector-granular
//!   contract, for records whose length is not a sector multiple
//!
//! # Example
//!
//! ```ignore
//! use tsring_block_device::BlockDevice;
//!
//! struct MyDevice;
//!
//! impl BlockDevice<512> for MyDevice {
//!     type Error = std::io::Error;
//!
//!     fn read_sectors(&mut self, buf: &mut [u8], begin_sector: u32, n_sectors: u32)
//!         -> Result<(), Self::Error> {
//!         // Read implementation
//!         Ok(())
//!     }
//!
//!     fn write_sectors(&mut self, buf: &[u8], begin_sector: u32, n_sectors: u32)
//!         -> Result<(), Self::Error> {
//!         // Write implementation
//!         Ok(())
//!     }
//!
//!     fn n_sectors(&self) -> u32 {
//!         2048 // 1MB device at 512B sectors
//!     }
//! }
//! ```

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

/// A trait for sector-addressed block devices.
///
/// [`BlockDevice<const SIZE: usize>`](BlockDevice) can be initialized with
/// the following parameters.
///
/// - `const SIZE`: The size of a sector in bytes.
/// - `type Error`: The error type for the implementation.
///
/// All addresses are zero indexed, and the unit is sectors. For example to
/// read bytes from 1024 to 1536 on a 512 byte sector device, the supplied
/// sector address would be 2.
///
/// Implementations must reject accesses past the end of the device
/// (`begin_sector + n_sectors > self.n_sectors()`) with their own error.
///
/// This trait can be implemented multiple times to support various
/// different sector sizes.
pub trait BlockDevice<const SIZE: usize> {
    /// The error type for the BlockDevice implementation.
    type Error: core::fmt::Debug;

    /// Read `n_sectors` whole sectors starting at `begin_sector`.
    ///
    /// `buf` must be at least `n_sectors * SIZE` bytes; only that prefix is
    /// filled.
    fn read_sectors(
        &mut self,
        buf: &mut [u8],
        begin_sector: u32,
        n_sectors: u32,
    ) -> Result<(), Self::Error>;

    /// Write `n_sectors` whole sectors starting at `begin_sector`.
    ///
    /// `buf` must be at least `n_sectors * SIZE` bytes; only that prefix is
    /// written.
    fn write_sectors(
        &mut self,
        buf: &[u8],
        begin_sector: u32,
        n_sectors: u32,
    ) -> Result<(), Self::Error>;

    /// Report the size of the device in sectors.
    fn n_sectors(&self) -> u32;

    /// Write `buf.len()` bytes starting at the beginning of `sector_addr`.
    ///
    /// Whole sectors are written directly from `buf`; a trailing fragment is
    /// staged through a scratch sector and zero-padded to `SIZE`, so no
    /// bytes beyond `buf` ever reach the medium. Writing an empty buffer is
    /// a no-op.
    ///
    /// # Errors
    ///
    /// Propagates the underlying device error.
    fn write_bytes_to_sectors(&mut self, buf: &[u8], sector_addr: u32) -> Result<(), Self::Error> {
        if buf.is_empty() {
            return Ok(());
        }
        let n_sectors = buf.len().div_ceil(SIZE) as u32;
        let partial = buf.len() % SIZE;
        if partial == 0 {
            return self.write_sectors(buf, sector_addr, n_sectors);
        }
        if n_sectors > 1 {
            let full = (n_sectors - 1) as usize * SIZE;
            self.write_sectors(&buf[..full], sector_addr, n_sectors - 1)?;
        }
        let mut tail = [0u8; SIZE];
        tail[..partial].copy_from_slice(&buf[buf.len() - partial..]);
        self.write_sectors(&tail, sector_addr + n_sectors - 1, 1)
    }

    /// Read `buf.len()` bytes starting at the beginning of `sector_addr`.
    ///
    /// Symmetric to [`write_bytes_to_sectors`](Self::write_bytes_to_sectors):
    /// the final sector is read into a scratch buffer and only the trailing
    /// `len mod SIZE` bytes are copied out. Reading into an empty buffer is
    /// a no-op.
    ///
    /// # Errors
    ///
    /// Propagates the underlying device error.
    fn read_bytes_from_sectors(
        &mut self,
        buf: &mut [u8],
        sector_addr: u32,
    ) -> Result<(), Self::Error> {
        if buf.is_empty() {
            return Ok(());
        }
        let n_sectors = buf.len().div_ceil(SIZE) as u32;
        let partial = buf.len() % SIZE;
        if partial == 0 {
            return self.read_sectors(buf, sector_addr, n_sectors);
        }
        if n_sectors > 1 {
            let full = (n_sectors - 1) as usize * SIZE;
            self.read_sectors(&mut buf[..full], sector_addr, n_sectors - 1)?;
        }
        let mut tail = [0u8; SIZE];
        self.read_sectors(&mut tail, sector_addr + n_sectors - 1, 1)?;
        let offset = buf.len() - partial;
        buf[offset..].copy_from_slice(&tail[..partial]);
        Ok(())
    }
}

impl<const SIZE: usize, T: BlockDevice<SIZE> + ?Sized> BlockDevice<SIZE> for &mut T {
    type Error = T::Error;

    fn read_sectors(
        &mut self,
        buf: &mut [u8],
        begin_sector: u32,
        n_sectors: u32,
    ) -> Result<(), Self::Error> {
        (**self).read_sectors(buf, begin_sector, n_sectors)
    }

    fn write_sectors(
        &mut self,
        buf: &[u8],
        begin_sector: u32,
        n_sectors: u32,
    ) -> Result<(), Self::Error> {
        (**self).write_sectors(buf, begin_sector, n_sectors)
    }

    fn n_sectors(&self) -> u32 {
        (**self).n_sectors()
    }
}
