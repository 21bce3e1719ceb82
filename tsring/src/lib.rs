//! An embedded, sector-addressed time-series log implemented in Rust.
//!
//! tsring partitions a sector-granular storage device into independent
//! regions; each region holds one [`Series`]: an ordered sequence of
//! opaque variable-size records, each with a timestamp, an attribute word
//! and a CRC-32 integrity tag. Records append with wraparound: once the
//! fixed metadata capacity is exhausted the oldest records are overwritten.
//!
//! The on-disk state is self-describing. Reopening a series reconstructs
//! the next-write position and the iteration starting point from the header
//! sectors alone, so there is no explicit head or tail pointer to lose in a
//! power cut, and a torn header write is detected by CRC and healed.
//!
//! # Usage
//!
//! ```toml
//! [dependencies]
//! tsring = "0.1"
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use tsring::{Partition, Series, SeriesConfig};
//!
//! let io = /* anything implementing tsring_block_device::BlockDevice<512> */;
//! let partition = Partition::new(0, 1024);
//! let series = Series::new(io, partition, SeriesConfig {
//!     max_entries: 100,
//!     max_file_size: 8 * 1024,
//! })?;
//!
//! series.insert(b"hello, world")?;
//!
//! series.iterate(|record| {
//!     let mut buf = vec![0u8; record.entry().size as usize];
//!     record.read(&mut buf).unwrap();
//!     assert_eq!(record.accumulated_crc(), record.entry().checksum);
//!     true
//! })?;
//! ```
//!
//! # Threading and Concurrency
//!
//! A [`Series`] owns one blocking mutex; `insert`, `iterate`, `clear`,
//! `sync` and `begin_insert_transaction` are linearized by it. A live
//! [`InsertTransaction`] holds the lock until it finalizes or drops, which
//! is what makes streaming writes safe. Two series on disjoint partitions
//! of the same device are independent and may be driven from different
//! threads.
//!
//! On `no_std` targets enable the `spin` feature to replace the std mutex
//! with a spinlock.

#![cfg_attr(not(feature = "std"), no_std)]
#![warn(clippy::pedantic)]
#![allow(
    clippy::module_name_repetitions,
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc
)]

extern crate alloc;

#[cfg(not(any(feature = "std", feature = "spin")))]
compile_error!("Enable either the `std` or the `spin` feature to provide a mutex.");

// MUST be the first module listed
mod fmt;

mod checksum;
mod cursor;
mod error;
mod manager;
mod partition;
mod sector;
mod series;
mod time;
mod transaction;

pub use crate::checksum::{Checksum, Crc32};
pub use crate::cursor::DataLogEntry;
pub use crate::error::Error;
pub use crate::manager::{AbsoluteSectorAddress, HeaderSectorsManager, RelativeSectorAddress};
pub use crate::partition::Partition;
pub use crate::sector::{HeaderSector, LogEntry, SECTOR_SIZE, min_sector_for_size};
pub use crate::series::{Series, SeriesConfig};
pub use crate::time::{Clock, NullClock, SystemClock};
pub use crate::transaction::InsertTransaction;

pub use tsring_block_device::BlockDevice;
