//! Error type for series and header-manager operations.

/// Error enum shared by every fallible tsring operation.
///
/// `E` is the error type of the underlying [`BlockDevice`]
/// (`tsring_block_device::BlockDevice::Error`); device failures are wrapped
/// verbatim in [`Error::Io`]. Corrupt header sectors are *not* an error:
/// they are healed (zeroed and re-written) while a series is opened.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<E> {
    /// The underlying device rejected a sector access.
    Io(E),
    /// A record of zero bytes was inserted.
    ZeroDataSize,
    /// A record does not fit the data area (or exceeds `max_file_size`).
    DataTooBig,
    /// A streaming chunk or read length is not a sector multiple and not
    /// the exact tail of the record.
    UnalignedChunk,
    /// A write past the reserved size, or into a finalized transaction.
    Overflow,
    /// Accumulated CRC does not match the stored checksum.
    ///
    /// Never produced by the library itself; reserved for callers that
    /// compare [`DataLogEntry::accumulated_crc`](crate::DataLogEntry::accumulated_crc)
    /// against the entry checksum after a streaming read.
    CorruptedData,
}

impl<E: core::fmt::Debug> core::fmt::Display for Error<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "IO error: {err:?}"),
            Error::ZeroDataSize => write!(f, "zero data size"),
            Error::DataTooBig => write!(f, "data size too big"),
            Error::UnalignedChunk => write!(f, "length is not a sector multiple"),
            Error::Overflow => write!(f, "write overflows the reserved record"),
            Error::CorruptedData => write!(f, "checksum mismatch"),
        }
    }
}

#[cfg(feature = "std")]
impl<E: core::fmt::Debug> std::error::Error for Error<E> {}
