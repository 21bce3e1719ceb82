//! Pluggable checksum capability and the default CRC-32 implementation.

use crc::{CRC_32_BZIP2, Crc, Digest};

/// Incremental 32-bit checksum over a byte stream.
///
/// A fresh computer is created with [`Default`]; [`value`](Checksum::value)
/// may be called at any point to observe the checksum of the bytes fed so
/// far, and updating may continue afterwards. This is what lets a streaming
/// read accumulate its CRC chunk by chunk.
pub trait Checksum: Default {
    /// Feed `data` into the checksum.
    fn update(&mut self, data: &[u8]);

    /// Checksum of everything fed so far.
    fn value(&self) -> u32;
}

/// CRC-32 with polynomial `0x04C11DB7`, initial value `0xFFFFFFFF`, no bit
/// reflection, final XOR `0xFFFFFFFF`, processed MSB-first.
///
/// These are the `CRC-32/BZIP2` parameters (check value `0xFC891918` for
/// `"123456789"`), computed via the `crc` crate.
pub struct Crc32 {
    digest: Digest<'static, u32>,
}

static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_BZIP2);

impl Default for Crc32 {
    fn default() -> Self {
        Self {
            digest: CRC32.digest(),
        }
    }
}

impl Checksum for Crc32 {
    fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    fn value(&self) -> u32 {
        self.digest.clone().finalize()
    }
}

/// One-shot convenience over [`Checksum`].
pub(crate) fn checksum_of<S: Checksum>(data: &[u8]) -> u32 {
    let mut computer = S::default();
    computer.update(data);
    computer.value()
}
