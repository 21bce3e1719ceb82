//! Clock capability used when the caller does not supply a timestamp.

/// Source of wall-clock seconds.
///
/// The series consults the clock only for inserts whose caller-supplied
/// timestamp is `0`. Anything with one-second resolution works; timestamps
/// only need to be non-decreasing for recovery to stay cheap (a regression
/// is tolerated and bumped, see
/// [`Series::insert_with`](crate::Series::insert_with)).
pub trait Clock {
    /// Seconds since an arbitrary, monotonically referenced epoch.
    fn now_seconds(&self) -> u64;
}

/// [`Clock`] backed by [`std::time::SystemTime`].
///
/// This is the default clock of a [`Series`](crate::Series). The type is
/// always nameable; the [`Clock`] implementation requires the `std`
/// feature, so `no_std` builds must pass their own clock to
/// [`Series::with_clock`](crate::Series::with_clock).
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[cfg(feature = "std")]
impl Clock for SystemClock {
    fn now_seconds(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// [`Clock`] that always reports `0`.
///
/// With this clock every insert that omits its timestamp is bumped to
/// `previous + 1`, turning timestamps into plain sequence numbers. Useful
/// on targets without a time source.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullClock;

impl Clock for NullClock {
    fn now_seconds(&self) -> u64 {
        0
    }
}
