//! Time structures for poll deadlines.
//!
//! [`Instant`] is an absolute time value, [`Expiration`] the optional bound
//! on how long an event loop may keep spinning.
//!
//! [`Instant`]: struct.Instant.html
//! [`Expiration`]: enum.Expiration.html
use core::{fmt, ops};

pub use core::time::Duration;

/// A representation of an absolute time value.
///
/// The `Instant` type is a wrapper around an `i64` value that represents a
/// number of milliseconds, monotonically increasing since an arbitrary
/// moment in time, such as system startup.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant {
    /// Milliseconds since the arbitrary starting point.
    pub millis: i64,
}

/// An expiration time, inversion of `Option`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    /// Expires at the contained time.
    When(Instant),
    /// Never expires.
    Never,
}

impl Instant {
    /// Create a new `Instant` from a number of milliseconds.
    pub fn from_millis<T: Into<i64>>(millis: T) -> Instant {
        Instant { millis: millis.into() }
    }

    /// Create a new `Instant` from a number of seconds.
    pub fn from_secs<T: Into<i64>>(secs: T) -> Instant {
        Instant { millis: secs.into() * 1000 }
    }

    /// Create a new `Instant` from the current [std::time::SystemTime].
    ///
    /// [std::time::SystemTime]: https://doc.rust-lang.org/std/time/struct.SystemTime.html
    #[cfg(feature = "std")]
    pub fn now() -> Instant {
        let n = ::std::time::SystemTime::now()
            .duration_since(::std::time::UNIX_EPOCH)
            .expect("start time must not be before the unix epoch");
        Self::from_millis(n.as_secs() as i64 * 1000 + i64::from(n.subsec_millis()))
    }

    /// The total number of milliseconds that have passed since the beginning
    /// of time.
    pub fn total_millis(&self) -> i64 {
        self.millis
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:03}s", self.millis / 1000, self.millis % 1000)
    }
}

impl ops::Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        Instant::from_millis(self.millis + rhs.as_millis() as i64)
    }
}

impl ops::AddAssign<Duration> for Instant {
    fn add_assign(&mut self, rhs: Duration) {
        self.millis += rhs.as_millis() as i64;
    }
}

impl Expiration {
    /// Whether the deadline has passed at time `now`.
    pub fn is_elapsed(&self, now: Instant) -> bool {
        match self {
            Expiration::When(at) => now >= *at,
            Expiration::Never => false,
        }
    }
}

impl Default for Expiration {
    fn default() -> Self {
        Expiration::Never
    }
}

impl From<Option<Instant>> for Expiration {
    fn from(when: Option<Instant>) -> Self {
        match when {
            Some(at) => Expiration::When(at),
            None => Expiration::Never,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_comparison() {
        let bound = Expiration::When(Instant::from_millis(100));
        assert!(!bound.is_elapsed(Instant::from_millis(99)));
        assert!(bound.is_elapsed(Instant::from_millis(100)));
        assert!(!Expiration::Never.is_elapsed(Instant::from_secs(1 << 20)));
    }

    #[test]
    fn add_duration() {
        let base = Instant::from_secs(1);
        assert_eq!(base + Duration::from_millis(234), Instant::from_millis(1234));
    }
}
