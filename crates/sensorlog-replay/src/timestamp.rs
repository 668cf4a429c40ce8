//! Millisecond-resolution timestamps and the `<seconds>.<milliseconds>` line prefix

use core::fmt;
use core::ops::{Add, AddAssign, Sub, SubAssign};
use core::str::FromStr;

use crate::error::ReplayError;
use crate::scan;

const MILLIS_PER_SECOND: i64 = 1000;

/// A point in time as whole seconds plus milliseconds.
///
/// `milliseconds` is always normalised to `0..1000`; arithmetic carries and
/// borrows across the second boundary. Ordering is by seconds, then
/// milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    seconds: i64,
    milliseconds: i32,
}

impl Timestamp {
    /// The zero timestamp
    pub const ZERO: Timestamp = Timestamp {
        seconds: 0,
        milliseconds: 0,
    };

    /// Build a timestamp, normalising milliseconds outside `0..1000`.
    ///
    /// `Timestamp::new(1, 1500)` is `2.500`, `Timestamp::new(1, -1)` is `0.999`.
    pub fn new(seconds: i64, milliseconds: i64) -> Self {
        let carry = milliseconds.div_euclid(MILLIS_PER_SECOND);
        Self {
            seconds: seconds.saturating_add(carry),
            milliseconds: milliseconds.rem_euclid(MILLIS_PER_SECOND) as i32,
        }
    }

    /// Timestamp `millis` milliseconds after zero
    pub fn from_millis(millis: i64) -> Self {
        Self::new(0, millis)
    }

    /// Whole seconds
    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    /// Milliseconds within the second, in `0..1000`
    pub fn milliseconds(&self) -> i32 {
        self.milliseconds
    }

    /// Total milliseconds since zero (saturating)
    pub fn as_millis(&self) -> i64 {
        self.seconds
            .saturating_mul(MILLIS_PER_SECOND)
            .saturating_add(i64::from(self.milliseconds))
    }

    /// `self - other` in milliseconds (saturating)
    pub fn diff_millis(&self, other: &Timestamp) -> i64 {
        self.seconds
            .saturating_sub(other.seconds)
            .saturating_mul(MILLIS_PER_SECOND)
            .saturating_add(i64::from(self.milliseconds) - i64::from(other.milliseconds))
    }

    /// Shift by a signed number of milliseconds
    pub fn add_millis(&self, delta: i64) -> Self {
        Self::new(self.seconds, i64::from(self.milliseconds).saturating_add(delta))
    }
}

impl Add<i64> for Timestamp {
    type Output = Timestamp;

    fn add(self, delta: i64) -> Timestamp {
        self.add_millis(delta)
    }
}

impl Sub<i64> for Timestamp {
    type Output = Timestamp;

    fn sub(self, delta: i64) -> Timestamp {
        self.add_millis(delta.saturating_neg())
    }
}

impl Sub for Timestamp {
    type Output = i64;

    fn sub(self, other: Timestamp) -> i64 {
        self.diff_millis(&other)
    }
}

impl AddAssign<i64> for Timestamp {
    fn add_assign(&mut self, delta: i64) {
        *self = self.add_millis(delta);
    }
}

impl SubAssign<i64> for Timestamp {
    fn sub_assign(&mut self, delta: i64) {
        *self = self.add_millis(delta.saturating_neg());
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:03}", self.seconds, self.milliseconds)
    }
}

impl FromStr for Timestamp {
    type Err = ReplayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.trim().as_bytes();
        match parse_prefix(bytes) {
            Some((timestamp, end)) if end == bytes.len() => Ok(timestamp),
            Some(_) => Err(ReplayError::malformed(bytes, "trailing text after timestamp")),
            None => Err(ReplayError::malformed(bytes, "expected <seconds>.<milliseconds>")),
        }
    }
}

/// Parse the timestamp prefix of a log line.
///
/// Accepts leading blanks, an optionally signed seconds field, `.`, a
/// milliseconds field, then at least one blank (or the end of the line).
/// The milliseconds field is taken as a raw integer, so `1.5` is one second
/// and five milliseconds, and out-of-range values are normalised.
///
/// Returns the timestamp and the offset where the payload starts, just past
/// the separating blanks.
///
/// ```
/// use sensorlog_replay::timestamp::{Timestamp, parse_prefix};
///
/// let (ts, payload) = parse_prefix(b"12.250\t 42, 3\n").unwrap_or_default();
/// assert_eq!(ts, Timestamp::new(12, 250));
/// assert_eq!(payload, 8);
/// assert!(parse_prefix(b"12.250x").is_none());
/// ```
pub fn parse_prefix(line: &[u8]) -> Option<(Timestamp, usize)> {
    let start = scan::skip_blanks(line, 0);
    let (seconds, dot) = scan::signed_int(line, start)?;
    if line.get(dot) != Some(&b'.') {
        return None;
    }
    let (millis, end) = scan::unsigned_int(line, dot.checked_add(1)?)?;

    let payload = match line.get(end) {
        None | Some(b'\r' | b'\n') => end,
        Some(&b) if scan::is_blank(b) => scan::skip_blanks(line, end),
        Some(_) => return None,
    };
    Some((Timestamp::new(seconds, millis), payload))
}
