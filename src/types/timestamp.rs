//! Microsecond timestamps usable as tree items

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Signed microseconds since the Unix epoch
///
/// Orders chronologically and encodes as its raw 64-bit count, so a
/// timestamp tree on disk sorts the same way it does in memory.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const MIN: Timestamp = Timestamp(i64::MIN);
    pub const MAX: Timestamp = Timestamp(i64::MAX);
    pub const EPOCH: Timestamp = Timestamp(0);

    pub const fn from_micros(micros: i64) -> Self {
        Self(micros)
    }

    /// Saturates at [`Timestamp::MIN`]/[`Timestamp::MAX`]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis.saturating_mul(1_000))
    }

    /// Saturates at [`Timestamp::MIN`]/[`Timestamp::MAX`]
    pub const fn from_secs(secs: i64) -> Self {
        Self(secs.saturating_mul(1_000_000))
    }

    /// Wall-clock time; a clock set before the epoch yields [`Timestamp::EPOCH`]
    pub fn now() -> Self {
        Self::from(SystemTime::now())
    }

    pub const fn as_micros(self) -> i64 {
        self.0
    }

    pub const fn as_millis(self) -> i64 {
        self.0 / 1_000
    }

    pub const fn as_secs(self) -> i64 {
        self.0 / 1_000_000
    }

    /// Shift forward by `delta`, or `None` on overflow
    pub fn checked_add(self, delta: Duration) -> Option<Self> {
        let micros = i64::try_from(delta.as_micros()).ok()?;
        self.0.checked_add(micros).map(Self)
    }

    /// Shift backward by `delta`, or `None` on overflow
    pub fn checked_sub(self, delta: Duration) -> Option<Self> {
        let micros = i64::try_from(delta.as_micros()).ok()?;
        self.0.checked_sub(micros).map(Self)
    }

    /// Inclusive on both ends
    pub fn in_range(self, start: Timestamp, end: Timestamp) -> bool {
        (start..=end).contains(&self)
    }
}

impl From<SystemTime> for Timestamp {
    fn from(time: SystemTime) -> Self {
        let micros = time
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_micros()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        Self(micros)
    }
}

impl fmt::Display for Timestamp {
    /// `<seconds>.<micros>` relative to the epoch
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:06}", sign, abs / 1_000_000, abs % 1_000_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_conversions() {
        let ts = Timestamp::from_secs(1000);
        assert_eq!(ts.as_secs(), 1000);
        assert_eq!(ts.as_millis(), 1_000_000);
        assert_eq!(ts.as_micros(), 1_000_000_000);
        assert_eq!(Timestamp::from_millis(i64::MAX), Timestamp::MAX);
    }

    #[test]
    fn test_chronological_order() {
        assert!(Timestamp::from_secs(100) < Timestamp::from_secs(200));
        assert!(Timestamp::MIN < Timestamp::EPOCH);
        assert!(Timestamp::EPOCH < Timestamp::MAX);
        assert_eq!(Timestamp::default(), Timestamp::EPOCH);
    }

    #[test]
    fn test_range_is_inclusive() {
        let start = Timestamp::from_secs(100);
        let end = Timestamp::from_secs(200);
        assert!(start.in_range(start, end));
        assert!(end.in_range(start, end));
        assert!(!Timestamp::from_secs(50).in_range(start, end));
    }

    #[test]
    fn test_checked_shift() {
        let ts = Timestamp::from_secs(10);
        assert_eq!(ts.checked_add(Duration::from_millis(1500)), Some(Timestamp::from_micros(11_500_000)));
        assert_eq!(ts.checked_sub(Duration::from_secs(20)), Some(Timestamp::from_secs(-10)));
        assert_eq!(Timestamp::MAX.checked_add(Duration::from_micros(1)), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Timestamp::from_micros(1_500_000).to_string(), "1.500000");
        assert_eq!(Timestamp::from_micros(-2_000_001).to_string(), "-2.000001");
    }

    #[test]
    fn test_now_after_epoch() {
        assert!(Timestamp::now() > Timestamp::EPOCH);
        assert_eq!(Timestamp::from(UNIX_EPOCH - Duration::from_secs(5)), Timestamp::EPOCH);
    }
}
