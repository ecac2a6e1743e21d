use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_with::{DeserializeFromStr, SerializeDisplay};

/// Counter values per millisecond before the clock borrows the next one
const COUNTER_LIMIT: u32 = 1_000_000;
/// Largest millisecond value that fits the 13 digit rendering
pub const MAX_MILLIS: u64 = 9_999_999_999_999;
/// How far ahead of the local wall clock an observed stamp may be
pub const MAX_FORWARD_DRIFT_MS: u64 = 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed ordering timestamp: {0}")]
pub struct MalformedTimestamp(String);

/// Total order for encrypted updates
///
/// Rendered as `{millis:013}-{counter:06}`. Both parts are fixed width, so
/// comparing the strings gives the same order as comparing the values.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, SerializeDisplay, DeserializeFromStr,
)]
pub struct OrderingTimestamp {
    millis: u64,
    counter: u32,
}

impl OrderingTimestamp {
    /// The largest stamp that still renders in fixed width
    pub const MAX: Self = Self {
        millis: MAX_MILLIS,
        counter: COUNTER_LIMIT - 1,
    };

    /// Out of range parts are clamped so the rendering stays fixed width
    pub fn new(millis: u64, counter: u32) -> Self {
        Self {
            millis: millis.min(MAX_MILLIS),
            counter: counter.min(COUNTER_LIMIT - 1),
        }
    }

    pub fn millis(&self) -> u64 {
        self.millis
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }
}

impl fmt::Display for OrderingTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:013}-{:06}", self.millis, self.counter)
    }
}

impl FromStr for OrderingTimestamp {
    type Err = MalformedTimestamp;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || MalformedTimestamp(s.to_string());
        let (millis, counter) = s.split_once('-').ok_or_else(malformed)?;
        if millis.len() != 13 || counter.len() != 6 {
            return Err(malformed());
        }
        if !millis.bytes().chain(counter.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        Ok(Self {
            millis: millis.parse().map_err(|_| malformed())?,
            counter: counter.parse().map_err(|_| malformed())?,
        })
    }
}

/// Hybrid logical clock stamping outgoing updates
///
/// Never goes backwards, even if the wall clock does: each stamp is strictly
/// greater than every stamp this clock produced or observed before it, until
/// [`OrderingTimestamp::MAX`], where it saturates.
///
/// Remote stamps more than [`MAX_FORWARD_DRIFT_MS`] ahead of the local wall
/// clock are not folded in, so one peer with a broken clock cannot drag
/// every later local stamp to the end of the range.
#[derive(Debug, Clone, Default)]
pub struct UpdateClock {
    last: Arc<Mutex<OrderingTimestamp>>,
}

impl UpdateClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&self) -> OrderingTimestamp {
        self.tick_at(wall_clock_millis())
    }

    /// Stamp as if the wall clock read `now` milliseconds
    pub fn tick_at(&self, now: u64) -> OrderingTimestamp {
        let now = now.min(MAX_MILLIS);
        let mut last = self.last.lock();
        let next = if now > last.millis {
            OrderingTimestamp::new(now, 0)
        } else if last.counter + 1 < COUNTER_LIMIT {
            OrderingTimestamp::new(last.millis, last.counter + 1)
        } else if last.millis < MAX_MILLIS {
            OrderingTimestamp::new(last.millis + 1, 0)
        } else {
            OrderingTimestamp::MAX
        };
        *last = next;
        next
    }

    /// Fold in a stamp seen on an incoming update
    pub fn observe(&self, remote: &OrderingTimestamp) -> bool {
        self.observe_at(remote, wall_clock_millis())
    }

    /// Fold in a remote stamp as if the wall clock read `now` milliseconds.
    ///
    /// Returns `false` if the stamp was too far in the future to accept.
    pub fn observe_at(&self, remote: &OrderingTimestamp, now: u64) -> bool {
        if remote.millis > now.saturating_add(MAX_FORWARD_DRIFT_MS) {
            tracing::warn!(stamp = %remote, now, "ignoring ordering stamp from the future");
            return false;
        }
        let mut last = self.last.lock();
        if *remote > *last {
            *last = *remote;
        }
        true
    }

    pub fn last(&self) -> OrderingTimestamp {
        *self.last.lock()
    }
}

fn wall_clock_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_format() {
        let ts = OrderingTimestamp::new(1_700_000_000_123, 42);
        assert_eq!(ts.to_string(), "1700000000123-000042");
        assert_eq!(OrderingTimestamp::new(5, 0).to_string(), "0000000000005-000000");
    }

    #[test]
    fn test_parse() {
        let ts: OrderingTimestamp = "1700000000123-000042".parse().unwrap();
        assert_eq!(ts, OrderingTimestamp::new(1_700_000_000_123, 42));

        for bad in ["", "1700000000123", "1700000000123-42", "170000000012-000042", "1700000000123-00004x", "+700000000123-000042"] {
            assert!(bad.parse::<OrderingTimestamp>().is_err(), "{bad}");
        }
    }

    #[test]
    fn test_string_order_matches_value_order() {
        let stamps = [
            OrderingTimestamp::new(999, 999_999),
            OrderingTimestamp::new(1_000, 0),
            OrderingTimestamp::new(1_000, 1),
            OrderingTimestamp::new(1_700_000_000_000, 0),
        ];
        for pair in stamps.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[0].to_string() < pair[1].to_string());
        }
    }

    #[test]
    fn test_tick_is_monotonic() {
        let clock = UpdateClock::new();
        let a = clock.tick_at(100);
        let b = clock.tick_at(100);
        // wall clock went backwards
        let c = clock.tick_at(50);
        let d = clock.tick_at(200);
        assert!(a < b && b < c && c < d);
        assert_eq!(c, OrderingTimestamp::new(100, 2));
        assert_eq!(d, OrderingTimestamp::new(200, 0));
    }

    #[test]
    fn test_counter_rollover() {
        let clock = UpdateClock::new();
        clock.observe(&OrderingTimestamp::new(100, COUNTER_LIMIT - 1));
        assert_eq!(clock.tick_at(100), OrderingTimestamp::new(101, 0));
    }

    #[test]
    fn test_observe_moves_clock_forward() {
        let clock = UpdateClock::new();
        clock.tick_at(100);
        clock.observe(&OrderingTimestamp::new(500, 7));
        assert_eq!(clock.tick_at(100), OrderingTimestamp::new(500, 8));

        // older remote stamps are ignored
        clock.observe(&OrderingTimestamp::new(10, 0));
        assert_eq!(clock.last(), OrderingTimestamp::new(500, 8));
    }

    #[test]
    fn test_far_future_stamp_is_not_observed() {
        let now = 1_700_000_000_000;
        let clock = UpdateClock::new();
        clock.tick_at(now);

        let hostile: OrderingTimestamp = "9999999999999-999999".parse().unwrap();
        assert!(!clock.observe_at(&hostile, now));

        let next = clock.tick_at(now);
        assert_eq!(next, OrderingTimestamp::new(now, 1));
        assert_eq!(next.to_string().parse::<OrderingTimestamp>().unwrap(), next);

        // small skew between devices is still folded in
        let ahead = OrderingTimestamp::new(now + 5_000, 3);
        assert!(clock.observe_at(&ahead, now));
        assert_eq!(clock.tick_at(now), OrderingTimestamp::new(now + 5_000, 4));
    }

    #[test]
    fn test_tick_saturates_at_max() {
        let clock = UpdateClock::new();
        assert!(clock.observe_at(&OrderingTimestamp::MAX, MAX_MILLIS));

        for _ in 0..3 {
            let next = clock.tick_at(MAX_MILLIS);
            assert_eq!(next, OrderingTimestamp::MAX);
            assert_eq!(next.to_string(), "9999999999999-999999");
            assert_eq!(next.to_string().parse::<OrderingTimestamp>().unwrap(), next);
        }

        // a wall clock past the range is clamped too
        let clock = UpdateClock::new();
        let next = clock.tick_at(u64::MAX);
        assert_eq!(next.to_string().len(), 20);
        assert_eq!(next.millis(), MAX_MILLIS);
    }

    #[test]
    fn test_new_clamps_to_rendered_width() {
        let ts = OrderingTimestamp::new(u64::MAX, u32::MAX);
        assert_eq!(ts, OrderingTimestamp::MAX);
        assert_eq!(ts.to_string().parse::<OrderingTimestamp>().unwrap(), ts);
    }

    #[test]
    fn test_clones_share_state() {
        let clock = UpdateClock::new();
        let other = clock.clone();
        let a = clock.tick_at(100);
        let b = other.tick_at(100);
        assert!(b > a);
    }
}
