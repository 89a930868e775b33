use once_cell::sync::Lazy;
use regex::Regex;
use time::OffsetDateTime;

use crate::error::{StoreError, StoreResult};

pub const KEY_PREFIX: &str = "diary_";

static MANAGED_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^diary_(\d+)$").expect("managed key pattern compiles"));

/// Issues `diary_<epoch millis>` keys.
///
/// Keys double as the record's creation time. Two keys requested within the
/// same millisecond would collide, so the generator never issues a value at
/// or below the last one it handed out (or observed in the store) and bumps
/// by one millisecond instead.
#[derive(Debug, Clone, Default)]
pub struct KeyGenerator {
    last_issued: i64,
}

impl KeyGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_key(&mut self) -> String {
        self.next_at(now_millis())
    }

    /// Records a key that already exists so later keys sort after it.
    /// Keys that do not name a representable instant are ignored.
    pub fn observe(&mut self, key: &str) {
        if let Ok(millis) = parse_millis(key) {
            if from_millis(millis).is_some() {
                self.last_issued = self.last_issued.max(millis);
            }
        }
    }

    pub(crate) fn next_at(&mut self, now: i64) -> String {
        let millis = match self.last_issued.checked_add(1) {
            Some(next) if next > now => next,
            _ => now,
        };
        self.last_issued = millis;
        format_key(millis)
    }
}

pub fn format_key(millis: i64) -> String {
    format!("{KEY_PREFIX}{millis}")
}

pub fn is_managed(key: &str) -> bool {
    MANAGED_KEY.is_match(key)
}

pub fn creation_time_of(key: &str) -> StoreResult<OffsetDateTime> {
    let millis = parse_millis(key)?;
    from_millis(millis).ok_or_else(|| StoreError::MalformedKey(key.to_string()))
}

pub(crate) fn parse_millis(key: &str) -> StoreResult<i64> {
    MANAGED_KEY
        .captures(key)
        .and_then(|caps| caps.get(1))
        .and_then(|digits| digits.as_str().parse::<i64>().ok())
        .ok_or_else(|| StoreError::MalformedKey(key.to_string()))
}

pub(crate) fn now_millis() -> i64 {
    to_millis(OffsetDateTime::now_utc())
}

pub(crate) fn to_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

pub(crate) fn from_millis(millis: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn creation_time_round_trips_within_call_window() {
        let mut keys = KeyGenerator::new();
        let before = now_millis();
        let key = keys.new_key();
        let after = now_millis();

        let created = to_millis(creation_time_of(&key).expect("fresh key parses"));
        assert!(
            before <= created && created <= after,
            "{created} outside [{before}, {after}]"
        );
    }

    #[test]
    fn same_millisecond_requests_do_not_collide() {
        let mut keys = KeyGenerator::new();
        let first = keys.next_at(1_700_000_000_000);
        let second = keys.next_at(1_700_000_000_000);
        let third = keys.next_at(1_699_999_999_999);
        assert_eq!(first, "diary_1700000000000");
        assert_eq!(second, "diary_1700000000001");
        assert_eq!(third, "diary_1700000000002");
    }

    #[test]
    fn observed_keys_push_the_clock_forward() {
        let mut keys = KeyGenerator::new();
        keys.observe("diary_5000");
        keys.observe("settings");
        assert_eq!(keys.next_at(4000), "diary_5001");
        assert_eq!(keys.next_at(9000), "diary_9000");
    }

    #[test]
    fn out_of_range_keys_do_not_move_the_clock() {
        let mut keys = KeyGenerator::new();
        keys.observe("diary_300000000000000");
        keys.observe("diary_9223372036854775807");
        assert_eq!(keys.next_at(4000), "diary_4000");
        assert_eq!(keys.next_at(4000), "diary_4001");
    }

    #[test]
    fn next_key_does_not_overflow_at_the_top_of_the_range() {
        let mut keys = KeyGenerator {
            last_issued: i64::MAX,
        };
        assert_eq!(keys.next_at(1000), "diary_1000");
    }

    #[test]
    fn managed_keys_are_anchored() {
        assert!(is_managed("diary_1"));
        assert!(is_managed("diary_1700000000000"));
        assert!(!is_managed("diary_"));
        assert!(!is_managed("my_diary_12"));
        assert!(!is_managed("diary_12_draft"));
        assert!(!is_managed("theme"));
    }

    #[test]
    fn malformed_keys_are_rejected() {
        assert_matches!(creation_time_of("diary_x"), Err(StoreError::MalformedKey(k)) if k == "diary_x");
        assert_matches!(
            creation_time_of("diary_99999999999999999999999"),
            Err(StoreError::MalformedKey(_))
        );
    }
}
