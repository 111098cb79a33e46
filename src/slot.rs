use chrono::{
    Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc,
    Weekday,
};
use chrono_tz::Tz;
use core::cmp::Ordering;
use core::convert::TryFrom;
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Format shared by `Display` and `FromStr`. Minute precision, no seconds,
/// no offset suffix. The instant is always UTC.
const SLOT_KEY_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SlotKeyError {
    #[error("slot key {0:?} is not of the form YYYY-MM-DDTHH:MM")]
    Malformed(String),
}

/// Canonical identity of a slot: a UTC instant truncated to the minute,
/// rendered as `YYYY-MM-DDTHH:MM`.
///
/// Two plans generating the same wall-clock slot in the same timezone produce
/// the same key, which is what makes cross-participant aggregation by key
/// correct. Ordering is chronological, which coincides with lexicographic
/// ordering of the rendered form.
///
/// # Examples
/// ```
/// use slotplan_libs::slot::SlotKey;
///
/// let key: SlotKey = "2025-01-06T09:00".parse().unwrap();
/// assert_eq!(key.to_string(), "2025-01-06T09:00");
///
/// // Seconds and offset suffixes are rejected, not silently accepted
/// assert!("2025-01-06T09:00:00".parse::<SlotKey>().is_err());
/// assert!("2025-01-06T09:00Z".parse::<SlotKey>().is_err());
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SlotKey(NaiveDateTime);

impl SlotKey {
    /// Resolves a wall-clock (date, time) in `zone` to its canonical UTC key.
    ///
    /// DST policy, fixed rather than left to library defaults:
    /// - unambiguous wall times map directly;
    /// - a fall-back overlap resolves to the earlier UTC instant
    ///   (pre-transition offset);
    /// - a spring-forward gap resolves by applying the offset in force
    ///   immediately before the transition, so the skipped wall time lands
    ///   just after the gap.
    ///
    /// # Examples
    /// ```
    /// use chrono::{NaiveDate, NaiveTime};
    /// use chrono_tz::Tz;
    /// use slotplan_libs::slot::SlotKey;
    ///
    /// let zone: Tz = "America/New_York".parse().unwrap();
    /// let key = SlotKey::from_local(
    ///     NaiveDate::from_ymd_opt(2025, 1, 6).unwrap(),
    ///     NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
    ///     zone,
    /// );
    /// assert_eq!(key.to_string(), "2025-01-06T14:00");
    /// ```
    pub fn from_local(date: NaiveDate, time: NaiveTime, zone: Tz) -> SlotKey {
        let wall = NaiveDateTime::new(date, time);

        let resolved = match zone.from_local_datetime(&wall) {
            LocalResult::Single(instant) => instant,
            LocalResult::Ambiguous(earlier, _) => earlier,
            LocalResult::None => Self::resolve_gap(wall, zone),
        };

        SlotKey(truncate_to_minute(resolved.naive_utc()))
    }

    /// A wall time inside a spring-forward gap: anchor on the last wall time
    /// before the transition and carry the elapsed duration across it. Gaps
    /// are usually one hour; the widest on record (a skipped calendar day)
    /// stays within the probe window.
    fn resolve_gap(wall: NaiveDateTime, zone: Tz) -> chrono::DateTime<Tz> {
        for hours in 1..=48 {
            let probe = wall - Duration::hours(hours);
            if let Some(anchor) = zone.from_local_datetime(&probe).earliest() {
                return anchor + Duration::hours(hours);
            }
        }

        // No resolvable wall time within two days of the input. Not reachable
        // with real tz data; read the input as UTC rather than panic.
        Utc.from_utc_datetime(&wall).with_timezone(&zone)
    }

    /// The UTC instant this key names.
    pub fn instant(self) -> chrono::DateTime<Utc> {
        Utc.from_utc_datetime(&self.0)
    }

    /// Renders this key in `zone` for display grouping. The inverse of
    /// [`SlotKey::from_local`] outside the documented DST-ambiguous instants.
    ///
    /// # Examples
    /// ```
    /// use chrono::Weekday;
    /// use chrono_tz::Tz;
    /// use slotplan_libs::slot::SlotKey;
    ///
    /// let zone: Tz = "America/New_York".parse().unwrap();
    /// let key: SlotKey = "2025-01-06T14:00".parse().unwrap();
    /// let local = key.to_local(zone);
    ///
    /// assert_eq!(local.local_date.to_string(), "2025-01-06");
    /// assert_eq!(local.local_time.format("%H:%M").to_string(), "09:00");
    /// assert_eq!(local.day_of_week, Weekday::Mon);
    /// ```
    pub fn to_local(self, zone: Tz) -> LocalSlot {
        let local = self.instant().with_timezone(&zone);

        LocalSlot {
            local_date: local.date_naive(),
            local_time: truncate_to_minute(local.naive_local()).time(),
            day_of_week: local.weekday(),
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(SLOT_KEY_FORMAT))
    }
}

impl FromStr for SlotKey {
    type Err = SlotKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDateTime::parse_from_str(s, SLOT_KEY_FORMAT)
            .map(SlotKey)
            .map_err(|_| SlotKeyError::Malformed(s.to_string()))
    }
}

impl TryFrom<String> for SlotKey {
    type Error = SlotKeyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SlotKey> for String {
    fn from(key: SlotKey) -> String {
        key.to_string()
    }
}

/// A slot key rendered in some timezone. Display-only view; the key stays
/// the identity.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LocalSlot {
    pub local_date: NaiveDate,
    pub local_time: NaiveTime,
    pub day_of_week: Weekday,
}

/// One discrete time interval of a plan. Derived from the recurrence
/// specification on demand, never persisted as its own entity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    #[serde(rename = "slotKey")]
    pub key: SlotKey,
    pub local_date: NaiveDate,
    #[serde(with = "hhmm")]
    pub local_time: NaiveTime,
    #[serde(with = "weekday_index")]
    pub day_of_week: Weekday,
}

impl PartialOrd for Slot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Slot {
    /// Local generation order: by local day, then local time within the day.
    /// Around a DST transition this can differ from UTC key order.
    fn cmp(&self, other: &Self) -> Ordering {
        self.local_date
            .cmp(&other.local_date)
            .then_with(|| self.local_time.cmp(&other.local_time))
    }
}

fn truncate_to_minute(dt: NaiveDateTime) -> NaiveDateTime {
    dt.with_second(0)
        .and_then(|dt| dt.with_nanosecond(0))
        .unwrap_or(dt)
}

/// Serde for wall-clock times as `"HH:MM"`, the shape the external API uses.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&time.format("%H:%M"))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&s, "%H:%M")
            .map_err(|_| de::Error::custom(format!("time {:?} is not of the form HH:MM", s)))
    }
}

/// Serde for weekdays as 0=Sunday..6=Saturday indices.
pub mod weekday_index {
    use chrono::Weekday;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(day: &Weekday, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(day.num_days_from_sunday() as u8)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Weekday, D::Error>
    where
        D: Deserializer<'de>,
    {
        let index = u8::deserialize(deserializer)?;
        super::weekday_from_index(index)
            .ok_or_else(|| de::Error::custom(format!("weekday index {} is outside 0..=6", index)))
    }
}

pub(crate) fn weekday_from_index(index: u8) -> Option<Weekday> {
    match index {
        0 => Some(Weekday::Sun),
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(name: &str) -> Tz {
        name.parse().unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn parses_and_renders_canonical_form() {
        let key: SlotKey = "2025-01-06T09:30".parse().unwrap();
        assert_eq!(key.to_string(), "2025-01-06T09:30");
    }

    #[test]
    fn rejects_non_canonical_forms() {
        for bad in [
            "2025-01-06T09:30:00",
            "2025-01-06T09:30Z",
            "2025-01-06T09:30+00:00",
            "2025-01-06 09:30",
            "2025-01-06",
            "junk",
        ] {
            assert_eq!(
                bad.parse::<SlotKey>(),
                Err(SlotKeyError::Malformed(bad.to_string())),
                "{} should not parse",
                bad
            );
        }
    }

    #[test]
    fn key_order_matches_string_order() {
        let keys = ["2024-12-31T23:45", "2025-01-01T00:00", "2025-06-15T12:30"];
        for pair in keys.windows(2) {
            let a: SlotKey = pair[0].parse().unwrap();
            let b: SlotKey = pair[1].parse().unwrap();
            assert!(a < b);
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn utc_wall_time_maps_straight_through() {
        let key = SlotKey::from_local(date(2025, 1, 6), time(9, 0), zone("UTC"));
        assert_eq!(key.to_string(), "2025-01-06T09:00");
    }

    #[test]
    fn spring_forward_gap_uses_pre_transition_offset() {
        // America/New_York skips 02:00-03:00 on 2025-03-09. 02:30 resolves
        // with the EST offset (-05:00) still in force before the jump.
        let key = SlotKey::from_local(date(2025, 3, 9), time(2, 30), zone("America/New_York"));
        assert_eq!(key.to_string(), "2025-03-09T07:30");
    }

    #[test]
    fn fall_back_overlap_resolves_to_earlier_instant() {
        // 01:30 occurs twice on 2024-11-03; the first occurrence is EDT (-04:00).
        let key = SlotKey::from_local(date(2024, 11, 3), time(1, 30), zone("America/New_York"));
        assert_eq!(key.to_string(), "2024-11-03T05:30");
    }

    #[test]
    fn round_trips_through_local_view() {
        let zone = zone("Europe/Berlin");
        let local_date = date(2025, 7, 21);
        let local_time = time(14, 15);

        let key = SlotKey::from_local(local_date, local_time, zone);
        let local = key.to_local(zone);

        assert_eq!(local.local_date, local_date);
        assert_eq!(local.local_time, local_time);
        assert_eq!(local.day_of_week, Weekday::Mon);
    }

    #[test]
    fn serializes_as_bare_string() {
        let key: SlotKey = "2025-01-06T09:00".parse().unwrap();
        assert_eq!(
            serde_json::to_string(&key).unwrap(),
            "\"2025-01-06T09:00\""
        );
        let back: SlotKey = serde_json::from_str("\"2025-01-06T09:00\"").unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn slot_serde_shape_matches_api() {
        let zone = zone("UTC");
        let key = SlotKey::from_local(date(2025, 1, 6), time(9, 0), zone);
        let slot = Slot {
            key,
            local_date: date(2025, 1, 6),
            local_time: time(9, 0),
            day_of_week: Weekday::Mon,
        };

        let json = serde_json::to_value(&slot).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "slotKey": "2025-01-06T09:00",
                "localDate": "2025-01-06",
                "localTime": "09:00",
                "dayOfWeek": 1,
            })
        );
        assert_eq!(serde_json::from_value::<Slot>(json).unwrap(), slot);
    }
}
