use crate::participant::SlotMark;
use crate::slot::{weekday_from_index, Slot, SlotKey};
use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use chrono_tz::Tz;
use core::convert::TryFrom;
use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use thiserror::Error;

/// Hard ceiling on the slots a single plan may generate.
pub const MAX_PLAN_SLOTS: usize = 50_000;

/// Hard ceiling on the entries of a single availability upsert batch,
/// independent of plan size.
pub const MAX_BATCH_ENTRIES: usize = 10_000;

/// How many offending keys a foreign-key rejection names before eliding the
/// rest, to bound the message size.
const FOREIGN_KEY_SAMPLE: usize = 3;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("title must not be empty")]
    EmptyTitle,
    #[error("start date {start} is after end date {end}")]
    DateOrder { start: NaiveDate, end: NaiveDate },
    #[error("day start time {start} is not before day end time {end}")]
    TimeOrder { start: NaiveTime, end: NaiveTime },
    #[error("slot granularity must be 15, 30 or 60 minutes, got {0}")]
    BadGranularity(u32),
    #[error("working days must contain at least one weekday")]
    NoWorkingDays,
    #[error("working day index {0} is outside 0..=6")]
    BadWeekday(u8),
    #[error(
        "plan would generate {count} slots, over the limit of {max}; \
         shrink the date range or coarsen the slot granularity"
    )]
    TooManySlots { count: usize, max: usize },
    #[error("availability batch must not be empty")]
    EmptyBatch,
    #[error("availability batch of {count} entries is over the limit of {max}")]
    BatchTooLarge { count: usize, max: usize },
    #[error("{total} slot keys are not part of this plan (e.g. {sample})")]
    ForeignSlotKeys { total: usize, sample: String },
}

/// Allowed slot granularities. Anything else is rejected at the typed
/// boundary with a descriptive error.
///
/// # Examples
/// ```
/// use core::convert::TryFrom;
/// use slotplan_libs::plan::{PlanError, SlotMinutes};
///
/// assert_eq!(SlotMinutes::try_from(30), Ok(SlotMinutes::Thirty));
/// assert_eq!(SlotMinutes::try_from(45), Err(PlanError::BadGranularity(45)));
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum SlotMinutes {
    Fifteen,
    Thirty,
    Sixty,
}

impl SlotMinutes {
    pub fn minutes(self) -> u32 {
        match self {
            SlotMinutes::Fifteen => 15,
            SlotMinutes::Thirty => 30,
            SlotMinutes::Sixty => 60,
        }
    }
}

impl TryFrom<u32> for SlotMinutes {
    type Error = PlanError;

    fn try_from(minutes: u32) -> Result<Self, Self::Error> {
        match minutes {
            15 => Ok(SlotMinutes::Fifteen),
            30 => Ok(SlotMinutes::Thirty),
            60 => Ok(SlotMinutes::Sixty),
            other => Err(PlanError::BadGranularity(other)),
        }
    }
}

impl From<SlotMinutes> for u32 {
    fn from(slot: SlotMinutes) -> u32 {
        slot.minutes()
    }
}

/// The host-defined recurrence rule a plan's slot set derives from.
/// Wall-clock fields are interpreted in `timezone`; `working_days` are
/// 0=Sunday..6=Saturday indices.
///
/// Validated once at the boundary; the generator operates only on the
/// validated form.
///
/// # Examples
/// ```
/// use slotplan_libs::plan::{PlanSpec, SlotMinutes};
///
/// // A single Monday, 09:00-10:00, half-hour slots
/// let spec = PlanSpec {
///     title: "Standup planning".to_string(),
///     description: None,
///     timezone: "UTC".parse().unwrap(),
///     start_date: "2025-01-06".parse().unwrap(),
///     end_date: "2025-01-06".parse().unwrap(),
///     day_start: "09:00:00".parse().unwrap(),
///     day_end: "10:00:00".parse().unwrap(),
///     slot_minutes: SlotMinutes::Thirty,
///     working_days: [1].iter().copied().collect(),
/// };
///
/// assert!(spec.validate().is_ok());
///
/// let slots = spec.generate_slots();
/// let keys: Vec<String> = slots.iter().map(|s| s.key.to_string()).collect();
/// assert_eq!(keys, vec!["2025-01-06T09:00", "2025-01-06T09:30"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSpec {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub timezone: Tz,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(rename = "dayStartTime", with = "crate::slot::hhmm")]
    pub day_start: NaiveTime,
    #[serde(rename = "dayEndTime", with = "crate::slot::hhmm")]
    pub day_end: NaiveTime,
    pub slot_minutes: SlotMinutes,
    pub working_days: BTreeSet<u8>,
}

impl PlanSpec {
    /// Fail-fast guard over the whole specification. The first violation is
    /// terminal; nothing is partially applied.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.title.trim().is_empty() {
            return Err(PlanError::EmptyTitle);
        }
        if self.start_date > self.end_date {
            return Err(PlanError::DateOrder {
                start: self.start_date,
                end: self.end_date,
            });
        }
        if self.day_start >= self.day_end {
            return Err(PlanError::TimeOrder {
                start: self.day_start,
                end: self.day_end,
            });
        }
        if self.working_days.is_empty() {
            return Err(PlanError::NoWorkingDays);
        }
        if let Some(&bad) = self.working_days.iter().find(|&&day| day > 6) {
            return Err(PlanError::BadWeekday(bad));
        }

        let count = self.count_slots();
        if count > MAX_PLAN_SLOTS {
            return Err(PlanError::TooManySlots {
                count,
                max: MAX_PLAN_SLOTS,
            });
        }

        Ok(())
    }

    /// Materializes the plan's full slot set, in local generation order:
    /// chronological by local day, then by local time within the day. The
    /// result is never re-sorted by key; around a DST transition local order
    /// is what display grouping and ranking tie-breaks assume.
    pub fn generate_slots(&self) -> Vec<Slot> {
        let start = minutes_of(self.day_start);
        let end = minutes_of(self.day_end);
        let step = self.slot_minutes.minutes();

        let mut slots = Vec::with_capacity(self.count_slots());

        for day in self.working_day_dates() {
            let day_of_week = day.weekday();
            let mut minutes = start;

            // Minute arithmetic carries into hours on its own; 09:50 + 30
            // steps to 10:20.
            while minutes < end {
                let local_time = time_of(minutes);
                slots.push(Slot {
                    key: SlotKey::from_local(day, local_time, self.timezone),
                    local_date: day,
                    local_time,
                    day_of_week,
                });
                minutes += step;
            }
        }

        debug!(
            "generated {} slots between {} and {} in {}",
            slots.len(),
            self.start_date,
            self.end_date,
            self.timezone
        );

        slots
    }

    /// Same recurrence walk as [`PlanSpec::generate_slots`], count only.
    /// Cheap enough to run as a guard before materializing anything.
    pub fn count_slots(&self) -> usize {
        let start = minutes_of(self.day_start);
        let end = minutes_of(self.day_end);
        if end <= start {
            return 0;
        }

        let step = self.slot_minutes.minutes();
        let per_day = ((end - start + step - 1) / step) as usize;

        self.working_day_dates().count() * per_day
    }

    /// The currently valid key set, for guarding inbound availability
    /// batches.
    pub fn valid_keys(&self) -> HashSet<SlotKey> {
        self.generate_slots().iter().map(|slot| slot.key).collect()
    }

    /// Guards one availability upsert batch: non-empty, within the batch
    /// ceiling, and every key inside the plan's current generated set. A
    /// single foreign key rejects the whole batch before anything is
    /// written; stale keys from before a granularity change never reach the
    /// store.
    pub fn validate_batch(&self, entries: &[SlotMark]) -> Result<(), PlanError> {
        if entries.is_empty() {
            return Err(PlanError::EmptyBatch);
        }
        if entries.len() > MAX_BATCH_ENTRIES {
            return Err(PlanError::BatchTooLarge {
                count: entries.len(),
                max: MAX_BATCH_ENTRIES,
            });
        }

        let valid = self.valid_keys();
        let foreign = entries
            .iter()
            .map(|entry| entry.slot_key)
            .filter(|key| !valid.contains(key))
            .unique()
            .collect_vec();

        if !foreign.is_empty() {
            return Err(PlanError::ForeignSlotKeys {
                total: foreign.len(),
                sample: foreign
                    .iter()
                    .take(FOREIGN_KEY_SAMPLE)
                    .map(SlotKey::to_string)
                    .join(", "),
            });
        }

        Ok(())
    }

    /// Every calendar day of the inclusive date range whose weekday, in the
    /// plan's calendar, is a working day.
    fn working_day_dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start_date
            .iter_days()
            .take_while(move |day| *day <= self.end_date)
            .filter(move |day| self.is_working_day(day.weekday()))
    }

    fn is_working_day(&self, day: chrono::Weekday) -> bool {
        self.working_days
            .iter()
            .filter_map(|&index| weekday_from_index(index))
            .any(|working| working == day)
    }
}

fn minutes_of(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

fn time_of(minutes: u32) -> NaiveTime {
    // minutes stays below 24h because generation stops before day_end
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0).unwrap_or(NaiveTime::MIN)
}
