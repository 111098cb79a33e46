use crate::participant::{AvailabilityFact, ParticipantId};
use crate::plan::PlanSpec;
use crate::slot::{Slot, SlotKey};
use chrono::{NaiveDate, NaiveTime};
use itertools::Itertools;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Per-slot aggregate: how many distinct participants marked the slot
/// available, and which. Derived per request, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotResult {
    pub slot_key: SlotKey,
    pub local_date: NaiveDate,
    #[serde(with = "crate::slot::hhmm")]
    pub local_time: NaiveTime,
    pub available_count: usize,
    pub available_participant_ids: BTreeSet<ParticipantId>,
}

impl SlotResult {
    /// Heatmap intensity in [0, 1]. Zero when nobody has joined yet.
    ///
    /// # Examples
    /// ```
    /// # use slotplan_libs::results::SlotResult;
    /// # use std::collections::BTreeSet;
    /// let result = SlotResult {
    ///     slot_key: "2025-01-06T09:00".parse().unwrap(),
    ///     local_date: "2025-01-06".parse().unwrap(),
    ///     local_time: "09:00:00".parse().unwrap(),
    ///     available_count: 2,
    ///     available_participant_ids: BTreeSet::new(),
    /// };
    /// assert_eq!(result.intensity(3), 2.0 / 3.0);
    /// assert_eq!(result.intensity(0), 0.0);
    /// ```
    pub fn intensity(&self, total_participants: usize) -> f64 {
        if total_participants == 0 {
            0.0
        } else {
            self.available_count as f64 / total_participants as f64
        }
    }
}

/// Rolls raw facts up into exactly one result per generated slot, in
/// generator order. Slots nobody answered for appear with a zero count;
/// callers never have to guess which slots exist.
///
/// Facts with `available == false` do not count. Facts keyed outside the
/// plan's current slot set are skipped with a warning; after a granularity
/// or working-day change, stale keys are orphaned rather than an error.
pub fn aggregate(plan_slots: &[Slot], facts: &[AvailabilityFact]) -> Vec<SlotResult> {
    let valid: HashSet<SlotKey> = plan_slots.iter().map(|slot| slot.key).collect();

    let mut by_key: HashMap<SlotKey, BTreeSet<ParticipantId>> = HashMap::new();
    let mut orphaned = 0_usize;

    for fact in facts {
        if !valid.contains(&fact.slot_key) {
            orphaned += 1;
            continue;
        }
        if !fact.available {
            continue;
        }
        by_key
            .entry(fact.slot_key)
            .or_insert_with(BTreeSet::new)
            .insert(fact.participant_id.clone());
    }

    if orphaned > 0 {
        warn!(
            "ignoring {} availability facts keyed outside the plan's current slot set",
            orphaned
        );
    }

    plan_slots
        .iter()
        .map(|slot| {
            let ids = by_key.remove(&slot.key).unwrap_or_default();
            SlotResult {
                slot_key: slot.key,
                local_date: slot.local_date,
                local_time: slot.local_time,
                available_count: ids.len(),
                available_participant_ids: ids,
            }
        })
        .collect()
}

/// The `n` best-attended slots: zero-count slots dropped, sorted by count
/// descending with ties broken by ascending key (the earlier UTC instant
/// wins). The order is a deterministic total order.
pub fn get_top_slots(results: &[SlotResult], n: usize) -> Vec<SlotResult> {
    results
        .iter()
        .filter(|result| result.available_count > 0)
        .cloned()
        .sorted_by(|a, b| {
            b.available_count
                .cmp(&a.available_count)
                .then_with(|| a.slot_key.cmp(&b.slot_key))
        })
        .take(n)
        .collect()
}

/// Recomputes counts and id sets restricted to `selected`. An empty
/// selection means "no filter" and returns the input unchanged; it is not
/// "filter to nobody".
pub fn filter_slot_results(
    results: &[SlotResult],
    selected: &HashSet<ParticipantId>,
) -> Vec<SlotResult> {
    if selected.is_empty() {
        return results.to_vec();
    }

    results
        .iter()
        .map(|result| {
            let ids: BTreeSet<ParticipantId> = result
                .available_participant_ids
                .iter()
                .filter(|id| selected.contains(*id))
                .cloned()
                .collect();
            SlotResult {
                available_count: ids.len(),
                available_participant_ids: ids,
                ..result.clone()
            }
        })
        .collect()
}

/// Partitions results by local date for calendar rendering, preserving
/// first-seen date order and each group's relative slot order.
pub fn group_by_date(results: &[SlotResult]) -> Vec<(NaiveDate, Vec<SlotResult>)> {
    let mut order: Vec<NaiveDate> = Vec::new();
    let mut groups: HashMap<NaiveDate, Vec<SlotResult>> = HashMap::new();

    for result in results {
        groups
            .entry(result.local_date)
            .or_insert_with(|| {
                order.push(result.local_date);
                Vec::new()
            })
            .push(result.clone());
    }

    order
        .into_iter()
        .map(|date| {
            let group = groups.remove(&date).unwrap_or_default();
            (date, group)
        })
        .collect()
}

/// Facts stranded by a spec change: their keys no longer belong to the
/// current generated set. Surfaced as a warning for the host, never
/// migrated or deleted by the core.
pub fn orphaned_facts<'a>(spec: &PlanSpec, facts: &'a [AvailabilityFact]) -> Vec<&'a AvailabilityFact> {
    let valid = spec.valid_keys();
    let orphans = facts
        .iter()
        .filter(|fact| !valid.contains(&fact.slot_key))
        .collect_vec();

    if !orphans.is_empty() {
        warn!(
            "{} availability facts are orphaned by the current slot grid",
            orphans.len()
        );
    }

    orphans
}
