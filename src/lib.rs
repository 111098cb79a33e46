//! Slot generation and availability aggregation for group scheduling plans.
//!
//! A host defines a recurring availability window (date range, working days,
//! daily time window, slot granularity, timezone); participants mark which
//! generated slots they can attend; the results roll up into per-slot counts,
//! rankings and groupings. Slots are identified by canonical minute-precision
//! UTC keys so that aggregation across participants and timezones is a plain
//! key match.

pub mod participant;
pub mod plan;
pub mod results;
pub mod slot;
pub mod store;

#[cfg(test)]
mod tests {
    use crate::plan::{PlanSpec, SlotMinutes};
    use crate::results::{aggregate, filter_slot_results, get_top_slots, group_by_date};
    use crate::store::{record_availability, AvailabilityStore, MemoryStore};
    use std::collections::HashSet;

    fn offsite_spec() -> PlanSpec {
        PlanSpec {
            title: "Q1 offsite".to_string(),
            description: Some("Two mornings, pick your slots".to_string()),
            timezone: "Europe/Berlin".parse().unwrap(),
            start_date: "2025-01-06".parse().unwrap(),
            end_date: "2025-01-07".parse().unwrap(),
            day_start: "09:00:00".parse().unwrap(),
            day_end: "11:00:00".parse().unwrap(),
            slot_minutes: SlotMinutes::Sixty,
            working_days: [1, 2].iter().copied().collect(),
        }
    }

    #[test]
    fn plan_round_trip_through_store_and_aggregation() {
        let mut store = MemoryStore::new();
        let plan = store.create_plan(offsite_spec(), None, false).unwrap();
        let slots = plan.spec.generate_slots();
        assert_eq!(slots.len(), 4);

        let ada = store.join_plan(&plan.id, "Ada", Some("ext-ada")).unwrap();
        let grace = store.join_plan(&plan.id, "Grace", None).unwrap();
        let linus = store.join_plan(&plan.id, "Linus", None).unwrap();

        let everything: Vec<_> = slots
            .iter()
            .map(|slot| crate::participant::SlotMark {
                slot_key: slot.key,
                available: true,
            })
            .collect();

        // Ada can always make it; Grace only the first morning; Linus never
        record_availability(&plan.spec, &mut store, &ada.id, &everything).unwrap();
        record_availability(&plan.spec, &mut store, &grace.id, &everything[..2]).unwrap();
        let declined: Vec<_> = everything
            .iter()
            .map(|mark| crate::participant::SlotMark {
                available: false,
                ..*mark
            })
            .collect();
        record_availability(&plan.spec, &mut store, &linus.id, &declined).unwrap();

        let results = aggregate(&slots, &store.plan_availability(&plan.id).unwrap());
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].available_count, 2);
        assert_eq!(results[1].available_count, 2);
        assert_eq!(results[2].available_count, 1);
        assert_eq!(results[3].available_count, 1);

        let total = store.participant_count(&plan.id).unwrap();
        assert_eq!(total, 3);
        assert_eq!(results[0].intensity(total), 2.0 / 3.0);

        let top = get_top_slots(&results, 2);
        assert_eq!(top[0].slot_key, results[0].slot_key);
        assert_eq!(top[1].slot_key, results[1].slot_key);

        let only_grace: HashSet<String> = [grace.id.clone()].iter().cloned().collect();
        let filtered = filter_slot_results(&results, &only_grace);
        assert_eq!(filtered[0].available_count, 1);
        assert_eq!(filtered[2].available_count, 0);

        let by_date = group_by_date(&results);
        assert_eq!(by_date.len(), 2);
        assert_eq!(by_date[0].1.len(), 2);
    }

    #[test]
    fn granularity_change_orphans_stale_keys() {
        let mut store = MemoryStore::new();
        let plan = store.create_plan(offsite_spec(), None, false).unwrap();
        let ada = store.join_plan(&plan.id, "Ada", None).unwrap();

        let slots = plan.spec.generate_slots();
        let marks: Vec<_> = slots
            .iter()
            .map(|slot| crate::participant::SlotMark {
                slot_key: slot.key,
                available: true,
            })
            .collect();
        record_availability(&plan.spec, &mut store, &ada.id, &marks).unwrap();

        // Host coarsens the day window; afternoon of the old grid is gone
        let mut changed = plan.spec.clone();
        changed.day_end = "10:00:00".parse().unwrap();

        let facts = store.plan_availability(&plan.id).unwrap();
        let orphans = crate::results::orphaned_facts(&changed, &facts);
        assert_eq!(orphans.len(), 2);

        // aggregation over the new grid quietly ignores them
        let results = aggregate(&changed.generate_slots(), &facts);
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.available_count == 1));

        // and a client replaying the old grid is rejected outright
        assert!(record_availability(&changed, &mut store, &ada.id, &marks).is_err());
    }
}
