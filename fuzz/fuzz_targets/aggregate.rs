#![no_main]
use libfuzzer_sys::fuzz_target;
use slotplan_libs::participant::AvailabilityFact;
use slotplan_libs::plan::{PlanSpec, SlotMinutes};
use slotplan_libs::results::{aggregate, get_top_slots};

fuzz_target!(|data: Vec<(u8, u16, bool)>| {
    let spec = PlanSpec {
        title: "fuzz".to_string(),
        description: None,
        timezone: "UTC".parse().unwrap(),
        start_date: "2025-01-06".parse().unwrap(),
        end_date: "2025-01-10".parse().unwrap(),
        day_start: "08:00:00".parse().unwrap(),
        day_end: "18:00:00".parse().unwrap(),
        slot_minutes: SlotMinutes::Fifteen,
        working_days: (0..=6).collect(),
    };

    let slots = spec.generate_slots();
    assert_eq!(slots.len(), spec.count_slots());

    let facts: Vec<AvailabilityFact> = data
        .iter()
        .map(|&(participant, slot_index, available)| AvailabilityFact {
            participant_id: participant.to_string(),
            slot_key: slots[slot_index as usize % slots.len()].key,
            available,
        })
        .collect();

    let results = aggregate(&slots, &facts);

    assert_eq!(
        results.len(),
        slots.len(),
        "One result per generated slot, always"
    );
    assert_eq!(results, aggregate(&slots, &facts), "Aggregation is a pure function");

    let top = get_top_slots(&results, 10);
    assert!(top.len() <= 10);
    assert!(top.iter().all(|r| r.available_count > 0));
    assert!(
        top.windows(2).all(|pair| {
            pair[0].available_count > pair[1].available_count
                || (pair[0].available_count == pair[1].available_count
                    && pair[0].slot_key < pair[1].slot_key)
        }),
        "Ranking is a strict total order"
    );
});
