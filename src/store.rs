use crate::participant::{AvailabilityFact, ParticipantId, ParticipantInfo, SlotMark};
use crate::plan::{PlanError, PlanSpec};
use crate::slot::SlotKey;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("no plan with id {0}")]
    UnknownPlan(String),
    #[error("no participant with id {0}")]
    UnknownParticipant(String),
    #[error("plan {plan_id} has reached its participant limit of {max}")]
    PlanFull { plan_id: String, max: u32 },
}

/// Failure of the guarded upsert path: either the batch fails validation
/// against the plan's current slot set, or the store rejects the write.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What the core needs from persistence, and nothing more. Each fact write
/// is an atomic insert-or-update of the `available` flag for one
/// (participant, slot key) pair; reading a plan's facts goes through the
/// participant join rather than any key list.
pub trait AvailabilityStore {
    /// Upserts the participant's marks, last write wins per pair. Returns
    /// the number of entries applied. Applying the same batch twice leaves
    /// the same state as applying it once.
    fn upsert_availability(
        &mut self,
        participant_id: &str,
        entries: &[SlotMark],
    ) -> Result<usize, StoreError>;

    /// Every stored fact of every participant of the plan.
    fn plan_availability(&self, plan_id: &str) -> Result<Vec<AvailabilityFact>, StoreError>;
}

/// Validates one inbound batch against the plan's *currently* generated
/// slot set, then hands it to the store. Any rejection happens before a
/// single fact is written.
pub fn record_availability<S: AvailabilityStore>(
    spec: &PlanSpec,
    store: &mut S,
    participant_id: &str,
    entries: &[SlotMark],
) -> Result<usize, RecordError> {
    spec.validate_batch(entries)?;
    Ok(store.upsert_availability(participant_id, entries)?)
}

/// A stored plan: the recurrence spec plus the collaborator-owned fields.
/// The host token is minted once at creation and treated as opaque here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRecord {
    pub id: String,
    pub spec: PlanSpec,
    pub max_participants: Option<u32>,
    pub hide_participants: bool,
    pub host_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRecord {
    pub id: ParticipantId,
    pub plan_id: String,
    pub display_name: String,
    pub external_user_id: Option<String>,
    pub token: String,
}

impl ParticipantRecord {
    fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
            external_user_id: self.external_user_id.clone(),
        }
    }
}

/// In-memory reference implementation of the persisted shape: plans,
/// participants unique on (plan, external user id), and facts keyed by
/// (participant, slot key) with upsert-on-conflict. Deletes cascade the way
/// the real schema's foreign keys do.
#[derive(Debug, Default)]
pub struct MemoryStore {
    plans: HashMap<String, PlanRecord>,
    participants: HashMap<ParticipantId, ParticipantRecord>,
    facts: HashMap<(ParticipantId, SlotKey), bool>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    /// Validates the spec, mints an id and a host token, and stores the
    /// plan. The host token is only ever handed out here.
    pub fn create_plan(
        &mut self,
        spec: PlanSpec,
        max_participants: Option<u32>,
        hide_participants: bool,
    ) -> Result<PlanRecord, PlanError> {
        spec.validate()?;

        let record = PlanRecord {
            id: Uuid::new_v4().to_string(),
            spec,
            max_participants,
            hide_participants,
            host_token: Uuid::new_v4().to_string(),
        };
        self.plans.insert(record.id.clone(), record.clone());

        Ok(record)
    }

    pub fn plan(&self, plan_id: &str) -> Result<&PlanRecord, StoreError> {
        self.plans
            .get(plan_id)
            .ok_or_else(|| StoreError::UnknownPlan(plan_id.to_string()))
    }

    /// Adds a participant to a plan. Joining again with the same external
    /// user id returns the existing participant instead of creating a
    /// duplicate; the capacity check applies only to genuinely new joins.
    pub fn join_plan(
        &mut self,
        plan_id: &str,
        display_name: &str,
        external_user_id: Option<&str>,
    ) -> Result<ParticipantRecord, StoreError> {
        let plan = self.plan(plan_id)?;

        if let Some(external) = external_user_id {
            if let Some(existing) = self
                .participants
                .values()
                .find(|p| p.plan_id == plan_id && p.external_user_id.as_deref() == Some(external))
            {
                return Ok(existing.clone());
            }
        }

        if let Some(max) = plan.max_participants {
            let joined = self
                .participants
                .values()
                .filter(|p| p.plan_id == plan_id)
                .count() as u32;
            if joined >= max {
                return Err(StoreError::PlanFull {
                    plan_id: plan_id.to_string(),
                    max,
                });
            }
        }

        let record = ParticipantRecord {
            id: Uuid::new_v4().to_string(),
            plan_id: plan_id.to_string(),
            display_name: display_name.trim().to_string(),
            external_user_id: external_user_id.map(str::to_string),
            token: Uuid::new_v4().to_string(),
        };
        self.participants.insert(record.id.clone(), record.clone());

        Ok(record)
    }

    /// The plan's participant listing, with the privacy mask already applied
    /// when the plan hides participants. Sorted by id for a stable order.
    pub fn participants(&self, plan_id: &str) -> Result<Vec<ParticipantInfo>, StoreError> {
        let hide = self.plan(plan_id)?.hide_participants;

        Ok(self
            .participants
            .values()
            .filter(|p| p.plan_id == plan_id)
            .sorted_by(|a, b| a.id.cmp(&b.id))
            .map(|p| {
                let info = p.info();
                if hide {
                    info.masked()
                } else {
                    info
                }
            })
            .collect())
    }

    pub fn participant_count(&self, plan_id: &str) -> Result<usize, StoreError> {
        self.plan(plan_id)?;
        Ok(self
            .participants
            .values()
            .filter(|p| p.plan_id == plan_id)
            .count())
    }

    /// One participant's stored marks, sorted by key. The read-back half of
    /// the availability exchange.
    pub fn participant_availability(
        &self,
        participant_id: &str,
    ) -> Result<Vec<SlotMark>, StoreError> {
        if !self.participants.contains_key(participant_id) {
            return Err(StoreError::UnknownParticipant(participant_id.to_string()));
        }

        Ok(self
            .facts
            .iter()
            .filter(|((id, _), _)| id.as_str() == participant_id)
            .map(|((_, slot_key), &available)| SlotMark {
                slot_key: *slot_key,
                available,
            })
            .sorted_by_key(|mark| mark.slot_key)
            .collect())
    }

    /// Removes a participant and, by cascade, their facts.
    pub fn delete_participant(&mut self, participant_id: &str) -> Result<(), StoreError> {
        self.participants
            .remove(participant_id)
            .ok_or_else(|| StoreError::UnknownParticipant(participant_id.to_string()))?;
        self.facts.retain(|(id, _), _| id.as_str() != participant_id);
        Ok(())
    }

    /// Removes a plan and, by cascade, its participants and their facts.
    pub fn delete_plan(&mut self, plan_id: &str) -> Result<(), StoreError> {
        self.plans
            .remove(plan_id)
            .ok_or_else(|| StoreError::UnknownPlan(plan_id.to_string()))?;

        let doomed: Vec<ParticipantId> = self
            .participants
            .values()
            .filter(|p| p.plan_id == plan_id)
            .map(|p| p.id.clone())
            .collect();
        for id in &doomed {
            self.participants.remove(id);
            self.facts.retain(|(fact_id, _), _| fact_id != id);
        }

        Ok(())
    }
}

impl AvailabilityStore for MemoryStore {
    fn upsert_availability(
        &mut self,
        participant_id: &str,
        entries: &[SlotMark],
    ) -> Result<usize, StoreError> {
        if !self.participants.contains_key(participant_id) {
            return Err(StoreError::UnknownParticipant(participant_id.to_string()));
        }

        for entry in entries {
            self.facts
                .insert((participant_id.to_string(), entry.slot_key), entry.available);
        }

        Ok(entries.len())
    }

    fn plan_availability(&self, plan_id: &str) -> Result<Vec<AvailabilityFact>, StoreError> {
        self.plan(plan_id)?;

        Ok(self
            .participants
            .values()
            .filter(|p| p.plan_id == plan_id)
            .flat_map(|p| {
                self.facts
                    .iter()
                    .filter(move |((id, _), _)| *id == p.id)
                    .map(|((id, slot_key), &available)| AvailabilityFact {
                        participant_id: id.clone(),
                        slot_key: *slot_key,
                        available,
                    })
            })
            .sorted_by(|a, b| {
                a.participant_id
                    .cmp(&b.participant_id)
                    .then_with(|| a.slot_key.cmp(&b.slot_key))
            })
            .collect())
    }
}
