use crate::slot::SlotKey;
use serde::{Deserialize, Serialize};

/// Participants are opaque ids as far as the core is concerned; the
/// authentication semantics of their tokens live with the calling layer.
pub type ParticipantId = String;

/// One entry of an availability upsert batch: a participant's yes/no for a
/// single slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotMark {
    pub slot_key: SlotKey,
    pub available: bool,
}

/// The stored (participant, slot, available) tuple. One fact per pair;
/// last write wins on conflict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityFact {
    pub participant_id: ParticipantId,
    pub slot_key: SlotKey,
    pub available: bool,
}

/// Outward-facing participant listing. When a plan hides its participants,
/// [`ParticipantInfo::masked`] blanks the display name and external id at the
/// serialization boundary; aggregation keeps operating on real ids
/// internally.
///
/// # Examples
/// ```
/// use slotplan_libs::participant::ParticipantInfo;
///
/// let info = ParticipantInfo {
///     id: "p-1".to_string(),
///     display_name: "Ada".to_string(),
///     external_user_id: Some("ext-42".to_string()),
/// };
///
/// let masked = info.masked();
/// assert_eq!(masked.id, "p-1");
/// assert_eq!(masked.display_name, "");
/// assert_eq!(masked.external_user_id, None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub id: ParticipantId,
    pub display_name: String,
    pub external_user_id: Option<String>,
}

impl ParticipantInfo {
    pub fn masked(self) -> ParticipantInfo {
        ParticipantInfo {
            display_name: String::new(),
            external_user_id: None,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masking_keeps_the_id() {
        let masked = ParticipantInfo {
            id: "p-7".to_string(),
            display_name: "Grace".to_string(),
            external_user_id: Some("ext-7".to_string()),
        }
        .masked();

        assert_eq!(masked.id, "p-7");
        assert!(masked.display_name.is_empty());
        assert!(masked.external_user_id.is_none());
    }

    #[test]
    fn mark_serde_shape_matches_api() {
        let mark = SlotMark {
            slot_key: "2025-01-06T09:00".parse().unwrap(),
            available: true,
        };
        assert_eq!(
            serde_json::to_value(&mark).unwrap(),
            serde_json::json!({ "slotKey": "2025-01-06T09:00", "available": true })
        );
    }
}
