//! Wire payload announcing a state change.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MutationAction {
    Created,
    Updated,
}

/// Event published after a guarded create or update.
///
/// Serialized as `{"entityId", "action", "requestBody"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationEvent {
    pub entity_id: Uuid,
    pub action: MutationAction,
    pub request_body: serde_json::Value,
}

impl MutationEvent {
    pub fn new(entity_id: Uuid, action: MutationAction, request_body: serde_json::Value) -> Self {
        Self {
            entity_id,
            action,
            request_body,
        }
    }

    pub fn topic(&self, resource: &str) -> String {
        topic_for(resource, self.action)
    }
}

/// Topic named after the owning resource and the action, e.g. `order_created`.
pub fn topic_for(resource: &str, action: MutationAction) -> String {
    format!("{resource}_{action}")
}
