use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{EntityId, PropertyValue};

/// Full snapshot of one object's tracked properties, the unit of change
/// exchanged between peers. Two contexts for the same identifier are always
/// comparable by whole replacement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncContext {
    pub identifier: EntityId,
    pub alias_name: String,
    #[serde(default)]
    pub sync_data: BTreeMap<String, PropertyValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_identifier: Option<EntityId>,
    /// Position among the parent's children
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
}

impl SyncContext {
    pub fn new(identifier: impl Into<EntityId>, alias_name: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            alias_name: alias_name.into(),
            sync_data: BTreeMap::new(),
            parent_identifier: None,
            order: None,
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.sync_data.insert(name.to_string(), value.into());
        self
    }

    pub fn with_parent(mut self, parent: impl Into<EntityId>, order: Option<u32>) -> Self {
        self.parent_identifier = Some(parent.into());
        self.order = order;
        self
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.sync_data.get(name)
    }
}
