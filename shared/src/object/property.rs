use std::fmt;

use serde::{Deserialize, Serialize};

use crate::PropertyMutator;

/// Value of a tracked property. Serialized as the bare JSON scalar.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(number) => Some(*number),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Loose text view: numbers and booleans are rendered, text is cloned
    pub fn to_text(&self) -> String {
        self.to_string()
    }

    /// Loose numeric view: text is parsed, booleans map to 0/1, unparsable text is 0
    pub fn to_f64(&self) -> f64 {
        match self {
            PropertyValue::Number(number) => *number,
            PropertyValue::Bool(value) => f64::from(u8::from(*value)),
            PropertyValue::Text(text) => text.trim().parse().unwrap_or(0.0),
        }
    }

    /// Loose boolean view: JS-like truthiness
    pub fn is_truthy(&self) -> bool {
        match self {
            PropertyValue::Bool(value) => *value,
            PropertyValue::Number(number) => *number != 0.0 && !number.is_nan(),
            PropertyValue::Text(text) => !text.is_empty(),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(value) => write!(f, "{}", value),
            PropertyValue::Number(number) => write!(f, "{}", number),
            PropertyValue::Text(text) => f.write_str(text),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<&String> for PropertyValue {
    fn from(value: &String) -> Self {
        PropertyValue::Text(value.clone())
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Number(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Number(f64::from(value))
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        PropertyValue::Number(f64::from(value))
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

/// A tracked property of a replicated object. Carries its value, a version
/// stamp bumped on every real change, and (once the object is registered)
/// the mutator that queues the object for outgoing synchronization.
#[derive(Clone)]
pub struct Property {
    value: PropertyValue,
    version: u32,
    mutator_index: u8,
    mutator: Option<PropertyMutator>,
}

impl Property {
    pub fn new(value: PropertyValue, mutator_index: u8) -> Self {
        Self {
            value,
            version: 0,
            mutator_index,
            mutator: None,
        }
    }

    pub fn get(&self) -> &PropertyValue {
        &self.value
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn mutator_index(&self) -> u8 {
        self.mutator_index
    }

    /// Set an PropertyMutator to track changes to the Property
    pub fn set_mutator(&mut self, mutator: &PropertyMutator) {
        self.mutator = Some(mutator.clone());
    }

    /// Local write. Returns whether the value changed; only a change bumps
    /// the version and queues the object for synchronization.
    pub fn set(&mut self, value: PropertyValue) -> bool {
        if !self.mirror(value) {
            return false;
        }
        if let Some(mutator) = &self.mutator {
            mutator.mutate(self.mutator_index);
        }
        true
    }

    /// Remote write. Same as `set` but never queues the object, so applied
    /// state is not echoed back to the network.
    pub fn mirror(&mut self, value: PropertyValue) -> bool {
        if self.value == value {
            return false;
        }
        self.value = value;
        self.version = self.version.wrapping_add(1);
        true
    }
}
