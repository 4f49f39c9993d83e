use crate::PropertyValue;

/// Compile-time default of a tracked property
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PropertyDefault {
    Text(&'static str),
    Number(f64),
    Bool(bool),
}

impl PropertyDefault {
    pub fn to_value(&self) -> PropertyValue {
        match self {
            PropertyDefault::Text(text) => PropertyValue::Text((*text).to_string()),
            PropertyDefault::Number(number) => PropertyValue::Number(*number),
            PropertyDefault::Bool(value) => PropertyValue::Bool(*value),
        }
    }
}

/// Declaration of one tracked property
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PropertyDecl {
    pub name: &'static str,
    pub default: PropertyDefault,
}

impl PropertyDecl {
    pub const fn text(name: &'static str, default: &'static str) -> Self {
        Self {
            name,
            default: PropertyDefault::Text(default),
        }
    }

    pub const fn number(name: &'static str, default: f64) -> Self {
        Self {
            name,
            default: PropertyDefault::Number(default),
        }
    }

    pub const fn boolean(name: &'static str, default: bool) -> Self {
        Self {
            name,
            default: PropertyDefault::Bool(default),
        }
    }
}

/// The statically declared shape of a replicated kind: its type tag and the
/// ordered list of properties that cross the wire. Anything not listed here
/// is local-only.
#[derive(Debug)]
pub struct ObjectSchema {
    pub alias_name: &'static str,
    pub properties: &'static [PropertyDecl],
}

impl ObjectSchema {
    /// Diff masks address properties with a `u8` index
    pub const MAX_PROPERTIES: usize = u8::MAX as usize;

    pub fn fits_diff_mask(&self) -> bool {
        self.properties.len() <= Self::MAX_PROPERTIES
    }

    pub fn index_of(&self, name: &str) -> Option<u8> {
        let index = self.properties.iter().position(|decl| decl.name == name)?;
        u8::try_from(index).ok()
    }

    /// Saturates at `MAX_PROPERTIES`; kinds past that are refused at registration
    pub fn property_count(&self) -> u8 {
        u8::try_from(self.properties.len()).unwrap_or(u8::MAX)
    }

    pub fn property_names(&self) -> impl Iterator<Item = &'static str> {
        self.properties.iter().map(|decl| decl.name)
    }
}
