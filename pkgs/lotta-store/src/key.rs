//! Store keys and entity identity

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Prefix shared by every root-query field key
pub const ROOT_QUERY: &str = "ROOT_QUERY";

/// Key of a single entry in a normalized store
///
/// Entities are keyed as `Typename:id`, root query fields as
/// `ROOT_QUERY.field`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreKey(String);

impl StoreKey {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Key of the entity `typename` with the given id
    pub fn entity(typename: &str, id: impl fmt::Display) -> Self {
        Self(format!("{}:{}", typename, id))
    }

    /// Key of a root query field
    pub fn root_field(field: &str) -> Self {
        Self(format!("{}.{}", ROOT_QUERY, field))
    }

    /// Key of a typed entity
    pub fn of<E: Entity + ?Sized>(entity: &E) -> Self {
        Self::entity(E::TYPENAME, entity.entity_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Typename part of an entity key, `None` for root fields
    pub fn typename(&self) -> Option<&str> {
        if self.0.starts_with(ROOT_QUERY) {
            return None;
        }
        self.0.split_once(':').map(|(typename, _)| typename)
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StoreKey {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl From<String> for StoreKey {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// A type stored once in the cache under its own key
pub trait Entity {
    const TYPENAME: &'static str;

    fn entity_id(&self) -> String;
}

/// Default identification of a raw JSON value: `__typename` plus `id`
pub fn identify_value(value: &Value) -> Option<StoreKey> {
    let object = value.as_object()?;
    let typename = object.get("__typename")?.as_str()?;
    if typename.is_empty() {
        return None;
    }
    match object.get("id")? {
        Value::String(id) if !id.is_empty() => Some(StoreKey::entity(typename, id)),
        Value::Number(id) => Some(StoreKey::entity(typename, id)),
        _ => None,
    }
}
