//! JSON-compatible value tree that may hold live entities.
//!
//! An entity describes itself as a [`Record`]: field name to [`Value`].
//! Nested entities stay in object form ([`Value::Entity`]); the encoder
//! decides whether each one is embedded or replaced by a reference.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Number;

use crate::entity::{downcast_arc, same_instance, AnonymousSerializable, Serializable};

/// Serialization record of an entity: field name to value, ordered by name.
pub type Record = BTreeMap<String, Value>;

/// A JSON-compatible value, extended with live entities.
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Value>),
    /// Unordered collection. Encoded as an array; decodes as [`Value::Array`].
    Set(Vec<Value>),
    Object(BTreeMap<String, Value>),
    /// Nested entity, embedded or referenced depending on its identifier.
    Entity(Arc<dyn Serializable>),
    /// Identifier-less value encoded as whatever its data extraction yields.
    Anonymous(Arc<dyn AnonymousSerializable>),
}

impl Value {
    /// Wrap an anonymous serializable value.
    pub fn anonymous(value: impl AnonymousSerializable + 'static) -> Self {
        Self::Anonymous(Arc::new(value))
    }

    /// Build a set from any iterator of values.
    pub fn set<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Self::Set(items.into_iter().map(Into::into).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Number(n) => n.as_u64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Items of an array or set.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) | Self::Set(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&Arc<dyn Serializable>> {
        match self {
            Self::Entity(e) => Some(e),
            _ => None,
        }
    }

    /// The nested entity as its concrete type, if it is one.
    pub fn downcast_entity<T: Serializable>(&self) -> Option<Arc<T>> {
        self.as_entity().and_then(downcast_arc::<T>)
    }

    /// Short name of the variant, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Set(_) => "set",
            Self::Object(_) => "object",
            Self::Entity(_) => "entity",
            Self::Anonymous(_) => "anonymous",
        }
    }
}

/// Field-for-field equality of two entities.
///
/// The same instance is always equal to itself; distinct instances are equal
/// when type tag, identifier and serialization record match.
pub fn entities_equal(a: &Arc<dyn Serializable>, b: &Arc<dyn Serializable>) -> bool {
    same_instance(a, b)
        || (a.type_tag() == b.type_tag()
            && a.identifier() == b.identifier()
            && a.serialization_data() == b.serialization_data())
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Set(a), Self::Set(b)) => {
                a.len() == b.len() && a.iter().all(|x| b.contains(x))
            }
            (Self::Object(a), Self::Object(b)) => a == b,
            (Self::Entity(a), Self::Entity(b)) => entities_equal(a, b),
            (Self::Anonymous(a), Self::Anonymous(b)) => {
                a.serialization_data() == b.serialization_data()
            }
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(n.into())
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Self::Number(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Self::Number(n.into())
    }
}

/// Non-finite floats have no JSON representation and become `Null`.
impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Number::from_f64(n).map_or(Self::Null, Self::Number)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self::Object(map)
    }
}

impl<T: Serializable> From<Arc<T>> for Value {
    fn from(entity: Arc<T>) -> Self {
        Self::Entity(entity)
    }
}
