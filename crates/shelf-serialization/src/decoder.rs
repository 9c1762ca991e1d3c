//! Decoding of stored documents back into live entities.
//!
//! Objects are decoded bottom-up: children first, then the object itself.
//! A record tagged `reference` is resolved through a [`ReferenceResolver`];
//! any other tagged record goes through the [`TypeRegistry`]. Objects without
//! a tag stay plain objects.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value as Json};
use shelf_types::{Identifier, IDENTIFIER_KEY, REFERENCE_TYPE_TAG, TYPE_TAG_KEY};

use crate::entity::{Fields, Serializable};
use crate::error::{Result, SerializationError};
use crate::registry::Registry;
use crate::types::TypeRegistry;
use crate::value::Value;

/// Turns a reference token back into the entity it points at.
pub trait ReferenceResolver {
    fn resolve(&self, identifier: &Identifier) -> Result<Arc<dyn Serializable>>;
}

/// Decodes JSON documents into values and entities.
pub struct Decoder<'a> {
    types: &'a TypeRegistry,
    resolver: &'a dyn ReferenceResolver,
    registry: &'a dyn Registry,
}

impl<'a> Decoder<'a> {
    pub fn new(
        types: &'a TypeRegistry,
        resolver: &'a dyn ReferenceResolver,
        registry: &'a dyn Registry,
    ) -> Self {
        Self {
            types,
            resolver,
            registry,
        }
    }

    /// Decode document text into a value.
    pub fn decode_document(&self, text: &str) -> Result<Value> {
        let json: Json = serde_json::from_str(text)?;
        self.decode_value(json)
    }

    /// Decode document text that must hold an entity.
    pub fn decode_entity(&self, text: &str) -> Result<Arc<dyn Serializable>> {
        match self.decode_document(text)? {
            Value::Entity(entity) => Ok(entity),
            _ => Err(SerializationError::NotAnEntity),
        }
    }

    pub fn decode_value(&self, json: Json) -> Result<Value> {
        Ok(match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => Value::Number(n),
            Json::String(s) => Value::String(s),
            Json::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.decode_value(item))
                    .collect::<Result<_>>()?,
            ),
            Json::Object(map) => self.decode_object(map)?,
        })
    }

    fn decode_object(&self, map: Map<String, Json>) -> Result<Value> {
        let mut fields = BTreeMap::new();
        for (key, value) in map {
            let decoded = self.decode_value(value)?;
            fields.insert(key, decoded);
        }

        let Some(tag) = fields.remove(TYPE_TAG_KEY) else {
            return Ok(Value::Object(fields));
        };
        let tag = match tag {
            Value::String(tag) => tag,
            other => {
                return Err(SerializationError::InvalidField {
                    type_tag: String::new(),
                    field: TYPE_TAG_KEY.to_string(),
                    reason: format!("expected string, found {}", other.kind_name()),
                })
            }
        };
        let identifier = match fields.remove(IDENTIFIER_KEY) {
            None => None,
            Some(Value::String(s)) => Some(Identifier::new(s)?),
            Some(other) => {
                return Err(SerializationError::InvalidField {
                    type_tag: tag,
                    field: IDENTIFIER_KEY.to_string(),
                    reason: format!("expected string, found {}", other.kind_name()),
                })
            }
        };

        if tag == REFERENCE_TYPE_TAG {
            let Some(identifier) = identifier else {
                return Err(SerializationError::MalformedReference(
                    "reference without identifier".to_string(),
                ));
            };
            if let Some(extra) = fields.keys().next() {
                return Err(SerializationError::MalformedReference(format!(
                    "reference to {identifier} carries extra field {extra}"
                )));
            }
            return Ok(Value::Entity(self.resolver.resolve(&identifier)?));
        }

        let entity = self
            .types
            .deserialize(&tag, Fields::new(tag.clone(), fields), identifier, self.registry)?;
        Ok(Value::Entity(entity))
    }
}
