//! Embed-or-reference encoding.
//!
//! An entity's record is written with its type tag and, when it has one, its
//! identifier. Nested entities without an identifier are embedded inline.
//! Nested entities with an identifier are handed to a [`TransactionSink`] to
//! be stored as documents of their own and replaced by a reference token:
//!
//! ```json
//! { "#type": "reference", "#identifier": "p1" }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{ser, Serialize};
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value as Json};
use shelf_types::{is_reserved_key, Identifier, IDENTIFIER_KEY, REFERENCE_TYPE_TAG, TYPE_TAG_KEY};

use crate::entity::Serializable;
use crate::error::{Result, SerializationError};
use crate::value::Value;

/// Receives identified entities met while encoding another entity.
pub trait TransactionSink {
    /// Make sure `entity` is stored as its own document.
    fn register_nested(&self, entity: &Arc<dyn Serializable>) -> Result<()>;
}

/// Encodes entities into JSON documents.
pub struct Encoder<'a> {
    sink: &'a dyn TransactionSink,
}

impl<'a> Encoder<'a> {
    pub fn new(sink: &'a dyn TransactionSink) -> Self {
        Self { sink }
    }

    /// Encode `entity` as a standalone document.
    pub fn encode_document(&self, entity: &dyn Serializable) -> Result<String> {
        let record = self.encode_entity_record(entity)?;
        to_document_string(&Json::Object(record))
    }

    /// Encode the record of `entity` itself, never as a reference.
    pub fn encode_entity_record(&self, entity: &dyn Serializable) -> Result<Map<String, Json>> {
        let mut record = Map::new();
        for (key, value) in entity.serialization_data() {
            if is_reserved_key(&key) {
                return Err(SerializationError::ReservedField(key));
            }
            let encoded = self.encode_value(&value)?;
            record.insert(key, encoded);
        }
        record.insert(
            TYPE_TAG_KEY.to_string(),
            Json::String(entity.type_tag().to_string()),
        );
        if let Some(identifier) = entity.identifier() {
            record.insert(
                IDENTIFIER_KEY.to_string(),
                Json::String(identifier.to_string()),
            );
        }
        Ok(record)
    }

    /// Encode one field value.
    pub fn encode_value(&self, value: &Value) -> Result<Json> {
        Ok(match value {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => Json::Number(n.clone()),
            Value::String(s) => Json::String(s.clone()),
            Value::Array(items) | Value::Set(items) => Json::Array(
                items
                    .iter()
                    .map(|item| self.encode_value(item))
                    .collect::<Result<_>>()?,
            ),
            Value::Object(map) => self.encode_object(map)?,
            Value::Entity(entity) => match entity.identifier() {
                None => Json::Object(self.encode_entity_record(entity.as_ref())?),
                Some(identifier) => {
                    self.sink.register_nested(entity)?;
                    reference_token(identifier)
                }
            },
            Value::Anonymous(anonymous) => self.encode_value(&anonymous.serialization_data())?,
        })
    }

    fn encode_object(&self, map: &BTreeMap<String, Value>) -> Result<Json> {
        let mut out = Map::new();
        for (key, value) in map {
            if is_reserved_key(key) {
                return Err(SerializationError::ReservedField(key.clone()));
            }
            out.insert(key.clone(), self.encode_value(value)?);
        }
        Ok(Json::Object(out))
    }
}

/// The reference token standing in for the entity stored under `identifier`.
pub fn reference_token(identifier: &Identifier) -> Json {
    let mut token = Map::new();
    token.insert(
        TYPE_TAG_KEY.to_string(),
        Json::String(REFERENCE_TYPE_TAG.to_string()),
    );
    token.insert(
        IDENTIFIER_KEY.to_string(),
        Json::String(identifier.to_string()),
    );
    Json::Object(token)
}

/// Render a JSON value the way documents are stored: sorted keys, four-space
/// indentation.
pub fn to_document_string(value: &Json) -> Result<String> {
    let mut out = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    String::from_utf8(out).map_err(|e| <serde_json::Error as ser::Error>::custom(e).into())
}
