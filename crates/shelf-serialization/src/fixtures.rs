//! Entity shapes shared by the unit tests.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use shelf_types::Identifier;

use crate::entity::{Deserializable, Fields, Serializable};
use crate::error::{Result, SerializationError};
use crate::registry::{register_new, Registry};
use crate::types::TypeRegistry;
use crate::value::{Record, Value};
use crate::AnonymousSerializable;

/// Serializes tests that swap the process-wide default registry.
pub static DEFAULT_LOCK: Mutex<()> = Mutex::new(());

pub fn id(s: &str) -> Identifier {
    Identifier::new(s).unwrap()
}

/// Type table with every fixture shape registered.
pub fn types() -> Arc<TypeRegistry> {
    let types = TypeRegistry::new();
    types.register::<Pulse>().unwrap();
    types.register::<Container>().unwrap();
    types.register::<Sequence>().unwrap();
    Arc::new(types)
}

// ---------------------------------------------------------------------------
// Pulse
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
pub struct Pulse {
    pub identifier: Option<Identifier>,
    pub n: i64,
}

impl Pulse {
    pub fn new(identifier: Option<&str>, n: i64, registry: &dyn Registry) -> Result<Arc<Self>> {
        let identifier = identifier.map(Identifier::new).transpose()?;
        Self::build(identifier, n, registry)
    }

    pub fn build(
        identifier: Option<Identifier>,
        n: i64,
        registry: &dyn Registry,
    ) -> Result<Arc<Self>> {
        register_new(Pulse { identifier, n }, registry)
    }
}

impl Serializable for Pulse {
    fn identifier(&self) -> Option<&Identifier> {
        self.identifier.as_ref()
    }

    fn type_tag(&self) -> &str {
        Self::TYPE_TAG
    }

    fn serialization_data(&self) -> Record {
        let mut record = Record::new();
        record.insert("n".into(), Value::from(self.n));
        record
    }
}

impl Deserializable for Pulse {
    const TYPE_TAG: &'static str = "Pulse";

    fn deserialize(
        mut fields: Fields,
        identifier: Option<Identifier>,
        registry: &dyn Registry,
    ) -> Result<Arc<Self>> {
        let n = fields.take_i64("n")?;
        fields.finish()?;
        Self::build(identifier, n, registry)
    }
}

// ---------------------------------------------------------------------------
// Container
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Container {
    pub identifier: Option<Identifier>,
    pub first: Arc<Pulse>,
    pub second: Arc<Pulse>,
}

impl Container {
    pub fn new(
        identifier: Option<&str>,
        first: Arc<Pulse>,
        second: Arc<Pulse>,
        registry: &dyn Registry,
    ) -> Result<Arc<Self>> {
        let identifier = identifier.map(Identifier::new).transpose()?;
        register_new(
            Container {
                identifier,
                first,
                second,
            },
            registry,
        )
    }
}

impl Serializable for Container {
    fn identifier(&self) -> Option<&Identifier> {
        self.identifier.as_ref()
    }

    fn type_tag(&self) -> &str {
        Self::TYPE_TAG
    }

    fn serialization_data(&self) -> Record {
        let mut record = Record::new();
        record.insert("first".into(), Value::from(self.first.clone()));
        record.insert("second".into(), Value::from(self.second.clone()));
        record
    }
}

impl Deserializable for Container {
    const TYPE_TAG: &'static str = "Container";

    fn deserialize(
        mut fields: Fields,
        identifier: Option<Identifier>,
        registry: &dyn Registry,
    ) -> Result<Arc<Self>> {
        let first = fields.take_entity::<Pulse>("first")?;
        let second = fields.take_entity::<Pulse>("second")?;
        fields.finish()?;
        register_new(
            Container {
                identifier,
                first,
                second,
            },
            registry,
        )
    }
}

// ---------------------------------------------------------------------------
// Sequence
// ---------------------------------------------------------------------------

/// Time window encoded as a bare `[start, end]` pair.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Window {
    pub start: f64,
    pub end: f64,
}

impl Window {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }
}

impl AnonymousSerializable for Window {
    fn serialization_data(&self) -> Value {
        Value::from(vec![self.start, self.end])
    }
}

#[derive(Debug)]
pub struct Sequence {
    pub identifier: Option<Identifier>,
    pub children: Vec<Arc<dyn Serializable>>,
    pub tags: BTreeSet<String>,
    pub window: Window,
}

impl Sequence {
    pub fn new(
        identifier: Option<&str>,
        children: Vec<Arc<dyn Serializable>>,
        tags: BTreeSet<String>,
        window: Window,
        registry: &dyn Registry,
    ) -> Result<Arc<Self>> {
        let identifier = identifier.map(Identifier::new).transpose()?;
        register_new(
            Sequence {
                identifier,
                children,
                tags,
                window,
            },
            registry,
        )
    }
}

impl Serializable for Sequence {
    fn identifier(&self) -> Option<&Identifier> {
        self.identifier.as_ref()
    }

    fn type_tag(&self) -> &str {
        Self::TYPE_TAG
    }

    fn serialization_data(&self) -> Record {
        let mut record = Record::new();
        record.insert(
            "children".into(),
            Value::Array(self.children.iter().cloned().map(Value::Entity).collect()),
        );
        record.insert("tags".into(), Value::set(self.tags.iter().cloned()));
        record.insert("window".into(), Value::anonymous(self.window));
        record
    }
}

impl Deserializable for Sequence {
    const TYPE_TAG: &'static str = "Sequence";

    fn deserialize(
        mut fields: Fields,
        identifier: Option<Identifier>,
        registry: &dyn Registry,
    ) -> Result<Arc<Self>> {
        let invalid = |field: &str, reason: &str| SerializationError::InvalidField {
            type_tag: Self::TYPE_TAG.to_string(),
            field: field.to_string(),
            reason: reason.to_string(),
        };

        let children = fields
            .take_list("children")?
            .into_iter()
            .map(|v| match v {
                Value::Entity(e) => Ok(e),
                _ => Err(invalid("children", "expected entity")),
            })
            .collect::<Result<Vec<_>>>()?;
        let tags = fields
            .take_list("tags")?
            .into_iter()
            .map(|v| match v {
                Value::String(s) => Ok(s),
                _ => Err(invalid("tags", "expected string")),
            })
            .collect::<Result<BTreeSet<_>>>()?;
        let window = match fields.take_list("window")?.as_slice() {
            [start, end] => match (start.as_f64(), end.as_f64()) {
                (Some(start), Some(end)) => Window::new(start, end),
                _ => return Err(invalid("window", "expected numbers")),
            },
            _ => return Err(invalid("window", "expected [start, end]")),
        };
        fields.finish()?;

        register_new(
            Sequence {
                identifier,
                children,
                tags,
                window,
            },
            registry,
        )
    }
}
