//! Global identifiers for nodes.
use std::fmt;
use std::sync::Arc;

use base64::Engine as _;
use base64::prelude::BASE64_STANDARD;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ResolutionError;
use crate::schema::SchemaRegistry;

const SEPARATOR: char = ':';

/// Name of an entity type implementing `Node`, e.g. `User`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct EntityType(#[schemars(with = "String")] Arc<str>);

impl EntityType {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl PartialEq<str> for EntityType {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for EntityType {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

/// Identity of a node: its entity type and the id internal to that type.
///
/// A `GlobalId` can only be obtained from [`SchemaRegistry::global_id`] or
/// [`GlobalIdCodec::decode`], so holding one means the entity type is known and the internal id
/// is not empty. The internal id is opaque; no ordering is defined.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GlobalId {
    entity_type: EntityType,
    internal_id: Arc<str>,
}

impl GlobalId {
    pub(crate) fn new_unchecked(entity_type: EntityType, internal_id: &str) -> Self {
        Self {
            entity_type,
            internal_id: Arc::from(internal_id),
        }
    }

    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    pub fn internal_id(&self) -> &str {
        &self.internal_id
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.entity_type, self.internal_id)
    }
}

/// Converts global ids from and to the opaque string exposed to clients as the `id` field.
///
/// The encoded form is the standard base64 encoding of `<type>:<internal id>`.
#[derive(Clone, Debug)]
pub struct GlobalIdCodec {
    schema: Arc<SchemaRegistry>,
}

impl GlobalIdCodec {
    pub fn new(schema: Arc<SchemaRegistry>) -> Self {
        Self { schema }
    }

    pub fn encode(&self, id: &GlobalId) -> String {
        BASE64_STANDARD.encode(id.to_string())
    }

    pub fn decode(&self, encoded: &str) -> Result<GlobalId, ResolutionError> {
        let bytes = BASE64_STANDARD
            .decode(encoded)
            .map_err(|e| ResolutionError::invalid_identity(format!("not base64: {e}")))?;
        let decoded = String::from_utf8(bytes)
            .map_err(|_| ResolutionError::invalid_identity("not valid UTF-8"))?;
        let (entity_type, internal_id) = decoded.split_once(SEPARATOR).ok_or_else(|| {
            ResolutionError::invalid_identity(format!("missing '{SEPARATOR}' separator"))
        })?;

        self.schema.global_id(entity_type, internal_id)
    }
}
