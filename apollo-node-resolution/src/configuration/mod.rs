//! Logic for loading configuration in to an object model
mod entity;

use std::num::NonZeroUsize;
use std::time::Duration;

use schemars::JsonSchema;
use schemars::schema::RootSchema;
use serde::Deserialize;
use serde::Serialize;

pub use self::entity::EntityConfiguration;
pub use crate::error::ConfigurationError;
use crate::error::RegistrationError;
use crate::global_id::EntityType;
use crate::schema::SchemaRegistry;

/// The configuration of node resolution.
///
/// Can be created through `serde::Deserialize` from various formats,
/// or from YAML with [`Configuration::from_yaml`].
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Request coalescing for entity types with a batch resolver.
    #[serde(default)]
    pub(crate) batching: EntityConfiguration<Batching>,

    /// What to do with fields a node resolver returns outside of its responsibility set.
    #[serde(default)]
    pub(crate) responsibility_policy: ResponsibilityPolicy,

    /// Log a warning when a resolver that never looked at the selection set returns a value
    /// missing some of its responsibility fields.
    #[serde(default)]
    pub(crate) verify_completeness: bool,
}

/// Batching options of an entity type.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct Batching {
    /// Coalesce concurrent requests into one batch call. When disabled, every request is sent
    /// to the batch resolver on its own.
    pub(crate) enabled: bool,

    /// Upper bound on the number of nodes sent in one batch call. Larger groups are split.
    pub(crate) max_batch_size: Option<NonZeroUsize>,

    /// How long a batch stays open for requests coming from other tasks, in human-readable
    /// format (e.g. `2ms`). Requests issued by the task that opened the batch always join it.
    #[serde(deserialize_with = "humantime_serde::deserialize", default)]
    #[schemars(with = "Option<String>", default)]
    pub(crate) delay: Option<Duration>,
}

impl Default for Batching {
    fn default() -> Self {
        Self {
            enabled: true,
            max_batch_size: None,
            delay: None,
        }
    }
}

/// Handling of fields produced outside of the responsibility set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResponsibilityPolicy {
    /// Fail the node with a responsibility violation.
    #[default]
    Reject,
    /// Remove the extra fields and log a warning.
    Drop,
}

#[buildstructor::buildstructor]
impl Configuration {
    #[builder(visibility = "pub")]
    fn new(
        batching: Option<EntityConfiguration<Batching>>,
        responsibility_policy: Option<ResponsibilityPolicy>,
        verify_completeness: Option<bool>,
    ) -> Self {
        Self {
            batching: batching.unwrap_or_default(),
            responsibility_policy: responsibility_policy.unwrap_or_default(),
            verify_completeness: verify_completeness.unwrap_or_default(),
        }
    }
}

impl Configuration {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigurationError> {
        serde_yaml::from_str(yaml).map_err(ConfigurationError::DeserializeConfigError)
    }

    /// Checks that per entity type options only name entity types of `schema`.
    pub(crate) fn check_entity_types(
        &self,
        schema: &SchemaRegistry,
    ) -> Result<(), RegistrationError> {
        self.batching.check_entity_types("batching", schema)
    }

    pub(crate) fn batching(&self, entity_type: &EntityType) -> &Batching {
        self.batching.get(entity_type)
    }

    pub(crate) fn responsibility_policy(&self) -> ResponsibilityPolicy {
        self.responsibility_policy
    }

    pub(crate) fn verify_completeness(&self) -> bool {
        self.verify_completeness
    }
}

/// Generate a JSON schema for the configuration.
pub fn generate_config_schema() -> RootSchema {
    schemars::schema_for!(Configuration)
}
