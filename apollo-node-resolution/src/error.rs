//! Node resolution errors.
use displaydoc::Display;
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Value;
use thiserror::Error;

use crate::global_id::EntityType;
use crate::response::GraphQLError;
use crate::response::PathElement;

/// Errors attached to a single node.
///
/// They are carried inside [`crate::ResolutionResult::Error`] and turn the whole node into `null`
/// once the response is composed. They are cheap to clone because a single batch failure is
/// delivered to every caller of that batch.
#[derive(Error, Display, Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
#[ignore_extra_doc_attributes]
#[non_exhaustive]
pub enum ResolutionError {
    /// invalid global id: {reason}
    InvalidIdentity {
        /// Why the identity was rejected.
        reason: String,
    },

    /// no node resolver is registered for entity type '{entity_type}'
    NotImplemented { entity_type: EntityType },

    /// resolver for '{entity_type}' produced fields outside of its responsibility set: {fields:?}
    ResponsibilityViolation {
        entity_type: EntityType,
        /// The offending field names.
        fields: Vec<String>,
    },

    /// batch resolver for '{entity_type}' returned {actual} results for {expected} requests
    BatchContractViolation {
        entity_type: EntityType,
        expected: usize,
        actual: usize,
    },

    /// batch resolution for '{entity_type}' failed: {reason}
    ///
    /// the downstream call behind the batch failed as a whole
    BatchFailed {
        entity_type: EntityType,
        reason: String,
    },

    /// batch for '{entity_type}' was aborted before delivering a result
    BatchAborted { entity_type: EntityType },

    /// {message}
    Resolver {
        /// Message produced by the resolver.
        message: String,
        /// Optional error extensions forwarded to the client.
        #[serde(default, skip_serializing_if = "serde_json_bytes::Map::is_empty")]
        extensions: serde_json_bytes::Map<ByteString, Value>,
    },

    /// subquery failed: {reason}
    Subquery { reason: String },
}

impl ResolutionError {
    /// Domain failure reported by a resolver for one node.
    pub fn resolver(message: impl Into<String>) -> Self {
        ResolutionError::Resolver {
            message: message.into(),
            extensions: Default::default(),
        }
    }

    pub(crate) fn invalid_identity(reason: impl Into<String>) -> Self {
        ResolutionError::InvalidIdentity {
            reason: reason.into(),
        }
    }

    pub fn extension_code(&self) -> &'static str {
        match self {
            ResolutionError::InvalidIdentity { .. } => "INVALID_IDENTITY",
            ResolutionError::NotImplemented { .. } => "NOT_IMPLEMENTED",
            ResolutionError::ResponsibilityViolation { .. } => "RESPONSIBILITY_VIOLATION",
            ResolutionError::BatchContractViolation { .. } => "BATCH_CONTRACT_VIOLATION",
            ResolutionError::BatchFailed { .. } => "BATCH_FAILED",
            ResolutionError::BatchAborted { .. } => "BATCH_ABORTED",
            ResolutionError::Resolver { .. } => "NODE_RESOLVER_ERROR",
            ResolutionError::Subquery { .. } => "SUBQUERY_FAILED",
        }
    }

    /// Convert the resolution error to a GraphQL error located at `path`.
    pub fn to_graphql_error(&self, path: Vec<PathElement>) -> GraphQLError {
        let mut extensions = match self {
            ResolutionError::Resolver { extensions, .. } => extensions.clone(),
            _ => serde_json_bytes::Map::new(),
        };
        extensions
            .entry("code")
            .or_insert_with(|| self.extension_code().into());
        match self {
            ResolutionError::NotImplemented { entity_type }
            | ResolutionError::ResponsibilityViolation { entity_type, .. }
            | ResolutionError::BatchContractViolation { entity_type, .. }
            | ResolutionError::BatchFailed { entity_type, .. }
            | ResolutionError::BatchAborted { entity_type } => {
                extensions
                    .entry("entityType")
                    .or_insert_with(|| entity_type.as_str().into());
            }
            _ => {}
        }

        GraphQLError {
            message: self.to_string(),
            path,
            extensions,
        }
    }
}

/// Errors detected while assembling the schema or registering resolvers.
///
/// These are configuration defects: they are reported before any request is served and are
/// never retried.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum RegistrationError {
    /// unknown entity type '{0}'
    UnknownEntityType(String),

    /// entity type '{entity_type}' has no field '{field}'
    UnknownField { entity_type: String, field: String },

    /// field '{field}' of '{entity_type}' is supplied by the engine and cannot be owned by a resolver
    SuppliedField { entity_type: String, field: String },

    /// entity type '{0}' already has a node resolver
    DuplicateResolver(String),

    /// entity type '{0}' is declared twice
    DuplicateEntityType(String),

    /// entity type '{0}' has no node resolver
    NotImplemented(String),

    /// configuration for '{path}' refers to unknown entity type '{entity_type}'
    UnknownConfiguredEntityType { entity_type: String, path: String },

    /// invalid schema: {0}
    InvalidSchema(String),
}

/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// could not deserialize configuration: {0}
    DeserializeConfigError(serde_yaml::Error),
}
