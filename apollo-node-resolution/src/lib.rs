//! Resolution of GraphQL nodes by global identifier, with request coalescing for entity types
//! that resolve in batches.

#![cfg_attr(feature = "failfast", allow(unreachable_code))]
#![warn(unreachable_pub)]

macro_rules! failfast_debug {
    ($($tokens:tt)+) => {{
        tracing::debug!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

macro_rules! failfast_error {
    ($($tokens:tt)+) => {{
        tracing::error!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

pub mod configuration;
mod context;
mod coordinator;
pub mod error;
mod global_id;
mod resolver;
pub mod response;
mod result;
mod schema;
mod selection;

pub use configuration::Configuration;
pub use context::ExecutionContext;
pub use context::SelectionsAccessor;
pub use context::Subquery;
pub use context::SubqueryExecutor;
pub use coordinator::BatchCoordinator;
pub use error::ResolutionError;
pub use global_id::EntityType;
pub use global_id::GlobalId;
pub use global_id::GlobalIdCodec;
pub use resolver::BatchNodeResolver;
pub use resolver::NodeResolver;
pub use resolver::ResolverRegistry;
pub use resolver::SingleNodeResolver;
pub use result::Completeness;
pub use result::NodeResolution;
pub use result::ResolutionResult;
pub use schema::EntityTypeDefinition;
pub use schema::FieldOwner;
pub use schema::SchemaRegistry;
pub use schema::SchemaRegistryBuilder;
pub use selection::Field;
pub use selection::InlineFragment;
pub use selection::Selection;
pub use selection::SelectionSet;

/// A JSON object, as produced by node resolvers.
pub type Object = serde_json_bytes::Map<serde_json_bytes::ByteString, serde_json_bytes::Value>;
