//! The node resolution contract and the registry of node resolvers.
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tower::BoxError;

use crate::context::ExecutionContext;
use crate::error::RegistrationError;
use crate::global_id::EntityType;
use crate::result::ResolutionResult;
use crate::schema::SchemaRegistry;

/// Resolves nodes one at a time.
#[async_trait]
pub trait SingleNodeResolver: Send + Sync + 'static {
    async fn resolve(&self, ctx: &ExecutionContext) -> ResolutionResult;
}

/// Resolves many nodes of the same entity type in one downstream call.
///
/// Only the [`crate::BatchCoordinator`] calls batch resolvers.
#[async_trait]
pub trait BatchNodeResolver: Send + Sync + 'static {
    /// Returns one result per context, in the order of `ctxs`.
    ///
    /// Results are matched to their callers by position. An `Err` means the batch failed as a
    /// whole and is reported to every caller in the batch.
    async fn resolve_batch(
        &self,
        ctxs: &[ExecutionContext],
    ) -> Result<Vec<ResolutionResult>, BoxError>;
}

/// The node resolver of an entity type, single or batched.
#[derive(Clone)]
pub enum NodeResolver {
    Single(Arc<dyn SingleNodeResolver>),
    Batch(Arc<dyn BatchNodeResolver>),
}

impl NodeResolver {
    pub fn single(resolver: impl SingleNodeResolver) -> Self {
        NodeResolver::Single(Arc::new(resolver))
    }

    pub fn batch(resolver: impl BatchNodeResolver) -> Self {
        NodeResolver::Batch(Arc::new(resolver))
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, NodeResolver::Batch(_))
    }
}

impl fmt::Debug for NodeResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeResolver::Single(_) => f.write_str("NodeResolver::Single"),
            NodeResolver::Batch(_) => f.write_str("NodeResolver::Batch"),
        }
    }
}

/// Node resolvers indexed by entity type.
///
/// Registration is checked against the schema: only known entity types can get a resolver, each
/// at most one. [`Self::validate`] then checks that no entity type was left without one.
#[derive(Clone, Debug)]
pub struct ResolverRegistry {
    schema: Arc<SchemaRegistry>,
    resolvers: HashMap<EntityType, NodeResolver>,
}

impl ResolverRegistry {
    pub fn new(schema: Arc<SchemaRegistry>) -> Self {
        Self {
            schema,
            resolvers: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        entity_type: &str,
        resolver: NodeResolver,
    ) -> Result<&mut Self, RegistrationError> {
        let entity_type = EntityType::new(entity_type);
        if !self.schema.contains(&entity_type) {
            return Err(RegistrationError::UnknownEntityType(
                entity_type.to_string(),
            ));
        }
        if self.resolvers.contains_key(&entity_type) {
            return Err(RegistrationError::DuplicateResolver(
                entity_type.to_string(),
            ));
        }

        tracing::debug!(%entity_type, ?resolver, "registered node resolver");
        self.resolvers.insert(entity_type, resolver);
        Ok(self)
    }

    pub fn get(&self, entity_type: &EntityType) -> Option<&NodeResolver> {
        self.resolvers.get(entity_type)
    }

    pub fn schema(&self) -> &Arc<SchemaRegistry> {
        &self.schema
    }

    /// Fails with the first entity type, in schema order, that has no node resolver.
    pub fn validate(&self) -> Result<(), RegistrationError> {
        match self
            .schema
            .entity_types()
            .find(|definition| !self.resolvers.contains_key(definition.name()))
        {
            Some(definition) => Err(RegistrationError::NotImplemented(
                definition.name().to_string(),
            )),
            None => Ok(()),
        }
    }
}
