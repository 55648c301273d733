mod batching;
mod selections;

use std::sync::Arc;

use apollo_node_resolution::BatchCoordinator;
use apollo_node_resolution::BatchNodeResolver;
use apollo_node_resolution::Configuration;
use apollo_node_resolution::ExecutionContext;
use apollo_node_resolution::NodeResolver;
use apollo_node_resolution::Object;
use apollo_node_resolution::ResolutionResult;
use apollo_node_resolution::ResolverRegistry;
use apollo_node_resolution::SchemaRegistry;
use apollo_node_resolution::SingleNodeResolver;
use apollo_node_resolution::error::RegistrationError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json_bytes::Value;
use serde_json_bytes::json;
use tokio::sync::Notify;
use tower::BoxError;

pub(crate) const SCHEMA: &str = r#"
directive @resolver on FIELD_DEFINITION

interface Node {
  id: ID!
}

type Query {
  node(id: ID!): Node
  nodes(ids: [ID!]!): [Node]!
}

type User implements Node {
  id: ID!
  name: String
  email: String
  friends: [User] @resolver
}

type Post implements Node {
  id: ID!
  title: String
  author: User
}
"#;

pub(crate) fn schema() -> Arc<SchemaRegistry> {
    Arc::new(SchemaRegistry::from_sdl(SCHEMA).expect("test schema is valid"))
}

pub(crate) fn object(value: Value) -> Object {
    match value {
        Value::Object(object) => object,
        other => panic!("expected an object, got {other:?}"),
    }
}

type Respond =
    dyn Fn(&[ExecutionContext]) -> Result<Vec<ResolutionResult>, BoxError> + Send + Sync;

/// User resolver answering from a closure, recording the internal ids of every batch.
pub(crate) struct ScriptedUsers {
    pub(crate) batches: Arc<Mutex<Vec<Vec<String>>>>,
    gate: Option<Arc<Notify>>,
    respond: Box<Respond>,
}

impl ScriptedUsers {
    pub(crate) fn new<F>(respond: F) -> Self
    where
        F: Fn(&[ExecutionContext]) -> Result<Vec<ResolutionResult>, BoxError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            batches: Default::default(),
            gate: None,
            respond: Box::new(respond),
        }
    }

    /// Every user gets its internal id as name.
    pub(crate) fn echo() -> Self {
        Self::new(|ctxs| {
            Ok(ctxs
                .iter()
                .map(|ctx| {
                    ResolutionResult::Value(object(json!({ "name": ctx.id().internal_id() })))
                })
                .collect())
        })
    }

    /// Batches wait for `gate` before answering.
    pub(crate) fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl BatchNodeResolver for ScriptedUsers {
    async fn resolve_batch(
        &self,
        ctxs: &[ExecutionContext],
    ) -> Result<Vec<ResolutionResult>, BoxError> {
        self.batches.lock().push(
            ctxs.iter()
                .map(|ctx| ctx.id().internal_id().to_string())
                .collect(),
        );
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        (self.respond)(ctxs)
    }
}

/// Post resolver that never looks at the selection set.
pub(crate) struct Posts;

#[async_trait]
impl SingleNodeResolver for Posts {
    async fn resolve(&self, ctx: &ExecutionContext) -> ResolutionResult {
        ResolutionResult::Value(object(json!({
            "title": format!("Post {}", ctx.id().internal_id()),
            "author": null
        })))
    }
}

pub(crate) fn coordinator(users: impl BatchNodeResolver) -> BatchCoordinator {
    configured_coordinator(users, Configuration::default()).unwrap()
}

pub(crate) fn configured_coordinator(
    users: impl BatchNodeResolver,
    configuration: Configuration,
) -> Result<BatchCoordinator, RegistrationError> {
    let mut registry = ResolverRegistry::new(schema());
    registry
        .register("User", NodeResolver::batch(users))
        .unwrap()
        .register("Post", NodeResolver::single(Posts))
        .unwrap();
    BatchCoordinator::builder()
        .resolvers(registry)
        .configuration(Arc::new(configuration))
        .build()
}

pub(crate) fn node(schema: &SchemaRegistry, entity_type: &str, id: &str) -> ExecutionContext {
    ExecutionContext::builder()
        .id(schema.global_id(entity_type, id).unwrap())
        .build()
}

/// Yields until `condition` holds, letting spawned tasks make progress.
pub(crate) async fn until(condition: impl Fn() -> bool) {
    while !condition() {
        tokio::task::yield_now().await;
    }
}
