use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use apollo_node_resolution::BatchNodeResolver;
use apollo_node_resolution::Completeness;
use apollo_node_resolution::ExecutionContext;
use apollo_node_resolution::Object;
use apollo_node_resolution::ResolutionResult;
use apollo_node_resolution::SchemaRegistry;
use apollo_node_resolution::Selection;
use apollo_node_resolution::SelectionSet;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json_bytes::json;
use tower::BoxError;

use super::coordinator;
use super::object;
use super::schema;

/// Computes only the requested responsibility fields.
struct SelectiveUsers {
    schema: Arc<SchemaRegistry>,
}

#[async_trait]
impl BatchNodeResolver for SelectiveUsers {
    async fn resolve_batch(
        &self,
        ctxs: &[ExecutionContext],
    ) -> Result<Vec<ResolutionResult>, BoxError> {
        let definition = self
            .schema
            .entity_type("User")
            .ok_or("User is not an entity type")?;
        Ok(ctxs
            .iter()
            .map(|ctx| {
                let id = ctx.id().internal_id();
                let mut user = Object::new();
                for field in ctx.selections().requested_responsibilities(definition) {
                    match field {
                        "name" => user.insert("name", id.into()),
                        "email" => user.insert("email", format!("{id}@example.com").into()),
                        _ => None,
                    };
                }
                ResolutionResult::Value(user)
            })
            .collect())
    }
}

#[tokio::test]
async fn selective_resolvers_compute_requested_fields_only() {
    let schema = schema();
    let coordinator = coordinator(SelectiveUsers {
        schema: schema.clone(),
    });
    let computed = Arc::new(AtomicUsize::new(0));

    let ctx = ExecutionContext::with_accessor(schema.global_id("User", "u1").unwrap(), {
        let computed = computed.clone();
        let schema = schema.clone();
        move || {
            computed.fetch_add(1, Ordering::SeqCst);
            let selections: Vec<Selection> = serde_json::from_value(serde_json::json!([
                { "kind": "Field", "name": "id" },
                {
                    "kind": "InlineFragment",
                    "typeCondition": "Post",
                    "selections": [{ "kind": "Field", "name": "name" }]
                },
                {
                    "kind": "InlineFragment",
                    "typeCondition": "Node",
                    "selections": [{ "kind": "Field", "name": "email" }]
                },
                {
                    "kind": "Field",
                    "name": "friends",
                    "selections": [{ "kind": "Field", "name": "name" }]
                }
            ]))
            .unwrap();
            let user = schema.entity_type("User").expect("User is an entity type");
            SelectionSet::from_selections(user, &selections)
        }
    });

    let resolution = coordinator.resolve(ctx).await;

    assert_eq!(
        resolution.result,
        ResolutionResult::Value(object(json!({ "email": "u1@example.com" })))
    );
    assert_eq!(resolution.completeness, Completeness::Selective);
    assert!(!resolution.is_complete());
    assert_eq!(computed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn non_selective_resolvers_ignore_what_was_requested() {
    let schema = schema();
    let coordinator = coordinator(super::ScriptedUsers::echo());
    let computed = Arc::new(AtomicUsize::new(0));

    let narrow = ExecutionContext::with_accessor(schema.global_id("Post", "p1").unwrap(), {
        let computed = computed.clone();
        move || {
            computed.fetch_add(1, Ordering::SeqCst);
            SelectionSet::new().field("title")
        }
    });
    let wide = ExecutionContext::builder()
        .id(schema.global_id("Post", "p1").unwrap())
        .selections(
            SelectionSet::new()
                .field("title")
                .nested("author", SelectionSet::new().field("name")),
        )
        .build();

    let results = coordinator.resolve_all([narrow, wide]).await;

    assert_eq!(results[0], results[1]);
    assert!(results.iter().all(|r| r.is_complete()));
    assert_eq!(computed.load(Ordering::SeqCst), 0);
}
