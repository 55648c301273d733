use std::sync::Arc;

use apollo_node_resolution::Configuration;
use apollo_node_resolution::EntityType;
use apollo_node_resolution::ResolutionError;
use apollo_node_resolution::ResolutionResult;
use pretty_assertions::assert_eq;
use serde_json_bytes::json;
use tokio::sync::Notify;

use super::ScriptedUsers;
use super::configured_coordinator;
use super::coordinator;
use super::node;
use super::object;
use super::schema;
use super::until;

fn ids(batches: &[Vec<String>]) -> Vec<Vec<&str>> {
    batches
        .iter()
        .map(|batch| batch.iter().map(String::as_str).collect())
        .collect()
}

#[tokio::test]
async fn one_window_makes_one_batch_with_positional_results() {
    let users = ScriptedUsers::new(|_| {
        Ok(vec![
            ResolutionResult::Value(object(json!({ "name": "Ada" }))),
            ResolutionResult::error(ResolutionError::resolver("user not found")),
            ResolutionResult::Value(object(json!({ "name": "Grace" }))),
        ])
    });
    let batches = users.batches.clone();
    let coordinator = coordinator(users);
    let schema = schema();

    let results = coordinator
        .resolve_all(["u1", "u2", "u3"].map(|id| node(&schema, "User", id)))
        .await;

    assert_eq!(ids(&batches.lock()), vec![vec!["u1", "u2", "u3"]]);
    assert_eq!(
        results.iter().map(|r| r.id.internal_id()).collect::<Vec<_>>(),
        vec!["u1", "u2", "u3"]
    );
    assert_eq!(
        results[0].result,
        ResolutionResult::Value(object(json!({ "name": "Ada" })))
    );
    assert_eq!(
        results[1].result,
        ResolutionResult::error(ResolutionError::resolver("user not found"))
    );
    assert_eq!(
        results[2].result,
        ResolutionResult::Value(object(json!({ "name": "Grace" })))
    );
}

#[tokio::test]
async fn entity_types_are_batched_separately() {
    let users = ScriptedUsers::echo();
    let batches = users.batches.clone();
    let coordinator = coordinator(users);
    let schema = schema();

    let results = coordinator
        .resolve_all([
            node(&schema, "User", "u1"),
            node(&schema, "Post", "p1"),
            node(&schema, "User", "u2"),
        ])
        .await;

    assert_eq!(ids(&batches.lock()), vec![vec!["u1", "u2"]]);
    assert_eq!(
        results[1].result.value().and_then(|post| post.get("title")),
        Some(&json!("Post p1"))
    );
    assert_eq!(
        results[2].result.value().and_then(|user| user.get("name")),
        Some(&json!("u2"))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn windows_are_not_split_across_worker_threads() {
    let users = ScriptedUsers::echo();
    let batches = users.batches.clone();
    let coordinator = coordinator(users);
    let schema = schema();

    for window in 0..200 {
        let expected: Vec<String> = (0..50).map(|i| format!("u{window}-{i}")).collect();
        let results = tokio::spawn({
            let coordinator = coordinator.clone();
            let ctxs: Vec<_> = expected
                .iter()
                .map(|id| node(&schema, "User", id))
                .collect();
            async move { coordinator.resolve_all(ctxs).await }
        })
        .await
        .unwrap();

        assert!(results.iter().all(|r| r.result.is_value()));
        let mut recorded = batches.lock();
        assert_eq!(recorded.len(), 1, "window {window} was split");
        assert_eq!(recorded.pop(), Some(expected));
    }
}

#[tokio::test]
async fn delay_lets_other_tasks_join_the_group() {
    let users = ScriptedUsers::echo();
    let batches = users.batches.clone();
    let configuration =
        Configuration::from_yaml("batching:\n  all:\n    delay: 100ms\n").unwrap();
    let coordinator = configured_coordinator(users, configuration).unwrap();
    let schema = schema();

    let tasks: Vec<_> = ["u1", "u2"]
        .map(|id| {
            let coordinator = coordinator.clone();
            let ctx = node(&schema, "User", id);
            tokio::spawn(async move { coordinator.resolve(ctx).await })
        })
        .into_iter()
        .collect();
    for task in tasks {
        assert!(task.await.unwrap().result.is_value());
    }

    assert_eq!(ids(&batches.lock()), vec![vec!["u1", "u2"]]);
}

#[tokio::test]
async fn late_request_opens_a_new_group() {
    let gate = Arc::new(Notify::new());
    let users = ScriptedUsers::echo().gated(gate.clone());
    let batches = users.batches.clone();
    let coordinator = coordinator(users);
    let schema = schema();
    let user = EntityType::new("User");

    let first = tokio::spawn({
        let coordinator = coordinator.clone();
        let ctxs = ["u1", "u2", "u3"].map(|id| node(&schema, "User", id));
        async move { coordinator.resolve_all(ctxs).await }
    });
    until(|| batches.lock().len() == 1).await;
    assert_eq!(coordinator.pending_requests(&user), 0);

    let late = tokio::spawn({
        let coordinator = coordinator.clone();
        let ctx = node(&schema, "User", "u4");
        async move { coordinator.resolve(ctx).await }
    });
    until(|| batches.lock().len() == 2).await;
    gate.notify_waiters();

    let first = first.await.unwrap();
    let late = late.await.unwrap();

    assert_eq!(ids(&batches.lock()), vec![vec!["u1", "u2", "u3"], vec!["u4"]]);
    assert!(first.iter().all(|r| r.result.is_value()));
    assert_eq!(
        late.result.value().and_then(|user| user.get("name")),
        Some(&json!("u4"))
    );
}

#[tokio::test]
async fn wrong_result_count_fails_the_whole_group() {
    for delta in [-1, 1] {
        let users = ScriptedUsers::new(move |ctxs| {
            let count = (ctxs.len() as isize + delta) as usize;
            Ok((0..count)
                .map(|_| ResolutionResult::Value(object(json!({ "name": "Ada" }))))
                .collect())
        });
        let coordinator = coordinator(users);
        let schema = schema();

        let results = coordinator
            .resolve_all(["u1", "u2", "u3"].map(|id| node(&schema, "User", id)))
            .await;

        let expected = ResolutionError::BatchContractViolation {
            entity_type: EntityType::new("User"),
            expected: 3,
            actual: (3 + delta) as usize,
        };
        for resolution in results {
            assert_eq!(resolution.result, ResolutionResult::error(expected.clone()));
        }
    }
}

#[tokio::test]
async fn failed_batch_fails_every_caller() {
    let users = ScriptedUsers::new(|_| Err("user service unavailable".into()));
    let coordinator = coordinator(users);
    let schema = schema();

    let results = coordinator
        .resolve_all(["u1", "u2"].map(|id| node(&schema, "User", id)))
        .await;

    for resolution in results {
        assert_eq!(
            resolution.result,
            ResolutionResult::error(ResolutionError::BatchFailed {
                entity_type: EntityType::new("User"),
                reason: "user service unavailable".to_string(),
            })
        );
    }
}
