//! Coalescing of node resolution requests into batches.
//!
//! Requests for an entity type whose resolver is a [`BatchNodeResolver`] are parked in a
//! [`PendingBatchGroup`]. The request that opens a group yields once in its own task before the
//! flush is spawned, so every request issued in the same poll of that task joins the group
//! whatever the runtime flavor. The flush then waits for the optional `batching.delay`, takes the
//! group out of the coordinator and sends it to the resolver. Requests arriving after that open a
//! new group.
//!
//! Batch sizes and counts are emitted as `tracing` events with `histogram.` and
//! `monotonic_counter.` fields, the router's naming convention for metrics. A metrics layer
//! installed on the subscriber turns them into instruments, otherwise they are plain info events.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::task::Poll;

use futures::future::BoxFuture;
use itertools::Itertools;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tower::BoxError;
use tower::Service;
use tracing::Instrument;

use crate::Object;
use crate::configuration::Configuration;
use crate::configuration::ResponsibilityPolicy;
use crate::context::ExecutionContext;
use crate::error::RegistrationError;
use crate::error::ResolutionError;
use crate::global_id::EntityType;
use crate::global_id::GlobalId;
use crate::resolver::BatchNodeResolver;
use crate::resolver::NodeResolver;
use crate::resolver::ResolverRegistry;
use crate::resolver::SingleNodeResolver;
use crate::result::NodeResolution;
use crate::result::ResolutionResult;
use crate::schema::ID_FIELD;
use crate::schema::SchemaRegistry;
use crate::schema::TYPENAME_FIELD;

type Waiter = (ExecutionContext, oneshot::Sender<NodeResolution>);

/// Lifecycle of a [`PendingBatchGroup`]. A group never goes back to `Open`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum GroupState {
    /// Accepting requests.
    Open,
    /// Taken out of the coordinator, the batch call is in flight.
    Dispatching,
    /// Results were delivered.
    Closed,
}

/// Requests for one entity type collected during one scheduling window.
pub(crate) struct PendingBatchGroup {
    id: u64,
    entity_type: EntityType,
    state: GroupState,
    waiters: Vec<Waiter>,
}

impl PendingBatchGroup {
    fn new(id: u64, entity_type: EntityType) -> Self {
        Self {
            id,
            entity_type,
            state: GroupState::Open,
            waiters: Vec::new(),
        }
    }

    fn transition(&mut self, state: GroupState) {
        tracing::trace!(group = %self, to = ?state, "batch group transition");
        self.state = state;
    }
}

impl fmt::Display for PendingBatchGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id: {}, entity type: {}, state: {:?}, waiters: {}",
            self.id,
            self.entity_type,
            self.state,
            self.waiters.len()
        )
    }
}

/// Entry point of node resolution.
///
/// Single resolvers are called directly. Requests for batch resolvers are coalesced per entity
/// type and scheduling window, and every caller receives the result found at its own position in
/// the batch. Cloning a coordinator shares its pending groups.
#[derive(Clone)]
pub struct BatchCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    schema: Arc<SchemaRegistry>,
    resolvers: ResolverRegistry,
    configuration: Arc<Configuration>,
    groups: Mutex<HashMap<EntityType, PendingBatchGroup>>,
    next_group_id: AtomicU64,
}

#[buildstructor::buildstructor]
impl BatchCoordinator {
    /// Fails if an entity type of the schema has no node resolver, or if the configuration
    /// overrides a type the schema does not declare.
    #[builder(visibility = "pub")]
    fn new(
        resolvers: ResolverRegistry,
        configuration: Option<Arc<Configuration>>,
    ) -> Result<Self, RegistrationError> {
        resolvers.validate()?;
        let configuration = configuration.unwrap_or_default();
        configuration.check_entity_types(resolvers.schema())?;
        Ok(Self {
            inner: Arc::new(Inner {
                schema: resolvers.schema().clone(),
                resolvers,
                configuration,
                groups: Default::default(),
                next_group_id: AtomicU64::new(0),
            }),
        })
    }
}

impl BatchCoordinator {
    /// Resolves the node identified by `ctx`.
    ///
    /// Failures are never returned as `Err`: they are isolated in the node's
    /// [`ResolutionResult`].
    pub async fn resolve(&self, ctx: ExecutionContext) -> NodeResolution {
        let id = ctx.id().clone();
        let entity_type = id.entity_type().clone();
        let Some(resolver) = self.inner.resolvers.get(&entity_type).cloned() else {
            failfast_debug!(%entity_type, "no node resolver");
            return NodeResolution::new(
                id,
                ResolutionResult::Error(ResolutionError::NotImplemented { entity_type }),
                false,
            );
        };

        match resolver {
            NodeResolver::Single(resolver) => {
                let result = resolver.resolve(&ctx).await;
                self.inner.finish(&ctx, result)
            }
            NodeResolver::Batch(resolver) => {
                if !self.inner.configuration.batching(&entity_type).enabled {
                    let ctxs = vec![ctx];
                    let results = resolver.resolve_batch(&ctxs).await;
                    return self
                        .inner
                        .correlate(&entity_type, &ctxs, results)
                        .pop()
                        .unwrap_or_else(|| aborted(id, entity_type));
                }

                let (rx, opened) = self.inner.enqueue(&entity_type, ctx);
                if let Some(group_id) = opened {
                    let flush = ScheduledFlush {
                        inner: self.inner.clone(),
                        entity_type: entity_type.clone(),
                        group_id,
                        resolver,
                        runtime: tokio::runtime::Handle::current(),
                    };
                    tokio::task::yield_now().await;
                    drop(flush);
                }
                rx.await.unwrap_or_else(|_| {
                    tracing::error!(%entity_type, "batch dropped before delivering its results");
                    aborted(id, entity_type)
                })
            }
        }
    }

    /// Resolves several nodes concurrently. Results are in the order of `ctxs`.
    pub async fn resolve_all(
        &self,
        ctxs: impl IntoIterator<Item = ExecutionContext>,
    ) -> Vec<NodeResolution> {
        futures::future::join_all(ctxs.into_iter().map(|ctx| self.resolve(ctx))).await
    }

    /// Number of requests waiting in the open group of `entity_type`.
    pub fn pending_requests(&self, entity_type: &EntityType) -> usize {
        self.inner
            .groups
            .lock()
            .get(entity_type)
            .map(|group| group.waiters.len())
            .unwrap_or_default()
    }
}

/// Spawns the flush of a group when dropped.
///
/// The request that opened the group holds it across one yield of its own task. A request
/// dropped before that still gets its group flushed.
struct ScheduledFlush {
    inner: Arc<Inner>,
    entity_type: EntityType,
    group_id: u64,
    resolver: Arc<dyn BatchNodeResolver>,
    runtime: tokio::runtime::Handle,
}

impl Drop for ScheduledFlush {
    fn drop(&mut self) {
        let span = tracing::info_span!(
            "node_batch",
            entity_type = %self.entity_type,
            group = self.group_id
        );
        self.runtime.spawn(
            self.inner
                .clone()
                .flush(
                    self.entity_type.clone(),
                    self.group_id,
                    self.resolver.clone(),
                )
                .instrument(span),
        );
    }
}

fn aborted(id: GlobalId, entity_type: EntityType) -> NodeResolution {
    NodeResolution::new(
        id,
        ResolutionResult::Error(ResolutionError::BatchAborted { entity_type }),
        false,
    )
}

impl Inner {
    /// Parks `ctx` in the open group of its entity type, opening one if needed.
    ///
    /// Returns the id of the group when this request opened it.
    fn enqueue(
        &self,
        entity_type: &EntityType,
        ctx: ExecutionContext,
    ) -> (oneshot::Receiver<NodeResolution>, Option<u64>) {
        let (tx, rx) = oneshot::channel();
        let mut groups = self.groups.lock();
        let opened = match groups.entry(entity_type.clone()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().waiters.push((ctx, tx));
                None
            }
            Entry::Vacant(entry) => {
                let id = self.next_group_id.fetch_add(1, Ordering::Relaxed);
                let group = entry.insert(PendingBatchGroup::new(id, entity_type.clone()));
                group.waiters.push((ctx, tx));
                Some(id)
            }
        };
        (rx, opened)
    }

    async fn flush(
        self: Arc<Self>,
        entity_type: EntityType,
        group_id: u64,
        resolver: Arc<dyn BatchNodeResolver>,
    ) {
        let batching = self.configuration.batching(&entity_type);
        if let Some(delay) = batching.delay {
            tokio::time::sleep(delay).await;
        }

        let group = {
            let mut groups = self.groups.lock();
            if groups.get(&entity_type).map(|group| group.id) == Some(group_id) {
                groups.remove(&entity_type)
            } else {
                None
            }
        };
        let Some(mut group) = group else {
            tracing::error!(%entity_type, group_id, "batch group vanished before dispatch");
            return;
        };
        group.transition(GroupState::Dispatching);

        let waiters = std::mem::take(&mut group.waiters);
        let batches = match batching.max_batch_size {
            Some(size) if waiters.len() > size.get() => split(waiters, size.get()),
            _ => vec![waiters],
        };

        futures::future::join_all(
            batches
                .into_iter()
                .map(|batch| self.dispatch(&entity_type, resolver.as_ref(), batch)),
        )
        .await;

        group.transition(GroupState::Closed);
    }

    async fn dispatch(
        &self,
        entity_type: &EntityType,
        resolver: &dyn BatchNodeResolver,
        batch: Vec<Waiter>,
    ) {
        let (ctxs, senders): (Vec<_>, Vec<_>) = batch.into_iter().unzip();

        tracing::info!(
            histogram.apollo.router.node_resolution.batch.size = ctxs.len() as f64,
            entity_type = %entity_type
        );
        tracing::info!(
            monotonic_counter.apollo.router.node_resolution.batches = 1u64,
            entity_type = %entity_type
        );

        let results = resolver.resolve_batch(&ctxs).await;
        let resolutions = self.correlate(entity_type, &ctxs, results);

        // correlate returns exactly one resolution per context
        for (resolution, sender) in resolutions.into_iter().zip_eq(senders) {
            if let Err(resolution) = sender.send(resolution) {
                tracing::debug!(
                    id = %resolution.id,
                    "caller went away before its node was resolved"
                );
            }
        }
    }

    /// Matches batch results to their contexts by position.
    fn correlate(
        &self,
        entity_type: &EntityType,
        ctxs: &[ExecutionContext],
        results: Result<Vec<ResolutionResult>, BoxError>,
    ) -> Vec<NodeResolution> {
        let error = match results {
            Ok(results) if results.len() == ctxs.len() => {
                return ctxs
                    .iter()
                    .zip_eq(results)
                    .map(|(ctx, result)| self.finish(ctx, result))
                    .collect();
            }
            Ok(results) => {
                failfast_error!(
                    %entity_type,
                    expected = ctxs.len(),
                    actual = results.len(),
                    "batch resolver broke its contract"
                );
                ResolutionError::BatchContractViolation {
                    entity_type: entity_type.clone(),
                    expected: ctxs.len(),
                    actual: results.len(),
                }
            }
            Err(error) => {
                tracing::error!(%entity_type, %error, "batch resolution failed");
                ResolutionError::BatchFailed {
                    entity_type: entity_type.clone(),
                    reason: error.to_string(),
                }
            }
        };

        ctxs.iter()
            .map(|ctx| {
                NodeResolution::new(
                    ctx.id().clone(),
                    ResolutionResult::Error(error.clone()),
                    ctx.selections_accessed(),
                )
            })
            .collect()
    }

    fn finish(&self, ctx: &ExecutionContext, result: ResolutionResult) -> NodeResolution {
        let selective = ctx.selections_accessed();
        let result = match result {
            ResolutionResult::Value(value) => {
                self.check_responsibilities(ctx.id(), value, selective)
            }
            error => error,
        };
        NodeResolution::new(ctx.id().clone(), result, selective)
    }

    /// Checks a value against the responsibility set of its entity type.
    fn check_responsibilities(
        &self,
        id: &GlobalId,
        mut value: Object,
        selective: bool,
    ) -> ResolutionResult {
        let entity_type = id.entity_type();
        let Some(definition) = self.schema.entity_type(entity_type.as_str()) else {
            return ResolutionResult::Value(value);
        };

        value.remove(ID_FIELD);
        value.remove(TYPENAME_FIELD);

        let foreign: Vec<String> = value
            .keys()
            .filter(|field| !definition.is_responsible_for(field.as_str()))
            .map(|field| field.as_str().to_string())
            .collect();
        if !foreign.is_empty() {
            match self.configuration.responsibility_policy() {
                ResponsibilityPolicy::Reject => {
                    tracing::warn!(
                        %id,
                        fields = ?foreign,
                        "node resolver produced fields it does not own"
                    );
                    return ResolutionResult::Error(ResolutionError::ResponsibilityViolation {
                        entity_type: entity_type.clone(),
                        fields: foreign,
                    });
                }
                ResponsibilityPolicy::Drop => {
                    tracing::warn!(
                        %id,
                        fields = ?foreign,
                        "dropping fields the node resolver does not own"
                    );
                    for field in &foreign {
                        value.remove(field.as_str());
                    }
                }
            }
        }

        if !selective && self.configuration.verify_completeness() {
            let missing: Vec<&str> = definition
                .responsibility_set()
                .filter(|field| !value.contains_key(*field))
                .collect();
            if !missing.is_empty() {
                tracing::warn!(
                    %id,
                    ?missing,
                    "node resolver omitted fields without consulting the selection set"
                );
                tracing::info!(
                    monotonic_counter.apollo.router.node_resolution.incomplete = 1u64,
                    entity_type = %entity_type
                );
            }
        }

        ResolutionResult::Value(value)
    }
}

fn split(mut waiters: Vec<Waiter>, size: usize) -> Vec<Vec<Waiter>> {
    let mut batches = Vec::with_capacity(waiters.len().div_ceil(size));
    while waiters.len() > size {
        let rest = waiters.split_off(size);
        batches.push(waiters);
        waiters = rest;
    }
    batches.push(waiters);
    batches
}

impl Service<ExecutionContext> for BatchCoordinator {
    type Response = NodeResolution;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, ctx: ExecutionContext) -> Self::Future {
        let coordinator = self.clone();
        Box::pin(async move { Ok(coordinator.resolve(ctx).await) })
    }
}
