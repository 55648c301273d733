//! Per-request context handed to node resolvers.
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use serde::Serialize;
use tower::BoxError;

use crate::Object;
use crate::error::ResolutionError;
use crate::global_id::GlobalId;
use crate::selection::SelectionSet;

pub type SelectionsAccessor = Arc<dyn Fn() -> SelectionSet + Send + Sync>;

/// A nested query issued by a resolver through its context.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subquery {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    #[serde(default)]
    pub variables: Object,
}

/// Capability to run nested queries, provided by the surrounding executor.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SubqueryExecutor: Send + Sync + 'static {
    /// Executes `subquery` and returns its `data`.
    async fn execute(&self, subquery: Subquery) -> Result<Object, BoxError>;
}

/// Everything a node resolver gets to know about one resolution request.
///
/// The requested selection set is computed lazily, on the first call to [`Self::selections`].
/// Calling it marks the resolution as selective: its value may then omit responsibility fields
/// that were not requested. A resolver that never calls it must return its whole responsibility
/// set.
#[derive(Clone)]
pub struct ExecutionContext {
    id: GlobalId,
    accessor: SelectionsAccessor,
    selections: Arc<OnceCell<SelectionSet>>,
    accessed: Arc<AtomicBool>,
    subquery_executor: Option<Arc<dyn SubqueryExecutor>>,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("selections", &self.selections.get())
            .field("accessed", &self.selections_accessed())
            .finish()
    }
}

#[buildstructor::buildstructor]
impl ExecutionContext {
    /// Without an accessor, the context serves `selections` (empty by default).
    #[builder(visibility = "pub")]
    fn new(
        id: GlobalId,
        accessor: Option<SelectionsAccessor>,
        selections: Option<SelectionSet>,
        subquery_executor: Option<Arc<dyn SubqueryExecutor>>,
    ) -> Self {
        let accessor = match (accessor, selections) {
            (Some(accessor), _) => accessor,
            (None, selections) => {
                let selections = selections.unwrap_or_default();
                Arc::new(move || selections.clone())
            }
        };
        Self {
            id,
            accessor,
            selections: Default::default(),
            accessed: Default::default(),
            subquery_executor,
        }
    }
}

impl ExecutionContext {
    /// Creates a context whose selection set is computed by `accessor` on first access.
    pub fn with_accessor<F>(id: GlobalId, accessor: F) -> Self
    where
        F: Fn() -> SelectionSet + Send + Sync + 'static,
    {
        Self::builder()
            .id(id)
            .accessor(Arc::new(accessor) as SelectionsAccessor)
            .build()
    }

    pub fn id(&self) -> &GlobalId {
        &self.id
    }

    /// The fields requested on this node.
    pub fn selections(&self) -> &SelectionSet {
        self.accessed.store(true, Ordering::Release);
        self.selections.get_or_init(|| (self.accessor)())
    }

    /// Whether the resolver consulted the selection set.
    pub fn selections_accessed(&self) -> bool {
        self.accessed.load(Ordering::Acquire)
    }

    pub fn subquery_executor(&self) -> Option<&Arc<dyn SubqueryExecutor>> {
        self.subquery_executor.as_ref()
    }

    /// Runs a nested query through the executor's subquery capability.
    pub async fn execute_subquery(&self, subquery: Subquery) -> Result<Object, ResolutionError> {
        let executor = self
            .subquery_executor
            .as_ref()
            .ok_or_else(|| ResolutionError::Subquery {
                reason: "no subquery executor available".to_string(),
            })?;
        executor
            .execute(subquery)
            .await
            .map_err(|error| ResolutionError::Subquery {
                reason: error.to_string(),
            })
    }
}
