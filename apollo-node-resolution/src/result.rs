use serde::Deserialize;
use serde::Serialize;

use crate::Object;
use crate::error::ResolutionError;
use crate::global_id::GlobalId;

/// Outcome of resolving one node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionResult {
    /// The node's fields. Only fields of the responsibility set are expected.
    Value(Object),
    /// The node could not be resolved and will be `null` in the response.
    Error(ResolutionError),
}

impl ResolutionResult {
    pub fn error(error: ResolutionError) -> Self {
        ResolutionResult::Error(error)
    }

    pub fn is_value(&self) -> bool {
        matches!(self, ResolutionResult::Value(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ResolutionResult::Error(_))
    }

    pub fn value(&self) -> Option<&Object> {
        match self {
            ResolutionResult::Value(value) => Some(value),
            ResolutionResult::Error(_) => None,
        }
    }

    pub fn as_error(&self) -> Option<&ResolutionError> {
        match self {
            ResolutionResult::Value(_) => None,
            ResolutionResult::Error(error) => Some(error),
        }
    }

    pub fn into_result(self) -> Result<Object, ResolutionError> {
        self.into()
    }
}

impl From<Result<Object, ResolutionError>> for ResolutionResult {
    fn from(result: Result<Object, ResolutionError>) -> Self {
        match result {
            Ok(value) => ResolutionResult::Value(value),
            Err(error) => ResolutionResult::Error(error),
        }
    }
}

impl From<ResolutionResult> for Result<Object, ResolutionError> {
    fn from(result: ResolutionResult) -> Self {
        match result {
            ResolutionResult::Value(value) => Ok(value),
            ResolutionResult::Error(error) => Err(error),
        }
    }
}

/// Whether a value may be missing responsibility fields.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completeness {
    /// The resolver never looked at the selection set, so its value holds the whole
    /// responsibility set.
    Complete,
    /// The resolver consulted the selection set and may have left out unrequested fields.
    Selective,
}

/// What a caller of the coordinator gets back for one node.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeResolution {
    pub id: GlobalId,
    pub result: ResolutionResult,
    pub completeness: Completeness,
}

impl NodeResolution {
    pub(crate) fn new(id: GlobalId, result: ResolutionResult, selections_accessed: bool) -> Self {
        Self {
            id,
            result,
            completeness: if selections_accessed {
                Completeness::Selective
            } else {
                Completeness::Complete
            },
        }
    }

    /// Callers may rely on every responsibility field being present.
    pub fn is_complete(&self) -> bool {
        self.result.is_value() && self.completeness == Completeness::Complete
    }
}
