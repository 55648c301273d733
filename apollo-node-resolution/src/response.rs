//! Composition of node resolutions into a GraphQL response shape.
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::Value;

use crate::Object;
use crate::global_id::GlobalIdCodec;
use crate::result::NodeResolution;
use crate::result::ResolutionResult;
use crate::schema::ID_FIELD;
use crate::schema::TYPENAME_FIELD;

/// An element of a response path.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathElement {
    /// An index in a list.
    Index(usize),
    /// A response key.
    Key(String),
}

/// A GraphQL error as sent to the client.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLError {
    pub message: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathElement>,

    #[serde(default, skip_serializing_if = "Object::is_empty")]
    pub extensions: Object,
}

/// Nodes laid out at consecutive positions of a response list.
///
/// A node that failed to resolve is `null` as a whole, whatever fields it would have carried, and
/// its error is reported with the path of that position.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NodeResponse {
    pub data: Vec<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,
}

impl NodeResponse {
    /// Lays out `resolutions` under `response_key`, in order.
    ///
    /// Resolved nodes get their `__typename` and their encoded `id` in front of the fields
    /// produced by their resolver.
    pub fn compose(
        codec: &GlobalIdCodec,
        response_key: &str,
        resolutions: impl IntoIterator<Item = NodeResolution>,
    ) -> Self {
        let mut response = NodeResponse::default();
        for (index, resolution) in resolutions.into_iter().enumerate() {
            match resolution.result {
                ResolutionResult::Value(fields) => {
                    let mut node = Object::with_capacity(fields.len() + 2);
                    node.insert(
                        TYPENAME_FIELD,
                        resolution.id.entity_type().as_str().into(),
                    );
                    node.insert(ID_FIELD, codec.encode(&resolution.id).into());
                    for (key, value) in fields {
                        node.insert(key, value);
                    }
                    response.data.push(Value::Object(node));
                }
                ResolutionResult::Error(error) => {
                    tracing::debug!(id = %resolution.id, %error, "node resolved to null");
                    response.data.push(Value::Null);
                    response.errors.push(error.to_graphql_error(vec![
                        PathElement::Key(response_key.to_string()),
                        PathElement::Index(index),
                    ]));
                }
            }
        }
        response
    }
}
