//! GraphQL access to the AppSync API.
//!
//! [`GraphQLService`](graphql::GraphQLService) speaks GraphQL over HTTP.
//! [`ApiAdapter`](adapter::ApiAdapter) exposes it through the Amplify shaped [`ApiBackend`]
//! interface, whose failures keep the Amplify `{errors, data}` shape.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};

pub mod adapter;
pub mod graphql;

pub use adapter::GraphQLClient;

/// Determines whether a request is sent as query or mutation.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum OperationKind {
    #[default]
    Query,
    Mutation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GraphQLRequest {
    pub query: String,
    pub variables: Value,
    pub kind: OperationKind,
}

impl GraphQLRequest {
    pub fn query(query: impl Into<String>) -> Self {
        GraphQLRequest {
            query: query.into(),
            variables: Value::Object(Map::new()),
            kind: OperationKind::Query,
        }
    }

    pub fn mutation(mutation: impl Into<String>) -> Self {
        GraphQLRequest {
            kind: OperationKind::Mutation,
            ..Self::query(mutation)
        }
    }

    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = variables;
        self
    }
}

/// The result of a successful operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphQLData {
    pub data: Value,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GraphQLErrorMessage {
    pub message: String,
}

/// A failed operation, serialized as `{"errors": [{"message": ...}], "data": null}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GraphQLFailure {
    pub errors: Vec<GraphQLErrorMessage>,
    pub data: Option<Value>,
}

impl GraphQLFailure {
    pub fn new(message: impl Into<String>) -> Self {
        GraphQLFailure {
            errors: vec![GraphQLErrorMessage {
                message: message.into(),
            }],
            data: None,
        }
    }
}

impl Display for GraphQLFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let messages: Vec<_> = self
            .errors
            .iter()
            .map(|error| error.message.as_str())
            .collect();

        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for GraphQLFailure {}

impl From<anyhow::Error> for GraphQLFailure {
    fn from(err: anyhow::Error) -> Self {
        GraphQLFailure::new(err.to_string())
    }
}

/// The Amplify `API` surface.
#[async_trait]
pub trait ApiBackend: Send + Sync {
    async fn graphql(&self, request: GraphQLRequest) -> Result<GraphQLData, GraphQLFailure>;

    /// Sends the given token as `Authorization` header with all subsequent requests.
    fn update_auth_token(&self, token: &str);
}
