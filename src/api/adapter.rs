//! Exposes the [`GraphQLService`] through the Amplify shaped [`ApiBackend`] interface.

use crate::api::graphql::GraphQLService;
use crate::api::{ApiBackend, GraphQLData, GraphQLFailure, GraphQLRequest, OperationKind};
use crate::config::Config;
use async_trait::async_trait;
use futures_util::Stream;
use futures_util::stream;
use std::sync::Arc;
use std::time::Duration;

pub struct ApiAdapter {
    graphql: GraphQLService,
}

impl ApiAdapter {
    pub fn new(graphql: GraphQLService) -> Self {
        ApiAdapter { graphql }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self::new(GraphQLService::new(config)?))
    }

    pub fn graphql_service(&self) -> &GraphQLService {
        &self.graphql
    }

    /// Returns a client which delegates to this adapter.
    pub fn generate_client(self: &Arc<Self>) -> GraphQLClient {
        GraphQLClient::new(self.clone())
    }
}

#[async_trait]
impl ApiBackend for ApiAdapter {
    async fn graphql(&self, request: GraphQLRequest) -> Result<GraphQLData, GraphQLFailure> {
        let result = match request.kind {
            OperationKind::Query => self.graphql.query(&request.query, request.variables).await,
            OperationKind::Mutation => {
                self.graphql
                    .mutate(&request.query, request.variables)
                    .await
            }
        };

        result.map_err(GraphQLFailure::from)
    }

    fn update_auth_token(&self, token: &str) {
        self.graphql.set_auth_token(token);
    }
}

/// The object handed out by `generateClient` in Amplify.
#[derive(Clone)]
pub struct GraphQLClient {
    backend: Arc<dyn ApiBackend>,
}

impl GraphQLClient {
    pub fn new(backend: Arc<dyn ApiBackend>) -> Self {
        GraphQLClient { backend }
    }

    pub async fn graphql(&self, request: GraphQLRequest) -> Result<GraphQLData, GraphQLFailure> {
        self.backend.graphql(request).await
    }

    /// Executes the request once immediately and then again after each interval, yielding each
    /// result.
    ///
    /// Server pushed subscriptions are not supported; polling replaces them. The stream never
    /// ends on its own, drop it to stop polling.
    pub fn poll(
        &self,
        request: GraphQLRequest,
        interval: Duration,
    ) -> impl Stream<Item = Result<GraphQLData, GraphQLFailure>> + Send + 'static {
        stream::unfold(
            (self.backend.clone(), request, true),
            move |(backend, request, first)| async move {
                if !first {
                    tokio::time::sleep(interval).await;
                }
                let result = backend.graphql(request.clone()).await;

                Some((result, (backend, request, false)))
            },
        )
    }
}
