use crate::api::GraphQLData;
use crate::config::Config;
use crate::error::ResultExt;
use crate::validation_bail;
use anyhow::{Context, bail};
use arc_swap::ArcSwap;
use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;

/// Headers which may be changed after construction.
const UPDATABLE_HEADERS: [&str; 3] = ["Authorization", "x-api-key", "Content-Type"];

#[derive(Deserialize)]
struct GraphQLResponse {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<ResponseError>,
}

#[derive(Deserialize)]
struct ResponseError {
    message: String,
}

/// Sends queries and mutations to a GraphQL endpoint via HTTP `POST`.
pub struct GraphQLService {
    client: reqwest::Client,
    endpoint: Url,
    headers: ArcSwap<HeaderMap>,
}

impl GraphQLService {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let appsync = &config.aws.appsync;
        if appsync.endpoint.is_empty() {
            validation_bail!("Missing required AppSync endpoint configuration");
        }

        let endpoint = Url::parse(&appsync.endpoint)
            .with_context(|| format!("Invalid AppSync endpoint '{}'", appsync.endpoint))
            .mark_validation_error()?;

        let mut builder = reqwest::Client::builder();
        if config.api.timeout > 0 {
            builder = builder.timeout(Duration::from_millis(config.api.timeout));
        }
        let client = builder.build().context("Failed to set up the HTTP client")?;

        let mut headers = HeaderMap::new();
        if let Some(api_key) = appsync.api_key.as_deref()
            && !api_key.is_empty()
        {
            headers.insert(
                "x-api-key",
                HeaderValue::from_str(api_key)
                    .context("Invalid AppSync API key")
                    .mark_validation_error()?,
            );
        }

        Ok(GraphQLService {
            client,
            endpoint,
            headers: ArcSwap::from_pointee(headers),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Returns the headers currently sent with every request.
    pub fn headers(&self) -> HeaderMap {
        HeaderMap::clone(&self.headers.load())
    }

    #[tracing::instrument(level = "debug", skip_all, err(Display))]
    pub async fn query(&self, query: &str, variables: Value) -> anyhow::Result<GraphQLData> {
        with_failure_message(self.execute(query, variables).await, "GraphQL query failed")
    }

    #[tracing::instrument(level = "debug", skip_all, err(Display))]
    pub async fn mutate(&self, mutation: &str, variables: Value) -> anyhow::Result<GraphQLData> {
        with_failure_message(
            self.execute(mutation, variables).await,
            "GraphQL mutation failed",
        )
    }

    /// Merges the given headers into the ones sent with every request.
    ///
    /// Only `Authorization`, `x-api-key` and `Content-Type` are accepted. Line breaks are removed
    /// from values, other names or unusable values are skipped.
    pub fn update_headers<'a>(&self, headers: impl IntoIterator<Item = (&'a str, &'a str)>) {
        let mut accepted = Vec::new();
        for (name, value) in headers {
            if !UPDATABLE_HEADERS.contains(&name) {
                tracing::warn!("Ignoring update of header '{}'", name);
                continue;
            }

            let sanitized: String = value.chars().filter(|c| *c != '\r' && *c != '\n').collect();
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&sanitized),
            ) {
                (Ok(name), Ok(value)) => accepted.push((name, value)),
                _ => tracing::warn!("Ignoring invalid value for header '{}'", name),
            }
        }

        if accepted.is_empty() {
            return;
        }

        self.headers.rcu(|current| {
            let mut next = HeaderMap::clone(current);
            for (name, value) in &accepted {
                next.insert(name.clone(), value.clone());
            }

            next
        });
    }

    pub fn set_auth_token(&self, token: &str) {
        self.update_headers([("Authorization", token)]);
    }

    async fn execute(&self, query: &str, variables: Value) -> anyhow::Result<GraphQLData> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(self.headers())
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await
            .context("Request failed")
            .mark_transport_error()?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read the response")
            .mark_transport_error()?;
        if !status.is_success() {
            return Err(anyhow::anyhow!("API error ({}): {}", status, body)).mark_transport_error();
        }

        let response: GraphQLResponse =
            serde_json::from_str(&body)
            .context("Received an invalid GraphQL response")
            .mark_transport_error()?;
        if !response.errors.is_empty() {
            let messages: Vec<_> = response
                .errors
                .iter()
                .map(|error| error.message.as_str())
                .collect();
            bail!("{}", messages.join("; "));
        }

        Ok(GraphQLData {
            data: response.data.unwrap_or(Value::Null),
        })
    }
}

fn with_failure_message(
    result: anyhow::Result<GraphQLData>,
    prefix: &str,
) -> anyhow::Result<GraphQLData> {
    result.map_err(|err| {
        tracing::error!("{}: {:#}", prefix, err);
        let message = format!("{}: {}", prefix, err);
        err.context(message)
    })
}

#[cfg(test)]
pub(crate) mod test {
    use serde_json::{Value, json};
    use std::net::SocketAddr;
    use warp::Filter;
    use warp::http::StatusCode;

    /// Starts a GraphQL endpoint at `/graphql` which echoes each request.
    ///
    /// A query containing `fail` yields a GraphQL error, one containing `crash` a status 500 and
    /// one containing `garbled` a status 200 with a body which is no GraphQL response.
    pub(crate) fn start_echo_server() -> SocketAddr {
        let route = warp::post()
            .and(warp::path("graphql"))
            .and(warp::header::optional::<String>("x-api-key"))
            .and(warp::header::optional::<String>("authorization"))
            .and(warp::body::json())
            .map(
                |api_key: Option<String>, authorization: Option<String>, body: Value| {
                    let query = body["query"].as_str().unwrap_or_default().to_string();
                    if query.contains("crash") {
                        return warp::reply::with_status(
                            warp::reply::json(&json!({"message": "internal"})),
                            StatusCode::INTERNAL_SERVER_ERROR,
                        );
                    }
                    if query.contains("garbled") {
                        return warp::reply::with_status(
                            warp::reply::json(&"<html>gateway</html>"),
                            StatusCode::OK,
                        );
                    }
                    if query.contains("fail") {
                        return warp::reply::with_status(
                            warp::reply::json(
                                &json!({"data": null, "errors": [{"message": "boom"}]}),
                            ),
                            StatusCode::OK,
                        );
                    }

                    warp::reply::with_status(
                        warp::reply::json(&json!({
                            "data": {
                                "query": query,
                                "variables": body["variables"],
                                "apiKey": api_key,
                                "authorization": authorization
                            }
                        })),
                        StatusCode::OK,
                    )
                },
            );

        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        addr
    }

    pub(crate) fn echo_config(addr: SocketAddr) -> crate::config::Config {
        let mut config = crate::config::test::valid_config();
        config.aws.appsync.endpoint = format!("http://{}/graphql", addr);

        config
    }
}
