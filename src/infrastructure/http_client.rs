//! reqwest-backed [`DependencyClient`].

use crate::domain::{
    Dependency, DependencyClient, DependencyClientPtr, DependencyRequest, DependencyResponse,
    Failure, Outcome,
};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Calls dependencies over HTTP and classifies the result.
///
/// Holds one pooled `reqwest::Client`; the per-call timeout comes from the
/// dependency, so one client serves every dependency.
pub struct HttpDependencyClient {
    client: Client,
}

impl HttpDependencyClient {
    pub fn new(client: Client) -> Self {
        HttpDependencyClient { client }
    }
}

#[async_trait::async_trait]
impl DependencyClient for HttpDependencyClient {
    // ---
    async fn call(&self, dependency: &Dependency, request: &DependencyRequest) -> Outcome {
        // ---
        let url = dependency.url_for(&request.path_and_query);
        tracing::debug!(dependency = %dependency.name, %url, "Calling dependency");

        let response = match self
            .client
            .request(request.method.clone(), &url)
            .timeout(dependency.timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => return Outcome::Failure(classify(err)),
        };

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(err) => return Outcome::Failure(classify(err)),
        };

        let reply = DependencyResponse {
            status,
            content_type,
            body,
        };

        if reply.is_success() {
            Outcome::Success(reply)
        } else {
            Outcome::Failure(Failure::NonSuccessStatus(reply))
        }
    }
}

fn classify(err: reqwest::Error) -> Failure {
    // ---
    if err.is_timeout() {
        Failure::Timeout
    } else if err.is_connect() {
        Failure::ConnectionRefused(err.to_string())
    } else {
        Failure::Transport(err.to_string())
    }
}

/// Creates the HTTP dependency client.
pub fn create() -> anyhow::Result<DependencyClientPtr> {
    // ---
    let client = Client::builder()
        .pool_max_idle_per_host(5)
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    Ok(Arc::new(HttpDependencyClient::new(client)))
}
