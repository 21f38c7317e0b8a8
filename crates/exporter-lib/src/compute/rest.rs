use super::{ComputeError, ComputeGateway};
use crate::auth::AuthorizedClient;
use crate::models::{Instance, InstanceList, Region};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

pub const COMPUTE_BASE_URL: &str = "https://compute.googleapis.com/compute/v1";

/// Page size requested from the instances list call
pub const INSTANCES_PAGE_SIZE: u32 = 500;

/// Compute Engine v1 over REST
#[derive(Clone)]
pub struct ComputeService {
    client: AuthorizedClient,
    base: Url,
}

impl std::fmt::Debug for ComputeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputeService")
            .field("base", &self.base.as_str())
            .finish()
    }
}

impl ComputeService {
    pub fn new(client: AuthorizedClient) -> Result<Self, ComputeError> {
        Self::with_base_url(client, COMPUTE_BASE_URL)
    }

    pub fn with_base_url(client: AuthorizedClient, base: &str) -> Result<Self, ComputeError> {
        let base = Url::parse(base).map_err(|e| ComputeError::InvalidEndpoint(e.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(ComputeError::InvalidEndpoint(base.to_string()));
        }
        Ok(Self { client, base })
    }

    /// `{base}/projects/{project}/...` with every segment escaped
    fn project_url(&self, project: &str, rest: &[&str]) -> Result<Url, ComputeError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ComputeError::InvalidEndpoint(self.base.to_string()))?
            .pop_if_empty()
            .push("projects")
            .push(project)
            .extend(rest);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ComputeError> {
        debug!(url = %url, "Calling compute API");

        let response = self.client.get(url).await?.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(ComputeError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl ComputeGateway for ComputeService {
    async fn list_instances(&self, project: &str, zone: &str) -> Result<Vec<Instance>, ComputeError> {
        let mut instances = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.project_url(project, &["zones", zone, "instances"])?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("maxResults", &INSTANCES_PAGE_SIZE.to_string());
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let page: InstanceList = self.get_json(url).await?;
            instances.extend(page.items);

            match page.next_page_token {
                Some(token) if token.is_empty() => break,
                Some(token) if page_token.as_deref() == Some(token.as_str()) => {
                    return Err(ComputeError::RepeatedPageToken(token));
                }
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(project, zone, count = instances.len(), "Listed instances");
        Ok(instances)
    }

    async fn get_region(&self, project: &str, region: &str) -> Result<Region, ComputeError> {
        let url = self.project_url(project, &["regions", region])?;
        self.get_json(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AccessTokenProvider, BearerToken, TokenSourceError};
    use chrono::{Duration, Utc};
    use mockito::Matcher;
    use std::sync::Arc;

    struct StaticTokens;

    #[async_trait]
    impl AccessTokenProvider for StaticTokens {
        async fn token(&self) -> Result<BearerToken, TokenSourceError> {
            Ok(BearerToken {
                access_token: "tok".into(),
                token_type: "Bearer".into(),
                expiry: Utc::now() + Duration::hours(1),
            })
        }
    }

    struct BrokenTokens;

    #[async_trait]
    impl AccessTokenProvider for BrokenTokens {
        async fn token(&self) -> Result<BearerToken, TokenSourceError> {
            Err(TokenSourceError {
                step: "could not get Token",
                source: "endpoint unreachable".into(),
            })
        }
    }

    fn service(server: &mockito::Server) -> ComputeService {
        let client = AuthorizedClient::new(reqwest::Client::new(), Arc::new(StaticTokens));
        ComputeService::with_base_url(client, &format!("{}/compute/v1", server.url())).unwrap()
    }

    #[tokio::test]
    async fn test_list_instances_follows_pages() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/compute/v1/projects/p/zones/us-central1-a/instances")
            .match_header("authorization", "Bearer tok")
            .match_query(Matcher::Exact("maxResults=500".into()))
            .with_body(r#"{"items":[{"id":"1","machineType":"mt"}],"nextPageToken":"next"}"#)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/compute/v1/projects/p/zones/us-central1-a/instances")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("maxResults".into(), "500".into()),
                Matcher::UrlEncoded("pageToken".into(), "next".into()),
            ]))
            .with_body(r#"{"items":[{"id":"2","machineType":"mt"}]}"#)
            .create_async()
            .await;

        let instances = service(&server)
            .list_instances("p", "us-central1-a")
            .await
            .unwrap();

        first.assert_async().await;
        second.assert_async().await;
        let ids: Vec<_> = instances.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, ["1", "2"]);
    }

    #[tokio::test]
    async fn test_list_instances_stops_on_repeated_page_token() {
        let mut server = mockito::Server::new_async().await;
        let _first = server
            .mock("GET", "/compute/v1/projects/p/zones/us-central1-a/instances")
            .match_query(Matcher::Exact("maxResults=500".into()))
            .with_body(r#"{"items":[{"id":"1"}],"nextPageToken":"again"}"#)
            .create_async()
            .await;
        let repeated = server
            .mock("GET", "/compute/v1/projects/p/zones/us-central1-a/instances")
            .match_query(Matcher::UrlEncoded("pageToken".into(), "again".into()))
            .with_body(r#"{"items":[{"id":"2"}],"nextPageToken":"again"}"#)
            .expect(1)
            .create_async()
            .await;

        let err = service(&server)
            .list_instances("p", "us-central1-a")
            .await
            .unwrap_err();

        repeated.assert_async().await;
        assert!(matches!(err, ComputeError::RepeatedPageToken(ref token) if token == "again"));
    }

    #[tokio::test]
    async fn test_get_region() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/compute/v1/projects/p/regions/us-central1")
            .with_body(r#"{"name":"us-central1","quotas":[{"metric":"CPUS","usage":2,"limit":8}]}"#)
            .create_async()
            .await;

        let region = service(&server).get_region("p", "us-central1").await.unwrap();
        assert_eq!(region.quotas.len(), 1);
        assert_eq!(region.quotas[0].limit, 8.0);
    }

    #[tokio::test]
    async fn test_error_status_carries_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/compute/v1/projects/p/regions/nowhere")
            .with_status(404)
            .with_body("region not found")
            .create_async()
            .await;

        let err = service(&server).get_region("p", "nowhere").await.unwrap_err();
        match err {
            ComputeError::Status { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "region not found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_token_failure_is_auth_error() {
        let client = AuthorizedClient::new(reqwest::Client::new(), Arc::new(BrokenTokens));
        let service = ComputeService::with_base_url(client, "http://127.0.0.1:9/compute/v1").unwrap();

        let err = service.list_instances("p", "z").await.unwrap_err();
        assert!(matches!(err, ComputeError::Auth(_)));
    }

    #[test]
    fn test_invalid_base_url() {
        let client = AuthorizedClient::new(reqwest::Client::new(), Arc::new(StaticTokens));
        assert!(matches!(
            ComputeService::with_base_url(client.clone(), "not a url"),
            Err(ComputeError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            ComputeService::with_base_url(client, "mailto:ops@example.com"),
            Err(ComputeError::InvalidEndpoint(_))
        ));
    }
}
