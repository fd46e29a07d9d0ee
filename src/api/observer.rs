//! Read-side access to Dataproc resources.

use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ApiError, Result};
use crate::model::{HttpMethod, Identity, Resource, codec};

use super::client::DataprocClient;
use super::transport::ApiRequest;

/// Page size meaning "no explicit limit".
pub const UNLIMITED_PAGE_SIZE: i32 = -1;

/// Fetches resources from the API.
#[derive(Debug, Clone)]
pub struct ResourceObserver {
    client: DataprocClient,
}

/// One page of a list call, able to fetch the following pages.
#[derive(Debug, Clone)]
pub struct ResourceList<R> {
    /// Resources on the current page.
    pub items: Vec<R>,
    next_page_token: Option<String>,
    project: String,
    location: String,
    page_size: i32,
}

impl<R: Resource> ResourceList<R> {
    /// Returns true if another page is available.
    #[must_use]
    pub fn has_next(&self) -> bool {
        self.next_page_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Replaces the current items with the next page.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no next page or the call fails.
    pub async fn next(&mut self, observer: &ResourceObserver) -> Result<()> {
        let token = self
            .next_page_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::invalid_response("No next page available"))?;
        let page = observer
            .list_page::<R>(&self.project, &self.location, self.page_size, Some(&token))
            .await?;
        self.items = page.items;
        self.next_page_token = page.next_page_token;
        Ok(())
    }
}

impl ResourceObserver {
    /// Creates an observer.
    #[must_use]
    pub const fn new(client: DataprocClient) -> Self {
        Self { client }
    }

    /// Fetches the current state of `resource`, identified by its identity fields.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] if the resource does not exist, or a
    /// decode error if the payload does not match the schema.
    pub async fn get<R: Resource>(&self, resource: &R) -> Result<R> {
        let value = self.fetch(resource).await?;
        codec::flatten(value, &resource.identity())
    }

    /// Fetches the raw JSON of `resource` without decoding it.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] if the resource does not exist.
    pub async fn fetch<R: Resource>(&self, resource: &R) -> Result<Value> {
        let url = self.client.url(&resource.resource_path()?);
        self.client.call(ApiRequest::new(HttpMethod::Get, url)).await
    }

    /// Like [`get`](Self::get), but maps not-found onto `None`.
    ///
    /// # Errors
    ///
    /// Returns any error other than not-found.
    pub async fn find<R: Resource>(&self, resource: &R) -> Result<Option<R>> {
        match self.get(resource).await {
            Ok(found) => Ok(Some(found)),
            Err(e) if e.is_not_found() => {
                debug!("{} {} not found", R::KIND, resource.identity());
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Lists the first page of resources under a project and location.
    ///
    /// # Errors
    ///
    /// Returns an error if the call fails or an item cannot be decoded.
    pub async fn list<R: Resource>(&self, project: &str, location: &str, page_size: i32) -> Result<ResourceList<R>> {
        info!("Listing {} resources in {project}/{location}", R::KIND);
        self.list_page(project, location, page_size, None).await
    }

    /// Lists every resource under a project and location, following pages.
    ///
    /// # Errors
    ///
    /// Returns an error if any page fails.
    pub async fn list_all<R: Resource>(&self, project: &str, location: &str) -> Result<Vec<R>> {
        let mut list = self.list::<R>(project, location, UNLIMITED_PAGE_SIZE).await?;
        let mut items = std::mem::take(&mut list.items);
        while list.has_next() {
            list.next(self).await?;
            items.append(&mut list.items);
        }
        debug!("Found {} {} resource(s)", items.len(), R::KIND);
        Ok(items)
    }

    async fn list_page<R: Resource>(
        &self,
        project: &str,
        location: &str,
        page_size: i32,
        page_token: Option<&str>,
    ) -> Result<ResourceList<R>> {
        let mut request = ApiRequest::new(HttpMethod::Get, self.client.url(&R::collection_path(project, location)));
        if let Some(token) = page_token {
            request = request.with_query("pageToken", token);
        }
        if page_size != UNLIMITED_PAGE_SIZE {
            request = request.with_query("pageSize", page_size.to_string());
        }

        let mut body = self.client.call(request).await?;
        let context = Identity {
            project: Some(project.to_string()),
            location: Some(location.to_string()),
            name: None,
        };
        let items = match body.get_mut(R::LIST_KEY).map(Value::take) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(values)) => values
                .into_iter()
                .map(|value| codec::flatten::<R>(value, &context))
                .collect::<Result<Vec<_>>>()?,
            Some(other) => {
                return Err(ApiError::invalid_response(format!(
                    "Expected '{}' to be an array, got {other}",
                    R::LIST_KEY
                ))
                .into());
            }
        };
        let next_page_token = body
            .get("nextPageToken")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(ResourceList {
            items,
            next_page_token,
            project: project.to_string(),
            location: location.to_string(),
            page_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::{ApiResponse, MockTransport};
    use crate::model::AutoscalingPolicy;
    use std::sync::Arc;

    fn observer(transport: MockTransport) -> ResourceObserver {
        ResourceObserver::new(DataprocClient::new(Arc::new(transport)).with_base_path("https://example.test/v1"))
    }

    fn policy() -> AutoscalingPolicy {
        AutoscalingPolicy {
            name: Some(String::from("p1")),
            project: Some(String::from("my-project")),
            location: Some(String::from("us-central1")),
            ..AutoscalingPolicy::default()
        }
    }

    #[tokio::test]
    async fn test_find_maps_not_found() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .withf(|r| r.url.ends_with("/projects/my-project/locations/us-central1/autoscalingPolicies/p1"))
            .returning(|_| Ok(ApiResponse::new(404, "")));
        assert!(observer(transport).find(&policy()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_stamps_identity() {
        let mut transport = MockTransport::new();
        transport.expect_send().returning(|_| {
            Ok(ApiResponse::new(
                200,
                r#"{"id":"p1","name":"projects/my-project/locations/us-central1/autoscalingPolicies/p1","workerConfig":{"maxInstances":10}}"#,
            ))
        });
        let found = observer(transport).get(&policy()).await.unwrap();
        assert_eq!(found.project.as_deref(), Some("my-project"));
        assert_eq!(found.location.as_deref(), Some("us-central1"));
        assert_eq!(found.worker_config.as_value().and_then(|w| w.max_instances), Some(10));
    }

    #[tokio::test]
    async fn test_get_propagates_decode_errors() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .returning(|_| Ok(ApiResponse::new(200, r#"{"id":"p1","workerConfig":{"maxInstances":"ten"}}"#)));
        let err = observer(transport).get(&policy()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to decode AutoscalingPolicy"));
    }

    #[tokio::test]
    async fn test_list_omits_unlimited_page_size() {
        let mut transport = MockTransport::new();
        transport
            .expect_send()
            .withf(|r| r.query.is_empty())
            .returning(|_| Ok(ApiResponse::new(200, r#"{"policies":[{"id":"a"},{"id":"b"}]}"#)));
        let list = observer(transport)
            .list::<AutoscalingPolicy>("my-project", "us-central1", UNLIMITED_PAGE_SIZE)
            .await
            .unwrap();
        assert_eq!(list.items.len(), 2);
        assert!(!list.has_next());
        assert_eq!(list.items[1].location.as_deref(), Some("us-central1"));
    }
}
