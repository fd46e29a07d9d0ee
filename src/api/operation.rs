//! Long-running operations.
//!
//! Cluster mutations return an operation resource that is polled at
//! `{base}{operation.name}` until it reports `done`.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ApiError, Result};
use crate::model::HttpMethod;

use super::client::DataprocClient;
use super::transport::ApiRequest;

/// A long-running operation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Operation {
    /// Operation resource name, relative to the base URL.
    #[serde(default)]
    pub name: String,
    /// Whether the operation has finished.
    #[serde(default)]
    pub done: bool,
    /// Failure status, if the operation failed.
    #[serde(default)]
    pub error: Option<OperationStatus>,
    /// Result of a successful operation.
    #[serde(default)]
    pub response: Option<Value>,
    /// Service-specific progress metadata.
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Error status of a failed operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OperationStatus {
    /// RPC status code.
    #[serde(default)]
    pub code: i32,
    /// Error message.
    #[serde(default)]
    pub message: String,
}

impl Operation {
    /// Decodes an operation from a response body.
    ///
    /// # Errors
    ///
    /// Returns an invalid-response error if the body is not an operation.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| ApiError::invalid_response(format!("Failed to decode operation: {e}")).into())
    }

    /// Converts a finished operation into its response.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::OperationFailed`] if the operation carries an error.
    pub fn into_response(self) -> Result<Option<Value>> {
        match self.error {
            Some(status) => Err(ApiError::OperationFailed {
                name: self.name,
                code: status.code,
                message: status.message,
            }
            .into()),
            None => Ok(self.response),
        }
    }
}

impl DataprocClient {
    /// Polls an operation until it is done and returns its response.
    ///
    /// # Errors
    ///
    /// Returns an error if polling fails or the operation finishes with an error.
    pub async fn wait_for_operation(&self, operation: Value) -> Result<Option<Value>> {
        let mut operation = Operation::from_value(operation)?;
        let mut polls: u32 = 0;
        while !operation.done {
            if operation.name.is_empty() {
                return Err(ApiError::invalid_response("Pending operation has no name").into());
            }
            polls += 1;
            let delay = self.retry().backoff(polls);
            debug!("Operation {} pending, polling again in {delay:?}", operation.name);
            tokio::time::sleep(delay).await;
            let url = self.url(&operation.name);
            operation = Operation::from_value(self.call(ApiRequest::new(HttpMethod::Get, url)).await?)?;
        }
        info!("Operation {} done after {polls} poll(s)", operation.name);
        operation.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::retry::RetryPolicy;
    use crate::api::transport::{ApiResponse, MockTransport};
    use crate::error::DataprocError;
    use mockall::Sequence;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_failed_operation() {
        let operation = Operation::from_value(json!({
            "name": "projects/p/regions/r/operations/op-1",
            "done": true,
            "error": {"code": 9, "message": "cluster is in ERROR state"}
        }))
        .unwrap();
        let err = operation.into_response().unwrap_err();
        assert!(matches!(
            err,
            DataprocError::Api(ApiError::OperationFailed { code: 9, .. })
        ));
    }

    #[tokio::test]
    async fn test_wait_polls_until_done() {
        let mut transport = MockTransport::new();
        let mut seq = Sequence::new();
        transport
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .withf(|r| r.url == "https://example.test/v1/projects/p/regions/r/operations/op-1")
            .returning(|_| Ok(ApiResponse::new(200, r#"{"name":"projects/p/regions/r/operations/op-1"}"#)));
        transport
            .expect_send()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Ok(ApiResponse::new(
                    200,
                    r#"{"name":"projects/p/regions/r/operations/op-1","done":true,"response":{"clusterUuid":"u-1"}}"#,
                ))
            });

        let client = DataprocClient::new(Arc::new(transport))
            .with_base_path("https://example.test/v1/")
            .with_retry(RetryPolicy::fixed(3, Duration::from_millis(1)));
        let response = client
            .wait_for_operation(json!({"name": "projects/p/regions/r/operations/op-1", "done": false}))
            .await
            .unwrap();
        assert_eq!(response, Some(json!({"clusterUuid": "u-1"})));
    }
}
