use async_trait::async_trait;
use std::sync::Arc;

use super::TaskDirectory;
use crate::error::{CephError, CephResult};
use crate::logging::Logger;
use crate::transport::{ApiRequest, Transport};

/// Source of fresh task directory snapshots. Nothing is cached.
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn fetch_tasks(&self) -> CephResult<TaskDirectory>;
}

/// Reads `GET /api/task` through the transport retry policy.
#[derive(Clone)]
pub struct TaskReader {
    transport: Arc<dyn Transport>,
    log: Logger,
}

impl TaskReader {
    pub fn new(transport: Arc<dyn Transport>, log: Logger) -> Self {
        Self {
            transport,
            log: log.scoped("ceph_rest_sdk::task"),
        }
    }
}

#[async_trait]
impl TaskSource for TaskReader {
    async fn fetch_tasks(&self) -> CephResult<TaskDirectory> {
        let response = self
            .transport
            .execute(ApiRequest::get(&["task"]).retryable())
            .await?;

        if !response.is_success() {
            return Err(CephError::from_response("could not get tasks", &response));
        }

        let directory: TaskDirectory = response.json()?;
        self.log.debug(format_args!(
            "{} tasks executing, {} tasks finished",
            directory.executing_tasks.len(),
            directory.finished_tasks.len()
        ));
        Ok(directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;
    use crate::transport::ApiResponse;

    #[tokio::test]
    async fn test_fetch_decodes_directory() {
        let transport = Arc::new(ScriptedTransport::new(vec![ApiResponse::new(
            200,
            r#"{"executing_tasks": [], "finished_tasks": [{"name": "rbd/create", "success": true}]}"#,
        )]));
        let reader = TaskReader::new(transport.clone(), Logger::global());

        let directory = reader.fetch_tasks().await.unwrap();
        assert!(directory.executing_tasks.is_empty());
        assert_eq!(directory.finished_tasks.len(), 1);

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].to_string(), "GET task");
        assert!(requests[0].retry);
    }

    #[tokio::test]
    async fn test_non_success_status_is_domain_error() {
        let transport = Arc::new(ScriptedTransport::new(vec![ApiResponse::new(
            404,
            r#"{"detail": "Not found", "code": "not_found"}"#,
        )]));
        let reader = TaskReader::new(transport, Logger::global());

        match reader.fetch_tasks().await {
            Err(CephError::Api { status, code, .. }) => {
                assert_eq!(status, 404);
                assert_eq!(code.as_deref(), Some("not_found"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_garbage_body_is_serialization_error() {
        let transport = Arc::new(ScriptedTransport::new(vec![ApiResponse::new(200, "<html>")]));
        let reader = TaskReader::new(transport, Logger::global());
        assert!(matches!(
            reader.fetch_tasks().await,
            Err(CephError::Serialization(_))
        ));
    }
}
