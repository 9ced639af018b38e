//! Scripted fakes for the transport and task source seams.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::{CephError, CephResult};
use crate::task::{OperationIdentity, Task, TaskDirectory, TaskMetadata, TaskSource};
use crate::transport::{ApiRequest, ApiResponse, Transport};

/// Replays canned responses in order, repeating the last one, and records
/// every request it sees.
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<ApiResponse>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<ApiResponse>) -> Self {
        assert!(!responses.is_empty(), "script needs at least one response");
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always(status: u16, body: &str) -> Self {
        Self::new(vec![ApiResponse::new(status, body)])
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn issued(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: ApiRequest) -> CephResult<ApiResponse> {
        self.requests.lock().unwrap().push(request);
        let mut responses = self.responses.lock().unwrap();
        let response = if responses.len() > 1 {
            responses.pop_front().unwrap()
        } else {
            responses.front().cloned().unwrap()
        };
        Ok(response)
    }
}

/// Replays task directory snapshots, or failures carrying an HTTP status,
/// repeating the last step.
pub struct ScriptedTaskSource {
    steps: Mutex<VecDeque<Result<TaskDirectory, u16>>>,
    fetches: Mutex<usize>,
}

impl ScriptedTaskSource {
    pub fn new(directories: Vec<TaskDirectory>) -> Self {
        Self::with_steps(directories.into_iter().map(Ok).collect())
    }

    pub fn with_steps(steps: Vec<Result<TaskDirectory, u16>>) -> Self {
        assert!(!steps.is_empty(), "script needs at least one step");
        Self {
            steps: Mutex::new(steps.into()),
            fetches: Mutex::new(0),
        }
    }

    pub fn fetches(&self) -> usize {
        *self.fetches.lock().unwrap()
    }
}

#[async_trait]
impl TaskSource for ScriptedTaskSource {
    async fn fetch_tasks(&self) -> CephResult<TaskDirectory> {
        *self.fetches.lock().unwrap() += 1;
        let mut steps = self.steps.lock().unwrap();
        let step = if steps.len() > 1 {
            steps.pop_front().unwrap()
        } else {
            steps.front().cloned().unwrap()
        };
        step.map_err(|status| CephError::Api {
            context: "could not get tasks".to_string(),
            status,
            code: None,
            message: "scripted failure".to_string(),
        })
    }
}

fn task_for(identity: &OperationIdentity) -> Task {
    Task {
        name: identity.kind.task_name().to_string(),
        metadata: TaskMetadata {
            pool_name: identity.pool_name.clone(),
            namespace: identity.namespace.clone(),
            image_name: identity.image_name.clone(),
            image_spec: identity.image_spec.clone(),
        },
        ..Default::default()
    }
}

pub fn executing(identity: &OperationIdentity) -> Task {
    Task {
        progress: 50,
        ..task_for(identity)
    }
}

pub fn finished(identity: &OperationIdentity, success: bool) -> Task {
    let mut task = Task {
        progress: 100,
        success,
        ..task_for(identity)
    };
    if !success {
        task.exception = Some(crate::task::Exception {
            detail: "[errno 16] RBD image is busy".to_string(),
            code: Some("16".to_string()),
            ..Default::default()
        });
    }
    task
}

pub fn directory(executing_tasks: Vec<Task>, finished_tasks: Vec<Task>) -> TaskDirectory {
    TaskDirectory {
        executing_tasks,
        finished_tasks,
    }
}
