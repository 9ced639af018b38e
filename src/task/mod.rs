//! Server-side task model and task correlation.
//!
//! The manager executes RBD mutations asynchronously and only exposes their
//! progress through `GET /api/task`. Tasks carry no id the client learns at
//! issue time, so a task is correlated to a request purely by its name and
//! metadata, see [`matches`].

pub mod reader;
pub mod waiter;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::util::{lenient_time, null_as_default, optional_string, path_join, string_or_number};

pub use reader::{TaskReader, TaskSource};
pub use waiter::CompletionWaiter;

/// Kind of mutation a task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Create,
    Edit,
    Delete,
}

impl OperationKind {
    /// Task name as reported by the manager.
    pub fn task_name(&self) -> &'static str {
        match self {
            OperationKind::Create => "rbd/create",
            OperationKind::Edit => "rbd/edit",
            OperationKind::Delete => "rbd/delete",
        }
    }

    pub fn from_task_name(name: &str) -> Option<Self> {
        match name {
            "rbd/create" => Some(OperationKind::Create),
            "rbd/edit" => Some(OperationKind::Edit),
            "rbd/delete" => Some(OperationKind::Delete),
            _ => None,
        }
    }

    pub fn gerund(&self) -> &'static str {
        match self {
            OperationKind::Create => "creating",
            OperationKind::Edit => "renaming",
            OperationKind::Delete => "deleting",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.task_name())
    }
}

/// Value-equality key correlating a request to its server-side task.
///
/// Create tasks are reported with pool, namespace and image name but no image
/// spec; edit and delete tasks only report the image spec. The key therefore
/// keeps every field and two keys are equal only if all of them agree.
/// Two identical operations in flight at the same time can not be told apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationIdentity {
    pub kind: OperationKind,
    pub pool_name: String,
    pub namespace: Option<String>,
    pub image_name: String,
    pub image_spec: String,
}

impl OperationIdentity {
    /// Identity of an `rbd/create` task. The spec is unknown at creation time.
    pub fn for_create(pool_name: &str, namespace: Option<&str>, image_name: &str) -> Self {
        Self {
            kind: OperationKind::Create,
            pool_name: pool_name.to_string(),
            namespace: crate::util::normalize_namespace(namespace),
            image_name: image_name.to_string(),
            image_spec: String::new(),
        }
    }

    /// Identity of an edit or delete task, which is keyed by image spec alone.
    pub fn for_image_spec(kind: OperationKind, image_spec: &str) -> Self {
        Self {
            kind,
            pool_name: String::new(),
            namespace: None,
            image_name: String::new(),
            image_spec: image_spec.to_string(),
        }
    }

    /// Human readable target, the spec when known.
    pub fn target(&self) -> String {
        if self.image_spec.is_empty() {
            path_join(&self.pool_name, self.namespace.as_deref(), &self.image_name)
        } else {
            self.image_spec.clone()
        }
    }
}

impl fmt::Display for OperationIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.target())
    }
}

/// Metadata attached to RBD tasks and to exceptions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    #[serde(default, deserialize_with = "null_as_default")]
    pub pool_name: String,
    #[serde(default, deserialize_with = "optional_string")]
    pub namespace: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub image_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub image_spec: String,
}

/// Task reference embedded in an exception document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExceptionTask {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: TaskMetadata,
}

/// Error document returned on HTTP 400 and stored on failed tasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Exception {
    #[serde(default, deserialize_with = "null_as_default")]
    pub detail: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub code: Option<String>,
    #[serde(default)]
    pub component: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub task: Option<ExceptionTask>,
}

impl Exception {
    pub fn has_code(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} (code {})", self.detail, code),
            None => f.write_str(&self.detail),
        }
    }
}

/// One asynchronous unit of work on the manager.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: TaskMetadata,
    #[serde(default, deserialize_with = "lenient_time")]
    pub begin_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_time")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub duration: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub progress: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub success: bool,
    #[serde(default)]
    pub ret_value: Value,
    #[serde(default)]
    pub exception: Option<Exception>,
}

impl Task {
    /// Identity this task reports, `None` for non-RBD tasks.
    pub fn identity(&self) -> Option<OperationIdentity> {
        let kind = OperationKind::from_task_name(&self.name)?;
        Some(OperationIdentity {
            kind,
            pool_name: self.metadata.pool_name.clone(),
            namespace: self.metadata.namespace.clone(),
            image_name: self.metadata.image_name.clone(),
            image_spec: self.metadata.image_spec.clone(),
        })
    }

    /// Failure description for diagnostics.
    pub fn failure_detail(&self) -> String {
        match &self.exception {
            Some(exception) if !exception.detail.is_empty() => exception.to_string(),
            _ => format!("task {} finished unsuccessfully", self.name),
        }
    }
}

/// Whether `candidate` denotes the operation identified by `target`.
///
/// Name, pool, namespace, image name and image spec must all be equal,
/// including fields that are empty on both sides.
pub fn matches(candidate: &Task, target: &OperationIdentity) -> bool {
    candidate.name == target.kind.task_name()
        && candidate.metadata.pool_name == target.pool_name
        && candidate.metadata.namespace == target.namespace
        && candidate.metadata.image_name == target.image_name
        && candidate.metadata.image_spec == target.image_spec
}

/// Snapshot of `GET /api/task`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskDirectory {
    #[serde(default)]
    pub executing_tasks: Vec<Task>,
    #[serde(default)]
    pub finished_tasks: Vec<Task>,
}

impl TaskDirectory {
    pub fn is_executing(&self, target: &OperationIdentity) -> bool {
        self.executing_tasks.iter().any(|task| matches(task, target))
    }

    pub fn find_finished(&self, target: &OperationIdentity) -> Option<&Task> {
        self.finished_tasks.iter().find(|task| matches(task, target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(name: &str, metadata: TaskMetadata) -> Task {
        Task {
            name: name.to_string(),
            metadata,
            ..Default::default()
        }
    }

    fn create_metadata(ns: Option<&str>) -> TaskMetadata {
        TaskMetadata {
            pool_name: "rbd".to_string(),
            namespace: ns.map(str::to_string),
            image_name: "vol1".to_string(),
            image_spec: String::new(),
        }
    }

    #[test]
    fn test_create_identity_matches_task_without_spec() {
        let target = OperationIdentity::for_create("rbd", None, "vol1");
        assert!(matches(&task("rbd/create", create_metadata(None)), &target));
        assert_eq!(task("rbd/create", create_metadata(None)).identity(), Some(target));
    }

    #[test]
    fn test_create_identity_rejects_task_with_spec() {
        let target = OperationIdentity::for_create("rbd", None, "vol1");
        let mut metadata = create_metadata(None);
        metadata.image_spec = "rbd/vol1".to_string();
        assert!(!matches(&task("rbd/create", metadata), &target));
    }

    #[test]
    fn test_every_field_must_agree() {
        let target = OperationIdentity::for_create("rbd", Some("ns"), "vol1");
        assert!(matches(&task("rbd/create", create_metadata(Some("ns"))), &target));
        assert!(!matches(&task("rbd/create", create_metadata(None)), &target));
        assert!(!matches(&task("rbd/delete", create_metadata(Some("ns"))), &target));

        let mut other_pool = create_metadata(Some("ns"));
        other_pool.pool_name = "ssd".to_string();
        assert!(!matches(&task("rbd/create", other_pool), &target));

        let mut other_image = create_metadata(Some("ns"));
        other_image.image_name = "vol2".to_string();
        assert!(!matches(&task("rbd/create", other_image), &target));
    }

    #[test]
    fn test_spec_keyed_identity() {
        let target = OperationIdentity::for_image_spec(OperationKind::Delete, "rbd/vol1");
        let metadata = TaskMetadata {
            image_spec: "rbd/vol1".to_string(),
            ..Default::default()
        };
        assert!(matches(&task("rbd/delete", metadata.clone()), &target));
        assert!(!matches(&task("rbd/edit", metadata), &target));
        assert_eq!(target.to_string(), "rbd/delete rbd/vol1");
    }

    #[test]
    fn test_empty_namespace_normalized_for_create() {
        let target = OperationIdentity::for_create("rbd", Some(""), "vol1");
        assert_eq!(target.namespace, None);
        assert_eq!(target.to_string(), "rbd/create rbd/vol1");
    }

    #[test]
    fn test_directory_decoding() {
        let json = r#"{
            "executing_tasks": [
                {"name": "rbd/create", "metadata": {"pool_name": "rbd", "namespace": null, "image_name": "vol1"},
                 "begin_time": "2021-05-01T08:00:00.000000Z", "progress": 40}
            ],
            "finished_tasks": [
                {"name": "rbd/delete", "metadata": {"image_spec": "rbd/old"},
                 "begin_time": "2021-05-01T07:59:00.000000Z", "end_time": "2021-05-01T07:59:02.500000Z",
                 "duration": 2.5, "progress": 100, "success": false, "ret_value": null,
                 "exception": {"detail": "[errno 16] image busy", "code": 16, "component": "rbd"}},
                {"name": "progress/foo", "metadata": {}, "success": true},
                {"name": "rbd/trash/purge",
                 "metadata": {"pool_name": null, "image_name": null, "image_spec": null},
                 "duration": null, "progress": null, "success": null,
                 "exception": {"detail": null, "code": null}}
            ]
        }"#;
        let directory: TaskDirectory = serde_json::from_str(json).unwrap();

        let creating = OperationIdentity::for_create("rbd", None, "vol1");
        assert!(directory.is_executing(&creating));
        assert!(directory.find_finished(&creating).is_none());

        let deleting = OperationIdentity::for_image_spec(OperationKind::Delete, "rbd/old");
        let finished = directory.find_finished(&deleting).unwrap();
        assert!(!finished.success);
        assert_eq!(finished.failure_detail(), "[errno 16] image busy (code 16)");
        assert!(finished.end_time.is_some());

        assert_eq!(directory.finished_tasks[1].identity(), None);

        let purge = &directory.finished_tasks[2];
        assert_eq!(purge.metadata, TaskMetadata::default());
        assert!(!purge.success);
        assert_eq!(purge.failure_detail(), "task rbd/trash/purge finished unsuccessfully");
    }
}
