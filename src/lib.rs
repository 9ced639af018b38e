//! Client for the Ceph manager (dashboard) REST API.
//!
//! RBD mutations are accepted by the manager and executed asynchronously as
//! tasks. This crate issues the mutation, finds the resulting task in
//! `GET /api/task` by its metadata, waits for it to finish, and re-issues the
//! mutation when the task failed, within a bounded retry budget.

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod rbd;
pub mod session;
pub mod task;
pub mod transport;
pub mod util;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use client::CephClient;
pub use config::{ClientConfig, PollConfig, RetryConfig, ServerConfig};
pub use error::{CephError, CephResult};
pub use logging::{BufferedLog, Logger};
pub use rbd::{
    RbdClient, RbdCreate, RbdImage, RbdPoolListing, RbdUpdate, VolumeIdentity, VolumeUpdate,
};
pub use session::Auth;
pub use task::{
    matches, CompletionWaiter, Exception, OperationIdentity, OperationKind, Task, TaskDirectory,
    TaskMetadata, TaskReader, TaskSource,
};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport};
pub use util::path_join;
