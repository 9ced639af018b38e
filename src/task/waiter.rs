use std::sync::Arc;
use tokio::time::sleep;

use super::{OperationIdentity, Task, TaskSource};
use crate::config::PollConfig;
use crate::error::{CephError, CephResult};
use crate::logging::Logger;

/// Polls the task directory until an operation's task has finished.
///
/// Phase one waits, without bound, while the task is listed as executing.
/// Phase two searches the finished list for at most
/// `max_finished_attempts` snapshots, the first being the snapshot that
/// ended phase one. Running out of attempts is reported as
/// [`CephError::OperationIndeterminate`], never as a result.
#[derive(Clone)]
pub struct CompletionWaiter {
    source: Arc<dyn TaskSource>,
    poll: PollConfig,
    log: Logger,
}

impl CompletionWaiter {
    pub fn new(source: Arc<dyn TaskSource>, poll: PollConfig, log: Logger) -> Self {
        Self {
            source,
            poll,
            log: log.scoped("ceph_rest_sdk::task"),
        }
    }

    /// Wait for the finished task of `target`. The task's `success` flag
    /// carries the outcome.
    pub async fn wait_for(&self, target: &OperationIdentity) -> CephResult<Task> {
        let mut directory = loop {
            let directory = self.source.fetch_tasks().await?;
            if !directory.is_executing(target) {
                break directory;
            }
            self.log.debug(format_args!("still executing: {}", target));
            sleep(self.poll.interval()).await;
        };

        for attempt in 0..self.poll.max_finished_attempts {
            if attempt > 0 {
                sleep(self.poll.interval()).await;
                directory = self.source.fetch_tasks().await?;
            }

            if let Some(task) = directory.find_finished(target) {
                self.log.debug(format_args!(
                    "finished: {} (success: {})",
                    target, task.success
                ));
                return Ok(task.clone());
            }

            self.log
                .debug(format_args!("still not done: {} {}", target, attempt));
        }

        self.log.error(format_args!(
            "{} left the executing list but was not found among {} finished snapshots",
            target, self.poll.max_finished_attempts
        ));
        Err(CephError::OperationIndeterminate {
            operation: target.to_string(),
            polls: self.poll.max_finished_attempts,
        })
    }
}
