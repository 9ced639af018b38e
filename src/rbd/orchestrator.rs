use std::sync::Arc;

use super::{
    RbdCreate, RbdImage, RbdPoolListing, RbdUpdate, VolumeIdentity, VolumeUpdate,
    RBD_IMAGE_ALREADY_EXISTS,
};
use crate::error::{CephError, CephResult};
use crate::logging::Logger;
use crate::task::{CompletionWaiter, OperationIdentity, OperationKind};
use crate::transport::{ApiRequest, Transport};

/// Statuses after which the create task is tracked.
const CREATE_TRACKED: &[u16] = &[201, 202];
/// The manager may spawn an edit task before reporting a conflict, so 400 is tracked too.
const UPDATE_TRACKED: &[u16] = &[200, 202, 400];
const DELETE_TRACKED: &[u16] = &[202, 204, 400];

const STATUS_CREATED: u16 = 201;
const STATUS_OK: u16 = 200;
const STATUS_NO_CONTENT: u16 = 204;

/// Everything needed to issue one kind of mutation repeatedly.
struct MutationPlan {
    kind: OperationKind,
    request: ApiRequest,
    identity: OperationIdentity,
    tracked: &'static [u16],
    canonical_status: u16,
    detect_conflict: bool,
    context: String,
}

/// Diagnostics of one failed attempt.
#[derive(Debug)]
struct Attempt {
    number: u32,
    status: u16,
    failure: String,
}

/// Issues RBD mutations and reconciles them with their server-side tasks.
///
/// A finished task with `success == false` is treated as transient: the
/// whole mutation, HTTP request included, is issued again until the retry
/// budget of `max_iterations` repetitions is spent.
#[derive(Clone)]
pub struct RbdClient {
    transport: Arc<dyn Transport>,
    waiter: CompletionWaiter,
    max_iterations: u32,
    log: Logger,
}

impl RbdClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        waiter: CompletionWaiter,
        max_iterations: u32,
        log: Logger,
    ) -> Self {
        Self {
            transport,
            waiter,
            max_iterations,
            log: log.scoped("ceph_rest_sdk::rbd"),
        }
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Create an image and wait for its task. Returns 201 once created.
    pub async fn create_volume(&self, identity: &VolumeIdentity, size: u64) -> CephResult<u16> {
        self.create_image(&RbdCreate::new(identity, size)).await
    }

    pub async fn create_image(&self, create: &RbdCreate) -> CephResult<u16> {
        require("poolName", &create.pool_name)?;
        require("imageName", &create.name)?;

        self.log.debug(format_args!(
            "creating rbd image {} of {} bytes",
            crate::util::path_join(&create.pool_name, create.namespace.as_deref(), &create.name),
            create.size
        ));

        let plan = MutationPlan {
            kind: OperationKind::Create,
            request: ApiRequest::post(&["block", "image"], serde_json::to_value(create)?)
                .retryable(),
            identity: OperationIdentity::for_create(
                &create.pool_name,
                create.namespace.as_deref(),
                &create.name,
            ),
            tracked: CREATE_TRACKED,
            canonical_status: STATUS_CREATED,
            detect_conflict: true,
            context: format!(
                "could not create image {} on pool {}",
                create.name, create.pool_name
            ),
        };
        self.reconcile(plan).await
    }

    /// Rename and/or resize an image. Returns 200 once applied.
    pub async fn update_volume(
        &self,
        identity: &VolumeIdentity,
        update: &VolumeUpdate,
    ) -> CephResult<u16> {
        self.update_image(
            &identity.pool_name,
            identity.namespace.as_deref(),
            &identity.image_name,
            &RbdUpdate::new(update),
        )
        .await
    }

    pub async fn update_image(
        &self,
        pool_name: &str,
        namespace: Option<&str>,
        image_name: &str,
        update: &RbdUpdate,
    ) -> CephResult<u16> {
        require("poolName", pool_name)?;
        require("imageName", image_name)?;
        require("newName", &update.name)?;

        let image_spec = crate::util::path_join(pool_name, namespace, image_name);
        let plan = MutationPlan {
            kind: OperationKind::Edit,
            request: ApiRequest::put(
                &["block", "image", image_spec.as_str()],
                serde_json::to_value(update)?,
            )
            .retryable(),
            identity: OperationIdentity::for_image_spec(OperationKind::Edit, &image_spec),
            tracked: UPDATE_TRACKED,
            canonical_status: STATUS_OK,
            detect_conflict: true,
            context: format!("could not update image {}", image_spec),
        };
        self.reconcile(plan).await
    }

    /// Delete an image. Returns 204 once removed.
    pub async fn delete_volume(&self, identity: &VolumeIdentity) -> CephResult<u16> {
        self.delete_image(
            &identity.pool_name,
            identity.namespace.as_deref(),
            &identity.image_name,
        )
        .await
    }

    pub async fn delete_image(
        &self,
        pool_name: &str,
        namespace: Option<&str>,
        image_name: &str,
    ) -> CephResult<u16> {
        require("poolName", pool_name)?;
        require("imageName", image_name)?;

        let image_spec = crate::util::path_join(pool_name, namespace, image_name);
        let plan = MutationPlan {
            kind: OperationKind::Delete,
            request: ApiRequest::delete(&["block", "image", image_spec.as_str()]).retryable(),
            identity: OperationIdentity::for_image_spec(OperationKind::Delete, &image_spec),
            tracked: DELETE_TRACKED,
            canonical_status: STATUS_NO_CONTENT,
            detect_conflict: false,
            context: format!("could not delete image {}", image_spec),
        };
        self.reconcile(plan).await
    }

    /// Read an image descriptor. Reads are immediately consistent, no task is involved.
    pub async fn get_volume(&self, identity: &VolumeIdentity) -> CephResult<RbdImage> {
        require("poolName", &identity.pool_name)?;
        require("imageName", &identity.image_name)?;
        self.get_image(&identity.image_spec()).await
    }

    pub async fn get_image(&self, image_spec: &str) -> CephResult<RbdImage> {
        require("imageSpec", image_spec)?;

        let response = self
            .transport
            .execute(ApiRequest::get(&["block", "image", image_spec]))
            .await?;

        match response.status {
            404 => Err(CephError::NotFound {
                image_spec: image_spec.to_string(),
            }),
            _ if response.is_success() => response.json(),
            _ => Err(CephError::from_response(
                format!("could not get image {}", image_spec),
                &response,
            )),
        }
    }

    /// List images, optionally restricted to one pool.
    pub async fn list_images(&self, pool_name: Option<&str>) -> CephResult<Vec<RbdPoolListing>> {
        let mut request = ApiRequest::get(&["block", "image"]);
        if let Some(pool) = pool_name.filter(|p| !p.is_empty()) {
            request = request.with_query("pool_name", pool);
        }

        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            return Err(CephError::from_response("could not list images", &response));
        }
        response.json()
    }

    async fn reconcile(&self, plan: MutationPlan) -> CephResult<u16> {
        let mut history: Vec<Attempt> = Vec::new();

        for number in 0..=self.max_iterations {
            let response = self.transport.execute(plan.request.clone()).await?;
            let status = response.status;

            if status == 400 && plan.detect_conflict {
                if let Some(exception) = response.exception() {
                    self.log.debug(format_args!(
                        "err {} ({})",
                        exception.code.as_deref().unwrap_or("-"),
                        exception.detail
                    ));
                    if exception.has_code(RBD_IMAGE_ALREADY_EXISTS) {
                        return Err(CephError::AlreadyExists {
                            operation: plan.kind,
                            detail: exception.detail,
                        });
                    }
                }
            }

            if !plan.tracked.contains(&status) {
                if response.is_success() {
                    return Ok(status);
                }
                return Err(CephError::from_response(plan.context.clone(), &response));
            }

            let task = self.waiter.wait_for(&plan.identity).await?;
            if task.success {
                self.log.info(format_args!(
                    "{} succeeded after {} attempt(s)",
                    plan.identity,
                    number + 1
                ));
                return Ok(plan.canonical_status);
            }

            let failure = task.failure_detail();
            self.log.debug(format_args!(
                "{} failed on attempt {}: {}, issuing again",
                plan.identity,
                number + 1,
                failure
            ));
            history.push(Attempt {
                number: number + 1,
                status,
                failure,
            });
        }

        for attempt in &history {
            self.log.error(format_args!(
                "{} attempt {} (HTTP {}): {}",
                plan.identity, attempt.number, attempt.status, attempt.failure
            ));
        }
        Err(CephError::RetryBudgetExceeded {
            operation: plan.identity.to_string(),
            max_iterations: self.max_iterations,
            attempts: history.len() as u32,
            last_failure: history.pop().map(|attempt| attempt.failure),
        })
    }
}

fn require(field: &'static str, value: &str) -> CephResult<()> {
    if value.is_empty() {
        return Err(CephError::Validation { field });
    }
    Ok(())
}

impl std::fmt::Debug for RbdClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RbdClient")
            .field("max_iterations", &self.max_iterations)
            .finish_non_exhaustive()
    }
}
