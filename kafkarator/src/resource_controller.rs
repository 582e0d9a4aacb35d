use crate::{
    MANAGER,
    aiven::Interfaces,
    errors::ControllerError,
    metrics::metrics,
    resource_modifications::ResourceModifications,
    synchronizer::{SyncResource, Synchronizer},
    utils::{add_finalizer, check_for_possible_credentials, has_finalizer, remove_finalizer},
};

use futures::StreamExt;
use kafkarator_apis::{
    Condition, FINALIZER, SynchronizationState, condition_types::*, now,
};
use kube::{Api, Client};
use kube_runtime::{
    controller::{Action, Controller},
    events::{Event, EventType, Recorder, Reporter},
    watcher::Config,
};
use opentelemetry::KeyValue;
use std::{future::Future, sync::Arc, time::Instant};
use tokio::time::{Duration, sleep};

const INVALID_POOL: &'static str = "InvalidPool";
const FAILED_PREPARE: &'static str = "FailedPrepare";
const INTERNAL_ERROR: &'static str = "InternalError";
const SYNCHRONIZATION_ERROR: &'static str = "SynchronizationError";
const NO_ERROR: &'static str = "NoError";

/// Result of processing one resource.
#[derive(Debug, PartialEq)]
pub(crate) enum Outcome {
    /// Already synchronized with the current spec.
    Skipped,
    RolledOut,
    /// Torn down on Aiven, the finalizer has been removed.
    Finalized(&'static str),
    /// Being deleted, nothing left for us to clean up.
    Gone,
    Failed {
        retry: bool,
        reason: &'static str,
        message: String,
    },
}

impl Outcome {
    fn action(&self, requeue_interval: Duration) -> Action {
        match self {
            Outcome::Failed { retry: true, .. } => Action::requeue(requeue_interval),
            _ => Action::await_change(),
        }
    }
}

/// Drives a single resource through validation, synchronization or teardown.
///
/// Only touches the in-memory object, persisting is left to the caller.
#[derive(Clone)]
pub(crate) struct Processor {
    pub aiven: Interfaces,
    /// Pools which may be used in this cluster.
    pub projects: Vec<String>,
    pub dry_run: bool,
}

impl Processor {
    fn pool_allowed(&self, pool: &str) -> bool {
        self.projects.iter().any(|p| p == pool)
    }

    /// Tears the resource down on Aiven. Failures are always retried, the
    /// object cannot change anymore once it is being deleted.
    async fn finalize<K: SyncResource>(&self, resource: &mut K) -> Outcome {
        if !has_finalizer(resource, FINALIZER) {
            return Outcome::Gone;
        }
        let pool = resource.pool().to_string();
        let result = match Synchronizer::new(&self.aiven, &pool, self.dry_run).await {
            Ok(sync) => resource.delete(&sync).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(message) => {
                info!("{} {}: {}", K::KIND, resource.id(), message);
                resource.sync_status_mut().message = message.to_string();
                remove_finalizer(resource, FINALIZER);
                Outcome::Finalized(message)
            }
            Err(e) => {
                let reason = failure_reason(&e);
                fail_with_retry(resource, e, reason, true)
            }
        }
    }

    pub(crate) async fn process<K: SyncResource>(&self, resource: &mut K) -> Outcome {
        resource.set_qualified_name();
        if resource.meta().deletion_timestamp.is_some() {
            return self.finalize(resource).await;
        }

        let hash = match resource.spec_hash() {
            Ok(hash) => hash,
            Err(e) => return fail(resource, e, FAILED_PREPARE),
        };
        let pool = resource.pool().to_string();
        if !self.pool_allowed(&pool) {
            return fail(resource, ControllerError::InvalidPool(pool), INVALID_POOL);
        }

        if !resource
            .sync_status()
            .map_or(true, |s| s.needs_synchronization(&hash))
        {
            debug!("{} {} is already synchronized", K::KIND, resource.id());
            return Outcome::Skipped;
        }

        let result = match Synchronizer::new(&self.aiven, &pool, self.dry_run).await {
            Ok(sync) => resource.synchronize(&sync).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            let reason = failure_reason(&e);
            return fail(resource, e, reason);
        }

        let status = resource.sync_status_mut();
        status.synchronization_state = Some(SynchronizationState::RolloutComplete);
        status.synchronization_hash = hash;
        status.synchronization_time = now();
        status.message = K::SUCCESS_MESSAGE.to_string();
        status.errors.clear();
        status.latest_aiven_sync_failure.clear();
        for tpe in [AIVEN_FAILURE, KAFKARATOR_FAILURE] {
            status.update_condition(Condition::new(tpe, Some(false), NO_ERROR, String::new()));
        }
        add_finalizer(resource, FINALIZER);
        info!("{} {} synchronized to pool {}", K::KIND, resource.id(), pool);
        Outcome::RolledOut
    }
}

/// Aiven failures, including resolving the pool's service, are synchronization errors.
fn failure_reason(error: &ControllerError) -> &'static str {
    match error {
        ControllerError::Internal(_) => INTERNAL_ERROR,
        _ => SYNCHRONIZATION_ERROR,
    }
}

/// Records a failed reconciliation in the status of the resource.
fn fail<K: SyncResource>(resource: &mut K, error: ControllerError, reason: &'static str) -> Outcome {
    let retry = error.is_temporary();
    fail_with_retry(resource, error, reason, retry)
}

fn fail_with_retry<K: SyncResource>(
    resource: &mut K,
    error: ControllerError,
    reason: &'static str,
    retry: bool,
) -> Outcome {
    let message = check_for_possible_credentials(error.user_message());
    let failed = error.condition_type();
    let state = match error {
        ControllerError::InvalidPool(_) | ControllerError::Config(_) | ControllerError::Hash(_) => {
            SynchronizationState::FailedPrepare
        }
        _ => SynchronizationState::FailedSynchronization,
    };
    error!(
        "{} {}: {}: {} - {}",
        K::KIND,
        resource.id(),
        failed,
        reason,
        message
    );

    let status = resource.sync_status_mut();
    if error.as_provider_error().is_some() && !retry {
        status.latest_aiven_sync_failure = now();
    }
    status.synchronization_state = Some(state);
    status.message = message.clone();
    status.errors = vec![message.clone()];
    for tpe in [AIVEN_FAILURE, KAFKARATOR_FAILURE] {
        let condition = if tpe == failed {
            Condition::new(tpe, Some(true), reason, message.clone())
        } else {
            Condition::new(tpe, Some(false), NO_ERROR, String::new())
        };
        status.update_condition(condition);
    }
    Outcome::Failed {
        retry,
        reason,
        message,
    }
}

/// Reconciles one kind of [`SyncResource`] objects against Aiven.
pub(crate) struct ResourceController {
    client: Client,
    processor: Processor,
    recorder: Recorder,
    requeue_interval: Duration,
}

impl ResourceController {
    pub fn new(client: Client, processor: Processor, requeue_interval: Duration) -> Self {
        let reporter = Reporter {
            controller: MANAGER.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client.clone(), reporter),
            client,
            processor,
            requeue_interval,
        }
    }

    async fn publish<K: SyncResource>(&self, resource: &K, outcome: &Outcome) {
        let (type_, reason, note, action) = match outcome {
            Outcome::Skipped | Outcome::Gone => return,
            Outcome::RolledOut => (
                EventType::Normal,
                "RolloutComplete",
                K::SUCCESS_MESSAGE.to_string(),
                "Synchronize",
            ),
            Outcome::Finalized(message) => {
                (EventType::Normal, "Deleted", message.to_string(), "Delete")
            }
            Outcome::Failed {
                reason, message, ..
            } => (EventType::Warning, *reason, message.clone(), "Synchronize"),
        };
        let event = Event {
            type_,
            reason: reason.to_string(),
            note: Some(note),
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, &resource.object_ref(&())).await {
            warn!("failed to publish event for {} {}: {}", K::KIND, resource.id(), e);
        }
    }

    /// Controller triggers this whenever a watched resource changed
    async fn reconcile<K: SyncResource>(
        object: Arc<K>,
        ctx: Arc<Self>,
    ) -> Result<Action, ControllerError> {
        let me = ctx.as_ref();
        let start = Instant::now();
        let mut resource = ResourceModifications::new(object.as_ref().clone());
        let outcome = me.processor.process(&mut resource.modified).await;

        let write = async {
            resource.patch_finalizers(me.client.clone()).await?;
            // Once released, the object may be gone and its status cannot be written anymore.
            if !(resource.is_deleted() && !has_finalizer(&resource.modified, FINALIZER)) {
                resource.patch_status(me.client.clone()).await?;
            }
            Ok::<_, ControllerError>(())
        };
        tokio::time::timeout(me.requeue_interval, write)
            .await
            .map_err(|_| ControllerError::StateWriteTimeout(me.requeue_interval))??;
        me.publish(&resource.modified, &outcome).await;

        let kind = [KeyValue::new("kind", K::KIND)];
        if outcome != Outcome::Skipped {
            let state = resource
                .sync_status()
                .and_then(|s| s.synchronization_state)
                .map_or("", |s| s.as_str());
            K::processed_counter(metrics()).add(
                1,
                &[
                    KeyValue::new("synchronization_state", state),
                    KeyValue::new("pool", resource.pool().to_string()),
                ],
            );
        }
        metrics().reconcile_count.add(1, &kind);
        metrics()
            .reconcile_duration
            .record(start.elapsed().as_millis() as u64, &kind);
        Ok(outcome.action(me.requeue_interval))
    }

    /// The controller triggers this on reconcile errors
    fn error_policy<K: SyncResource>(
        object: Arc<K>,
        error: &ControllerError,
        ctx: Arc<Self>,
    ) -> Action {
        if error.is_temporary() {
            debug!("retrying {} {}: {}", K::KIND, object.id(), error);
            Action::requeue(ctx.requeue_interval)
        } else {
            Action::await_change()
        }
    }

    pub fn start<K: SyncResource>(self: Arc<Self>) -> impl Future<Output = ()> {
        let api = Api::<K>::all(self.client.clone());
        Controller::new(api, Config::default())
            .run(Self::reconcile::<K>, Self::error_policy::<K>, self)
            .for_each(|res| async move {
                let kind = [KeyValue::new("kind", K::KIND)];
                match res {
                    Ok(o) => {
                        debug!("reconciled {:?}", o);
                    }
                    Err(a @ kube_runtime::controller::Error::QueueError { .. }) => {
                        debug!("reconcile of {} failed: {:?}", K::KIND, a);
                        metrics().reconcile_errors.add(1, &kind);
                        // Slow down on errors caused by missing CRDs or permissions.
                        sleep(Duration::from_secs(30)).await;
                    }
                    Err(a @ kube_runtime::controller::Error::ObjectNotFound { .. }) => {
                        debug!("reconcile of {} failed: {:?}", K::KIND, a);
                    }
                    Err(e) => {
                        warn!("reconcile of {} failed: {:?}", K::KIND, e);
                        metrics().reconcile_errors.add(1, &kind);
                    }
                }
            })
    }
}
