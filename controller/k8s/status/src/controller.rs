use crate::{
    convert,
    index::{SharedIndex, Update},
    metrics::{ControllerMetrics, Outcome},
    recorder::{self, KubeRecorder},
    resource_id::ResourceId,
};
use kubert::lease::Claim;
use sg_controller_core::{ClusterState, ConditionReason, SecurityGroupApi};
use sg_controller_k8s_api::{self as k8s, Api, Patch, PatchParams};
use sg_controller_reconcile::Reconciler;
use std::sync::Arc;
use tokio::{
    sync::{mpsc, watch},
    time,
};
use tracing::{debug, info, info_span, warn, Instrument};

/// Blocks deletion of a resource until its groups are deleted.
pub const FINALIZER: &str = "sgcontroller.io/security-groups";

/// Reconciles queued resources one at a time.
pub struct Controller<A> {
    name: String,
    claims: watch::Receiver<Arc<Claim>>,
    client: k8s::Client,
    index: SharedIndex,
    reconciler: Reconciler<A>,
    updates: mpsc::Receiver<Update>,
    timeout: time::Duration,
    metrics: ControllerMetrics,
}

// === impl Controller ===

impl<A: SecurityGroupApi> Controller<A> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl ToString,
        claims: watch::Receiver<Arc<Claim>>,
        client: k8s::Client,
        index: SharedIndex,
        reconciler: Reconciler<A>,
        updates: mpsc::Receiver<Update>,
        timeout: time::Duration,
        metrics: ControllerMetrics,
    ) -> Self {
        Self {
            name: name.to_string(),
            claims,
            client,
            index,
            reconciler,
            updates,
            timeout,
            metrics,
        }
    }

    pub async fn run(mut self) {
        while let Some(Update { id }) = self.updates.recv().await {
            // The lease may have been lost since the update was queued.
            if !self.claims.borrow().is_current_for(&self.name) {
                debug!(%id, "Not the leader; dropping update");
                continue;
            }

            let Some(resource) = self.index.read().get(&id) else {
                debug!(%id, "Resource no longer exists");
                continue;
            };

            let span = info_span!("cluster", namespace = %id.namespace, name = %id.name);
            self.process(&id, &resource).instrument(span).await;
        }
    }

    async fn process(&self, id: &ResourceId, resource: &k8s::ClusterSecurityGroups) {
        let api = Api::<k8s::ClusterSecurityGroups>::namespaced(self.client.clone(), &id.namespace);
        let deleting = resource.metadata.deletion_timestamp.is_some();
        let finalized = has_finalizer(resource);

        if deleting && !finalized {
            debug!("Deleted without a finalizer; nothing to clean up");
            return;
        }
        if !deleting && !finalized {
            if let Err(error) = patch_finalizers(&api, id, with_finalizer(resource)).await {
                warn!(%error, "Failed to add finalizer");
                return;
            }
        }

        let recorder = KubeRecorder::new(&api, id, resource, &self.metrics.events);
        let mut state = convert::cluster_state(resource.status.as_ref());
        let outcome = match convert::input_for(&resource.spec, deleting) {
            Ok(input) => {
                let run = async {
                    if deleting {
                        self.reconciler.delete(&input, &mut state, &recorder).await
                    } else {
                        self.reconciler.reconcile(&input, &mut state, &recorder).await
                    }
                };
                let result = time::timeout(self.timeout, run).await;
                match result {
                    Ok(Ok(())) => Outcome::Ok,
                    Ok(Err(error)) if error.is_not_ready() => {
                        info!(%error, "Security groups are not ready");
                        Outcome::NotReady
                    }
                    Ok(Err(error)) => {
                        warn!(%error, "Failed to reconcile security groups");
                        Outcome::Failed
                    }
                    Err(_) => {
                        warn!(timeout = ?self.timeout, "Reconciliation timed out");
                        state.mark_not_ready(
                            failed_reason(deleting),
                            Some(format!("timed out after {:?}", self.timeout)),
                        );
                        Outcome::Timeout
                    }
                }
            }
            Err(error) => {
                info!(%error, "Invalid ClusterSecurityGroups");
                state.mark_not_ready(failed_reason(deleting), Some(error.to_string()));
                Outcome::NotReady
            }
        };

        if deleting {
            self.metrics.deleted(outcome);
        } else {
            self.metrics.reconciled(outcome);
        }
        self.write_status(&api, id, resource, &state).await;

        if deleting && outcome == Outcome::Ok {
            match patch_finalizers(&api, id, without_finalizer(resource)).await {
                Ok(()) => info!("Deleted security groups"),
                Err(error) => warn!(%error, "Failed to remove finalizer"),
            }
        }
    }

    async fn write_status(
        &self,
        api: &Api<k8s::ClusterSecurityGroups>,
        id: &ResourceId,
        resource: &k8s::ClusterSecurityGroups,
        state: &ClusterState,
    ) {
        match recorder::patch_status(api, id, resource, state).await {
            Ok(true) => {
                debug!("Patched status");
                self.metrics.patched(true);
            }
            Ok(false) => debug!("Status is unchanged"),
            Err(error) => {
                warn!(%error, "Failed to patch status");
                self.metrics.patched(false);
            }
        }
    }
}

fn failed_reason(deleting: bool) -> ConditionReason {
    if deleting {
        ConditionReason::DeletionFailed
    } else {
        ConditionReason::ReconciliationFailed
    }
}

pub(crate) fn has_finalizer(resource: &k8s::ClusterSecurityGroups) -> bool {
    resource
        .metadata
        .finalizers
        .iter()
        .flatten()
        .any(|f| f == FINALIZER)
}

pub(crate) fn with_finalizer(resource: &k8s::ClusterSecurityGroups) -> Vec<String> {
    let mut finalizers = resource.metadata.finalizers.clone().unwrap_or_default();
    if !finalizers.iter().any(|f| f == FINALIZER) {
        finalizers.push(FINALIZER.to_string());
    }
    finalizers
}

pub(crate) fn without_finalizer(resource: &k8s::ClusterSecurityGroups) -> Vec<String> {
    resource
        .metadata
        .finalizers
        .iter()
        .flatten()
        .filter(|f| *f != FINALIZER)
        .cloned()
        .collect()
}

async fn patch_finalizers(
    api: &Api<k8s::ClusterSecurityGroups>,
    id: &ResourceId,
    finalizers: Vec<String>,
) -> Result<(), k8s::Error> {
    let patch = serde_json::json!({ "metadata": { "finalizers": finalizers } });
    api.patch(
        &id.name,
        &PatchParams::apply(recorder::FIELD_MANAGER),
        &Patch::Merge(&patch),
    )
    .await?;
    Ok(())
}
