use crate::{convert, metrics::EventMetrics, resource_id::ResourceId};
use sg_controller_core::ClusterState;
use sg_controller_k8s_api::{self as k8s, Api, Patch, PatchParams};
use sg_controller_reconcile::{Event, EventKind, Recorder};
use tracing::{info, warn};

pub(crate) const FIELD_MANAGER: &str = "sgcontroller.io";

/// Logs and counts a resource's events, and persists its status.
pub(crate) struct KubeRecorder<'a> {
    api: &'a Api<k8s::ClusterSecurityGroups>,
    id: &'a ResourceId,
    resource: &'a k8s::ClusterSecurityGroups,
    events: &'a EventMetrics,
}

impl<'a> KubeRecorder<'a> {
    pub(crate) fn new(
        api: &'a Api<k8s::ClusterSecurityGroups>,
        id: &'a ResourceId,
        resource: &'a k8s::ClusterSecurityGroups,
        events: &'a EventMetrics,
    ) -> Self {
        Self {
            api,
            id,
            resource,
            events,
        }
    }
}

#[async_trait::async_trait]
impl<'a> Recorder for KubeRecorder<'a> {
    fn event(&self, event: Event) {
        let Event {
            kind,
            reason,
            message,
        } = event;
        match kind {
            EventKind::Normal => info!(%reason, %message, "Recorded event"),
            EventKind::Warning => warn!(%reason, %message, "Recorded event"),
        }
        self.events.inc(kind.as_str(), reason);
    }

    async fn persist(&self, state: &ClusterState) -> anyhow::Result<()> {
        patch_status(self.api, self.id, self.resource, state).await?;
        Ok(())
    }
}

/// Writes `state` to the resource's status.
///
/// Returns `false` without patching when the status would not change.
pub(crate) async fn patch_status(
    api: &Api<k8s::ClusterSecurityGroups>,
    id: &ResourceId,
    resource: &k8s::ClusterSecurityGroups,
    state: &ClusterState,
) -> Result<bool, k8s::Error> {
    let previous = resource.status.as_ref();
    let status = convert::status(
        state,
        previous,
        resource.metadata.generation,
        k8s::Time(chrono::Utc::now()),
    );
    if previous == Some(&status) {
        return Ok(false);
    }

    let patch = convert::status_patch(previous, &status);
    api.patch_status(&id.name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await?;
    Ok(true)
}
