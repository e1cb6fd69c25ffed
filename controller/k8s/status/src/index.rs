use crate::{resource_id::ResourceId, IndexMetrics};
use ahash::AHashMap as HashMap;
use kubert::lease::Claim;
use parking_lot::RwLock;
use sg_controller_k8s_api::{self as k8s, ResourceExt};
use std::{collections::hash_map::Entry, sync::Arc};
use tokio::{
    sync::{mpsc, watch},
    time,
};
use tracing::{debug, trace, warn};

pub type SharedIndex = Arc<RwLock<Index>>;

/// Tracks every `ClusterSecurityGroups` resource and queues the ones that
/// need to be reconciled.
pub struct Index {
    name: String,
    claims: watch::Receiver<Arc<Claim>>,
    updates: mpsc::Sender<Update>,
    resources: HashMap<ResourceId, Arc<k8s::ClusterSecurityGroups>>,
    metrics: IndexMetrics,
}

/// Asks the controller to reconcile a resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Update {
    pub id: ResourceId,
}

// === impl Index ===

impl Index {
    pub fn shared(
        name: impl ToString,
        claims: watch::Receiver<Arc<Claim>>,
        updates: mpsc::Sender<Update>,
        metrics: IndexMetrics,
    ) -> SharedIndex {
        Arc::new(RwLock::new(Self {
            name: name.to_string(),
            claims,
            updates,
            resources: HashMap::new(),
            metrics,
        }))
    }

    /// Re-queues every resource each `period`, so that drift in the cloud is
    /// corrected even when no resource changes.
    pub async fn run(index: SharedIndex, period: time::Duration) {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            index.read().resync();
        }
    }

    pub fn get(&self, id: &ResourceId) -> Option<Arc<k8s::ClusterSecurityGroups>> {
        self.resources.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub(crate) fn resync(&self) {
        if !self.is_leader() {
            trace!("Not the leader; skipping resync");
            return;
        }
        debug!(resources = self.resources.len(), "Resyncing");
        for id in self.resources.keys() {
            self.enqueue(id.clone());
        }
    }

    fn is_leader(&self) -> bool {
        self.claims.borrow().is_current_for(&self.name)
    }

    fn enqueue(&self, id: ResourceId) {
        if !self.is_leader() {
            return;
        }
        if let Err(error) = self.updates.try_send(Update { id }) {
            warn!(%error, "Failed to queue reconciliation");
        }
    }
}

/// Whether a change to a resource calls for a reconciliation.
///
/// Status-only changes, which this controller makes itself, do not.
fn needs_reconcile(previous: &k8s::ClusterSecurityGroups, current: &k8s::ClusterSecurityGroups) -> bool {
    previous.spec != current.spec
        || previous.metadata.deletion_timestamp != current.metadata.deletion_timestamp
}

impl kubert::index::IndexNamespacedResource<k8s::ClusterSecurityGroups> for Index {
    fn apply(&mut self, resource: k8s::ClusterSecurityGroups) {
        let Some(namespace) = resource.namespace() else {
            warn!(name = %resource.name_any(), "Ignoring ClusterSecurityGroups without a namespace");
            return;
        };
        let id = ResourceId::new(namespace, resource.name_unchecked());

        let resource = Arc::new(resource);
        let changed = match self.resources.entry(id.clone()) {
            Entry::Vacant(entry) => {
                entry.insert(resource);
                true
            }
            Entry::Occupied(mut entry) => {
                let changed = needs_reconcile(entry.get(), &resource);
                entry.insert(resource);
                changed
            }
        };
        self.metrics.set_size(self.resources.len());

        if changed {
            trace!(%id, "Queueing reconciliation");
            self.enqueue(id);
        }
    }

    fn delete(&mut self, namespace: String, name: String) {
        let id = ResourceId::new(namespace, name);
        self.resources.remove(&id);
        self.metrics.set_size(self.resources.len());
    }

    // Since apply only reindexes a single resource at a time, there's no need
    // to handle resets specially.
}
