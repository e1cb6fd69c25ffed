use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

#[derive(Clone, Debug)]
pub struct ControllerMetrics {
    reconciles: Family<ResultLabels, Counter>,
    deletes: Family<ResultLabels, Counter>,
    status_patches: Family<ResultLabels, Counter>,
    pub(crate) events: EventMetrics,
}

#[derive(Clone, Debug)]
pub(crate) struct EventMetrics(Family<EventLabels, Counter>);

#[derive(Clone, Debug)]
pub struct IndexMetrics {
    size: Gauge,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ResultLabels {
    result: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct EventLabels {
    kind: &'static str,
    reason: &'static str,
}

/// How a reconciliation or deletion ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    Ok,
    NotReady,
    Failed,
    Timeout,
}

// === impl ControllerMetrics ===

impl ControllerMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let reconciles = Family::default();
        reg.register(
            "reconciles",
            "Count of security group reconciliations by result",
            reconciles.clone(),
        );

        let deletes = Family::default();
        reg.register(
            "deletes",
            "Count of security group deletions by result",
            deletes.clone(),
        );

        let status_patches = Family::default();
        reg.register(
            "status_patches",
            "Count of status patches by result",
            status_patches.clone(),
        );

        let events = Family::default();
        reg.register(
            "events",
            "Count of reconciliation events by kind and reason",
            events.clone(),
        );

        Self {
            reconciles,
            deletes,
            status_patches,
            events: EventMetrics(events),
        }
    }

    pub(crate) fn reconciled(&self, outcome: Outcome) {
        self.reconciles
            .get_or_create(&ResultLabels::from(outcome))
            .inc();
    }

    pub(crate) fn deleted(&self, outcome: Outcome) {
        self.deletes.get_or_create(&ResultLabels::from(outcome)).inc();
    }

    pub(crate) fn patched(&self, ok: bool) {
        let result = if ok { "ok" } else { "error" };
        self.status_patches
            .get_or_create(&ResultLabels { result })
            .inc();
    }
}

// === impl EventMetrics ===

impl EventMetrics {
    pub(crate) fn inc(&self, kind: &'static str, reason: &'static str) {
        self.0.get_or_create(&EventLabels { kind, reason }).inc();
    }
}

// === impl IndexMetrics ===

impl IndexMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let size = Gauge::default();
        reg.register(
            "index_size",
            "Gauge of the number of ClusterSecurityGroups in the index",
            size.clone(),
        );
        Self { size }
    }

    pub(crate) fn set_size(&self, size: usize) {
        self.size.set(size as i64);
    }
}

// === impl ResultLabels ===

impl From<Outcome> for ResultLabels {
    fn from(outcome: Outcome) -> Self {
        let result = match outcome {
            Outcome::Ok => "ok",
            Outcome::NotReady => "not_ready",
            Outcome::Failed => "error",
            Outcome::Timeout => "timeout",
        };
        Self { result }
    }
}
