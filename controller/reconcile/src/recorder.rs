use sg_controller_core::ClusterState;

/// Receives what a reconciliation wants to tell the outside world.
#[async_trait::async_trait]
pub trait Recorder: Send + Sync {
    /// Publishes an event. Failing to publish never affects the
    /// reconciliation.
    fn event(&self, event: Event);

    /// Persists the state before a long-running operation proceeds.
    async fn persist(&self, state: &ClusterState) -> anyhow::Result<()>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub reason: &'static str,
    pub message: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

// === impl Event ===

impl Event {
    pub fn normal(reason: &'static str, message: impl ToString) -> Self {
        Self {
            kind: EventKind::Normal,
            reason,
            message: message.to_string(),
        }
    }

    pub fn warning(reason: &'static str, message: impl ToString) -> Self {
        Self {
            kind: EventKind::Warning,
            reason,
            message: message.to_string(),
        }
    }
}

// === impl EventKind ===

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Warning => "Warning",
        }
    }
}
