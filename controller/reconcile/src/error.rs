use sg_controller_core::{self as core, ApiError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] core::Error),

    #[error("failed to {op} security group {group}: {source}")]
    Api {
        op: &'static str,
        group: String,
        #[source]
        source: ApiError,
    },

    #[error("security group {group} has a permission that cannot be interpreted: {source}")]
    InvalidPermission {
        group: String,
        #[source]
        source: core::Error,
    },

    #[error("failed to persist status: {0}")]
    Persist(#[source] anyhow::Error),

    #[error("{}", display_all(.0))]
    Aggregate(Vec<Error>),
}

fn display_all(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// === impl Error ===

impl Error {
    pub(crate) fn api(op: &'static str, group: impl ToString) -> impl FnOnce(ApiError) -> Self {
        let group = group.to_string();
        move |source| Self::Api { op, group, source }
    }

    /// Whether the failure resolves itself once some external resource
    /// becomes available, so the caller should simply try again later.
    pub fn is_not_ready(&self) -> bool {
        match self {
            Self::Config(error) => error.is_not_ready(),
            Self::Aggregate(errors) => !errors.is_empty() && errors.iter().all(Self::is_not_ready),
            _ => false,
        }
    }
}
