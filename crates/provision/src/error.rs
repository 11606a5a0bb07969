use dwh_core::ConfigError;

/// Errors surfaced by the identity and warehouse APIs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CloudApiError {
    /// A resource with that name already exists.
    #[error("{resource} '{name}' already exists")]
    AlreadyExists { resource: &'static str, name: String },

    /// The resource does not exist (or vanished between steps).
    #[error("{resource} '{name}' not found")]
    NotFound { resource: &'static str, name: String },

    /// Cluster shape or credentials rejected, locally or by the service.
    #[error("invalid cluster spec: {0}")]
    InvalidSpec(String),

    /// Any other service error, carrying the service's message.
    #[error("{operation} failed: {message}")]
    Service { operation: &'static str, message: String },

    /// The service refused the request in the resource's current state.
    #[error("{resource} '{name}' is in an invalid state: {message}")]
    InvalidState {
        resource: &'static str,
        name: String,
        message: String,
    },

    /// The cluster entered a state it cannot leave on its own.
    #[error("cluster '{identifier}' entered status '{status}' while waiting")]
    WaitFailed { identifier: String, status: String },

    #[error("cluster '{identifier}' still pending after {waited_secs}s")]
    WaitTimeout { identifier: String, waited_secs: u64 },

    /// A descriptor was missing a field the workflow needs.
    #[error("cluster '{identifier}' descriptor has no {field}")]
    IncompleteDescriptor { identifier: String, field: &'static str },
}

impl CloudApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Top-level error of the provisioning workflow.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Cloud(#[from] CloudApiError),
}
