use kafkarator_apis::{HashError, condition_types};

use crate::aiven::AivenError;

/// Extension methods for Kubernetes API errors.
pub(crate) trait ExtKubeApiError {
    fn is_not_found(&self) -> bool;
    fn is_conflict(&self) -> bool;
}

impl ExtKubeApiError for kube::Error {
    fn is_not_found(&self) -> bool {
        match self {
            kube::Error::Api(e) if e.code == 404 || e.code == 410 => true,
            _ => false,
        }
    }

    fn is_conflict(&self) -> bool {
        match self {
            kube::Error::Api(e) if e.code == 409 => true,
            _ => false,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub(crate) enum ControllerError {
    /// The pool is not in the allowlist of this cluster.
    #[error("pool '{0}' cannot be used in this cluster")]
    InvalidPool(String),
    /// Malformed or contradicting resource spec, retrying will not help.
    #[error("{0}")]
    Config(String),
    /// Failed to compute the synchronization hash.
    #[error("{0}")]
    Hash(#[from] HashError),
    /// Error reported by the Aiven API, or failure to reach it.
    #[error("{0}")]
    Provider(#[from] AivenError),
    /// Unexpected state within the controller.
    #[error("{0}")]
    Internal(String),
    /// Failed to persist status or finalizers.
    #[error("failed to write resource state: {0}")]
    StateWrite(#[source] kube::Error),
    /// Writing status or finalizers did not finish in time.
    #[error("timed out writing resource state after {0:?}")]
    StateWriteTimeout(std::time::Duration),
    /// Kubernetes API error
    #[error("{0}")]
    KubeApi(#[from] kube::Error),
    /// Serialization errors
    #[error("{0}")]
    Serde(#[from] serde_json::Error),
}

impl ControllerError {
    /// Whether the reconciliation should be retried.
    pub(crate) fn is_temporary(&self) -> bool {
        match self {
            ControllerError::InvalidPool(_)
            | ControllerError::Config(_)
            | ControllerError::Hash(_) => false,
            ControllerError::Provider(e) => e.is_retryable(),
            _ => true,
        }
    }

    /// The condition type flagged when this error fails a reconciliation.
    pub(crate) fn condition_type(&self) -> &'static str {
        match self {
            ControllerError::Provider(_) => condition_types::AIVEN_FAILURE,
            _ => condition_types::KAFKARATOR_FAILURE,
        }
    }

    /// Message shown to users in status, conditions and events.
    pub(crate) fn user_message(&self) -> String {
        match self {
            ControllerError::Provider(e) => e.user_message(),
            e => e.to_string(),
        }
    }

    pub(crate) fn as_provider_error(&self) -> Option<&AivenError> {
        match self {
            ControllerError::Provider(e) => Some(e),
            _ => None,
        }
    }
}
