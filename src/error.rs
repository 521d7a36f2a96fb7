use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("cluster {0} does not exist")]
    ClusterNotFound(String),

    #[error("cluster {cluster} does not contain a namespace named {namespace}")]
    NamespaceNotExists { cluster: String, namespace: String },

    #[error("secret {0} does not exist")]
    SecretNotFound(String),

    #[error("secret {secret} does not contain expected file {file:?}")]
    InvalidSecretFileName { secret: String, file: String },

    #[error("migrations on {address} still in flight after {timeout:?}")]
    MigrationTimeout { address: String, timeout: Duration },

    #[error("info protocol error: {0}")]
    InfoProtocol(String),

    #[error("invalid resource key: {0}")]
    InvalidKey(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Short alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn info_protocol(msg: impl Into<String>) -> Self {
        Self::InfoProtocol(msg.into())
    }
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    fn api_code(&self) -> Option<u16> {
        match self {
            Self::Kube(kube::Error::Api(e)) => Some(e.code),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.api_code() == Some(404)
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::Kube(kube::Error::Api(e)) if e.code == 409 && e.reason == "AlreadyExists")
    }

    /// Errors caused by the user's resources rather than the infrastructure.
    /// They are reported as events before being handed back for retry.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::ClusterNotFound(_)
                | Self::NamespaceNotExists { .. }
                | Self::SecretNotFound(_)
                | Self::InvalidSecretFileName { .. }
        )
    }
}
