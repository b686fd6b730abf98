use thiserror::Error;

use crate::{config::ConfigError, hypervisor::HypervisorError};

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error("discover-libvirt: invalid provider {0:?}")]
    InvalidProvider(String),

    #[error("can't connect to libvirt server at {uri:?}: {source}")]
    Connection {
        uri: String,
        #[source]
        source: HypervisorError,
    },

    #[error("failed to list active domains: {0}")]
    ListDomains(#[source] HypervisorError),

    #[error("failed to read metadata of domain {domain:?}: {source}")]
    Metadata {
        domain: String,
        #[source]
        source: HypervisorError,
    },

    #[error("metadata key not found: expected {expected:?}, found {found:?}")]
    KeyNotFound { expected: String, found: String },

    #[error("metadata value not found under key {key:?}: expected {expected:?}, found {found:?}")]
    ValueNotFound {
        key: String,
        expected: String,
        found: String,
    },

    #[error("no network interfaces on this domain: {domain}")]
    NoInterfaces {
        domain: String,
        #[source]
        source: HypervisorError,
    },

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("discover: no provider")]
    NoProvider,

    #[error("discover: unknown provider {0:?}")]
    UnknownProvider(String),
}

pub type DiscoverResult<T> = Result<T, DiscoverError>;

impl DiscoverError {
    /// True for the two filter-mismatch kinds, which `on_mismatch=skip` tolerates.
    pub fn is_filter_mismatch(&self) -> bool {
        matches!(
            self,
            DiscoverError::KeyNotFound { .. } | DiscoverError::ValueNotFound { .. }
        )
    }
}
