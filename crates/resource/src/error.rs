//! Error types for pooled resources
//!
//! Callers of [`ResourcePool::acquire`](crate::ResourcePool::acquire) only ever
//! observe [`Error::PoolClosed`], [`Error::AcquireTimeout`] or whatever error
//! the factory produced (conventionally [`Error::Creation`]).
//! [`Error::Cleanup`] is returned by [`RawResource::close`](crate::RawResource::close)
//! and is logged by the pool, never propagated. [`Error::Configuration`]
//! comes from strict validation ([`PoolConfig::validate`](crate::PoolConfig::validate)).
//!
//! Releasing an entry that is not checked out is not an error: it is an
//! invariant violation and panics.
use thiserror::Error;

/// Result type for resource operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed source error carried by factory-level failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for pool and resource operations
#[derive(Error, Debug)]
pub enum Error {
    /// Acquire attempted after (or during) pool shutdown.
    #[error("Resource pool for '{resource_id}' is closed")]
    PoolClosed {
        /// The resource identifier
        resource_id: String,
    },

    /// No capacity became available before the acquire deadline.
    #[error("Timed out after {timeout_ms}ms waiting for resource '{resource_id}'")]
    AcquireTimeout {
        /// The resource identifier
        resource_id: String,
        /// The acquire timeout in milliseconds
        timeout_ms: u64,
    },

    /// The factory failed to produce a usable resource.
    #[error("Failed to create resource '{resource_id}': {reason}")]
    Creation {
        /// The resource identifier
        resource_id: String,
        /// The failure reason
        reason: String,
        /// The underlying error
        #[source]
        source: Option<BoxError>,
    },

    /// Physically closing a resource failed.
    #[error("Cleanup failed for resource '{resource_id}': {reason}")]
    Cleanup {
        /// The resource identifier
        resource_id: String,
        /// The cleanup failure reason
        reason: String,
        /// The underlying error
        #[source]
        source: Option<BoxError>,
    },

    /// A pool setting is out of range.
    #[error("Invalid pool configuration: {message}")]
    Configuration {
        /// What is wrong with the setting
        message: String,
    },
}

impl Error {
    /// Create a pool-closed error
    pub fn pool_closed<S: Into<String>>(resource_id: S) -> Self {
        Self::PoolClosed {
            resource_id: resource_id.into(),
        }
    }

    /// Create an acquire-timeout error
    pub fn acquire_timeout<S: Into<String>>(resource_id: S, timeout: std::time::Duration) -> Self {
        Self::AcquireTimeout {
            resource_id: resource_id.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Create a creation error without an underlying source
    pub fn creation<S: Into<String>, R: Into<String>>(resource_id: S, reason: R) -> Self {
        Self::Creation {
            resource_id: resource_id.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a creation error wrapping the driver's error
    pub fn creation_with_source<S, E>(resource_id: S, source: E) -> Self
    where
        S: Into<String>,
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Creation {
            resource_id: resource_id.into(),
            reason: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a cleanup error without an underlying source
    pub fn cleanup<S: Into<String>, R: Into<String>>(resource_id: S, reason: R) -> Self {
        Self::Cleanup {
            resource_id: resource_id.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a configuration error
    pub fn configuration<M: Into<String>>(message: M) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Whether a caller may reasonably retry the failed operation.
    ///
    /// Only timeouts qualify: the pool never retries internally, but capacity
    /// may free up later. A closed pool stays closed and a creation failure is
    /// the factory's verdict.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AcquireTimeout { .. })
    }

    /// Get the resource ID associated with this error
    ///
    /// Empty for [`Error::Configuration`], which is raised before any pool
    /// exists.
    #[must_use]
    pub fn resource_id(&self) -> &str {
        match self {
            Self::PoolClosed { resource_id }
            | Self::AcquireTimeout { resource_id, .. }
            | Self::Creation { resource_id, .. }
            | Self::Cleanup { resource_id, .. } => resource_id,
            Self::Configuration { .. } => "",
        }
    }
}
