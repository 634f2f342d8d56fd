use thiserror::Error;

/// Failures the rest of the crate needs to tell apart.
///
/// Everything is carried inside `anyhow::Error`; callers that care about the
/// category use `err.downcast_ref::<StoreError>()`.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("remote backend not configured: {0}")]
    NotConfigured(&'static str),

    #[error("storage quota exceeded writing '{key}' ({needed} bytes needed, quota {quota} bytes)")]
    QuotaExceeded {
        key: String,
        needed: usize,
        quota: usize,
    },

    #[error("backend request failed with status {status}: {message}")]
    Backend { status: u16, message: String },
}

impl StoreError {
    /// Returns true if `err` wraps a quota failure.
    #[must_use]
    pub fn is_quota_exceeded(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::QuotaExceeded { .. })
        )
    }
}
