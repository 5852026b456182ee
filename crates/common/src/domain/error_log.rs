use crate::domain::{DomainResult, ErrorCategory};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A failure attributed to a tenant and device.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedError {
    pub tenant_id: String,
    pub device: String,
    pub category: ErrorCategory,
    pub timestamp: DateTime<Utc>,
}

impl ClassifiedError {
    pub fn new(
        tenant_id: impl Into<String>,
        device: impl Into<String>,
        category: ErrorCategory,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            device: device.into(),
            category,
            timestamp: Utc::now(),
        }
    }
}

/// Store of per-tenant failures, keyed by `(tenant_id, device)`.
///
/// Implementations must upsert: a repeat failure for the same key refreshes the stored
/// timestamp instead of adding a row.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ErrorLogRepository: Send + Sync {
    async fn record(&self, error: &ClassifiedError) -> DomainResult<()>;
}
