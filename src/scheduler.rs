//! Scheduler callback interface (C11, §4.11).
//!
//! The relay depends on exactly two operations on an external scheduler.
//! Both are fire-and-forget from the relay's perspective: failures are
//! logged by the caller and never propagated to the client (§7).

use async_trait::async_trait;

use crate::Result;

/// Thin contract to the external account scheduler (§4.11).
#[async_trait]
pub trait SchedulerHandle: Send + Sync {
    async fn mark_rate_limited(
        &self,
        account_id: &str,
        provider_tag: &str,
        session_hash: Option<&str>,
        resets_in_seconds: Option<u64>,
    ) -> Result<()>;

    async fn mark_unauthorized(
        &self,
        account_id: &str,
        provider_tag: &str,
        session_hash: Option<&str>,
        reason: &str,
    ) -> Result<()>;
}

/// Invokes `scheduler.mark_rate_limited`, logging (never propagating) a
/// failure — the relay response to the client must never depend on the
/// scheduler call succeeding (§7, §11).
pub async fn notify_rate_limited(
    scheduler: &dyn SchedulerHandle,
    account_id: &str,
    provider_tag: &str,
    session_hash: Option<&str>,
    resets_in_seconds: Option<u64>,
) {
    if let Err(e) = scheduler
        .mark_rate_limited(account_id, provider_tag, session_hash, resets_in_seconds)
        .await
    {
        log::warn!("scheduler.mark_rate_limited failed for account {account_id}: {e}");
    }
}

/// Invokes `scheduler.mark_unauthorized`, logging (never propagating) a failure.
pub async fn notify_unauthorized(
    scheduler: &dyn SchedulerHandle,
    account_id: &str,
    provider_tag: &str,
    session_hash: Option<&str>,
    reason: &str,
) {
    if let Err(e) = scheduler
        .mark_unauthorized(account_id, provider_tag, session_hash, reason)
        .await
    {
        log::warn!("scheduler.mark_unauthorized failed for account {account_id}: {e}");
    }
}
