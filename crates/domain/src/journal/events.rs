//! Provisioning journal events.

use chrono::{DateTime, Utc};
use common::{JournalEntryId, SessionId, StorefrontId, TenantId, UserId, VendorId};
use serde::{Deserialize, Serialize};

use super::step::ProvisioningStep;
use crate::slug::Slug;

/// Facts recorded while a tenant is provisioned.
///
/// The journal is append-only; folding it with
/// [`ProvisioningProgress`](super::ProvisioningProgress) yields the exact
/// point a crashed saga stopped at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ProvisioningEvent {
    /// The tenant row was created and the saga took ownership of it.
    SagaStarted(SagaStartedData),

    /// A step finished successfully.
    StepCompleted(StepCompletedData),

    /// A step failed. Best-effort failures are recorded with `fatal: false`.
    StepFailed(StepFailedData),

    /// The tenant reached `active`.
    SagaCompleted(SagaCompletedData),

    /// The tenant was moved to a terminal failure status.
    SagaFailed(SagaFailedData),

    /// Reconciliation tried to resume the saga.
    ReconcileAttempted(ReconcileAttemptedData),
}

/// Data for SagaStarted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaStartedData {
    pub tenant_id: TenantId,
    pub session_id: SessionId,
    pub slug: Slug,
    pub started_at: DateTime<Utc>,
}

/// Data for StepCompleted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCompletedData {
    pub step: ProvisioningStep,
    /// Owner identity id, set by `RegisterIdentity`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<UserId>,
    /// Vendor id, set by `EnsureVendor`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<VendorId>,
    /// Storefront id, set by `EnsureStorefront`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storefront_id: Option<StorefrontId>,
    pub completed_at: DateTime<Utc>,
}

/// Data for StepFailed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailedData {
    pub step: ProvisioningStep,
    pub error: String,
    pub fatal: bool,
    pub failed_at: DateTime<Utc>,
}

/// Data for SagaCompleted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaCompletedData {
    pub completed_at: DateTime<Utc>,
}

/// Data for SagaFailed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaFailedData {
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}

/// Data for ReconcileAttempted event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileAttemptedData {
    /// 1-based attempt number.
    pub attempt: u32,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

// Convenience constructors
impl ProvisioningEvent {
    pub fn saga_started(tenant_id: TenantId, session_id: SessionId, slug: Slug) -> Self {
        ProvisioningEvent::SagaStarted(SagaStartedData {
            tenant_id,
            session_id,
            slug,
            started_at: Utc::now(),
        })
    }

    /// A completed step that produced no identifier.
    pub fn step_completed(step: ProvisioningStep) -> Self {
        ProvisioningEvent::StepCompleted(Self::completed_data(step))
    }

    pub fn identity_registered(owner_id: UserId) -> Self {
        ProvisioningEvent::StepCompleted(StepCompletedData {
            owner_id: Some(owner_id),
            ..Self::completed_data(ProvisioningStep::RegisterIdentity)
        })
    }

    pub fn vendor_ensured(vendor_id: VendorId) -> Self {
        ProvisioningEvent::StepCompleted(StepCompletedData {
            vendor_id: Some(vendor_id),
            ..Self::completed_data(ProvisioningStep::EnsureVendor)
        })
    }

    pub fn storefront_ensured(storefront_id: StorefrontId) -> Self {
        ProvisioningEvent::StepCompleted(StepCompletedData {
            storefront_id: Some(storefront_id),
            ..Self::completed_data(ProvisioningStep::EnsureStorefront)
        })
    }

    pub fn step_failed(step: ProvisioningStep, error: impl Into<String>) -> Self {
        ProvisioningEvent::StepFailed(StepFailedData {
            step,
            error: error.into(),
            fatal: step.is_fatal(),
            failed_at: Utc::now(),
        })
    }

    pub fn saga_completed() -> Self {
        ProvisioningEvent::SagaCompleted(SagaCompletedData {
            completed_at: Utc::now(),
        })
    }

    pub fn saga_failed(reason: impl Into<String>) -> Self {
        ProvisioningEvent::SagaFailed(SagaFailedData {
            reason: reason.into(),
            failed_at: Utc::now(),
        })
    }

    pub fn reconcile_attempted(attempt: u32, error: Option<String>) -> Self {
        ProvisioningEvent::ReconcileAttempted(ReconcileAttemptedData {
            attempt,
            succeeded: error.is_none(),
            error,
            attempted_at: Utc::now(),
        })
    }

    fn completed_data(step: ProvisioningStep) -> StepCompletedData {
        StepCompletedData {
            step,
            owner_id: None,
            vendor_id: None,
            storefront_id: None,
            completed_at: Utc::now(),
        }
    }

    /// Returns the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            ProvisioningEvent::SagaStarted(_) => "SagaStarted",
            ProvisioningEvent::StepCompleted(_) => "StepCompleted",
            ProvisioningEvent::StepFailed(_) => "StepFailed",
            ProvisioningEvent::SagaCompleted(_) => "SagaCompleted",
            ProvisioningEvent::SagaFailed(_) => "SagaFailed",
            ProvisioningEvent::ReconcileAttempted(_) => "ReconcileAttempted",
        }
    }
}

/// A journal event as persisted, with its per-tenant sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: JournalEntryId,
    pub tenant_id: TenantId,
    /// 1-based position within the tenant's journal.
    pub sequence: i64,
    pub event: ProvisioningEvent,
    pub recorded_at: DateTime<Utc>,
}
