//! Folding the provisioning journal into resumable progress.

use std::collections::BTreeSet;

use common::{SessionId, StorefrontId, TenantId, UserId, VendorId};
use serde::{Deserialize, Serialize};

use super::events::{JournalEntry, ProvisioningEvent};
use super::step::ProvisioningStep;

/// The state of a provisioning saga as recorded in its journal.
///
/// State transitions:
/// ```text
/// NotStarted ──► Running ──┬──► Completed
///                          └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    /// No journal entries yet.
    #[default]
    NotStarted,

    /// The tenant row exists and steps are executing (or were interrupted).
    Running,

    /// The tenant reached `active` (terminal state).
    Completed,

    /// The tenant was moved to a terminal failure status (terminal state).
    Failed,
}

impl SagaState {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Completed | SagaState::Failed)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::NotStarted => "NotStarted",
            SagaState::Running => "Running",
            SagaState::Completed => "Completed",
            SagaState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provisioning progress rebuilt from a tenant's journal.
///
/// Tracks which steps completed and the identifiers they produced, so a
/// resumed saga continues from the recorded failure point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningProgress {
    tenant_id: Option<TenantId>,
    session_id: Option<SessionId>,
    state: SagaState,
    completed: BTreeSet<ProvisioningStep>,
    owner_id: Option<UserId>,
    vendor_id: Option<VendorId>,
    storefront_id: Option<StorefrontId>,
    /// Last fatal step failure or saga failure reason.
    failure_reason: Option<String>,
    reconcile_attempts: u32,
}

impl ProvisioningProgress {
    /// Replays journal entries in sequence order.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a JournalEntry>) -> Self {
        let mut progress = Self::default();
        for entry in entries {
            progress.apply(&entry.event);
        }
        progress
    }

    /// Applies a single journal event.
    pub fn apply(&mut self, event: &ProvisioningEvent) {
        match event {
            ProvisioningEvent::SagaStarted(data) => {
                self.tenant_id = Some(data.tenant_id);
                self.session_id = Some(data.session_id);
                self.state = SagaState::Running;
                self.completed.insert(ProvisioningStep::ResolveSlug);
                self.completed.insert(ProvisioningStep::CreateTenant);
            }
            ProvisioningEvent::StepCompleted(data) => {
                self.completed.insert(data.step);
                if let Some(owner_id) = data.owner_id {
                    self.owner_id = Some(owner_id);
                }
                if let Some(vendor_id) = data.vendor_id {
                    self.vendor_id = Some(vendor_id);
                }
                if let Some(storefront_id) = data.storefront_id {
                    self.storefront_id = Some(storefront_id);
                }
            }
            ProvisioningEvent::StepFailed(data) => {
                if data.fatal {
                    self.failure_reason = Some(format!("{}: {}", data.step, data.error));
                }
            }
            ProvisioningEvent::SagaCompleted(_) => {
                self.state = SagaState::Completed;
                self.failure_reason = None;
            }
            ProvisioningEvent::SagaFailed(data) => {
                self.state = SagaState::Failed;
                self.failure_reason = Some(data.reason.clone());
            }
            ProvisioningEvent::ReconcileAttempted(data) => {
                self.reconcile_attempts = self.reconcile_attempts.max(data.attempt);
            }
        }
    }

    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session_id
    }

    pub fn state(&self) -> SagaState {
        self.state
    }

    /// Returns true if `step` has a completion record.
    pub fn is_completed(&self, step: ProvisioningStep) -> bool {
        self.completed.contains(&step)
    }

    /// Returns the furthest completed step in execution order.
    pub fn last_completed_step(&self) -> Option<ProvisioningStep> {
        self.completed.iter().next_back().copied()
    }

    /// Returns steps without a completion record, in execution order.
    pub fn pending_steps(&self) -> Vec<ProvisioningStep> {
        ProvisioningStep::ALL
            .into_iter()
            .filter(|step| !self.completed.contains(step))
            .collect()
    }

    pub fn owner_id(&self) -> Option<UserId> {
        self.owner_id
    }

    pub fn vendor_id(&self) -> Option<VendorId> {
        self.vendor_id
    }

    pub fn storefront_id(&self) -> Option<StorefrontId> {
        self.storefront_id
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Highest reconciliation attempt number recorded.
    pub fn reconcile_attempts(&self) -> u32 {
        self.reconcile_attempts
    }
}
