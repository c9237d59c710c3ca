//! Provisioning journal: ordered steps, recorded events and resumable progress.

mod events;
mod progress;
mod step;

pub use events::{
    JournalEntry, ProvisioningEvent, ReconcileAttemptedData, SagaCompletedData, SagaFailedData,
    SagaStartedData, StepCompletedData, StepFailedData,
};
pub use progress::{ProvisioningProgress, SagaState};
pub use step::ProvisioningStep;
