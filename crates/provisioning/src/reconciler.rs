//! Background repair of tenants stuck in `creating`.

use std::sync::Arc;

use chrono::Utc;
use domain::{ProvisioningEvent, Tenant};
use serde::Serialize;
use tenant_store::ProvisioningStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::ReconcilerConfig;
use crate::error::{ProvisioningError, Result};
use crate::saga::ProvisioningSaga;
use crate::services::{AuthorizationService, IdentityProvider, VendorService};

/// Counts from a single reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Stuck tenants found.
    pub scanned: usize,
    /// Tenants driven to `active`.
    pub resumed: usize,
    /// Tenants whose resume failed below the attempt ceiling.
    pub retried: usize,
    /// Tenants terminally failed by age or attempt ceiling.
    pub failed: usize,
}

/// Periodically finds `creating` tenants older than the stuck threshold and
/// either resumes or terminally fails them.
pub struct Reconciler<S, I, A, V>
where
    S: ProvisioningStore,
    I: IdentityProvider,
    A: AuthorizationService,
    V: VendorService,
{
    saga: Arc<ProvisioningSaga<S, I, A, V>>,
    config: ReconcilerConfig,
}

impl<S, I, A, V> Reconciler<S, I, A, V>
where
    S: ProvisioningStore + Clone + 'static,
    I: IdentityProvider + 'static,
    A: AuthorizationService + 'static,
    V: VendorService + 'static,
{
    /// Creates a new reconciler.
    pub fn new(saga: Arc<ProvisioningSaga<S, I, A, V>>, config: ReconcilerConfig) -> Self {
        Self { saga, config }
    }

    /// Runs one pass over the stuck tenants.
    #[tracing::instrument(skip(self, token))]
    pub async fn run_once(&self, token: &CancellationToken) -> Result<ReconcileReport> {
        metrics::counter!("reconciliation_passes_total").increment(1);

        let now = Utc::now();
        let cutoff = now - to_chrono(self.config.stuck_threshold);
        let max_age = to_chrono(self.config.max_stuck_age);

        let stuck = self.saga.store().stuck_tenants(cutoff).await?;
        let mut report = ReconcileReport {
            scanned: stuck.len(),
            ..Default::default()
        };
        if stuck.is_empty() {
            tracing::debug!("No stuck tenants");
            return Ok(report);
        }
        tracing::info!(count = stuck.len(), "Found stuck tenants");

        for tenant in stuck {
            if token.is_cancelled() {
                tracing::info!("Reconciliation pass cancelled");
                break;
            }

            if tenant.age(now) > max_age {
                let reason = format!(
                    "stuck in creating for more than {}h",
                    self.config.max_stuck_age.as_secs() / 3600
                );
                self.terminate(&tenant, &reason, &mut report).await;
                continue;
            }
            if tenant.reconcile_attempts >= self.config.max_attempts {
                let reason = format!(
                    "resume failed {} times",
                    tenant.reconcile_attempts
                );
                self.terminate(&tenant, &reason, &mut report).await;
                continue;
            }

            self.attempt(&tenant, token, &mut report).await;
        }

        tracing::info!(
            scanned = report.scanned,
            resumed = report.resumed,
            retried = report.retried,
            failed = report.failed,
            "Reconciliation pass finished"
        );
        Ok(report)
    }

    /// Runs passes every `interval` until the token is cancelled.
    ///
    /// The first pass starts immediately.
    pub fn start(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => {
                        tracing::info!("Reconciler stopped");
                        return;
                    }
                    _ = ticker.tick() => {}
                }

                if let Err(e) = self.run_once(&token).await {
                    tracing::warn!(error = %e, "Reconciliation pass failed");
                }
            }
        })
    }

    async fn attempt(
        &self,
        tenant: &Tenant,
        token: &CancellationToken,
        report: &mut ReconcileReport,
    ) {
        let store = self.saga.store();

        let err = match self.saga.resume(tenant, token).await {
            Ok(_) => {
                metrics::counter!("reconciliation_tenants_resumed").increment(1);
                tracing::info!(tenant_id = %tenant.id, "Stuck tenant resumed");
                if let Err(e) = store
                    .append_journal(
                        tenant.id,
                        ProvisioningEvent::reconcile_attempted(tenant.reconcile_attempts + 1, None),
                    )
                    .await
                {
                    tracing::warn!(tenant_id = %tenant.id, error = %e, "Failed to journal reconcile attempt");
                }
                report.resumed += 1;
                return;
            }
            Err(ProvisioningError::Cancelled) => {
                tracing::info!(tenant_id = %tenant.id, "Resume cancelled");
                return;
            }
            Err(e) => e,
        };

        let attempts = match store.increment_reconcile_attempts(tenant.id).await {
            Ok(attempts) => attempts,
            Err(e) => {
                tracing::warn!(tenant_id = %tenant.id, error = %e, "Failed to record reconcile attempt");
                report.retried += 1;
                return;
            }
        };
        if let Err(e) = store
            .append_journal(
                tenant.id,
                ProvisioningEvent::reconcile_attempted(attempts, Some(err.to_string())),
            )
            .await
        {
            tracing::warn!(tenant_id = %tenant.id, error = %e, "Failed to journal reconcile attempt");
        }

        if attempts >= self.config.max_attempts {
            let reason = format!("resume failed {attempts} times: {err}");
            self.terminate(tenant, &reason, report).await;
        } else {
            tracing::warn!(
                tenant_id = %tenant.id,
                attempts,
                max_attempts = self.config.max_attempts,
                error = %err,
                "Resume failed; will retry next pass"
            );
            report.retried += 1;
        }
    }

    async fn terminate(&self, tenant: &Tenant, reason: &str, report: &mut ReconcileReport) {
        match self.saga.terminate(tenant, reason).await {
            Ok(true) => {
                metrics::counter!("reconciliation_tenants_failed").increment(1);
                report.failed += 1;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(tenant_id = %tenant.id, error = %e, "Failed to terminate stuck tenant");
            }
        }
    }
}

fn to_chrono(duration: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
