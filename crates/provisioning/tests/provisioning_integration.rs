//! Integration tests for the provisioning saga.

use std::sync::Arc;
use std::time::Duration;

use common::{SessionId, TenantId, UserId};
use domain::{
    ContactDetails, Membership, OnboardingSession, ProvisioningEvent, ProvisioningStep,
    ReservationStatus, Role, SagaState, SessionStatus, Slug, TenantStatus, User,
};
use provisioning::services::{
    InMemoryAuthorizationService, InMemoryBusConnector, InMemoryEventBus,
    InMemoryHostProvisioner, InMemoryIdentityProvider, InMemoryNotificationService,
    InMemoryVendorService,
};
use provisioning::{
    EventPublisher, NotificationDispatcher, ProvisionRequest, ProvisioningConfig,
    ProvisioningError, ProvisioningSaga, RetryPolicy, TEMPLATE_WELCOME, TOPIC_TENANT_CREATED,
    TenantLifecycleEvent,
};
use tenant_store::{AccountStore, InMemoryStore, JournalStore, SessionStore, SlugStore, TenantStore};
use tokio_util::sync::CancellationToken;

type TestSaga = ProvisioningSaga<
    InMemoryStore,
    InMemoryIdentityProvider,
    InMemoryAuthorizationService,
    InMemoryVendorService,
>;

const PASSWORD: &str = "correct horse battery staple";

struct TestHarness {
    saga: TestSaga,
    store: InMemoryStore,
    identity: InMemoryIdentityProvider,
    authorization: InMemoryAuthorizationService,
    vendor: InMemoryVendorService,
    bus: InMemoryEventBus,
    hosts: InMemoryHostProvisioner,
    notifications: InMemoryNotificationService,
}

impl TestHarness {
    fn new() -> Self {
        let store = InMemoryStore::new();
        let identity = InMemoryIdentityProvider::new();
        let authorization = InMemoryAuthorizationService::new();
        let vendor = InMemoryVendorService::new();
        let bus = InMemoryEventBus::new();
        let hosts = InMemoryHostProvisioner::new();
        let notifications = InMemoryNotificationService::new();

        let config = ProvisioningConfig {
            retry: RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
                multiplier: 2,
                max_backoff: Duration::from_millis(4),
            },
            ..Default::default()
        };
        let publisher = EventPublisher::new(
            Arc::new(InMemoryBusConnector::new(bus.clone())),
            config.hosts.clone(),
            config.retry.clone(),
        )
        .with_host_provisioner(Arc::new(hosts.clone()));

        let saga = ProvisioningSaga::new(
            store.clone(),
            identity.clone(),
            authorization.clone(),
            vendor.clone(),
            Arc::new(publisher),
            NotificationDispatcher::new(Arc::new(notifications.clone())),
            &config,
        );

        Self {
            saga,
            store,
            identity,
            authorization,
            vendor,
            bus,
            hosts,
            notifications,
        }
    }

    async fn connected() -> Self {
        let h = Self::new();
        h.saga
            .publisher()
            .connect(&CancellationToken::new())
            .await
            .unwrap();
        h
    }

    async fn create_session(&self, business_name: &str, slug: Option<&str>) -> SessionId {
        let mut session = OnboardingSession::new(
            business_name,
            ContactDetails::new("Owner@Acme.test", "Ada", "Lovelace"),
        );
        if let Some(slug) = slug {
            session = session.with_slug(slug);
        }
        self.store.create_session(&session).await.unwrap();
        session.id
    }

    async fn session_status(&self, session_id: SessionId) -> SessionStatus {
        self.store
            .get_session(session_id)
            .await
            .unwrap()
            .unwrap()
            .status
    }

    async fn tenant_status(&self, tenant_id: TenantId) -> TenantStatus {
        self.store
            .get_tenant(tenant_id)
            .await
            .unwrap()
            .unwrap()
            .status
    }

    async fn only_tenant_of(&self, session_id: SessionId) -> TenantId {
        self.store
            .get_session(session_id)
            .await
            .unwrap()
            .unwrap()
            .tenant_id
            .expect("session should be bound to a tenant")
    }
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_happy_path() {
    let h = TestHarness::connected().await;
    let session_id = h.create_session("Acme Corp", Some("acme")).await;

    let outcome = h
        .saga
        .provision(session_id, ProvisionRequest::with_password(PASSWORD))
        .await
        .unwrap();

    assert_eq!(outcome.slug, "acme");
    assert_eq!(outcome.status, TenantStatus::Active);
    assert!(!outcome.resumed);
    assert!(outcome.login_token.is_some());

    // Tenant is active with both resources
    let tenant = h.store.get_tenant(outcome.tenant_id).await.unwrap().unwrap();
    assert_eq!(tenant.status, TenantStatus::Active);
    assert!(tenant.has_resources());
    assert_eq!(h.vendor.vendor_count(), 1);
    assert_eq!(h.vendor.storefront_count(), 1);
    assert_eq!(h.session_status(session_id).await, SessionStatus::Completed);

    // Owner identity is the provider's id everywhere
    let owner_id = outcome.owner_id.unwrap();
    assert_eq!(tenant.owner_id, Some(owner_id));
    assert_eq!(h.identity.account(owner_id).unwrap().email, "owner@acme.test");
    assert!(h.authorization.has_owner(tenant.id, owner_id));

    let memberships = h.store.memberships_for_tenant(tenant.id).await.unwrap();
    assert_eq!(memberships.len(), 1);
    assert_eq!(memberships[0].user_id, owner_id);
    assert_eq!(memberships[0].role, Role::Owner);
    assert!(memberships[0].is_default);
    let credentials = h.store.credentials_for_tenant(tenant.id).await.unwrap();
    assert_eq!(credentials.len(), 1);
    assert_eq!(credentials[0].user_id, owner_id);

    // Slug reservation bound to the tenant
    let reservation = h
        .store
        .find_reservation(&Slug::parse("acme").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reservation.status, ReservationStatus::Active);
    assert_eq!(reservation.tenant_id, Some(tenant.id));

    // Background announcement
    eventually(|| !h.bus.published_on(TOPIC_TENANT_CREATED).is_empty()).await;
    eventually(|| !h.notifications.sent_with(TEMPLATE_WELCOME).is_empty()).await;
    let event: TenantLifecycleEvent = serde_json::from_value(
        h.bus.published_on(TOPIC_TENANT_CREATED)[0].payload.clone(),
    )
    .unwrap();
    assert_eq!(event.tenant_id, tenant.id);
    assert_eq!(event.owner_id, Some(owner_id));
    assert!(h.hosts.requests().is_empty());

    let progress = h.saga.progress(tenant.id).await.unwrap();
    assert_eq!(progress.state(), SagaState::Completed);
    assert!(progress.is_completed(ProvisioningStep::ActivateTenant));
    assert_eq!(progress.vendor_id(), tenant.vendor_id);
}

#[tokio::test]
async fn test_slug_conflict_then_suggestion_claimed() {
    let h = TestHarness::connected().await;
    let s1 = h.create_session("Acme", Some("acme")).await;
    let s2 = h.create_session("Acme Two", Some("acme")).await;

    let first = h.saga.slugs().reserve("acme", s1, None).await.unwrap();
    assert!(first.available);

    let second = h.saga.slugs().reserve("acme", s2, None).await.unwrap();
    assert!(!second.available);
    assert_eq!(second.suggestions, vec!["acme-1", "acme-2", "acme-3"]);

    // S2 cannot provision with the taken slug
    let err = h
        .saga
        .provision(s2, ProvisionRequest::with_password(PASSWORD))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProvisioningError::SlugUnavailable { ref suggestions, .. } if suggestions[0] == "acme-1"
    ));
    assert_eq!(h.store.tenant_count().await, 0);

    let outcome = h
        .saga
        .provision(s1, ProvisionRequest::with_password(PASSWORD))
        .await
        .unwrap();
    assert_eq!(outcome.slug, "acme");

    let claimed = h.saga.slugs().reserve("acme-1", s2, None).await.unwrap();
    assert!(claimed.available);
}

#[tokio::test]
async fn test_slug_derived_from_business_name() {
    let h = TestHarness::connected().await;
    let session_id = h.create_session("Joe's Coffee & Tea!", None).await;

    let outcome = h
        .saga
        .provision(session_id, ProvisionRequest::with_password(PASSWORD))
        .await
        .unwrap();
    assert_eq!(outcome.slug, "joe-s-coffee-tea");
}

#[tokio::test]
async fn test_invalid_slug_creates_nothing() {
    let h = TestHarness::connected().await;
    let session_id = h.create_session("Acme", Some("acme--corp")).await;

    let err = h
        .saga
        .provision(session_id, ProvisionRequest::with_password(PASSWORD))
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisioningError::InvalidSlug(_)));
    assert_eq!(h.store.tenant_count().await, 0);
}

#[tokio::test]
async fn test_unknown_session() {
    let h = TestHarness::new();
    let err = h
        .saga
        .provision(SessionId::new(), ProvisionRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisioningError::SessionNotFound(_)));
}

#[tokio::test]
async fn test_identity_failure_fails_tenant() {
    let h = TestHarness::connected().await;
    h.identity.set_fail_on_create(true);
    let session_id = h.create_session("Acme", Some("acme")).await;

    let err = h
        .saga
        .provision(session_id, ProvisionRequest::with_password(PASSWORD))
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisioningError::Identity(_)));

    let tenant_id = h.only_tenant_of(session_id).await;
    assert_eq!(h.tenant_status(tenant_id).await, TenantStatus::Failed);
    assert_eq!(h.session_status(session_id).await, SessionStatus::Failed);
    assert_eq!(h.authorization.calls(), 0);
    assert_eq!(h.vendor.create_vendor_calls(), 0);
}

#[tokio::test]
async fn test_new_owner_without_password_is_fatal() {
    let h = TestHarness::connected().await;
    let session_id = h.create_session("Acme", Some("acme")).await;

    let err = h
        .saga
        .provision(session_id, ProvisionRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisioningError::Identity(_)));
    let tenant_id = h.only_tenant_of(session_id).await;
    assert_eq!(h.tenant_status(tenant_id).await, TenantStatus::Failed);
}

#[tokio::test]
async fn test_authorization_failure_skips_vendor() {
    let h = TestHarness::connected().await;
    h.authorization.set_fail_on_bootstrap(true);
    let session_id = h.create_session("Acme", Some("acme")).await;

    let err = h
        .saga
        .provision(session_id, ProvisionRequest::with_password(PASSWORD))
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisioningError::Authorization(_)));

    let tenant_id = h.only_tenant_of(session_id).await;
    let tenant = h.store.get_tenant(tenant_id).await.unwrap().unwrap();
    assert_eq!(tenant.status, TenantStatus::Failed);
    assert!(
        tenant
            .failure_reason
            .as_deref()
            .unwrap()
            .starts_with("bootstrap_authorization")
    );
    assert_eq!(h.session_status(session_id).await, SessionStatus::Failed);
    assert_eq!(h.vendor.create_vendor_calls(), 0);
    assert_eq!(h.vendor.create_storefront_calls(), 0);

    let progress = h.saga.progress(tenant_id).await.unwrap();
    assert_eq!(progress.state(), SagaState::Failed);
}

#[tokio::test]
async fn test_vendor_recovers_after_two_failures() {
    let h = TestHarness::connected().await;
    h.vendor.fail_vendor_times(2);
    let session_id = h.create_session("Acme", Some("acme")).await;

    let outcome = h
        .saga
        .provision(session_id, ProvisionRequest::with_password(PASSWORD))
        .await
        .unwrap();

    assert_eq!(outcome.status, TenantStatus::Active);
    assert_eq!(h.vendor.create_vendor_calls(), 3);
    assert_eq!(h.vendor.vendor_count(), 1);
}

#[tokio::test]
async fn test_exhausted_retries_make_tenant_inactive() {
    let h = TestHarness::connected().await;
    h.vendor.set_fail_on_create_storefront(true);
    let session_id = h.create_session("Acme", Some("acme")).await;

    let err = h
        .saga
        .provision(session_id, ProvisionRequest::with_password(PASSWORD))
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisioningError::RetryExhausted { attempts: 3, .. }));

    let tenant_id = h.only_tenant_of(session_id).await;
    let tenant = h.store.get_tenant(tenant_id).await.unwrap().unwrap();
    assert_eq!(tenant.status, TenantStatus::Inactive);
    assert!(!tenant.has_resources());
    assert_eq!(h.session_status(session_id).await, SessionStatus::Failed);
    assert_eq!(h.vendor.storefront_count(), 0);
}

#[tokio::test]
async fn test_tenant_mismatch_fails_tenant() {
    let h = TestHarness::connected().await;
    h.vendor.set_return_foreign_tenant(true);
    let session_id = h.create_session("Acme", Some("acme")).await;

    let err = h
        .saga
        .provision(session_id, ProvisionRequest::with_password(PASSWORD))
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisioningError::TenantMismatch { .. }));

    let tenant_id = h.only_tenant_of(session_id).await;
    assert_eq!(h.tenant_status(tenant_id).await, TenantStatus::Failed);
    assert_eq!(h.vendor.create_vendor_calls(), 1);
}

#[tokio::test]
async fn test_cancellation_leaves_tenant_creating() {
    let h = TestHarness::connected().await;
    let session_id = h.create_session("Acme", Some("acme")).await;
    let token = CancellationToken::new();
    token.cancel();

    let err = h
        .saga
        .provision_with_cancel(session_id, ProvisionRequest::with_password(PASSWORD), &token)
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisioningError::Cancelled));

    let tenant_id = h.only_tenant_of(session_id).await;
    assert_eq!(h.tenant_status(tenant_id).await, TenantStatus::Creating);
    assert_eq!(h.session_status(session_id).await, SessionStatus::InProgress);
}

#[tokio::test]
async fn test_repeated_call_is_idempotent() {
    let h = TestHarness::connected().await;
    let session_id = h.create_session("Acme", Some("acme")).await;

    let first = h
        .saga
        .provision(session_id, ProvisionRequest::with_password(PASSWORD))
        .await
        .unwrap();
    let second = h
        .saga
        .provision(session_id, ProvisionRequest::with_password(PASSWORD))
        .await
        .unwrap();

    assert!(second.resumed);
    assert_eq!(first.tenant_id, second.tenant_id);
    assert_eq!(first.owner_id, second.owner_id);
    assert_eq!(second.status, TenantStatus::Active);
    assert!(second.login_token.is_some());

    assert_eq!(h.store.tenant_count().await, 1);
    assert_eq!(h.vendor.vendor_count(), 1);
    assert_eq!(h.vendor.storefront_count(), 1);
    assert_eq!(h.vendor.create_vendor_calls(), 1);
    assert_eq!(h.identity.account_count(), 1);
    assert_eq!(h.identity.tokens_issued(), 2);
}

#[tokio::test]
async fn test_repeated_call_rejects_wrong_password() {
    let h = TestHarness::connected().await;
    let session_id = h.create_session("Acme", Some("acme")).await;
    h.saga
        .provision(session_id, ProvisionRequest::with_password(PASSWORD))
        .await
        .unwrap();

    let err = h
        .saga
        .provision(session_id, ProvisionRequest::with_password("wrong"))
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisioningError::InvalidCredentials));
    assert_eq!(
        h.tenant_status(h.only_tenant_of(session_id).await).await,
        TenantStatus::Active
    );
}

#[tokio::test]
async fn test_owner_with_existing_account_gets_second_tenant() {
    let h = TestHarness::connected().await;
    let s1 = h.create_session("Acme", Some("acme")).await;
    let s2 = h.create_session("Acme Outlet", Some("acme-outlet")).await;

    let first = h
        .saga
        .provision(s1, ProvisionRequest::with_password(PASSWORD))
        .await
        .unwrap();
    let second = h
        .saga
        .provision(s2, ProvisionRequest::with_password(PASSWORD))
        .await
        .unwrap();

    assert_eq!(first.owner_id, second.owner_id);
    assert_eq!(h.identity.account_count(), 1);

    let memberships = h
        .store
        .memberships_for_user(first.owner_id.unwrap())
        .await
        .unwrap();
    assert_eq!(memberships.len(), 2);
    let default_tenant: Vec<TenantId> = memberships
        .iter()
        .filter(|m| m.is_default)
        .map(|m| m.tenant_id)
        .collect();
    assert_eq!(default_tenant, vec![first.tenant_id]);
}

#[tokio::test]
async fn test_divergent_local_user_is_relinked() {
    let h = TestHarness::connected().await;
    let stale_id = UserId::new();
    let other_tenant = TenantId::new();
    h.store
        .upsert_user(&User::new(stale_id, "owner@acme.test", "Ada", "Lovelace"))
        .await
        .unwrap();
    h.store
        .create_membership(&Membership::new(stale_id, other_tenant, Role::Staff, true))
        .await
        .unwrap();

    let session_id = h.create_session("Acme", Some("acme")).await;
    let outcome = h
        .saga
        .provision(session_id, ProvisionRequest::with_password(PASSWORD))
        .await
        .unwrap();
    let owner_id = outcome.owner_id.unwrap();
    assert_ne!(owner_id, stale_id);

    let local = h
        .store
        .find_user_by_email("owner@acme.test")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(local.id, owner_id);
    assert!(h.store.memberships_for_user(stale_id).await.unwrap().is_empty());

    let memberships = h.store.memberships_for_user(owner_id).await.unwrap();
    assert_eq!(memberships.len(), 2);
    let new_membership = memberships
        .iter()
        .find(|m| m.tenant_id == outcome.tenant_id)
        .unwrap();
    assert!(!new_membership.is_default);
}

#[tokio::test]
async fn test_membership_failure_is_best_effort() {
    let h = TestHarness::connected().await;
    h.store.set_fail_on_membership(true);
    let session_id = h.create_session("Acme", Some("acme")).await;

    let outcome = h
        .saga
        .provision(session_id, ProvisionRequest::with_password(PASSWORD))
        .await
        .unwrap();

    assert_eq!(outcome.status, TenantStatus::Active);
    assert!(
        h.store
            .memberships_for_tenant(outcome.tenant_id)
            .await
            .unwrap()
            .is_empty()
    );

    let journal = h.store.journal(outcome.tenant_id).await.unwrap();
    assert!(journal.iter().any(|e| matches!(
        &e.event,
        ProvisioningEvent::StepFailed(data)
            if data.step == ProvisioningStep::LinkMembership && !data.fatal
    )));
    let progress = h.saga.progress(outcome.tenant_id).await.unwrap();
    assert!(!progress.is_completed(ProvisioningStep::LinkMembership));
    assert!(progress.is_completed(ProvisioningStep::RecordCredentials));
}

#[tokio::test]
async fn test_activation_failure_leaves_tenant_creating() {
    let h = TestHarness::connected().await;
    h.store.set_fail_on_activate(true);
    let session_id = h.create_session("Acme", Some("acme")).await;

    let err = h
        .saga
        .provision(session_id, ProvisionRequest::with_password(PASSWORD))
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisioningError::Store(_)));

    let tenant_id = h.only_tenant_of(session_id).await;
    assert_eq!(h.tenant_status(tenant_id).await, TenantStatus::Creating);
    let progress = h.saga.progress(tenant_id).await.unwrap();
    assert_eq!(
        progress.last_completed_step(),
        Some(ProvisioningStep::ActivateSlug)
    );
}

#[tokio::test]
async fn test_disconnected_bus_uses_http_fallback() {
    let h = TestHarness::new();
    let session_id = h.create_session("Acme", Some("acme")).await;

    let outcome = h
        .saga
        .provision(session_id, ProvisionRequest::with_password(PASSWORD))
        .await
        .unwrap();
    assert_eq!(outcome.status, TenantStatus::Active);

    eventually(|| !h.hosts.requests().is_empty()).await;
    let request = &h.hosts.requests()[0];
    assert_eq!(request.tenant_id, outcome.tenant_id);
    assert_eq!(request.admin_host, "acme.admin.example.com");
    assert!(h.bus.published().is_empty());
}

#[tokio::test]
async fn test_publish_and_notify_failures_do_not_fail_saga() {
    let h = TestHarness::new();
    h.hosts.set_fail(true);
    h.notifications.set_fail(true);
    let session_id = h.create_session("Acme", Some("acme")).await;

    let outcome = h
        .saga
        .provision(session_id, ProvisionRequest::with_password(PASSWORD))
        .await
        .unwrap();
    assert_eq!(outcome.status, TenantStatus::Active);
    assert_eq!(h.session_status(session_id).await, SessionStatus::Completed);
}
